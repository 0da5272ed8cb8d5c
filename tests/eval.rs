use runic_vm::prelude::*;

fn ctx() -> Context {
    Environment::new().create_context(3).expect("context")
}

fn ctx_mb(mb: u32) -> Context {
    Environment::new().create_context(mb).expect("context")
}

/// Arrange `((arg * unit) * unit)` under `program` and apply, so the
/// block body sees the one-deep stack `(arg * unit)`.
fn start_on_int(cx: &mut Context, program: &str, arg: i64) {
    cx.intro_unit().expect("floor");
    cx.intro_i64(arg).expect("arg");
    cx.assocl().expect("stack");
    cx.intro_block(program, BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
}

/// Run `program` against the stack `(arg * unit)` and open the result,
/// leaving the block's top-of-stack output on top.
fn run_on_int(cx: &mut Context, program: &str, arg: i64) {
    start_on_int(cx, program, arg);
    assert_eq!(cx.step_eval(1_000).expect("step"), EvalState::Done);
    cx.assocr().expect("open result");
}

#[test]
fn integer_addition_direct() {
    let mut cx = ctx();
    cx.intro_i32(2).expect("intro");
    cx.intro_i32(3).expect("intro");
    cx.int_add().expect("add");
    assert_eq!(cx.peek_i32().expect("peek"), 5);
}

#[test]
fn integer_addition_through_bytecode() {
    let mut cx = ctx();
    cx.intro_unit().expect("arg");
    cx.intro_block("#2#3+", BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    // Result shape: ((5 * unit) * unit).
    cx.assocr().expect("open");
    assert_eq!(cx.peek_i32().expect("peek"), 5);
}

#[test]
fn apply_with_tail_call_increments() {
    let mut cx = ctx();
    run_on_int(&mut cx, "#1+", 41);
    assert_eq!(cx.peek_i32().expect("peek"), 42);
    // No residual pending anywhere in the result.
    assert_eq!(cx.drop_value(false).expect("drop"), Substruct::empty());
}

#[test]
fn digits_build_literals() {
    let mut cx = ctx();
    run_on_int(&mut cx, "%#12345#678*", 0);
    assert_eq!(cx.peek_i64().expect("peek"), 12345 * 678);
}

#[test]
fn big_integer_arithmetic_through_bytecode() {
    let mut cx = ctx();
    // Square a 20-digit number; the result overflows the immediate
    // form by a wide margin.
    let big = "12345678901234567890";
    let program = format!("%#{big}#{big}*");
    run_on_int(&mut cx, &program, 0);
    let mut buf = [0u8; 64];
    let n = cx.peek_istr(&mut buf).expect("istr");
    assert_eq!(
        &buf[..n],
        b"152415787532388367501905199875019052100" as &[u8]
    );
}

#[test]
fn divmod_is_lossless() {
    let mut cx = ctx();
    cx.intro_i32(7).expect("dividend");
    cx.intro_i32(2).expect("divisor");
    cx.int_div().expect("divmod");
    assert_eq!(cx.peek_i32().expect("remainder"), 1);
    cx.drop_value(false).expect("drop");
    assert_eq!(cx.peek_i32().expect("quotient"), 3);
}

#[test]
fn divide_by_zero_is_a_type_fault() {
    let mut cx = ctx();
    cx.intro_i32(7).expect("dividend");
    cx.intro_i32(0).expect("divisor");
    assert_eq!(
        cx.int_div(),
        Err(RuntimeError::Type(TypeFault::DivideByZero))
    );
    assert_eq!(cx.error(), ErrorMask::TYPE);
}

#[test]
fn comparison_embeds_three_way_result() {
    // #4 #2 G observes 4 > 2 and lands in right carrying (2 * 4).
    let mut cx = ctx();
    cx.intro_unit().expect("arg");
    cx.intro_block("#4#2G", BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    assert_eq!(cx.unwrap_sum().expect("sum"), SumTag::Right);
    cx.assocr().expect("open pair");
    assert_eq!(cx.peek_i32().expect("peek"), 2);
    cx.drop_value(false).expect("drop");
    assert_eq!(cx.peek_i32().expect("peek"), 4);
}

#[test]
fn int_cmp_is_nondestructive() {
    let mut cx = ctx();
    cx.intro_i32(0).expect("b");
    cx.intro_i32(4).expect("a");
    assert_eq!(cx.int_cmp().expect("cmp"), std::cmp::Ordering::Less);
    assert_eq!(cx.peek_i32().expect("peek"), 4);
}

/// Arrange `((sum(5 * unit) * unit) * unit)` under `program`: the
/// conditional's operand must itself be a `(sum * e)` stack.
fn start_on_sum(cx: &mut Context, program: &str, tag: SumTag) {
    cx.intro_unit().expect("floor");
    cx.intro_unit().expect("inner floor");
    cx.intro_i32(5).expect("value");
    cx.assocl().expect("inner stack");
    cx.wrap_sum(tag).expect("sum");
    cx.assocl().expect("outer stack");
    cx.intro_block(program, BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
}

#[test]
fn conditional_apply_runs_on_left() {
    let mut cx = ctx();
    start_on_sum(&mut cx, "[#1+]?", SumTag::Left);
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    assert_eq!(cx.unwrap_sum().expect("sum"), SumTag::Left);
    cx.assocr().expect("open stack");
    assert_eq!(cx.peek_i32().expect("peek"), 6);
}

#[test]
fn conditional_apply_drops_block_on_right() {
    let mut cx = ctx();
    start_on_sum(&mut cx, "[#1+]?", SumTag::Right);
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    assert_eq!(cx.unwrap_sum().expect("sum"), SumTag::Right);
    cx.assocr().expect("open stack");
    assert_eq!(cx.peek_i32().expect("peek"), 5);
}

#[test]
fn conditional_apply_refuses_relevant_block_on_right() {
    let mut cx = ctx();
    start_on_sum(&mut cx, "[#1+]k?", SumTag::Right);
    assert_eq!(
        cx.step_eval(100),
        Err(RuntimeError::Type(TypeFault::DropRelevant))
    );
    assert_eq!(cx.error(), ErrorMask::TYPE);
}

#[test]
fn quote_then_compose() {
    let mut cx = ctx();
    cx.intro_unit().expect("arg");
    cx.intro_block("#1+", BlockOptions::default()).expect("inc");
    cx.intro_i32(7).expect("seven");
    cx.quote().expect("quote");
    cx.compose().expect("compose");
    cx.apply().expect("apply");
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    assert_eq!(cx.peek_i32().expect("peek"), 8);
}

#[test]
fn quoted_affine_value_marks_the_block() {
    let mut cx = ctx();
    cx.intro_block("#1+", BlockOptions::default())
        .expect("block");
    cx.block_aff().expect("aff");
    cx.quote().expect("quote");
    // The quotation defers attribution to its contents, so copying the
    // quoting block still reports the affine bit.
    assert_eq!(
        cx.copy(false),
        Err(RuntimeError::Type(TypeFault::CopyAffine))
    );
}

#[test]
fn merge_and_assert() {
    let mut cx = ctx();
    run_on_int(&mut cx, "VVRWLC M", 3);
    assert_eq!(cx.peek_i32().expect("peek"), 3);

    let mut cx = ctx();
    run_on_int(&mut cx, "VVRWLC K", 4);
    assert_eq!(cx.peek_i32().expect("peek"), 4);

    let mut cx = ctx();
    start_on_int(&mut cx, "VK", 4);
    assert_eq!(
        cx.step_eval(100),
        Err(RuntimeError::Type(TypeFault::AssertFailed))
    );
}

#[test]
fn distribute_and_factor_round_trip() {
    // D then F: (a * ((b+c) * e)) comes back factored.
    let mut cx = ctx();
    cx.intro_unit().expect("tail");
    cx.intro_i32(9).expect("b");
    cx.wrap_sum(SumTag::Left).expect("sum");
    cx.intro_i32(4).expect("a");
    // (4 * ((9+_) * unit)) → D → (((4*9)+(4*_)) * unit) → F.
    cx.sum_distrib().expect("distrib");
    cx.sum_factor().expect("factor");
    assert_eq!(cx.unwrap_sum().expect("left"), SumTag::Left);
    assert_eq!(cx.peek_i32().expect("peek"), 4);
    cx.drop_value(false).expect("drop");
    assert_eq!(cx.unwrap_sum().expect("left"), SumTag::Left);
    assert_eq!(cx.peek_i32().expect("peek"), 9);
}

#[test]
fn deep_rotations_cancel() {
    // #5#6l#9 builds (9 * ((6*5) * stack)); wrzw then wzlw is the
    // identity on that shape.
    let mut cx = ctx();
    run_on_int(&mut cx, "#5#6l#9wrzwwzlw", 1);
    assert_eq!(cx.peek_i32().expect("peek"), 9);
    cx.drop_value(false).expect("drop");
    cx.assocr().expect("open");
    cx.assocr().expect("open deeper");
    assert_eq!(cx.peek_i32().expect("peek"), 6);
    cx.drop_value(false).expect("drop");
    assert_eq!(cx.peek_i32().expect("peek"), 5);
}

#[test]
fn zero_effort_makes_no_progress() {
    let mut cx = ctx();
    start_on_int(&mut cx, "#1+", 1);
    assert_eq!(cx.step_eval(0).expect("step"), EvalState::Pending);
    // The value is still pending; a further step completes as if the
    // larger quota had been supplied initially.
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    assert_eq!(cx.peek_i32().expect("peek"), 2);
}

#[test]
fn quota_interruption_resumes_cleanly() {
    let mut cx = ctx_mb(4);
    // Many small calls, each building and discarding a large integer:
    // block boundaries give the quota check purchase, and the garbage
    // forces collections that spend the effort budget.
    let body = format!("[#{}%]vr$c", "9".repeat(120));
    let program = body.repeat(400);
    cx.intro_i64(17).expect("arg");
    cx.intro_block(&program, BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
    let mut pending_steps = 0;
    loop {
        match cx.step_eval(1).expect("step") {
            EvalState::Done => break,
            EvalState::Pending => pending_steps += 1,
        }
        assert!(pending_steps < 10_000, "evaluation failed to converge");
    }
    assert!(pending_steps > 0, "expected at least one suspension");
    assert_eq!(cx.peek_i64().expect("peek"), 17);
    assert!(cx.mem_stats().compactions > 0);
}

#[test]
fn lazy_blocks_pend_until_joined() {
    let mut cx = ctx();
    cx.intro_unit().expect("floor");
    cx.intro_unit().expect("inner floor");
    cx.intro_i64(41).expect("arg");
    cx.assocl().expect("inner stack");
    cx.assocl().expect("outer stack");
    cx.intro_block("[#1+]{&lazy}${&join}", BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    cx.assocr().expect("open inner");
    assert_eq!(cx.peek_i64().expect("peek"), 42);
}

#[test]
fn lazy_blocks_without_join_stay_pending() {
    let mut cx = ctx();
    cx.intro_unit().expect("floor");
    cx.intro_unit().expect("inner floor");
    cx.intro_i64(41).expect("arg");
    cx.assocl().expect("inner stack");
    cx.assocl().expect("outer stack");
    cx.intro_block("[#1+]{&lazy}$", BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    // The inner computation never ran: a pending value sits on top,
    // and pending values are neither droppable nor copyable.
    assert_eq!(
        cx.drop_value(false),
        Err(RuntimeError::Type(TypeFault::DropRelevant))
    );
}

#[test]
fn asynch_values_force_like_lazy_ones() {
    let mut cx = ctx();
    run_on_int(&mut cx, "{&asynch}{&join}", 5);
    assert_eq!(cx.peek_i64().expect("peek"), 5);
}

#[test]
fn par_and_unknown_annotations_are_inert() {
    let mut cx = ctx();
    run_on_int(&mut cx, "[#1+]{&par}vr$c", 1);
    assert_eq!(cx.peek_i64().expect("peek"), 2);

    let mut cx = ctx();
    run_on_int(&mut cx, "{&mystery}#1+", 1);
    assert_eq!(cx.peek_i64().expect("peek"), 2);
}

#[test]
fn trace_and_stow_pass_values_through() {
    let mut cx = ctx();
    run_on_int(&mut cx, "{&trace}{&stow}#1+", 7);
    assert_eq!(cx.peek_i64().expect("peek"), 8);
}

#[test]
fn trash_annotation_discards_but_tracks() {
    let mut cx = ctx();
    run_on_int(&mut cx, "{&trash}", 7);
    // The slot still holds a (droppable) placeholder.
    assert_eq!(
        cx.peek_i64(),
        Err(RuntimeError::Type(TypeFault::ExpectedInteger))
    );
    assert_eq!(cx.drop_value(false).expect("drop"), Substruct::empty());
}

#[test]
fn binary_annotation_compacts_lists() {
    let mut cx = ctx();
    // Build the list 10:20:[] on a one-deep stack, compact it through
    // the annotation, then read it back.
    cx.intro_unit().expect("floor");
    cx.intro_binary(&[]).expect("nil");
    cx.intro_i32(20).expect("int");
    cx.assocl().expect("assocl");
    cx.wrap_sum(SumTag::Left).expect("cons");
    cx.intro_i32(10).expect("int");
    cx.assocl().expect("assocl");
    cx.wrap_sum(SumTag::Left).expect("cons");
    cx.assocl().expect("stack");
    cx.intro_block("{&binary}", BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    let mut out = [0u8; 2];
    assert_eq!(cx.read_binary(&mut out).expect("read"), 2);
    assert_eq!(out, [10, 20]);
}

#[test]
fn unsealing_checks_the_token() {
    let mut cx = ctx();
    run_on_int(&mut cx, "{:tag}{.tag}", 5);
    assert_eq!(cx.peek_i64().expect("peek"), 5);

    let mut cx = ctx();
    start_on_int(&mut cx, "{:tag}{.other}", 5);
    assert_eq!(
        cx.step_eval(100),
        Err(RuntimeError::Type(TypeFault::SealMismatch))
    );
}

#[test]
fn failing_step_latches_and_retains_the_pending() {
    let mut cx = ctx();
    cx.intro_i64(1).expect("arg");
    // `c` demands (a * 1); the argument is a bare integer.
    cx.intro_block("c", BlockOptions::default()).expect("block");
    cx.apply().expect("apply");
    assert!(cx.step_eval(100).is_err());
    assert_eq!(cx.error(), ErrorMask::TYPE);
    // The residue is retained; reset recovers the context.
    cx.reset();
    cx.intro_i64(1).expect("fresh");
    assert_eq!(cx.peek_i64().expect("peek"), 1);
}

#[test]
fn text_literals_evaluate_to_text_values() {
    let mut cx = ctx();
    cx.intro_unit().expect("arg");
    cx.intro_block("\"hi there\n~", BlockOptions::default())
        .expect("block");
    cx.apply().expect("apply");
    assert_eq!(cx.step_eval(100).expect("step"), EvalState::Done);
    cx.assocr().expect("open");
    let mut out = [0u8; 8];
    assert_eq!(cx.read_text(&mut out).expect("read"), (8, 8));
    assert_eq!(&out, b"hi there");
}
