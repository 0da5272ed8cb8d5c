use runic_vm::prelude::*;

#[test]
fn sibling_move_hands_off_and_restores() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    let mut b = a.fork().expect("b");

    a.intro_i32(42).expect("intro");
    a.move_to(&mut b).expect("move");
    // a lost its top; b gained it.
    assert_eq!(
        a.peek_i32(),
        Err(RuntimeError::Type(TypeFault::ExpectedProduct))
    );
    assert_eq!(b.peek_i32().expect("peek"), 42);

    // Moving back restores both contexts (move equivalence).
    b.move_to(&mut a).expect("move back");
    assert_eq!(a.peek_i32().expect("peek"), 42);
    assert_eq!(
        b.peek_i32(),
        Err(RuntimeError::Type(TypeFault::ExpectedProduct))
    );
}

#[test]
fn sibling_move_builds_destination_stack() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    let mut b = a.fork().expect("b");

    // A builds (unit * unit); B pre-loads a pair so it can assoc after.
    a.intro_unit().expect("a pair");
    b.intro_unit().expect("b pair");
    a.move_to(&mut b).expect("move");
    // B now holds (unit * (unit * unit)) and can rearrange it.
    b.assocl().expect("assocl");
    b.elim_unit_r().expect("tail unit");
    b.elim_unit().expect("fst unit");
    assert_eq!(b.error(), ErrorMask::empty());
}

#[test]
fn cross_space_move_deep_copies() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    let mut b = env.create_context(3).expect("b");

    a.intro_binary(&[1, 2, 3, 4]).expect("binary");
    a.intro_i32(7).expect("int");
    a.assocl().expect("pair");
    a.move_to(&mut b).expect("move");

    // The pair arrived intact in the other space.
    b.assocr().expect("open");
    assert_eq!(b.peek_i32().expect("peek"), 7);
    b.drop_value(false).expect("drop");
    let mut out = [0u8; 4];
    assert_eq!(b.read_binary(&mut out).expect("read"), 4);
    assert_eq!(out, [1, 2, 3, 4]);

    // The source no longer owns it.
    assert_eq!(
        a.peek_i32(),
        Err(RuntimeError::Type(TypeFault::ExpectedProduct))
    );
}

#[test]
fn cross_space_move_round_trip() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    let mut b = env.create_context(3).expect("b");

    a.intro_istr("987654321098765432109876543210")
        .expect("big int");
    a.move_to(&mut b).expect("there");
    b.move_to(&mut a).expect("back again");
    let mut buf = [0u8; 40];
    let n = a.peek_istr(&mut buf).expect("peek");
    assert_eq!(&buf[..n], b"987654321098765432109876543210");
}

#[test]
fn move_from_empty_source_fails_safely() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    a.intro_i32(1).expect("intro");
    let mut b = a.fork().expect("b");
    // The fresh fork holds bare unit: nothing to split off.
    assert_eq!(
        b.move_to(&mut a),
        Err(RuntimeError::Type(TypeFault::ExpectedProduct))
    );
    // The intended recipient is untouched.
    assert_eq!(a.peek_i32().expect("peek"), 1);
}

#[test]
fn copy_move_keeps_the_source() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    let mut b = env.create_context(3).expect("b");

    a.intro_text("shared").expect("text");
    let ss = a.copy_move_to(&mut b, false).expect("copy move");
    assert_eq!(ss, Substruct::empty());

    let mut out = [0u8; 6];
    assert_eq!(a.read_text(&mut out).expect("a read"), (6, 6));
    assert_eq!(&out, b"shared");
    let mut out_b = [0u8; 6];
    assert_eq!(b.read_text(&mut out_b).expect("b read"), (6, 6));
    assert_eq!(&out_b, b"shared");
}

#[test]
fn copy_move_respects_affinity() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    let mut b = a.fork().expect("b");

    a.intro_block("#1+", BlockOptions::default()).expect("block");
    a.block_aff().expect("aff");
    assert_eq!(
        a.copy_move_to(&mut b, false),
        Err(RuntimeError::Type(TypeFault::CopyAffine))
    );
    // Forced, the copy proceeds and reports the attribute.
    a.reset();
    a.intro_block("#1+", BlockOptions::default()).expect("block");
    a.block_aff().expect("aff");
    assert_eq!(
        a.copy_move_to(&mut b, true).expect("forced"),
        Substruct::AFFINE
    );
}

#[test]
fn moved_blocks_still_run() {
    let env = Environment::new();
    let mut a = env.create_context(3).expect("a");
    let mut b = env.create_context(3).expect("b");

    a.intro_block("#1+", BlockOptions::default()).expect("block");
    a.move_to(&mut b).expect("move");

    // Apply the transplanted block in its new home.
    b.intro_unit().expect("floor");
    b.intro_i64(9).expect("arg");
    b.assocl().expect("stack");
    b.wswap().expect("block on top");
    b.apply().expect("apply");
    assert_eq!(b.step_eval(100).expect("step"), EvalState::Done);
    b.assocr().expect("open");
    assert_eq!(b.peek_i64().expect("peek"), 10);
}
