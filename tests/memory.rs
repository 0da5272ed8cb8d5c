use runic_vm::prelude::*;

fn ctx() -> Context {
    Environment::new().create_context(3).expect("context")
}

#[test]
fn fresh_context_is_empty() {
    let cx = ctx();
    let stats = cx.mem_stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.compactions, 0);
}

#[test]
fn compaction_preserves_observable_state() {
    let mut cx = ctx();
    cx.intro_binary(&[9, 8, 7]).expect("binary");
    cx.intro_istr("123456789012345678901234567890")
        .expect("big int");
    cx.intro_text("compact me").expect("text");
    cx.intro_i32(-42).expect("int");
    for _ in 0..5 {
        cx.compact();
    }
    assert_eq!(cx.peek_i32().expect("peek"), -42);
    cx.drop_value(false).expect("drop");
    cx.compact();
    let mut out = vec![0u8; 10];
    assert_eq!(cx.read_text(&mut out).expect("text"), (10, 10));
    assert_eq!(&out, b"compact me");
    cx.drop_value(false).expect("drop text end");
    cx.compact();
    let mut buf = [0u8; 40];
    let n = cx.peek_istr(&mut buf).expect("istr");
    assert_eq!(&buf[..n], b"123456789012345678901234567890");
    cx.drop_value(false).expect("drop big");
    cx.compact();
    let mut bytes = [0u8; 3];
    assert_eq!(cx.read_binary(&mut bytes).expect("binary"), 3);
    assert_eq!(bytes, [9, 8, 7]);
}

#[test]
fn drop_and_reset_return_to_baseline() {
    let mut cx = ctx();
    let baseline = cx.mem_stats().in_use;
    cx.intro_binary(&vec![1u8; 4096]).expect("binary");
    cx.drop_value(false).expect("drop");
    cx.reset();
    assert_eq!(cx.mem_stats().in_use, baseline);
}

#[test]
fn reset_is_idempotent() {
    let mut cx = ctx();
    cx.intro_i32(5).expect("intro");
    cx.reset();
    let once = cx.mem_stats().in_use;
    cx.reset();
    assert_eq!(cx.mem_stats().in_use, once);
    assert_eq!(once, 0);
}

#[test]
fn exhaustion_reports_context_full() {
    let env = Environment::new();
    let mut cx = env.create_context(3).expect("context");
    let cap = cx.mem_stats().capacity as usize;
    // One chunk larger than a semispace half can never fit.
    let huge = vec![0u8; cap + 1];
    assert_eq!(cx.intro_binary(&huge), Err(RuntimeError::ContextFull));
    assert_eq!(cx.error(), ErrorMask::CONTEXT_FULL);
    // Fail-safe: the prior value survives, and reset recovers.
    cx.reset();
    cx.intro_i32(1).expect("intro after reset");
}

#[test]
fn garbage_pressure_triggers_compaction() {
    let mut cx = ctx();
    let before = cx.mem_stats().compactions;
    // Repeatedly allocate and drop until the allocator must flip.
    for _ in 0..200 {
        cx.intro_binary(&vec![7u8; 32 * 1024]).expect("binary");
        cx.drop_value(false).expect("drop");
    }
    let stats = cx.mem_stats();
    assert!(stats.compactions > before);
    assert!(stats.bytes_collected > 0);
}

#[test]
fn forked_siblings_survive_compaction() {
    let mut a = ctx();
    let mut b = a.fork().expect("fork");
    a.intro_i32(11).expect("a");
    b.intro_i32(22).expect("b");
    a.compact();
    assert_eq!(a.peek_i32().expect("a peek"), 11);
    assert_eq!(b.peek_i32().expect("b peek"), 22);
    // Dropping one sibling releases its roots at the next collection.
    drop(b);
    a.compact();
    assert_eq!(a.peek_i32().expect("a peek"), 11);
}

#[test]
fn sibling_reset_leaves_other_values() {
    let mut a = ctx();
    let mut b = a.fork().expect("fork");
    a.intro_text("keep me").expect("a text");
    b.intro_binary(&[1; 64]).expect("b binary");
    b.reset();
    let mut out = [0u8; 7];
    assert_eq!(a.read_text(&mut out).expect("read"), (7, 7));
    assert_eq!(&out, b"keep me");
}
