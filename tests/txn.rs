use runic_vm::prelude::*;

fn pair() -> (Environment, Context) {
    let env = Environment::in_memory();
    let cx = env.create_context(3).expect("context");
    (env, cx)
}

#[test]
fn transactions_require_a_store() {
    let env = Environment::new();
    let mut cx = env.create_context(3).expect("context");
    assert_eq!(cx.txn_create(), Err(RuntimeError::Store));
}

#[test]
fn transactions_are_not_hierarchical() {
    let (_env, mut cx) = pair();
    cx.txn_create().expect("txn");
    assert_eq!(cx.txn_create(), Err(RuntimeError::InvalidArgument));
    cx.txn_abort();
    cx.txn_create().expect("fresh txn");
}

#[test]
fn keys_are_validated() {
    let (_env, mut cx) = pair();
    cx.txn_create().expect("txn");
    assert_eq!(cx.txn_read(""), Err(RuntimeError::InvalidArgument));
    let long = "k".repeat(256);
    assert_eq!(cx.txn_read(&long), Err(RuntimeError::InvalidArgument));
    assert_eq!(cx.txn_read("ok-key"), Ok(()));
}

#[test]
fn unwritten_keys_read_as_the_default() {
    let (_env, mut cx) = pair();
    cx.txn_create().expect("txn");
    cx.txn_read("missing").expect("read");
    // Default value: the empty list.
    let mut out = [0u8; 4];
    assert_eq!(cx.read_binary(&mut out).expect("read"), 0);
    cx.drop_value(false).expect("drop terminal");
    cx.txn_abort();
}

#[test]
fn write_commit_read_round_trip() {
    let (_env, mut cx) = pair();
    cx.txn_create().expect("txn");
    cx.intro_binary(b"payload").expect("value");
    cx.txn_write("k").expect("write");
    cx.txn_commit().expect("commit");

    cx.txn_create().expect("second txn");
    cx.txn_read("k").expect("read");
    let mut out = [0u8; 7];
    assert_eq!(cx.read_binary(&mut out).expect("read"), 7);
    assert_eq!(&out, b"payload");
    cx.txn_abort();
}

#[test]
fn reads_see_buffered_writes() {
    let (_env, mut cx) = pair();
    cx.txn_create().expect("txn");
    cx.intro_binary(&[5, 6]).expect("value");
    cx.txn_write("k").expect("write");
    cx.txn_read("k").expect("read back");
    let mut out = [0u8; 2];
    assert_eq!(cx.read_binary(&mut out).expect("read"), 2);
    assert_eq!(out, [5, 6]);
    cx.drop_value(false).expect("drop terminal");
    cx.txn_abort();
}

#[test]
fn writing_the_default_deletes() {
    let (env, mut cx) = pair();
    cx.txn_create().expect("txn");
    cx.intro_binary(&[1]).expect("value");
    cx.txn_write("k").expect("write");
    cx.txn_commit().expect("commit");

    cx.txn_create().expect("txn");
    cx.intro_binary(&[]).expect("empty");
    cx.txn_write("k").expect("delete");
    cx.txn_commit().expect("commit");
    env.sync().expect("sync");

    cx.txn_create().expect("txn");
    cx.txn_read("k").expect("read");
    let mut out = [0u8; 1];
    assert_eq!(cx.read_binary(&mut out).expect("read"), 0);
    cx.txn_abort();
}

#[test]
fn aborted_writes_never_land() {
    let (_env, mut cx) = pair();
    cx.txn_create().expect("txn");
    cx.intro_binary(&[9]).expect("value");
    cx.txn_write("k").expect("write");
    cx.txn_abort();

    cx.txn_create().expect("txn");
    cx.txn_read("k").expect("read");
    let mut out = [0u8; 1];
    assert_eq!(cx.read_binary(&mut out).expect("read"), 0);
    cx.txn_abort();
}

#[test]
fn conflicting_commit_aborts() {
    let env = Environment::in_memory();
    let mut writer = env.create_context(3).expect("writer");
    let mut racer = env.create_context(3).expect("racer");

    // The racer snapshots the key first.
    racer.txn_create().expect("racer txn");
    racer.txn_read("k").expect("racer read");
    racer.drop_value(false).expect("discard value");

    // The writer lands a new value.
    writer.txn_create().expect("writer txn");
    writer.intro_binary(&[1, 2]).expect("value");
    writer.txn_write("k").expect("write");
    writer.txn_commit().expect("commit");

    // The racer's snapshot is stale: its commit conflicts and aborts.
    racer.intro_binary(&[3]).expect("value");
    racer.txn_write("k").expect("write");
    assert_eq!(racer.txn_commit(), Err(RuntimeError::Conflict));
    // Auto-aborted: no transaction remains.
    assert_eq!(racer.txn_commit(), Err(RuntimeError::InvalidArgument));
    // The context itself stays healthy.
    assert_eq!(racer.error(), ErrorMask::empty());
}

#[test]
fn durable_commit_flushes() {
    let (env, mut cx) = pair();
    cx.txn_create().expect("txn");
    cx.txn_durable().expect("durable");
    cx.intro_binary(&[1]).expect("value");
    cx.txn_write("k").expect("write");
    cx.txn_commit().expect("commit");
    env.sync().expect("sync");
}

#[test]
fn txn_write_requires_a_byte_list() {
    let (_env, mut cx) = pair();
    cx.txn_create().expect("txn");
    cx.intro_i64(70000).expect("not a byte list");
    assert_eq!(
        cx.txn_write("k"),
        Err(RuntimeError::Type(TypeFault::ExpectedList))
    );
}
