//! Generic store contract checks

use pgkv::traits::{Reader, Snapshot, Store, Transaction, Writer};
use pgkv::{Context, Database, ErrorKind};

use crate::common::{drain, put_all, read_value, with_database};

fn owned(pairs: &[(&[u8], &[u8])]) -> Vec<(Vec<u8>, Vec<u8>)> {
    pairs.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect()
}

// =============================================================================
// CONTRACT CHECKS
// =============================================================================

fn check_point_operations<S: Store>(store: &S, ctx: &Context) {
    let mut txn = store.new_transaction(ctx).unwrap();
    assert_eq!(txn.get(ctx, b"k").unwrap_err().kind(), ErrorKind::NotFound);
    txn.set_bytes(ctx, b"k", b"v").unwrap();
    assert_eq!(read_value(txn.get(ctx, b"k").unwrap()), b"v");
    txn.commit(ctx).unwrap();

    let mut txn = store.new_transaction(ctx).unwrap();
    txn.delete(ctx, b"k").unwrap();
    assert_eq!(txn.delete(ctx, b"k").unwrap_err().kind(), ErrorKind::NotFound);
    txn.commit(ctx).unwrap();

    let mut snap = store.new_snapshot(ctx).unwrap();
    assert_eq!(snap.get(ctx, b"k").unwrap_err().kind(), ErrorKind::NotFound);
    snap.discard(ctx).unwrap();
}

fn check_ranges<S: Store>(store: &S, ctx: &Context) {
    let data: &[(&[u8], &[u8])] = &[(b"key1", b"v1"), (b"key2", b"v2"), (b"key3", b"v3")];
    put_all(store, ctx, data).unwrap();

    let mut snap = store.new_snapshot(ctx).unwrap();
    assert_eq!(drain(&mut snap, ctx, b"", b"", false).unwrap(), owned(data));

    let mut reversed = owned(data);
    reversed.reverse();
    assert_eq!(drain(&mut snap, ctx, b"", b"", true).unwrap(), reversed);

    assert_eq!(
        drain(&mut snap, ctx, b"key1", b"key3", false).unwrap(),
        owned(&data[..2])
    );
    assert_eq!(
        drain(&mut snap, ctx, b"key3", b"key1", false).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    snap.discard(ctx).unwrap();
}

fn check_lifecycle<S: Store>(store: &S, ctx: &Context) {
    let mut txn = store.new_transaction(ctx).unwrap();
    txn.rollback(ctx).unwrap();
    assert_eq!(txn.commit(ctx).unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(txn.get(ctx, b"k").unwrap_err().kind(), ErrorKind::Closed);

    let mut snap = store.new_snapshot(ctx).unwrap();
    snap.discard(ctx).unwrap();
    assert_eq!(snap.discard(ctx).unwrap_err().kind(), ErrorKind::Closed);
}

fn check_empty_key<S: Store>(store: &S, ctx: &Context) {
    let mut txn = store.new_transaction(ctx).unwrap();
    assert_eq!(
        txn.set_bytes(ctx, b"", b"v").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(txn.get(ctx, b"").unwrap_err().kind(), ErrorKind::InvalidArgument);
    txn.rollback(ctx).unwrap();
}

fn check_isolation<S: Store>(store: &S, ctx: &Context) {
    put_all(store, ctx, &[(b"iso", b"old")]).unwrap();

    let mut snap = store.new_snapshot(ctx).unwrap();
    let mut txn = store.new_transaction(ctx).unwrap();
    txn.set_bytes(ctx, b"iso", b"new").unwrap();
    // Uncommitted writes are invisible to others
    assert_eq!(read_value(snap.get(ctx, b"iso").unwrap()), b"old");
    txn.commit(ctx).unwrap();
    // Committed writes after the snapshot was taken are invisible too
    assert_eq!(read_value(snap.get(ctx, b"iso").unwrap()), b"old");
    snap.discard(ctx).unwrap();
}

fn check_write_conflict<S: Store>(store: &S, ctx: &Context) {
    put_all(store, ctx, &[(b"w", b"0")]).unwrap();

    let mut t1 = store.new_transaction(ctx).unwrap();
    let mut t2 = store.new_transaction(ctx).unwrap();
    t1.set_bytes(ctx, b"w", b"1").unwrap();
    t1.commit(ctx).unwrap();

    let second = t2.set_bytes(ctx, b"w", b"2").and_then(|()| t2.commit(ctx));
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);
}

// =============================================================================
// DATABASE
// =============================================================================

#[test]
fn database_point_operations() {
    with_database(check_point_operations::<Database>);
}

#[test]
fn database_ranges() {
    with_database(check_ranges::<Database>);
}

#[test]
fn database_lifecycle() {
    with_database(check_lifecycle::<Database>);
}

#[test]
fn database_empty_key() {
    with_database(check_empty_key::<Database>);
}

#[test]
fn database_isolation() {
    with_database(check_isolation::<Database>);
}

#[test]
fn database_write_conflict() {
    with_database(check_write_conflict::<Database>);
}
