//! Closure API checks

use pgkv::{with_read_writer, with_reader, Error, ErrorKind};

use crate::common::{read_value, with_database};

#[test]
fn read_writer_commits_and_returns_value() {
    with_database(|db, ctx| {
        let written = with_read_writer(db, ctx, |txn| {
            txn.set_bytes(ctx, b"a", b"1")?;
            Ok("done")
        })
        .unwrap();
        assert_eq!(written, "done");

        let value = with_reader(db, ctx, |snap| snap.get(ctx, b"a").map(read_value)).unwrap();
        assert_eq!(value, b"1");
    });
}

#[test]
fn read_writer_rolls_back_closure_errors() {
    with_database(|db, ctx| {
        let err = with_read_writer(db, ctx, |txn| -> pgkv::Result<()> {
            txn.set_bytes(ctx, b"a", b"1")?;
            Err(Error::invalid_argument("caller gave up"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let missing = with_reader(db, ctx, |snap| snap.get(ctx, b"a").map(read_value)).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    });
}
