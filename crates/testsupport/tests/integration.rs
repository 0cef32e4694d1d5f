//! Exercises `TestContext` and the fixtures end to end: insert through a
//! transaction, commit, simulate a crash, and confirm recovery brings the
//! heap file back to the committed state.

use buffer::Pinned;
use storage::HeapFile;
use testsupport::assertions::{assert_recovered_clean, assert_tuples_eq};
use testsupport::context::TestContext;
use testsupport::fixtures::{data, schemas};
use txn::{LoggingPinner, WalForcingHook};

#[test]
fn insert_commit_then_recover_after_restart() {
    let mut ctx = TestContext::new().unwrap();
    let table_path = ctx.heap_path("users");
    let heap = HeapFile::create(&table_path, schemas::users_schema(), 4096).unwrap();

    let mut handle = ctx.tm.begin().unwrap();
    {
        let mut hook = WalForcingHook(&ctx.tm);
        let mut pinned = Pinned::new(&mut ctx.buffer, &mut hook);
        let mut logger = LoggingPinner::new(&mut pinned, &ctx.tm, &mut handle);
        for row in data::sample_users() {
            heap.insert_tuple(&mut logger, &row).unwrap();
        }
    }
    ctx.tm.commit(&mut handle).unwrap();

    // Drop every in-memory page (losing whatever never made it to disk) and
    // reopen the transaction manager, the way a crashed process would.
    ctx.simulate_restart().unwrap();
    let info = ctx.tm.recover(&mut ctx.buffer).unwrap();
    assert!(info.rolled_back.is_empty());
    let (first, next) = ctx.tm.recovery_bounds();
    assert_recovered_clean(first, next);

    let mut hook = WalForcingHook(&ctx.tm);
    let mut pinned = Pinned::new(&mut ctx.buffer, &mut hook);
    let mut rows = Vec::new();
    let mut cursor = heap.first_tuple(&mut pinned).unwrap();
    while let Some(rid) = cursor {
        rows.push(heap.get_tuple(&mut pinned, rid).unwrap());
        cursor = heap.next_tuple(&mut pinned, rid).unwrap();
    }
    assert_tuples_eq(&rows, &data::sample_users());
}

#[test]
fn uncommitted_insert_is_undone_by_recovery() {
    let mut ctx = TestContext::new().unwrap();
    let table_path = ctx.heap_path("products");
    let heap = HeapFile::create(&table_path, schemas::products_schema(), 4096).unwrap();

    let mut handle = ctx.tm.begin().unwrap();
    {
        let mut hook = WalForcingHook(&ctx.tm);
        let mut pinned = Pinned::new(&mut ctx.buffer, &mut hook);
        let mut logger = LoggingPinner::new(&mut pinned, &ctx.tm, &mut handle);
        heap.insert_tuple(&mut logger, &data::sample_products()[0]).unwrap();
    }
    // Crash before commit: the transaction never reached COMMIT_TXN.
    ctx.simulate_restart().unwrap();
    let info = ctx.tm.recover(&mut ctx.buffer).unwrap();
    assert_eq!(info.rolled_back.len(), 1);
    assert!(info.rolled_back.contains(&handle.txn_id));

    let mut hook = WalForcingHook(&ctx.tm);
    let mut pinned = Pinned::new(&mut ctx.buffer, &mut hook);
    assert!(heap.first_tuple(&mut pinned).unwrap().is_none());
}
