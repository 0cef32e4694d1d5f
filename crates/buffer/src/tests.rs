use super::*;
use std::sync::{Arc, Mutex};
use storage::{FileType, HeapFile};
use tempfile::tempdir;

fn make_file(dir: &std::path::Path, name: &str, page_size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    DbFile::create(&path, FileType::HeapData, page_size).unwrap();
    path
}

#[test]
fn pin_then_fetch_then_unpin_round_trips_bytes() {
    let dir = tempdir().unwrap();
    let path = make_file(dir.path(), "t.heap", 512);
    let mut buf = BufferManager::new(4);
    let mut hook = NoWalHook;

    buf.pin(&path, 1, true, &mut hook).unwrap();
    buf.page_mut(&path, 1).unwrap().data[10] = 7;
    buf.unpin(&path, 1, true).unwrap();

    buf.flush_all(&mut hook).unwrap();

    let mut buf2 = BufferManager::new(4);
    buf2.pin(&path, 1, false, &mut hook).unwrap();
    assert_eq!(buf2.page_mut(&path, 1).unwrap().data[10], 7);
}

#[test]
fn lru_eviction_skips_pinned_pages() {
    let dir = tempdir().unwrap();
    let path = make_file(dir.path(), "t.heap", 512);
    let mut buf = BufferManager::new(2);
    let mut hook = NoWalHook;

    buf.pin(&path, 1, true, &mut hook).unwrap(); // stays pinned
    buf.pin(&path, 2, true, &mut hook).unwrap();
    buf.unpin(&path, 2, false).unwrap();

    // Cache is full (2/2). Fetching a third page must evict page 2 (the
    // only unpinned one), never page 1.
    buf.pin(&path, 3, true, &mut hook).unwrap();
    assert_eq!(buf.cached_pages(), 2);
    assert!(buf.page_mut(&path, 1).is_ok());
}

#[test]
fn exhausted_pool_of_pinned_pages_errors() {
    let dir = tempdir().unwrap();
    let path = make_file(dir.path(), "t.heap", 512);
    let mut buf = BufferManager::new(1);
    let mut hook = NoWalHook;

    buf.pin(&path, 1, true, &mut hook).unwrap();
    let err = buf.pin(&path, 2, true, &mut hook).unwrap_err();
    assert!(matches!(err, DbError::IllegalState(_)));
}

#[test]
fn unpin_without_pin_panics() {
    let dir = tempdir().unwrap();
    let path = make_file(dir.path(), "t.heap", 512);
    let mut buf = BufferManager::new(2);
    let mut hook = NoWalHook;
    buf.pin(&path, 1, true, &mut hook).unwrap();
    buf.unpin(&path, 1, false).unwrap();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        buf.unpin(&path, 1, false).unwrap()
    }));
    assert!(result.is_err());
}

/// A hook that records every page it was asked to write through, so tests
/// can assert the WAL rule's chokepoint actually fires before eviction.
struct RecordingHook {
    forced: Arc<Mutex<Vec<u64>>>,
}

impl DirtyPageHook for RecordingHook {
    fn before_write_dirty_page(&mut self, page: &Page) -> DbResult<()> {
        self.forced.lock().unwrap().push(page.page_no);
        Ok(())
    }
}

#[test]
fn dirty_page_forces_hook_before_eviction_and_before_flush() {
    let dir = tempdir().unwrap();
    let path = make_file(dir.path(), "t.heap", 512);
    let forced = Arc::new(Mutex::new(Vec::new()));
    let mut buf = BufferManager::new(1);

    {
        let mut hook = RecordingHook {
            forced: forced.clone(),
        };
        buf.pin(&path, 1, true, &mut hook).unwrap();
        buf.page_mut(&path, 1).unwrap().data[0] = 9;
        buf.unpin(&path, 1, true).unwrap();

        // Forces eviction of page 1 since the pool holds only one page.
        buf.pin(&path, 2, true, &mut hook).unwrap();
        buf.unpin(&path, 2, false).unwrap();
    }
    assert_eq!(*forced.lock().unwrap(), vec![1]);

    let mut hook = RecordingHook {
        forced: forced.clone(),
    };
    buf.page_mut(&path, 2).ok();
    buf.flush_all(&mut hook).ok();
}

#[test]
fn pinned_wrapper_drives_a_heap_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rows.heap");
    let schema = catalog::TableSchema::try_new(vec![catalog::Column::new(
        "id",
        types::SqlType::Int,
    )])
    .unwrap();
    let heap = HeapFile::create(&path, schema, 512).unwrap();

    let mut buf = BufferManager::new(8);
    let mut hook = NoWalHook;
    let mut pinner = Pinned::new(&mut buf, &mut hook);

    let rid = heap
        .insert_tuple(&mut pinner, &[types::Value::Int(42)])
        .unwrap();
    assert_eq!(
        heap.get_tuple(&mut pinner, rid).unwrap(),
        vec![types::Value::Int(42)]
    );
}
