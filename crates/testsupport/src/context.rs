//! A disposable on-disk environment for storage/recovery tests: a temp
//! directory, a catalog, a buffer manager, and a transaction manager, all
//! pointed at the same scratch location.

use std::path::PathBuf;

use buffer::BufferManager;
use catalog::Catalog;
use common::{DbResult, WAL_FILE_CEILING};
use tempfile::TempDir;
use txn::TransactionManager;

/// Everything a test needs to drive heap files, WAL, and recovery without
/// hand-rolling the temp-directory/WAL-open/txn-state-open dance every
/// time. Held for the duration of one test; dropping it cleans up the
/// directory.
pub struct TestContext {
    _dir: TempDir,
    pub data_dir: PathBuf,
    pub catalog: Catalog,
    pub buffer: BufferManager,
    pub tm: TransactionManager,
    buffer_pool_pages: usize,
    wal_max_file_size: u32,
}

impl TestContext {
    /// A fresh environment with a 64-page buffer pool and the default WAL
    /// file size.
    pub fn new() -> DbResult<Self> {
        Self::with_buffer_pool(64, common::MAX_WAL_FILE_SIZE)
    }

    /// A fresh environment with a caller-chosen buffer pool size and WAL
    /// file size — useful for forcing rollovers or eviction in a handful
    /// of operations instead of thousands.
    pub fn with_buffer_pool(buffer_pool_pages: usize, wal_max_file_size: u32) -> DbResult<Self> {
        let dir = TempDir::new()?;
        let data_dir = dir.path().to_path_buf();
        let tm = TransactionManager::open(
            data_dir.join("wal"),
            data_dir.join("txn.state"),
            wal_max_file_size,
            WAL_FILE_CEILING,
        )?;
        Ok(Self {
            _dir: dir,
            data_dir,
            catalog: Catalog::new(),
            buffer: BufferManager::new(buffer_pool_pages),
            tm,
            buffer_pool_pages,
            wal_max_file_size,
        })
    }

    /// The path a heap file named `table_name` lives at under this
    /// context's data directory.
    pub fn heap_path(&self, table_name: &str) -> PathBuf {
        self.data_dir.join(format!("{table_name}.heap"))
    }

    /// Reopen the transaction manager and drop the buffer pool, as if the
    /// process had just crashed and restarted — everything in memory is
    /// gone, but the WAL, txn-state file, and heap files on disk survive.
    /// Callers run [`txn::TransactionManager::recover`] against the
    /// result.
    pub fn simulate_restart(&mut self) -> DbResult<()> {
        self.tm = TransactionManager::open(
            self.data_dir.join("wal"),
            self.data_dir.join("txn.state"),
            self.wal_max_file_size,
            WAL_FILE_CEILING,
        )?;
        self.buffer = BufferManager::new(self.buffer_pool_pages);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_a_clean_log() {
        let ctx = TestContext::new().unwrap();
        let (first, next) = ctx.tm.recovery_bounds();
        assert_eq!(first, next);
    }

    #[test]
    fn simulate_restart_reopens_against_same_directory() {
        let mut ctx = TestContext::new().unwrap();
        let before = ctx.data_dir.clone();
        ctx.simulate_restart().unwrap();
        assert_eq!(ctx.data_dir, before);
        assert_eq!(ctx.buffer.cached_pages(), 0);
    }
}
