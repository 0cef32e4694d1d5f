//! The transaction manager: page-write logging, commit, rollback, and the
//! redo-then-undo recovery driver.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use buffer::{BufferManager, DirtyPageHook, Pinned};
use common::{DbError, DbResult, Lsn};
use hashbrown::{HashMap, HashSet};
use storage::{Page, PagePinner};
use wal::{diff_bytes, RecordBody, WalManager};

use crate::state_file::{TxnStateContents, TxnStateFile};

/// A transaction's session-local bookkeeping.
///
/// Held by the caller, never by `TransactionManager` — passing it explicitly
/// to every call is what keeps transaction state out of a thread-local or a
/// global.
#[derive(Debug)]
pub struct TransactionHandle {
    pub txn_id: u64,
    pub in_progress: bool,
    pub last_lsn: Option<Lsn>,
    pub logged_start: bool,
}

/// What recovery found and did, for callers (tests, operators) that want to
/// inspect the outcome rather than just trust it happened.
#[derive(Debug, Clone, Default)]
pub struct RecoveryInfo {
    pub first_lsn: Option<Lsn>,
    pub next_lsn: Option<Lsn>,
    /// Transactions recovery rolled back because they never committed.
    pub rolled_back: HashSet<u64>,
    /// Transactions recovery found already complete (committed or aborted).
    pub completed: HashSet<u64>,
}

impl RecoveryInfo {
    fn clean(first_lsn: Lsn) -> Self {
        Self {
            first_lsn: Some(first_lsn),
            next_lsn: Some(first_lsn),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct ManagerState {
    next_txn_id: u64,
    first_lsn: Lsn,
    next_lsn: Lsn,
}

/// Owns the write-ahead log and the durable txn-state file, and is the one
/// place in this workspace that understands the relationship between them:
/// no dirty page may reach disk before the WAL bytes through its `page_lsn`
/// are forced, and `nextLsn` in the txn-state file may only ever advance to
/// an LSN already forced.
///
/// Every method takes `&self`, matching [`wal::WalManager`]'s own style —
/// this manager is meant to be shared across however many concurrently
/// active transactions a caller runs.
#[derive(Debug)]
pub struct TransactionManager {
    wal: WalManager,
    state_file: TxnStateFile,
    inner: Mutex<ManagerState>,
}

impl TransactionManager {
    /// Open (or initialize) the WAL directory and txn-state file.
    pub fn open(
        wal_dir: impl AsRef<Path>,
        state_path: impl AsRef<Path>,
        wal_max_file_size: u32,
        wal_file_ceiling: u32,
    ) -> DbResult<Self> {
        let wal = WalManager::open(wal_dir, wal_max_file_size, wal_file_ceiling)?;
        let genesis = wal.earliest_lsn()?;
        let (state_file, contents) = TxnStateFile::open_or_init(state_path, genesis)?;
        Ok(Self {
            wal,
            state_file,
            inner: Mutex::new(ManagerState {
                next_txn_id: contents.next_txn_id,
                first_lsn: contents.first_lsn,
                next_lsn: contents.next_lsn,
            }),
        })
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    /// The durable `(firstLsn, nextLsn)` bounds recovery would use right now.
    pub fn recovery_bounds(&self) -> (Lsn, Lsn) {
        let st = self.inner.lock().unwrap();
        (st.first_lsn, st.next_lsn)
    }

    fn persist_locked(&self, st: &ManagerState) -> DbResult<()> {
        self.state_file.write(&TxnStateContents {
            next_txn_id: st.next_txn_id,
            first_lsn: st.first_lsn,
            next_lsn: st.next_lsn,
        })
    }

    /// Begin a new transaction. Nothing is logged yet — `START_TXN` is
    /// written lazily by the first call to [`Self::write_update_page_record`]
    /// (a read-only transaction never touches the log).
    pub fn begin(&self) -> DbResult<TransactionHandle> {
        let mut st = self.inner.lock().unwrap();
        let txn_id = st.next_txn_id;
        st.next_txn_id += 1;
        self.persist_locked(&st)?;
        Ok(TransactionHandle {
            txn_id,
            in_progress: true,
            last_lsn: None,
            logged_start: false,
        })
    }

    fn ensure_started(&self, handle: &mut TransactionHandle) -> DbResult<()> {
        if handle.logged_start {
            return Ok(());
        }
        let lsn = self.wal.append(handle.txn_id, None, RecordBody::Start)?;
        handle.last_lsn = Some(lsn);
        handle.logged_start = true;
        Ok(())
    }

    /// Log `page`'s current dirty bytes as an `UPDATE_PAGE` record, set its
    /// `page_lsn`, and resync `old_data`.
    /// A no-op if `page.data` hasn't actually changed since the last time it
    /// was logged.
    ///
    /// # Errors
    /// `DbError::IllegalState` if `page.dirty` is false.
    pub fn write_update_page_record(
        &self,
        handle: &mut TransactionHandle,
        path: &Path,
        page: &mut Page,
    ) -> DbResult<()> {
        if !page.dirty {
            return Err(DbError::IllegalState(
                "write_update_page_record called on a clean page".into(),
            ));
        }
        let Some((offset, before, after)) = diff_bytes(&page.old_data, &page.data) else {
            return Ok(());
        };
        self.ensure_started(handle)?;
        let lsn = self.wal.append(
            handle.txn_id,
            handle.last_lsn,
            RecordBody::Update {
                page_path: path.to_path_buf(),
                page_no: page.page_no,
                offset,
                before,
                after,
            },
        )?;
        page.page_lsn = Some(lsn);
        page.sync_old_data();
        handle.last_lsn = Some(lsn);
        Ok(())
    }

    /// Force the WAL through `upto`, then durably record `nextLsn` if it
    /// advanced. This is the only path by which
    /// the txn-state file's `nextLsn` moves forward.
    ///
    /// `nextLsn` is published as the durability boundary `force` actually
    /// achieved, not `upto` itself: `upto` is a record's own start LSN (a
    /// `page_lsn` or a just-appended record's LSN), and publishing that
    /// directly would make redo's exclusive upper bound exclude the very
    /// record this call just forced durable.
    pub fn force_wal(&self, upto: Lsn) -> DbResult<()> {
        let synced_through = self.wal.force(upto)?;
        let mut st = self.inner.lock().unwrap();
        if synced_through > st.next_lsn {
            st.next_lsn = synced_through;
            self.persist_locked(&st)?;
        }
        Ok(())
    }

    /// Commit: emit `COMMIT_TXN`, force the WAL through it, and mark the
    /// handle no longer in progress.
    pub fn commit(&self, handle: &mut TransactionHandle) -> DbResult<()> {
        if !handle.in_progress {
            return Err(DbError::IllegalState("commit on a finished transaction".into()));
        }
        if !handle.logged_start {
            // Never wrote anything: nothing to force, nothing to commit.
            handle.in_progress = false;
            return Ok(());
        }
        let lsn = self.wal.append(handle.txn_id, handle.last_lsn, RecordBody::Commit)?;
        handle.last_lsn = Some(lsn);
        self.force_wal(lsn)?;
        handle.in_progress = false;
        Ok(())
    }

    /// Roll back: walk `handle.last_lsn` backward via `prev_lsn`, undoing
    /// each `UPDATE_PAGE` record by writing its `before` image back and
    /// logging a compensation record, then emit `ABORT_TXN`. `pinner` should be
    /// a raw buffer-backed pinner, not a
    /// [`LoggingPinner`] — undo logs its own compensation records by hand.
    pub fn rollback(
        &self,
        handle: &mut TransactionHandle,
        pinner: &mut dyn PagePinner,
    ) -> DbResult<()> {
        if !handle.in_progress {
            return Err(DbError::IllegalState("rollback on a finished transaction".into()));
        }
        if !handle.logged_start {
            handle.in_progress = false;
            return Ok(());
        }
        let mut cursor = handle.last_lsn;
        while let Some(lsn) = cursor {
            let rec = self.wal.read_record(lsn)?;
            match rec.body {
                RecordBody::Start => break,
                RecordBody::Update {
                    page_path,
                    page_no,
                    offset,
                    before,
                    ..
                } => {
                    let clr_lsn = self.wal.append(
                        handle.txn_id,
                        handle.last_lsn,
                        RecordBody::CompensationUpdate {
                            page_path: page_path.clone(),
                            page_no,
                            offset,
                            after: before.clone(),
                            undo_next_lsn: rec.prev_lsn,
                        },
                    )?;
                    apply_physical_update(pinner, &page_path, page_no, offset, &before, clr_lsn)?;
                    handle.last_lsn = Some(clr_lsn);
                    cursor = rec.prev_lsn;
                }
                RecordBody::CompensationUpdate { .. } => {
                    return Err(DbError::IllegalState(format!(
                        "rollback encountered a CLR in txn {}'s own chain",
                        handle.txn_id
                    )));
                }
                RecordBody::Commit | RecordBody::Abort => {
                    return Err(DbError::IllegalState(format!(
                        "rollback encountered a terminal record mid-chain for txn {}",
                        handle.txn_id
                    )));
                }
            }
        }
        let abort_lsn = self.wal.append(handle.txn_id, handle.last_lsn, RecordBody::Abort)?;
        handle.last_lsn = Some(abort_lsn);
        self.force_wal(abort_lsn)?;
        handle.in_progress = false;
        Ok(())
    }

    /// Crash recovery: redo everything from `firstLsn` up to
    /// (not including) `nextLsn`, then undo whichever transactions never
    /// reached `COMMIT_TXN`/`ABORT_TXN`, then force the WAL and flush every
    /// touched page before advancing `firstLsn` to `nextLsn`.
    ///
    /// A no-op, returning the clean bounds, if `firstLsn == nextLsn`.
    pub fn recover(&self, buffer: &mut BufferManager) -> DbResult<RecoveryInfo> {
        let (first_lsn, next_lsn) = self.recovery_bounds();
        if first_lsn == next_lsn {
            return Ok(RecoveryInfo::clean(first_lsn));
        }
        tracing::info!(%first_lsn, %next_lsn, "recovery: starting redo pass");

        let mut info = RecoveryInfo {
            first_lsn: Some(first_lsn),
            next_lsn: Some(next_lsn),
            ..Default::default()
        };

        {
            let mut hook = WalForcingHook(self);
            let mut pinner = Pinned::new(buffer, &mut hook);

            let mut last_lsn_of: HashMap<u64, Lsn> = HashMap::new();
            for rec in self.wal.scan_forward(first_lsn)? {
                if rec.lsn >= next_lsn {
                    break;
                }
                match &rec.body {
                    RecordBody::Start => {
                        last_lsn_of.insert(rec.txn_id, rec.lsn);
                    }
                    RecordBody::Update { .. } | RecordBody::CompensationUpdate { .. } => {
                        if let Some((path, page_no, offset, after)) = rec.body.redo_image() {
                            apply_physical_update(&mut pinner, path, page_no, offset, after, rec.lsn)?;
                        }
                        last_lsn_of.insert(rec.txn_id, rec.lsn);
                    }
                    RecordBody::Commit | RecordBody::Abort => {
                        last_lsn_of.remove(&rec.txn_id);
                        info.completed.insert(rec.txn_id);
                    }
                }
            }

            tracing::info!(incomplete = last_lsn_of.len(), "recovery: redo complete, starting undo");

            let mut cursors: HashMap<u64, Option<Lsn>> =
                last_lsn_of.into_iter().map(|(id, lsn)| (id, Some(lsn))).collect();
            info.rolled_back = cursors.keys().copied().collect();

            loop {
                let next = cursors
                    .iter()
                    .filter_map(|(&id, &lsn)| lsn.map(|l| (l, id)))
                    .max();
                let Some((lsn, txn_id)) = next else { break };
                let rec = self.wal.read_record(lsn)?;
                match rec.body {
                    RecordBody::Start => {
                        let abort_lsn = self.wal.append(txn_id, Some(lsn), RecordBody::Abort)?;
                        self.force_wal(abort_lsn)?;
                        cursors.insert(txn_id, None);
                    }
                    RecordBody::Update {
                        page_path,
                        page_no,
                        offset,
                        before,
                        ..
                    } => {
                        let clr_lsn = self.wal.append(
                            txn_id,
                            Some(lsn),
                            RecordBody::CompensationUpdate {
                                page_path: page_path.clone(),
                                page_no,
                                offset,
                                after: before.clone(),
                                undo_next_lsn: rec.prev_lsn,
                            },
                        )?;
                        apply_physical_update(&mut pinner, &page_path, page_no, offset, &before, clr_lsn)?;
                        cursors.insert(txn_id, rec.prev_lsn);
                    }
                    RecordBody::CompensationUpdate { undo_next_lsn, .. } => {
                        cursors.insert(txn_id, undo_next_lsn);
                    }
                    RecordBody::Commit | RecordBody::Abort => {
                        return Err(DbError::DataFormat(format!(
                            "recovery undo encountered a terminal record mid-chain for txn {txn_id}"
                        )));
                    }
                }
            }
        }

        self.force_wal(next_lsn)?;
        let mut flush_hook = WalForcingHook(self);
        buffer.flush_all(&mut flush_hook)?;

        {
            let mut st = self.inner.lock().unwrap();
            st.first_lsn = next_lsn;
            self.persist_locked(&st)?;
        }
        info.first_lsn = Some(next_lsn);
        tracing::info!("recovery: complete");
        Ok(info)
    }
}

/// Write `bytes` at `(path, page_no, offset)`, stamp `page_lsn`, and resync
/// `old_data` — the one physical operation both redo and undo reduce to.
/// Writing the exact target bytes (rather than diffing) is what makes this
/// idempotent no matter how many times a crash replays the same record.
fn apply_physical_update(
    pinner: &mut dyn PagePinner,
    path: &Path,
    page_no: u64,
    offset: u32,
    bytes: &[u8],
    lsn: Lsn,
) -> DbResult<()> {
    pinner.pin(path, page_no, true)?;
    {
        let page = pinner.page_mut(path, page_no)?;
        let start = offset as usize;
        page.data[start..start + bytes.len()].copy_from_slice(bytes);
        page.page_lsn = Some(lsn);
        page.sync_old_data();
        page.mark_dirty();
    }
    pinner.unpin(path, page_no, true)
}

/// Presents a [`TransactionManager`] as a [`buffer::DirtyPageHook`]: forces
/// the WAL through a page's `page_lsn` before the buffer manager is allowed
/// to write it out, which is the WAL rule in its entirety.
pub struct WalForcingHook<'a>(pub &'a TransactionManager);

impl DirtyPageHook for WalForcingHook<'_> {
    fn before_write_dirty_page(&mut self, page: &Page) -> DbResult<()> {
        match page.page_lsn {
            Some(lsn) => self.0.force_wal(lsn),
            None => Ok(()),
        }
    }
}

/// Wraps a [`PagePinner`] so every dirty `unpin` is logged through
/// [`TransactionManager::write_update_page_record`] first, exactly the way
/// [`buffer::Pinned`] wraps a [`BufferManager`] — generalizing the same
/// "bind two collaborators for the duration of one call" pattern to add a
/// second cross-cutting concern (WAL logging) without `storage` knowing this
/// crate exists.
pub struct LoggingPinner<'p, 'h, 't> {
    inner: &'p mut dyn PagePinner,
    tm: &'t TransactionManager,
    handle: &'h mut TransactionHandle,
}

impl<'p, 'h, 't> LoggingPinner<'p, 'h, 't> {
    pub fn new(
        inner: &'p mut dyn PagePinner,
        tm: &'t TransactionManager,
        handle: &'h mut TransactionHandle,
    ) -> Self {
        Self { inner, tm, handle }
    }
}

impl PagePinner for LoggingPinner<'_, '_, '_> {
    fn pin(&mut self, path: &Path, page_no: u64, extend: bool) -> DbResult<()> {
        self.inner.pin(path, page_no, extend)
    }

    fn page_mut(&mut self, path: &Path, page_no: u64) -> DbResult<&mut Page> {
        self.inner.page_mut(path, page_no)
    }

    fn unpin(&mut self, path: &Path, page_no: u64, dirty: bool) -> DbResult<()> {
        if dirty {
            let page = self.inner.page_mut(path, page_no)?;
            if page.dirty {
                self.tm.write_update_page_record(self.handle, path, page)?;
            }
        }
        self.inner.unpin(path, page_no, dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffer::BufferManager;
    use storage::{FileType, Page as StoragePage};
    use tempfile::tempdir;

    fn fresh_manager(dir: &Path) -> TransactionManager {
        TransactionManager::open(
            dir.join("wal"),
            dir.join("txn.state"),
            1024 * 1024,
            65536,
        )
        .unwrap()
    }

    fn make_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        storage::DbFile::create(&path, FileType::HeapData, 64).unwrap();
        path
    }

    #[test]
    fn begin_does_not_log_until_first_write() {
        let dir = tempdir().unwrap();
        let tm = fresh_manager(dir.path());
        let handle = tm.begin().unwrap();
        assert!(!handle.logged_start);
        let (first, next) = tm.recovery_bounds();
        assert_eq!(first, next);
    }

    #[test]
    fn write_update_page_record_logs_and_stamps_lsn() {
        let dir = tempdir().unwrap();
        let tm = fresh_manager(dir.path());
        let mut handle = tm.begin().unwrap();

        let mut page = StoragePage::new(FileType::HeapData, 0, 64);
        page.data[0] = 9;
        page.mark_dirty();
        tm.write_update_page_record(&mut handle, Path::new("t.heap"), &mut page)
            .unwrap();

        assert!(handle.logged_start);
        assert!(page.page_lsn.is_some());
        assert_eq!(page.old_data, page.data);
    }

    #[test]
    fn commit_forces_wal_and_advances_next_lsn() {
        let dir = tempdir().unwrap();
        let tm = fresh_manager(dir.path());
        let mut handle = tm.begin().unwrap();

        let mut page = StoragePage::new(FileType::HeapData, 0, 64);
        page.data[0] = 1;
        page.mark_dirty();
        tm.write_update_page_record(&mut handle, Path::new("t.heap"), &mut page)
            .unwrap();
        let commit_lsn = {
            tm.commit(&mut handle).unwrap();
            handle.last_lsn.unwrap()
        };

        assert!(!handle.in_progress);
        let (first, next) = tm.recovery_bounds();
        assert!(next > first);
        // next_lsn must land strictly past the commit record itself, or
        // redo's exclusive upper bound would skip the commit on recovery.
        assert!(next > commit_lsn);
    }

    #[test]
    fn rollback_restores_before_image_and_emits_clr() {
        let dir = tempdir().unwrap();
        let tm = fresh_manager(dir.path());
        let path = make_file(dir.path(), "t.heap");

        let mut buffer = BufferManager::new(8);
        let mut handle = tm.begin().unwrap();

        {
            let mut hook = WalForcingHook(&tm);
            let mut pinned = Pinned::new(&mut buffer, &mut hook);
            let mut logger = LoggingPinner::new(&mut pinned, &tm, &mut handle);
            logger.pin(&path, 0, false).unwrap();
            {
                let page = logger.page_mut(&path, 0).unwrap();
                page.data[0] = 77;
                page.mark_dirty();
            }
            logger.unpin(&path, 0, true).unwrap();
        }

        {
            let mut hook = WalForcingHook(&tm);
            let mut pinned = Pinned::new(&mut buffer, &mut hook);
            tm.rollback(&mut handle, &mut pinned).unwrap();
        }

        let mut hook = WalForcingHook(&tm);
        let mut pinned = Pinned::new(&mut buffer, &mut hook);
        pinned.pin(&path, 0, false).unwrap();
        let page = pinned.page_mut(&path, 0).unwrap();
        assert_eq!(page.data[0], 0);
        pinned.unpin(&path, 0, false).unwrap();
    }

    #[test]
    fn recover_is_noop_on_clean_log() {
        let dir = tempdir().unwrap();
        let tm = fresh_manager(dir.path());
        let mut buffer = BufferManager::new(8);
        let info = tm.recover(&mut buffer).unwrap();
        assert_eq!(info.first_lsn, info.next_lsn);
        assert!(info.rolled_back.is_empty());
    }
}
