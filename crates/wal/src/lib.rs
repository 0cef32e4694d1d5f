//! Write-ahead log for crash recovery.
//!
//! Unlike a logical WAL that records "insert row X into table Y", every
//! record here is a physical byte-range diff against one page: `before`
//! and `after` images at `(page_path, page_no, offset)`. Redo never
//! interprets a record — it just compares the target page's `page_lsn`
//! against the record's own LSN and reapplies `after` if stale, which is
//! what makes redo idempotent across however many times a crash replays
//! the same record. Undo runs the same diffs backward, writing a
//! [`record::RecordBody::CompensationUpdate`] (a CLR) for each one so a
//! second crash mid-rollback never redoes work already undone.
//!
//! The log itself is a sequence of files (`wal-00000.log`, `wal-00001.log`,
//! ...) rather than one ever-growing file, so recovery never has to
//! scan further back than the oldest page still dirty in the buffer pool.
//! [`Lsn`](common::Lsn) addresses a record as `(file_no, offset)`.

mod manager;
mod record;

pub use manager::WalManager;
pub use record::{diff_bytes, LogRecord, RecordBody};
