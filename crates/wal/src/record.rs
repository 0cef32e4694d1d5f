//! The physical-diff record format: every record describes a
//! byte-range change to one page, not the logical operation that caused it,
//! so redo never needs to know what a page's contents mean.

use std::path::PathBuf;

use common::Lsn;
use serde::{Deserialize, Serialize};

/// The payload of one log record.
///
/// `Update` carries both the before- and after-image of the changed byte
/// range so undo can restore the exact prior bytes. `CompensationUpdate` is
/// ARIES's CLR: written while undoing an `Update`, it carries only the
/// before-image (reapplied as the "after" bytes, since undoing means putting
/// the old bytes back) and `undo_next_lsn`, the transaction's next record to
/// undo after this one — skipping whatever this CLR just compensated for, so
/// a crash mid-rollback never re-undoes the same change twice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RecordBody {
    Start,
    Commit,
    Abort,
    Update {
        page_path: PathBuf,
        page_no: u64,
        offset: u32,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    CompensationUpdate {
        page_path: PathBuf,
        page_no: u64,
        offset: u32,
        after: Vec<u8>,
        undo_next_lsn: Option<Lsn>,
    },
}

impl RecordBody {
    /// The bytes redo should write at `(page_path, page_no, offset)`, for
    /// record kinds that touch a page.
    pub fn redo_image(&self) -> Option<(&PathBuf, u64, u32, &[u8])> {
        match self {
            RecordBody::Update {
                page_path,
                page_no,
                offset,
                after,
                ..
            } => Some((page_path, *page_no, *offset, after)),
            RecordBody::CompensationUpdate {
                page_path,
                page_no,
                offset,
                after,
                ..
            } => Some((page_path, *page_no, *offset, after)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct RecordEnvelope {
    pub txn_id: u64,
    pub prev_lsn: Option<Lsn>,
    pub body: RecordBody,
}

/// A record read back from the log, annotated with the LSN it was written
/// at (derived from its file position, never stored in the payload itself).
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: u64,
    pub prev_lsn: Option<Lsn>,
    pub body: RecordBody,
}

/// The minimal contiguous byte range that differs between `old` and `new`,
/// as `(offset, before, after)`. `None` if the slices are identical.
///
/// # Panics
/// Panics if `old.len() != new.len()` — a page never changes size.
pub fn diff_bytes(old: &[u8], new: &[u8]) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    assert_eq!(old.len(), new.len(), "page size must not change");
    let first = old.iter().zip(new).position(|(a, b)| a != b)?;
    let last = old.iter().zip(new).rposition(|(a, b)| a != b)?;
    Some((first as u32, old[first..=last].to_vec(), new[first..=last].to_vec()))
}
