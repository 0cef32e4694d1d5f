//! In-memory image of one block.

use common::Lsn;

use crate::file::FileType;

/// An in-memory image of one on-disk page.
///
/// Invariants:
/// - a page with `pin_count > 0` must not be evicted;
/// - a page with `dirty == true` must not be written to disk until the WAL
///   has been forced through `page_lsn`;
/// - `old_data` equals the last image synchronized with the WAL.
#[derive(Debug, Clone)]
pub struct Page {
    pub file_type: FileType,
    pub page_no: u64,
    pub data: Vec<u8>,
    pub old_data: Vec<u8>,
    pub dirty: bool,
    pub pin_count: u32,
    pub page_lsn: Option<Lsn>,
}

impl Page {
    pub fn new(file_type: FileType, page_no: u64, page_size: usize) -> Self {
        let data = vec![0u8; page_size];
        let old_data = data.clone();
        Self {
            file_type,
            page_no,
            data,
            old_data,
            dirty: false,
            pin_count: 0,
            page_lsn: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn pin(&mut self) {
        self.pin_count += 1;
    }

    /// Decrements the pin count. Panics if unbalanced — every pin must be
    /// matched by exactly one unpin.
    pub fn unpin(&mut self) {
        self.pin_count = self
            .pin_count
            .checked_sub(1)
            .expect("unpin called more times than pin");
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Resynchronize `old_data` with `data`, as done whenever a WAL record
    /// describing the page's current bytes has been durably emitted.
    pub fn sync_old_data(&mut self) {
        self.old_data.copy_from_slice(&self.data);
    }
}
