//! Sequential byte-stream cursor over a `DbFile` (a `DBFileReader`/
//! `DBFileWriter`), and the `PagePinner` seam it crosses to reach whichever
//! cache is managing pages (the buffer manager, in this workspace — kept as
//! a trait here so `storage` does not depend on `buffer`).
//!
//! The cursor holds exactly one page pinned at a time, releasing it before
//! pinning the next, and unpins unconditionally on `close`.
//!
//! Read-only vs. append-extending behavior is chosen once, at construction,
//! via two distinct constructors — never toggled by a mutable flag
//! afterward.

use std::path::{Path, PathBuf};

use common::{DbError, DbResult};

use crate::page::Page;

/// Abstraction a sequential cursor pins pages through. Implemented by the
/// buffer manager; kept here so this crate doesn't need to depend on it.
pub trait PagePinner {
    /// Pin `(path, page_no)`, loading it (creating it if `extend` is set and
    /// the page is past the current end of file) if not already cached.
    fn pin(&mut self, path: &Path, page_no: u64, extend: bool) -> DbResult<()>;

    /// Borrow the page pinned by the most recent `pin` call for `(path,
    /// page_no)`.
    fn page_mut(&mut self, path: &Path, page_no: u64) -> DbResult<&mut Page>;

    /// Unpin `(path, page_no)`, optionally marking it dirty first.
    fn unpin(&mut self, path: &Path, page_no: u64, dirty: bool) -> DbResult<()>;
}

enum Mode {
    Reader,
    Writer { extending: bool },
}

/// A sequential reader or writer over one `DbFile`, keeping exactly one page
/// pinned at a time.
pub struct DbFileCursor<'p> {
    pinner: &'p mut dyn PagePinner,
    path: PathBuf,
    page_size: usize,
    mode: Mode,
    current_page_no: Option<u64>,
    offset_in_page: usize,
    dirtied_current: bool,
}

impl<'p> DbFileCursor<'p> {
    /// Open a read-only cursor positioned at `(start_page_no,
    /// start_offset)`.
    pub fn open_reader(
        pinner: &'p mut dyn PagePinner,
        path: impl Into<PathBuf>,
        page_size: usize,
        start_page_no: u64,
        start_offset: usize,
    ) -> DbResult<Self> {
        let mut cursor = Self {
            pinner,
            path: path.into(),
            page_size,
            mode: Mode::Reader,
            current_page_no: None,
            offset_in_page: 0,
            dirtied_current: false,
        };
        cursor.seek_to(start_page_no, start_offset)?;
        Ok(cursor)
    }

    /// Open an in-place writer: writes must stay within pages that already
    /// exist.
    pub fn open_writer(
        pinner: &'p mut dyn PagePinner,
        path: impl Into<PathBuf>,
        page_size: usize,
        start_page_no: u64,
        start_offset: usize,
    ) -> DbResult<Self> {
        let mut cursor = Self {
            pinner,
            path: path.into(),
            page_size,
            mode: Mode::Writer { extending: false },
            current_page_no: None,
            offset_in_page: 0,
            dirtied_current: false,
        };
        cursor.seek_to(start_page_no, start_offset)?;
        Ok(cursor)
    }

    /// Open an append-extending writer: advancing past the last page
    /// allocates and extends the file.
    pub fn open_extending_writer(
        pinner: &'p mut dyn PagePinner,
        path: impl Into<PathBuf>,
        page_size: usize,
        start_page_no: u64,
        start_offset: usize,
    ) -> DbResult<Self> {
        let mut cursor = Self {
            pinner,
            path: path.into(),
            page_size,
            mode: Mode::Writer { extending: true },
            current_page_no: None,
            offset_in_page: 0,
            dirtied_current: false,
        };
        cursor.seek_to(start_page_no, start_offset)?;
        Ok(cursor)
    }

    fn extending(&self) -> bool {
        matches!(self.mode, Mode::Writer { extending: true })
    }

    fn seek_to(&mut self, page_no: u64, offset: usize) -> DbResult<()> {
        self.release_current()?;
        self.pinner.pin(&self.path, page_no, self.extending())?;
        self.current_page_no = Some(page_no);
        self.offset_in_page = offset;
        Ok(())
    }

    fn release_current(&mut self) -> DbResult<()> {
        if let Some(page_no) = self.current_page_no.take() {
            self.pinner
                .unpin(&self.path, page_no, self.dirtied_current)?;
            self.dirtied_current = false;
        }
        Ok(())
    }

    /// Advance to the next page, pinning it (allocating it first if this is
    /// an extending writer and the page does not yet exist).
    fn advance_page(&mut self) -> DbResult<()> {
        let next = self.current_page_no.expect("cursor not positioned") + 1;
        self.seek_to(next, 0)
    }

    fn remaining_in_page(&self) -> usize {
        self.page_size - self.offset_in_page
    }

    /// Read `len` bytes, crossing page boundaries as needed via a small
    /// staging buffer.
    pub fn read_bytes(&mut self, len: usize) -> DbResult<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let page_no = self.current_page_no.ok_or_else(|| {
                DbError::IllegalState("cursor used after close".into())
            })?;
            let take = (len - out.len()).min(self.remaining_in_page());
            if take == 0 {
                self.advance_page()?;
                continue;
            }
            let page = self.pinner.page_mut(&self.path, page_no)?;
            out.extend_from_slice(&page.data[self.offset_in_page..self.offset_in_page + take]);
            self.offset_in_page += take;
            if self.offset_in_page == self.page_size {
                self.advance_page()?;
            }
        }
        Ok(out)
    }

    /// Write `bytes`, crossing page boundaries (and extending the file, in
    /// extending-writer mode) as needed.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> DbResult<()> {
        if matches!(self.mode, Mode::Reader) {
            return Err(DbError::IllegalState(
                "write attempted on a read-only cursor".into(),
            ));
        }
        let mut written = 0;
        while written < bytes.len() {
            let page_no = self.current_page_no.ok_or_else(|| {
                DbError::IllegalState("cursor used after close".into())
            })?;
            let take = (bytes.len() - written).min(self.remaining_in_page());
            if take == 0 {
                self.advance_page()?;
                continue;
            }
            let page = self.pinner.page_mut(&self.path, page_no)?;
            page.data[self.offset_in_page..self.offset_in_page + take]
                .copy_from_slice(&bytes[written..written + take]);
            self.dirtied_current = true;
            self.offset_in_page += take;
            written += take;
            if self.offset_in_page == self.page_size {
                self.advance_page()?;
            }
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> DbResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn write_u8(&mut self, value: u8) -> DbResult<()> {
        self.write_bytes(&[value])
    }

    pub fn read_u16(&mut self) -> DbResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn write_u16(&mut self, value: u16) -> DbResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn read_i32(&mut self) -> DbResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn write_i32(&mut self, value: i32) -> DbResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn read_i64(&mut self) -> DbResult<i64> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn write_i64(&mut self, value: i64) -> DbResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn read_varstring255(&mut self) -> DbResult<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| DbError::DataFormat(e.to_string()))
    }

    pub fn write_varstring255(&mut self, value: &str) -> DbResult<()> {
        if value.len() > crate::codec::VARSTRING255_MAX || !value.is_ascii() {
            return Err(DbError::TupleTooLarge(
                "VARSTRING255 value must be ASCII and <= 255 bytes".into(),
            ));
        }
        self.write_u8(value.len() as u8)?;
        self.write_bytes(value.as_bytes())
    }

    /// Release the pinned page. This is the only safe way to release the
    /// cursor's final page.
    pub fn close(mut self) -> DbResult<()> {
        self.release_current()
    }
}

impl Drop for DbFileCursor<'_> {
    fn drop(&mut self) {
        let _ = self.release_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{DbFile, FileType};
    use crate::test_support::DirectPinner;
    use tempfile::tempdir;

    #[test]
    fn read_write_straddles_page_boundary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.heap");
        let file = DbFile::create(&path, FileType::HeapData, 16).unwrap();
        let mut pinner = DirectPinner::new(file);

        {
            let mut w =
                DbFileCursor::open_extending_writer(&mut pinner, &path, 16, 1, 14).unwrap();
            w.write_i64(-123456789012345).unwrap();
            w.close().unwrap();
        }
        {
            let mut r = DbFileCursor::open_reader(&mut pinner, &path, 16, 1, 14).unwrap();
            assert_eq!(r.read_i64().unwrap(), -123456789012345);
            r.close().unwrap();
        }
    }

    #[test]
    fn varstring255_round_trips_through_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.heap");
        let file = DbFile::create(&path, FileType::HeapData, 32).unwrap();
        let mut pinner = DirectPinner::new(file);

        {
            let mut w = DbFileCursor::open_extending_writer(&mut pinner, &path, 32, 1, 0).unwrap();
            w.write_varstring255("hello world, this spans pages").unwrap();
            w.close().unwrap();
        }
        {
            let mut r = DbFileCursor::open_reader(&mut pinner, &path, 32, 1, 0).unwrap();
            assert_eq!(
                r.read_varstring255().unwrap(),
                "hello world, this spans pages"
            );
            r.close().unwrap();
        }
    }

    #[test]
    fn read_only_cursor_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.heap");
        let file = DbFile::create(&path, FileType::HeapData, 16).unwrap();
        let mut pinner = DirectPinner::new(file);

        let mut r = DbFileCursor::open_reader(&mut pinner, &path, 16, 0, 2).unwrap();
        assert!(r.write_u8(1).is_err());
    }
}
