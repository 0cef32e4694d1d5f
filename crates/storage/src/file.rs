//! File manager: creates/opens/extends/flushes raw files of typed,
//! fixed-size blocks.
//!
//! Every `DbFile`'s page 0 self-identifies on open: the first two bytes are
//! the file-type tag and `log2(page_size)`, so a bare path can be reopened
//! without a side-channel telling us what it is.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::{DbError, DbResult};

use crate::page::Page;

/// Tag stored in byte 0 of every `DbFile`'s page 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    HeapData,
    Wal,
    TxnState,
    BTree,
}

impl FileType {
    pub fn tag(self) -> u8 {
        match self {
            FileType::HeapData => 1,
            FileType::Wal => 2,
            FileType::TxnState => 3,
            FileType::BTree => 4,
        }
    }

    pub fn from_tag(tag: u8) -> DbResult<Self> {
        match tag {
            1 => Ok(FileType::HeapData),
            2 => Ok(FileType::Wal),
            3 => Ok(FileType::TxnState),
            4 => Ok(FileType::BTree),
            other => Err(DbError::DataFormat(format!("unknown file type tag {other}"))),
        }
    }
}

/// A typed, page-addressed file on disk.
#[derive(Debug)]
pub struct DbFile {
    path: PathBuf,
    file: File,
    file_type: FileType,
    page_size: usize,
    num_pages: u64,
}

fn page_size_exponent(page_size: usize) -> DbResult<u8> {
    if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
        return Err(DbError::IllegalState(format!(
            "page_size {page_size} must be a power of two in 512..=65536"
        )));
    }
    Ok(page_size.trailing_zeros() as u8)
}

impl DbFile {
    /// Create a new file of the given type and page size. The page-size
    /// must be a power of two in `512..=65536`.
    pub fn create(path: impl AsRef<Path>, file_type: FileType, page_size: usize) -> DbResult<Self> {
        let exponent = page_size_exponent(page_size)?;
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut page0 = vec![0u8; page_size];
        page0[0] = file_type.tag();
        page0[1] = exponent;
        file.write_all(&page0)?;
        file.flush()?;

        Ok(Self {
            path,
            file,
            file_type,
            page_size,
            num_pages: 1,
        })
    }

    /// Open an existing file, reading its self-identifying header. Returns
    /// `Ok(None)` if the path does not exist.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(None);
        }
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; 2];
        file.read_exact(&mut header)?;
        let file_type = FileType::from_tag(header[0])?;
        let page_size = 1usize << header[1];
        page_size_exponent(page_size)?;

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(DbError::DataFormat(format!(
                "file {} length {len} is not a multiple of page size {page_size}",
                path.display()
            )));
        }
        let num_pages = len / page_size as u64;

        Ok(Some(Self {
            path,
            file,
            file_type,
            page_size,
            num_pages,
        }))
    }

    /// Open an existing file, creating it with the given type/page-size if
    /// absent.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        file_type: FileType,
        page_size: usize,
    ) -> DbResult<Self> {
        let path = path.as_ref();
        match Self::open(path)? {
            Some(f) => {
                if f.file_type != file_type {
                    return Err(DbError::TypeMismatch(format!(
                        "{} is a {:?} file, expected {:?}",
                        path.display(),
                        f.file_type,
                        file_type
                    )));
                }
                Ok(f)
            }
            None => Self::create(path, file_type, page_size),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages
    }

    /// Load a page. Reading past end-of-file returns a zero-filled page
    /// without growing the file on disk, unless `create_if_past` is set, in
    /// which case the file is extended with zero pages through `page_no`
    /// and `num_pages` advances.
    pub fn load_page(&mut self, page_no: u64, create_if_past: bool) -> DbResult<Page> {
        if page_no >= self.num_pages {
            if create_if_past {
                self.extend_to(page_no + 1)?;
            }
            return Ok(Page::new(self.file_type, page_no, self.page_size));
        }

        let mut page = Page::new(self.file_type, page_no, self.page_size);
        self.file
            .seek(SeekFrom::Start(page_no * self.page_size as u64))?;
        self.file.read_exact(&mut page.data)?;
        page.sync_old_data();
        Ok(page)
    }

    /// Write a page's bytes back to disk, extending the file if the page is
    /// past the current end.
    pub fn save_page(&mut self, page: &Page) -> DbResult<()> {
        if page.data.len() != self.page_size {
            return Err(DbError::IllegalState(format!(
                "page {} has size {} but file page size is {}",
                page.page_no,
                page.data.len(),
                self.page_size
            )));
        }
        if page.page_no >= self.num_pages {
            self.extend_to(page.page_no + 1)?;
        }
        self.file
            .seek(SeekFrom::Start(page.page_no * self.page_size as u64))?;
        self.file.write_all(&page.data)?;
        Ok(())
    }

    /// fsync the underlying file.
    pub fn sync(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Extend the file with zero pages so that `num_pages >= to`.
    fn extend_to(&mut self, to: u64) -> DbResult<()> {
        if to <= self.num_pages {
            return Ok(());
        }
        self.file
            .set_len(to * self.page_size as u64)
            .map_err(DbError::Io)?;
        self.num_pages = to;
        Ok(())
    }

    /// Allocate one new page at the end of the file and return it
    /// (uninitialized, not yet written).
    pub fn allocate_page(&mut self) -> DbResult<Page> {
        let page_no = self.num_pages;
        self.extend_to(page_no + 1)?;
        Ok(Page::new(self.file_type, page_no, self.page_size))
    }
}
