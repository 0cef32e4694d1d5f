//! Test-only `PagePinner` backed directly by a `DbFile`, so `storage`'s own
//! tests can exercise cursor/heap code without depending on the buffer
//! crate (which itself depends on `storage`).

use std::path::Path;

use common::{DbError, DbResult};
use hashbrown::HashMap;

use crate::file::DbFile;
use crate::page::Page;
use crate::PagePinner;

pub(crate) struct DirectPinner {
    file: DbFile,
    cache: HashMap<u64, Page>,
}

impl DirectPinner {
    pub(crate) fn new(file: DbFile) -> Self {
        Self {
            file,
            cache: HashMap::new(),
        }
    }
}

impl PagePinner for DirectPinner {
    fn pin(&mut self, _path: &Path, page_no: u64, extend: bool) -> DbResult<()> {
        if !self.cache.contains_key(&page_no) {
            let page = self.file.load_page(page_no, extend)?;
            self.cache.insert(page_no, page);
        }
        Ok(())
    }

    fn page_mut(&mut self, _path: &Path, page_no: u64) -> DbResult<&mut Page> {
        self.cache
            .get_mut(&page_no)
            .ok_or_else(|| DbError::IllegalState(format!("page {page_no} not pinned")))
    }

    fn unpin(&mut self, _path: &Path, page_no: u64, dirty: bool) -> DbResult<()> {
        if dirty
            && let Some(page) = self.cache.get(&page_no)
        {
            self.file.save_page(page)?;
        }
        Ok(())
    }
}
