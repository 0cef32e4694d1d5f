//! Buffer manager: an LRU-backed page cache shared by every open file.
//!
//! Two invariants shape this crate:
//! - a pinned page can never be chosen for eviction;
//! - a dirty page must never reach disk (by eviction or explicit flush)
//!   before the WAL bytes describing it are durable — the "WAL rule".
//!
//! The WAL rule is enforced through [`DirtyPageHook`], a seam this crate
//! owns but never implements: the transaction manager is the real
//! implementation, forcing the log before letting a write through. Rather
//! than store a hook inside `BufferManager` ("no implicit global state"),
//! every call site that can trigger a disk
//! write takes the hook as an explicit argument, and [`Pinned`] bundles a
//! `&mut BufferManager` with a `&mut dyn DirtyPageHook` just long enough
//! to hand `storage`'s page-oriented code a [`storage::PagePinner`].

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use common::{DbError, DbResult};
use hashbrown::HashMap;
use lru::LruCache;
use storage::{DbFile, Page, PagePinner};

/// Called immediately before a dirty page's bytes are written to disk,
/// whether by eviction or an explicit flush. Implementations that back a
/// WAL must force it through the page's `page_lsn` here.
pub trait DirtyPageHook {
    fn before_write_dirty_page(&mut self, page: &Page) -> DbResult<()>;
}

/// A hook for buffer managers used without recovery (tests, tools that
/// read a file offline).
pub struct NoWalHook;

impl DirtyPageHook for NoWalHook {
    fn before_write_dirty_page(&mut self, _page: &Page) -> DbResult<()> {
        Ok(())
    }
}

type PageKey = (PathBuf, u64);

/// The shared page cache. Pages from every open file live in one LRU,
/// keyed by `(file path, page number)`.
#[derive(Debug)]
pub struct BufferManager {
    max_pages: usize,
    cache: LruCache<PageKey, Page>,
    open_files: HashMap<PathBuf, DbFile>,
}

impl BufferManager {
    /// # Panics
    /// Panics if `max_pages` is 0.
    pub fn new(max_pages: usize) -> Self {
        assert!(max_pages > 0, "max_pages must be > 0");
        Self {
            max_pages,
            cache: LruCache::new(NonZeroUsize::new(max_pages).unwrap()),
            open_files: HashMap::new(),
        }
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    fn file_mut(&mut self, path: &Path) -> DbResult<&mut DbFile> {
        if !self.open_files.contains_key(path) {
            let file = DbFile::open(path)?
                .ok_or_else(|| DbError::NotFound(path.display().to_string()))?;
            self.open_files.insert(path.to_path_buf(), file);
        }
        Ok(self.open_files.get_mut(path).unwrap())
    }

    fn write_through(&mut self, path: &Path, page: &Page) -> DbResult<()> {
        self.file_mut(path)?.save_page(page)
    }

    /// Evict one unpinned page to make room, flushing it first if dirty.
    /// Pinned pages are cycled back to most-recently-used rather than
    /// evicted. Returns `false` if every cached page is pinned.
    fn evict_one(&mut self, hook: &mut dyn DirtyPageHook) -> DbResult<bool> {
        let attempts = self.cache.len();
        for _ in 0..attempts {
            let Some((key, mut page)) = self.cache.pop_lru() else {
                return Ok(false);
            };
            if page.is_pinned() {
                self.cache.put(key, page);
                continue;
            }
            if page.dirty {
                hook.before_write_dirty_page(&page)?;
                self.write_through(&key.0, &page)?;
                page.dirty = false;
                page.sync_old_data();
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Pin `(path, page_no)`, loading it from disk (making room via
    /// eviction first if the cache is full) and incrementing its pin
    /// count. `extend` requests that the file be grown if `page_no` is
    /// past its current end.
    pub fn pin(
        &mut self,
        path: &Path,
        page_no: u64,
        extend: bool,
        hook: &mut dyn DirtyPageHook,
    ) -> DbResult<()> {
        let key = (path.to_path_buf(), page_no);
        if let Some(page) = self.cache.get_mut(&key) {
            page.pin();
            return Ok(());
        }
        if self.cache.len() >= self.max_pages && !self.evict_one(hook)? {
            return Err(DbError::IllegalState(
                "buffer pool exhausted: every cached page is pinned".into(),
            ));
        }
        let mut page = self.file_mut(path)?.load_page(page_no, extend)?;
        page.pin();
        self.cache.put(key, page);
        Ok(())
    }

    pub fn page_mut(&mut self, path: &Path, page_no: u64) -> DbResult<&mut Page> {
        let key = (path.to_path_buf(), page_no);
        self.cache.get_mut(&key).ok_or_else(|| {
            DbError::IllegalState(format!(
                "page {page_no} of {} is not pinned",
                path.display()
            ))
        })
    }

    /// Unpin `(path, page_no)`, optionally marking it dirty first. Panics
    /// (via `Page::unpin`) if the page was not pinned.
    pub fn unpin(&mut self, path: &Path, page_no: u64, dirty: bool) -> DbResult<()> {
        let key = (path.to_path_buf(), page_no);
        let page = self.cache.get_mut(&key).ok_or_else(|| {
            DbError::IllegalState(format!(
                "page {page_no} of {} is not pinned",
                path.display()
            ))
        })?;
        if dirty {
            page.mark_dirty();
        }
        page.unpin();
        Ok(())
    }

    /// Write every dirty cached page to disk, running `hook` first for
    /// each, then fsync every file touched.
    pub fn flush_all(&mut self, hook: &mut dyn DirtyPageHook) -> DbResult<()> {
        let dirty_keys: Vec<PageKey> = self
            .cache
            .iter()
            .filter(|(_, page)| page.dirty)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &dirty_keys {
            let page = self.cache.peek(key).unwrap().clone();
            hook.before_write_dirty_page(&page)?;
            self.write_through(&key.0, &page)?;
            if let Some(page) = self.cache.get_mut(key) {
                page.dirty = false;
                page.sync_old_data();
            }
        }

        for path in dirty_keys.into_iter().map(|(path, _)| path) {
            self.file_mut(&path)?.sync()?;
        }
        Ok(())
    }
}

/// Binds a buffer manager and a dirty-page hook together for the
/// lifetime of one operation, presenting the combination as a
/// [`storage::PagePinner`]. Construct one per call into `storage`'s
/// page-oriented APIs (heap operations, sequential cursors); it carries
/// no state of its own.
pub struct Pinned<'b, 'h> {
    buffer: &'b mut BufferManager,
    hook: &'h mut dyn DirtyPageHook,
}

impl<'b, 'h> Pinned<'b, 'h> {
    pub fn new(buffer: &'b mut BufferManager, hook: &'h mut dyn DirtyPageHook) -> Self {
        Self { buffer, hook }
    }
}

impl PagePinner for Pinned<'_, '_> {
    fn pin(&mut self, path: &Path, page_no: u64, extend: bool) -> DbResult<()> {
        self.buffer.pin(path, page_no, extend, self.hook)
    }

    fn page_mut(&mut self, path: &Path, page_no: u64) -> DbResult<&mut Page> {
        self.buffer.page_mut(path, page_no)
    }

    fn unpin(&mut self, path: &Path, page_no: u64, dirty: bool) -> DbResult<()> {
        self.buffer.unpin(path, page_no, dirty)
    }
}

#[cfg(test)]
mod tests;
