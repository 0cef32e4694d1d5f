//! Shared identifiers, error taxonomy, and configuration for the storage and
//! recovery core: file manager, buffer manager, WAL manager, and transaction
//! manager all build on the types in this crate.


use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Identifier for a column within a table schema.
pub type ColumnId = u16;

/// Logical identifier for a page within a single file.
///
/// Examples:
/// - `let freelist_page = PageId(0);`
/// - `let data_page = PageId(42);`
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct PageId(pub u64);

/// Logical identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TableId(pub u64);

/// Fully-qualified pointer to a tuple: a page plus a slot within it.
///
/// Examples:
/// - `let rid = RecordId { page_id: PageId(42), slot: 3 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

/// A totally-ordered position within the write-ahead log.
///
/// Ordered lexicographically by `(file_no, offset)` — field declaration
/// order matches that rule, so the derived `Ord` is correct as-is.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Lsn {
    pub file_no: u16,
    pub offset: u32,
}

impl Lsn {
    pub const fn new(file_no: u16, offset: u32) -> Self {
        Self { file_no, offset }
    }
}

impl std::fmt::Display for Lsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.file_no, self.offset)
    }
}

/// A WAL file spans at most this many bytes before the writer rolls to a new
/// file.
pub const MAX_WAL_FILE_SIZE: u32 = 10 * 1024 * 1024;

/// Records begin at this offset in every WAL file; bytes `[0, 2)` are the
/// generic `DBFile` type/page-size header, bytes `[2, 6)` hold the previous
/// WAL file's last-record end offset.
pub const OFFSET_FIRST_RECORD: u32 = 6;

/// `file_no` wraps modulo this ceiling.
pub const WAL_FILE_CEILING: u32 = 1 << 16;

/// Canonical error taxonomy shared across the storage and recovery core.
#[derive(Error, Debug)]
pub enum DbError {
    /// Underlying read/write/sync failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// File or page does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A file's type tag did not match what the caller expected.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// A corrupted record: unknown type byte, impossible offset, a
    /// transition across the wrong WAL file. Fatal during recovery.
    #[error("data format: {0}")]
    DataFormat(String),
    /// A dangling or empty-slot file pointer.
    #[error("invalid file pointer: {0}")]
    InvalidFilePointer(String),
    /// An update could not fit in the page; tuple relocation is a non-goal.
    #[error("page full on update: {0}")]
    PageFullOnUpdate(String),
    /// A requested insert exceeds page capacity.
    #[error("tuple too large: {0}")]
    TupleTooLarge(String),
    /// API misuse, e.g. logging a page write without an active transaction.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// Catalog-level failure (unknown table/column, schema violation).
    #[error("catalog: {0}")]
    Catalog(String),
    /// A lower-level storage failure not covered by a more specific kind.
    #[error("storage: {0}")]
    Storage(String),
    /// A WAL-specific failure not covered by a more specific kind.
    #[error("wal: {0}")]
    Wal(String),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage and recovery core.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(8192)
///     .buffer_pool_pages(512)
///     .wal_enabled(true)
///     .build();
/// ```
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table data, catalog metadata, and WAL files live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes. Must be a power of two in
    /// `512..=65536`; validated by `Config::validate`.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of pages the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Controls whether the write-ahead log is enabled.
    #[builder(default = true)]
    pub wal_enabled: bool,
    /// Maximum size, in bytes, of a single WAL file before rolling over.
    #[builder(default = MAX_WAL_FILE_SIZE)]
    pub wal_max_file_size: u32,
    /// Ceiling `file_no` wraps modulo.
    #[builder(default = WAL_FILE_CEILING)]
    pub wal_file_ceiling: u32,
}

impl Config {
    /// Checks the invariants placed on page size.
    pub fn validate(&self) -> DbResult<()> {
        if !(512..=65536).contains(&self.page_size) || !self.page_size.is_power_of_two() {
            return Err(DbError::IllegalState(format!(
                "page_size {} must be a power of two in 512..=65536",
                self.page_size
            )));
        }
        if self.buffer_pool_pages == 0 {
            return Err(DbError::IllegalState(
                "buffer_pool_pages must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_pages: 256,
            wal_enabled: true,
            wal_max_file_size: MAX_WAL_FILE_SIZE,
            wal_file_ceiling: WAL_FILE_CEILING,
        }
    }
}
