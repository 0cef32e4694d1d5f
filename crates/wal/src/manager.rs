use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use common::{DbError, DbResult, Lsn, OFFSET_FIRST_RECORD};

use crate::record::{LogRecord, RecordBody, RecordEnvelope};

fn file_name(file_no: u16) -> String {
    format!("wal-{file_no:05}.log")
}

fn existing_file_nos(dir: &Path) -> DbResult<Vec<u16>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(n) = name
            .strip_prefix("wal-")
            .and_then(|s| s.strip_suffix(".log"))
            .and_then(|s| s.parse::<u16>().ok())
        {
            out.push(n);
        }
    }
    out.sort_unstable();
    Ok(out)
}

/// Bytes `[0, 2)` are the generic `DBFile`-style type tag (byte 1 is unused
/// since WAL files have no fixed page size); bytes `[2, 6)` record the
/// previous file's last-record end offset, so recovery can notice a
/// truncated rollover.
fn create_wal_file(path: &Path, prev_file_last_offset: u32) -> DbResult<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut header = [0u8; OFFSET_FIRST_RECORD as usize];
    header[0] = storage::FileType::Wal.tag();
    header[2..6].copy_from_slice(&prev_file_last_offset.to_be_bytes());
    file.write_all(&header)?;
    file.flush()?;
    Ok(file)
}

fn read_record_forward(file: &mut File, file_no: u16, offset: &mut u32) -> DbResult<LogRecord> {
    let record_start = *offset;
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);

    let mut payload = vec![0u8; len as usize];
    file.read_exact(&mut payload)?;

    let mut trailer = [0u8; 4];
    file.read_exact(&mut trailer)?;
    if trailer != len_buf {
        return Err(DbError::DataFormat(format!(
            "wal record framing mismatch at ({file_no}, {record_start})"
        )));
    }

    let (env, _): (RecordEnvelope, usize) =
        bincode::serde::decode_from_slice(&payload, bincode::config::standard())
            .map_err(|e| DbError::DataFormat(format!("wal record decode failed: {e}")))?;

    *offset = record_start + 8 + len;
    Ok(LogRecord {
        lsn: Lsn::new(file_no, record_start),
        txn_id: env.txn_id,
        prev_lsn: env.prev_lsn,
        body: env.body,
    })
}

#[derive(Debug)]
struct WalState {
    dir: PathBuf,
    max_file_size: u32,
    file_ceiling: u32,
    current_file_no: u16,
    file: File,
    next_offset: u32,
    synced_through: Lsn,
}

impl WalState {
    fn roll_over(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        let old_file_no = self.current_file_no;
        let last_offset = self.next_offset;
        self.synced_through = Lsn::new(old_file_no, last_offset);

        let new_file_no = ((old_file_no as u32 + 1) % self.file_ceiling) as u16;
        let path = self.dir.join(file_name(new_file_no));
        self.file = create_wal_file(&path, last_offset)?;
        self.current_file_no = new_file_no;
        self.next_offset = OFFSET_FIRST_RECORD;
        Ok(())
    }
}

/// Owns the on-disk write-ahead log: a sequence of fixed-ceiling files,
/// addressed end to end by [`Lsn`]. Appends are physical-diff
/// records (see [`crate::record`]); recovery reads them back with
/// [`WalManager::scan_forward`] (redo) and [`WalManager::read_record`]
/// (undo, following each transaction's `prev_lsn` chain).
///
/// Every method takes `&self`: all mutable state lives behind a `Mutex`, so
/// one `WalManager` can be shared across however many transactions are
/// active without the caller inventing its own locking.
#[derive(Debug)]
pub struct WalManager {
    inner: Mutex<WalState>,
}

impl WalManager {
    /// Open the WAL directory, resuming the highest-numbered file found (or
    /// starting file 0 if the directory is empty).
    pub fn open(dir: impl AsRef<Path>, max_file_size: u32, file_ceiling: u32) -> DbResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let existing = existing_file_nos(&dir)?;

        let (current_file_no, file, next_offset) = match existing.last().copied() {
            Some(file_no) => {
                let path = dir.join(file_name(file_no));
                let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
                let mut tag = [0u8; 1];
                file.read_exact(&mut tag)?;
                if tag[0] != storage::FileType::Wal.tag() {
                    return Err(DbError::TypeMismatch(format!(
                        "{} is not a wal file",
                        path.display()
                    )));
                }
                let len = (file.metadata()?.len() as u32).max(OFFSET_FIRST_RECORD);
                (file_no, file, len)
            }
            None => {
                let file = create_wal_file(&dir.join(file_name(0)), 0)?;
                (0, file, OFFSET_FIRST_RECORD)
            }
        };

        let synced_through = Lsn::new(current_file_no, next_offset);
        Ok(Self {
            inner: Mutex::new(WalState {
                dir,
                max_file_size,
                file_ceiling,
                current_file_no,
                file,
                next_offset,
                synced_through,
            }),
        })
    }

    /// Append one record, rolling over to a new file first if it would not
    /// fit within `max_file_size`. Returns the record's own LSN.
    pub fn append(&self, txn_id: u64, prev_lsn: Option<Lsn>, body: RecordBody) -> DbResult<Lsn> {
        let mut state = self.inner.lock().unwrap();
        let env = RecordEnvelope {
            txn_id,
            prev_lsn,
            body,
        };
        let payload = bincode::serde::encode_to_vec(&env, bincode::config::standard())
            .map_err(|e| DbError::DataFormat(format!("wal record encode failed: {e}")))?;
        let len = payload.len() as u32;
        let total = 8u64 + len as u64;

        if state.next_offset as u64 + total > state.max_file_size as u64 {
            state.roll_over()?;
        }

        let lsn = Lsn::new(state.current_file_no, state.next_offset);
        state.file.seek(SeekFrom::Start(state.next_offset as u64))?;
        state.file.write_all(&len.to_be_bytes())?;
        state.file.write_all(&payload)?;
        state.file.write_all(&len.to_be_bytes())?;
        state.file.flush()?;
        state.next_offset += total as u32;
        Ok(lsn)
    }

    /// Guarantee every byte up to and including `upto` is durable, and
    /// return the resulting durability boundary: the next LSN that has
    /// *not* necessarily been made durable by this call. Since fsync has no
    /// partial-file granularity, forcing any record in the current file
    /// durably persists the whole file written so far, so the returned
    /// bound is usually well past `upto` — callers that publish a
    /// recovery-visible `nextLsn` should use the returned value, not
    /// `upto` itself, or they will cut off the record they just forced.
    pub fn force(&self, upto: Lsn) -> DbResult<Lsn> {
        let mut state = self.inner.lock().unwrap();
        if state.synced_through >= upto {
            return Ok(state.synced_through);
        }
        if upto.file_no == state.current_file_no {
            state.file.sync_all()?;
            state.synced_through = Lsn::new(state.current_file_no, state.next_offset);
        } else {
            // upto names a record in a file already closed by rollover,
            // which fsyncs the outgoing file before switching.
            state.synced_through = upto;
        }
        Ok(state.synced_through)
    }

    /// Read every record from `from` (inclusive) through the end of the
    /// log, across as many files as that spans, in LSN order.
    pub fn scan_forward(&self, from: Lsn) -> DbResult<Vec<LogRecord>> {
        let dir = self.inner.lock().unwrap().dir.clone();
        let mut out = Vec::new();
        for file_no in existing_file_nos(&dir)? {
            if file_no < from.file_no {
                continue;
            }
            let path = dir.join(file_name(file_no));
            let mut file = File::open(&path)?;
            let len = file.metadata()?.len() as u32;
            let mut offset = if file_no == from.file_no {
                from.offset
            } else {
                OFFSET_FIRST_RECORD
            };
            file.seek(SeekFrom::Start(offset as u64))?;
            while offset < len {
                out.push(read_record_forward(&mut file, file_no, &mut offset)?);
            }
        }
        Ok(out)
    }

    /// Read exactly one record at a known LSN — how undo follows a
    /// transaction's `prev_lsn`/`undo_next_lsn` chain without scanning.
    pub fn read_record(&self, lsn: Lsn) -> DbResult<LogRecord> {
        let dir = self.inner.lock().unwrap().dir.clone();
        let path = dir.join(file_name(lsn.file_no));
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(lsn.offset as u64))?;
        let mut offset = lsn.offset;
        read_record_forward(&mut file, lsn.file_no, &mut offset)
    }

    /// The record physically immediately before `lsn` in the same file,
    /// found from its trailing length prefix alone — no index, no
    /// transaction chain. `None` at a file's first record. This is the
    /// raw backward-traversal primitive the log's symmetric framing
    /// exists for (`len | payload | len`: the trailing `len` before any
    /// record lets you step back to the one before it).
    pub fn previous_record(&self, lsn: Lsn) -> DbResult<Option<LogRecord>> {
        if lsn.offset <= OFFSET_FIRST_RECORD {
            return Ok(None);
        }
        let dir = self.inner.lock().unwrap().dir.clone();
        let path = dir.join(file_name(lsn.file_no));
        let mut file = File::open(&path)?;

        file.seek(SeekFrom::Start((lsn.offset - 4) as u64))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf);

        let record_start = lsn
            .offset
            .checked_sub(8 + len)
            .ok_or_else(|| DbError::DataFormat(format!("corrupt trailing length at {lsn}")))?;
        let mut offset = record_start;
        file.seek(SeekFrom::Start(offset as u64))?;
        Ok(Some(read_record_forward(&mut file, lsn.file_no, &mut offset)?))
    }

    /// The LSN recovery's redo pass should start from when no more precise
    /// lower bound (e.g. from a dirty-page table) is available.
    pub fn earliest_lsn(&self) -> DbResult<Lsn> {
        let dir = self.inner.lock().unwrap().dir.clone();
        let file_no = existing_file_nos(&dir)?.first().copied().unwrap_or(0);
        Ok(Lsn::new(file_no, OFFSET_FIRST_RECORD))
    }
}
