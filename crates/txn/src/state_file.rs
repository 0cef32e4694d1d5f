//! The txn-state file: `nextTxnId`, `firstLsn`, `nextLsn`, the durable
//! bookends recovery needs before it can even open the WAL.
//!
//! A real single-sector atomic write needs raw device access this crate
//! doesn't have; write-to-temp-then-rename is the standard POSIX substitute
//! (`rename` is atomic within a filesystem) and is what every embedded store
//! without direct sector control does instead.

use std::fs;
use std::path::{Path, PathBuf};

use common::{DbError, DbResult, Lsn};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnStateContents {
    pub next_txn_id: u64,
    pub first_lsn: Lsn,
    pub next_lsn: Lsn,
}

impl TxnStateContents {
    pub fn fresh(genesis: Lsn) -> Self {
        Self {
            next_txn_id: 1,
            first_lsn: genesis,
            next_lsn: genesis,
        }
    }
}

/// The file itself, plus the path it lives at for the rename dance.
pub struct TxnStateFile {
    path: PathBuf,
}

impl TxnStateFile {
    /// Load the file at `path`, or initialize it at `genesis` if absent.
    pub fn open_or_init(path: impl AsRef<Path>, genesis: Lsn) -> DbResult<(Self, TxnStateContents)> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let contents = TxnStateContents::fresh(genesis);
            let file = Self { path };
            file.write(&contents)?;
            return Ok((file, contents));
        }
        let raw = fs::read(&path)?;
        let (contents, _): (TxnStateContents, usize) =
            bincode::serde::decode_from_slice(&raw, bincode::config::standard())
                .map_err(|e| DbError::DataFormat(format!("corrupt txn-state file: {e}")))?;
        Ok((Self { path }, contents))
    }

    /// Atomically replace the file's contents: write a sibling temp file,
    /// fsync it, then rename over the original.
    pub fn write(&self, contents: &TxnStateContents) -> DbResult<()> {
        let bytes = bincode::serde::encode_to_vec(contents, bincode::config::standard())
            .map_err(|e| DbError::DataFormat(format!("txn-state encode failed: {e}")))?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            use std::io::Write;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_or_init_creates_fresh_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txn.state");
        let genesis = Lsn::new(0, 6);
        let (_, contents) = TxnStateFile::open_or_init(&path, genesis).unwrap();
        assert_eq!(contents.next_txn_id, 1);
        assert_eq!(contents.first_lsn, genesis);
        assert_eq!(contents.next_lsn, genesis);
        assert!(path.exists());
    }

    #[test]
    fn write_then_reopen_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txn.state");
        let genesis = Lsn::new(0, 6);
        let (file, _) = TxnStateFile::open_or_init(&path, genesis).unwrap();

        let updated = TxnStateContents {
            next_txn_id: 42,
            first_lsn: genesis,
            next_lsn: Lsn::new(0, 500),
        };
        file.write(&updated).unwrap();

        let (_, reloaded) = TxnStateFile::open_or_init(&path, genesis).unwrap();
        assert_eq!(reloaded, updated);
    }

    #[test]
    fn write_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txn.state");
        let genesis = Lsn::new(0, 6);
        let (file, contents) = TxnStateFile::open_or_init(&path, genesis).unwrap();
        file.write(&contents).unwrap();
        assert!(!path.with_extension("tmp").exists());
    }
}
