//! Backing stores for the bet ledger.
//!
//! Only the storage arbitrator ever holds one of these, so implementations
//! need no internal locking.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::{bet::Bet, error::StorageError};

/// Append-only bet storage.
pub trait LedgerStore: Send + 'static {
    /// Appends the whole batch, or nothing if it fails.
    fn append(&mut self, bets: &[Bet]) -> Result<(), StorageError>;

    /// Returns every stored bet in append order.
    fn read_all(&mut self) -> Result<Vec<Bet>, StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    bets: Vec<Bet>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedger {
    fn append(&mut self, bets: &[Bet]) -> Result<(), StorageError> {
        self.bets.extend_from_slice(bets);
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<Bet>, StorageError> {
        Ok(self.bets.clone())
    }
}

/// JSON-lines ledger file, one bet per line.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    file: File,
}

impl FileLedger {
    /// Opens the ledger, creating the file if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self { path, file })
    }
}

impl LedgerStore for FileLedger {
    fn append(&mut self, bets: &[Bet]) -> Result<(), StorageError> {
        // Encode the whole batch before touching the file.
        let mut buf = Vec::new();
        for bet in bets {
            serde_json::to_writer(&mut buf, bet).map_err(StorageError::Encode)?;
            buf.push(b'\n');
        }

        append_or_roll_back(&mut self.file, &buf)
    }

    fn read_all(&mut self) -> Result<Vec<Bet>, StorageError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut bets = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let bet = serde_json::from_str(&line).map_err(|source| StorageError::Corrupt {
                line: index + 1,
                source,
            })?;
            bets.push(bet);
        }
        Ok(bets)
    }
}

/// A seekable sink that can be cut back to an earlier length.
trait Truncate: Write + Seek {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Appends `buf` whole; a torn write is cut back so readers never see half a batch.
fn append_or_roll_back<F: Truncate>(file: &mut F, buf: &[u8]) -> Result<(), StorageError> {
    let committed_len = file.seek(SeekFrom::End(0))?;
    if let Err(err) = file.write_all(buf).and_then(|()| file.flush()) {
        file.truncate(committed_len)?;
        return Err(err.into());
    }
    Ok(())
}
