//! Persistence Module
//!
//! Snapshot files for entries flagged persistent.
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────┐
//! │ Magic "TSP1" (4)                      │
//! ├───────────────────────────────────────┤
//! │ Record 1                              │
//! │ ┌─────────┬─────────┬──────────────┐  │
//! │ │ CRC (4) │ Len (4) │ Data (bincode)│ │
//! │ └─────────┴─────────┴──────────────┘  │
//! ├───────────────────────────────────────┤
//! │ Record 2 ...                          │
//! └───────────────────────────────────────┘
//! ```
//!
//! Loading skips records whose CRC does not match and stops at a
//! truncated tail. Saving writes a temp file and renames it over the old one.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entry::{EntryFlags, EntrySnapshot};
use crate::error::{Result, SyncError};
use crate::value::Value;

const MAGIC: &[u8; 4] = b"TSP1";

/// Record header: CRC (4) + length (4)
pub const RECORD_HEADER_SIZE: usize = 8;

/// Largest record accepted when loading (16 MB)
const MAX_RECORD_SIZE: u32 = 16 * 1024 * 1024;

/// One saved entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistRecord {
    pub path: String,
    pub value: Value,
    pub version: u64,
    pub flags: EntryFlags,
}

impl PersistRecord {
    pub fn from_snapshot(path: &str, snapshot: &EntrySnapshot) -> Self {
        Self {
            path: path.to_string(),
            value: snapshot.value.clone(),
            version: snapshot.version,
            flags: snapshot.flags,
        }
    }

    /// Serialize with CRC and length header
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(RECORD_HEADER_SIZE + data.len());
        bytes.extend_from_slice(&crc32fast::hash(&data).to_be_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&data);
        Ok(bytes)
    }
}

/// Result of a load operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Number of records successfully read
    pub records_loaded: u64,

    /// Number of records skipped for CRC or decode failures
    pub records_corrupted: u64,

    /// Whether the file ended in the middle of a record
    pub was_truncated: bool,
}

/// Write `records` to `path`, replacing any previous file
pub fn save(path: &Path, records: &[PersistRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(MAGIC)?;
        for record in records {
            writer.write_all(&record.serialize()?)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    tracing::debug!("Saved {} persistent entries to {}", records.len(), path.display());
    Ok(())
}

/// Read every intact record from `path`
pub fn load(path: &Path) -> Result<(Vec<PersistRecord>, LoadResult)> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(|_| {
        SyncError::Persistence(format!("{}: missing header", path.display()))
    })?;
    if &magic != MAGIC {
        return Err(SyncError::Persistence(format!(
            "{}: not a snapshot file",
            path.display()
        )));
    }

    let mut records = Vec::new();
    let mut result = LoadResult::default();

    loop {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        match read_full(&mut reader, &mut header)? {
            0 => break,
            n if n < RECORD_HEADER_SIZE => {
                result.was_truncated = true;
                break;
            }
            _ => {}
        }

        let crc = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_RECORD_SIZE {
            // Length is garbage, nothing after it can be trusted
            result.records_corrupted += 1;
            result.was_truncated = true;
            break;
        }

        let mut data = vec![0u8; len as usize];
        if read_full(&mut reader, &mut data)? < data.len() {
            result.was_truncated = true;
            break;
        }

        if crc32fast::hash(&data) != crc {
            result.records_corrupted += 1;
            continue;
        }

        match bincode::deserialize::<PersistRecord>(&data) {
            Ok(record) => {
                records.push(record);
                result.records_loaded += 1;
            }
            Err(_) => result.records_corrupted += 1,
        }
    }

    if result.records_corrupted > 0 || result.was_truncated {
        tracing::warn!(
            "Loaded {} from {}: {} corrupted, truncated={}",
            result.records_loaded,
            path.display(),
            result.records_corrupted,
            result.was_truncated
        );
    }

    Ok((records, result))
}

/// Read until `buf` is full or EOF; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
