//! Persisted column store: on-disk record framing
//!
//! A file starts with a 5-byte header (`TSRS` magic plus a version byte)
//! followed by records framed as
//! `[kind u8][len u32 LE][crc32 u32 LE][payload]`. Payloads are bincode
//! encoded. Chunk groups are appended at every flush and a single footer
//! carrying the schema registry is written by `close`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tsfile_common::error::{Error, Result, StorageError};
use tsfile_common::types::{DataType, Timestamp, Value};

use crate::schema::SchemaRegistry;

pub const FILE_MAGIC: &[u8; 4] = b"TSRS";
pub const FILE_VERSION: u8 = 1;
const FILE_HEADER_LEN: usize = 5;
const RECORD_HEADER_LEN: usize = 9;

pub const RECORD_CHUNK_GROUP: u8 = 1;
pub const RECORD_FOOTER: u8 = 2;

/// Points of one measurement written by a single flush
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Chunk {
    pub measurement: String,
    pub data_type: DataType,
    pub timestamps: Vec<Timestamp>,
    pub values: Vec<Value>,
}

/// Every chunk of one device written by a single flush
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChunkGroup {
    pub device: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Footer {
    pub schema: SchemaRegistry,
    pub chunk_groups: u64,
}

/// A framed record read back from disk
#[derive(Debug)]
pub(crate) struct RawRecord {
    pub kind: u8,
    pub payload: Vec<u8>,
}

/// Append-only handle on a file being written
pub(crate) struct FileSink {
    writer: BufWriter<File>,
    path: PathBuf,
    offset: u64,
    max_record_bytes: u32,
}

impl FileSink {
    /// Create the file and write its header. Refuses to touch an existing file.
    pub fn create(path: &Path, max_record_bytes: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StorageError::FileAlreadyExists(path.to_path_buf()),
                _ => StorageError::OpenFailed(format!("{}: {}", path.display(), e)),
            })?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(FILE_MAGIC)
            .and_then(|()| writer.write_all(&[FILE_VERSION]))
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            offset: FILE_HEADER_LEN as u64,
            max_record_bytes,
        })
    }

    /// Encode and append one record, returning its framed size
    pub fn append<T: Serialize>(&mut self, kind: u8, payload: &T) -> Result<u64> {
        let data = bincode::serialize(payload).map_err(|e| Error::Serialization(e.to_string()))?;
        let len = u32::try_from(data.len())
            .ok()
            .filter(|len| *len <= self.max_record_bytes)
            .ok_or_else(|| {
                StorageError::WriteFailed(format!(
                    "record of {} bytes exceeds limit of {} bytes",
                    data.len(),
                    self.max_record_bytes
                ))
            })?;
        let crc = crc32fast::hash(&data);

        let write = |w: &mut BufWriter<File>| -> io::Result<()> {
            w.write_all(&[kind])?;
            w.write_all(&len.to_le_bytes())?;
            w.write_all(&crc.to_le_bytes())?;
            w.write_all(&data)
        };
        write(&mut self.writer).map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        let framed = (RECORD_HEADER_LEN + data.len()) as u64;
        debug!(
            "Appended record kind={} len={} at offset {} in {:?}",
            kind, len, self.offset, self.path
        );
        self.offset += framed;
        Ok(framed)
    }

    /// Flush buffered bytes and fsync
    pub fn sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().sync_all())
            .map_err(|e| StorageError::SyncFailed(e.to_string()))?;
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Read and verify every record of a file
pub(crate) fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let mut file = File::open(path)
        .map_err(|e| StorageError::OpenFailed(format!("{}: {}", path.display(), e)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

    if bytes.len() < FILE_HEADER_LEN || &bytes[0..4] != FILE_MAGIC {
        return Err(StorageError::OpenFailed(format!("{} is not a tsfile", path.display())).into());
    }
    if bytes[4] != FILE_VERSION {
        return Err(StorageError::OpenFailed(format!(
            "{}: unsupported version {}",
            path.display(),
            bytes[4]
        ))
        .into());
    }

    let mut records = Vec::new();
    let mut pos = FILE_HEADER_LEN;
    while pos < bytes.len() {
        if bytes.len() - pos < RECORD_HEADER_LEN {
            return Err(StorageError::CorruptData(format!("truncated record header at {pos}")).into());
        }
        let kind = bytes[pos];
        let len = read_u32(&bytes[pos + 1..pos + 5]) as usize;
        let crc = read_u32(&bytes[pos + 5..pos + 9]);
        let start = pos + RECORD_HEADER_LEN;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| StorageError::CorruptData(format!("truncated record at {pos}")))?;

        let payload = &bytes[start..end];
        if crc32fast::hash(payload) != crc {
            return Err(StorageError::CorruptData(format!("checksum mismatch at {pos}")).into());
        }
        if kind != RECORD_CHUNK_GROUP && kind != RECORD_FOOTER {
            return Err(StorageError::CorruptData(format!("unknown record kind {kind} at {pos}")).into());
        }
        records.push(RawRecord {
            kind,
            payload: payload.to_vec(),
        });
        pos = end;
    }
    Ok(records)
}

pub(crate) fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| StorageError::CorruptData(e.to_string()).into())
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}
