//! Data-file record codec.
//!
//! Records are concatenated on the data file as `u32 key_len | key | u32
//! value_len | value`, little-endian. A record's byte offset in the file is
//! the key `SetOffset` is called with.

use std::fs::File;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// A decoded (key, value) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key bytes.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
}

/// Serializes a record into its on-disk framing. Used by tests and by any
/// caller that needs to build a data file from scratch.
pub fn encode_record(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + key.len() + value.len());
    let mut len_buf = [0u8; 4];

    LittleEndian::write_u32(&mut len_buf, key.len() as u32);
    buf.extend_from_slice(&len_buf);
    buf.extend_from_slice(key);

    LittleEndian::write_u32(&mut len_buf, value.len() as u32);
    buf.extend_from_slice(&len_buf);
    buf.extend_from_slice(value);

    buf
}

/// Reads one record from `file` at `offset` using positional I/O.
pub fn read_record_at(file: &File, offset: u64) -> Result<Record> {
    let key_len = read_u32_at(file, offset)? as usize;
    let key_start = offset + 4;
    let key = read_exact_at(file, key_start, key_len)?;

    let value_len_offset = key_start + key_len as u64;
    let value_len = read_u32_at(file, value_len_offset)? as usize;
    let value_start = value_len_offset + 4;
    let value = read_exact_at(file, value_start, value_len)?;

    Ok(Record { key, value })
}

fn read_u32_at(file: &File, offset: u64) -> Result<u32> {
    let buf = read_exact_at(file, offset, 4)?;
    Ok(LittleEndian::read_u32(&buf))
}

#[cfg(unix)]
fn read_exact_at(file: &File, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.read_exact_at(&mut buf, offset)
        .map_err(|e| decode_or_io(e, len))?;
    Ok(buf)
}

#[cfg(not(unix))]
fn read_exact_at(file: &File, offset: u64, len: usize) -> Result<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};
    let mut f = file.try_clone()?;
    f.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    f.read_exact(&mut buf).map_err(|e| decode_or_io(e, len))?;
    Ok(buf)
}

fn decode_or_io(e: io::Error, wanted: usize) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Decode(format!("short read: wanted {wanted} bytes, hit EOF"))
    } else {
        Error::Io(e)
    }
}

/// A single step of the sequential scan [`crate::loader::load`] performs:
/// the decoded record plus the offset it started at and the offset the next
/// record starts at.
pub struct ScannedRecord {
    /// Byte offset the record starts at (the `SetOffset` key).
    pub offset: u64,
    /// Decoded key bytes.
    pub key: Vec<u8>,
    /// Decoded value bytes.
    pub value: Vec<u8>,
}

/// Sequentially decodes every record in `file`, calling `on_record` for each.
///
/// A read that comes back short on the very first field of a record (the
/// `key_len` prefix) is treated as a clean end-of-file: the scan simply
/// stops. A short read partway through an otherwise-started record is a
/// genuine [`Error::Decode`].
pub fn scan<F>(file: &File, mut on_record: F) -> Result<()>
where
    F: FnMut(ScannedRecord),
{
    let len = file.metadata()?.len();
    let mut offset = 0u64;

    while offset < len {
        if offset + 4 > len {
            break;
        }
        let key_len = read_u32_at(file, offset)? as u64;
        let key_start = offset + 4;
        if key_start + key_len + 4 > len {
            return Err(Error::Decode(format!(
                "truncated record at offset {offset}: key extends past end of file"
            )));
        }
        let key = read_exact_at(file, key_start, key_len as usize)?;

        let value_len_offset = key_start + key_len;
        let value_len = read_u32_at(file, value_len_offset)? as u64;
        let value_start = value_len_offset + 4;
        if value_start + value_len > len {
            return Err(Error::Decode(format!(
                "truncated record at offset {offset}: value extends past end of file"
            )));
        }
        let value = read_exact_at(file, value_start, value_len as usize)?;

        on_record(ScannedRecord {
            offset,
            key,
            value,
        });

        offset = value_start + value_len;
    }

    Ok(())
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod record_tests;
