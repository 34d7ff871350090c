//! Offset arithmetic and record framing over a fixed-capacity byte array.
//!
//! Logical offsets never wrap; the physical index of logical offset `o` is
//! `o % capacity`. A record is a 4-byte little-endian length followed by the
//! payload, and may straddle the physical end of the array, in which case it is
//! copied as a tail chunk followed by a head chunk.

use crate::control::Pointers;
use crate::errors::Corruption;

pub const LEN_PREFIX_SIZE: usize = 4;

#[inline]
pub fn physical(offset: u64, capacity: usize) -> usize {
    (offset % capacity as u64) as usize
}

#[inline]
pub fn framed_size(payload_len: usize) -> usize {
    LEN_PREFIX_SIZE + payload_len
}

/// Checks the invariants both sides rely on: `read <= write` and at most `capacity` live bytes.
pub fn validate(pointers: Pointers, capacity: usize) -> Result<(), Corruption> {
    let Pointers {
        write_offset: write,
        read_offset: read,
    } = pointers;
    if read > write {
        return Err(Corruption::ReadAheadOfWrite { read, write });
    }
    let live = write - read;
    if live > capacity as u64 {
        return Err(Corruption::OverCapacity {
            live,
            capacity: capacity as u64,
        });
    }
    Ok(())
}

/// Free bytes for validated pointers.
#[inline]
pub fn free_bytes(pointers: Pointers, capacity: usize) -> usize {
    capacity - (pointers.write_offset - pointers.read_offset) as usize
}

pub fn write_wrapped(data: &mut [u8], offset: u64, bytes: &[u8]) {
    let capacity = data.len();
    debug_assert!(bytes.len() <= capacity);
    let pos = physical(offset, capacity);
    let first = (capacity - pos).min(bytes.len());
    data[pos..pos + first].copy_from_slice(&bytes[..first]);
    if first < bytes.len() {
        let rest = bytes.len() - first;
        data[..rest].copy_from_slice(&bytes[first..]);
    }
}

pub fn read_wrapped(data: &[u8], offset: u64, out: &mut [u8]) {
    let capacity = data.len();
    debug_assert!(out.len() <= capacity);
    let pos = physical(offset, capacity);
    let first = (capacity - pos).min(out.len());
    out[..first].copy_from_slice(&data[pos..pos + first]);
    if first < out.len() {
        let rest = out.len() - first;
        out[first..].copy_from_slice(&data[..rest]);
    }
}

/// Frames `payload` at `offset` and returns the logical offset just past it.
///
/// The caller has already checked that the record fits the free region.
pub fn write_record(data: &mut [u8], offset: u64, payload: &[u8]) -> u64 {
    let len = payload.len() as u32;
    write_wrapped(data, offset, &len.to_le_bytes());
    let payload_at = offset + LEN_PREFIX_SIZE as u64;
    write_wrapped(data, payload_at, payload);
    payload_at + payload.len() as u64
}

pub fn read_len_prefix(data: &[u8], offset: u64) -> u32 {
    let mut buf = [0u8; LEN_PREFIX_SIZE];
    read_wrapped(data, offset, &mut buf);
    u32::from_le_bytes(buf)
}

/// Reads the record at `pointers.read_offset`, returning its payload and the
/// logical offset just past it.
///
/// The caller guarantees the queue is non-empty. A prefix that is zero or that
/// runs past the published write offset is reported as corruption and nothing
/// past the prefix is read.
pub fn read_record(data: &[u8], pointers: Pointers) -> Result<(Vec<u8>, u64), Corruption> {
    let offset = pointers.read_offset;
    let available = pointers.write_offset - offset;
    let len = read_len_prefix(data, offset);
    if len == 0 || framed_size(len as usize) as u64 > available {
        return Err(Corruption::InvalidRecordLength {
            offset,
            len,
            available,
        });
    }
    let mut payload = vec![0u8; len as usize];
    let payload_at = offset + LEN_PREFIX_SIZE as u64;
    read_wrapped(data, payload_at, &mut payload);
    Ok((payload, payload_at + len as u64))
}
