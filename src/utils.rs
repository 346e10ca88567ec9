//! Low-level I/O primitives shared by all parsers and writers.
//!
//! Each reader reads exactly the bytes it promises or returns an error -
//! there is no partial-read ambiguity. Writers mirror them one to one so that
//! packers emit the same field widths the parsers consume.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{Error, Result};

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a little-endian `u16`.
#[inline]
pub(crate) fn le_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

/// Read a little-endian `i16`.
#[inline]
pub(crate) fn le_i16<R: Read>(r: &mut R) -> Result<i16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(i16::from_le_bytes(b))
}

/// Read a little-endian `u32`.
#[inline]
pub(crate) fn le_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Read a little-endian `i32`.
#[inline]
pub(crate) fn le_i32<R: Read>(r: &mut R) -> Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Raw bytes of a fixed-width, NUL-padded name field.
///
/// The name ends at the first NUL byte, or at the end of the field when it is
/// completely filled.
pub(crate) fn fixed_name(field: &[u8]) -> Vec<u8> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    field[..end].to_vec()
}

/// Printable form of a stored name. Bytes that are not UTF-8 (usually
/// Shift-JIS) are replaced lossily; the raw bytes stay authoritative.
pub(crate) fn display_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Encode `name` into a fixed-width, NUL-padded field of `N` bytes.
///
/// `reserve_nul` keeps the last byte free for a terminator, for formats whose
/// readers rely on one.
pub(crate) fn fixed_field<const N: usize>(bytes: &[u8], reserve_nul: bool) -> Result<[u8; N]> {
    let limit = if reserve_nul { N - 1 } else { N };
    if bytes.len() > limit {
        return Err(Error::NameTooLong(bytes.len()));
    }
    let mut field = [0u8; N];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Reject entry counts of zero or above `max`.
#[inline]
pub(crate) fn check_count(count: u32, max: u32) -> Result<()> {
    if count == 0 || count > max {
        return Err(Error::InvalidCount(count));
    }
    Ok(())
}

/// Total length of a seekable stream. The current position is preserved.
pub(crate) fn stream_len<R: Seek>(r: &mut R) -> Result<u64> {
    let pos = r.stream_position()?;
    let len = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(pos))?;
    Ok(len)
}

/// Ensure the byte range `offset..offset + size` lies inside `len`.
#[inline]
pub(crate) fn check_range(offset: u64, size: u64, len: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::InvalidRange),
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Convert a length or offset to the `u32` used by on-disk tables.
#[inline]
pub(crate) fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Parse("value does not fit in a 32-bit field"))
}

/// Write one byte.
#[inline]
pub(crate) fn put_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian `u16`.
#[inline]
pub(crate) fn put_le_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian `i16`.
#[inline]
pub(crate) fn put_le_i16<W: Write>(w: &mut W, v: i16) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian `u32`.
#[inline]
pub(crate) fn put_le_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian `i32`.
#[inline]
pub(crate) fn put_le_i32<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a big-endian `u32`.
#[inline]
pub(crate) fn put_be_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write `len` zero bytes.
pub(crate) fn put_zeros<W: Write>(w: &mut W, len: usize) -> Result<()> {
    w.write_all(&vec![0u8; len])?;
    Ok(())
}
