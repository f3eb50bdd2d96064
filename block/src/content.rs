//! Little helpers for the deterministic byte images fed into digests.
//! Integers are little-endian, sequences are length-prefixed with a u32.

use std::io;

pub fn write_u8<W: io::Write>(w: &mut W, v: u8) -> io::Result<usize> {
    w.write_all(&[v])?;
    Ok(1)
}

pub fn write_u16<W: io::Write>(w: &mut W, v: u16) -> io::Result<usize> {
    w.write_all(&v.to_le_bytes())?;
    Ok(2)
}

pub fn write_u32<W: io::Write>(w: &mut W, v: u32) -> io::Result<usize> {
    w.write_all(&v.to_le_bytes())?;
    Ok(4)
}

pub fn write_u64<W: io::Write>(w: &mut W, v: u64) -> io::Result<usize> {
    w.write_all(&v.to_le_bytes())?;
    Ok(8)
}

pub fn write_bytes<W: io::Write>(w: &mut W, bytes: &[u8]) -> io::Result<usize> {
    let mut size = write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes)?;
    size += bytes.len();
    Ok(size)
}
