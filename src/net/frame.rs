//! Length-prefixed framing.
//!
//! ```text
//! [length: usize, native byte order][payload: length bytes]
//! ```
//!
//! The header is the platform's native word in native byte order, so both
//! peers must share word width and endianness. This is a closed-system
//! convention; it lives here alone so switching to a canonical header is a
//! change to this file only.
//!
//! The helpers below work on any blocking `Read`/`Write` and are what client
//! code uses to talk to a server.

use std::io::{self, Read, Write};

pub const HEADER_LEN: usize = std::mem::size_of::<usize>();

pub fn encode_header(len: usize) -> [u8; HEADER_LEN] {
    len.to_ne_bytes()
}

pub fn decode_header(header: [u8; HEADER_LEN]) -> usize {
    usize::from_ne_bytes(header)
}

pub fn write_frame<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&encode_header(payload.len()))?;
    writer.write_all(payload)?;
    writer.flush()
}

pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    let mut payload = vec![0u8; decode_header(header)];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
