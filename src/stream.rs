//! Framed byte I/O over a TCP stream.
//!
//! Mirrors the teacher's pattern of driving the wire protocol over a small
//! generic `IO` parameter instead of a concrete socket type, so tests can run
//! the same logic against an in-memory buffer.
use std::io::{self, Read, Write};

use crate::Result;

/// The encoding used to decode a C-string off the wire. The client encoding
/// changes mid-handshake (see [`crate::startup`]), so callers must pass it
/// explicitly rather than reading it from ambient session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// The server's pre-negotiation default; decoded permissively (lossy UTF-8).
    Default,
    Utf8,
}

/// A buffered, typed reader/writer over the Postgres wire format.
///
/// Reads are unbuffered and block until bytes arrive; EOF is reported as a
/// fatal [`crate::error::ErrorKind::Io`].
pub struct ByteStream<S> {
    io: S,
    write_buf: Vec<u8>,
}

impl<S: Read + Write> ByteStream<S> {
    pub fn new(io: S) -> Self {
        Self { io, write_buf: Vec::with_capacity(8 * 1024) }
    }

    pub fn get_ref(&self) -> &S {
        &self.io
    }

    pub fn into_inner(self) -> S {
        self.io
    }

    /// Read the top-level message tag (or any single byte).
    pub fn recv_char(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_or_eof(&mut buf)?;
        Ok(buf[0])
    }

    pub fn recv_int32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact_or_eof(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn recv_int16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_exact_or_eof(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }

    /// Read bytes up to and including a `0` terminator, decoding with `encoding`.
    /// The terminator is consumed but not included in the returned string.
    pub fn recv_cstring(&mut self, encoding: Encoding) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.recv_char()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(match encoding {
            Encoding::Utf8 => String::from_utf8(bytes).map_err(|e| e.utf8_error())?,
            Encoding::Default => String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Read exactly `n` bytes, for binary payloads.
    pub fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact_or_eof(&mut buf)?;
        Ok(buf)
    }

    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.io.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer").into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn send_char(&mut self, c: u8) {
        self.write_buf.push(c);
    }

    /// Write `value` in network byte order using `width` bytes (1, 2, or 4).
    pub fn send_int(&mut self, value: i32, width: u8) {
        match width {
            1 => self.write_buf.push(value as u8),
            2 => self.write_buf.extend_from_slice(&(value as i16).to_be_bytes()),
            4 => self.write_buf.extend_from_slice(&value.to_be_bytes()),
            _ => unreachable!("send_int width must be 1, 2, or 4"),
        }
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) {
        self.write_buf.extend_from_slice(bytes);
    }

    pub fn send_cstring(&mut self, s: &str, _encoding: Encoding) {
        self.write_buf.extend_from_slice(s.as_bytes());
        self.write_buf.push(0);
    }

    pub fn flush(&mut self) -> Result<()> {
        crate::common::verbose!("flushing {} bytes", self.write_buf.len());
        self.io.write_all(&self.write_buf)?;
        self.io.flush()?;
        self.write_buf.clear();
        Ok(())
    }
}

/// A mock peer for tests: reads come from a scripted buffer, writes go to a
/// separate one, independent of each other (unlike a single `Cursor`, whose
/// shared read/write position would otherwise let a write corrupt unread
/// scripted bytes).
#[cfg(test)]
pub(crate) struct Duplex {
    input: io::Cursor<Vec<u8>>,
    pub output: Vec<u8>,
}

#[cfg(test)]
impl Duplex {
    pub fn new(scripted: &[u8]) -> Self {
        Self { input: io::Cursor::new(scripted.to_vec()), output: Vec::new() }
    }
}

#[cfg(test)]
impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

#[cfg(test)]
impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mock(bytes: &[u8]) -> ByteStream<Cursor<Vec<u8>>> {
        ByteStream::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn reads_typed_values() {
        let mut s = mock(&[b'Z', 0, 0, 0, 5, 0, 7]);
        assert_eq!(s.recv_char().unwrap(), b'Z');
        assert_eq!(s.recv_int32().unwrap(), 5);
        assert_eq!(s.recv_int16().unwrap(), 7);
    }

    #[test]
    fn reads_cstring() {
        let mut s = mock(b"hello\0world");
        assert_eq!(s.recv_cstring(Encoding::Utf8).unwrap(), "hello");
        assert_eq!(s.recv_exact(5).unwrap(), b"world");
    }

    #[test]
    fn eof_is_fatal() {
        let mut s = mock(&[0, 0]);
        assert!(s.recv_int32().is_err());
    }

    #[test]
    fn writes_and_flushes() {
        let mut s = mock(&[]);
        s.send_char(b'Q');
        s.send_int(10, 4);
        s.send_cstring("select 1", Encoding::Utf8);
        s.flush().unwrap();
        let written = s.into_inner().into_inner();
        assert_eq!(written[0], b'Q');
        assert_eq!(&written[5..], b"select 1\0");
    }
}
