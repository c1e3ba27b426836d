// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements composable bit- and byte-level I/O.
//!
//! Byte-oriented sources implement [`ReadBytes`]. [`MediaSourceStream`] adapts any
//! [`MediaSource`] (a readable and seekable source such as a file) into a buffered `ReadBytes`
//! with absolute positioning. [`BitReaderRtl`] consumes a `&[u8]` one bit at a time, from the
//! least-significant bit of each byte to the most-significant.

use std::io;
use std::io::{Read, Seek};

use crate::errors::Result;

mod bit;

pub use bit::BitReaderRtl;

/// `MediaSource` is a composite trait of `std::io::Read` and `std::io::Seek`. A source *must*
/// implement this trait to be used by a `MediaSourceStream`.
pub trait MediaSource: Read + Seek + Send {
    /// Returns if the source is seekable. This may be an expensive operation.
    fn is_seekable(&self) -> bool;

    /// Returns the length in bytes, if available. This may be an expensive operation.
    fn byte_len(&self) -> Option<u64>;
}

impl MediaSource for std::fs::File {
    fn is_seekable(&self) -> bool {
        self.metadata().is_ok()
    }

    fn byte_len(&self) -> Option<u64> {
        match self.metadata() {
            Ok(metadata) => Some(metadata.len()),
            _ => None,
        }
    }
}

impl<T: AsRef<[u8]> + Send> MediaSource for io::Cursor<T> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

/// `ReadBytes` provides methods to read bytes and interpret them as little-endian integers.
pub trait ReadBytes {
    /// Reads a single byte from the stream and returns it or an error.
    fn read_byte(&mut self) -> Result<u8>;

    /// Reads exactly the number of bytes required to fill the provided buffer or returns an
    /// error.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Ignores the specified number of bytes from the stream or returns an error.
    fn ignore_bytes(&mut self, count: u64) -> Result<()>;

    /// Gets the position of the stream.
    fn pos(&self) -> u64;

    /// Reads a single unsigned byte from the stream and returns it or an error.
    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8> {
        self.read_byte()
    }

    /// Reads two bytes from the stream and interprets them as an unsigned 16-bit little-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_buf_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads four bytes from the stream and interprets them as an unsigned 32-bit little-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_buf_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads four bytes from the stream and returns them in read-order or an error.
    #[inline(always)]
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.read_buf_exact(&mut buf)?;
        Ok(buf)
    }
}

/// The size of the internal block buffer of a `MediaSourceStream`.
const BUFFER_LEN: usize = 32 * 1024;

/// `MediaSourceStream` is the buffered reader upon which all demuxing is built.
///
/// It wraps a [`MediaSource`], buffers reads in fixed-size blocks, tracks the absolute stream
/// position, and supports absolute seeks. Seeking within the buffered block is performed without
/// touching the underlying source.
pub struct MediaSourceStream {
    /// The source reader.
    inner: Box<dyn MediaSource>,
    /// The block buffer.
    buf: Box<[u8]>,
    /// The absolute stream position of `buf[0]`.
    block_pos: u64,
    /// The number of valid bytes in the block buffer.
    end: usize,
    /// The read position within the block buffer.
    read: usize,
}

impl MediaSourceStream {
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        MediaSourceStream {
            inner: source,
            buf: vec![0u8; BUFFER_LEN].into_boxed_slice(),
            block_pos: 0,
            end: 0,
            read: 0,
        }
    }

    /// Gets a reference to the underlying media source.
    pub fn get_ref(&self) -> &dyn MediaSource {
        self.inner.as_ref()
    }

    /// Unwraps this `MediaSourceStream`, returning the underlying media source.
    pub fn into_inner(self) -> Box<dyn MediaSource> {
        self.inner
    }

    /// The length of the underlying media source in bytes, if available.
    pub fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }

    /// Seeks to the given absolute position in the stream.
    ///
    /// A seek that lands within the currently buffered block adjusts the read cursor without
    /// touching the underlying source.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        if pos >= self.block_pos && pos < self.block_pos + self.end as u64 {
            self.read = (pos - self.block_pos) as usize;
        }
        else {
            self.inner.seek(io::SeekFrom::Start(pos))?;
            self.block_pos = pos;
            self.end = 0;
            self.read = 0;
        }
        Ok(pos)
    }

    fn fetch(&mut self) -> Result<()> {
        self.block_pos += self.end as u64;
        self.read = 0;
        self.end = self.inner.read(&mut self.buf)?;
        Ok(())
    }
}

impl ReadBytes for MediaSourceStream {
    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8> {
        if self.read >= self.end {
            self.fetch()?;
            if self.end == 0 {
                return crate::errors::end_of_stream_error();
            }
        }
        let byte = self.buf[self.read];
        self.read += 1;
        Ok(byte)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut written = 0;

        while written < buf.len() {
            if self.read >= self.end {
                self.fetch()?;
                if self.end == 0 {
                    return crate::errors::end_of_stream_error();
                }
            }

            let count = (self.end - self.read).min(buf.len() - written);
            buf[written..written + count].copy_from_slice(&self.buf[self.read..self.read + count]);
            self.read += count;
            written += count;
        }

        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        let pos = self.pos();
        self.seek(pos + count)?;
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.block_pos + self.read as u64
    }
}

#[cfg(test)]
mod tests {
    use super::{MediaSourceStream, ReadBytes};
    use std::io::Cursor;

    fn stream_of(data: Vec<u8>) -> MediaSourceStream {
        MediaSourceStream::new(Box::new(Cursor::new(data)))
    }

    #[test]
    fn verify_read_le_integers() {
        let mut mss = stream_of(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);

        assert_eq!(mss.read_u8().unwrap(), 0x01);
        assert_eq!(mss.read_u16().unwrap(), 0x0302);
        assert_eq!(mss.read_u32().unwrap(), 0x07060504);
        assert_eq!(mss.pos(), 7);
        assert!(mss.read_u8().is_err());
    }

    #[test]
    fn verify_seek_and_ignore() {
        let data = (0u16..1000).map(|v| (v & 0xff) as u8).collect::<Vec<u8>>();
        let mut mss = stream_of(data);

        mss.ignore_bytes(10).unwrap();
        assert_eq!(mss.read_u8().unwrap(), 10);

        mss.seek(999).unwrap();
        assert_eq!(mss.pos(), 999);
        assert_eq!(mss.read_u8().unwrap(), (999 % 256) as u8);

        mss.seek(0).unwrap();
        assert_eq!(mss.read_u8().unwrap(), 0);

        // Backwards seek into the buffered block.
        mss.seek(0).unwrap();
        assert_eq!(mss.read_u8().unwrap(), 0);
    }
}
