// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `bundle` module implements the per-plane symbol streams ("bundles") of the Bink video
//! bitstream.
//!
//! Each bundle buffers one logical stream of per-block values that is decoded in bulk, one
//! macroblock row ahead of the block loop consuming it. A decode cursor marks how far the stream
//! has been produced, a read cursor how far it has been consumed; the read cursor never
//! overtakes the decode cursor.

use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::BitReaderRtl;

use super::vlc::Tree;

/// The bundled symbol sources, in bitstream order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    BlockTypes = 0,
    SubBlockTypes = 1,
    Colors = 2,
    Pattern = 3,
    XOff = 4,
    YOff = 5,
    IntraDc = 6,
    InterDc = 7,
    Run = 8,
}

/// The number of bundled symbol sources.
pub const NUM_SOURCES: usize = 9;

/// All bundled symbol sources, in bitstream order.
pub const SOURCES: [Source; NUM_SOURCES] = [
    Source::BlockTypes,
    Source::SubBlockTypes,
    Source::Colors,
    Source::Pattern,
    Source::XOff,
    Source::YOff,
    Source::IntraDc,
    Source::InterDc,
    Source::Run,
];

/// One bundled symbol stream.
pub struct Bundle {
    /// The decoded symbol buffer.
    data: Vec<u8>,
    /// The decode (producer) position.
    dec: usize,
    /// The read (consumer) position.
    read: usize,
    /// The bit width of the bundle's length prefixes.
    pub len: u32,
    /// The Huffman tree used by the bundle's symbols.
    pub tree: Tree,
    /// Set when a zero length prefix has been read; the bundle produces nothing further this
    /// plane.
    done: bool,
}

impl Bundle {
    pub fn new() -> Bundle {
        Bundle { data: Vec::new(), dec: 0, read: 0, len: 0, tree: Tree::default(), done: false }
    }

    /// Sizes the bundle buffer for a plane of `blocks` macroblocks.
    pub fn alloc(&mut self, blocks: usize) {
        self.data.clear();
        self.data.resize(blocks * 64, 0);
    }

    /// Rewinds both cursors for a new plane.
    pub fn reset(&mut self) {
        self.dec = 0;
        self.read = 0;
        self.done = false;
    }

    /// Reads the length prefix of the next batch. Returns `None` when the bundle needs no more
    /// data: either the consumer has not caught up with the producer, or a zero prefix marked
    /// the bundle exhausted.
    pub fn read_len_prefix(&mut self, bs: &mut BitReaderRtl<'_>) -> Result<Option<u32>> {
        if self.done || self.dec > self.read {
            return Ok(None);
        }

        let t = bs.read_bits_leq32(self.len)?;
        if t == 0 {
            self.done = true;
            return Ok(None);
        }

        Ok(Some(t))
    }

    /// Marks the bundle exhausted for the remainder of the plane.
    pub fn set_done(&mut self) {
        self.done = true;
    }

    /// The number of bytes the producer may still write.
    pub fn space_left(&self) -> usize {
        self.data.len() - self.dec
    }

    /// Appends one produced byte.
    #[inline(always)]
    pub fn push(&mut self, value: u8) {
        self.data[self.dec] = value;
        self.dec += 1;
    }

    /// Appends `count` copies of one produced byte.
    pub fn push_run(&mut self, value: u8, count: usize) {
        self.data[self.dec..self.dec + count].fill(value);
        self.dec += count;
    }

    /// Appends one produced 16-bit value.
    #[inline(always)]
    pub fn push_u16(&mut self, value: u16) {
        self.data[self.dec..self.dec + 2].copy_from_slice(&value.to_le_bytes());
        self.dec += 2;
    }

    /// The number of bytes produced so far.
    pub fn produced(&self) -> usize {
        self.dec
    }

    /// Consumes one 8-bit value.
    #[inline(always)]
    pub fn get_u8(&mut self) -> Result<u8> {
        if self.read >= self.dec {
            return decode_error("bink: bundle is out of values");
        }
        let v = self.data[self.read];
        self.read += 1;
        Ok(v)
    }

    /// Consumes one signed 8-bit value.
    #[inline(always)]
    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    /// Consumes one signed 16-bit value.
    #[inline(always)]
    pub fn get_i16(&mut self) -> Result<i16> {
        if self.read + 2 > self.dec {
            return decode_error("bink: bundle is out of values");
        }
        let v = i16::from_le_bytes([self.data[self.read], self.data[self.read + 1]]);
        self.read += 2;
        Ok(v)
    }

    /// Consumes a block of 64 raw bytes.
    pub fn get_raw_block(&mut self) -> Result<[u8; 64]> {
        if self.read + 64 > self.dec {
            return decode_error("bink: bundle is out of values");
        }
        let mut block = [0u8; 64];
        block.copy_from_slice(&self.data[self.read..self.read + 64]);
        self.read += 64;
        Ok(block)
    }
}

impl Default for Bundle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Bundle;
    use cadenza_core::io::BitReaderRtl;

    #[test]
    fn verify_cursor_discipline() {
        let mut b = Bundle::new();
        b.alloc(1);
        b.len = 4;

        // Producing 3 values then consuming them in order.
        b.push(10);
        b.push(20);
        b.push_u16(0x1234);

        assert_eq!(b.get_u8().unwrap(), 10);
        assert_eq!(b.get_u8().unwrap(), 20);
        assert_eq!(b.get_i16().unwrap(), 0x1234);
        assert!(b.get_u8().is_err());
    }

    #[test]
    fn verify_len_prefix_gating() {
        // A zero prefix permanently exhausts the bundle.
        let buf = [0x30u8];
        let mut bs = BitReaderRtl::new(&buf);

        let mut b = Bundle::new();
        b.alloc(1);
        b.len = 4;

        assert!(b.read_len_prefix(&mut bs).unwrap().is_none());
        assert!(b.read_len_prefix(&mut bs).unwrap().is_none());
        assert_eq!(bs.pos(), 4);

        // With values produced but not consumed, the producer is gated off without touching the
        // bitstream.
        let mut b = Bundle::new();
        b.alloc(1);
        b.len = 4;
        b.push(1);

        assert!(b.read_len_prefix(&mut bs).unwrap().is_none());
        assert_eq!(bs.pos(), 4);

        // Once consumption catches up, the next prefix is read.
        assert_eq!(b.get_u8().unwrap(), 1);
        assert_eq!(b.read_len_prefix(&mut bs).unwrap(), Some(3));
        assert_eq!(bs.pos(), 8);
    }
}
