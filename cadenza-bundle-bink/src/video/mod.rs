// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `video` module implements the Bink video decoder.
//!
//! A frame carries up-to four planes (alpha first when present, then luma and the two chroma
//! planes). Each plane is decoded macroblock row by macroblock row: nine bundled symbol streams
//! are topped up at the start of every row, then each 8x8 block selects one of eight coding
//! modes. 16x16 "scaled" blocks decode one 8x8 block and replicate every pixel 2x2.

use cadenza_core::codecs::{CodecParameters, CODEC_TYPE_BINK_VIDEO};
use cadenza_core::errors::{decode_error, unsupported_error, Result};
use cadenza_core::formats::Packet;
use cadenza_core::io::BitReaderRtl;

use log::debug;

mod bundle;
mod idct;
mod plane;
mod tables;
mod vlc;

pub use plane::{Plane, VideoFrame};

use bundle::{Bundle, Source, NUM_SOURCES, SOURCES};
use tables::{INTER_QUANT, INTRA_QUANT, RUN_PATTERNS, SCAN_ORDER, TYPE_RLE_LENS};
use vlc::Tree;

/// The bit width of the leading intra DC value; inter DC values use one bit less plus a sign.
const DC_START_BITS: u32 = 32;

/// The 8x8 block coding modes, in bitstream order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BlockType {
    /// Copied from the previous frame at the same position.
    Skip = 0,
    /// A 16x16 block; the real mode follows from the sub-block types bundle.
    Scaled = 1,
    /// Copied from the previous frame at a motion offset.
    Motion = 2,
    /// Runs of colours along one of sixteen scan patterns.
    Run = 3,
    /// Motion-compensated with a bit-exact residue.
    Residue = 4,
    /// Intra DCT coefficients.
    Intra = 5,
    /// A single fill colour.
    Fill = 6,
    /// Motion-compensated with DCT coefficients on top.
    Inter = 7,
    /// Two colours selected per-pixel by an 8x8 bitmap.
    Pattern = 8,
    /// 64 literal bytes.
    Raw = 9,
}

impl BlockType {
    fn from_id(id: u8) -> Result<BlockType> {
        match id {
            0 => Ok(BlockType::Skip),
            1 => Ok(BlockType::Scaled),
            2 => Ok(BlockType::Motion),
            3 => Ok(BlockType::Run),
            4 => Ok(BlockType::Residue),
            5 => Ok(BlockType::Intra),
            6 => Ok(BlockType::Fill),
            7 => Ok(BlockType::Inter),
            8 => Ok(BlockType::Pattern),
            9 => Ok(BlockType::Raw),
            _ => decode_error("bink: invalid block type"),
        }
    }
}

/// Bink video decoder.
pub struct BinkVideoDecoder {
    width: usize,
    height: usize,
    revision: u8,
    has_alpha: bool,
    swap_planes: bool,
    /// The ping-pong frame pair. `parity` indexes the frame the next decode writes.
    frames: [VideoFrame; 2],
    parity: usize,
    bundles: [Bundle; NUM_SOURCES],
    /// The colour high-nibble trees, selected by the previous high nibble.
    col_high: [Tree; 16],
    col_lastval: usize,
}

impl BinkVideoDecoder {
    /// Attempts to instantiate a decoder from the track's codec parameters.
    pub fn try_new(params: &CodecParameters) -> Result<Self> {
        if params.codec != CODEC_TYPE_BINK_VIDEO {
            return unsupported_error("bink: invalid codec type");
        }

        let width = params.width.unwrap_or(0) as usize;
        let height = params.height.unwrap_or(0) as usize;

        if width == 0 || height == 0 {
            return decode_error("bink: invalid video dimensions");
        }

        let revision = match params.revision {
            Some(rev) => rev,
            None => return decode_error("bink: missing revision"),
        };

        if revision == b'b' {
            return unsupported_error("bink: revision 'b' is not supported");
        }

        let has_alpha = params.alpha.unwrap_or(false);

        let bw = (width + 7) >> 3;
        let bh = (height + 7) >> 3;

        let mut bundles: [Bundle; NUM_SOURCES] = Default::default();
        for bundle in bundles.iter_mut() {
            bundle.alloc(bw * bh);
        }

        debug!("bink video: {}x{} rev '{}' alpha={}", width, height, revision as char, has_alpha);

        Ok(BinkVideoDecoder {
            width,
            height,
            revision,
            has_alpha,
            swap_planes: revision >= b'h',
            frames: [
                VideoFrame::new(width, height, has_alpha),
                VideoFrame::new(width, height, has_alpha),
            ],
            parity: 0,
            bundles,
            col_high: Default::default(),
            col_lastval: 0,
        })
    }

    /// Decodes one video packet into the current frame of the ping-pong pair.
    ///
    /// The pair alternates even when decoding fails, so that a malformed frame is skipped
    /// rather than re-targeted.
    pub fn decode(&mut self, packet: &Packet) -> Result<()> {
        let result = self.parse_frame(packet.buf());

        self.parity ^= 1;

        result
    }

    /// Gets the most recently decoded frame.
    pub fn frame(&self) -> &VideoFrame {
        &self.frames[self.parity ^ 1]
    }

    /// Resets the decoder to its post-instantiation state.
    pub fn reset(&mut self) {
        for frame in self.frames.iter_mut() {
            for i in 0..4 {
                frame.plane_mut(i).fill(0);
            }
        }
        self.parity = 0;
    }

    fn parse_frame(&mut self, data: &[u8]) -> Result<()> {
        let mut bs = BitReaderRtl::new(data);

        if self.has_alpha {
            if self.revision >= b'i' {
                bs.ignore_bits(32)?;
            }
            self.decode_plane(&mut bs, 3, false)?;
        }

        if self.revision >= b'i' {
            bs.ignore_bits(32)?;
        }

        for plane in 0..3 {
            let plane_id = if plane == 0 || !self.swap_planes { plane } else { plane ^ 3 };

            self.decode_plane(&mut bs, plane_id, plane != 0)?;

            if bs.bits_left() == 0 {
                break;
            }
        }

        Ok(())
    }

    fn decode_plane(
        &mut self,
        bs: &mut BitReaderRtl<'_>,
        plane_id: usize,
        chroma: bool,
    ) -> Result<()> {
        let bw = if chroma { (self.width + 15) >> 4 } else { (self.width + 7) >> 3 };
        let bh = if chroma { (self.height + 15) >> 4 } else { (self.height + 7) >> 3 };
        let width = if chroma { self.width >> 1 } else { self.width };

        let (cur, last) = {
            let (head, tail) = self.frames.split_at_mut(1);
            if self.parity == 0 {
                (&mut head[0], &tail[0])
            }
            else {
                (&mut tail[0], &head[0])
            }
        };

        let plane = cur.plane_mut(plane_id);
        let last = last.plane(plane_id);

        // Revision 'k' can fill a whole plane with one value.
        if self.revision == b'k' && bs.read_bit()? {
            let value = bs.read_bits_leq32(8)? as u8;
            plane.fill(value);
            // The next plane starts at a 32-bit boundary.
            bs.align_32bit()?;
            return Ok(());
        }

        init_lengths(&mut self.bundles, width.max(8), bw);

        for i in 0..NUM_SOURCES {
            if SOURCES[i] == Source::Colors {
                for tree in self.col_high.iter_mut() {
                    *tree = Tree::read(bs)?;
                }
                self.col_lastval = 0;
            }
            if SOURCES[i] != Source::IntraDc && SOURCES[i] != Source::InterDc {
                self.bundles[i].tree = Tree::read(bs)?;
            }
            self.bundles[i].reset();
        }

        let old_signed = self.revision < b'i';
        let xor_bb = self.revision == b'k';

        let mut dst = [0u8; 64];

        for by in 0..bh {
            read_block_types(bs, &mut self.bundles[Source::BlockTypes as usize], xor_bb)?;
            read_block_types(bs, &mut self.bundles[Source::SubBlockTypes as usize], xor_bb)?;
            read_colors(
                bs,
                &mut self.bundles[Source::Colors as usize],
                &self.col_high,
                &mut self.col_lastval,
                old_signed,
            )?;
            read_patterns(bs, &mut self.bundles[Source::Pattern as usize])?;
            read_motion_values(bs, &mut self.bundles[Source::XOff as usize])?;
            read_motion_values(bs, &mut self.bundles[Source::YOff as usize])?;
            read_dcs(bs, &mut self.bundles[Source::IntraDc as usize], DC_START_BITS, false)?;
            read_dcs(bs, &mut self.bundles[Source::InterDc as usize], DC_START_BITS, true)?;
            read_runs(bs, &mut self.bundles[Source::Run as usize])?;

            let mut bx = 0;

            while bx < bw {
                let mut blk =
                    BlockType::from_id(self.bundles[Source::BlockTypes as usize].get_u8()?)?;

                // A 16x16 block type on an odd row is the placeholder of the block decoded on
                // the even row above it.
                if by & 1 == 1 && blk == BlockType::Scaled {
                    bx += 2;
                    continue;
                }

                let mut scaled = false;

                if blk == BlockType::Scaled {
                    blk = BlockType::from_id(
                        self.bundles[Source::SubBlockTypes as usize].get_u8()?,
                    )?;
                    scaled = true;

                    if bx + 2 > bw || by + 2 > bh {
                        return decode_error("bink: scaled block out of bounds");
                    }
                }

                match blk {
                    BlockType::Scaled => {
                        return decode_error("bink: unsupported type of superblock");
                    }
                    BlockType::Skip => {
                        last.get_block(bx, by, &mut dst);
                    }
                    BlockType::Fill => {
                        let v = self.bundles[Source::Colors as usize].get_u8()?;
                        dst.fill(v);
                    }
                    BlockType::Residue => {
                        let xoff = i32::from(self.bundles[Source::XOff as usize].get_i8()?);
                        let yoff = i32::from(self.bundles[Source::YOff as usize].get_i8()?);
                        last.get_pixels(bx as i32 * 8 + xoff, by as i32 * 8 + yoff, &mut dst);

                        let masks_count = bs.read_bits_leq32(7)? as i32;

                        let mut block = [0i16; 64];
                        read_residue(bs, &mut block, masks_count)?;

                        for (d, r) in dst.iter_mut().zip(block.iter()) {
                            *d = d.wrapping_add(*r as u8);
                        }
                    }
                    BlockType::Intra => {
                        let mut block = [0i32; 64];
                        block[0] =
                            i32::from(self.bundles[Source::IntraDc as usize].get_i16()?);

                        let mut coef_idx = [0usize; 64];
                        let (coef_count, quant_idx) =
                            read_dct_coeffs(bs, &mut block, &mut coef_idx)?;

                        unquantize(&mut block, &INTRA_QUANT[quant_idx], &coef_idx[..coef_count]);
                        idct::idct_put(&mut dst, &block);
                    }
                    BlockType::Inter => {
                        let xoff = i32::from(self.bundles[Source::XOff as usize].get_i8()?);
                        let yoff = i32::from(self.bundles[Source::YOff as usize].get_i8()?);
                        last.get_pixels(bx as i32 * 8 + xoff, by as i32 * 8 + yoff, &mut dst);

                        let mut block = [0i32; 64];
                        block[0] =
                            i32::from(self.bundles[Source::InterDc as usize].get_i16()?);

                        let mut coef_idx = [0usize; 64];
                        let (coef_count, quant_idx) =
                            read_dct_coeffs(bs, &mut block, &mut coef_idx)?;

                        unquantize(&mut block, &INTER_QUANT[quant_idx], &coef_idx[..coef_count]);
                        idct::idct_add(&mut dst, &block);
                    }
                    BlockType::Run => {
                        let pattern = &RUN_PATTERNS[bs.read_bits_leq32(4)? as usize];

                        let mut at = 0;
                        let mut total = 0;

                        loop {
                            let run =
                                self.bundles[Source::Run as usize].get_u8()? as usize + 1;

                            total += run;
                            if total > 64 {
                                return decode_error("bink: run went out of bounds");
                            }

                            if bs.read_bit()? {
                                let v = self.bundles[Source::Colors as usize].get_u8()?;
                                for &pos in &pattern[at..at + run] {
                                    dst[pos as usize] = v;
                                }
                            }
                            else {
                                for &pos in &pattern[at..at + run] {
                                    dst[pos as usize] =
                                        self.bundles[Source::Colors as usize].get_u8()?;
                                }
                            }

                            at += run;

                            if total >= 63 {
                                break;
                            }
                        }

                        // A lone trailing pixel is coded as a colour, not a run.
                        if total == 63 {
                            dst[pattern[at] as usize] =
                                self.bundles[Source::Colors as usize].get_u8()?;
                        }
                    }
                    BlockType::Motion => {
                        if scaled {
                            return decode_error("bink: unsupported type of superblock");
                        }
                        let xoff = i32::from(self.bundles[Source::XOff as usize].get_i8()?);
                        let yoff = i32::from(self.bundles[Source::YOff as usize].get_i8()?);
                        last.get_pixels(bx as i32 * 8 + xoff, by as i32 * 8 + yoff, &mut dst);
                    }
                    BlockType::Pattern => {
                        let mut col = [0u8; 2];
                        for c in col.iter_mut() {
                            *c = self.bundles[Source::Colors as usize].get_u8()?;
                        }
                        for row in 0..8 {
                            let mut v = self.bundles[Source::Pattern as usize].get_u8()?;
                            for j in 0..8 {
                                dst[row * 8 + j] = col[(v & 1) as usize];
                                v >>= 1;
                            }
                        }
                    }
                    BlockType::Raw => {
                        dst = self.bundles[Source::Colors as usize].get_raw_block()?;
                    }
                }

                if scaled {
                    plane.put_scaled_block(bx, by, &dst);
                    bx += 1;
                }
                else {
                    plane.put_block(bx, by, &dst);
                }

                bx += 1;
            }
        }

        // The next plane starts at a 32-bit boundary.
        bs.align_32bit()?;

        Ok(())
    }
}

fn log2(v: u32) -> u32 {
    31 - v.leading_zeros()
}

/// Derives the bit widths of the bundle length prefixes from the plane geometry.
fn init_lengths(bundles: &mut [Bundle; NUM_SOURCES], width: usize, bw: usize) {
    let width = ((width + 7) >> 3) << 3;

    let block_len = log2((width as u32 >> 3) + 511) + 1;

    bundles[Source::BlockTypes as usize].len = block_len;
    bundles[Source::SubBlockTypes as usize].len = log2((width as u32 >> 4) + 511) + 1;
    bundles[Source::Colors as usize].len = log2(bw as u32 * 64 + 511) + 1;
    bundles[Source::IntraDc as usize].len = block_len;
    bundles[Source::InterDc as usize].len = block_len;
    bundles[Source::XOff as usize].len = block_len;
    bundles[Source::YOff as usize].len = block_len;
    bundles[Source::Pattern as usize].len = log2((bw as u32) * 8 + 511) + 1;
    bundles[Source::Run as usize].len = log2(bw as u32 * 48 + 511) + 1;
}

/// Tops up the block-type (or sub-block-type) bundle: a 4-bit fill value, or Huffman symbols
/// where values 12..=15 are RLE escapes repeating the previous value.
fn read_block_types(bs: &mut BitReaderRtl<'_>, b: &mut Bundle, xor_bb: bool) -> Result<()> {
    let mut t = match b.read_len_prefix(bs)? {
        Some(t) => t,
        None => return Ok(()),
    };

    if xor_bb {
        t ^= 0xbb;
        if t == 0 {
            b.set_done();
            return Ok(());
        }
    }

    if t as usize > b.space_left() {
        return decode_error("bink: too many block type values");
    }

    let end = b.produced() + t as usize;

    if bs.read_bit()? {
        let v = bs.read_bits_leq32(4)? as u8;
        b.push_run(v, t as usize);
    }
    else {
        let mut last = 0u8;

        while b.produced() < end {
            let v = b.tree.read_sym(bs)?;

            if v < 12 {
                last = v;
                b.push(v);
            }
            else {
                let run = TYPE_RLE_LENS[v as usize - 12];

                if end - b.produced() < run {
                    return decode_error("bink: block type run too long");
                }

                b.push_run(last, run);
            }
        }
    }

    Ok(())
}

/// Tops up the colour bundle. The high nibble is predicted from the previous one through the
/// sixteen high-nibble trees; revisions before 'i' fold the byte through a sign-magnitude
/// transform.
fn read_colors(
    bs: &mut BitReaderRtl<'_>,
    b: &mut Bundle,
    col_high: &[Tree; 16],
    col_lastval: &mut usize,
    old_signed: bool,
) -> Result<()> {
    let t = match b.read_len_prefix(bs)? {
        Some(t) => t,
        None => return Ok(()),
    };

    if t as usize > b.space_left() {
        return decode_error("bink: too many colour values");
    }

    let read_color = |bs: &mut BitReaderRtl<'_>, b: &Bundle, lastval: &mut usize| -> Result<u8> {
        *lastval = usize::from(col_high[*lastval].read_sym(bs)?);
        let lo = b.tree.read_sym(bs)?;
        let mut v = ((*lastval as u8) << 4) | lo;

        if old_signed {
            let sign = (v as i8) >> 7;
            v = (((v & 0x7f) as i8 ^ sign).wrapping_sub(sign)) as u8;
            v = v.wrapping_add(0x80);
        }

        Ok(v)
    };

    if bs.read_bit()? {
        let v = read_color(bs, b, col_lastval)?;
        b.push_run(v, t as usize);
    }
    else {
        let end = b.produced() + t as usize;

        while b.produced() < end {
            let v = read_color(bs, b, col_lastval)?;
            b.push(v);
        }
    }

    Ok(())
}

/// Tops up the pattern bundle: two nibbles per byte from the bundle's tree.
fn read_patterns(bs: &mut BitReaderRtl<'_>, b: &mut Bundle) -> Result<()> {
    let t = match b.read_len_prefix(bs)? {
        Some(t) => t,
        None => return Ok(()),
    };

    if t as usize > b.space_left() {
        return decode_error("bink: too many pattern values");
    }

    let end = b.produced() + t as usize;

    while b.produced() < end {
        let lo = b.tree.read_sym(bs)?;
        let hi = b.tree.read_sym(bs)?;
        b.push(lo | hi << 4);
    }

    Ok(())
}

/// Tops up a motion offset bundle: 4-bit magnitudes with a trailing sign bit, filled or
/// streamed.
fn read_motion_values(bs: &mut BitReaderRtl<'_>, b: &mut Bundle) -> Result<()> {
    let t = match b.read_len_prefix(bs)? {
        Some(t) => t,
        None => return Ok(()),
    };

    if t as usize > b.space_left() {
        return decode_error("bink: too many motion values");
    }

    if bs.read_bit()? {
        let mut v = bs.read_bits_leq32(4)? as i8;
        if v != 0 && bs.read_bit()? {
            v = -v;
        }
        b.push_run(v as u8, t as usize);
    }
    else {
        let end = b.produced() + t as usize;

        while b.produced() < end {
            let mut v = b.tree.read_sym(bs)? as i8;
            if v != 0 && bs.read_bit()? {
                v = -v;
            }
            b.push(v as u8);
        }
    }

    Ok(())
}

/// Tops up a DC bundle: a wide leading value, then groups of eight delta-coded values, each
/// group prefixed by a 4-bit magnitude width. A zero width repeats the accumulator.
fn read_dcs(
    bs: &mut BitReaderRtl<'_>,
    b: &mut Bundle,
    start_bits: u32,
    has_sign: bool,
) -> Result<()> {
    let len = match b.read_len_prefix(bs)? {
        Some(t) => t as usize,
        None => return Ok(()),
    };

    let mut v = if has_sign {
        let v = bs.read_bits_leq32(start_bits - 1)? as i32;
        if v != 0 && bs.read_bit()? {
            -v
        }
        else {
            v
        }
    }
    else {
        bs.read_bits_leq32(start_bits)? as i32
    };

    if b.space_left() < 2 {
        return decode_error("bink: too many dc values");
    }
    b.push_u16(v as u16);

    let len = len - 1;
    let mut i = 0;

    while i < len {
        let len2 = (len - i).min(8);

        if b.space_left() < 2 * len2 {
            return decode_error("bink: too many dc values");
        }

        let bsize = bs.read_bits_leq32(4)?;

        if bsize > 0 {
            for _ in 0..len2 {
                let mut v2 = bs.read_bits_leq32(bsize)? as i32;
                if v2 != 0 && bs.read_bit()? {
                    v2 = -v2;
                }

                v += v2;
                b.push_u16(v as u16);

                if !(-32768..=32767).contains(&v) {
                    return decode_error("bink: dc value went out of bounds");
                }
            }
        }
        else {
            for _ in 0..len2 {
                b.push_u16(v as u16);
            }
        }

        i += 8;
    }

    Ok(())
}

/// Tops up the run-length bundle: a 4-bit fill or a stream of Huffman symbols.
fn read_runs(bs: &mut BitReaderRtl<'_>, b: &mut Bundle) -> Result<()> {
    let t = match b.read_len_prefix(bs)? {
        Some(t) => t,
        None => return Ok(()),
    };

    if t as usize > b.space_left() {
        return decode_error("bink: too many run values");
    }

    if bs.read_bit()? {
        let v = bs.read_bits_leq32(4)? as u8;
        b.push_run(v, t as usize);
    }
    else {
        let end = b.produced() + t as usize;

        while b.produced() < end {
            b.push(b.tree.read_sym(bs)?);
        }
    }

    Ok(())
}

/// Reads a signed coefficient for the current magnitude bit-plane: at plane zero a bare sign
/// selects +/-1, otherwise the plane bit is set above `bits` magnitude bits.
#[inline(always)]
fn read_coef(bs: &mut BitReaderRtl<'_>, bits: i32) -> Result<i32> {
    if bits == 0 {
        Ok(1 - (i32::from(bs.read_bit()?) << 1))
    }
    else {
        let t = (bs.read_bits_leq32(bits as u32)? | (1u32 << bits)) as i32;
        if bs.read_bit()? {
            Ok(-t)
        }
        else {
            Ok(t)
        }
    }
}

/// Decodes the quantised DCT coefficient list of one block and returns the coefficient count
/// and the 4-bit quantiser index.
///
/// The decoder walks two parallel deques of `(position, mode)` entries: mode 0 promotes to
/// mode 1 and immediately decodes four children like mode 2 would; mode 1 splits into three
/// mode-2 children; mode 2 decodes four positions, pushing mode-3 entries at the head for
/// positions deferred to later bit-planes; mode 3 decodes a single coefficient.
fn read_dct_coeffs(
    bs: &mut BitReaderRtl<'_>,
    block: &mut [i32; 64],
    coef_idx: &mut [usize; 64],
) -> Result<(usize, usize)> {
    let mut coef_list = [0usize; 128];
    let mut mode_list = [0u8; 128];

    let mut list_start = 64;
    let mut list_end = 64;

    for &(coef, mode) in &[(4, 0u8), (24, 0), (44, 0), (1, 3), (2, 3), (3, 3)] {
        coef_list[list_end] = coef;
        mode_list[list_end] = mode;
        list_end += 1;
    }

    let mut coef_count = 0;

    let mut bits = bs.read_bits_leq32(4)? as i32 - 1;

    while bits >= 0 {
        let mut list_pos = list_start;

        while list_pos < list_end {
            if (mode_list[list_pos] == 0 && coef_list[list_pos] == 0) || !bs.read_bit()? {
                list_pos += 1;
                continue;
            }

            let mut ccoef = coef_list[list_pos];
            let mode = mode_list[list_pos];

            match mode {
                0 | 2 => {
                    if mode == 0 {
                        // Promote to mode 1 and decode four children right away.
                        coef_list[list_pos] = ccoef + 4;
                        mode_list[list_pos] = 1;
                    }
                    else {
                        coef_list[list_pos] = 0;
                        mode_list[list_pos] = 0;
                        list_pos += 1;
                    }

                    for _ in 0..4 {
                        if bs.read_bit()? {
                            list_start -= 1;
                            coef_list[list_start] = ccoef;
                            mode_list[list_start] = 3;
                        }
                        else {
                            block[SCAN_ORDER[ccoef]] = read_coef(bs, bits)?;
                            coef_idx[coef_count] = ccoef;
                            coef_count += 1;
                        }
                        ccoef += 1;
                    }
                }
                1 => {
                    mode_list[list_pos] = 2;
                    for _ in 0..3 {
                        ccoef += 4;
                        coef_list[list_end] = ccoef;
                        mode_list[list_end] = 2;
                        list_end += 1;
                    }
                }
                3 => {
                    block[SCAN_ORDER[ccoef]] = read_coef(bs, bits)?;
                    coef_idx[coef_count] = ccoef;
                    coef_count += 1;

                    coef_list[list_pos] = 0;
                    mode_list[list_pos] = 0;
                    list_pos += 1;
                }
                _ => return decode_error("bink: invalid coefficient mode"),
            }
        }

        bits -= 1;
    }

    let quant_idx = bs.read_bits_leq32(4)? as usize;

    Ok((coef_count, quant_idx))
}

/// Decodes the residue of a motion-compensated block: the same list walk as
/// [`read_dct_coeffs`], with +/-(bit-plane) values, a refinement pass over previously placed
/// coefficients, and a global budget of placed bits.
fn read_residue(bs: &mut BitReaderRtl<'_>, block: &mut [i16; 64], mut masks_count: i32) -> Result<()> {
    let mut coef_list = [0usize; 128];
    let mut mode_list = [0u8; 128];

    let mut list_start = 64;
    let mut list_end = 64;

    coef_list[list_end] = 4;
    mode_list[list_end] = 0;
    list_end += 1;
    coef_list[list_end] = 24;
    mode_list[list_end] = 0;
    list_end += 1;
    coef_list[list_end] = 44;
    mode_list[list_end] = 0;
    list_end += 1;
    coef_list[list_end] = 0;
    mode_list[list_end] = 2;
    list_end += 1;

    let mut nz_coeff = [0usize; 64];
    let mut nz_count = 0;

    let mut mask = 1i32 << bs.read_bits_leq32(3)?;

    while mask != 0 {
        // Refine the coefficients placed on earlier bit-planes.
        for &at in &nz_coeff[..nz_count] {
            if !bs.read_bit()? {
                continue;
            }

            if block[at] < 0 {
                block[at] -= mask as i16;
            }
            else {
                block[at] += mask as i16;
            }

            masks_count -= 1;
            if masks_count < 0 {
                return Ok(());
            }
        }

        let mut list_pos = list_start;

        while list_pos < list_end {
            if (mode_list[list_pos] == 0 && coef_list[list_pos] == 0) || !bs.read_bit()? {
                list_pos += 1;
                continue;
            }

            let mut ccoef = coef_list[list_pos];
            let mode = mode_list[list_pos];

            match mode {
                0 | 2 => {
                    if mode == 0 {
                        coef_list[list_pos] = ccoef + 4;
                        mode_list[list_pos] = 1;
                    }
                    else {
                        coef_list[list_pos] = 0;
                        mode_list[list_pos] = 0;
                        list_pos += 1;
                    }

                    for _ in 0..4 {
                        if bs.read_bit()? {
                            list_start -= 1;
                            coef_list[list_start] = ccoef;
                            mode_list[list_start] = 3;
                        }
                        else {
                            let at = SCAN_ORDER[ccoef];
                            nz_coeff[nz_count] = at;
                            nz_count += 1;

                            block[at] = if bs.read_bit()? { -(mask as i16) } else { mask as i16 };

                            masks_count -= 1;
                            if masks_count < 0 {
                                return Ok(());
                            }
                        }
                        ccoef += 1;
                    }
                }
                1 => {
                    mode_list[list_pos] = 2;
                    for _ in 0..3 {
                        ccoef += 4;
                        coef_list[list_end] = ccoef;
                        mode_list[list_end] = 2;
                        list_end += 1;
                    }
                }
                3 => {
                    let at = SCAN_ORDER[ccoef];
                    nz_coeff[nz_count] = at;
                    nz_count += 1;

                    block[at] = if bs.read_bit()? { -(mask as i16) } else { mask as i16 };

                    coef_list[list_pos] = 0;
                    mode_list[list_pos] = 0;
                    list_pos += 1;

                    masks_count -= 1;
                    if masks_count < 0 {
                        return Ok(());
                    }
                }
                _ => return decode_error("bink: invalid coefficient mode"),
            }
        }

        mask >>= 1;
    }

    Ok(())
}

/// Scales the decoded coefficients with the selected 4.11 fixed-point quantiser matrix.
fn unquantize(block: &mut [i32; 64], quant: &[u32; 64], coef_idx: &[usize]) {
    block[0] = block[0].wrapping_mul(quant[0] as i32) >> 11;

    for &idx in coef_idx {
        let at = SCAN_ORDER[idx];
        block[at] = block[at].wrapping_mul(quant[idx] as i32) >> 11;
    }
}

#[cfg(test)]
mod tests {
    use super::bundle::{Bundle, Source};
    use super::{read_block_types, read_dcs, init_lengths, DC_START_BITS};
    use cadenza_core::io::BitReaderRtl;

    /// A little LSB-first bit packer for synthesising test streams.
    struct BitWriter {
        buf: Vec<u8>,
        at: usize,
    }

    impl BitWriter {
        fn new() -> BitWriter {
            BitWriter { buf: Vec::new(), at: 0 }
        }

        fn put(&mut self, value: u32, width: u32) {
            for i in 0..width {
                if self.at == 8 * self.buf.len() {
                    self.buf.push(0);
                }
                if value >> i & 1 != 0 {
                    self.buf[self.at / 8] |= 1 << (self.at & 7);
                }
                self.at += 1;
            }
        }

        fn finish(self) -> Vec<u8> {
            self.buf
        }
    }

    #[test]
    fn verify_block_types_fill_with_type_xor() {
        // A 12-block row: under revision 'k' the count is coded XORed with 0xbb, and the fill
        // path repeats one 4-bit value. Decoding must stop at exactly 12 values.
        let mut b = Bundle::new();
        b.alloc(12);
        b.len = 10;

        let mut bw = BitWriter::new();
        bw.put(12 ^ 0xbb, 10);
        bw.put(1, 1); // fill mode
        bw.put(3, 4); // the value

        let buf = bw.finish();
        let mut bs = BitReaderRtl::new(&buf);

        read_block_types(&mut bs, &mut b, true).unwrap();

        for _ in 0..12 {
            assert_eq!(b.get_u8().unwrap(), 3);
        }
        assert!(b.get_u8().is_err());
    }

    #[test]
    fn verify_block_types_rle_escape() {
        // Escape symbol 12 repeats the previous value 4 more times. The default tree codes
        // nibbles verbatim.
        let mut b = Bundle::new();
        b.alloc(1);
        b.len = 10;

        let mut bw = BitWriter::new();
        bw.put(5, 10); // count
        bw.put(0, 1); // streaming mode
        bw.put(7, 4); // value 7
        bw.put(12, 4); // escape: repeat the 7 four more times

        let buf = bw.finish();
        let mut bs = BitReaderRtl::new(&buf);

        read_block_types(&mut bs, &mut b, false).unwrap();

        for _ in 0..5 {
            assert_eq!(b.get_u8().unwrap(), 7);
        }
        assert!(b.get_u8().is_err());
    }

    #[test]
    fn verify_dc_overflow_is_fatal() {
        let mut b = Bundle::new();
        b.alloc(16);
        b.len = 4;

        let mut bw = BitWriter::new();
        bw.put(2, 4); // two values
        bw.put(32760, DC_START_BITS); // leading value near the i16 limit
        bw.put(15, 4); // delta width
        bw.put(100, 15); // delta pushing the accumulator past 32767
        bw.put(0, 1); // positive

        let buf = bw.finish();
        let mut bs = BitReaderRtl::new(&buf);

        assert!(read_dcs(&mut bs, &mut b, DC_START_BITS, false).is_err());
    }

    #[test]
    fn verify_bundle_lengths() {
        let mut bundles: [Bundle; super::NUM_SOURCES] = Default::default();

        // An 88-pixel-wide plane has 11 macroblocks per row.
        init_lengths(&mut bundles, 88, 11);

        assert_eq!(bundles[Source::BlockTypes as usize].len, 10);
        assert_eq!(bundles[Source::SubBlockTypes as usize].len, 10);
        assert_eq!(bundles[Source::Colors as usize].len, 11);
        assert_eq!(bundles[Source::Run as usize].len, 11);
    }
}
