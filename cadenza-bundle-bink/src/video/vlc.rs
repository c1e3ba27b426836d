// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `vlc` module implements the variable-length code decoder of the Bink video bitstream: the
//! sixteen fixed Huffman trees, and the per-bundle symbol permutations layered on top of them.

use lazy_static::lazy_static;

use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::BitReaderRtl;

use super::tables::{TREE_CODES, TREE_LENS};

/// A table entry is either a value, `(symbol, length)` with a non-negative length, or a jump to
/// a sub-table, `(-offset, -sub_bits)`.
type VlcEntry = (i16, i16);

/// A flat lookup table for one prefix-free code set, read least-significant bit first.
///
/// The primary table is indexed by `init_bits` peeked bits. A value entry yields the decoded
/// symbol directly; a jump entry points at a sub-table indexed by the following `sub_bits` bits.
/// Two levels suffice for every code set used here.
pub struct VlcTable {
    init_bits: u32,
    table: Vec<VlcEntry>,
}

impl VlcTable {
    /// Builds a lookup table for the given codeword set. Codewords are stored with the first
    /// bit-to-be-read in the least-significant position.
    pub fn new(codes: &[u16], lens: &[u8], init_bits: u32) -> VlcTable {
        assert!(init_bits > 0 && init_bits <= 15);

        let mut table = vec![(0i16, 0i16); 1 << init_bits];

        // Value entries for codes short enough for the primary table, replicated across every
        // index sharing the codeword suffix.
        for (sym, (&code, &len)) in codes.iter().zip(lens.iter()).enumerate() {
            let len = u32::from(len);

            if len <= init_bits {
                let step = 1usize << len;
                let mut idx = code as usize;

                while idx < table.len() {
                    table[idx] = (sym as i16, len as i16);
                    idx += step;
                }
            }
        }

        // Sub-tables for codes longer than the primary table.
        let prefixes: Vec<u16> = {
            let mut p: Vec<u16> = codes
                .iter()
                .zip(lens.iter())
                .filter(|(_, &l)| u32::from(l) > init_bits)
                .map(|(&c, _)| c & ((1 << init_bits) - 1))
                .collect();
            p.sort_unstable();
            p.dedup();
            p
        };

        for prefix in prefixes {
            let sub_bits = codes
                .iter()
                .zip(lens.iter())
                .filter(|(&c, &l)| u32::from(l) > init_bits && c & ((1 << init_bits) - 1) == prefix)
                .map(|(_, &l)| u32::from(l) - init_bits)
                .max()
                .unwrap_or(0);

            let offset = table.len();
            table[prefix as usize] = (-(offset as i16), -(sub_bits as i16));
            table.resize(offset + (1 << sub_bits), (0i16, 0i16));

            for (sym, (&code, &len)) in codes.iter().zip(lens.iter()).enumerate() {
                let len = u32::from(len);

                if len > init_bits && code & ((1 << init_bits) - 1) == prefix {
                    let sub_len = len - init_bits;
                    let step = 1usize << sub_len;
                    let mut idx = (code >> init_bits) as usize;

                    while idx < 1 << sub_bits {
                        table[offset + idx] = (sym as i16, sub_len as i16);
                        idx += step;
                    }
                }
            }
        }

        VlcTable { init_bits, table }
    }

    /// Decodes one symbol from the bitstream.
    pub fn read(&self, bs: &mut BitReaderRtl<'_>) -> Result<u8> {
        let idx = bs.show_bits_leq32(self.init_bits)? as usize;
        let (val, len) = self.table[idx];

        if len >= 0 {
            bs.ignore_bits(len as u32)?;
            return Ok(val as u8);
        }

        // Jump to the sub-table.
        bs.ignore_bits(self.init_bits)?;

        let sub_bits = (-len) as u32;
        let idx = (-val) as usize + bs.show_bits_leq32(sub_bits)? as usize;
        let (val, len) = self.table[idx];

        bs.ignore_bits(len as u32)?;
        Ok(val as u8)
    }
}

lazy_static! {
    /// The sixteen fixed Huffman trees, built once and shared by every decoder instance.
    pub static ref BINK_TREES: [VlcTable; 16] = {
        let mut trees: Vec<VlcTable> = Vec::with_capacity(16);

        for i in 0..16 {
            // The primary table covers the longest code of the set outright.
            let max_bits = u32::from(TREE_LENS[i][15]);
            trees.push(VlcTable::new(&TREE_CODES[i], &TREE_LENS[i], max_bits));
        }

        match trees.try_into() {
            Ok(t) => t,
            Err(_) => unreachable!(),
        }
    };
}

/// A `Tree` selects one of the sixteen fixed Huffman trees and remaps its symbols through a
/// stream-provided permutation.
#[derive(Clone)]
pub struct Tree {
    pub vlc_num: usize,
    pub syms: [u8; 16],
}

impl Default for Tree {
    fn default() -> Self {
        let mut syms = [0u8; 16];
        for (i, s) in syms.iter_mut().enumerate() {
            *s = i as u8;
        }
        Tree { vlc_num: 0, syms }
    }
}

impl Tree {
    /// Reads a tree header: a 4-bit tree index and one of the two symbol permutation encodings.
    pub fn read(bs: &mut BitReaderRtl<'_>) -> Result<Tree> {
        let mut tree = Tree::default();

        tree.vlc_num = bs.read_bits_leq32(4)? as usize;

        // Tree 0 always decodes to the identity permutation.
        if tree.vlc_num == 0 {
            return Ok(tree);
        }

        if bs.read_bit()? {
            // An explicit list of the leading symbols; the remainder follow in natural order.
            let mut used = [false; 16];
            let mut len = bs.read_bits_leq32(3)? as usize;

            for i in 0..=len {
                let sym = bs.read_bits_leq32(4)? as u8;
                tree.syms[i] = sym;
                used[sym as usize] = true;
            }

            for i in 0..16u8 {
                if len >= 15 {
                    break;
                }
                if !used[i as usize] {
                    len += 1;
                    tree.syms[len] = i;
                }
            }
        }
        else {
            // Iterated pairwise merges of the identity, with a bit selecting the source of each
            // output position.
            let len = bs.read_bits_leq32(2)? as usize;

            let mut src = [0u8; 16];
            let mut dst = [0u8; 16];

            for (i, s) in src.iter_mut().enumerate() {
                *s = i as u8;
            }

            for i in 0..=len {
                let size = 1 << i;
                for t in (0..16).step_by(size << 1) {
                    merge(bs, &mut dst[t..t + (size << 1)], &src[t..t + (size << 1)], size)?;
                }
                std::mem::swap(&mut src, &mut dst);
            }

            tree.syms = src;
        }

        Ok(tree)
    }

    /// Decodes one symbol and remaps it through the permutation.
    pub fn read_sym(&self, bs: &mut BitReaderRtl<'_>) -> Result<u8> {
        if self.vlc_num >= 16 {
            return decode_error("bink: invalid tree index");
        }
        let vlc = BINK_TREES[self.vlc_num].read(bs)?;
        Ok(self.syms[vlc as usize])
    }
}

/// Merges the two `size`-element halves of `src` into `dst`, one bit choosing the source of each
/// output element, remaining elements copied through.
fn merge(bs: &mut BitReaderRtl<'_>, dst: &mut [u8], src: &[u8], size: usize) -> Result<()> {
    let mut at = 0;
    let mut lo = 0;
    let mut hi = size;

    while lo < size && hi < 2 * size {
        if !bs.read_bit()? {
            dst[at] = src[lo];
            lo += 1;
        }
        else {
            dst[at] = src[hi];
            hi += 1;
        }
        at += 1;
    }

    while lo < size {
        dst[at] = src[lo];
        lo += 1;
        at += 1;
    }

    while hi < 2 * size {
        dst[at] = src[hi];
        hi += 1;
        at += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Tree, VlcTable, BINK_TREES};
    use cadenza_core::io::BitReaderRtl;

    #[test]
    fn verify_two_level_lookup() {
        // A code set whose long codes spill into a sub-table: symbol 0 is the single bit 0,
        // symbols 1 and 2 are the 3-bit codes 1,1,0 and 1,1,1 behind the shared 2-bit prefix.
        let table = VlcTable::new(&[0x0, 0x3, 0x7], &[1, 3, 3], 2);

        let buf = [0b0111_0110u8];
        let mut bs = BitReaderRtl::new(&buf);

        assert_eq!(table.read(&mut bs).unwrap(), 0);
        assert_eq!(bs.pos(), 1);
        assert_eq!(table.read(&mut bs).unwrap(), 1);
        assert_eq!(bs.pos(), 4);
        assert_eq!(table.read(&mut bs).unwrap(), 2);
        assert_eq!(bs.pos(), 7);
    }

    #[test]
    fn verify_tree_0_is_identity() {
        // Tree 0 assigns 4-bit codes equal to the symbol values.
        let buf: Vec<u8> = (0..=255u8).collect();
        let mut bs = BitReaderRtl::new(&buf);

        for byte in 0..=255u16 {
            let lo = BINK_TREES[0].read(&mut bs).unwrap();
            let hi = BINK_TREES[0].read(&mut bs).unwrap();
            assert_eq!(u16::from(lo) | u16::from(hi) << 4, byte);
        }
    }

    #[test]
    fn verify_tree_codewords() {
        // Tree 8 has lengths [1, 2, 5, 5, 6, ...]: symbol 0 is a single 0 bit and symbol 1 the
        // bits 1,0.
        let buf = [0b0000_0100u8];
        let mut bs = BitReaderRtl::new(&buf);

        assert_eq!(BINK_TREES[8].read(&mut bs).unwrap(), 0);
        assert_eq!(BINK_TREES[8].read(&mut bs).unwrap(), 0);
        assert_eq!(BINK_TREES[8].read(&mut bs).unwrap(), 1);
        assert_eq!(bs.pos(), 4);
    }

    #[test]
    fn verify_tree_header_identity() {
        // A zero tree index selects the identity permutation and consumes nothing else.
        let buf = [0x00u8, 0x00];
        let mut bs = BitReaderRtl::new(&buf);

        let tree = Tree::read(&mut bs).unwrap();
        assert_eq!(tree.vlc_num, 0);
        assert_eq!(bs.pos(), 4);

        for (i, s) in tree.syms.iter().enumerate() {
            assert_eq!(*s, i as u8);
        }
    }

    #[test]
    fn verify_tree_header_explicit_list() {
        // Tree index 1, explicit-list flag, two listed symbols (5 then 0), remainder in natural
        // order.
        let mut word = 0u32;
        let mut at = 0;
        let mut put = |v: u32, n: u32| {
            word |= v << at;
            at += n;
        };

        put(1, 4); // vlc_num
        put(1, 1); // explicit list
        put(1, 3); // len - 1
        put(5, 4); // symbol 0
        put(0, 4); // symbol 1

        let buf = word.to_le_bytes();
        let mut bs = BitReaderRtl::new(&buf);

        let tree = Tree::read(&mut bs).unwrap();
        assert_eq!(tree.vlc_num, 1);
        assert_eq!(
            tree.syms,
            [5, 0, 1, 2, 3, 4, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
        );
    }
}
