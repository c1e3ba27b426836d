// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `idct` module implements the 8x8 integer inverse DCT of the Bink video codec.
//!
//! The transform is an AAN-style factorisation with fixed-point multipliers, applied first down
//! the columns and then across the rows. Columns whose AC coefficients are all zero broadcast
//! the DC term directly.

/// `(1/sqrt(2)) << 12`.
const A1: i32 = 2896;
const A2: i32 = 2217;
const A3: i32 = 3784;
const A4: i32 = -5352;

#[inline(always)]
fn mul(x: i32, y: i32) -> i32 {
    x.wrapping_mul(y) >> 11
}

/// The 8-point 1-D transform common to the column and row passes.
#[inline(always)]
fn transform8(src: [i32; 8]) -> [i32; 8] {
    let a0 = src[0] + src[4];
    let a1 = src[0] - src[4];
    let a2 = src[2] + src[6];
    let a3 = mul(A1, src[2] - src[6]);
    let a4 = src[5] + src[3];
    let a5 = src[5] - src[3];
    let a6 = src[1] + src[7];
    let a7 = src[1] - src[7];

    let b0 = a4 + a6;
    let b1 = mul(A3, a5 + a7);
    let b2 = mul(A4, a5) - b0 + b1;
    let b3 = mul(A1, a6 - a4) - b2;
    let b4 = mul(A2, a7) + b3 - b1;

    [
        a0 + a2 + b0,
        a1 + a3 - a2 + b2,
        a1 - a3 + a2 + b3,
        a0 - a2 - b4,
        a0 - a2 + b4,
        a1 - a3 + a2 - b3,
        a1 + a3 - a2 - b2,
        a0 + a2 - b0,
    ]
}

/// The column pass over the whole block, with the zero-AC fast path.
fn idct_cols(block: &[i32; 64]) -> [i32; 64] {
    let mut tmp = [0i32; 64];

    for i in 0..8 {
        let col = [
            block[i],
            block[i + 8],
            block[i + 16],
            block[i + 24],
            block[i + 32],
            block[i + 40],
            block[i + 48],
            block[i + 56],
        ];

        if col[1] | col[2] | col[3] | col[4] | col[5] | col[6] | col[7] == 0 {
            for row in 0..8 {
                tmp[i + 8 * row] = col[0];
            }
        }
        else {
            let out = transform8(col);
            for (row, v) in out.iter().enumerate() {
                tmp[i + 8 * row] = *v;
            }
        }
    }

    tmp
}

#[inline(always)]
fn row_round(x: i32) -> i32 {
    (x + 0x7f) >> 8
}

/// Transforms `block` and stores the result as bytes.
pub fn idct_put(dst: &mut [u8; 64], block: &[i32; 64]) {
    let tmp = idct_cols(block);

    for i in 0..8 {
        let mut row = [0i32; 8];
        row.copy_from_slice(&tmp[8 * i..8 * i + 8]);

        for (j, v) in transform8(row).iter().enumerate() {
            dst[8 * i + j] = row_round(*v) as u8;
        }
    }
}

/// Transforms `block` and adds the result to the prediction already in `dst`.
pub fn idct_add(dst: &mut [u8; 64], block: &[i32; 64]) {
    let tmp = idct_cols(block);

    for i in 0..8 {
        let mut row = [0i32; 8];
        row.copy_from_slice(&tmp[8 * i..8 * i + 8]);

        for (j, v) in transform8(row).iter().enumerate() {
            let at = 8 * i + j;
            dst[at] = dst[at].wrapping_add(row_round(*v) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{idct_put, transform8};

    /// The same flow graph as [`transform8`], computed in floating point.
    fn transform8_ref(src: &[f64; 8]) -> [f64; 8] {
        let m1 = 2896.0 / 2048.0;
        let m2 = 2217.0 / 2048.0;
        let m3 = 3784.0 / 2048.0;
        let m4 = -5352.0 / 2048.0;

        let a0 = src[0] + src[4];
        let a1 = src[0] - src[4];
        let a2 = src[2] + src[6];
        let a3 = m1 * (src[2] - src[6]);
        let a4 = src[5] + src[3];
        let a5 = src[5] - src[3];
        let a6 = src[1] + src[7];
        let a7 = src[1] - src[7];

        let b0 = a4 + a6;
        let b1 = m3 * (a5 + a7);
        let b2 = m4 * a5 - b0 + b1;
        let b3 = m1 * (a6 - a4) - b2;
        let b4 = m2 * a7 + b3 - b1;

        [
            a0 + a2 + b0,
            a1 + a3 - a2 + b2,
            a1 - a3 + a2 + b3,
            a0 - a2 - b4,
            a0 - a2 + b4,
            a1 - a3 + a2 - b3,
            a1 + a3 - a2 - b2,
            a0 + a2 - b0,
        ]
    }

    fn idct_ref(block: &[i32; 64]) -> [f64; 64] {
        let mut tmp = [0f64; 64];
        let mut out = [0f64; 64];

        for i in 0..8 {
            let mut col = [0f64; 8];
            for (r, c) in col.iter_mut().enumerate() {
                *c = f64::from(block[i + 8 * r]);
            }
            for (r, v) in transform8_ref(&col).iter().enumerate() {
                tmp[i + 8 * r] = *v;
            }
        }

        for i in 0..8 {
            let mut row = [0f64; 8];
            row.copy_from_slice(&tmp[8 * i..8 * i + 8]);
            for (c, v) in transform8_ref(&row).iter().enumerate() {
                out[8 * i + c] = (*v + 127.0) / 256.0;
            }
        }

        out
    }

    #[test]
    fn verify_zero_ac_broadcast() {
        // The DC term passes through both 1-D passes unchanged; only the row rounding applies.
        let mut block = [0i32; 64];
        block[0] = 0x800;

        let mut dst = [0u8; 64];
        idct_put(&mut dst, &block);

        assert!(dst.iter().all(|&v| v == ((0x800 + 0x7f) >> 8) as u8));
    }

    #[test]
    fn verify_transform8_dc() {
        let out = transform8([100, 0, 0, 0, 0, 0, 0, 0]);
        assert!(out.iter().all(|&v| v == 100));
    }

    #[test]
    fn verify_against_float_flow_graph() {
        let mut block = [0i32; 64];

        let mut state = 0x2545_f491u32;
        for v in block.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *v = ((state >> 26) as i32) - 32;
        }

        let expected = idct_ref(&block);

        let mut dst = [0u8; 64];
        idct_put(&mut dst, &block);

        for (a, e) in dst.iter().zip(expected.iter()) {
            // The byte output wraps modulo 256; allow a 2 LSB budget for the truncation of
            // the fixed-point multiplier products.
            let e = e.floor() as i64;
            let d = (i64::from(*a) - e).rem_euclid(256);
            assert!(d <= 2 || d >= 254, "{} != {}", a, e);
        }
    }
}
