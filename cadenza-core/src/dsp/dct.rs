// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dct` module implements the type-III Discrete Cosine Transform (DCT-III).
//!
//! The transform rotates coefficient pairs, runs an RDFT in the negative sign convention, and
//! recombines the halves with cosecant-squared factors and a `1/N` scale.

use std::f64;

use super::fft::cos_table;
use super::rdft::Rdft;

/// The type-III Discrete Cosine Transform (DCT-III).
pub struct DctIii {
    nbits: u32,
    rdft: Rdft,
    csc2: Box<[f32]>,
}

impl DctIii {
    /// Instantiate an N-point DCT-III where `n = 2^nbits`.
    ///
    /// The value of `nbits` must lie between 3 and 15.
    pub fn new(nbits: u32) -> Self {
        assert!((3..=15).contains(&nbits), "dct size out of range");

        let half = 1usize << (nbits - 1);

        let csc2 = (0..half)
            .map(|i| {
                let angle = f64::consts::PI / (4 * half) as f64 * (2 * i + 1) as f64;
                (0.5 / angle.sin()) as f32
            })
            .collect();

        DctIii { nbits, rdft: Rdft::new(nbits, true), csc2 }
    }

    /// Get the size of the DCT.
    pub fn size(&self) -> usize {
        1 << self.nbits
    }

    /// Calculate the transform in-place.
    pub fn calc(&mut self, data: &mut [f32]) {
        let n = 1usize << self.nbits;
        assert_eq!(data.len(), n);

        let costab = cos_table(self.nbits + 2);

        let next = data[n - 1];
        let inv_n = 1.0 / n as f32;

        // Rotate coefficient pairs, walking downward so that each pair is read before it is
        // overwritten.
        let mut i = n - 2;

        while i >= 2 {
            let val1 = data[i];
            let val2 = data[i - 1] - data[i + 1];
            let c = costab[i];
            let s = costab[n - i];

            data[i] = c * val1 + s * val2;
            data[i + 1] = s * val1 - c * val2;

            i -= 2;
        }

        data[1] = 2.0 * next;

        self.rdft.calc(data, true);

        for i in 0..n / 2 {
            let tmp1 = data[i] * inv_n;
            let tmp2 = data[n - i - 1] * inv_n;
            let csc = self.csc2[i] * (tmp1 - tmp2);

            let tmp1 = tmp1 + tmp2;
            data[i] = tmp1 + csc;
            data[n - i - 1] = tmp1 - csc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DctIii;
    use std::f64;

    /// The analytical DCT-III with the transform's 2/N scale.
    fn dct_iii_analytical(x: &[f32]) -> Vec<f32> {
        let n = x.len();
        let w = f64::consts::PI / (2 * n) as f64;

        (0..n)
            .map(|m| {
                let mut sum = 0.5 * f64::from(x[0]);

                for (k, v) in x.iter().enumerate().skip(1) {
                    sum += f64::from(*v) * (w * (k * (2 * m + 1)) as f64).cos();
                }

                (sum * 2.0 / n as f64) as f32
            })
            .collect()
    }

    #[test]
    fn verify_dct_iii_dc() {
        let n = 32usize;

        let mut data = vec![0f32; n];
        data[0] = 8.0;

        let mut dct = DctIii::new(5);
        dct.calc(&mut data);

        for v in data {
            assert!((v - 8.0 / n as f32).abs() < 1e-6);
        }
    }

    #[test]
    fn verify_dct_iii_against_analytical() {
        let n = 64usize;

        let mut state = 0x0badc0deu32;
        let mut next = || {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 8) as f32 / (1 << 24) as f32 - 0.5
        };

        let mut data: Vec<f32> = (0..n).map(|_| next()).collect();
        let expected = dct_iii_analytical(&data);

        let mut dct = DctIii::new(6);
        dct.calc(&mut data);

        for (a, e) in data.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-5, "{} != {}", a, e);
        }
    }
}
