// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rdft` module implements the real-input discrete Fourier transform (RDFT).
//!
//! The transform operates on a packed half-spectrum: element 0 holds the DC term, element 1
//! holds the (real) Nyquist term, and elements `2i`/`2i+1` hold the real and imaginary parts of
//! bin `i`. It is computed with a half-length complex FFT plus pre-twiddling.

use super::complex::Complex;
use super::fft::{cos_table, Fft};

/// The real-input discrete Fourier transform (RDFT).
pub struct Rdft {
    nbits: u32,
    fft: Fft,
    buf: Box<[Complex]>,
}

impl Rdft {
    /// Instantiate an N-point RDFT where `n = 2^nbits`. `inverse` selects the permutation of the
    /// underlying complex FFT.
    ///
    /// The value of `nbits` must lie between 3 and 18, giving a complex FFT between 4 and
    /// `Fft::MAX_SIZE` points.
    pub fn new(nbits: u32, inverse: bool) -> Self {
        assert!((3..=18).contains(&nbits), "rdft size out of range");

        let half = 1usize << (nbits - 1);

        Rdft { nbits, fft: Fft::new(half, inverse), buf: vec![Complex::default(); half].into_boxed_slice() }
    }

    /// Get the size of the RDFT.
    pub fn size(&self) -> usize {
        1 << self.nbits
    }

    /// Calculate the transform in-place. `negative_sign` selects the sign convention of the
    /// twiddle factors.
    pub fn calc(&mut self, data: &mut [f32], negative_sign: bool) {
        let n = 1usize << self.nbits;
        assert_eq!(data.len(), n);

        let k1 = 0.5f32;
        let k2 = -0.5f32;

        let tab = cos_table(self.nbits);
        let tsin = (1usize << self.nbits) >> 2;

        let sign = if negative_sign { -1.0f32 } else { 1.0f32 };

        // Bin 0 is a special case because of the packing: the DC term is real, and the (also
        // real) Nyquist term rides along with it.
        let ev_re = data[0];
        data[0] = ev_re + data[1];
        data[1] = ev_re - data[1];

        let mut i = 1;

        while i < n >> 2 {
            let i1 = 2 * i;
            let i2 = n - i1;

            let ev_re = k1 * (data[i1] + data[i2]);
            let od_im = k2 * (data[i2] - data[i1]);
            let ev_im = k1 * (data[i1 + 1] - data[i2 + 1]);
            let od_re = k2 * (data[i1 + 1] + data[i2 + 1]);

            let odsum_re = od_re * tab[i] + sign * od_im * tab[tsin + i];
            let odsum_im = od_im * tab[i] - sign * od_re * tab[tsin + i];

            data[i1] = ev_re + odsum_re;
            data[i1 + 1] = ev_im + odsum_im;
            data[i2] = ev_re - odsum_re;
            data[i2 + 1] = odsum_im - ev_im;

            i += 1;
        }

        data[0] *= k1;
        data[1] *= k1;
        data[2 * i + 1] *= sign;

        // Permute and transform the packed data as half-size complex.
        for (c, pair) in self.buf.iter_mut().zip(data.chunks_exact(2)) {
            *c = Complex::new(pair[0], pair[1]);
        }

        self.fft.permute(&mut self.buf);
        self.fft.calc(&mut self.buf);

        for (pair, c) in data.chunks_exact_mut(2).zip(self.buf.iter()) {
            pair[0] = c.re;
            pair[1] = c.im;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Rdft;
    use std::f64;

    /// Evaluates the packed half-spectrum as a real signal: the inverse real DFT without the
    /// 2/N normalisation.
    fn inverse_rdft_naive(spectrum: &[f32]) -> Vec<f32> {
        let n = spectrum.len();
        let w = 2.0 * f64::consts::PI / n as f64;

        (0..n)
            .map(|m| {
                let mut sum = 0.5 * f64::from(spectrum[0]);

                sum += 0.5 * f64::from(spectrum[1]) * if m & 1 == 0 { 1.0 } else { -1.0 };

                for j in 1..n / 2 {
                    let (sin, cos) = (w * (j * m) as f64).sin_cos();
                    sum += f64::from(spectrum[2 * j]) * cos;
                    sum -= f64::from(spectrum[2 * j + 1]) * sin;
                }

                sum as f32
            })
            .collect()
    }

    #[test]
    fn verify_rdft_against_naive() {
        let n = 64usize;

        let mut state = 0x8badf00du32;
        let mut next = || {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 8) as f32 / (1 << 24) as f32 - 0.5
        };

        let mut data: Vec<f32> = (0..n).map(|_| next()).collect();
        let expected = inverse_rdft_naive(&data);

        let mut rdft = Rdft::new(6, false);
        rdft.calc(&mut data, false);

        for (a, e) in data.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-4, "{} != {}", a, e);
        }
    }

    #[test]
    fn verify_rdft_single_bin() {
        // A single real bin reconstructs as a cosine.
        let n = 32usize;

        let mut data = vec![0f32; n];
        data[2] = 1.0;

        let mut rdft = Rdft::new(5, false);
        rdft.calc(&mut data, false);

        let w = 2.0 * f64::consts::PI / n as f64;

        for (m, a) in data.iter().enumerate() {
            let expected = (w * m as f64).cos() as f32;
            assert!((a - expected).abs() < 1e-5);
        }
    }
}
