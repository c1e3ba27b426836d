// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `fft` module implements the Fast Fourier Transform (FFT).
//!
//! The FFT is implemented with the conjugate split-radix algorithm, with specialised bases for
//! the 4, 8, and 16 point transforms, and supports sizes up-to 131072. Input must be permuted
//! with the split-radix permutation before calling the transform.

use std::f64;

use lazy_static::lazy_static;

use super::complex::Complex;

macro_rules! fft_cos_table {
    ($bits:expr, $name:ident) => {
        lazy_static! {
            static ref $name: Box<[f32]> = {
                let n = 1usize << $bits;
                let freq = 2.0 * f64::consts::PI / n as f64;

                let mut tab = vec![0f32; n].into_boxed_slice();

                for (i, t) in tab.iter_mut().enumerate().take(n / 4 + 1) {
                    *t = (freq * i as f64).cos() as f32;
                }
                for i in 1..n / 4 {
                    tab[n / 2 - i] = tab[i];
                }

                tab
            };
        }
    };
}

fft_cos_table!(2, FFT_COS_TABLE_4);
fft_cos_table!(3, FFT_COS_TABLE_8);
fft_cos_table!(4, FFT_COS_TABLE_16);
fft_cos_table!(5, FFT_COS_TABLE_32);
fft_cos_table!(6, FFT_COS_TABLE_64);
fft_cos_table!(7, FFT_COS_TABLE_128);
fft_cos_table!(8, FFT_COS_TABLE_256);
fft_cos_table!(9, FFT_COS_TABLE_512);
fft_cos_table!(10, FFT_COS_TABLE_1024);
fft_cos_table!(11, FFT_COS_TABLE_2048);
fft_cos_table!(12, FFT_COS_TABLE_4096);
fft_cos_table!(13, FFT_COS_TABLE_8192);
fft_cos_table!(14, FFT_COS_TABLE_16384);
fft_cos_table!(15, FFT_COS_TABLE_32768);
fft_cos_table!(16, FFT_COS_TABLE_65536);
fft_cos_table!(17, FFT_COS_TABLE_131072);

/// Gets the shared cosine table for a transform of `2^bits` points.
///
/// The table contains `cos(2*pi*i / 2^bits)` for the first quarter period, mirrored into the
/// second quarter. The upper half of the table is unused and zero.
pub(super) fn cos_table(bits: u32) -> &'static [f32] {
    match bits {
        2 => FFT_COS_TABLE_4.as_ref(),
        3 => FFT_COS_TABLE_8.as_ref(),
        4 => FFT_COS_TABLE_16.as_ref(),
        5 => FFT_COS_TABLE_32.as_ref(),
        6 => FFT_COS_TABLE_64.as_ref(),
        7 => FFT_COS_TABLE_128.as_ref(),
        8 => FFT_COS_TABLE_256.as_ref(),
        9 => FFT_COS_TABLE_512.as_ref(),
        10 => FFT_COS_TABLE_1024.as_ref(),
        11 => FFT_COS_TABLE_2048.as_ref(),
        12 => FFT_COS_TABLE_4096.as_ref(),
        13 => FFT_COS_TABLE_8192.as_ref(),
        14 => FFT_COS_TABLE_16384.as_ref(),
        15 => FFT_COS_TABLE_32768.as_ref(),
        16 => FFT_COS_TABLE_65536.as_ref(),
        17 => FFT_COS_TABLE_131072.as_ref(),
        _ => panic!("fft size too large"),
    }
}

/// The complex Fast Fourier Transform (FFT).
pub struct Fft {
    revtab: Box<[u32]>,
    tmp: Box<[Complex]>,
}

impl Fft {
    /// The maximum FFT size.
    pub const MAX_SIZE: usize = 1 << 17;

    /// Instantiate an N-point FFT. `inverse` selects the permutation used by inverse-oriented
    /// consumers of the transform.
    ///
    /// The value of `n` must be a power-of-two between 4 and `Fft::MAX_SIZE`.
    pub fn new(n: usize, inverse: bool) -> Self {
        // The FFT size must be a power of two.
        assert!(n.is_power_of_two(), "fft size must be a power-of-two");
        assert!(n >= 4 && n <= Fft::MAX_SIZE, "fft size out of range");

        // Calculate the split-radix permutation table.
        let mut revtab = vec![0u32; n].into_boxed_slice();

        for i in 0..n {
            let j = -split_radix_permutation(i as i32, n as i32, inverse) & (n as i32 - 1);
            revtab[j as usize] = i as u32;
        }

        Self { revtab, tmp: vec![Complex::default(); n].into_boxed_slice() }
    }

    /// Get the size of the FFT.
    pub fn size(&self) -> usize {
        self.revtab.len()
    }

    /// Applies the split-radix input permutation in-place.
    pub fn permute(&mut self, z: &mut [Complex]) {
        assert_eq!(z.len(), self.revtab.len());

        // TODO: handle the split-radix permutation in-place.
        for (x, &j) in z.iter().zip(self.revtab.iter()) {
            self.tmp[j as usize] = *x;
        }

        z.copy_from_slice(&self.tmp);
    }

    /// Calculate the transform of permuted input in-place.
    pub fn calc(&self, z: &mut [Complex]) {
        assert_eq!(z.len(), self.revtab.len());
        fft_dispatch(z);
    }
}

fn split_radix_permutation(i: i32, n: i32, inverse: bool) -> i32 {
    if n <= 2 {
        return i & 1;
    }

    let m = n >> 1;

    if i & m == 0 {
        return split_radix_permutation(i, m, inverse) * 2;
    }

    let m = m >> 1;

    if inverse == (i & m == 0) {
        split_radix_permutation(i, m, inverse) * 4 + 1
    }
    else {
        split_radix_permutation(i, m, inverse) * 4 - 1
    }
}

#[inline(always)]
fn butterflies(
    z: &mut [Complex],
    i0: usize,
    i1: usize,
    i2: usize,
    i3: usize,
    t1: f32,
    t2: f32,
    t5: f32,
    t6: f32,
) {
    let t3 = t5 - t1;
    let t5 = t5 + t1;
    let t4 = t2 - t6;
    let t6 = t2 + t6;

    let a0 = z[i0];
    let a1 = z[i1];

    z[i2].re = a0.re - t5;
    z[i0].re = a0.re + t5;
    z[i3].im = a1.im - t3;
    z[i1].im = a1.im + t3;
    z[i3].re = a1.re - t4;
    z[i1].re = a1.re + t4;
    z[i2].im = a0.im - t6;
    z[i0].im = a0.im + t6;
}

#[inline(always)]
fn transform(
    z: &mut [Complex],
    i0: usize,
    i1: usize,
    i2: usize,
    i3: usize,
    wre: f32,
    wim: f32,
) {
    let a2 = z[i2];
    let a3 = z[i3];

    let t1 = a2.re * wre + a2.im * wim;
    let t2 = a2.im * wre - a2.re * wim;
    let t5 = a3.re * wre - a3.im * wim;
    let t6 = a3.im * wre + a3.re * wim;

    butterflies(z, i0, i1, i2, i3, t1, t2, t5, t6);
}

#[inline(always)]
fn transform_zero(z: &mut [Complex], i0: usize, i1: usize, i2: usize, i3: usize) {
    let a2 = z[i2];
    let a3 = z[i3];
    butterflies(z, i0, i1, i2, i3, a2.re, a2.im, a3.re, a3.im);
}

fn fft4(z: &mut [Complex]) {
    let t3 = z[0].re - z[1].re;
    let t1 = z[0].re + z[1].re;
    let t8 = z[3].re - z[2].re;
    let t6 = z[3].re + z[2].re;
    let t4 = z[0].im - z[1].im;
    let t2 = z[0].im + z[1].im;
    let t7 = z[2].im - z[3].im;
    let t5 = z[2].im + z[3].im;

    z[2].re = t1 - t6;
    z[0].re = t1 + t6;
    z[3].im = t4 - t8;
    z[1].im = t4 + t8;
    z[3].re = t3 - t7;
    z[1].re = t3 + t7;
    z[2].im = t2 - t5;
    z[0].im = t2 + t5;
}

fn fft8(z: &mut [Complex]) {
    fft4(z);

    let t1 = z[4].re + z[5].re;
    z[5].re = z[4].re - z[5].re;
    let t2 = z[4].im + z[5].im;
    z[5].im = z[4].im - z[5].im;
    let t5 = z[6].re + z[7].re;
    z[7].re = z[6].re - z[7].re;
    let t6 = z[6].im + z[7].im;
    z[7].im = z[6].im - z[7].im;

    butterflies(z, 0, 2, 4, 6, t1, t2, t5, t6);

    let sqrt_half = std::f32::consts::FRAC_1_SQRT_2;
    transform(z, 1, 3, 5, 7, sqrt_half, sqrt_half);
}

fn fft16(z: &mut [Complex]) {
    let cos_16_1 = cos_table(4)[1];
    let cos_16_3 = cos_table(4)[3];

    fft8(&mut z[..8]);
    fft4(&mut z[8..12]);
    fft4(&mut z[12..16]);

    transform_zero(z, 0, 4, 8, 12);
    let sqrt_half = std::f32::consts::FRAC_1_SQRT_2;
    transform(z, 2, 6, 10, 14, sqrt_half, sqrt_half);
    transform(z, 1, 5, 9, 13, cos_16_1, cos_16_3);
    transform(z, 3, 7, 11, 15, cos_16_3, cos_16_1);
}

fn fft_pass(z: &mut [Complex], w: &[f32], mut n: usize) {
    let o1 = 2 * n;
    let o2 = 4 * n;
    let o3 = 6 * n;

    let mut wre = 0;
    let mut wim = o1;

    n -= 1;

    transform_zero(z, 0, o1, o2, o3);
    transform(z, 1, 1 + o1, 1 + o2, 1 + o3, w[wre + 1], w[wim - 1]);

    let mut base = 0;

    while n > 0 {
        base += 2;
        wre += 2;
        wim -= 2;

        transform(z, base, base + o1, base + o2, base + o3, w[wre], w[wim]);
        transform(z, base + 1, base + 1 + o1, base + 1 + o2, base + 1 + o3, w[wre + 1], w[wim - 1]);

        n -= 1;
    }
}

fn fft_dispatch(z: &mut [Complex]) {
    let n = z.len();

    match n {
        4 => fft4(z),
        8 => fft8(z),
        16 => fft16(z),
        _ => {
            let n4 = n / 4;

            {
                let (head, rest) = z.split_at_mut(2 * n4);
                let (third, fourth) = rest.split_at_mut(n4);

                fft_dispatch(head);
                fft_dispatch(third);
                fft_dispatch(fourth);
            }

            fft_pass(z, cos_table(n.trailing_zeros()), n / 8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::complex::Complex;
    use super::Fft;
    use std::f64;

    /// A naive O(N^2) forward DFT.
    fn dft_naive(x: &[Complex]) -> Vec<Complex> {
        let n = x.len();
        let step = -2.0 * f64::consts::PI / n as f64;

        (0..n)
            .map(|k| {
                let mut sum_re = 0.0f64;
                let mut sum_im = 0.0f64;

                for (j, c) in x.iter().enumerate() {
                    let (sin, cos) = (step * (k * j) as f64).sin_cos();
                    sum_re += f64::from(c.re) * cos - f64::from(c.im) * sin;
                    sum_im += f64::from(c.re) * sin + f64::from(c.im) * cos;
                }

                Complex::new(sum_re as f32, sum_im as f32)
            })
            .collect()
    }

    fn lcg_signal(len: usize, mut state: u32) -> Vec<Complex> {
        let mut next = || {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 8) as f32 / (1 << 24) as f32 - 0.5
        };
        (0..len).map(|_| Complex::new(next(), next())).collect()
    }

    fn assert_complex_eq(a: &[Complex], b: &[Complex], epsilon: f32) {
        for (x, y) in a.iter().zip(b) {
            assert!((x.re - y.re).abs() < epsilon, "{:?} != {:?}", x, y);
            assert!((x.im - y.im).abs() < epsilon, "{:?} != {:?}", x, y);
        }
    }

    #[test]
    fn verify_fft_against_naive_dft() {
        for bits in 2..=7 {
            let n = 1 << bits;

            let mut actual = lcg_signal(n, 0x1234_5678 + n as u32);
            let expected = dft_naive(&actual);

            let mut fft = Fft::new(n, false);
            fft.permute(&mut actual);
            fft.calc(&mut actual);

            assert_complex_eq(&actual, &expected, 1e-3);
        }
    }

    #[test]
    fn verify_fft_impulse() {
        for bits in 3..=17 {
            let n = 1usize << bits;
            let k = n / 3;

            let mut z = vec![Complex::default(); n];
            z[k] = Complex::new(1.0, 0.0);

            let mut fft = Fft::new(n, false);
            fft.permute(&mut z);
            fft.calc(&mut z);

            for (j, x) in z.iter().enumerate() {
                // Reduce k*j modulo N before the trigonometry so large transforms do not lose
                // the angle to rounding.
                let theta = -2.0 * f64::consts::PI * ((k * j) % n) as f64 / n as f64;

                assert!((x.re - theta.cos() as f32).abs() < 1e-4);
                assert!((x.im - theta.sin() as f32).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn verify_fft_inverse_composition() {
        // The inverse transform is the conjugated forward transform scaled by 1/N.
        let n = 64;

        let signal = lcg_signal(n, 0xcafe_babe);

        let mut z = signal.clone();

        let mut fft = Fft::new(n, false);
        fft.permute(&mut z);
        fft.calc(&mut z);

        for x in z.iter_mut() {
            x.im = -x.im;
        }

        fft.permute(&mut z);
        fft.calc(&mut z);

        let scale = 1.0 / n as f32;

        for x in z.iter_mut() {
            *x = Complex::new(x.re * scale, -x.im * scale);
        }

        assert_complex_eq(&z, &signal, 1e-5);
    }
}
