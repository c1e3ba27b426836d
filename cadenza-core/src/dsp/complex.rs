// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `complex` module implements a 32-bit floating point complex number.

/// A complex number.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Complex {
    /// The real component.
    pub re: f32,
    /// The imaginary component.
    pub im: f32,
}

impl Complex {
    /// Create a new complex number.
    pub fn new(re: f32, im: f32) -> Self {
        Complex { re, im }
    }

    /// Create a complex number with a value of `0 + j0`.
    pub fn zero() -> Self {
        Complex { re: 0.0, im: 0.0 }
    }

    /// Create a unit-magnitude complex number at the given angle in radians.
    pub fn from_angle(angle: f32) -> Self {
        Complex { re: angle.cos(), im: angle.sin() }
    }

    /// Scale the complex number by a real factor.
    pub fn scale(&self, scale: f32) -> Self {
        Complex { re: self.re * scale, im: self.im * scale }
    }
}
