// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module implements the Bink audio decoder.
//!
//! Bink audio is a subband codec: a quantised spectrum is dequantised per critical band and
//! transformed to the time domain with either an overlapped DCT-III or an overlapped inverse
//! RDFT, then cross-faded with the tail of the previous frame. The RDFT variant interleaves the
//! channels into one wide pseudo-channel up-front; the DCT variant codes channels separately.

use cadenza_core::codecs::{
    CodecParameters, CODEC_TYPE_BINK_AUDIO_DCT, CODEC_TYPE_BINK_AUDIO_RDFT,
};
use cadenza_core::dsp::dct::DctIii;
use cadenza_core::dsp::rdft::Rdft;
use cadenza_core::errors::{decode_error, unsupported_error, Result};
use cadenza_core::formats::Packet;
use cadenza_core::io::BitReaderRtl;

use log::debug;

/// Band edges are derived from the critical frequencies of the ear, in Hz.
const CRITICAL_FREQS: [u32; 25] = [
    100, 200, 300, 400, 510, 630, 770, 920, 1080, 1270, 1480, 1720, 2000, 2320, 2700, 3150, 3700,
    4400, 5300, 6400, 7700, 9500, 12000, 15500, 24500,
];

/// Coefficient group lengths selected by the 4-bit RLE index, in units of 8 bins.
const GROUP_RLE_LENS: [u32; 16] = [2, 3, 4, 5, 6, 8, 9, 10, 11, 12, 13, 14, 15, 16, 32, 64];

/// The number of entries in the quantiser lookup table.
const NUM_QUANTS: usize = 96;

/// `0.066399999 / log10(e)`: the quantiser LUT advances by 0.664 dB per step.
const QUANT_STEP: f32 = 0.152_891_647_872_219_54;

enum Transform {
    Dct(DctIii),
    Rdft(Rdft),
}

/// Bink audio decoder for one track.
pub struct BinkAudioDecoder {
    /// The output sample rate. For the RDFT variant this is the container rate multiplied by
    /// the channel count.
    sample_rate: u32,
    /// The number of coded channels. 1 for the RDFT variant.
    channels: usize,
    frame_len: usize,
    overlap_len: usize,
    root: f32,
    quant_table: [f32; NUM_QUANTS],
    num_bands: usize,
    bands: [usize; 26],
    transform: Transform,
    /// Per-channel transform output of the current block.
    samples: Vec<Vec<f32>>,
    /// Per-channel overlap tail of the previous block.
    previous: Vec<Vec<f32>>,
    first: bool,
    out: Vec<f32>,
}

impl BinkAudioDecoder {
    /// Attempts to instantiate a decoder from the track's codec parameters.
    pub fn try_new(params: &CodecParameters) -> Result<Self> {
        let use_dct = match params.codec {
            CODEC_TYPE_BINK_AUDIO_DCT => true,
            CODEC_TYPE_BINK_AUDIO_RDFT => false,
            _ => return unsupported_error("bink: invalid codec type"),
        };

        let mut sample_rate = match params.sample_rate {
            Some(rate) if rate > 0 => rate,
            _ => return decode_error("bink: invalid sample rate"),
        };

        let mut channels = params.n_channels.unwrap_or(0) as usize;

        if channels < 1 || channels > 2 {
            return decode_error("bink: invalid number of channels");
        }

        let mut frame_len_bits = if sample_rate < 22050 {
            9
        }
        else if sample_rate < 44100 {
            10
        }
        else {
            11
        };

        if !use_dct {
            // The RDFT variant is coded as a single channel at a multiple of the sample rate.
            sample_rate = match sample_rate.checked_mul(channels as u32) {
                Some(rate) => rate,
                None => return decode_error("bink: too many audio samples"),
            };

            frame_len_bits += log2(channels as u32);
            channels = 1;
        }

        let frame_len = 1usize << frame_len_bits;
        let overlap_len = frame_len / 16;

        let root = if use_dct {
            frame_len as f32 / ((frame_len as f32).sqrt() * 32768.0)
        }
        else {
            2.0 / ((frame_len as f32).sqrt() * 32768.0)
        };

        let mut quant_table = [0f32; NUM_QUANTS];
        for (i, q) in quant_table.iter_mut().enumerate() {
            *q = (i as f32 * QUANT_STEP).exp() * root;
        }

        // Count the critical bands below half the sample rate.
        let sample_rate_half = (sample_rate + 1) / 2;

        let mut num_bands = 1;
        while num_bands < 25 {
            if sample_rate_half <= CRITICAL_FREQS[num_bands - 1] {
                break;
            }
            num_bands += 1;
        }

        let mut bands = [0usize; 26];
        bands[0] = 2;
        for i in 1..num_bands {
            bands[i] =
                (CRITICAL_FREQS[i - 1] as usize * frame_len / sample_rate_half as usize) & !1;
        }
        bands[num_bands] = frame_len;

        let transform = if use_dct {
            Transform::Dct(DctIii::new(frame_len_bits))
        }
        else {
            Transform::Rdft(Rdft::new(frame_len_bits, false))
        };

        debug!(
            "bink audio: {} hz, {} ch, frame {} ({} overlap), {}",
            sample_rate,
            channels,
            frame_len,
            overlap_len,
            if use_dct { "dct" } else { "rdft" }
        );

        Ok(BinkAudioDecoder {
            sample_rate,
            channels,
            frame_len,
            overlap_len,
            root,
            quant_table,
            num_bands,
            bands,
            transform,
            samples: vec![vec![0f32; frame_len]; channels],
            previous: vec![vec![0f32; overlap_len]; channels],
            first: true,
            out: Vec::new(),
        })
    }

    /// The output sample rate of the interleaved samples.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of interleaved output channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The number of samples produced per coded block, per channel.
    pub fn samples_per_block(&self) -> usize {
        self.frame_len - self.overlap_len
    }

    /// Resets the decoder for a discontinuity: the next block plays without a cross-fade.
    pub fn reset(&mut self) {
        self.first = true;
        for prev in self.previous.iter_mut() {
            prev.fill(0.0);
        }
    }

    /// Decodes one audio packet, returning the decoded samples interleaved across channels.
    ///
    /// An empty packet (a frame with no audio payload for this track) decodes to no samples.
    pub fn decode(&mut self, packet: &Packet) -> Result<&[f32]> {
        self.out.clear();

        if packet.buf().is_empty() {
            return Ok(&self.out);
        }

        let mut bs = BitReaderRtl::new(packet.buf());

        // The payload leads with the decoded size in bytes; the block loop is bounded by the
        // packet instead.
        bs.ignore_bits(32)?;

        loop {
            self.decode_block(&mut bs)?;

            let size = self.frame_len - self.overlap_len;

            if self.channels == 1 {
                self.out.extend_from_slice(&self.samples[0][..size]);
            }
            else {
                for i in 0..size {
                    self.out.push(self.samples[0][i]);
                    self.out.push(self.samples[1][i]);
                }
            }

            bs.align_32bit()?;
            if bs.bits_left() == 0 {
                break;
            }
        }

        Ok(&self.out)
    }

    fn decode_block(&mut self, bs: &mut BitReaderRtl<'_>) -> Result<()> {
        let mut quant = [0f32; 25];

        if matches!(self.transform, Transform::Dct(_)) {
            bs.ignore_bits(2)?;
        }

        for ch in 0..self.channels {
            let coeffs = &mut self.samples[ch];

            coeffs[0] = bs.read_float()? * self.root;
            coeffs[1] = bs.read_float()? * self.root;

            for q in quant.iter_mut().take(self.num_bands) {
                let value = bs.read_bits_leq32(8)? as usize;
                *q = self.quant_table[value.min(NUM_QUANTS - 1)];
            }

            // Walk the coefficient groups, tracking the current band's quantiser.
            let mut k = 0;
            let mut q = quant[0];

            let mut i = 2;

            while i < self.frame_len {
                let j = if bs.read_bit()? {
                    let idx = bs.read_bits_leq32(4)? as usize;
                    i + (GROUP_RLE_LENS[idx] as usize) * 8
                }
                else {
                    i + 8
                };

                let j = j.min(self.frame_len);

                let width = bs.read_bits_leq32(4)?;

                if width == 0 {
                    coeffs[i..j].fill(0.0);
                    i = j;
                    while self.bands[k] < i {
                        q = quant[k];
                        k += 1;
                    }
                }
                else {
                    while i < j {
                        if self.bands[k] == i {
                            q = quant[k];
                            k += 1;
                        }

                        let coeff = bs.read_bits_leq32(width)?;

                        if coeff != 0 {
                            if bs.read_bit()? {
                                coeffs[i] = -q * coeff as f32;
                            }
                            else {
                                coeffs[i] = q * coeff as f32;
                            }
                        }
                        else {
                            coeffs[i] = 0.0;
                        }

                        i += 1;
                    }
                }
            }

            match &mut self.transform {
                Transform::Dct(dct) => {
                    coeffs[0] *= 2.0;
                    dct.calc(coeffs);
                }
                Transform::Rdft(rdft) => rdft.calc(coeffs, false),
            }
        }

        // Cross-fade with the tail of the previous block, then bank the new tail.
        let count = self.overlap_len * self.channels;

        for ch in 0..self.channels {
            let samples = &mut self.samples[ch];
            let previous = &mut self.previous[ch];

            if !self.first {
                let mut j = ch;

                for i in 0..self.overlap_len {
                    samples[i] = (previous[i] * (count - j) as f32 + samples[i] * j as f32)
                        / count as f32;
                    j += self.channels;
                }
            }

            previous.copy_from_slice(&samples[self.frame_len - self.overlap_len..]);
        }

        self.first = false;

        Ok(())
    }
}

fn log2(v: u32) -> u32 {
    31 - v.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::BinkAudioDecoder;
    use cadenza_core::codecs::{
        CodecParameters, CODEC_TYPE_BINK_AUDIO_DCT, CODEC_TYPE_BINK_AUDIO_RDFT,
    };
    use cadenza_core::formats::Packet;

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

        fn align32(&mut self) {
            while self.at & 0x1f != 0 {
                self.put(0, 1);
            }
        }

        fn finish(mut self) -> Vec<u8> {
            self.align32();
            self.buf
        }
    }

    fn rdft_params(rate: u32, channels: u32) -> CodecParameters {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_BINK_AUDIO_RDFT)
            .with_sample_rate(rate)
            .with_n_channels(channels);
        params
    }

    fn dct_params(rate: u32, channels: u32) -> CodecParameters {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_BINK_AUDIO_DCT)
            .with_sample_rate(rate)
            .with_n_channels(channels);
        params
    }

    /// Writes one all-zero coded block for the given decoder layout.
    fn put_zero_block(bw: &mut BitWriter, dct: bool, channels: usize, frame_len: usize, bands: usize) {
        if dct {
            bw.put(0, 2);
        }

        for _ in 0..channels {
            // Two leading coefficients: zero floats (29 bits each).
            bw.put(0, 29);
            bw.put(0, 29);

            // Per-band quantiser indices.
            for _ in 0..bands {
                bw.put(0, 8);
            }

            // Groups of 8 bins, each with a zero width.
            let mut i = 2;
            while i < frame_len {
                bw.put(0, 1); // no RLE
                bw.put(0, 4); // width 0: the whole group is zero
                i += 8;
            }
        }
    }

    #[test]
    fn verify_zero_spectrum_decodes_to_silence() {
        // Mono 22050 Hz selects a 1024-sample frame.
        let mut dec = BinkAudioDecoder::try_new(&rdft_params(22050, 1)).unwrap();
        assert_eq!(dec.samples_per_block(), 1024 - 64);

        let mut bw = BitWriter::new();
        bw.put(0, 32); // reported decoded size
        put_zero_block(&mut bw, false, 1, 1024, dec.num_bands);

        let packet = Packet::new_from_boxed_slice(1, 0, 1, true, bw.finish().into_boxed_slice());

        let samples = dec.decode(&packet).unwrap();
        assert_eq!(samples.len(), 1024 - 64);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_stereo_dct_output_length() {
        // Stereo 44100 Hz DCT: a 2048-sample frame per channel, interleaved on output.
        let mut dec = BinkAudioDecoder::try_new(&dct_params(44100, 2)).unwrap();
        assert_eq!(dec.channels(), 2);

        let mut bw = BitWriter::new();
        bw.put(0, 32);
        put_zero_block(&mut bw, true, 2, 2048, dec.num_bands);

        let packet = Packet::new_from_boxed_slice(1, 0, 1, true, bw.finish().into_boxed_slice());

        let samples = dec.decode(&packet).unwrap();
        assert_eq!(samples.len(), 2 * (2048 - 128));
    }

    #[test]
    fn verify_rdft_folds_channels() {
        // Stereo RDFT is decoded as one pseudo-channel at twice the rate.
        let dec = BinkAudioDecoder::try_new(&rdft_params(22050, 2)).unwrap();
        assert_eq!(dec.channels(), 1);
        assert_eq!(dec.sample_rate(), 44100);
        // 1024 doubled by the folded channel.
        assert_eq!(dec.samples_per_block(), 2048 - 128);
    }

    #[test]
    fn verify_overlap_add_midpoint() {
        // Two identical constant blocks: at the midpoint of the overlap region the cross-fade
        // weights sum to one, so the output equals the constant itself.
        let mut dec = BinkAudioDecoder::try_new(&rdft_params(11025, 1)).unwrap();

        let frame_len = 512;
        let overlap = frame_len / 16;

        // A DC-only spectrum decodes to a constant signal: bin 0 is the only nonzero float.
        // value = 2^4 with exponent 23 keeps the mantissa path simple.
        let mut bw = BitWriter::new();
        bw.put(0, 32);

        for _ in 0..2 {
            // float: exponent 23, mantissa 16, positive -> 16.0.
            bw.put(23, 5);
            bw.put(16, 23);
            bw.put(0, 1);
            // Second leading coefficient: zero.
            bw.put(0, 29);

            for _ in 0..dec.num_bands {
                bw.put(0, 8);
            }

            let mut i = 2;
            while i < frame_len {
                bw.put(0, 1);
                bw.put(0, 4);
                i += 8;
            }

            bw.align32();
        }

        let packet = Packet::new_from_boxed_slice(1, 0, 1, true, bw.finish().into_boxed_slice());

        let samples = dec.decode(&packet).unwrap().to_vec();
        assert_eq!(samples.len(), 2 * (frame_len - overlap));

        // The first block plays without a fade. The second block's overlap head is the linear
        // blend of the previous tail and its own head; with identical constant blocks every
        // blend weight pair sums to one, so the whole output must stay flat through the seam.
        let first = samples[0];
        assert!(first != 0.0);
        for &s in &samples {
            assert!((s - first).abs() < 1e-5);
        }
    }

    #[test]
    fn verify_channel_bounds() {
        assert!(BinkAudioDecoder::try_new(&rdft_params(22050, 0)).is_err());
        assert!(BinkAudioDecoder::try_new(&rdft_params(22050, 3)).is_err());
    }
}
