// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codecs` module provides the support structures necessary to describe codecs and
//! instantiate their decoders.

use std::fmt;

use crate::units::TimeBase;

/// A `CodecType` is a unique identifier used to identify a specific codec. `CodecType` is mainly
/// used for matching a format's track to a specific decoder.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct CodecType(u32);

/// Null codec, simply discards all data.
pub const CODEC_TYPE_NULL: CodecType = CodecType(0x0);

/// Bink video ("Bink 1" and "Bink 2" bitstreams, distinguished by the container revision byte).
pub const CODEC_TYPE_BINK_VIDEO: CodecType = CodecType(0x100);

/// Bink audio, overlapped DCT spectral back-end.
pub const CODEC_TYPE_BINK_AUDIO_DCT: CodecType = CodecType(0x200);

/// Bink audio, overlapped RDFT spectral back-end.
pub const CODEC_TYPE_BINK_AUDIO_RDFT: CodecType = CodecType(0x201);

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CODEC_TYPE_NULL => write!(f, "null"),
            CODEC_TYPE_BINK_VIDEO => write!(f, "bink-video"),
            CODEC_TYPE_BINK_AUDIO_DCT => write!(f, "bink-audio-dct"),
            CODEC_TYPE_BINK_AUDIO_RDFT => write!(f, "bink-audio-rdft"),
            _ => write!(f, "{:#x}", self.0),
        }
    }
}

impl fmt::Debug for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// `CodecParameters` describes an elementary stream in sufficient detail to instantiate its
/// decoder. A demuxer fills in the fields relevant to the codec family of the track.
#[derive(Clone, Debug)]
pub struct CodecParameters {
    /// The codec type.
    pub codec: CodecType,

    /// The timebase mapping packet timestamps to seconds.
    pub time_base: Option<TimeBase>,

    /// The total number of frames in the stream.
    pub n_frames: Option<u64>,

    /// Audio: the sample rate in Hz, as stated by the container.
    pub sample_rate: Option<u32>,

    /// Audio: the number of channels.
    pub n_channels: Option<u32>,

    /// Video: the picture width in pixels.
    pub width: Option<u32>,

    /// Video: the picture height in pixels.
    pub height: Option<u32>,

    /// The container revision byte, for codec families that gate bitstream behaviour on it.
    pub revision: Option<u8>,

    /// Video: whether the stream carries an alpha plane.
    pub alpha: Option<bool>,
}

impl CodecParameters {
    pub fn new() -> CodecParameters {
        CodecParameters {
            codec: CODEC_TYPE_NULL,
            time_base: None,
            n_frames: None,
            sample_rate: None,
            n_channels: None,
            width: None,
            height: None,
            revision: None,
            alpha: None,
        }
    }

    /// Provide the `CodecType`.
    pub fn for_codec(&mut self, codec: CodecType) -> &mut Self {
        self.codec = codec;
        self
    }

    /// Provide the `TimeBase`.
    pub fn with_time_base(&mut self, time_base: TimeBase) -> &mut Self {
        self.time_base = Some(time_base);
        self
    }

    /// Provide the total number of frames.
    pub fn with_n_frames(&mut self, n_frames: u64) -> &mut Self {
        self.n_frames = Some(n_frames);
        self
    }

    /// Provide the audio sample rate.
    pub fn with_sample_rate(&mut self, sample_rate: u32) -> &mut Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Provide the audio channel count.
    pub fn with_n_channels(&mut self, n_channels: u32) -> &mut Self {
        self.n_channels = Some(n_channels);
        self
    }

    /// Provide the video picture width.
    pub fn with_width(&mut self, width: u32) -> &mut Self {
        self.width = Some(width);
        self
    }

    /// Provide the video picture height.
    pub fn with_height(&mut self, height: u32) -> &mut Self {
        self.height = Some(height);
        self
    }

    /// Provide the container revision byte.
    pub fn with_revision(&mut self, revision: u8) -> &mut Self {
        self.revision = Some(revision);
        self
    }

    /// Provide the alpha-plane flag.
    pub fn with_alpha(&mut self, alpha: bool) -> &mut Self {
        self.alpha = Some(alpha);
        self
    }
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self::new()
    }
}
