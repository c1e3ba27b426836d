// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pure Rust Bink demuxer, video decoder, and audio decoder.
//!
//! [`BinkReader`] demuxes the container into per-track packets; [`BinkVideoDecoder`] and
//! [`BinkAudioDecoder`] decode them. [`Bink`] ties the three together into the whole-file
//! driver most callers want: open a source, then pull decoded frames one at a time.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod audio;
mod demux;
mod video;

pub use audio::BinkAudioDecoder;
pub use demux::{BinkReader, VideoFlags, VIDEO_TRACK_ID};
pub use video::{BinkVideoDecoder, Plane, VideoFrame};

use cadenza_core::errors::{end_of_stream_error, Result};
use cadenza_core::formats::FormatReader;
use cadenza_core::io::{MediaSource, MediaSourceStream};
use cadenza_core::units::TimeBase;

use log::warn;

/// The decoded audio of one track for one frame: interleaved 32-bit float samples.
pub struct AudioTrack {
    /// The sample rate of the interleaved signal in Hz.
    pub sample_rate: u32,
    /// The number of interleaved channels.
    pub channels: u32,
    /// The interleaved samples of the frame. Empty for frames without audio payload.
    pub samples: Vec<f32>,
}

/// One decoded frame: the video planes and each audio track's samples.
pub struct Frame<'a> {
    /// The decoded video planes.
    pub video: &'a VideoFrame,
    /// The decoded audio, one entry per track.
    pub audio: &'a [AudioTrack],
}

/// A whole-file Bink decoder: demuxer, video decoder, and per-track audio decoders driven in
/// index order.
pub struct Bink {
    reader: BinkReader,
    video: BinkVideoDecoder,
    audio: Vec<BinkAudioDecoder>,
    audio_out: Vec<AudioTrack>,
    frame: usize,
    time_base: TimeBase,
}

impl Bink {
    /// Opens a Bink stream and instantiates decoders for every track.
    pub fn open(source: Box<dyn MediaSource>) -> Result<Bink> {
        let reader = BinkReader::try_new(MediaSourceStream::new(source))?;

        let tracks = reader.tracks();

        let video = BinkVideoDecoder::try_new(&tracks[0].codec_params)?;

        let mut audio = Vec::new();
        let mut audio_out = Vec::new();

        for track in &tracks[1..] {
            let decoder = BinkAudioDecoder::try_new(&track.codec_params)?;

            audio_out.push(AudioTrack {
                sample_rate: decoder.sample_rate(),
                channels: decoder.channels() as u32,
                samples: Vec::new(),
            });
            audio.push(decoder);
        }

        let time_base = tracks[0].codec_params.time_base.unwrap_or_else(|| TimeBase::new(1, 25));

        Ok(Bink { reader, video, audio, audio_out, frame: 0, time_base })
    }

    /// The total number of frames in the file.
    pub fn frame_count(&self) -> usize {
        self.reader.frame_count()
    }

    /// The timebase mapping frame numbers to seconds.
    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Decodes the next frame and returns its planes and audio.
    ///
    /// A malformed frame fails whole: the error is returned, the frame counter still advances,
    /// and the next call decodes the following frame. Past the last frame the end-of-stream
    /// error is returned.
    pub fn next_frame(&mut self) -> Result<Frame<'_>> {
        if self.frame >= self.reader.frame_count() {
            return end_of_stream_error();
        }

        let result = self.decode_frame();

        // A failed frame is skipped, not retried; resynchronise the demuxer in either case.
        self.frame += 1;
        self.reader.seek_to_frame(self.frame)?;

        result?;

        Ok(Frame { video: self.video.frame(), audio: &self.audio_out })
    }

    fn decode_frame(&mut self) -> Result<()> {
        // One packet per audio track, then the video packet.
        for i in 0..self.audio.len() {
            let packet = self.reader.next_packet()?;

            let samples = self.audio[i].decode(&packet)?;

            let out = &mut self.audio_out[i];
            out.samples.clear();
            out.samples.extend_from_slice(samples);
        }

        let packet = self.reader.next_packet()?;

        if packet.track_id() != VIDEO_TRACK_ID {
            warn!("bink: unexpected track id {}", packet.track_id());
        }

        self.video.decode(&packet)
    }
}

#[cfg(test)]
mod tests {
    use super::Bink;
    use std::io::Cursor;

    #[test]
    fn verify_open_rejects_garbage() {
        let data = b"RIFF\x00\x00\x00\x00WAVEfmt ".to_vec();
        assert!(Bink::open(Box::new(Cursor::new(data))).is_err());
    }
}
