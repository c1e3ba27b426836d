// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `demux` module implements the Bink container demuxer.
//!
//! A Bink file is a header, an audio track table, a frame index, and one packet per frame. Each
//! packet leads with one `[size][payload]` sub-chunk per audio track followed by the video
//! payload. The demuxer emits the sub-chunks of a frame as one packet per track, audio first.

use cadenza_core::codecs::{
    CodecParameters, CODEC_TYPE_BINK_AUDIO_DCT, CODEC_TYPE_BINK_AUDIO_RDFT, CODEC_TYPE_BINK_VIDEO,
};
use cadenza_core::errors::{
    decode_error, end_of_stream_error, limit_error, seek_error, unsupported_error, Result,
    SeekErrorKind,
};
use cadenza_core::formats::{FormatReader, Packet, Track};
use cadenza_core::io::{MediaSourceStream, ReadBytes};
use cadenza_core::units::TimeBase;

use bitflags::bitflags;
use log::debug;

bitflags! {
    /// The video flag word of the container header.
    pub struct VideoFlags: u32 {
        /// The stream carries an alpha plane.
        const ALPHA = 0x0010_0000;
        /// The stream is luma-only.
        const GRAYSCALE = 0x0002_0000;
    }
}

/// Audio track flag: two channels.
const AUDIO_FLAG_STEREO: u16 = 0x2000;
/// Audio track flag: the DCT back-end is used instead of the RDFT.
const AUDIO_FLAG_DCT: u16 = 0x1000;

/// The track id of the video stream. Audio tracks follow at `1..`.
pub const VIDEO_TRACK_ID: u32 = 0;

/// The widest picture axis accepted before demuxing is refused.
const MAX_DIMENSION: u32 = 1 << 15;

/// The largest accepted audio track count.
const MAX_AUDIO_TRACKS: u32 = 256;

#[derive(Copy, Clone, Debug)]
struct IndexEntry {
    pos: u32,
    size: u32,
    key_frame: bool,
}

/// Bink format reader.
///
/// `BinkReader` implements a demuxer for the Bink container ("BIK" revisions up-to 'k' and
/// "KB2" revisions 'i' through 'k').
pub struct BinkReader {
    reader: MediaSourceStream,
    tracks: Vec<Track>,
    index: Vec<IndexEntry>,
    n_audio: usize,
    /// The frame the next packet belongs to.
    frame: usize,
    /// How many of the frame's per-track packets were emitted; `n_audio` means the video
    /// packet is next.
    cursor: usize,
    /// The bytes of the current frame packet not yet emitted.
    bytes_left: u32,
    /// Extra byte offset applied to every index position, for Bink streams embedded in an
    /// outer container.
    smush_offset: u64,
}

impl BinkReader {
    /// The total number of frames in the file.
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Whether the given frame starts a keyframe packet.
    pub fn is_key_frame(&self, frame: usize) -> bool {
        self.index.get(frame).map_or(false, |entry| entry.key_frame)
    }

    /// Repositions the reader so the next packet belongs to the given frame. Positions up-to
    /// one past the last frame are accepted; reading there returns the end-of-stream error.
    pub fn seek_to_frame(&mut self, frame: usize) -> Result<()> {
        if frame > self.index.len() {
            return seek_error(SeekErrorKind::OutOfRange);
        }

        self.frame = frame;
        self.cursor = 0;

        Ok(())
    }
}

impl FormatReader for BinkReader {
    fn try_new(mut source: MediaSourceStream) -> Result<Self> {
        let magic = source.read_quad_bytes()?;

        let signature = &magic[0..3];
        let revision = magic[3];

        let valid = match signature {
            b"BIK" => (b'b'..=b'k').contains(&revision),
            b"KB2" => (b'i'..=b'k').contains(&revision),
            _ => false,
        };

        if !valid {
            return unsupported_error("bink: invalid signature");
        }

        if revision == b'b' {
            return unsupported_error("bink: revision 'b' is not supported");
        }

        let file_size = source.read_u32()? + 8;
        let duration = source.read_u32()?;

        if source.read_u32()? > file_size {
            return decode_error("bink: largest frame size greater than file size");
        }

        // An unused header field.
        source.ignore_bytes(4)?;

        let width = source.read_u32()?;
        let height = source.read_u32()?;

        if width == 0 || height == 0 {
            return decode_error("bink: invalid video dimensions");
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return limit_error("bink: video dimensions too large");
        }

        let fps_num = source.read_u32()?;
        let fps_den = source.read_u32()?;

        if fps_num == 0 || fps_den == 0 {
            return decode_error("bink: invalid frame rate");
        }

        let flags = VideoFlags::from_bits_truncate(source.read_u32()?);
        let num_audio = source.read_u32()?;

        if num_audio > MAX_AUDIO_TRACKS {
            return limit_error("bink: too many audio tracks");
        }

        if signature == b"KB2" || revision == b'k' {
            // A field new to the late revisions; its purpose is unknown.
            source.ignore_bytes(4)?;
        }

        // One frame per timebase tick.
        let tb = TimeBase::new(fps_den, fps_num);

        let mut tracks = Vec::new();

        let mut video_params = CodecParameters::new();
        video_params
            .for_codec(CODEC_TYPE_BINK_VIDEO)
            .with_width(width)
            .with_height(height)
            .with_revision(revision)
            .with_alpha(flags.contains(VideoFlags::ALPHA))
            .with_time_base(tb)
            .with_n_frames(u64::from(duration));

        tracks.push(Track::new(VIDEO_TRACK_ID, video_params));

        if num_audio > 0 {
            // The maximum decoded size per track is not needed for demuxing.
            source.ignore_bytes(4 * u64::from(num_audio))?;

            for i in 0..num_audio {
                let sample_rate = source.read_u16()?;
                let track_flags = source.read_u16()?;

                let codec = if track_flags & AUDIO_FLAG_DCT != 0 {
                    CODEC_TYPE_BINK_AUDIO_DCT
                }
                else {
                    CODEC_TYPE_BINK_AUDIO_RDFT
                };

                let mut params = CodecParameters::new();
                params
                    .for_codec(codec)
                    .with_sample_rate(u32::from(sample_rate))
                    .with_n_channels(if track_flags & AUDIO_FLAG_STEREO != 0 { 2 } else { 1 })
                    .with_revision(revision)
                    .with_time_base(tb)
                    .with_n_frames(u64::from(duration));

                tracks.push(Track::new(i + 1, params));
            }

            // Per-track ids are not used for anything.
            source.ignore_bytes(4 * u64::from(num_audio))?;
        }

        // The frame index: `duration + 1` offsets delimiting `duration` packets. Bit 0 of an
        // offset flags the frame starting there as a keyframe; the first frame always is one.
        let mut index = Vec::with_capacity(duration as usize);

        let mut pos = source.read_u32()? & !1;
        let mut key_frame = true;

        for _ in 0..duration {
            let next = source.read_u32()?;
            let next_pos = next & !1;

            if next_pos <= pos {
                return decode_error("bink: invalid frame index table");
            }

            index.push(IndexEntry { pos, size: next_pos - pos, key_frame });

            pos = next_pos;
            key_frame = next & 1 != 0;
        }

        if duration > 0 && pos != file_size {
            return decode_error("bink: invalid frame index table");
        }

        debug!(
            "bink: {}x{} rev '{}', {} frames, {} audio track(s)",
            width,
            height,
            revision as char,
            duration,
            num_audio
        );

        Ok(BinkReader {
            reader: source,
            tracks,
            index,
            n_audio: num_audio as usize,
            frame: 0,
            cursor: 0,
            bytes_left: 0,
            smush_offset: 0,
        })
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn next_packet(&mut self) -> Result<Packet> {
        let entry = match self.index.get(self.frame) {
            Some(entry) => *entry,
            None => return end_of_stream_error(),
        };

        if self.cursor == 0 {
            self.reader.seek(u64::from(entry.pos) + self.smush_offset)?;
            self.bytes_left = entry.size;
        }

        let ts = self.frame as u64;

        if self.cursor < self.n_audio {
            let audio_size = self.reader.read_u32()?;

            if u64::from(audio_size) + 4 > u64::from(self.bytes_left) {
                return decode_error("bink: audio chunk larger than the bytes left in packet");
            }

            self.bytes_left -= audio_size + 4;

            // Anything shorter than one block header decodes to silence; skip the payload and
            // emit an empty packet.
            let data = if audio_size >= 4 {
                let mut buf = vec![0u8; audio_size as usize];
                self.reader.read_buf_exact(&mut buf)?;
                buf
            }
            else {
                self.reader.ignore_bytes(u64::from(audio_size))?;
                Vec::new()
            };

            let track_id = self.cursor as u32 + 1;
            self.cursor += 1;

            return Ok(Packet::new_from_boxed_slice(
                track_id,
                ts,
                1,
                entry.key_frame,
                data.into_boxed_slice(),
            ));
        }

        // The rest of the frame packet is the video payload.
        let mut buf = vec![0u8; self.bytes_left as usize];
        self.reader.read_buf_exact(&mut buf)?;

        self.frame += 1;
        self.cursor = 0;

        Ok(Packet::new_from_boxed_slice(
            VIDEO_TRACK_ID,
            ts,
            1,
            entry.key_frame,
            buf.into_boxed_slice(),
        ))
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream {
        self.reader
    }
}
