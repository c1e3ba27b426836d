// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `formats` module provides the traits and support structures necessary to implement media
//! demuxers.

use crate::codecs::CodecParameters;
use crate::errors::Result;
use crate::io::MediaSourceStream;
use crate::units::{Duration, TimeStamp};

/// A `Track` is an independently coded media stream. A media format may contain multiple tracks
/// in one container.
#[derive(Clone, Debug)]
pub struct Track {
    /// A unique identifier for the track.
    pub id: u32,
    /// The parameters describing the codec of the track.
    pub codec_params: CodecParameters,
}

impl Track {
    pub fn new(id: u32, codec_params: CodecParameters) -> Self {
        Track { id, codec_params }
    }
}

/// A `Packet` contains a discrete amount of encoded data for a single track.
///
/// The exact amount of data is bounded, but not defined, and is dependant on the container and/or
/// the encapsulated codec.
#[derive(Clone)]
pub struct Packet {
    /// The track id.
    track_id: u32,
    /// The timestamp of the packet in `TimeBase` units of its track.
    ts: TimeStamp,
    /// The duration of the packet in `TimeBase` units of its track.
    dur: Duration,
    /// Whether the packet starts at a point the track can be decoded from without history.
    key_frame: bool,
    /// The packet buffer.
    data: Box<[u8]>,
}

impl Packet {
    /// Create a new `Packet` from a boxed slice.
    pub fn new_from_boxed_slice(
        track_id: u32,
        ts: TimeStamp,
        dur: Duration,
        key_frame: bool,
        data: Box<[u8]>,
    ) -> Self {
        Packet { track_id, ts, dur, key_frame, data }
    }

    /// Create a new `Packet` from a slice.
    pub fn new_from_slice(
        track_id: u32,
        ts: TimeStamp,
        dur: Duration,
        key_frame: bool,
        buf: &[u8],
    ) -> Self {
        Packet { track_id, ts, dur, key_frame, data: Box::from(buf) }
    }

    /// The track identifier of the track this packet belongs to.
    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// Get the timestamp of the packet in `TimeBase` units.
    pub fn ts(&self) -> TimeStamp {
        self.ts
    }

    /// Get the duration of the packet in `TimeBase` units.
    pub fn dur(&self) -> Duration {
        self.dur
    }

    /// Whether the packet starts at a point the track can be decoded from without history.
    pub fn key_frame(&self) -> bool {
        self.key_frame
    }

    /// Get an immutable slice to the packet buffer.
    pub fn buf(&self) -> &[u8] {
        &self.data
    }
}

/// A `FormatReader` is a container demuxer. It provides methods to probe a media stream for
/// information and access the tracks encapsulated in the container.
///
/// A `FormatReader` is generally immutable once instantiated: track information may not change
/// while packets are being consumed.
pub trait FormatReader: Send {
    /// Attempt to instantiate a `FormatReader` using the provided `MediaSourceStream`. The
    /// stream should be positioned at the start of the container.
    fn try_new(source: MediaSourceStream) -> Result<Self>
    where
        Self: Sized;

    /// Gets a list of all `Track`s in the container.
    fn tracks(&self) -> &[Track];

    /// Get the next packet from the container.
    fn next_packet(&mut self) -> Result<Packet>;

    /// Consumes the `FormatReader` and returns the underlying media source stream.
    fn into_inner(self: Box<Self>) -> MediaSourceStream;
}
