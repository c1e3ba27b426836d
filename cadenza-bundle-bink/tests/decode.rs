// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end decode tests over synthesised revision-'k' Bink files.

use std::io::Cursor;

use cadenza_bundle_bink::Bink;
use cadenza_core::errors::Error;

/// An LSB-first bit packer for synthesising packet payloads.
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

/// Writes the tree headers of a plane: sixteen colour high-nibble trees plus one tree for every
/// bundle except the two DC bundles, all selecting tree 0 (the identity).
fn put_plane_trees(bw: &mut BitWriter) {
    // Block types and sub-block types.
    bw.put(0, 4);
    bw.put(0, 4);
    // The colour high-nibble trees, then the colour bundle's own tree.
    for _ in 0..16 {
        bw.put(0, 4);
    }
    bw.put(0, 4);
    // Patterns, x offsets, y offsets, runs.
    bw.put(0, 4);
    bw.put(0, 4);
    bw.put(0, 4);
    bw.put(0, 4);
}

/// Writes a whole-plane fill (revision 'k'), padded to the 32-bit boundary.
fn put_plane_fill(bw: &mut BitWriter, value: u8) {
    bw.put(1, 1);
    bw.put(u32::from(value), 8);
    bw.align32();
}

/// Builds a one-track-less revision-'k' "BIK" file around the given frame payloads.
fn build_bik(
    width: u32,
    height: u32,
    audio_tracks: &[(u16, u16)],
    payloads: &[Vec<u8>],
) -> Vec<u8> {
    let n_audio = audio_tracks.len() as u32;
    let header_len = 12 * 4 + 12 * n_audio + 4 * (payloads.len() as u32 + 1);
    let file_size: u32 = header_len + payloads.iter().map(|p| p.len() as u32).sum::<u32>();

    let max_frame = payloads.iter().map(|p| p.len() as u32).max().unwrap_or(0);

    let mut out = Vec::new();
    out.extend_from_slice(b"BIKk");
    out.extend_from_slice(&(file_size - 8).to_le_bytes());
    out.extend_from_slice(&(payloads.len() as u32).to_le_bytes());
    out.extend_from_slice(&max_frame.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&25u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&n_audio.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    for _ in audio_tracks {
        out.extend_from_slice(&0u32.to_le_bytes());
    }
    for &(rate, flags) in audio_tracks {
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
    }
    for (i, _) in audio_tracks.iter().enumerate() {
        out.extend_from_slice(&(i as u32).to_le_bytes());
    }

    let mut pos = header_len;
    for payload in payloads {
        out.extend_from_slice(&pos.to_le_bytes());
        pos += payload.len() as u32;
    }
    out.extend_from_slice(&pos.to_le_bytes());

    for payload in payloads {
        out.extend_from_slice(payload);
    }

    assert_eq!(out.len() as u32, file_size);
    out
}

fn open(data: Vec<u8>) -> Bink {
    Bink::open(Box::new(Cursor::new(data))).unwrap()
}

#[test]
fn verify_fill_block_frame() {
    // A 16x16 picture whose four luma blocks are FILL blocks of colour 0x80, with the chroma
    // planes filled whole.
    let mut bw = BitWriter::new();

    // Revision >= 'i' prefixes every plane payload with a skipped 32-bit field.
    bw.put(0, 32);

    // Luma: not a whole-plane fill.
    bw.put(0, 1);
    put_plane_trees(&mut bw);

    // Row 0: two FILL blocks, count coded XOR 0xbb.
    bw.put(2 ^ 0xbb, 10);
    bw.put(1, 1);
    bw.put(6, 4);
    // Sub-block types: none.
    bw.put(0, 10);
    // Colours: one value repeated twice; high nibble 8, low nibble 0.
    bw.put(2, 10);
    bw.put(1, 1);
    bw.put(8, 4);
    bw.put(0, 4);
    // Patterns, motion, DCs, runs: none; a zero prefix exhausts each bundle for the plane, so
    // the second row tops up only the block types and colours.
    bw.put(0, 10);
    bw.put(0, 10);
    bw.put(0, 10);
    bw.put(0, 10);
    bw.put(0, 10);
    bw.put(0, 10);

    // Row 1.
    bw.put(2 ^ 0xbb, 10);
    bw.put(1, 1);
    bw.put(6, 4);
    bw.put(2, 10);
    bw.put(1, 1);
    bw.put(8, 4);
    bw.put(0, 4);

    bw.align32();

    // Both chroma planes filled whole.
    put_plane_fill(&mut bw, 0x40);
    put_plane_fill(&mut bw, 0x20);

    let file = build_bik(16, 16, &[], &[bw.finish()]);
    let mut bink = open(file);

    assert_eq!(bink.frame_count(), 1);

    let frame = bink.next_frame().unwrap();

    assert!(frame.video.plane(0).pixels().iter().all(|&v| v == 0x80));
    // Revisions 'h' and later swap the chroma planes: the first chroma payload lands in
    // plane 2.
    assert!(frame.video.plane(2).pixels().iter().all(|&v| v == 0x40));
    assert!(frame.video.plane(1).pixels().iter().all(|&v| v == 0x20));
    assert!(frame.audio.is_empty());

    assert!(matches!(bink.next_frame(), Err(Error::IoError(_))));
}

#[test]
fn verify_motion_block_copies_left_neighbour() {
    // Frame 1: luma blocks (0,0)/(1,0) get colours 0xaa and 0x55 via streamed colours. Frame 2:
    // every luma block is a MOTION block with offset (-8, 0); block (1,0) must become frame 1's
    // block (0,0), and block (0,0) clamps to itself.
    let mut f1 = BitWriter::new();
    f1.put(0, 32);
    f1.put(0, 1);
    put_plane_trees(&mut f1);

    // Row 0: two FILL blocks with streamed colours 0xaa then 0x55, every other bundle
    // exhausted by a zero prefix.
    f1.put(2 ^ 0xbb, 10);
    f1.put(1, 1);
    f1.put(6, 4);
    f1.put(0, 10);
    f1.put(2, 10);
    f1.put(0, 1);
    f1.put(0xa, 4);
    f1.put(0xa, 4);
    f1.put(0x5, 4);
    f1.put(0x5, 4);
    f1.put(0, 10);
    f1.put(0, 10);
    f1.put(0, 10);
    f1.put(0, 10);
    f1.put(0, 10);
    f1.put(0, 10);

    // Row 1: only the live bundles are topped up.
    f1.put(2 ^ 0xbb, 10);
    f1.put(1, 1);
    f1.put(6, 4);
    f1.put(2, 10);
    f1.put(0, 1);
    f1.put(0xa, 4);
    f1.put(0xa, 4);
    f1.put(0x5, 4);
    f1.put(0x5, 4);

    f1.align32();
    put_plane_fill(&mut f1, 0x40);
    put_plane_fill(&mut f1, 0x40);

    let mut f2 = BitWriter::new();
    f2.put(0, 32);
    f2.put(0, 1);
    put_plane_trees(&mut f2);

    // Row 0: two MOTION blocks.
    f2.put(2 ^ 0xbb, 10);
    f2.put(1, 1);
    f2.put(2, 4);
    f2.put(0, 10);
    // No colours or patterns.
    f2.put(0, 10);
    f2.put(0, 10);
    // X offsets: -8 for both; magnitude 8, negative.
    f2.put(2, 10);
    f2.put(1, 1);
    f2.put(8, 4);
    f2.put(1, 1);
    // Y offsets: 0 for both; a zero magnitude has no sign bit.
    f2.put(2, 10);
    f2.put(1, 1);
    f2.put(0, 4);
    f2.put(0, 10);
    f2.put(0, 10);
    f2.put(0, 10);

    // Row 1: block types and both motion bundles again.
    f2.put(2 ^ 0xbb, 10);
    f2.put(1, 1);
    f2.put(2, 4);
    f2.put(2, 10);
    f2.put(1, 1);
    f2.put(8, 4);
    f2.put(1, 1);
    f2.put(2, 10);
    f2.put(1, 1);
    f2.put(0, 4);

    f2.align32();
    put_plane_fill(&mut f2, 0x40);
    put_plane_fill(&mut f2, 0x40);

    let file = build_bik(16, 16, &[], &[f1.finish(), f2.finish()]);
    let mut bink = open(file);

    {
        let frame = bink.next_frame().unwrap();
        let luma = frame.video.plane(0);

        let mut left = [0u8; 64];
        let mut right = [0u8; 64];
        luma.get_block(0, 0, &mut left);
        luma.get_block(1, 0, &mut right);

        assert!(left.iter().all(|&v| v == 0xaa));
        assert!(right.iter().all(|&v| v == 0x55));
    }

    let frame = bink.next_frame().unwrap();
    let luma = frame.video.plane(0);

    let mut left = [0u8; 64];
    let mut right = [0u8; 64];
    luma.get_block(0, 0, &mut left);
    luma.get_block(1, 0, &mut right);

    // The right block takes its left neighbour from frame 1; the left block clamps to itself.
    assert!(right.iter().all(|&v| v == 0xaa));
    assert!(left.iter().all(|&v| v == 0xaa));
}

#[test]
fn verify_run_block() {
    // An 8x8 picture with a single RUN block: scan pattern 0 and four same-colour runs of 16
    // pixels each, colour 0x10.
    let mut bw = BitWriter::new();
    bw.put(0, 32);

    bw.put(0, 1);
    put_plane_trees(&mut bw);

    // One RUN block, count coded XOR 0xbb.
    bw.put(1 ^ 0xbb, 10);
    bw.put(1, 1);
    bw.put(3, 4);
    // Sub-block types (9-bit prefix at this plane size): none.
    bw.put(0, 9);
    // Colours: 0x10 four times over.
    bw.put(4, 10);
    bw.put(1, 1);
    bw.put(1, 4);
    bw.put(0, 4);
    // Patterns, motion, DCs: none.
    bw.put(0, 10);
    bw.put(0, 10);
    bw.put(0, 10);
    bw.put(0, 10);
    bw.put(0, 10);
    // Runs: the value 15 four times over (run length 16).
    bw.put(4, 10);
    bw.put(1, 1);
    bw.put(15, 4);

    // The block itself: scan pattern 0, then four same-colour runs.
    bw.put(0, 4);
    for _ in 0..4 {
        bw.put(1, 1);
    }

    bw.align32();
    put_plane_fill(&mut bw, 0x40);
    put_plane_fill(&mut bw, 0x40);

    let file = build_bik(8, 8, &[], &[bw.finish()]);
    let mut bink = open(file);

    let frame = bink.next_frame().unwrap();
    assert!(frame.video.plane(0).pixels().iter().all(|&v| v == 0x10));
}

/// Writes one zero-spectrum audio block for a 22050 Hz mono RDFT track (frame length 1024,
/// 23 bands), preceded by the 32-bit decoded-size field.
fn put_zero_audio_packet(bw: &mut BitWriter) {
    bw.put(0, 32);

    bw.put(0, 29);
    bw.put(0, 29);

    for _ in 0..23 {
        bw.put(0, 8);
    }

    let mut i = 2;
    while i < 1024 {
        bw.put(0, 1);
        bw.put(0, 4);
        i += 8;
    }

    bw.align32();
}

#[test]
fn verify_audio_track_decodes_silence() {
    // One 22050 Hz mono RDFT track alongside a whole-plane-filled video frame.
    let mut audio = BitWriter::new();
    put_zero_audio_packet(&mut audio);
    let audio = audio.finish();

    let mut video = BitWriter::new();
    video.put(0, 32);
    put_plane_fill(&mut video, 0x80);
    put_plane_fill(&mut video, 0x40);
    put_plane_fill(&mut video, 0x40);
    let video = video.finish();

    let mut payload = Vec::new();
    payload.extend_from_slice(&(audio.len() as u32).to_le_bytes());
    payload.extend_from_slice(&audio);
    payload.extend_from_slice(&video);

    let file = build_bik(16, 16, &[(22050, 0)], &[payload]);
    let mut bink = open(file);

    let frame = bink.next_frame().unwrap();

    assert_eq!(frame.audio.len(), 1);
    assert_eq!(frame.audio[0].sample_rate, 22050);
    assert_eq!(frame.audio[0].channels, 1);
    assert_eq!(frame.audio[0].samples.len(), 1024 - 64);
    assert!(frame.audio[0].samples.iter().all(|&s| s == 0.0));

    assert!(frame.video.plane(0).pixels().iter().all(|&v| v == 0x80));
}

#[test]
fn verify_oversized_audio_chunk_is_fatal() {
    // The audio sub-chunk claims more bytes than the frame packet holds.
    let mut payload = Vec::new();
    payload.extend_from_slice(&1000u32.to_le_bytes());
    payload.extend_from_slice(&[0u8; 16]);

    let file = build_bik(16, 16, &[(22050, 0)], &[payload]);
    let mut bink = open(file);

    assert!(matches!(bink.next_frame(), Err(Error::DecodeError(_))));

    // The malformed frame is skipped, not retried.
    assert!(matches!(bink.next_frame(), Err(Error::IoError(_))));
}

#[test]
fn verify_header_rejection() {
    // Bad signature.
    let mut file = build_bik(16, 16, &[], &[vec![0u8; 16]]);
    file[0] = b'X';
    assert!(Bink::open(Box::new(Cursor::new(file))).is_err());

    // Revision 'b' is not supported.
    let mut file = build_bik(16, 16, &[], &[vec![0u8; 16]]);
    file[3] = b'b';
    assert!(Bink::open(Box::new(Cursor::new(file))).is_err());

    // A zero frame-rate denominator.
    let mut file = build_bik(16, 16, &[], &[vec![0u8; 16]]);
    file[32..36].copy_from_slice(&0u32.to_le_bytes());
    assert!(Bink::open(Box::new(Cursor::new(file))).is_err());

    // An out-of-order frame index.
    let mut file = build_bik(16, 16, &[], &[vec![0u8; 16], vec![0u8; 16]]);
    let index_at = file.len() - 3 * 4 - 32;
    let first = file[index_at..index_at + 4].to_vec();
    file[index_at + 4..index_at + 8].copy_from_slice(&first);
    assert!(Bink::open(Box::new(Cursor::new(file))).is_err());
}
