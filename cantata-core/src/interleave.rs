// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `interleave` module adapts a planar-on-disk sample layout to the interleaved
//! frames the caller API presents.
//!
//! Some containers store each channel's samples in fixed-size per-channel blocks,
//! cycling channel 0..C for every block index. The adapter seeks each channel
//! independently and scatters the decoded samples into the interleaved output
//! buffer. The 10-sample/32-byte parameterisation matches the 24-bit planar layout
//! this stage exists for.

use std::io::SeekFrom;

use crate::errors::{decode_error, Result};
use crate::io::Bstream;

/// A planar-block to interleaved-frame read adapter for 24-bit samples.
pub struct Interleaver {
    channels: usize,
    samples_per_block: usize,
    bytes_per_block: usize,
    big_endian: bool,
    block: Vec<u8>,
}

impl Interleaver {
    pub fn new(
        channels: usize,
        samples_per_block: usize,
        bytes_per_block: usize,
        big_endian: bool,
    ) -> Result<Self> {
        if channels == 0 || samples_per_block * 3 > bytes_per_block {
            return decode_error("interleave: invalid planar block geometry");
        }

        Ok(Interleaver {
            channels,
            samples_per_block,
            bytes_per_block,
            big_endian,
            block: vec![0u8; bytes_per_block],
        })
    }

    /// Reads `out.len() / channels` interleaved frames starting at `start_frame`,
    /// returning the number of samples produced. 24-bit samples are widened into the
    /// top bits of an `i32`.
    pub fn read_i32(
        &mut self,
        stream: &mut Bstream,
        data_offset: u64,
        start_frame: u64,
        out: &mut [i32],
    ) -> Result<usize> {
        let frames = out.len() / self.channels;
        let mut produced = 0;

        for ch in 0..self.channels {
            let mut frame = 0;

            while frame < frames {
                let abs_frame = start_frame + frame as u64;
                let block_index = abs_frame / self.samples_per_block as u64;
                let within = (abs_frame % self.samples_per_block as u64) as usize;

                let block_pos = data_offset
                    + (block_index * self.channels as u64 + ch as u64)
                        * self.bytes_per_block as u64;

                stream.seek(SeekFrom::Start(block_pos))?;
                let got = stream.read_buf(&mut self.block)?;

                let available = (got / 3).min(self.samples_per_block);
                if within >= available {
                    break;
                }

                let take = (available - within).min(frames - frame);

                for k in 0..take {
                    let at = (within + k) * 3;
                    let bytes = &self.block[at..at + 3];

                    let value = if self.big_endian {
                        i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0])
                    }
                    else {
                        i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]])
                    };

                    out[(frame + k) * self.channels + ch] = value;
                    produced += 1;
                }

                frame += take;
            }
        }

        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Builds a two-channel planar image: blocks of 10 samples packed into 32 bytes,
    // alternating channel 0 and channel 1 blocks.
    fn planar_fixture(frames: usize) -> Vec<u8> {
        let channels = 2;
        let blocks = frames.div_ceil(10);
        let mut data = vec![0u8; blocks * channels * 32];

        for ch in 0..channels {
            for frame in 0..frames {
                let value = (frame * 2 + ch) as u32;
                let block = frame / 10;
                let within = frame % 10;
                let at = (block * channels + ch) * 32 + within * 3;
                data[at..at + 3].copy_from_slice(&value.to_be_bytes()[1..4]);
            }
        }

        data
    }

    #[test]
    fn scatters_planar_blocks_into_frames() {
        let mut stream = Bstream::from_vec(planar_fixture(25));
        let mut il = Interleaver::new(2, 10, 32, true).unwrap();

        let mut out = vec![0i32; 25 * 2];
        let produced = il.read_i32(&mut stream, 0, 0, &mut out).unwrap();
        assert_eq!(produced, 50);

        for (index, value) in out.iter().enumerate() {
            assert_eq!(*value >> 8, index as i32);
        }
    }

    #[test]
    fn reads_from_mid_stream_frame_positions() {
        let mut stream = Bstream::from_vec(planar_fixture(25));
        let mut il = Interleaver::new(2, 10, 32, true).unwrap();

        // Start within a block, span a block boundary.
        let mut out = vec![0i32; 8 * 2];
        let produced = il.read_i32(&mut stream, 0, 7, &mut out).unwrap();
        assert_eq!(produced, 16);

        for (index, value) in out.iter().enumerate() {
            assert_eq!(*value >> 8, (7 * 2 + index) as i32);
        }
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(Interleaver::new(0, 10, 32, false).is_err());
        assert!(Interleaver::new(1, 11, 32, false).is_err());
    }
}
