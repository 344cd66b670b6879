// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared machinery for the block-oriented ADPCM codecs: the IMA tables, nibble
//! helpers, and the generic block driver that turns a per-block transcoder into a
//! full [`Codec`].

use std::io::SeekFrom;

use log::debug;

use cantata_core::conv;
use cantata_core::errors::{bad_mode_error, seek_error, Result, SeekErrorKind};
use cantata_core::handle::{Codec, FileState, OpenMode};

#[rustfmt::skip]
pub(crate) const IMA_INDEX_TABLE: [i32; 16] = [
    -1, -1, -1, -1, 2, 4, 6, 8,
    -1, -1, -1, -1, 2, 4, 6, 8,
];

#[rustfmt::skip]
pub(crate) const IMA_STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17,
    19, 21, 23, 25, 28, 31, 34, 37, 41, 45,
    50, 55, 60, 66, 73, 80, 88, 97, 107, 118,
    130, 143, 157, 173, 190, 209, 230, 253, 279, 307,
    337, 371, 408, 449, 494, 544, 598, 658, 724, 796,
    876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358,
    5894, 6484, 7132, 7845, 8630, 9493, 10442, 11487, 12635, 13899,
    15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794, 32767,
];

/// Which half of a byte a 4-bit code occupies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Nibble {
    Lower,
    Upper,
}

impl Nibble {
    pub(crate) fn get(self, byte: u8) -> u8 {
        match self {
            Nibble::Lower => byte & 0x0f,
            Nibble::Upper => byte >> 4,
        }
    }

    pub(crate) fn put(self, byte: &mut u8, code: u8) {
        match self {
            Nibble::Lower => *byte = (*byte & 0xf0) | (code & 0x0f),
            Nibble::Upper => *byte = (*byte & 0x0f) | (code << 4),
        }
    }
}

/// The per-block transcode a concrete ADPCM flavour provides. The generic
/// [`BlockDriver`] owns the buffers and the read/write/seek loops.
pub(crate) trait BlockTranscoder: Send {
    fn channels(&self) -> usize;

    /// Frames one full block decodes to.
    fn frames_per_block(&self) -> usize;

    /// Encoded bytes of one full block.
    fn block_align(&self) -> usize;

    /// Decodes `bytes` valid bytes of `block` into interleaved samples, returning
    /// the number of frames produced.
    fn decode_block(&mut self, block: &[u8], bytes: usize, out: &mut [i16]) -> usize;

    /// Encodes `valid` interleaved samples (the rest of the block is zero padding)
    /// into `out`, returning the number of bytes to emit.
    fn encode_block(&mut self, samples: &[i16], valid: usize, out: &mut [u8]) -> usize;

    /// Drops any carried predictor state, as after a seek.
    fn reset(&mut self);

    /// Whether mid-stream seeks are meaningful for this flavour.
    fn seekable(&self) -> bool {
        true
    }
}

/// Generic driver for block ADPCM codecs: buffers one block of encoded bytes and
/// one block of decoded samples, loops caller requests over them, and flushes the
/// partial tail block on close.
pub(crate) struct BlockDriver<T: BlockTranscoder> {
    transcoder: T,
    block: Vec<u8>,
    samples: Vec<i16>,
    /// Next sample index to hand out (read) or fill (write).
    pos: usize,
    /// Decoded samples available in `samples` while reading.
    valid: usize,
}

impl<T: BlockTranscoder> BlockDriver<T> {
    pub(crate) fn new(fs: &FileState, transcoder: T) -> Result<Self> {
        // A handle cannot both decode and re-encode blocks in place.
        if fs.mode == OpenMode::ReadWrite {
            return bad_mode_error("block codecs do not support read-write handles");
        }

        let block = vec![0u8; transcoder.block_align()];
        let samples = vec![0i16; transcoder.frames_per_block() * transcoder.channels()];

        Ok(BlockDriver { transcoder, block, samples, pos: 0, valid: 0 })
    }

    fn read_core(&mut self, fs: &mut FileState, out: &mut [i16]) -> Result<usize> {
        let mut done = 0;

        while done < out.len() {
            if self.pos >= self.valid {
                let got = fs.stream.read_buf(&mut self.block)?;
                if got == 0 {
                    break;
                }

                if got < self.block.len() {
                    debug!("short block of {} bytes, treating as end of data", got);
                }

                let frames = self.transcoder.decode_block(&self.block, got, &mut self.samples);
                self.valid = frames * self.transcoder.channels();
                self.pos = 0;

                if self.valid == 0 {
                    break;
                }
            }

            let take = (out.len() - done).min(self.valid - self.pos);
            out[done..done + take].copy_from_slice(&self.samples[self.pos..self.pos + take]);
            self.pos += take;
            done += take;
        }

        Ok(done)
    }

    fn write_core(&mut self, fs: &mut FileState, input: &[i16]) -> Result<usize> {
        let cap = self.samples.len();
        let mut done = 0;

        while done < input.len() {
            let take = (input.len() - done).min(cap - self.pos);
            self.samples[self.pos..self.pos + take].copy_from_slice(&input[done..done + take]);
            self.pos += take;
            done += take;

            if self.pos == cap {
                let bytes = self.transcoder.encode_block(&self.samples, cap, &mut self.block);
                fs.stream.write_buf(&self.block[..bytes])?;
                self.pos = 0;
            }
        }

        fs.data_length = fs.data_length.max(fs.stream.pos().saturating_sub(fs.data_offset));

        Ok(done)
    }

    fn with_i16_scratch<F>(&mut self, len: usize, mut f: F) -> Result<usize>
    where
        F: FnMut(&mut Self, &mut [i16], usize) -> Result<usize>,
    {
        // Loop an arbitrary request over a bounded intermediate buffer.
        let mut tmp = vec![0i16; len.min(4096)];
        let mut done = 0;

        while done < len {
            let take = (len - done).min(tmp.len());
            let count = f(self, &mut tmp[..take], done)?;
            done += count;

            if count < take {
                break;
            }
        }

        Ok(done)
    }
}

impl<T: BlockTranscoder> Codec for BlockDriver<T> {
    fn read_i16(&mut self, fs: &mut FileState, buf: &mut [i16]) -> Result<usize> {
        self.read_core(fs, buf)
    }

    fn read_i32(&mut self, fs: &mut FileState, buf: &mut [i32]) -> Result<usize> {
        self.with_i16_scratch(buf.len(), |driver, tmp, at| {
            let count = driver.read_core(fs, tmp)?;
            for (k, v) in tmp[..count].iter().enumerate() {
                buf[at + k] = conv::i16_to_i32(*v);
            }
            Ok(count)
        })
    }

    fn read_f32(&mut self, fs: &mut FileState, buf: &mut [f32]) -> Result<usize> {
        let scale = conv::int_to_float_scale(fs.norm_float, 16);
        self.with_i16_scratch(buf.len(), |driver, tmp, at| {
            let count = driver.read_core(fs, tmp)?;
            for (k, v) in tmp[..count].iter().enumerate() {
                buf[at + k] = (f64::from(*v) * scale) as f32;
            }
            Ok(count)
        })
    }

    fn read_f64(&mut self, fs: &mut FileState, buf: &mut [f64]) -> Result<usize> {
        let scale = conv::int_to_float_scale(fs.norm_double, 16);
        self.with_i16_scratch(buf.len(), |driver, tmp, at| {
            let count = driver.read_core(fs, tmp)?;
            for (k, v) in tmp[..count].iter().enumerate() {
                buf[at + k] = f64::from(*v) * scale;
            }
            Ok(count)
        })
    }

    fn write_i16(&mut self, fs: &mut FileState, buf: &[i16]) -> Result<usize> {
        self.write_core(fs, buf)
    }

    fn write_i32(&mut self, fs: &mut FileState, buf: &[i32]) -> Result<usize> {
        self.with_i16_scratch(buf.len(), |driver, tmp, at| {
            for (k, slot) in tmp.iter_mut().enumerate() {
                *slot = conv::i32_to_i16(buf[at + k]);
            }
            driver.write_core(fs, tmp)
        })
    }

    fn write_f32(&mut self, fs: &mut FileState, buf: &[f32]) -> Result<usize> {
        let scale = conv::float_to_int_scale(fs.norm_float, 16);
        let clip = fs.clipping;
        self.with_i16_scratch(buf.len(), |driver, tmp, at| {
            for (k, slot) in tmp.iter_mut().enumerate() {
                *slot = conv::f64_to_i16(f64::from(buf[at + k]) * scale, clip);
            }
            driver.write_core(fs, tmp)
        })
    }

    fn write_f64(&mut self, fs: &mut FileState, buf: &[f64]) -> Result<usize> {
        let scale = conv::float_to_int_scale(fs.norm_double, 16);
        let clip = fs.clipping;
        self.with_i16_scratch(buf.len(), |driver, tmp, at| {
            for (k, slot) in tmp.iter_mut().enumerate() {
                *slot = conv::f64_to_i16(buf[at + k] * scale, clip);
            }
            driver.write_core(fs, tmp)
        })
    }

    fn seek(&mut self, fs: &mut FileState, frame: u64) -> Result<u64> {
        if fs.mode != OpenMode::Read {
            return seek_error(SeekErrorKind::Unseekable);
        }

        if !self.transcoder.seekable() && frame != 0 {
            return seek_error(SeekErrorKind::Unseekable);
        }

        let fpb = self.transcoder.frames_per_block() as u64;
        let align = self.transcoder.block_align() as u64;

        let block_index = frame / fpb;
        let within = (frame % fpb) as usize;

        self.transcoder.reset();
        fs.stream.seek(SeekFrom::Start(fs.data_offset + block_index * align))?;
        self.pos = 0;
        self.valid = 0;

        if within > 0 {
            let got = fs.stream.read_buf(&mut self.block)?;
            let frames = self.transcoder.decode_block(&self.block, got, &mut self.samples);
            self.valid = frames * self.transcoder.channels();
            self.pos = (within * self.transcoder.channels()).min(self.valid);
        }

        Ok(frame)
    }

    fn close(&mut self, fs: &mut FileState) -> Result<()> {
        // Flush the partial tail block.
        if fs.mode == OpenMode::Write && self.pos > 0 {
            self.samples[self.pos..].fill(0);

            let valid = self.pos;
            let bytes = self.transcoder.encode_block(&self.samples, valid, &mut self.block);
            fs.stream.write_buf(&self.block[..bytes])?;
            self.pos = 0;

            fs.data_length = fs.data_length.max(fs.stream.pos().saturating_sub(fs.data_offset));
        }
        Ok(())
    }
}
