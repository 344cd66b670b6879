// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Microsoft ADPCM.
//!
//! Each block carries a 7-byte per-channel preamble: a coefficient-pair index, the
//! initial step (idelta), and two seed samples, which are also the block's first
//! two output frames (seed two first). The remaining frames are 4-bit codes, one
//! nibble per channel in interleave order.

use cantata_core::conv::clamp_i16;
use cantata_core::errors::{decode_error, Result};
use cantata_core::handle::{Codec, CodecParams, FileState, OpenMode};

use crate::common::{BlockDriver, BlockTranscoder, Nibble};

const MS_DEFAULT_BLOCK_ALIGN: u32 = 256;

#[rustfmt::skip]
const MS_ADAPTATION_TABLE: [i32; 16] = [
    230, 230, 230, 230, 307, 409, 512, 614,
    768, 614, 512, 409, 307, 230, 230, 230,
];

const MS_COEF1: [i32; 7] = [256, 512, 0, 192, 240, 460, 392];
const MS_COEF2: [i32; 7] = [0, -256, 0, 64, 0, -208, -232];

const MS_DELTA_MIN: i32 = 16;

/// Per-channel prediction state while coding one block.
#[derive(Copy, Clone, Default)]
struct MsState {
    bpred: usize,
    idelta: i32,
    /// Most recent sample.
    sample1: i32,
    /// Second most recent sample.
    sample2: i32,
}

impl MsState {
    fn predict(&self) -> i32 {
        (self.sample1 * MS_COEF1[self.bpred] + self.sample2 * MS_COEF2[self.bpred]) / 256
    }

    /// Reconstructs one sample from a 4-bit code.
    fn expand(&mut self, code: u8) -> i16 {
        // Sign extend the nibble.
        let signed = i32::from((code as i8) << 4 >> 4);

        let predicted = self.predict() + signed * self.idelta;
        let new_sample = i32::from(clamp_i16(predicted));

        self.sample2 = self.sample1;
        self.sample1 = new_sample;
        self.idelta = (MS_ADAPTATION_TABLE[code as usize] * self.idelta / 256).max(MS_DELTA_MIN);

        new_sample as i16
    }

    /// Quantises one sample, mirroring [`MsState::expand`].
    fn compress(&mut self, sample: i16) -> u8 {
        let predicted = self.predict();
        let delta = i32::from(sample) - predicted;

        let code = (delta / self.idelta).clamp(-8, 7);
        let code = (code & 0x0f) as u8;

        self.expand(code);
        code
    }
}

/// The MS ADPCM transcoder.
pub struct MsAdpcm {
    channels: usize,
    block_align: usize,
    frames_per_block: usize,
    state: Vec<MsState>,
}

impl MsAdpcm {
    pub fn init(fs: &mut FileState) -> Result<Box<dyn Codec>> {
        let channels = fs.channels as usize;

        if fs.mode == OpenMode::Write && fs.codec_params.block_align == 0 {
            let block_align = MS_DEFAULT_BLOCK_ALIGN * fs.channels;
            fs.codec_params = CodecParams {
                block_align,
                frames_per_block: (block_align - 7 * fs.channels) * 2 / fs.channels + 2,
            };
        }

        let block_align = fs.codec_params.block_align as usize;
        let frames_per_block = fs.codec_params.frames_per_block as usize;

        if block_align < 7 * channels
            || frames_per_block != (block_align - 7 * channels) * 2 / channels + 2
        {
            return decode_error("ms_adpcm: bad block align or frames per block");
        }

        fs.byte_width = 0;
        fs.block_width = 0;
        fs.update_frame_count();

        let transcoder = MsAdpcm {
            channels,
            block_align,
            frames_per_block,
            state: vec![MsState::default(); channels],
        };

        Ok(Box::new(BlockDriver::new(fs, transcoder)?))
    }
}

impl BlockTranscoder for MsAdpcm {
    fn channels(&self) -> usize {
        self.channels
    }

    fn frames_per_block(&self) -> usize {
        self.frames_per_block
    }

    fn block_align(&self) -> usize {
        self.block_align
    }

    fn decode_block(&mut self, block: &[u8], bytes: usize, out: &mut [i16]) -> usize {
        let channels = self.channels;

        if bytes < 7 * channels {
            return 0;
        }

        let mut state = vec![MsState::default(); channels];

        // Preamble layout: bpred bytes, then idelta, sample1, sample2 words, each
        // grouped per channel.
        for (ch, st) in state.iter_mut().enumerate() {
            st.bpred = usize::from(block[ch]).min(6);

            let at = channels + 2 * ch;
            st.idelta = i32::from(i16::from_le_bytes([block[at], block[at + 1]]));

            let at = 3 * channels + 2 * ch;
            st.sample1 = i32::from(i16::from_le_bytes([block[at], block[at + 1]]));

            let at = 5 * channels + 2 * ch;
            st.sample2 = i32::from(i16::from_le_bytes([block[at], block[at + 1]]));
        }

        // The seed samples are the first two frames, oldest first.
        for (ch, st) in state.iter().enumerate() {
            out[ch] = st.sample2 as i16;
            out[channels + ch] = st.sample1 as i16;
        }

        let data = &block[7 * channels..bytes];
        let mut frames = 2.min(self.frames_per_block);

        for (index, byte) in data.iter().enumerate() {
            for (half, nibble) in [Nibble::Upper, Nibble::Lower].into_iter().enumerate() {
                let sample_index = index * 2 + half;
                let frame = 2 + sample_index / channels;
                let ch = sample_index % channels;

                if frame >= self.frames_per_block {
                    break;
                }

                out[frame * channels + ch] = state[ch].expand(nibble.get(*byte));
                frames = frames.max(frame + 1);
            }
        }

        frames
    }

    fn encode_block(&mut self, samples: &[i16], _valid: usize, out: &mut [u8]) -> usize {
        let channels = self.channels;

        out.fill(0);

        // Seed the predictor from the block's first two frames and estimate the
        // starting step from the early deltas.
        for ch in 0..channels {
            let st = &mut self.state[ch];

            st.bpred = 0;
            st.sample2 = i32::from(samples[ch]);
            st.sample1 = i32::from(samples[channels + ch]);

            let mut total = 0i32;
            let mut count = 0i32;
            for frame in 2..self.frames_per_block.min(18) {
                let delta = i32::from(samples[frame * channels + ch])
                    - i32::from(samples[(frame - 1) * channels + ch]);
                total += delta.abs();
                count += 1;
            }

            st.idelta = if count > 0 { (total / (4 * count)).max(MS_DELTA_MIN) } else { MS_DELTA_MIN };

            out[ch] = st.bpred as u8;

            let at = channels + 2 * ch;
            out[at..at + 2].copy_from_slice(&(st.idelta as i16).to_le_bytes());

            let at = 3 * channels + 2 * ch;
            out[at..at + 2].copy_from_slice(&(st.sample1 as i16).to_le_bytes());

            let at = 5 * channels + 2 * ch;
            out[at..at + 2].copy_from_slice(&(st.sample2 as i16).to_le_bytes());
        }

        let data_at = 7 * channels;

        for frame in 2..self.frames_per_block {
            for ch in 0..channels {
                let code = self.state[ch].compress(samples[frame * channels + ch]);

                let sample_index = (frame - 2) * channels + ch;
                let at = data_at + sample_index / 2;
                let nibble = if sample_index % 2 == 0 { Nibble::Upper } else { Nibble::Lower };
                nibble.put(&mut out[at], code);
            }
        }

        self.block_align
    }

    fn reset(&mut self) {
        self.state.fill(MsState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::format::{Endian, FormatId, CODEC_MS_ADPCM, CONTAINER_WAV};
    use cantata_core::io::Bstream;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use std::io::SeekFrom;

    fn state_for(mode: OpenMode, channels: u32) -> FileState {
        let format = FormatId::new(CONTAINER_WAV, CODEC_MS_ADPCM, Endian::File);
        let mut fs = FileState::new(mode, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 8000;
        fs.channels = channels;
        fs
    }

    fn slow_ramp(len: usize) -> Vec<i16> {
        let mut rng = SmallRng::seed_from_u64(1234);
        let mut value = 0i32;
        (0..len)
            .map(|_| {
                value = (value + rng.gen_range(-40..=40)).clamp(-30000, 30000);
                value as i16
            })
            .collect()
    }

    #[test]
    fn round_trips_smooth_signals() {
        let mut fs = state_for(OpenMode::Write, 1);
        let mut codec = MsAdpcm::init(&mut fs).unwrap();

        let frames = fs.codec_params.frames_per_block as usize;
        let samples = slow_ramp(frames * 3);

        codec.write_i16(&mut fs, &samples).unwrap();
        codec.close(&mut fs).unwrap();

        fs.mode = OpenMode::Read;
        fs.stream.seek(SeekFrom::Start(0)).unwrap();

        let mut codec = MsAdpcm::init(&mut fs).unwrap();
        let mut back = vec![0i16; samples.len()];
        assert_eq!(codec.read_i16(&mut fs, &mut back).unwrap(), samples.len());

        for (index, (a, b)) in samples.iter().zip(back.iter()).enumerate() {
            let err = (i32::from(*a) - i32::from(*b)).abs();
            assert!(err <= 512, "sample {}: {} vs {} (err {})", index, a, b, err);
        }
    }

    #[test]
    fn seed_samples_are_stored_exactly() {
        let mut fs = state_for(OpenMode::Write, 2);
        let mut codec = MsAdpcm::init(&mut fs).unwrap();

        let frames = fs.codec_params.frames_per_block as usize;
        let mut samples = vec![0i16; frames * 2];
        samples[0] = 12345;
        samples[1] = -23456;
        samples[2] = 12000;
        samples[3] = -23000;

        codec.write_i16(&mut fs, &samples).unwrap();
        codec.close(&mut fs).unwrap();

        fs.mode = OpenMode::Read;
        fs.stream.seek(SeekFrom::Start(0)).unwrap();

        let mut codec = MsAdpcm::init(&mut fs).unwrap();
        let mut back = vec![0i16; 4];
        codec.read_i16(&mut fs, &mut back).unwrap();

        assert_eq!(&back, &[12345, -23456, 12000, -23000]);
    }

    #[test]
    fn encoded_blocks_are_exactly_block_align() {
        let mut fs = state_for(OpenMode::Write, 1);
        let mut codec = MsAdpcm::init(&mut fs).unwrap();

        let frames = fs.codec_params.frames_per_block as usize;
        codec.write_i16(&mut fs, &vec![0i16; frames + 3]).unwrap();
        codec.close(&mut fs).unwrap();

        assert_eq!(
            fs.stream.byte_len().unwrap(),
            2 * u64::from(fs.codec_params.block_align)
        );
    }
}
