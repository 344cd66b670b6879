// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IMA ADPCM in its two container flavours.
//!
//! The WAV flavour stores a 4-byte per-channel preamble (predictor, step index)
//! followed by interleaved 4-byte channel runs of nibbles; the first frame is the
//! preamble predictor itself. The AIFF-C `ima4` flavour stores 34-byte per-channel
//! blocks: a 2-byte packed state word then 32 bytes holding 64 codes.

use cantata_core::conv::clamp_i16;
use cantata_core::errors::{decode_error, Result};
use cantata_core::handle::{Codec, CodecParams, FileState, OpenMode};

use crate::common::{BlockDriver, BlockTranscoder, Nibble, IMA_INDEX_TABLE, IMA_STEP_TABLE};

/// Default encoded block size per channel for freshly written WAV files.
const IMA_WAV_DEFAULT_BLOCK_ALIGN: u32 = 256;

/// AIFF-C `ima4` constants: 34 bytes and 64 frames per channel block.
const IMA_AIFF_BLOCK_LEN: usize = 34;
const IMA_AIFF_FRAMES_PER_BLOCK: usize = 64;

/// Per-channel predictor state, shared by both flavours.
#[derive(Copy, Clone, Default)]
struct ImaState {
    predictor: i32,
    step_index: i32,
}

impl ImaState {
    fn clamp_index(&mut self) {
        self.step_index = self.step_index.clamp(0, 88);
    }

    /// Reconstructs one sample from a 4-bit code, updating the state exactly as
    /// the expander does.
    fn expand(&mut self, code: u8) -> i16 {
        let step = IMA_STEP_TABLE[self.step_index as usize];
        let sign = (code & 0x08) != 0;
        let delta = i32::from(code & 0x07);

        let diff = ((2 * delta + 1) * step) >> 3;
        let predictor = if sign { self.predictor - diff } else { self.predictor + diff };

        self.predictor = i32::from(clamp_i16(predictor));
        self.step_index += IMA_INDEX_TABLE[code as usize];
        self.clamp_index();

        self.predictor as i16
    }

    /// Quantises one sample into a 4-bit code, then mirrors [`ImaState::expand`]
    /// so encoder and decoder stay in lock step.
    fn compress(&mut self, sample: i16) -> u8 {
        let step = IMA_STEP_TABLE[self.step_index as usize];
        let mut delta = i32::from(sample) - self.predictor;

        let mut code: u8 = 0;
        if delta < 0 {
            code = 0x08;
            delta = -delta;
        }

        if delta >= step {
            code |= 0x04;
            delta -= step;
        }
        if delta >= step >> 1 {
            code |= 0x02;
            delta -= step >> 1;
        }
        if delta >= step >> 2 {
            code |= 0x01;
        }

        self.expand(code);
        code
    }
}

/// The WAV block layout.
pub struct ImaWav {
    channels: usize,
    block_align: usize,
    frames_per_block: usize,
    state: Vec<ImaState>,
}

impl ImaWav {
    /// Binds the WAV-flavour driver. On read the container has already stored the
    /// block align and frames per block from the `fmt ` chunk; on write defaults
    /// are chosen here and published through the codec params.
    pub fn init(fs: &mut FileState) -> Result<Box<dyn Codec>> {
        let channels = fs.channels as usize;

        if fs.mode == OpenMode::Write && fs.codec_params.block_align == 0 {
            let block_align = IMA_WAV_DEFAULT_BLOCK_ALIGN * fs.channels;
            fs.codec_params = CodecParams {
                block_align,
                frames_per_block: (block_align - 4 * fs.channels) * 2 / fs.channels + 1,
            };
        }

        let block_align = fs.codec_params.block_align as usize;
        let frames_per_block = fs.codec_params.frames_per_block as usize;

        if block_align < 4 * channels
            || frames_per_block != (block_align - 4 * channels) * 2 / channels + 1
        {
            return decode_error("ima: bad block align or frames per block");
        }

        fs.byte_width = 0;
        fs.block_width = 0;
        fs.update_frame_count();

        let transcoder = ImaWav {
            channels,
            block_align,
            frames_per_block,
            state: vec![ImaState::default(); channels],
        };

        Ok(Box::new(BlockDriver::new(fs, transcoder)?))
    }
}

impl BlockTranscoder for ImaWav {
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

        if bytes < 4 * channels {
            return 0;
        }

        let mut state = vec![ImaState::default(); channels];

        // Per-channel preamble; the predictor is the first output frame verbatim.
        for (ch, st) in state.iter_mut().enumerate() {
            let at = ch * 4;
            st.predictor = i32::from(i16::from_le_bytes([block[at], block[at + 1]]));
            st.step_index = i32::from(block[at + 2]);
            st.clamp_index();

            out[ch] = st.predictor as i16;
        }

        let data = &block[4 * channels..bytes];
        let mut frames = 1;

        for (index, byte) in data.iter().enumerate() {
            // Nibble data comes in interleaved 4-byte channel runs, eight samples
            // per channel per run group.
            let ch = (index / 4) % channels;
            let group = index / (4 * channels);
            let within = index % 4;

            let frame = 1 + group * 8 + within * 2;

            if frame < self.frames_per_block {
                out[frame * channels + ch] = state[ch].expand(Nibble::Lower.get(*byte));
                frames = frames.max(frame + 1);
            }
            if frame + 1 < self.frames_per_block {
                out[(frame + 1) * channels + ch] = state[ch].expand(Nibble::Upper.get(*byte));
                frames = frames.max(frame + 2);
            }
        }

        frames
    }

    fn encode_block(&mut self, samples: &[i16], _valid: usize, out: &mut [u8]) -> usize {
        let channels = self.channels;

        out.fill(0);

        // The preamble stores the first frame and the carried step index; the
        // predictor picks up from there.
        for ch in 0..channels {
            let st = &mut self.state[ch];
            st.predictor = i32::from(samples[ch]);

            let at = ch * 4;
            out[at..at + 2].copy_from_slice(&samples[ch].to_le_bytes());
            out[at + 2] = st.step_index as u8;
            out[at + 3] = 0;
        }

        for frame in 1..self.frames_per_block {
            for ch in 0..channels {
                let code = self.state[ch].compress(samples[frame * channels + ch]);

                let k = frame - 1;
                let group = k / 8;
                let within = k % 8;
                let at = 4 * channels + group * 4 * channels + ch * 4 + within / 2;

                let nibble = if within % 2 == 0 { Nibble::Lower } else { Nibble::Upper };
                nibble.put(&mut out[at], code);
            }
        }

        self.block_align
    }

    fn reset(&mut self) {
        self.state.fill(ImaState::default());
    }
}

/// The AIFF-C `ima4` block layout.
pub struct ImaAiff {
    channels: usize,
    state: Vec<ImaState>,
}

impl ImaAiff {
    pub fn init(fs: &mut FileState) -> Result<Box<dyn Codec>> {
        let channels = fs.channels as usize;

        fs.codec_params = CodecParams {
            block_align: (IMA_AIFF_BLOCK_LEN * channels) as u32,
            frames_per_block: IMA_AIFF_FRAMES_PER_BLOCK as u32,
        };

        fs.byte_width = 0;
        fs.block_width = 0;
        fs.update_frame_count();

        let transcoder = ImaAiff { channels, state: vec![ImaState::default(); channels] };

        Ok(Box::new(BlockDriver::new(fs, transcoder)?))
    }
}

impl BlockTranscoder for ImaAiff {
    fn channels(&self) -> usize {
        self.channels
    }

    fn frames_per_block(&self) -> usize {
        IMA_AIFF_FRAMES_PER_BLOCK
    }

    fn block_align(&self) -> usize {
        IMA_AIFF_BLOCK_LEN * self.channels
    }

    fn decode_block(&mut self, block: &[u8], bytes: usize, out: &mut [i16]) -> usize {
        let channels = self.channels;

        if bytes < self.block_align() {
            return 0;
        }

        for ch in 0..channels {
            let chunk = &block[ch * IMA_AIFF_BLOCK_LEN..(ch + 1) * IMA_AIFF_BLOCK_LEN];

            // The state word packs the previous predictor in the top nine bits and
            // the step index in the low seven.
            let word = u16::from_be_bytes([chunk[0], chunk[1]]);
            let mut state = ImaState {
                predictor: i32::from((word & 0xff80) as i16),
                step_index: i32::from(word & 0x007f),
            };
            state.clamp_index();

            for (k, byte) in chunk[2..].iter().enumerate() {
                out[(k * 2) * channels + ch] = state.expand(Nibble::Lower.get(*byte));
                out[(k * 2 + 1) * channels + ch] = state.expand(Nibble::Upper.get(*byte));
            }
        }

        IMA_AIFF_FRAMES_PER_BLOCK
    }

    fn encode_block(&mut self, samples: &[i16], _valid: usize, out: &mut [u8]) -> usize {
        let channels = self.channels;

        out.fill(0);

        for ch in 0..channels {
            let st = &mut self.state[ch];
            let word = ((st.predictor as u16) & 0xff80) | ((st.step_index as u16) & 0x007f);

            let chunk = &mut out[ch * IMA_AIFF_BLOCK_LEN..(ch + 1) * IMA_AIFF_BLOCK_LEN];
            chunk[0..2].copy_from_slice(&word.to_be_bytes());
        }

        for frame in 0..IMA_AIFF_FRAMES_PER_BLOCK {
            for ch in 0..channels {
                let code = self.state[ch].compress(samples[frame * channels + ch]);
                let at = ch * IMA_AIFF_BLOCK_LEN + 2 + frame / 2;
                let nibble = if frame % 2 == 0 { Nibble::Lower } else { Nibble::Upper };
                nibble.put(&mut out[at], code);
            }
        }

        self.block_align()
    }

    fn reset(&mut self) {
        self.state.fill(ImaState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::format::{Endian, FormatId, CODEC_IMA_ADPCM, CONTAINER_WAV};
    use cantata_core::io::Bstream;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use std::io::SeekFrom;

    fn state_for(mode: OpenMode, channels: u32) -> FileState {
        let format = FormatId::new(CONTAINER_WAV, CODEC_IMA_ADPCM, Endian::File);
        let mut fs = FileState::new(mode, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 8000;
        fs.channels = channels;
        fs
    }

    fn slow_ramp(len: usize) -> Vec<i16> {
        let mut rng = SmallRng::seed_from_u64(99);
        let mut value = 0i32;
        (0..len)
            .map(|_| {
                value = (value + rng.gen_range(-24..=24)).clamp(-32000, 32000);
                value as i16
            })
            .collect()
    }

    fn assert_close(a: &[i16], b: &[i16], tolerance: i32) {
        assert_eq!(a.len(), b.len());
        for (index, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            let err = (i32::from(*x) - i32::from(*y)).abs();
            assert!(err <= tolerance, "sample {}: {} vs {} (err {})", index, x, y, err);
        }
    }

    #[test]
    fn wav_flavour_round_trips_smooth_signals() {
        let mut fs = state_for(OpenMode::Write, 1);
        let mut codec = ImaWav::init(&mut fs).unwrap();

        let frames_per_block = fs.codec_params.frames_per_block as usize;
        let samples = slow_ramp(frames_per_block * 3);

        codec.write_i16(&mut fs, &samples).unwrap();
        codec.close(&mut fs).unwrap();

        fs.mode = OpenMode::Read;
        fs.stream.seek(SeekFrom::Start(0)).unwrap();
        fs.data_length = fs.file_length.max(fs.stream.byte_len().unwrap_or(0));

        let mut codec = ImaWav::init(&mut fs).unwrap();
        let mut back = vec![0i16; samples.len()];
        assert_eq!(codec.read_i16(&mut fs, &mut back).unwrap(), samples.len());

        assert_close(&samples, &back, 128);
    }

    #[test]
    fn wav_flavour_stereo_keeps_channels_apart() {
        let mut fs = state_for(OpenMode::Write, 2);
        let mut codec = ImaWav::init(&mut fs).unwrap();

        let frames = fs.codec_params.frames_per_block as usize;
        let mut samples = vec![0i16; frames * 2];
        for f in 0..frames {
            samples[f * 2] = 1000;
            samples[f * 2 + 1] = -1000;
        }

        codec.write_i16(&mut fs, &samples).unwrap();
        codec.close(&mut fs).unwrap();

        fs.mode = OpenMode::Read;
        fs.stream.seek(SeekFrom::Start(0)).unwrap();

        let mut codec = ImaWav::init(&mut fs).unwrap();
        let mut back = vec![0i16; samples.len()];
        codec.read_i16(&mut fs, &mut back).unwrap();

        // After the attack transient both channels must sit near their plateaus.
        for f in 16..frames {
            assert!((i32::from(back[f * 2]) - 1000).abs() <= 300, "frame {}: {}", f, back[f * 2]);
            assert!((i32::from(back[f * 2 + 1]) + 1000).abs() <= 300);
        }
    }

    #[test]
    fn wav_partial_tail_block_is_flushed_on_close() {
        let mut fs = state_for(OpenMode::Write, 1);
        let mut codec = ImaWav::init(&mut fs).unwrap();

        codec.write_i16(&mut fs, &[100i16; 10]).unwrap();
        codec.close(&mut fs).unwrap();

        // Exactly one full encoded block on disk.
        assert_eq!(fs.stream.byte_len().unwrap(), u64::from(fs.codec_params.block_align));
    }

    #[test]
    fn aiff_flavour_round_trips_smooth_signals() {
        let mut fs = state_for(OpenMode::Write, 1);
        let mut codec = ImaAiff::init(&mut fs).unwrap();

        let samples = slow_ramp(64 * 4);
        codec.write_i16(&mut fs, &samples).unwrap();
        codec.close(&mut fs).unwrap();

        assert_eq!(fs.stream.byte_len().unwrap(), 34 * 4);

        fs.mode = OpenMode::Read;
        fs.stream.seek(SeekFrom::Start(0)).unwrap();
        fs.data_length = 34 * 4;

        let mut codec = ImaAiff::init(&mut fs).unwrap();
        let mut back = vec![0i16; samples.len()];
        assert_eq!(codec.read_i16(&mut fs, &mut back).unwrap(), samples.len());

        assert_close(&samples, &back, 128);
    }

    #[test]
    fn wav_seek_lands_on_mid_block_frames() {
        let mut fs = state_for(OpenMode::Write, 1);
        let mut codec = ImaWav::init(&mut fs).unwrap();

        let frames = fs.codec_params.frames_per_block as usize;
        let samples: Vec<i16> = (0..frames as i16 * 2).map(|v| v.wrapping_mul(3)).collect();
        codec.write_i16(&mut fs, &samples).unwrap();
        codec.close(&mut fs).unwrap();

        fs.mode = OpenMode::Read;
        fs.stream.seek(SeekFrom::Start(0)).unwrap();

        let mut codec = ImaWav::init(&mut fs).unwrap();

        let target = frames as u64 + 17;
        codec.seek(&mut fs, target).unwrap();

        let mut back = [0i16; 4];
        codec.read_i16(&mut fs, &mut back).unwrap();

        let mut reference = vec![0i16; samples.len()];
        codec.seek(&mut fs, 0).unwrap();
        codec.read_i16(&mut fs, &mut reference).unwrap();

        assert_eq!(&back, &reference[target as usize..target as usize + 4]);
    }
}
