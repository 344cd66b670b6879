// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OKI / Dialogic VOX ADPCM.
//!
//! A headerless stream of 4-bit codes over a 12-bit predictor and a 49-entry step
//! table. The coder state runs across the whole stream, so files are mono, decoded
//! from the start, and re-opened rather than seeked. Some early hardware did not
//! reset the coder between files; a DC offset in old recordings is expected and can
//! be removed with a gentle high-pass after decoding.

use cantata_core::errors::{bad_mode_error, Result};
use cantata_core::handle::{Codec, CodecParams, FileState};

use crate::common::{BlockDriver, BlockTranscoder, Nibble, IMA_INDEX_TABLE};

/// The 49-step OKI quantiser table.
#[rustfmt::skip]
const OKI_STEP_TABLE: [i32; 49] = [
    16, 17, 19, 21, 23, 25, 28, 31, 34, 37,
    41, 45, 50, 55, 60, 66, 73, 80, 88, 97,
    107, 118, 130, 143, 157, 173, 190, 209, 230, 253,
    279, 307, 337, 371, 408, 449, 494, 544, 598, 658,
    724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552,
];

/// Codes per buffered run. The stream itself has no framing; this is just the
/// driver's chunking granularity.
const VOX_BLOCK_BYTES: usize = 256;

#[derive(Copy, Clone, Default)]
struct OkiState {
    /// 12-bit predictor.
    predictor: i32,
    step_index: i32,
}

impl OkiState {
    fn expand(&mut self, code: u8) -> i16 {
        let step = OKI_STEP_TABLE[self.step_index as usize];

        let mut diff = step >> 3;
        if code & 0x04 != 0 {
            diff += step;
        }
        if code & 0x02 != 0 {
            diff += step >> 1;
        }
        if code & 0x01 != 0 {
            diff += step >> 2;
        }
        if code & 0x08 != 0 {
            diff = -diff;
        }

        self.predictor = (self.predictor + diff).clamp(-2048, 2047);
        self.step_index = (self.step_index + IMA_INDEX_TABLE[usize::from(code & 0x07)]).clamp(0, 48);

        (self.predictor << 4) as i16
    }

    fn compress(&mut self, sample: i16) -> u8 {
        let step = OKI_STEP_TABLE[self.step_index as usize];
        let mut delta = i32::from(sample >> 4) - self.predictor;

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

/// The VOX transcoder: two codes per byte, state carried across chunks.
pub struct VoxAdpcm {
    state: OkiState,
}

impl VoxAdpcm {
    pub fn init(fs: &mut FileState) -> Result<Box<dyn Codec>> {
        if fs.channels != 1 {
            return bad_mode_error("vox: only mono streams are supported");
        }

        // Headerless: assume the telephony defaults when the caller gave none.
        if fs.sample_rate == 0 {
            fs.sample_rate = 8000;
        }

        fs.byte_width = 0;
        fs.block_width = 0;
        fs.codec_params = CodecParams {
            block_align: VOX_BLOCK_BYTES as u32,
            frames_per_block: (VOX_BLOCK_BYTES * 2) as u32,
        };

        // Two samples per byte, no framing to round to.
        fs.frames = fs.data_length * 2;

        Ok(Box::new(BlockDriver::new(fs, VoxAdpcm { state: OkiState::default() })?))
    }
}

impl BlockTranscoder for VoxAdpcm {
    fn channels(&self) -> usize {
        1
    }

    fn frames_per_block(&self) -> usize {
        VOX_BLOCK_BYTES * 2
    }

    fn block_align(&self) -> usize {
        VOX_BLOCK_BYTES
    }

    fn decode_block(&mut self, block: &[u8], bytes: usize, out: &mut [i16]) -> usize {
        for (index, byte) in block[..bytes].iter().enumerate() {
            out[index * 2] = self.state.expand(Nibble::Upper.get(*byte));
            out[index * 2 + 1] = self.state.expand(Nibble::Lower.get(*byte));
        }

        bytes * 2
    }

    fn encode_block(&mut self, samples: &[i16], valid: usize, out: &mut [u8]) -> usize {
        let bytes = valid.div_ceil(2);

        for (index, slot) in out[..bytes].iter_mut().enumerate() {
            *slot = 0;
            Nibble::Upper.put(slot, self.state.compress(samples[index * 2]));

            let code = if index * 2 + 1 < valid {
                self.state.compress(samples[index * 2 + 1])
            }
            else {
                0
            };
            Nibble::Lower.put(slot, code);
        }

        bytes
    }

    fn reset(&mut self) {
        self.state = OkiState::default();
    }

    fn seekable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::format::{Endian, FormatId, CODEC_VOX_ADPCM, CONTAINER_RAW};
    use cantata_core::handle::OpenMode;
    use cantata_core::io::Bstream;

    use std::io::SeekFrom;

    fn state_for(mode: OpenMode) -> FileState {
        let format = FormatId::new(CONTAINER_RAW, CODEC_VOX_ADPCM, Endian::File);
        let mut fs = FileState::new(mode, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 8000;
        fs.channels = 1;
        fs
    }

    #[test]
    fn rejects_multichannel_streams() {
        let mut fs = state_for(OpenMode::Write);
        fs.channels = 2;
        assert!(VoxAdpcm::init(&mut fs).is_err());
    }

    #[test]
    fn round_trips_a_tone_like_ramp() {
        let mut fs = state_for(OpenMode::Write);
        let mut codec = VoxAdpcm::init(&mut fs).unwrap();

        // A triangle sweep with small per-sample deltas, as telephony audio is.
        let mut samples = Vec::with_capacity(3000);
        let mut v = 0i32;
        let mut dir = 37i32 * 16;
        for _ in 0..3000 {
            v += dir;
            if v.abs() > 12000 {
                dir = -dir;
            }
            samples.push(v as i16);
        }

        codec.write_i16(&mut fs, &samples).unwrap();
        codec.close(&mut fs).unwrap();

        // Two samples per byte on disk.
        assert_eq!(fs.stream.byte_len().unwrap(), 1500);

        fs.mode = OpenMode::Read;
        fs.stream.seek(SeekFrom::Start(0)).unwrap();
        fs.data_length = 1500;

        let mut codec = VoxAdpcm::init(&mut fs).unwrap();
        assert_eq!(fs.frames, 3000);

        let mut back = vec![0i16; samples.len()];
        assert_eq!(codec.read_i16(&mut fs, &mut back).unwrap(), samples.len());

        // 12-bit precision: quantisation error within a couple of steps of 16<<4.
        for (index, (a, b)) in samples.iter().zip(back.iter()).enumerate() {
            let err = (i32::from(*a) - i32::from(*b)).abs();
            assert!(err <= 2048, "sample {}: {} vs {} (err {})", index, a, b, err);
        }
    }

    #[test]
    fn odd_sample_counts_pad_the_last_nibble() {
        let mut fs = state_for(OpenMode::Write);
        let mut codec = VoxAdpcm::init(&mut fs).unwrap();

        codec.write_i16(&mut fs, &[100i16; 7]).unwrap();
        codec.close(&mut fs).unwrap();

        assert_eq!(fs.stream.byte_len().unwrap(), 4);
    }
}
