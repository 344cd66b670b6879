// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Cantata crates. Please see the top-level
// Cargo.toml for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

//! Codec drivers for linear PCM (8/16/24/32-bit), IEEE float32/float64, A-law, and
//! µ-law.
//!
//! All of them are plain per-sample transcodes: bytes move through a scratch buffer
//! an array at a time, the endian swap is applied lazily against the host byte
//! order, and 24-bit samples are packed and unpacked byte-wise. Sample-type
//! conversion composes with the codec's native width through the handle's
//! normalisation, scaling, and clipping switches.

use cantata_core::conv;
use cantata_core::errors::{unsupported_error, Result};
use cantata_core::format::{
    CodecId, CODEC_ALAW, CODEC_DOUBLE, CODEC_FLOAT, CODEC_PCM_16, CODEC_PCM_24, CODEC_PCM_32,
    CODEC_PCM_S8, CODEC_PCM_U8, CODEC_ULAW,
};
use cantata_core::handle::{Codec, FileState, BUFFER_LEN};

mod xlaw;

pub use xlaw::{alaw_to_linear, linear_to_alaw, linear_to_mulaw, mulaw_to_linear};

/// The native sample layout of one codec.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Kind {
    U8,
    S8,
    I16,
    I24,
    I32,
    F32,
    F64,
    Alaw,
    Ulaw,
}

impl Kind {
    fn from_codec(codec: CodecId) -> Option<Kind> {
        match codec {
            CODEC_PCM_U8 => Some(Kind::U8),
            CODEC_PCM_S8 => Some(Kind::S8),
            CODEC_PCM_16 => Some(Kind::I16),
            CODEC_PCM_24 => Some(Kind::I24),
            CODEC_PCM_32 => Some(Kind::I32),
            CODEC_FLOAT => Some(Kind::F32),
            CODEC_DOUBLE => Some(Kind::F64),
            CODEC_ALAW => Some(Kind::Alaw),
            CODEC_ULAW => Some(Kind::Ulaw),
            _ => None,
        }
    }

    /// Bytes of one sample on disk.
    fn width(&self) -> usize {
        match *self {
            Kind::U8 | Kind::S8 | Kind::Alaw | Kind::Ulaw => 1,
            Kind::I16 => 2,
            Kind::I24 => 3,
            Kind::I32 | Kind::F32 => 4,
            Kind::F64 => 8,
        }
    }

    /// Significant bits of the decoded integer value. The companded codecs expand
    /// to 16-bit linear.
    fn bits(&self) -> u32 {
        match *self {
            Kind::U8 | Kind::S8 => 8,
            Kind::I16 | Kind::Alaw | Kind::Ulaw => 16,
            Kind::I24 => 24,
            _ => 32,
        }
    }

    fn is_float(&self) -> bool {
        matches!(*self, Kind::F32 | Kind::F64)
    }
}

/// The PCM family codec driver.
pub struct PcmCodec {
    kind: Kind,
    /// Set when the on-disk byte order differs from the host's.
    endswap: bool,
    scratch: Vec<u8>,
}

impl PcmCodec {
    /// Binds the driver to a handle whose container has selected one of the PCM
    /// family codecs and resolved the data byte order.
    pub fn init(fs: &mut FileState) -> Result<Box<dyn Codec>> {
        let kind = match Kind::from_codec(fs.codec()) {
            Some(kind) => kind,
            None => return unsupported_error("pcm: invalid codec type"),
        };

        fs.init_widths();
        fs.update_frame_count();

        let endswap = fs.big_endian != cfg!(target_endian = "big");

        Ok(Box::new(PcmCodec { kind, endswap, scratch: vec![0u8; BUFFER_LEN] }))
    }

    /// Decodes the integer sample at `at` in the scratch buffer into its native
    /// width, sign extended.
    fn decode_int(&self, at: usize) -> i32 {
        let bytes = &self.scratch[at..];

        match self.kind {
            Kind::U8 => i32::from(bytes[0]) - 128,
            Kind::S8 => i32::from(bytes[0] as i8),
            Kind::Alaw => i32::from(alaw_to_linear(bytes[0])),
            Kind::Ulaw => i32::from(mulaw_to_linear(bytes[0])),
            Kind::I16 => {
                let raw = [bytes[0], bytes[1]];
                if self.file_big_endian() {
                    i32::from(i16::from_be_bytes(raw))
                }
                else {
                    i32::from(i16::from_le_bytes(raw))
                }
            }
            Kind::I24 => {
                if self.file_big_endian() {
                    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8
                }
                else {
                    i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8
                }
            }
            Kind::I32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                if self.file_big_endian() {
                    i32::from_be_bytes(raw)
                }
                else {
                    i32::from_le_bytes(raw)
                }
            }
            Kind::F32 | Kind::F64 => unreachable!("float kinds decode via decode_float"),
        }
    }

    fn decode_float(&self, at: usize) -> f64 {
        let bytes = &self.scratch[at..];

        match self.kind {
            Kind::F32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                if self.file_big_endian() {
                    f64::from(f32::from_be_bytes(raw))
                }
                else {
                    f64::from(f32::from_le_bytes(raw))
                }
            }
            Kind::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                if self.file_big_endian() {
                    f64::from_be_bytes(raw)
                }
                else {
                    f64::from_le_bytes(raw)
                }
            }
            _ => unreachable!("integer kinds decode via decode_int"),
        }
    }

    /// Encodes a native-width integer sample into the scratch buffer at `at`.
    fn encode_int(&mut self, at: usize, value: i32) {
        let big = self.file_big_endian();
        let bytes = &mut self.scratch[at..];

        match self.kind {
            Kind::U8 => bytes[0] = (value + 128) as u8,
            Kind::S8 => bytes[0] = value as i8 as u8,
            Kind::Alaw => bytes[0] = linear_to_alaw(conv::clamp_i16(value)),
            Kind::Ulaw => bytes[0] = linear_to_mulaw(conv::clamp_i16(value)),
            Kind::I16 => {
                let raw = if big {
                    (value as i16).to_be_bytes()
                }
                else {
                    (value as i16).to_le_bytes()
                };
                bytes[..2].copy_from_slice(&raw);
            }
            Kind::I24 => {
                let raw = (value as u32) & 0x00ff_ffff;
                if big {
                    bytes[..3].copy_from_slice(&raw.to_be_bytes()[1..4]);
                }
                else {
                    bytes[..3].copy_from_slice(&raw.to_le_bytes()[0..3]);
                }
            }
            Kind::I32 => {
                let raw = if big { value.to_be_bytes() } else { value.to_le_bytes() };
                bytes[..4].copy_from_slice(&raw);
            }
            Kind::F32 | Kind::F64 => unreachable!("float kinds encode via encode_float"),
        }
    }

    fn encode_float(&mut self, at: usize, value: f64) {
        let big = self.file_big_endian();
        let bytes = &mut self.scratch[at..];

        match self.kind {
            Kind::F32 => {
                let raw =
                    if big { (value as f32).to_be_bytes() } else { (value as f32).to_le_bytes() };
                bytes[..4].copy_from_slice(&raw);
            }
            Kind::F64 => {
                let raw = if big { value.to_be_bytes() } else { value.to_le_bytes() };
                bytes[..8].copy_from_slice(&raw);
            }
            _ => unreachable!("integer kinds encode via encode_int"),
        }
    }

    fn file_big_endian(&self) -> bool {
        self.endswap != cfg!(target_endian = "big")
    }
}

/// Converts a scaled float into a `bits`-wide native integer. Without clipping the
/// saturating cast of the host is accepted.
fn f64_to_native(value: f64, bits: u32, clip: bool) -> i32 {
    if clip && bits < 32 {
        let max = f64::from((1i32 << (bits - 1)) - 1);
        let min = f64::from(-(1i32 << (bits - 1)));
        value.round().clamp(min, max) as i32
    }
    else {
        conv::f64_to_i32(value, clip)
    }
}

macro_rules! pcm_read_impl {
    ($fname:ident, $ty:ty, $native:expr, $from_int:expr, $from_flt:expr) => {
        fn $fname(&mut self, fs: &mut FileState, buf: &mut [$ty]) -> Result<usize> {
            let width = self.kind.width();

            // When the caller type is the native layout and no swap is needed the
            // transcode is a straight copy.
            if !self.endswap && self.kind == $native {
                let bytes_buf: &mut [u8] = bytemuck::cast_slice_mut(buf);
                let got = fs.stream.read_buf(bytes_buf)?;
                return Ok(got / width);
            }

            let mut done = 0;

            while done < buf.len() {
                let items = (buf.len() - done).min(BUFFER_LEN / width);
                let bytes = items * width;

                let got = fs.stream.read_buf(&mut self.scratch[..bytes])?;
                let got_items = got / width;

                if got_items == 0 {
                    break;
                }

                let bits = self.kind.bits();
                let is_float = self.kind.is_float();

                for k in 0..got_items {
                    buf[done + k] = if is_float {
                        let value = self.decode_float(k * width);
                        ($from_flt)(value, fs)
                    }
                    else {
                        let value = self.decode_int(k * width);
                        ($from_int)(value, bits, fs)
                    };
                }

                done += got_items;

                if got < bytes {
                    break;
                }
            }

            Ok(done)
        }
    };
}

macro_rules! pcm_write_impl {
    ($fname:ident, $ty:ty, $native:expr, $to_int:expr, $to_flt:expr) => {
        fn $fname(&mut self, fs: &mut FileState, buf: &[$ty]) -> Result<usize> {
            let width = self.kind.width();

            if !self.endswap && self.kind == $native {
                fs.stream.write_buf(bytemuck::cast_slice(buf))?;
                fs.data_length =
                    fs.data_length.max(fs.stream.pos().saturating_sub(fs.data_offset));
                return Ok(buf.len());
            }

            let mut done = 0;

            while done < buf.len() {
                let items = (buf.len() - done).min(BUFFER_LEN / width);
                let bytes = items * width;

                let bits = self.kind.bits();
                let is_float = self.kind.is_float();

                for k in 0..items {
                    let sample = buf[done + k];
                    if is_float {
                        let value: f64 = ($to_flt)(sample, fs);
                        self.encode_float(k * width, value);
                    }
                    else {
                        let value: i32 = ($to_int)(sample, bits, fs);
                        self.encode_int(k * width, value);
                    }
                }

                fs.stream.write_buf(&self.scratch[..bytes])?;
                done += items;
            }

            fs.data_length = fs.data_length.max(fs.stream.pos().saturating_sub(fs.data_offset));

            Ok(done)
        }
    };
}

impl Codec for PcmCodec {
    pcm_read_impl!(
        read_i16,
        i16,
        Kind::I16,
        |v: i32, bits: u32, _fs: &FileState| {
            if bits >= 16 {
                (v >> (bits - 16)) as i16
            }
            else {
                (v << (16 - bits)) as i16
            }
        },
        |f: f64, fs: &FileState| {
            let scale = if fs.scale_float_int_read { 32768.0 } else { 1.0 };
            conv::f64_to_i16(f * scale, fs.clipping)
        }
    );

    pcm_read_impl!(
        read_i32,
        i32,
        Kind::I32,
        |v: i32, bits: u32, _fs: &FileState| v << (32 - bits),
        |f: f64, fs: &FileState| {
            let scale = if fs.scale_float_int_read { 2147483648.0 } else { 1.0 };
            conv::f64_to_i32(f * scale, fs.clipping)
        }
    );

    pcm_read_impl!(
        read_f32,
        f32,
        Kind::F32,
        |v: i32, bits: u32, fs: &FileState| {
            (f64::from(v) * conv::int_to_float_scale(fs.norm_float, bits)) as f32
        },
        |f: f64, _fs: &FileState| f as f32
    );

    pcm_read_impl!(
        read_f64,
        f64,
        Kind::F64,
        |v: i32, bits: u32, fs: &FileState| {
            f64::from(v) * conv::int_to_float_scale(fs.norm_double, bits)
        },
        |f: f64, _fs: &FileState| f
    );

    pcm_write_impl!(
        write_i16,
        i16,
        Kind::I16,
        |v: i16, bits: u32, _fs: &FileState| {
            if bits >= 16 {
                i32::from(v) << (bits - 16)
            }
            else {
                i32::from(v) >> (16 - bits)
            }
        },
        |v: i16, fs: &FileState| {
            if fs.scale_int_float_write {
                f64::from(v) / 32768.0
            }
            else {
                f64::from(v)
            }
        }
    );

    pcm_write_impl!(
        write_i32,
        i32,
        Kind::I32,
        |v: i32, bits: u32, _fs: &FileState| if bits < 32 { v >> (32 - bits) } else { v },
        |v: i32, fs: &FileState| {
            if fs.scale_int_float_write {
                f64::from(v) / 2147483648.0
            }
            else {
                f64::from(v)
            }
        }
    );

    pcm_write_impl!(
        write_f32,
        f32,
        Kind::F32,
        |v: f32, bits: u32, fs: &FileState| {
            f64_to_native(
                f64::from(v) * conv::float_to_int_scale(fs.norm_float, bits),
                bits,
                fs.clipping,
            )
        },
        |v: f32, _fs: &FileState| f64::from(v)
    );

    pcm_write_impl!(
        write_f64,
        f64,
        Kind::F64,
        |v: f64, bits: u32, fs: &FileState| {
            f64_to_native(v * conv::float_to_int_scale(fs.norm_double, bits), bits, fs.clipping)
        },
        |v: f64, _fs: &FileState| v
    );
}
