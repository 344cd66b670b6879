// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `format` module defines the bit-packed format descriptor callers pass to
//! open-write and receive from open-read.
//!
//! A descriptor is a container tag, a codec tag, and an endian tag packed into one
//! `u32`. The numeric layout is kept stable so descriptors can be stored in caller
//! configuration and compared across versions.

use std::fmt;

use crate::errors::{unsupported_error, Error, Result};

/// Mask selecting the codec tag of a descriptor.
pub const MASK_CODEC: u32 = 0x0000_ffff;
/// Mask selecting the container tag of a descriptor.
pub const MASK_CONTAINER: u32 = 0x0fff_0000;
/// Mask selecting the endian tag of a descriptor.
pub const MASK_ENDIAN: u32 = 0x3000_0000;

/// A container format tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContainerId(u32);

pub const CONTAINER_WAV: ContainerId = ContainerId(0x01_0000);
pub const CONTAINER_AIFF: ContainerId = ContainerId(0x02_0000);
pub const CONTAINER_AU: ContainerId = ContainerId(0x03_0000);
pub const CONTAINER_RAW: ContainerId = ContainerId(0x04_0000);
pub const CONTAINER_W64: ContainerId = ContainerId(0x0b_0000);
pub const CONTAINER_WAVEX: ContainerId = ContainerId(0x13_0000);
pub const CONTAINER_CAF: ContainerId = ContainerId(0x18_0000);
pub const CONTAINER_RF64: ContainerId = ContainerId(0x22_0000);

impl ContainerId {
    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        match *self {
            CONTAINER_WAV => "wav",
            CONTAINER_AIFF => "aiff",
            CONTAINER_AU => "au",
            CONTAINER_RAW => "raw",
            CONTAINER_W64 => "w64",
            CONTAINER_WAVEX => "wavex",
            CONTAINER_CAF => "caf",
            CONTAINER_RF64 => "rf64",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A codec tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodecId(u32);

pub const CODEC_PCM_S8: CodecId = CodecId(0x0001);
pub const CODEC_PCM_16: CodecId = CodecId(0x0002);
pub const CODEC_PCM_24: CodecId = CodecId(0x0003);
pub const CODEC_PCM_32: CodecId = CodecId(0x0004);
pub const CODEC_PCM_U8: CodecId = CodecId(0x0005);
pub const CODEC_FLOAT: CodecId = CodecId(0x0006);
pub const CODEC_DOUBLE: CodecId = CodecId(0x0007);
pub const CODEC_ULAW: CodecId = CodecId(0x0010);
pub const CODEC_ALAW: CodecId = CodecId(0x0011);
pub const CODEC_IMA_ADPCM: CodecId = CodecId(0x0012);
pub const CODEC_MS_ADPCM: CodecId = CodecId(0x0013);
pub const CODEC_VOX_ADPCM: CodecId = CodecId(0x0021);

impl CodecId {
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Byte width of one mono sample, or zero for block codecs.
    pub fn byte_width(&self) -> u32 {
        match *self {
            CODEC_PCM_S8 | CODEC_PCM_U8 | CODEC_ULAW | CODEC_ALAW => 1,
            CODEC_PCM_16 => 2,
            CODEC_PCM_24 => 3,
            CODEC_PCM_32 | CODEC_FLOAT => 4,
            CODEC_DOUBLE => 8,
            _ => 0,
        }
    }

    pub fn is_block_codec(&self) -> bool {
        matches!(*self, CODEC_IMA_ADPCM | CODEC_MS_ADPCM | CODEC_VOX_ADPCM)
    }

    pub fn is_float(&self) -> bool {
        matches!(*self, CODEC_FLOAT | CODEC_DOUBLE)
    }

    pub fn name(&self) -> &'static str {
        match *self {
            CODEC_PCM_S8 => "pcm_s8",
            CODEC_PCM_16 => "pcm_16",
            CODEC_PCM_24 => "pcm_24",
            CODEC_PCM_32 => "pcm_32",
            CODEC_PCM_U8 => "pcm_u8",
            CODEC_FLOAT => "float32",
            CODEC_DOUBLE => "float64",
            CODEC_ULAW => "ulaw",
            CODEC_ALAW => "alaw",
            CODEC_IMA_ADPCM => "ima_adpcm",
            CODEC_MS_ADPCM => "ms_adpcm",
            CODEC_VOX_ADPCM => "vox_adpcm",
            _ => "unknown",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The endian tag of a descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Endian {
    /// Use the container's default byte order.
    #[default]
    File,
    Little,
    Big,
    /// Use the byte order of the host.
    Cpu,
}

impl Endian {
    fn bits(&self) -> u32 {
        match *self {
            Endian::File => 0x0000_0000,
            Endian::Little => 0x1000_0000,
            Endian::Big => 0x2000_0000,
            Endian::Cpu => 0x3000_0000,
        }
    }

    fn from_bits(bits: u32) -> Endian {
        match bits & MASK_ENDIAN {
            0x1000_0000 => Endian::Little,
            0x2000_0000 => Endian::Big,
            0x3000_0000 => Endian::Cpu,
            _ => Endian::File,
        }
    }

    /// Resolves the tag against a container's default byte order, yielding the
    /// byte order data will actually use on disk.
    pub fn resolve(&self, container_default_big: bool) -> bool {
        match *self {
            Endian::File => container_default_big,
            Endian::Little => false,
            Endian::Big => true,
            Endian::Cpu => cfg!(target_endian = "big"),
        }
    }
}

/// A bit-packed (container, codec, endian) format descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormatId(u32);

impl FormatId {
    pub fn new(container: ContainerId, codec: CodecId, endian: Endian) -> FormatId {
        FormatId(container.0 | codec.0 | endian.bits())
    }

    pub fn from_bits(bits: u32) -> FormatId {
        FormatId(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn container(&self) -> ContainerId {
        ContainerId(self.0 & MASK_CONTAINER)
    }

    pub fn codec(&self) -> CodecId {
        CodecId(self.0 & MASK_CODEC)
    }

    pub fn endian(&self) -> Endian {
        Endian::from_bits(self.0)
    }

    pub fn with_codec(&self, codec: CodecId) -> FormatId {
        FormatId((self.0 & !MASK_CODEC) | codec.0)
    }

    pub fn with_endian(&self, endian: Endian) -> FormatId {
        FormatId((self.0 & !MASK_ENDIAN) | endian.bits())
    }

    /// Validates the descriptor triple for writing: the codec must be one the
    /// container can carry, and the endian tag one it allows.
    pub fn validate(&self) -> Result<()> {
        let codec = self.codec();

        let codec_ok = match self.container() {
            CONTAINER_WAV | CONTAINER_W64 => matches!(
                codec,
                CODEC_PCM_U8
                    | CODEC_PCM_16
                    | CODEC_PCM_24
                    | CODEC_PCM_32
                    | CODEC_FLOAT
                    | CODEC_DOUBLE
                    | CODEC_ULAW
                    | CODEC_ALAW
                    | CODEC_IMA_ADPCM
                    | CODEC_MS_ADPCM
            ),
            CONTAINER_WAVEX | CONTAINER_RF64 => matches!(
                codec,
                CODEC_PCM_U8
                    | CODEC_PCM_16
                    | CODEC_PCM_24
                    | CODEC_PCM_32
                    | CODEC_FLOAT
                    | CODEC_DOUBLE
                    | CODEC_ULAW
                    | CODEC_ALAW
            ),
            CONTAINER_AIFF => matches!(
                codec,
                CODEC_PCM_S8
                    | CODEC_PCM_16
                    | CODEC_PCM_24
                    | CODEC_PCM_32
                    | CODEC_PCM_U8
                    | CODEC_FLOAT
                    | CODEC_DOUBLE
                    | CODEC_ULAW
                    | CODEC_ALAW
                    | CODEC_IMA_ADPCM
            ),
            CONTAINER_AU => matches!(
                codec,
                CODEC_PCM_S8
                    | CODEC_PCM_16
                    | CODEC_PCM_24
                    | CODEC_PCM_32
                    | CODEC_FLOAT
                    | CODEC_DOUBLE
                    | CODEC_ULAW
                    | CODEC_ALAW
            ),
            CONTAINER_CAF => matches!(
                codec,
                CODEC_PCM_S8
                    | CODEC_PCM_16
                    | CODEC_PCM_24
                    | CODEC_PCM_32
                    | CODEC_FLOAT
                    | CODEC_DOUBLE
                    | CODEC_ULAW
                    | CODEC_ALAW
            ),
            CONTAINER_RAW => matches!(
                codec,
                CODEC_PCM_S8
                    | CODEC_PCM_U8
                    | CODEC_PCM_16
                    | CODEC_PCM_24
                    | CODEC_PCM_32
                    | CODEC_FLOAT
                    | CODEC_DOUBLE
                    | CODEC_ULAW
                    | CODEC_ALAW
                    | CODEC_VOX_ADPCM
            ),
            _ => false,
        };

        if !codec_ok {
            return unsupported_error("container cannot carry the requested codec");
        }

        let endian_ok = match self.container() {
            // WAV admits RIFX for big-endian PCM; AIFF admits sowt for little.
            CONTAINER_WAV | CONTAINER_AIFF | CONTAINER_RAW | CONTAINER_AU => true,
            // The 64-bit RIFF variants and WAVEX are strictly little-endian.
            CONTAINER_RF64 | CONTAINER_W64 | CONTAINER_WAVEX => {
                matches!(self.endian(), Endian::File | Endian::Little)
            }
            CONTAINER_CAF => true,
            _ => false,
        };

        if !endian_ok {
            return Err(Error::Unsupported("container cannot use the requested byte order"));
        }

        Ok(())
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container(), self.codec())
    }
}
