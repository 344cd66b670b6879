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
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

//! Project Cantata: sampled-audio file reading, writing, and transcoding.
//!
//! This crate ties the per-format and per-codec member crates together behind
//! [`open_read`], [`open_write`], and their stream-based variants. Opening a file
//! probes the magic bytes against the container registry, binds the codec the
//! header selects, and returns one [`AudioFile`] handle carrying the whole
//! read/write/seek/command surface.

use std::fs::OpenOptions;
use std::io::SeekFrom;
use std::path::Path;

use lazy_static::lazy_static;

use cantata_core::errors::{Error, Result};
use cantata_core::format::{
    ContainerId, Endian, FormatId, CODEC_IMA_ADPCM, CODEC_MS_ADPCM, CODEC_VOX_ADPCM,
    CONTAINER_AIFF, CONTAINER_AU, CONTAINER_CAF, CONTAINER_RAW, CONTAINER_RF64, CONTAINER_W64,
    CONTAINER_WAV, CONTAINER_WAVEX,
};
use cantata_core::handle::{Codec, Container, FileState, OpenMode, WriteOptions};
use cantata_core::io::{Bstream, MediaStream};
use cantata_core::peak::PeakInfo;
use cantata_core::raw::RawContainer;

use cantata_codec_adpcm::{ImaAiff, ImaWav, MsAdpcm, VoxAdpcm};
use cantata_codec_pcm::PcmCodec;
use cantata_format_au::AuContainer;
use cantata_format_caf::CafContainer;
use cantata_format_riff::{AiffContainer, Rf64Container, W64Container, WavContainer};

pub use cantata_core::chunks::{ChunkCursor, ChunkId};
pub use cantata_core::dither::{DitherInfo, DitherMode};
pub use cantata_core::errors;
pub use cantata_core::format;
pub use cantata_core::io;
pub use cantata_core::handle::{AmbisonicMode, AudioFile, CommandReply, FileCommand, SeekWhence};
pub use cantata_core::meta::{
    ChannelPosition, Channels, CuePoint, Instrument, InstrumentLoop, LoopMode, StringTag,
};
pub use cantata_core::peak::{ChannelPeak, PeakLocation};

pub use cantata_core::handle::WriteOptions as OpenWriteOptions;

/// One container format known to the probe and the open-write dispatcher.
struct Registration {
    container: ContainerId,
    /// Matches the first sixteen bytes of a stream.
    matches: fn(&[u8; 16]) -> bool,
    open_read: fn(&mut FileState) -> Result<Box<dyn Container>>,
    open_write: fn(&mut FileState) -> Result<Box<dyn Container>>,
}

fn never(_magic: &[u8; 16]) -> bool {
    false
}

lazy_static! {
    static ref REGISTRY: Vec<Registration> = vec![
        Registration {
            container: CONTAINER_WAV,
            matches: |m| &m[0..4] == b"RIFF" || &m[0..4] == b"RIFX",
            open_read: WavContainer::open_read,
            open_write: WavContainer::open_write,
        },
        Registration {
            container: CONTAINER_WAVEX,
            matches: never,
            open_read: WavContainer::open_read,
            open_write: WavContainer::open_write,
        },
        Registration {
            container: CONTAINER_RF64,
            matches: |m| &m[0..4] == b"RF64",
            open_read: Rf64Container::open_read,
            open_write: Rf64Container::open_write,
        },
        Registration {
            container: CONTAINER_W64,
            matches: |m| &m[0..4] == b"riff",
            open_read: W64Container::open_read,
            open_write: W64Container::open_write,
        },
        Registration {
            container: CONTAINER_AIFF,
            matches: |m| &m[0..4] == b"FORM",
            open_read: AiffContainer::open_read,
            open_write: AiffContainer::open_write,
        },
        Registration {
            container: CONTAINER_CAF,
            matches: |m| &m[0..4] == b"caff",
            open_read: CafContainer::open_read,
            open_write: CafContainer::open_write,
        },
        Registration {
            container: CONTAINER_AU,
            matches: |m| &m[0..4] == b".snd" || &m[0..4] == b"dns.",
            open_read: AuContainer::open_read,
            open_write: AuContainer::open_write,
        },
        Registration {
            container: CONTAINER_RAW,
            matches: never,
            open_read: RawContainer::open,
            open_write: RawContainer::open,
        },
    ];
}

/// Binds the codec driver the handle's descriptor selects.
fn bind_codec(fs: &mut FileState) -> Result<Box<dyn Codec>> {
    match fs.codec() {
        CODEC_IMA_ADPCM if fs.container() == CONTAINER_AIFF => ImaAiff::init(fs),
        CODEC_IMA_ADPCM => ImaWav::init(fs),
        CODEC_MS_ADPCM => MsAdpcm::init(fs),
        CODEC_VOX_ADPCM => VoxAdpcm::init(fs),
        _ => PcmCodec::init(fs),
    }
}

fn assemble(mut fs: FileState, container: Box<dyn Container>) -> Result<AudioFile> {
    let codec = bind_codec(&mut fs)?;
    AudioFile::from_parts(fs, container, codec)
}

fn probe(fs: &mut FileState) -> Result<&'static Registration> {
    let mut magic = [0u8; 16];
    let _ = fs.stream.read_buf(&mut magic)?;
    fs.stream.seek(SeekFrom::Start(0))?;

    REGISTRY
        .iter()
        .find(|entry| (entry.matches)(&magic))
        .ok_or(Error::UnrecognizedFormat)
}

fn open_stream(stream: Bstream, mode: OpenMode) -> Result<AudioFile> {
    let mut fs = FileState::new(mode, stream, FormatId::from_bits(0));

    let entry = probe(&mut fs)?;
    let container = (entry.open_read)(&mut fs)?;

    assemble(fs, container)
}

/// Opens any caller-supplied stream for reading, probing the container format
/// from its magic bytes.
pub fn open_read_stream(stream: Box<dyn MediaStream>) -> Result<AudioFile> {
    open_stream(Bstream::new(stream), OpenMode::Read)
}

/// Opens a file for reading.
pub fn open_read(path: impl AsRef<Path>) -> Result<AudioFile> {
    let file = std::fs::File::open(path)?;
    open_read_stream(Box::new(file))
}

/// Opens an existing file for combined reading and writing. The header is
/// parsed as in [`open_read`]; on close only the size fields are patched, so the
/// samples never move.
pub fn open_read_write(path: impl AsRef<Path>) -> Result<AudioFile> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    open_stream(Bstream::from_file(file), OpenMode::ReadWrite)
}

/// Opens a headerless stream for reading with a caller-declared shape. This is
/// the route for raw PCM captures and VOX ADPCM.
pub fn open_raw_read_stream(
    stream: Box<dyn MediaStream>,
    options: WriteOptions,
) -> Result<AudioFile> {
    options.format.validate()?;

    let mut fs = FileState::new(OpenMode::Read, Bstream::new(stream), options.format);
    fs.sample_rate = options.sample_rate;
    fs.channels = options.channels;

    let container = RawContainer::open(&mut fs)?;
    assemble(fs, container)
}

/// Opens any caller-supplied stream for writing.
pub fn open_write_stream(stream: Box<dyn MediaStream>, options: WriteOptions) -> Result<AudioFile> {
    if options.sample_rate == 0 && options.format.container() != CONTAINER_RAW {
        return Err(Error::CommandParam("sample rate must be non-zero"));
    }
    if options.channels == 0 {
        return Err(Error::ChannelCount);
    }

    options.format.validate()?;

    let entry = REGISTRY
        .iter()
        .find(|entry| entry.container == options.format.container())
        .ok_or(Error::UnrecognizedFormat)?;

    let mut fs = FileState::new(OpenMode::Write, Bstream::new(stream), options.format);
    fs.sample_rate = options.sample_rate;
    fs.channels = options.channels;

    let container = (entry.open_write)(&mut fs)?;

    // Floating point files carry a PEAK chunk unless the caller turns it off.
    if fs.codec().is_float() && fs.add_peak_chunk {
        fs.peak = Some(PeakInfo::new(fs.channels as usize));
    }

    assemble(fs, container)
}

/// Creates (or truncates) a file and opens it for writing.
pub fn open_write(path: impl AsRef<Path>, options: WriteOptions) -> Result<AudioFile> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    open_write_stream(Box::new(file), options)
}

/// The containers this build can open.
pub fn containers() -> Vec<ContainerId> {
    REGISTRY.iter().map(|entry| entry.container).collect()
}

/// A convenience constructor for [`WriteOptions`].
pub fn write_options(format: FormatId, sample_rate: u32, channels: u32) -> WriteOptions {
    WriteOptions { format, sample_rate, channels }
}

/// Builds a descriptor from parts; a thin alias for [`FormatId::new`].
pub fn format_of(container: ContainerId, codec: format::CodecId, endian: Endian) -> FormatId {
    FormatId::new(container, codec, endian)
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::format::CODEC_PCM_16;

    #[test]
    fn registry_covers_every_container() {
        let containers = containers();

        for container in [
            CONTAINER_WAV,
            CONTAINER_WAVEX,
            CONTAINER_RF64,
            CONTAINER_W64,
            CONTAINER_AIFF,
            CONTAINER_CAF,
            CONTAINER_AU,
            CONTAINER_RAW,
        ] {
            assert!(containers.contains(&container), "{} missing", container);
        }
    }

    #[test]
    fn probe_rejects_unknown_magic() {
        let stream = Bstream::from_vec(b"OggS definitely not supported".to_vec());
        let mut fs = FileState::new(OpenMode::Read, stream, FormatId::from_bits(0));

        assert!(matches!(probe(&mut fs), Err(Error::UnrecognizedFormat)));
    }

    #[test]
    fn zero_channels_is_rejected_up_front() {
        let options =
            write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::File), 44100, 0);
        let result = open_write_stream(Box::new(std::io::Cursor::new(Vec::new())), options);

        assert!(matches!(result, Err(Error::ChannelCount)));
    }
}
