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

//! The Sun/NeXT AU container driver.
//!
//! A 24-byte header: the `.snd` magic (`dns.` for the little-endian variant), the
//! data offset, the data size, an encoding code, the sample rate, and the channel
//! count. A data size of `0xffffffff` means unknown, which is what makes AU the
//! one container here that writes cleanly to a pipe.

use std::io::SeekFrom;

use cantata_core::errors::{
    decode_error, missing_chunk_error, unsupported_error, Error, MissingChunk, Result,
};
use cantata_core::format::{
    ContainerId, Endian, FormatId, CodecId, CODEC_ALAW, CODEC_DOUBLE, CODEC_FLOAT, CODEC_PCM_16,
    CODEC_PCM_24, CODEC_PCM_32, CODEC_PCM_S8, CODEC_ULAW, CONTAINER_AU,
};
use cantata_core::handle::{Container, FileState, OpenMode};

/// The sentinel for an unknown data size.
const UNKNOWN_DATA_SIZE: u32 = 0xffff_ffff;

/// The encoding codes the driver understands.
const AU_ENCODING_ULAW: u32 = 1;
const AU_ENCODING_PCM_8: u32 = 2;
const AU_ENCODING_PCM_16: u32 = 3;
const AU_ENCODING_PCM_24: u32 = 4;
const AU_ENCODING_PCM_32: u32 = 5;
const AU_ENCODING_FLOAT: u32 = 6;
const AU_ENCODING_DOUBLE: u32 = 7;
const AU_ENCODING_ALAW: u32 = 27;

fn encoding_to_codec(encoding: u32) -> Option<CodecId> {
    match encoding {
        AU_ENCODING_ULAW => Some(CODEC_ULAW),
        AU_ENCODING_PCM_8 => Some(CODEC_PCM_S8),
        AU_ENCODING_PCM_16 => Some(CODEC_PCM_16),
        AU_ENCODING_PCM_24 => Some(CODEC_PCM_24),
        AU_ENCODING_PCM_32 => Some(CODEC_PCM_32),
        AU_ENCODING_FLOAT => Some(CODEC_FLOAT),
        AU_ENCODING_DOUBLE => Some(CODEC_DOUBLE),
        AU_ENCODING_ALAW => Some(CODEC_ALAW),
        _ => None,
    }
}

fn codec_to_encoding(codec: CodecId) -> Option<u32> {
    match codec {
        CODEC_ULAW => Some(AU_ENCODING_ULAW),
        CODEC_PCM_S8 => Some(AU_ENCODING_PCM_8),
        CODEC_PCM_16 => Some(AU_ENCODING_PCM_16),
        CODEC_PCM_24 => Some(AU_ENCODING_PCM_24),
        CODEC_PCM_32 => Some(AU_ENCODING_PCM_32),
        CODEC_FLOAT => Some(AU_ENCODING_FLOAT),
        CODEC_DOUBLE => Some(AU_ENCODING_DOUBLE),
        CODEC_ALAW => Some(AU_ENCODING_ALAW),
        _ => None,
    }
}

pub struct AuContainer;

impl AuContainer {
    pub fn open_read(fs: &mut FileState) -> Result<Box<dyn Container>> {
        fs.stream.seek(SeekFrom::Start(0))?;

        let magic = fs.stream.read_quad_bytes()?;
        let big_endian = match &magic {
            b".snd" => true,
            b"dns." => false,
            _ => return missing_chunk_error(MissingChunk::AuNoDotSnd),
        };

        let read_u32 = |fs: &mut FileState| -> Result<u32> {
            if big_endian {
                fs.stream.read_be_u32()
            }
            else {
                fs.stream.read_u32()
            }
        };

        let data_offset = read_u32(fs)?;
        let data_size = read_u32(fs)?;
        let encoding = read_u32(fs)?;
        let sample_rate = read_u32(fs)?;
        let channels = read_u32(fs)?;

        fs.parse_log.log(format!(
            "{} : offset {} size {:#x} encoding {} rate {} channels {}",
            String::from_utf8_lossy(&magic),
            data_offset,
            data_size,
            encoding,
            sample_rate,
            channels
        ));

        if data_offset < 24 {
            return decode_error("au: data offset inside the header");
        }
        if channels == 0 || channels > 1024 {
            return Err(Error::ChannelCount);
        }

        let codec = match encoding_to_codec(encoding) {
            Some(codec) => codec,
            None => return unsupported_error("au: unknown encoding code"),
        };

        fs.big_endian = big_endian;
        fs.sample_rate = sample_rate;
        fs.channels = channels;
        fs.format = FormatId::new(
            CONTAINER_AU,
            codec,
            if big_endian { Endian::Big } else { Endian::Little },
        );

        fs.data_offset = u64::from(data_offset);

        // The sentinel (and any overlarge claim) clamps to the physical length, so
        // a file whose writer died before the patch still reads to its last byte.
        if data_size == UNKNOWN_DATA_SIZE {
            fs.data_length = fs.file_length.saturating_sub(fs.data_offset);
            fs.parse_log.log("data size unknown, using the file length".to_string());
        }
        else {
            fs.clamp_data_length(u64::from(data_size));
        }

        fs.init_widths();
        fs.update_frame_count();

        fs.stream.seek(SeekFrom::Start(fs.data_offset))?;

        Ok(Box::new(AuContainer))
    }

    pub fn open_write(fs: &mut FileState) -> Result<Box<dyn Container>> {
        fs.format.validate()?;

        if codec_to_encoding(fs.codec()).is_none() {
            return unsupported_error("au: codec has no encoding code");
        }

        fs.big_endian = fs.format.endian().resolve(true);
        fs.init_widths();

        Ok(Box::new(AuContainer))
    }
}

impl Container for AuContainer {
    fn container_id(&self) -> ContainerId {
        CONTAINER_AU
    }

    fn write_header(&mut self, fs: &mut FileState, calc_length: bool) -> Result<()> {
        let current = fs.stream.pos();

        if calc_length {
            fs.refresh_file_length();
            fs.data_length = fs.file_length.saturating_sub(fs.data_offset);

            if fs.block_width > 0 {
                fs.frames = fs.data_length / u64::from(fs.block_width);
            }
        }

        // An unseekable sink gets the sentinel; a file gets patched on close.
        let data_size = if !fs.seekable {
            UNKNOWN_DATA_SIZE
        }
        else {
            fs.data_length.min(u64::from(u32::MAX)) as u32
        };

        let encoding = match codec_to_encoding(fs.codec()) {
            Some(encoding) => encoding,
            None => return unsupported_error("au: codec has no encoding code"),
        };

        let mut hb = std::mem::take(&mut fs.header);
        hb.reset();
        hb.set_big_endian(fs.big_endian);

        hb.put_marker(if fs.big_endian { *b".snd" } else { *b"dns." });
        hb.put_u32(24);
        hb.put_u32(data_size);
        hb.put_u32(encoding);
        hb.put_u32(fs.sample_rate);
        hb.put_u32(fs.channels);

        fs.data_offset = hb.len() as u64;

        fs.stream.seek(SeekFrom::Start(0))?;
        fs.stream.write_buf(hb.as_slice())?;
        fs.header = hb;

        fs.stream.seek(SeekFrom::Start(current.max(fs.data_offset)))?;

        Ok(())
    }

    fn close(&mut self, fs: &mut FileState) -> Result<()> {
        // A pipe cannot be patched; the sentinel written up front stands.
        if fs.mode != OpenMode::Read && fs.seekable {
            self.write_header(fs, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::io::Bstream;
    use std::io;

    fn write_file(codec: CodecId, endian: Endian, payload: &[u8]) -> Vec<u8> {
        let format = FormatId::new(CONTAINER_AU, codec, endian);
        let mut fs = FileState::new(OpenMode::Write, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 8000;
        fs.channels = 1;

        let mut container = AuContainer::open_write(&mut fs).unwrap();
        container.write_header(&mut fs, false).unwrap();
        fs.stream.seek(SeekFrom::Start(fs.data_offset)).unwrap();
        fs.stream.write_buf(payload).unwrap();
        container.close(&mut fs).unwrap();

        let mut stream = fs.stream;
        let len = stream.byte_len().unwrap() as usize;
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut data = vec![0u8; len];
        stream.read_buf_exact(&mut data).unwrap();
        data
    }

    #[test]
    fn header_is_24_bytes_with_patched_size() {
        let data = write_file(CODEC_PCM_16, Endian::File, &[1, 2, 3, 4]);

        assert_eq!(&data[0..4], b".snd");
        assert_eq!(u32::from_be_bytes(data[4..8].try_into().unwrap()), 24);
        assert_eq!(u32::from_be_bytes(data[8..12].try_into().unwrap()), 4);
        assert_eq!(u32::from_be_bytes(data[12..16].try_into().unwrap()), AU_ENCODING_PCM_16);
        assert_eq!(u32::from_be_bytes(data[16..20].try_into().unwrap()), 8000);
        assert_eq!(u32::from_be_bytes(data[20..24].try_into().unwrap()), 1);
        assert_eq!(data.len(), 28);
    }

    #[test]
    fn little_endian_variant_flips_the_magic() {
        let data = write_file(CODEC_PCM_16, Endian::Little, &[1, 2]);

        assert_eq!(&data[0..4], b"dns.");
        assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 24);
    }

    #[test]
    fn written_files_parse_back() {
        let data = write_file(CODEC_ULAW, Endian::File, &[0xffu8; 160]);

        let format = FormatId::new(CONTAINER_AU, CODEC_PCM_16, Endian::File);
        let mut rs = FileState::new(OpenMode::Read, Bstream::from_vec(data), format);

        let _ = AuContainer::open_read(&mut rs).unwrap();
        assert_eq!(rs.codec(), CODEC_ULAW);
        assert_eq!(rs.sample_rate, 8000);
        assert_eq!(rs.frames, 160);
    }

    #[test]
    fn sentinel_size_reads_to_end_of_file() {
        let mut data = write_file(CODEC_PCM_16, Endian::File, &[0u8; 100]);
        data[8..12].copy_from_slice(&UNKNOWN_DATA_SIZE.to_be_bytes());

        let format = FormatId::new(CONTAINER_AU, CODEC_PCM_16, Endian::File);
        let mut rs = FileState::new(OpenMode::Read, Bstream::from_vec(data), format);

        let _ = AuContainer::open_read(&mut rs).unwrap();
        assert_eq!(rs.data_length, 100);
        assert_eq!(rs.frames, 50);
    }

    /// A write-only sink that refuses seeks, standing in for a pipe.
    struct PipeSink {
        data: Vec<u8>,
    }

    impl cantata_core::io::MediaStream for PipeSink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
            Err(io::ErrorKind::Unsupported.into())
        }

        fn byte_len(&self) -> Option<u64> {
            None
        }

        fn set_byte_len(&mut self, _len: u64) -> io::Result<()> {
            Err(io::ErrorKind::Unsupported.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn is_pipe(&self) -> bool {
            true
        }
    }

    #[test]
    fn pipe_writes_use_the_sentinel() {
        let format = FormatId::new(CONTAINER_AU, CODEC_PCM_16, Endian::File);
        let stream = Bstream::new(Box::new(PipeSink { data: Vec::new() }));
        let mut fs = FileState::new(OpenMode::Write, stream, format);
        fs.sample_rate = 16000;
        fs.channels = 1;

        let mut container = AuContainer::open_write(&mut fs).unwrap();
        container.write_header(&mut fs, false).unwrap();

        // The header already carries the sentinel; nothing needs patching.
        assert_eq!(fs.data_offset, 24);
        container.close(&mut fs).unwrap();
    }
}
