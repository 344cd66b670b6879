// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The W64 (Sony Wave64) container driver.
//!
//! Conceptually a WAV file with 16-byte GUID chunk ids and 8-byte sizes that
//! *include* the 24-byte chunk header. Chunks are aligned to 8 bytes, and the byte
//! order is strictly little-endian.

use std::io::SeekFrom;

use cantata_core::chunks::ChunkId;
use cantata_core::errors::{
    internal_error, missing_chunk_error, Error, MissingChunk, Result,
};
use cantata_core::format::{ContainerId, Endian, FormatId, CONTAINER_W64};
use cantata_core::handle::{Container, FileState};

use crate::wave::chunks::{self, FmtShape};
use crate::wave::{calc_lengths, is_pcm_codec};

/// The GUID suffix of the `riff` id.
const RIFF_GUID_TAIL: [u8; 12] =
    [0x2e, 0x91, 0xcf, 0x11, 0xa5, 0xd6, 0x28, 0xdb, 0x04, 0xc1, 0x00, 0x00];

/// The GUID suffix shared by `wave`, `fmt `, `fact`, and `data`.
const WAVE_GUID_TAIL: [u8; 12] =
    [0xf3, 0xac, 0xd3, 0x11, 0x8c, 0xd1, 0x00, 0xc0, 0x4f, 0x8e, 0xdb, 0x8a];

fn guid(tag: &[u8; 4], tail: &[u8; 12]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..4].copy_from_slice(tag);
    out[4..].copy_from_slice(tail);
    out
}

fn riff_guid() -> [u8; 16] {
    guid(b"riff", &RIFF_GUID_TAIL)
}

fn wave_guid() -> [u8; 16] {
    guid(b"wave", &WAVE_GUID_TAIL)
}

fn fmt_guid() -> [u8; 16] {
    guid(b"fmt ", &WAVE_GUID_TAIL)
}

fn fact_guid() -> [u8; 16] {
    guid(b"fact", &WAVE_GUID_TAIL)
}

fn data_guid() -> [u8; 16] {
    guid(b"data", &WAVE_GUID_TAIL)
}

/// Rounds a chunk size up to the 8-byte alignment W64 requires.
fn align8(value: u64) -> u64 {
    (value + 7) & !7
}

pub struct W64Container {
    parsed_header: bool,
}

impl W64Container {
    pub fn open_read(fs: &mut FileState) -> Result<Box<dyn Container>> {
        let mut container = W64Container { parsed_header: true };
        container.parse_header(fs)?;
        Ok(Box::new(container))
    }

    pub fn open_write(fs: &mut FileState) -> Result<Box<dyn Container>> {
        fs.format.validate()?;

        if fs.stream.is_pipe() {
            return Err(Error::PipeWriteNotSupported);
        }

        fs.big_endian = false;
        fs.init_widths();

        Ok(Box::new(W64Container { parsed_header: false }))
    }

    fn read_guid(fs: &mut FileState) -> Result<[u8; 16]> {
        let mut out = [0u8; 16];
        fs.stream.read_buf_exact(&mut out)?;
        Ok(out)
    }

    fn parse_header(&mut self, fs: &mut FileState) -> Result<()> {
        fs.stream.seek(SeekFrom::Start(0))?;

        if Self::read_guid(fs)? != riff_guid() {
            return missing_chunk_error(MissingChunk::W64NoRiff);
        }

        let riff_size = fs.stream.read_u64()?;
        fs.parse_log.log(format!("riff : {}", riff_size));

        if Self::read_guid(fs)? != wave_guid() {
            return missing_chunk_error(MissingChunk::W64NoWave);
        }

        fs.big_endian = false;

        let mut have_fmt = false;
        let mut have_data = false;

        loop {
            // Chunk records are 8-byte aligned.
            let aligned = align8(fs.stream.pos());
            if aligned + 24 > fs.file_length {
                break;
            }
            fs.stream.seek(SeekFrom::Start(aligned))?;

            let id = Self::read_guid(fs)?;
            let total = fs.stream.read_u64()?;
            let payload_offset = fs.stream.pos();

            // Sizes include the 24-byte header.
            if total < 24 {
                fs.parse_log.log(format!("chunk with impossible size {}, stopping", total));
                break;
            }
            let size = total - 24;

            if have_data && fs.data_end == 0 {
                fs.data_end = payload_offset - 24;
            }

            let mut tag = [0u8; 4];
            tag.copy_from_slice(&id[..4]);

            fs.chunks.store_read_chunk(ChunkId::new(&id), payload_offset, size);

            match &tag {
                b"fmt " if id == fmt_guid() => {
                    let data = fs.stream.read_boxed_slice_exact(size as usize)?;
                    let parsed = chunks::parse_fmt(fs, &data, false)?;
                    chunks::apply_fmt(fs, &parsed);
                    have_fmt = true;
                }
                b"data" if id == data_guid() => {
                    if !have_fmt {
                        return missing_chunk_error(MissingChunk::W64NoFmt);
                    }

                    fs.data_offset = payload_offset;
                    fs.clamp_data_length(size);
                    have_data = true;

                    fs.stream.seek(SeekFrom::Start(fs.data_offset + fs.data_length))?;
                }
                _ => {
                    if payload_offset + size > fs.file_length {
                        fs.parse_log.log(format!(
                            "chunk {} overshoots the file, stopping",
                            String::from_utf8_lossy(&tag)
                        ));
                        break;
                    }
                    fs.stream.seek(SeekFrom::Start(payload_offset + size))?;
                }
            }
        }

        if !have_fmt {
            return missing_chunk_error(MissingChunk::W64NoFmt);
        }
        if !have_data {
            return missing_chunk_error(MissingChunk::W64NoData);
        }

        fs.format = FormatId::new(CONTAINER_W64, fs.format.codec(), Endian::Little);
        fs.init_widths();
        fs.update_frame_count();

        fs.stream.seek(SeekFrom::Start(fs.data_offset))?;

        Ok(())
    }
}

impl Container for W64Container {
    fn container_id(&self) -> ContainerId {
        CONTAINER_W64
    }

    fn write_header(&mut self, fs: &mut FileState, calc_length: bool) -> Result<()> {
        let current = fs.stream.pos();

        if calc_length {
            calc_lengths(fs);
        }

        if self.parsed_header {
            // Patch the riff and data sizes in place.
            fs.refresh_file_length();
            fs.stream.seek(SeekFrom::Start(16))?;
            fs.stream.write_buf(&fs.file_length.to_le_bytes())?;
            fs.stream.seek(SeekFrom::Start(fs.data_offset - 8))?;
            fs.stream.write_buf(&(fs.data_length + 24).to_le_bytes())?;
            return Ok(());
        }

        let mut hb = std::mem::take(&mut fs.header);
        hb.reset();
        hb.set_big_endian(false);

        hb.put_bytes(&riff_guid());
        let riff_size = hb.defer_u64();
        hb.put_bytes(&wave_guid());

        // The format chunk, GUID framed. The body length never needs padding for
        // the codecs W64 carries (16, 18, and 40 byte bodies round to 16, 24, 40).
        let body_len = u64::from(chunks::fmt_body_len(fs, FmtShape::Plain));
        hb.put_bytes(&fmt_guid());
        hb.put_u64(24 + body_len);
        chunks::emit_fmt_body(fs, &mut hb, FmtShape::Plain)?;
        hb.put_zeros((align8(body_len) - body_len) as usize);

        if !is_pcm_codec(fs) {
            hb.put_bytes(&fact_guid());
            hb.put_u64(24 + 8);
            hb.put_u64(fs.frames);
        }

        hb.put_bytes(&data_guid());
        hb.put_u64(fs.data_length + 24);

        // The riff size spans the whole file, header included.
        let total = if calc_length {
            fs.file_length.max(hb.len() as u64 + fs.data_length)
        }
        else {
            hb.len() as u64 + fs.data_length
        };
        hb.patch_u64(riff_size, total);

        if fs.data_offset != 0 && hb.len() as u64 != fs.data_offset {
            fs.header = hb;
            return internal_error("w64: header rewrite would move the data offset");
        }

        fs.data_offset = hb.len() as u64;

        fs.stream.seek(SeekFrom::Start(0))?;
        fs.stream.write_buf(hb.as_slice())?;
        fs.header = hb;

        fs.stream.seek(SeekFrom::Start(current.max(fs.data_offset)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::format::{CODEC_PCM_16, CODEC_ULAW};
    use cantata_core::handle::OpenMode;
    use cantata_core::io::Bstream;

    fn write_file(codec: cantata_core::format::CodecId, frames: usize) -> Vec<u8> {
        let format = FormatId::new(CONTAINER_W64, codec, Endian::Little);
        let mut fs = FileState::new(OpenMode::Write, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 16000;
        fs.channels = 1;

        let mut container = W64Container::open_write(&mut fs).unwrap();
        container.write_header(&mut fs, false).unwrap();

        fs.stream.seek(SeekFrom::Start(fs.data_offset)).unwrap();
        let width = codec.byte_width() as usize;
        fs.stream.write_buf(&vec![0x22u8; frames * width]).unwrap();
        fs.data_length = (frames * width) as u64;

        container.close(&mut fs).unwrap();

        let mut stream = fs.stream;
        let len = stream.byte_len().unwrap() as usize;
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut data = vec![0u8; len];
        stream.read_buf_exact(&mut data).unwrap();
        data
    }

    #[test]
    fn emits_guid_chunks_with_inclusive_sizes() {
        let data = write_file(CODEC_PCM_16, 100);

        assert_eq!(&data[0..4], b"riff");
        assert_eq!(&data[24..28], b"wave");
        assert_eq!(&data[40..44], b"fmt ");

        // The riff size field covers the whole file.
        let riff_size = u64::from_le_bytes(data[16..24].try_into().unwrap());
        assert_eq!(riff_size as usize, data.len());
    }

    #[test]
    fn written_files_parse_back() {
        let data = write_file(CODEC_PCM_16, 64);

        let format = FormatId::new(CONTAINER_W64, CODEC_PCM_16, Endian::Little);
        let mut rs = FileState::new(OpenMode::Read, Bstream::from_vec(data), format);

        let container = W64Container::open_read(&mut rs).unwrap();
        assert_eq!(container.container_id(), CONTAINER_W64);
        assert_eq!(rs.channels, 1);
        assert_eq!(rs.sample_rate, 16000);
        assert_eq!(rs.frames, 64);
    }

    #[test]
    fn non_pcm_w64_carries_fact() {
        let data = write_file(CODEC_ULAW, 80);

        let format = FormatId::new(CONTAINER_W64, CODEC_ULAW, Endian::Little);
        let mut rs = FileState::new(OpenMode::Read, Bstream::from_vec(data), format);

        let _ = W64Container::open_read(&mut rs).unwrap();
        assert_eq!(rs.codec(), CODEC_ULAW);
        assert_eq!(rs.frames, 80);
        assert!(rs.chunks.find_read_chunk_by_id(&fact_guid()).is_some());
    }

    #[test]
    fn truncated_magic_is_rejected() {
        let format = FormatId::new(CONTAINER_W64, CODEC_PCM_16, Endian::Little);
        let mut rs = FileState::new(
            OpenMode::Read,
            Bstream::from_vec(b"riff but not a w64 file.........".to_vec()),
            format,
        );

        assert!(matches!(
            W64Container::open_read(&mut rs),
            Err(Error::MissingChunk(MissingChunk::W64NoRiff))
        ));
    }
}
