// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The WAV / WAVEX container driver: `RIFF` (little-endian) or `RIFX` (big-endian)
//! forms, the plain and extensible format chunks, `fact`, PEAK, `cue `, `smpl`,
//! LIST/INFO strings, and caller-supplied pass-through chunks.

pub(crate) mod chunks;

use std::io::SeekFrom;

use cantata_core::errors::{
    bad_mode_error, decode_error, internal_error, missing_chunk_error, Error, MissingChunk, Result,
};
use cantata_core::format::{Endian, FormatId, CONTAINER_WAV, CONTAINER_WAVEX};
use cantata_core::format::{CODEC_PCM_16, CODEC_PCM_24, CODEC_PCM_32, CODEC_PCM_U8};
use cantata_core::handle::{
    AmbisonicMode, CommandReply, Container, FileCommand, FileState, OpenMode,
};
use cantata_core::io::HeaderBuf;
use cantata_core::meta::mask_from_positions;

use crate::common::{handle_unknown_chunk, log_chunk, ChunkWalker, UnknownAction};

pub struct WavContainer {
    /// Emit the extensible format chunk.
    wavex: bool,
    /// The header on disk was parsed, not emitted; closing patches size fields in
    /// place instead of re-serializing.
    parsed_header: bool,
}

pub(crate) fn is_pcm_codec(fs: &FileState) -> bool {
    matches!(fs.codec(), CODEC_PCM_U8 | CODEC_PCM_16 | CODEC_PCM_24 | CODEC_PCM_32)
}

/// Appends caller-supplied pass-through chunks to a header image.
pub(crate) fn emit_custom_chunks(fs: &FileState, hb: &mut HeaderBuf) -> Result<()> {
    for chunk in fs.chunks.write_chunks() {
        if chunk.id.len() != 4 {
            return Err(Error::CommandParam("riff chunk ids must be four bytes"));
        }

        let mut marker = [0u8; 4];
        marker.copy_from_slice(chunk.id.bytes());

        hb.put_marker(marker);
        hb.put_u32(chunk.data.len() as u32);
        hb.put_bytes(&chunk.data);

        if chunk.data.len() & 1 == 1 {
            hb.put_u8(0);
        }
    }

    Ok(())
}

/// Recomputes the data length at close time, and the frame count for fixed-width
/// codecs. Block codecs keep the exact count the handle tracked, since the tail
/// block is zero padded on disk.
pub(crate) fn calc_lengths(fs: &mut FileState) {
    fs.refresh_file_length();

    let end = if fs.data_end > 0 { fs.data_end } else { fs.file_length };
    fs.data_length = end.saturating_sub(fs.data_offset);

    if fs.block_width > 0 {
        fs.frames = fs.data_length / u64::from(fs.block_width);
    }
}

impl WavContainer {
    pub fn open_read(fs: &mut FileState) -> Result<Box<dyn Container>> {
        let mut container = WavContainer { wavex: false, parsed_header: true };
        container.parse_header(fs)?;
        Ok(Box::new(container))
    }

    pub fn open_write(fs: &mut FileState) -> Result<Box<dyn Container>> {
        fs.format.validate()?;

        // Every member of the family patches sizes on close.
        if fs.stream.is_pipe() {
            return Err(Error::PipeWriteNotSupported);
        }

        fs.big_endian = fs.format.endian().resolve(false);
        fs.init_widths();

        let wavex = fs.format.container() == CONTAINER_WAVEX;

        Ok(Box::new(WavContainer { wavex, parsed_header: false }))
    }

    fn parse_header(&mut self, fs: &mut FileState) -> Result<()> {
        fs.stream.seek(SeekFrom::Start(0))?;

        let magic = fs.stream.read_quad_bytes()?;
        let big_endian = match &magic {
            b"RIFF" => false,
            b"RIFX" => true,
            _ => return missing_chunk_error(MissingChunk::WavNoRiff),
        };

        fs.big_endian = big_endian;

        let riff_size = if big_endian { fs.stream.read_be_u32()? } else { fs.stream.read_u32()? };
        fs.parse_log.log(format!("{} : {}", String::from_utf8_lossy(&magic), riff_size));

        if &fs.stream.read_quad_bytes()? != b"WAVE" {
            return missing_chunk_error(MissingChunk::WavNoWave);
        }

        let mut walker = ChunkWalker::new(big_endian);
        let mut have_fmt = false;
        let mut have_data = false;
        let mut extensible = false;
        let mut fact_frames: Option<u32> = None;

        loop {
            let chunk = match walker.next(fs)? {
                Some(chunk) => chunk,
                None => break,
            };

            // A file with trailing chunks cannot be safely extended; the samples
            // would overwrite them.
            if have_data && fs.mode == OpenMode::ReadWrite {
                return bad_mode_error("wav: chunks after data prevent read-write access");
            }

            if have_data && fs.data_end == 0 {
                fs.data_end = chunk.marker_offset();
            }

            match &chunk.marker {
                b"RIFF" | b"RIFX" => {
                    return decode_error("wav: RIFF marker appears twice");
                }
                b"fmt " => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    extensible = data.len() >= 2
                        && u16::from_le_bytes([data[0], data[1]]) == chunks::WAVE_FORMAT_EXTENSIBLE;
                    let parsed = chunks::parse_fmt(fs, &data, big_endian)?;
                    chunks::apply_fmt(fs, &parsed);
                    have_fmt = true;
                }
                b"data" => {
                    if !have_fmt {
                        return missing_chunk_error(MissingChunk::WavNoFmt);
                    }

                    log_chunk(fs, &chunk);
                    fs.data_offset = chunk.payload_offset;
                    fs.clamp_data_length(chunk.size);
                    have_data = true;

                    if !fs.seekable {
                        break;
                    }

                    fs.stream.seek(SeekFrom::Start(fs.data_offset + fs.data_length))?;
                }
                b"fact" => {
                    log_chunk(fs, &chunk);
                    fact_frames = Some(if big_endian {
                        fs.stream.read_be_u32()?
                    }
                    else {
                        fs.stream.read_u32()?
                    });
                    walker.skip(fs, &chunk)?;
                }
                b"PEAK" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    chunks::parse_peak(fs, &data, have_data)?;
                }
                b"cue " => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    chunks::parse_cue(fs, &data)?;
                }
                b"smpl" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    chunks::parse_smpl(fs, &data)?;
                }
                b"LIST" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    chunks::parse_info_list(fs, &data);
                }
                _ => match handle_unknown_chunk(&walker, fs, &chunk)? {
                    UnknownAction::Skipped | UnknownAction::Resync => continue,
                    UnknownAction::Stop => break,
                },
            }
        }

        if !have_fmt {
            return missing_chunk_error(MissingChunk::WavNoFmt);
        }
        if !have_data {
            return missing_chunk_error(MissingChunk::WavNoData);
        }

        self.wavex = extensible;

        let container = if extensible { CONTAINER_WAVEX } else { CONTAINER_WAV };
        let endian = if big_endian { Endian::Big } else { Endian::Little };
        fs.format = FormatId::new(container, fs.format.codec(), endian);

        fs.init_widths();
        fs.update_frame_count();

        // Block codecs trust the fact chunk over block arithmetic.
        if let Some(frames) = fact_frames {
            if fs.block_width == 0 {
                fs.frames = u64::from(frames);
            }
        }

        fs.stream.seek(SeekFrom::Start(fs.data_offset))?;

        Ok(())
    }

    /// Patches the size fields of a header that already exists on disk, leaving
    /// everything else untouched. Used for read-write handles, where the header
    /// image came from a foreign writer.
    fn patch_sizes(&mut self, fs: &mut FileState) -> Result<()> {
        let riff_size = (fs.file_length - 8).min(u64::from(u32::MAX)) as u32;
        let data_size = fs.data_length.min(u64::from(u32::MAX)) as u32;

        let riff_bytes =
            if fs.big_endian { riff_size.to_be_bytes() } else { riff_size.to_le_bytes() };
        let data_bytes =
            if fs.big_endian { data_size.to_be_bytes() } else { data_size.to_le_bytes() };

        fs.stream.seek(SeekFrom::Start(4))?;
        fs.stream.write_buf(&riff_bytes)?;

        fs.stream.seek(SeekFrom::Start(fs.data_offset - 4))?;
        fs.stream.write_buf(&data_bytes)?;

        if let Some(fact) = fs.chunks.find_read_chunk_by_marker(*b"fact").copied() {
            let frames = fs.frames.min(u64::from(u32::MAX)) as u32;
            let bytes = if fs.big_endian { frames.to_be_bytes() } else { frames.to_le_bytes() };
            fs.stream.seek(SeekFrom::Start(fact.offset))?;
            fs.stream.write_buf(&bytes)?;
        }

        // Refresh the stored PEAK payload in place.
        if let Some(chunk) = fs.chunks.find_read_chunk_by_marker(*b"PEAK").copied() {
            if let Some(peak) = fs.peak.as_ref() {
                let mut hb = HeaderBuf::new();
                hb.set_big_endian(fs.big_endian);
                chunks::emit_peak(peak, &mut hb);

                let payload = &hb.as_slice()[8..];
                if payload.len() as u64 == chunk.len {
                    fs.stream.seek(SeekFrom::Start(chunk.offset))?;
                    fs.stream.write_buf(payload)?;
                }
            }
        }

        Ok(())
    }
}

impl Container for WavContainer {
    fn container_id(&self) -> cantata_core::format::ContainerId {
        if self.wavex {
            CONTAINER_WAVEX
        }
        else {
            CONTAINER_WAV
        }
    }

    fn write_header(&mut self, fs: &mut FileState, calc_length: bool) -> Result<()> {
        let current = fs.stream.pos();

        if calc_length {
            calc_lengths(fs);
        }

        if self.parsed_header {
            return self.patch_sizes(fs);
        }

        let mut hb = std::mem::take(&mut fs.header);
        hb.reset();
        hb.set_big_endian(fs.big_endian);

        hb.put_marker(if fs.big_endian { *b"RIFX" } else { *b"RIFF" });
        let riff_size = hb.defer_u32();
        hb.put_marker(*b"WAVE");

        let shape =
            if self.wavex { chunks::FmtShape::Extensible } else { chunks::FmtShape::Plain };
        chunks::emit_fmt(fs, &mut hb, shape)?;

        if !is_pcm_codec(fs) {
            chunks::emit_fact(fs, &mut hb);
        }

        if let Some(peak) = fs.peak.as_ref() {
            chunks::emit_peak(peak, &mut hb);
        }

        chunks::emit_info_list(fs, &mut hb);

        if !fs.cues.is_empty() {
            chunks::emit_cue(fs, &mut hb);
        }
        chunks::emit_smpl(fs, &mut hb);

        emit_custom_chunks(fs, &mut hb)?;

        hb.put_marker(*b"data");
        hb.put_u32(fs.data_length.min(u64::from(u32::MAX)) as u32);

        let total = if calc_length {
            fs.file_length.max(hb.len() as u64 + fs.data_length) - 8
        }
        else {
            hb.len() as u64 + fs.data_length - 8
        };
        hb.patch_u32(riff_size, total.min(u64::from(u32::MAX)) as u32);

        // A header rewrite must never move the samples.
        if fs.data_offset != 0 && hb.len() as u64 != fs.data_offset {
            fs.header = hb;
            return internal_error("wav: header rewrite would move the data offset");
        }

        fs.data_offset = hb.len() as u64;

        fs.stream.seek(SeekFrom::Start(0))?;
        fs.stream.write_buf(hb.as_slice())?;
        fs.header = hb;

        fs.stream.seek(SeekFrom::Start(current.max(fs.data_offset)))?;

        Ok(())
    }

    fn write_tailer(&mut self, fs: &mut FileState) -> Result<()> {
        fs.refresh_file_length();

        // Pad the data chunk to an even byte boundary. The pad is a tail byte, not
        // sample data.
        let data_bytes = fs.file_length.saturating_sub(fs.data_offset);
        if data_bytes & 1 == 1 {
            fs.stream.seek(SeekFrom::Start(fs.file_length))?;
            fs.stream.write_buf(&[0])?;
            if fs.data_end == 0 {
                fs.data_end = fs.file_length;
            }
            fs.refresh_file_length();
        }

        Ok(())
    }

    fn command(&mut self, fs: &mut FileState, cmd: &FileCommand) -> Result<CommandReply> {
        match cmd {
            FileCommand::SetAmbisonic(mode) => {
                if !self.wavex {
                    return Ok(CommandReply::Unhandled);
                }
                let old = fs.ambisonic;
                fs.ambisonic = *mode;
                Ok(CommandReply::Ambisonic(old))
            }
            FileCommand::GetAmbisonic => Ok(CommandReply::Ambisonic(fs.ambisonic)),
            FileCommand::SetChannelMap(map) => match mask_from_positions(map) {
                Some(mask) => {
                    fs.channel_mask = Some(mask);
                    Ok(CommandReply::Bool(true))
                }
                None => {
                    // B-format maps have no mask; signalled through the GUID.
                    if fs.ambisonic == AmbisonicMode::BFormat {
                        Ok(CommandReply::Bool(true))
                    }
                    else {
                        Ok(CommandReply::Bool(false))
                    }
                }
            },
            _ => Ok(CommandReply::Unhandled),
        }
    }
}
