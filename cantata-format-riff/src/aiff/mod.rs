// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The AIFF/AIFC container driver.
//!
//! `FORM` + big-endian sizes throughout. `COMM` carries the 80-bit extended
//! sample rate; AIFC adds a compression tag and requires an `FVER` chunk, whose
//! absence is logged rather than fatal. `SSND` prefixes the audio with an offset
//! and block size word pair.

pub(crate) mod chunks;

use std::io::SeekFrom;

use cantata_core::errors::{
    internal_error, missing_chunk_error, Error, MissingChunk, Result,
};
use cantata_core::format::{ContainerId, Endian, FormatId, CONTAINER_AIFF};
use cantata_core::handle::{Container, FileState, OpenMode};
use cantata_core::io::HeaderBuf;

use crate::common::{handle_unknown_chunk, log_chunk, ChunkWalker, UnknownAction};
use crate::wave::emit_custom_chunks;

pub struct AiffContainer {
    parsed_header: bool,
}

impl AiffContainer {
    pub fn open_read(fs: &mut FileState) -> Result<Box<dyn Container>> {
        let mut container = AiffContainer { parsed_header: true };
        container.parse_header(fs)?;
        Ok(Box::new(container))
    }

    pub fn open_write(fs: &mut FileState) -> Result<Box<dyn Container>> {
        fs.format.validate()?;

        if fs.stream.is_pipe() {
            return Err(Error::PipeWriteNotSupported);
        }

        fs.big_endian = fs.format.endian().resolve(true);
        fs.init_widths();

        Ok(Box::new(AiffContainer { parsed_header: false }))
    }

    fn parse_header(&mut self, fs: &mut FileState) -> Result<()> {
        fs.stream.seek(SeekFrom::Start(0))?;

        if &fs.stream.read_quad_bytes()? != b"FORM" {
            return missing_chunk_error(MissingChunk::AiffNoForm);
        }

        let form_size = fs.stream.read_be_u32()?;
        fs.parse_log.log(format!("FORM : {}", form_size));

        let form_type = fs.stream.read_quad_bytes()?;
        let is_aifc = match &form_type {
            b"AIFF" => false,
            b"AIFC" => true,
            _ => return missing_chunk_error(MissingChunk::AiffNoFormType),
        };

        fs.big_endian = true;

        let mut walker = ChunkWalker::new(true);
        let mut comm: Option<chunks::ParsedComm> = None;
        let mut inst: Option<chunks::InstMarkers> = None;
        let mut have_ssnd = false;
        let mut have_fver = false;
        let mut have_mark = false;

        loop {
            let chunk = match walker.next(fs)? {
                Some(chunk) => chunk,
                None => break,
            };

            if have_ssnd && fs.mode == OpenMode::ReadWrite {
                return Err(Error::BadMode("aiff: chunks after SSND prevent read-write access"));
            }

            if have_ssnd && fs.data_end == 0 {
                fs.data_end = chunk.marker_offset();
            }

            match &chunk.marker {
                b"COMM" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    let parsed = chunks::parse_comm(fs, &data)?;

                    fs.channels = u32::from(parsed.channels);
                    fs.sample_rate = parsed.sample_rate;
                    fs.format = FormatId::new(CONTAINER_AIFF, parsed.codec, parsed.endian);
                    fs.big_endian = parsed.endian != Endian::Little;

                    comm = Some(parsed);
                }
                b"FVER" => {
                    log_chunk(fs, &chunk);
                    let version = fs.stream.read_be_u32()?;
                    if version != chunks::AIFC_VERSION {
                        fs.parse_log.log(format!("unexpected FVER timestamp {:#x}", version));
                    }
                    have_fver = true;
                    walker.skip(fs, &chunk)?;
                }
                b"SSND" => {
                    if comm.is_none() {
                        return missing_chunk_error(MissingChunk::AiffNoComm);
                    }
                    if chunk.size < 8 {
                        return Err(Error::DecodeError("aiff: SSND chunk is too small"));
                    }

                    log_chunk(fs, &chunk);
                    let offset = fs.stream.read_be_u32()?;
                    let _block_size = fs.stream.read_be_u32()?;

                    fs.data_offset = chunk.payload_offset + 8 + u64::from(offset);
                    fs.clamp_data_length(chunk.size - 8 - u64::from(offset));
                    have_ssnd = true;

                    if !fs.seekable {
                        break;
                    }

                    fs.stream.seek(SeekFrom::Start(fs.data_offset + fs.data_length))?;
                }
                b"MARK" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    chunks::parse_mark(fs, &data)?;
                    have_mark = true;
                }
                b"INST" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    inst = Some(chunks::parse_inst(&data)?);
                }
                b"PEAK" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    chunks::parse_peak(fs, &data, have_ssnd)?;
                }
                b"NAME" | b"AUTH" | b"(c) " | b"ANNO" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    if let Some(tag) = chunks::string_tag_for(chunk.marker) {
                        let text = String::from_utf8_lossy(&data).trim_end_matches('\0').to_string();
                        fs.strings.set(tag, &text);
                    }
                }
                _ => match handle_unknown_chunk(&walker, fs, &chunk)? {
                    UnknownAction::Skipped | UnknownAction::Resync => continue,
                    UnknownAction::Stop => break,
                },
            }
        }

        let comm = match comm {
            Some(comm) => comm,
            None => return missing_chunk_error(MissingChunk::AiffNoComm),
        };

        if is_aifc && !have_fver {
            fs.parse_log.log("AIFC file has no FVER chunk".to_string());
        }

        if !have_ssnd {
            if comm.frames > 0 {
                return missing_chunk_error(MissingChunk::AiffNoSsnd);
            }
            fs.data_offset = fs.file_length;
            fs.data_length = 0;
        }

        // The cue-versus-loop-marker resolution runs last so INST and MARK may
        // appear in either order.
        if let Some(markers) = inst {
            chunks::resolve_inst(fs, markers, have_mark);
        }

        fs.init_widths();
        fs.update_frame_count();

        if fs.block_width == 0 {
            // Block codecs trust the frame count declared in COMM.
            fs.frames = u64::from(comm.frames);
        }
        else if fs.frames != u64::from(comm.frames) {
            fs.parse_log.log(format!(
                "COMM frame count {} disagrees with data length ({} frames)",
                comm.frames, fs.frames
            ));
        }

        fs.stream.seek(SeekFrom::Start(fs.data_offset))?;

        Ok(())
    }

    fn is_aifc(&self, fs: &FileState) -> bool {
        chunks::aifc_tag(fs).is_some()
    }

    fn patch_sizes(&mut self, fs: &mut FileState) -> Result<()> {
        let form_size = (fs.file_length - 8).min(u64::from(u32::MAX)) as u32;
        fs.stream.seek(SeekFrom::Start(4))?;
        fs.stream.write_buf(&form_size.to_be_bytes())?;

        if let Some(comm) = fs.chunks.find_read_chunk_by_marker(*b"COMM").copied() {
            let frames = fs.frames.min(u64::from(u32::MAX)) as u32;
            fs.stream.seek(SeekFrom::Start(comm.offset + 2))?;
            fs.stream.write_buf(&frames.to_be_bytes())?;
        }

        if let Some(ssnd) = fs.chunks.find_read_chunk_by_marker(*b"SSND").copied() {
            let prefix = fs.data_offset - ssnd.offset;
            let size = (prefix + fs.data_length).min(u64::from(u32::MAX)) as u32;
            fs.stream.seek(SeekFrom::Start(ssnd.offset - 4))?;
            fs.stream.write_buf(&size.to_be_bytes())?;
        }

        if let Some(chunk) = fs.chunks.find_read_chunk_by_marker(*b"PEAK").copied() {
            if let Some(peak) = fs.peak.as_ref() {
                let mut hb = HeaderBuf::new();
                hb.set_big_endian(true);
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

impl Container for AiffContainer {
    fn container_id(&self) -> ContainerId {
        CONTAINER_AIFF
    }

    fn write_header(&mut self, fs: &mut FileState, calc_length: bool) -> Result<()> {
        let current = fs.stream.pos();

        if calc_length {
            crate::wave::calc_lengths(fs);
        }

        if self.parsed_header {
            return self.patch_sizes(fs);
        }

        let is_aifc = self.is_aifc(fs);

        let mut hb = std::mem::take(&mut fs.header);
        hb.reset();
        hb.set_big_endian(true);

        hb.put_marker(*b"FORM");
        let form_size = hb.defer_u32();
        hb.put_marker(if is_aifc { *b"AIFC" } else { *b"AIFF" });

        if is_aifc {
            hb.put_marker(*b"FVER");
            hb.put_u32(4);
            hb.put_u32(chunks::AIFC_VERSION);
        }

        chunks::emit_comm(fs, &mut hb);

        if let Some(peak) = fs.peak.as_ref() {
            chunks::emit_peak(peak, &mut hb);
        }

        chunks::emit_strings(fs, &mut hb);

        // Marker entries carry both the instrument's loop points and the caller
        // cues. The loop markers go first: readers drop the leading `2 * loops`
        // entries when resolving INST.
        let loop_cues = chunks::inst_loop_cues(fs);
        if !fs.cues.is_empty() || !loop_cues.is_empty() {
            let saved = std::mem::take(&mut fs.cues);
            fs.cues = loop_cues.iter().cloned().chain(saved.iter().cloned()).collect();
            chunks::emit_mark(fs, &mut hb);
            fs.cues = saved;
        }
        chunks::emit_inst(fs, &mut hb, &loop_cues);

        emit_custom_chunks(fs, &mut hb)?;

        hb.put_marker(*b"SSND");
        hb.put_u32((8 + fs.data_length).min(u64::from(u32::MAX)) as u32);
        hb.put_u32(0);
        hb.put_u32(0);

        let total = if calc_length {
            fs.file_length.max(hb.len() as u64 + fs.data_length) - 8
        }
        else {
            hb.len() as u64 + fs.data_length - 8
        };
        hb.patch_u32(form_size, total.min(u64::from(u32::MAX)) as u32);

        if fs.data_offset != 0 && hb.len() as u64 != fs.data_offset {
            fs.header = hb;
            return internal_error("aiff: header rewrite would move the data offset");
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
}
