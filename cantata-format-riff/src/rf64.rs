// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The RF64 container driver.
//!
//! RF64 is RIFF/WAVE with the 32-bit size fields parked at `0xffffffff` and the
//! real 64-bit sizes carried in a leading `ds64` chunk. With auto-downgrade
//! enabled, a file that ends up below 4 GiB is written back as a plain
//! `RIFF`/`WAVE`, the `ds64` slot filled with a `JUNK` spacer.

use std::io::SeekFrom;

use cantata_core::errors::{
    internal_error, missing_chunk_error, Error, MissingChunk, Result,
};
use cantata_core::format::{ContainerId, Endian, FormatId, CONTAINER_RF64};
use cantata_core::handle::{CommandReply, Container, FileCommand, FileState, OpenMode};

use crate::common::{handle_unknown_chunk, log_chunk, ChunkWalker, UnknownAction};
use crate::wave::chunks::{self, FmtShape};
use crate::wave::{calc_lengths, emit_custom_chunks, is_pcm_codec};

/// Files below this can be downgraded to plain RIFF/WAVE.
const RIFF_DOWNGRADE_BYTES: u64 = 0xffff_ffff;

/// The 32-bit sentinel that defers a size to the `ds64` chunk.
const SIZE_SENTINEL: u32 = 0xffff_ffff;

pub struct Rf64Container {
    /// Rewrite as plain RIFF/WAVE when the final size allows it.
    auto_downgrade: bool,
    parsed_header: bool,
}

impl Rf64Container {
    pub fn open_read(fs: &mut FileState) -> Result<Box<dyn Container>> {
        let mut container = Rf64Container { auto_downgrade: false, parsed_header: true };
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

        Ok(Box::new(Rf64Container { auto_downgrade: false, parsed_header: false }))
    }

    fn parse_header(&mut self, fs: &mut FileState) -> Result<()> {
        fs.stream.seek(SeekFrom::Start(0))?;

        if &fs.stream.read_quad_bytes()? != b"RF64" {
            return missing_chunk_error(MissingChunk::Rf64NotRf64);
        }

        let sentinel = fs.stream.read_u32()?;
        if sentinel != SIZE_SENTINEL {
            fs.parse_log.log(format!("RF64 size field is {:#x}, not the sentinel", sentinel));
        }

        if &fs.stream.read_quad_bytes()? != b"WAVE" {
            return missing_chunk_error(MissingChunk::WavNoWave);
        }

        fs.big_endian = false;

        let mut walker = ChunkWalker::new(false);

        // The ds64 chunk must come first; everything after is the normal walk.
        let ds64 = match walker.next(fs)? {
            Some(chunk) if &chunk.marker == b"ds64" && chunk.size >= 28 => chunk,
            _ => return missing_chunk_error(MissingChunk::Rf64NoDs64),
        };

        log_chunk(fs, &ds64);
        let riff_size = fs.stream.read_u64()?;
        let data_size = fs.stream.read_u64()?;
        let frame_count = fs.stream.read_u64()?;
        let table_len = fs.stream.read_u32()?;
        fs.parse_log.log(format!(
            "ds64 : riff {} data {} frames {} table {}",
            riff_size, data_size, frame_count, table_len
        ));
        walker.skip(fs, &ds64)?;

        let mut have_fmt = false;
        let mut have_data = false;

        loop {
            let chunk = match walker.next(fs)? {
                Some(chunk) => chunk,
                None => break,
            };

            if have_data && fs.data_end == 0 {
                fs.data_end = chunk.marker_offset();
            }

            match &chunk.marker {
                b"fmt " => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    let parsed = chunks::parse_fmt(fs, &data, false)?;
                    chunks::apply_fmt(fs, &parsed);
                    have_fmt = true;
                }
                b"data" => {
                    if !have_fmt {
                        return missing_chunk_error(MissingChunk::WavNoFmt);
                    }

                    log_chunk(fs, &chunk);
                    fs.data_offset = chunk.payload_offset;

                    // The 32-bit field defers to ds64 when it holds the sentinel.
                    let claimed = if chunk.size == u64::from(SIZE_SENTINEL) {
                        data_size
                    }
                    else {
                        chunk.size
                    };
                    fs.clamp_data_length(claimed);
                    have_data = true;

                    fs.stream.seek(SeekFrom::Start(fs.data_offset + fs.data_length))?;
                }
                b"fact" => {
                    log_chunk(fs, &chunk);
                    walker.skip(fs, &chunk)?;
                }
                b"PEAK" => {
                    log_chunk(fs, &chunk);
                    let data = fs.stream.read_boxed_slice_exact(chunk.size as usize)?;
                    chunks::parse_peak(fs, &data, have_data)?;
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

        fs.format = FormatId::new(CONTAINER_RF64, fs.format.codec(), Endian::Little);
        fs.init_widths();
        fs.update_frame_count();

        if frame_count > 0 {
            fs.frames = frame_count;
        }

        fs.stream.seek(SeekFrom::Start(fs.data_offset))?;

        Ok(())
    }
}

impl Container for Rf64Container {
    fn container_id(&self) -> ContainerId {
        CONTAINER_RF64
    }

    fn write_header(&mut self, fs: &mut FileState, calc_length: bool) -> Result<()> {
        let current = fs.stream.pos();

        if calc_length {
            calc_lengths(fs);
        }

        if self.parsed_header {
            // A parsed header is never re-serialized, but the downgrade decision
            // is still taken fresh against the file length as it stands. The
            // RF64/ds64 prefix and the RIFF/JUNK prefix occupy the same bytes, so
            // both rewrites happen in place.
            fs.refresh_file_length();
            let downgrade = self.auto_downgrade && fs.file_length < RIFF_DOWNGRADE_BYTES;

            if downgrade {
                fs.stream.seek(SeekFrom::Start(0))?;
                fs.stream.write_buf(b"RIFF")?;
                let riff_size = (fs.file_length.max(8) - 8).min(u64::from(u32::MAX)) as u32;
                fs.stream.write_buf(&riff_size.to_le_bytes())?;

                // Blank the ds64 slot with a spacer of the same extent.
                if let Some(ds64) = fs.chunks.find_read_chunk_by_marker(*b"ds64").copied() {
                    fs.stream.seek(SeekFrom::Start(ds64.offset - 8))?;
                    fs.stream.write_buf(b"JUNK")?;
                    fs.stream.write_buf(&(ds64.len.min(u64::from(u32::MAX)) as u32).to_le_bytes())?;
                    fs.stream.write_buf(&vec![0u8; ds64.len as usize])?;
                }

                // The data chunk's 32-bit size carried the sentinel; it must now
                // be real.
                let data_size = fs.data_length.min(u64::from(u32::MAX)) as u32;
                fs.stream.seek(SeekFrom::Start(fs.data_offset - 4))?;
                fs.stream.write_buf(&data_size.to_le_bytes())?;
            }
            else if let Some(ds64) = fs.chunks.find_read_chunk_by_marker(*b"ds64").copied() {
                // Patch only the 64-bit sizes in the ds64 slot.
                fs.stream.seek(SeekFrom::Start(ds64.offset))?;
                fs.stream.write_buf(&(fs.file_length - 8).to_le_bytes())?;
                fs.stream.write_buf(&fs.data_length.to_le_bytes())?;
                fs.stream.write_buf(&fs.frames.to_le_bytes())?;
            }

            return Ok(());
        }

        // The downgrade decision is taken against the file length as it stands at
        // each header write.
        let downgrade = self.auto_downgrade && fs.file_length < RIFF_DOWNGRADE_BYTES;

        let mut hb = std::mem::take(&mut fs.header);
        hb.reset();
        hb.set_big_endian(false);

        if downgrade {
            hb.put_marker(*b"RIFF");
            hb.put_u32((fs.file_length.max(8) - 8).min(u64::from(u32::MAX)) as u32);
            hb.put_marker(*b"WAVE");

            // Fill the ds64 slot with a spacer so both forms have the same layout
            // up to the format chunk.
            hb.put_marker(*b"JUNK");
            hb.put_u32(28);
            hb.put_zeros(28);
        }
        else {
            hb.put_marker(*b"RF64");
            hb.put_u32(SIZE_SENTINEL);
            hb.put_marker(*b"WAVE");

            hb.put_marker(*b"ds64");
            hb.put_u32(28);
            hb.put_u64(fs.file_length.max(8) - 8);
            hb.put_u64(fs.data_length);
            hb.put_u64(fs.frames);
            hb.put_u32(0);
        }

        chunks::emit_fmt(fs, &mut hb, FmtShape::Extensible)?;

        if !is_pcm_codec(fs) || downgrade {
            chunks::emit_fact(fs, &mut hb);
        }

        if let Some(peak) = fs.peak.as_ref() {
            chunks::emit_peak(peak, &mut hb);
        }

        emit_custom_chunks(fs, &mut hb)?;

        hb.put_marker(*b"data");
        if downgrade {
            hb.put_u32(fs.data_length.min(u64::from(u32::MAX)) as u32);
        }
        else {
            hb.put_u32(SIZE_SENTINEL);
        }

        if fs.data_offset != 0 && hb.len() as u64 != fs.data_offset {
            fs.header = hb;
            return internal_error("rf64: header rewrite would move the data offset");
        }

        fs.data_offset = hb.len() as u64;

        fs.stream.seek(SeekFrom::Start(0))?;
        fs.stream.write_buf(hb.as_slice())?;
        fs.header = hb;

        fs.stream.seek(SeekFrom::Start(current.max(fs.data_offset)))?;

        Ok(())
    }

    fn command(&mut self, fs: &mut FileState, cmd: &FileCommand) -> Result<CommandReply> {
        match cmd {
            FileCommand::SetRf64AutoDowngrade(on) => {
                if fs.mode != OpenMode::Read && fs.have_written {
                    return Err(Error::CommandParam(
                        "rf64 downgrade cannot change after writing",
                    ));
                }
                let old = self.auto_downgrade;
                self.auto_downgrade = *on;
                Ok(CommandReply::Bool(old))
            }
            _ => Ok(CommandReply::Unhandled),
        }
    }
}
