// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `handle` module defines the abstract file handle that ties a container
//! driver, a codec driver, and a byte-stream together.
//!
//! [`FileState`] is the aggregate both drivers operate on. [`AudioFile`] wraps the
//! state plus one boxed [`Container`] and one boxed [`Codec`] and enforces the rules
//! the drivers rely on: mode checks, sticky errors, cursor bookkeeping, header
//! emission before the first sample write, and closer ordering.

use std::io::SeekFrom;

use log::debug;

use crate::chunks::{ChunkCursor, ChunkId, ChunkLog};
use crate::dither::{DitherInfo, DitherStage};
use crate::errors::{
    bad_mode_error, seek_error, Error, Result, SeekErrorKind,
};
use crate::format::{CodecId, ContainerId, FormatId};
use crate::io::{Bstream, HeaderBuf};
use crate::meta::{ChannelPosition, Channels, CuePoint, Instrument, StringTable, StringTag};
use crate::peak::{ChannelPeak, PeakInfo};

/// The scratch buffer size codecs loop over, in bytes.
pub const BUFFER_LEN: usize = 8192;

/// The open mode of a handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

/// The last sample operation performed, used to suppress redundant seeks when the
/// caller alternates between reading and writing on a read-write handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LastOp {
    #[default]
    None,
    Read,
    Write,
}

/// Seek origin for [`AudioFile::seek`], in frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekWhence {
    Start,
    Current,
    End,
}

/// The WAVEX ambisonic signalling mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AmbisonicMode {
    #[default]
    None,
    BFormat,
}

/// Codec parameters the container hands to the codec it binds: the on-disk block
/// size and the frames each block decodes to. Zero for plain sample codecs.
#[derive(Copy, Clone, Debug, Default)]
pub struct CodecParams {
    pub block_align: u32,
    pub frames_per_block: u32,
}

/// The caller-facing parameters for opening a file for writing.
#[derive(Copy, Clone, Debug)]
pub struct WriteOptions {
    pub format: FormatId,
    pub sample_rate: u32,
    pub channels: u32,
}

/// The per-handle log of parsing anomalies. Entries are mirrored to the `log`
/// facade and retained so callers can inspect what the parser saw.
#[derive(Default)]
pub struct ParseLog {
    entries: Vec<String>,
}

impl ParseLog {
    pub fn log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        debug!("{}", msg);
        self.entries.push(msg);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// The central aggregate: everything a container or codec driver reads or mutates.
pub struct FileState {
    pub mode: OpenMode,
    pub stream: Bstream,

    pub format: FormatId,
    pub sample_rate: u32,
    pub channels: u32,
    /// Total frames in the file. Grows as frames are written; may only be known at
    /// close for freshly written block-codec files.
    pub frames: u64,
    /// True when the sample data on disk is big-endian.
    pub big_endian: bool,

    /// Byte width of one mono sample; zero for block codecs.
    pub byte_width: u32,
    /// Byte width of one frame; zero for block codecs.
    pub block_width: u32,
    pub codec_params: CodecParams,

    /// Absolute offset of the first sample byte.
    pub data_offset: u64,
    /// Length of the sample region in bytes.
    pub data_length: u64,
    /// Offset of the first post-data tail byte, or zero when the data runs to EOF.
    pub data_end: u64,
    pub file_length: u64,

    pub read_current: u64,
    pub write_current: u64,
    pub last_op: LastOp,
    pub have_written: bool,
    pub seekable: bool,

    /// Sticky error code; mutating operations refuse to run once set.
    pub error: Option<i32>,

    pub header: HeaderBuf,
    pub parse_log: ParseLog,
    pub chunks: ChunkLog,

    pub peak: Option<PeakInfo>,
    pub add_peak_chunk: bool,
    pub cues: Vec<CuePoint>,
    pub instrument: Option<Instrument>,
    pub channel_mask: Option<Channels>,
    pub channel_map: Vec<ChannelPosition>,
    pub ambisonic: AmbisonicMode,
    pub strings: StringTable,

    pub norm_float: bool,
    pub norm_double: bool,
    pub scale_int_float_write: bool,
    pub scale_float_int_read: bool,
    pub clipping: bool,
    pub dither_read: Option<DitherStage>,
    pub dither_write: Option<DitherStage>,
}

impl FileState {
    pub fn new(mode: OpenMode, stream: Bstream, format: FormatId) -> Self {
        let seekable = !stream.is_pipe();
        let file_length = stream.byte_len().unwrap_or(0);

        FileState {
            mode,
            stream,
            format,
            sample_rate: 0,
            channels: 0,
            frames: 0,
            big_endian: false,
            byte_width: 0,
            block_width: 0,
            codec_params: CodecParams::default(),
            data_offset: 0,
            data_length: 0,
            data_end: 0,
            file_length,
            read_current: 0,
            write_current: 0,
            last_op: LastOp::default(),
            have_written: false,
            seekable,
            error: None,
            header: HeaderBuf::new(),
            parse_log: ParseLog::default(),
            chunks: ChunkLog::new(),
            peak: None,
            add_peak_chunk: true,
            cues: Vec::new(),
            instrument: None,
            channel_mask: None,
            channel_map: Vec::new(),
            ambisonic: AmbisonicMode::default(),
            strings: StringTable::default(),
            norm_float: true,
            norm_double: true,
            scale_int_float_write: false,
            scale_float_int_read: false,
            clipping: false,
            dither_read: None,
            dither_write: None,
        }
    }

    pub fn codec(&self) -> CodecId {
        self.format.codec()
    }

    pub fn container(&self) -> ContainerId {
        self.format.container()
    }

    /// Sets the sample widths from the codec tag; containers call this once the
    /// codec is selected.
    pub fn init_widths(&mut self) {
        self.byte_width = self.codec().byte_width();
        self.block_width = self.byte_width * self.channels;
    }

    /// Recomputes the frame count from the data length for fixed-width codecs, or
    /// from the block geometry for block codecs.
    pub fn update_frame_count(&mut self) {
        if self.block_width > 0 {
            self.frames = self.data_length / u64::from(self.block_width);
        }
        else {
            let params = self.codec_params;
            if params.block_align > 0 && params.frames_per_block > 0 {
                self.frames = self.data_length / u64::from(params.block_align)
                    * u64::from(params.frames_per_block);
            }
        }
    }

    /// Re-queries the stream length, falling back to the furthest position seen.
    pub fn refresh_file_length(&mut self) {
        if let Some(len) = self.stream.byte_len() {
            self.file_length = len;
        }
        else {
            self.file_length = self.file_length.max(self.stream.pos());
        }
    }

    /// Clamps a data length claimed by a header against the physical file length.
    pub fn clamp_data_length(&mut self, claimed: u64) {
        let available = self.file_length.saturating_sub(self.data_offset);

        if claimed > available {
            self.parse_log.log(format!(
                "data chunk claims {} bytes but only {} remain, clamping",
                claimed, available
            ));
            self.data_length = available;
        }
        else {
            self.data_length = claimed;
        }
    }

    /// Seeks the stream to an absolute frame position for a fixed-width codec.
    pub fn seek_to_frame_bytes(&mut self, frame: u64) -> Result<u64> {
        if self.block_width == 0 {
            return seek_error(SeekErrorKind::Unseekable);
        }

        let target = self.data_offset + frame * u64::from(self.block_width);
        self.stream.seek(SeekFrom::Start(target))?;
        Ok(frame)
    }

    fn set_sticky(&mut self, err: &Error) {
        if self.error.is_none() {
            self.error = Some(err.code());
        }
    }
}

/// The method vector every container driver provides.
///
/// A driver's open function (per format crate) parses or prepares the header and
/// populates the handle state; the trait carries the operations needed afterwards.
pub trait Container: Send {
    fn container_id(&self) -> ContainerId;

    /// Serializes the header, idempotently. With `calc_length` set the final data
    /// length and frame count are derived from the physical file length first.
    /// Must not move `data_offset` once samples exist.
    fn write_header(&mut self, fs: &mut FileState, calc_length: bool) -> Result<()>;

    /// Emits end-located chunks after the sample data.
    fn write_tailer(&mut self, _fs: &mut FileState) -> Result<()> {
        Ok(())
    }

    /// Container-specific command hook.
    fn command(&mut self, _fs: &mut FileState, _cmd: &FileCommand) -> Result<CommandReply> {
        Ok(CommandReply::Unhandled)
    }

    /// Finalizes the container. The codec closer has already run.
    fn close(&mut self, fs: &mut FileState) -> Result<()> {
        if fs.mode != OpenMode::Read && fs.seekable {
            self.write_tailer(fs)?;
            self.write_header(fs, true)?;
        }
        Ok(())
    }
}

/// The method vector every codec driver provides: the four sample-type read paths,
/// the four write paths, seek, and the closer.
///
/// Counts are in items (samples), already validated by the handle to be a multiple
/// of the channel count. Read methods return the number of items produced; short
/// counts mean end of data.
pub trait Codec: Send {
    fn read_i16(&mut self, fs: &mut FileState, buf: &mut [i16]) -> Result<usize>;
    fn read_i32(&mut self, fs: &mut FileState, buf: &mut [i32]) -> Result<usize>;
    fn read_f32(&mut self, fs: &mut FileState, buf: &mut [f32]) -> Result<usize>;
    fn read_f64(&mut self, fs: &mut FileState, buf: &mut [f64]) -> Result<usize>;

    fn write_i16(&mut self, fs: &mut FileState, buf: &[i16]) -> Result<usize>;
    fn write_i32(&mut self, fs: &mut FileState, buf: &[i32]) -> Result<usize>;
    fn write_f32(&mut self, fs: &mut FileState, buf: &[f32]) -> Result<usize>;
    fn write_f64(&mut self, fs: &mut FileState, buf: &[f64]) -> Result<usize>;

    /// Positions the codec at an absolute frame. The default covers fixed-width
    /// codecs by byte arithmetic; block codecs override.
    fn seek(&mut self, fs: &mut FileState, frame: u64) -> Result<u64> {
        fs.seek_to_frame_bytes(frame)
    }

    /// Flushes any partial block. Runs strictly before the container closer.
    fn close(&mut self, _fs: &mut FileState) -> Result<()> {
        Ok(())
    }
}

/// The uniform command interface. Core commands are handled by the handle itself;
/// the rest are routed to the container hook.
#[derive(Clone, Debug)]
pub enum FileCommand {
    SetNormFloat(bool),
    GetNormFloat,
    SetNormDouble(bool),
    GetNormDouble,
    SetScaleIntFloatWrite(bool),
    SetScaleFloatIntRead(bool),
    SetClipping(bool),
    GetClipping,
    SetAddPeakChunk(bool),
    GetPeak,
    SetDitherOnWrite(DitherInfo),
    SetDitherOnRead(DitherInfo),
    UpdateHeaderNow,
    TruncateFrames(u64),
    RawNeedsEndswap,
    SetRf64AutoDowngrade(bool),
    SetAmbisonic(AmbisonicMode),
    GetAmbisonic,
    SetChannelMap(Vec<ChannelPosition>),
    GetChannelMap,
    SetCues(Vec<CuePoint>),
    GetCues,
    SetInstrument(Instrument),
    GetInstrument,
    SetString(StringTag, String),
    GetString(StringTag),
}

/// The reply to a [`FileCommand`].
#[derive(Clone, Debug, PartialEq)]
pub enum CommandReply {
    None,
    Bool(bool),
    Peaks(Vec<ChannelPeak>),
    Positions(Vec<ChannelPosition>),
    Cues(Vec<CuePoint>),
    Instrument(Option<Instrument>),
    Text(Option<String>),
    Ambisonic(AmbisonicMode),
    Unhandled,
}

/// An open audio file: the state aggregate plus exactly one codec driver and one
/// container driver.
pub struct AudioFile {
    state: FileState,
    container: Box<dyn Container>,
    codec: Box<dyn Codec>,
}

macro_rules! read_method {
    ($name:ident, $ty:ty, $codec_read:ident, $dither_copy:ident) => {
        pub fn $name(&mut self, buf: &mut [$ty]) -> Result<usize> {
            self.check_readable(buf.len())?;
            let items = self.clamp_read_items(buf.len());

            if self.state.mode == OpenMode::ReadWrite && self.state.last_op != LastOp::Read {
                let frame = self.state.read_current;
                self.codec.seek(&mut self.state, frame)?;
            }

            let result = self.codec.$codec_read(&mut self.state, &mut buf[..items]);

            match result {
                Ok(count) => {
                    // Read-side dither is a stub: a pass-through copy in place.
                    if let Some(stage) = self.state.dither_read.as_ref() {
                        let copied = stage.$dither_copy(&buf[..count]);
                        buf[..count].copy_from_slice(&copied);
                    }

                    self.state.read_current += (count / self.state.channels as usize) as u64;
                    self.state.last_op = LastOp::Read;
                    Ok(count)
                }
                Err(err) => {
                    self.state.set_sticky(&err);
                    Err(err)
                }
            }
        }
    };
}

macro_rules! write_method {
    ($name:ident, $ty:ty, $codec_write:ident, $dither_copy:ident, $norm:expr) => {
        pub fn $name(&mut self, buf: &[$ty]) -> Result<usize> {
            self.check_writable(buf.len())?;
            self.ensure_header()?;

            if self.state.mode == OpenMode::ReadWrite && self.state.last_op != LastOp::Write {
                let frame = self.state.write_current;
                self.codec.seek(&mut self.state, frame)?;
            }

            let owned;
            let samples: &[$ty] = match self.state.dither_write.as_ref() {
                Some(stage) => {
                    owned = stage.$dither_copy(buf);
                    &owned
                }
                None => buf,
            };

            let result = self.codec.$codec_write(&mut self.state, samples);

            match result {
                Ok(count) => {
                    let start_frame = self.state.write_current;

                    if let Some(peak) = self.state.peak.as_mut() {
                        let norm: fn($ty) -> f64 = $norm;
                        let scaled: Vec<f64> =
                            samples[..count].iter().map(|v| norm(*v)).collect();
                        peak.update(&scaled, start_frame);
                    }

                    self.state.write_current += (count / self.state.channels as usize) as u64;
                    self.state.frames = self.state.frames.max(self.state.write_current);
                    self.state.last_op = LastOp::Write;
                    Ok(count)
                }
                Err(err) => {
                    self.state.set_sticky(&err);
                    Err(err)
                }
            }
        }
    };
}

impl AudioFile {
    /// Assembles a handle from the parts a format crate's open function produced.
    pub fn from_parts(
        state: FileState,
        container: Box<dyn Container>,
        codec: Box<dyn Codec>,
    ) -> Result<AudioFile> {
        if state.channels == 0 {
            return Err(Error::ChannelCount);
        }

        if state.byte_width > 0 && state.block_width != state.byte_width * state.channels {
            return Err(Error::Internal("block width does not match byte width"));
        }

        Ok(AudioFile { state, container, codec })
    }

    pub fn format(&self) -> FormatId {
        self.state.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.state.channels
    }

    pub fn frames(&self) -> u64 {
        self.state.frames
    }

    pub fn mode(&self) -> OpenMode {
        self.state.mode
    }

    pub fn seekable(&self) -> bool {
        self.state.seekable
    }

    /// The sticky error code, if any operation has failed on this handle.
    pub fn last_error(&self) -> Option<i32> {
        self.state.error
    }

    /// Clears the sticky error.
    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    pub fn parse_log(&self) -> &[String] {
        self.state.parse_log.entries()
    }

    /// Direct access to the state aggregate, for format crates and tests.
    pub fn state(&self) -> &FileState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut FileState {
        &mut self.state
    }

    fn check_sticky(&self) -> Result<()> {
        match self.state.error {
            Some(_) => Err(Error::BadMode("handle has a sticky error")),
            None => Ok(()),
        }
    }

    fn check_readable(&self, items: usize) -> Result<()> {
        self.check_sticky()?;

        if self.state.mode == OpenMode::Write {
            return bad_mode_error("handle is open for writing only");
        }
        if items % self.state.channels as usize != 0 {
            return Err(Error::BufferAlign);
        }
        Ok(())
    }

    fn check_writable(&self, items: usize) -> Result<()> {
        self.check_sticky()?;

        if self.state.mode == OpenMode::Read {
            return bad_mode_error("handle is open for reading only");
        }
        if items % self.state.channels as usize != 0 {
            return Err(Error::BufferAlign);
        }
        Ok(())
    }

    fn clamp_read_items(&self, items: usize) -> usize {
        let channels = self.state.channels as usize;
        let remaining = self.state.frames.saturating_sub(self.state.read_current);

        let max_items = remaining.saturating_mul(channels as u64);
        if (items as u64) > max_items {
            (max_items as usize / channels) * channels
        }
        else {
            items
        }
    }

    /// Emits the header ahead of the first sample write.
    fn ensure_header(&mut self) -> Result<()> {
        if !self.state.have_written {
            self.container.write_header(&mut self.state, false)?;
            self.state.have_written = true;

            // Sample writing begins at the data offset.
            if self.state.seekable {
                let offset = self.state.data_offset;
                self.state.stream.seek(SeekFrom::Start(offset))?;
            }
        }
        Ok(())
    }

    read_method!(read_i16, i16, read_i16, copy_i16);
    read_method!(read_i32, i32, read_i32, copy_i32);
    read_method!(read_f32, f32, read_f32, copy_f32);
    read_method!(read_f64, f64, read_f64, copy_f64);

    write_method!(write_i16, i16, write_i16, copy_i16, |v| f64::from(v) / 32768.0);
    write_method!(write_i32, i32, write_i32, copy_i32, |v| f64::from(v) / 2147483648.0);
    write_method!(write_f32, f32, write_f32, copy_f32, f64::from);
    write_method!(write_f64, f64, write_f64, copy_f64, |v| v);

    /// Reads `frames * channels` items; returns the number of whole frames read.
    pub fn read_i16_frames(&mut self, buf: &mut [i16]) -> Result<usize> {
        Ok(self.read_i16(buf)? / self.state.channels as usize)
    }

    pub fn read_i32_frames(&mut self, buf: &mut [i32]) -> Result<usize> {
        Ok(self.read_i32(buf)? / self.state.channels as usize)
    }

    pub fn read_f32_frames(&mut self, buf: &mut [f32]) -> Result<usize> {
        Ok(self.read_f32(buf)? / self.state.channels as usize)
    }

    pub fn read_f64_frames(&mut self, buf: &mut [f64]) -> Result<usize> {
        Ok(self.read_f64(buf)? / self.state.channels as usize)
    }

    /// Writes `frames * channels` items; returns the number of whole frames
    /// written.
    pub fn write_i16_frames(&mut self, buf: &[i16]) -> Result<usize> {
        Ok(self.write_i16(buf)? / self.state.channels as usize)
    }

    pub fn write_i32_frames(&mut self, buf: &[i32]) -> Result<usize> {
        Ok(self.write_i32(buf)? / self.state.channels as usize)
    }

    pub fn write_f32_frames(&mut self, buf: &[f32]) -> Result<usize> {
        Ok(self.write_f32(buf)? / self.state.channels as usize)
    }

    pub fn write_f64_frames(&mut self, buf: &[f64]) -> Result<usize> {
        Ok(self.write_f64(buf)? / self.state.channels as usize)
    }

    /// Seeks both frame cursors.
    pub fn seek(&mut self, offset: i64, whence: SeekWhence) -> Result<u64> {
        self.check_sticky()?;

        if !self.state.seekable {
            return seek_error(SeekErrorKind::Unseekable);
        }

        let base = match whence {
            SeekWhence::Start => 0,
            SeekWhence::Current => match self.state.mode {
                OpenMode::Write => self.state.write_current,
                _ => self.state.read_current,
            },
            SeekWhence::End => self.state.frames,
        };

        let target = base as i64 + offset;
        if target < 0 || target as u64 > self.state.frames {
            return seek_error(SeekErrorKind::OutOfRange);
        }

        let frame = self.codec.seek(&mut self.state, target as u64)?;

        self.state.read_current = frame;
        self.state.write_current = frame;
        self.state.last_op = LastOp::None;

        Ok(frame)
    }

    /// Dispatches a command: core toggles are handled here, everything else is
    /// offered to the container hook.
    pub fn command(&mut self, cmd: FileCommand) -> Result<CommandReply> {
        match cmd {
            FileCommand::SetNormFloat(on) => {
                let old = self.state.norm_float;
                self.state.norm_float = on;
                Ok(CommandReply::Bool(old))
            }
            FileCommand::GetNormFloat => Ok(CommandReply::Bool(self.state.norm_float)),
            FileCommand::SetNormDouble(on) => {
                let old = self.state.norm_double;
                self.state.norm_double = on;
                Ok(CommandReply::Bool(old))
            }
            FileCommand::GetNormDouble => Ok(CommandReply::Bool(self.state.norm_double)),
            FileCommand::SetScaleIntFloatWrite(on) => {
                let old = self.state.scale_int_float_write;
                self.state.scale_int_float_write = on;
                Ok(CommandReply::Bool(old))
            }
            FileCommand::SetScaleFloatIntRead(on) => {
                let old = self.state.scale_float_int_read;
                self.state.scale_float_int_read = on;
                Ok(CommandReply::Bool(old))
            }
            FileCommand::SetClipping(on) => {
                let old = self.state.clipping;
                self.state.clipping = on;
                Ok(CommandReply::Bool(old))
            }
            FileCommand::GetClipping => Ok(CommandReply::Bool(self.state.clipping)),
            FileCommand::SetAddPeakChunk(on) => {
                // The peak tracker can only be toggled before any samples exist.
                if self.state.have_written {
                    return Err(Error::CommandParam("peak chunk cannot change after writing"));
                }
                let old = self.state.add_peak_chunk;
                self.state.add_peak_chunk = on;

                if on && self.state.peak.is_none() {
                    self.state.peak = Some(PeakInfo::new(self.state.channels as usize));
                }
                else if !on {
                    self.state.peak = None;
                }
                Ok(CommandReply::Bool(old))
            }
            FileCommand::GetPeak => match self.state.peak.as_ref() {
                Some(peak) => Ok(CommandReply::Peaks(peak.channels.clone())),
                None => Ok(CommandReply::None),
            },
            FileCommand::SetDitherOnWrite(info) => {
                self.state.dither_write = Some(DitherStage::new(info));
                Ok(CommandReply::None)
            }
            FileCommand::SetDitherOnRead(info) => {
                self.state.dither_read = Some(DitherStage::new(info));
                Ok(CommandReply::None)
            }
            FileCommand::UpdateHeaderNow => {
                self.check_sticky()?;
                if self.state.mode == OpenMode::Read {
                    return bad_mode_error("handle is open for reading only");
                }
                self.container.write_header(&mut self.state, false)?;
                self.state.have_written = true;
                Ok(CommandReply::None)
            }
            FileCommand::TruncateFrames(frames) => self.truncate(frames),
            FileCommand::RawNeedsEndswap => {
                let multi_byte = self.state.byte_width > 1;
                let cpu_big = cfg!(target_endian = "big");
                Ok(CommandReply::Bool(multi_byte && self.state.big_endian != cpu_big))
            }
            FileCommand::SetChannelMap(map) => {
                if map.len() != self.state.channels as usize {
                    return Err(Error::CommandParam("channel map length mismatch"));
                }
                self.state.channel_map = map;
                // Offer it to the container, which may derive a mask or layout tag.
                let cmd = FileCommand::SetChannelMap(self.state.channel_map.clone());
                let _ = self.container.command(&mut self.state, &cmd)?;
                Ok(CommandReply::None)
            }
            FileCommand::GetChannelMap => {
                if self.state.channel_map.is_empty() {
                    Ok(CommandReply::None)
                }
                else {
                    Ok(CommandReply::Positions(self.state.channel_map.clone()))
                }
            }
            FileCommand::SetCues(cues) => {
                self.state.cues = cues;
                Ok(CommandReply::None)
            }
            FileCommand::GetCues => Ok(CommandReply::Cues(self.state.cues.clone())),
            FileCommand::SetInstrument(inst) => {
                self.state.instrument = Some(inst);
                Ok(CommandReply::None)
            }
            FileCommand::GetInstrument => {
                Ok(CommandReply::Instrument(self.state.instrument.clone()))
            }
            FileCommand::SetString(tag, value) => {
                self.state.strings.set(tag, &value);
                Ok(CommandReply::None)
            }
            FileCommand::GetString(tag) => {
                Ok(CommandReply::Text(self.state.strings.get(tag).map(String::from)))
            }
            other => self.container.command(&mut self.state, &other),
        }
    }

    fn truncate(&mut self, frames: u64) -> Result<CommandReply> {
        self.check_sticky()?;

        if self.state.mode == OpenMode::Read {
            return bad_mode_error("handle is open for reading only");
        }
        if self.state.block_width == 0 {
            return Err(Error::CommandParam("cannot truncate a block codec"));
        }
        if frames > self.state.frames {
            return Err(Error::CommandParam("cannot truncate beyond the frame count"));
        }

        let len = self.state.data_offset + frames * u64::from(self.state.block_width);
        self.state.stream.set_byte_len(len)?;

        self.state.frames = frames;
        self.state.data_length = frames * u64::from(self.state.block_width);
        self.state.read_current = self.state.read_current.min(frames);
        self.state.write_current = self.state.write_current.min(frames);
        self.state.refresh_file_length();

        Ok(CommandReply::None)
    }

    /// Chunk enumeration, optionally restricted to one id.
    pub fn chunk_iter_start(&self, id: Option<&[u8]>) -> Option<ChunkCursor> {
        self.state.chunks.iter_start(id)
    }

    pub fn chunk_iter_next(&self, cursor: ChunkCursor) -> Option<ChunkCursor> {
        self.state.chunks.iter_next(cursor)
    }

    /// The logged length of the chunk under the cursor.
    pub fn chunk_len(&self, cursor: ChunkCursor) -> Option<u64> {
        self.state.chunks.read_chunk_at(cursor).map(|c| c.len)
    }

    /// Materialises the payload of the chunk under the cursor.
    pub fn chunk_data(&mut self, cursor: ChunkCursor) -> Result<Box<[u8]>> {
        self.state.chunks.read_chunk_data(cursor, &mut self.state.stream)
    }

    /// Queues a caller-supplied chunk for emission at header-write time.
    pub fn set_chunk(&mut self, id: &[u8], data: &[u8]) -> Result<()> {
        if self.state.mode == OpenMode::Read {
            return bad_mode_error("handle is open for reading only");
        }
        if self.state.have_written {
            return Err(Error::CommandParam("chunks must be added before writing samples"));
        }

        self.state.chunks.save_write_chunk(ChunkId::new(id), data);
        Ok(())
    }

    /// Closes the file: codec closer, container closer, stream flush, in that
    /// order. Runs the closers even after earlier errors to minimise on-disk
    /// damage.
    pub fn close(mut self) -> Result<()> {
        self.close_impl()
    }

    /// Closes the file and hands back the underlying stream, so in-memory sinks
    /// can be inspected and duplicated file descriptors reused.
    pub fn close_into_stream(mut self) -> Result<Box<dyn crate::io::MediaStream>> {
        self.close_impl()?;
        Ok(self.state.stream.into_inner())
    }

    fn close_impl(&mut self) -> Result<()> {
        let codec_result = self.codec.close(&mut self.state);
        self.state.refresh_file_length();

        let container_result = self.container.close(&mut self.state);
        let flush_result = self.state.stream.flush();

        codec_result?;
        container_result?;
        flush_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CONTAINER_RAW, CODEC_PCM_16, Endian};

    struct NullContainer;

    impl Container for NullContainer {
        fn container_id(&self) -> ContainerId {
            CONTAINER_RAW
        }

        fn write_header(&mut self, _fs: &mut FileState, _calc_length: bool) -> Result<()> {
            Ok(())
        }
    }

    struct NullCodec;

    impl Codec for NullCodec {
        fn read_i16(&mut self, _fs: &mut FileState, buf: &mut [i16]) -> Result<usize> {
            buf.fill(0);
            Ok(buf.len())
        }

        fn read_i32(&mut self, _fs: &mut FileState, buf: &mut [i32]) -> Result<usize> {
            buf.fill(0);
            Ok(buf.len())
        }

        fn read_f32(&mut self, _fs: &mut FileState, buf: &mut [f32]) -> Result<usize> {
            buf.fill(0.0);
            Ok(buf.len())
        }

        fn read_f64(&mut self, _fs: &mut FileState, buf: &mut [f64]) -> Result<usize> {
            buf.fill(0.0);
            Ok(buf.len())
        }

        fn write_i16(&mut self, _fs: &mut FileState, buf: &[i16]) -> Result<usize> {
            Ok(buf.len())
        }

        fn write_i32(&mut self, _fs: &mut FileState, buf: &[i32]) -> Result<usize> {
            Ok(buf.len())
        }

        fn write_f32(&mut self, _fs: &mut FileState, buf: &[f32]) -> Result<usize> {
            Ok(buf.len())
        }

        fn write_f64(&mut self, _fs: &mut FileState, buf: &[f64]) -> Result<usize> {
            Ok(buf.len())
        }
    }

    fn test_state(mode: OpenMode) -> FileState {
        let format = FormatId::new(CONTAINER_RAW, CODEC_PCM_16, Endian::Little);
        let mut fs = FileState::new(mode, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 8000;
        fs.channels = 2;
        fs.init_widths();
        fs
    }

    #[test]
    fn misaligned_buffers_are_rejected() {
        let mut fs = test_state(OpenMode::Write);
        fs.frames = 0;

        let mut af =
            AudioFile::from_parts(fs, Box::new(NullContainer), Box::new(NullCodec)).unwrap();

        let buf = [0i16; 3];
        assert!(matches!(af.write_i16(&buf), Err(Error::BufferAlign)));
    }

    #[test]
    fn mode_checks_block_cross_operations() {
        let fs = test_state(OpenMode::Read);
        let mut af =
            AudioFile::from_parts(fs, Box::new(NullContainer), Box::new(NullCodec)).unwrap();

        assert!(matches!(af.write_i16(&[0i16; 2]), Err(Error::BadMode(_))));
    }

    #[test]
    fn write_advances_cursor_and_frames() {
        let fs = test_state(OpenMode::Write);
        let mut af =
            AudioFile::from_parts(fs, Box::new(NullContainer), Box::new(NullCodec)).unwrap();

        assert_eq!(af.write_i16(&[1i16; 8]).unwrap(), 8);
        assert_eq!(af.frames(), 4);
        assert_eq!(af.state().write_current, 4);
    }

    #[test]
    fn reads_clamp_to_remaining_frames() {
        let mut fs = test_state(OpenMode::Read);
        fs.frames = 3;

        let mut af =
            AudioFile::from_parts(fs, Box::new(NullContainer), Box::new(NullCodec)).unwrap();

        let mut buf = [1i16; 16];
        assert_eq!(af.read_i16(&mut buf).unwrap(), 6);
    }

    #[test]
    fn peak_tracks_written_samples() {
        let mut fs = test_state(OpenMode::Write);
        fs.peak = Some(PeakInfo::new(2));

        let mut af =
            AudioFile::from_parts(fs, Box::new(NullContainer), Box::new(NullCodec)).unwrap();

        af.write_i16(&[0, 0, -16384, 8192]).unwrap();

        match af.command(FileCommand::GetPeak).unwrap() {
            CommandReply::Peaks(peaks) => {
                assert_eq!(peaks[0].value, 0.5);
                assert_eq!(peaks[0].position, 1);
                assert_eq!(peaks[1].value, 0.25);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn sticky_error_blocks_later_operations() {
        let fs = test_state(OpenMode::Write);
        let mut af =
            AudioFile::from_parts(fs, Box::new(NullContainer), Box::new(NullCodec)).unwrap();

        af.state_mut().error = Some(5);
        assert!(af.write_i16(&[0i16; 2]).is_err());

        af.clear_error();
        assert!(af.write_i16(&[0i16; 2]).is_ok());
    }
}
