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

//! The Core Audio Format container driver.
//!
//! A CAF file is `caff` + version/flags words, then chunks with four-byte markers
//! and signed 64-bit big-endian sizes. The mandatory `desc` chunk is a fixed
//! 32-byte layout; the `data` chunk opens with an edit-count word and may declare
//! size −1 when the writer streamed to an unseekable sink. Compressed files park a
//! magic cookie in `kuki` and a packet table in `pakt`, both captured with their
//! offsets in the chunk index.

use std::io::SeekFrom;

use log::info;

use cantata_core::chunks::ChunkId;
use cantata_core::errors::{
    decode_error, internal_error, missing_chunk_error, unsupported_error, Error, MissingChunk,
    Result,
};
use cantata_core::format::{
    ContainerId, Endian, FormatId, CODEC_ALAW, CODEC_DOUBLE, CODEC_FLOAT, CODEC_PCM_16,
    CODEC_PCM_24, CODEC_PCM_32, CODEC_PCM_S8, CODEC_ULAW, CONTAINER_CAF,
};
use cantata_core::handle::{Container, FileState};
use cantata_core::meta::{positions_from_mask, ChannelPosition, Channels};
use cantata_core::peak::{ChannelPeak, PeakInfo, PeakLocation};

/// Format flag: samples are IEEE floats.
const FLAG_IS_FLOAT: u32 = 0x1;
/// Format flag: samples are little-endian.
const FLAG_IS_LITTLE: u32 = 0x2;

pub struct CafContainer {
    parsed_header: bool,
}

impl CafContainer {
    pub fn open_read(fs: &mut FileState) -> Result<Box<dyn Container>> {
        let mut container = CafContainer { parsed_header: true };
        container.parse_header(fs)?;
        Ok(Box::new(container))
    }

    pub fn open_write(fs: &mut FileState) -> Result<Box<dyn Container>> {
        fs.format.validate()?;

        if fs.stream.is_pipe() {
            return Err(Error::PipeWriteNotSupported);
        }

        fs.big_endian = fs.format.endian().resolve(false);
        fs.init_widths();

        Ok(Box::new(CafContainer { parsed_header: false }))
    }

    fn parse_desc(&mut self, fs: &mut FileState, data: &[u8]) -> Result<()> {
        if data.len() < 32 {
            return decode_error("caf: desc chunk is shorter than 32 bytes");
        }

        let u32_at = |at: usize| {
            u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };

        let mut rate_bytes = [0u8; 8];
        rate_bytes.copy_from_slice(&data[0..8]);
        let sample_rate = f64::from_be_bytes(rate_bytes);

        let mut fmt_id = [0u8; 4];
        fmt_id.copy_from_slice(&data[8..12]);

        let flags = u32_at(12);
        let pkt_bytes = u32_at(16);
        let frames_per_packet = u32_at(20);
        let channels_per_frame = u32_at(24);
        let bits_per_chan = u32_at(28);

        fs.parse_log.log(format!(
            "desc : rate {} fmt {} flags {:#x} pkt {} fpp {} ch {} bits {}",
            sample_rate,
            String::from_utf8_lossy(&fmt_id),
            flags,
            pkt_bytes,
            frames_per_packet,
            channels_per_frame,
            bits_per_chan
        ));

        if sample_rate <= 0.0 || sample_rate > 1e9 {
            return decode_error("caf: desc sample rate is out of range");
        }
        if channels_per_frame == 0 {
            return Err(Error::ChannelCount);
        }

        fs.sample_rate = sample_rate as u32;
        fs.channels = channels_per_frame;

        let little = flags & FLAG_IS_LITTLE != 0;

        let codec = match &fmt_id {
            b"lpcm" if flags & FLAG_IS_FLOAT != 0 => match bits_per_chan {
                32 => CODEC_FLOAT,
                64 => CODEC_DOUBLE,
                _ => return decode_error("caf: float sample width must be 32 or 64 bits"),
            },
            b"lpcm" => match bits_per_chan {
                8 => CODEC_PCM_S8,
                16 => CODEC_PCM_16,
                24 => CODEC_PCM_24,
                32 => CODEC_PCM_32,
                _ => return decode_error("caf: PCM sample width must be 8, 16, 24 or 32 bits"),
            },
            b"ulaw" => CODEC_ULAW,
            b"alaw" => CODEC_ALAW,
            // Compressed formats: the chunk-level contract (kuki/pakt capture)
            // still holds, the packet math lives elsewhere.
            b"alac" | b"aac " | b"ima4" => {
                return unsupported_error("caf: compressed format id is not supported")
            }
            _ => return unsupported_error("caf: unknown format id"),
        };

        let endian = if little { Endian::Little } else { Endian::Big };
        fs.format = FormatId::new(CONTAINER_CAF, codec, endian);
        fs.big_endian = !little;

        Ok(())
    }

    /// Reads the `chan` chunk. The element count inherited a multiply-by-word-size
    /// slip: the map gets `min(channels, tag & 0xff) * 4` entries, padded with
    /// `Invalid`. Kept as-is; see the regression test.
    fn parse_chan(&mut self, fs: &mut FileState, data: &[u8]) -> Result<()> {
        if data.len() < 12 {
            return decode_error("caf: malformed chan chunk");
        }

        let u32_at = |at: usize| {
            u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };

        let layout_tag = u32_at(0);
        let bitmap = u32_at(4);
        let descriptions = u32_at(8);

        fs.parse_log.log(format!(
            "chan : tag {:#x} bitmap {:#x} descriptions {}",
            layout_tag, bitmap, descriptions
        ));

        if layout_tag == 0x1_0000 {
            // kCAFChannelLayoutTag_UseChannelBitmap
            if let Some(mask) = Channels::from_bits(bitmap) {
                fs.channel_mask = Some(mask);
                fs.channel_map = positions_from_mask(mask);
            }
            return Ok(());
        }

        let count = (fs.channels as usize).min((layout_tag & 0xff) as usize) * 4;
        let mut map = vec![ChannelPosition::Invalid; count];

        for (index, slot) in map.iter_mut().enumerate().take(fs.channels as usize) {
            *slot = match index {
                0 => ChannelPosition::FrontLeft,
                1 => ChannelPosition::FrontRight,
                2 => ChannelPosition::FrontCentre,
                3 => ChannelPosition::Lfe,
                4 => ChannelPosition::RearLeft,
                5 => ChannelPosition::RearRight,
                _ => ChannelPosition::Invalid,
            };
        }

        fs.channel_map = map;
        Ok(())
    }

    fn parse_peak_chunk(&mut self, fs: &mut FileState, data: &[u8], after_data: bool) -> Result<()> {
        let channels = fs.channels as usize;

        if data.len() != 4 + channels * 12 {
            return decode_error("caf: peak chunk size does not match the channel count");
        }

        let mut peak = PeakInfo::new(channels);
        peak.timestamp = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        peak.location = if after_data { PeakLocation::End } else { PeakLocation::Start };

        for (ch, slot) in peak.channels.iter_mut().enumerate() {
            let at = 4 + ch * 12;
            let value =
                f32::from_bits(u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]));
            let mut pos_bytes = [0u8; 8];
            pos_bytes.copy_from_slice(&data[at + 4..at + 12]);

            *slot = ChannelPeak { value, position: u64::from_be_bytes(pos_bytes) };
        }

        fs.peak = Some(peak);
        Ok(())
    }

    fn parse_header(&mut self, fs: &mut FileState) -> Result<()> {
        fs.stream.seek(SeekFrom::Start(0))?;

        if &fs.stream.read_quad_bytes()? != b"caff" {
            return missing_chunk_error(MissingChunk::CafNoCaff);
        }

        let version = fs.stream.read_be_u16()?;
        let flags = fs.stream.read_be_u16()?;
        fs.parse_log.log(format!("caff : version {} flags {}", version, flags));

        if version != 1 {
            return decode_error("caf: unsupported file version");
        }

        let mut have_desc = false;
        let mut have_data = false;

        loop {
            if fs.stream.pos() + 12 > fs.file_length {
                break;
            }

            let marker = fs.stream.read_quad_bytes()?;
            let raw_size = fs.stream.read_be_u64()? as i64;
            let payload_offset = fs.stream.pos();

            // Only the final data chunk may leave its size open.
            let size = if raw_size < 0 {
                if &marker != b"data" {
                    return decode_error("caf: only the data chunk may have unknown size");
                }
                fs.file_length.saturating_sub(payload_offset)
            }
            else {
                raw_size as u64
            };

            if have_data && fs.data_end == 0 {
                fs.data_end = payload_offset - 12;
            }

            fs.chunks.store_read_chunk(ChunkId::from_marker(marker), payload_offset, size);

            match &marker {
                b"desc" => {
                    let data = fs.stream.read_boxed_slice_exact(size as usize)?;
                    self.parse_desc(fs, &data)?;
                    have_desc = true;
                }
                b"data" => {
                    if !have_desc {
                        return missing_chunk_error(MissingChunk::CafNoDesc);
                    }
                    if size < 4 {
                        return decode_error("caf: data chunk is missing its edit count");
                    }

                    let edit_count = fs.stream.read_be_u32()?;
                    if let Some(peak) = fs.peak.as_mut() {
                        peak.timestamp = edit_count;
                    }

                    fs.data_offset = payload_offset + 4;
                    fs.clamp_data_length(size - 4);
                    have_data = true;

                    fs.stream.seek(SeekFrom::Start(fs.data_offset + fs.data_length))?;
                }
                b"chan" => {
                    let data = fs.stream.read_boxed_slice_exact(size as usize)?;
                    self.parse_chan(fs, &data)?;
                }
                b"peak" => {
                    let data = fs.stream.read_boxed_slice_exact(size as usize)?;
                    self.parse_peak_chunk(fs, &data, have_data)?;
                }
                b"kuki" | b"pakt" => {
                    // Captured in the index with offset and length for the packet
                    // decoders; nothing to interpret here.
                    fs.stream.seek(SeekFrom::Start(payload_offset + size))?;
                }
                b"free" => {
                    fs.stream.seek(SeekFrom::Start(payload_offset + size))?;
                }
                _ => {
                    info!(
                        "ignoring unknown chunk: tag={}, len={}.",
                        String::from_utf8_lossy(&marker),
                        size
                    );

                    if payload_offset + size > fs.file_length {
                        fs.parse_log.log(format!(
                            "chunk {} overshoots the file, stopping",
                            String::from_utf8_lossy(&marker)
                        ));
                        break;
                    }
                    fs.stream.seek(SeekFrom::Start(payload_offset + size))?;
                }
            }
        }

        if !have_desc {
            return missing_chunk_error(MissingChunk::CafNoDesc);
        }
        if !have_data {
            return missing_chunk_error(MissingChunk::CafNoData);
        }

        fs.init_widths();
        fs.update_frame_count();

        fs.stream.seek(SeekFrom::Start(fs.data_offset))?;

        Ok(())
    }

    fn desc_fields(&self, fs: &FileState) -> Result<([u8; 4], u32, u32, u32)> {
        let codec = fs.codec();

        let mut flags = 0;
        if !fs.big_endian {
            flags |= FLAG_IS_LITTLE;
        }

        let (fmt_id, bits) = match codec {
            CODEC_PCM_S8 => (*b"lpcm", 8),
            CODEC_PCM_16 => (*b"lpcm", 16),
            CODEC_PCM_24 => (*b"lpcm", 24),
            CODEC_PCM_32 => (*b"lpcm", 32),
            CODEC_FLOAT => {
                flags |= FLAG_IS_FLOAT;
                (*b"lpcm", 32)
            }
            CODEC_DOUBLE => {
                flags |= FLAG_IS_FLOAT;
                (*b"lpcm", 64)
            }
            CODEC_ULAW => (*b"ulaw", 8),
            CODEC_ALAW => (*b"alaw", 8),
            _ => return unsupported_error("caf: codec has no desc representation"),
        };

        Ok((fmt_id, flags, bits, (bits / 8) * fs.channels))
    }
}

impl Container for CafContainer {
    fn container_id(&self) -> ContainerId {
        CONTAINER_CAF
    }

    fn write_header(&mut self, fs: &mut FileState, calc_length: bool) -> Result<()> {
        let current = fs.stream.pos();

        if calc_length {
            fs.refresh_file_length();
            let end = if fs.data_end > 0 { fs.data_end } else { fs.file_length };
            fs.data_length = end.saturating_sub(fs.data_offset);

            if fs.block_width > 0 {
                fs.frames = fs.data_length / u64::from(fs.block_width);
            }
        }

        if self.parsed_header {
            // Patch the data chunk size in place.
            if fs.data_offset >= 12 {
                let size = (fs.data_length + 4) as i64;
                fs.stream.seek(SeekFrom::Start(fs.data_offset - 12))?;
                fs.stream.write_buf(&size.to_be_bytes())?;
            }
            return Ok(());
        }

        let (fmt_id, flags, bits, pkt_bytes) = self.desc_fields(fs)?;

        let mut hb = std::mem::take(&mut fs.header);
        hb.reset();
        hb.set_big_endian(true);

        hb.put_marker(*b"caff");
        hb.put_u16(1);
        hb.put_u16(0);

        hb.put_marker(*b"desc");
        hb.put_u64(32);
        hb.put_f64(f64::from(fs.sample_rate));
        hb.put_marker(fmt_id);
        hb.put_u32(flags);
        hb.put_u32(pkt_bytes);
        hb.put_u32(1);
        hb.put_u32(fs.channels);
        hb.put_u32(bits);

        if let Some(mask) = fs.channel_mask {
            hb.put_marker(*b"chan");
            hb.put_u64(12);
            // kCAFChannelLayoutTag_UseChannelBitmap
            hb.put_u32(0x1_0000);
            hb.put_u32(mask.bits());
            hb.put_u32(0);
        }

        if let Some(peak) = fs.peak.as_ref() {
            hb.put_marker(*b"peak");
            hb.put_u64(4 + peak.channels.len() as u64 * 12);
            hb.put_u32(peak.timestamp);
            for channel in &peak.channels {
                hb.put_f32(channel.value);
                hb.put_u64(channel.position);
            }
        }

        for chunk in fs.chunks.write_chunks() {
            if chunk.id.len() != 4 {
                return Err(Error::CommandParam("caf chunk ids must be four bytes"));
            }
            let mut marker = [0u8; 4];
            marker.copy_from_slice(chunk.id.bytes());

            hb.put_marker(marker);
            hb.put_u64(chunk.data.len() as u64);
            hb.put_bytes(&chunk.data);
        }

        hb.put_marker(*b"data");
        hb.put_u64(fs.data_length + 4);
        // Edit count; bumped every rewrite.
        hb.put_u32(if calc_length { 1 } else { 0 });

        if fs.data_offset != 0 && hb.len() as u64 != fs.data_offset {
            fs.header = hb;
            return internal_error("caf: header rewrite would move the data offset");
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

    use cantata_core::handle::OpenMode;
    use cantata_core::io::Bstream;

    fn write_file(codec: cantata_core::format::CodecId, endian: Endian, payload: &[u8]) -> Vec<u8> {
        let format = FormatId::new(CONTAINER_CAF, codec, endian);
        let mut fs = FileState::new(OpenMode::Write, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 44100;
        fs.channels = 2;

        let mut container = CafContainer::open_write(&mut fs).unwrap();
        container.write_header(&mut fs, false).unwrap();

        fs.stream.seek(SeekFrom::Start(fs.data_offset)).unwrap();
        fs.stream.write_buf(payload).unwrap();
        fs.data_length = payload.len() as u64;
        container.close(&mut fs).unwrap();

        let mut stream = fs.stream;
        let len = stream.byte_len().unwrap() as usize;
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut data = vec![0u8; len];
        stream.read_buf_exact(&mut data).unwrap();
        data
    }

    fn read_state(data: Vec<u8>) -> FileState {
        let format = FormatId::new(CONTAINER_CAF, CODEC_PCM_16, Endian::File);
        FileState::new(OpenMode::Read, Bstream::from_vec(data), format)
    }

    #[test]
    fn emits_caff_desc_and_data() {
        let data = write_file(CODEC_PCM_16, Endian::Little, &[0u8; 16]);

        assert_eq!(&data[0..4], b"caff");
        assert_eq!(u16::from_be_bytes([data[4], data[5]]), 1);
        assert_eq!(&data[8..12], b"desc");
        assert_eq!(u64::from_be_bytes(data[12..20].try_into().unwrap()), 32);

        // Big-endian IEEE double sample rate.
        let rate = f64::from_be_bytes(data[20..28].try_into().unwrap());
        assert_eq!(rate, 44100.0);
        assert_eq!(&data[28..32], b"lpcm");
    }

    #[test]
    fn written_files_parse_back() {
        let data = write_file(CODEC_PCM_16, Endian::Little, &[0u8; 16]);
        let mut rs = read_state(data);

        let container = CafContainer::open_read(&mut rs).unwrap();
        assert_eq!(container.container_id(), CONTAINER_CAF);
        assert_eq!(rs.channels, 2);
        assert_eq!(rs.sample_rate, 44100);
        assert_eq!(rs.codec(), CODEC_PCM_16);
        assert!(!rs.big_endian);
        // 16 payload bytes, 4 of each frame.
        assert_eq!(rs.frames, 4);
    }

    #[test]
    fn big_endian_float_desc_flags() {
        let data = write_file(CODEC_FLOAT, Endian::Big, &[0u8; 8]);
        let mut rs = read_state(data);

        let _ = CafContainer::open_read(&mut rs).unwrap();
        assert_eq!(rs.codec(), CODEC_FLOAT);
        assert!(rs.big_endian);
    }

    #[test]
    fn unknown_data_size_runs_to_end_of_file() {
        let mut data = write_file(CODEC_PCM_16, Endian::Little, &[0u8; 32]);

        // Rewrite the data size as -1.
        let at = data.len() - 32 - 4 - 8;
        data[at..at + 8].copy_from_slice(&(-1i64).to_be_bytes());

        let mut rs = read_state(data);
        let _ = CafContainer::open_read(&mut rs).unwrap();
        assert_eq!(rs.frames, 8);
    }

    #[test]
    fn missing_desc_is_an_error() {
        let mut image = Vec::new();
        image.extend_from_slice(b"caff");
        image.extend_from_slice(&1u16.to_be_bytes());
        image.extend_from_slice(&0u16.to_be_bytes());
        image.extend_from_slice(b"data");
        image.extend_from_slice(&8u64.to_be_bytes());
        image.extend_from_slice(&[0u8; 8]);

        let mut rs = read_state(image);
        assert!(matches!(
            CafContainer::open_read(&mut rs),
            Err(Error::MissingChunk(MissingChunk::CafNoDesc))
        ));
    }

    #[test]
    fn chanmap_count_quirk() {
        // A stereo layout tag (two channels in the low byte) yields a map padded
        // to channels * 4 entries, the inherited double count.
        let format = FormatId::new(CONTAINER_CAF, CODEC_PCM_16, Endian::File);
        let mut fs = FileState::new(OpenMode::Read, Bstream::from_vec(Vec::new()), format);
        fs.channels = 2;

        let mut container = CafContainer { parsed_header: true };

        let mut data = Vec::new();
        data.extend_from_slice(&0x65_0002u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());

        container.parse_chan(&mut fs, &data).unwrap();

        assert_eq!(fs.channel_map.len(), 8);
        assert_eq!(fs.channel_map[0], ChannelPosition::FrontLeft);
        assert_eq!(fs.channel_map[1], ChannelPosition::FrontRight);
        assert_eq!(fs.channel_map[2], ChannelPosition::Invalid);
    }

    #[test]
    fn kuki_and_pakt_are_captured_with_offsets() {
        let mut image = Vec::new();
        image.extend_from_slice(b"caff");
        image.extend_from_slice(&1u16.to_be_bytes());
        image.extend_from_slice(&0u16.to_be_bytes());

        image.extend_from_slice(b"desc");
        image.extend_from_slice(&32u64.to_be_bytes());
        image.extend_from_slice(&44100f64.to_be_bytes());
        image.extend_from_slice(b"lpcm");
        image.extend_from_slice(&FLAG_IS_LITTLE.to_be_bytes());
        image.extend_from_slice(&4u32.to_be_bytes());
        image.extend_from_slice(&1u32.to_be_bytes());
        image.extend_from_slice(&2u32.to_be_bytes());
        image.extend_from_slice(&16u32.to_be_bytes());

        image.extend_from_slice(b"kuki");
        image.extend_from_slice(&4u64.to_be_bytes());
        image.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);

        image.extend_from_slice(b"pakt");
        image.extend_from_slice(&8u64.to_be_bytes());
        image.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        image.extend_from_slice(b"data");
        image.extend_from_slice(&12u64.to_be_bytes());
        image.extend_from_slice(&[0u8; 12]);

        let mut rs = read_state(image);
        let _ = CafContainer::open_read(&mut rs).unwrap();

        let kuki = rs.chunks.find_read_chunk_by_marker(*b"kuki").copied().unwrap();
        assert_eq!(kuki.len, 4);

        let cursor = rs.chunks.iter_start(Some(b"kuki")).unwrap();
        let cookie = rs.chunks.read_chunk_data(cursor, &mut rs.stream).unwrap();
        assert_eq!(&cookie[..], &[0xaa, 0xbb, 0xcc, 0xdd]);

        let pakt = rs.chunks.find_read_chunk_by_marker(*b"pakt").copied().unwrap();
        assert_eq!(pakt.len, 8);
    }

    #[test]
    fn peak_chunk_uses_wide_positions() {
        let format = FormatId::new(CONTAINER_CAF, CODEC_FLOAT, Endian::Little);
        let mut fs = FileState::new(OpenMode::Write, Bstream::from_vec(Vec::new()), format);
        fs.sample_rate = 48000;
        fs.channels = 1;

        let mut peak = PeakInfo::new(1);
        peak.channels[0] = ChannelPeak { value: 0.5, position: 0x1_0000_0001 };
        fs.peak = Some(peak);

        let mut container = CafContainer::open_write(&mut fs).unwrap();
        container.write_header(&mut fs, false).unwrap();
        fs.stream.seek(SeekFrom::Start(fs.data_offset)).unwrap();
        fs.stream.write_buf(&[0u8; 8]).unwrap();
        container.close(&mut fs).unwrap();

        let mut stream = fs.stream;
        let len = stream.byte_len().unwrap() as usize;
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut data = vec![0u8; len];
        stream.read_buf_exact(&mut data).unwrap();

        let mut rs = read_state(data);
        let _ = CafContainer::open_read(&mut rs).unwrap();

        let read = rs.peak.as_ref().unwrap();
        assert_eq!(read.channels[0].value, 0.5);
        assert_eq!(read.channels[0].position, 0x1_0000_0001);
    }
}
