// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsers and emitters for the chunks the WAV family shares: the format chunk in
//! its plain and extensible forms, `fact`, PEAK, `cue `, `smpl`, and the
//! LIST/INFO string table. RF64 and W64 reuse everything here.

use cantata_core::errors::{decode_error, unsupported_error, Result};
use cantata_core::format::{
    CodecId, CODEC_ALAW, CODEC_DOUBLE, CODEC_FLOAT, CODEC_IMA_ADPCM, CODEC_MS_ADPCM, CODEC_PCM_16,
    CODEC_PCM_24, CODEC_PCM_32, CODEC_PCM_U8, CODEC_ULAW,
};
use cantata_core::handle::{AmbisonicMode, CodecParams, FileState};
use cantata_core::io::HeaderBuf;
use cantata_core::meta::{
    positions_from_mask, Channels, CuePoint, Instrument, InstrumentLoop, LoopMode, StringTag,
};
use cantata_core::peak::{ChannelPeak, PeakInfo, PeakLocation, PEAK_CHUNK_VERSION};

// The format identifiers, as defined in mmreg.h of the Microsoft Windows
// Platform SDK.
pub(crate) const WAVE_FORMAT_PCM: u16 = 0x0001;
pub(crate) const WAVE_FORMAT_MS_ADPCM: u16 = 0x0002;
pub(crate) const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub(crate) const WAVE_FORMAT_ALAW: u16 = 0x0006;
pub(crate) const WAVE_FORMAT_MULAW: u16 = 0x0007;
pub(crate) const WAVE_FORMAT_IMA_ADPCM: u16 = 0x0011;
pub(crate) const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

// Sub-format GUIDs from ksmedia.h, plus the ambisonic B-format pair.
#[rustfmt::skip]
pub(crate) const GUID_PCM: [u8; 16] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00,
    0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];
#[rustfmt::skip]
pub(crate) const GUID_IEEE_FLOAT: [u8; 16] = [
    0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00,
    0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];
#[rustfmt::skip]
pub(crate) const GUID_MULAW: [u8; 16] = [
    0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00,
    0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];
#[rustfmt::skip]
pub(crate) const GUID_ALAW: [u8; 16] = [
    0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00,
    0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];
#[rustfmt::skip]
pub(crate) const GUID_AMBISONIC_B_PCM: [u8; 16] = [
    0x01, 0x00, 0x00, 0x00, 0x21, 0x07, 0xd3, 0x11,
    0x86, 0x44, 0xc8, 0xc1, 0xca, 0x00, 0x00, 0x00,
];
#[rustfmt::skip]
pub(crate) const GUID_AMBISONIC_B_IEEE_FLOAT: [u8; 16] = [
    0x03, 0x00, 0x00, 0x00, 0x21, 0x07, 0xd3, 0x11,
    0x86, 0x44, 0xc8, 0xc1, 0xca, 0x00, 0x00, 0x00,
];

/// The fields a parsed format chunk contributes to the handle.
pub(crate) struct ParsedFmt {
    pub codec: CodecId,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub frames_per_block: u32,
    pub channel_mask: Option<Channels>,
    pub ambisonic: AmbisonicMode,
}

/// Parses a `fmt ` chunk from its byte image. The field byte order follows the
/// container form (`RIFF` little, `RIFX` big).
pub(crate) fn parse_fmt(fs: &mut FileState, data: &[u8], big_endian: bool) -> Result<ParsedFmt> {
    if data.len() < 16 {
        return decode_error("wav: malformed fmt chunk");
    }

    let u16_at = |at: usize| {
        let raw = [data[at], data[at + 1]];
        if big_endian {
            u16::from_be_bytes(raw)
        }
        else {
            u16::from_le_bytes(raw)
        }
    };
    let u32_at = |at: usize| {
        let raw = [data[at], data[at + 1], data[at + 2], data[at + 3]];
        if big_endian {
            u32::from_be_bytes(raw)
        }
        else {
            u32::from_le_bytes(raw)
        }
    };

    let format = u16_at(0);
    let n_channels = u16_at(2);
    let sample_rate = u32_at(4);
    let _avg_bytes_per_sec = u32_at(8);
    let block_align = u16_at(12);
    let bits_per_sample = u16_at(14);

    if n_channels == 0 {
        return decode_error("wav: fmt chunk reports zero channels");
    }

    let mut parsed = ParsedFmt {
        codec: CODEC_PCM_16,
        channels: n_channels,
        sample_rate,
        block_align,
        frames_per_block: 0,
        channel_mask: None,
        ambisonic: AmbisonicMode::None,
    };

    match format {
        WAVE_FORMAT_PCM => {
            parsed.codec = match bits_per_sample {
                8 => CODEC_PCM_U8,
                16 => CODEC_PCM_16,
                24 => CODEC_PCM_24,
                32 => CODEC_PCM_32,
                _ => {
                    return decode_error("wav: bits per sample for fmt_pcm must be 8, 16, 24 or 32")
                }
            };
        }
        WAVE_FORMAT_IEEE_FLOAT => {
            parsed.codec = match bits_per_sample {
                32 => CODEC_FLOAT,
                64 => CODEC_DOUBLE,
                _ => return decode_error("wav: bits per sample for fmt_ieee must be 32 or 64"),
            };
        }
        WAVE_FORMAT_ALAW => parsed.codec = CODEC_ALAW,
        WAVE_FORMAT_MULAW => parsed.codec = CODEC_ULAW,
        WAVE_FORMAT_IMA_ADPCM | WAVE_FORMAT_MS_ADPCM => {
            if bits_per_sample != 4 {
                return decode_error("wav: bits per sample for fmt_adpcm must be 4");
            }
            if data.len() < 20 {
                return decode_error("wav: malformed fmt_adpcm chunk");
            }

            parsed.codec = if format == WAVE_FORMAT_IMA_ADPCM {
                CODEC_IMA_ADPCM
            }
            else {
                CODEC_MS_ADPCM
            };
            parsed.frames_per_block = u32::from(u16_at(18));
        }
        WAVE_FORMAT_EXTENSIBLE => {
            // The extensible form carries a 22-byte extension: valid bits, the
            // channel mask, and a sub-format GUID whose first bytes designate the
            // codec.
            if data.len() < 40 {
                return decode_error("wav: malformed fmt_ext chunk");
            }

            let extra_size = u16_at(16);
            if extra_size != 22 {
                return decode_error("wav: extra data size not 22 bytes for fmt_ext chunk");
            }

            let valid_bits = u16_at(18);
            if valid_bits > bits_per_sample {
                return decode_error("wav: bits per sample must be <= coded width for fmt_ext");
            }

            let mask_bits = u32_at(20);
            parsed.channel_mask = Channels::from_bits(mask_bits);
            if parsed.channel_mask.is_none() {
                fs.parse_log.log(format!("unrepresentable channel mask 0x{:08x}", mask_bits));
            }

            let mut guid = [0u8; 16];
            guid.copy_from_slice(&data[24..40]);

            parsed.codec = match guid {
                GUID_PCM | GUID_AMBISONIC_B_PCM => match bits_per_sample {
                    8 => CODEC_PCM_U8,
                    16 => CODEC_PCM_16,
                    24 => CODEC_PCM_24,
                    32 => CODEC_PCM_32,
                    _ => return decode_error("wav: bad coded width for fmt_ext PCM sub-type"),
                },
                GUID_IEEE_FLOAT | GUID_AMBISONIC_B_IEEE_FLOAT => match bits_per_sample {
                    32 => CODEC_FLOAT,
                    64 => CODEC_DOUBLE,
                    _ => return decode_error("wav: bad coded width for fmt_ext IEEE sub-type"),
                },
                GUID_ALAW => CODEC_ALAW,
                GUID_MULAW => CODEC_ULAW,
                _ => return unsupported_error("wav: unsupported fmt_ext sub-type"),
            };

            if guid == GUID_AMBISONIC_B_PCM || guid == GUID_AMBISONIC_B_IEEE_FLOAT {
                parsed.ambisonic = AmbisonicMode::BFormat;
            }
        }
        _ => return unsupported_error("wav: unsupported wave format"),
    }

    Ok(parsed)
}

/// Applies a parsed format chunk to the handle state.
pub(crate) fn apply_fmt(fs: &mut FileState, parsed: &ParsedFmt) {
    fs.channels = u32::from(parsed.channels);
    fs.sample_rate = parsed.sample_rate;
    fs.format = fs.format.with_codec(parsed.codec);
    fs.channel_mask = parsed.channel_mask;
    fs.ambisonic = parsed.ambisonic;

    if let Some(mask) = parsed.channel_mask {
        fs.channel_map = positions_from_mask(mask);
    }

    if parsed.codec.is_block_codec() {
        fs.codec_params = CodecParams {
            block_align: u32::from(parsed.block_align),
            frames_per_block: parsed.frames_per_block,
        };
    }
}

/// How the format chunk should be emitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FmtShape {
    Plain,
    Extensible,
}

/// The byte length of the format chunk body [`emit_fmt_body`] produces.
pub(crate) fn fmt_body_len(fs: &FileState, shape: FmtShape) -> u32 {
    if shape == FmtShape::Extensible {
        return 40;
    }

    match fs.codec() {
        CODEC_PCM_U8 | CODEC_PCM_16 | CODEC_PCM_24 | CODEC_PCM_32 => 16,
        CODEC_FLOAT | CODEC_DOUBLE | CODEC_ALAW | CODEC_ULAW => 18,
        CODEC_IMA_ADPCM => 20,
        CODEC_MS_ADPCM => 50,
        _ => 16,
    }
}

/// Emits a `fmt ` chunk (marker, size, and body) for the handle's codec.
pub(crate) fn emit_fmt(fs: &FileState, hb: &mut HeaderBuf, shape: FmtShape) -> Result<()> {
    hb.put_marker(*b"fmt ");
    hb.put_u32(fmt_body_len(fs, shape));
    emit_fmt_body(fs, hb, shape)
}

/// Emits the body of the format chunk, without marker or size framing, so the
/// GUID-framed containers can reuse it.
pub(crate) fn emit_fmt_body(fs: &FileState, hb: &mut HeaderBuf, shape: FmtShape) -> Result<()> {
    let codec = fs.codec();
    let channels = fs.channels;
    let rate = fs.sample_rate;

    let bits = match codec {
        CODEC_PCM_U8 | CODEC_ALAW | CODEC_ULAW => 8,
        CODEC_PCM_16 => 16,
        CODEC_PCM_24 => 24,
        CODEC_PCM_32 | CODEC_FLOAT => 32,
        CODEC_DOUBLE => 64,
        CODEC_IMA_ADPCM | CODEC_MS_ADPCM => 4,
        _ => return unsupported_error("wav: codec has no fmt representation"),
    };

    let (block_align, avg_bytes) = if codec.is_block_codec() {
        let align = fs.codec_params.block_align;
        let fpb = fs.codec_params.frames_per_block.max(1);
        (align, (u64::from(rate) * u64::from(align) / u64::from(fpb)) as u32)
    }
    else {
        let align = codec.byte_width() * channels;
        (align, rate * align)
    };

    if shape == FmtShape::Extensible {
        let guid = match (codec, fs.ambisonic) {
            (CODEC_FLOAT | CODEC_DOUBLE, AmbisonicMode::BFormat) => GUID_AMBISONIC_B_IEEE_FLOAT,
            (CODEC_FLOAT | CODEC_DOUBLE, AmbisonicMode::None) => GUID_IEEE_FLOAT,
            (CODEC_ALAW, _) => GUID_ALAW,
            (CODEC_ULAW, _) => GUID_MULAW,
            (_, AmbisonicMode::BFormat) => GUID_AMBISONIC_B_PCM,
            _ => GUID_PCM,
        };

        let mask = match fs.channel_mask {
            Some(mask) => mask,
            None => Channels::from_count(channels).unwrap_or(Channels::empty()),
        };

        hb.put_u16(WAVE_FORMAT_EXTENSIBLE);
        hb.put_u16(channels as u16);
        hb.put_u32(rate);
        hb.put_u32(avg_bytes);
        hb.put_u16(block_align as u16);
        hb.put_u16(bits);
        hb.put_u16(22);
        hb.put_u16(bits);
        hb.put_u32(mask.bits());
        hb.put_bytes(&guid);
        return Ok(());
    }

    match codec {
        CODEC_PCM_U8 | CODEC_PCM_16 | CODEC_PCM_24 | CODEC_PCM_32 => {
            hb.put_u16(WAVE_FORMAT_PCM);
            hb.put_u16(channels as u16);
            hb.put_u32(rate);
            hb.put_u32(avg_bytes);
            hb.put_u16(block_align as u16);
            hb.put_u16(bits);
        }
        CODEC_FLOAT | CODEC_DOUBLE => {
            hb.put_u16(WAVE_FORMAT_IEEE_FLOAT);
            hb.put_u16(channels as u16);
            hb.put_u32(rate);
            hb.put_u32(avg_bytes);
            hb.put_u16(block_align as u16);
            hb.put_u16(bits);
            hb.put_u16(0);
        }
        CODEC_ALAW | CODEC_ULAW => {
            let tag = if codec == CODEC_ALAW { WAVE_FORMAT_ALAW } else { WAVE_FORMAT_MULAW };
            hb.put_u16(tag);
            hb.put_u16(channels as u16);
            hb.put_u32(rate);
            hb.put_u32(avg_bytes);
            hb.put_u16(block_align as u16);
            hb.put_u16(bits);
            hb.put_u16(0);
        }
        CODEC_IMA_ADPCM => {
            hb.put_u16(WAVE_FORMAT_IMA_ADPCM);
            hb.put_u16(channels as u16);
            hb.put_u32(rate);
            hb.put_u32(avg_bytes);
            hb.put_u16(block_align as u16);
            hb.put_u16(bits);
            hb.put_u16(2);
            hb.put_u16(fs.codec_params.frames_per_block as u16);
        }
        CODEC_MS_ADPCM => {
            // cbSize 32: frames per block, coefficient count, then the seven
            // standard coefficient pairs.
            const COEF1: [i16; 7] = [256, 512, 0, 192, 240, 460, 392];
            const COEF2: [i16; 7] = [0, -256, 0, 64, 0, -208, -232];

            hb.put_u16(WAVE_FORMAT_MS_ADPCM);
            hb.put_u16(channels as u16);
            hb.put_u32(rate);
            hb.put_u32(avg_bytes);
            hb.put_u16(block_align as u16);
            hb.put_u16(bits);
            hb.put_u16(32);
            hb.put_u16(fs.codec_params.frames_per_block as u16);
            hb.put_u16(7);
            for (c1, c2) in COEF1.iter().zip(COEF2.iter()) {
                hb.put_u16(*c1 as u16);
                hb.put_u16(*c2 as u16);
            }
        }
        _ => return unsupported_error("wav: codec has no fmt representation"),
    }

    Ok(())
}

/// Emits a `fact` chunk. Required for every non-PCM codec.
pub(crate) fn emit_fact(fs: &FileState, hb: &mut HeaderBuf) {
    hb.put_marker(*b"fact");
    hb.put_u32(4);
    hb.put_u32(fs.frames.min(u64::from(u32::MAX)) as u32);
}

/// Parses the little-endian PEAK layout: version, timestamp, then per channel a
/// float value and a 32-bit frame position.
pub(crate) fn parse_peak(fs: &mut FileState, data: &[u8], after_data: bool) -> Result<()> {
    let channels = fs.channels as usize;

    if data.len() != 8 + channels * 8 {
        return decode_error("wav: PEAK chunk size does not match the channel count");
    }

    let u32_at = |at: usize| {
        u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    };

    let version = u32_at(0);
    if version != PEAK_CHUNK_VERSION {
        fs.parse_log.log(format!("unexpected PEAK chunk version {}", version));
    }

    let mut peak = PeakInfo::new(channels);
    peak.timestamp = u32_at(4);
    peak.location = if after_data { PeakLocation::End } else { PeakLocation::Start };

    for (ch, slot) in peak.channels.iter_mut().enumerate() {
        let at = 8 + ch * 8;
        *slot = ChannelPeak {
            value: f32::from_bits(u32_at(at)),
            position: u64::from(u32_at(at + 4)),
        };
    }

    fs.peak = Some(peak);
    Ok(())
}

/// Emits a PEAK chunk in the little-endian layout.
pub(crate) fn emit_peak(peak: &PeakInfo, hb: &mut HeaderBuf) {
    hb.put_marker(*b"PEAK");
    hb.put_u32(8 + peak.channels.len() as u32 * 8);
    hb.put_u32(PEAK_CHUNK_VERSION);
    hb.put_u32(peak.timestamp);

    for channel in &peak.channels {
        hb.put_f32(channel.value);
        hb.put_u32(channel.position.min(u64::from(u32::MAX)) as u32);
    }
}

/// Parses a `cue ` chunk.
pub(crate) fn parse_cue(fs: &mut FileState, data: &[u8]) -> Result<()> {
    if data.len() < 4 {
        return decode_error("wav: malformed cue chunk");
    }

    let u32_at = |at: usize| {
        u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    };

    let count = u32_at(0) as usize;
    if data.len() < 4 + count * 24 {
        return decode_error("wav: cue chunk shorter than its cue count");
    }

    let mut cues = Vec::with_capacity(count);
    for index in 0..count {
        let at = 4 + index * 24;
        cues.push(CuePoint {
            id: u32_at(at),
            position: u64::from(u32_at(at + 20)),
            name: String::new(),
        });
    }

    fs.cues = cues;
    Ok(())
}

/// Emits a `cue ` chunk.
pub(crate) fn emit_cue(fs: &FileState, hb: &mut HeaderBuf) {
    hb.put_marker(*b"cue ");
    hb.put_u32(4 + fs.cues.len() as u32 * 24);
    hb.put_u32(fs.cues.len() as u32);

    for cue in &fs.cues {
        hb.put_u32(cue.id);
        hb.put_u32(cue.position.min(u64::from(u32::MAX)) as u32);
        hb.put_marker(*b"data");
        hb.put_u32(0);
        hb.put_u32(0);
        hb.put_u32(cue.position.min(u64::from(u32::MAX)) as u32);
    }
}

/// Parses a `smpl` chunk into the instrument record.
pub(crate) fn parse_smpl(fs: &mut FileState, data: &[u8]) -> Result<()> {
    if data.len() < 36 {
        return decode_error("wav: malformed smpl chunk");
    }

    let u32_at = |at: usize| {
        u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    };

    let unity_note = u32_at(12);
    let loop_count = u32_at(28) as usize;

    if data.len() < 36 + loop_count * 24 {
        return decode_error("wav: smpl chunk shorter than its loop count");
    }

    let mut instrument = Instrument {
        basenote: unity_note.min(127) as u8,
        velocity_lo: 1,
        velocity_hi: 127,
        key_lo: 0,
        key_hi: 127,
        ..Instrument::default()
    };

    for index in 0..loop_count {
        let at = 36 + index * 24;
        instrument.loops.push(InstrumentLoop {
            mode: match u32_at(at + 4) {
                0 => LoopMode::Forward,
                1 => LoopMode::Alternating,
                2 => LoopMode::Backward,
                _ => LoopMode::None,
            },
            start: u32_at(at + 8),
            end: u32_at(at + 12),
            count: u32_at(at + 20),
        });
    }

    fs.instrument = Some(instrument);
    Ok(())
}

/// Emits a `smpl` chunk from the instrument record.
pub(crate) fn emit_smpl(fs: &FileState, hb: &mut HeaderBuf) {
    let instrument = match fs.instrument.as_ref() {
        Some(instrument) => instrument,
        None => return,
    };

    let loops = instrument.loops.len() as u32;

    hb.put_marker(*b"smpl");
    hb.put_u32(36 + loops * 24);
    hb.put_u32(0);
    hb.put_u32(0);
    // Sample period in nanoseconds.
    hb.put_u32(if fs.sample_rate > 0 { 1_000_000_000 / fs.sample_rate } else { 0 });
    hb.put_u32(u32::from(instrument.basenote));
    hb.put_u32(0);
    hb.put_u32(0);
    hb.put_u32(0);
    hb.put_u32(loops);
    hb.put_u32(0);

    for (index, lp) in instrument.loops.iter().enumerate() {
        hb.put_u32(index as u32);
        hb.put_u32(match lp.mode {
            LoopMode::Alternating => 1,
            LoopMode::Backward => 2,
            _ => 0,
        });
        hb.put_u32(lp.start);
        hb.put_u32(lp.end);
        hb.put_u32(0);
        hb.put_u32(lp.count);
    }
}

const INFO_TAGS: [([u8; 4], StringTag); 6] = [
    (*b"INAM", StringTag::Title),
    (*b"IART", StringTag::Artist),
    (*b"ICOP", StringTag::Copyright),
    (*b"ICMT", StringTag::Comment),
    (*b"ISFT", StringTag::Software),
    (*b"ICRD", StringTag::Date),
];

/// Parses a LIST/INFO payload into the string table.
pub(crate) fn parse_info_list(fs: &mut FileState, data: &[u8]) {
    if data.len() < 4 || &data[0..4] != b"INFO" {
        return;
    }

    let mut at = 4;
    while at + 8 <= data.len() {
        let mut marker = [0u8; 4];
        marker.copy_from_slice(&data[at..at + 4]);
        let len = u32::from_le_bytes([data[at + 4], data[at + 5], data[at + 6], data[at + 7]])
            as usize;

        at += 8;
        if at + len > data.len() {
            break;
        }

        if let Some((_, tag)) = INFO_TAGS.iter().find(|(m, _)| *m == marker) {
            let raw = &data[at..at + len];
            let text: String =
                String::from_utf8_lossy(raw).trim_end_matches('\0').to_string();
            fs.strings.set(*tag, &text);
        }

        at += len + (len & 1);
    }
}

/// Emits a LIST/INFO chunk from the string table. Nothing is emitted when the
/// table is empty.
pub(crate) fn emit_info_list(fs: &FileState, hb: &mut HeaderBuf) {
    if fs.strings.is_empty() {
        return;
    }

    let mut body = Vec::new();
    body.extend_from_slice(b"INFO");

    for (marker, tag) in INFO_TAGS.iter() {
        if let Some(text) = fs.strings.get(*tag) {
            // NUL terminated, padded to even length.
            let mut value = text.as_bytes().to_vec();
            value.push(0);
            if value.len() & 1 == 1 {
                value.push(0);
            }

            body.extend_from_slice(marker);
            body.extend_from_slice(&(value.len() as u32).to_le_bytes());
            body.extend_from_slice(&value);
        }
    }

    hb.put_marker(*b"LIST");
    hb.put_u32(body.len() as u32);
    hb.put_bytes(&body);
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::format::{Endian, FormatId, CONTAINER_WAV};
    use cantata_core::handle::OpenMode;
    use cantata_core::io::Bstream;

    fn empty_state() -> FileState {
        let format = FormatId::new(CONTAINER_WAV, CODEC_PCM_16, Endian::File);
        let mut fs = FileState::new(OpenMode::Read, Bstream::from_vec(Vec::new()), format);
        fs.channels = 2;
        fs
    }

    fn fmt_image(tag: u16, channels: u16, rate: u32, align: u16, bits: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&tag.to_le_bytes());
        data.extend_from_slice(&channels.to_le_bytes());
        data.extend_from_slice(&rate.to_le_bytes());
        data.extend_from_slice(&(rate * u32::from(align)).to_le_bytes());
        data.extend_from_slice(&align.to_le_bytes());
        data.extend_from_slice(&bits.to_le_bytes());
        data
    }

    #[test]
    fn parses_plain_pcm_fmt() {
        let mut fs = empty_state();
        let parsed = parse_fmt(&mut fs, &fmt_image(WAVE_FORMAT_PCM, 2, 44100, 4, 16), false).unwrap();

        assert_eq!(parsed.codec, CODEC_PCM_16);
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.sample_rate, 44100);
    }

    #[test]
    fn rejects_zero_channels() {
        let mut fs = empty_state();
        assert!(parse_fmt(&mut fs, &fmt_image(WAVE_FORMAT_PCM, 0, 44100, 4, 16), false).is_err());
    }

    #[test]
    fn parses_extensible_fmt_with_mask_and_guid() {
        let mut data = fmt_image(WAVE_FORMAT_EXTENSIBLE, 2, 48000, 8, 32);
        data.extend_from_slice(&22u16.to_le_bytes());
        data.extend_from_slice(&32u16.to_le_bytes());
        data.extend_from_slice(&0x3u32.to_le_bytes());
        data.extend_from_slice(&GUID_IEEE_FLOAT);

        let mut fs = empty_state();
        let parsed = parse_fmt(&mut fs, &data, false).unwrap();

        assert_eq!(parsed.codec, CODEC_FLOAT);
        assert_eq!(parsed.channel_mask, Some(Channels::FRONT_LEFT | Channels::FRONT_RIGHT));
        assert_eq!(parsed.ambisonic, AmbisonicMode::None);
    }

    #[test]
    fn ambisonic_guid_sets_the_mode() {
        let mut data = fmt_image(WAVE_FORMAT_EXTENSIBLE, 4, 48000, 8, 16);
        data.extend_from_slice(&22u16.to_le_bytes());
        data.extend_from_slice(&16u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&GUID_AMBISONIC_B_PCM);

        let mut fs = empty_state();
        let parsed = parse_fmt(&mut fs, &data, false).unwrap();

        assert_eq!(parsed.codec, CODEC_PCM_16);
        assert_eq!(parsed.ambisonic, AmbisonicMode::BFormat);
    }

    #[test]
    fn fmt_emit_parse_round_trip() {
        let mut fs = empty_state();
        fs.channels = 2;
        fs.sample_rate = 44100;

        let mut hb = HeaderBuf::new();
        emit_fmt(&fs, &mut hb, FmtShape::Plain).unwrap();

        // Skip the marker and size, parse the body.
        let image = hb.as_slice()[8..].to_vec();
        let parsed = parse_fmt(&mut fs, &image, false).unwrap();

        assert_eq!(parsed.codec, CODEC_PCM_16);
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.block_align, 4);
    }

    #[test]
    fn peak_round_trips() {
        let mut fs = empty_state();

        let mut peak = PeakInfo::new(2);
        peak.timestamp = 77;
        peak.channels[0] = ChannelPeak { value: 0.5, position: 12345 };
        peak.channels[1] = ChannelPeak { value: 0.25, position: 99 };

        let mut hb = HeaderBuf::new();
        emit_peak(&peak, &mut hb);

        parse_peak(&mut fs, &hb.as_slice()[8..], false).unwrap();

        let read = fs.peak.as_ref().unwrap();
        assert_eq!(read.channels[0].value, 0.5);
        assert_eq!(read.channels[0].position, 12345);
        assert_eq!(read.channels[1].value, 0.25);
        assert_eq!(read.location, PeakLocation::Start);
    }

    #[test]
    fn info_list_round_trips() {
        let mut fs = empty_state();
        fs.strings.set(StringTag::Title, "a tune");
        fs.strings.set(StringTag::Software, "cantata");

        let mut hb = HeaderBuf::new();
        emit_info_list(&fs, &mut hb);

        let mut back = empty_state();
        parse_info_list(&mut back, &hb.as_slice()[8..]);

        assert_eq!(back.strings.get(StringTag::Title), Some("a tune"));
        assert_eq!(back.strings.get(StringTag::Software), Some("cantata"));
    }

    #[test]
    fn cue_round_trips() {
        let mut fs = empty_state();
        fs.cues = vec![
            CuePoint { id: 1, position: 100, name: String::new() },
            CuePoint { id: 2, position: 2000, name: String::new() },
        ];

        let mut hb = HeaderBuf::new();
        emit_cue(&fs, &mut hb);

        let mut back = empty_state();
        parse_cue(&mut back, &hb.as_slice()[8..]).unwrap();

        assert_eq!(back.cues.len(), 2);
        assert_eq!(back.cues[1].position, 2000);
    }
}
