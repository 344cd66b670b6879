// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsers and emitters for the AIFF/AIFC chunks: `COMM` with its 80-bit sample
//! rate and compression tags, `MARK`, `INST`, the string chunks, and the
//! big-endian PEAK layout.

use cantata_core::errors::{decode_error, unsupported_error, Result};
use cantata_core::format::{
    CodecId, Endian, CODEC_ALAW, CODEC_DOUBLE, CODEC_FLOAT, CODEC_IMA_ADPCM, CODEC_PCM_16,
    CODEC_PCM_24, CODEC_PCM_32, CODEC_PCM_S8, CODEC_PCM_U8, CODEC_ULAW,
};
use cantata_core::handle::FileState;
use cantata_core::io::{unpack_ext80, HeaderBuf};
use cantata_core::meta::{CuePoint, Instrument, InstrumentLoop, LoopMode, StringTag};
use cantata_core::peak::{ChannelPeak, PeakInfo, PeakLocation, PEAK_CHUNK_VERSION};

/// The AIFC format version timestamp, fixed since 1991.
pub(crate) const AIFC_VERSION: u32 = 0xa280_5140;

/// The outcome of parsing a `COMM` chunk.
pub(crate) struct ParsedComm {
    pub codec: CodecId,
    /// The byte order of the sample data, overriding the container default.
    pub endian: Endian,
    pub channels: u16,
    pub frames: u32,
    pub sample_rate: u32,
}

/// Parses a `COMM` chunk body: 18 bytes for AIFF, 22 or more with a compression
/// tag for AIFC.
pub(crate) fn parse_comm(fs: &mut FileState, data: &[u8]) -> Result<ParsedComm> {
    if data.len() < 18 {
        return decode_error("aiff: malformed COMM chunk");
    }

    let channels = u16::from_be_bytes([data[0], data[1]]);
    let frames = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
    let sample_size = u16::from_be_bytes([data[6], data[7]]);

    let mut rate_bytes = [0u8; 10];
    rate_bytes.copy_from_slice(&data[8..18]);
    let sample_rate = unpack_ext80(rate_bytes);

    if channels == 0 {
        return decode_error("aiff: COMM chunk reports zero channels");
    }
    if sample_rate <= 0.0 {
        fs.parse_log.log("COMM sample rate is zero or negative".to_string());
    }

    let mut parsed = ParsedComm {
        codec: CODEC_PCM_16,
        endian: Endian::Big,
        channels,
        frames,
        sample_rate: sample_rate as u32,
    };

    if data.len() < 22 {
        // Plain AIFF: big-endian PCM, width rounded up to the nearest byte.
        parsed.codec = match sample_size {
            1..=8 => CODEC_PCM_S8,
            9..=16 => CODEC_PCM_16,
            17..=24 => CODEC_PCM_24,
            25..=32 => CODEC_PCM_32,
            _ => return decode_error("aiff: sample size must be between 1 and 32 bits"),
        };
        return Ok(parsed);
    }

    let mut tag = [0u8; 4];
    tag.copy_from_slice(&data[18..22]);

    match &tag {
        b"NONE" | b"twos" => {
            parsed.codec = match sample_size {
                1..=8 => CODEC_PCM_S8,
                9..=16 => CODEC_PCM_16,
                17..=24 => CODEC_PCM_24,
                25..=32 => CODEC_PCM_32,
                _ => return decode_error("aifc: sample size must be between 1 and 32 bits"),
            };
        }
        b"sowt" => {
            parsed.codec = match sample_size {
                1..=8 => CODEC_PCM_S8,
                9..=16 => CODEC_PCM_16,
                17..=24 => CODEC_PCM_24,
                25..=32 => CODEC_PCM_32,
                _ => return decode_error("aifc: sample size must be between 1 and 32 bits"),
            };
            parsed.endian = Endian::Little;
        }
        b"raw " => {
            parsed.codec = CODEC_PCM_U8;
        }
        b"in24" => {
            parsed.codec = CODEC_PCM_24;
        }
        b"ni24" => {
            parsed.codec = CODEC_PCM_24;
            parsed.endian = Endian::Little;
        }
        b"in32" => {
            parsed.codec = CODEC_PCM_32;
        }
        b"23ni" => {
            parsed.codec = CODEC_PCM_32;
            parsed.endian = Endian::Little;
        }
        b"fl32" | b"FL32" => {
            parsed.codec = CODEC_FLOAT;
        }
        b"fl64" | b"FL64" => {
            parsed.codec = CODEC_DOUBLE;
        }
        b"ulaw" | b"ULAW" => {
            parsed.codec = CODEC_ULAW;
        }
        b"alaw" | b"ALAW" => {
            parsed.codec = CODEC_ALAW;
        }
        b"ima4" => {
            parsed.codec = CODEC_IMA_ADPCM;
        }
        b"DWVW" | b"GSM " | b"MAC3" | b"MAC6" => {
            return unsupported_error("aifc: compression type is not supported");
        }
        _ => return unsupported_error("aifc: unknown compression type"),
    }

    Ok(parsed)
}

/// The compression tag and descriptive name an AIFC `COMM` chunk carries for a
/// codec, or `None` when the plain 18-byte AIFF form suffices.
pub(crate) fn aifc_tag(fs: &FileState) -> Option<([u8; 4], &'static str)> {
    let little = !fs.big_endian;

    match fs.codec() {
        CODEC_PCM_16 | CODEC_PCM_24 | CODEC_PCM_32 if little => {
            Some((*b"sowt", "little endian PCM"))
        }
        CODEC_PCM_S8 | CODEC_PCM_16 | CODEC_PCM_24 | CODEC_PCM_32 => None,
        CODEC_PCM_U8 => Some((*b"raw ", "unsigned 8 bit PCM")),
        CODEC_FLOAT => Some((*b"fl32", "32 bit IEEE floating point")),
        CODEC_DOUBLE => Some((*b"fl64", "64 bit IEEE floating point")),
        CODEC_ULAW => Some((*b"ulaw", "ITU G.711 u-law")),
        CODEC_ALAW => Some((*b"alaw", "ITU G.711 a-law")),
        CODEC_IMA_ADPCM => Some((*b"ima4", "IMA 4:1 compression")),
        _ => None,
    }
}

/// The on-disk bit width declared in `COMM` for the handle's codec.
pub(crate) fn comm_sample_size(fs: &FileState) -> u16 {
    match fs.codec() {
        CODEC_PCM_S8 | CODEC_PCM_U8 => 8,
        CODEC_PCM_16 | CODEC_IMA_ADPCM => 16,
        CODEC_PCM_24 => 24,
        CODEC_PCM_32 | CODEC_FLOAT => 32,
        CODEC_DOUBLE => 64,
        CODEC_ULAW | CODEC_ALAW => 16,
        _ => 16,
    }
}

/// Emits a `COMM` chunk, in the AIFC form when the codec needs a tag.
pub(crate) fn emit_comm(fs: &FileState, hb: &mut HeaderBuf) {
    let frames = fs.frames.min(u64::from(u32::MAX)) as u32;

    match aifc_tag(fs) {
        None => {
            hb.put_marker(*b"COMM");
            hb.put_u32(18);
            hb.put_u16(fs.channels as u16);
            hb.put_u32(frames);
            hb.put_u16(comm_sample_size(fs));
            hb.put_ext80(f64::from(fs.sample_rate));
        }
        Some((tag, name)) => {
            let name_len = 1 + name.len() + (1 + name.len()) % 2;
            hb.put_marker(*b"COMM");
            hb.put_u32((22 + name_len) as u32);
            hb.put_u16(fs.channels as u16);
            hb.put_u32(frames);
            hb.put_u16(comm_sample_size(fs));
            hb.put_ext80(f64::from(fs.sample_rate));
            hb.put_marker(tag);
            hb.put_pstr(name);
        }
    }
}

/// Parses a `MARK` chunk into cue points.
pub(crate) fn parse_mark(fs: &mut FileState, data: &[u8]) -> Result<()> {
    if data.len() < 2 {
        return decode_error("aiff: malformed MARK chunk");
    }

    let count = u16::from_be_bytes([data[0], data[1]]) as usize;
    let mut at = 2;
    let mut cues = Vec::with_capacity(count);

    for _ in 0..count {
        if at + 7 > data.len() {
            fs.parse_log.log("MARK chunk ends mid-marker".to_string());
            break;
        }

        let id = u16::from_be_bytes([data[at], data[at + 1]]);
        let position =
            u32::from_be_bytes([data[at + 2], data[at + 3], data[at + 4], data[at + 5]]);

        let name_len = data[at + 6] as usize;
        let name_at = at + 7;
        let name = if name_at + name_len <= data.len() {
            String::from_utf8_lossy(&data[name_at..name_at + name_len]).into_owned()
        }
        else {
            String::new()
        };

        // Pascal strings are padded so the id+position+name record is even.
        let mut record = 6 + 1 + name_len;
        if record & 1 == 1 {
            record += 1;
        }
        at += record;

        cues.push(CuePoint { id: u32::from(id), position: u64::from(position), name });
    }

    fs.cues = cues;
    Ok(())
}

/// Emits a `MARK` chunk from the cue list.
pub(crate) fn emit_mark(fs: &FileState, hb: &mut HeaderBuf) {
    let mut body = 2;
    for cue in &fs.cues {
        let name_len = cue.name.len().min(u8::MAX as usize);
        body += 6 + 1 + name_len + (1 + name_len) % 2;
    }

    hb.put_marker(*b"MARK");
    hb.put_u32(body as u32);
    hb.put_u16(fs.cues.len() as u16);

    for cue in &fs.cues {
        hb.put_u16(cue.id.min(u32::from(u16::MAX)) as u16);
        hb.put_u32(cue.position.min(u64::from(u32::MAX)) as u32);
        hb.put_pstr(&cue.name);
    }
}

/// The loop marker ids referenced by an `INST` chunk: (sustain begin, sustain
/// end, release begin, release end).
pub(crate) struct InstMarkers {
    pub instrument: Instrument,
    pub sustain: (LoopMode, u16, u16),
    pub release: (LoopMode, u16, u16),
}

fn loop_mode(value: u16) -> LoopMode {
    match value {
        1 => LoopMode::Forward,
        2 => LoopMode::Alternating,
        _ => LoopMode::None,
    }
}

/// Parses a 20-byte `INST` chunk. Loop begin/end are marker ids; the caller
/// resolves them against the `MARK` list.
pub(crate) fn parse_inst(data: &[u8]) -> Result<InstMarkers> {
    if data.len() < 20 {
        return decode_error("aiff: malformed INST chunk");
    }

    let instrument = Instrument {
        basenote: data[0],
        detune: data[1] as i8,
        key_lo: data[2],
        key_hi: data[3],
        velocity_lo: data[4],
        velocity_hi: data[5],
        gain: i32::from(i16::from_be_bytes([data[6], data[7]])),
        loops: Vec::new(),
    };

    let sustain = (
        loop_mode(u16::from_be_bytes([data[8], data[9]])),
        u16::from_be_bytes([data[10], data[11]]),
        u16::from_be_bytes([data[12], data[13]]),
    );
    let release = (
        loop_mode(u16::from_be_bytes([data[14], data[15]])),
        u16::from_be_bytes([data[16], data[17]]),
        u16::from_be_bytes([data[18], data[19]]),
    );

    Ok(InstMarkers { instrument, sustain, release })
}

/// Resolves the loop marker ids against the cue list, fills the instrument's
/// loops, and prunes the cue entries that only existed to carry loop points.
///
/// The pruning only happens when both `INST` and `MARK` were present, and is
/// positional: the first `2 * loops` cue entries are dropped wholesale, whatever
/// their ids, matching the long-standing reader behaviour. Writers put the loop
/// markers at the head of `MARK` for the same reason.
pub(crate) fn resolve_inst(fs: &mut FileState, markers: InstMarkers, have_mark: bool) {
    let mut instrument = markers.instrument;

    let find = |fs: &FileState, id: u16| {
        fs.cues.iter().find(|c| c.id == u32::from(id)).map(|c| c.position)
    };

    for (mode, begin, end) in [markers.sustain, markers.release] {
        if mode == LoopMode::None {
            continue;
        }

        if let (Some(start), Some(stop)) = (find(fs, begin), find(fs, end)) {
            instrument.loops.push(InstrumentLoop {
                mode,
                start: start.min(u64::from(u32::MAX)) as u32,
                end: stop.min(u64::from(u32::MAX)) as u32,
                count: 0,
            });
        }
    }

    if have_mark {
        let drop = (instrument.loops.len() * 2).min(fs.cues.len());
        fs.cues.drain(..drop);
    }

    fs.instrument = Some(instrument);
}

/// Emits an `INST` chunk plus the `MARK` entries carrying its loop points. The
/// marker ids continue after the caller's own cues.
pub(crate) fn emit_inst(fs: &FileState, hb: &mut HeaderBuf, loop_cues: &[CuePoint]) {
    let instrument = match fs.instrument.as_ref() {
        Some(instrument) => instrument,
        None => return,
    };

    let mode_value = |mode: LoopMode| match mode {
        LoopMode::Forward => 1u16,
        LoopMode::Alternating => 2,
        _ => 0,
    };

    hb.put_marker(*b"INST");
    hb.put_u32(20);
    hb.put_u8(instrument.basenote);
    hb.put_u8(instrument.detune as u8);
    hb.put_u8(instrument.key_lo);
    hb.put_u8(instrument.key_hi);
    hb.put_u8(instrument.velocity_lo);
    hb.put_u8(instrument.velocity_hi);
    hb.put_u16(instrument.gain.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as u16);

    // Loop records reference the marker ids emitted alongside.
    let mut next = 0;
    for index in 0..2 {
        match instrument.loops.get(index) {
            Some(lp) if loop_cues.len() >= next + 2 => {
                hb.put_u16(mode_value(lp.mode));
                hb.put_u16(loop_cues[next].id as u16);
                hb.put_u16(loop_cues[next + 1].id as u16);
                next += 2;
            }
            _ => {
                hb.put_u16(0);
                hb.put_u16(0);
                hb.put_u16(0);
            }
        }
    }
}

/// Builds the synthetic cue points that carry the instrument's loop positions.
pub(crate) fn inst_loop_cues(fs: &FileState) -> Vec<CuePoint> {
    let instrument = match fs.instrument.as_ref() {
        Some(instrument) => instrument,
        None => return Vec::new(),
    };

    let mut base = fs.cues.iter().map(|c| c.id).max().unwrap_or(0) as u16;
    let mut cues = Vec::new();

    for lp in instrument.loops.iter().take(2) {
        base += 1;
        cues.push(CuePoint {
            id: u32::from(base),
            position: u64::from(lp.start),
            name: "beg loop".to_string(),
        });
        base += 1;
        cues.push(CuePoint {
            id: u32::from(base),
            position: u64::from(lp.end),
            name: "end loop".to_string(),
        });
    }

    cues
}

const STRING_CHUNKS: [([u8; 4], StringTag); 4] = [
    (*b"NAME", StringTag::Title),
    (*b"AUTH", StringTag::Artist),
    (*b"(c) ", StringTag::Copyright),
    (*b"ANNO", StringTag::Comment),
];

/// Maps an AIFF string chunk marker to its string-table slot.
pub(crate) fn string_tag_for(marker: [u8; 4]) -> Option<StringTag> {
    STRING_CHUNKS.iter().find(|(m, _)| *m == marker).map(|(_, tag)| *tag)
}

/// Emits the string chunks present in the table.
pub(crate) fn emit_strings(fs: &FileState, hb: &mut HeaderBuf) {
    for (marker, tag) in STRING_CHUNKS.iter() {
        if let Some(text) = fs.strings.get(*tag) {
            let bytes = text.as_bytes();
            hb.put_marker(*marker);
            hb.put_u32(bytes.len() as u32);
            hb.put_bytes(bytes);
            if bytes.len() & 1 == 1 {
                hb.put_u8(0);
            }
        }
    }
}

/// Parses the big-endian PEAK layout.
pub(crate) fn parse_peak(fs: &mut FileState, data: &[u8], after_data: bool) -> Result<()> {
    let channels = fs.channels as usize;

    if data.len() != 8 + channels * 8 {
        return decode_error("aiff: PEAK chunk size does not match the channel count");
    }

    let u32_at = |at: usize| {
        u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
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

/// Emits the big-endian PEAK layout.
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
