// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `meta` module defines the fixed-shape metadata records callers read and write
//! through the command interface: channel positions, cue points, the instrument
//! record, and the string table.

use bitflags::bitflags;

bitflags! {
    /// The channel assignment bitmask used by WAVEX's extensible format chunk. Bit
    /// positions follow the channel-mask layout of the Windows multimedia headers.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct Channels: u32 {
        const FRONT_LEFT         = 0x0000_0001;
        const FRONT_RIGHT        = 0x0000_0002;
        const FRONT_CENTRE       = 0x0000_0004;
        const LFE1               = 0x0000_0008;
        const REAR_LEFT          = 0x0000_0010;
        const REAR_RIGHT         = 0x0000_0020;
        const FRONT_LEFT_CENTRE  = 0x0000_0040;
        const FRONT_RIGHT_CENTRE = 0x0000_0080;
        const REAR_CENTRE        = 0x0000_0100;
        const SIDE_LEFT          = 0x0000_0200;
        const SIDE_RIGHT         = 0x0000_0400;
        const TOP_CENTRE         = 0x0000_0800;
        const TOP_FRONT_LEFT     = 0x0000_1000;
        const TOP_FRONT_CENTRE   = 0x0000_2000;
        const TOP_FRONT_RIGHT    = 0x0000_4000;
        const TOP_REAR_LEFT      = 0x0000_8000;
        const TOP_REAR_CENTRE    = 0x0001_0000;
        const TOP_REAR_RIGHT     = 0x0002_0000;
    }
}

impl Channels {
    pub fn count(&self) -> u32 {
        self.bits().count_ones()
    }

    /// A best-effort default mask for a plain channel count: the lowest `count`
    /// positions set.
    pub fn from_count(count: u32) -> Option<Channels> {
        if count == 0 || count > 18 {
            return None;
        }
        Channels::from_bits((1u32 << count) - 1)
    }
}

/// A speaker or ambisonic component assignment for one interleaved channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelPosition {
    Invalid,
    Mono,
    Left,
    Right,
    Centre,
    FrontLeft,
    FrontRight,
    FrontCentre,
    RearCentre,
    RearLeft,
    RearRight,
    Lfe,
    FrontLeftOfCentre,
    FrontRightOfCentre,
    SideLeft,
    SideRight,
    TopCentre,
    TopFrontLeft,
    TopFrontRight,
    TopFrontCentre,
    TopRearLeft,
    TopRearRight,
    TopRearCentre,
    AmbisonicW,
    AmbisonicX,
    AmbisonicY,
    AmbisonicZ,
}

impl ChannelPosition {
    /// The WAVEX mask bit for this position, if it has one.
    pub fn mask_bit(&self) -> Option<Channels> {
        match *self {
            ChannelPosition::Mono | ChannelPosition::FrontCentre | ChannelPosition::Centre => {
                Some(Channels::FRONT_CENTRE)
            }
            ChannelPosition::Left | ChannelPosition::FrontLeft => Some(Channels::FRONT_LEFT),
            ChannelPosition::Right | ChannelPosition::FrontRight => Some(Channels::FRONT_RIGHT),
            ChannelPosition::RearCentre => Some(Channels::REAR_CENTRE),
            ChannelPosition::RearLeft => Some(Channels::REAR_LEFT),
            ChannelPosition::RearRight => Some(Channels::REAR_RIGHT),
            ChannelPosition::Lfe => Some(Channels::LFE1),
            ChannelPosition::FrontLeftOfCentre => Some(Channels::FRONT_LEFT_CENTRE),
            ChannelPosition::FrontRightOfCentre => Some(Channels::FRONT_RIGHT_CENTRE),
            ChannelPosition::SideLeft => Some(Channels::SIDE_LEFT),
            ChannelPosition::SideRight => Some(Channels::SIDE_RIGHT),
            ChannelPosition::TopCentre => Some(Channels::TOP_CENTRE),
            ChannelPosition::TopFrontLeft => Some(Channels::TOP_FRONT_LEFT),
            ChannelPosition::TopFrontRight => Some(Channels::TOP_FRONT_RIGHT),
            ChannelPosition::TopFrontCentre => Some(Channels::TOP_FRONT_CENTRE),
            ChannelPosition::TopRearLeft => Some(Channels::TOP_REAR_LEFT),
            ChannelPosition::TopRearRight => Some(Channels::TOP_REAR_RIGHT),
            ChannelPosition::TopRearCentre => Some(Channels::TOP_REAR_CENTRE),
            _ => None,
        }
    }

    /// Maps a mask bit back to a position, used when reading a WAVEX channel mask.
    pub fn from_mask_bit(bit: Channels) -> ChannelPosition {
        match bit {
            Channels::FRONT_LEFT => ChannelPosition::FrontLeft,
            Channels::FRONT_RIGHT => ChannelPosition::FrontRight,
            Channels::FRONT_CENTRE => ChannelPosition::FrontCentre,
            Channels::LFE1 => ChannelPosition::Lfe,
            Channels::REAR_LEFT => ChannelPosition::RearLeft,
            Channels::REAR_RIGHT => ChannelPosition::RearRight,
            Channels::FRONT_LEFT_CENTRE => ChannelPosition::FrontLeftOfCentre,
            Channels::FRONT_RIGHT_CENTRE => ChannelPosition::FrontRightOfCentre,
            Channels::REAR_CENTRE => ChannelPosition::RearCentre,
            Channels::SIDE_LEFT => ChannelPosition::SideLeft,
            Channels::SIDE_RIGHT => ChannelPosition::SideRight,
            Channels::TOP_CENTRE => ChannelPosition::TopCentre,
            Channels::TOP_FRONT_LEFT => ChannelPosition::TopFrontLeft,
            Channels::TOP_FRONT_CENTRE => ChannelPosition::TopFrontCentre,
            Channels::TOP_FRONT_RIGHT => ChannelPosition::TopFrontRight,
            Channels::TOP_REAR_LEFT => ChannelPosition::TopRearLeft,
            Channels::TOP_REAR_CENTRE => ChannelPosition::TopRearCentre,
            Channels::TOP_REAR_RIGHT => ChannelPosition::TopRearRight,
            _ => ChannelPosition::Invalid,
        }
    }
}

/// Expands a channel mask into per-channel positions in bit order.
pub fn positions_from_mask(mask: Channels) -> Vec<ChannelPosition> {
    let mut positions = Vec::with_capacity(mask.count() as usize);

    for bit in 0..32 {
        if let Some(flag) = Channels::from_bits(1u32 << bit) {
            if mask.contains(flag) {
                positions.push(ChannelPosition::from_mask_bit(flag));
            }
        }
    }

    positions
}

/// Folds per-channel positions back into a channel mask. Returns `None` when a
/// position has no mask representation or the mask would assign one bit twice.
pub fn mask_from_positions(positions: &[ChannelPosition]) -> Option<Channels> {
    let mut mask = Channels::empty();

    for position in positions {
        let bit = position.mask_bit()?;
        if mask.contains(bit) {
            return None;
        }
        mask |= bit;
    }

    Some(mask)
}

/// A marker within the audio data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CuePoint {
    pub id: u32,
    /// Frame position of the marker.
    pub position: u64,
    pub name: String,
}

/// Loop playback mode for an instrument loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    None,
    Forward,
    Backward,
    Alternating,
}

/// One sustain or release loop within an instrument record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InstrumentLoop {
    pub mode: LoopMode,
    pub start: u32,
    pub end: u32,
    pub count: u32,
}

/// Sampler playback parameters, as stored in WAV `smpl`/AIFF `INST` chunks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Instrument {
    pub gain: i32,
    pub basenote: u8,
    pub detune: i8,
    pub velocity_lo: u8,
    pub velocity_hi: u8,
    pub key_lo: u8,
    pub key_hi: u8,
    pub loops: Vec<InstrumentLoop>,
}

/// The string-table slots a container can persist.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StringTag {
    Title,
    Artist,
    Copyright,
    Comment,
    Software,
    Date,
}

/// Free-text metadata attached to a handle, written into container-appropriate
/// chunks on close and populated from them on open.
#[derive(Clone, Debug, Default)]
pub struct StringTable {
    entries: Vec<(StringTag, String)>,
}

impl StringTable {
    pub fn set(&mut self, tag: StringTag, value: &str) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((tag, value.to_string())),
        }
    }

    pub fn get(&self, tag: StringTag) -> Option<&str> {
        self.entries.iter().find(|(t, _)| *t == tag).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringTag, &str)> {
        self.entries.iter().map(|(t, v)| (*t, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
