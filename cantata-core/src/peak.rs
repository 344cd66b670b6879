// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `peak` module tracks the per-channel absolute maximum of everything written
//! through a handle, along with the frame position at which it occurred, so the
//! container can persist a PEAK chunk.

/// The PEAK chunk version field. Always 1.
pub const PEAK_CHUNK_VERSION: u32 = 1;

/// Whether the PEAK chunk lives before or after the audio data in the container.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum PeakLocation {
    #[default]
    Start,
    End,
}

/// The running maximum for one channel.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ChannelPeak {
    /// Largest absolute sample value seen, in the normalised domain.
    pub value: f32,
    /// Frame position of that sample.
    pub position: u64,
}

/// Per-channel peak state for one handle.
#[derive(Clone, Debug, Default)]
pub struct PeakInfo {
    pub location: PeakLocation,
    /// Timestamp word for WAV/AIFF, edit count for CAF.
    pub timestamp: u32,
    pub channels: Vec<ChannelPeak>,
}

impl PeakInfo {
    pub fn new(channels: usize) -> Self {
        PeakInfo {
            location: PeakLocation::default(),
            timestamp: 0,
            channels: vec![ChannelPeak::default(); channels],
        }
    }

    /// Folds an interleaved, normalised buffer starting at `start_frame` into the
    /// running maxima.
    pub fn update(&mut self, samples: &[f64], start_frame: u64) {
        let n_channels = self.channels.len();
        if n_channels == 0 {
            return;
        }

        for (ch, peak) in self.channels.iter_mut().enumerate() {
            let mut best = f64::from(peak.value);
            let mut best_frame = None;

            for (frame, sample) in samples.iter().skip(ch).step_by(n_channels).enumerate() {
                let magnitude = sample.abs();
                if magnitude > best {
                    best = magnitude;
                    best_frame = Some(frame as u64);
                }
            }

            if let Some(frame) = best_frame {
                peak.value = best as f32;
                peak.position = start_frame + frame;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_per_channel_maxima_and_positions() {
        let mut peak = PeakInfo::new(2);

        peak.update(&[0.25, -0.5, 0.75, 0.1], 0);
        assert_eq!(peak.channels[0].value, 0.75);
        assert_eq!(peak.channels[0].position, 1);
        assert_eq!(peak.channels[1].value, 0.5);
        assert_eq!(peak.channels[1].position, 0);

        // A later, smaller buffer must not disturb the maxima.
        peak.update(&[0.1, 0.1, 0.1, 0.1], 2);
        assert_eq!(peak.channels[0].value, 0.75);

        // A later, larger sample moves both value and position.
        peak.update(&[-0.9, 0.2], 4);
        assert_eq!(peak.channels[0].value, 0.9);
        assert_eq!(peak.channels[0].position, 4);
    }
}
