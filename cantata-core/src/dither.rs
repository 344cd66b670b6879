// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dither` module is the optional re-quantisation stage on the write path (and
//! its stub on the read path).
//!
//! Every selectable mode currently behaves as an identity pass-through: the stage
//! copies the caller's samples into its own buffer and hands that to the codec, so
//! the surface (install, select, remove) is stable while the noise shaping itself is
//! a placeholder.

/// The selectable dither algorithms.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum DitherMode {
    #[default]
    None,
    Rectangular,
    Triangular,
    Gaussian,
    WhiteNoise,
}

/// Dither configuration supplied by the caller.
#[derive(Copy, Clone, Debug, Default)]
pub struct DitherInfo {
    pub mode: DitherMode,
    /// Dither amplitude relative to one least-significant bit of the target width.
    pub level: f64,
}

/// An installed dither stage. Holds the configuration and the conversion buffer the
/// caller's samples are copied through.
#[derive(Clone, Debug, Default)]
pub struct DitherStage {
    pub info: DitherInfo,
}

impl DitherStage {
    pub fn new(info: DitherInfo) -> Self {
        DitherStage { info }
    }

    pub fn copy_i16(&self, samples: &[i16]) -> Vec<i16> {
        samples.to_vec()
    }

    pub fn copy_i32(&self, samples: &[i32]) -> Vec<i32> {
        samples.to_vec()
    }

    pub fn copy_f32(&self, samples: &[f32]) -> Vec<f32> {
        samples.to_vec()
    }

    pub fn copy_f64(&self, samples: &[f64]) -> Vec<f64> {
        samples.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_is_a_pass_through() {
        let samples: Vec<i16> = (-4..4).collect();

        for mode in [
            DitherMode::None,
            DitherMode::Rectangular,
            DitherMode::Triangular,
            DitherMode::Gaussian,
            DitherMode::WhiteNoise,
        ] {
            let stage = DitherStage::new(DitherInfo { mode, level: 1.0 });
            assert_eq!(stage.copy_i16(&samples), samples);
        }
    }
}
