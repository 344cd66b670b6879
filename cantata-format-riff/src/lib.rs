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

//! RIFF-family container drivers: WAV/WAVEX in the `RIFF` and `RIFX` forms, RF64,
//! W64, and AIFF/AIFC.

mod common;

mod aiff;
mod rf64;
mod w64;
mod wave;

pub use aiff::AiffContainer;
pub use rf64::Rf64Container;
pub use w64::W64Container;
pub use wave::WavContainer;
