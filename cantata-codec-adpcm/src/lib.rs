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

//! Block ADPCM codec drivers: IMA ADPCM in its WAV and AIFF-C (`ima4`) flavours,
//! Microsoft ADPCM, and OKI/Dialogic VOX ADPCM.
//!
//! Writers emit exactly one block per `block_align` bytes and hold partial blocks
//! in the driver until the codec closer flushes them. Readers treat short I/O as
//! end of stream and decode whatever whole codes remain.

mod common;
mod ima;
mod ms;
mod vox;

pub use ima::{ImaAiff, ImaWav};
pub use ms::MsAdpcm;
pub use vox::VoxAdpcm;
