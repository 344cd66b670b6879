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

//! `cantata-core` is the substrate of Project Cantata: the byte-stream and header
//! buffer, the chunk index, the format descriptor, the sample-conversion and
//! peak/dither/interleave stages, and the file handle with its `Container` and
//! `Codec` driver traits.
//!
//! Format and codec crates build on this crate; the `cantata` facade ties them
//! together behind `open_read`/`open_write`.

pub mod chunks;
pub mod conv;
pub mod dither;
pub mod errors;
pub mod format;
pub mod handle;
pub mod interleave;
pub mod io;
pub mod meta;
pub mod peak;
pub mod raw;
