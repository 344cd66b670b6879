// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `raw` module is the degenerate container: no header, no tailer, the whole
//! stream is sample data. It carries the headerless codecs (plain PCM captures and
//! VOX ADPCM) and doubles as the null driver in tests.

use crate::errors::Result;
use crate::format::ContainerId;
use crate::format::CONTAINER_RAW;
use crate::handle::{Container, FileState, OpenMode};

pub struct RawContainer;

impl RawContainer {
    /// Prepares a state for a headerless stream: the data region is the whole file.
    pub fn open(fs: &mut FileState) -> Result<Box<dyn Container>> {
        fs.big_endian = fs.format.endian().resolve(false);
        fs.init_widths();

        fs.data_offset = 0;

        if fs.mode != OpenMode::Write {
            fs.data_length = fs.file_length;
            fs.update_frame_count();
        }

        Ok(Box::new(RawContainer))
    }
}

impl Container for RawContainer {
    fn container_id(&self) -> ContainerId {
        CONTAINER_RAW
    }

    fn write_header(&mut self, _fs: &mut FileState, _calc_length: bool) -> Result<()> {
        Ok(())
    }
}
