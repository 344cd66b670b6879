// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chunk-walk machinery shared by the WAV family and AIFF.
//!
//! Both containers are a flat run of `(marker, size)` records after the file
//! magic. The walker hands chunks to the container's dispatch loop and implements
//! the recovery rules for files written by sloppy tools: even-byte alignment
//! between records, a resync that slides one byte when an unprintable marker shows
//! up off a four-byte boundary, a hard stop for absurd sizes, and truncation of
//! chunks that overshoot the physical file.

use std::io::SeekFrom;

use log::info;

use cantata_core::chunks::ChunkId;
use cantata_core::errors::{decode_error, Result};
use cantata_core::handle::FileState;

/// Unknown chunks whose size field is at or above this are treated as garbage that
/// cannot be skipped; the parser exits.
pub(crate) const EXIT_PARSER_SIZE: u64 = 0xffff_0000;

/// One `(marker, size)` record positioned in the file.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RawChunk {
    pub marker: [u8; 4],
    pub size: u64,
    /// Absolute offset of the first payload byte.
    pub payload_offset: u64,
}

impl RawChunk {
    pub(crate) fn marker_offset(&self) -> u64 {
        self.payload_offset - 8
    }
}

/// What the shared unknown-chunk handler did with a record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum UnknownAction {
    /// Logged and skipped; keep walking.
    Skipped,
    /// The stream was rewound for a one-byte resync; re-read the marker.
    Resync,
    /// The chunk overshoots the file; stop the walk.
    Stop,
}

/// Walks top-level chunks. The byte order applies to size fields only.
pub(crate) struct ChunkWalker {
    big_endian: bool,
}

impl ChunkWalker {
    pub(crate) fn new(big_endian: bool) -> Self {
        ChunkWalker { big_endian }
    }

    /// Reads the next `(marker, size)` record, or `None` at the end of the chunk
    /// run (end of file, or a zeroed marker).
    pub(crate) fn next(&mut self, fs: &mut FileState) -> Result<Option<RawChunk>> {
        // Chunks are even aligned; consume the pad byte between records.
        if fs.stream.pos() & 1 == 1 {
            let _ = fs.stream.read_byte();
        }

        if fs.stream.pos() + 8 > fs.file_length {
            return Ok(None);
        }

        let marker = fs.stream.read_quad_bytes()?;
        if marker == [0u8; 4] {
            return Ok(None);
        }

        let size = if self.big_endian {
            u64::from(fs.stream.read_be_u32()?)
        }
        else {
            u64::from(fs.stream.read_u32()?)
        };

        Ok(Some(RawChunk { marker, size, payload_offset: fs.stream.pos() }))
    }

    /// Skips over a chunk's payload, leaving the stream at the next record.
    pub(crate) fn skip(&self, fs: &mut FileState, chunk: &RawChunk) -> Result<()> {
        fs.stream.seek(SeekFrom::Start(chunk.payload_offset + chunk.size))?;
        Ok(())
    }
}

fn marker_is_printable(marker: [u8; 4]) -> bool {
    marker.iter().all(|b| (0x20..0x7f).contains(b))
}

/// Records a chunk, known or not, in the handle's read-chunk index.
pub(crate) fn log_chunk(fs: &mut FileState, chunk: &RawChunk) {
    fs.chunks.store_read_chunk(
        ChunkId::from_marker(chunk.marker),
        chunk.payload_offset,
        chunk.size,
    );
}

/// Applies the recovery rules to a chunk the container did not recognise.
///
/// Returns an error only for the fatal case: an unskippable size on an aligned
/// marker, which means the chunk run is garbage.
pub(crate) fn handle_unknown_chunk(
    walker: &ChunkWalker,
    fs: &mut FileState,
    chunk: &RawChunk,
) -> Result<UnknownAction> {
    // An unprintable marker off a four-byte boundary is usually a one-or-two byte
    // slip by the writing tool. Slide one byte and retry.
    if !marker_is_printable(chunk.marker) {
        if chunk.marker_offset() % 4 != 0 {
            fs.parse_log.log(format!(
                "unprintable marker {:02x?} at unaligned offset {}, resyncing",
                chunk.marker,
                chunk.marker_offset()
            ));
            fs.stream.seek(SeekFrom::Start(chunk.marker_offset() + 1))?;
            return Ok(UnknownAction::Resync);
        }

        // On an aligned boundary there is no slip to recover from; the chunk run
        // is garbage.
        fs.parse_log.log(format!(
            "unprintable marker {:02x?} at aligned offset {}, exiting parser",
            chunk.marker,
            chunk.marker_offset()
        ));
        return decode_error("riff: unprintable chunk marker on an aligned boundary");
    }

    if chunk.size >= EXIT_PARSER_SIZE {
        fs.parse_log.log(format!(
            "chunk {} claims {} bytes, exiting parser",
            String::from_utf8_lossy(&chunk.marker),
            chunk.size
        ));
        return decode_error("riff: unknown chunk with unskippable size");
    }

    if chunk.payload_offset + chunk.size > fs.file_length {
        fs.parse_log.log(format!(
            "chunk {} overshoots the file ({} + {} > {}), stopping",
            String::from_utf8_lossy(&chunk.marker),
            chunk.payload_offset,
            chunk.size,
            fs.file_length
        ));
        return Ok(UnknownAction::Stop);
    }

    info!(
        "ignoring unknown chunk: tag={}, len={}.",
        String::from_utf8_lossy(&chunk.marker),
        chunk.size
    );

    log_chunk(fs, chunk);
    walker.skip(fs, chunk)?;

    Ok(UnknownAction::Skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    use cantata_core::format::{Endian, FormatId, CODEC_PCM_16, CONTAINER_WAV};
    use cantata_core::handle::OpenMode;
    use cantata_core::io::Bstream;

    fn state_with(data: Vec<u8>) -> FileState {
        let format = FormatId::new(CONTAINER_WAV, CODEC_PCM_16, Endian::File);
        let mut fs = FileState::new(OpenMode::Read, Bstream::from_vec(data), format);
        fs.channels = 1;
        fs
    }

    #[test]
    fn walks_aligned_chunks() {
        let mut data = Vec::new();
        data.extend_from_slice(b"abcd");
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3]);
        // One pad byte, then the next chunk.
        data.push(0);
        data.extend_from_slice(b"efgh");
        data.extend_from_slice(&0u32.to_le_bytes());

        let mut fs = state_with(data);
        let mut walker = ChunkWalker::new(false);

        let first = walker.next(&mut fs).unwrap().unwrap();
        assert_eq!(&first.marker, b"abcd");
        assert_eq!(first.size, 3);
        walker.skip(&mut fs, &first).unwrap();

        let second = walker.next(&mut fs).unwrap().unwrap();
        assert_eq!(&second.marker, b"efgh");
        assert_eq!(second.size, 0);

        assert!(walker.next(&mut fs).unwrap().is_none());
    }

    #[test]
    fn zero_marker_ends_the_walk() {
        let mut data = vec![0u8; 16];
        data[8] = 0;

        let mut fs = state_with(data);
        let mut walker = ChunkWalker::new(false);
        assert!(walker.next(&mut fs).unwrap().is_none());
    }

    #[test]
    fn unskippable_size_is_fatal() {
        let mut data = Vec::new();
        data.extend_from_slice(b"WxYz");
        data.extend_from_slice(&0xffff_0000u32.to_le_bytes());
        data.resize(64, 0);

        let mut fs = state_with(data);
        let walker = ChunkWalker::new(false);
        let chunk = RawChunk { marker: *b"WxYz", size: 0xffff_0000, payload_offset: 8 };

        assert!(handle_unknown_chunk(&walker, &mut fs, &chunk).is_err());
    }

    #[test]
    fn unprintable_unaligned_marker_resyncs() {
        let data = vec![0x55u8; 64];
        let mut fs = state_with(data);
        let walker = ChunkWalker::new(false);

        let chunk = RawChunk { marker: [1, 2, 3, 4], size: 10, payload_offset: 17 };
        let action = handle_unknown_chunk(&walker, &mut fs, &chunk).unwrap();

        assert_eq!(action, UnknownAction::Resync);
        assert_eq!(fs.stream.pos(), 10);
        assert_eq!(fs.parse_log.entries().len(), 1);
    }

    #[test]
    fn unprintable_aligned_marker_is_fatal() {
        let data = vec![0x55u8; 64];
        let mut fs = state_with(data);
        let walker = ChunkWalker::new(false);

        // Marker offset 12 sits on a four-byte boundary: nothing to resync to.
        let chunk = RawChunk { marker: [1, 2, 3, 4], size: 10, payload_offset: 20 };
        assert!(handle_unknown_chunk(&walker, &mut fs, &chunk).is_err());
        assert_eq!(fs.parse_log.entries().len(), 1);
    }

    #[test]
    fn overshooting_chunk_stops_the_walk() {
        let data = vec![0u8; 32];
        let mut fs = state_with(data);
        let walker = ChunkWalker::new(false);

        let chunk = RawChunk { marker: *b"LGND", size: 1000, payload_offset: 16 };
        let action = handle_unknown_chunk(&walker, &mut fs, &chunk).unwrap();

        assert_eq!(action, UnknownAction::Stop);
    }
}
