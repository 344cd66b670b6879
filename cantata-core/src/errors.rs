// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// `SeekErrorKind` is a list of generic reasons why a seek may fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekErrorKind {
    /// The stream is not seekable at all.
    Unseekable,
    /// The frame position to seek to is out of range.
    OutOfRange,
    /// The whence parameter was not one of set, current, or end.
    InvalidWhence,
}

impl SeekErrorKind {
    fn as_str(&self) -> &'static str {
        match *self {
            SeekErrorKind::Unseekable => "stream is not seekable",
            SeekErrorKind::OutOfRange => "requested frame position is out-of-range for stream",
            SeekErrorKind::InvalidWhence => "invalid whence",
        }
    }
}

/// `MissingChunk` identifies the mandatory container chunk that a malformed file lacked.
///
/// Each variant has a stable numeric code so callers can match on the exact failure the
/// way they would on the original integer error codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MissingChunk {
    WavNoRiff,
    WavNoWave,
    WavNoFmt,
    WavNoData,
    Rf64NotRf64,
    Rf64NoDs64,
    W64NoRiff,
    W64NoWave,
    W64NoFmt,
    W64NoData,
    AiffNoForm,
    AiffNoFormType,
    AiffNoComm,
    AiffNoSsnd,
    CafNoCaff,
    CafNoDesc,
    CafNoData,
    AuNoDotSnd,
}

impl MissingChunk {
    pub fn as_str(&self) -> &'static str {
        match *self {
            MissingChunk::WavNoRiff => "wav: missing RIFF marker",
            MissingChunk::WavNoWave => "wav: missing WAVE marker",
            MissingChunk::WavNoFmt => "wav: missing fmt chunk",
            MissingChunk::WavNoData => "wav: missing data chunk",
            MissingChunk::Rf64NotRf64 => "rf64: missing RF64 marker",
            MissingChunk::Rf64NoDs64 => "rf64: missing ds64 chunk",
            MissingChunk::W64NoRiff => "w64: missing riff GUID",
            MissingChunk::W64NoWave => "w64: missing wave GUID",
            MissingChunk::W64NoFmt => "w64: missing fmt GUID chunk",
            MissingChunk::W64NoData => "w64: missing data GUID chunk",
            MissingChunk::AiffNoForm => "aiff: missing FORM marker",
            MissingChunk::AiffNoFormType => "aiff: FORM type is not AIFF or AIFC",
            MissingChunk::AiffNoComm => "aiff: missing COMM chunk",
            MissingChunk::AiffNoSsnd => "aiff: missing SSND chunk",
            MissingChunk::CafNoCaff => "caf: missing caff marker",
            MissingChunk::CafNoDesc => "caf: missing desc chunk",
            MissingChunk::CafNoData => "caf: missing data chunk",
            MissingChunk::AuNoDotSnd => "au: missing .snd marker",
        }
    }

    /// The stable numeric code for this failure.
    pub fn code(&self) -> i32 {
        match *self {
            MissingChunk::WavNoRiff => 100,
            MissingChunk::WavNoWave => 101,
            MissingChunk::WavNoFmt => 102,
            MissingChunk::WavNoData => 103,
            MissingChunk::Rf64NotRf64 => 110,
            MissingChunk::Rf64NoDs64 => 111,
            MissingChunk::W64NoRiff => 120,
            MissingChunk::W64NoWave => 121,
            MissingChunk::W64NoFmt => 122,
            MissingChunk::W64NoData => 123,
            MissingChunk::AiffNoForm => 130,
            MissingChunk::AiffNoFormType => 131,
            MissingChunk::AiffNoComm => 132,
            MissingChunk::AiffNoSsnd => 133,
            MissingChunk::CafNoCaff => 140,
            MissingChunk::CafNoDesc => 141,
            MissingChunk::CafNoData => 142,
            MissingChunk::AuNoDotSnd => 150,
        }
    }
}

/// `Error` provides an enumeration of all possible errors reported by Cantata.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred while reading, writing, or seeking the stream.
    IoError(std::io::Error),
    /// An IO error occurred that is retryable.
    IoInterrupted(std::io::Error),
    /// The end of the stream was reached where more data was required.
    EndOfFile,
    /// The stream does not begin with the magic of any known container.
    UnrecognizedFormat,
    /// The stream contained malformed data and could not be parsed or decoded.
    DecodeError(&'static str),
    /// A mandatory container chunk was absent.
    MissingChunk(MissingChunk),
    /// An unsupported container or codec feature was encountered.
    Unsupported(&'static str),
    /// The stream could not be seeked.
    SeekError(SeekErrorKind),
    /// The operation is invalid for the handle's open mode.
    BadMode(&'static str),
    /// The container requires header patch-up on close and therefore cannot be
    /// written to a pipe.
    PipeWriteNotSupported,
    /// The channel count is zero or exceeds what the format can carry.
    ChannelCount,
    /// A command was issued with an invalid parameter.
    CommandParam(&'static str),
    /// A sample buffer's length is not a multiple of the channel count.
    BufferAlign,
    /// An internal invariant was violated.
    Internal(&'static str),
}

impl Error {
    /// A stable numeric rendering of the error, kept for callers that store or
    /// compare error codes rather than values.
    pub fn code(&self) -> i32 {
        match *self {
            Error::IoError(_) => 1,
            Error::IoInterrupted(_) => 2,
            Error::EndOfFile => 3,
            Error::UnrecognizedFormat => 4,
            Error::DecodeError(_) => 5,
            Error::MissingChunk(mc) => mc.code(),
            Error::Unsupported(_) => 6,
            Error::SeekError(_) => 7,
            Error::BadMode(_) => 8,
            Error::PipeWriteNotSupported => 9,
            Error::ChannelCount => 10,
            Error::CommandParam(_) => 11,
            Error::BufferAlign => 13,
            Error::Internal(_) => 12,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::IoInterrupted(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::EndOfFile => {
                write!(f, "unexpected end of file")
            }
            Error::UnrecognizedFormat => {
                write!(f, "file is not in a recognized container format")
            }
            Error::DecodeError(msg) => {
                write!(f, "malformed file: {}", msg)
            }
            Error::MissingChunk(mc) => {
                write!(f, "malformed file: {}", mc.as_str())
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::SeekError(ref kind) => {
                write!(f, "seek error: {}", kind.as_str())
            }
            Error::BadMode(msg) => {
                write!(f, "bad mode: {}", msg)
            }
            Error::PipeWriteNotSupported => {
                write!(f, "container requires seekable output, cannot write to a pipe")
            }
            Error::ChannelCount => {
                write!(f, "channel count is zero or too high")
            }
            Error::CommandParam(msg) => {
                write!(f, "bad command parameter: {}", msg)
            }
            Error::BufferAlign => {
                write!(f, "buffer length is not a multiple of the channel count")
            }
            Error::Internal(msg) => {
                write!(f, "internal error: {}", msg)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            Error::IoInterrupted(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::Interrupted => Error::IoInterrupted(err),
            std::io::ErrorKind::UnexpectedEof => Error::EndOfFile,
            _ => Error::IoError(err),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create a missing-chunk error.
pub fn missing_chunk_error<T>(chunk: MissingChunk) -> Result<T> {
    Err(Error::MissingChunk(chunk))
}

/// Convenience function to create an unsupported-feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create a seek error.
pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(Error::SeekError(kind))
}

/// Convenience function to create a bad-mode error.
pub fn bad_mode_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::BadMode(msg))
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::EndOfFile)
}

/// Convenience function to create an internal-invariant error.
pub fn internal_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Internal(msg))
}
