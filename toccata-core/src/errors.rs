// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Toccata.
///
/// Every error terminates the operation that raised it; the codec performs no
/// retries of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The input or output file could not be opened.
    OpenFile,
    /// Reading from the backing stream failed or ended prematurely.
    ReadFile,
    /// Writing to the backing stream failed or was incomplete.
    WriteFile,
    /// The backing stream could not be positioned.
    SeekFile,
    /// The stream is not a supported TTA1 stream, or its parameters are out of
    /// the supported range.
    FormatIncompatible(&'static str),
    /// A CRC-32 check failed and the damage is not recoverable.
    FileCorrupted(&'static str),
    /// A required allocation could not be satisfied.
    MemoryInsufficient,
    /// The stream is encrypted and no password was supplied.
    PasswordProtected,
    /// A filter implementation variant was requested that this build does not
    /// provide.
    UnsupportedArch,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::OpenFile => write!(f, "can't open file"),
            Error::ReadFile => write!(f, "can't read from input file"),
            Error::WriteFile => write!(f, "can't write to output file"),
            Error::SeekFile => write!(f, "file seek error"),
            Error::FormatIncompatible(msg) => {
                write!(f, "not compatible file format: {}", msg)
            }
            Error::FileCorrupted(msg) => {
                write!(f, "file is corrupted: {}", msg)
            }
            Error::MemoryInsufficient => write!(f, "insufficient memory available"),
            Error::PasswordProtected => write!(f, "password protected file"),
            Error::UnsupportedArch => write!(f, "unsupported architecture type"),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an incompatible-format error.
pub fn format_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::FormatIncompatible(desc))
}

/// Convenience function to create a corrupt-file error.
pub fn corrupt_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::FileCorrupted(desc))
}

/// Convenience function to create a seek error.
pub fn seek_error<T>() -> Result<T> {
    Err(Error::SeekFile)
}
