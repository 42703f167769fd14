// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module defines the capability interface between a codec and its
//! backing stream.
//!
//! A codec performs its own buffering and calls a [`StreamIo`] only at buffer
//! boundaries, never per byte. Seeking is an optional capability that can be
//! queried at runtime.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::errors::{Error, Result};

/// `StreamIo` is the capability interface of a byte stream backing a codec.
///
/// Positions are absolute byte offsets from the start of the stream.
pub trait StreamIo {
    /// Reads up to `buf.len()` bytes into `buf` and returns the number of
    /// bytes read. A return value of 0 indicates end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes up to `buf.len()` bytes from `buf` and returns the number of
    /// bytes written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Positions the stream at the absolute offset `pos` and returns the new
    /// position.
    fn seek(&mut self, pos: u64) -> Result<u64>;

    /// Returns if the stream is seekable. This may be an expensive operation.
    fn is_seekable(&self) -> bool;
}

impl StreamIo for File {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match Read::read(self, buf) {
                Ok(len) => return Ok(len),
                Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => (),
                Err(_) => return Err(Error::ReadFile),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match Write::write(self, buf) {
                Ok(len) => return Ok(len),
                Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => (),
                Err(_) => return Err(Error::WriteFile),
            }
        }
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        Seek::seek(self, SeekFrom::Start(pos)).map_err(|_| Error::SeekFile)
    }

    /// Returns if the `File` backing the stream is seekable.
    ///
    /// Note: This operation involves querying the underlying file descriptor
    /// for information and may be moderately expensive. Therefore it is
    /// recommended to cache this value if used often.
    fn is_seekable(&self) -> bool {
        match self.metadata() {
            Ok(metadata) => metadata.is_file(),
            _ => false,
        }
    }
}

impl StreamIo for Cursor<Vec<u8>> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Read::read(self, buf).map_err(|_| Error::ReadFile)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Write::write(self, buf).map_err(|_| Error::WriteFile)
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        Seek::seek(self, SeekFrom::Start(pos)).map_err(|_| Error::SeekFile)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

impl StreamIo for Box<dyn StreamIo> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        (**self).seek(pos)
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}

/// `ReadOnlySource` wraps any source implementing [`std::io::Read`] in an
/// unseekable read-only [`StreamIo`].
pub struct ReadOnlySource<R: Read> {
    inner: R,
}

impl<R: Read> ReadOnlySource<R> {
    /// Instantiates a new `ReadOnlySource<R>` by taking ownership and wrapping
    /// the provided `Read`er.
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }

    /// Unwraps this `ReadOnlySource<R>`, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> StreamIo for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(len) => return Ok(len),
                Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => (),
                Err(_) => return Err(Error::ReadFile),
            }
        }
    }

    fn write(&mut self, _: &[u8]) -> Result<usize> {
        Err(Error::WriteFile)
    }

    fn seek(&mut self, _: u64) -> Result<u64> {
        Err(Error::SeekFile)
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// `WriteOnlySink` wraps any sink implementing [`std::io::Write`] in an
/// unseekable write-only [`StreamIo`].
pub struct WriteOnlySink<W: Write> {
    inner: W,
}

impl<W: Write> WriteOnlySink<W> {
    /// Instantiates a new `WriteOnlySink<W>` by taking ownership and wrapping
    /// the provided `Write`r.
    pub fn new(inner: W) -> Self {
        WriteOnlySink { inner }
    }

    /// Unwraps this `WriteOnlySink<W>`, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> StreamIo for WriteOnlySink<W> {
    fn read(&mut self, _: &mut [u8]) -> Result<usize> {
        Err(Error::ReadFile)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.inner.write(buf) {
                Ok(len) => return Ok(len),
                Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => (),
                Err(_) => return Err(Error::WriteFile),
            }
        }
    }

    fn seek(&mut self, _: u64) -> Result<u64> {
        Err(Error::SeekFile)
    }

    fn is_seekable(&self) -> bool {
        false
    }
}
