// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `encoder` module writes a TTA1 container.
//!
//! The encoder reserves the seek-table region with zeros right after the
//! stream header, codes frames as PCM arrives, records every frame's byte
//! length, and on [`Encoder::finalize`] seeks back and writes the real table.
//! The backing stream must therefore be seekable to produce a complete
//! container.

use log::debug;

use toccata_core::errors::{Error, Result};
use toccata_core::io::StreamIo;

use crate::bufio::Bufio;
use crate::codec::CodecState;
use crate::crypt;
use crate::filter::FLT_SET;
use crate::{
    read_pcm_sample, standard_frame_len, validate_info, ProgressFn, StreamInfo,
    FORMAT_ENCRYPTED, FORMAT_SIMPLE, MAX_NCH,
};

/// TTA1 stream encoder.
pub struct Encoder<S: StreamIo> {
    bufio: Bufio<S>,
    codec: Vec<CodecState>,
    /// Filter seed; zero unless a password was supplied.
    seed: u64,
    /// Per-frame byte lengths, written over the reserved table region by
    /// [`Encoder::finalize`].
    seek_table: Vec<u32>,
    depth: usize,
    rate: u32,
    offset: u64,
    frames: u32,
    flen_std: u32,
    flen_last: u32,
    flen: u32,
    fnum: u32,
    fpos: u32,
}

impl<S: StreamIo> Encoder<S> {
    pub fn new(io: S) -> Self {
        Encoder {
            bufio: Bufio::new(io),
            codec: Vec::new(),
            seed: 0,
            seek_table: Vec::new(),
            depth: 0,
            rate: 0,
            offset: 0,
            frames: 0,
            flen_std: 0,
            flen_last: 0,
            flen: 0,
            fnum: 0,
            fpos: 0,
        }
    }

    /// Consumes the encoder and returns the backing stream.
    pub fn into_inner(self) -> S {
        self.bufio.into_inner()
    }

    /// Prepares the container at byte offset `pos` of the backing stream.
    ///
    /// A non-empty password switches the stream to [`FORMAT_ENCRYPTED`] and
    /// seeds the filters from it; `info.format` is set accordingly. The
    /// stream header and a zeroed seek-table region are written immediately.
    pub fn init(&mut self, info: &mut StreamInfo, pos: u64, password: Option<&str>) -> Result<()> {
        match password {
            Some(password) if !password.is_empty() => {
                info.format = FORMAT_ENCRYPTED;
                self.seed = crypt::derive_seed(password);
            }
            _ => {
                info.format = FORMAT_SIMPLE;
                self.seed = 0;
            }
        }

        validate_info(info)?;

        if pos != 0 {
            self.bufio.io_mut().seek(pos)?;
        }

        self.bufio.writer_start();
        let pos = pos + self.bufio.write_header(info)?;

        self.offset = pos;
        self.depth = info.depth();
        self.flen_std = standard_frame_len(info.sps);
        self.flen_last = info.samples % self.flen_std;
        self.frames = info.samples / self.flen_std + u32::from(self.flen_last != 0);
        if self.flen_last == 0 {
            self.flen_last = self.flen_std;
        }
        self.rate = 0;

        self.seek_table = Vec::new();
        self.seek_table
            .try_reserve_exact(self.frames as usize)
            .map_err(|_| Error::MemoryInsufficient)?;
        self.seek_table.resize(self.frames as usize, 0);

        // Reserve the seek-table region; finalize overwrites it in place.
        self.bufio.write_zero_bytes((self.frames + 1) * 4)?;

        self.codec = vec![CodecState::default(); usize::from(info.nch)];

        debug!(
            "tta: encoding {} frames of {} samples, {} channels",
            self.frames, self.flen_std, info.nch
        );

        self.frame_init(0)
    }

    fn frame_init(&mut self, frame: u32) -> Result<()> {
        if frame >= self.frames {
            return Ok(());
        }

        self.fnum = frame;
        self.flen = if frame == self.frames - 1 { self.flen_last } else { self.flen_std };

        let shift = FLT_SET[self.depth - 1];
        for codec in self.codec.iter_mut() {
            codec.init(self.seed, shift, 10, 10);
        }

        self.fpos = 0;
        self.bufio.reset();

        Ok(())
    }

    /// Rebinds the backing stream and restarts coding at a frame boundary.
    pub fn frame_reset(&mut self, frame: u32, io: S) -> Result<S> {
        let old = self.bufio.replace_io(io);
        self.bufio.writer_start();
        self.frame_init(frame)?;
        Ok(old)
    }

    /// Codes interleaved little-endian PCM. The input length must be a whole
    /// number of sample granules (`nch * depth` bytes); a trailing partial
    /// granule is ignored.
    pub fn process_stream(
        &mut self,
        input: &[u8],
        mut callback: Option<ProgressFn<'_>>,
    ) -> Result<()> {
        let nch = self.codec.len();
        let granule = self.depth * nch;
        let mut cache = [0i32; MAX_NCH];

        for granule_bytes in input.chunks_exact(granule) {
            for (i, bytes) in granule_bytes.chunks_exact(self.depth).enumerate() {
                cache[i] = read_pcm_sample(bytes, self.depth);
            }

            // Decorrelate: the first nch-1 channels carry differences, the
            // last carries itself less half the final difference.
            if nch > 1 {
                let mut res = 0;
                for i in 0..nch - 1 {
                    res = cache[i + 1].wrapping_sub(cache[i]);
                    cache[i] = res;
                }
                cache[nch - 1] = cache[nch - 1].wrapping_sub(res / 2);
            }

            for (i, &sample) in cache.iter().enumerate().take(nch) {
                let mut value = sample;
                self.codec[i].encode(&mut value);
                self.bufio.put_value(self.codec[i].rice_mut(), value)?;
            }

            self.fpos += 1;

            if self.fpos == self.flen {
                self.bufio.flush_bit_cache()?;
                self.seek_table[self.fnum as usize] = self.bufio.count();
                self.fnum += 1;

                self.rate = (self.bufio.count() << 3) / 1070;
                if let Some(callback) = callback.as_mut() {
                    callback(self.rate, self.fnum, self.frames);
                }

                self.frame_init(self.fnum)?;
            }
        }

        Ok(())
    }

    /// Codes PCM for a single frame and stops at its boundary, leaving the
    /// frame-length bookkeeping to the caller.
    pub fn process_frame(&mut self, input: &[u8]) -> Result<()> {
        let nch = self.codec.len();
        let granule = self.depth * nch;
        let mut cache = [0i32; MAX_NCH];

        for granule_bytes in input.chunks_exact(granule) {
            for (i, bytes) in granule_bytes.chunks_exact(self.depth).enumerate() {
                cache[i] = read_pcm_sample(bytes, self.depth);
            }

            if nch > 1 {
                let mut res = 0;
                for i in 0..nch - 1 {
                    res = cache[i + 1].wrapping_sub(cache[i]);
                    cache[i] = res;
                }
                cache[nch - 1] = cache[nch - 1].wrapping_sub(res / 2);
            }

            for (i, &sample) in cache.iter().enumerate().take(nch) {
                let mut value = sample;
                self.codec[i].encode(&mut value);
                self.bufio.put_value(self.codec[i].rice_mut(), value)?;
            }

            self.fpos += 1;

            if self.fpos == self.flen {
                self.bufio.flush_bit_cache()?;
                self.rate = (self.bufio.count() << 3) / 1070;
                break;
            }
        }

        Ok(())
    }

    /// Flushes pending output and writes the recorded frame lengths over the
    /// reserved seek-table region.
    pub fn finalize(&mut self) -> Result<()> {
        self.bufio.writer_done()?;
        self.write_seek_table()
    }

    fn write_seek_table(&mut self) -> Result<()> {
        self.bufio.io_mut().seek(self.offset)?;
        self.bufio.writer_start();
        self.bufio.reset();

        for &len in &self.seek_table {
            self.bufio.write_u32(len)?;
        }

        self.bufio.write_crc32()?;
        self.bufio.writer_done()
    }

    /// The running bitrate in kbit/s, updated at frame boundaries.
    pub fn rate(&self) -> u32 {
        self.rate
    }
}
