// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `bufio` module implements the buffered byte- and bit-level stream
//! between a codec and its backing [`StreamIo`].
//!
//! A `Bufio` owns a 5120-byte FIFO and touches the backing stream only at
//! FIFO boundaries. Alongside the FIFO it keeps a running CRC-32 and a byte
//! counter over everything read or written since the last [`Bufio::reset`],
//! and a bit cache for the Rice coder. Bits are packed LSB-first within each
//! byte and bytes stream out in order, so a flush simply drains the cache low
//! bits first.

use toccata_core::checksum::Crc32;
use toccata_core::errors::{corrupt_error, format_error, Error, Result};
use toccata_core::io::StreamIo;

use crate::rice::{rice_to_signed, signed_to_rice, RiceState, BIT_MASK, BIT_SHIFT};
use crate::StreamInfo;

/// Size of the FIFO between a codec and its backing stream.
pub const FIFO_BUFFER_SIZE: usize = 5120;

/// Buffered byte/bit stream with a running CRC-32 and byte counter.
pub struct Bufio<S: StreamIo> {
    buf: Box<[u8]>,
    /// Next byte to read or write within `buf`.
    pos: usize,
    /// End of valid data within `buf` while reading.
    end: usize,
    /// Bit cache; only the low `bcount` bits are meaningful.
    bcache: u32,
    bcount: u32,
    crc: Crc32,
    count: u32,
    io: S,
}

impl<S: StreamIo> Bufio<S> {
    pub fn new(io: S) -> Self {
        Bufio {
            buf: vec![0u8; FIFO_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            end: 0,
            bcache: 0,
            bcount: 0,
            crc: Crc32::new(),
            count: 0,
            io,
        }
    }

    pub fn io(&self) -> &S {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut S {
        &mut self.io
    }

    /// Rebinds the backing stream, returning the previous one.
    pub fn replace_io(&mut self, io: S) -> S {
        std::mem::replace(&mut self.io, io)
    }

    pub fn into_inner(self) -> S {
        self.io
    }

    /// Clears the CRC, the bit cache, and the byte counter. The FIFO position
    /// is left alone.
    pub fn reset(&mut self) {
        self.crc.reset();
        self.bcache = 0;
        self.bcount = 0;
        self.count = 0;
    }

    /// Primes the FIFO for reading; the next `read_byte` triggers a refill.
    pub fn reader_start(&mut self) {
        self.pos = 0;
        self.end = 0;
    }

    /// Primes the FIFO for writing from its start.
    pub fn writer_start(&mut self) {
        self.pos = 0;
    }

    /// The number of bytes read or written since the last [`Bufio::reset`].
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.pos == self.end {
            let len = self.io.read(&mut self.buf)?;
            if len == 0 {
                return Err(Error::ReadFile);
            }
            self.pos = 0;
            self.end = len;
        }

        let byte = self.buf[self.pos];
        self.pos += 1;

        self.crc.process_byte(byte);
        self.count += 1;

        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut value = u16::from(self.read_byte()?);
        value |= u16::from(self.read_byte()?) << 8;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut value = u32::from(self.read_byte()?);
        value |= u32::from(self.read_byte()?) << 8;
        value |= u32::from(self.read_byte()?) << 16;
        value |= u32::from(self.read_byte()?) << 24;
        Ok(value)
    }

    /// Reads a 32-bit CRC from the stream and compares it against the running
    /// CRC. Returns `true` iff the two differ.
    pub fn read_crc32(&mut self) -> Result<bool> {
        let expected = self.crc.crc();
        Ok(expected != self.read_u32()?)
    }

    /// Reads and discards `count` bytes.
    pub fn skip_bytes(&mut self, mut count: u32) -> Result<()> {
        while count > 0 {
            self.read_byte()?;
            count -= 1;
        }
        Ok(())
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.pos == FIFO_BUFFER_SIZE {
            write_all(&mut self.io, &self.buf)?;
            self.pos = 0;
        }

        self.buf[self.pos] = byte;
        self.pos += 1;

        self.crc.process_byte(byte);
        self.count += 1;

        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_byte(value as u8)?;
        self.write_byte((value >> 8) as u8)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_byte(value as u8)?;
        self.write_byte((value >> 8) as u8)?;
        self.write_byte((value >> 16) as u8)?;
        self.write_byte((value >> 24) as u8)
    }

    /// Writes the finalised running CRC to the stream.
    pub fn write_crc32(&mut self) -> Result<()> {
        let crc = self.crc.crc();
        self.write_u32(crc)
    }

    /// Writes `count` zero bytes.
    pub fn write_zero_bytes(&mut self, mut count: u32) -> Result<()> {
        while count > 0 {
            self.write_byte(0)?;
            count -= 1;
        }
        Ok(())
    }

    /// Flushes whatever the FIFO still holds to the backing stream.
    pub fn writer_done(&mut self) -> Result<()> {
        if self.pos > 0 {
            let pos = self.pos;
            write_all(&mut self.io, &self.buf[..pos])?;
            self.pos = 0;
        }
        Ok(())
    }

    /// Skips a leading ID3v2 tag if one opens the stream and returns the
    /// number of bytes skipped.
    fn skip_id3v2(&mut self) -> Result<u32> {
        self.reset();

        // An ID3v2 tag can only open the stream.
        if self.read_byte()? != b'I' || self.read_byte()? != b'D' || self.read_byte()? != b'3' {
            // No tag: rewind onto the freshly-filled FIFO.
            self.pos = 0;
            return Ok(0);
        }

        // Version bytes carry no length information.
        self.read_byte()?;
        self.read_byte()?;

        let mut size: u32 = 0;

        // A footer extends the tag by ten bytes. The ten are folded in ahead
        // of the syncsafe size assembly and therefore get scaled by the
        // remaining shifts; kept as-is for compatibility with existing
        // readers of the format.
        if self.read_byte()? & 0x10 != 0 {
            size += 10;
        }

        size += u32::from(self.read_byte()? & 0x7f);
        size = (size << 7) | u32::from(self.read_byte()? & 0x7f);
        size = (size << 7) | u32::from(self.read_byte()? & 0x7f);
        size = (size << 7) | u32::from(self.read_byte()? & 0x7f);

        self.skip_bytes(size)?;

        Ok(size + 10)
    }

    /// Reads the 22-byte TTA1 stream header, skipping any leading ID3v2 tag.
    ///
    /// Returns the stream parameters and the total number of header bytes
    /// consumed (tag included).
    pub fn read_header(&mut self) -> Result<(StreamInfo, u64)> {
        let mut size = u64::from(self.skip_id3v2()?);
        self.reset();

        if self.read_byte()? != b'T'
            || self.read_byte()? != b'T'
            || self.read_byte()? != b'A'
            || self.read_byte()? != b'1'
        {
            return format_error("tta: missing tta1 stream marker");
        }

        let info = StreamInfo {
            format: self.read_u16()?,
            nch: self.read_u16()?,
            bps: self.read_u16()?,
            sps: self.read_u32()?,
            samples: self.read_u32()?,
        };

        if self.read_crc32()? {
            return corrupt_error("tta: stream header crc mismatch");
        }

        size += 22;

        Ok((info, size))
    }

    /// Writes the 22-byte TTA1 stream header and returns its size.
    pub fn write_header(&mut self, info: &StreamInfo) -> Result<u64> {
        self.reset();

        self.write_byte(b'T')?;
        self.write_byte(b'T')?;
        self.write_byte(b'A')?;
        self.write_byte(b'1')?;

        self.write_u16(info.format)?;
        self.write_u16(info.nch)?;
        self.write_u16(info.bps)?;
        self.write_u32(info.sps)?;
        self.write_u32(info.samples)?;

        self.write_crc32()?;

        Ok(22)
    }

    /// Decodes one Rice-coded signed value, adapting `rice` as it goes.
    pub fn get_value(&mut self, rice: &mut RiceState) -> Result<i32> {
        let mut value: u32 = 0;

        // The unary prefix is a run of one bits closed by a zero. If the
        // cache holds nothing but ones the run continues into the next
        // byte; whole 0xff bytes extend it eight bits at a time.
        if (self.bcache ^ BIT_MASK[self.bcount as usize]) == 0 {
            value = value.wrapping_add(self.bcount);
            self.bcache = u32::from(self.read_byte()?);
            self.bcount = 8;
            while self.bcache == 0xff {
                value = value.wrapping_add(8);
                self.bcache = u32::from(self.read_byte()?);
            }
        }

        while self.bcache & 1 != 0 {
            value = value.wrapping_add(1);
            self.bcache >>= 1;
            self.bcount -= 1;
        }
        self.bcache >>= 1;
        self.bcount -= 1;

        // A non-empty prefix selects the second coding level.
        let (level, k) = if value != 0 {
            value -= 1;
            (true, rice.k1)
        }
        else {
            (false, rice.k0)
        };

        if k > 0 {
            while self.bcount < k {
                let byte = u32::from(self.read_byte()?);
                self.bcache |= byte << self.bcount;
                self.bcount += 8;
            }
            value = (value << k).wrapping_add(self.bcache & BIT_MASK[k as usize]);
            self.bcache >>= k;
            self.bcount -= k;
            self.bcache &= BIT_MASK[self.bcount as usize];
        }

        if level {
            rice.adapt1(value);
            value = value.wrapping_add(BIT_SHIFT[rice.k0 as usize]);
        }

        rice.adapt0(value);

        Ok(rice_to_signed(value))
    }

    /// Encodes one signed value with the Rice coder, adapting `rice` as it
    /// goes. The bits linger in the cache until it exceeds a byte.
    pub fn put_value(&mut self, rice: &mut RiceState, value: i32) -> Result<()> {
        let mut outval = signed_to_rice(value);

        let mut k = rice.k0;
        rice.adapt0(outval);

        let mut unary;
        if outval >= BIT_SHIFT[k as usize] {
            outval -= BIT_SHIFT[k as usize];

            k = rice.k1;
            rice.adapt1(outval);

            unary = 1 + (outval >> k);
        }
        else {
            unary = 0;
        }

        // Emit the unary prefix in chunks the cache can hold.
        loop {
            while self.bcount >= 8 {
                self.write_byte(self.bcache as u8)?;
                self.bcache >>= 8;
                self.bcount -= 8;
            }

            if unary > 23 {
                self.bcache |= BIT_MASK[23] << self.bcount;
                self.bcount += 23;
                unary -= 23;
            }
            else {
                self.bcache |= BIT_MASK[unary as usize] << self.bcount;
                self.bcount += unary + 1;
                unary = 0;
            }

            if unary == 0 {
                break;
            }
        }

        while self.bcount >= 8 {
            self.write_byte(self.bcache as u8)?;
            self.bcache >>= 8;
            self.bcount -= 8;
        }

        // The remainder field, LSB-first.
        if k > 0 {
            self.bcache |= (outval & BIT_MASK[k as usize]) << self.bcount;
            self.bcount += k;
        }

        Ok(())
    }

    /// Drains the bit cache a byte at a time, then writes the trailer CRC.
    pub fn flush_bit_cache(&mut self) -> Result<()> {
        while self.bcount > 0 {
            self.write_byte(self.bcache as u8)?;
            self.bcache >>= 8;
            self.bcount = self.bcount.saturating_sub(8);
        }
        self.write_crc32()
    }
}

/// Writes the whole of `buf`, erroring on a sink that stops accepting bytes.
fn write_all<S: StreamIo>(io: &mut S, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let written = io.write(buf)?;
        if written == 0 {
            return Err(Error::WriteFile);
        }
        buf = &buf[written..];
    }
    Ok(())
}
