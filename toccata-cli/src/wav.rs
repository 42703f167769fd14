// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Just enough RIFF/WAVE to feed the encoder and carry the decoder's output.
//!
//! The reader accepts plain LPCM and WAVE_FORMAT_EXTENSIBLE fmt chunks and
//! skips everything else until the data chunk. The writer emits the canonical
//! 44-byte LPCM header.

use std::io::{Read, Write};

use toccata_core::errors::{format_error, Error, Result};

/// A WAVE file is one large RIFF chunk, with a "RIFF" ASCII stream marker.
const WAVE_STREAM_MARKER: [u8; 4] = *b"RIFF";
/// The RIFF form of a WAVE file.
const WAVE_RIFF_FORM: [u8; 4] = *b"WAVE";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// PCM geometry carried by a WAVE fmt chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub num_channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// Bytes per interleaved sample granule.
    pub fn block_align(&self) -> u32 {
        u32::from(self.num_channels) * u32::from((self.bits_per_sample + 7) / 8)
    }
}

fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|_| Error::ReadFile)
}

fn read_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn skip_bytes(reader: &mut impl Read, count: u64) -> Result<()> {
    let copied = std::io::copy(&mut reader.take(count), &mut std::io::sink())
        .map_err(|_| Error::ReadFile)?;
    if copied != count {
        return Err(Error::ReadFile);
    }
    Ok(())
}

/// Parses a WAVE header up to the start of the data chunk and returns the PCM
/// geometry together with the data chunk size in bytes.
pub fn read_header(reader: &mut impl Read) -> Result<(WavSpec, u32)> {
    let mut marker = [0u8; 4];
    read_exact(reader, &mut marker)?;
    if marker != WAVE_STREAM_MARKER {
        return format_error("wav: missing riff stream marker");
    }

    // The length of the top-level RIFF chunk; the chunk walk below finds the
    // data chunk without it.
    let _riff_len = read_u32(reader)?;

    read_exact(reader, &mut marker)?;
    if marker != WAVE_RIFF_FORM {
        return format_error("wav: missing wave riff form");
    }

    let mut spec: Option<WavSpec> = None;

    loop {
        let mut chunk_id = [0u8; 4];
        read_exact(reader, &mut chunk_id)?;
        let chunk_len = read_u32(reader)?;

        match &chunk_id {
            b"fmt " => {
                if chunk_len < 16 {
                    return format_error("wav: fmt chunk too small");
                }

                let mut audio_format = read_u16(reader)?;
                let num_channels = read_u16(reader)?;
                let sample_rate = read_u32(reader)?;
                let _byte_rate = read_u32(reader)?;
                let _block_align = read_u16(reader)?;
                let bits_per_sample = read_u16(reader)?;
                let mut consumed = 16u32;

                // An extensible fmt chunk stores the real format tag in the
                // first two bytes of its sub-format GUID.
                if audio_format == WAVE_FORMAT_EXTENSIBLE && chunk_len >= 40 {
                    let _extension_len = read_u16(reader)?;
                    let _valid_bits = read_u16(reader)?;
                    let _channel_mask = read_u32(reader)?;
                    audio_format = read_u16(reader)?;

                    let mut guid_rest = [0u8; 14];
                    read_exact(reader, &mut guid_rest)?;
                    consumed += 24;
                }

                if audio_format != WAVE_FORMAT_PCM {
                    return format_error("wav: not lpcm");
                }

                // Extra format bytes, plus the padding byte of an odd-length
                // chunk.
                let extra = u64::from(chunk_len - consumed) + u64::from(chunk_len & 1);
                skip_bytes(reader, extra)?;

                spec = Some(WavSpec { num_channels, sample_rate, bits_per_sample });
            }
            b"data" => {
                return match spec {
                    Some(spec) => Ok((spec, chunk_len)),
                    None => format_error("wav: data chunk before fmt chunk"),
                };
            }
            _ => {
                skip_bytes(reader, u64::from(chunk_len) + u64::from(chunk_len & 1))?;
            }
        }
    }
}

/// Writes the canonical 44-byte LPCM WAVE header for `data_size` bytes of
/// sample data.
pub fn write_header(writer: &mut impl Write, spec: &WavSpec, data_size: u32) -> Result<()> {
    let block_align = spec.block_align();

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(&WAVE_STREAM_MARKER);
    header.extend_from_slice(&(data_size.wrapping_add(36)).to_le_bytes());
    header.extend_from_slice(&WAVE_RIFF_FORM);
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    header.extend_from_slice(&spec.num_channels.to_le_bytes());
    header.extend_from_slice(&spec.sample_rate.to_le_bytes());
    header.extend_from_slice(&(spec.sample_rate * block_align).to_le_bytes());
    header.extend_from_slice(&(block_align as u16).to_le_bytes());
    header.extend_from_slice(&spec.bits_per_sample.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());

    writer.write_all(&header).map_err(|_| Error::WriteFile)
}

#[cfg(test)]
mod tests {
    use super::{read_header, write_header, WavSpec};
    use std::io::Cursor;

    #[test]
    fn verify_header_round_trip() {
        let spec = WavSpec { num_channels: 2, sample_rate: 44100, bits_per_sample: 16 };

        let mut buf = Vec::new();
        write_header(&mut buf, &spec, 176400).unwrap();
        assert_eq!(buf.len(), 44);

        let (read_back, data_size) = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read_back, spec);
        assert_eq!(data_size, 176400);
    }

    #[test]
    fn verify_unknown_chunks_are_skipped() {
        let spec = WavSpec { num_channels: 1, sample_rate: 8000, bits_per_sample: 16 };

        let mut buf = Vec::new();
        write_header(&mut buf, &spec, 16).unwrap();

        // Splice a LIST chunk of odd length (and its pad byte) between the
        // fmt and data chunks.
        let mut spliced = buf[..36].to_vec();
        spliced.extend_from_slice(b"LIST");
        spliced.extend_from_slice(&5u32.to_le_bytes());
        spliced.extend_from_slice(&[1, 2, 3, 4, 5, 0]);
        spliced.extend_from_slice(&buf[36..]);

        let (read_back, data_size) = read_header(&mut Cursor::new(spliced)).unwrap();
        assert_eq!(read_back, spec);
        assert_eq!(data_size, 16);
    }

    #[test]
    fn verify_extensible_format_resolves_to_pcm() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");

        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&40u32.to_le_bytes());
        buf.extend_from_slice(&0xfffeu16.to_le_bytes());
        buf.extend_from_slice(&6u16.to_le_bytes());
        buf.extend_from_slice(&48000u32.to_le_bytes());
        buf.extend_from_slice(&(48000u32 * 18).to_le_bytes());
        buf.extend_from_slice(&18u16.to_le_bytes());
        buf.extend_from_slice(&24u16.to_le_bytes());
        // Extension: size, valid bits, channel mask, then the sub-format
        // GUID opening with the PCM format tag.
        buf.extend_from_slice(&22u16.to_le_bytes());
        buf.extend_from_slice(&24u16.to_le_bytes());
        buf.extend_from_slice(&0x3fu32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&[0u8; 14]);

        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&1000u32.to_le_bytes());

        let (spec, data_size) = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(
            spec,
            WavSpec { num_channels: 6, sample_rate: 48000, bits_per_sample: 24 }
        );
        assert_eq!(data_size, 1000);
    }

    #[test]
    fn verify_non_pcm_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        // IEEE float.
        buf.extend_from_slice(&3u16.to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&44100u32.to_le_bytes());
        buf.extend_from_slice(&(44100u32 * 8).to_le_bytes());
        buf.extend_from_slice(&8u16.to_le_bytes());
        buf.extend_from_slice(&32u16.to_le_bytes());

        assert!(read_header(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn verify_truncated_header_is_a_read_error() {
        assert!(read_header(&mut Cursor::new(b"RIFF\x10\x00\x00\x00WA".to_vec())).is_err());
        assert!(read_header(&mut Cursor::new(b"OggS".to_vec())).is_err());
    }
}
