// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `decoder` module reads a TTA1 container back to PCM.
//!
//! After the header, the decoder rebuilds absolute frame offsets from the
//! seek table. A verified table enables random access and lets a frame whose
//! CRC fails be skipped: its output is zeroed and decoding re-synchronises at
//! the next frame boundary. Without a verified table a CRC failure ends the
//! stream.

use log::{debug, warn};

use toccata_core::errors::{corrupt_error, seek_error, Error, Result};
use toccata_core::io::StreamIo;

use crate::bufio::Bufio;
use crate::codec::CodecState;
use crate::crypt;
use crate::filter::FLT_SET;
use crate::{
    frame_at_second, second_at_frame, standard_frame_len, validate_info, write_pcm_sample,
    ProgressFn, StreamInfo, FORMAT_ENCRYPTED, MAX_NCH,
};

/// TTA1 stream decoder.
pub struct Decoder<S: StreamIo> {
    bufio: Bufio<S>,
    codec: Vec<CodecState>,
    /// Filter seed; zero unless the stream is encrypted.
    seed: u64,
    /// Absolute byte offset of every frame, rebuilt from the seek table.
    seek_table: Vec<u64>,
    /// Whether the seek table verified and random access is available.
    pub seek_allowed: bool,
    /// Count of frames zeroed because their CRC failed.
    lost: u32,
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

impl<S: StreamIo> Decoder<S> {
    pub fn new(io: S) -> Self {
        Decoder {
            bufio: Bufio::new(io),
            codec: Vec::new(),
            seed: 0,
            seek_table: Vec::new(),
            seek_allowed: false,
            lost: 0,
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

    /// Consumes the decoder and returns the backing stream.
    pub fn into_inner(self) -> S {
        self.bufio.into_inner()
    }

    /// Reads and validates the container headers starting at byte offset
    /// `pos`, primes the first frame, and returns the stream parameters.
    pub fn init(&mut self, pos: u64, password: Option<&str>) -> Result<StreamInfo> {
        if pos != 0 {
            self.bufio.io_mut().seek(pos)?;
        }

        self.bufio.reader_start();
        let (info, header_size) = self.bufio.read_header()?;
        let pos = pos + header_size;

        validate_info(&info)?;

        self.seed = if info.format == FORMAT_ENCRYPTED {
            match password {
                Some(password) if !password.is_empty() => crypt::derive_seed(password),
                _ => return Err(Error::PasswordProtected),
            }
        }
        else {
            0
        };

        self.offset = pos;
        self.depth = info.depth();
        self.flen_std = standard_frame_len(info.sps);
        self.flen_last = info.samples % self.flen_std;
        self.frames = info.samples / self.flen_std + u32::from(self.flen_last != 0);
        if self.flen_last == 0 {
            self.flen_last = self.flen_std;
        }
        self.rate = 0;
        self.lost = 0;

        self.seek_table = Vec::new();
        self.seek_table
            .try_reserve_exact(self.frames as usize)
            .map_err(|_| Error::MemoryInsufficient)?;

        self.seek_allowed = self.read_seek_table()?;
        if !self.seek_allowed {
            warn!("tta: seek table crc mismatch, random access disabled");
        }

        self.codec = vec![CodecState::default(); usize::from(info.nch)];

        debug!(
            "tta: decoding {} frames of {} samples, {} channels",
            self.frames, self.flen_std, info.nch
        );

        self.frame_init(0, false)?;

        Ok(info)
    }

    /// Rebuilds absolute frame offsets from the stored lengths. Returns
    /// whether the table's CRC verified.
    fn read_seek_table(&mut self) -> Result<bool> {
        self.bufio.reset();

        let mut offset = self.offset + (u64::from(self.frames) + 1) * 4;
        for _ in 0..self.frames {
            self.seek_table.push(offset);
            offset += u64::from(self.bufio.read_u32()?);
        }

        Ok(!self.bufio.read_crc32()?)
    }

    fn frame_init(&mut self, frame: u32, seek_needed: bool) -> Result<()> {
        if frame >= self.frames {
            return Ok(());
        }

        self.fnum = frame;

        if seek_needed && self.seek_allowed {
            let pos = self.seek_table[frame as usize];
            if pos != 0 {
                self.bufio.io_mut().seek(pos)?;
            }
            self.bufio.reader_start();
        }

        self.flen = if frame == self.frames - 1 { self.flen_last } else { self.flen_std };

        let shift = FLT_SET[self.depth - 1];
        for codec in self.codec.iter_mut() {
            codec.init(self.seed, shift, 10, 10);
        }

        self.fpos = 0;
        self.bufio.reset();

        Ok(())
    }

    /// Rebinds the backing stream and restarts decoding at a frame boundary.
    pub fn frame_reset(&mut self, frame: u32, io: S) -> Result<S> {
        let old = self.bufio.replace_io(io);
        self.bufio.reader_start();
        self.frame_init(frame, false)?;
        Ok(old)
    }

    /// Positions the decoder at the frame containing the given second and
    /// returns the second at which that frame starts.
    pub fn set_position(&mut self, seconds: u32) -> Result<u32> {
        let frame = frame_at_second(seconds);
        let new_pos = second_at_frame(frame);

        if !self.seek_allowed || frame >= self.frames {
            return seek_error();
        }

        self.frame_init(frame, true)?;

        Ok(new_pos)
    }

    /// Decodes PCM into `output` until the buffer cannot hold another sample
    /// granule or the stream ends. Returns the number of sample granules
    /// (time steps across all channels) decoded.
    ///
    /// A frame whose CRC fails zeroes the whole of `output`; decoding then
    /// continues at the next frame when the seek table verified, and fails
    /// with [`Error::FileCorrupted`] otherwise.
    pub fn process_stream(
        &mut self,
        output: &mut [u8],
        mut callback: Option<ProgressFn<'_>>,
    ) -> Result<usize> {
        let nch = self.codec.len();
        let granule = self.depth * nch;
        let mut cache = [0i32; MAX_NCH];
        let mut written = 0usize;
        let mut decoded = 0usize;

        while self.fpos < self.flen && written + granule <= output.len() {
            for i in 0..nch {
                let mut value = self.bufio.get_value(self.codec[i].rice_mut())?;
                self.codec[i].decode(&mut value);
                cache[i] = value;
            }

            // Undo the inter-channel decorrelation, last channel first.
            if nch > 1 {
                cache[nch - 1] = cache[nch - 1].wrapping_add(cache[nch - 2] / 2);
                for i in (1..nch - 1).rev() {
                    cache[i] = cache[i + 1].wrapping_sub(cache[i]);
                }
                cache[0] = cache[1].wrapping_sub(cache[0]);
            }

            for &sample in cache.iter().take(nch) {
                write_pcm_sample(&mut output[written..], self.depth, sample);
                written += self.depth;
            }

            self.fpos += 1;
            decoded += 1;

            if self.fpos == self.flen {
                let crc_bad = self.bufio.read_crc32()?;

                if crc_bad {
                    warn!("tta: crc mismatch in frame {}", self.fnum);
                    self.lost += 1;
                    for byte in output.iter_mut() {
                        *byte = 0;
                    }
                    if !self.seek_allowed {
                        return corrupt_error("tta: frame crc mismatch");
                    }
                }

                self.fnum += 1;

                self.rate = (self.bufio.count() << 3) / 1070;
                if let Some(callback) = callback.as_mut() {
                    callback(self.rate, self.fnum, self.frames);
                }

                if self.fnum == self.frames {
                    break;
                }

                self.frame_init(self.fnum, crc_bad)?;
            }
        }

        Ok(decoded)
    }

    /// Decodes a single frame of `in_bytes` container bytes into `output`,
    /// verifying the trailer CRC. Returns the number of sample granules
    /// decoded.
    pub fn process_frame(&mut self, in_bytes: u32, output: &mut [u8]) -> Result<usize> {
        let nch = self.codec.len();
        let granule = self.depth * nch;
        let mut cache = [0i32; MAX_NCH];
        let mut written = 0usize;
        let mut decoded = 0usize;

        while self.bufio.count() < in_bytes && written + granule <= output.len() {
            for i in 0..nch {
                let mut value = self.bufio.get_value(self.codec[i].rice_mut())?;
                self.codec[i].decode(&mut value);
                cache[i] = value;
            }

            if nch > 1 {
                cache[nch - 1] = cache[nch - 1].wrapping_add(cache[nch - 2] / 2);
                for i in (1..nch - 1).rev() {
                    cache[i] = cache[i + 1].wrapping_sub(cache[i]);
                }
                cache[0] = cache[1].wrapping_sub(cache[0]);
            }

            for &sample in cache.iter().take(nch) {
                write_pcm_sample(&mut output[written..], self.depth, sample);
                written += self.depth;
            }

            self.fpos += 1;
            decoded += 1;

            if self.fpos == self.flen || self.bufio.count() == in_bytes.wrapping_sub(4) {
                let crc_bad = self.bufio.read_crc32()?;

                self.rate = (self.bufio.count() << 3) / 1070;

                if crc_bad {
                    warn!("tta: crc mismatch in frame {}", self.fnum);
                    self.lost += 1;
                    for byte in output.iter_mut() {
                        *byte = 0;
                    }
                    return corrupt_error("tta: frame crc mismatch");
                }

                break;
            }
        }

        Ok(decoded)
    }

    /// The running bitrate in kbit/s, updated at frame boundaries.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// The number of frames zeroed so far because their CRC failed.
    pub fn lost_frames(&self) -> u32 {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::Decoder;
    use crate::encoder::Encoder;
    use crate::{standard_frame_len, StreamInfo};

    use toccata_core::errors::Error;

    use std::io::Cursor;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn encode(info: &mut StreamInfo, pcm: &[u8], password: Option<&str>) -> Vec<u8> {
        let mut encoder = Encoder::new(Cursor::new(Vec::new()));
        encoder.init(info, 0, password).unwrap();
        encoder.process_stream(pcm, None).unwrap();
        encoder.finalize().unwrap();
        encoder.into_inner().into_inner()
    }

    fn decode(data: Vec<u8>, password: Option<&str>) -> (Decoder<Cursor<Vec<u8>>>, Vec<u8>) {
        let mut decoder = Decoder::new(Cursor::new(data));
        let info = decoder.init(0, password).unwrap();

        let mut pcm = vec![0u8; info.samples as usize * info.depth() * usize::from(info.nch)];
        let decoded = decoder.process_stream(&mut pcm, None).unwrap();
        assert_eq!(decoded, info.samples as usize);

        (decoder, pcm)
    }

    fn stereo_sine_pcm(sps: u32, seconds: u32, amplitude: f64) -> Vec<u8> {
        let mut pcm = Vec::new();
        for n in 0..sps * seconds {
            let phase = 2.0 * std::f64::consts::PI * 1000.0 * f64::from(n) / f64::from(sps);
            let sample = (amplitude * phase.sin()).round() as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        pcm
    }

    #[test]
    fn verify_stereo_sine_round_trip() {
        let pcm = stereo_sine_pcm(48000, 1, 10000.0);

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps: 48000, samples: 48000 };
        let data = encode(&mut info, &pcm, None);

        // A pure tone compresses well.
        assert!(data.len() < pcm.len() / 2);

        let (decoder, decoded) = decode(data, None);
        assert_eq!(decoded, pcm);
        assert!(decoder.seek_allowed);
        assert!(decoder.rate() > 0);
        assert_eq!(decoder.lost_frames(), 0);
    }

    #[test]
    fn verify_round_trip_is_password_invariant() {
        let mut rng = SmallRng::seed_from_u64(0x70ca);
        let pcm: Vec<u8> = (0..30_000u32 * 2)
            .flat_map(|_| rng.random::<i16>().to_le_bytes())
            .collect();

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps: 8000, samples: 30_000 };

        let plain = encode(&mut info, &pcm, None);
        assert_eq!(info.format, 1);
        let (_, decoded) = decode(plain, None);
        assert_eq!(decoded, pcm);

        let encrypted = encode(&mut info, &pcm, Some("hunter2"));
        assert_eq!(info.format, 2);
        let (_, decoded) = decode(encrypted, Some("hunter2"));
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn verify_six_channel_round_trip() {
        let mut rng = SmallRng::seed_from_u64(0x6c44);
        let samples = 10_000u32;
        let pcm: Vec<u8> = (0..samples * 6)
            .flat_map(|_| rng.random::<i16>().to_le_bytes())
            .collect();

        let mut info = StreamInfo { format: 0, nch: 6, bps: 16, sps: 8000, samples };
        let data = encode(&mut info, &pcm, None);

        let (_, decoded) = decode(data, None);
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn verify_24_bit_round_trip() {
        let mut rng = SmallRng::seed_from_u64(0x24b);
        let samples = 12_000u32;
        let mut pcm = Vec::new();
        for _ in 0..samples {
            let sample: i32 = rng.random_range(-(1 << 23)..(1 << 23));
            pcm.extend_from_slice(&sample.to_le_bytes()[..3]);
        }

        let mut info = StreamInfo { format: 0, nch: 1, bps: 24, sps: 8000, samples };
        let data = encode(&mut info, &pcm, None);

        let (_, decoded) = decode(data, None);
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn verify_zero_sample_stream() {
        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps: 44100, samples: 0 };
        let data = encode(&mut info, &[], None);

        let mut decoder = Decoder::new(Cursor::new(data));
        let info = decoder.init(0, None).unwrap();
        assert_eq!(info.samples, 0);
        assert!(decoder.seek_allowed);

        let mut out = [0u8; 64];
        assert_eq!(decoder.process_stream(&mut out, None).unwrap(), 0);
    }

    #[test]
    fn verify_missing_password_is_rejected() {
        let mut info = StreamInfo { format: 0, nch: 1, bps: 16, sps: 8000, samples: 100 };
        let data = encode(&mut info, &[0u8; 200], Some("test"));

        let mut decoder = Decoder::new(Cursor::new(data.clone()));
        assert_eq!(decoder.init(0, None).unwrap_err(), Error::PasswordProtected);

        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.init(0, Some("")).unwrap_err(), Error::PasswordProtected);
    }

    #[test]
    fn verify_wrong_password_decodes_to_noise() {
        // The trailer CRC covers the coded bytes, not the reconstruction, so
        // a wrong key yields wrong samples rather than an error.
        let pcm = stereo_sine_pcm(8000, 1, 10000.0);

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps: 8000, samples: 8000 };
        let data = encode(&mut info, &pcm, Some("test"));

        let (decoder, decoded) = decode(data, Some("wrong"));
        assert_ne!(decoded, pcm);
        assert_eq!(decoder.lost_frames(), 0);
    }

    #[test]
    fn verify_corrupt_frame_is_zeroed_and_skipped() {
        let samples = 30_000u32;
        let sps = 8000u32;
        let pcm = stereo_sine_pcm(sps, 4, 9000.0)[..samples as usize * 4].to_vec();

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps, samples };
        let mut data = encode(&mut info, &pcm, None);

        // Absolute offset of frame 2: headers, the seek table, then the
        // lengths of frames 0 and 1.
        let flen = standard_frame_len(sps) as usize;
        let frames = 4;
        let entry = |data: &[u8], i: usize| {
            u32::from_le_bytes([
                data[22 + 4 * i],
                data[22 + 4 * i + 1],
                data[22 + 4 * i + 2],
                data[22 + 4 * i + 3],
            ]) as usize
        };
        // Flip a payload byte near the end of frame 2, ahead of its CRC
        // trailer.
        let frame2 = 22 + 4 * (frames + 1) + entry(&data, 0) + entry(&data, 1);
        let flip_idx = frame2 + entry(&data, 2) - 8;
        data[flip_idx] ^= 0xff;

        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.init(0, None).unwrap();
        assert!(decoder.seek_allowed);

        let mut out = vec![0u8; samples as usize * 4];
        let decoded = decoder.process_stream(&mut out, None).unwrap();

        assert_eq!(decoded, samples as usize);
        assert_eq!(decoder.lost_frames(), 1);

        // Everything decoded up to and including the bad frame was zeroed;
        // the tail after it survives intact.
        assert!(out[..3 * flen * 4].iter().all(|&b| b == 0));
        assert_eq!(&out[3 * flen * 4..], &pcm[3 * flen * 4..]);
    }

    #[test]
    fn verify_corrupt_frame_without_seek_table_is_fatal() {
        let samples = 30_000u32;
        let pcm = stereo_sine_pcm(8000, 4, 9000.0)[..samples as usize * 4].to_vec();

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps: 8000, samples };
        let mut data = encode(&mut info, &pcm, None);

        // Damage the seek table CRC to disable recovery, and a payload byte
        // near the end of frame 0.
        let frames = 4;
        let table_crc = 22 + 4 * frames;
        let frame0_len = u32::from_le_bytes([data[22], data[23], data[24], data[25]]) as usize;
        data[table_crc] ^= 0xff;
        data[22 + 4 * (frames + 1) + frame0_len - 8] ^= 0xff;

        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.init(0, None).unwrap();
        assert!(!decoder.seek_allowed);

        let mut out = vec![0u8; samples as usize * 4];
        let result = decoder.process_stream(&mut out, None);

        assert_eq!(result.unwrap_err(), Error::FileCorrupted("tta: frame crc mismatch"));
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn verify_seek_matches_continuous_decode() {
        let samples = 30_000u32;
        let sps = 8000u32;
        let pcm = stereo_sine_pcm(sps, 4, 9000.0)[..samples as usize * 4].to_vec();

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps, samples };
        let data = encode(&mut info, &pcm, None);

        let (_, all) = decode(data.clone(), None);
        assert_eq!(all, pcm);

        // Two seconds in lands in frame 1, which starts one standard frame
        // into the stream.
        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.init(0, None).unwrap();
        assert_eq!(decoder.set_position(2).unwrap(), 1);

        let flen = standard_frame_len(sps) as usize;
        let mut tail = vec![0u8; (samples as usize - flen) * 4];
        let decoded = decoder.process_stream(&mut tail, None).unwrap();

        assert_eq!(decoded, samples as usize - flen);
        assert_eq!(tail, &pcm[flen * 4..]);
    }

    #[test]
    fn verify_seek_out_of_range_is_rejected() {
        let mut info = StreamInfo { format: 0, nch: 1, bps: 16, sps: 8000, samples: 100 };
        let data = encode(&mut info, &[0u8; 200], None);

        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.init(0, None).unwrap();

        assert_eq!(decoder.set_position(3600).unwrap_err(), Error::SeekFile);
    }

    #[test]
    fn verify_frame_reset_and_process_frame() {
        let samples = 16_000u32;
        let pcm = stereo_sine_pcm(8000, 2, 6000.0);

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps: 8000, samples };
        let data = encode(&mut info, &pcm, None);

        let mut decoder = Decoder::new(Cursor::new(data.clone()));
        decoder.init(0, None).unwrap();

        // Frame 1 begins after the headers, the seek table, and frame 0.
        let frames = 2;
        let frame0_len =
            u32::from_le_bytes([data[22], data[23], data[24], data[25]]) as usize;
        let frame1_len = u32::from_le_bytes([data[26], data[27], data[28], data[29]]);
        let frame1_at = 22 + 4 * (frames + 1) + frame0_len;

        // Hand the decoder a stream positioned on frame 1 and decode just
        // that frame.
        let mut io = Cursor::new(data);
        io.set_position(frame1_at as u64);
        decoder.frame_reset(1, io).unwrap();

        let flen = standard_frame_len(8000) as usize;
        let mut out = vec![0u8; (samples as usize - flen) * 4];
        let decoded = decoder.process_frame(frame1_len, &mut out).unwrap();

        assert_eq!(decoded, samples as usize - flen);
        assert_eq!(out, &pcm[flen * 4..]);
    }

    #[test]
    fn verify_chunked_decode_matches_single_shot() {
        let pcm = stereo_sine_pcm(8000, 2, 6000.0);

        let mut info = StreamInfo { format: 0, nch: 2, bps: 16, sps: 8000, samples: 16_000 };
        let data = encode(&mut info, &pcm, None);

        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.init(0, None).unwrap();

        let mut boundaries = Vec::new();
        let mut progress = |rate: u32, fnum: u32, frames: u32| {
            assert!(rate > 0);
            boundaries.push((fnum, frames));
        };

        // Drive the decoder with a buffer far smaller than a frame.
        let mut out = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let decoded = decoder.process_stream(&mut chunk, Some(&mut progress)).unwrap();
            if decoded == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..decoded * 4]);
        }

        assert_eq!(out, pcm);
        // The callback fires once per completed frame.
        assert_eq!(boundaries, [(1, 2), (2, 2)]);
    }
}
