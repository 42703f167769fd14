// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TTA1 console frontend: WAVE in, TTA out, and back.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::process;
use std::time::Instant;

use clap::{Arg, ArgAction, Command};
use log::warn;

use toccata_bundle_tta::{Decoder, Encoder, StreamInfo, MAX_BPS, MAX_NCH};
use toccata_core::errors::{format_error, Error, Result};
use toccata_core::io::{ReadOnlySource, StreamIo, WriteOnlySink};

mod wav;
use wav::WavSpec;

/// Number of sample granules moved between the codec and the PCM side per
/// call.
const PCM_BUFFER_LENGTH: usize = 5120;

fn main() {
    pretty_env_logger::init();

    let matches = Command::new("tta")
        .version(env!("CARGO_PKG_VERSION"))
        .about("TTA1 lossless audio encoder/decoder")
        .arg(
            Arg::new("encode")
                .short('e')
                .action(ArgAction::SetTrue)
                .help("Encode a RIFF/WAVE file to TTA1")
                .conflicts_with("decode"),
        )
        .arg(
            Arg::new("decode")
                .short('d')
                .action(ArgAction::SetTrue)
                .help("Decode a TTA1 file to RIFF/WAVE"),
        )
        .arg(
            Arg::new("blind")
                .short('b')
                .action(ArgAction::SetTrue)
                .help("Blindly encode: ignore the wave data size and spool the input first")
                .conflicts_with("decode"),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .value_name("PASSWORD")
                .help("Protect the stream with a password, or unlock a protected one"),
        )
        .arg(
            Arg::new("INPUT")
                .required(true)
                .help("Input file, or - for standard input"),
        )
        .arg(
            Arg::new("OUTPUT")
                .required(true)
                .help("Output file, or - for standard output"),
        )
        .get_matches();

    let encode = matches.get_flag("encode");
    let decode = matches.get_flag("decode");
    let blind = matches.get_flag("blind");
    let password = matches.get_one::<String>("password").map(|s| s.as_str());
    let input = matches.get_one::<String>("INPUT").unwrap().as_str();
    let output = matches.get_one::<String>("OUTPUT").unwrap().as_str();

    if !encode && !decode {
        eprintln!("tta: commandline options incomplete, one of -e or -d is required");
        process::exit(1);
    }

    eprintln!("TTA1 lossless audio encoder/decoder, version {}\n", env!("CARGO_PKG_VERSION"));

    let start = Instant::now();

    let result = if encode {
        eprintln!("Encoding: \"{}\" to \"{}\"", input, output);
        run_encode(input, output, blind, password)
    }
    else {
        eprintln!("Decoding: \"{}\" to \"{}\"", input, output);
        run_decode(input, output, password)
    };

    match result {
        Ok(()) => {
            eprintln!("\rTime: {:.3} sec.", start.elapsed().as_secs_f64());
        }
        Err(err) => {
            eprintln!("\rtta: {}", err);
            // Do not leave a half-written output file behind.
            if output != "-" {
                let _ = fs::remove_file(output);
            }
            process::exit(1);
        }
    }
}

fn print_progress(_rate: u32, fnum: u32, frames: u32) {
    let pcnt = fnum * 100 / frames;
    if pcnt % 10 == 0 {
        eprint!("\rProgress: {:02}%", pcnt);
    }
}

/// Fills `buf` from `reader`, stopping early only at end-of-stream.
fn read_fully(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => (),
            Err(_) => return Err(Error::ReadFile),
        }
    }
    Ok(total)
}

/// Copies the remaining input into `spool` and returns the byte count.
fn spool_input(reader: &mut dyn Read, spool: &mut File) -> Result<u32> {
    let mut total: u64 = 0;
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let got = read_fully(reader, &mut buf)?;
        if got == 0 {
            break;
        }
        spool.write_all(&buf[..got]).map_err(|_| Error::WriteFile)?;
        total += got as u64;

        if total >= u64::from(u32::MAX) {
            return format_error("wav: spooled input exceeds 4 GiB");
        }
    }

    Ok(total as u32)
}

fn run_encode(input: &str, output: &str, blind: bool, password: Option<&str>) -> Result<()> {
    let mut reader: Box<dyn Read> = if input == "-" {
        Box::new(io::stdin())
    }
    else {
        Box::new(File::open(input).map_err(|_| Error::OpenFile)?)
    };

    let writer: Box<dyn StreamIo> = if output == "-" {
        Box::new(WriteOnlySink::new(io::stdout()))
    }
    else {
        Box::new(File::create(output).map_err(|_| Error::OpenFile)?)
    };

    let (spec, mut data_size) = wav::read_header(&mut reader)?;

    if spec.num_channels == 0
        || usize::from(spec.num_channels) > MAX_NCH
        || spec.bits_per_sample == 0
        || spec.bits_per_sample > MAX_BPS
    {
        return format_error("wav: unsupported pcm geometry");
    }

    let granule = spec.block_align() as usize;

    if blind {
        // The stated data size is untrusted (or absent, for piped input):
        // spool the sample data through a temporary file to measure it.
        let mut spool = tempfile::tempfile().map_err(|_| Error::OpenFile)?;
        data_size = spool_input(&mut reader, &mut spool)?;
        eprintln!("Buffered: {} bytes", data_size);

        StreamIo::seek(&mut spool, 0)?;
        reader = Box::new(spool);
    }
    else if data_size >= 0x7fff_ffff {
        return format_error("wav: incorrect data size info");
    }

    let mut info = StreamInfo {
        format: 0,
        nch: spec.num_channels,
        bps: spec.bits_per_sample,
        sps: spec.sample_rate,
        samples: data_size / spec.block_align(),
    };

    let mut encoder = Encoder::new(writer);
    encoder.init(&mut info, 0, password)?;

    let mut progress = print_progress;
    let mut remaining = u64::from(info.samples) * granule as u64;
    let mut buf = vec![0u8; PCM_BUFFER_LENGTH * granule];

    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let got = read_fully(&mut reader, &mut buf[..want])?;
        if got == 0 {
            return Err(Error::ReadFile);
        }

        encoder.process_stream(&buf[..got], Some(&mut progress))?;
        remaining -= got as u64;
    }

    encoder.finalize()
}

fn run_decode(input: &str, output: &str, password: Option<&str>) -> Result<()> {
    let reader: Box<dyn StreamIo> = if input == "-" {
        Box::new(ReadOnlySource::new(io::stdin()))
    }
    else {
        Box::new(File::open(input).map_err(|_| Error::OpenFile)?)
    };

    let mut writer: Box<dyn Write> = if output == "-" {
        Box::new(io::stdout())
    }
    else {
        Box::new(File::create(output).map_err(|_| Error::OpenFile)?)
    };

    let mut decoder = Decoder::new(reader);
    let info = decoder.init(0, password)?;

    let spec = WavSpec {
        num_channels: info.nch,
        sample_rate: info.sps,
        bits_per_sample: info.bps,
    };
    let granule = spec.block_align() as usize;
    let data_size = u64::from(info.samples) * granule as u64;

    wav::write_header(&mut writer, &spec, data_size as u32)?;

    let mut progress = print_progress;
    let mut buf = vec![0u8; PCM_BUFFER_LENGTH * granule];

    loop {
        let decoded = decoder.process_stream(&mut buf, Some(&mut progress))?;
        if decoded == 0 {
            break;
        }
        writer.write_all(&buf[..decoded * granule]).map_err(|_| Error::WriteFile)?;
    }

    writer.flush().map_err(|_| Error::WriteFile)?;

    // Frames whose CRC failed were zeroed and skipped; say so, but keep the
    // salvaged audio.
    if decoder.lost_frames() > 0 {
        warn!("{} frames were damaged and zeroed", decoder.lost_frames());
        eprintln!("\rtta: {}", Error::FileCorrupted("damaged frames were zeroed"));
    }

    Ok(())
}
