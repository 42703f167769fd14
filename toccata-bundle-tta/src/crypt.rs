// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `crypt` module derives the eight filter seed bytes from a password.
//!
//! The password is first compacted by stripping the UTF-8 framing bits from
//! every byte, then digested with a CRC-64. The digest's bytes, taken as
//! signed 8-bit integers, become the starting coefficients of every channel's
//! hybrid filter, so a wrong password yields plausible-looking but wrong
//! samples and a failing frame CRC rather than a clean error.

use toccata_core::checksum::Crc64;

/// Strips the UTF-8 lead/continuation framing from every byte of `password`.
///
/// ASCII passes through unchanged; for multi-byte sequences the lead byte
/// keeps its payload bits (3 to 6 of them, by sequence length) and each
/// continuation byte keeps its low 6 bits.
pub fn compact_password(password: &str) -> Vec<u8> {
    password
        .bytes()
        .map(|b| match b {
            0x00..=0x7f => b,
            0x80..=0xbf => b & 0x3f,
            0xc0..=0xdf => b & 0x1f,
            0xe0..=0xef => b & 0x0f,
            _ => b & 0x07,
        })
        .collect()
}

/// Digests the compacted password bytes into the 64-bit filter seed.
pub fn key_digits(bytes: &[u8]) -> u64 {
    let mut crc = Crc64::new();
    crc.process_buf_bytes(bytes);
    crc.crc()
}

/// Derives the filter seed for a password in one step.
pub fn derive_seed(password: &str) -> u64 {
    key_digits(&compact_password(password))
}
