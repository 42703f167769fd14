// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codec` module binds the per-channel prediction pipeline together.
//!
//! Compression runs a sample through a fixed order-1 predictor and then the
//! adaptive hybrid filter; decompression inverts the two stages in reverse
//! order. The Rice parameter state rides along so that one `CodecState` is
//! everything a channel needs.

use crate::filter::FilterState;
use crate::rice::RiceState;

/// Complete coding state for a single audio channel.
#[derive(Debug, Default, Clone)]
pub struct CodecState {
    filter: FilterState,
    rice: RiceState,
    prev: i32,
}

/// The fixed order-1 prediction, `(x * 31) >> 5` with an arithmetic shift.
#[inline(always)]
fn predictor1(x: i32) -> i32 {
    x.wrapping_mul((1 << 5) - 1) >> 5
}

impl CodecState {
    /// Re-initialises the channel for a new frame.
    pub fn init(&mut self, seed: u64, shift: i32, k0: u32, k1: u32) {
        self.filter.init(seed, shift);
        self.rice.reset(k0, k1);
        self.prev = 0;
    }

    /// The channel's Rice parameter state.
    pub fn rice_mut(&mut self) -> &mut RiceState {
        &mut self.rice
    }

    /// Reconstructs a sample from a decoded residual, in place.
    pub fn decode(&mut self, value: &mut i32) {
        // Decompress stage 1: adaptive hybrid filter.
        self.filter.decode(value);
        // Decompress stage 2: fixed order-1 prediction.
        *value = value.wrapping_add(predictor1(self.prev));
        self.prev = *value;
    }

    /// Reduces a sample to a residual ready for Rice coding, in place.
    pub fn encode(&mut self, value: &mut i32) {
        // Compress stage 1: fixed order-1 prediction.
        let temp = *value;
        *value = value.wrapping_sub(predictor1(self.prev));
        self.prev = temp;
        // Compress stage 2: adaptive hybrid filter.
        self.filter.encode(value);
    }
}

#[cfg(test)]
mod tests {
    use super::CodecState;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn verify_codec_round_trip() {
        let mut enc = CodecState::default();
        let mut dec = CodecState::default();
        enc.init(0x0123_4567_89ab_cdef, 10, 10, 10);
        dec.init(0x0123_4567_89ab_cdef, 10, 10, 10);

        let mut rng = SmallRng::seed_from_u64(0xc0dec);

        for _ in 0..10_000 {
            let sample = rng.random_range(-(1 << 23)..(1 << 23));

            let mut value = sample;
            enc.encode(&mut value);
            dec.decode(&mut value);

            assert_eq!(value, sample);
        }
    }

    #[test]
    fn verify_reinit_restores_the_starting_state() {
        let mut a = CodecState::default();
        let mut b = CodecState::default();
        a.init(42, 9, 10, 10);
        b.init(42, 9, 10, 10);

        let mut value = 12345;
        a.encode(&mut value);

        a.init(42, 9, 10, 10);

        let mut va = 777;
        let mut vb = 777;
        a.encode(&mut va);
        b.encode(&mut vb);

        assert_eq!(va, vb);
    }
}
