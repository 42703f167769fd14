// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `filter` module implements the adaptive hybrid filter.
//!
//! The filter is an 8-tap FIR predictor over a history of transformed past
//! outputs (`dl`), with integer coefficients (`qm`) that are nudged once per
//! sample by the sign of the previous residual: every coefficient moves one
//! step along a sign-quantised gradient (`dx`) derived from the sign of the
//! history value it multiplies. All arithmetic is 32-bit two's-complement;
//! encode and decode walk identical state and must agree bit-for-bit.

/// Filter shift selected by the byte depth of a sample (index `depth - 1`).
pub(crate) const FLT_SET: [i32; 3] = [10, 9, 10];

/// State of the adaptive hybrid filter for one channel.
#[derive(Debug, Default, Clone)]
pub struct FilterState {
    /// The residual of the previous sample; its sign steers the coefficient
    /// update.
    error: i32,
    /// Rounding bias added to the prediction, `1 << (shift - 1)`.
    round: i32,
    /// Scale of the prediction sum.
    shift: i32,
    /// Filter coefficients.
    qm: [i32; 8],
    /// Sign-quantised update gradient; `dx[4..8]` hold the +/-{1, 2, 2, 4}
    /// sign classes of the four most recent history values.
    dx: [i32; 8],
    /// History of transformed past outputs, newest in `dl[7]`.
    dl: [i32; 8],
}

impl FilterState {
    /// Re-initialises the filter. The eight seed bytes become the starting
    /// coefficients, interpreted as signed 8-bit integers, least-significant
    /// byte first.
    pub fn init(&mut self, seed: u64, shift: i32) {
        *self = FilterState::default();

        self.shift = shift;
        self.round = 1 << (shift - 1);

        for (i, qm) in self.qm.iter_mut().enumerate() {
            *qm = i32::from((seed >> (i * 8)) as i8);
        }
    }

    /// Adapts the coefficients by the sign of the previous residual and
    /// returns the scaled prediction for the current sample.
    #[inline(always)]
    fn predict_and_adapt(&mut self) -> i32 {
        if self.error < 0 {
            for j in 0..8 {
                self.qm[j] = self.qm[j].wrapping_sub(self.dx[j]);
            }
        }
        else if self.error > 0 {
            for j in 0..8 {
                self.qm[j] = self.qm[j].wrapping_add(self.dx[j]);
            }
        }

        let mut sum = self.round;
        for j in 0..8 {
            sum = sum.wrapping_add(self.dl[j].wrapping_mul(self.qm[j]));
        }

        // Age the gradient and classify the four most recent history values.
        // An arithmetic shift by 30 turns the sign into 0 or -1 (-2 for
        // values of magnitude >= 2^30), which the or/and-not pattern folds
        // into steps of +/-1, +/-2, +/-2 and +/-4.
        self.dx.copy_within(1..5, 0);
        self.dx[4] = (self.dl[4] >> 30) | 1;
        self.dx[5] = ((self.dl[5] >> 30) | 2) & !1;
        self.dx[6] = ((self.dl[6] >> 30) | 2) & !1;
        self.dx[7] = ((self.dl[7] >> 30) | 4) & !3;

        sum >> self.shift
    }

    /// Ages the history and rebuilds its transformed tail from the new
    /// output sample.
    #[inline(always)]
    fn update_history(&mut self, sample: i32) {
        self.dl.copy_within(1..5, 0);
        self.dl[4] = self.dl[5].wrapping_neg();
        self.dl[5] = self.dl[6].wrapping_neg();
        self.dl[6] = sample.wrapping_sub(self.dl[7]);
        self.dl[7] = sample;
        self.dl[5] = self.dl[5].wrapping_add(self.dl[6]);
        self.dl[4] = self.dl[4].wrapping_add(self.dl[5]);
    }

    /// Turns a residual back into a sample, in place.
    pub fn decode(&mut self, value: &mut i32) {
        let prediction = self.predict_and_adapt();

        self.error = *value;
        *value = value.wrapping_add(prediction);

        self.update_history(*value);
    }

    /// Turns a sample into a residual, in place.
    pub fn encode(&mut self, value: &mut i32) {
        let prediction = self.predict_and_adapt();

        self.update_history(*value);

        *value = value.wrapping_sub(prediction);
        self.error = *value;
    }
}

#[cfg(test)]
mod tests {
    use super::FilterState;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn verify_filter_round_trip() {
        // Encoding and decoding with identically-seeded filters walk the same
        // state, so decode(encode(x)) must reproduce x exactly.
        for &seed in &[0u64, 0x7465_7374_6b65_7931, u64::MAX] {
            for &shift in &[9i32, 10] {
                let mut enc = FilterState::default();
                let mut dec = FilterState::default();
                enc.init(seed, shift);
                dec.init(seed, shift);

                let mut rng = SmallRng::seed_from_u64(0xf117e5);

                for _ in 0..10_000 {
                    let sample = rng.random_range(-(1 << 23)..(1 << 23));

                    let mut value = sample;
                    enc.encode(&mut value);
                    dec.decode(&mut value);

                    assert_eq!(value, sample);
                }
            }
        }
    }

    #[test]
    fn verify_seed_bytes_become_signed_coefficients(){
        let mut filter = FilterState::default();
        filter.init(0x80ff_7f01_0000_00fe, 10);

        assert_eq!(filter.qm, [-2, 0, 0, 0, 1, 127, -1, -128]);
        assert_eq!(filter.round, 512);
    }

    #[test]
    fn verify_zero_input_is_a_fixed_point() {
        // With a zero seed and all-zero input the filter never leaves its
        // initial state, so every residual is zero.
        let mut filter = FilterState::default();
        filter.init(0, 10);

        for _ in 0..64 {
            let mut value = 0;
            filter.encode(&mut value);
            assert_eq!(value, 0);
        }
    }
}
