// Toccata
// Copyright (c) 2026 The Toccata Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rice` module implements the adaptive parameter state of the two-level
//! Rice coder.
//!
//! Each channel carries two (k, sum) pairs. The first level codes small
//! residuals directly with `k0` remainder bits; residuals of at least `2^k0`
//! fall through to the second level where the excess is coded with `k1`
//! remainder bits under a unary prefix. Both `k` parameters track a windowed
//! running sum of the magnitudes they code: `sum` is nudged towards 16x the
//! mean residual, and `k` follows `sum` so that `2^(k+4) <= sum <= 2^(k+5)`.

/// `BIT_MASK[i]` has the low `i` bits set.
pub(crate) static BIT_MASK: [u32; 33] = build_mask_table();

/// `BIT_SHIFT[i]` is `1 << i`, saturated at `1 << 31`.
///
/// The saturated tail keeps the adaptation thresholds indexable while a `sum`
/// transiently exceeds the largest power-of-two window.
pub(crate) static BIT_SHIFT: [u32; 40] = build_shift_table();

const fn build_mask_table() -> [u32; 33] {
    let mut table = [0u32; 33];

    let mut i = 0;
    while i < 33 {
        table[i] = if i == 32 { u32::MAX } else { (1u32 << i) - 1 };
        i += 1;
    }

    table
}

const fn build_shift_table() -> [u32; 40] {
    let mut table = [0u32; 40];

    let mut i = 0;
    while i < 40 {
        table[i] = if i < 31 { 1u32 << i } else { 1u32 << 31 };
        i += 1;
    }

    table
}

/// The adaptation window: `shift_16(k) == 16 << k`, the lower threshold of the
/// sum interval governed by parameter `k`.
#[inline(always)]
pub(crate) fn shift_16(k: u32) -> u32 {
    BIT_SHIFT[(k + 4) as usize]
}

/// Ceiling on the adaptive parameters. A wider remainder field would no
/// longer fit the 32-bit bit cache; no stream produced by the encoder comes
/// near it, so the clamp only tames garbage input.
const MAX_K: u32 = 31;

/// Adaptive parameter state of a two-level Rice coder for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiceState {
    pub k0: u32,
    pub k1: u32,
    pub sum0: u32,
    pub sum1: u32,
}

impl RiceState {
    pub fn new() -> Self {
        let mut state = RiceState { k0: 0, k1: 0, sum0: 0, sum1: 0 };
        state.reset(10, 10);
        state
    }

    /// Resets both parameter pairs. The sums are primed to the midpoint of
    /// the interval governed by their `k`.
    pub fn reset(&mut self, k0: u32, k1: u32) {
        self.k0 = k0;
        self.k1 = k1;
        self.sum0 = shift_16(k0);
        self.sum1 = shift_16(k1);
    }

    /// Folds a level-0 code word magnitude into the running state.
    #[inline(always)]
    pub fn adapt0(&mut self, value: u32) {
        self.sum0 = self.sum0.wrapping_add(value.wrapping_sub(self.sum0 >> 4));
        if self.k0 > 0 && self.sum0 < shift_16(self.k0) {
            self.k0 -= 1;
        }
        else if self.k0 < MAX_K && self.sum0 > shift_16(self.k0 + 1) {
            self.k0 += 1;
        }
    }

    /// Folds a level-1 code word magnitude into the running state.
    #[inline(always)]
    pub fn adapt1(&mut self, value: u32) {
        self.sum1 = self.sum1.wrapping_add(value.wrapping_sub(self.sum1 >> 4));
        if self.k1 > 0 && self.sum1 < shift_16(self.k1) {
            self.k1 -= 1;
        }
        else if self.k1 < MAX_K && self.sum1 > shift_16(self.k1 + 1) {
            self.k1 += 1;
        }
    }
}

impl Default for RiceState {
    fn default() -> Self {
        RiceState::new()
    }
}

/// Maps a signed residual onto a non-negative Rice code word.
#[inline(always)]
pub fn signed_to_rice(value: i32) -> u32 {
    if value > 0 {
        ((value as u32) << 1) - 1
    }
    else {
        (value.wrapping_neg() as u32) << 1
    }
}

/// Maps a non-negative Rice code word back onto a signed residual.
#[inline(always)]
pub fn rice_to_signed(value: u32) -> i32 {
    if value & 1 != 0 {
        ((value >> 1) + 1) as i32
    }
    else {
        -((value >> 1) as i32)
    }
}
