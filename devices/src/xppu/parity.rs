// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parity helpers for master-ID entries and permission list entries.

/// MASTER_IDxx bits excluded from the parity computation besides MIDP itself.
pub const MID_RESERVED_MASK: u32 = 0x3c00_fc00;
pub const MID_PARITY_BIT: u32 = 1 << 31;

/// Lanes covered by each of the four APL parity bits. Parity bit 28 + i covers `APL_PARITY_LANES[i]`.
pub const APL_PARITY_LANES: [u32; 4] = [
    0x1f,                     // 4:0
    0x1f << 5,                // 9:5
    0x1f << 10,               // 14:10
    (0x1f << 15) | (1 << 27), // 19:15 and TZ
];
pub const APL_PARITY_SHIFT: u32 = 28;

/// Returns true if `v` has an odd number of set bits.
pub fn parity32(mut v: u32) -> bool {
    // Fold in half down to a single bit.
    v ^= v >> 16;
    v ^= v >> 8;
    v ^= v >> 4;
    v ^= v >> 2;
    v ^= v >> 1;
    v & 1 != 0
}

/// Parity bit a MASTER_IDxx value should carry in MIDP.
pub fn mid_parity(val: u32) -> bool {
    parity32(val & !MID_PARITY_BIT & !MID_RESERVED_MASK)
}

/// Returns true if the MIDP bit of `val` matches the parity of its fields.
pub fn mid_parity_ok(val: u32) -> bool {
    (val & MID_PARITY_BIT != 0) == mid_parity(val)
}

/// The 4-bit parity field an APL entry should carry in bits 31:28.
pub fn apl_parity(apl: u32) -> u32 {
    APL_PARITY_LANES
        .iter()
        .enumerate()
        .fold(0, |p, (i, lanes)| p | (parity32(apl & lanes) as u32) << i)
}

/// Returns true if bits 31:28 of `apl` match the parity of its lanes.
pub fn apl_parity_ok(apl: u32) -> bool {
    apl >> APL_PARITY_SHIFT == apl_parity(apl)
}

/// Returns `apl` with its parity field filled in.
pub fn with_apl_parity(apl: u32) -> u32 {
    let apl = apl & !(0xf << APL_PARITY_SHIFT);
    apl | apl_parity(apl) << APL_PARITY_SHIFT
}

/// Returns `mid` with MIDP filled in.
pub fn with_mid_parity(mid: u32) -> u32 {
    let mid = mid & !MID_PARITY_BIT;
    if mid_parity(mid) {
        mid | MID_PARITY_BIT
    } else {
        mid
    }
}
