// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! XPPU register map.

use crate::register_space::RegisterOffset;
use crate::register_space::RegisterSpace;

pub const CTRL: RegisterOffset = 0x0;
pub const ERR_STATUS1: RegisterOffset = 0x4;
pub const ERR_STATUS2: RegisterOffset = 0x8;
pub const POISON: RegisterOffset = 0xc;
pub const ISR: RegisterOffset = 0x10;
pub const IMR: RegisterOffset = 0x14;
pub const IEN: RegisterOffset = 0x18;
pub const IDS: RegisterOffset = 0x1c;
pub const M_MASTER_IDS: RegisterOffset = 0x3c;
pub const M_APERTURE_32B: RegisterOffset = 0x40;
pub const M_APERTURE_64KB: RegisterOffset = 0x44;
pub const M_APERTURE_1MB: RegisterOffset = 0x48;
pub const M_APERTURE_512MB: RegisterOffset = 0x4c;
pub const BASE_32B: RegisterOffset = 0x50;
pub const BASE_64KB: RegisterOffset = 0x54;
pub const BASE_1MB: RegisterOffset = 0x58;
pub const BASE_512MB: RegisterOffset = 0x5c;
pub const ECO: RegisterOffset = 0xfc;
pub const MASTER_ID00: RegisterOffset = 0x100;
pub const RAM_ADJ: RegisterOffset = 0x1fc;

/// One past the last register offset.
pub const REGS_END: RegisterOffset = RAM_ADJ + 4;

pub const NR_MID_ENTRIES: usize = 20;

// CTRL fields.
pub const CTRL_ENABLE: u32 = 1 << 0;
pub const CTRL_MID_PARITY_EN: u32 = 1 << 1;
pub const CTRL_APER_PARITY_EN: u32 = 1 << 2;

// ISR/IMR/IEN/IDS fields.
pub const INT_INV_APB: u32 = 1 << 0;
pub const INT_MID_MISS: u32 = 1 << 1;
pub const INT_MID_RO: u32 = 1 << 2;
pub const INT_MID_PARITY: u32 = 1 << 3;
pub const INT_APER_PERM: u32 = 1 << 5;
pub const INT_APER_TZ: u32 = 1 << 6;
pub const INT_APER_PARITY: u32 = 1 << 7;
pub const INT_ALL: u32 = INT_INV_APB
    | INT_MID_MISS
    | INT_MID_RO
    | INT_MID_PARITY
    | INT_APER_PERM
    | INT_APER_TZ
    | INT_APER_PARITY;

/// While any of these ISR bits is pending no new fault address is captured.
pub const ISR_LATCH_MASK: u32 = 0xf6;

const INT_RESERVED: u32 = 0xffff_ff10;

pub const ERR_STATUS1_AXI_ADDR_MASK: u32 = 0xf_ffff;
pub const ERR_STATUS2_AXI_ID_MASK: u32 = 0x3ff;
pub const POISON_BASE_MASK: u32 = 0xf_ffff;

// MASTER_IDxx fields.
pub const MID_MASK: u32 = 0x3ff;
pub const MIDM_SHIFT: u32 = 16;
pub const MIDR: u32 = 1 << 30;
const MID_RESERVED: u32 = 0x3c00_fc00;

const MID_RESET_VALUES: [u32; 8] = [
    0x83ff_0040,
    0x03f0_0000,
    0x83f0_0010,
    0x83c0_0080,
    0x83c3_0080,
    0x03c3_0081,
    0x03c3_0082,
    0x83c3_0083,
];

/// Offset of MASTER_ID`index`.
pub fn master_id(index: usize) -> RegisterOffset {
    MASTER_ID00 + 4 * index as RegisterOffset
}

/// Returns the table index if `offset` is one of the MASTER_IDxx registers.
pub fn master_id_index(offset: RegisterOffset) -> Option<usize> {
    if (MASTER_ID00..master_id(NR_MID_ENTRIES)).contains(&offset) {
        Some(((offset - MASTER_ID00) / 4) as usize)
    } else {
        None
    }
}

/// Fields of a MASTER_IDxx register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MasterIdEntry {
    pub mid: u32,
    pub mask: u32,
    pub read_only: bool,
}

impl MasterIdEntry {
    pub fn decode(val: u32) -> MasterIdEntry {
        MasterIdEntry {
            mid: val & MID_MASK,
            mask: (val >> MIDM_SHIFT) & MID_MASK,
            read_only: val & MIDR != 0,
        }
    }

    /// Returns true if `master_id` compares equal under this entry's mask.
    pub fn matches(&self, master_id: u16) -> bool {
        (self.mid & self.mask) == (master_id as u32 & self.mask)
    }
}

/// Builds the XPPU register file with hardware reset values.
pub fn xppu_registers() -> RegisterSpace {
    let mut regs = RegisterSpace::new();
    regs.add_register(register!(
        name: "CTRL",
        offset: CTRL,
        reset_value: 0,
        reserved_mask: 0xffff_fff8,
        read_only_mask: 0xffff_fff8,
    ));
    regs.add_register(register!(
        name: "ERR_STATUS1",
        offset: ERR_STATUS1,
        reset_value: 0,
        reserved_mask: !ERR_STATUS1_AXI_ADDR_MASK,
        read_only_mask: !0,
    ));
    regs.add_register(register!(
        name: "ERR_STATUS2",
        offset: ERR_STATUS2,
        reset_value: 0,
        reserved_mask: !ERR_STATUS2_AXI_ID_MASK,
        read_only_mask: !0,
    ));
    regs.add_register(register!(
        name: "POISON",
        offset: POISON,
        reset_value: 0xf_f9c0,
        reserved_mask: !POISON_BASE_MASK,
        read_only_mask: !POISON_BASE_MASK,
    ));
    regs.add_register(register!(
        name: "ISR",
        offset: ISR,
        reset_value: 0,
        reserved_mask: INT_RESERVED,
        read_only_mask: INT_RESERVED,
        write_1_to_clear_mask: INT_ALL,
    ));
    regs.add_register(register!(
        name: "IMR",
        offset: IMR,
        reset_value: INT_ALL,
        reserved_mask: INT_RESERVED,
        read_only_mask: !0,
    ));
    regs.add_register(register!(
        name: "IEN",
        offset: IEN,
        reset_value: 0,
        reserved_mask: INT_RESERVED,
        read_only_mask: INT_RESERVED,
    ));
    regs.add_register(register!(
        name: "IDS",
        offset: IDS,
        reset_value: 0,
        reserved_mask: INT_RESERVED,
        read_only_mask: INT_RESERVED,
    ));
    regs.add_register(static_register!(
        name: "M_MASTER_IDS",
        offset: M_MASTER_IDS,
        value: NR_MID_ENTRIES as u32,
    ));
    regs.add_register(static_register!(
        name: "M_APERTURE_32B",
        offset: M_APERTURE_32B,
        value: 0x80,
    ));
    regs.add_register(static_register!(
        name: "M_APERTURE_64KB",
        offset: M_APERTURE_64KB,
        value: 0x100,
    ));
    regs.add_register(static_register!(
        name: "M_APERTURE_1MB",
        offset: M_APERTURE_1MB,
        value: 0x10,
    ));
    regs.add_register(static_register!(
        name: "M_APERTURE_512MB",
        offset: M_APERTURE_512MB,
        value: 0x1,
    ));
    regs.add_register(static_register!(
        name: "BASE_32B",
        offset: BASE_32B,
        value: 0xff99_0000,
    ));
    regs.add_register(static_register!(
        name: "BASE_64KB",
        offset: BASE_64KB,
        value: 0xff00_0000,
    ));
    regs.add_register(static_register!(
        name: "BASE_1MB",
        offset: BASE_1MB,
        value: 0xfe00_0000,
    ));
    regs.add_register(static_register!(
        name: "BASE_512MB",
        offset: BASE_512MB,
        value: 0xc000_0000,
    ));
    regs.add_register(register!(
        name: "ECO",
        offset: ECO,
        reset_value: 0,
    ));
    regs.add_register_array((0..NR_MID_ENTRIES).map(|i| {
        register!(
            name: "MASTER_ID",
            offset: master_id(i),
            reset_value: MID_RESET_VALUES.get(i).copied().unwrap_or(0),
            reserved_mask: MID_RESERVED,
            read_only_mask: MID_RESERVED,
        )
    }));
    regs.add_register(register!(
        name: "RAM_ADJ",
        offset: RAM_ADJ,
        reset_value: 0xb0b,
        reserved_mask: 0xffff_c0c0,
        read_only_mask: 0xffff_c0c0,
    ));
    regs
}
