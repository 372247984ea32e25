// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Drives an XPPU through the system bus the way bus masters see it.

use std::sync::Arc;

use devices::xppu::parity::with_apl_parity;
use devices::xppu::parity::with_mid_parity;
use devices::xppu::regs::*;
use devices::xppu::APL_TZ;
use devices::xppu::PERM_RAM_START;
use devices::Bus;
use devices::FdtGenericMmap;
use devices::FdtRegPropInfo;
use devices::IrqLevelEvent;
use devices::MemTxAttrs;
use devices::RamDevice;
use devices::Xppu;
use sync::Mutex;

const XPPU_BASE: u64 = 0xff98_0000;
const POISON_BASE: u64 = 0xff9c_0000;

const MASTER: u16 = 0x20;
const SECURE: MemTxAttrs = MemTxAttrs {
    secure: true,
    master_id: MASTER,
};
const NON_SECURE: MemTxAttrs = MemTxAttrs {
    secure: false,
    master_id: MASTER,
};
const CPU: MemTxAttrs = MemTxAttrs {
    secure: true,
    master_id: 0,
};

// Table slot programmed for MASTER by most tests.
const SLOT: usize = 8;
const SLOT_BIT: u32 = 1 << SLOT;

/// APL index of the 64KB region at 0xff00_0000.
const APL_64K_0: usize = 0;
const APL_64K_1: usize = 1;
const APL_32B_BASE: usize = 256;
const APL_512M: usize = 400;

struct Fixture {
    sys: Bus,
    downstream: Bus,
    irq: IrqLevelEvent,
    xppu: Xppu,
}

fn add_ram(bus: &Bus, label: &str, base: u64, size: u64) {
    let ram = Arc::new(Mutex::new(RamDevice::new(label, size as usize)));
    bus.insert(ram, base, size).unwrap();
}

fn fixture() -> Fixture {
    let downstream = Bus::new();
    add_ram(&downstream, "lpd", 0xff99_0000, 0x1000);
    add_ram(&downstream, "periph", 0xff00_0000, 0x2_0000);
    add_ram(&downstream, "poison", POISON_BASE, 0x2000);
    add_ram(&downstream, "pl", 0xc000_0000, 0x1000);

    let irq = IrqLevelEvent::new();
    let mut xppu = Xppu::new(irq.try_clone(), downstream.clone());
    let reg = FdtRegPropInfo::from_cells(
        &[
            0x0,
            0xff98_0000,
            0x0,
            0x1_0000,
            0x0,
            0xff99_0000,
            0x0,
            0x1000,
            0x0,
            0xff00_0000,
            0x0,
            0x80_0000,
            0x0,
            0xfe00_0000,
            0x0,
            0x100_0000,
            0x0,
            0xc000_0000,
            0x0,
            0x2000_0000,
        ],
        2,
        2,
    )
    .unwrap();
    xppu.parse_reg(&reg).unwrap();

    let sys = Bus::new();
    xppu.attach(&sys).unwrap();
    Fixture {
        sys,
        downstream,
        irq,
        xppu,
    }
}

fn read32(bus: &Bus, addr: u64, attrs: MemTxAttrs) -> Option<u32> {
    let mut data = [0u8; 4];
    if bus.read(addr, attrs, &mut data) {
        Some(u32::from_le_bytes(data))
    } else {
        None
    }
}

fn write32(bus: &Bus, addr: u64, attrs: MemTxAttrs, val: u32) -> bool {
    bus.write(addr, attrs, &val.to_le_bytes())
}

impl Fixture {
    fn reg(&self, offset: u64) -> u32 {
        read32(&self.sys, XPPU_BASE + offset, CPU).unwrap()
    }

    fn set_reg(&self, offset: u64, val: u32) {
        assert!(write32(&self.sys, XPPU_BASE + offset, CPU, val));
    }

    fn set_apl(&self, index: usize, apl: u32) {
        self.set_reg(PERM_RAM_START + 4 * index as u64, apl);
    }

    fn apl(&self, index: usize) -> u32 {
        self.reg(PERM_RAM_START + 4 * index as u64)
    }

    fn downstream(&self, addr: u64) -> u32 {
        read32(&self.downstream, addr, CPU).unwrap()
    }

    /// Enables the firewall with `SLOT` matching `MASTER` exactly.
    fn enable(&self, ctrl: u32) {
        self.set_reg(master_id(SLOT), with_mid_parity(0x03ff_0000 | MASTER as u32));
        self.set_reg(CTRL, CTRL_ENABLE | ctrl);
        // Unmask everything so the line follows ISR.
        self.set_reg(IEN, INT_ALL);
    }

    fn clear_isr(&self) {
        self.set_reg(ISR, INT_ALL);
    }
}

#[test]
fn authorized_write_is_forwarded() {
    let f = fixture();
    f.enable(0);
    f.set_apl(APL_64K_0, SLOT_BIT | APL_TZ);

    assert!(write32(&f.sys, 0xff00_0010, NON_SECURE, 0xdead_beef));
    assert!(write32(&f.sys, 0xff00_0014, SECURE, 0x1234_5678));
    assert_eq!(f.downstream(0xff00_0010), 0xdead_beef);
    assert_eq!(read32(&f.sys, 0xff00_0014, SECURE), Some(0x1234_5678));
    assert_eq!(f.reg(ISR), 0);
    assert_eq!(f.downstream(POISON_BASE + 0x10), 0);
    assert!(!f.irq.is_asserted());
}

#[test]
fn non_secure_master_needs_tz() {
    let f = fixture();
    f.enable(0);
    f.set_apl(APL_64K_0, SLOT_BIT);

    assert!(write32(&f.sys, 0xff00_0abc, NON_SECURE, 0x5555_aaaa));
    assert_eq!(f.downstream(0xff00_0abc), 0);
    assert_eq!(f.downstream(POISON_BASE + 0xabc), 0x5555_aaaa);
    assert_eq!(f.reg(ISR), INT_APER_TZ | INT_APER_PERM);
    assert_eq!(f.reg(ERR_STATUS1), 0xf_f000);
    assert_eq!(f.reg(ERR_STATUS2), MASTER as u32);
    assert!(f.irq.is_asserted());

    // The same master in the secure world passes.
    f.clear_isr();
    assert!(write32(&f.sys, 0xff00_0abc, SECURE, 0x5555_aaaa));
    assert_eq!(f.downstream(0xff00_0abc), 0x5555_aaaa);
    assert_eq!(f.reg(ISR), 0);
    assert!(!f.irq.is_asserted());
}

#[test]
fn bad_apl_parity_rejects_regardless_of_mids() {
    let f = fixture();
    f.enable(CTRL_APER_PARITY_EN);
    f.set_apl(APL_64K_0, SLOT_BIT | APL_TZ);

    assert!(write32(&f.sys, 0xff00_0020, SECURE, 1));
    assert_eq!(f.downstream(0xff00_0020), 0);
    assert_eq!(f.downstream(POISON_BASE + 0x20), 1);
    assert_eq!(f.reg(ISR), INT_APER_PARITY | INT_APER_PERM);

    f.clear_isr();
    f.set_apl(APL_64K_0, with_apl_parity(SLOT_BIT | APL_TZ));
    assert!(write32(&f.sys, 0xff00_0020, SECURE, 2));
    assert_eq!(f.downstream(0xff00_0020), 2);
    assert_eq!(f.reg(ISR), 0);
}

#[test]
fn bad_mid_parity_entry_never_authorizes() {
    let f = fixture();
    f.enable(CTRL_MID_PARITY_EN);
    f.set_apl(APL_64K_0, SLOT_BIT | APL_TZ);

    // Flip MIDP so the matching entry carries the wrong parity.
    let good = with_mid_parity(0x03ff_0000 | MASTER as u32);
    f.set_reg(master_id(SLOT), good ^ (1 << 31));
    assert_eq!(f.reg(ISR) & INT_MID_PARITY, INT_MID_PARITY);
    f.clear_isr();

    assert!(write32(&f.sys, 0xff00_0040, SECURE, 3));
    assert_eq!(f.downstream(0xff00_0040), 0);
    assert_eq!(
        f.reg(ISR),
        INT_MID_PARITY | INT_MID_MISS | INT_APER_PERM
    );

    // A later slot with good parity still grants the access.
    f.clear_isr();
    f.set_reg(master_id(SLOT + 1), good);
    f.set_apl(APL_64K_0, SLOT_BIT | (SLOT_BIT << 1) | APL_TZ);
    assert!(write32(&f.sys, 0xff00_0040, SECURE, 4));
    assert_eq!(f.downstream(0xff00_0040), 4);
    assert_eq!(f.reg(ISR), INT_MID_PARITY);
}

#[test]
fn enabling_mid_parity_checks_the_table() {
    let f = fixture();
    f.set_reg(master_id(SLOT), 0x03ff_0000 | MASTER as u32);
    assert_eq!(f.reg(ISR), 0);
    f.set_reg(CTRL, CTRL_ENABLE | CTRL_MID_PARITY_EN);
    assert_eq!(f.reg(ISR), INT_MID_PARITY);
}

#[test]
fn ids_then_ien_restores_imr() {
    let f = fixture();
    f.enable(0);
    let before = f.reg(IMR);
    f.set_reg(IDS, INT_APER_PERM);
    assert_eq!(f.reg(IMR), before | INT_APER_PERM);
    f.set_reg(IEN, INT_APER_PERM);
    assert_eq!(f.reg(IMR), before);
    assert_eq!(f.reg(IEN), 0);
    assert_eq!(f.reg(IDS), 0);
}

#[test]
fn irq_follows_unmasked_isr() {
    let f = fixture();
    f.enable(0);
    f.set_reg(IDS, INT_ALL);

    // APL of zero: nothing can match.
    assert!(write32(&f.sys, 0xff00_0000, SECURE, 1));
    assert_eq!(f.reg(ISR), INT_MID_MISS | INT_APER_PERM);
    assert!(!f.irq.is_asserted());

    f.set_reg(IEN, INT_MID_MISS);
    assert!(f.irq.is_asserted());
    f.set_reg(IDS, INT_MID_MISS);
    assert!(!f.irq.is_asserted());
    f.set_reg(IEN, INT_APER_PERM);
    assert!(f.irq.is_asserted());
    f.set_reg(ISR, INT_APER_PERM);
    assert!(!f.irq.is_asserted());
    assert_eq!(f.reg(ISR), INT_MID_MISS);
}

#[test]
fn disabled_apertures_are_not_decoded() {
    let f = fixture();
    for addr in [0xff99_0000, 0xff00_0000, 0xfe00_0000, 0xc000_0000] {
        assert_eq!(read32(&f.sys, addr, SECURE), None);
        assert!(!write32(&f.sys, addr, SECURE, 1));
    }
    // The register window stays reachable.
    assert_eq!(read32(&f.sys, XPPU_BASE + M_MASTER_IDS, CPU), Some(20));

    f.enable(0);
    for addr in [0xff99_0000, 0xff00_0000, 0xfe00_0000, 0xc000_0000] {
        assert!(read32(&f.sys, addr, SECURE).is_some());
    }

    f.set_reg(CTRL, 0);
    assert_eq!(read32(&f.sys, 0xff00_0000, SECURE), None);
}

#[test]
fn zero_apl_is_a_mid_miss() {
    let f = fixture();
    f.enable(0);
    assert_eq!(f.apl(APL_64K_0), 0);
    assert_eq!(read32(&f.sys, 0xff00_0100, SECURE), Some(0));
    assert_eq!(f.reg(ISR), INT_MID_MISS | INT_APER_PERM);
    assert_eq!(f.reg(ERR_STATUS1), 0xf_f000);
}

#[test]
fn first_fault_is_latched() {
    let f = fixture();
    f.enable(0);

    assert!(write32(&f.sys, 0xff00_0100, SECURE, 1));
    assert!(write32(&f.sys, 0xff01_0200, NON_SECURE, 2));
    assert_eq!(f.reg(ERR_STATUS1), 0xf_f000);
    assert_eq!(f.reg(ERR_STATUS2), MASTER as u32);

    f.clear_isr();
    let other = MemTxAttrs::secure(0x77);
    assert!(write32(&f.sys, 0xff01_0200, other, 3));
    assert_eq!(f.reg(ERR_STATUS1), 0xf_f010);
    assert_eq!(f.reg(ERR_STATUS2), 0x77);
}

#[test]
fn pending_inv_apb_does_not_block_latch() {
    let f = fixture();
    f.enable(0);
    // INV_APB is outside the latch mask.
    f.set_reg(0x20, 0);
    assert_eq!(f.reg(ISR), INT_INV_APB);
    assert!(write32(&f.sys, 0xff01_0000, SECURE, 1));
    assert_eq!(f.reg(ERR_STATUS1), 0xf_f010);
}

#[test]
fn read_only_master_can_read_but_not_write() {
    let f = fixture();
    f.enable(0);
    f.set_reg(master_id(SLOT), MIDR | 0x03ff_0000 | MASTER as u32);
    f.set_apl(APL_64K_1, SLOT_BIT);
    assert!(write32(&f.downstream, 0xff01_0008, CPU, 0xabcd));

    assert_eq!(read32(&f.sys, 0xff01_0008, SECURE), Some(0xabcd));
    assert_eq!(f.reg(ISR), 0);

    assert!(write32(&f.sys, 0xff01_0008, SECURE, 0));
    assert_eq!(f.downstream(0xff01_0008), 0xabcd);
    assert_eq!(f.reg(ISR), INT_MID_RO | INT_APER_PERM);
}

#[test]
fn granules_select_their_own_entries() {
    let f = fixture();
    f.enable(0);

    // 32B aperture, second region only.
    f.set_apl(APL_32B_BASE + 1, SLOT_BIT);
    assert!(write32(&f.sys, 0xff99_0024, SECURE, 0x24));
    assert_eq!(f.downstream(0xff99_0024), 0x24);
    assert!(write32(&f.sys, 0xff99_0040, SECURE, 0x40));
    assert_eq!(f.downstream(0xff99_0040), 0);
    assert_eq!(f.downstream(POISON_BASE + 0x40), 0x40);

    // 512MB aperture has a single entry.
    f.clear_isr();
    f.set_apl(APL_512M, SLOT_BIT);
    assert!(write32(&f.sys, 0xc000_0010, SECURE, 0x512));
    assert_eq!(f.downstream(0xc000_0010), 0x512);
    assert_eq!(f.reg(ISR), 0);
}

#[test]
fn poison_base_moves_poisoned_accesses() {
    let f = fixture();
    f.enable(0);
    f.set_reg(POISON, 0xf_f9c1);
    assert!(write32(&f.sys, 0xff00_0123, SECURE, 9));
    assert_eq!(f.downstream(POISON_BASE + 0x1123), 9);
}

#[test]
fn narrow_aperture_accesses_are_ignored() {
    let f = fixture();
    f.enable(0);
    f.set_apl(APL_64K_0, SLOT_BIT);
    assert!(f.sys.write(0xff00_0000, SECURE, &[1, 2]));
    assert_eq!(f.downstream(0xff00_0000), 0);
    assert_eq!(f.reg(ISR), 0);
}

#[test]
fn non_secure_register_access() {
    let f = fixture();
    assert_eq!(read32(&f.sys, XPPU_BASE + IMR, NON_SECURE), Some(0));
    assert!(write32(&f.sys, XPPU_BASE + CTRL, NON_SECURE, CTRL_ENABLE));
    assert_eq!(f.reg(CTRL), 0);
    assert!(write32(
        &f.sys,
        XPPU_BASE + PERM_RAM_START,
        NON_SECURE,
        SLOT_BIT
    ));
    assert_eq!(f.apl(0), 0);
}

#[test]
fn permission_ram_reads_back() {
    let f = fixture();
    for index in [0, 1, 255, 256, 383, 384, 399, 400] {
        f.set_apl(index, 0xf800_0000 | index as u32);
    }
    for index in [0, 1, 255, 256, 383, 384, 399, 400] {
        assert_eq!(f.apl(index), 0xf800_0000 | index as u32);
    }
    // One past the table is outside the register array.
    f.set_reg(PERM_RAM_START + 4 * 401, 1);
    assert_eq!(f.reg(PERM_RAM_START + 4 * 401), 0);
    assert_eq!(f.reg(ISR), 0);
}

#[test]
fn undefined_offsets() {
    let f = fixture();
    f.set_reg(0x60, 1);
    assert_eq!(f.reg(ISR), INT_INV_APB);
    f.clear_isr();
    assert_eq!(f.reg(0x150), 0);
    assert_eq!(f.reg(ISR), INT_INV_APB);
    f.clear_isr();
    f.set_reg(0x800, 1);
    assert_eq!(f.reg(0x800), 0);
    assert_eq!(f.reg(ISR), 0);
}

#[test]
fn unmasked_inv_apb_asserts_irq() {
    let f = fixture();
    f.set_reg(IEN, INT_INV_APB);
    assert!(!f.irq.is_asserted());

    assert_eq!(f.reg(0x150), 0);
    assert_eq!(f.reg(ISR), INT_INV_APB);
    assert!(f.irq.is_asserted());

    f.clear_isr();
    assert!(!f.irq.is_asserted());
    f.set_reg(0x60, 1);
    assert!(f.irq.is_asserted());
}

#[test]
fn reset_restores_defaults() {
    let f = fixture();
    f.enable(CTRL_APER_PARITY_EN);
    f.set_apl(APL_64K_0, SLOT_BIT);
    f.set_reg(POISON, 0x1);
    assert!(write32(&f.sys, 0xff00_0000, NON_SECURE, 1));
    assert!(f.irq.is_asserted());

    f.xppu.reset();
    assert_eq!(f.reg(CTRL), 0);
    assert_eq!(f.reg(ISR), 0);
    assert_eq!(f.reg(IMR), INT_ALL);
    assert_eq!(f.reg(POISON), 0xf_f9c0);
    assert_eq!(f.reg(master_id(0)), 0x83ff_0040);
    assert_eq!(f.reg(master_id(SLOT)), 0);
    assert_eq!(f.apl(APL_64K_0), 0);
    assert!(!f.irq.is_asserted());
    assert_eq!(read32(&f.sys, 0xff00_0000, SECURE), None);
}

#[test]
fn snapshot_restore_into_fresh_instance() {
    let f = fixture();
    f.enable(0);
    f.set_apl(APL_64K_1, SLOT_BIT | APL_TZ);
    f.set_apl(APL_512M, 0x0800_0003);
    assert!(write32(&f.sys, 0xff00_0300, SECURE, 1));
    assert!(f.irq.is_asserted());
    let snapshot = f.sys.snapshot_devices().unwrap();

    let g = fixture();
    assert!(!g.irq.is_asserted());
    g.sys.restore_devices(&snapshot).unwrap();
    for offset in [CTRL, ISR, IMR, ERR_STATUS1, ERR_STATUS2, master_id(SLOT)] {
        assert_eq!(g.reg(offset), f.reg(offset), "offset {:#x}", offset);
    }
    assert_eq!(g.apl(APL_64K_1), SLOT_BIT | APL_TZ);
    assert_eq!(g.apl(APL_512M), 0x0800_0003);
    assert!(g.irq.is_asserted());

    // Restored state keeps enforcing.
    assert!(write32(&g.sys, 0xff01_0000, NON_SECURE, 5));
    assert_eq!(g.downstream(0xff01_0000), 5);
}
