// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeMap;

use anyhow::bail;
use anyhow::ensure;
use log::debug;
use log::warn;
use serde::Deserialize;
use serde::Serialize;

use super::aperture::ApertureDescriptor;
use super::parity::apl_parity_ok;
use super::parity::mid_parity_ok;
use super::regs::*;
use crate::register_space::RegisterOffset;
use crate::register_space::RegisterSpace;
use crate::IrqLevelEvent;
use crate::MemTxAttrs;

pub const NR_32B_APL_ENTRIES: usize = 128;
pub const NR_64K_APL_ENTRIES: usize = 256;
pub const NR_1M_APL_ENTRIES: usize = 16;
pub const NR_512M_APL_ENTRIES: usize = 1;
pub const NR_APL_ENTRIES: usize =
    NR_32B_APL_ENTRIES + NR_64K_APL_ENTRIES + NR_1M_APL_ENTRIES + NR_512M_APL_ENTRIES;

/// Permission RAM window inside the register space.
pub const PERM_RAM_START: u64 = 0x1000;
pub const PERM_RAM_END: u64 = PERM_RAM_START + 4 * NR_APL_ENTRIES as u64;

/// APL bit allowing non-secure masters through.
pub const APL_TZ: u32 = 1 << 27;
/// APL bits selecting MASTER_IDxx entries.
pub const APL_MID_ENABLE_MASK: u32 = (1 << NR_MID_ENTRIES) - 1;

const POISON_ADDR_SHIFT: u32 = 12;
const POISON_OFFSET_MASK: u64 = (1 << POISON_ADDR_SHIFT) - 1;

/// Where an aperture transaction ends up after the permission check.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ApertureDecision {
    /// Authorized, forwarded to this downstream address.
    Forward(u64),
    /// Rejected, redirected to this address inside the poison region.
    Poison(u64),
}

impl ApertureDecision {
    pub fn address(&self) -> u64 {
        match *self {
            ApertureDecision::Forward(addr) | ApertureDecision::Poison(addr) => addr,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct XppuSnapshot {
    regs: BTreeMap<RegisterOffset, u32>,
    perm_ram: Vec<u32>,
}

/// Everything a single firewall instance owns. One lock covers all of it.
pub struct XppuState {
    regs: RegisterSpace,
    perm_ram: Vec<u32>,
    irq: IrqLevelEvent,
}

impl XppuState {
    pub fn new(irq: IrqLevelEvent) -> XppuState {
        let mut state = XppuState {
            regs: xppu_registers(),
            perm_ram: vec![0; NR_APL_ENTRIES],
            irq,
        };
        state.reset();
        state
    }

    /// Puts every register back to its hardware default and clears the permission RAM.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.perm_ram.iter_mut().for_each(|apl| *apl = 0);
        self.update_irq();
    }

    pub fn enabled(&self) -> bool {
        self.regs.get(CTRL) & CTRL_ENABLE != 0
    }

    fn ctrl(&self, field: u32) -> bool {
        self.regs.get(CTRL) & field != 0
    }

    pub fn irq_pending(&self) -> bool {
        self.regs.get(ISR) & !self.regs.get(IMR) != 0
    }

    fn update_irq(&self) {
        self.irq.set_level(self.irq_pending());
    }

    fn raise(&mut self, fault: u32) {
        self.regs.set_bits(ISR, fault);
    }

    /// Checks the parity of MASTER_ID`index` when MID parity checking is on.
    fn check_mid_parity(&mut self, index: usize) -> bool {
        if !self.ctrl(CTRL_MID_PARITY_EN) {
            return true;
        }
        let val = self.regs.get(master_id(index));
        if mid_parity_ok(val) {
            return true;
        }
        warn!("xppu: bad parity in MASTER_ID{:02} = {:#x}", index, val);
        self.raise(INT_MID_PARITY);
        false
    }

    fn check_mid_parities(&mut self) {
        for i in 0..NR_MID_ENTRIES {
            self.check_mid_parity(i);
        }
    }

    fn check_apl_parity(&mut self, apl: u32) -> bool {
        if !self.ctrl(CTRL_APER_PARITY_EN) || apl_parity_ok(apl) {
            return true;
        }
        warn!("xppu: bad APL parity {:#x}", apl);
        self.raise(INT_APER_PARITY);
        false
    }

    /// Decides whether the master in `attrs` may access a region guarded by `apl`. Every
    /// violation seen along the way is recorded in ISR.
    pub fn check_permission(&mut self, apl: u32, attrs: MemTxAttrs, is_write: bool) -> bool {
        if !self.check_apl_parity(apl) {
            return false;
        }

        let tz = apl & APL_TZ != 0;
        let mids = apl & APL_MID_ENABLE_MASK;
        let mut mid_match = false;
        for i in 0..NR_MID_ENTRIES {
            if mids & (1 << i) == 0 {
                continue;
            }
            if !self.check_mid_parity(i) {
                continue;
            }

            let entry = MasterIdEntry::decode(self.regs.get(master_id(i)));
            if !entry.matches(attrs.master_id) {
                continue;
            }
            mid_match = true;

            if entry.read_only && is_write {
                self.raise(INT_MID_RO);
                continue;
            }
            if !attrs.secure && !tz {
                self.raise(INT_APER_TZ);
                continue;
            }
            return true;
        }

        if !mid_match {
            // No entry got past masking and compare.
            self.raise(INT_MID_MISS);
        }
        false
    }

    /// Runs the permission check for a transaction at `offset` into the aperture described by
    /// `aperture` and returns where the transaction must go.
    pub fn aperture_access(
        &mut self,
        aperture: &ApertureDescriptor,
        offset: u64,
        attrs: MemTxAttrs,
        is_write: bool,
    ) -> ApertureDecision {
        let addr = aperture.base + offset;

        // Faults are only captured while none of ISR[7:1] except MID_PARITY is pending.
        let isr_free = self.regs.get(ISR) & ISR_LATCH_MASK == 0;

        let apl = self.perm_ram[aperture.apl_index(addr)];
        if self.check_permission(apl, attrs, is_write) {
            return ApertureDecision::Forward(addr);
        }

        if isr_free {
            self.raise(INT_APER_PERM);
            self.regs.set(
                ERR_STATUS1,
                (addr >> POISON_ADDR_SHIFT) as u32 & ERR_STATUS1_AXI_ADDR_MASK,
            );
            self.regs
                .set(ERR_STATUS2, attrs.master_id as u32 & ERR_STATUS2_AXI_ID_MASK);
        }

        // Bits 11:0 stay, bits 31:12 come from POISON.BASE, everything above is cleared.
        let poison_base = (self.regs.get(POISON) & POISON_BASE_MASK) as u64;
        let poisoned = (addr & POISON_OFFSET_MASK) | poison_base << POISON_ADDR_SHIFT;
        debug!(
            "xppu: master {:#x} denied at {:#x}, poisoned to {:#x}",
            attrs.master_id, addr, poisoned
        );
        self.update_irq();
        ApertureDecision::Poison(poisoned)
    }

    fn perm_ram_index(offset: u64) -> Option<usize> {
        if (PERM_RAM_START..PERM_RAM_END).contains(&offset) {
            Some(((offset - PERM_RAM_START) / 4) as usize)
        } else {
            None
        }
    }

    /// Register window read.
    pub fn read(&mut self, offset: u64, attrs: MemTxAttrs) -> u32 {
        if !attrs.secure {
            return 0;
        }

        if let Some(index) = Self::perm_ram_index(offset) {
            return self.perm_ram[index];
        }

        if offset >= REGS_END {
            warn!("xppu: decode error: read from {:#x}", offset);
            return 0;
        }

        match self.regs.read(offset) {
            Some(val) => val,
            None => {
                warn!("xppu: decode error: read from {:#x}", offset);
                self.raise(INT_INV_APB);
                self.update_irq();
                0
            }
        }
    }

    /// Register window write.
    pub fn write(&mut self, offset: u64, value: u32, attrs: MemTxAttrs) {
        if !attrs.secure {
            return;
        }

        if let Some(index) = Self::perm_ram_index(offset) {
            self.perm_ram[index] = value;
            return;
        }

        if offset >= REGS_END {
            warn!("xppu: decode error: write to {:#x}={:#x}", offset, value);
            return;
        }

        if !self.regs.contains(offset) {
            warn!("xppu: decode error: write to {:#x}={:#x}", offset, value);
            self.raise(INT_INV_APB);
            self.update_irq();
            return;
        }

        // Strobes act on IMR and always read back as zero.
        match offset & !3 {
            IEN => {
                self.regs.clear_bits(IMR, value & INT_ALL);
                self.update_irq();
            }
            IDS => {
                self.regs.set_bits(IMR, value & INT_ALL);
                self.update_irq();
            }
            aligned => {
                let write = self.regs.write(aligned, value);
                self.post_write(aligned, write.map(|w| w.old).unwrap_or(0));
            }
        }
    }

    fn post_write(&mut self, offset: u64, old: u32) {
        match offset {
            CTRL => {
                let enabled = self.enabled();
                if enabled != (old & CTRL_ENABLE != 0) {
                    debug!(
                        "xppu: apertures {}",
                        if enabled { "enabled" } else { "disabled" }
                    );
                }
                self.check_mid_parities();
                self.update_irq();
            }
            ISR => self.update_irq(),
            _ => {
                if let Some(index) = master_id_index(offset) {
                    self.check_mid_parity(index);
                    self.update_irq();
                }
            }
        }
    }

    pub fn snapshot(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::to_value(XppuSnapshot {
            regs: self.regs.values(),
            perm_ram: self.perm_ram.clone(),
        })?)
    }

    pub fn restore(&mut self, data: serde_json::Value) -> anyhow::Result<()> {
        let snap: XppuSnapshot = serde_json::from_value(data)?;
        ensure!(
            snap.perm_ram.len() == NR_APL_ENTRIES,
            "permission RAM has {} entries, expected {}",
            snap.perm_ram.len(),
            NR_APL_ENTRIES
        );
        let mut regs = xppu_registers();
        let unknown = regs.load_values(&snap.regs);
        if !unknown.is_empty() {
            bail!("snapshot has values for unknown registers {:x?}", unknown);
        }
        self.regs = regs;
        self.perm_ram = snap.perm_ram;
        self.update_irq();
        Ok(())
    }
}
