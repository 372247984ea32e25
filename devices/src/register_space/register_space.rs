// Copyright 2018 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::btree_map::BTreeMap;

use log::error;

use super::register::Register;
use super::register::RegisterOffset;
use super::register::RegisterRange;
use super::register::RegisterWrite;

/// Register space repesents a set of registers. It can handle read/write operations.
#[derive(Clone, Debug, Default)]
pub struct RegisterSpace {
    regs: BTreeMap<RegisterRange, Register>,
}

impl RegisterSpace {
    /// Creates a new empty RegisterSpace.
    pub fn new() -> RegisterSpace {
        RegisterSpace {
            regs: BTreeMap::new(),
        }
    }

    /// Add a register to register space.
    pub fn add_register(&mut self, reg: Register) {
        let range = reg.range();
        debug_assert!(self.get_register(range.from).is_none());
        if cfg!(debug_assertions) {
            if let Some(r) = self.first_before(range.to) {
                debug_assert!(!r.range().overlap_with(&range));
            }
        }

        let insert_result = self.regs.insert(range, reg).is_none();
        debug_assert!(insert_result);
    }

    /// Add an array of registers.
    pub fn add_register_array<I: IntoIterator<Item = Register>>(&mut self, regs: I) {
        for r in regs {
            self.add_register(r);
        }
    }

    /// Guest read of the register containing `addr`. Returns None when no register is there.
    pub fn read(&self, addr: RegisterOffset) -> Option<u32> {
        self.get_register(addr).map(Register::get_value)
    }

    /// Guest write of the register containing `addr`. Write masks are applied. Returns None when
    /// no register is there.
    pub fn write(&mut self, addr: RegisterOffset, value: u32) -> Option<RegisterWrite> {
        self.get_register_mut(addr).map(|r| r.write(value))
    }

    /// Device side read. Reading a register that does not exist is a device model bug.
    pub fn get(&self, addr: RegisterOffset) -> u32 {
        match self.get_register(addr) {
            Some(r) => r.get_value(),
            None => {
                error!("no register at {:#x}, register space might have a bug", addr);
                0
            }
        }
    }

    /// Device side write. Write masks are not applied.
    pub fn set(&mut self, addr: RegisterOffset, value: u32) {
        match self.get_register_mut(addr) {
            Some(r) => r.set_value(value),
            None => error!("no register at {:#x}, register space might have a bug", addr),
        }
    }

    /// Device side update of masked bits.
    pub fn set_bits(&mut self, addr: RegisterOffset, mask: u32) {
        let value = self.get(addr) | mask;
        self.set(addr, value);
    }

    /// Device side clear of masked bits.
    pub fn clear_bits(&mut self, addr: RegisterOffset, mask: u32) {
        let value = self.get(addr) & !mask;
        self.set(addr, value);
    }

    /// Returns true if a register covers `addr`.
    pub fn contains(&self, addr: RegisterOffset) -> bool {
        self.get_register(addr).is_some()
    }

    /// Reset every register to its default value.
    pub fn reset(&mut self) {
        for r in self.regs.values_mut() {
            r.reset();
        }
    }

    /// Current value of every register, keyed by offset.
    pub fn values(&self) -> BTreeMap<RegisterOffset, u32> {
        self.regs
            .values()
            .map(|r| (r.range().from, r.get_value()))
            .collect()
    }

    /// Loads values captured by `values`. Offsets without a register are returned.
    pub fn load_values(&mut self, values: &BTreeMap<RegisterOffset, u32>) -> Vec<RegisterOffset> {
        let mut unknown = Vec::new();
        for (&offset, &value) in values {
            match self.get_register_mut(offset) {
                Some(r) => r.set_value(value),
                None => unknown.push(offset),
            }
        }
        unknown
    }

    /// Get first register before this addr.
    fn first_before(&self, addr: RegisterOffset) -> Option<&Register> {
        self.regs
            .range(..=RegisterRange {
                from: addr,
                to: addr,
            })
            .next_back()
            .map(|(_, r)| r)
    }

    /// Get register at this addr.
    fn get_register(&self, addr: RegisterOffset) -> Option<&Register> {
        let r = self.first_before(addr)?;
        let range = r.range();
        if addr <= range.to {
            Some(r)
        } else {
            None
        }
    }

    fn get_register_mut(&mut self, addr: RegisterOffset) -> Option<&mut Register> {
        let (_, r) = self
            .regs
            .range_mut(..=RegisterRange {
                from: addr,
                to: addr,
            })
            .next_back()?;
        if addr <= r.range().to {
            Some(r)
        } else {
            None
        }
    }
}
