// Copyright 2018 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp::max;
use std::cmp::min;
use std::cmp::Ord;
use std::cmp::Ordering;
use std::cmp::PartialOrd;
use std::mem::size_of;

use log::debug;

/// Type of offset in the register space.
pub type RegisterOffset = u64;

/// Width of every register in a register space, in bytes.
pub const REGISTER_SIZE: u64 = size_of::<u32>() as u64;

/// This represents a range of memory in the register space starting.
/// Both from and to are inclusive.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct RegisterRange {
    pub from: RegisterOffset,
    pub to: RegisterOffset,
}

impl Ord for RegisterRange {
    fn cmp(&self, other: &RegisterRange) -> Ordering {
        self.from.cmp(&other.from)
    }
}

impl PartialOrd for RegisterRange {
    fn partial_cmp(&self, other: &RegisterRange) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl RegisterRange {
    /// Return true if those range overlaps.
    pub fn overlap_with(&self, other: &RegisterRange) -> bool {
        !(self.from > other.to || self.to < other.from)
    }

    /// Get the overlapping part of two RegisterRange.
    /// Return is Option(overlap_from, overlap_to).
    /// For example, (4,7).overlap_range(5, 8) will be Some(5, 7).
    pub fn overlap_range(&self, other: &RegisterRange) -> Option<RegisterRange> {
        if !self.overlap_with(other) {
            return None;
        }
        Some(RegisterRange {
            from: max(self.from, other.from),
            to: min(self.to, other.to),
        })
    }
}

/// Spec for a 32-bit register. It specifies its location in the register space, its reset value
/// and how guest writes are filtered.
#[derive(Clone, Debug)]
pub struct RegisterSpec {
    pub name: &'static str,
    pub offset: RegisterOffset,
    pub reset_value: u32,
    /// Bits with no defined function. Guest writes to them are dropped.
    pub reserved_mask: u32,
    /// Bits the guest cannot change.
    pub read_only_mask: u32,
    /// When write 1 to bits masked, those bits will be cleared.
    pub write_1_to_clear_mask: u32,
}

/// Old and new value of a register after a guest write.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegisterWrite {
    pub offset: RegisterOffset,
    pub old: u32,
    pub new: u32,
}

/// A 32-bit register as seen by the guest driver.
///
/// The owner of the register file provides the locking; the register itself is plain data.
#[derive(Clone, Debug)]
pub struct Register {
    spec: RegisterSpec,
    value: u32,
}

impl Register {
    pub fn new(spec: RegisterSpec) -> Self {
        let value = spec.reset_value;
        Register { spec, value }
    }

    /// Range of this register.
    pub fn range(&self) -> RegisterRange {
        RegisterRange {
            from: self.spec.offset,
            to: self.spec.offset + REGISTER_SIZE - 1,
        }
    }

    /// Get current value of this register.
    pub fn get_value(&self) -> u32 {
        self.value
    }

    /// Set value from device side. Write masks are not applied.
    pub fn set_value(&mut self, val: u32) {
        self.value = val;
    }

    /// Set masked bits.
    pub fn set_bits(&mut self, mask: u32) {
        self.value |= mask;
    }

    /// Clear masked bits.
    pub fn clear_bits(&mut self, mask: u32) {
        self.value &= !mask;
    }

    /// Reset this register to default value.
    pub fn reset(&mut self) {
        self.value = self.spec.reset_value;
    }

    /// This function apply "write 1 to clear mask", "read only mask" and "reserved mask".
    /// All guest write operations go through this, the result of this function is the new state
    /// of the register.
    pub fn apply_write_masks(&self, old: u32, write: u32) -> u32 {
        let spec = &self.spec;
        let w1c_mask = spec.write_1_to_clear_mask;
        let val = (!w1c_mask & write) | (w1c_mask & old & !write);
        let w_mask = !(spec.read_only_mask | spec.reserved_mask);
        (old & !w_mask) | (val & w_mask)
    }

    /// Handle a guest write. Returns the value before and after the write.
    pub fn write(&mut self, write: u32) -> RegisterWrite {
        if write & self.spec.reserved_mask != 0 {
            debug!(
                "{}: dropping write of {:#x} to reserved bits {:#x}",
                self.spec.name, write, self.spec.reserved_mask
            );
        }
        let old = self.value;
        self.value = self.apply_write_masks(old, write);
        RegisterWrite {
            offset: self.spec.offset,
            old,
            new: self.value,
        }
    }
}

/// Builds a read-write register. Optional masks default to zero.
#[macro_export]
macro_rules! register {
    (
        name: $name:expr,
        offset: $offset:expr,
        reset_value: $rv:expr,
        reserved_mask: $rsvd:expr,
        read_only_mask: $ro:expr,
        write_1_to_clear_mask: $w1c:expr,
    ) => {{
        use $crate::register_space::*;
        Register::new(RegisterSpec {
            name: $name,
            offset: $offset,
            reset_value: $rv,
            reserved_mask: $rsvd,
            read_only_mask: $ro,
            write_1_to_clear_mask: $w1c,
        })
    }};
    (
        name: $name:expr,
        offset: $offset:expr,
        reset_value: $rv:expr,
        reserved_mask: $rsvd:expr,
        read_only_mask: $ro:expr,
    ) => {
        $crate::register! {
            name: $name,
            offset: $offset,
            reset_value: $rv,
            reserved_mask: $rsvd,
            read_only_mask: $ro,
            write_1_to_clear_mask: 0,
        }
    };
    (name: $name:expr, offset: $offset:expr, reset_value: $rv:expr,) => {
        $crate::register! {
            name: $name,
            offset: $offset,
            reset_value: $rv,
            reserved_mask: 0,
            read_only_mask: 0,
            write_1_to_clear_mask: 0,
        }
    };
}

/// Builds a register initialized by hardware. The guest cannot change its value.
#[macro_export]
macro_rules! static_register {
    (name: $name:expr, offset: $offset:expr, value: $value:expr,) => {
        $crate::register! {
            name: $name,
            offset: $offset,
            reset_value: $value,
            reserved_mask: 0,
            read_only_mask: !0,
            write_1_to_clear_mask: 0,
        }
    };
}
