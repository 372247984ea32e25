// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The four protected address windows of the XPPU.

use std::fmt;
use std::sync::Arc;

use anyhow::bail;
use log::error;
use log::warn;
use serde::Deserialize;
use serde::Serialize;
use sync::Mutex;

use super::state::ApertureDecision;
use super::state::XppuState;
use super::state::NR_32B_APL_ENTRIES;
use super::state::NR_64K_APL_ENTRIES;
use super::state::NR_1M_APL_ENTRIES;
use crate::Bus;
use crate::BusAccessInfo;
use crate::BusDevice;
use crate::BusDeviceSync;
use crate::Suspendable;

/// Size of the region each permission entry of an aperture governs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Granule {
    Size32B,
    Size64K,
    Size1M,
    Size512M,
}

impl fmt::Display for Granule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Granule::Size32B => "32B",
            Granule::Size64K => "64KB",
            Granule::Size1M => "1MB",
            Granule::Size512M => "512MB",
        };
        write!(f, "{}", s)
    }
}

/// Fixed geometry of one aperture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ApertureDescriptor {
    pub granule: Granule,
    /// Absolute address of the start of the protected window.
    pub base: u64,
    /// Address bits selecting the permission entry.
    pub extract_mask: u64,
    pub extract_shift: u32,
    /// First permission RAM entry used by this aperture.
    pub ram_base: usize,
}

impl ApertureDescriptor {
    /// Permission RAM index governing `addr`.
    pub fn apl_index(&self, addr: u64) -> usize {
        ((addr & self.extract_mask) >> self.extract_shift) as usize + self.ram_base
    }
}

/// Apertures in the order they follow the register window in the `reg` property.
pub const APERTURES: [ApertureDescriptor; 4] = [
    ApertureDescriptor {
        granule: Granule::Size32B,
        base: 0xff99_0000,
        extract_mask: 0x7f << 5,
        extract_shift: 5,
        ram_base: NR_64K_APL_ENTRIES,
    },
    ApertureDescriptor {
        granule: Granule::Size64K,
        base: 0xff00_0000,
        extract_mask: 0xff << 16,
        extract_shift: 16,
        ram_base: 0,
    },
    ApertureDescriptor {
        granule: Granule::Size1M,
        base: 0xfe00_0000,
        extract_mask: 0x0f << 20,
        extract_shift: 20,
        ram_base: NR_64K_APL_ENTRIES + NR_32B_APL_ENTRIES,
    },
    ApertureDescriptor {
        granule: Granule::Size512M,
        base: 0xc000_0000,
        extract_mask: 0,
        extract_shift: 0,
        ram_base: NR_64K_APL_ENTRIES + NR_32B_APL_ENTRIES + NR_1M_APL_ENTRIES,
    },
];

/// Bus device guarding one aperture. Authorized transactions are forwarded to the downstream
/// bus at the same address, denied ones are sent to the poison address instead.
pub struct XppuAperture {
    desc: ApertureDescriptor,
    state: Arc<Mutex<XppuState>>,
    downstream: Bus,
}

impl XppuAperture {
    pub fn new(
        desc: ApertureDescriptor,
        state: Arc<Mutex<XppuState>>,
        downstream: Bus,
    ) -> XppuAperture {
        XppuAperture {
            desc,
            state,
            downstream,
        }
    }

    pub fn descriptor(&self) -> &ApertureDescriptor {
        &self.desc
    }

    fn decide(&self, info: BusAccessInfo, len: usize, is_write: bool) -> Option<ApertureDecision> {
        if len != 4 {
            warn!(
                "{}: unsupported {} byte access at {:#x}",
                self.debug_label(),
                len,
                info.address
            );
            return None;
        }
        let mut state = self.state.lock();
        if !state.enabled() {
            error!(
                "{}: access at {:#x} while disabled",
                self.debug_label(),
                info.address
            );
            return None;
        }
        Some(state.aperture_access(&self.desc, info.offset, info.attrs, is_write))
    }
}

impl BusDevice for XppuAperture {
    fn debug_label(&self) -> String {
        format!("xppu aperture {}", self.desc.granule)
    }

    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        BusDeviceSync::read(self, info, data)
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        BusDeviceSync::write(self, info, data)
    }

    fn decoded(&self) -> bool {
        BusDeviceSync::decoded(self)
    }
}

impl BusDeviceSync for XppuAperture {
    fn read(&self, info: BusAccessInfo, data: &mut [u8]) {
        let Some(decision) = self.decide(info, data.len(), false) else {
            return;
        };
        // The state lock is released before the downstream device runs.
        let addr = decision.address();
        if !self.downstream.read(addr, info.attrs, data) {
            warn!("{}: nothing decodes {:#x}", self.debug_label(), addr);
        }
    }

    fn write(&self, info: BusAccessInfo, data: &[u8]) {
        let Some(decision) = self.decide(info, data.len(), true) else {
            return;
        };
        let addr = decision.address();
        if !self.downstream.write(addr, info.attrs, data) {
            warn!("{}: nothing decodes {:#x}", self.debug_label(), addr);
        }
    }

    fn decoded(&self) -> bool {
        self.state.lock().enabled()
    }

    fn snapshot_sync(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    fn restore_sync(&self, data: serde_json::Value) -> anyhow::Result<()> {
        if !data.is_null() {
            bail!("{}: unexpected snapshot data", self.debug_label());
        }
        Ok(())
    }
}

// The firewall state is saved by the register window device.
impl Suspendable for XppuAperture {
    fn snapshot(&self) -> anyhow::Result<serde_json::Value> {
        self.snapshot_sync()
    }

    fn restore(&mut self, data: serde_json::Value) -> anyhow::Result<()> {
        self.restore_sync(data)
    }
}
