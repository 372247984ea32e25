// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Xilinx Peripheral Protection Unit.
//!
//! The XPPU sits between bus masters and a set of peripherals. Each of its four apertures covers
//! an address window split into fixed size regions, and every region has a permission list entry
//! (APL) naming the MASTER_IDxx entries allowed to reach it. Transactions that fail the check are
//! sent to a poison address instead and the first such fault is recorded in ERR_STATUS1/2.

mod aperture;
pub mod parity;
pub mod regs;
mod state;

use std::sync::Arc;

use log::debug;
use log::warn;
use remain::sorted;
use sync::Mutex;
use thiserror::Error;

pub use self::aperture::ApertureDescriptor;
pub use self::aperture::Granule;
pub use self::aperture::XppuAperture;
pub use self::aperture::APERTURES;
pub use self::state::ApertureDecision;
pub use self::state::APL_MID_ENABLE_MASK;
pub use self::state::APL_TZ;
pub use self::state::NR_APL_ENTRIES;
pub use self::state::PERM_RAM_END;
pub use self::state::PERM_RAM_START;
use self::state::XppuState;
use crate::fdt;
use crate::fdt::FdtGenericMmap;
use crate::fdt::FdtRegPropInfo;
use crate::fdt::FdtRegion;
use crate::Bus;
use crate::BusAccessInfo;
use crate::BusDevice;
use crate::BusDeviceSync;
use crate::BusError;
use crate::IrqLevelEvent;
use crate::Suspendable;

/// Size of the register window, permission RAM included.
pub const XPPU_REGS_SIZE: u64 = 0x1_0000;

#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to insert {label} into the bus: {source}")]
    Bus {
        label: String,
        #[source]
        source: BusError,
    },
    #[error("register window not configured, parse_reg must run first")]
    NoRegisterWindow,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Register window of an XPPU, permission RAM included.
pub struct XppuRegisters {
    state: Arc<Mutex<XppuState>>,
}

impl XppuRegisters {
    fn check_size(&self, info: BusAccessInfo, len: usize) -> bool {
        if len != 4 {
            warn!(
                "{}: unsupported {} byte access at {:#x}",
                self.debug_label(),
                len,
                info.offset
            );
            return false;
        }
        true
    }
}

impl BusDevice for XppuRegisters {
    fn debug_label(&self) -> String {
        "xppu registers".to_owned()
    }

    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        BusDeviceSync::read(self, info, data)
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        BusDeviceSync::write(self, info, data)
    }
}

impl BusDeviceSync for XppuRegisters {
    fn read(&self, info: BusAccessInfo, data: &mut [u8]) {
        if !self.check_size(info, data.len()) {
            return;
        }
        let val = self.state.lock().read(info.offset, info.attrs);
        data.copy_from_slice(&val.to_le_bytes());
    }

    fn write(&self, info: BusAccessInfo, data: &[u8]) {
        if !self.check_size(info, data.len()) {
            return;
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(data);
        self.state
            .lock()
            .write(info.offset, u32::from_le_bytes(bytes), info.attrs);
    }

    fn snapshot_sync(&self) -> anyhow::Result<serde_json::Value> {
        self.state.lock().snapshot()
    }

    fn restore_sync(&self, data: serde_json::Value) -> anyhow::Result<()> {
        self.state.lock().restore(data)
    }
}

impl Suspendable for XppuRegisters {
    fn snapshot(&self) -> anyhow::Result<serde_json::Value> {
        self.snapshot_sync()
    }

    fn restore(&mut self, data: serde_json::Value) -> anyhow::Result<()> {
        self.restore_sync(data)
    }
}

/// An XPPU instance. Its windows are placed by [`FdtGenericMmap::parse_reg`] and mapped with
/// [`Xppu::attach`].
pub struct Xppu {
    state: Arc<Mutex<XppuState>>,
    irq: IrqLevelEvent,
    registers: Arc<XppuRegisters>,
    downstream: Bus,
    reg_window: Option<FdtRegion>,
    apertures: Vec<(FdtRegion, Arc<XppuAperture>)>,
}

impl Xppu {
    /// Creates an XPPU in its reset state. Authorized aperture accesses and poisoned ones are
    /// both issued on `downstream`.
    pub fn new(irq: IrqLevelEvent, downstream: Bus) -> Xppu {
        let state = Arc::new(Mutex::new(XppuState::new(irq.try_clone())));
        Xppu {
            registers: Arc::new(XppuRegisters {
                state: state.clone(),
            }),
            state,
            irq,
            downstream,
            reg_window: None,
            apertures: Vec::new(),
        }
    }

    pub fn reset(&self) {
        self.state.lock().reset();
    }

    /// Returns true while CTRL.ENABLE is set.
    pub fn enabled(&self) -> bool {
        self.state.lock().enabled()
    }

    pub fn irq_asserted(&self) -> bool {
        self.irq.is_asserted()
    }

    pub fn registers(&self) -> Arc<XppuRegisters> {
        self.registers.clone()
    }

    pub fn register_window(&self) -> Option<FdtRegion> {
        self.reg_window
    }

    /// Aperture devices created by the last `parse_reg`, with the windows they occupy.
    pub fn apertures(&self) -> &[(FdtRegion, Arc<XppuAperture>)] {
        &self.apertures
    }

    /// Maps the register window and every aperture window on `bus`.
    pub fn attach(&self, bus: &Bus) -> Result<()> {
        let reg_window = self.reg_window.ok_or(Error::NoRegisterWindow)?;
        bus.insert_sync(self.registers.clone(), reg_window.base, reg_window.size)
            .map_err(|source| Error::Bus {
                label: self.registers.debug_label(),
                source,
            })?;
        for (window, aperture) in &self.apertures {
            bus.insert_sync(aperture.clone(), window.base, window.size)
                .map_err(|source| Error::Bus {
                    label: aperture.debug_label(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl FdtGenericMmap for Xppu {
    fn parse_reg(&mut self, reg: &FdtRegPropInfo) -> fdt::Result<()> {
        let first = reg.regions.first().ok_or(fdt::Error::MissingRegions {
            expected: 1,
            found: 0,
        })?;
        if first.size != XPPU_REGS_SIZE {
            debug!(
                "xppu: register window of {:#x} bytes, using {:#x}",
                first.size, XPPU_REGS_SIZE
            );
        }
        self.reg_window = Some(FdtRegion {
            base: first.base,
            size: XPPU_REGS_SIZE,
        });

        let mut apertures = Vec::new();
        for (index, (window, desc)) in reg.regions[1..].iter().zip(APERTURES.iter()).enumerate() {
            // Aperture addresses are `desc.base + offset` for every offset inside the window.
            if desc.base.checked_add(window.size).is_none() {
                return Err(fdt::Error::WindowTooLarge {
                    index: index + 1,
                    size: window.size,
                });
            }
            debug!(
                "xppu: {} aperture at {:#x}+{:#x}",
                desc.granule, window.base, window.size
            );
            let aperture = XppuAperture::new(*desc, self.state.clone(), self.downstream.clone());
            apertures.push((*window, Arc::new(aperture)));
        }
        self.apertures = apertures;
        if reg.len() > APERTURES.len() + 1 {
            warn!("xppu: ignoring {} extra reg regions", reg.len() - APERTURES.len() - 1);
        }
        Ok(())
    }
}
