// Copyright 2017 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Emulates memory mapped hardware devices.

mod bus;
pub mod fdt;
mod irq_event;
#[macro_use]
mod register_space;
mod ram;
mod suspendable;
pub mod xppu;

pub use self::bus::Bus;
pub use self::bus::BusAccessInfo;
pub use self::bus::BusDevice;
pub use self::bus::BusDeviceSync;
pub use self::bus::BusRange;
pub use self::bus::Error as BusError;
pub use self::bus::MemTxAttrs;
pub use self::fdt::FdtGenericMmap;
pub use self::fdt::FdtRegPropInfo;
pub use self::fdt::FdtRegion;
pub use self::irq_event::IrqLevelEvent;
pub use self::ram::RamDevice;
pub use self::suspendable::Suspendable;
pub use self::xppu::Error as XppuError;
pub use self::xppu::Xppu;
pub use self::xppu::XppuAperture;
pub use self::xppu::XppuRegisters;
