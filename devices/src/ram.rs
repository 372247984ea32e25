// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::ensure;
use anyhow::Context;
use log::warn;
use serde::Deserialize;
use serde::Serialize;

use crate::BusAccessInfo;
use crate::BusDevice;
use crate::Suspendable;

/// Plain memory backed by a byte vector.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RamDevice {
    label: String,
    data: Vec<u8>,
}

impl RamDevice {
    pub fn new(label: &str, size: usize) -> RamDevice {
        RamDevice {
            label: label.to_owned(),
            data: vec![0; size],
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn range(&self, info: BusAccessInfo, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(info.offset).ok()?;
        let end = start.checked_add(len)?;
        if end > self.data.len() {
            warn!(
                "{}: access of {} bytes at {:#x} runs past the end",
                self.label, len, info.address
            );
            return None;
        }
        Some(start..end)
    }
}

impl BusDevice for RamDevice {
    fn debug_label(&self) -> String {
        self.label.clone()
    }

    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        if let Some(range) = self.range(info, data.len()) {
            data.copy_from_slice(&self.data[range]);
        }
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        if let Some(range) = self.range(info, data.len()) {
            self.data[range].copy_from_slice(data);
        }
    }
}

impl Suspendable for RamDevice {
    fn snapshot(&self) -> anyhow::Result<serde_json::Value> {
        serde_json::to_value(&self.data).context("error serializing ram")
    }

    fn restore(&mut self, data: serde_json::Value) -> anyhow::Result<()> {
        let data: Vec<u8> = serde_json::from_value(data).context("error deserializing ram")?;
        ensure!(
            data.len() == self.data.len(),
            "{}: snapshot of {} bytes, device has {}",
            self.label,
            data.len(),
            self.data.len()
        );
        self.data = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suspendable_tests;
    use crate::MemTxAttrs;

    fn info(offset: u64) -> BusAccessInfo {
        BusAccessInfo {
            offset,
            address: 0x1000 + offset,
            attrs: MemTxAttrs::default(),
        }
    }

    #[test]
    fn read_back_written_bytes() {
        let mut ram = RamDevice::new("ram", 16);
        ram.write(info(4), &[1, 2, 3, 4]);
        let mut data = [0u8; 4];
        ram.read(info(4), &mut data);
        assert_eq!(data, [1, 2, 3, 4]);
    }

    #[test]
    fn out_of_range_access_is_dropped() {
        let mut ram = RamDevice::new("ram", 16);
        ram.write(info(14), &[1, 2, 3, 4]);
        let mut data = [0xaau8; 4];
        ram.read(info(14), &mut data);
        assert_eq!(data, [0xaa; 4]);
    }

    fn modify_ram(ram: &mut RamDevice) {
        ram.write(info(0), &[0x5a]);
    }

    suspendable_tests!(ram, RamDevice::new("ram", 8), modify_ram);
}
