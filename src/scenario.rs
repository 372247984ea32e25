// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Scenario files: a device tree `reg` property, the memory behind the firewall, register setup
//! and a list of bus transactions to run.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Context;
use devices::xppu::regs;
use devices::Bus;
use devices::FdtGenericMmap;
use devices::FdtRegPropInfo;
use devices::IrqLevelEvent;
use devices::MemTxAttrs;
use devices::RamDevice;
use devices::Xppu;
use log::debug;
use log::info;
use serde::Deserialize;
use serde::Serialize;
use sync::Mutex;

fn default_cells() -> u32 {
    2
}

fn default_secure() -> bool {
    true
}

/// The `reg` property of the firewall node, as a list of 32-bit cells.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RegProperty {
    #[serde(default = "default_cells")]
    pub address_cells: u32,
    #[serde(default = "default_cells")]
    pub size_cells: u32,
    pub cells: Vec<u32>,
}

/// Memory mapped behind the firewall.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RamRegion {
    pub label: String,
    pub base: u64,
    pub size: u64,
}

/// A register write issued by the secure CPU before any transaction runs.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegisterWrite {
    pub offset: u64,
    pub value: u32,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Transaction {
    pub address: u64,
    pub master_id: u16,
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// Value to write. The transaction is a read when absent.
    #[serde(default)]
    pub write: Option<u32>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub reg: RegProperty,
    #[serde(default)]
    pub ram: Vec<RamRegion>,
    #[serde(default)]
    pub setup: Vec<RegisterWrite>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Scenario> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TransactionResult {
    pub address: u64,
    /// False when nothing on the system bus claimed the address.
    pub decoded: bool,
    pub value: Option<u32>,
}

/// State of the firewall after a scenario ran.
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub transactions: Vec<TransactionResult>,
    pub isr: u32,
    pub err_status1: u32,
    pub err_status2: u32,
    pub irq: bool,
    pub snapshot: Option<serde_json::Value>,
}

const CPU: MemTxAttrs = MemTxAttrs {
    secure: true,
    master_id: 0,
};

fn read_u32(bus: &Bus, addr: u64, attrs: MemTxAttrs) -> Option<u32> {
    let mut data = [0u8; 4];
    if bus.read(addr, attrs, &mut data) {
        Some(u32::from_le_bytes(data))
    } else {
        None
    }
}

fn register_address(base: u64, offset: u64) -> anyhow::Result<u64> {
    base.checked_add(offset)
        .with_context(|| format!("register offset {:#x} overflows the address space", offset))
}

fn read_register(bus: &Bus, base: u64, offset: u64) -> anyhow::Result<u32> {
    read_u32(bus, register_address(base, offset)?, CPU)
        .with_context(|| format!("register {:#x} is not mapped", offset))
}

/// Builds the system described by `scenario` and runs its transactions in order.
pub fn run(scenario: &Scenario, snapshot: bool) -> anyhow::Result<Outcome> {
    let downstream = Bus::new();
    for region in &scenario.ram {
        let size = usize::try_from(region.size)
            .with_context(|| format!("ram {} is too large", region.label))?;
        let ram = RamDevice::new(&region.label, size);
        let len = ram.size();
        downstream
            .insert(Arc::new(Mutex::new(ram)), region.base, len)
            .with_context(|| format!("failed to map ram {}", region.label))?;
    }

    let irq = IrqLevelEvent::new();
    let mut xppu = Xppu::new(irq.try_clone(), downstream);
    let reg = FdtRegPropInfo::from_cells(
        &scenario.reg.cells,
        scenario.reg.address_cells,
        scenario.reg.size_cells,
    )
    .context("invalid reg property")?;
    xppu.parse_reg(&reg).context("invalid reg property")?;

    let sys = Bus::new();
    xppu.attach(&sys).context("failed to attach xppu")?;
    let base = match xppu.register_window() {
        Some(window) => window.base,
        None => bail!("xppu has no register window"),
    };
    info!(
        "xppu at {:#x} with {} apertures",
        base,
        xppu.apertures().len()
    );

    for write in &scenario.setup {
        debug!("setup: {:#x} = {:#x}", write.offset, write.value);
        let addr = register_address(base, write.offset)?;
        if !sys.write(addr, CPU, &write.value.to_le_bytes()) {
            bail!("register {:#x} is not mapped", write.offset);
        }
    }

    let mut transactions = Vec::with_capacity(scenario.transactions.len());
    for t in &scenario.transactions {
        let attrs = MemTxAttrs {
            secure: t.secure,
            master_id: t.master_id,
        };
        let result = match t.write {
            Some(value) => TransactionResult {
                address: t.address,
                decoded: sys.write(t.address, attrs, &value.to_le_bytes()),
                value: None,
            },
            None => {
                let value = read_u32(&sys, t.address, attrs);
                TransactionResult {
                    address: t.address,
                    decoded: value.is_some(),
                    value,
                }
            }
        };
        transactions.push(result);
    }

    let snapshot = if snapshot {
        Some(serde_json::to_value(
            sys.snapshot_devices().context("failed to snapshot")?,
        )?)
    } else {
        None
    };

    Ok(Outcome {
        transactions,
        isr: read_register(&sys, base, regs::ISR)?,
        err_status1: read_register(&sys, base, regs::ERR_STATUS1)?,
        err_status2: read_register(&sys, base, regs::ERR_STATUS2)?,
        irq: xppu.irq_asserted(),
        snapshot,
    })
}
