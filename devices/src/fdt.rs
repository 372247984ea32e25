// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoding of device tree `reg` properties for memory mapped devices.

use remain::sorted;
use thiserror::Error;

const SIZE_U32: usize = std::mem::size_of::<u32>();

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("#{name}-cells = {cells} is not supported")]
    InvalidCellCount { name: &'static str, cells: u32 },
    #[error("reg property of {len} bytes is not a multiple of {stride}")]
    MisalignedProperty { len: usize, stride: usize },
    #[error("reg property has {found} regions, at least {expected} required")]
    MissingRegions { expected: usize, found: usize },
    #[error("window {index} of {size:#x} bytes runs past the end of the address space")]
    WindowTooLarge { index: usize, size: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// One `(base, size)` pair of a `reg` property.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FdtRegion {
    pub base: u64,
    pub size: u64,
}

/// A decoded `reg` property.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FdtRegPropInfo {
    pub regions: Vec<FdtRegion>,
}

fn check_cells(name: &'static str, cells: u32) -> Result<()> {
    match cells {
        1 | 2 => Ok(()),
        _ => Err(Error::InvalidCellCount { name, cells }),
    }
}

fn read_cells(cells: &[u8]) -> u64 {
    cells.chunks(SIZE_U32).fold(0, |acc, cell| {
        let mut be = [0u8; SIZE_U32];
        be.copy_from_slice(cell);
        acc << 32 | u32::from_be_bytes(be) as u64
    })
}

impl FdtRegPropInfo {
    pub fn new(regions: Vec<FdtRegion>) -> FdtRegPropInfo {
        FdtRegPropInfo { regions }
    }

    /// Decodes the raw big-endian value of a `reg` property.
    pub fn from_propval(propval: &[u8], address_cells: u32, size_cells: u32) -> Result<Self> {
        check_cells("address", address_cells)?;
        check_cells("size", size_cells)?;

        let addr_len = address_cells as usize * SIZE_U32;
        let stride = addr_len + size_cells as usize * SIZE_U32;
        if propval.len() % stride != 0 {
            return Err(Error::MisalignedProperty {
                len: propval.len(),
                stride,
            });
        }

        let regions = propval
            .chunks(stride)
            .map(|entry| FdtRegion {
                base: read_cells(&entry[..addr_len]),
                size: read_cells(&entry[addr_len..]),
            })
            .collect();
        Ok(FdtRegPropInfo { regions })
    }

    /// Decodes a `reg` property given as a list of 32-bit cells.
    pub fn from_cells(cells: &[u32], address_cells: u32, size_cells: u32) -> Result<Self> {
        let propval: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        Self::from_propval(&propval, address_cells, size_cells)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Devices that place their MMIO windows from a device tree `reg` property.
pub trait FdtGenericMmap {
    fn parse_reg(&mut self, reg: &FdtRegPropInfo) -> Result<()>;
}
