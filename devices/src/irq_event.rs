// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A structure suitable for implementing level triggered interrupt outputs in device models.
///
/// The device drives the line with [`IrqLevelEvent::set_level()`] every time its interrupt state
/// may have changed. Clones share the same line, so the interrupt controller side keeps one clone
/// and samples it with [`IrqLevelEvent::is_asserted()`]. Every low to high transition is counted,
/// which lets a consumer detect pulses it did not observe.
#[derive(Clone, Debug, Default)]
pub struct IrqLevelEvent {
    inner: Arc<IrqLine>,
}

#[derive(Debug, Default)]
struct IrqLine {
    level: AtomicBool,
    rising_edges: AtomicU64,
}

impl IrqLevelEvent {
    pub fn new() -> IrqLevelEvent {
        IrqLevelEvent::default()
    }

    pub fn try_clone(&self) -> IrqLevelEvent {
        self.clone()
    }

    /// Drives the line to `asserted`.
    pub fn set_level(&self, asserted: bool) {
        let previous = self.inner.level.swap(asserted, Ordering::AcqRel);
        if asserted && !previous {
            self.inner.rising_edges.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Allows backend to inject interrupt.
    pub fn trigger(&self) {
        self.set_level(true);
    }

    /// Deasserts the line.
    pub fn clear_trigger(&self) {
        self.set_level(false);
    }

    pub fn is_asserted(&self) -> bool {
        self.inner.level.load(Ordering::Acquire)
    }

    /// Number of times the line went from low to high.
    pub fn rising_edges(&self) -> u64 {
        self.inner.rising_edges.load(Ordering::Acquire)
    }
}
