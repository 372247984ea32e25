// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Trait to save and restore the state of virtual hardware.

use anyhow::anyhow;

/// This trait provides the functions a device implements so that its guest-visible state can be
/// saved and later loaded into a fresh instance.
pub trait Suspendable {
    /// Save the device state in an image that can be restored.
    fn snapshot(&self) -> anyhow::Result<serde_json::Value> {
        Err(anyhow!(
            "Suspendable::snapshot not implemented for {}",
            std::any::type_name::<Self>()
        ))
    }
    /// Load a saved snapshot of an image.
    fn restore(&mut self, _data: serde_json::Value) -> anyhow::Result<()> {
        Err(anyhow!(
            "Suspendable::restore not implemented for {}",
            std::any::type_name::<Self>()
        ))
    }
}

// General tests that should pass on all suspendables.
// Device-specific behavior still needs its own tests; these only check the trait contract.
#[macro_export]
macro_rules! suspendable_tests {
    ($name:ident, $dev:expr, $modfun:ident) => {
        mod $name {
            use super::*;

            #[test]
            fn test_unused_snapshot() {
                let mut unit = $dev;
                let snap = unit.snapshot().expect("failed to snapshot");
                unit.restore(snap).expect("failed to restore");
            }

            #[test]
            fn test_snapshot_restore() {
                let unit = $dev;
                let snap = unit.snapshot().expect("failed to snapshot");
                let mut unit2 = $dev;
                $modfun(&mut unit2);
                unit2.restore(snap.clone()).expect("failed to restore");
                let snap2 = unit2.snapshot().expect("failed to snapshot");
                assert_eq!(snap, snap2);
            }
        }
    };
}
