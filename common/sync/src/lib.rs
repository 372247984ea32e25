// Copyright 2018 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Sync primitive types whose methods panic rather than returning error in case of poison.
//!
//! Callers never see a `PoisonError`. They call `lock()` and get the guard.

mod mutex;

pub use crate::mutex::Mutex;
pub use crate::mutex::WouldBlock;
