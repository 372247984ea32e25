// Copyright 2018 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

#[macro_use]
mod register;
mod register_space;

pub use self::register::*;
pub use self::register_space::*;
