// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;

pub use common::{Error, ErrorCode, ErrorKind, Ident, Result, is_valid_ident};
