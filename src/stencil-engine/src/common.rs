// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

pub use stencil_core::common::*;

/// Returns `base`, or the first of `base_0`, `base_1`, ... not already
/// in `taken`, and marks the returned name as taken.  `base` must be a
/// valid identifier.
pub(crate) fn fresh_ident(base: &str, taken: &mut BTreeSet<String>) -> Ident {
    let mut name = base.to_owned();
    let mut n = 0;
    while taken.contains(&name) {
        name = format!("{base}_{n}");
        n += 1;
    }
    taken.insert(name.clone());
    Ident::from_unchecked(name)
}

// Macros for error creation - these need to stay in stencil-engine
// as they use crate-local paths

#[macro_export]
macro_rules! kernel_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Kernel, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Kernel, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! prop_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Propagator,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Propagator, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! eval_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Evaluation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
}

#[macro_export]
macro_rules! config_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Config,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);
