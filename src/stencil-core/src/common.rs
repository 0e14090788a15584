// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Returns true if `name` can be used verbatim as an identifier in
/// emitted C-family source.
pub fn is_valid_ident(name: &str) -> bool {
    IDENT_RE.is_match(name)
}

/// An identifier naming a dimension, array, scalar or callable.
///
/// Identifiers end up in generated source, so `Ident::new` rejects
/// anything that isn't a plain C identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Self> {
        if !is_valid_ident(name) {
            return Err(Error::new(
                ErrorKind::Kernel,
                ErrorCode::BadIdentifier,
                Some(name.to_owned()),
            ));
        }
        Ok(Ident(name.to_owned()))
    }

    /// Builds an identifier without validation.  Callers must only use
    /// this for names they composed from already-valid identifiers.
    pub fn from_unchecked(name: String) -> Self {
        Ident(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    Generic,
    BadIdentifier,
    DuplicateDimension,
    UnknownDimension,
    UnclassifiedDimension,
    UnknownEntity,
    DuplicateEntity,
    UnknownParameter,
    MissingKernelSource,
    BadShape,
    TimeOffsetOutOfRing,
    HaloExtentExceeded,
    MismatchedArguments,
    BadConfig,
    UnboundSymbol,
    IndexOutOfBounds,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            Generic => "generic",
            BadIdentifier => "bad_identifier",
            DuplicateDimension => "duplicate_dimension",
            UnknownDimension => "unknown_dimension",
            UnclassifiedDimension => "unclassified_dimension",
            UnknownEntity => "unknown_entity",
            DuplicateEntity => "duplicate_entity",
            UnknownParameter => "unknown_parameter",
            MissingKernelSource => "missing_kernel_source",
            BadShape => "bad_shape",
            TimeOffsetOutOfRing => "time_offset_out_of_ring",
            HaloExtentExceeded => "halo_extent_exceeded",
            MismatchedArguments => "mismatched_arguments",
            BadConfig => "bad_config",
            UnboundSymbol => "unbound_symbol",
            IndexOutOfBounds => "index_out_of_bounds",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Kernel,
    Propagator,
    Evaluation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Kernel => "KernelError",
            ErrorKind::Propagator => "PropagatorError",
            ErrorKind::Evaluation => "EvaluationError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[test]
fn test_ident_validation() {
    assert!(Ident::new("x").is_ok());
    assert!(Ident::new("dst_x").is_ok());
    assert!(Ident::new("_tmp0").is_ok());
    assert_eq!(Ident::new("u").unwrap().as_str(), "u");

    let err = Ident::new("0x").unwrap_err();
    assert_eq!(err.code, ErrorCode::BadIdentifier);
    assert_eq!(err.kind, ErrorKind::Kernel);
    assert!(Ident::new("").is_err());
    assert!(Ident::new("a.b").is_err());
    assert!(Ident::new("a b").is_err());
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Propagator,
        ErrorCode::MissingKernelSource,
        Some("main".to_owned()),
    );
    assert_eq!(
        "PropagatorError{missing_kernel_source: main}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Kernel, ErrorCode::UnknownEntity, None);
    assert_eq!("KernelError{unknown_entity}", format!("{err}"));
}
