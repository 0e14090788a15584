// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;
pub mod datamodel;
pub mod dimensions;
pub mod expr;
pub mod types;

pub mod ir;

pub mod copy;
pub mod function;
pub mod halo;
pub mod interpreter;
pub mod propagator;

#[cfg(test)]
mod kernel_proptest;

pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::copy::{copy, copy_with_free};
pub use self::datamodel::{HaloSpecs, PropagatorSpecs, SideMapping};
pub use self::dimensions::{Dimension, DimensionKind, FixedMap};
pub use self::expr::{Equation, Expr};
pub use self::function::FunctionDescriptor;
pub use self::halo::{HaloExchange, HaloTable, Side, halo_exchange, plan_buffers};
pub use self::interpreter::{Buffer, Interpreter};
pub use self::ir::{Callable, Node, Parameter, derive_parameters, pretty};
pub use self::propagator::{KernelSource, KernelSteps, LoopStep, Propagator};
pub use self::types::{Array, DataType, Extent, Scalar, Scope};
