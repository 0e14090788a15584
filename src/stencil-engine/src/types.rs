// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::common::{Ident, Result};
use crate::dimensions::Dimension;
use crate::expr::{Expr, Indexed};
use crate::kernel_err;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    pub fn c_type(&self) -> &'static str {
        match self {
            DataType::Int32 => "int",
            DataType::Int64 => "long",
            DataType::Float32 => "float",
            DataType::Float64 => "double",
        }
    }
}

/// A named symbolic value, for offsets and masks only known at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scalar {
    name: Ident,
    dtype: DataType,
}

impl Scalar {
    pub fn new(name: &str, dtype: DataType) -> Result<Self> {
        Ok(Scalar {
            name: Ident::new(name)?,
            dtype,
        })
    }

    pub(crate) fn from_ident(name: Ident, dtype: DataType) -> Self {
        Scalar { name, dtype }
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }
}

/// Left and right widths along one axis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub left: usize,
    pub right: usize,
}

impl Extent {
    pub fn new(left: usize, right: usize) -> Self {
        Extent { left, right }
    }
}

/// Where an array's storage comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Allocated by the caller and passed in.
    External,
    /// Allocated inside the kernel that uses it.
    Local,
}

/// A typed multidimensional buffer.
///
/// `shape` is the size of the addressable domain along each dimension;
/// the allocation is padded by `halo` on both sides, so the domain starts
/// at `halo[i].left` within it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Array {
    name: Ident,
    dtype: DataType,
    dimensions: Vec<Dimension>,
    shape: Vec<Expr>,
    halo: Vec<Extent>,
    scope: Scope,
}

impl Array {
    pub fn new(name: &str, dimensions: Vec<Dimension>, dtype: DataType) -> Result<Self> {
        Self::from_ident(Ident::new(name)?, dimensions, dtype)
    }

    pub(crate) fn from_ident(
        name: Ident,
        dimensions: Vec<Dimension>,
        dtype: DataType,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for d in dimensions.iter() {
            if !seen.insert(d.name()) {
                return kernel_err!(
                    DuplicateDimension,
                    format!("array '{}' repeats dimension '{}'", name, d.name())
                );
            }
        }

        Ok(Array {
            shape: dimensions.iter().map(|d| d.symbolic_size()).collect(),
            halo: vec![Extent::default(); dimensions.len()],
            name,
            dtype,
            dimensions,
            scope: Scope::External,
        })
    }

    pub fn with_shape(mut self, shape: Vec<Expr>) -> Result<Self> {
        if shape.len() != self.dimensions.len() {
            return kernel_err!(
                BadShape,
                format!(
                    "array '{}' has {} dimensions but a shape of rank {}",
                    self.name,
                    self.dimensions.len(),
                    shape.len()
                )
            );
        }
        self.shape = shape;
        Ok(self)
    }

    pub fn with_halo(mut self, halo: Vec<Extent>) -> Result<Self> {
        if halo.len() != self.dimensions.len() {
            return kernel_err!(
                BadShape,
                format!(
                    "array '{}' has {} dimensions but {} halo extents",
                    self.name,
                    self.dimensions.len(),
                    halo.len()
                )
            );
        }
        self.halo = halo;
        Ok(self)
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn shape(&self) -> &[Expr] {
        &self.shape
    }

    pub fn halo(&self) -> &[Extent] {
        &self.halo
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn dimension_index(&self, name: &Ident) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name() == name)
    }

    /// Where the addressable domain begins along axis `i`, measured from
    /// each end of the allocation.
    pub fn offset_domain(&self, i: usize) -> Extent {
        let halo = self.halo[i];
        Extent::new(halo.left, halo.right)
    }

    /// The allocated extent along axis `i`: domain plus both halos.
    pub fn allocated_extent(&self, i: usize) -> Expr {
        let halo = self.halo[i];
        self.shape[i].clone() + Expr::Int((halo.left + halo.right) as i64)
    }

    pub fn indexed<I>(&self, indices: I) -> Expr
    where
        I: IntoIterator<Item = Expr>,
    {
        Expr::Indexed(Box::new(Indexed {
            array: self.clone(),
            indices: indices.into_iter().collect::<SmallVec<[Expr; 4]>>(),
        }))
    }
}
