// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::common::{Ident, Result};
use crate::expr::Expr;
use crate::kernel_err;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionKind {
    /// A dimension with a fixed symbolic size, e.g. a halo width.
    Default { value: Box<Expr> },
    /// Derived from `parent`: takes the value `start + step * trip` on
    /// the trip'th iteration of the loop that carries it.
    Incremented {
        parent: Box<Dimension>,
        start: Box<Expr>,
        step: Box<Expr>,
    },
    /// Bound to an axis of the grid.
    Spatial,
    /// The marching axis.
    Time,
}

/// A named axis used to index arrays and loops.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    name: Ident,
    kind: DimensionKind,
}

impl Dimension {
    pub fn new_default(name: &str, value: impl Into<Expr>) -> Result<Self> {
        Ok(Dimension {
            name: Ident::new(name)?,
            kind: DimensionKind::Default {
                value: Box::new(value.into()),
            },
        })
    }

    pub fn new_incremented(
        name: Ident,
        parent: Dimension,
        start: impl Into<Expr>,
        step: impl Into<Expr>,
    ) -> Self {
        Dimension {
            name,
            kind: DimensionKind::Incremented {
                parent: Box::new(parent),
                start: Box::new(start.into()),
                step: Box::new(step.into()),
            },
        }
    }

    pub fn new_spatial(name: &str) -> Result<Self> {
        Ok(Dimension {
            name: Ident::new(name)?,
            kind: DimensionKind::Spatial,
        })
    }

    pub fn new_time(name: &str) -> Result<Self> {
        Ok(Dimension {
            name: Ident::new(name)?,
            kind: DimensionKind::Time,
        })
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn kind(&self) -> &DimensionKind {
        &self.kind
    }

    pub fn is_time(&self) -> bool {
        matches!(self.kind, DimensionKind::Time)
    }

    pub fn parent(&self) -> Option<&Dimension> {
        match &self.kind {
            DimensionKind::Incremented { parent, .. } => Some(parent.as_ref()),
            _ => None,
        }
    }

    /// The dimension's size: the default value for `Default` dimensions,
    /// otherwise a deferred `Size` resolved when parameters are bound.
    pub fn symbolic_size(&self) -> Expr {
        match &self.kind {
            DimensionKind::Default { value } => value.as_ref().clone(),
            _ => Expr::Size(self.name.clone()),
        }
    }
}

/// Dimensions pinned to a single index value, keyed by dimension name.
pub type FixedMap = BTreeMap<Ident, Expr>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DimensionClass {
    Fixed(Expr),
    Free,
}

impl DimensionClass {
    pub fn is_fixed(&self) -> bool {
        matches!(self, DimensionClass::Fixed(_))
    }
}

/// Classifies each of `dims` as fixed or free, in order.  Every
/// dimension not pinned by `fixed` is free.
pub fn classify(dims: &[Dimension], fixed: &FixedMap) -> Result<Vec<DimensionClass>> {
    let known: BTreeSet<&Ident> = dims.iter().map(|d| d.name()).collect();
    if let Some(name) = fixed.keys().find(|name| !known.contains(name)) {
        return kernel_err!(
            UnknownDimension,
            format!("fixed dimension '{name}' is not a dimension of the array")
        );
    }

    Ok(dims
        .iter()
        .map(|d| match fixed.get(d.name()) {
            Some(value) => DimensionClass::Fixed(value.clone()),
            None => DimensionClass::Free,
        })
        .collect())
}

/// Like `classify`, but with an explicit free set: every dimension must
/// appear in exactly one of `fixed` and `free`.
pub fn classify_explicit(
    dims: &[Dimension],
    fixed: &FixedMap,
    free: &BTreeSet<Ident>,
) -> Result<Vec<DimensionClass>> {
    let classes = classify(dims, fixed)?;
    let known: BTreeSet<&Ident> = dims.iter().map(|d| d.name()).collect();
    if let Some(name) = free.iter().find(|name| !known.contains(name)) {
        return kernel_err!(
            UnknownDimension,
            format!("free dimension '{name}' is not a dimension of the array")
        );
    }

    for (d, class) in dims.iter().zip(classes.iter()) {
        let in_free = free.contains(d.name());
        match (class.is_fixed(), in_free) {
            (true, false) | (false, true) => {}
            (true, true) => {
                return kernel_err!(
                    UnclassifiedDimension,
                    format!("dimension '{}' is both fixed and free", d.name())
                );
            }
            (false, false) => {
                return kernel_err!(
                    UnclassifiedDimension,
                    format!("dimension '{}' is neither fixed nor free", d.name())
                );
            }
        }
    }

    Ok(classes)
}
