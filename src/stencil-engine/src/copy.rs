// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The "copy" kernel: gathers an axis-aligned sub-region of an array
//! into a contiguous destination buffer.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::common::{Ident, Result, fresh_ident};
use crate::dimensions::{Dimension, DimensionClass, FixedMap, classify, classify_explicit};
use crate::expr::Expr;
use crate::ir::{Callable, Iteration, Limits, Node, Qualifier, derive_parameters};
use crate::types::{Array, DataType, Scalar};

/// copy builds a `Callable` copying an arbitrary convex region of `src`
/// into a contiguous array `dst`.
///
/// Dimensions in `fixed` are pinned to their bound value and contribute
/// a size-1 axis to `dst`.  Every other dimension `d` is free: `dst` gets
/// an incremented dimension `dst_d` along it, and the source index is
/// shifted by a runtime offset scalar `od` selecting the region's origin.
/// A generated name that would clash with one already used by `src` or
/// `fixed` gets a `_0`, `_1`, ... suffix.
pub fn copy(src: &Array, fixed: &FixedMap) -> Result<Callable> {
    let classes = classify(src.dimensions(), fixed)?;
    build(src, classes)
}

/// Like `copy`, but with the free dimensions named explicitly.  Each
/// dimension of `src` must be either fixed or free, not both.
pub fn copy_with_free(src: &Array, fixed: &FixedMap, free: &BTreeSet<Ident>) -> Result<Callable> {
    let classes = classify_explicit(src.dimensions(), fixed, free)?;
    build(src, classes)
}

fn build(src: &Array, classes: Vec<DimensionClass>) -> Result<Callable> {
    let rank = src.rank();
    let mut src_indices = Vec::with_capacity(rank);
    let mut dst_indices = Vec::with_capacity(rank);
    let mut dst_shape = Vec::with_capacity(rank);
    let mut dst_dimensions = Vec::with_capacity(rank);

    // generated names must not shadow anything the caller named
    let mut taken: BTreeSet<String> = std::iter::once(src.name().to_string())
        .chain(src.dimensions().iter().map(|d| d.name().to_string()))
        .collect();
    for class in classes.iter() {
        if let DimensionClass::Fixed(value) = class {
            value.collect_names(&mut taken);
        }
    }
    let dst_name = fresh_ident("dst", &mut taken);

    for (d, class) in src.dimensions().iter().zip(classes) {
        let dst_d = Dimension::new_incremented(
            fresh_ident(&format!("{dst_name}_{}", d.name()), &mut taken),
            d.clone(),
            0,
            1,
        );
        match class {
            DimensionClass::Fixed(value) => {
                trace!(dim = %d.name(), index = %value, "copy: fixed dimension");
                src_indices.push(value);
                dst_indices.push(Expr::Int(0));
                dst_shape.push(Expr::Int(1));
            }
            DimensionClass::Free => {
                let offset = Scalar::from_ident(
                    fresh_ident(&format!("o{}", d.name()), &mut taken),
                    DataType::Int32,
                );
                src_indices.push(Expr::Dim(d.clone()) + Expr::Scalar(offset));
                dst_indices.push(Expr::Dim(dst_d.clone()));
                dst_shape.push(dst_d.symbolic_size());
            }
        }
        dst_dimensions.push(dst_d);
    }

    let dst = Array::from_ident(dst_name, dst_dimensions, src.dtype())?.with_shape(dst_shape)?;

    let mut iet = Node::assign(dst.indexed(dst_indices), src.indexed(src_indices));
    // last-declared dimension innermost
    for ((sd, dd), size) in src
        .dimensions()
        .iter()
        .zip(dst.dimensions())
        .zip(dst.shape())
        .rev()
    {
        if size.as_int() == Some(1) {
            continue;
        }
        iet = Node::Iteration(
            Iteration::new(iet, sd.clone(), Limits::upto(size.clone()))
                .with_uindices(vec![dd.clone()]),
        );
    }

    let iet = Node::List(vec![Node::ArrayCast(src.clone()), Node::ArrayCast(dst), iet]);
    let parameters = derive_parameters(&iet)?;
    debug!(
        src = %src.name(),
        parameters = parameters.len(),
        "built copy kernel"
    );

    Ok(Callable::new(
        Ident::from_unchecked("copy".to_owned()),
        iet,
        None,
        parameters,
        vec![Qualifier::Static],
    ))
}
