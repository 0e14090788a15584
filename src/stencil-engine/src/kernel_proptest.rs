// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for the kernel builders using proptest.
//!
//! These tests verify that:
//! 1. copy kernels take exactly the source, the destination and one
//!    offset per free dimension, and gather the selected region
//! 2. halo planning yields two buffers per free dimension, never wider
//!    than the ghost storage they serve
//! 3. rebuilding from identical inputs is deterministic

use proptest::prelude::*;

use crate::common::Ident;
use crate::copy::copy;
use crate::datamodel::SideMapping;
use crate::dimensions::{Dimension, FixedMap};
use crate::expr::Expr;
use crate::halo::{Side, plan_buffers};
use crate::interpreter::{Buffer, Interpreter};
use crate::ir::Parameter;
use crate::types::{Array, DataType, Extent};

const NAMES: [&str; 3] = ["x", "y", "z"];

/// Per axis: the source extent, a region selector, and whether the axis
/// is pinned.
#[derive(Clone, Debug)]
struct Axis {
    size: usize,
    extent: usize,
    origin: usize,
    fixed: bool,
}

fn axis_strategy() -> impl Strategy<Value = Axis> {
    (1usize..6, 0usize..100, 0usize..100, any::<bool>()).prop_map(|(size, a, b, fixed)| {
        let extent = 1 + a % size;
        let origin = if fixed { b % size } else { b % (size - extent + 1) };
        Axis {
            size,
            extent,
            origin,
            fixed,
        }
    })
}

fn ident(name: &str) -> Ident {
    Ident::new(name).unwrap()
}

fn source(rank: usize) -> Array {
    let dims = NAMES[..rank]
        .iter()
        .map(|n| Dimension::new_spatial(n).unwrap())
        .collect();
    Array::new("u", dims, DataType::Float64).unwrap()
}

fn fixed_map(axes: &[Axis]) -> FixedMap {
    axes.iter()
        .zip(NAMES.iter())
        .filter(|(axis, _)| axis.fixed)
        .map(|(axis, name)| (ident(name), Expr::from(axis.origin)))
        .collect()
}

/// Row-major multi-indices of an array with extents `dims`.
fn multi_indices(dims: &[usize]) -> Vec<Vec<usize>> {
    let len: usize = dims.iter().product();
    (0..len)
        .map(|mut flat| {
            let mut index = vec![0; dims.len()];
            for (slot, &n) in index.iter_mut().zip(dims.iter()).rev() {
                *slot = flat % n;
                flat /= n;
            }
            index
        })
        .collect()
}

proptest! {
    #[test]
    fn copy_parameters_are_exact(axes in prop::collection::vec(axis_strategy(), 1..=3)) {
        let src = source(axes.len());
        let callable = copy(&src, &fixed_map(&axes)).unwrap();

        let mut expected = vec!["u".to_owned(), "dst".to_owned()];
        for (axis, name) in axes.iter().zip(NAMES.iter()) {
            if !axis.fixed {
                expected.push(format!("o{name}"));
            }
        }
        let names: Vec<String> = callable.parameter_names().iter().map(|n| n.to_string()).collect();
        prop_assert_eq!(expected, names);

        let dst = callable.parameters.iter().find_map(|p| match p {
            Parameter::Array(a) if a.name().as_str() == "dst" => Some(a.clone()),
            _ => None,
        }).unwrap();
        for ((axis, d), size) in axes.iter().zip(dst.dimensions()).zip(dst.shape()) {
            if axis.fixed {
                prop_assert_eq!(&Expr::Int(1), size);
            } else {
                prop_assert_eq!(&Expr::Size(d.name().clone()), size);
            }
        }

        let again = copy(&src, &fixed_map(&axes)).unwrap();
        prop_assert_eq!(callable, again);
    }

    #[test]
    fn copy_gathers_region(axes in prop::collection::vec(axis_strategy(), 1..=3)) {
        let src = source(axes.len());
        let callable = copy(&src, &fixed_map(&axes)).unwrap();

        let src_dims: Vec<usize> = axes.iter().map(|a| a.size).collect();
        let dst_dims: Vec<usize> = axes
            .iter()
            .map(|a| if a.fixed { 1 } else { a.extent })
            .collect();
        let len: usize = src_dims.iter().product();
        let data: Vec<f64> = (0..len).map(|i| i as f64 * 0.25).collect();

        let mut interp = Interpreter::new();
        interp.bind_array(src.name(), Buffer::from_vec(src_dims.clone(), data).unwrap());
        interp.bind_array(&ident("dst"), Buffer::new(dst_dims.clone()));
        for (axis, name) in axes.iter().zip(NAMES.iter()) {
            interp.bind_size(&ident(name), axis.size as i64);
            interp.bind_size(&ident(&format!("dst_{name}")), axis.extent as i64);
            interp.bind_scalar(&ident(&format!("o{name}")), axis.origin as f64);
        }
        interp.run(&callable).unwrap();

        let src_buf = interp.array(src.name()).unwrap();
        let dst_buf = interp.array(&ident("dst")).unwrap();
        for index in multi_indices(&dst_dims) {
            let from: Vec<i64> = index
                .iter()
                .zip(axes.iter())
                .map(|(&i, a)| if a.fixed { a.origin as i64 } else { (i + a.origin) as i64 })
                .collect();
            let to: Vec<i64> = index.iter().map(|&i| i as i64).collect();
            prop_assert_eq!(src_buf.get(&from), dst_buf.get(&to));
        }
    }

    #[test]
    fn halo_buffers_fit_ghost_storage(
        axes in prop::collection::vec(axis_strategy(), 1..=3),
        halos in prop::collection::vec((0usize..4, 0usize..4), 3),
    ) {
        let extents: Vec<Extent> = halos[..axes.len()]
            .iter()
            .map(|&(l, r)| Extent::new(l, r))
            .collect();
        let f = source(axes.len()).with_halo(extents.clone()).unwrap();
        let fixed = fixed_map(&axes);
        let table = plan_buffers(&f, &fixed, SideMapping::Direct).unwrap();

        let free = axes.iter().filter(|a| !a.fixed).count();
        prop_assert_eq!(2 * free, table.len());

        for (pos, (axis, d)) in axes.iter().zip(f.dimensions()).enumerate() {
            let left = table.get(d.name(), Side::Left);
            let right = table.get(d.name(), Side::Right);
            if axis.fixed {
                prop_assert!(left.is_none() && right.is_none());
                continue;
            }
            let (left, right) = (left.unwrap(), right.unwrap());
            let widths = left.array.shape()[pos + 1].as_int().unwrap()
                + right.array.shape()[pos + 1].as_int().unwrap();
            prop_assert!(widths <= (extents[pos].left + extents[pos].right) as i64);
            prop_assert_eq!(Expr::Int(0), left.recv_offsets[pos].clone());
        }
    }
}
