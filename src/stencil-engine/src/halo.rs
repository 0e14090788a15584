// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Halo-exchange planning for domain-decomposed arrays.
//!
//! Each side of each exchanged axis gets its own small contiguous
//! transfer buffer, so the transport can move exactly the ghost-cell
//! volume for one direction independent of the other axes.  A buffer's
//! leading axis has size 2: slot 0 holds the cells we send, slot 1 the
//! cells we receive.  Whether a (dimension, side) pair exchanges at all
//! is decided at runtime by a mask scalar, because a process at the edge
//! of the global domain has no neighbor on that side.
//!
//! Indices here are relative to the start of the allocation, so the
//! addressable domain of `f` along axis `i` starts at `f.halo()[i].left`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::common::{Ident, Result, fresh_ident};
use crate::datamodel::{HaloSpecs, SideMapping};
use crate::dimensions::{Dimension, DimensionClass, FixedMap, classify};
use crate::expr::Expr;
use crate::ir::{Callable, Conditional, Iteration, Limits, Node, Qualifier, derive_parameters};
use crate::kernel_err;
use crate::types::{Array, DataType, Extent, Scalar};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn name(&self) -> &'static str {
        match self {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        }
    }

    pub fn initial(&self) -> char {
        match self {
            Side::Left => 'L',
            Side::Right => 'R',
        }
    }

    fn index(&self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// A table keyed by (dimension, side) over a fixed set of dimensions.
/// Entries for fixed dimensions are absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SideTable<T> {
    dims: Vec<Dimension>,
    entries: Vec<Option<T>>,
}

impl<T> SideTable<T> {
    fn new(dims: &[Dimension]) -> Self {
        SideTable {
            dims: dims.to_vec(),
            entries: (0..dims.len() * 2).map(|_| None).collect(),
        }
    }

    fn insert(&mut self, pos: usize, side: Side, value: T) {
        self.entries[pos * 2 + side.index()] = Some(value);
    }

    pub fn get(&self, dim: &Ident, side: Side) -> Option<&T> {
        let pos = self.dims.iter().position(|d| d.name() == dim)?;
        self.entries[pos * 2 + side.index()].as_ref()
    }

    /// Present entries, by dimension order then LEFT before RIGHT.
    pub fn iter(&self) -> impl Iterator<Item = (&Dimension, Side, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, entry)| {
            let side = if i % 2 == 0 { Side::Left } else { Side::Right };
            entry.as_ref().map(|value| (&self.dims[i / 2], side, value))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The transfer buffer for one (dimension, side), with the per-axis
/// offsets into the owning array of the region it receives into and
/// the region it sends from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HaloBuffer {
    pub array: Array,
    pub recv_offsets: Vec<Expr>,
    pub send_offsets: Vec<Expr>,
}

pub type HaloTable = SideTable<HaloBuffer>;
pub type MaskTable = SideTable<Scalar>;

#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Clone)]
pub struct HaloExchange {
    pub buffers: HaloTable,
    pub masks: MaskTable,
    /// Gathers owned boundary cells into slot 0 of each buffer.
    pub pack: Callable,
    /// Scatters slot 1 of each buffer into the ghost region.
    pub unpack: Callable,
}

fn side_width(halo: Extent, side: Side, mapping: SideMapping) -> usize {
    match (side, mapping) {
        (Side::Left, SideMapping::Direct) | (Side::Right, SideMapping::Swapped) => halo.left,
        (Side::Left, SideMapping::Swapped) | (Side::Right, SideMapping::Direct) => halo.right,
    }
}

/// Names generated for an exchange, kept clear of every name `f` and
/// the fixed index values already use.
struct HaloNames {
    slot: Ident,
    halo_dims: Vec<Ident>,
    buffers: Vec<[Ident; 2]>,
    masks: Vec<[Ident; 2]>,
}

impl HaloNames {
    fn new(f: &Array, classes: &[DimensionClass]) -> Self {
        let mut taken: BTreeSet<String> = std::iter::once(f.name().to_string())
            .chain(f.dimensions().iter().map(|d| d.name().to_string()))
            .collect();
        for class in classes.iter() {
            if let DimensionClass::Fixed(value) = class {
                value.collect_names(&mut taken);
            }
        }

        let slot = fresh_ident("b", &mut taken);
        let halo_dims = f
            .dimensions()
            .iter()
            .map(|d| fresh_ident(&format!("h{}", d.name()), &mut taken))
            .collect();
        let mut per_side = |prefix: &str| -> Vec<[Ident; 2]> {
            f.dimensions()
                .iter()
                .map(|d| {
                    Side::ALL.map(|side| {
                        fresh_ident(&format!("{prefix}{}{}", d.name(), side.initial()), &mut taken)
                    })
                })
                .collect()
        };
        let buffers = per_side("B");
        let masks = per_side("m_");

        HaloNames {
            slot,
            halo_dims,
            buffers,
            masks,
        }
    }
}

fn plan_buffer(
    f: &Array,
    classes: &[DimensionClass],
    names: &HaloNames,
    pos: usize,
    side: Side,
    mapping: SideMapping,
) -> Result<HaloBuffer> {
    let d0 = &f.dimensions()[pos];
    let halo = f.halo()[pos];
    let width = side_width(halo, side, mapping);
    let domain_left = f.offset_domain(pos).left;
    let size = f.shape()[pos].clone();

    let (recv, send) = match side {
        Side::Left => {
            if width > domain_left {
                return kernel_err!(
                    HaloExtentExceeded,
                    format!(
                        "{} buffer for '{}' is {width} wide but '{}' has a left halo of {}",
                        side.name(),
                        d0.name(),
                        f.name(),
                        halo.left
                    )
                );
            }
            (
                Expr::Int((domain_left - width) as i64),
                Expr::Int(domain_left as i64),
            )
        }
        Side::Right => {
            if width > halo.right {
                return kernel_err!(
                    HaloExtentExceeded,
                    format!(
                        "{} buffer for '{}' is {width} wide but '{}' has a right halo of {}",
                        side.name(),
                        d0.name(),
                        f.name(),
                        halo.right
                    )
                );
            }
            // the right halo begins past the addressable domain, not
            // past the padded allocation
            let domain_end = Expr::Int(domain_left as i64) + size;
            (
                domain_end.clone(),
                domain_end - Expr::Int(width as i64),
            )
        }
    };

    let mut dimensions = vec![Dimension::new_default(names.slot.as_str(), 2)?];
    let mut buffer_halo = vec![Extent::default()];
    let mut recv_offsets = Vec::with_capacity(classes.len());
    let mut send_offsets = Vec::with_capacity(classes.len());
    for (pos1, (d1, class)) in f.dimensions().iter().zip(classes).enumerate() {
        match class {
            DimensionClass::Fixed(value) => {
                dimensions.push(Dimension::new_default(names.halo_dims[pos1].as_str(), 1)?);
                buffer_halo.push(Extent::default());
                recv_offsets.push(value.clone());
                send_offsets.push(value.clone());
            }
            DimensionClass::Free if pos1 == pos => {
                dimensions.push(Dimension::new_default(
                    names.halo_dims[pos1].as_str(),
                    width as i64,
                )?);
                buffer_halo.push(Extent::default());
                recv_offsets.push(recv.clone());
                send_offsets.push(send.clone());
            }
            DimensionClass::Free => {
                dimensions.push(d1.clone());
                buffer_halo.push(f.halo()[pos1]);
                recv_offsets.push(Expr::Int(0));
                send_offsets.push(Expr::Int(0));
            }
        }
    }

    let name = names.buffers[pos][side.index()].clone();
    let array = Array::from_ident(name, dimensions, f.dtype())?.with_halo(buffer_halo)?;
    trace!(buffer = %array.name(), width, "planned halo buffer");

    Ok(HaloBuffer {
        array,
        recv_offsets,
        send_offsets,
    })
}

/// plan_buffers computes the transfer buffer and offsets for both sides
/// of every dimension of `f` not pinned in `fixed`.
pub fn plan_buffers(f: &Array, fixed: &FixedMap, mapping: SideMapping) -> Result<HaloTable> {
    let classes = classify(f.dimensions(), fixed)?;
    let names = HaloNames::new(f, &classes);
    plan_table(f, &classes, &names, mapping)
}

fn plan_table(
    f: &Array,
    classes: &[DimensionClass],
    names: &HaloNames,
    mapping: SideMapping,
) -> Result<HaloTable> {
    let mut table = HaloTable::new(f.dimensions());
    for (pos, class) in classes.iter().enumerate() {
        if class.is_fixed() {
            continue;
        }
        for side in Side::ALL {
            table.insert(pos, side, plan_buffer(f, classes, names, pos, side, mapping)?);
        }
    }
    Ok(table)
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Direction {
    Pack,
    Unpack,
}

fn transfer(f: &Array, classes: &[DimensionClass], buffer: &HaloBuffer, dir: Direction) -> Node {
    let buf = &buffer.array;
    let (slot, offsets) = match dir {
        Direction::Pack => (0, &buffer.send_offsets),
        Direction::Unpack => (1, &buffer.recv_offsets),
    };

    let mut buf_indices = vec![Expr::Int(slot)];
    let mut f_indices = Vec::with_capacity(classes.len());
    let mut loops = vec![];
    for (pos1, class) in classes.iter().enumerate() {
        let bd = &buf.dimensions()[pos1 + 1];
        if class.is_fixed() {
            buf_indices.push(Expr::Int(0));
            f_indices.push(offsets[pos1].clone());
        } else {
            buf_indices.push(Expr::Dim(bd.clone()));
            f_indices.push(offsets[pos1].clone() + Expr::Dim(bd.clone()));
            loops.push((bd.clone(), buf.allocated_extent(pos1 + 1)));
        }
    }

    let mut iet = match dir {
        Direction::Pack => Node::assign(buf.indexed(buf_indices), f.indexed(f_indices)),
        Direction::Unpack => Node::assign(f.indexed(f_indices), buf.indexed(buf_indices)),
    };
    for (dim, upper) in loops.into_iter().rev() {
        iet = Node::Iteration(Iteration::new(iet, dim, Limits::upto(upper)));
    }
    iet
}

fn exchange_callable(
    name: &str,
    f: &Array,
    classes: &[DimensionClass],
    buffers: &HaloTable,
    masks: &MaskTable,
    dir: Direction,
) -> Result<Callable> {
    let mut body = vec![Node::ArrayCast(f.clone())];
    body.extend(buffers.iter().map(|(_, _, b)| Node::ArrayCast(b.array.clone())));
    for ((_, _, buffer), (_, _, mask)) in buffers.iter().zip(masks.iter()) {
        body.push(Node::Conditional(Conditional::new(
            Expr::Scalar(mask.clone()),
            transfer(f, classes, buffer, dir),
            None,
        )));
    }

    let body = Node::List(body);
    let parameters = derive_parameters(&body)?;
    Ok(Callable::new(
        Ident::from_unchecked(name.to_owned()),
        body,
        None,
        parameters,
        vec![Qualifier::Static],
    ))
}

/// halo_exchange plans the transfer buffers and boundary masks for `f`
/// and builds the mask-guarded pack and unpack kernels around them.
/// Dimensions in `fixed` take no part in the exchange.
pub fn halo_exchange(f: &Array, fixed: &FixedMap, specs: &HaloSpecs) -> Result<HaloExchange> {
    let mapping = match specs.side_mapping {
        Some(mapping) => mapping,
        None => {
            warn!(
                array = %f.name(),
                "halo side mapping not configured; using direct LEFT/RIGHT widths, \
                 which is only correct for symmetric stencils"
            );
            SideMapping::Direct
        }
    };

    let classes = classify(f.dimensions(), fixed)?;
    let names = HaloNames::new(f, &classes);
    let buffers = plan_table(f, &classes, &names, mapping)?;

    let mut masks = MaskTable::new(f.dimensions());
    for (pos, class) in classes.iter().enumerate() {
        if class.is_fixed() {
            continue;
        }
        for side in Side::ALL {
            let name = names.masks[pos][side.index()].clone();
            masks.insert(pos, side, Scalar::from_ident(name, DataType::Int32));
        }
    }

    let pack = exchange_callable("halo_pack", f, &classes, &buffers, &masks, Direction::Pack)?;
    let unpack = exchange_callable(
        "halo_unpack",
        f,
        &classes,
        &buffers,
        &masks,
        Direction::Unpack,
    )?;
    debug!(
        array = %f.name(),
        buffers = buffers.len(),
        parameters = pack.parameters.len(),
        "built halo exchange"
    );

    Ok(HaloExchange {
        buffers,
        masks,
        pack,
        unpack,
    })
}
