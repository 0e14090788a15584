// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The time-stepping kernel generator.
//!
//! A propagator wraps stencil updates in a sequential time loop around
//! parallel loops over the interior of the grid.  Parameters registered
//! without `save` keep only `time_order + 1` time slots: references to
//! them at `t`, `t-1`, ... are rewritten to ring-slot index variables
//! that are recomputed at the top of every time step.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::common::{Ident, Result};
use crate::datamodel::{HaloSpecs, PropagatorSpecs};
use crate::dimensions::{Dimension, FixedMap};
use crate::expr::{Equation, Expr};
use crate::function::FunctionDescriptor;
use crate::halo::{self, HaloExchange};
use crate::ir::{Conditional, Iteration, Limits, Node};
use crate::prop_err;
use crate::types::{Array, DataType, Scalar};

const SPACE_DIM_NAMES: [&str; 3] = ["x", "y", "z"];

/// Where the kernel body comes from.
#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Clone, PartialEq)]
pub enum KernelSource {
    /// A ready-made body for the innermost loop.
    Prebuilt(Node),
    /// Stencil equations, each instantiated by binding `subs` to its
    /// row of `args`.
    Equations {
        subs: Vec<Ident>,
        equations: Vec<Equation>,
        args: Vec<Vec<Expr>>,
    },
}

/// A conditional assignment run once per grid point.  Kept in source
/// form so that time substitutions see every parameter registered by
/// the time the kernel is built.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopStep {
    pub condition: Equation,
    pub true_assign: Equation,
    pub false_assign: Option<Equation>,
}

/// Conditional statements run around the stencil updates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KernelSteps {
    pub before: Vec<LoopStep>,
    pub after: Vec<LoopStep>,
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Clone)]
pub struct Propagator {
    name: Ident,
    nt: usize,
    forward: bool,
    time_order: usize,
    time_dim: Dimension,
    space_dims: Vec<Dimension>,
    space_counters: Vec<Dimension>,
    time_counter: Dimension,
    var_map: HashMap<Expr, Expr>,
    grid: Vec<usize>,
    space_loop_limits: Vec<Limits>,
    save_vars: BTreeMap<Ident, bool>,
    steps: KernelSteps,
    source: Option<KernelSource>,
    fd: FunctionDescriptor,
    halo: HaloSpecs,
}

impl Propagator {
    pub fn from_specs(specs: &PropagatorSpecs) -> Result<Self> {
        let rank = specs.shape.len();
        if rank == 0 || rank > SPACE_DIM_NAMES.len() {
            return prop_err!(
                BadShape,
                format!("grids of rank {rank} are unsupported, expected 1 to 3 axes")
            );
        }
        let border = specs.space_border;
        if let Some(extent) = specs.shape.iter().find(|&&n| 2 * border > n) {
            return prop_err!(
                BadShape,
                format!("a border of {border} doesn't fit an axis of extent {extent}")
            );
        }

        let name = Ident::new(&specs.name)?;
        let time_dim = Dimension::new_time("t")?;
        let space_dims = SPACE_DIM_NAMES[..rank]
            .iter()
            .map(|name| Dimension::new_spatial(name))
            .collect::<Result<Vec<_>>>()?;
        let space_counters = (1..=rank)
            .map(|i| Dimension::new_spatial(&format!("i{i}")))
            .collect::<Result<Vec<_>>>()?;
        let time_counter = Dimension::new_time(&format!("i{}", rank + 1))?;

        let mut var_map: HashMap<Expr, Expr> = space_dims
            .iter()
            .zip(space_counters.iter())
            .map(|(d, counter)| (Expr::Dim(d.clone()), Expr::Dim(counter.clone())))
            .collect();
        var_map.insert(Expr::Dim(time_dim.clone()), Expr::Dim(time_counter.clone()));

        // the first space dimension walks the last (fastest varying) extent
        let space_loop_limits = (0..rank)
            .map(|k| {
                let extent = specs.shape[rank - 1 - k];
                Limits::new(border as i64, (extent - border) as i64, 1)
            })
            .collect();

        Ok(Propagator {
            fd: FunctionDescriptor::new(name.clone()),
            name,
            nt: specs.nt,
            forward: specs.forward,
            time_order: specs.time_order,
            time_dim,
            space_dims,
            space_counters,
            time_counter,
            var_map,
            grid: specs.shape.clone(),
            space_loop_limits,
            save_vars: BTreeMap::new(),
            steps: KernelSteps::default(),
            source: None,
            halo: specs.halo.clone(),
        })
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn time_dim(&self) -> &Dimension {
        &self.time_dim
    }

    pub fn space_dims(&self) -> &[Dimension] {
        &self.space_dims
    }

    /// The canonical loop counters: one per space dimension, in order,
    /// followed by the time counter.
    pub fn loop_counters(&self) -> Vec<&Dimension> {
        self.space_counters
            .iter()
            .chain(std::iter::once(&self.time_counter))
            .collect()
    }

    pub fn time_counter(&self) -> &Dimension {
        &self.time_counter
    }

    pub fn steps(&self) -> &KernelSteps {
        &self.steps
    }

    /// True once any registered parameter is ring-buffered.
    pub fn is_cyclic(&self) -> bool {
        self.save_vars.values().any(|save| !save)
    }

    /// add_param registers an array parameter.  A `shape` one longer than
    /// the grid rank makes a time-indexed array; one equal to the rank
    /// makes a space-only array.  The space extents are given per space
    /// dimension (`x` first) and must match the grid extent that
    /// dimension's loop walks.  Without `save`, the array keeps only the
    /// last `time_order + 1` time steps.
    pub fn add_param(
        &mut self,
        name: &str,
        shape: &[usize],
        dtype: DataType,
        save: bool,
    ) -> Result<Array> {
        let rank = self.space_dims.len();
        let dimensions: Vec<Dimension> = if shape.len() == rank + 1 {
            std::iter::once(self.time_dim.clone())
                .chain(self.space_dims.iter().cloned())
                .collect()
        } else if shape.len() == rank {
            self.space_dims.clone()
        } else {
            return prop_err!(
                BadShape,
                format!(
                    "'{name}' has {} axes but the grid has {rank} space dimensions",
                    shape.len()
                )
            );
        };
        let space_extents = &shape[shape.len() - rank..];
        for (k, (d, &extent)) in self.space_dims.iter().zip(space_extents).enumerate() {
            let walked = self.grid[rank - 1 - k];
            if extent != walked {
                return prop_err!(
                    BadShape,
                    format!(
                        "'{name}' spans {extent} along '{}' but the grid walks it over {walked}",
                        d.name()
                    )
                );
            }
        }
        if !save && shape.len() == rank + 1 && shape[0] < self.time_order + 1 {
            return prop_err!(
                BadShape,
                format!(
                    "ring-buffered '{name}' needs at least {} time slots",
                    self.time_order + 1
                )
            );
        }

        let array = Array::new(name, dimensions, dtype)?
            .with_shape(shape.iter().map(|&n| Expr::from(n)).collect())?;
        self.fd.add_matrix_param(array.clone())?;
        self.save_vars.insert(array.name().clone(), save);
        trace!(param = name, save, "registered array parameter");
        Ok(array)
    }

    pub fn add_scalar_param(&mut self, name: &str, dtype: DataType) -> Result<Scalar> {
        let scalar = Scalar::new(name, dtype)?;
        self.fd.add_value_param(scalar.clone())?;
        Ok(scalar)
    }

    pub fn add_local_var(&mut self, name: &str, dtype: DataType) -> Result<Scalar> {
        let scalar = Scalar::new(name, dtype)?;
        self.fd.add_local_variable(scalar.clone())?;
        Ok(scalar)
    }

    pub fn set_jit_params(
        &mut self,
        subs: Vec<Ident>,
        equations: Vec<Equation>,
        args: Vec<Vec<Expr>>,
    ) {
        self.source = Some(KernelSource::Equations {
            subs,
            equations,
            args,
        });
    }

    pub fn set_jit_simple(&mut self, loop_body: Node) {
        self.source = Some(KernelSource::Prebuilt(loop_body));
    }

    fn is_ring_buffered(&self, name: &Ident) -> bool {
        self.save_vars.get(name) == Some(&false)
    }

    /// The ring-slot index variables `t0..t{time_order}`, or nothing when
    /// every parameter keeps its full history.
    pub fn time_steppers(&self) -> Vec<Scalar> {
        if !self.is_cyclic() {
            return vec![];
        }
        (0..=self.time_order)
            .map(|i| {
                Scalar::from_ident(Ident::from_unchecked(format!("t{i}")), DataType::Int32)
            })
            .collect()
    }

    fn ring_slot(&self, index: &Expr, steppers: &[Scalar]) -> Result<Expr> {
        let offset = match index.as_dim_offset() {
            Some((d, k)) if *d == self.time_dim => k,
            _ => {
                return prop_err!(
                    TimeOffsetOutOfRing,
                    format!(
                        "'{index}' is not a constant offset from '{}'",
                        self.time_dim.name()
                    )
                );
            }
        };
        let order = self.time_order as i64;
        // forward marches look back in time, backward marches ahead
        let slot = if self.forward {
            order + offset
        } else {
            order - offset
        };
        if !(0..=order).contains(&slot) {
            return prop_err!(
                TimeOffsetOutOfRing,
                format!(
                    "time offset {offset} falls outside the {}-slot ring",
                    self.time_order + 1
                )
            );
        }
        Ok(Expr::Scalar(steppers[slot as usize].clone()))
    }

    fn substitute_time(&self, expr: &Expr, steppers: &[Scalar]) -> Result<Expr> {
        match expr {
            Expr::Indexed(indexed) if self.is_ring_buffered(indexed.array.name()) => {
                let indices = indexed
                    .indices
                    .iter()
                    .zip(indexed.array.dimensions())
                    .map(|(index, d)| {
                        if d.is_time() {
                            self.ring_slot(index, steppers)
                        } else {
                            self.substitute_time(index, steppers)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(indexed.array.indexed(indices))
            }
            _ => expr.try_map_children(|child| self.substitute_time(child, steppers)),
        }
    }

    /// time_substitutions rewrites the time index of every reference to a
    /// ring-buffered parameter inside `expr` to its ring slot.  References
    /// to saved parameters keep the raw time index.
    pub fn time_substitutions(&self, expr: &Expr) -> Result<Expr> {
        if !self.is_cyclic() {
            return Ok(expr.clone());
        }
        self.substitute_time(expr, &self.time_steppers())
    }

    fn remap(&self, expr: &Expr) -> Expr {
        expr.xreplace(&self.var_map)
    }

    fn rewrite(&self, eqn: &Equation) -> Result<Node> {
        let lhs = self.remap(&self.time_substitutions(&eqn.lhs)?);
        let rhs = self.remap(&self.time_substitutions(&eqn.rhs)?);
        Ok(Node::assign(lhs, rhs))
    }

    /// Bounds of the time loop.  A forward march with ring buffers
    /// starts `time_order` steps in, so every slot it reads has been
    /// filled.
    pub fn time_loop_limits(&self) -> Limits {
        let nt = self.nt as i64;
        if self.forward {
            let skip = if self.is_cyclic() {
                self.time_order as i64
            } else {
                0
            };
            Limits::new(skip, nt + skip, 1)
        } else {
            Limits::new(nt - 1, -1, -1)
        }
    }

    /// Bounds of the loop over each space dimension, in declaration order.
    pub fn space_loop_limits(&self) -> &[Limits] {
        &self.space_loop_limits
    }

    /// The ring-slot updates run at the top of each time step.
    pub fn time_stepping(&self) -> Vec<Node> {
        let steppers = self.time_steppers();
        if steppers.is_empty() {
            return vec![];
        }
        let n = Expr::from(steppers.len());
        let ti = Expr::Dim(self.time_counter.clone());
        let order = self.time_order;

        let indices: Vec<usize> = if self.forward {
            (0..=order).collect()
        } else {
            (0..=order).rev().collect()
        };
        let first = if self.forward { 0 } else { order };

        indices
            .into_iter()
            .map(|i| {
                let rhs = if i == first {
                    ti.clone() % n.clone()
                } else {
                    let prev = if self.forward { i - 1 } else { i + 1 };
                    (Expr::Scalar(steppers[prev].clone()) + Expr::Int(1)) % n.clone()
                };
                Node::assign(Expr::Scalar(steppers[i].clone()), rhs)
            })
            .collect()
    }

    /// prepare_loop wraps `body` in the space loops, then the time loop
    /// with the ring-slot updates at its top, and declares the ring-slot
    /// variables.
    pub fn prepare_loop(&self, body: Node) -> Node {
        let mut body = body;
        // first space dimension innermost
        for (counter, limits) in self.space_counters.iter().zip(self.space_loop_limits.iter()) {
            body = Node::Iteration(Iteration::new(body, counter.clone(), limits.clone()));
        }

        let mut time_body = self.time_stepping();
        time_body.push(body);
        let time_loop = Iteration::new(
            Node::List(time_body),
            self.time_counter.clone(),
            self.time_loop_limits(),
        )
        .sequential();

        let mut nodes: Vec<Node> = self
            .time_steppers()
            .into_iter()
            .map(Node::Declaration)
            .collect();
        nodes.push(Node::Iteration(time_loop));
        Node::List(nodes)
    }

    /// prepare instantiates each equation with its row of `args`, applies
    /// the time and loop-counter substitutions, and places the resulting
    /// assignments between the registered before and after steps inside
    /// the loop nest.
    pub fn prepare(
        &self,
        subs: &[Ident],
        equations: &[Equation],
        args: &[Vec<Expr>],
    ) -> Result<Node> {
        if equations.len() != args.len() {
            return prop_err!(
                MismatchedArguments,
                format!(
                    "{} equations but {} argument lists",
                    equations.len(),
                    args.len()
                )
            );
        }

        let mut stmts = self
            .steps
            .before
            .iter()
            .map(|step| self.loop_step(step))
            .collect::<Result<Vec<_>>>()?;
        for (eqn, row) in equations.iter().zip(args) {
            if row.len() != subs.len() {
                return prop_err!(
                    MismatchedArguments,
                    format!("{} substitutions but {} arguments", subs.len(), row.len())
                );
            }
            let bindings: Vec<(Ident, Expr)> =
                subs.iter().cloned().zip(row.iter().cloned()).collect();
            stmts.push(self.rewrite(&eqn.subs(&bindings))?);
        }
        for step in self.steps.after.iter() {
            stmts.push(self.loop_step(step)?);
        }

        Ok(self.prepare_loop(Node::List(stmts)))
    }

    /// add_loop_step registers `if (condition.lhs == condition.rhs)`
    /// running `true_assign`, or `false_assign` otherwise, before or after
    /// the stencil updates.  Time and loop-counter substitutions are
    /// applied when the kernel is built.
    pub fn add_loop_step(
        &mut self,
        condition: &Equation,
        true_assign: &Equation,
        false_assign: Option<&Equation>,
        before: bool,
    ) -> Result<()> {
        let step = LoopStep {
            condition: condition.clone(),
            true_assign: true_assign.clone(),
            false_assign: false_assign.cloned(),
        };
        if before {
            self.steps.before.push(step);
        } else {
            self.steps.after.push(step);
        }
        Ok(())
    }

    fn loop_step(&self, step: &LoopStep) -> Result<Node> {
        let test = self
            .remap(&step.condition.lhs)
            .equals(self.remap(&step.condition.rhs));
        let then_body = self.rewrite(&step.true_assign)?;
        let else_body = match &step.false_assign {
            Some(eqn) => Some(self.rewrite(eqn)?),
            None => None,
        };
        Ok(Node::Conditional(Conditional::new(test, then_body, else_body)))
    }

    /// get_fd returns the function descriptor with its body built from
    /// the kernel source set by `set_jit_params` or `set_jit_simple`.
    pub fn get_fd(&self) -> Result<FunctionDescriptor> {
        let body = match &self.source {
            Some(KernelSource::Prebuilt(body)) => self.prepare_loop(body.clone()),
            Some(KernelSource::Equations {
                subs,
                equations,
                args,
            }) => self.prepare(subs, equations, args)?,
            None => {
                return prop_err!(
                    MissingKernelSource,
                    format!(
                        "'{}' needs set_jit_params or set_jit_simple before get_fd",
                        self.name
                    )
                );
            }
        };

        let mut fd = self.fd.clone();
        fd.set_body(body);
        debug!(
            propagator = %self.name,
            cyclic = self.is_cyclic(),
            steps = self.steps.before.len() + self.steps.after.len(),
            "built propagator body"
        );
        Ok(fd)
    }

    /// halo_exchange plans the ghost-cell exchange of `f` at the time
    /// index `time_index`, with the configured side mapping.
    pub fn halo_exchange(&self, f: &Array, time_index: Expr) -> Result<HaloExchange> {
        let mut fixed = FixedMap::new();
        if f.dimensions().contains(&self.time_dim) {
            fixed.insert(self.time_dim.name().clone(), time_index);
        }
        halo::halo_exchange(f, &fixed, &self.halo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::interpreter::{Buffer, Interpreter};
    use crate::ir::IterationProperty;

    fn specs(nt: usize, shape: Vec<usize>, forward: bool, time_order: usize) -> PropagatorSpecs {
        PropagatorSpecs {
            forward,
            time_order,
            ..PropagatorSpecs::new("kernel", nt, shape)
        }
    }

    fn at(array: &Array, indices: Vec<Expr>) -> Expr {
        array.indexed(indices)
    }

    fn t_minus(p: &Propagator, k: i64) -> Expr {
        Expr::Dim(p.time_dim().clone()) - Expr::Int(k)
    }

    fn x(p: &Propagator) -> Expr {
        Expr::Dim(p.space_dims()[0].clone())
    }

    #[test]
    fn test_loop_counters() {
        let p = Propagator::from_specs(&specs(10, vec![4, 5, 6], true, 0)).unwrap();
        let names: Vec<_> = p.loop_counters().iter().map(|d| d.name().as_str()).collect();
        assert_eq!(vec!["i1", "i2", "i3", "i4"], names);
        let dims: Vec<_> = p.space_dims().iter().map(|d| d.name().as_str()).collect();
        assert_eq!(vec!["x", "y", "z"], dims);
        assert!(p.time_counter().is_time());
    }

    #[test]
    fn test_bad_geometry() {
        let err = Propagator::from_specs(&specs(10, vec![2, 2, 2, 2], true, 0))
            .err()
            .unwrap();
        assert_eq!(ErrorCode::BadShape, err.code);

        let mut bordered = specs(10, vec![8, 3], true, 0);
        bordered.space_border = 2;
        let err = Propagator::from_specs(&bordered).err().unwrap();
        assert_eq!(ErrorCode::BadShape, err.code);

        let mut p = Propagator::from_specs(&specs(10, vec![8, 8], true, 2)).unwrap();
        let err = p.add_param("u", &[8], DataType::Float32, true).unwrap_err();
        assert_eq!(ErrorCode::BadShape, err.code);
        let err = p
            .add_param("u", &[2, 8, 8], DataType::Float32, false)
            .unwrap_err();
        assert_eq!(ErrorCode::BadShape, err.code);
        let m = p.add_param("m", &[8, 8], DataType::Float32, true).unwrap();
        assert!(!m.dimensions()[0].is_time());
    }

    #[test]
    fn test_ring_mapping_forward() {
        let mut p = Propagator::from_specs(&specs(100, vec![10], true, 2)).unwrap();
        let u = p.add_param("u", &[102, 10], DataType::Float32, true).unwrap();
        let v = p.add_param("v", &[3, 10], DataType::Float32, false).unwrap();

        let slots: Vec<String> = (0..=2)
            .map(|k| {
                let e = at(&v, vec![t_minus(&p, k), x(&p)]);
                format!("{}", p.time_substitutions(&e).unwrap())
            })
            .collect();
        assert_eq!(vec!["v[t2][x]", "v[t1][x]", "v[t0][x]"], slots);

        for k in 0..=2 {
            let e = at(&u, vec![t_minus(&p, k), x(&p)]);
            assert_eq!(e, p.time_substitutions(&e).unwrap());
        }

        // compound expressions are rewritten leaf by leaf
        let e = at(&u, vec![t_minus(&p, 1), x(&p)]) * Expr::Int(2)
            + at(&v, vec![t_minus(&p, 2), x(&p) + Expr::Int(1)]);
        assert_eq!(
            "u[t - 1][x] * 2 + v[t0][x + 1]",
            format!("{}", p.time_substitutions(&e).unwrap())
        );
    }

    #[test]
    fn test_ring_mapping_backward() {
        let mut p = Propagator::from_specs(&specs(100, vec![10], false, 2)).unwrap();
        let v = p.add_param("v", &[3, 10], DataType::Float32, false).unwrap();
        let t = Expr::Dim(p.time_dim().clone());
        let slots: Vec<String> = (0..=2)
            .map(|k| {
                let e = at(&v, vec![t.clone() + Expr::Int(k), x(&p)]);
                format!("{}", p.time_substitutions(&e).unwrap())
            })
            .collect();
        assert_eq!(vec!["v[t2][x]", "v[t1][x]", "v[t0][x]"], slots);
    }

    #[test]
    fn test_offset_outside_ring() {
        let mut p = Propagator::from_specs(&specs(100, vec![10], true, 2)).unwrap();
        let v = p.add_param("v", &[3, 10], DataType::Float32, false).unwrap();
        let t = Expr::Dim(p.time_dim().clone());

        let e = at(&v, vec![t_minus(&p, 3), x(&p)]);
        let err = p.time_substitutions(&e).unwrap_err();
        assert_eq!(ErrorCode::TimeOffsetOutOfRing, err.code);

        let e = at(&v, vec![t.clone() + Expr::Int(1), x(&p)]);
        let err = p.time_substitutions(&e).unwrap_err();
        assert_eq!(ErrorCode::TimeOffsetOutOfRing, err.code);

        let e = at(&v, vec![t * Expr::Int(2), x(&p)]);
        let err = p.time_substitutions(&e).unwrap_err();
        assert_eq!(ErrorCode::TimeOffsetOutOfRing, err.code);
    }

    #[test]
    fn test_time_loop_limits() {
        let mut p = Propagator::from_specs(&specs(100, vec![10], true, 2)).unwrap();
        p.add_param("u", &[100, 10], DataType::Float32, true).unwrap();
        assert_eq!(Limits::new(0, 100, 1), p.time_loop_limits());
        p.add_param("v", &[3, 10], DataType::Float32, false).unwrap();
        assert_eq!(Limits::new(2, 102, 1), p.time_loop_limits());

        let mut p = Propagator::from_specs(&specs(100, vec![10], false, 2)).unwrap();
        assert_eq!(Limits::new(99, -1, -1), p.time_loop_limits());
        p.add_param("v", &[3, 10], DataType::Float32, false).unwrap();
        assert_eq!(Limits::new(99, -1, -1), p.time_loop_limits());
    }

    #[test]
    fn test_space_loop_limits() {
        let mut s = specs(10, vec![50, 60], true, 0);
        s.space_border = 2;
        let p = Propagator::from_specs(&s).unwrap();
        assert_eq!(
            &[Limits::new(2, 58, 1), Limits::new(2, 48, 1)],
            p.space_loop_limits()
        );
    }

    fn stepping(p: &Propagator) -> Vec<String> {
        p.time_stepping()
            .iter()
            .flat_map(|n| n.expressions())
            .map(|e| format!("{} = {}", e.lhs, e.rhs))
            .collect()
    }

    #[test]
    fn test_time_stepping() {
        let mut p = Propagator::from_specs(&specs(100, vec![10], true, 2)).unwrap();
        assert!(p.time_stepping().is_empty());
        p.add_param("v", &[3, 10], DataType::Float32, false).unwrap();
        assert_eq!(
            vec!["t0 = i2 % 3", "t1 = (t0 + 1) % 3", "t2 = (t1 + 1) % 3"],
            stepping(&p)
        );

        let mut p = Propagator::from_specs(&specs(100, vec![10], false, 2)).unwrap();
        p.add_param("v", &[3, 10], DataType::Float32, false).unwrap();
        assert_eq!(
            vec!["t2 = i2 % 3", "t1 = (t2 + 1) % 3", "t0 = (t1 + 1) % 3"],
            stepping(&p)
        );
    }

    fn wave(p: &mut Propagator) -> Array {
        let v = p.add_param("v", &[3, 8, 8], DataType::Float32, false).unwrap();
        let t = Expr::Dim(p.time_dim().clone());
        let (x, y) = (
            Expr::Dim(p.space_dims()[0].clone()),
            Expr::Dim(p.space_dims()[1].clone()),
        );
        let c = Ident::new("c").unwrap();
        let eqn = Equation::new(
            at(&v, vec![t.clone(), x.clone(), y.clone()]),
            Expr::Symbol(c.clone()) * at(&v, vec![t - Expr::Int(1), x, y]),
        );
        p.set_jit_params(vec![c], vec![eqn], vec![vec![Expr::float(0.5)]]);
        v
    }

    #[test]
    fn test_prepare_loop_nest() {
        let mut p = Propagator::from_specs(&specs(10, vec![8, 8], true, 1)).unwrap();
        wave(&mut p);
        let fd = p.get_fd().unwrap();
        let body = fd.body().unwrap();

        let loops: Vec<_> = body
            .iterations()
            .iter()
            .map(|it| (it.dim.name().as_str().to_owned(), it.property))
            .collect();
        assert_eq!(
            vec![
                ("i3".to_owned(), IterationProperty::Sequential),
                ("i2".to_owned(), IterationProperty::Parallel),
                ("i1".to_owned(), IterationProperty::Parallel),
            ],
            loops
        );
        assert_eq!(Limits::new(1, 11, 1), body.iterations()[0].limits);

        let Node::List(nodes) = body else {
            panic!("expected a list body");
        };
        assert!(matches!(&nodes[0], Node::Declaration(s) if s.name().as_str() == "t0"));
        assert!(matches!(&nodes[1], Node::Declaration(s) if s.name().as_str() == "t1"));

        let exprs: Vec<_> = body
            .expressions()
            .iter()
            .map(|e| format!("{} = {}", e.lhs, e.rhs))
            .collect();
        assert_eq!(
            vec![
                "t0 = i3 % 2",
                "t1 = (t0 + 1) % 2",
                "v[t1][i1][i2] = 0.5 * v[t0][i1][i2]",
            ],
            exprs
        );

        let callable = fd.to_callable().unwrap();
        assert_eq!(vec!["v"], callable.parameter_names());
    }

    #[test]
    fn test_loop_steps() {
        let mut p = Propagator::from_specs(&specs(10, vec![8, 8], true, 1)).unwrap();
        let v = wave(&mut p);
        let a = p.add_scalar_param("a", DataType::Float32).unwrap();
        let t = Expr::Dim(p.time_dim().clone());
        let (x, y) = (
            Expr::Dim(p.space_dims()[0].clone()),
            Expr::Dim(p.space_dims()[1].clone()),
        );

        p.add_loop_step(
            &Equation::new(x.clone(), 0),
            &Equation::new(at(&v, vec![t.clone(), x.clone(), y.clone()]), 0),
            None,
            false,
        )
        .unwrap();
        p.add_loop_step(
            &Equation::new(y.clone(), 1),
            &Equation::new(
                at(&v, vec![t.clone() - Expr::Int(1), x.clone(), y.clone()]),
                a,
            ),
            Some(&Equation::new(at(&v, vec![t, x, y]), 1)),
            true,
        )
        .unwrap();
        assert_eq!(1, p.steps().before.len());
        assert_eq!(1, p.steps().after.len());

        let a = p.get_fd().unwrap().to_callable().unwrap();
        let b = p.get_fd().unwrap().to_callable().unwrap();
        // building never consumes the registered steps
        assert_eq!(a, b);
        assert_eq!(1, p.steps().before.len());
        assert_eq!(vec!["v", "a"], a.parameter_names());

        let guards: Vec<_> = a
            .body
            .iterations()
            .last()
            .map(|it| match it.body.as_ref() {
                Node::List(nodes) => nodes
                    .iter()
                    .filter_map(|n| match n {
                        Node::Conditional(c) => Some(format!("{}", c.condition)),
                        _ => None,
                    })
                    .collect(),
                _ => vec![],
            })
            .unwrap();
        assert_eq!(vec!["i2 == 1", "i1 == 0"], guards);

        let exprs: Vec<_> = a
            .body
            .expressions()
            .iter()
            .map(|e| format!("{} = {}", e.lhs, e.rhs))
            .collect();
        assert_eq!("v[t0][i1][i2] = a", exprs[2]);
        assert_eq!("v[t1][i1][i2] = 1", exprs[3]);
        assert_eq!("v[t1][i1][i2] = 0", exprs[5]);
    }

    #[test]
    fn test_space_extents_follow_loop_walk() {
        let mut p = Propagator::from_specs(&specs(1, vec![4, 6], true, 0)).unwrap();
        // x is walked over the last grid extent
        let err = p
            .add_param("w", &[1, 4, 6], DataType::Float64, true)
            .unwrap_err();
        assert_eq!(ErrorCode::BadShape, err.code);
        let u = p.add_param("u", &[1, 6, 4], DataType::Float64, true).unwrap();

        let t = Expr::Dim(p.time_dim().clone());
        let (x, y) = (
            Expr::Dim(p.space_dims()[0].clone()),
            Expr::Dim(p.space_dims()[1].clone()),
        );
        let eqn = Equation::new(
            at(&u, vec![t, x.clone(), y.clone()]),
            x * Expr::Int(10) + y,
        );
        p.set_jit_params(vec![], vec![eqn], vec![vec![]]);
        let callable = p.get_fd().unwrap().to_callable().unwrap();

        let mut interp = Interpreter::new();
        interp.bind_array(u.name(), Buffer::new(vec![1, 6, 4]));
        interp.run(&callable).unwrap();
        let u_buf = interp.array(u.name()).unwrap();
        for i in 0..6 {
            for j in 0..4 {
                assert_eq!(Some((10 * i + j) as f64), u_buf.get(&[0, i, j]));
            }
        }
    }

    #[test]
    fn test_step_registered_before_ring_param() {
        let mut p = Propagator::from_specs(&specs(3, vec![4], true, 1)).unwrap();
        let v = Array::new(
            "v",
            vec![p.time_dim().clone(), p.space_dims()[0].clone()],
            DataType::Float64,
        )
        .unwrap()
        .with_shape(vec![Expr::Int(2), Expr::Int(4)])
        .unwrap();
        let t = Expr::Dim(p.time_dim().clone());
        p.add_loop_step(
            &Equation::new(x(&p), 0),
            &Equation::new(at(&v, vec![t.clone(), x(&p)]), 0),
            None,
            false,
        )
        .unwrap();

        let registered = p.add_param("v", &[2, 4], DataType::Float64, false).unwrap();
        assert_eq!(v, registered);
        let eqn = Equation::new(
            at(&v, vec![t, x(&p)]),
            at(&v, vec![t_minus(&p, 1), x(&p)]) + Expr::float(1.0),
        );
        p.set_jit_params(vec![], vec![eqn], vec![vec![]]);
        let callable = p.get_fd().unwrap().to_callable().unwrap();

        let exprs: Vec<_> = callable
            .body
            .expressions()
            .iter()
            .map(|e| format!("{} = {}", e.lhs, e.rhs))
            .collect();
        assert!(exprs.contains(&"v[t1][i1] = 0".to_owned()));
        assert!(exprs.contains(&"v[t1][i1] = v[t0][i1] + 1.0".to_owned()));

        let mut interp = Interpreter::new();
        interp.bind_array(v.name(), Buffer::new(vec![2, 4]));
        interp.run(&callable).unwrap();
        // steps 1, 2 and 3 alternate slots, ending in slot 0
        let v_buf = interp.array(v.name()).unwrap();
        assert_eq!(Some(0.0), v_buf.get(&[0, 0]));
        assert_eq!(Some(3.0), v_buf.get(&[0, 1]));
        assert_eq!(Some(3.0), v_buf.get(&[0, 3]));
    }

    #[test]
    fn test_prebuilt_body() {
        let mut p = Propagator::from_specs(&specs(4, vec![8], true, 0)).unwrap();
        let u = p.add_param("u", &[4, 8], DataType::Float32, true).unwrap();
        let body = Node::assign(
            at(
                &u,
                vec![
                    Expr::Dim(p.time_counter().clone()),
                    Expr::Dim(p.loop_counters()[0].clone()),
                ],
            ),
            Expr::Int(1),
        );
        p.set_jit_simple(body);
        let callable = p.get_fd().unwrap().to_callable().unwrap();
        assert_eq!(2, callable.body.iterations().len());
        assert_eq!(vec!["u"], callable.parameter_names());
    }

    #[test]
    fn test_missing_source_and_args() {
        let mut p = Propagator::from_specs(&specs(4, vec![8], true, 0)).unwrap();
        let err = p.get_fd().err().unwrap();
        assert_eq!(ErrorCode::MissingKernelSource, err.code);

        let c = Ident::new("c").unwrap();
        p.set_jit_params(vec![c], vec![Equation::new(1, 2)], vec![]);
        let err = p.get_fd().err().unwrap();
        assert_eq!(ErrorCode::MismatchedArguments, err.code);
    }

    #[test]
    fn test_halo_exchange_pins_time() {
        let mut s = specs(4, vec![8], true, 1);
        s.halo.side_mapping = Some(crate::datamodel::SideMapping::Direct);
        let mut p = Propagator::from_specs(&s).unwrap();
        let v = p.add_param("v", &[2, 8], DataType::Float32, false).unwrap();
        let v = v
            .with_halo(vec![Default::default(), crate::types::Extent::new(2, 2)])
            .unwrap();
        let slot = p.time_steppers()[1].clone();
        let exchange = p.halo_exchange(&v, Expr::Scalar(slot)).unwrap();
        assert_eq!(2, exchange.buffers.len());
        assert!(exchange.pack.parameter_names().contains(&"t1"));
    }
}
