// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! A reference interpreter for the loop-nest IR.
//!
//! It runs a `Callable` directly over dense row-major buffers so that
//! generated kernels can be checked numerically without an emitter.
//! All arithmetic is carried out in `f64`; index expressions must
//! evaluate to integral values.

use std::collections::HashMap;

use float_cmp::approx_eq;

use crate::common::{Ident, Result};
use crate::dimensions::{Dimension, DimensionKind};
use crate::eval_err;
use crate::expr::{BinaryOp, Expr, Indexed, UnaryOp};
use crate::ir::{Callable, Iteration, Node};
use crate::types::Array;

fn is_truthy(n: f64) -> bool {
    !approx_eq!(f64, n, 0.0)
}

fn bool_to_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// A dense, row-major buffer of values.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer {
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl Buffer {
    pub fn new(dims: Vec<usize>) -> Self {
        let len = dims.iter().product();
        Buffer {
            dims,
            data: vec![0.0; len],
        }
    }

    pub fn from_vec(dims: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let len: usize = dims.iter().product();
        if len != data.len() {
            return eval_err!(
                BadShape,
                format!("{} values don't fill a buffer of {:?}", data.len(), dims)
            );
        }
        Ok(Buffer { dims, data })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The flat offset of `indices`, if they are in bounds.
    pub fn offset(&self, indices: &[i64]) -> Option<usize> {
        if indices.len() != self.dims.len() {
            return None;
        }
        let mut off = 0;
        for (&i, &n) in indices.iter().zip(self.dims.iter()) {
            if i < 0 || i as usize >= n {
                return None;
            }
            off = off * n + i as usize;
        }
        Some(off)
    }

    pub fn get(&self, indices: &[i64]) -> Option<f64> {
        self.offset(indices).map(|off| self.data[off])
    }

    pub fn set(&mut self, indices: &[i64], value: f64) -> Option<()> {
        let off = self.offset(indices)?;
        self.data[off] = value;
        Some(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Interpreter {
    arrays: HashMap<Ident, Buffer>,
    scalars: HashMap<Ident, f64>,
    sizes: HashMap<Ident, i64>,
    indices: HashMap<Ident, i64>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_array(&mut self, name: &Ident, buffer: Buffer) {
        self.arrays.insert(name.clone(), buffer);
    }

    pub fn bind_scalar(&mut self, name: &Ident, value: f64) {
        self.scalars.insert(name.clone(), value);
    }

    /// Binds the runtime extent of the named dimension.
    pub fn bind_size(&mut self, name: &Ident, size: i64) {
        self.sizes.insert(name.clone(), size);
    }

    pub fn array(&self, name: &Ident) -> Option<&Buffer> {
        self.arrays.get(name)
    }

    pub fn array_mut(&mut self, name: &Ident) -> Option<&mut Buffer> {
        self.arrays.get_mut(name)
    }

    pub fn scalar(&self, name: &Ident) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    pub fn run(&mut self, callable: &Callable) -> Result<()> {
        self.indices.clear();
        self.exec(&callable.body)
    }

    fn exec(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Expression(e) => {
                let value = self.eval(&e.rhs)?;
                self.store(&e.lhs, value)
            }
            Node::Iteration(it) => self.exec_iteration(it),
            Node::Conditional(cond) => {
                if is_truthy(self.eval(&cond.condition)?) {
                    self.exec(&cond.then_body)
                } else if let Some(else_body) = &cond.else_body {
                    self.exec(else_body)
                } else {
                    Ok(())
                }
            }
            Node::List(nodes) => {
                for n in nodes.iter() {
                    self.exec(n)?;
                }
                Ok(())
            }
            Node::ArrayCast(array) => self.check_cast(array),
            Node::Declaration(s) => {
                self.scalars.insert(s.name().clone(), 0.0);
                Ok(())
            }
            Node::Callable(callable) => self.exec(&callable.body),
        }
    }

    fn exec_iteration(&mut self, it: &Iteration) -> Result<()> {
        let lower = self.eval_index(&it.limits.lower)?;
        let upper = self.eval_index(&it.limits.upper)?;
        let step = it.limits.step;
        if step == 0 {
            return eval_err!(
                Generic,
                format!("loop over '{}' has a zero step", it.dim.name())
            );
        }

        let mut i = lower;
        let mut trip = 0;
        while (step > 0 && i < upper) || (step < 0 && i > upper) {
            self.indices.insert(it.dim.name().clone(), i);
            for u in it.uindices.iter() {
                let value = self.uindex_value(u, trip)?;
                self.indices.insert(u.name().clone(), value);
            }
            self.exec(&it.body)?;
            i += step;
            trip += 1;
        }
        Ok(())
    }

    fn uindex_value(&mut self, u: &Dimension, trip: i64) -> Result<i64> {
        match u.kind() {
            DimensionKind::Incremented { start, step, .. } => {
                Ok(self.eval_index(start)? + self.eval_index(step)? * trip)
            }
            _ => Ok(trip),
        }
    }

    fn check_cast(&mut self, array: &Array) -> Result<()> {
        let mut expected = Vec::with_capacity(array.rank());
        for i in 0..array.rank() {
            expected.push(self.eval_index(&array.allocated_extent(i))?);
        }
        let Some(buffer) = self.arrays.get(array.name()) else {
            return eval_err!(
                UnboundSymbol,
                format!("array '{}' is not bound", array.name())
            );
        };
        let matches = buffer.dims.len() == expected.len()
            && buffer
                .dims
                .iter()
                .zip(expected.iter())
                .all(|(&n, &e)| n as i64 == e);
        if !matches {
            return eval_err!(
                BadShape,
                format!(
                    "array '{}' is bound to a {:?} buffer, expected {:?}",
                    array.name(),
                    buffer.dims,
                    expected
                )
            );
        }
        Ok(())
    }

    fn store(&mut self, lhs: &Expr, value: f64) -> Result<()> {
        match lhs {
            Expr::Indexed(indexed) => {
                let indices = self.eval_indices(indexed)?;
                let name = indexed.array.name();
                let Some(buffer) = self.arrays.get_mut(name) else {
                    return eval_err!(UnboundSymbol, format!("array '{name}' is not bound"));
                };
                match buffer.set(&indices, value) {
                    Some(()) => Ok(()),
                    None => eval_err!(
                        IndexOutOfBounds,
                        format!("{indices:?} is outside '{name}' {:?}", buffer.dims)
                    ),
                }
            }
            Expr::Scalar(s) => {
                self.scalars.insert(s.name().clone(), value);
                Ok(())
            }
            _ => eval_err!(Generic, format!("can't assign to '{lhs}'")),
        }
    }

    fn eval_indices(&mut self, indexed: &Indexed) -> Result<Vec<i64>> {
        indexed
            .indices
            .iter()
            .map(|index| self.eval_index(index))
            .collect()
    }

    fn eval_index(&mut self, expr: &Expr) -> Result<i64> {
        let n = self.eval(expr)?;
        if n.fract() != 0.0 || !n.is_finite() {
            return eval_err!(Generic, format!("index '{expr}' evaluated to {n}"));
        }
        Ok(n as i64)
    }

    fn eval(&mut self, expr: &Expr) -> Result<f64> {
        let value = match expr {
            Expr::Int(n) => *n as f64,
            Expr::Float(n) => n.into_inner(),
            Expr::Symbol(name) => {
                return eval_err!(UnboundSymbol, format!("untyped symbol '{name}'"));
            }
            Expr::Scalar(s) => match self.scalars.get(s.name()) {
                Some(n) => *n,
                None => {
                    return eval_err!(
                        UnboundSymbol,
                        format!("scalar '{}' is not bound", s.name())
                    );
                }
            },
            Expr::Dim(d) => match self.indices.get(d.name()) {
                Some(i) => *i as f64,
                None => {
                    return eval_err!(
                        UnboundSymbol,
                        format!("dimension '{}' is not being iterated", d.name())
                    );
                }
            },
            Expr::Size(name) => match self.sizes.get(name) {
                Some(n) => *n as f64,
                None => {
                    return eval_err!(UnboundSymbol, format!("size of '{name}' is not bound"));
                }
            },
            Expr::Indexed(indexed) => {
                let indices = self.eval_indices(indexed)?;
                let name = indexed.array.name();
                let Some(buffer) = self.arrays.get(name) else {
                    return eval_err!(UnboundSymbol, format!("array '{name}' is not bound"));
                };
                match buffer.get(&indices) {
                    Some(n) => n,
                    None => {
                        return eval_err!(
                            IndexOutOfBounds,
                            format!("{indices:?} is outside '{name}' {:?}", buffer.dims)
                        );
                    }
                }
            }
            Expr::Op1(UnaryOp::Negative, l) => -self.eval(l)?,
            Expr::Op2(op, l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Mod => l.rem_euclid(r),
                    BinaryOp::Eq => bool_to_f64(approx_eq!(f64, l, r)),
                    BinaryOp::Neq => bool_to_f64(!approx_eq!(f64, l, r)),
                    BinaryOp::Lt => bool_to_f64(l < r),
                    BinaryOp::Gt => bool_to_f64(l > r),
                }
            }
        };
        Ok(value)
    }
}
