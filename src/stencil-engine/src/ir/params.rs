// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::common::{Ident, Result};
use crate::dimensions::DimensionKind;
use crate::expr::Expr;
use crate::kernel_err;
use crate::types::{Array, Scalar, Scope};

use super::Node;

/// An external input of a callable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    Array(Array),
    Scalar(Scalar),
}

impl Parameter {
    pub fn name(&self) -> &Ident {
        match self {
            Parameter::Array(a) => a.name(),
            Parameter::Scalar(s) => s.name(),
        }
    }
}

#[derive(Default)]
struct Collector {
    declared: HashSet<Ident>,
    seen: HashMap<Ident, Parameter>,
    arrays: Vec<Ident>,
    scalars: Vec<Ident>,
}

impl Collector {
    fn add(&mut self, param: Parameter) -> Result<()> {
        let name = param.name().clone();
        if let Some(existing) = self.seen.get(&name) {
            if *existing != param {
                return kernel_err!(
                    DuplicateEntity,
                    format!("'{name}' names two different entities")
                );
            }
            return Ok(());
        }
        match param {
            Parameter::Array(_) => self.arrays.push(name.clone()),
            Parameter::Scalar(_) => self.scalars.push(name.clone()),
        }
        self.seen.insert(name, param);
        Ok(())
    }

    fn add_array(&mut self, array: &Array) -> Result<()> {
        if array.scope() == Scope::Local {
            return Ok(());
        }
        self.add(Parameter::Array(array.clone()))
    }

    fn expr(&mut self, expr: &Expr) -> Result<()> {
        expr.visit(&mut |e| match e {
            Expr::Indexed(indexed) => self.add_array(&indexed.array),
            Expr::Scalar(s) if !self.declared.contains(s.name()) => {
                self.add(Parameter::Scalar(s.clone()))
            }
            Expr::Symbol(name) => kernel_err!(
                UnknownEntity,
                format!("'{name}' is neither an array nor a scalar")
            ),
            _ => Ok(()),
        })
    }

    fn node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Expression(e) => {
                self.expr(&e.lhs)?;
                self.expr(&e.rhs)?;
            }
            Node::Iteration(it) => {
                self.expr(&it.limits.lower)?;
                self.expr(&it.limits.upper)?;
                for u in it.uindices.iter() {
                    if let DimensionKind::Incremented { start, step, .. } = u.kind() {
                        self.expr(start)?;
                        self.expr(step)?;
                    }
                }
            }
            Node::Conditional(cond) => self.expr(&cond.condition)?,
            Node::ArrayCast(array) => self.add_array(array)?,
            Node::Declaration(_) | Node::List(_) | Node::Callable(_) => {}
        }
        for child in node.children() {
            self.node(child)?;
        }
        Ok(())
    }
}

fn collect_declarations(node: &Node, declared: &mut HashSet<Ident>) {
    if let Node::Declaration(s) = node {
        declared.insert(s.name().clone());
    }
    for child in node.children() {
        collect_declarations(child, declared);
    }
}

/// derive_parameters returns the arrays and scalars `node` reads or
/// writes that aren't defined inside it: arrays first, then scalars,
/// each in order of first appearance.  Dimension indices and sizes,
/// locally declared scalars and locally allocated arrays are excluded.
/// An untyped symbol anywhere in the tree is an error.
pub fn derive_parameters(node: &Node) -> Result<Vec<Parameter>> {
    let mut collector = Collector::default();
    collect_declarations(node, &mut collector.declared);
    collector.node(node)?;

    let Collector {
        mut seen,
        arrays,
        scalars,
        ..
    } = collector;
    Ok(arrays
        .into_iter()
        .chain(scalars)
        .filter_map(|name| seen.remove(&name))
        .collect())
}
