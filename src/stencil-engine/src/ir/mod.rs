// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The structured loop-nest IR handed to a code emitter.

pub mod params;
pub mod pretty;

use serde::{Deserialize, Serialize};

use crate::common::Ident;
use crate::dimensions::Dimension;
use crate::expr::Expr;
use crate::types::{Array, DataType, Scalar};

pub use self::params::{Parameter, derive_parameters};
pub use self::pretty::pretty;

/// A single assignment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Expression {
    pub fn new(lhs: Expr, rhs: Expr) -> Self {
        Expression { lhs, rhs }
    }
}

/// Loop bounds: `lower` inclusive, `upper` exclusive in the direction of
/// travel (`<` for positive steps, `>` for negative ones).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub lower: Expr,
    pub upper: Expr,
    pub step: i64,
}

impl Limits {
    pub fn new(lower: impl Into<Expr>, upper: impl Into<Expr>, step: i64) -> Self {
        Limits {
            lower: lower.into(),
            upper: upper.into(),
            step,
        }
    }

    /// `[0, upper)` in unit steps.
    pub fn upto(upper: impl Into<Expr>) -> Self {
        Limits::new(0, upper, 1)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationProperty {
    /// Trips are independent; safe to thread or vectorize.
    Parallel,
    /// Each trip depends on the previous one.
    Sequential,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    pub body: Box<Node>,
    pub dim: Dimension,
    pub limits: Limits,
    /// Synthetic index variables advanced alongside `dim`, once per trip.
    pub uindices: Vec<Dimension>,
    pub property: IterationProperty,
}

impl Iteration {
    pub fn new(body: Node, dim: Dimension, limits: Limits) -> Self {
        Iteration {
            body: Box::new(body),
            dim,
            limits,
            uindices: vec![],
            property: IterationProperty::Parallel,
        }
    }

    pub fn with_uindices(mut self, uindices: Vec<Dimension>) -> Self {
        self.uindices = uindices;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.property = IterationProperty::Sequential;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditional {
    pub condition: Expr,
    pub then_body: Box<Node>,
    pub else_body: Option<Box<Node>>,
}

impl Conditional {
    pub fn new(condition: Expr, then_body: Node, else_body: Option<Node>) -> Self {
        Conditional {
            condition,
            then_body: Box::new(then_body),
            else_body: else_body.map(Box::new),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qualifier {
    /// Internal linkage.
    Static,
}

/// A named unit of code with a parameter list.  `retval` of `None` means
/// the callable returns no value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callable {
    pub name: Ident,
    pub body: Box<Node>,
    pub retval: Option<DataType>,
    pub parameters: Vec<Parameter>,
    pub qualifiers: Vec<Qualifier>,
}

impl Callable {
    pub fn new(
        name: Ident,
        body: Node,
        retval: Option<DataType>,
        parameters: Vec<Parameter>,
        qualifiers: Vec<Qualifier>,
    ) -> Self {
        Callable {
            name,
            body: Box::new(body),
            retval,
            parameters,
            qualifiers,
        }
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name().as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Expression(Expression),
    Iteration(Iteration),
    Conditional(Conditional),
    List(Vec<Node>),
    /// Casts a raw buffer to its typed multidimensional view.
    ArrayCast(Array),
    /// Declares a scalar local to the enclosing callable.
    Declaration(Scalar),
    Callable(Callable),
}

impl Node {
    pub fn assign(lhs: Expr, rhs: Expr) -> Node {
        Node::Expression(Expression::new(lhs, rhs))
    }

    /// Direct children, in execution order.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Expression(_) | Node::ArrayCast(_) | Node::Declaration(_) => vec![],
            Node::Iteration(it) => vec![it.body.as_ref()],
            Node::Conditional(cond) => {
                let mut children = vec![cond.then_body.as_ref()];
                if let Some(else_body) = &cond.else_body {
                    children.push(else_body.as_ref());
                }
                children
            }
            Node::List(nodes) => nodes.iter().collect(),
            Node::Callable(callable) => vec![callable.body.as_ref()],
        }
    }

    /// Every `Iteration` in the tree, outermost first.
    pub fn iterations(&self) -> Vec<&Iteration> {
        let mut result = vec![];
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Node::Iteration(it) = node {
                result.push(it);
            }
            // reversed so that siblings pop in program order
            stack.extend(node.children().into_iter().rev());
        }
        result
    }

    /// Every `Expression` in the tree, in program order.
    pub fn expressions(&self) -> Vec<&Expression> {
        let mut result = vec![];
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Node::Expression(expr) = node {
                result.push(expr);
            }
            stack.extend(node.children().into_iter().rev());
        }
        result
    }
}
