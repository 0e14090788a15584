// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::common::{Ident, Result};
use crate::dimensions::Dimension;
use crate::types::{Array, Scalar};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
}

impl BinaryOp {
    // higher the precedence, the tighter the binding.
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 3,
            BinaryOp::Add | BinaryOp::Sub => 2,
            BinaryOp::Lt | BinaryOp::Gt => 1,
            BinaryOp::Eq | BinaryOp::Neq => 0,
        }
    }

    fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::Eq | BinaryOp::Neq
        )
    }

    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negative,
}

/// An element access `array[indices...]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Indexed {
    pub array: Array,
    pub indices: SmallVec<[Expr; 4]>,
}

/// Expr is the symbolic expression language the IR is built from.
///
/// `Symbol` is an untyped name, as written in a stencil equation before
/// substitution.  Everything that survives into a kernel body must have
/// been resolved to a `Scalar`, an `Indexed` array access, a dimension
/// index or a constant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Int(i64),
    Float(OrderedFloat<f64>),
    Symbol(Ident),
    Scalar(Scalar),
    /// The current value of a dimension's index variable.
    Dim(Dimension),
    /// The runtime extent of the named dimension.
    Size(Ident),
    Indexed(Box<Indexed>),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn symbol(name: &str) -> Result<Expr> {
        Ok(Expr::Symbol(Ident::new(name)?))
    }

    pub fn float(value: f64) -> Expr {
        Expr::Float(OrderedFloat(value))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expr::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Expr::Int(_))
    }

    pub fn equals(self, rhs: Expr) -> Expr {
        Expr::Op2(BinaryOp::Eq, Box::new(self), Box::new(rhs))
    }

    /// Recognizes `d`, `d + k`, `k + d` and `d - k` for an integer `k`,
    /// returning the dimension and signed offset.
    pub fn as_dim_offset(&self) -> Option<(&Dimension, i64)> {
        match self {
            Expr::Dim(d) => Some((d, 0)),
            Expr::Op2(BinaryOp::Add, l, r) => match (l.as_ref(), r.as_ref()) {
                (Expr::Dim(d), Expr::Int(k)) | (Expr::Int(k), Expr::Dim(d)) => Some((d, *k)),
                _ => None,
            },
            Expr::Op2(BinaryOp::Sub, l, r) => match (l.as_ref(), r.as_ref()) {
                (Expr::Dim(d), Expr::Int(k)) => Some((d, -*k)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Rebuilds this node with `f` applied to each direct child.  Leaves
    /// are returned unchanged.
    pub fn try_map_children<F>(&self, mut f: F) -> Result<Expr>
    where
        F: FnMut(&Expr) -> Result<Expr>,
    {
        let expr = match self {
            Expr::Int(_)
            | Expr::Float(_)
            | Expr::Symbol(_)
            | Expr::Scalar(_)
            | Expr::Dim(_)
            | Expr::Size(_) => self.clone(),
            Expr::Indexed(indexed) => {
                let indices = indexed
                    .indices
                    .iter()
                    .map(&mut f)
                    .collect::<Result<SmallVec<[Expr; 4]>>>()?;
                Expr::Indexed(Box::new(Indexed {
                    array: indexed.array.clone(),
                    indices,
                }))
            }
            Expr::Op1(op, l) => Expr::Op1(*op, Box::new(f(l)?)),
            Expr::Op2(op, l, r) => Expr::Op2(*op, Box::new(f(l)?), Box::new(f(r)?)),
        };
        Ok(expr)
    }

    /// Structural replacement: any subtree equal to a key of `map` is
    /// replaced by the corresponding value.  Replacements are not
    /// themselves revisited.
    pub fn xreplace(&self, map: &HashMap<Expr, Expr>) -> Expr {
        if let Some(replacement) = map.get(self) {
            return replacement.clone();
        }
        match self.try_map_children(|child| Ok(child.xreplace(map))) {
            Ok(expr) => expr,
            // the mapping closure above never fails
            Err(_) => self.clone(),
        }
    }

    /// Adds the name of every entity and dimension `self` refers to.
    pub fn collect_names(&self, names: &mut BTreeSet<String>) {
        let _ = self.visit(&mut |e| {
            match e {
                Expr::Symbol(id) | Expr::Size(id) => {
                    names.insert(id.to_string());
                }
                Expr::Scalar(s) => {
                    names.insert(s.name().to_string());
                }
                Expr::Dim(d) => {
                    names.insert(d.name().to_string());
                }
                Expr::Indexed(indexed) => {
                    names.insert(indexed.array.name().to_string());
                }
                _ => {}
            }
            Ok(())
        });
    }

    /// Pre-order walk over every node of the expression.
    pub fn visit<F>(&self, f: &mut F) -> Result<()>
    where
        F: FnMut(&Expr) -> Result<()>,
    {
        f(self)?;
        match self {
            Expr::Int(_)
            | Expr::Float(_)
            | Expr::Symbol(_)
            | Expr::Scalar(_)
            | Expr::Dim(_)
            | Expr::Size(_) => {}
            Expr::Indexed(indexed) => {
                for index in indexed.indices.iter() {
                    index.visit(f)?;
                }
            }
            Expr::Op1(_, l) => l.visit(f)?,
            Expr::Op2(_, l, r) => {
                l.visit(f)?;
                r.visit(f)?;
            }
        }
        Ok(())
    }
}

/// `+` folds integer constants and normalizes `a + -k` to `a - k`.
impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Int(l), Expr::Int(r)) => Expr::Int(l + r),
            (lhs, Expr::Int(0)) => lhs,
            (Expr::Int(0), rhs) => rhs,
            (lhs, Expr::Int(r)) if r < 0 => {
                Expr::Op2(BinaryOp::Sub, Box::new(lhs), Box::new(Expr::Int(-r)))
            }
            (lhs, rhs) => Expr::Op2(BinaryOp::Add, Box::new(lhs), Box::new(rhs)),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Int(l), Expr::Int(r)) => Expr::Int(l - r),
            (lhs, Expr::Int(0)) => lhs,
            (lhs, Expr::Int(r)) if r < 0 => {
                Expr::Op2(BinaryOp::Add, Box::new(lhs), Box::new(Expr::Int(-r)))
            }
            (lhs, rhs) => Expr::Op2(BinaryOp::Sub, Box::new(lhs), Box::new(rhs)),
        }
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Int(l), Expr::Int(r)) => Expr::Int(l * r),
            (lhs, Expr::Int(1)) => lhs,
            (Expr::Int(1), rhs) => rhs,
            (lhs, rhs) => Expr::Op2(BinaryOp::Mul, Box::new(lhs), Box::new(rhs)),
        }
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::Op2(BinaryOp::Div, Box::new(self), Box::new(rhs))
    }
}

impl Rem for Expr {
    type Output = Expr;

    fn rem(self, rhs: Expr) -> Expr {
        Expr::Op2(BinaryOp::Mod, Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Int(n) => Expr::Int(-n),
            Expr::Float(OrderedFloat(f)) => Expr::float(-f),
            expr => Expr::Op1(UnaryOp::Negative, Box::new(expr)),
        }
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Int(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Int(n as i64)
    }
}

impl From<usize> for Expr {
    fn from(n: usize) -> Self {
        Expr::Int(n as i64)
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        Expr::float(f)
    }
}

impl From<Scalar> for Expr {
    fn from(scalar: Scalar) -> Self {
        Expr::Scalar(scalar)
    }
}

impl From<&Scalar> for Expr {
    fn from(scalar: &Scalar) -> Self {
        Expr::Scalar(scalar.clone())
    }
}

impl From<Dimension> for Expr {
    fn from(dim: Dimension) -> Self {
        Expr::Dim(dim)
    }
}

impl From<&Dimension> for Expr {
    fn from(dim: &Dimension) -> Self {
        Expr::Dim(dim.clone())
    }
}

/// An assignment-shaped equation, `lhs = rhs`.  Also used for the
/// equality test of a conditional loop step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Equation {
    pub fn new(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Equation {
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    /// Applies `Symbol` -> value substitutions to both sides.
    pub fn subs(&self, bindings: &[(Ident, Expr)]) -> Equation {
        let map: HashMap<Expr, Expr> = bindings
            .iter()
            .map(|(name, value)| (Expr::Symbol(name.clone()), value.clone()))
            .collect();
        Equation {
            lhs: self.lhs.xreplace(&map),
            rhs: self.rhs.xreplace(&map),
        }
    }
}

fn child_needs_parens(parent: &Expr, child: &Expr, is_rhs: bool) -> bool {
    match parent {
        Expr::Op1(_, _) => matches!(child, Expr::Op2(_, _, _)),
        Expr::Op2(parent_op, _, _) => match child {
            Expr::Op2(child_op, _, _) => {
                let (p, c) = (parent_op.precedence(), child_op.precedence());
                // a - (b - c) and a / (b * c) need the grouping kept
                p > c || (p == c && is_rhs && !parent_op.is_commutative())
            }
            _ => false,
        },
        _ => false,
    }
}

fn fmt_child(f: &mut fmt::Formatter, parent: &Expr, child: &Expr, is_rhs: bool) -> fmt::Result {
    if child_needs_parens(parent, child, is_rhs) {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Float(n) => {
                let n = n.into_inner();
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            Expr::Symbol(id) => write!(f, "{id}"),
            Expr::Scalar(s) => write!(f, "{}", s.name()),
            Expr::Dim(d) => write!(f, "{}", d.name()),
            Expr::Size(id) => write!(f, "{id}_size"),
            Expr::Indexed(indexed) => {
                write!(f, "{}", indexed.array.name())?;
                for index in indexed.indices.iter() {
                    write!(f, "[{index}]")?;
                }
                Ok(())
            }
            Expr::Op1(UnaryOp::Negative, l) => {
                write!(f, "-")?;
                fmt_child(f, self, l, false)
            }
            Expr::Op2(op, l, r) => {
                fmt_child(f, self, l, false)?;
                write!(f, " {} ", op.symbol())?;
                fmt_child(f, self, r, true)
            }
        }
    }
}
