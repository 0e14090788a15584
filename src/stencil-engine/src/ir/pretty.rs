// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt::Write;

use crate::dimensions::{Dimension, DimensionKind};
use crate::types::Array;

use super::{Callable, Node, Parameter, Qualifier};

const INDENT: &str = "  ";

fn pretty_parameter(param: &Parameter) -> String {
    match param {
        Parameter::Array(a) => format!("{} *restrict {}_vec", a.dtype().c_type(), a.name()),
        Parameter::Scalar(s) => format!("const {} {}", s.dtype().c_type(), s.name()),
    }
}

fn pretty_cast(array: &Array) -> String {
    let ctype = array.dtype().c_type();
    // every axis but the outermost is part of the pointer type
    let trailing: String = (1..array.rank())
        .map(|i| format!("[{}]", array.allocated_extent(i)))
        .collect();
    format!(
        "{ctype} (*restrict {name}){trailing} = ({ctype} (*){trailing}) {name}_vec;",
        name = array.name()
    )
}

fn pretty_header(callable: &Callable) -> String {
    let mut header = String::new();
    for q in callable.qualifiers.iter() {
        match q {
            Qualifier::Static => header.push_str("static "),
        }
    }
    let retval = callable.retval.map(|t| t.c_type()).unwrap_or("void");
    let params: Vec<_> = callable.parameters.iter().map(pretty_parameter).collect();
    let _ = write!(header, "{retval} {}({})", callable.name, params.join(", "));
    header
}

fn pretty_uindex_init(u: &Dimension) -> String {
    match u.kind() {
        DimensionKind::Incremented { start, .. } => format!(", {} = {}", u.name(), start),
        _ => format!(", {} = 0", u.name()),
    }
}

fn pretty_uindex_step(u: &Dimension) -> String {
    match u.kind() {
        DimensionKind::Incremented { step, .. } => format!(", {} += {}", u.name(), step),
        _ => format!(", {} += 1", u.name()),
    }
}

fn pretty_into(out: &mut String, node: &Node, depth: usize) {
    let pad = INDENT.repeat(depth);
    match node {
        Node::Expression(e) => {
            let _ = writeln!(out, "{pad}{} = {};", e.lhs, e.rhs);
        }
        Node::Declaration(s) => {
            let _ = writeln!(out, "{pad}{} {};", s.dtype().c_type(), s.name());
        }
        Node::ArrayCast(array) => {
            let _ = writeln!(out, "{pad}{}", pretty_cast(array));
        }
        Node::List(nodes) => {
            for n in nodes.iter() {
                pretty_into(out, n, depth);
            }
        }
        Node::Iteration(it) => {
            let d = it.dim.name();
            let cmp = if it.limits.step < 0 { ">" } else { "<" };
            let init: String = it.uindices.iter().map(pretty_uindex_init).collect();
            let incr: String = it.uindices.iter().map(pretty_uindex_step).collect();
            let _ = writeln!(
                out,
                "{pad}for (int {d} = {lower}{init}; {d} {cmp} {upper}; {d} += {step}{incr})",
                lower = it.limits.lower,
                upper = it.limits.upper,
                step = it.limits.step,
            );
            let _ = writeln!(out, "{pad}{{");
            pretty_into(out, &it.body, depth + 1);
            let _ = writeln!(out, "{pad}}}");
        }
        Node::Conditional(cond) => {
            let _ = writeln!(out, "{pad}if ({})", cond.condition);
            let _ = writeln!(out, "{pad}{{");
            pretty_into(out, &cond.then_body, depth + 1);
            let _ = writeln!(out, "{pad}}}");
            if let Some(else_body) = &cond.else_body {
                let _ = writeln!(out, "{pad}else");
                let _ = writeln!(out, "{pad}{{");
                pretty_into(out, else_body, depth + 1);
                let _ = writeln!(out, "{pad}}}");
            }
        }
        Node::Callable(callable) => {
            let _ = writeln!(out, "{pad}{}", pretty_header(callable));
            let _ = writeln!(out, "{pad}{{");
            pretty_into(out, &callable.body, depth + 1);
            let _ = writeln!(out, "{pad}}}");
        }
    }
}

/// pretty renders `node` as an indented C-like listing.  It is meant
/// for reading and debugging IR, not as an emitter.
pub fn pretty(node: &Node) -> String {
    let mut out = String::new();
    pretty_into(&mut out, node, 0);
    out
}
