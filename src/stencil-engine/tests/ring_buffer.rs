// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Checks that a ring-buffered parameter ends up holding the same values
//! as a parameter that keeps its full history, when both are updated by
//! the same stencil inside one propagator.

use float_cmp::approx_eq;
use stencil_engine::{
    Array, Buffer, DataType, Equation, Expr, Ident, Interpreter, Propagator, PropagatorSpecs,
};

const N: usize = 6;

fn ident(name: &str) -> Ident {
    Ident::new(name).unwrap()
}

fn at(array: &Array, t: Expr, x: Expr) -> Expr {
    array.indexed([t, x])
}

fn initial(row: usize, x: usize) -> f64 {
    // the boundary is never written, so keep it zero in every slot
    if x == 0 || x == N - 1 {
        0.0
    } else {
        (row * N + x) as f64 * 0.1
    }
}

fn row(buf: &Buffer, t: usize) -> Vec<f64> {
    (0..N)
        .map(|x| buf.get(&[t as i64, x as i64]).unwrap())
        .collect()
}

fn assert_rows_eq(expected: &[f64], actual: &[f64]) {
    assert_eq!(expected.len(), actual.len());
    for (e, a) in expected.iter().zip(actual.iter()) {
        assert!(approx_eq!(f64, *e, *a, ulps = 2), "{expected:?} != {actual:?}");
    }
}

#[test]
fn forward_ring_matches_full_history() {
    let nt = 10;
    let specs = PropagatorSpecs {
        space_border: 1,
        time_order: 2,
        ..PropagatorSpecs::new("forward", nt, vec![N])
    };
    let mut p = Propagator::from_specs(&specs).unwrap();
    let u = p
        .add_param("u", &[nt + 2, N], DataType::Float64, true)
        .unwrap();
    let v = p.add_param("v", &[3, N], DataType::Float64, false).unwrap();

    let t = Expr::Dim(p.time_dim().clone());
    let x = Expr::Dim(p.space_dims()[0].clone());
    let (a, b) = (ident("a"), ident("b"));
    let stencil = |f: &Array| {
        Equation::new(
            at(f, t.clone(), x.clone()),
            Expr::Symbol(a.clone()) * at(f, t.clone() - Expr::Int(1), x.clone())
                + Expr::Symbol(b.clone())
                    * (at(f, t.clone() - Expr::Int(2), x.clone() - Expr::Int(1))
                        + at(f, t.clone() - Expr::Int(2), x.clone() + Expr::Int(1))),
        )
    };
    let args = vec![Expr::float(0.5), Expr::float(0.25)];
    p.set_jit_params(
        vec![a.clone(), b.clone()],
        vec![stencil(&u), stencil(&v)],
        vec![args.clone(), args],
    );
    let callable = p.get_fd().unwrap().to_callable().unwrap();
    assert_eq!(vec!["u", "v"], callable.parameter_names());

    let mut u_buf = Buffer::new(vec![nt + 2, N]);
    let mut v_buf = Buffer::new(vec![3, N]);
    for x in 0..N {
        u_buf.set(&[0, x as i64], initial(0, x)).unwrap();
        u_buf.set(&[1, x as i64], initial(1, x)).unwrap();
        // the first step (t = 2) reads t - 1 from slot 0 and t - 2 from slot 2
        v_buf.set(&[0, x as i64], initial(1, x)).unwrap();
        v_buf.set(&[2, x as i64], initial(0, x)).unwrap();
    }

    let mut interp = Interpreter::new();
    interp.bind_array(u.name(), u_buf);
    interp.bind_array(v.name(), v_buf);
    interp.run(&callable).unwrap();

    let u_buf = interp.array(u.name()).unwrap();
    let v_buf = interp.array(v.name()).unwrap();
    let last = nt + 1;
    for back in 0..3 {
        let slot = (last + 2 - back) % 3;
        assert_rows_eq(&row(u_buf, last - back), &row(v_buf, slot));
    }
    // the ring slot variables are left pointing at the last step
    assert_eq!(Some(((last + 2) % 3) as f64), interp.scalar(&ident("t2")));
}

#[test]
fn backward_ring_matches_full_history() {
    let nt = 5;
    let specs = PropagatorSpecs {
        forward: false,
        time_order: 1,
        ..PropagatorSpecs::new("adjoint", nt, vec![N])
    };
    let mut p = Propagator::from_specs(&specs).unwrap();
    let u = p
        .add_param("u", &[nt + 1, N], DataType::Float64, true)
        .unwrap();
    let v = p.add_param("v", &[2, N], DataType::Float64, false).unwrap();

    let t = Expr::Dim(p.time_dim().clone());
    let x = Expr::Dim(p.space_dims()[0].clone());
    let stencil = |f: &Array| {
        Equation::new(
            at(f, t.clone(), x.clone()),
            at(f, t.clone() + Expr::Int(1), x.clone()) * Expr::float(0.5) + Expr::float(1.0),
        )
    };
    p.set_jit_params(vec![], vec![stencil(&u), stencil(&v)], vec![vec![], vec![]]);
    let callable = p.get_fd().unwrap().to_callable().unwrap();

    let mut u_buf = Buffer::new(vec![nt + 1, N]);
    let mut v_buf = Buffer::new(vec![2, N]);
    for x in 0..N {
        u_buf.set(&[nt as i64, x as i64], initial(3, x)).unwrap();
        // the first step (t = nt - 1) reads t + 1 from slot 1
        v_buf.set(&[1, x as i64], initial(3, x)).unwrap();
    }

    let mut interp = Interpreter::new();
    interp.bind_array(u.name(), u_buf);
    interp.bind_array(v.name(), v_buf);
    interp.run(&callable).unwrap();

    let u_buf = interp.array(u.name()).unwrap();
    let v_buf = interp.array(v.name()).unwrap();
    assert_rows_eq(&row(u_buf, 0), &row(v_buf, 0));
    assert_rows_eq(&row(u_buf, 1), &row(v_buf, 1));
}
