// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! FunctionDescriptor accumulates the signature and body of a kernel
//! entry point before it is turned into a `Callable`.

use std::collections::HashSet;

use tracing::debug;

use crate::common::{Ident, Result};
use crate::ir::{Callable, Node, Parameter, derive_parameters};
use crate::kernel_err;
use crate::types::{Array, Scalar};

#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Clone, PartialEq)]
pub struct FunctionDescriptor {
    name: Ident,
    matrix_params: Vec<Array>,
    value_params: Vec<Scalar>,
    local_vars: Vec<Scalar>,
    body: Option<Node>,
}

impl FunctionDescriptor {
    pub fn new(name: Ident) -> Self {
        FunctionDescriptor {
            name,
            matrix_params: vec![],
            value_params: vec![],
            local_vars: vec![],
            body: None,
        }
    }

    fn check_unique(&self, name: &Ident) -> Result<()> {
        let taken = self.matrix_params.iter().any(|a| a.name() == name)
            || self.value_params.iter().any(|s| s.name() == name)
            || self.local_vars.iter().any(|s| s.name() == name);
        if taken {
            return kernel_err!(
                DuplicateEntity,
                format!("'{name}' is already registered with '{}'", self.name)
            );
        }
        Ok(())
    }

    pub fn add_matrix_param(&mut self, array: Array) -> Result<()> {
        self.check_unique(array.name())?;
        self.matrix_params.push(array);
        Ok(())
    }

    pub fn add_value_param(&mut self, scalar: Scalar) -> Result<()> {
        self.check_unique(scalar.name())?;
        self.value_params.push(scalar);
        Ok(())
    }

    pub fn add_local_variable(&mut self, scalar: Scalar) -> Result<()> {
        self.check_unique(scalar.name())?;
        self.local_vars.push(scalar);
        Ok(())
    }

    pub fn set_body(&mut self, body: Node) {
        self.body = Some(body);
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn matrix_params(&self) -> &[Array] {
        &self.matrix_params
    }

    pub fn value_params(&self) -> &[Scalar] {
        &self.value_params
    }

    pub fn local_vars(&self) -> &[Scalar] {
        &self.local_vars
    }

    pub fn body(&self) -> Option<&Node> {
        self.body.as_ref()
    }

    /// The signature: arrays, then scalars, each in registration order.
    pub fn params(&self) -> Vec<Parameter> {
        self.matrix_params
            .iter()
            .cloned()
            .map(Parameter::Array)
            .chain(self.value_params.iter().cloned().map(Parameter::Scalar))
            .collect()
    }

    /// to_callable wraps the body with declarations for the local
    /// variables and casts for every array parameter.  Every entity the
    /// body uses must have been registered; unused registrations still
    /// appear in the signature.
    pub fn to_callable(&self) -> Result<Callable> {
        let Some(body) = &self.body else {
            return kernel_err!(
                MissingKernelSource,
                format!("function '{}' has no body", self.name)
            );
        };

        let mut nodes: Vec<Node> = self
            .local_vars
            .iter()
            .cloned()
            .map(Node::Declaration)
            .collect();
        nodes.extend(self.matrix_params.iter().cloned().map(Node::ArrayCast));
        nodes.push(body.clone());
        let body = Node::List(nodes);

        let parameters = self.params();
        let registered: HashSet<&Parameter> = parameters.iter().collect();
        for param in derive_parameters(&body)? {
            if !registered.contains(&param) {
                return kernel_err!(
                    UnknownParameter,
                    format!(
                        "'{}' is used by '{}' but was never registered",
                        param.name(),
                        self.name
                    )
                );
            }
        }

        debug!(
            function = %self.name,
            parameters = parameters.len(),
            locals = self.local_vars.len(),
            "built function"
        );
        Ok(Callable::new(
            self.name.clone(),
            body,
            None,
            parameters,
            vec![],
        ))
    }
}
