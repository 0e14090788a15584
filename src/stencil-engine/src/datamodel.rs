// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::config_err;

/// Which halo width sizes the transfer buffer on each side.
///
/// Stencils can be asymmetric; whether the LEFT buffer should carry the
/// left or the right halo width depends on the stencil's footprint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideMapping {
    /// LEFT uses the left halo width, RIGHT the right one.
    Direct,
    /// LEFT uses the right halo width, RIGHT the left one.
    Swapped,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaloSpecs {
    #[serde(default)]
    pub side_mapping: Option<SideMapping>,
}

fn default_forward() -> bool {
    true
}

/// Everything needed to set up a time-stepping kernel generator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatorSpecs {
    pub name: String,
    /// Number of time steps.
    pub nt: usize,
    /// Grid extent per spatial axis, slowest varying first.  The first
    /// space dimension `x` is iterated innermost, so it spans the last
    /// entry; `y` spans the one before it.
    pub shape: Vec<usize>,
    #[serde(default)]
    pub space_border: usize,
    #[serde(default = "default_forward")]
    pub forward: bool,
    #[serde(default)]
    pub time_order: usize,
    #[serde(default)]
    pub halo: HaloSpecs,
}

impl PropagatorSpecs {
    pub fn new(name: &str, nt: usize, shape: Vec<usize>) -> Self {
        PropagatorSpecs {
            name: name.to_owned(),
            nt,
            shape,
            space_border: 0,
            forward: true,
            time_order: 0,
            halo: HaloSpecs::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        match serde_json::from_str(json) {
            Ok(specs) => Ok(specs),
            Err(err) => config_err!(BadConfig, err.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        match serde_json::to_string_pretty(self) {
            Ok(json) => Ok(json),
            Err(err) => config_err!(BadConfig, err.to_string()),
        }
    }
}
