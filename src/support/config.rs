//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of spf-policy.
//
// spf-policy is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// spf-policy is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// spf-policy. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Configuration for SPF record parsing and macro expansion.
///
/// This can be embedded in a larger TOML configuration file or loaded on its
/// own. Every field has a default, so an empty document is valid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// If true, the parser and macro expander log their progress at debug
    /// level.
    pub trace: bool,

    /// Fixed bounds applied to untrusted data.
    pub limits: Limits,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// The maximum length of the query name and of any domain-spec captured
    /// from a record, after normalisation.
    pub domain_spec: usize,

    /// The working capacity of the macro expander.
    ///
    /// No macro value, nor the complete expansion, may reach this many bytes.
    /// This bounds the amplification a hostile record can cause.
    pub macro_capacity: usize,

    /// The maximum number of parts a macro value may be split into.
    pub macro_parts: usize,

    /// How many bytes before the failure point are kept when reporting a
    /// syntax error.
    pub error_context: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            domain_spec: 255,
            macro_capacity: 512,
            macro_parts: 128,
            error_context: 16,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
