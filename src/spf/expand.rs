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

//! Expansion of SPF macro strings.
//! RFC 7208 § 7
//!
//! All work happens within a fixed capacity. Neither a single macro value nor
//! the output may reach it, which limits how much a hostile record can
//! amplify the data it is given.

use log::debug;
use memchr::memchr;

use super::env::Environment;
use crate::support::bounded::push_truncating;
use crate::support::config::{Config, Limits};
use crate::support::error::Error;

/// Expands `template` against `env` with the default limits.
pub fn expand(template: &str, env: &Environment) -> Result<String, Error> {
    Expander::new(env, &Config::default()).expand(template)
}

/// Expands macro strings against one environment.
pub struct Expander<'a> {
    env: &'a Environment,
    limits: Limits,
    trace: bool,
}

impl<'a> Expander<'a> {
    pub fn new(env: &'a Environment, config: &Config) -> Self {
        Self {
            env,
            limits: config.limits,
            trace: config.trace,
        }
    }

    /// Expands `template`.
    ///
    /// Literal text is copied unchanged. `%{...}` is replaced by the macro it
    /// names; if it has no closing brace, the `%{` is kept as literal text. A
    /// `%` followed by anything else yields that following character, so
    /// `%%`, `%_` and `%-` produce `%`, `_` and `-` respectively.
    pub fn expand(&self, template: &str) -> Result<String, Error> {
        let mut out = String::new();
        let mut rest = template;

        while let Some(percent) = memchr(b'%', rest.as_bytes()) {
            self.push(&mut out, &rest[..percent])?;
            let after = &rest[percent + 1..];

            if let Some(body) = after.strip_prefix('{') {
                match memchr(b'}', body.as_bytes()) {
                    Some(close) => {
                        let expansion = self.macro_expand(&body[..close])?;
                        self.push(&mut out, &expansion)?;
                        rest = &body[close + 1..];
                    },
                    None => {
                        self.push(&mut out, "%{")?;
                        rest = body;
                    },
                }
            } else {
                let next_len = after.chars().next().map_or(0, char::len_utf8);
                self.push(&mut out, &after[..next_len])?;
                rest = &after[next_len..];
            }
        }

        self.push(&mut out, rest)?;
        Ok(out)
    }

    fn push(&self, out: &mut String, s: &str) -> Result<(), Error> {
        if push_truncating(out, s, self.limits.macro_capacity)
            >= self.limits.macro_capacity
        {
            return Err(Error::LengthExceeded);
        }

        Ok(())
    }

    /// Expands the text between `%{` and `}`.
    ///
    /// The first character selects the value. It may be followed by a number
    /// of parts to keep, then `r` to reverse the parts, then the characters
    /// to split on.
    fn macro_expand(&self, spec: &str) -> Result<String, Error> {
        let Some((&letter, mut transformers)) = spec.as_bytes().split_first()
        else {
            return Ok(String::new());
        };

        let Some((value, _)) = self.env.get(letter) else {
            if self.trace {
                debug!("Unknown macro {:?} expands to nothing", spec);
            }
            return Ok(String::new());
        };

        if value.len() >= self.limits.macro_capacity {
            return Err(Error::LengthExceeded);
        }

        let digits = transformers
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let keep_parts = if digits > 0 {
            Some(transformers[..digits].iter().fold(0usize, |n, &d| {
                n.saturating_mul(10).saturating_add(usize::from(d - b'0'))
            }))
        } else {
            None
        };
        transformers = &transformers[digits..];

        let reverse = matches!(transformers.first(), Some(b'r' | b'R'));
        if reverse {
            transformers = &transformers[1..];
        }

        let expansion = if keep_parts.is_none()
            && !reverse
            && transformers.is_empty()
        {
            value.to_owned()
        } else {
            let delimiters: &[u8] = if transformers.is_empty() {
                b"."
            } else {
                transformers
            };
            self.transform(value, delimiters, keep_parts, reverse)?
        };

        if self.trace {
            debug!("%{{{}}} => {:?}", spec, expansion);
        }

        Ok(expansion)
    }

    // Per RFC 7208 § 7.3, splitting is done naïvely, with no special handling
    // for adjacent delimiters or delimiters at the start/end of the string.
    fn transform(
        &self,
        value: &str,
        delimiters: &[u8],
        keep_parts: Option<usize>,
        reverse: bool,
    ) -> Result<String, Error> {
        let mut parts = Vec::new();
        for part in value.split(|c: char| {
            c.is_ascii() && delimiters.contains(&(c as u8))
        }) {
            if parts.len() >= self.limits.macro_parts {
                return Err(Error::LengthExceeded);
            }
            parts.push(part);
        }

        if reverse {
            parts.reverse();
        }

        let skip = keep_parts.map_or(0, |n| parts.len().saturating_sub(n));

        let mut out = String::new();
        for (i, part) in parts[skip..].iter().enumerate() {
            if 0 != i {
                self.push(&mut out, ".")?;
            }
            self.push(&mut out, part)?;
        }

        Ok(out)
    }
}
