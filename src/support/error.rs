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

use std::collections::TryReserveError;
use std::fmt;
use std::io;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("Name too long")]
    NameTooLong,
    #[error("Macro expansion length exceeded")]
    LengthExceeded,
    #[error("Unable to allocate record: {0}")]
    Alloc(#[from] TryReserveError),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// The errno-style code corresponding to this error, for callers which
    /// speak the C convention.
    pub fn errno(&self) -> Errno {
        match *self {
            Self::Syntax(_) | Self::Config(_) => Errno::EINVAL,
            Self::NameTooLong => Errno::ENAMETOOLONG,
            Self::LengthExceeded => Errno::E2BIG,
            Self::Alloc(_) => Errno::ENOMEM,
            Self::Io(ref e) => {
                e.raw_os_error().map_or(Errno::EIO, Errno::from_i32)
            },
        }
    }
}

/// Details about where parsing of an SPF record failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset into the record of the failure.
    pub offset: usize,
    /// The offending byte, or `None` if the record ended prematurely.
    pub byte: Option<u8>,
    /// The raw bytes leading up to and including the offending byte.
    pub context: Vec<u8>,
}

impl SyntaxError {
    /// Captures the failure at `offset` in `input`, keeping up to `window`
    /// bytes of preceding input as context.
    pub fn capture(input: &[u8], offset: usize, window: usize) -> Self {
        let offset = offset.min(input.len());
        let begin = offset.saturating_sub(window);
        let end = (offset + 1).min(input.len());
        Self {
            offset,
            byte: input.get(offset).copied(),
            context: input[begin..end].to_vec(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SPF syntax error at offset {}: ", self.offset)?;
        match self.byte {
            None => write!(f, "unexpected end of record")?,
            Some(b) => write!(f, "unexpected '{}'", escape(&[b]))?,
        }
        write!(f, " near \"{}\"", escape(&self.context))
    }
}

impl std::error::Error for SyntaxError {}

fn escape(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|&b| std::ascii::escape_default(b))
        .map(char::from)
        .collect()
}
