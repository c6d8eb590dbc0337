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

//! Parsing of Sender Policy Framework records and expansion of their macros.
//!
//! This crate does no DNS I/O and does not evaluate policies. A caller that
//! has fetched the TXT record for a domain hands the raw string to
//! [`Record::parse`], walks the resulting [`Term`]s, and uses [`expand`] to
//! turn the domain-specs found in them into names for further lookups.
//!
//! Everything here is synchronous and bounded by the size of its input and
//! the fixed [`Limits`].

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr $(,)?) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod spf;
pub mod support;

pub use spf::domain::normalize;
pub use spf::env::{Environment, Field};
pub use spf::expand::{expand, Expander};
pub use spf::record::{is_spf_record, parse, Record, RecordType};
pub use spf::term::{
    Directive, DualCidr, Mechanism, Modifier, Qualifier, Term, TermKind,
};
pub use support::config::{Config, Limits};
pub use support::error::{Error, SyntaxError};

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}][{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message,
                ))
            })
            .level(log::LevelFilter::Debug)
            .chain(std::io::stderr())
            .apply()
            .unwrap();
    })
}
