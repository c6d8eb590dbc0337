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

//! The terms of an SPF record and their canonical text form.
//! RFC 7208 § 4.6.1, § 12

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::support::bounded::copy_truncating;

/// The domain-spec used by mechanisms which were not given one.
pub const DEFAULT_DOMAIN_SPEC: &str = "%{d}";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Directive(Directive),
    Modifier(Modifier),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    pub qualifier: Qualifier,
    pub mechanism: Mechanism,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Qualifier {
    Pass,
    Fail,
    SoftFail,
    Neutral,
}

impl Default for Qualifier {
    fn default() -> Self {
        Self::Pass
    }
}

impl Qualifier {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(Self::Pass),
            b'-' => Some(Self::Fail),
            b'~' => Some(Self::SoftFail),
            b'?' => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Pass => '+',
            Self::Fail => '-',
            Self::SoftFail => '~',
            Self::Neutral => '?',
        }
    }
}

/// The CIDR prefix lengths applied to addresses found by `a` and `mx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DualCidr {
    /// 0..=32
    pub ip4: u8,
    /// 0..=128
    pub ip6: u8,
}

impl Default for DualCidr {
    fn default() -> Self {
        Self { ip4: 32, ip6: 128 }
    }
}

// Domain-specs are kept in their unexpanded macro-string form, after dot
// normalisation. Mechanisms whose domain-spec is optional carry
// `DEFAULT_DOMAIN_SPEC` when it is absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mechanism {
    All,
    Include(String),
    A(String, DualCidr),
    Mx(String, DualCidr),
    Ptr(String),
    Ip4(Ipv4Addr, u8),
    Ip6(Ipv6Addr, u8),
    Exists(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modifier {
    Redirect(String),
    Explanation(String),
    /// Any other `name=value` pair. These are retained verbatim so that newer
    /// modifiers never break older parsers.
    Unknown { name: String, value: String },
}

/// The flat kind of a term, for dispatch and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermKind {
    All,
    Include,
    A,
    Mx,
    Ptr,
    Ip4,
    Ip6,
    Exists,
    Redirect,
    Exp,
    Unknown,
}

impl TermKind {
    /// The mechanisms, in the order the parser tries them.
    pub const MECHANISMS: [Self; 8] = [
        Self::All,
        Self::Include,
        Self::A,
        Self::Mx,
        Self::Ptr,
        Self::Ip4,
        Self::Ip6,
        Self::Exists,
    ];

    /// The keyword introducing the term. Empty for unknown modifiers.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Include => "include",
            Self::A => "a",
            Self::Mx => "mx",
            Self::Ptr => "ptr",
            Self::Ip4 => "ip4",
            Self::Ip6 => "ip6",
            Self::Exists => "exists",
            Self::Redirect => "redirect",
            Self::Exp => "exp",
            Self::Unknown => "",
        }
    }

    pub fn is_mechanism(self) -> bool {
        !matches!(self, Self::Redirect | Self::Exp | Self::Unknown)
    }
}

impl Mechanism {
    pub fn kind(&self) -> TermKind {
        match *self {
            Self::All => TermKind::All,
            Self::Include(..) => TermKind::Include,
            Self::A(..) => TermKind::A,
            Self::Mx(..) => TermKind::Mx,
            Self::Ptr(..) => TermKind::Ptr,
            Self::Ip4(..) => TermKind::Ip4,
            Self::Ip6(..) => TermKind::Ip6,
            Self::Exists(..) => TermKind::Exists,
        }
    }

    /// The domain-spec, for mechanisms which have one.
    pub fn domain_spec(&self) -> Option<&str> {
        match *self {
            Self::Include(ref d)
            | Self::A(ref d, _)
            | Self::Mx(ref d, _)
            | Self::Ptr(ref d)
            | Self::Exists(ref d) => Some(d),
            Self::All | Self::Ip4(..) | Self::Ip6(..) => None,
        }
    }
}

impl Modifier {
    pub fn kind(&self) -> TermKind {
        match *self {
            Self::Redirect(..) => TermKind::Redirect,
            Self::Explanation(..) => TermKind::Exp,
            Self::Unknown { .. } => TermKind::Unknown,
        }
    }
}

impl Term {
    pub fn kind(&self) -> TermKind {
        match *self {
            Self::Directive(ref d) => d.mechanism.kind(),
            Self::Modifier(ref m) => m.kind(),
        }
    }

    /// The qualifier of a directive. Modifiers have none.
    pub fn qualifier(&self) -> Option<Qualifier> {
        match *self {
            Self::Directive(ref d) => Some(d.qualifier),
            Self::Modifier(_) => None,
        }
    }

    /// The unexpanded domain-spec carried by the term, if any.
    pub fn domain_spec(&self) -> Option<&str> {
        match *self {
            Self::Directive(ref d) => d.mechanism.domain_spec(),
            Self::Modifier(Modifier::Redirect(ref d))
            | Self::Modifier(Modifier::Explanation(ref d)) => Some(d),
            Self::Modifier(Modifier::Unknown { .. }) => None,
        }
    }
}

/// Writes the canonical form of `term` into `dst`, keeping at most `cap`
/// bytes.
///
/// Returns the full length of the canonical form.
pub fn render_bounded(term: &Term, dst: &mut String, cap: usize) -> usize {
    copy_truncating(dst, &term.to_string(), cap)
}

// The canonical form spells out every default so that it parses back to the
// identical term: the qualifier is always present, optional domain-specs are
// written out, and CIDR lengths are always given.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Directive(ref d) => write!(f, "{}", d),
            Self::Modifier(ref m) => write!(f, "{}", m),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.qualifier.as_char(),
            self.mechanism.kind().keyword(),
        )?;

        match self.mechanism {
            Mechanism::All => Ok(()),
            Mechanism::Include(ref d)
            | Mechanism::Ptr(ref d)
            | Mechanism::Exists(ref d) => write!(f, ":{}", d),
            Mechanism::A(ref d, cidr) | Mechanism::Mx(ref d, cidr) => {
                write!(f, ":{}/{}//{}", d, cidr.ip4, cidr.ip6)
            },
            Mechanism::Ip4(addr, len) => write!(f, ":{}/{}", addr, len),
            Mechanism::Ip6(addr, len) => {
                f.write_str(":")?;
                for (i, segment) in addr.segments().iter().enumerate() {
                    if 0 != i {
                        f.write_str(":")?;
                    }
                    write!(f, "{:04x}", segment)?;
                }
                write!(f, "/{}", len)
            },
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Redirect(ref d) => write!(f, "redirect={}", d),
            Self::Explanation(ref d) => write!(f, "exp={}", d),
            Self::Unknown {
                ref name,
                ref value,
            } => write!(f, "{}={}", name, value),
        }
    }
}
