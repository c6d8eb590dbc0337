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

//! Parsing of SPF records.
//! RFC 7208 § 4.5, § 4.6, § 12
//!
//! The parser is a single forward pass over the raw TXT string. It never
//! looks beyond the end of the term it is working on, and it stops at the
//! first byte which cannot continue the grammar.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use log::debug;

use super::domain::normalize_into;
use super::term::{
    Directive, DualCidr, Mechanism, Modifier, Qualifier, Term, TermKind,
    DEFAULT_DOMAIN_SPEC,
};
use crate::support::config::{Config, Limits};
use crate::support::error::{Error, SyntaxError};

/// The version tag every SPF record starts with.
pub const VERSION_TAG: &[u8] = b"v=spf1";

/// Space reserved up front for terms, so that most records never reallocate.
const INITIAL_TERMS: usize = 16;

/// The DNS record type an SPF record was found in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    Txt,
    /// The obsolete `SPF` record type (RFC 4408).
    Spf,
}

impl RecordType {
    /// The IANA RR type code.
    pub fn code(self) -> u16 {
        match self {
            Self::Txt => 16,
            Self::Spf => 99,
        }
    }
}

/// A parsed SPF record.
///
/// A `Record` starts out empty, bound to the name that was queried. Parsing
/// appends terms in the order they appear. If parsing fails, the terms before
/// the failure are kept and `error()` describes where it stopped.
#[derive(Clone, Debug)]
pub struct Record {
    name: String,
    record_type: RecordType,
    terms: Vec<Term>,
    error: Option<SyntaxError>,
    limits: Limits,
    trace: bool,
}

impl Record {
    /// Creates an empty record for `name` with the default configuration.
    pub fn new(name: &str, record_type: RecordType) -> Result<Self, Error> {
        Self::with_config(name, record_type, &Config::default())
    }

    pub fn with_config(
        name: &str,
        record_type: RecordType,
        config: &Config,
    ) -> Result<Self, Error> {
        let mut normalized = String::new();
        if normalize_into(&mut normalized, name, config.limits.domain_spec)
            > config.limits.domain_spec
        {
            return Err(Error::NameTooLong);
        }

        let mut terms = Vec::new();
        terms.try_reserve(INITIAL_TERMS)?;

        Ok(Self {
            name: normalized,
            record_type,
            terms,
            error: None,
            limits: config.limits,
            trace: config.trace,
        })
    }

    /// Parses `rdata`, a single TXT character-string, appending its terms.
    ///
    /// On a syntax error, the error is also retained in the record, and every
    /// later call fails with that same error without touching the record.
    pub fn parse(&mut self, rdata: &[u8]) -> Result<(), Error> {
        if let Some(ref e) = self.error {
            return Err(Error::Syntax(e.clone()));
        }

        let mut parser = Parser {
            input: rdata,
            pos: 0,
            limits: &self.limits,
            trace: self.trace,
        };

        match parser.record(&mut self.terms) {
            Err(Error::Syntax(e)) => {
                if self.trace {
                    debug!("{}: {}", self.name, e);
                }
                self.error = Some(e.clone());
                Err(Error::Syntax(e))
            },
            r => r,
        }
    }

    /// The normalised name the record was queried under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// All terms, in record order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Where parsing failed, if it did.
    pub fn error(&self) -> Option<&SyntaxError> {
        self.error.as_ref()
    }

    /// The directives, in the order they must be evaluated.
    pub fn directives(&self) -> impl Iterator<Item = &Directive> + '_ {
        self.terms.iter().filter_map(|t| match *t {
            Term::Directive(ref d) => Some(d),
            Term::Modifier(_) => None,
        })
    }

    /// The domain-spec of the first `redirect` modifier.
    pub fn redirect(&self) -> Option<&str> {
        self.terms.iter().find_map(|t| match *t {
            Term::Modifier(Modifier::Redirect(ref d)) => Some(&**d),
            _ => None,
        })
    }

    /// The domain-spec of the first `exp` modifier.
    pub fn explanation(&self) -> Option<&str> {
        self.terms.iter().find_map(|t| match *t {
            Term::Modifier(Modifier::Explanation(ref d)) => Some(&**d),
            _ => None,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("v=spf1")?;
        for term in &self.terms {
            write!(f, " {}", term)?;
        }
        Ok(())
    }
}

/// Parses `rdata` as the SPF record found at `name`.
///
/// Partially-parsed terms are discarded on error; use `Record::parse` to keep
/// them.
pub fn parse(name: &str, rdata: &[u8]) -> Result<Record, Error> {
    let mut record = Record::new(name, RecordType::Txt)?;
    record.parse(rdata)?;
    Ok(record)
}

/// Whether `rdata` claims to be an SPF record; i.e., starts with the version
/// tag followed by a space or nothing at all.
///
/// RFC 7208 § 4.5
pub fn is_spf_record(rdata: &[u8]) -> bool {
    rdata.len() >= VERSION_TAG.len()
        && rdata[..VERSION_TAG.len()].eq_ignore_ascii_case(VERSION_TAG)
        && matches!(rdata.get(VERSION_TAG.len()), None | Some(b' '))
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    limits: &'a Limits,
    trace: bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_is(&self, pred: impl FnOnce(u8) -> bool) -> bool {
        self.peek().map_or(false, pred)
    }

    fn fail<T>(&self, at: usize) -> Result<T, Error> {
        Err(Error::Syntax(SyntaxError::capture(
            self.input,
            at,
            self.limits.error_context,
        )))
    }

    fn expect(&mut self, b: u8) -> Result<(), Error> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            self.fail(self.pos)
        }
    }

    fn at_term_end(&self) -> bool {
        matches!(self.peek(), None | Some(b' '))
    }

    fn end_of_term(&self) -> Result<(), Error> {
        if self.at_term_end() {
            Ok(())
        } else {
            self.fail(self.pos)
        }
    }

    // record = version terms *SP
    // terms  = *( 1*SP ( directive / modifier ) )
    fn record(&mut self, terms: &mut Vec<Term>) -> Result<(), Error> {
        for &expected in VERSION_TAG {
            if !self.peek_is(|b| b.eq_ignore_ascii_case(&expected)) {
                return self.fail(self.pos);
            }
            self.pos += 1;
        }

        loop {
            if self.peek().is_none() {
                return Ok(());
            }

            self.expect(b' ')?;
            while self.peek() == Some(b' ') {
                self.pos += 1;
            }

            if self.peek().is_none() {
                return Ok(());
            }

            let term = self.term()?;
            if self.trace {
                debug!("Parsed SPF term {}", term);
            }
            terms.push(term);
        }
    }

    // directive = [ qualifier ] mechanism
    // modifier  = redirect / explanation / unknown-modifier
    fn term(&mut self) -> Result<Term, Error> {
        let qualifier = self.peek().and_then(Qualifier::from_byte);
        if qualifier.is_some() {
            self.pos += 1;
        }

        let name_start = self.pos;
        let name = self.name()?;

        if qualifier.is_none() && self.peek() == Some(b'=') {
            self.pos += 1;
            return self.modifier(name).map(Term::Modifier);
        }

        let Some(kind) = TermKind::MECHANISMS
            .into_iter()
            .find(|k| k.keyword().as_bytes().eq_ignore_ascii_case(name))
        else {
            return self.fail(name_start);
        };

        let mechanism = self.mechanism(kind)?;
        Ok(Term::Directive(Directive {
            qualifier: qualifier.unwrap_or_default(),
            mechanism,
        }))
    }

    // name = ALPHA *( ALPHA / DIGIT / "-" / "_" / "." )
    fn name(&mut self) -> Result<&'a [u8], Error> {
        let start = self.pos;
        if !self.peek_is(|b| b.is_ascii_alphabetic()) {
            return self.fail(self.pos);
        }

        while self.peek_is(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')
        }) {
            self.pos += 1;
        }

        let input = self.input;
        Ok(&input[start..self.pos])
    }

    fn mechanism(&mut self, kind: TermKind) -> Result<Mechanism, Error> {
        let mechanism = match kind {
            TermKind::All => Mechanism::All,
            TermKind::Include => {
                self.expect(b':')?;
                Mechanism::Include(self.domain_spec(false)?)
            },
            TermKind::A => {
                let (domain, cidr) = self.domain_and_dual_cidr()?;
                Mechanism::A(domain, cidr)
            },
            TermKind::Mx => {
                let (domain, cidr) = self.domain_and_dual_cidr()?;
                Mechanism::Mx(domain, cidr)
            },
            TermKind::Ptr => Mechanism::Ptr(self.optional_domain_spec(false)?),
            TermKind::Ip4 => {
                self.expect(b':')?;
                let addr: Ipv4Addr =
                    self.ip_literal(|b| b.is_ascii_digit() || b == b'.')?;
                Mechanism::Ip4(addr, self.single_cidr(32)?)
            },
            TermKind::Ip6 => {
                self.expect(b':')?;
                let addr: Ipv6Addr = self.ip_literal(|b| {
                    b.is_ascii_hexdigit() || b == b':' || b == b'.'
                })?;
                Mechanism::Ip6(addr, self.single_cidr(128)?)
            },
            TermKind::Exists => {
                self.expect(b':')?;
                Mechanism::Exists(self.domain_spec(false)?)
            },
            TermKind::Redirect | TermKind::Exp | TermKind::Unknown => {
                unreachable!()
            },
        };

        self.end_of_term()?;
        Ok(mechanism)
    }

    fn modifier(&mut self, name: &[u8]) -> Result<Modifier, Error> {
        if name.eq_ignore_ascii_case(b"redirect") {
            Ok(Modifier::Redirect(self.domain_spec(false)?))
        } else if name.eq_ignore_ascii_case(b"exp") {
            Ok(Modifier::Explanation(self.domain_spec(false)?))
        } else {
            // Unknown modifiers are accepted with any printable value, even
            // an empty one.
            let start = self.pos;
            while !self.at_term_end() {
                if !self.peek_is(is_visible) {
                    return self.fail(self.pos);
                }
                self.pos += 1;
            }

            Ok(Modifier::Unknown {
                name: ascii(name),
                value: ascii(&self.input[start..self.pos]),
            })
        }
    }

    fn domain_and_dual_cidr(&mut self) -> Result<(String, DualCidr), Error> {
        let domain = self.optional_domain_spec(true)?;
        let cidr = self.dual_cidr()?;
        Ok((domain, cidr))
    }

    fn optional_domain_spec(
        &mut self,
        before_cidr: bool,
    ) -> Result<String, Error> {
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.domain_spec(before_cidr)
        } else {
            Ok(DEFAULT_DOMAIN_SPEC.to_owned())
        }
    }

    // domain-spec = macro-string domain-end
    // domain-end  = ( "." toplabel [ "." ] ) / macro-expand
    //
    // If `before_cidr` is set, the domain-spec stops at a `/` which begins a
    // well-formed dual-cidr-length running to the end of the term.
    fn domain_spec(&mut self, before_cidr: bool) -> Result<String, Error> {
        let start = self.pos;
        let mut ends_in_macro = false;

        loop {
            match self.peek() {
                None | Some(b' ') => break,
                Some(b'/') if before_cidr && self.dual_cidr_follows() => {
                    break
                },
                Some(b'%') => {
                    self.macro_expand()?;
                    ends_in_macro = true;
                },
                Some(b) if is_visible(b) => {
                    self.pos += 1;
                    ends_in_macro = false;
                },
                Some(_) => return self.fail(self.pos),
            }
        }

        if self.pos == start {
            return self.fail(self.pos);
        }

        let raw = &self.input[start..self.pos];
        if !ends_in_macro && !is_domain_end(raw) {
            return self.fail(self.pos - 1);
        }

        let mut domain = String::new();
        if normalize_into(&mut domain, &ascii(raw), self.limits.domain_spec)
            > self.limits.domain_spec
        {
            return Err(Error::NameTooLong);
        }

        Ok(domain)
    }

    // macro-expand = ( "%{" macro-letter transformers *delimiter "}" )
    //                / "%%" / "%_" / "%-"
    fn macro_expand(&mut self) -> Result<(), Error> {
        self.expect(b'%')?;
        match self.peek() {
            Some(b'%' | b'_' | b'-') => {
                self.pos += 1;
                Ok(())
            },

            Some(b'{') => {
                self.pos += 1;
                if !self.peek_is(is_macro_letter) {
                    return self.fail(self.pos);
                }
                self.pos += 1;

                while self.peek_is(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
                if matches!(self.peek(), Some(b'r' | b'R')) {
                    self.pos += 1;
                }
                while self.peek_is(is_delimiter) {
                    self.pos += 1;
                }

                self.expect(b'}')
            },

            _ => self.fail(self.pos),
        }
    }

    fn dual_cidr_follows(&self) -> bool {
        let rest = &self.input[self.pos..];
        let end = memchr::memchr(b' ', rest).unwrap_or(rest.len());
        is_dual_cidr(&rest[..end])
    }

    // dual-cidr-length = [ ip4-cidr-length ] [ "/" ip6-cidr-length ]
    fn dual_cidr(&mut self) -> Result<DualCidr, Error> {
        let mut cidr = DualCidr::default();

        let rest = &self.input[self.pos..];
        if rest.starts_with(b"/") && !rest.starts_with(b"//") {
            self.pos += 1;
            cidr.ip4 = self.prefix_length(32)?;
        }

        if self.input[self.pos..].starts_with(b"//") {
            self.pos += 2;
            cidr.ip6 = self.prefix_length(128)?;
        }

        Ok(cidr)
    }

    fn single_cidr(&mut self, max: u8) -> Result<u8, Error> {
        if self.peek() == Some(b'/') {
            self.pos += 1;
            self.prefix_length(max)
        } else {
            Ok(max)
        }
    }

    // ip4-cidr-length = "/" ( "0" / %x31-39 0*1DIGIT )
    // ip6-cidr-length = "/" ( "0" / %x31-39 0*2DIGIT )
    //
    // The digits are accumulated one at a time, failing on the first one
    // which would take the value out of range.
    fn prefix_length(&mut self, max: u8) -> Result<u8, Error> {
        let start = self.pos;
        let mut value = 0u8;

        while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
            if self.pos != start && 0 == value {
                // Leading zero
                return self.fail(self.pos);
            }

            let digit = b - b'0';
            match value.checked_mul(10).and_then(|v| v.checked_add(digit)) {
                Some(v) if v <= max => value = v,
                _ => return self.fail(self.pos),
            }
            self.pos += 1;
        }

        if self.pos == start {
            return self.fail(self.pos);
        }

        Ok(value)
    }

    fn ip_literal<A: FromStr>(
        &mut self,
        valid: impl Fn(u8) -> bool,
    ) -> Result<A, Error> {
        let start = self.pos;
        while !self.at_term_end() && self.peek() != Some(b'/') {
            if !self.peek_is(&valid) {
                return self.fail(self.pos);
            }
            self.pos += 1;
        }

        match ascii(&self.input[start..self.pos]).parse::<A>() {
            Ok(addr) => Ok(addr),
            Err(_) => self.fail(start),
        }
    }
}

/// Converts bytes the grammar has already restricted to ASCII.
fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// macro-literal, plus "%" which is handled separately
fn is_visible(b: u8) -> bool {
    (0x21..=0x7E).contains(&b)
}

fn is_macro_letter(b: u8) -> bool {
    matches!(
        b.to_ascii_lowercase(),
        b's' | b'l' | b'o' | b'd' | b'i' | b'p' | b'h' | b'c' | b'r' | b't'
            | b'v'
    )
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'.' | b'-' | b'+' | b',' | b'/' | b'_' | b'=')
}

fn is_dual_cidr(s: &[u8]) -> bool {
    fn digits(s: &[u8]) -> bool {
        !s.is_empty() && s.iter().all(u8::is_ascii_digit)
    }

    let (ip4, ip6) = match s.windows(2).position(|w| w == b"//") {
        Some(ix) => (&s[..ix], Some(&s[ix + 2..])),
        None => (s, None),
    };

    let ip4_ok = match ip4.split_first() {
        None => ip6.is_some(),
        Some((&b'/', tail)) => digits(tail),
        Some(_) => false,
    };

    ip4_ok && ip6.map_or(true, digits)
}

// Checks the literal tail of a domain-spec:
//   "." toplabel [ "." ]
//   toplabel = ( *alphanum ALPHA *alphanum )
//            / ( 1*alphanum "-" *( alphanum / "-" ) alphanum )
fn is_domain_end(s: &[u8]) -> bool {
    let s = s.strip_suffix(b".").unwrap_or(s);
    let Some(dot) = s.iter().rposition(|&b| b'.' == b) else {
        return false;
    };

    let label = &s[dot + 1..];
    let (Some(&first), Some(&last)) = (label.first(), label.last()) else {
        return false;
    };

    if !label.iter().all(|&b| b.is_ascii_alphanumeric() || b'-' == b) {
        return false;
    }

    if label.contains(&b'-') {
        first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
    } else {
        label.iter().any(u8::is_ascii_alphabetic)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn terms(s: &str) -> Vec<Term> {
        parse("example.com", s.as_bytes()).unwrap().terms().to_vec()
    }

    fn term(s: &str) -> Term {
        let mut terms = terms(&format!("v=spf1 {}", s));
        assert_eq!(1, terms.len(), "wrong term count for {:?}", s);
        terms.pop().unwrap()
    }

    fn syntax_error(s: &str) -> SyntaxError {
        match parse("example.com", s.as_bytes()) {
            Err(Error::Syntax(e)) => e,
            r => panic!("unexpected result for {:?}: {:?}", s, r),
        }
    }

    fn directive(qualifier: Qualifier, mechanism: Mechanism) -> Term {
        Term::Directive(Directive {
            qualifier,
            mechanism,
        })
    }

    fn ds(s: &str) -> String {
        s.to_owned()
    }

    fn dd() -> String {
        DEFAULT_DOMAIN_SPEC.to_owned()
    }

    fn cidr(ip4: u8, ip6: u8) -> DualCidr {
        DualCidr { ip4, ip6 }
    }

    #[test]
    fn empty_records() {
        assert_eq!(Vec::<Term>::new(), terms("v=spf1"));
        assert_eq!(Vec::<Term>::new(), terms("V=SPF1"));
        assert_eq!(Vec::<Term>::new(), terms("v=spf1   "));
    }

    #[test]
    fn parse_modifiers() {
        use super::Modifier as Mo;

        assert_eq!(
            Term::Modifier(Mo::Unknown {
                name: ds("foo"),
                value: ds("bar"),
            }),
            term("foo=bar"),
        );
        assert_eq!(
            Term::Modifier(Mo::Unknown {
                name: ds("X-Thing.v2"),
                value: ds(""),
            }),
            term("X-Thing.v2="),
        );
        assert_eq!(
            Term::Modifier(Mo::Unknown {
                name: ds("moo"),
                value: ds("%{x}/{{}}"),
            }),
            term("moo=%{x}/{{}}"),
        );
        assert_eq!(
            Term::Modifier(Mo::Redirect(ds("_spf.example.com"))),
            term("redirect=_spf.example.com"),
        );
        assert_eq!(
            Term::Modifier(Mo::Redirect(ds("_spf.example.com"))),
            term("REDIRECT=_spf.example.com"),
        );
        assert_eq!(
            Term::Modifier(Mo::Explanation(ds("explain.%{d}"))),
            term("exp=explain.%{d}"),
        );
        assert_eq!(
            Term::Modifier(Mo::Explanation(ds("%{d}"))),
            term("Exp=%{d}"),
        );
    }

    #[test]
    fn parse_qualifiers() {
        use super::{Mechanism as Me, Qualifier as Q};

        assert_eq!(directive(Q::Pass, Me::All), term("all"));
        assert_eq!(directive(Q::Pass, Me::All), term("+all"));
        assert_eq!(directive(Q::Fail, Me::All), term("-aLl"));
        assert_eq!(directive(Q::SoftFail, Me::All), term("~all"));
        assert_eq!(directive(Q::Neutral, Me::All), term("?ALL"));
    }

    #[test]
    fn parse_domain_mechanisms() {
        use super::{Mechanism as Me, Qualifier as Q};

        assert_eq!(
            directive(Q::Pass, Me::Include(ds("_spf.example.com"))),
            term("include:_spf.example.com"),
        );
        assert_eq!(
            directive(Q::Fail, Me::Include(ds("Foo.Example.COM."))),
            term("-INCLUDE:Foo.Example.COM."),
        );
        assert_eq!(directive(Q::Pass, Me::Ptr(dd())), term("ptr"));
        assert_eq!(
            directive(Q::Fail, Me::Ptr(ds("example.org"))),
            term("-ptr:example.org"),
        );
        assert_eq!(
            directive(Q::Pass, Me::Exists(ds("%{ir}.%{l1r+-}._spf.%{d}"))),
            term("exists:%{ir}.%{l1r+-}._spf.%{d}"),
        );
        assert_eq!(
            directive(Q::Pass, Me::Exists(ds("%%%_%-.example.com"))),
            term("exists:%%%_%-.example.com"),
        );
        assert_eq!(
            directive(Q::Pass, Me::Exists(ds("foo-bar.x-1"))),
            term("exists:foo-bar.x-1"),
        );
    }

    #[test]
    fn parse_a_and_mx() {
        use super::{Mechanism as Me, Qualifier as Q};

        assert_eq!(directive(Q::Pass, Me::A(dd(), cidr(32, 128))), term("a"));
        assert_eq!(
            directive(Q::Pass, Me::A(dd(), cidr(24, 128))),
            term("a/24"),
        );
        assert_eq!(
            directive(Q::Pass, Me::A(dd(), cidr(32, 64))),
            term("A//64"),
        );
        assert_eq!(
            directive(Q::Pass, Me::A(dd(), cidr(0, 0))),
            term("a/0//0"),
        );
        assert_eq!(
            directive(Q::Fail, Me::A(ds("foo.example"), cidr(32, 128))),
            term("-a:foo.example"),
        );
        assert_eq!(
            directive(Q::Pass, Me::A(ds("foo.example"), cidr(16, 48))),
            term("a:foo.example/16//48"),
        );
        assert_eq!(
            directive(Q::Pass, Me::A(ds("%{d}"), cidr(8, 128))),
            term("a:%{d}/8"),
        );
        assert_eq!(
            directive(Q::Pass, Me::A(ds("%{d2/}"), cidr(32, 128))),
            term("a:%{d2/}"),
        );

        assert_eq!(directive(Q::Pass, Me::Mx(dd(), cidr(32, 128))), term("mx"));
        assert_eq!(
            directive(Q::SoftFail, Me::Mx(ds("mail.example"), cidr(30, 128))),
            term("~MX:mail.example/30"),
        );
        assert_eq!(
            directive(Q::Pass, Me::Mx(dd(), cidr(32, 128))),
            term("mx/32//128"),
        );
    }

    #[test]
    fn parse_ip_mechanisms() {
        use super::{Mechanism as Me, Qualifier as Q};

        let ipv4_addr = Ipv4Addr::new(192, 168, 10, 199);
        assert_eq!(
            directive(Q::Pass, Me::Ip4(ipv4_addr, 32)),
            term("ip4:192.168.10.199"),
        );
        assert_eq!(
            directive(Q::Pass, Me::Ip4(ipv4_addr, 8)),
            term("IP4:192.168.10.199/8"),
        );

        let ipv6_addr = Ipv6Addr::new(0xDEAD, 0, 0, 0, 0, 0, 0xC0DE, 0xBEEF);
        assert_eq!(
            directive(Q::Pass, Me::Ip6(ipv6_addr, 128)),
            term("ip6:dead::c0de:beef"),
        );
        assert_eq!(
            directive(Q::Neutral, Me::Ip6(ipv6_addr, 64)),
            term("?IP6:DEAD::C0DE:BEEF/64"),
        );
        assert_eq!(
            directive(
                Q::Pass,
                Me::Ip6("::ffff:192.0.2.1".parse().unwrap(), 128),
            ),
            term("ip6:::ffff:192.0.2.1"),
        );
    }

    #[test]
    fn parse_full_record() {
        use super::{Mechanism as Me, Modifier as Mo, Qualifier as Q};

        let record = parse(
            "..Example..COM",
            b"v=spf1  mx a:..mail..example.com/28 \
              include:_spf.example.net ip4:198.51.100.0/24 \
              redirect=_spf.example.org exp=why.%{d} ~all  ",
        )
        .unwrap();

        assert_eq!("Example.COM", record.name());
        assert_eq!(RecordType::Txt, record.record_type());
        assert_eq!(None, record.error());
        assert_eq!(
            vec![
                directive(Q::Pass, Me::Mx(dd(), cidr(32, 128))),
                directive(
                    Q::Pass,
                    Me::A(ds("mail.example.com"), cidr(28, 128)),
                ),
                directive(Q::Pass, Me::Include(ds("_spf.example.net"))),
                directive(
                    Q::Pass,
                    Me::Ip4(Ipv4Addr::new(198, 51, 100, 0), 24),
                ),
                Term::Modifier(Mo::Redirect(ds("_spf.example.org"))),
                Term::Modifier(Mo::Explanation(ds("why.%{d}"))),
                directive(Q::SoftFail, Me::All),
            ],
            record.terms(),
        );

        assert_eq!(5, record.directives().count());
        assert_eq!(Some("_spf.example.org"), record.redirect());
        assert_eq!(Some("why.%{d}"), record.explanation());
        assert_eq!(
            "v=spf1 +mx:%{d}/32//128 +a:mail.example.com/28//128 \
             +include:_spf.example.net +ip4:198.51.100.0/24 \
             redirect=_spf.example.org exp=why.%{d} ~all",
            record.to_string(),
        );
    }

    #[test]
    fn syntax_errors() {
        let e = syntax_error("v=spf10");
        assert_eq!(6, e.offset);
        assert_eq!(Some(b'0'), e.byte);
        assert_eq!(b"v=spf10".to_vec(), e.context);

        let e = syntax_error("v=spf");
        assert_eq!(5, e.offset);
        assert_eq!(None, e.byte);

        let e = syntax_error("spf1 all");
        assert_eq!(0, e.offset);
        assert_eq!(b"s".to_vec(), e.context);

        let e = syntax_error("v=spf1 all:foo.com");
        assert_eq!((10, Some(b':')), (e.offset, e.byte));
        assert_eq!(b"v=spf1 all:".to_vec(), e.context);

        let e = syntax_error("v=spf1 include");
        assert_eq!((14, None), (e.offset, e.byte));

        let e = syntax_error("v=spf1 -all ip4:10.0.0.1/33");
        assert_eq!((26, Some(b'3')), (e.offset, e.byte));
        assert_eq!(b"l ip4:10.0.0.1/33".to_vec(), e.context);

        let e = syntax_error("v=spf1 a:foo.example/024");
        assert_eq!((22, Some(b'2')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 mx:%{d}/24//129");
        assert_eq!((21, Some(b'9')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 ip4:192.168.10.1999");
        assert_eq!((11, Some(b'1')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 ip6:plugh");
        assert_eq!((11, Some(b'p')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 include:%{x}.example.com");
        assert_eq!((17, Some(b'x')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 exists:%{d");
        assert_eq!((17, None), (e.offset, e.byte));

        let e = syntax_error("v=spf1 a:foo");
        assert_eq!((11, Some(b'o')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 exists:1.2.3.4");
        assert_eq!((20, Some(b'4')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 ptr:example.com\tall");
        assert_eq!((22, Some(b'\t')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 exists:foo%.example.com");
        assert_eq!((18, Some(b'.')), (e.offset, e.byte));

        let e = syntax_error("v=spf1 -=foo");
        assert_eq!((8, Some(b'=')), (e.offset, e.byte));
    }

    #[test]
    fn error_keeps_earlier_terms() {
        let mut record = Record::new("example.com", RecordType::Txt).unwrap();
        assert_matches!(
            Err(Error::Syntax(_)),
            record.parse(b"v=spf1 mx include:a.example frob:b.example -all"),
        );

        assert_eq!(2, record.terms().len());
        assert_eq!(TermKind::Mx, record.terms()[0].kind());
        assert_eq!(TermKind::Include, record.terms()[1].kind());

        let e = record.error().unwrap();
        assert_eq!((28, Some(b'f')), (e.offset, e.byte));
        assert_eq!(b"clude:a.example f".to_vec(), e.context);
    }

    #[test]
    fn failed_record_is_frozen() {
        let mut record = Record::new("example.com", RecordType::Txt).unwrap();
        assert_matches!(
            Err(Error::Syntax(_)),
            record.parse(b"v=spf1 mx !"),
        );
        assert_eq!(1, record.terms().len());
        let first = record.error().cloned().unwrap();
        assert_eq!((10, Some(b'!')), (first.offset, first.byte));

        match record.parse(b"v=spf1 -all") {
            Err(Error::Syntax(e)) => assert_eq!(first, e),
            r => panic!("unexpected result: {:?}", r),
        }
        assert_eq!(1, record.terms().len());
        assert_eq!(TermKind::Mx, record.terms()[0].kind());
        assert_eq!(Some(&first), record.error());
    }

    #[test]
    fn unknown_modifier_values_are_visible_ascii() {
        let e = syntax_error("v=spf1 foo=\u{e9}");
        assert_eq!((11, Some(0xC3)), (e.offset, e.byte));

        let e = syntax_error("v=spf1 foo=a\x7fb");
        assert_eq!((12, Some(0x7F)), (e.offset, e.byte));

        assert_eq!(
            Term::Modifier(Modifier::Unknown {
                name: ds("foo"),
                value: ds("!~{}"),
            }),
            term("foo=!~{}"),
        );
    }

    #[test]
    fn names_too_long() {
        let long_name = "a.".repeat(200);
        assert_matches!(
            Err(Error::NameTooLong),
            Record::new(&long_name, RecordType::Txt),
        );

        // Dots which normalisation removes do not count.
        let dotty_name = format!("{}example.com", ".".repeat(300));
        assert_eq!(
            "example.com",
            Record::new(&dotty_name, RecordType::Spf).unwrap().name(),
        );

        let record = format!("v=spf1 include:{}com", "a.".repeat(200));
        assert_matches!(
            Err(Error::NameTooLong),
            parse("example.com", record.as_bytes()),
        );
    }

    #[test]
    fn limits_from_config() {
        let mut config = Config::default();
        config.limits.domain_spec = 16;
        config.limits.error_context = 2;

        let mut record =
            Record::with_config("example.com", RecordType::Txt, &config)
                .unwrap();
        assert_matches!(
            Err(Error::NameTooLong),
            record.parse(b"v=spf1 a:smtp.mail.example.com"),
        );

        let mut record =
            Record::with_config("example.com", RecordType::Txt, &config)
                .unwrap();
        assert_matches!(Err(Error::Syntax(_)), record.parse(b"v=spf1 #"));
        assert_eq!(b"1 #".to_vec(), record.error().unwrap().context);
    }

    #[test]
    fn spf_record_detection() {
        assert!(is_spf_record(b"v=spf1"));
        assert!(is_spf_record(b"V=SPF1 -all"));
        assert!(!is_spf_record(b"v=spf10"));
        assert!(!is_spf_record(b"v=spf"));
        assert!(!is_spf_record(b"google-site-verification=abc"));
    }

    #[test]
    fn record_type_codes() {
        assert_eq!(16, RecordType::Txt.code());
        assert_eq!(99, RecordType::Spf.code());
    }

    #[test]
    fn trace_logging() {
        crate::init_test_log();

        let config = Config {
            trace: true,
            ..Config::default()
        };
        let mut record =
            Record::with_config("example.com", RecordType::Txt, &config)
                .unwrap();
        record.parse(b"v=spf1 mx -all").unwrap();
        assert_eq!(2, record.terms().len());
        assert_matches!(Err(Error::Syntax(_)), record.parse(b"v=spf1 !"));
        assert_eq!(2, record.terms().len());
    }

    fn qualifier_strategy() -> impl Strategy<Value = Qualifier> {
        prop_oneof![
            Just(Qualifier::Pass),
            Just(Qualifier::Fail),
            Just(Qualifier::SoftFail),
            Just(Qualifier::Neutral),
        ]
    }

    fn domain_spec_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(DEFAULT_DOMAIN_SPEC.to_owned()),
            "[a-z0-9_]{1,8}(\\.[a-z0-9-]{1,8}){0,3}\\.[a-z]{2,6}\\.?",
            "%\\{[slodiphcrtvSLODIPHCRTV][0-9]{0,2}r?[-+,/_=]?\\}(\\.[a-z]{1,8}){0,2}",
        ]
    }

    fn mechanism_strategy() -> impl Strategy<Value = Mechanism> {
        prop_oneof![
            Just(Mechanism::All),
            domain_spec_strategy().prop_map(Mechanism::Include),
            (domain_spec_strategy(), 0u8..=32, 0u8..=128)
                .prop_map(|(d, ip4, ip6)| Mechanism::A(d, cidr(ip4, ip6))),
            (domain_spec_strategy(), 0u8..=32, 0u8..=128)
                .prop_map(|(d, ip4, ip6)| Mechanism::Mx(d, cidr(ip4, ip6))),
            domain_spec_strategy().prop_map(Mechanism::Ptr),
            (any::<u32>(), 0u8..=32)
                .prop_map(|(a, len)| Mechanism::Ip4(Ipv4Addr::from(a), len)),
            (any::<u128>(), 0u8..=128)
                .prop_map(|(a, len)| Mechanism::Ip6(Ipv6Addr::from(a), len)),
            domain_spec_strategy().prop_map(Mechanism::Exists),
        ]
    }

    fn modifier_strategy() -> impl Strategy<Value = Modifier> {
        prop_oneof![
            domain_spec_strategy().prop_map(Modifier::Redirect),
            domain_spec_strategy().prop_map(Modifier::Explanation),
            ("[a-zA-Z][a-zA-Z0-9_.-]{0,8}", "[!-~]{0,12}")
                .prop_filter("known modifier", |(name, _)| {
                    !name.eq_ignore_ascii_case("redirect")
                        && !name.eq_ignore_ascii_case("exp")
                })
                .prop_map(|(name, value)| Modifier::Unknown { name, value }),
        ]
    }

    fn term_strategy() -> impl Strategy<Value = Term> {
        prop_oneof![
            (qualifier_strategy(), mechanism_strategy()).prop_map(
                |(qualifier, mechanism)| directive(qualifier, mechanism)
            ),
            modifier_strategy().prop_map(Term::Modifier),
        ]
    }

    proptest! {
        #[test]
        fn canonical_form_round_trips(
            original in prop::collection::vec(term_strategy(), 0..6),
        ) {
            let text = original
                .iter()
                .fold("v=spf1".to_owned(), |s, t| format!("{} {}", s, t));
            let reparsed = parse("example.com", text.as_bytes()).unwrap();
            prop_assert_eq!(&original[..], reparsed.terms());
            prop_assert_eq!(text, reparsed.to_string());
        }

        #[test]
        fn arbitrary_bytes_never_panic(
            tail in prop::collection::vec(any::<u8>(), 0..48),
        ) {
            check_arbitrary(&tail)?;
        }

        #[test]
        fn term_like_input_never_panics(
            tail in "[ a-z0-9:./%{}=+~?_-]{0,48}",
        ) {
            check_arbitrary(tail.as_bytes())?;
        }
    }

    fn check_arbitrary(tail: &[u8]) -> Result<(), TestCaseError> {
        let mut input = b"v=spf1 ".to_vec();
        input.extend_from_slice(tail);

        let mut record = Record::new("example.com", RecordType::Txt).unwrap();
        match record.parse(&input) {
            Ok(()) => prop_assert!(record.error().is_none()),
            Err(Error::Syntax(e)) => {
                prop_assert!(e.offset <= input.len());
                prop_assert!(e.context.len() <= 17);
                let end = (e.offset + 1).min(input.len());
                prop_assert!(input[..end].ends_with(&e.context));
                prop_assert_eq!(e.byte, input.get(e.offset).copied());
                prop_assert_eq!(Some(&e), record.error());
            },
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }

        Ok(())
    }
}
