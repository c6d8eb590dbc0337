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

//! The values available to macro expansion during one SPF check.

use std::net::IpAddr;

use chrono::prelude::*;
use log::debug;

use crate::support::bounded::copy_truncating;
use crate::support::hostname::local_host_name;

/// A macro letter and the value it stands for.
///
/// RFC 7208 § 7.2
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Sender,
    SenderLocalPart,
    SenderDomain,
    Domain,
    Ip,
    Ptr,
    IpVersion,
    HeloDomain,
    SmtpClientIp,
    ReceivingHost,
    CurrentTimestamp,
}

impl Field {
    pub const ALL: [Self; 11] = [
        Self::Sender,
        Self::SenderLocalPart,
        Self::SenderDomain,
        Self::Domain,
        Self::Ip,
        Self::Ptr,
        Self::IpVersion,
        Self::HeloDomain,
        Self::SmtpClientIp,
        Self::ReceivingHost,
        Self::CurrentTimestamp,
    ];

    /// Looks up the field named by a macro letter, ignoring case.
    pub fn from_letter(letter: u8) -> Option<Self> {
        Some(match letter.to_ascii_lowercase() {
            b's' => Self::Sender,
            b'l' => Self::SenderLocalPart,
            b'o' => Self::SenderDomain,
            b'd' => Self::Domain,
            b'i' => Self::Ip,
            b'p' => Self::Ptr,
            b'v' => Self::IpVersion,
            b'h' => Self::HeloDomain,
            b'c' => Self::SmtpClientIp,
            b'r' => Self::ReceivingHost,
            b't' => Self::CurrentTimestamp,
            _ => return None,
        })
    }

    pub fn letter(self) -> char {
        match self {
            Self::Sender => 's',
            Self::SenderLocalPart => 'l',
            Self::SenderDomain => 'o',
            Self::Domain => 'd',
            Self::Ip => 'i',
            Self::Ptr => 'p',
            Self::IpVersion => 'v',
            Self::HeloDomain => 'h',
            Self::SmtpClientIp => 'c',
            Self::ReceivingHost => 'r',
            Self::CurrentTimestamp => 't',
        }
    }

    /// The maximum number of bytes the field holds.
    pub fn capacity(self) -> usize {
        match self {
            // local-part@domain
            Self::Sender => 64 + 1 + 255,
            Self::SenderLocalPart => 64,
            Self::SenderDomain
            | Self::Domain
            | Self::Ptr
            | Self::HeloDomain
            | Self::ReceivingHost => 255,
            // 32 dot-separated nybbles for IPv6
            Self::Ip => 72,
            Self::IpVersion => 8,
            Self::SmtpClientIp => 46,
            Self::CurrentTimestamp => 21,
        }
    }

    /// Whether RFC 7208 restricts the macro to `exp` text.
    pub fn is_exp_only(self) -> bool {
        matches!(
            self,
            Self::SmtpClientIp | Self::ReceivingHost | Self::CurrentTimestamp
        )
    }
}

/// The named values which macros expand to.
///
/// An `Environment` is built once per SPF check and is not modified while
/// macros are being expanded. Every value is bounded by its field's capacity;
/// longer values are truncated on entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    values: [String; 11],
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an environment with every field empty.
    pub fn empty() -> Self {
        Self {
            values: Default::default(),
        }
    }

    /// Creates an environment with the receiving host set to the local host
    /// name (if it can be determined) and the timestamp set to the current
    /// time. The caller sets everything else.
    pub fn new() -> Self {
        let mut env = Self::empty();
        if let Some(host_name) = local_host_name() {
            env.set_field(Field::ReceivingHost, &host_name);
        }
        env.set_timestamp(Utc::now());
        env
    }

    /// Creates a default environment populated for the given `MAIL FROM`
    /// address, `HELO` domain, and client address.
    ///
    /// The domain being checked starts out as the sender domain. A missing or
    /// empty local part becomes `postmaster`, and an empty sender uses the
    /// `HELO` domain (RFC 7208 § 2.4).
    pub fn for_sender(sender: &str, helo: &str, ip: IpAddr) -> Self {
        let (local, domain) = match sender.rsplit_once('@') {
            Some((local, domain)) => (local, domain),
            None if sender.is_empty() => ("", helo),
            None => ("", sender),
        };
        let local = if local.is_empty() { "postmaster" } else { local };

        let mut env = Self::new();
        env.set_field(Field::Sender, &format!("{}@{}", local, domain));
        env.set_field(Field::SenderLocalPart, local);
        env.set_field(Field::SenderDomain, domain);
        env.set_field(Field::Domain, domain);
        env.set_field(Field::HeloDomain, helo);
        env.set_ip(ip);
        env
    }

    /// Returns the value of the field named by `letter` and that field's
    /// capacity, or `None` if `letter` is not a macro letter.
    pub fn get(&self, letter: u8) -> Option<(&str, usize)> {
        Field::from_letter(letter).map(|f| (self.field(f), f.capacity()))
    }

    /// Sets the field named by `letter`, truncating to its capacity.
    ///
    /// Returns the untruncated length. An unknown letter is ignored and the
    /// length of `value` is still returned.
    pub fn set(&mut self, letter: u8, value: &str) -> usize {
        match Field::from_letter(letter) {
            Some(field) => self.set_field(field, value),
            None => {
                debug!(
                    "Ignoring value for unknown macro letter {:?}",
                    char::from(letter),
                );
                value.len()
            },
        }
    }

    pub fn field(&self, field: Field) -> &str {
        &self.values[field as usize]
    }

    pub fn set_field(&mut self, field: Field, value: &str) -> usize {
        copy_truncating(
            &mut self.values[field as usize],
            value,
            field.capacity(),
        )
    }

    /// Sets `i`, `c`, and `v` from the client address.
    ///
    /// This should not be an IPv6-encapsulated IPv4 address. Such addresses
    /// should be converted to IPv4 first.
    pub fn set_ip(&mut self, ip: IpAddr) {
        match ip {
            IpAddr::V4(ip) => {
                self.set_field(Field::Ip, &ip.to_string());
                self.set_field(Field::IpVersion, "in-addr");
            },
            IpAddr::V6(ip) => {
                // RFC 7208 § 7.3 requires the dotted-nybble format here.
                let mut s = String::with_capacity(63);
                for (i, octet) in ip.octets().iter().enumerate() {
                    if 0 != i {
                        s.push('.');
                    }
                    s.push_str(&format!("{:x}.{:x}", octet >> 4, octet & 0xF));
                }
                self.set_field(Field::Ip, &s);
                self.set_field(Field::IpVersion, "ip6");
            },
        }

        self.set_field(Field::SmtpClientIp, &ip.to_string());
    }

    pub fn set_timestamp(&mut self, now: DateTime<Utc>) {
        self.set_field(Field::CurrentTimestamp, &now.timestamp().to_string());
    }
}
