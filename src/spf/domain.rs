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

//! Domain name clean-up applied to query names and captured domain-specs.

use crate::support::bounded::push_truncating;

/// Writes `src` into `dst` with leading dots removed and runs of dots
/// collapsed into one, keeping at most `cap` bytes.
///
/// Returns the length of the full normalised name, which exceeds `cap` if and
/// only if the output was truncated.
pub fn normalize_into(dst: &mut String, src: &str, cap: usize) -> usize {
    dst.clear();

    let mut len = 0;
    let mut rest = src.trim_start_matches('.');
    while !rest.is_empty() {
        let (label, tail) = match rest.find('.') {
            Some(dot) => {
                (&rest[..=dot], rest[dot + 1..].trim_start_matches('.'))
            },
            None => (rest, ""),
        };

        // Once anything has been cut off, later labels must not be appended
        // after the gap.
        if dst.len() == len {
            push_truncating(dst, label, cap);
        }
        len += label.len();
        rest = tail;
    }

    len
}

/// Unbounded convenience form of `normalize_into`.
pub fn normalize(src: &str) -> String {
    let mut dst = String::with_capacity(src.len());
    normalize_into(&mut dst, src, usize::MAX);
    dst
}
