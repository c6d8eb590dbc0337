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

//! Bounded string copies which report the length they would have had.
//!
//! Every buffer in this crate that holds untrusted DNS data has a fixed
//! capacity. Rather than failing outright, the copy saturates at the capacity
//! and returns the untruncated length, leaving it to the caller to decide
//! whether truncation is an error.

/// Replaces the content of `dst` with at most `cap` bytes of `src`.
///
/// Returns `src.len()`. Truncation never splits a UTF-8 sequence, so `dst`
/// may end up a few bytes shorter than `cap`.
pub fn copy_truncating(dst: &mut String, src: &str, cap: usize) -> usize {
    dst.clear();
    push_truncating(dst, src, cap)
}

/// Appends `src` to `dst` without letting `dst` grow beyond `cap` bytes.
///
/// Returns the length `dst` would have if the append had not been bounded.
pub fn push_truncating(dst: &mut String, src: &str, cap: usize) -> usize {
    let would_be = dst.len() + src.len();
    let room = cap.saturating_sub(dst.len());
    dst.push_str(&src[..floor_char_boundary(src, room)]);
    would_be
}

fn floor_char_boundary(s: &str, mut ix: usize) -> usize {
    if ix >= s.len() {
        return s.len();
    }

    while !s.is_char_boundary(ix) {
        ix -= 1;
    }

    ix
}
