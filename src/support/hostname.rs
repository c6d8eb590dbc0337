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

use log::debug;

/// Returns the local host name, or `None` if it cannot be determined or is
/// not UTF-8.
pub fn local_host_name() -> Option<String> {
    let mut buf = [0u8; 256];
    match nix::unistd::gethostname(&mut buf) {
        Ok(name) => match name.to_str() {
            Ok(name) => Some(name.to_owned()),
            Err(_) => {
                debug!("System host name is not UTF-8");
                None
            },
        },
        Err(e) => {
            debug!("Failed to determine host name: {}", e);
            None
        },
    }
}
