// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Ruby Packaging Implemented in Rust

This crate exposes functionality for attributing the files a Ruby
application loaded to their origin (application sources, the Ruby
installation or installed gems) and for deciding where each file lives
inside a packaged application.
*/

pub mod filesystem_scanning;
pub mod gem;
pub mod gem_resolver;
pub mod host;
pub mod layout;
pub mod load_path;
pub mod pathname;
pub mod policy;

#[cfg(test)]
mod testutil;
