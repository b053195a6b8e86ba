// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Packaging of Ruby applications as self-extracting executables.

Aibika runs an application's main script under Ruby to discover what it
loads, decides where every file lands in the extraction directory and
writes a stub executable followed by an opcode stream that recreates the
application at launch.

This library exposes that functionality to other tools.
*/

pub mod builder;
pub mod cli;
pub mod environment;
pub mod inno;
pub mod library_detector;
pub mod logging;
pub mod options;
pub mod project_building;
pub mod ruby_probe;
pub mod stubs;

#[cfg(test)]
mod testutil;
