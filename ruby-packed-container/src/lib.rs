// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Aibika Packed Container

This crate defines and implements the data format appended to Aibika stub
executables. We call this data format the *opcode container*.

A producer copies a stub image, then appends a stream of opcode records
(create a directory, create a file, set an environment variable, launch a
process, ...) followed by a fixed trailer. At run time, the stub reads the
last 8 bytes of its own image to find the signature and the offset of the
first record, then replays the records to materialize a Ruby installation
and launch the application.

The record stream following the install directory instruction may be
compressed as a single LZMA block.

All integers are little-endian `u32`. Strings are NUL terminated.
*/

mod compression;
mod parser;
mod serialization;
mod writer;

pub use crate::{
    compression::{compress_lzma, decompress_lzma, lzma_uncompressed_size, DEFAULT_LZMA_PRESET},
    parser::{find_opcode_offset, parse_container, Instruction, ParsedContainer},
    serialization::{InstallDirectoryFlags, Opcode, FOOTER_LENGTH, LZMA_HEADER_LENGTH, SIGNATURE},
    writer::OpcodeWriter,
};
