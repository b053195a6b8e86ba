// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serialization of opcode records. */

use {
    crate::serialization::{InstallDirectoryFlags, Opcode, SIGNATURE},
    anyhow::{anyhow, Context, Result},
    byteorder::{LittleEndian, WriteBytesExt},
    std::io::Write,
};

/// Writes opcode records to a destination.
///
/// Each method appends exactly one record. No validation of record ordering
/// is performed: that is the responsibility of higher level builders.
pub struct OpcodeWriter<W: Write> {
    dest: W,
    records_written: usize,
}

impl<W: Write> OpcodeWriter<W> {
    pub fn new(dest: W) -> Self {
        Self {
            dest,
            records_written: 0,
        }
    }

    /// The number of records written so far.
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Obtain the underlying writer.
    pub fn into_inner(self) -> W {
        self.dest
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.dest.flush().context("flushing opcode stream")
    }

    fn write_opcode(&mut self, opcode: Opcode) -> Result<()> {
        self.records_written += 1;
        self.dest
            .write_u32::<LittleEndian>(opcode.into())
            .with_context(|| format!("writing {:?} opcode", opcode))
    }

    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.dest
            .write_u32::<LittleEndian>(value)
            .context("writing u32 field")
    }

    fn write_length(&mut self, length: usize) -> Result<()> {
        let length = u32::try_from(length)
            .map_err(|_| anyhow!("payload of {} bytes exceeds 4 GiB record limit", length))?;

        self.write_u32(length)
    }

    /// Write a NUL terminated string.
    fn write_string(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(anyhow!("string field contains NUL byte: {:?}", value));
        }

        self.dest
            .write_all(value.as_bytes())
            .context("writing string field")?;
        self.dest.write_u8(0).context("writing string terminator")
    }

    /// Write the record terminating an opcode stream.
    pub fn write_end(&mut self) -> Result<()> {
        self.write_opcode(Opcode::End)
    }

    pub fn write_create_directory(&mut self, path: &str) -> Result<()> {
        self.write_opcode(Opcode::CreateDirectory)?;
        self.write_string(path)
    }

    pub fn write_create_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.write_opcode(Opcode::CreateFile)?;
        self.write_string(path)?;
        self.write_length(data.len())?;
        self.dest.write_all(data).context("writing file data")
    }

    /// Launch a process immediately and wait for it.
    pub fn write_create_process(&mut self, image: &str, command_line: &str) -> Result<()> {
        self.write_opcode(Opcode::CreateProcess)?;
        self.write_string(image)?;
        self.write_string(command_line)
    }

    /// Launch a process once every other record has been materialized.
    pub fn write_post_create_process(&mut self, image: &str, command_line: &str) -> Result<()> {
        self.write_opcode(Opcode::PostCreateProcess)?;
        self.write_string(image)?;
        self.write_string(command_line)
    }

    pub fn write_set_env(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_opcode(Opcode::SetEnv)?;
        self.write_string(name)?;
        self.write_string(value)
    }

    pub fn write_enable_debug_mode(&mut self) -> Result<()> {
        self.write_opcode(Opcode::EnableDebugMode)
    }

    pub fn write_create_install_directory(&mut self, flags: &InstallDirectoryFlags) -> Result<()> {
        self.write_opcode(Opcode::CreateInstallDirectory)?;
        self.write_u32(flags.beside_executable as u32)?;
        self.write_u32(flags.delete_after_run as u32)?;
        self.write_u32(flags.chdir_first as u32)
    }

    /// Write a block of LZMA compressed records.
    ///
    /// `compressed` must be a complete LZMA-alone stream, as produced by
    /// [crate::compress_lzma].
    pub fn write_decompress_lzma(&mut self, compressed: &[u8]) -> Result<()> {
        self.write_opcode(Opcode::DecompressLzma)?;
        self.write_length(compressed.len())?;
        self.dest
            .write_all(compressed)
            .context("writing compressed opcode block")
    }

    /// Write the trailer terminating a container.
    ///
    /// `opcode_offset` is the absolute offset of the first opcode, which is
    /// the length of the stub image preceding it.
    pub fn write_trailer(&mut self, opcode_offset: u64) -> Result<()> {
        let offset = u32::try_from(opcode_offset)
            .map_err(|_| anyhow!("opcode offset {} does not fit in 32 bits", opcode_offset))?;

        self.write_end()?;
        self.write_u32(offset)?;
        self.dest
            .write_all(&SIGNATURE)
            .context("writing container signature")
    }
}
