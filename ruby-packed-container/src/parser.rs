// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parsing of containers back into instructions. */

use {
    crate::{
        compression::decompress_lzma,
        serialization::{InstallDirectoryFlags, Opcode, FOOTER_LENGTH, SIGNATURE},
    },
    anyhow::{anyhow, Context, Result},
    byteorder::{LittleEndian, ReadBytesExt},
    std::{collections::BTreeMap, io::Cursor},
};

/// A decoded opcode record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    CreateDirectory {
        path: String,
    },
    CreateFile {
        path: String,
        data: Vec<u8>,
    },
    CreateProcess {
        image: String,
        command_line: String,
    },
    /// Start of an LZMA block. The instructions decoded from the block follow.
    DecompressLzma {
        compressed_size: u32,
    },
    SetEnv {
        name: String,
        value: String,
    },
    PostCreateProcess {
        image: String,
        command_line: String,
    },
    EnableDebugMode,
    CreateInstallDirectory(InstallDirectoryFlags),
}

/// A container parsed from its trailer onwards.
#[derive(Clone, Debug, Default)]
pub struct ParsedContainer {
    /// Offset of the first opcode, as advertised by the trailer.
    pub opcode_offset: usize,

    /// Every instruction in replay order.
    pub instructions: Vec<Instruction>,
}

impl ParsedContainer {
    /// Directories created by this container, in creation order.
    pub fn directories(&self) -> Vec<&str> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::CreateDirectory { path } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Files created by this container, keyed by destination path.
    pub fn files(&self) -> BTreeMap<&str, &[u8]> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::CreateFile { path, data } => Some((path.as_str(), data.as_slice())),
                _ => None,
            })
            .collect()
    }

    /// Environment variables in the order the executor applies them.
    pub fn environment(&self) -> Vec<(&str, &str)> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::SetEnv { name, value } => Some((name.as_str(), value.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Locate the start of the opcode region from the trailer.
///
/// The last 4 bytes must be the signature and the 4 bytes before them the
/// absolute offset of the first opcode.
pub fn find_opcode_offset(data: &[u8]) -> Result<usize> {
    if data.len() < FOOTER_LENGTH {
        return Err(anyhow!("data too short to contain a trailer"));
    }

    let footer = &data[data.len() - FOOTER_LENGTH..];

    if footer[4..] != SIGNATURE {
        return Err(anyhow!("bad signature; not an aibika container"));
    }

    let offset = Cursor::new(&footer[0..4])
        .read_u32::<LittleEndian>()
        .context("reading opcode offset")? as usize;

    if offset > data.len() - FOOTER_LENGTH {
        return Err(anyhow!("opcode offset {} points past the trailer", offset));
    }

    Ok(offset)
}

struct RecordReader<'a> {
    data: &'a [u8],
    reader: Cursor<&'a [u8]>,
}

impl<'a> RecordReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            reader: Cursor::new(data),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.reader.position() as usize >= self.data.len()
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.reader
            .read_u32::<LittleEndian>()
            .context("reading u32 field")
    }

    fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let start = self.reader.position() as usize;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| anyhow!("record payload of {} bytes is truncated", length))?;

        self.reader.set_position(end as u64);

        Ok(&self.data[start..end])
    }

    fn read_string(&mut self) -> Result<String> {
        let start = self.reader.position() as usize;
        let terminator = self.data[start.min(self.data.len())..]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| anyhow!("unterminated string field"))?;

        let raw = self.read_bytes(terminator)?;
        self.reader.set_position(self.reader.position() + 1);

        String::from_utf8(raw.to_vec()).context("decoding string field")
    }

    /// Read records until an end record.
    ///
    /// Decompressed blocks may also simply run out of data.
    fn read_records(&mut self, nested: bool, dest: &mut Vec<Instruction>) -> Result<()> {
        loop {
            if nested && self.is_exhausted() {
                return Ok(());
            }

            let opcode = Opcode::try_from(self.read_u32()?).map_err(|e| anyhow!(e))?;

            let instruction = match opcode {
                Opcode::End => return Ok(()),
                Opcode::CreateDirectory => Instruction::CreateDirectory {
                    path: self.read_string()?,
                },
                Opcode::CreateFile => {
                    let path = self.read_string()?;
                    let length = self.read_u32()? as usize;
                    let data = self
                        .read_bytes(length)
                        .with_context(|| format!("reading content of {}", path))?
                        .to_vec();

                    Instruction::CreateFile { path, data }
                }
                Opcode::CreateProcess => Instruction::CreateProcess {
                    image: self.read_string()?,
                    command_line: self.read_string()?,
                },
                Opcode::PostCreateProcess => Instruction::PostCreateProcess {
                    image: self.read_string()?,
                    command_line: self.read_string()?,
                },
                Opcode::SetEnv => Instruction::SetEnv {
                    name: self.read_string()?,
                    value: self.read_string()?,
                },
                Opcode::EnableDebugMode => Instruction::EnableDebugMode,
                Opcode::CreateInstallDirectory => {
                    Instruction::CreateInstallDirectory(InstallDirectoryFlags {
                        beside_executable: self.read_u32()? != 0,
                        delete_after_run: self.read_u32()? != 0,
                        chdir_first: self.read_u32()? != 0,
                    })
                }
                Opcode::DecompressLzma => {
                    let compressed_size = self.read_u32()?;
                    let compressed = self.read_bytes(compressed_size as usize)?;
                    let decompressed = decompress_lzma(compressed)?;

                    dest.push(Instruction::DecompressLzma { compressed_size });
                    RecordReader::new(&decompressed)
                        .read_records(true, dest)
                        .context("reading records in compressed block")?;

                    continue;
                }
            };

            dest.push(instruction);
        }
    }
}

/// Parse a complete container, stub image included.
pub fn parse_container(data: &[u8]) -> Result<ParsedContainer> {
    let opcode_offset = find_opcode_offset(data)?;
    let region = &data[opcode_offset..data.len() - FOOTER_LENGTH];

    let mut instructions = Vec::new();
    RecordReader::new(region).read_records(false, &mut instructions)?;

    Ok(ParsedContainer {
        opcode_offset,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{compression::compress_lzma, writer::OpcodeWriter},
    };

    const STUB: &[u8] = b"MZ fake stub image";

    #[test]
    fn bad_signature() {
        let mut data = STUB.to_vec();
        data.extend([0, 0, 0, 0, 0, 0, 0, 0]);

        assert!(find_opcode_offset(&data).is_err());
        assert!(find_opcode_offset(&[0x41]).is_err());
    }

    #[test]
    fn offset_past_trailer() {
        let mut data = STUB.to_vec();
        data.extend([0xff, 0, 0, 0]);
        data.extend(SIGNATURE);

        assert!(find_opcode_offset(&data).is_err());
    }

    #[test]
    fn uncompressed_round_trip() -> Result<()> {
        let mut writer = OpcodeWriter::new(STUB.to_vec());
        writer.write_enable_debug_mode()?;
        writer.write_create_install_directory(&InstallDirectoryFlags::default())?;
        writer.write_create_directory("src")?;
        writer.write_create_file("src\\app.rb", b"puts :hi")?;
        writer.write_set_env("RUBYLIB", "")?;
        writer.write_post_create_process("|\\bin\\ruby.exe", "ruby.exe app.rb")?;
        writer.write_trailer(STUB.len() as u64)?;

        let parsed = parse_container(&writer.into_inner())?;

        assert_eq!(parsed.opcode_offset, STUB.len());
        assert_eq!(parsed.instructions.len(), 6);
        assert_eq!(parsed.instructions[0], Instruction::EnableDebugMode);
        assert_eq!(parsed.directories(), vec!["src"]);
        assert_eq!(
            parsed.files().get("src\\app.rb").copied(),
            Some(b"puts :hi".as_ref())
        );
        assert_eq!(parsed.environment(), vec![("RUBYLIB", "")]);

        Ok(())
    }

    #[test]
    fn compressed_block_is_expanded() -> Result<()> {
        let mut inner = OpcodeWriter::new(Vec::new());
        inner.write_create_directory("bin")?;
        inner.write_create_file("bin\\ruby.exe", &[0u8; 4096])?;
        inner.write_end()?;
        let compressed = compress_lzma(&inner.into_inner(), 6)?;

        let mut writer = OpcodeWriter::new(STUB.to_vec());
        writer.write_create_install_directory(&InstallDirectoryFlags {
            beside_executable: false,
            delete_after_run: true,
            chdir_first: false,
        })?;
        writer.write_decompress_lzma(&compressed)?;
        writer.write_trailer(STUB.len() as u64)?;

        let parsed = parse_container(&writer.into_inner())?;

        assert_eq!(parsed.instructions.len(), 4);
        assert_eq!(
            parsed.instructions[1],
            Instruction::DecompressLzma {
                compressed_size: compressed.len() as u32
            }
        );
        assert_eq!(parsed.files()["bin\\ruby.exe"].len(), 4096);

        Ok(())
    }

    #[test]
    fn truncated_file_payload() -> Result<()> {
        let mut data = STUB.to_vec();
        data.extend([2, 0, 0, 0]);
        data.extend(b"x\0");
        data.extend([0xff, 0, 0, 0]);
        data.extend([0, 0, 0, 0]);
        data.extend((STUB.len() as u32).to_le_bytes());
        data.extend(SIGNATURE);

        assert!(parse_container(&data).is_err());

        Ok(())
    }
}
