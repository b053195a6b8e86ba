// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Declares the foundational data primitives inside the opcode container. */

/// Signature terminating every container.
///
/// The executor reads the last 4 bytes of its own image and compares them
/// against this value.
pub const SIGNATURE: [u8; 4] = [0x41, 0xb6, 0xba, 0x4e];

/// Length of the fixed footer following the end record.
///
/// The footer holds the `u32` opcode offset and the signature.
pub const FOOTER_LENGTH: usize = 8;

/// Length of the header of an LZMA-alone stream.
///
/// 5 bytes of coder properties followed by the `u64` uncompressed size.
pub const LZMA_HEADER_LENGTH: usize = 13;

/// Describes the type of a record in the opcode stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Opcode {
    End = 0x00,
    CreateDirectory = 0x01,
    CreateFile = 0x02,
    CreateProcess = 0x03,
    DecompressLzma = 0x04,
    SetEnv = 0x05,
    PostCreateProcess = 0x06,
    EnableDebugMode = 0x07,
    CreateInstallDirectory = 0x08,
}

impl From<Opcode> for u32 {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::End => 0x00,
            Opcode::CreateDirectory => 0x01,
            Opcode::CreateFile => 0x02,
            Opcode::CreateProcess => 0x03,
            Opcode::DecompressLzma => 0x04,
            Opcode::SetEnv => 0x05,
            Opcode::PostCreateProcess => 0x06,
            Opcode::EnableDebugMode => 0x07,
            Opcode::CreateInstallDirectory => 0x08,
        }
    }
}

impl TryFrom<u32> for Opcode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Opcode::End),
            0x01 => Ok(Opcode::CreateDirectory),
            0x02 => Ok(Opcode::CreateFile),
            0x03 => Ok(Opcode::CreateProcess),
            0x04 => Ok(Opcode::DecompressLzma),
            0x05 => Ok(Opcode::SetEnv),
            0x06 => Ok(Opcode::PostCreateProcess),
            0x07 => Ok(Opcode::EnableDebugMode),
            0x08 => Ok(Opcode::CreateInstallDirectory),
            _ => Err(format!("invalid opcode: {}", value)),
        }
    }
}

/// Flags controlling where and how the executor materializes its files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstallDirectoryFlags {
    /// Create the extraction directory next to the executable instead of
    /// in the temporary directory.
    pub beside_executable: bool,

    /// Remove the extraction directory once the launched process exits.
    pub delete_after_run: bool,

    /// Change the working directory into the extraction directory before
    /// launching.
    pub chdir_first: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values() {
        for value in 0..9u32 {
            let opcode = Opcode::try_from(value).unwrap();
            assert_eq!(u32::from(opcode), value);
        }

        assert!(Opcode::try_from(9).is_err());
    }

    #[test]
    fn signature_has_no_trailing_null() {
        // The executor scans backwards over NULL padding when the image
        // carries an Authenticode signature.
        assert_ne!(SIGNATURE[3], 0);
    }
}
