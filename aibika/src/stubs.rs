// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Location of the prebuilt stub executables. */

use {
    crate::environment::{EnvironmentSnapshot, STUB_DIR_ENV},
    anyhow::{anyhow, Context, Result},
    std::path::{Path, PathBuf},
};

pub const CONSOLE_STUB: &str = "stub.exe";
pub const WINDOWED_STUB: &str = "stubw.exe";
pub const ICON_EDITOR: &str = "edicon.exe";

/// Directory holding the stub images and helper tools.
#[derive(Clone, Debug)]
pub struct StubImages {
    dir: PathBuf,
}

impl StubImages {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Find the stub directory.
    ///
    /// An explicit directory wins, then the environment, then
    /// `share/aibika` next to the directory holding this executable.
    pub fn locate(explicit: Option<&Path>, environment: &EnvironmentSnapshot) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }

        if let Some(dir) = environment.var(STUB_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(dir));
        }

        let exe = std::env::current_exe().context("resolving current executable")?;
        let exe_dir = exe
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent directory", exe.display()))?;

        Ok(Self::new(exe_dir.join("..").join("share").join("aibika")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the console or windowed stub.
    pub fn stub_image(&self, windowed: bool) -> Result<Vec<u8>> {
        let path = self
            .dir
            .join(if windowed { WINDOWED_STUB } else { CONSOLE_STUB });

        if !path.is_file() {
            return Err(anyhow!("Stub image not available: {}", path.display()));
        }

        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }

    pub fn icon_editor(&self) -> PathBuf {
        self.dir.join(ICON_EDITOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_selection() -> Result<()> {
        let td = tempfile::Builder::new().prefix("aibika-test").tempdir()?;
        std::fs::write(td.path().join(CONSOLE_STUB), b"console")?;
        std::fs::write(td.path().join(WINDOWED_STUB), b"windowed")?;

        let environment = EnvironmentSnapshot::capture()?;
        let stubs = StubImages::locate(Some(td.path()), &environment)?;

        assert_eq!(stubs.stub_image(false)?, b"console");
        assert_eq!(stubs.stub_image(true)?, b"windowed");
        assert_eq!(stubs.icon_editor(), td.path().join(ICON_EDITOR));

        Ok(())
    }

    #[test]
    fn missing_stub() {
        let stubs = StubImages::new("/nonexistent/share/aibika");
        let err = stubs.stub_image(false).unwrap_err();
        assert!(err.to_string().starts_with("Stub image not available"));
    }
}
