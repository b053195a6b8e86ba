// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{gem::GemSpec, pathname::Pathname},
    anyhow::Result,
};

/// Write an empty file, creating parent directories.
pub fn touch(path: &Pathname) -> Result<()> {
    std::fs::create_dir_all(path.dirname().to_path_buf())?;
    std::fs::write(path.to_path_buf(), b"")?;
    Ok(())
}

/// A temporary gem home with installed gems.
pub struct GemFixture {
    _temp_dir: tempfile::TempDir,
    pub root: Pathname,
    pub gem_home: Pathname,
}

impl GemFixture {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("ruby-packaging-test")
            .tempdir()?;
        let root = Pathname::from(temp_dir.path());
        let gem_home = root.join("gems/3.2.0");

        std::fs::create_dir_all(gem_home.join("specifications").to_path_buf())?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            gem_home,
        })
    }

    /// Install a gem with the given files and a gemspec.
    pub fn install_gem(&self, name: &str, version: &str, files: &[&str]) -> Result<GemSpec> {
        let full_name = format!("{}-{}", name, version);
        let gem_dir = self.gem_home.join("gems").join(full_name.as_str());
        let spec_file = self
            .gem_home
            .join("specifications")
            .join(format!("{}.gemspec", full_name));

        std::fs::create_dir_all(gem_dir.to_path_buf())?;
        for file in files {
            touch(&gem_dir.join(*file))?;
        }
        touch(&spec_file)?;

        Ok(GemSpec {
            name: name.to_string(),
            full_name,
            gem_dir,
            spec_file,
            files: files.iter().map(|f| f.to_string()).collect(),
        })
    }
}
