// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        ruby_probe::{ProbeGemSpec, ProbeReport},
        stubs::{StubImages, CONSOLE_STUB, WINDOWED_STUB},
    },
    anyhow::Result,
    ruby_packaging::{gem::GemSpec, host::HostFacts, pathname::Pathname},
};

/// A fake Ruby installation, gem home and stub directory.
pub struct RubyFixture {
    _temp_dir: tempfile::TempDir,
    pub root: Pathname,
    pub prefix: Pathname,
    pub corelib: Pathname,
    pub archdir: Pathname,
    pub gem_home: Pathname,
    gems: Vec<GemSpec>,
}

impl RubyFixture {
    pub const STUB: &'static [u8] = b"MZ fake console stub";

    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("aibika-test").tempdir()?;
        let root = Pathname::from(temp_dir.path());
        let prefix = root.join("ruby");
        let corelib = prefix.join("lib/ruby/3.2.0");
        let archdir = corelib.join("x64-mingw-ucrt");
        let gem_home = root.join("gems/3.2.0");

        let fixture = Self {
            _temp_dir: temp_dir,
            root: root.clone(),
            prefix: prefix.clone(),
            corelib: corelib.clone(),
            archdir: archdir.clone(),
            gem_home: gem_home.clone(),
            gems: vec![],
        };

        fixture.write(&prefix.join("bin/ruby.exe"), b"not a PE image")?;
        fixture.write(&prefix.join("bin/rubyw.exe"), b"not a PE image either")?;
        fixture.write(&corelib.join("set.rb"), b"class Set; end\n")?;
        fixture.write(
            &corelib.join("rubygems/core_ext/kernel_require.rb"),
            b"module Kernel; end\n",
        )?;
        fixture.write(&archdir.join("enc/utf_16le.so"), b"encoding")?;
        std::fs::create_dir_all(gem_home.join("specifications").to_path_buf())?;

        fixture.write(&root.join("stubs").join(CONSOLE_STUB), Self::STUB)?;
        fixture.write(&root.join("stubs").join(WINDOWED_STUB), b"MZ fake windowed stub")?;

        Ok(fixture)
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, path: &Pathname, content: &[u8]) -> Result<Pathname> {
        std::fs::create_dir_all(path.dirname().to_path_buf())?;
        std::fs::write(path.to_path_buf(), content)?;
        Ok(path.clone())
    }

    /// Install a gem into the gem home.
    pub fn install_gem(&mut self, name: &str, version: &str, files: &[&str]) -> Result<GemSpec> {
        let full_name = format!("{}-{}", name, version);
        let gem_dir = self.gem_home.join("gems").join(full_name.as_str());
        let spec_file = self
            .gem_home
            .join("specifications")
            .join(format!("{}.gemspec", full_name));

        for file in files {
            self.write(&gem_dir.join(*file), b"")?;
        }
        self.write(&spec_file, b"Gem::Specification.new\n")?;

        let spec = GemSpec {
            name: name.to_string(),
            full_name,
            gem_dir,
            spec_file,
            files: files.iter().map(|f| f.to_string()).collect(),
        };
        self.gems.push(spec.clone());

        Ok(spec)
    }

    pub fn host(&self) -> HostFacts {
        HostFacts {
            exec_prefix: self.prefix.clone(),
            sitelibdir: self.prefix.join("lib/ruby/site_ruby/3.2.0"),
            bindir: self.prefix.join("bin"),
            libruby_so: None,
            exeext: ".exe".to_string(),
            ruby_install_name: "ruby".to_string(),
            rubyw_install_name: "rubyw".to_string(),
            tempdir: self.root.join("tmp"),
        }
    }

    /// A probe report for an application that loaded nothing.
    pub fn report(&self) -> ProbeReport {
        let load_path = vec![self.corelib.to_posix(), self.archdir.to_posix()];

        ProbeReport {
            load_path_before: load_path.clone(),
            load_path_after: load_path,
            working_directory: self.root.to_posix(),
            gem_path: vec![self.gem_home.to_posix()],
            installed_specs: self
                .gems
                .iter()
                .map(|spec| ProbeGemSpec {
                    name: spec.name.clone(),
                    full_name: spec.full_name.clone(),
                    gem_dir: spec.gem_dir.to_posix(),
                    spec_file: spec.spec_file.to_posix(),
                    loaded_from: Some(spec.spec_file.to_posix()),
                    files: spec.files.clone(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn stubs(&self) -> StubImages {
        StubImages::new(self.root.join("stubs").to_path_buf())
    }
}
