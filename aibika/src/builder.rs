// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Assembly of self-extracting executables.

[ContainerBuilder] collects opcode records in a spool file while the
package is planned, then appends them to a stub image, optionally as a
single LZMA compressed block.
*/

use {
    anyhow::{anyhow, Context, Result},
    duct::cmd,
    log::{debug, info},
    once_cell::sync::Lazy,
    regex::Regex,
    ruby_packaging::{layout::TEMPDIR_ROOT, pathname::Pathname},
    ruby_packed_container::{
        compress_lzma, InstallDirectoryFlags, OpcodeWriter, DEFAULT_LZMA_PRESET,
    },
    std::{
        collections::HashSet,
        fs::File,
        io::{BufWriter, Read, Seek, SeekFrom},
        path::PathBuf,
    },
};

/// Modules built into the interpreter that may be reported without a file.
pub static IGNORE_MODULE_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"/(enumerator\.so|rational\.so|complex\.so|fiber\.so|thread\.rb|ruby2_keywords\.rb)$",
    )
    .unwrap()
});

/// Render a path or command line with the extraction directory spelled out.
pub fn show_tempdir(value: &str) -> String {
    value.replace(TEMPDIR_ROOT, "<tempdir>")
}

/// How the container gets finalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContainerSettings {
    /// Compress every record after the install directory record.
    pub compress: bool,
    /// Make the stub report what it does.
    pub debug: bool,
    /// Records for files and directories are left to an external installer.
    pub installer: bool,
    pub install_directory: InstallDirectoryFlags,
}

/// Replaces the icon of a written stub.
#[derive(Clone, Debug)]
pub struct IconPatch {
    pub editor: PathBuf,
    pub icon: Pathname,
}

impl IconPatch {
    pub fn apply(&self, executable: &Pathname) -> Result<()> {
        if !self.editor.is_file() {
            return Err(anyhow!(
                "icon editor {} not available",
                self.editor.display()
            ));
        }

        cmd(
            &self.editor,
            [executable.to_native(), self.icon.to_native()],
        )
        .stdout_null()
        .run()
        .with_context(|| format!("replacing icon of {}", executable))?;

        Ok(())
    }
}

/// Collects the records of a container.
pub struct ContainerBuilder {
    settings: ContainerSettings,
    records: OpcodeWriter<BufWriter<File>>,
    directories: Vec<Pathname>,
    directory_keys: HashSet<Pathname>,
    files: Vec<(Pathname, Pathname)>,
    file_keys: HashSet<Pathname>,
}

impl ContainerBuilder {
    pub fn new(settings: ContainerSettings) -> Result<Self> {
        let spool = tempfile::tempfile().context("creating record spool file")?;

        Ok(Self {
            settings,
            records: OpcodeWriter::new(BufWriter::new(spool)),
            directories: vec![],
            directory_keys: HashSet::new(),
            files: vec![],
            file_keys: HashSet::new(),
        })
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    /// Directories created so far, in creation order.
    pub fn directories(&self) -> &[Pathname] {
        &self.directories
    }

    /// `(target, source)` pairs of files added so far.
    pub fn files(&self) -> &[(Pathname, Pathname)] {
        &self.files
    }

    pub fn create_directory(&mut self, path: &Pathname) -> Result<()> {
        if !self.directory_keys.insert(path.clone()) {
            return Ok(());
        }

        self.directories.push(path.clone());
        debug!("m {}", show_tempdir(path.as_str()));

        if self.settings.installer {
            return Ok(());
        }

        self.records.write_create_directory(&path.to_native())
    }

    /// Create `path` and every missing parent.
    pub fn ensure_directory(&mut self, path: &Pathname) -> Result<()> {
        if path.as_str() == "." || path.is_empty() {
            return Ok(());
        }

        if self.directory_keys.contains(path) {
            return Ok(());
        }

        let parent = path.dirname();
        if &parent != path {
            self.ensure_directory(&parent)?;
        }

        self.create_directory(path)
    }

    /// Add the content of `source` at `target`. The first source for a target wins.
    pub fn create_file(&mut self, source: &Pathname, target: &Pathname) -> Result<()> {
        if self.file_keys.contains(target) {
            return Ok(());
        }

        if !source.exists() && IGNORE_MODULE_NAMES.is_match(&source.to_posix()) {
            debug!("skipping built-in module {}", source);
            return Ok(());
        }

        self.file_keys.insert(target.clone());
        self.files.push((target.clone(), source.clone()));

        self.ensure_directory(&target.dirname())?;

        let data = source.read()?;
        debug!("a {}", show_tempdir(target.as_str()));

        if self.settings.installer {
            return Ok(());
        }

        self.records.write_create_file(&target.to_native(), &data)
    }

    pub fn create_process(&mut self, image: &Pathname, command_line: &str) -> Result<()> {
        debug!(
            "l {} {}",
            show_tempdir(image.as_str()),
            show_tempdir(command_line)
        );
        self.records
            .write_create_process(&image.to_native(), command_line)
    }

    /// Launch `image` once the package has been extracted.
    pub fn post_create_process(&mut self, image: &Pathname, command_line: &str) -> Result<()> {
        debug!(
            "p {} {}",
            show_tempdir(image.as_str()),
            show_tempdir(command_line)
        );
        self.records
            .write_post_create_process(&image.to_native(), command_line)
    }

    pub fn set_env(&mut self, name: &str, value: &str) -> Result<()> {
        debug!("e {} {}", name, show_tempdir(value));
        self.records.write_set_env(name, value)
    }

    /// Write the stub image followed by every collected record to `path`.
    ///
    /// Returns the size of the written executable.
    pub fn write_executable(
        self,
        path: &Pathname,
        stub: &[u8],
        icon: Option<&IconPatch>,
    ) -> Result<u64> {
        let settings = self.settings;
        let mut records = self.records;

        std::fs::write(path.to_path_buf(), stub)
            .with_context(|| format!("writing stub to {}", path))?;

        if let Some(icon) = icon {
            icon.apply(path)?;
        }

        let opcode_offset = path.file_size()?;

        let dest = std::fs::OpenOptions::new()
            .append(true)
            .open(path.to_path_buf())
            .with_context(|| format!("opening {} for append", path))?;
        let mut writer = OpcodeWriter::new(BufWriter::new(dest));

        if settings.debug {
            info!("Enabling debug mode in executable");
            writer.write_enable_debug_mode()?;
        }

        if !settings.installer {
            writer.write_create_install_directory(&settings.install_directory)?;
        }

        if settings.compress {
            records.write_end()?;
        }
        records.flush()?;

        let mut spool = records
            .into_inner()
            .into_inner()
            .map_err(|e| anyhow!("flushing record spool: {}", e.error()))?;
        spool
            .seek(SeekFrom::Start(0))
            .context("rewinding record spool")?;

        if settings.compress {
            let mut data = vec![];
            spool
                .read_to_end(&mut data)
                .context("reading record spool")?;

            info!("Compressing {} bytes", data.len());
            let compressed = compress_lzma(&data, DEFAULT_LZMA_PRESET)?;
            writer.write_decompress_lzma(&compressed)?;
        } else {
            let mut dest = writer.into_inner();
            std::io::copy(&mut spool, &mut dest).context("copying records")?;
            writer = OpcodeWriter::new(dest);
        }

        writer.write_trailer(opcode_offset)?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|e| anyhow!("flushing {}: {}", path, e.error()))?;
        file.sync_all()
            .with_context(|| format!("syncing {}", path))?;

        path.file_size()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        ruby_packed_container::{parse_container, Instruction},
    };

    const STUB: &[u8] = b"MZ test stub";

    struct Fixture {
        _temp_dir: tempfile::TempDir,
        root: Pathname,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let temp_dir = tempfile::Builder::new().prefix("aibika-test").tempdir()?;
            let root = Pathname::from(temp_dir.path());

            Ok(Self {
                _temp_dir: temp_dir,
                root,
            })
        }

        fn write(&self, relative: &str, content: &[u8]) -> Result<Pathname> {
            let path = self.root.join(relative);
            std::fs::create_dir_all(path.dirname().to_path_buf())?;
            std::fs::write(path.to_path_buf(), content)?;
            Ok(path)
        }
    }

    #[test]
    fn first_file_for_target_wins() -> Result<()> {
        let fixture = Fixture::new()?;
        let a = fixture.write("a/app.rb", b"first")?;
        let b = fixture.write("b/app.rb", b"second")?;

        let mut builder = ContainerBuilder::new(ContainerSettings::default())?;
        builder.create_file(&a, &Pathname::new("src/app.rb"))?;
        builder.create_file(&b, &Pathname::new("src/app.rb"))?;
        builder.create_file(&b, &Pathname::new("SRC/App.rb"))?;

        assert_eq!(builder.files().len(), 1);
        assert_eq!(builder.directories(), &[Pathname::new("src")]);

        let exe = fixture.root.join("app.exe");
        builder.write_executable(&exe, STUB, None)?;

        let parsed = parse_container(&exe.read()?)?;
        assert_eq!(parsed.files().get("src\\app.rb").copied(), Some(b"first".as_ref()));

        Ok(())
    }

    #[test]
    fn directories_are_created_once_with_parents() -> Result<()> {
        let mut builder = ContainerBuilder::new(ContainerSettings::default())?;
        builder.ensure_directory(&Pathname::new("lib/ruby/3.2.0"))?;
        builder.ensure_directory(&Pathname::new("LIB/ruby"))?;
        builder.create_directory(&Pathname::new("lib/Ruby/3.2.0"))?;
        builder.ensure_directory(&Pathname::new("."))?;

        assert_eq!(
            builder.directories(),
            &[
                Pathname::new("lib"),
                Pathname::new("lib/ruby"),
                Pathname::new("lib/ruby/3.2.0")
            ]
        );

        Ok(())
    }

    #[test]
    fn directory_and_file_targets_fold_case_alike() -> Result<()> {
        let fixture = Fixture::new()?;
        let source = fixture.write("data.txt", b"data")?;
        let mut builder = ContainerBuilder::new(ContainerSettings::default())?;

        builder.create_file(&source, &Pathname::new("Über/data.txt"))?;
        builder.create_file(&source, &Pathname::new("über/data.txt"))?;
        builder.create_file(&source, &Pathname::new("ÜBER/DATA.TXT"))?;

        assert_eq!(
            builder.directories(),
            &[Pathname::new("Über"), Pathname::new("über")]
        );
        assert_eq!(builder.files().len(), 2);

        Ok(())
    }

    #[test]
    fn builtin_modules_may_be_missing() -> Result<()> {
        let fixture = Fixture::new()?;
        let mut builder = ContainerBuilder::new(ContainerSettings::default())?;

        builder.create_file(
            &fixture.root.join("lib/enumerator.so"),
            &Pathname::new("lib/enumerator.so"),
        )?;
        assert!(builder.files().is_empty());

        assert!(builder
            .create_file(
                &fixture.root.join("lib/missing.rb"),
                &Pathname::new("lib/missing.rb"),
            )
            .is_err());

        Ok(())
    }

    #[test]
    fn compressed_executable() -> Result<()> {
        let fixture = Fixture::new()?;
        let script = fixture.write("app.rb", b"puts 'hello'")?;

        let mut builder = ContainerBuilder::new(ContainerSettings {
            compress: true,
            debug: true,
            installer: false,
            install_directory: InstallDirectoryFlags {
                beside_executable: false,
                delete_after_run: true,
                chdir_first: true,
            },
        })?;
        builder.create_file(&script, &Pathname::new("src/app.rb"))?;
        builder.set_env("GEM_PATH", "|\\gemhome")?;
        builder.post_create_process(
            &Pathname::new("|/bin/ruby.exe"),
            "ruby.exe \"|\\src\\app.rb\"",
        )?;

        let exe = fixture.root.join("app.exe");
        let size = builder.write_executable(&exe, STUB, None)?;

        let data = exe.read()?;
        assert_eq!(size, data.len() as u64);
        assert!(data.starts_with(STUB));

        let parsed = parse_container(&data)?;
        assert_eq!(parsed.opcode_offset, STUB.len());
        assert_eq!(parsed.instructions[0], Instruction::EnableDebugMode);
        assert_eq!(
            parsed.instructions[1],
            Instruction::CreateInstallDirectory(InstallDirectoryFlags {
                beside_executable: false,
                delete_after_run: true,
                chdir_first: true,
            })
        );
        assert!(matches!(
            parsed.instructions[2],
            Instruction::DecompressLzma { .. }
        ));
        assert_eq!(parsed.directories(), vec!["src"]);
        assert_eq!(parsed.environment(), vec![("GEM_PATH", "|\\gemhome")]);
        assert_eq!(
            parsed.instructions.last(),
            Some(&Instruction::PostCreateProcess {
                image: "|\\bin\\ruby.exe".to_string(),
                command_line: "ruby.exe \"|\\src\\app.rb\"".to_string(),
            })
        );

        Ok(())
    }

    #[test]
    fn installer_mode_skips_content_records() -> Result<()> {
        let fixture = Fixture::new()?;
        let script = fixture.write("app.rb", b"puts 1")?;

        let mut builder = ContainerBuilder::new(ContainerSettings {
            installer: true,
            ..Default::default()
        })?;
        builder.create_file(&script, &Pathname::new("src/app.rb"))?;
        builder.set_env("RUBYOPT", "")?;

        let exe = fixture.root.join("app.exe");
        builder.write_executable(&exe, STUB, None)?;

        let parsed = parse_container(&exe.read()?)?;
        assert_eq!(
            parsed.instructions,
            vec![Instruction::SetEnv {
                name: "RUBYOPT".to_string(),
                value: String::new(),
            }]
        );

        Ok(())
    }

    #[test]
    fn tempdir_display() {
        assert_eq!(
            show_tempdir("ruby.exe \"|\\src\\app.rb\""),
            "ruby.exe \"<tempdir>\\src\\app.rb\""
        );
    }
}
