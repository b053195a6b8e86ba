// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Settings of a single packaging run. */

use {
    crate::logging::LogSettings,
    anyhow::{anyhow, Result},
    ruby_packaging::{pathname::Pathname, policy::GemDirective},
    ruby_packed_container::InstallDirectoryFlags,
    std::path::PathBuf,
};

/// Everything the user asked for. Constructed once from the command line.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Application files. The first one is the script to launch.
    pub files: Vec<Pathname>,
    /// Arguments passed to the script, both while probing and at launch.
    pub script_args: Vec<String>,
    pub lzma: bool,
    /// Run the script to discover its dependencies.
    pub run_script: bool,
    /// Force loading of constants registered with `autoload`.
    pub load_autoload: bool,
    pub add_all_core: bool,
    pub output_override: Option<Pathname>,
    /// DLL names to copy from the Ruby bin directory.
    pub extra_dlls: Vec<String>,
    pub log: LogSettings,
    pub force_windows: bool,
    pub force_console: bool,
    pub chdir_first: bool,
    pub icon: Option<Pathname>,
    pub gemfile: Option<Pathname>,
    pub inno_script: Option<Pathname>,
    /// Detect DLLs the interpreter and extensions link against.
    pub autodll: bool,
    pub debug: bool,
    pub debug_extract: bool,
    /// Include encoding extensions.
    pub enc: bool,
    /// Permit packaging the packager's own gem.
    pub allow_self: bool,
    pub gem_directives: Vec<GemDirective>,
    /// Directory holding stub images.
    pub stub_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            files: vec![],
            script_args: vec![],
            lzma: true,
            run_script: true,
            load_autoload: true,
            add_all_core: false,
            output_override: None,
            extra_dlls: vec![],
            log: LogSettings::default(),
            force_windows: false,
            force_console: false,
            chdir_first: false,
            icon: None,
            gemfile: None,
            inno_script: None,
            autodll: true,
            debug: false,
            debug_extract: false,
            enc: true,
            allow_self: false,
            gem_directives: vec![],
            stub_dir: None,
        }
    }
}

impl BuildOptions {
    /// Reject combinations of options that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if let Some(icon) = &self.icon {
            if !icon.exists() {
                return Err(anyhow!("Icon file {} not found.", icon));
            }
        }

        if let Some(gemfile) = &self.gemfile {
            if !gemfile.exists() {
                return Err(anyhow!("Gemfile {} not found.", gemfile));
            }
        }

        if let Some(script) = &self.inno_script {
            if !script.exists() {
                return Err(anyhow!("Inno Script {} not found.", script));
            }

            if self.debug_extract {
                return Err(anyhow!(
                    "The --debug-extract option conflicts with use of Inno Setup"
                ));
            }

            if self.lzma {
                return Err(anyhow!(
                    "LZMA compression must be disabled (--no-lzma) when using Inno Setup"
                ));
            }

            if !self.chdir_first {
                return Err(anyhow!(
                    "Chdir-first mode must be enabled (--chdir-first) when using Inno Setup"
                ));
            }
        }

        Ok(())
    }

    /// The script launched by the executable.
    pub fn main_script(&self) -> Result<&Pathname> {
        self.files
            .first()
            .ok_or_else(|| anyhow!("No script files specified"))
    }

    /// Path of the executable to produce.
    pub fn output_file(&self) -> Result<Pathname> {
        if let Some(output) = &self.output_override {
            return Ok(output.clone());
        }

        let executable = self.main_script()?.basename().with_extension(".exe");

        Ok(if self.debug {
            executable.append_to_filename("-debug")
        } else {
            executable
        })
    }

    /// Whether the application runs under the windowed interpreter.
    pub fn windowed(&self) -> bool {
        let rbw = self
            .files
            .first()
            .map(|f| f.has_extension(".rbw"))
            .unwrap_or(false);

        (rbw || self.force_windows) && !self.force_console
    }

    /// Whether the opcode stream gets compressed.
    pub fn compress(&self) -> bool {
        self.lzma && self.inno_script.is_none()
    }

    pub fn install_directory_flags(&self) -> InstallDirectoryFlags {
        InstallDirectoryFlags {
            beside_executable: self.debug_extract,
            delete_after_run: !self.debug_extract,
            chdir_first: self.chdir_first,
        }
    }
}
