// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Discovering what an application loads by running it under Ruby.

A small Ruby script is written to a temporary directory and executed with
the host interpreter. It loads the application script, optionally forces
pending autoloads and, when the interpreter exits, writes a JSON report
describing loaded features, load paths, gems and `RbConfig`.
*/

use {
    crate::environment::EnvironmentSnapshot,
    anyhow::{anyhow, Context, Result},
    duct::cmd,
    log::{info, warn},
    ruby_packaging::{
        gem::{GemCatalog, GemSpec},
        pathname::Pathname,
    },
    serde::Deserialize,
    std::{
        collections::HashMap,
        ffi::OsString,
        path::{Path, PathBuf},
    },
};

const PROBE_SCRIPT: &str = include_str!("templates/probe.rb");

const PROBE_OUTPUT_ENV: &str = "AIBIKA_PROBE_OUTPUT";
const PROBE_RUN_SCRIPT_ENV: &str = "AIBIKA_PROBE_RUN_SCRIPT";
const PROBE_AUTOLOAD_ENV: &str = "AIBIKA_PROBE_AUTOLOAD";
const PROBE_GEMFILE_ENV: &str = "AIBIKA_PROBE_GEMFILE";
const PROBE_SCRIPT_ENV: &str = "AIBIKA_PROBE_SCRIPT";

/// A gem specification as reported by Ruby.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeGemSpec {
    pub name: String,
    pub full_name: String,
    pub gem_dir: String,
    pub spec_file: String,
    pub loaded_from: Option<String>,
    pub files: Vec<String>,
}

impl ProbeGemSpec {
    pub fn to_gem_spec(&self) -> GemSpec {
        GemSpec {
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            gem_dir: Pathname::new(&self.gem_dir),
            spec_file: Pathname::new(&self.spec_file),
            files: self.files.clone(),
        }
    }
}

/// Everything the probe learned about the application and the interpreter.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProbeReport {
    /// `$LOADED_FEATURES` after the application ran.
    pub features: Vec<String>,
    pub load_path_before: Vec<String>,
    pub load_path_after: Vec<String>,
    /// Working directory the application was left in.
    pub working_directory: String,
    pub warnings: Vec<String>,
    pub gem_path: Vec<String>,
    pub loaded_specs: Vec<ProbeGemSpec>,
    pub installed_specs: Vec<ProbeGemSpec>,
    pub gemfile_specs: Vec<ProbeGemSpec>,
    pub rbconfig: HashMap<String, String>,
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("parsing Ruby probe report")
    }

    pub fn features(&self) -> Vec<Pathname> {
        self.features.iter().map(Pathname::new).collect()
    }

    pub fn load_path_before(&self) -> Vec<Pathname> {
        self.load_path_before.iter().map(Pathname::new).collect()
    }

    pub fn load_path_after(&self) -> Vec<Pathname> {
        self.load_path_after.iter().map(Pathname::new).collect()
    }

    /// Load path entries the application added while running.
    pub fn added_load_paths(&self) -> Vec<Pathname> {
        let before = self.load_path_before();

        self.load_path_after()
            .into_iter()
            .filter(|lp| !before.contains(lp))
            .collect()
    }

    pub fn working_directory(&self) -> Pathname {
        Pathname::new(&self.working_directory)
    }

    pub fn gem_paths(&self) -> Vec<Pathname> {
        self.gem_path.iter().map(Pathname::new).collect()
    }

    /// Gems the application activated, then those listed by the Gemfile.
    pub fn activated_gems(&self) -> Vec<GemSpec> {
        self.gemfile_specs
            .iter()
            .chain(self.loaded_specs.iter())
            .map(|spec| spec.to_gem_spec())
            .collect()
    }

    /// Gemspec files of activated gems, as Ruby loaded them.
    pub fn loaded_gemspec_files(&self) -> Vec<(String, Pathname)> {
        self.loaded_specs
            .iter()
            .filter_map(|spec| {
                spec.loaded_from
                    .as_ref()
                    .map(|path| (spec.name.clone(), Pathname::new(path)))
            })
            .collect()
    }

    /// Every specification known to the interpreter.
    pub fn catalog(&self) -> GemCatalog {
        self.installed_specs
            .iter()
            .chain(self.loaded_specs.iter())
            .chain(self.gemfile_specs.iter())
            .map(|spec| spec.to_gem_spec())
            .collect()
    }
}

/// How to run the probe.
#[derive(Clone, Debug)]
pub struct ProbeRequest {
    pub ruby: PathBuf,
    pub script: Pathname,
    pub args: Vec<String>,
    pub run_script: bool,
    pub load_autoload: bool,
    pub gemfile: Option<Pathname>,
}

/// Locate the Ruby interpreter on `PATH`.
pub fn find_ruby() -> Result<PathBuf> {
    which::which("ruby").context("locating ruby executable on PATH")
}

impl ProbeRequest {
    fn probe_env(&self, environment: &EnvironmentSnapshot, output: &Path) -> HashMap<OsString, OsString> {
        let mut env = environment
            .vars()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<HashMap<_, _>>();

        let flag = |value: bool| OsString::from(if value { "1" } else { "0" });

        env.insert(PROBE_OUTPUT_ENV.into(), output.as_os_str().to_owned());
        env.insert(PROBE_RUN_SCRIPT_ENV.into(), flag(self.run_script));
        env.insert(PROBE_AUTOLOAD_ENV.into(), flag(self.load_autoload));
        env.insert(PROBE_SCRIPT_ENV.into(), self.script.to_posix().into());
        if let Some(gemfile) = &self.gemfile {
            env.insert(PROBE_GEMFILE_ENV.into(), gemfile.to_posix().into());
        }

        env
    }

    /// Run the probe in the captured environment and collect its report.
    pub fn run(&self, environment: &EnvironmentSnapshot) -> Result<ProbeReport> {
        let temp_dir = tempfile::Builder::new()
            .prefix("aibika-probe")
            .tempdir()
            .context("creating probe directory")?;

        let probe_path = temp_dir.path().join("probe.rb");
        let report_path = temp_dir.path().join("report.json");
        std::fs::write(&probe_path, PROBE_SCRIPT)
            .with_context(|| format!("writing {}", probe_path.display()))?;

        if self.run_script {
            info!("Loading script to check dependencies");
        }
        if self.gemfile.is_some() {
            info!("Scanning Gemfile");
        }

        let mut args = vec![probe_path.into_os_string()];
        args.extend(self.args.iter().map(OsString::from));

        let output = cmd(&self.ruby, &args)
            .dir(environment.cwd())
            .full_env(self.probe_env(environment, &report_path))
            .unchecked()
            .run()
            .with_context(|| format!("running {}", self.ruby.display()))?;

        if !report_path.exists() {
            return Err(anyhow!(
                "{} did not report its dependencies ({})",
                self.script,
                output.status
            ));
        }

        if !output.status.success() {
            warn!("{} exited with {}", self.script, output.status);
        }

        let data = std::fs::read(&report_path)
            .with_context(|| format!("reading {}", report_path.display()))?;
        let report = ProbeReport::from_json(&data)?;

        for warning in &report.warnings {
            warn!("{}", warning);
        }

        if let Some(error) = &report.error {
            return Err(anyhow!("inspecting the Ruby environment failed: {}", error));
        }

        Ok(report)
    }
}
