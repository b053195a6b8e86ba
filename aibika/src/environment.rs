// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolve details about the Aibika execution environment.

use {
    anyhow::{Context, Result},
    ruby_packaging::pathname::Pathname,
    std::{
        collections::BTreeMap,
        ffi::OsString,
        path::{Path, PathBuf},
    },
};

pub const AIBIKA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the location of stub images.
pub const STUB_DIR_ENV: &str = "AIBIKA_STUB_DIR";

/// The process environment and working directory at a point in time.
#[derive(Clone, Debug)]
pub struct EnvironmentSnapshot {
    vars: BTreeMap<OsString, OsString>,
    cwd: PathBuf,
}

impl EnvironmentSnapshot {
    pub fn capture() -> Result<Self> {
        Ok(Self {
            vars: std::env::vars_os().collect(),
            cwd: std::env::current_dir().context("resolving current directory")?,
        })
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Value of a variable as it was captured.
    pub fn var(&self, key: &str) -> Option<String> {
        self.vars
            .get(&OsString::from(key))
            .map(|value| value.to_string_lossy().to_string())
    }

    /// Captured variables, for handing to child processes.
    pub fn vars(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }

    /// Put the process environment back the way it was captured.
    ///
    /// Changed variables get their old value, new variables are removed
    /// and the working directory is restored.
    pub fn restore(&self) -> Result<()> {
        for (key, value) in &self.vars {
            if std::env::var_os(key).as_ref() != Some(value) {
                std::env::set_var(key, value);
            }
        }

        for (key, _) in std::env::vars_os() {
            if !self.vars.contains_key(&key) {
                std::env::remove_var(&key);
            }
        }

        std::env::set_current_dir(&self.cwd)
            .with_context(|| format!("changing directory to {}", self.cwd.display()))
    }
}

/// Scratch directory of the build host.
pub fn default_tempdir() -> Pathname {
    ["TEMP", "TMP"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
        .map(Pathname::new)
        .unwrap_or_else(|| Pathname::from(std::env::temp_dir()))
}
