// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Facts about the Ruby installation being packaged. */

use {
    crate::pathname::Pathname,
    anyhow::{anyhow, Result},
    std::collections::HashMap,
};

/// Installation directories and executable names of a Ruby interpreter.
///
/// Values originate from `RbConfig::CONFIG` of the interpreter that ran
/// the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostFacts {
    pub exec_prefix: Pathname,
    pub sitelibdir: Pathname,
    pub bindir: Pathname,
    /// File name of the shared Ruby library, if the interpreter links one.
    pub libruby_so: Option<String>,
    pub exeext: String,
    pub ruby_install_name: String,
    pub rubyw_install_name: String,
    pub tempdir: Pathname,
}

fn non_empty(config: &HashMap<String, String>, key: &str) -> Option<String> {
    config
        .get(key)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

impl HostFacts {
    /// Derive host facts from a dump of `RbConfig::CONFIG`.
    pub fn from_rbconfig(config: &HashMap<String, String>, tempdir: Pathname) -> Result<Self> {
        let required = |key: &str| -> Result<Pathname> {
            non_empty(config, key)
                .map(Pathname::new)
                .ok_or_else(|| anyhow!("RbConfig does not define {}", key))
        };

        Ok(Self {
            exec_prefix: required("exec_prefix")?,
            sitelibdir: required("sitelibdir")?,
            bindir: required("bindir")?,
            libruby_so: non_empty(config, "LIBRUBY_SO"),
            exeext: config
                .get("EXEEXT")
                .cloned()
                .unwrap_or_else(|| ".exe".to_string()),
            ruby_install_name: non_empty(config, "ruby_install_name")
                .unwrap_or_else(|| "ruby".to_string()),
            rubyw_install_name: non_empty(config, "rubyw_install_name")
                .unwrap_or_else(|| "rubyw".to_string()),
            tempdir,
        })
    }

    /// File name of the console interpreter.
    pub fn ruby_exe(&self) -> String {
        format!("{}{}", self.ruby_install_name, self.exeext)
    }

    /// File name of the windowed interpreter.
    pub fn rubyw_exe(&self) -> String {
        format!("{}{}", self.rubyw_install_name, self.exeext)
    }

    /// Site library directory relative to the installation prefix.
    pub fn instsitelibdir(&self) -> Pathname {
        self.sitelibdir.relative_path_from(&self.exec_prefix)
    }
}
