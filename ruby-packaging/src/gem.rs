// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installed gem metadata. */

use {crate::pathname::Pathname, std::collections::HashMap};

/// Metadata of an installed gem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GemSpec {
    /// Gem name, e.g. `rake`.
    pub name: String,
    /// Name and version, e.g. `rake-13.0.6`.
    pub full_name: String,
    /// Root directory of the installed gem.
    pub gem_dir: Pathname,
    /// Path of the installed `.gemspec` file.
    pub spec_file: Pathname,
    /// Files declared by the gemspec, relative to `gem_dir`.
    pub files: Vec<String>,
}

impl GemSpec {
    /// Directory holding compiled extension markers for this gem.
    ///
    /// Installed gems live at `<gem home>/gems/<full name>` while extension
    /// build output lives under `<gem home>/extensions`.
    pub fn extensions_dir(&self) -> Pathname {
        self.gem_dir.dirname().dirname().join("extensions")
    }

    /// Location of the fallback gemspec shipped with default gems.
    pub fn default_spec_file(&self) -> Pathname {
        self.spec_file
            .dirname()
            .join("default")
            .join(self.spec_file.basename())
    }
}

/// Resolves gem specifications by the path of their `.gemspec` file.
pub trait SpecificationSource {
    fn load_specification(&self, spec_file: &Pathname) -> Option<GemSpec>;
}

/// An in-memory collection of gem specifications.
#[derive(Clone, Debug, Default)]
pub struct GemCatalog {
    specs: Vec<GemSpec>,
    by_spec_file: HashMap<Pathname, usize>,
}

impl GemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specification. Later registrations of the same spec file win.
    pub fn add(&mut self, spec: GemSpec) {
        if let Some(index) = self.by_spec_file.get(&spec.spec_file) {
            self.specs[*index] = spec;
        } else {
            self.by_spec_file
                .insert(spec.spec_file.clone(), self.specs.len());
            self.specs.push(spec);
        }
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GemSpec> {
        self.specs.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&GemSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }
}

impl FromIterator<GemSpec> for GemCatalog {
    fn from_iter<T: IntoIterator<Item = GemSpec>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for spec in iter {
            catalog.add(spec);
        }
        catalog
    }
}

impl SpecificationSource for GemCatalog {
    fn load_specification(&self, spec_file: &Pathname) -> Option<GemSpec> {
        self.by_spec_file
            .get(spec_file)
            .map(|index| self.specs[*index].clone())
    }
}
