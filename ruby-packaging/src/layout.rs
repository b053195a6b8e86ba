// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Placement of files inside the extraction directory.

At run time the stub extracts everything into a temporary directory,
represented by [TEMPDIR_ROOT] in paths. The directory mirrors the Ruby
installation at its root, and holds the application sources under
[SRCDIR] and gems under [GEMHOMEDIR].
*/

use {
    crate::{host::HostFacts, load_path::resolve_feature, pathname::Pathname},
    anyhow::{anyhow, Result},
};

/// Placeholder the stub replaces with the extraction directory.
pub const TEMPDIR_ROOT: &str = "|";

/// Directory holding application sources.
pub const SRCDIR: &str = "src";

/// Directory holding interpreter executables and libraries.
pub const BINDIR: &str = "bin";

/// Directory holding installed gems.
pub const GEMHOMEDIR: &str = "gemhome";

/// Resolve a path inside the extraction directory.
pub fn tempdir_path(relative: impl Into<Pathname>) -> Pathname {
    Pathname::new(TEMPDIR_ROOT).join(relative)
}

/// Compute the deepest directory containing all `files`.
///
/// Files under `exec_prefix` do not influence the result. Returns the root
/// and the files expressed relative to it. Files outside the root stay
/// absolute.
pub fn find_src_root(
    files: &[Pathname],
    exec_prefix: &Pathname,
    cwd: &Pathname,
) -> Result<(Pathname, Vec<Pathname>)> {
    let src_files = files
        .iter()
        .map(|f| f.expand_from(cwd))
        .collect::<Vec<_>>();

    let mut src_prefix = src_files
        .first()
        .ok_or_else(|| anyhow!("No source files specified"))?
        .dirname();

    for file in &src_files {
        if file.is_subpath_of(exec_prefix) {
            continue;
        }

        loop {
            let relative = file.relative_path_from(&src_prefix);
            if relative.is_absolute() {
                return Err(anyhow!(
                    "No common directory contains all specified files"
                ));
            }

            if relative.as_str() != ".." && !relative.as_str().starts_with("../") {
                break;
            }

            let parent = src_prefix.dirname();
            if parent == src_prefix {
                return Err(anyhow!(
                    "Endless loop detected while searching for the common directory of {}",
                    file
                ));
            }
            src_prefix = parent;
        }
    }

    let src_files = src_files
        .into_iter()
        .map(|file| {
            if file.is_subpath_of(&src_prefix) {
                file.relative_path_from(&src_prefix)
            } else {
                file
            }
        })
        .collect();

    Ok((src_prefix, src_files))
}

/// Where a loaded feature gets packaged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeaturePlacement {
    /// Part of the application sources.
    Source {
        path: Pathname,
        /// Load path entry to recreate at launch.
        load_path: Option<Pathname>,
    },
    /// Belongs to the Ruby installation.
    Runtime { source: Pathname, target: Pathname },
    /// Belongs to a gem storage path.
    GemHome { source: Pathname, target: Pathname },
    /// Came from an unknown library directory; goes to the site library.
    SiteLib { source: Pathname, target: Pathname },
}

/// The planned placement of all application files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutPlan {
    /// Common directory of all application sources.
    pub src_prefix: Pathname,
    /// Application sources relative to `src_prefix`.
    pub src_files: Vec<Pathname>,
    /// `(source, target)` pairs of library files.
    pub libs: Vec<(Pathname, Pathname)>,
    /// Load path entries to expose at launch, inside the extraction directory.
    pub load_path: Vec<Pathname>,
}

impl LayoutPlan {
    /// `(source, target)` pairs for the application sources.
    pub fn source_files(&self, exec_prefix: &Pathname) -> Vec<(Pathname, Pathname)> {
        self.src_files
            .iter()
            .map(|file| {
                let source = self.src_prefix.join(file);

                let target = if source.is_subpath_of(exec_prefix) {
                    source.relative_path_from(exec_prefix)
                } else if source.is_subpath_of(&self.src_prefix) {
                    Pathname::new(SRCDIR).join(source.relative_path_from(&self.src_prefix))
                } else {
                    Pathname::new(SRCDIR).join(source.basename())
                };

                (source, target)
            })
            .collect()
    }
}

/// Classifies loaded features by origin.
pub struct LayoutPlanner<'a> {
    host: &'a HostFacts,
    load_paths: &'a [Pathname],
    added_load_paths: &'a [Pathname],
    gem_paths: &'a [Pathname],
    working_dir: &'a Pathname,
    cwd: &'a Pathname,
}

impl<'a> LayoutPlanner<'a> {
    /// Construct a planner.
    ///
    /// `added_load_paths` are entries the application added to the load path
    /// itself. `working_dir` is where the application was left running and
    /// `cwd` is the directory the build runs in.
    pub fn new(
        host: &'a HostFacts,
        load_paths: &'a [Pathname],
        added_load_paths: &'a [Pathname],
        gem_paths: &'a [Pathname],
        working_dir: &'a Pathname,
        cwd: &'a Pathname,
    ) -> Self {
        Self {
            host,
            load_paths,
            added_load_paths,
            gem_paths,
            working_dir,
            cwd,
        }
    }

    fn gem_home_target(&self, file: &Pathname) -> Option<Pathname> {
        self.gem_paths
            .iter()
            .find(|gem_path| file.is_subpath_of(gem_path))
            .map(|gem_path| Pathname::new(GEMHOMEDIR).join(file.relative_path_from(gem_path)))
    }

    fn installation_target(&self, file: &Pathname) -> Option<Pathname> {
        if file.is_subpath_of(&self.host.exec_prefix) {
            Some(file.relative_path_from(&self.host.exec_prefix))
        } else {
            self.gem_home_target(file)
        }
    }

    /// Decide where a feature gets packaged.
    pub fn classify(&self, feature: &Pathname, src_prefix: &Pathname) -> FeaturePlacement {
        let (load_path, relative) = match resolve_feature(self.load_paths, feature) {
            Some(res) if &res.0 != self.cwd => res,
            _ => {
                return FeaturePlacement::Source {
                    path: feature.clone(),
                    load_path: None,
                }
            }
        };

        let full_path = load_path.join(&relative);
        let added_by_script = self.added_load_paths.contains(&load_path);

        if full_path.is_subpath_of(&self.host.exec_prefix) {
            FeaturePlacement::Runtime {
                target: full_path.relative_path_from(&self.host.exec_prefix),
                source: full_path,
            }
        } else if let Some(target) = self.gem_home_target(&full_path) {
            FeaturePlacement::GemHome {
                source: full_path,
                target,
            }
        } else if full_path.is_subpath_of(src_prefix) || &load_path == self.working_dir {
            FeaturePlacement::Source {
                path: full_path,
                load_path: if added_by_script {
                    None
                } else {
                    Some(load_path)
                },
            }
        } else if added_by_script {
            FeaturePlacement::Source {
                path: full_path,
                load_path: None,
            }
        } else {
            FeaturePlacement::SiteLib {
                source: full_path,
                target: self.host.instsitelibdir().join(relative),
            }
        }
    }

    /// Plan the placement of `explicit_files` and all `features`.
    pub fn plan(&self, explicit_files: &[Pathname], features: &[Pathname]) -> Result<LayoutPlan> {
        let (seed_prefix, _) = find_src_root(explicit_files, &self.host.exec_prefix, self.cwd)?;

        let mut files = explicit_files.to_vec();
        let mut libs = vec![];
        let mut src_load_path = vec![];

        for feature in features {
            match self.classify(feature, &seed_prefix) {
                FeaturePlacement::Source { path, load_path } => {
                    files.push(path);
                    if let Some(load_path) = load_path {
                        if !src_load_path.contains(&load_path) {
                            src_load_path.push(load_path);
                        }
                    }
                }
                FeaturePlacement::Runtime { source, target }
                | FeaturePlacement::GemHome { source, target }
                | FeaturePlacement::SiteLib { source, target } => {
                    libs.push((source, target));
                }
            }
        }

        let (src_prefix, src_files) = find_src_root(&files, &self.host.exec_prefix, self.cwd)?;

        let load_path = src_load_path
            .iter()
            .map(|lp| {
                let relative = lp.relative_path_from(&src_prefix);
                if relative.as_str() == "." {
                    tempdir_path(SRCDIR)
                } else {
                    tempdir_path(SRCDIR).join(relative)
                }
            })
            .collect();

        Ok(LayoutPlan {
            src_prefix,
            src_files,
            libs,
            load_path,
        })
    }

    /// Target of a file selected from a gem.
    pub fn place_gem_file(&self, file: &Pathname) -> Result<Pathname> {
        self.installation_target(file)
            .ok_or_else(|| anyhow!("Don't know where to put gem file {}", file))
    }

    /// Target of a gemspec file.
    pub fn place_gemspec(&self, spec_file: &Pathname) -> Result<Pathname> {
        self.installation_target(spec_file).ok_or_else(|| {
            anyhow!(
                "Gem spec {} does not exist in the Ruby installation. Don't know where to put it.",
                spec_file
            )
        })
    }
}
