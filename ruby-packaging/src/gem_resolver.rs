// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Attribution of loaded features to installed gems.

Features loaded from a gem are not packaged individually. Instead the
gem is recorded and its files are selected according to the gem policy,
so that data files and lazily loaded scripts come along.
*/

use {
    crate::{
        gem::{GemSpec, SpecificationSource},
        load_path::find_load_path,
        pathname::{sort_uniq, Pathname},
        policy::{resolve_gem_contents, GemContent, GemDirective},
    },
    anyhow::Result,
    log::{info, warn},
    once_cell::sync::Lazy,
    regex::Regex,
    std::collections::{BTreeSet, HashSet},
};

/// Name of the gem providing the packager itself.
pub const SELF_GEM_NAME: &str = "aibika";

/// Marker written by rubygems after compiling a native extension.
pub const BUILD_COMPLETE_FILE: &str = "gem.build_complete";

const GEM_SCRIPT_PATTERN: &str = r"\.rbw?$";

const GEM_EXTRA_PATTERN: &str = r"(?xi)
    # Auxiliary files in the root of the gem.
    ^(\./)?(History|Install|Manifest|README|CHANGES|Licen[sc]e|Contributors|ChangeLog|BSD|GPL).*$
    # Installation and build scripts.
    | ^(\./)?(Rakefile|setup\.rb|extconf\.rb)$
    # Documentation, sources, examples and tests.
    | ^(\./)?(doc|ext|examples|test|tests|benchmarks|spec)/
    # Version control metadata.
    | (^|/)(\.autotest|\.svn|\.cvs|\.git)(/|$)
    # Compiler inputs and intermediates.
    | \.(rdoc|c|cpp|c\+\+|cxx|h|hxx|hpp|obj|o|a)$
";

pub static GEM_SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(GEM_SCRIPT_PATTERN).unwrap());

pub static GEM_EXTRA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(GEM_EXTRA_PATTERN).unwrap());

/// Content that is neither a script nor an extra.
static GEM_NON_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?:{})|(?:{})", GEM_EXTRA_PATTERN, GEM_SCRIPT_PATTERN)).unwrap()
});

/// A gem selected for packaging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedGem {
    pub spec: GemSpec,
    pub contents: BTreeSet<GemContent>,
    /// Files selected from the gem that exist on disk.
    pub files: Vec<Pathname>,
}

/// Result of attributing features to gems.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GemResolution {
    pub gems: Vec<ResolvedGem>,
    /// All files to package from gems, sorted and unique.
    pub gem_files: Vec<Pathname>,
    /// Loaded features that are among `gem_files`.
    ///
    /// These are packaged as gem files and must not be packaged again as
    /// regular features.
    pub features_from_gems: Vec<Pathname>,
    /// Loaded features belonging to the packager's own gem.
    pub fenced_features: Vec<Pathname>,
    /// Gemspec files to package.
    pub gemspecs: Vec<Pathname>,
}

/// Decides which files of which gems get packaged.
pub struct GemResolver<'a> {
    load_paths: &'a [Pathname],
    gem_paths: &'a [Pathname],
    directives: &'a [GemDirective],
    specifications: &'a dyn SpecificationSource,
    allow_self: bool,
}

impl<'a> GemResolver<'a> {
    pub fn new(
        load_paths: &'a [Pathname],
        gem_paths: &'a [Pathname],
        directives: &'a [GemDirective],
        specifications: &'a dyn SpecificationSource,
    ) -> Self {
        Self {
            load_paths,
            gem_paths,
            directives,
            specifications,
            allow_self: false,
        }
    }

    /// Permit packaging the packager's own gem.
    pub fn allow_self(mut self, allow: bool) -> Self {
        self.allow_self = allow;
        self
    }

    fn is_fenced(&self, spec: &GemSpec) -> bool {
        !self.allow_self && spec.name == SELF_GEM_NAME
    }

    /// Attribute `features` to gems and select gem files.
    ///
    /// `known_gems` are gems activated by the application or its Gemfile;
    /// they are packaged even if none of their features were loaded.
    pub fn resolve(
        &self,
        features: &[Pathname],
        known_gems: impl IntoIterator<Item = GemSpec>,
    ) -> Result<GemResolution> {
        let mut gems: Vec<GemSpec> = vec![];
        let mut seen_names = HashSet::new();

        let mut register = |gems: &mut Vec<GemSpec>, spec: GemSpec| {
            if !self.is_fenced(&spec) && seen_names.insert(spec.name.clone()) {
                gems.push(spec);
            }
        };

        let mut fenced_dirs = vec![];
        for spec in known_gems {
            if self.is_fenced(&spec) {
                fenced_dirs.push(spec.gem_dir.clone());
            }
            register(&mut gems, spec);
        }

        let mut attributed = vec![];
        let mut fenced_features = vec![];

        for feature in features {
            let feature = if feature.is_absolute() {
                feature.clone()
            } else {
                match find_load_path(self.load_paths, feature) {
                    Some(load_path) => load_path.join(feature),
                    None => continue,
                }
            };

            if gems.iter().any(|gem| feature.is_subpath_of(&gem.gem_dir)) {
                attributed.push(feature);
                continue;
            }

            if fenced_dirs.iter().any(|dir| feature.is_subpath_of(dir)) {
                fenced_features.push(feature);
                continue;
            }

            for gem_path in self.gem_paths {
                let install_dir = gem_path.join("gems");
                if !feature.is_subpath_of(&install_dir) {
                    continue;
                }

                let relative = feature.relative_path_from(&install_dir);
                let full_name = match relative.segments().first() {
                    Some(name) => name.to_string(),
                    None => continue,
                };

                let spec_file = gem_path
                    .join("specifications")
                    .join(format!("{}.gemspec", full_name));

                match self.specifications.load_specification(&spec_file) {
                    Some(spec) if self.is_fenced(&spec) => {
                        fenced_features.push(feature.clone());
                    }
                    Some(spec) => {
                        register(&mut gems, spec);
                        attributed.push(feature.clone());
                    }
                    None => {
                        warn!("Failed to load gemspec for '{}'", full_name);
                    }
                }

                break;
            }
        }

        let mut res = GemResolution::default();

        for spec in gems {
            if spec.spec_file.is_file() {
                res.gemspecs.push(spec.spec_file.clone());
            } else {
                let default_spec = spec.default_spec_file();
                if default_spec.is_file() {
                    info!(
                        "Using default specification {} for gem {}",
                        default_spec, spec.full_name
                    );
                    res.gemspecs.push(default_spec);
                }
            }

            let contents = resolve_gem_contents(self.directives, &spec.name);
            info!(
                "Detected gem {} ({})",
                spec.full_name,
                itertools::join(contents.iter(), ", ")
            );

            if !spec.gem_dir.is_dir() {
                warn!(
                    "Gem {} root folder was not found, skipping",
                    spec.full_name
                );
                continue;
            }

            let files = self.select_gem_files(&spec, &contents, &attributed)?;

            let mut total_size = 0;
            for file in &files {
                total_size += file.file_size()?;
            }
            info!("\t{} files, {} bytes", files.len(), total_size);

            res.gem_files.extend(files.iter().cloned());
            res.gems.push(ResolvedGem {
                spec,
                contents,
                files,
            });
        }

        res.gem_files = sort_uniq(res.gem_files);

        let packaged = res.gem_files.iter().collect::<HashSet<_>>();
        res.features_from_gems = attributed
            .into_iter()
            .filter(|f| packaged.contains(f))
            .collect();
        res.fenced_features = fenced_features;

        Ok(res)
    }

    fn select_gem_files(
        &self,
        spec: &GemSpec,
        contents: &BTreeSet<GemContent>,
        attributed: &[Pathname],
    ) -> Result<Vec<Pathname>> {
        let mut gem_root_files: Option<Vec<Pathname>> = None;
        let mut candidates = vec![];

        for content in contents {
            if matches!(
                content,
                GemContent::Files | GemContent::Extras | GemContent::Scripts
            ) && gem_root_files.is_none()
            {
                gem_root_files = Some(spec.gem_dir.find_all_files(|_| true)?);
            }

            let matching = |re: &Regex, expected: bool| -> Vec<Pathname> {
                gem_root_files
                    .iter()
                    .flatten()
                    .filter(|path| {
                        re.is_match(path.relative_path_from(&spec.gem_dir).as_str()) == expected
                    })
                    .cloned()
                    .collect()
            };

            match content {
                GemContent::Spec => {
                    candidates.extend(spec.files.iter().map(|f| spec.gem_dir.join(f.as_str())));
                }
                GemContent::Loaded => {
                    candidates.extend(
                        attributed
                            .iter()
                            .filter(|f| f.is_subpath_of(&spec.gem_dir))
                            .cloned(),
                    );
                }
                GemContent::Files => {
                    candidates.extend(matching(&GEM_NON_FILE_RE, false));
                    candidates.extend(find_build_complete_files(spec)?);
                }
                GemContent::Extras => {
                    candidates.extend(matching(&GEM_EXTRA_RE, true));
                }
                GemContent::Scripts => {
                    candidates.extend(matching(&GEM_SCRIPT_RE, true));
                }
            }
        }

        let mut files = vec![];
        for candidate in candidates {
            if candidate.is_file() {
                files.push(candidate);
            } else {
                warn!("{} was not found", candidate);
            }
        }

        Ok(files)
    }
}

/// Find extension build markers belonging to a gem.
pub fn find_build_complete_files(spec: &GemSpec) -> Result<Vec<Pathname>> {
    let extensions = spec.extensions_dir();
    if !extensions.is_dir() {
        return Ok(vec![]);
    }

    Ok(extensions
        .find_all_files(|name| name == BUILD_COMPLETE_FILE)?
        .into_iter()
        .filter(|path| path.dirname().file_name() == spec.full_name)
        .collect())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{gem::GemCatalog, testutil::*},
    };

    #[test]
    fn extra_and_script_patterns() {
        for extra in [
            "README.md",
            "LICENSE.txt",
            "History.rdoc",
            "Rakefile",
            "ext/foo/foo.c",
            "test/test_foo.rb",
            "lib/.git/config",
            "lib/foo.h",
            "lib/x.a",
        ] {
            assert!(GEM_EXTRA_RE.is_match(extra), "{}", extra);
        }

        for file in ["lib/foo.rb", "lib/README", "data/table.dat", "lib/foo.so"] {
            assert!(!GEM_EXTRA_RE.is_match(file), "{}", file);
        }

        assert!(GEM_SCRIPT_RE.is_match("lib/foo.rb"));
        assert!(GEM_SCRIPT_RE.is_match("bin/gui.rbw"));
        assert!(!GEM_SCRIPT_RE.is_match("lib/foo.rbx"));

        assert!(GEM_NON_FILE_RE.is_match("lib/foo.rb"));
        assert!(GEM_NON_FILE_RE.is_match("README"));
        assert!(!GEM_NON_FILE_RE.is_match("data/table.dat"));
    }

    #[test]
    fn loaded_gem_default_policy() -> Result<()> {
        let fixture = GemFixture::new()?;
        let spec = fixture.install_gem(
            "rake",
            "13.0.6",
            &[
                "lib/rake.rb",
                "lib/rake/task.rb",
                "lib/rake/data.yml",
                "README.rdoc",
                "test/test_rake.rb",
            ],
        )?;
        let catalog = vec![spec.clone()].into_iter().collect::<GemCatalog>();

        let load_paths = vec![spec.gem_dir.join("lib")];
        let gem_paths = vec![fixture.gem_home.clone()];
        let resolver = GemResolver::new(&load_paths, &gem_paths, &[], &catalog);

        let res = resolver.resolve(&[spec.gem_dir.join("lib/rake.rb")], vec![])?;

        assert_eq!(res.gems.len(), 1);
        assert_eq!(
            res.gem_files
                .iter()
                .map(|p| p.relative_path_from(&spec.gem_dir).to_posix())
                .collect::<Vec<_>>(),
            vec!["lib/rake.rb", "lib/rake/data.yml"]
        );
        assert_eq!(res.features_from_gems, vec![spec.gem_dir.join("lib/rake.rb")]);
        assert_eq!(res.gemspecs, vec![spec.spec_file.clone()]);

        Ok(())
    }

    #[test]
    fn minimal_policy_excludes_unloaded_files() -> Result<()> {
        let fixture = GemFixture::new()?;
        let spec = fixture.install_gem("foo", "1.0", &["lib/foo.rb", "lib/foo/extra.rb"])?;
        let catalog = vec![spec.clone()].into_iter().collect::<GemCatalog>();

        let load_paths = vec![spec.gem_dir.join("lib")];
        let gem_paths = vec![fixture.gem_home.clone()];
        let directives = vec![GemDirective::try_from("--gem-minimal=foo")?];
        let resolver = GemResolver::new(&load_paths, &gem_paths, &directives, &catalog);

        // A relative feature resolves through the load path.
        let res = resolver.resolve(&[Pathname::new("foo.rb")], vec![])?;

        assert_eq!(res.gem_files, vec![spec.gem_dir.join("lib/foo.rb")]);

        Ok(())
    }

    #[test]
    fn spec_policy_leaves_undeclared_loaded_files_as_features() -> Result<()> {
        let fixture = GemFixture::new()?;
        let mut spec = fixture.install_gem("rake", "13.0.6", &["lib/rake.rb", "lib/rake/other.rb"])?;
        spec.files = vec!["lib/rake/other.rb".to_string()];
        let catalog = vec![spec.clone()].into_iter().collect::<GemCatalog>();

        let load_paths = vec![spec.gem_dir.join("lib")];
        let gem_paths = vec![fixture.gem_home.clone()];
        let directives = vec![GemDirective::try_from("--gem-spec")?];
        let resolver = GemResolver::new(&load_paths, &gem_paths, &directives, &catalog);

        let loaded = spec.gem_dir.join("lib/rake.rb");
        let declared = spec.gem_dir.join("lib/rake/other.rb");
        let res = resolver.resolve(&[loaded.clone(), declared.clone()], vec![])?;

        assert_eq!(res.gem_files, vec![declared.clone()]);
        // Only loaded files inside the gem file set are accounted for.
        assert_eq!(res.features_from_gems, vec![declared]);
        assert!(!res.features_from_gems.contains(&loaded));

        Ok(())
    }

    #[test]
    fn full_policy_and_missing_spec_files() -> Result<()> {
        let fixture = GemFixture::new()?;
        let mut spec = fixture.install_gem("bar", "2.0", &["lib/bar.rb", "README", "ext/bar.c"])?;
        spec.files = vec!["lib/bar.rb".to_string(), "lib/missing.rb".to_string()];

        let load_paths: Vec<Pathname> = vec![];
        let gem_paths = vec![fixture.gem_home.clone()];
        let directives = vec![
            GemDirective::try_from("--gem-full")?,
            GemDirective::try_from("--gem-spec=other")?,
        ];
        let catalog = GemCatalog::new();
        let resolver = GemResolver::new(&load_paths, &gem_paths, &directives, &catalog);

        let res = resolver.resolve(&[], vec![spec.clone()])?;
        assert_eq!(res.gem_files.len(), 3);

        let directives = vec![GemDirective::try_from("--gem-spec")?];
        let resolver = GemResolver::new(&load_paths, &gem_paths, &directives, &catalog);
        let res = resolver.resolve(&[], vec![spec.clone()])?;
        assert_eq!(res.gem_files, vec![spec.gem_dir.join("lib/bar.rb")]);

        Ok(())
    }

    #[test]
    fn self_gem_is_fenced() -> Result<()> {
        let fixture = GemFixture::new()?;
        let spec = fixture.install_gem(SELF_GEM_NAME, "1.0", &["lib/aibika.rb"])?;
        let catalog = vec![spec.clone()].into_iter().collect::<GemCatalog>();

        let load_paths = vec![spec.gem_dir.join("lib")];
        let gem_paths = vec![fixture.gem_home.clone()];
        let feature = spec.gem_dir.join("lib/aibika.rb");

        let resolver = GemResolver::new(&load_paths, &gem_paths, &[], &catalog);
        let res = resolver.resolve(&[feature.clone()], vec![spec.clone()])?;
        assert!(res.gems.is_empty());
        assert!(res.gem_files.is_empty());
        assert!(res.features_from_gems.is_empty());
        assert_eq!(res.fenced_features, vec![feature.clone()]);

        let resolver = resolver.allow_self(true);
        let res = resolver.resolve(&[feature.clone()], vec![])?;
        assert_eq!(res.gems.len(), 1);
        assert!(res.fenced_features.is_empty());
        assert_eq!(res.features_from_gems, vec![feature]);

        Ok(())
    }

    #[test]
    fn missing_gem_dir_and_default_spec() -> Result<()> {
        let fixture = GemFixture::new()?;
        let spec = fixture.install_gem("gone", "0.1", &["lib/gone.rb"])?;

        std::fs::remove_dir_all(spec.gem_dir.to_path_buf())?;
        std::fs::remove_file(spec.spec_file.to_path_buf())?;
        let default_spec = spec.default_spec_file();
        std::fs::create_dir_all(default_spec.dirname().to_path_buf())?;
        std::fs::write(default_spec.to_path_buf(), b"")?;

        let catalog = GemCatalog::new();
        let gem_paths = vec![fixture.gem_home.clone()];
        let resolver = GemResolver::new(&[], &gem_paths, &[], &catalog);
        let res = resolver.resolve(&[], vec![spec])?;

        assert!(res.gems.is_empty());
        assert_eq!(res.gemspecs, vec![default_spec]);

        Ok(())
    }

    #[test]
    fn build_complete_markers() -> Result<()> {
        let fixture = GemFixture::new()?;
        let spec = fixture.install_gem("nokogiri", "1.15.0", &["lib/nokogiri.rb"])?;

        let marker_dir = fixture
            .gem_home
            .join("extensions/x64-mingw-ucrt/3.2.0/nokogiri-1.15.0");
        let other_dir = fixture
            .gem_home
            .join("extensions/x64-mingw-ucrt/3.2.0/json-2.6.3");
        for dir in [&marker_dir, &other_dir] {
            std::fs::create_dir_all(dir.to_path_buf())?;
            std::fs::write(dir.join(BUILD_COMPLETE_FILE).to_path_buf(), b"")?;
        }

        assert_eq!(
            find_build_complete_files(&spec)?,
            vec![marker_dir.join(BUILD_COMPLETE_FILE)]
        );

        Ok(())
    }

    #[test]
    fn unknown_gemspec_is_skipped() -> Result<()> {
        let fixture = GemFixture::new()?;
        let spec = fixture.install_gem("orphan", "1.0", &["lib/orphan.rb"])?;

        let catalog = GemCatalog::new();
        let gem_paths = vec![fixture.gem_home.clone()];
        let resolver = GemResolver::new(&[], &gem_paths, &[], &catalog);
        let res = resolver.resolve(&[spec.gem_dir.join("lib/orphan.rb")], vec![])?;

        assert!(res.gems.is_empty());
        assert!(res.features_from_gems.is_empty());

        Ok(())
    }
}
