// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
The packaging pipeline.

A build probes the application under Ruby, plans what goes where in the
extraction directory and then writes the executable (or installer).
*/

use {
    crate::{
        builder::{ContainerBuilder, ContainerSettings, IconPatch},
        environment::{default_tempdir, EnvironmentSnapshot},
        inno::create_installer,
        library_detector::detect_dlls,
        options::BuildOptions,
        ruby_probe::{find_ruby, ProbeReport, ProbeRequest},
        stubs::StubImages,
    },
    anyhow::{anyhow, Result},
    itertools::Itertools,
    log::info,
    ruby_packaging::{
        filesystem_scanning::{find_core_library_files, find_encoding_files, find_manifest_files},
        gem_resolver::{GemResolver, SELF_GEM_NAME},
        host::HostFacts,
        layout::{tempdir_path, LayoutPlanner, BINDIR, GEMHOMEDIR},
        load_path::find_load_path,
        pathname::{sort_uniq, Pathname},
    },
    std::collections::HashSet,
};

/// Evaluated by `require` but never listed among loaded features.
const KERNEL_REQUIRE_FEATURE: &str = "rubygems/core_ext/kernel_require.rb";

/// Something to materialize in the extraction directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageEntry {
    Directory(Pathname),
    File { source: Pathname, target: Pathname },
}

/// Everything needed to write the executable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackagePlan {
    pub executable: Pathname,
    pub windowed: bool,
    /// Entries in emission order.
    pub entries: Vec<PackageEntry>,
    /// Environment variables set before launch.
    pub environment: Vec<(String, String)>,
    pub launch_image: Pathname,
    pub launch_command: String,
}

/// Quote arguments for the launch command line.
fn quote_arguments(args: &[String]) -> String {
    args.iter()
        .map(|arg| format!(" \"{}\"", arg.replace('"', "\\\"")))
        .collect()
}

fn resolve_absolute(load_paths: &[Pathname], feature: &Pathname) -> Option<Pathname> {
    if feature.is_absolute() {
        Some(feature.clone())
    } else {
        find_load_path(load_paths, feature).map(|lp| lp.join(feature))
    }
}

/// State of a single build once the application has been probed.
pub struct BuildSession<'a> {
    pub options: &'a BuildOptions,
    pub host: HostFacts,
    pub report: ProbeReport,
    /// Directory the build was started from.
    pub cwd: Pathname,
    /// `RUBYOPT` of the build environment.
    pub rubyopt: Option<String>,
}

impl<'a> BuildSession<'a> {
    fn is_fenced(&self, gem_name: &str) -> bool {
        !self.options.allow_self && gem_name == SELF_GEM_NAME
    }

    /// Decide the content and layout of the package.
    pub fn plan(&self) -> Result<PackagePlan> {
        let options = self.options;
        let host = &self.host;

        let load_paths = self.report.load_path_after();
        let added_load_paths = self.report.added_load_paths();
        let working_dir = self.report.working_directory();
        let gem_paths = self.report.gem_paths();

        let mut features = self.report.features();
        features.push(Pathname::new(KERNEL_REQUIRE_FEATURE));

        let mut gemspecs = self
            .report
            .loaded_gemspec_files()
            .into_iter()
            .filter(|(name, _)| !self.is_fenced(name))
            .map(|(_, path)| path)
            .collect::<Vec<_>>();

        let catalog = self.report.catalog();
        let resolution = GemResolver::new(
            &load_paths,
            &gem_paths,
            &options.gem_directives,
            &catalog,
        )
        .allow_self(options.allow_self)
        .resolve(&features, self.report.activated_gems())?;

        let from_gems = resolution
            .features_from_gems
            .iter()
            .chain(resolution.fenced_features.iter())
            .collect::<HashSet<_>>();
        features.retain(|feature| {
            resolve_absolute(&load_paths, feature)
                .map(|path| !from_gems.contains(&path))
                .unwrap_or(true)
        });
        gemspecs.extend(resolution.gemspecs.iter().cloned());

        if options.enc {
            let encodings = find_encoding_files(&load_paths, &host.exec_prefix)?;
            if !encodings.is_empty() {
                let mut size = 0;
                for file in &encodings {
                    size += file.file_size()?;
                }
                info!(
                    "Including {} encoding support files ({} bytes, use --no-enc to exclude)",
                    encodings.len(),
                    size
                );
            }
            features.extend(encodings);
        } else {
            info!("Not including encoding support files");
        }

        let planner = LayoutPlanner::new(
            host,
            &load_paths,
            &added_load_paths,
            &gem_paths,
            &working_dir,
            &self.cwd,
        );
        let layout = planner.plan(&options.files, &features)?;

        let mut libs = layout.libs.clone();
        for file in &resolution.gem_files {
            libs.push((file.clone(), planner.place_gem_file(file)?));
        }

        if options.add_all_core {
            info!("Will include all ruby core libraries");
            libs.extend(find_core_library_files(&self.report.load_path_before())?);
        }

        let windowed = options.windowed();
        let ruby_exe = if windowed {
            host.rubyw_exe()
        } else {
            host.ruby_exe()
        };

        let dlls = if options.autodll {
            let mut roots = vec![host.bindir.join(ruby_exe.as_str())];
            if let Some(libruby) = &host.libruby_so {
                roots.push(host.bindir.join(libruby.as_str()));
            }
            roots.extend(
                features
                    .iter()
                    .filter(|f| f.has_extension(".so"))
                    .filter_map(|f| resolve_absolute(&load_paths, f)),
            );

            detect_dlls(host, &roots)?
        } else {
            vec![]
        };

        let manifests = find_manifest_files(&host.exec_prefix)?;

        let executable = options.output_file()?;
        info!("Building {}", executable);

        let mut entries = vec![];
        let file = |source: Pathname, target: Pathname| PackageEntry::File { source, target };

        info!("Adding user-supplied source files");
        let mut target_script = None;
        for (source, target) in layout.source_files(&host.exec_prefix) {
            if target_script.is_none() {
                target_script = Some(target.clone());
            }

            if source.is_dir() {
                entries.push(PackageEntry::Directory(target));
            } else {
                entries.push(file(source, target));
            }
        }
        let target_script =
            target_script.ok_or_else(|| anyhow!("No script files specified"))?;

        info!("Adding ruby executable {}", ruby_exe);
        entries.push(file(
            host.bindir.join(ruby_exe.as_str()),
            Pathname::new(BINDIR).join(ruby_exe.as_str()),
        ));
        if let Some(libruby) = &host.libruby_so {
            entries.push(file(
                host.bindir.join(libruby.as_str()),
                Pathname::new(BINDIR).join(libruby.as_str()),
            ));
        }

        for dll in dlls {
            info!("Adding detected DLL {}", dll);
            let target = if dll.is_subpath_of(&host.exec_prefix) {
                dll.relative_path_from(&host.exec_prefix)
            } else {
                Pathname::new(BINDIR).join(dll.basename())
            };
            entries.push(file(dll, target));
        }

        for manifest in manifests {
            info!("Adding external manifest {}", manifest);
            let target = manifest.relative_path_from(&host.exec_prefix);
            entries.push(file(manifest, target));
        }

        for dll in &options.extra_dlls {
            info!("Adding supplied DLL {}", dll);
            entries.push(file(
                host.bindir.join(dll.as_str()),
                Pathname::new(BINDIR).join(dll.as_str()),
            ));
        }

        for gemspec in sort_uniq(gemspecs) {
            let target = planner.place_gemspec(&gemspec)?;
            entries.push(file(gemspec, target));
        }

        info!("Adding library files");
        for (source, target) in libs {
            entries.push(file(source, target));
        }

        let rubylib = layout
            .load_path
            .iter()
            .map(|lp| lp.to_native())
            .unique()
            .join(";");

        let environment = vec![
            (
                "RUBYOPT".to_string(),
                self.rubyopt.clone().unwrap_or_default(),
            ),
            ("RUBYLIB".to_string(), rubylib),
            (
                "GEM_PATH".to_string(),
                tempdir_path(GEMHOMEDIR).to_native(),
            ),
        ];

        let launch_command = format!(
            "{} \"{}\"{}",
            ruby_exe,
            tempdir_path(&target_script).to_native(),
            quote_arguments(&options.script_args)
        );

        Ok(PackagePlan {
            executable,
            windowed,
            entries,
            environment,
            launch_image: tempdir_path(BINDIR).join(ruby_exe.as_str()),
            launch_command,
        })
    }
}

/// Write the planned package using the given stub images.
pub fn write_package(plan: &PackagePlan, options: &BuildOptions, stubs: &StubImages) -> Result<()> {
    let stub = stubs.stub_image(plan.windowed)?;

    let mut builder = ContainerBuilder::new(ContainerSettings {
        compress: options.compress(),
        debug: options.debug,
        installer: options.inno_script.is_some(),
        install_directory: options.install_directory_flags(),
    })?;

    for entry in &plan.entries {
        match entry {
            PackageEntry::Directory(path) => builder.ensure_directory(path)?,
            PackageEntry::File { source, target } => builder.create_file(source, target)?,
        }
    }

    for (name, value) in &plan.environment {
        builder.set_env(name, value)?;
    }

    builder.post_create_process(&plan.launch_image, &plan.launch_command)?;

    let icon = options.icon.as_ref().map(|icon| IconPatch {
        editor: stubs.icon_editor(),
        icon: icon.clone(),
    });

    let directories = builder.directories().to_vec();
    let files = builder.files().to_vec();

    let size = builder.write_executable(&plan.executable, &stub, icon.as_ref())?;

    if let Some(script) = &options.inno_script {
        return create_installer(
            script,
            &plan.executable,
            &directories,
            &files,
            options.log.verbose,
        );
    }

    info!("Finished building {} ({} bytes)", plan.executable, size);

    Ok(())
}

/// Package an application.
///
/// `environment` is the state of the process before anything was changed;
/// the application is probed and the package assembled within it.
pub fn build_application(options: &BuildOptions, environment: &EnvironmentSnapshot) -> Result<()> {
    let stubs = StubImages::locate(options.stub_dir.as_deref(), environment)?;

    let request = ProbeRequest {
        ruby: find_ruby()?,
        script: options.main_script()?.clone(),
        args: options.script_args.clone(),
        run_script: options.run_script,
        load_autoload: options.load_autoload,
        gemfile: options.gemfile.clone(),
    };
    let report = request.run(environment)?;

    environment.restore()?;

    let session = BuildSession {
        options,
        host: HostFacts::from_rbconfig(&report.rbconfig, default_tempdir())?,
        report,
        cwd: Pathname::from(environment.cwd()),
        rubyopt: environment.var("RUBYOPT"),
    };

    let plan = session.plan()?;

    write_package(&plan, options, &stubs)
}
