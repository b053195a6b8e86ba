// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        environment::{EnvironmentSnapshot, AIBIKA_VERSION},
        logging::{init_logging, LogSettings},
        options::BuildOptions,
        project_building::build_application,
    },
    anyhow::{anyhow, Context, Result},
    clap::{Arg, ArgAction, ArgMatches, Command},
    ruby_packaging::{pathname::Pathname, policy::GemDirective},
    std::path::PathBuf,
};

const USAGE: &str = "aibika [options] script.rb [-- script arguments]";

const GEM_MODES_HELP: &str = "Gem content detection modes:

  --gem-minimal[=gem1,..]  Include only loaded scripts
  --gem-guess[=gem1,..]    Include loaded scripts & best guess (DEFAULT)
  --gem-all[=gem1,..]      Include all scripts & files
  --gem-full[=gem1,..]     Include EVERYTHING
  --gem-spec[=gem1,..]     Include files in gemspec

  --[no-]gem-scripts[=..]  Other script files than those loaded
  --[no-]gem-files[=..]    Other files (e.g. data files)
  --[no-]gem-extras[=..]   Extra files (README, etc.)

    scripts: .rb/.rbw files
    extras: C/C++ sources, object files, test, spec, README
    files: all other files";

/// Gem directive flags, by argument id and command line spelling.
const GEM_DIRECTIVE_FLAGS: &[(&str, &str)] = &[
    ("gem_minimal", "gem-minimal"),
    ("gem_guess", "gem-guess"),
    ("gem_all", "gem-all"),
    ("gem_full", "gem-full"),
    ("gem_spec", "gem-spec"),
    ("gem_scripts", "gem-scripts"),
    ("gem_files", "gem-files"),
    ("gem_extras", "gem-extras"),
    ("no_gem_scripts", "no-gem-scripts"),
    ("no_gem_files", "no-gem-files"),
    ("no_gem_extras", "no-gem-extras"),
];

fn flag(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(long).action(ArgAction::SetTrue).help(help)
}

/// A `--x`/`--no-x` pair where the last occurrence wins.
fn toggle(id: &'static str, long: &'static str, help: &'static str, no_help: &'static str) -> [Arg; 2] {
    let no_id = format!("no_{}", id);
    [
        flag(id, long, help).overrides_with(no_id.clone()),
        Arg::new(no_id)
            .long(format!("no-{}", long))
            .action(ArgAction::SetTrue)
            .overrides_with(id)
            .help(no_help),
    ]
}

fn file_arg(id: &'static str, long: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .action(ArgAction::Set)
        .value_name(value_name)
        .help(help)
}

/// The command line definition.
pub fn command() -> Command {
    let app = Command::new("aibika")
        .override_usage(USAGE)
        .about("Package Ruby applications as self-extracting Windows executables")
        .after_help(GEM_MODES_HELP)
        .disable_version_flag(true)
        .arg(flag("quiet", "quiet", "Suppress output while building executable"))
        .arg(flag("verbose", "verbose", "Show extra output while building executable"))
        .arg(flag("no_warnings", "no-warnings", "Do not show warnings"))
        .arg(flag("version", "version", "Display version number and exit"))
        .arg(
            Arg::new("dll")
                .long("dll")
                .action(ArgAction::Append)
                .value_name("DLLNAME")
                .help("Include additional DLLs from the Ruby bindir"),
        )
        .arg(flag(
            "add_all_core",
            "add-all-core",
            "Add all core ruby libraries to the executable",
        ))
        .arg(file_arg(
            "gemfile",
            "gemfile",
            "FILE",
            "Add all gems and dependencies listed in a Bundler Gemfile",
        ))
        .args(toggle(
            "enc",
            "enc",
            "Include encoding support files (default)",
            "Exclude encoding support files",
        ))
        .arg(flag(
            "allow_self",
            "allow-self",
            "Include self (aibika gem) if detected or specified",
        ))
        .arg(flag(
            "no_dep_run",
            "no-dep-run",
            "Don't run script.rb to check for dependencies",
        ))
        .arg(flag(
            "no_autoload",
            "no-autoload",
            "Don't load/include script.rb's autoloads",
        ))
        .arg(flag(
            "no_autodll",
            "no-autodll",
            "Disable detection of runtime DLL dependencies",
        ))
        .arg(file_arg(
            "output",
            "output",
            "FILE",
            "Name the exe to generate. Defaults to ./<scriptname>.exe",
        ))
        .args(toggle(
            "lzma",
            "lzma",
            "Compress the executable with LZMA (default)",
            "Disable LZMA compression of the executable",
        ))
        .arg(file_arg(
            "innosetup",
            "innosetup",
            "FILE",
            "Use given Inno Setup script (.iss) to create an installer",
        ))
        .arg(flag("windows", "windows", "Force Windows application (rubyw.exe)"))
        .arg(flag("console", "console", "Force console application (ruby.exe)"))
        .arg(flag(
            "chdir_first",
            "chdir-first",
            "When exe starts, change working directory to app dir",
        ))
        .arg(file_arg("icon", "icon", "ICO", "Replace icon with a custom one"))
        .arg(flag("debug", "debug", "Executable will be verbose"))
        .arg(flag(
            "debug_extract",
            "debug-extract",
            "Executable will unpack to local dir and not delete after",
        ))
        .arg(
            Arg::new("stub_dir")
                .long("stub-dir")
                .action(ArgAction::Set)
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory containing stub.exe, stubw.exe and edicon.exe"),
        );

    let app = GEM_DIRECTIVE_FLAGS.iter().fold(app, |app, (id, long)| {
        app.arg(
            Arg::new(*id)
                .long(*long)
                .action(ArgAction::Append)
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("")
                .value_name("GEMS")
                .hide(true),
        )
    });

    app.arg(
        Arg::new("files")
            .action(ArgAction::Append)
            .value_name("FILE")
            .num_args(0..)
            .help("Scripts, directories and glob patterns to package"),
    )
    .arg(
        Arg::new("script_args")
            .action(ArgAction::Append)
            .value_name("ARGS")
            .num_args(0..)
            .last(true)
            .allow_hyphen_values(true)
            .help("Arguments passed to the script when probing and at launch"),
    )
}

/// Collect gem directives in the order they appeared on the command line.
fn gem_directives(matches: &ArgMatches) -> Result<Vec<GemDirective>> {
    let mut indexed = vec![];

    for (id, long) in GEM_DIRECTIVE_FLAGS {
        let (indices, values) = match (matches.indices_of(id), matches.get_many::<String>(id)) {
            (Some(indices), Some(values)) => (indices, values),
            _ => continue,
        };

        for (index, names) in indices.zip(values) {
            let spelling = if names.is_empty() {
                format!("--{}", long)
            } else {
                format!("--{}={}", long, names)
            };
            indexed.push((index, GemDirective::try_from(spelling.as_str())?));
        }
    }

    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, directive)| directive).collect())
}

fn optional_path(matches: &ArgMatches, id: &str) -> Option<Pathname> {
    matches.get_one::<String>(id).map(Pathname::new)
}

/// Convert parsed arguments into build options.
///
/// Files are kept as given; see [expand_files].
pub fn options_from_matches(matches: &ArgMatches) -> Result<BuildOptions> {
    let options = BuildOptions {
        files: matches
            .get_many::<String>("files")
            .unwrap_or_default()
            .map(Pathname::new)
            .collect(),
        script_args: matches
            .get_many::<String>("script_args")
            .unwrap_or_default()
            .cloned()
            .collect(),
        lzma: !matches.get_flag("no_lzma"),
        run_script: !matches.get_flag("no_dep_run"),
        load_autoload: !matches.get_flag("no_autoload"),
        add_all_core: matches.get_flag("add_all_core"),
        output_override: optional_path(matches, "output"),
        extra_dlls: matches
            .get_many::<String>("dll")
            .unwrap_or_default()
            .cloned()
            .collect(),
        log: LogSettings {
            quiet: matches.get_flag("quiet"),
            verbose: matches.get_flag("verbose"),
            show_warnings: !matches.get_flag("no_warnings"),
        },
        force_windows: matches.get_flag("windows"),
        force_console: matches.get_flag("console"),
        chdir_first: matches.get_flag("chdir_first"),
        icon: optional_path(matches, "icon"),
        gemfile: optional_path(matches, "gemfile"),
        inno_script: optional_path(matches, "innosetup"),
        autodll: !matches.get_flag("no_autodll"),
        debug: matches.get_flag("debug"),
        debug_extract: matches.get_flag("debug_extract"),
        enc: !matches.get_flag("no_enc"),
        allow_self: matches.get_flag("allow_self"),
        gem_directives: gem_directives(matches)?,
        stub_dir: matches.get_one::<PathBuf>("stub_dir").cloned(),
    };

    Ok(options)
}

/// Expand file arguments into absolute paths.
///
/// Directories expand to everything below them and arguments are treated
/// as glob patterns. An argument matching nothing is an error.
pub fn expand_files(files: &[Pathname], cwd: &Pathname) -> Result<Vec<Pathname>> {
    let mut res = vec![];

    for file in files {
        let mut pattern = file.to_posix();
        if file.is_dir() {
            pattern = format!("{}/**/*", pattern);
        }

        let mut matched = glob::glob(&pattern)
            .with_context(|| format!("parsing file pattern {}", pattern))?
            .map(|entry| entry.map(|path| Pathname::from(path).expand_from(cwd)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("expanding {}", pattern))?;

        if matched.is_empty() {
            return Err(anyhow!("{} not found!", pattern));
        }

        res.append(&mut matched);
    }

    Ok(res)
}

/// Parse the process command line and run the build. Returns the exit code.
pub fn run_cli() -> Result<i32> {
    let environment = EnvironmentSnapshot::capture()?;

    let matches = command().get_matches();

    if matches.get_flag("version") {
        println!("Aibika {}", AIBIKA_VERSION);
        return Ok(0);
    }

    let mut options = options_from_matches(&matches)?;
    init_logging(&options.log);

    options.validate()?;

    if options.files.is_empty() {
        command().print_help()?;
        return Ok(1);
    }

    let cwd = Pathname::from(environment.cwd());
    options.files = expand_files(&options.files, &cwd)?;

    build_application(&options, &environment)?;

    Ok(0)
}
