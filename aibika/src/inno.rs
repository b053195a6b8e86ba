// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installer creation with Inno Setup. */

use {
    crate::builder::IGNORE_MODULE_NAMES,
    anyhow::{anyhow, Context, Result},
    duct::cmd,
    log::{debug, info, warn},
    ruby_packaging::pathname::Pathname,
    std::fmt::Write,
};

/// Name of the generated script, in the working directory.
pub const SCRIPT_FILE_NAME: &str = "aibikatemp.iss";

fn escape(value: &str) -> String {
    value.replace('"', "\"\"")
}

/// Append `[Dirs]` and `[Files]` sections for the package to a user script.
///
/// `files` are `(target, source)` pairs with targets relative to the
/// application directory.
pub fn render_script(
    user_script: &str,
    executable: &Pathname,
    directories: &[Pathname],
    files: &[(Pathname, Pathname)],
) -> String {
    let mut iss = format!("{}\n\n", user_script);

    iss.push_str("[Dirs]\n");
    for dir in directories {
        // Writing to a String cannot fail.
        let _ = writeln!(iss, "Name: \"{{app}}/{}\"", dir);
    }
    iss.push('\n');

    iss.push_str("[Files]\n");
    let _ = writeln!(
        iss,
        "Source: \"{}\"; DestDir: \"{{app}}\"",
        escape(executable.as_str())
    );
    for (target, source) in files {
        let source = escape(source.as_str());
        if IGNORE_MODULE_NAMES.is_match(&source) {
            continue;
        }

        let _ = writeln!(
            iss,
            "Source: \"{}\"; DestDir: \"{{app}}/{}\"",
            source,
            escape(target.dirname().as_str())
        );
    }
    iss.push('\n');

    iss
}

/// Explain a failed `iscc` exit code.
pub fn iscc_failure(code: Option<i32>) -> String {
    match code {
        Some(0) => "ISCC reported success, but system reported error?",
        Some(1) => "ISCC reports invalid command line parameters",
        Some(2) => "ISCC reports that compilation failed",
        _ => "ISCC failed to run. Is the InnoSetup directory in your PATH?",
    }
    .to_string()
}

fn compile(script: &Pathname, verbose: bool) -> Result<()> {
    let iscc = which::which("iscc")
        .map_err(|_| anyhow!(iscc_failure(None)))?;

    let mut args = vec![];
    if !verbose {
        args.push("/Q".to_string());
    }
    args.push(script.to_native());

    info!("Running InnoSetup compiler ISCC");
    let output = cmd(iscc, args)
        .unchecked()
        .run()
        .map_err(|_| anyhow!(iscc_failure(None)))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(anyhow!(iscc_failure(output.status.code())))
    }
}

/// Remove temporary files, warning about any that cannot be removed.
fn remove_temporary_files(paths: &[&Pathname]) {
    for path in paths {
        if path.exists() {
            if let Err(err) = std::fs::remove_file(path.to_path_buf()) {
                warn!("Failed to remove {}: {}", path, err);
            }
        }
    }
}

/// Render the installer script and run the Inno Setup compiler.
///
/// The script and `executable` are removed afterwards, whatever the outcome.
pub fn create_installer(
    user_script: &Pathname,
    executable: &Pathname,
    directories: &[Pathname],
    files: &[(Pathname, Pathname)],
    verbose: bool,
) -> Result<()> {
    let script = Pathname::new(SCRIPT_FILE_NAME);

    let res = (|| -> Result<()> {
        let user = String::from_utf8(user_script.read()?)
            .with_context(|| format!("decoding {}", user_script))?;
        let iss = render_script(&user, executable, directories, files);

        debug!("### INNOSETUP SCRIPT ###\n\n{}\n", iss);

        std::fs::write(script.to_path_buf(), iss)
            .with_context(|| format!("writing {}", script))?;

        compile(&script, verbose)
    })();

    remove_temporary_files(&[&script, executable]);

    res.context("InnoSetup installer creation failed")
}
