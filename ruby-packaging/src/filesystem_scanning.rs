// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Scanning the Ruby installation for files that are never `require`d. */

use {
    crate::pathname::Pathname,
    anyhow::Result,
    once_cell::sync::Lazy,
    regex::Regex,
};

/// Matches load path entries holding a versioned core or site library.
static CORE_LIBRARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/(ruby/(?:site_ruby/|vendor_ruby/)?[0-9.]+)/?$").unwrap());

/// Find encoding extensions in load path entries belonging to the installation.
///
/// Encodings are loaded lazily by the interpreter so the application run
/// rarely records them.
pub fn find_encoding_files(load_paths: &[Pathname], exec_prefix: &Pathname) -> Result<Vec<Pathname>> {
    let mut res = vec![];

    for load_path in load_paths.iter().filter(|lp| lp.is_subpath_of(exec_prefix)) {
        let enc = load_path.join("enc");
        if enc.is_dir() {
            res.extend(enc.find_all_files(|name| name.ends_with(".so"))?);
        }
    }

    Ok(res)
}

/// Collect every file of the versioned library directories in `load_paths`.
///
/// Returns `(source, destination)` pairs with destinations below `lib/`.
pub fn find_core_library_files(load_paths: &[Pathname]) -> Result<Vec<(Pathname, Pathname)>> {
    let mut res = vec![];

    for load_path in load_paths {
        let subdir = match CORE_LIBRARY_RE.captures(load_path.as_str()) {
            Some(caps) => caps[1].to_string(),
            None => continue,
        };

        if !load_path.is_dir() {
            continue;
        }

        let target = Pathname::new("lib").join(subdir);
        for file in load_path.find_all_files(|_| true)? {
            let dest = target.join(file.relative_path_from(load_path));
            res.push((file, dest));
        }
    }

    Ok(res)
}

/// Find side-by-side assembly manifests in the installation.
pub fn find_manifest_files(exec_prefix: &Pathname) -> Result<Vec<Pathname>> {
    if !exec_prefix.is_dir() {
        return Ok(vec![]);
    }

    exec_prefix.find_all_files(|name| {
        name.len() > ".manifest".len() && name.to_ascii_lowercase().ends_with(".manifest")
    })
}
