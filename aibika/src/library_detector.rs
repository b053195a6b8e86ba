// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Detection of DLLs the interpreter and extensions depend on. */

use {
    anyhow::{Context, Result},
    log::debug,
    ruby_packaging::{
        host::HostFacts,
        pathname::{sort_uniq, Pathname},
    },
    std::collections::{HashSet, VecDeque},
};

/// Names of the DLLs a PE image imports.
pub fn find_pe_dependencies(data: &[u8]) -> Result<Vec<String>> {
    let pe = goblin::pe::PE::parse(data)?;
    Ok(pe.libraries.iter().map(|l| (*l).to_string()).collect())
}

pub fn find_pe_dependencies_path(path: &Pathname) -> Result<Vec<String>> {
    let data = path.read()?;
    find_pe_dependencies(&data).with_context(|| format!("parsing PE image {}", path))
}

/// Find an imported DLL next to the importing image or in the Ruby bin directory.
fn resolve_import(host: &HostFacts, importer: &Pathname, name: &str) -> Option<Pathname> {
    [importer.dirname(), host.bindir.clone()]
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Walk the import tables of `roots` transitively.
///
/// Returns the DLLs inside the Ruby installation other than the Ruby
/// library itself, which is packaged separately. Files that are not PE
/// images are skipped.
pub fn detect_dlls(host: &HostFacts, roots: &[Pathname]) -> Result<Vec<Pathname>> {
    let mut seen = HashSet::new();
    let mut queue = roots
        .iter()
        .filter(|root| root.is_file())
        .cloned()
        .collect::<VecDeque<_>>();
    let mut found = vec![];

    for root in &queue {
        seen.insert(root.clone());
    }

    while let Some(image) = queue.pop_front() {
        let imports = match find_pe_dependencies_path(&image) {
            Ok(imports) => imports,
            Err(err) => {
                debug!("skipping {}: {:#}", image, err);
                continue;
            }
        };

        for name in imports {
            if let Some(dll) = resolve_import(host, &image, &name) {
                if seen.insert(dll.clone()) {
                    found.push(dll.clone());
                    queue.push_back(dll);
                }
            }
        }
    }

    let libruby = host.libruby_so.as_deref().map(Pathname::new);

    Ok(sort_uniq(found.into_iter().filter(|dll| {
        dll.is_subpath_of(&host.exec_prefix)
            && dll.has_extension(".dll")
            && Some(dll.basename()) != libruby
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_pe_files_are_skipped() -> Result<()> {
        let td = tempfile::Builder::new().prefix("aibika-test").tempdir()?;
        let prefix = Pathname::from(td.path());
        let bindir = prefix.join("bin");
        std::fs::create_dir_all(bindir.to_path_buf())?;
        std::fs::write(bindir.join("ruby.exe").to_path_buf(), b"#!/bin/sh\n")?;

        let host = HostFacts {
            exec_prefix: prefix.clone(),
            sitelibdir: prefix.join("lib/ruby/site_ruby/3.2.0"),
            bindir: bindir.clone(),
            libruby_so: Some("x64-ucrt-ruby320.dll".to_string()),
            exeext: ".exe".to_string(),
            ruby_install_name: "ruby".to_string(),
            rubyw_install_name: "rubyw".to_string(),
            tempdir: prefix.clone(),
        };

        let dlls = detect_dlls(
            &host,
            &[bindir.join("ruby.exe"), bindir.join("x64-ucrt-ruby320.dll")],
        )?;
        assert!(dlls.is_empty());

        assert!(find_pe_dependencies(b"MZ but not really").is_err());

        Ok(())
    }
}
