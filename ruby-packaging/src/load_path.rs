// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Attribution of loaded features to load path entries. */

use crate::pathname::Pathname;

/// Find the load path entry a feature was loaded from.
///
/// Load path entries are expected to be absolute.
///
/// For an absolute feature, the entry containing it with the shortest
/// remainder wins. For a relative feature, the longest entry under which
/// the feature exists on disk wins. Ties go to the earliest entry.
pub fn find_load_path<'a>(load_paths: &'a [Pathname], feature: &Pathname) -> Option<&'a Pathname> {
    if feature.is_absolute() {
        load_paths
            .iter()
            .filter(|lp| feature.is_subpath_of(lp))
            .min_by_key(|lp| feature.relative_path_from(lp).as_str().len())
    } else {
        // max_by_key() returns the last maximum.
        load_paths
            .iter()
            .filter(|lp| lp.join(feature).exists())
            .rev()
            .max_by_key(|lp| lp.as_str().len())
    }
}

/// Resolve a feature to its load path entry and path relative to it.
pub fn resolve_feature(load_paths: &[Pathname], feature: &Pathname) -> Option<(Pathname, Pathname)> {
    let load_path = find_load_path(load_paths, feature)?;

    let relative = if feature.is_absolute() {
        feature.relative_path_from(load_path)
    } else {
        feature.clone()
    };

    Some((load_path.clone(), relative))
}
