// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Case-insensitive path values.

Ruby installations on Windows report paths with forward slashes, drive
letters and inconsistent casing. [Pathname] normalizes all of that so
paths coming from the interpreter, the command line and the filesystem
can be compared with each other.
*/

use {
    anyhow::{Context, Result},
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        hash::{Hash, Hasher},
        path::{Path, PathBuf},
    },
};

static ABSOLUTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)([a-z]:)?/").unwrap());
static ROOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)([a-z]:)?/$").unwrap());
static DRIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)[a-z]:$").unwrap());

/// A filesystem path compared without regard to case.
///
/// The stored form always uses `/` as separator and never carries a
/// trailing separator, except for the roots `/` and `C:/`.
#[derive(Clone, Debug, Default)]
pub struct Pathname {
    path: String,
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");

    // Keep a leading `//` so UNC shares survive.
    let (prefix, rest) = if let Some(rest) = path.strip_prefix("//") {
        ("//", rest)
    } else {
        ("", path.as_str())
    };

    let mut collapsed = String::with_capacity(path.len());
    collapsed.push_str(prefix);
    let mut previous_slash = !prefix.is_empty();
    for c in rest.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(c);
    }

    while collapsed.len() > 1 && collapsed.ends_with('/') && !ROOT_RE.is_match(&collapsed) {
        collapsed.pop();
    }

    collapsed
}

impl Pathname {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize(path.as_ref()),
        }
    }

    /// Resolve the current working directory.
    pub fn current_dir() -> Result<Self> {
        let cwd = std::env::current_dir().context("resolving current directory")?;
        Ok(Self::from(cwd.as_path()))
    }

    /// The path with `/` separators.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn to_posix(&self) -> String {
        self.path.clone()
    }

    /// The path with `\` separators, as written into containers.
    pub fn to_native(&self) -> String {
        self.path.replace('/', "\\")
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        ABSOLUTE_RE.is_match(&self.path)
    }

    pub fn is_root(&self) -> bool {
        ROOT_RE.is_match(&self.path)
    }

    /// Path components. An absolute path yields its root as the first element.
    pub fn segments(&self) -> Vec<&str> {
        let mut res = Vec::new();

        let rest = if let Some(m) = ABSOLUTE_RE.find(&self.path) {
            res.push(m.as_str());
            &self.path[m.end()..]
        } else {
            self.path.as_str()
        };

        res.extend(rest.split('/').filter(|s| !s.is_empty()));

        res
    }

    fn from_segments(segments: &[&str]) -> Self {
        let mut path = String::new();

        for segment in segments {
            if !path.is_empty() && !path.ends_with('/') {
                path.push('/');
            }
            path.push_str(segment);
        }

        Self::new(path)
    }

    /// Join another path onto this one. An absolute `other` replaces `self`.
    pub fn join(&self, other: impl Into<Pathname>) -> Self {
        let other = other.into();

        if other.is_absolute() || self.is_empty() {
            other
        } else if other.is_empty() {
            self.clone()
        } else if self.path.ends_with('/') {
            Self::new(format!("{}{}", self.path, other.path))
        } else {
            Self::new(format!("{}/{}", self.path, other.path))
        }
    }

    /// Express this path relative to `base`.
    ///
    /// Leading components shared by both paths are stripped and each
    /// remaining component of `base` becomes `..`. If the paths do not
    /// share a root, `self` is returned unchanged.
    pub fn relative_path_from(&self, base: &Pathname) -> Self {
        let ours = self.segments();
        let theirs = base.segments();

        let common = ours
            .iter()
            .zip(theirs.iter())
            .take_while(|(a, b)| a.eq_ignore_ascii_case(b))
            .count();

        if common == 0 && (self.is_absolute() || base.is_absolute()) {
            return self.clone();
        }

        let mut parts = vec![".."; theirs.len() - common];
        parts.extend(ours[common..].iter());

        if parts.is_empty() {
            Self::new(".")
        } else {
            Self::from_segments(&parts)
        }
    }

    /// Whether this path lies strictly inside `root`.
    pub fn is_subpath_of(&self, root: &Pathname) -> bool {
        let ours = self.path.to_ascii_lowercase();
        let root = root.path.to_ascii_lowercase();
        let root = root.trim_end_matches('/');

        ours.len() > root.len() + 1
            && ours.starts_with(root)
            && ours[root.len()..].starts_with('/')
    }

    pub fn dirname(&self) -> Self {
        if self.is_root() {
            return self.clone();
        }

        match self.path.rfind('/') {
            None => Self::new("."),
            Some(0) => Self::new("/"),
            Some(pos) if DRIVE_RE.is_match(&self.path[..pos]) => {
                Self::new(&self.path[..pos + 1])
            }
            Some(pos) => Self::new(&self.path[..pos]),
        }
    }

    pub fn basename(&self) -> Self {
        Self::new(self.file_name())
    }

    /// The final component as a string.
    pub fn file_name(&self) -> &str {
        if self.is_root() {
            return &self.path;
        }

        match self.path.rfind('/') {
            Some(pos) => &self.path[pos + 1..],
            None => &self.path,
        }
    }

    /// Extension of the final component including its leading `.`.
    ///
    /// Dotfiles and names ending in `.` have no extension.
    pub fn extension(&self) -> &str {
        let name = self.file_name();

        match name.rfind('.') {
            Some(pos) if pos > 0 && pos + 1 < name.len() => &name[pos..],
            _ => "",
        }
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.extension().eq_ignore_ascii_case(ext)
    }

    /// Replace the extension of the final component.
    pub fn with_extension(&self, ext: &str) -> Self {
        let stem_len = self.path.len() - self.extension().len();
        Self::new(format!("{}{}", &self.path[..stem_len], ext))
    }

    /// Insert `suffix` between the file stem and its extension.
    pub fn append_to_filename(&self, suffix: &str) -> Self {
        let ext = self.extension();
        let stem_len = self.path.len() - ext.len();
        Self::new(format!("{}{}{}", &self.path[..stem_len], suffix, ext))
    }

    /// Make this path absolute against `base`, folding `.` and `..`.
    pub fn expand_from(&self, base: &Pathname) -> Self {
        let joined = base.join(self.clone());
        let segments = joined.segments();
        let absolute = joined.is_absolute();

        let mut res: Vec<&str> = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().copied().enumerate() {
            if absolute && i == 0 {
                res.push(segment);
                continue;
            }

            match segment {
                "." => {}
                ".." => {
                    let floor = usize::from(absolute);
                    match res.last() {
                        Some(last) if res.len() > floor && *last != ".." => {
                            res.pop();
                        }
                        // `..` at the root stays at the root.
                        _ if absolute => {}
                        _ => res.push(".."),
                    }
                }
                _ => res.push(segment),
            }
        }

        if res.is_empty() {
            Self::new(".")
        } else {
            Self::from_segments(&res)
        }
    }

    /// Make this path absolute against the current directory.
    pub fn expand(&self) -> Result<Self> {
        Ok(self.expand_from(&Self::current_dir()?))
    }

    pub fn exists(&self) -> bool {
        self.to_path_buf().exists()
    }

    pub fn is_file(&self) -> bool {
        self.to_path_buf().is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.to_path_buf().is_dir()
    }

    pub fn file_size(&self) -> Result<u64> {
        Ok(std::fs::metadata(self.to_path_buf())
            .with_context(|| format!("reading metadata of {}", self))?
            .len())
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(self.to_path_buf()).with_context(|| format!("reading {}", self))
    }

    /// Recursively find files below this directory whose name passes `filter`.
    ///
    /// Results are sorted by directory traversal order with entries of each
    /// directory in name order.
    pub fn find_all_files(&self, filter: impl Fn(&str) -> bool) -> Result<Vec<Pathname>> {
        let mut res = Vec::new();

        for entry in walkdir::WalkDir::new(self.to_path_buf())
            .follow_links(true)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry.with_context(|| format!("scanning {}", self))?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = Pathname::from(entry.path());
            if filter(path.file_name()) {
                res.push(path);
            }
        }

        Ok(res)
    }
}

/// Sort paths and drop repeats.
pub fn sort_uniq(paths: impl IntoIterator<Item = Pathname>) -> Vec<Pathname> {
    let mut res = paths.into_iter().collect::<Vec<_>>();
    res.sort();
    res.dedup();
    res
}

impl PartialEq for Pathname {
    fn eq(&self, other: &Self) -> bool {
        self.path.eq_ignore_ascii_case(&other.path)
    }
}

impl Eq for Pathname {}

impl Hash for Pathname {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for Pathname {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pathname {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.path.bytes().map(|b| b.to_ascii_lowercase());
        let b = other.path.bytes().map(|b| b.to_ascii_lowercase());
        a.cmp(b)
    }
}

impl Display for Pathname {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

impl AsRef<Path> for Pathname {
    fn as_ref(&self) -> &Path {
        Path::new(&self.path)
    }
}

impl From<&str> for Pathname {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Pathname {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&String> for Pathname {
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

impl From<&Pathname> for Pathname {
    fn from(p: &Pathname) -> Self {
        p.clone()
    }
}

impl From<&Path> for Pathname {
    fn from(p: &Path) -> Self {
        Self::new(p.to_string_lossy())
    }
}

impl From<PathBuf> for Pathname {
    fn from(p: PathBuf) -> Self {
        Self::from(p.as_path())
    }
}
