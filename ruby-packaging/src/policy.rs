// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Functionality for deciding which files of a gem get packaged.

Each gem starts from a default set of content categories. An ordered list
of [GemDirective] then adjusts that set, optionally only for gems named
by the directive.
*/

use {
    anyhow::{anyhow, Result},
    std::{
        collections::BTreeSet,
        fmt::{Display, Formatter},
    },
};

/// A category of gem content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GemContent {
    /// Features the application actually loaded from the gem.
    Loaded,
    /// Everything in the gem directory except scripts and extras.
    Files,
    /// Ruby scripts (`.rb` and `.rbw`).
    Scripts,
    /// Documentation, tests, build inputs and VCS metadata.
    Extras,
    /// Files declared by the gemspec.
    Spec,
}

impl AsRef<str> for GemContent {
    fn as_ref(&self) -> &str {
        match self {
            Self::Loaded => "loaded",
            Self::Files => "files",
            Self::Scripts => "scripts",
            Self::Extras => "extras",
            Self::Spec => "spec",
        }
    }
}

impl Display for GemContent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The operation a [GemDirective] performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GemOption {
    /// Reset to only the loaded features.
    Minimal,
    /// Reset to loaded features and non-script files.
    Guess,
    /// Reset to scripts and files.
    All,
    /// Reset to scripts, files and extras.
    Full,
    /// Reset to the files the gemspec declares.
    Spec,
    Scripts,
    Files,
    Extras,
}

impl GemOption {
    /// Whether this option adjusts the current set instead of replacing it.
    pub fn is_modifier(&self) -> bool {
        matches!(self, Self::Scripts | Self::Files | Self::Extras)
    }
}

impl TryFrom<&str> for GemOption {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "minimal" => Ok(Self::Minimal),
            "guess" => Ok(Self::Guess),
            "all" => Ok(Self::All),
            "full" => Ok(Self::Full),
            "spec" => Ok(Self::Spec),
            "scripts" => Ok(Self::Scripts),
            "files" => Ok(Self::Files),
            "extras" => Ok(Self::Extras),
            _ => Err(format!("{} is not a valid gem option", value)),
        }
    }
}

impl AsRef<str> for GemOption {
    fn as_ref(&self) -> &str {
        match self {
            Self::Minimal => "minimal",
            Self::Guess => "guess",
            Self::All => "all",
            Self::Full => "full",
            Self::Spec => "spec",
            Self::Scripts => "scripts",
            Self::Files => "files",
            Self::Extras => "extras",
        }
    }
}

/// A user supplied adjustment of gem content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GemDirective {
    /// Remove instead of add. Only meaningful for modifiers.
    pub negate: bool,
    pub option: GemOption,
    /// Restrict the directive to these gem names.
    pub names: Option<Vec<String>>,
}

impl GemDirective {
    pub fn new(negate: bool, option: GemOption, names: Option<&str>) -> Result<Self> {
        if negate && !option.is_modifier() {
            return Err(anyhow!(
                "gem option {} cannot be negated",
                option.as_ref()
            ));
        }

        Ok(Self {
            negate,
            option,
            names: names.map(|names| {
                names
                    .split(',')
                    .map(|name| name.trim())
                    .filter(|name| !name.is_empty())
                    .map(|name| name.to_string())
                    .collect()
            }),
        })
    }

    /// Whether this directive should be applied to the named gem.
    pub fn applies_to(&self, gem_name: &str) -> bool {
        match &self.names {
            Some(names) if !names.is_empty() => names.iter().any(|n| n == gem_name),
            _ => true,
        }
    }

    /// Apply this directive to a content set.
    pub fn apply(&self, contents: &mut BTreeSet<GemContent>) {
        let reset: &[GemContent] = match self.option {
            GemOption::Minimal => &[GemContent::Loaded],
            GemOption::Guess => &[GemContent::Loaded, GemContent::Files],
            GemOption::All => &[GemContent::Scripts, GemContent::Files],
            GemOption::Full => &[
                GemContent::Scripts,
                GemContent::Files,
                GemContent::Extras,
            ],
            GemOption::Spec => &[GemContent::Spec],
            GemOption::Scripts => return self.modify(contents, GemContent::Scripts),
            GemOption::Files => return self.modify(contents, GemContent::Files),
            GemOption::Extras => return self.modify(contents, GemContent::Extras),
        };

        contents.clear();
        contents.extend(reset.iter().copied());
    }

    fn modify(&self, contents: &mut BTreeSet<GemContent>, content: GemContent) {
        if self.negate {
            contents.remove(&content);
        } else {
            contents.insert(content);
        }
    }
}

/// Parses command line spellings such as `--gem-minimal=foo,bar` or `--no-gem-extras`.
impl TryFrom<&str> for GemDirective {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        let (flag, names) = match value.split_once('=') {
            Some((flag, names)) => (flag, Some(names)),
            None => (value, None),
        };

        let (negate, option) = if let Some(option) = flag.strip_prefix("--no-gem-") {
            (true, option)
        } else if let Some(option) = flag.strip_prefix("--gem-") {
            (false, option)
        } else {
            return Err(anyhow!("{} is not a gem directive", value));
        };

        let option = GemOption::try_from(option).map_err(|e| anyhow!(e))?;

        Self::new(negate, option, names)
    }
}

/// The content set a gem starts from.
pub fn default_gem_contents() -> BTreeSet<GemContent> {
    [GemContent::Loaded, GemContent::Files].into_iter().collect()
}

/// Fold `directives` over the default content set for the named gem.
pub fn resolve_gem_contents(directives: &[GemDirective], gem_name: &str) -> BTreeSet<GemContent> {
    let mut contents = default_gem_contents();

    for directive in directives.iter().filter(|d| d.applies_to(gem_name)) {
        directive.apply(&mut contents);
    }

    contents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directives(flags: &[&str]) -> Result<Vec<GemDirective>> {
        flags.iter().map(|f| GemDirective::try_from(*f)).collect()
    }

    fn set(contents: &[GemContent]) -> BTreeSet<GemContent> {
        contents.iter().copied().collect()
    }

    #[test]
    fn default_contents() {
        assert_eq!(
            resolve_gem_contents(&[], "rake"),
            set(&[GemContent::Loaded, GemContent::Files])
        );
    }

    #[test]
    fn resets_and_modifiers() -> Result<()> {
        let d = directives(&["--gem-full", "--no-gem-extras"])?;
        assert_eq!(
            resolve_gem_contents(&d, "rake"),
            set(&[GemContent::Files, GemContent::Scripts])
        );

        let d = directives(&["--gem-minimal", "--gem-scripts"])?;
        assert_eq!(
            resolve_gem_contents(&d, "rake"),
            set(&[GemContent::Loaded, GemContent::Scripts])
        );

        let d = directives(&["--gem-all"])?;
        assert_eq!(
            resolve_gem_contents(&d, "rake"),
            set(&[GemContent::Files, GemContent::Scripts])
        );

        let d = directives(&["--gem-spec", "--gem-extras"])?;
        assert_eq!(
            resolve_gem_contents(&d, "rake"),
            set(&[GemContent::Extras, GemContent::Spec])
        );

        Ok(())
    }

    #[test]
    fn later_reset_replaces_earlier_reset() -> Result<()> {
        let d = directives(&["--gem-minimal", "--gem-guess"])?;
        assert_eq!(
            resolve_gem_contents(&d, "rake"),
            set(&[GemContent::Loaded, GemContent::Files])
        );

        let d = directives(&["--gem-full", "--gem-minimal"])?;
        assert_eq!(resolve_gem_contents(&d, "rake"), set(&[GemContent::Loaded]));

        Ok(())
    }

    #[test]
    fn negated_modifier_removes_content() -> Result<()> {
        let d = directives(&["--gem-files", "--no-gem-files"])?;
        assert_eq!(resolve_gem_contents(&d, "rake"), set(&[GemContent::Loaded]));

        let d = directives(&["--gem-full", "--gem-files", "--no-gem-files"])?;
        assert_eq!(
            resolve_gem_contents(&d, "rake"),
            set(&[GemContent::Extras, GemContent::Scripts])
        );

        Ok(())
    }

    #[test]
    fn name_filters() -> Result<()> {
        let d = directives(&["--gem-minimal=foo,bar", "--gem-extras"])?;

        assert_eq!(
            resolve_gem_contents(&d, "foo"),
            set(&[GemContent::Loaded, GemContent::Extras])
        );
        assert_eq!(
            resolve_gem_contents(&d, "rake"),
            set(&[GemContent::Loaded, GemContent::Files, GemContent::Extras])
        );

        // An empty list applies to every gem.
        let d = directives(&["--gem-minimal="])?;
        assert_eq!(resolve_gem_contents(&d, "rake"), set(&[GemContent::Loaded]));

        Ok(())
    }

    #[test]
    fn invalid_directives() {
        assert!(GemDirective::try_from("--gem-bogus").is_err());
        assert!(GemDirective::try_from("--no-gem-minimal").is_err());
        assert!(GemDirective::try_from("--lzma").is_err());
    }
}
