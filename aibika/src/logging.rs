// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Console logging. */

use {
    log::{Level, LevelFilter},
    std::io::Write,
};

/// How chatty the build should be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// Only report errors.
    pub quiet: bool,
    /// Report every emitted record.
    pub verbose: bool,
    pub show_warnings: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            quiet: false,
            verbose: false,
            show_warnings: true,
        }
    }
}

impl LogSettings {
    pub fn level_filter(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

/// Render a log message the way it appears on the console.
///
/// Returns `None` for messages that are suppressed.
pub fn format_message(level: Level, show_warnings: bool, message: &str) -> Option<String> {
    match level {
        Level::Error => Some(format!("ERROR: {}", message)),
        Level::Warn if show_warnings => Some(format!("=== WARNING: {}", message)),
        Level::Warn => None,
        Level::Info => Some(format!("=== {}", message)),
        Level::Debug | Level::Trace => Some(message.to_string()),
    }
}

/// Install the global logger. `RUST_LOG` takes precedence over `settings`.
pub fn init_logging(settings: &LogSettings) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.level_filter().as_str()),
    );

    let show_warnings = settings.show_warnings;

    builder
        .target(env_logger::Target::Stdout)
        .format(move |buf, record| {
            match format_message(record.level(), show_warnings, &record.args().to_string()) {
                Some(line) => writeln!(buf, "{}", line),
                None => Ok(()),
            }
        });

    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_format() {
        assert_eq!(
            format_message(Level::Info, true, "Building app.exe").as_deref(),
            Some("=== Building app.exe")
        );
        assert_eq!(
            format_message(Level::Warn, true, "x was not found").as_deref(),
            Some("=== WARNING: x was not found")
        );
        assert_eq!(format_message(Level::Warn, false, "x was not found"), None);
        assert_eq!(
            format_message(Level::Error, false, "boom").as_deref(),
            Some("ERROR: boom")
        );
        assert_eq!(
            format_message(Level::Debug, true, "a src\\app.rb").as_deref(),
            Some("a src\\app.rb")
        );
    }

    #[test]
    fn level_filters() {
        let mut settings = LogSettings::default();
        assert_eq!(settings.level_filter(), LevelFilter::Info);

        settings.verbose = true;
        assert_eq!(settings.level_filter(), LevelFilter::Debug);

        settings.quiet = true;
        assert_eq!(settings.level_filter(), LevelFilter::Error);
    }
}
