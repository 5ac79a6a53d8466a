//! Semantic validation of a loaded configuration.
//!
//! Parsing already rejects type errors; this pass reports values that parse
//! but would make the runtime misbehave.

use std::fmt;

use crate::schema::SelfbotConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "scheduler.tick_interval_ms"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(severity: Severity, path: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SelfbotConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let prefix = &config.runtime.command_prefix;
    if prefix.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "runtime.command_prefix",
            "command prefix must not be empty",
        ));
    } else if prefix.chars().any(char::is_whitespace) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "runtime.command_prefix",
            "command prefix must not contain whitespace",
        ));
    }

    let tick = config.scheduler.tick_interval_ms;
    if tick == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "scheduler.tick_interval_ms",
            "tick interval must be > 0",
        ));
    } else if tick > 60_000 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "scheduler.tick_interval_ms",
            format!("tick interval of {tick}ms is longer than a cron minute"),
        ));
    }

    if let Some(tz) = &config.scheduler.timezone
        && tz.parse::<chrono_tz::Tz>().is_err()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "scheduler.timezone",
            format!("unknown timezone: {tz}"),
        ));
    }

    let rl = &config.middleware.rate_limit;
    if rl.enabled {
        if rl.max_events == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "middleware.rate_limit.max_events",
                "max_events must be > 0 when rate limiting is enabled",
            ));
        }
        if rl.window_secs == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "middleware.rate_limit.window_secs",
                "window_secs must be > 0 when rate limiting is enabled",
            ));
        }
    }

    for (i, dir) in config.plugins.dirs.iter().enumerate() {
        if !dir.is_dir() {
            diagnostics.push(Diagnostic::new(
                Severity::Info,
                &format!("plugins.dirs[{i}]"),
                format!("{} does not exist and will be skipped", dir.display()),
            ));
        }
    }

    ValidationResult { diagnostics }
}
