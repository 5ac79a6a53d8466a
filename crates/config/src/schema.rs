/// Config schema types (runtime, plugins, scheduler, middleware).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::data_dir;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfbotConfig {
    pub runtime: RuntimeConfig,
    pub plugins: PluginsConfig,
    pub scheduler: SchedulerConfig,
    pub middleware: MiddlewareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Prefix that marks a message as a command, e.g. `.help`.
    pub command_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_prefix: ".".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Extra plugin roots scanned in addition to the install directory.
    pub dirs: Vec<PathBuf>,
    /// Managed storage for installed plugins. Defaults to `<data_dir>/plugins`.
    pub install_dir: Option<PathBuf>,
    /// Persisted catalogue. Defaults to `<data_dir>/plugins.yml`.
    pub catalogue_path: Option<PathBuf>,
    /// Load every enabled plugin on startup.
    pub autoload: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            install_dir: None,
            catalogue_path: None,
            autoload: true,
        }
    }
}

impl PluginsConfig {
    pub fn resolved_install_dir(&self) -> PathBuf {
        self.install_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("plugins"))
    }

    pub fn resolved_catalogue_path(&self) -> PathBuf {
        self.catalogue_path
            .clone()
            .unwrap_or_else(|| data_dir().join("plugins.yml"))
    }

    /// Every root to scan: the install directory first, then `dirs`, deduplicated.
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.resolved_install_dir()];
        for dir in &self.dirs {
            if !roots.contains(dir) {
                roots.push(dir.clone());
            }
        }
        roots
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Task registry file. Defaults to `<data_dir>/scheduler/tasks.json`.
    pub store_path: Option<PathBuf>,
    /// IANA timezone applied to cron tasks that do not name their own.
    pub timezone: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            store_path: None,
            timezone: None,
        }
    }
}

impl SchedulerConfig {
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| data_dir().join("scheduler").join("tasks.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Register the event logging middleware.
    pub log_events: bool,
    pub rate_limit: RateLimitConfig,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            log_events: true,
        }
    }
}

/// Per-user sliding window applied to messages, callback and inline queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_events: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_events: 5,
            window_secs: 3,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SelfbotConfig::default();
        assert_eq!(cfg.runtime.command_prefix, ".");
        assert_eq!(cfg.scheduler.tick_interval_ms, 1_000);
        assert_eq!(cfg.middleware.rate_limit.max_events, 5);
        assert_eq!(cfg.middleware.rate_limit.window_secs, 3);
        assert!(cfg.plugins.autoload);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: SelfbotConfig = toml::from_str(
            r#"
[runtime]
command_prefix = "!"

[middleware.rate_limit]
max_events = 10
"#,
        )
        .unwrap();
        assert_eq!(cfg.runtime.command_prefix, "!");
        assert_eq!(cfg.middleware.rate_limit.max_events, 10);
        assert_eq!(cfg.middleware.rate_limit.window_secs, 3);
        assert!(cfg.middleware.log_events);
    }

    #[test]
    fn roots_put_install_dir_first_without_duplicates() {
        let cfg = PluginsConfig {
            dirs: vec![PathBuf::from("/opt/plugins"), PathBuf::from("/srv/p")],
            install_dir: Some(PathBuf::from("/opt/plugins")),
            ..Default::default()
        };
        assert_eq!(cfg.roots(), vec![
            PathBuf::from("/opt/plugins"),
            PathBuf::from("/srv/p")
        ]);
    }
}
