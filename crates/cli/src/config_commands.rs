use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand};

use selfbot_config::{SelfbotConfig, Severity, save_config, validate_config};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration as TOML.
    Show,
    /// Write a default config file if none exists.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config(
    action: ConfigAction,
    config: &SelfbotConfig,
    path: Option<PathBuf>,
) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(config, path.as_deref(), verbose),
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        },
        ConfigAction::Init { force } => {
            let path = path.unwrap_or_else(selfbot_config::find_or_default_config_path);
            if init(&path, force)? {
                eprintln!("Wrote {}", path.display());
            } else {
                eprintln!("{} already exists (use --force to overwrite)", path.display());
            }
            Ok(())
        },
    }
}

/// Write the default config to `path`. Returns false if it exists and `force` is off.
fn init(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    save_config(&SelfbotConfig::default(), path)?;
    Ok(true)
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: &SelfbotConfig, path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate_config(config);

    if let Some(path) = path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file given; checking discovered config.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[test]
    fn init_writes_once_unless_forced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("selfbot.toml");

        assert!(init(&path, false).unwrap());
        let written = selfbot_config::load_config(&path).unwrap();
        assert_eq!(written.runtime.command_prefix, ".");

        std::fs::write(&path, "[runtime]\ncommand_prefix = \"!\"\n").unwrap();
        assert!(!init(&path, false).unwrap());
        assert!(std::fs::read_to_string(&path).unwrap().contains('!'));
        assert!(init(&path, true).unwrap());
    }
}
