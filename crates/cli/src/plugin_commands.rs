//! CLI commands for plugin management.

use std::path::PathBuf;

use {
    anyhow::Result,
    clap::Subcommand,
    selfbot_config::SelfbotConfig,
    selfbot_plugins::PluginDescriptor,
    selfbot_runtime::Runtime,
};

#[derive(Subcommand)]
pub enum PluginAction {
    /// List known plugins.
    List {
        /// Only show plugins in this category.
        #[arg(long)]
        category: Option<String>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show details about a plugin.
    Info {
        /// Plugin name.
        name: String,
    },
    /// Copy a plugin directory into the managed install directory.
    Install {
        /// Directory containing a plugin manifest.
        source: PathBuf,
    },
    /// Remove an installed plugin.
    Uninstall { name: String },
    /// Mark a plugin enabled.
    Enable { name: String },
    /// Mark a plugin disabled.
    Disable { name: String },
}

pub async fn handle_plugins(config: SelfbotConfig, action: PluginAction) -> Result<()> {
    // No transport and no scheduler loop: only the catalogue is touched.
    let runtime = Runtime::builder(config).build()?;
    let plugins = runtime.plugins();
    plugins.scan().await;

    match action {
        PluginAction::List { category, json } => {
            let list = plugins.list_plugins(category.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("No plugins found.");
                let opts = plugins.options();
                println!(
                    "Place plugins in {}/<category>/<name>/plugin.toml",
                    opts.install_dir.display()
                );
            } else {
                for d in &list {
                    let status = if d.is_enabled {
                        "enabled"
                    } else {
                        "disabled"
                    };
                    println!(
                        "  {name} {version} [{category}] {status}{desc}",
                        name = d.name,
                        version = d.version,
                        category = d.category,
                        desc = if d.description.is_empty() {
                            String::new()
                        } else {
                            format!(" - {}", d.description)
                        },
                    );
                }
            }
        },
        PluginAction::Info { name } => {
            let Some(d) = plugins.get_plugin(&name).await else {
                eprintln!("Plugin '{name}' not found.");
                std::process::exit(1);
            };
            print_info(&d);
        },
        PluginAction::Install { source } => {
            if !plugins.install(&source).await {
                anyhow::bail!("failed to install plugin from {}", source.display());
            }
            println!("Installed plugin from {}", source.display());
        },
        PluginAction::Uninstall { name } => {
            if !plugins.uninstall(&name).await {
                anyhow::bail!("failed to uninstall plugin '{name}'");
            }
            println!("Uninstalled plugin '{name}'.");
        },
        PluginAction::Enable { name } => {
            // The flag is persisted before the load attempt, so a failed
            // load here still enables the plugin for the next run.
            if plugins.get_plugin(&name).await.is_none() {
                anyhow::bail!("plugin '{name}' not found");
            }
            plugins.enable(&name).await;
            plugins.shutdown().await;
            println!("Enabled plugin '{name}'.");
        },
        PluginAction::Disable { name } => {
            if !plugins.disable(&name).await {
                anyhow::bail!("failed to disable plugin '{name}'");
            }
            println!("Disabled plugin '{name}'.");
        },
    }

    Ok(())
}

fn print_info(d: &PluginDescriptor) {
    println!("Name:        {}", d.name);
    println!("Version:     {}", d.version);
    println!("Category:    {}", d.category);
    if !d.author.is_empty() {
        println!("Author:      {}", d.author);
    }
    if !d.description.is_empty() {
        println!("Description: {}", d.description);
    }
    println!("Module:      {}", d.module);
    println!("Enabled:     {}", d.is_enabled);
    if !d.requires.is_empty() {
        println!("Requires:    {}", d.requires.join(", "));
    }
    if let Some(ref path) = d.path {
        println!("Path:        {}", path.display());
    }
    if !d.commands.is_empty() {
        println!("Commands:");
        for c in &d.commands {
            let usage = if c.usage.is_empty() {
                c.name.as_str()
            } else {
                c.usage.as_str()
            };
            println!("  {usage}  {}", c.description);
        }
    }
}
