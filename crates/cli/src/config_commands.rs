use std::path::{Path, PathBuf};

use {
    anyhow::{Result, bail},
    clap::Subcommand,
    danmu_config::{DanmuConfig, find_or_default_config_path, save_config_to},
    danmu_pipeline::default_plugin_entries,
    secrecy::Secret,
};

use crate::{load, registry::build_registry};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a config file with every registered consumer enabled.
    Init {
        /// Destination (defaults to the user config directory).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
    /// Print the config file path in use.
    Path,
}

/// `config` is the `--config` override, if any.
pub fn handle_config(action: ConfigAction, config: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Init { path, force } => {
            let path = path
                .or_else(|| config.map(Path::to_path_buf))
                .unwrap_or_else(find_or_default_config_path);
            init(&path, force)?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        },
        ConfigAction::Show => {
            print!("{}", render(&load(config)?)?);
            Ok(())
        },
        ConfigAction::Path => {
            let path = config
                .map(Path::to_path_buf)
                .unwrap_or_else(find_or_default_config_path);
            println!("{}", path.display());
            Ok(())
        },
    }
}

/// Default config with one pipeline entry per registered consumer.
pub fn default_config() -> Result<DanmuConfig> {
    let registry = build_registry(None)?;
    let mut config = DanmuConfig::default();
    config.pipeline.plugins = default_plugin_entries(&registry);
    Ok(config)
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_config_to(&default_config()?, path)
}

/// TOML rendering with the API token masked.
fn render(config: &DanmuConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.server.token().is_some() {
        shown.server.api_token = Some(Secret::new("********".into()));
    }
    Ok(toml::to_string_pretty(&shown)?)
}
