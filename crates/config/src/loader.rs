use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::DanmuConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["danmu.toml", "danmu.yaml", "danmu.yml", "danmu.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<DanmuConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./danmu.{toml,yaml,yml,json}`
/// 2. `<user config dir>/danmu.{toml,yaml,yml,json}`
///
/// Returns `None` when no file exists. A file that fails to parse is logged
/// and treated as absent.
pub fn discover_and_load() -> Option<(PathBuf, DanmuConfig)> {
    let Some(path) = find_config_file() else {
        debug!("no config file found");
        return None;
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => Some((path, cfg)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            None
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "danmu").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("danmu.toml")
}

/// Write `config` to the discovered (or default) config path.
pub fn save_config(config: &DanmuConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Write `config` to `path`, choosing the format from its extension.
///
/// Creates parent directories if needed.
pub fn save_config_to(config: &DanmuConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let text = match ext {
        "toml" => {
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?
        },
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    };
    std::fs::write(path, text)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<DanmuConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
