//! Configuration loading, env substitution and persistence.
//!
//! Config files: `danmu.toml`, `danmu.yaml`, `danmu.yml` or `danmu.json`.
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw
//! file text.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        config_dir, discover_and_load, find_config_file, find_or_default_config_path,
        load_config, save_config, save_config_to,
    },
    schema::{ClientConfig, DanmuConfig, PipelineConfig, PluginEntry, ReconnectConfig, ServerConfig},
};
