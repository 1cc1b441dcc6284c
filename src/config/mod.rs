// Configuration management module
// Handles the TOML config file, environment overrides and the interactive setup

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ApiFlavor, Config, ConfigError, DatasetConfig, RetrievalConfig, ServiceConfig,
};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn get_config_dir(
    override_dir: Option<&std::path::Path>,
) -> Result<std::path::PathBuf, ConfigError> {
    override_dir.map_or_else(Config::default_dir, |dir| Ok(dir.to_path_buf()))
}
