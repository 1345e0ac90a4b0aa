// Configuration module for connect-bridge
// Handles loading and managing bridge configuration from a TOML file

pub mod loader;
pub mod types;

pub use loader::{create_default_config, get_config_path, load_config};
pub use types::{ChannelConfig, Config, HostConfig, LoggingConfig, MediaConfig};
