// Configuration file loading and creation

use super::types::Config;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Get the path to the configuration file
pub fn get_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("connect-bridge");
    path.push("config.toml");
    path
}

/// Load configuration from `path`, or create it with defaults if it doesn't exist
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", path.display(), e);
                warn!("Using default configuration");
                Ok(Config::default())
            }
        }
    } else {
        create_default_config(path)?;
        Ok(Config::default())
    }
}

/// Create a default configuration file with helpful comments
pub fn create_default_config(path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }

    let config = Config::default();
    let toml_string = toml::to_string_pretty(&config)?;

    let commented_toml = format!(
        "# connect-bridge configuration\n\
         # Restart the bridge after editing for changes to take effect\n\
         #\n\
         # [host] decides the platform profile and how the app channel socket is found:\n\
         #   service_bus = true        -> negotiate over luna (luna_send_path)\n\
         #   launch_params = \"...\"     -> webOSAppChannelSocketUrl=<percent-encoded url>\n\
         #   create_channel_command    -> program printing {{\"socketUrl\": ...}}\n\
         #\n\
         # RUST_LOG overrides [logging].level\n\n\
         {}",
        toml_string
    );

    fs::write(path, commented_toml)
        .with_context(|| format!("writing config file {}", path.display()))?;
    info!("Created default config file at: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        let parsed: Config = toml::from_str(&toml_string).unwrap();

        assert_eq!(parsed.host.user_agent, config.host.user_agent);
        assert_eq!(parsed.channel, config.channel);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let partial_toml = r#"
            [host]
            launch_params = "webOSAppChannelSocketUrl=ws%3A%2F%2F127.0.0.1%3A9998"
        "#;

        let config: Config = toml::from_str(partial_toml).unwrap();

        assert_eq!(
            config.host.launch_params,
            "webOSAppChannelSocketUrl=ws%3A%2F%2F127.0.0.1%3A9998"
        );
        assert!(!config.host.service_bus);
        assert_eq!(config.host.luna_send_path, "luna-send");
        assert_eq!(
            config.channel.gateway_service,
            "com.webos.service.secondscreen.gateway"
        );
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = std::env::temp_dir().join(format!("connect-bridge-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_file(&path);

        let config = load_config(&path).unwrap();
        assert_eq!(config.logging.level, "info");

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# connect-bridge configuration"));
        let reparsed: Config = toml::from_str(&written).unwrap();
        assert_eq!(reparsed.channel, config.channel);

        let _ = fs::remove_dir_all(&dir);
    }
}
