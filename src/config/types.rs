// connect-bridge configuration types
// Every section has defaults so a partial file is enough

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    // User agent the platform profile is detected from
    pub user_agent: String,

    // Negotiate the channel over the luna service bus
    pub service_bus: bool,

    // Path to the luna-send tool used for service bus calls
    pub luna_send_path: String,

    // Launch parameters, e.g. "webOSAppChannelSocketUrl=ws%3A%2F%2F..."
    pub launch_params: String,

    // Program (and arguments) that creates an app channel and prints {"socketUrl": ...}
    pub create_channel_command: Vec<String>,

    // A Google Cast receiver runtime is present
    pub cast_receiver: bool,

    // Read host events from stdin and write out-of-band signals to stdout
    pub stdio_bridge: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Web0S; Linux/SmartTV) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.79 Safari/537.36 WebAppManager".to_string(),
            service_bus: false,
            luna_send_path: "luna-send".to_string(),
            launch_params: String::new(),
            create_channel_command: Vec::new(),
            cast_receiver: false,
            stdio_bridge: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    // Service that hosts second-screen app channels
    pub gateway_service: String,

    // Subscription reporting whether the gateway service is up
    pub register_server_status_uri: String,

    // Call that creates the app channel and returns its socket URL
    pub create_app_channel_uri: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            gateway_service: "com.webos.service.secondscreen.gateway".to_string(),
            register_server_status_uri: "luna://com.palm.bus/signal/registerServerStatus"
                .to_string(),
            create_app_channel_uri:
                "luna://com.webos.service.secondscreen.gateway/app2app/createAppChannel"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaConfig {
    // Duration reported for loaded media, in seconds (0 = unknown)
    pub assumed_duration_secs: f64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            assumed_duration_secs: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    // Default log level when RUST_LOG is not set: "error", "warn", "info", "debug", "trace"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
