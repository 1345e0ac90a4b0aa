// Platform capability adapter
// Detects the host once and binds the matching messaging profile

pub mod airplay;
pub mod cast;
pub mod host;
pub mod manager;
pub mod webos;

pub use airplay::{AirPlayProfile, OutOfBandSignal};
pub use cast::{CastMessageBus, CastProfile};
pub use host::{HostEvent, HostOutput};
pub use manager::{BridgeEvent, BridgeEventKind, ConnectManager};
pub use webos::WebOsProfile;

use serde_json::Value;
use tracing::warn;

use crate::channel::{AppChannel, MessageSink};
use crate::config::HostConfig;

/// Platform the receiver runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformType {
    /// Nothing recognized; messaging is a no-op
    Default,
    /// Apple devices; outbound only, through an out-of-band signal
    AirPlay,
    /// Chromecast; messages go through the cast message bus
    GoogleCast,
    /// webOS app with access to the host service bus
    WebOsNative,
    /// webOS hosted web app
    WebOsWebApp,
}

impl PlatformType {
    /// Pick the platform from what the host reports about itself
    pub fn detect(env: &HostEnvironment) -> Self {
        let ua = env.user_agent.to_lowercase();

        if ["iPad", "iPhone", "iPod"]
            .iter()
            .any(|device| env.user_agent.contains(device))
        {
            return PlatformType::AirPlay;
        }

        if ua.find("crkey").is_some_and(|at| at > 0) && env.has_cast_receiver {
            return PlatformType::GoogleCast;
        }

        if (ua.contains("tv") && ua.contains("webos")) || ua.contains("web0s") {
            return if env.has_service_bus {
                PlatformType::WebOsNative
            } else {
                PlatformType::WebOsWebApp
            };
        }

        PlatformType::Default
    }

    /// Identifier used in logs and host output
    pub fn name(&self) -> &'static str {
        match self {
            PlatformType::Default => "Default",
            PlatformType::AirPlay => "AirPlay",
            PlatformType::GoogleCast => "GoogleCast",
            PlatformType::WebOsNative => "WebOSNative",
            PlatformType::WebOsWebApp => "WebOSWebApp",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformType::Default => "Default",
            PlatformType::AirPlay => "AirPlay",
            PlatformType::GoogleCast => "Google Cast",
            PlatformType::WebOsNative => "webOS Native Web App",
            PlatformType::WebOsWebApp => "webOS Web App",
        }
    }

    /// Whether the profile pushes unsolicited play state to senders
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            PlatformType::AirPlay | PlatformType::WebOsNative | PlatformType::WebOsWebApp
        )
    }

    pub fn is_webos(&self) -> bool {
        matches!(self, PlatformType::WebOsNative | PlatformType::WebOsWebApp)
    }
}

/// Signals probed from the host at startup
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    pub user_agent: String,
    pub has_service_bus: bool,
    pub has_cast_receiver: bool,
}

impl HostEnvironment {
    pub fn from_config(host: &HostConfig) -> Self {
        Self {
            user_agent: host.user_agent.clone(),
            has_service_bus: host.service_bus,
            has_cast_receiver: host.cast_receiver,
        }
    }
}

/// Uniform surface every profile offers
pub trait Capability: MessageSink {
    fn name(&self) -> &'static str;

    /// Interactive profiles broadcast play state changes
    fn is_interactive(&self) -> bool;

    /// Wire host listeners and start messaging
    fn init(&mut self);
}

/// Profile without any messaging
#[derive(Debug, Default)]
pub struct DefaultProfile;

impl MessageSink for DefaultProfile {
    fn send_message(&mut self, _to: &str, _payload: Value) {}

    fn broadcast_message(&mut self, _payload: Value) {}
}

impl Capability for DefaultProfile {
    fn name(&self) -> &'static str {
        PlatformType::Default.display_name()
    }

    fn is_interactive(&self) -> bool {
        false
    }

    fn init(&mut self) {}
}

/// Collaborators a profile may need; each platform takes what it uses
#[derive(Default)]
pub struct ProfileParts {
    pub channel: Option<AppChannel>,
    pub cast_bus: Option<Box<dyn CastMessageBus>>,
    pub signal: Option<Box<dyn OutOfBandSignal>>,
}

/// The profile bound for the process
pub enum Profile {
    Default(DefaultProfile),
    WebOs(WebOsProfile),
    GoogleCast(CastProfile),
    AirPlay(AirPlayProfile),
}

impl Profile {
    /// Build the profile for `platform`; falls back to `Default` when a
    /// required collaborator is missing
    pub fn build(platform: PlatformType, parts: ProfileParts) -> Self {
        let profile = match platform {
            PlatformType::WebOsNative | PlatformType::WebOsWebApp => parts
                .channel
                .map(|channel| Profile::WebOs(WebOsProfile::new(platform, channel))),
            PlatformType::GoogleCast => parts
                .cast_bus
                .map(|bus| Profile::GoogleCast(CastProfile::new(bus))),
            PlatformType::AirPlay => parts
                .signal
                .map(|signal| Profile::AirPlay(AirPlayProfile::new(signal))),
            PlatformType::Default => Some(Profile::Default(DefaultProfile)),
        };

        profile.unwrap_or_else(|| {
            warn!(
                "{} detected but its host collaborator is missing; messaging disabled",
                platform.display_name()
            );
            Profile::Default(DefaultProfile)
        })
    }

    fn capability(&self) -> &dyn Capability {
        match self {
            Profile::Default(p) => p,
            Profile::WebOs(p) => p,
            Profile::GoogleCast(p) => p,
            Profile::AirPlay(p) => p,
        }
    }

    fn capability_mut(&mut self) -> &mut dyn Capability {
        match self {
            Profile::Default(p) => p,
            Profile::WebOs(p) => p,
            Profile::GoogleCast(p) => p,
            Profile::AirPlay(p) => p,
        }
    }
}

impl MessageSink for Profile {
    fn send_message(&mut self, to: &str, payload: Value) {
        self.capability_mut().send_message(to, payload);
    }

    fn broadcast_message(&mut self, payload: Value) {
        self.capability_mut().broadcast_message(payload);
    }
}

impl Capability for Profile {
    fn name(&self) -> &'static str {
        self.capability().name()
    }

    fn is_interactive(&self) -> bool {
        self.capability().is_interactive()
    }

    fn init(&mut self) {
        self.capability_mut().init();
    }
}

/// Outbound text for hosts that carry strings: strings as-is, the rest as JSON
pub fn encode_outbound(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
