// AirPlay profile
// No peer channel: every outbound message becomes a one-shot connectsdk:// signal

use serde_json::Value;
use tracing::debug;

use super::{encode_outbound, Capability, PlatformType};
use crate::channel::MessageSink;

pub const SIGNAL_SCHEME: &str = "connectsdk://";

/// Host primitive that hands a URL to the sending device
pub trait OutOfBandSignal {
    fn signal(&mut self, url: String);
}

pub struct AirPlayProfile {
    signal: Box<dyn OutOfBandSignal>,
}

impl AirPlayProfile {
    pub fn new(signal: Box<dyn OutOfBandSignal>) -> Self {
        Self { signal }
    }
}

impl MessageSink for AirPlayProfile {
    /// No directed delivery here
    fn send_message(&mut self, _to: &str, payload: Value) {
        self.broadcast_message(payload);
    }

    fn broadcast_message(&mut self, payload: Value) {
        let url = format!("{}{}", SIGNAL_SCHEME, encode_outbound(&payload));
        debug!("AirPlay signal {}", url);
        self.signal.signal(url);
    }
}

impl Capability for AirPlayProfile {
    fn name(&self) -> &'static str {
        PlatformType::AirPlay.display_name()
    }

    fn is_interactive(&self) -> bool {
        true
    }

    fn init(&mut self) {}
}
