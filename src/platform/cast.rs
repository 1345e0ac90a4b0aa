// Google Cast profile
// Messages travel over the cast receiver's message bus instead of the app channel

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{encode_outbound, Capability, PlatformType};
use crate::channel::{MessageSink, Peer, PeerMessage};

/// Namespace senders use for connect messages
pub const CAST_NAMESPACE: &str = "urn:x-cast:com.connectsdk";

/// The cast receiver runtime's message bus
pub trait CastMessageBus {
    /// Start the receiver manager; the host answers with a ready event
    fn start(&mut self, namespace: &str);
    fn send(&mut self, to: &str, message: String);
    fn broadcast(&mut self, message: String);
}

pub struct CastProfile {
    bus: Box<dyn CastMessageBus>,
    started: bool,
}

impl CastProfile {
    pub fn new(bus: Box<dyn CastMessageBus>) -> Self {
        Self {
            bus,
            started: false,
        }
    }

    /// Inbound bus data, parsed as JSON when it is JSON
    pub fn inbound_message(sender_id: Option<String>, data: &str) -> PeerMessage {
        let message = serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()));
        PeerMessage::new(sender_id, message)
    }

    /// Sender connect/disconnect details as a peer; `None` without a sender id
    pub fn sender_peer(sender_id: Option<&str>, details: Map<String, Value>) -> Option<Peer> {
        let id = sender_id?;
        Some(Peer {
            id: id.to_string(),
            details,
        })
    }
}

impl MessageSink for CastProfile {
    fn send_message(&mut self, to: &str, payload: Value) {
        self.bus.send(to, encode_outbound(&payload));
    }

    fn broadcast_message(&mut self, payload: Value) {
        self.bus.broadcast(encode_outbound(&payload));
    }
}

impl Capability for CastProfile {
    fn name(&self) -> &'static str {
        PlatformType::GoogleCast.display_name()
    }

    fn is_interactive(&self) -> bool {
        false
    }

    fn init(&mut self) {
        if self.started {
            debug!("Cast receiver already started");
            return;
        }
        info!("Starting cast receiver on {}", CAST_NAMESPACE);
        self.bus.start(CAST_NAMESPACE);
        self.started = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HostOutput;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn lines(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(line) = rx.try_recv() {
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[test]
    fn test_inbound_json_and_raw_text() {
        let parsed = CastProfile::inbound_message(Some("s1".to_string()), r#"{"a":1}"#);
        assert_eq!(parsed.message, json!({"a": 1}));
        assert_eq!(parsed.from.as_deref(), Some("s1"));

        let raw = CastProfile::inbound_message(None, "hello");
        assert_eq!(raw.message, json!("hello"));
    }

    #[test]
    fn test_sender_peer_requires_id() {
        assert!(CastProfile::sender_peer(None, Map::new()).is_none());
        let peer = CastProfile::sender_peer(Some("s9"), Map::new()).unwrap();
        assert_eq!(peer.id, "s9");
    }

    #[test]
    fn test_outbound_encoding_and_start() {
        let (output, mut rx) = HostOutput::channel();
        let mut profile = CastProfile::new(Box::new(output));

        profile.init();
        profile.init();
        profile.send_message("s1", json!({"x": true}));
        profile.broadcast_message(json!("plain"));

        assert_eq!(
            lines(&mut rx),
            vec![
                json!({"cast": "start", "namespace": CAST_NAMESPACE}),
                json!({"cast": "send", "to": "s1", "message": r#"{"x":true}"#}),
                json!({"cast": "broadcast", "message": "plain"}),
            ]
        );
    }
}
