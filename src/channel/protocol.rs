// App channel wire protocol
// Envelopes exchanged as JSON text frames over the channel socket

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A sender device as announced by the channel gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,

    /// Whatever else the gateway reports about the peer
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Peer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            details: Map::new(),
        }
    }
}

/// One message unit on the channel socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Application message, directed when `to` is set, broadcast otherwise
    #[serde(rename = "p2p")]
    P2p {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// A peer has joined the channel
    #[serde(rename = "p2p.join")]
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// A peer has left; its id is the transport-assigned `from`
    #[serde(rename = "p2p.depart")]
    Depart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Gateway asks whether a peer may join
    #[serde(rename = "p2p.join-request")]
    JoinRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// Answer to a join request
    #[serde(rename = "p2p.join-response")]
    JoinResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// Any other `type`, kept so newer gateways don't break parsing
    #[serde(other)]
    Unrecognized,
}

impl Envelope {
    pub fn directed(to: impl Into<String>, payload: Value) -> Self {
        Envelope::P2p {
            to: Some(to.into()),
            from: None,
            payload: Some(payload),
        }
    }

    pub fn broadcast(payload: Value) -> Self {
        Envelope::P2p {
            to: None,
            from: None,
            payload: Some(payload),
        }
    }

    /// Always grants the join, echoing the request's correlation token
    pub fn join_granted(request_id: Option<Value>) -> Self {
        let mut payload = Map::new();
        payload.insert("allowJoin".to_string(), Value::Bool(true));
        if let Some(request_id) = request_id {
            payload.insert("requestId".to_string(), request_id);
        }

        Envelope::JoinResponse {
            to: None,
            from: None,
            payload: Some(Value::Object(payload)),
        }
    }

    /// Serialize to a single-line JSON frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Payloads that carry nothing are never delivered or sent
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// A received application message as handed to listeners
#[derive(Debug, Clone, PartialEq)]
pub struct PeerMessage {
    pub from: Option<String>,
    pub message: Value,
}

impl PeerMessage {
    pub fn new(from: Option<String>, message: Value) -> Self {
        Self { from, message }
    }

    pub fn to_json(&self) -> Value {
        json!({ "from": self.from, "message": self.message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directed_envelope_wire_shape() {
        let frame = Envelope::directed("sender-1", json!({"hello": "tv"}))
            .to_frame()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(
            value,
            json!({"type": "p2p", "to": "sender-1", "payload": {"hello": "tv"}})
        );
        assert!(!frame.contains('\n'));
    }

    #[test]
    fn test_broadcast_envelope_omits_to() {
        let value = serde_json::to_value(Envelope::broadcast(json!("hi"))).unwrap();
        assert_eq!(value, json!({"type": "p2p", "payload": "hi"}));
    }

    #[test]
    fn test_parse_join_with_peer_details() {
        let envelope = Envelope::from_frame(
            r#"{"type":"p2p.join","client":{"id":"abc","name":"Phone"}}"#,
        )
        .unwrap();

        match envelope {
            Envelope::Join {
                client: Some(peer), ..
            } => {
                assert_eq!(peer.id, "abc");
                assert_eq!(peer.details.get("name"), Some(&json!("Phone")));
            }
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let envelope = Envelope::from_frame(r#"{"type":"p2p.mystery","payload":1}"#).unwrap();
        assert_eq!(envelope, Envelope::Unrecognized);
    }

    #[test]
    fn test_join_granted_echoes_request_id() {
        let value = serde_json::to_value(Envelope::join_granted(Some(json!(42)))).unwrap();
        assert_eq!(
            value,
            json!({"type": "p2p.join-response", "payload": {"allowJoin": true, "requestId": 42}})
        );
    }

    #[test]
    fn test_empty_payloads() {
        assert!(is_empty_payload(&Value::Null));
        assert!(is_empty_payload(&json!("")));
        assert!(!is_empty_payload(&json!({})));
        assert!(!is_empty_payload(&json!(0.5)));
    }
}
