// Command payloads carried inside p2p messages
// Media and service commands, their responses and media events

pub mod dispatcher;

pub use dispatcher::{CommandDispatcher, Dispatch};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

pub const MEDIA_COMMAND: &str = "connectsdk.mediaCommand";
pub const SERVICE_COMMAND: &str = "connectsdk.serviceCommand";
pub const MEDIA_COMMAND_RESPONSE: &str = "connectsdk.mediaCommandResponse";
pub const MEDIA_EVENT: &str = "connectsdk.mediaEvent";

/// Correlation token chosen by the sender and echoed verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct RequestId(pub Value);

impl RequestId {
    /// Marks messages nobody is waiting on
    pub fn unsolicited() -> Self {
        RequestId(json!(-1))
    }

    /// `-1` in any numeric spelling (`-1`, `-1.0`, `"-1"`)
    pub fn is_unsolicited(&self) -> bool {
        let number = match &self.0 {
            Value::String(text) => text.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        };
        number == Some(-1.0)
    }
}

/// What a message payload turned out to be
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "contentType")]
pub enum Content {
    #[serde(rename = "connectsdk.mediaCommand")]
    MediaCommand {
        #[serde(rename = "mediaCommand", default)]
        media_command: Option<Value>,
    },

    #[serde(rename = "connectsdk.serviceCommand")]
    ServiceCommand {
        #[serde(rename = "serviceCommand", default)]
        service_command: Option<Value>,
    },

    #[serde(other)]
    Other,
}

impl Content {
    /// Classify a payload, parsing it first when it arrived as a JSON string
    pub fn classify(payload: &Value) -> Content {
        let parsed;
        let structured = match payload {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => {
                    parsed = value;
                    &parsed
                }
                Err(_) => return Content::Other,
            },
            other => other,
        };

        if structured.get("contentType").is_none() {
            return Content::Other;
        }
        Content::deserialize(structured).unwrap_or(Content::Other)
    }
}

/// Read an optional field, treating a value of the wrong type as absent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Media command verbs; mistyped fields read as absent so the verb still runs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaVerb {
    DisplayImage {
        #[serde(rename = "mediaURL", default, deserialize_with = "lenient")]
        media_url: Option<String>,
    },
    GetDuration {},
    GetPosition {},
    PlayMedia {
        #[serde(rename = "mediaURL", default, deserialize_with = "lenient")]
        media_url: Option<String>,
        #[serde(default)]
        metadata: Option<Value>,
    },
    Seek {
        #[serde(default, deserialize_with = "lenient")]
        position: Option<f64>,
    },
    Play {},
    Pause {},
    #[serde(other)]
    Unrecognized,
}

impl MediaVerb {
    pub fn name(&self) -> &'static str {
        match self {
            MediaVerb::DisplayImage { .. } => "displayImage",
            MediaVerb::GetDuration {} => "getDuration",
            MediaVerb::GetPosition {} => "getPosition",
            MediaVerb::PlayMedia { .. } => "playMedia",
            MediaVerb::Seek { .. } => "seek",
            MediaVerb::Play {} => "play",
            MediaVerb::Pause {} => "pause",
            MediaVerb::Unrecognized => "unrecognized",
        }
    }
}

/// A validated media command
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub verb: MediaVerb,
    pub request_id: Option<RequestId>,
    /// The command object as received
    pub raw: Value,
}

impl MediaCommand {
    /// `None` unless the object is a map with a string `type`
    pub fn parse(command: &Value) -> Option<Self> {
        command.get("type")?.as_str()?;
        let verb = MediaVerb::deserialize(command).ok()?;
        let request_id = command
            .get("requestId")
            .filter(|id| !id.is_null())
            .cloned()
            .map(RequestId);

        Some(Self {
            verb,
            request_id,
            raw: command.clone(),
        })
    }

    /// Whether the sender expects a reply
    pub fn wants_response(&self) -> bool {
        !self
            .request_id
            .as_ref()
            .is_some_and(RequestId::is_unsolicited)
    }
}

/// Service command verbs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServiceVerb {
    Close {},
    #[serde(other)]
    Unrecognized,
}

impl ServiceVerb {
    pub fn parse(command: &Value) -> Option<Self> {
        command.get("type")?.as_str()?;
        ServiceVerb::deserialize(command).ok()
    }
}

/// Encode seconds the way a browser would: whole numbers as integers, NaN as 0
pub fn seconds(value: f64) -> Value {
    if !value.is_finite() {
        return json!(0);
    }
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Builds `connectsdk.mediaCommandResponse` payloads
pub struct MediaCommandResponse<'a> {
    command: &'a MediaCommand,
    position: Option<f64>,
    duration: Option<f64>,
}

impl<'a> MediaCommandResponse<'a> {
    /// Bare acknowledgement echoing `type` and `requestId`
    pub fn ack(command: &'a MediaCommand) -> Self {
        Self {
            command,
            position: None,
            duration: None,
        }
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn into_payload(self) -> Value {
        let mut response = serde_json::Map::new();
        response.insert("type".to_string(), json!(self.command.verb.name()));
        if let Some(position) = self.position {
            response.insert("position".to_string(), seconds(position));
        }
        if let Some(duration) = self.duration {
            response.insert("duration".to_string(), seconds(duration));
        }
        if let Some(RequestId(id)) = &self.command.request_id {
            response.insert("requestId".to_string(), id.clone());
        }

        json!({
            "contentType": MEDIA_COMMAND_RESPONSE,
            "mediaCommandResponse": response,
        })
    }
}

/// `connectsdk.mediaEvent` playState payload
pub fn play_state_event(
    status: &str,
    position: f64,
    duration: f64,
    request_id: &RequestId,
) -> Value {
    json!({
        "contentType": MEDIA_EVENT,
        "mediaEvent": {
            "type": "playState",
            "playState": status,
            "position": seconds(position),
            "duration": seconds(duration),
            "requestId": request_id.0,
        }
    })
}
