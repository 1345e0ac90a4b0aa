// Stdio host bridge
// JSON lines in from whatever embeds the bridge, signals and cast traffic out

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::airplay::OutOfBandSignal;
use super::cast::CastMessageBus;

/// One line of host input
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    /// Remote control key press
    KeyDown {
        #[serde(rename = "keyCode")]
        key_code: u32,
    },

    /// Message delivered by the host on behalf of a sender
    Message {
        #[serde(default)]
        from: Option<String>,
        message: Value,
    },

    /// Media element event by DOM name (`playing`, `ended`, ...)
    MediaEvent { name: String },

    /// Cast receiver manager is ready
    CastReady {},

    SenderConnected {
        #[serde(rename = "senderId", default)]
        sender_id: Option<String>,
        #[serde(rename = "userAgent", default)]
        user_agent: Option<String>,
    },

    SenderDisconnected {
        #[serde(rename = "senderId", default)]
        sender_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },

    /// Raw data from the cast message bus
    CastMessage {
        #[serde(rename = "senderId", default)]
        sender_id: Option<String>,
        data: String,
    },

    #[serde(other)]
    Unrecognized,
}

impl HostEvent {
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Line-oriented output back to the host
///
/// Lines are queued and written by [`run_stdout_writer`], so the core never
/// blocks on stdout.
#[derive(Clone)]
pub struct HostOutput {
    lines: mpsc::UnboundedSender<String>,
}

impl HostOutput {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (lines, rx) = mpsc::unbounded_channel();
        (Self { lines }, rx)
    }

    pub fn write_line(&self, line: String) {
        if self.lines.send(line).is_err() {
            debug!("Host output closed, dropping line");
        }
    }

    pub fn report(&self, value: &Value) {
        self.write_line(value.to_string());
    }
}

impl CastMessageBus for HostOutput {
    fn start(&mut self, namespace: &str) {
        self.report(&json!({"cast": "start", "namespace": namespace}));
    }

    fn send(&mut self, to: &str, message: String) {
        self.report(&json!({"cast": "send", "to": to, "message": message}));
    }

    fn broadcast(&mut self, message: String) {
        self.report(&json!({"cast": "broadcast", "message": message}));
    }
}

impl OutOfBandSignal for HostOutput {
    fn signal(&mut self, url: String) {
        self.write_line(url);
    }
}

/// Drain queued host output to stdout until every sender is gone
pub async fn run_stdout_writer(mut lines: mpsc::UnboundedReceiver<String>) {
    let mut stdout = BufWriter::new(tokio::io::stdout());

    while let Some(line) = lines.recv().await {
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        };
        if let Err(e) = written.await {
            warn!("Failed to write host output: {}", e);
            break;
        }
    }
}
