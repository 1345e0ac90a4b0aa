// Channel transports
// A transport is one duplex text socket; its I/O runs in a spawned task that
// reports back to the channel through `TransportEvent`s

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Identifies one transport instance so stale events can be discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(pub u64);

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A socket-like connection owned by the app channel
pub trait Transport: Send {
    fn id(&self) -> TransportId;

    /// Queue one text frame for delivery
    fn send(&mut self, frame: String);

    /// Ask the socket to close; a `Closed` event follows
    fn close(&mut self);
}

/// Everything the channel learns from the transport layer
pub enum TransportEvent {
    /// A provider finished acquisition and hands over a transport
    Acquired(Box<dyn Transport>),

    /// The socket is open and usable
    Opened(TransportId),

    /// One inbound text frame
    Frame(TransportId, String),

    /// The socket reported an error; a close usually follows
    Error(TransportId, String),

    /// The socket is closed, by either side
    Closed(TransportId),
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::Acquired(t) => write!(f, "Acquired({})", t.id()),
            TransportEvent::Opened(id) => write!(f, "Opened({})", id),
            TransportEvent::Frame(id, frame) => write!(f, "Frame({}, {})", id, frame),
            TransportEvent::Error(id, err) => write!(f, "Error({}, {})", id, err),
            TransportEvent::Closed(id) => write!(f, "Closed({})", id),
        }
    }
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Opens a transport for a channel socket URL
pub trait SocketFactory: Send + Sync {
    fn open(&self, url: &str) -> Box<dyn Transport>;
}

/// Opens WebSocket transports whose events feed one channel queue
pub struct WsConnector {
    events: TransportEvents,
    next_id: Arc<AtomicU64>,
}

impl WsConnector {
    pub fn new(events: TransportEvents) -> Self {
        Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl SocketFactory for WsConnector {
    fn open(&self, url: &str) -> Box<dyn Transport> {
        let id = TransportId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Box::new(WsTransport::spawn(id, url.to_string(), self.events.clone()))
    }
}

enum Outbound {
    Frame(String),
    Close,
}

/// WebSocket transport; the socket itself lives in a background task
pub struct WsTransport {
    id: TransportId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl WsTransport {
    /// Start connecting in the background, returning the handle immediately
    pub fn spawn(id: TransportId, url: String, events: TransportEvents) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(id, url, events, outbound_rx));
        Self {
            id,
            outbound: outbound_tx,
        }
    }
}

impl Transport for WsTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn send(&mut self, frame: String) {
        // Socket task gone means the socket is closed; a Closed event is on its way
        let _ = self.outbound.send(Outbound::Frame(frame));
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Socket task: connect, then pump frames both ways until either side closes
async fn run_socket(
    id: TransportId,
    url: String,
    events: TransportEvents,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    info!("Opening app channel socket {} to {}", id, url);

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!("App channel socket {} failed to connect: {}", id, e);
            let _ = events.send(TransportEvent::Error(id, e.to_string()));
            let _ = events.send(TransportEvent::Closed(id));
            return;
        }
    };

    info!("App channel socket {} opened", id);
    let _ = events.send(TransportEvent::Opened(id));

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = ws_sender.send(Message::Text(frame)).await {
                        warn!("App channel socket {} send failed: {}", id, e);
                        let _ = events.send(TransportEvent::Error(id, e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!("Closing app channel socket {}", id);
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Frame(id, text));
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("App channel socket {} closed by remote", id);
                    break;
                }
                Some(Ok(_)) => {
                    // Binary/ping/pong frames are not part of the channel protocol
                }
                Some(Err(e)) => {
                    warn!("App channel socket {} error: {}", id, e);
                    let _ = events.send(TransportEvent::Error(id, e.to_string()));
                    break;
                }
            },
        }
    }

    info!("App channel socket {} closed", id);
    let _ = events.send(TransportEvent::Closed(id));
}
