// App channel relay server
// Local stand-in for the TV gateway: one receiver on /receiver, any number of senders
//
// Usage: cargo run --bin app-channel-server [-- --addr 127.0.0.1:9998]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use connect_bridge::channel::{Envelope, Peer};

const DEFAULT_ADDR: &str = "127.0.0.1:9998";
const RECEIVER_PATH: &str = "/receiver";
/// `from` stamped on frames the receiver sends to senders
const RECEIVER_ID: &str = "receiver";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Endpoint {
    Receiver,
    Sender(String),
}

/// Frames to deliver, in order
type Deliveries = Vec<(Endpoint, Envelope)>;

/// Join bookkeeping and routing; no I/O
#[derive(Debug, Default)]
struct Relay {
    receiver: bool,
    senders: BTreeSet<String>,
    joined: BTreeSet<String>,
    /// join request id -> sender waiting on it
    pending: HashMap<String, String>,
    next_request: u64,
}

impl Relay {
    /// `None` when a receiver is already attached
    fn connect_receiver(&mut self) -> Option<Deliveries> {
        if self.receiver {
            return None;
        }
        self.receiver = true;

        let waiting: Vec<String> = self.senders.iter().cloned().collect();
        Some(
            waiting
                .into_iter()
                .map(|sender| self.join_request(sender))
                .collect(),
        )
    }

    fn disconnect_receiver(&mut self) {
        self.receiver = false;
        self.joined.clear();
        self.pending.clear();
    }

    fn connect_sender(&mut self, id: &str) -> Deliveries {
        self.senders.insert(id.to_string());
        if self.receiver {
            vec![self.join_request(id.to_string())]
        } else {
            Vec::new()
        }
    }

    fn disconnect_sender(&mut self, id: &str) -> Deliveries {
        self.senders.remove(id);
        self.pending.retain(|_, sender| sender != id);

        if self.joined.remove(id) && self.receiver {
            vec![(
                Endpoint::Receiver,
                Envelope::Depart {
                    from: Some(id.to_string()),
                },
            )]
        } else {
            Vec::new()
        }
    }

    fn join_request(&mut self, sender: String) -> (Endpoint, Envelope) {
        self.next_request += 1;
        let request_id = format!("join-{}", self.next_request);
        self.pending.insert(request_id.clone(), sender.clone());

        (
            Endpoint::Receiver,
            Envelope::JoinRequest {
                from: Some(sender),
                payload: Some(json!({ "requestId": request_id })),
            },
        )
    }

    /// Route one envelope received from `origin`
    fn route(&mut self, origin: &Endpoint, envelope: Envelope) -> Deliveries {
        match (origin, envelope) {
            (Endpoint::Receiver, Envelope::JoinResponse { payload, .. }) => {
                self.answer_join(payload.unwrap_or(Value::Null))
            }
            (Endpoint::Receiver, Envelope::P2p { to, payload, .. }) => {
                let targets: Vec<String> = match to {
                    Some(to) if self.joined.contains(&to) => vec![to],
                    Some(to) => {
                        warn!("Receiver addressed unknown sender {}", to);
                        Vec::new()
                    }
                    None => self.joined.iter().cloned().collect(),
                };
                targets
                    .into_iter()
                    .map(|target| {
                        (
                            Endpoint::Sender(target),
                            Envelope::P2p {
                                to: None,
                                from: Some(RECEIVER_ID.to_string()),
                                payload: payload.clone(),
                            },
                        )
                    })
                    .collect()
            }
            (Endpoint::Sender(id), Envelope::P2p { payload, .. }) => {
                if !self.joined.contains(id) {
                    warn!("Dropping message from {} before it joined", id);
                    return Vec::new();
                }
                vec![(
                    Endpoint::Receiver,
                    Envelope::P2p {
                        to: None,
                        from: Some(id.clone()),
                        payload,
                    },
                )]
            }
            (origin, envelope) => {
                warn!("Ignoring {:?} from {:?}", envelope, origin);
                Vec::new()
            }
        }
    }

    fn answer_join(&mut self, payload: Value) -> Deliveries {
        let Some(request_id) = payload.get("requestId").and_then(Value::as_str) else {
            warn!("Join response without a requestId: {}", payload);
            return Vec::new();
        };
        let Some(sender) = self.pending.remove(request_id) else {
            warn!("Join response for unknown request {}", request_id);
            return Vec::new();
        };
        let allowed = payload.get("allowJoin").and_then(Value::as_bool) == Some(true);

        let mut out = vec![(
            Endpoint::Sender(sender.clone()),
            Envelope::JoinResponse {
                to: Some(sender.clone()),
                from: Some(RECEIVER_ID.to_string()),
                payload: Some(json!({ "allowJoin": allowed })),
            },
        )];
        if allowed {
            info!("Sender {} joined", sender);
            self.joined.insert(sender.clone());
            out.push((
                Endpoint::Receiver,
                Envelope::Join {
                    client: Some(Peer::new(sender)),
                    from: None,
                },
            ));
        }
        out
    }
}

type Outbox = mpsc::UnboundedSender<Message>;

#[derive(Default)]
struct Hub {
    relay: Relay,
    outboxes: HashMap<Endpoint, Outbox>,
}

impl Hub {
    fn deliver(&self, deliveries: Deliveries) {
        for (endpoint, envelope) in deliveries {
            let Some(outbox) = self.outboxes.get(&endpoint) else {
                warn!("No connection for {:?}", endpoint);
                continue;
            };
            match envelope.to_frame() {
                Ok(frame) => {
                    if outbox.send(Message::Text(frame)).is_err() {
                        error!("Failed to queue frame for {:?}", endpoint);
                    }
                }
                Err(e) => error!("Failed to encode envelope: {}", e),
            }
        }
    }
}

type SharedHub = Arc<Mutex<Hub>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = match args.get(1).map(String::as_str) {
        Some("--addr") => args.get(2).cloned().unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        Some(other) => {
            eprintln!("Unknown argument: {}", other);
            eprintln!("Usage: {} [--addr <host:port>]", args[0]);
            std::process::exit(1);
        }
        None => DEFAULT_ADDR.to_string(),
    };

    let listener = TcpListener::bind(&addr).await?;
    info!("App channel relay listening on ws://{}", addr);
    info!("Receiver connects to ws://{}{}, senders to any other path", addr, RECEIVER_PATH);

    let hub: SharedHub = Arc::new(Mutex::new(Hub::default()));
    let next_sender = Arc::new(AtomicU64::new(1));

    while let Ok((stream, peer_addr)) = listener.accept().await {
        tokio::spawn(handle_connection(stream, peer_addr, hub.clone(), next_sender.clone()));
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: SharedHub,
    next_sender: Arc<AtomicU64>,
) {
    let mut path = String::new();
    let record_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();
        Ok(response)
    };
    let ws_stream = match accept_hdr_async(stream, record_path).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let endpoint = if path == RECEIVER_PATH {
        Endpoint::Receiver
    } else {
        Endpoint::Sender(format!("sender-{}", next_sender.fetch_add(1, Ordering::Relaxed)))
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    {
        let mut hub = hub.lock().await;
        let deliveries = match &endpoint {
            Endpoint::Receiver => match hub.relay.connect_receiver() {
                Some(deliveries) => deliveries,
                None => {
                    warn!("Second receiver from {} rejected", addr);
                    let _ = ws_sender.close().await;
                    return;
                }
            },
            Endpoint::Sender(id) => hub.relay.connect_sender(id),
        };
        info!("{:?} connected from {}", endpoint, addr);
        hub.outboxes.insert(endpoint.clone(), tx);
        hub.deliver(deliveries);
    }

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                error!("Error receiving from {:?}: {}", endpoint, e);
                break;
            }
        };

        match msg {
            Message::Text(text) => match Envelope::from_frame(&text) {
                Ok(envelope) => {
                    let mut hub = hub.lock().await;
                    let deliveries = hub.relay.route(&endpoint, envelope);
                    hub.deliver(deliveries);
                }
                Err(e) => warn!("Malformed frame from {:?}: {}", endpoint, e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut hub = hub.lock().await;
        hub.outboxes.remove(&endpoint);
        let deliveries = match &endpoint {
            Endpoint::Receiver => {
                hub.relay.disconnect_receiver();
                Vec::new()
            }
            Endpoint::Sender(id) => hub.relay.disconnect_sender(id),
        };
        hub.deliver(deliveries);
    }
    info!("{:?} disconnected", endpoint);

    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(id: &str) -> Endpoint {
        Endpoint::Sender(id.to_string())
    }

    fn join_response(request_id: &str, allow: bool) -> Envelope {
        Envelope::JoinResponse {
            to: None,
            from: None,
            payload: Some(json!({"allowJoin": allow, "requestId": request_id})),
        }
    }

    #[test]
    fn test_sender_join_flow() {
        let mut relay = Relay::default();
        assert!(relay.connect_receiver().unwrap().is_empty());

        let out = relay.connect_sender("sender-1");
        assert_eq!(
            out,
            vec![(
                Endpoint::Receiver,
                Envelope::JoinRequest {
                    from: Some("sender-1".to_string()),
                    payload: Some(json!({"requestId": "join-1"})),
                }
            )]
        );

        let out = relay.route(&Endpoint::Receiver, join_response("join-1", true));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, sender("sender-1"));
        assert_eq!(
            out[1],
            (
                Endpoint::Receiver,
                Envelope::Join {
                    client: Some(Peer::new("sender-1")),
                    from: None
                }
            )
        );
    }

    #[test]
    fn test_senders_waiting_for_receiver_are_announced() {
        let mut relay = Relay::default();
        assert!(relay.connect_sender("a").is_empty());
        assert!(relay.connect_sender("b").is_empty());

        let out = relay.connect_receiver().unwrap();
        assert_eq!(out.len(), 2);
        assert!(relay.connect_receiver().is_none());
    }

    #[test]
    fn test_p2p_routing() {
        let mut relay = Relay::default();
        relay.connect_receiver();
        for (i, id) in ["a", "b"].iter().enumerate() {
            relay.connect_sender(id);
            relay.route(&Endpoint::Receiver, join_response(&format!("join-{}", i + 1), true));
        }

        let out = relay.route(
            &sender("a"),
            Envelope::P2p {
                to: None,
                from: Some("spoofed".to_string()),
                payload: Some(json!({"hi": 1})),
            },
        );
        assert_eq!(
            out,
            vec![(
                Endpoint::Receiver,
                Envelope::P2p {
                    to: None,
                    from: Some("a".to_string()),
                    payload: Some(json!({"hi": 1}))
                }
            )]
        );

        let directed = relay.route(&Endpoint::Receiver, Envelope::directed("b", json!("x")));
        assert_eq!(directed.len(), 1);
        assert_eq!(directed[0].0, sender("b"));

        let broadcast = relay.route(&Endpoint::Receiver, Envelope::broadcast(json!("y")));
        let targets: Vec<Endpoint> = broadcast.into_iter().map(|(to, _)| to).collect();
        assert_eq!(targets, vec![sender("a"), sender("b")]);
    }

    #[test]
    fn test_unjoined_sender_is_dropped_and_denied_join() {
        let mut relay = Relay::default();
        relay.connect_receiver();
        relay.connect_sender("a");

        let out = relay.route(&sender("a"), Envelope::broadcast(json!("early")));
        assert!(out.is_empty());

        let out = relay.route(&Endpoint::Receiver, join_response("join-1", false));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, sender("a"));
    }

    #[test]
    fn test_depart_only_for_joined_senders() {
        let mut relay = Relay::default();
        relay.connect_receiver();
        relay.connect_sender("a");
        relay.connect_sender("b");
        relay.route(&Endpoint::Receiver, join_response("join-1", true));

        assert_eq!(
            relay.disconnect_sender("a"),
            vec![(
                Endpoint::Receiver,
                Envelope::Depart {
                    from: Some("a".to_string())
                }
            )]
        );
        assert!(relay.disconnect_sender("b").is_empty());
        assert!(relay.pending.is_empty());
    }
}
