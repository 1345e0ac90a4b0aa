// App channel: one duplex socket turned into a multi-party peer channel
// Join/depart tracking, directed and broadcast delivery, connect/stop lifecycle

pub mod protocol;
pub mod provider;
pub mod service_bus;
pub mod transport;

pub use protocol::{Envelope, Peer, PeerMessage};
pub use provider::{ChannelProvider, OnConnected, ProviderSources, TransportProvider};
pub use transport::{
    SocketFactory, Transport, TransportEvent, TransportEvents, TransportId, WsConnector,
};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::{Emitter, Event, Observable};
use protocol::is_empty_payload;

/// Connection lifecycle of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Waiting for the provider, or for the held socket to open
    Connecting,
    Connected,
    /// Close requested, waiting for the socket to confirm
    Stopping,
}

/// Events the channel reports to its listeners
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Ready,
    Message(PeerMessage),
    Join(Peer),
    Depart(Peer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventKind {
    Ready,
    Message,
    Join,
    Depart,
}

impl Event for ChannelEvent {
    type Kind = ChannelEventKind;

    fn kind(&self) -> ChannelEventKind {
        match self {
            ChannelEvent::Ready => ChannelEventKind::Ready,
            ChannelEvent::Message(_) => ChannelEventKind::Message,
            ChannelEvent::Join(_) => ChannelEventKind::Join,
            ChannelEvent::Depart(_) => ChannelEventKind::Depart,
        }
    }
}

/// Best-effort send surface shared by every capability profile
pub trait MessageSink {
    fn send_message(&mut self, to: &str, payload: Value);
    fn broadcast_message(&mut self, payload: Value);
}

/// The process's app channel
///
/// Owns the provider and at most one transport. All transport activity
/// arrives through [`AppChannel::handle_transport_event`], fed from the queue
/// whose sender was given to [`AppChannel::new`].
pub struct AppChannel {
    provider: Box<dyn TransportProvider>,
    events: TransportEvents,
    state: ConnectionState,
    stop_requested: bool,
    acquiring: bool,
    restart_after_close: bool,
    transport: Option<Box<dyn Transport>>,
    emitter: Emitter<ChannelEvent>,
}

impl AppChannel {
    pub fn new(provider: Box<dyn TransportProvider>, events: TransportEvents) -> Self {
        Self {
            provider,
            events,
            state: ConnectionState::Disconnected,
            stop_requested: false,
            acquiring: false,
            restart_after_close: false,
            transport: None,
            emitter: Emitter::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Begin acquiring a transport; a no-op while one is held or on its way
    pub fn start(&mut self) {
        match self.state {
            ConnectionState::Stopping => {
                debug!("Channel start requested while stopping; restarting after close");
                self.restart_after_close = true;
                return;
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("Channel already {:?}, start ignored", self.state);
                return;
            }
            ConnectionState::Disconnected => {}
        }

        self.stop_requested = false;
        self.state = ConnectionState::Connecting;

        if self.acquiring {
            // A stopped acquisition is still pending; let it complete instead
            debug!("Reusing pending transport acquisition");
            return;
        }

        self.acquiring = true;
        info!("Acquiring app channel transport via {}", self.provider.name());
        let events = self.events.clone();
        self.provider.acquire(Box::new(move |transport| {
            let _ = events.send(TransportEvent::Acquired(transport));
        }));
    }

    /// Close the held transport, or cancel a pending acquisition
    pub fn stop(&mut self) {
        self.stop_requested = true;
        self.restart_after_close = false;

        match self.transport.as_mut() {
            Some(transport) => {
                info!("Stopping app channel, closing transport {}", transport.id());
                transport.close();
                self.state = ConnectionState::Stopping;
            }
            None => {
                self.state = ConnectionState::Disconnected;
            }
        }
    }

    /// Apply one event from the transport layer
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Acquired(transport) => self.adopt(transport),
            TransportEvent::Opened(id) => {
                if !self.is_current(id) {
                    return;
                }
                if self.state == ConnectionState::Connecting {
                    info!("App channel transport {} ready", id);
                    self.state = ConnectionState::Connected;
                    self.emit(&ChannelEvent::Ready);
                }
            }
            TransportEvent::Frame(id, frame) => {
                if self.is_current(id) && self.state != ConnectionState::Stopping {
                    self.handle_frame(&frame);
                }
            }
            TransportEvent::Error(id, error) => {
                if self.is_current(id) {
                    warn!("App channel transport {} error: {}", id, error);
                }
            }
            TransportEvent::Closed(id) => {
                if !self.is_current(id) {
                    return;
                }
                info!("App channel transport {} closed", id);
                self.transport = None;
                self.state = ConnectionState::Disconnected;

                if std::mem::take(&mut self.restart_after_close) {
                    self.start();
                }
            }
        }
    }

    fn adopt(&mut self, mut transport: Box<dyn Transport>) {
        self.acquiring = false;

        if self.stop_requested {
            info!("Stop requested before transport {} arrived; closing it", transport.id());
            transport.close();
            self.state = ConnectionState::Disconnected;
            return;
        }

        if let Some(current) = &self.transport {
            warn!(
                "Transport {} arrived while {} is held; closing the newcomer",
                transport.id(),
                current.id()
            );
            transport.close();
            return;
        }

        debug!("Adopted app channel transport {}", transport.id());
        self.transport = Some(transport);
        self.state = ConnectionState::Connecting;
    }

    fn is_current(&self, id: TransportId) -> bool {
        self.transport.as_ref().is_some_and(|t| t.id() == id)
    }

    /// Receive path for one inbound frame; malformed frames are dropped
    pub fn handle_frame(&mut self, frame: &str) {
        let envelope = match Envelope::from_frame(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Dropping malformed frame ({}): {}", e, frame);
                return;
            }
        };
        debug!("Received {:?}", envelope);

        match envelope {
            Envelope::P2p { from, payload, .. } => {
                let Some(payload) = payload.filter(|p| !is_empty_payload(p)) else {
                    return;
                };
                self.emit(&ChannelEvent::Message(PeerMessage::new(from, payload)));
            }
            Envelope::JoinRequest { payload, .. } => {
                let request_id = payload.and_then(|p| p.get("requestId").cloned());
                self.write(&Envelope::join_granted(request_id));
            }
            Envelope::Join { client, .. } => {
                let Some(peer) = client else {
                    return;
                };
                info!("Peer joined: {}", peer.id);
                self.emit(&ChannelEvent::Join(peer));
            }
            Envelope::Depart { from } => {
                let Some(id) = from else {
                    return;
                };
                info!("Peer departed: {}", id);
                self.emit(&ChannelEvent::Depart(Peer::new(id)));
            }
            Envelope::JoinResponse { .. } | Envelope::Unrecognized => {}
        }
    }

    fn write(&mut self, envelope: &Envelope) {
        if self.state == ConnectionState::Stopping {
            return;
        }
        let Some(transport) = self.transport.as_mut() else {
            debug!("No transport, dropping {:?}", envelope);
            return;
        };

        match envelope.to_frame() {
            Ok(frame) => {
                debug!("Sending frame: {}", frame);
                transport.send(frame);
            }
            Err(e) => warn!("Failed to encode envelope: {}", e),
        }
    }
}

impl MessageSink for AppChannel {
    fn send_message(&mut self, to: &str, payload: Value) {
        if is_empty_payload(&payload) {
            return;
        }
        self.write(&Envelope::directed(to, payload));
    }

    fn broadcast_message(&mut self, payload: Value) {
        if is_empty_payload(&payload) {
            return;
        }
        self.write(&Envelope::broadcast(payload));
    }
}

impl Observable<ChannelEvent> for AppChannel {
    fn emitter(&self) -> &Emitter<ChannelEvent> {
        &self.emitter
    }

    fn emitter_mut(&mut self) -> &mut Emitter<ChannelEvent> {
        &mut self.emitter
    }
}
