// Connect manager
// Owns the bound profile and the command dispatcher, and reports app-level events

use serde_json::{json, Value};
use tracing::{debug, info};

use super::cast::CastProfile;
use super::host::HostEvent;
use super::webos::RemoteKey;
use super::{Capability, HostEnvironment, PlatformType, Profile, ProfileParts};
use crate::channel::{ChannelEvent, MessageSink, Peer, PeerMessage, TransportEvent};
use crate::command::{CommandDispatcher, Dispatch, RequestId};
use crate::events::{Emitter, Event, Observable};
use crate::media::{ImageElement, MediaElement, MediaEvent, MediaStatus};

/// Events the receiver app listens to
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Ready,
    /// Anything that was not a command
    Message(PeerMessage),
    Join(Peer),
    Depart(Peer),
    MediaStatusUpdate(MediaStatus),
    /// Remote control keys
    Play,
    Pause,
    Stop,
    LoadMedia { from: Option<String>, command: Value },
    LoadImage { from: Option<String>, command: Value },
    /// A sender asked the receiver to shut down
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeEventKind {
    Ready,
    Message,
    Join,
    Depart,
    MediaStatusUpdate,
    Play,
    Pause,
    Stop,
    LoadMedia,
    LoadImage,
    Close,
}

impl BridgeEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEventKind::Ready => "ready",
            BridgeEventKind::Message => "message",
            BridgeEventKind::Join => "join",
            BridgeEventKind::Depart => "depart",
            BridgeEventKind::MediaStatusUpdate => "mediaStatusUpdate",
            BridgeEventKind::Play => "play",
            BridgeEventKind::Pause => "pause",
            BridgeEventKind::Stop => "stop",
            BridgeEventKind::LoadMedia => "loadMedia",
            BridgeEventKind::LoadImage => "loadImage",
            BridgeEventKind::Close => "close",
        }
    }

    pub fn all() -> [BridgeEventKind; 11] {
        [
            BridgeEventKind::Ready,
            BridgeEventKind::Message,
            BridgeEventKind::Join,
            BridgeEventKind::Depart,
            BridgeEventKind::MediaStatusUpdate,
            BridgeEventKind::Play,
            BridgeEventKind::Pause,
            BridgeEventKind::Stop,
            BridgeEventKind::LoadMedia,
            BridgeEventKind::LoadImage,
            BridgeEventKind::Close,
        ]
    }
}

impl Event for BridgeEvent {
    type Kind = BridgeEventKind;

    fn kind(&self) -> BridgeEventKind {
        match self {
            BridgeEvent::Ready => BridgeEventKind::Ready,
            BridgeEvent::Message(_) => BridgeEventKind::Message,
            BridgeEvent::Join(_) => BridgeEventKind::Join,
            BridgeEvent::Depart(_) => BridgeEventKind::Depart,
            BridgeEvent::MediaStatusUpdate(_) => BridgeEventKind::MediaStatusUpdate,
            BridgeEvent::Play => BridgeEventKind::Play,
            BridgeEvent::Pause => BridgeEventKind::Pause,
            BridgeEvent::Stop => BridgeEventKind::Stop,
            BridgeEvent::LoadMedia { .. } => BridgeEventKind::LoadMedia,
            BridgeEvent::LoadImage { .. } => BridgeEventKind::LoadImage,
            BridgeEvent::Close => BridgeEventKind::Close,
        }
    }
}

impl BridgeEvent {
    /// JSON form written to the host
    pub fn to_json(&self) -> Value {
        let name = self.kind().name();
        match self {
            BridgeEvent::Message(message) => json!({"bridge": name, "data": message.to_json()}),
            BridgeEvent::Join(peer) | BridgeEvent::Depart(peer) => {
                json!({"bridge": name, "data": peer})
            }
            BridgeEvent::MediaStatusUpdate(status) => json!({"bridge": name, "data": status}),
            BridgeEvent::LoadMedia { from, command } | BridgeEvent::LoadImage { from, command } => {
                json!({"bridge": name, "data": {"from": from, "command": command}})
            }
            _ => json!({"bridge": name}),
        }
    }
}

impl From<Dispatch> for BridgeEvent {
    fn from(dispatch: Dispatch) -> Self {
        match dispatch {
            Dispatch::Message(message) => BridgeEvent::Message(message),
            Dispatch::LoadMedia { from, command } => BridgeEvent::LoadMedia { from, command },
            Dispatch::LoadImage { from, command } => BridgeEvent::LoadImage { from, command },
            Dispatch::Close => BridgeEvent::Close,
        }
    }
}

/// The receiver-side entry point
pub struct ConnectManager {
    platform: PlatformType,
    profile: Profile,
    dispatcher: CommandDispatcher,
    emitter: Emitter<BridgeEvent>,
    initialized: bool,
}

impl ConnectManager {
    pub fn new(platform: PlatformType, profile: Profile) -> Self {
        info!("Platform: {} ({})", platform.display_name(), profile.name());
        Self {
            platform,
            profile,
            dispatcher: CommandDispatcher::new(),
            emitter: Emitter::new(),
            initialized: false,
        }
    }

    /// Detect the platform and bind its profile in one go
    pub fn detect(env: &HostEnvironment, parts: ProfileParts) -> Self {
        let platform = PlatformType::detect(env);
        let profile = Profile::build(platform, parts);
        Self::new(platform, profile)
    }

    pub fn platform(&self) -> PlatformType {
        self.platform
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn is_interactive(&self) -> bool {
        self.profile.is_interactive()
    }

    pub fn init(&mut self) {
        self.profile.init();
        self.initialized = true;
        self.pump();
    }

    /// Stop messaging; the channel, if any, is closed
    pub fn shutdown(&mut self) {
        if let Profile::WebOs(webos) = &mut self.profile {
            webos.shutdown();
        }
        self.initialized = false;
    }

    pub fn set_media_element(&mut self, element: Box<dyn MediaElement>) {
        self.dispatcher.set_media_element(element);
        self.status_changed(MediaStatus::Idle);
    }

    pub fn set_image_element(&mut self, element: Box<dyn ImageElement>) {
        self.dispatcher.set_image_element(element);
    }

    pub fn media_status(&self) -> Option<MediaStatus> {
        self.dispatcher.status()
    }

    pub fn set_media_status(&mut self, status: MediaStatus) {
        if self.dispatcher.set_status(status) {
            self.status_changed(status);
        }
    }

    pub fn handle_media_event(&mut self, event: MediaEvent) {
        debug!("Media event {:?}", event);
        self.set_media_status(event.status());
    }

    /// Drain events the media element reported on its own
    pub fn poll_media(&mut self) {
        loop {
            let event = self
                .dispatcher
                .media_element_mut()
                .and_then(|media| media.poll_event());
            match event {
                Some(event) => self.handle_media_event(event),
                None => break,
            }
        }
    }

    fn status_changed(&mut self, status: MediaStatus) {
        self.emit(&BridgeEvent::MediaStatusUpdate(status));

        if self.initialized && self.profile.is_interactive() {
            if let Some(event) = self.dispatcher.play_state(&RequestId::unsolicited()) {
                self.profile.broadcast_message(event);
            }
        }
    }

    /// Remote control keys; only webOS profiles listen to them
    pub fn handle_key_down(&mut self, key_code: u32) {
        if !matches!(self.profile, Profile::WebOs(_)) {
            return;
        }
        let Some(key) = RemoteKey::from_key_code(key_code) else {
            return;
        };
        let Some(media) = self.dispatcher.media_element_mut() else {
            return;
        };

        info!("{} :: {:?} command received", self.platform.display_name(), key);
        let event = match key {
            RemoteKey::Play => {
                media.play();
                BridgeEvent::Play
            }
            RemoteKey::Pause => {
                media.pause();
                BridgeEvent::Pause
            }
            RemoteKey::Stop => BridgeEvent::Stop,
        };
        self.emit(&event);
        self.poll_media();
    }

    /// Route a message through the command dispatcher
    pub fn handle_message(&mut self, message: &PeerMessage) {
        let outcome = self.dispatcher.handle_message(message, &mut self.profile);
        if let Some(dispatch) = outcome {
            self.emit(&BridgeEvent::from(dispatch));
        }
        self.poll_media();
    }

    /// Feed a transport event to the webOS channel and route what it produced
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match &mut self.profile {
            Profile::WebOs(webos) => webos.handle_transport_event(event),
            _ => {
                debug!("Transport event without a channel profile: {:?}", event);
                return;
            }
        }
        self.pump();
    }

    /// Route queued channel events
    pub fn pump(&mut self) {
        let events = match &mut self.profile {
            Profile::WebOs(webos) => webos.take_events(),
            _ => return,
        };

        for event in events {
            match event {
                ChannelEvent::Ready => self.emit(&BridgeEvent::Ready),
                ChannelEvent::Message(message) => self.handle_message(&message),
                ChannelEvent::Join(peer) => self.emit(&BridgeEvent::Join(peer)),
                ChannelEvent::Depart(peer) => self.emit(&BridgeEvent::Depart(peer)),
            }
        }
    }

    /// Apply one event reported by the hosting environment
    pub fn handle_host_event(&mut self, event: HostEvent) {
        let is_cast = matches!(self.profile, Profile::GoogleCast(_));

        match event {
            HostEvent::KeyDown { key_code } => self.handle_key_down(key_code),
            HostEvent::Message { from, message } => {
                self.handle_message(&PeerMessage::new(from, message));
            }
            HostEvent::MediaEvent { name } => match MediaEvent::from_name(&name) {
                Some(event) => self.handle_media_event(event),
                None => debug!("Ignoring media event {}", name),
            },
            HostEvent::CastReady {} if is_cast => self.emit(&BridgeEvent::Ready),
            HostEvent::SenderConnected {
                sender_id,
                user_agent,
            } if is_cast => {
                let mut details = serde_json::Map::new();
                if let Some(user_agent) = user_agent {
                    details.insert("userAgent".to_string(), Value::String(user_agent));
                }
                if let Some(peer) = CastProfile::sender_peer(sender_id.as_deref(), details) {
                    self.emit(&BridgeEvent::Join(peer));
                }
            }
            HostEvent::SenderDisconnected { sender_id, reason } if is_cast => {
                let mut details = serde_json::Map::new();
                if let Some(reason) = reason {
                    details.insert("reason".to_string(), Value::String(reason));
                }
                if let Some(peer) = CastProfile::sender_peer(sender_id.as_deref(), details) {
                    self.emit(&BridgeEvent::Depart(peer));
                }
            }
            // Cast keeps media commands on its own media manager
            HostEvent::CastMessage { sender_id, data } if is_cast => {
                let message = CastProfile::inbound_message(sender_id, &data);
                self.emit(&BridgeEvent::Message(message));
            }
            other => debug!("Ignoring host event {:?} on {}", other, self.platform.name()),
        }
    }
}

impl MessageSink for ConnectManager {
    fn send_message(&mut self, to: &str, payload: Value) {
        self.profile.send_message(to, payload);
    }

    fn broadcast_message(&mut self, payload: Value) {
        self.profile.broadcast_message(payload);
    }
}

impl Observable<BridgeEvent> for ConnectManager {
    fn emitter(&self) -> &Emitter<BridgeEvent> {
        &self.emitter
    }

    fn emitter_mut(&mut self) -> &mut Emitter<BridgeEvent> {
        &mut self.emitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AppChannel, ConnectionState, TransportId};
    use crate::command::MEDIA_COMMAND;
    use crate::events::Listener;
    use crate::platform::{AirPlayProfile, CastProfile, HostOutput, WebOsProfile};
    use crate::testing::{FakeMedia, ManualProvider, RecordingTransport};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::mpsc;

    fn record_all(manager: &mut ConnectManager) -> Rc<RefCell<Vec<BridgeEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let listener: Listener<BridgeEvent> =
            Rc::new(move |e: &BridgeEvent| sink.borrow_mut().push(e.clone()));
        for kind in BridgeEventKind::all() {
            manager.on(kind, listener.clone(), None);
        }
        seen
    }

    struct WebOsHarness {
        manager: ConnectManager,
        provider: ManualProvider,
        queue: mpsc::UnboundedReceiver<TransportEvent>,
    }

    impl WebOsHarness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let provider = ManualProvider::new();
            let channel = AppChannel::new(Box::new(provider.clone()), tx);
            let profile = Profile::WebOs(WebOsProfile::new(PlatformType::WebOsNative, channel));
            Self {
                manager: ConnectManager::new(PlatformType::WebOsNative, profile),
                provider,
                queue: rx,
            }
        }

        fn connect(&mut self) -> RecordingTransport {
            self.manager.init();
            let transport = RecordingTransport::new(1);
            self.provider.complete(transport.clone());
            while let Ok(event) = self.queue.try_recv() {
                self.manager.handle_transport_event(event);
            }
            self.manager
                .handle_transport_event(TransportEvent::Opened(transport.id()));
            transport
        }

        fn frame(&mut self, frame: &str) {
            self.manager
                .handle_transport_event(TransportEvent::Frame(TransportId(1), frame.to_string()));
        }
    }

    #[test]
    fn test_detect_binds_profile() {
        let env = HostEnvironment {
            user_agent: "Mozilla/5.0 (Web0S; Linux/SmartTV)".to_string(),
            has_service_bus: false,
            has_cast_receiver: false,
        };
        let manager = ConnectManager::detect(&env, ProfileParts::default());
        assert_eq!(manager.platform(), PlatformType::WebOsWebApp);
        // No channel supplied, so messaging is off
        assert!(matches!(manager.profile(), Profile::Default(_)));
    }

    #[test]
    fn test_webos_end_to_end_get_duration() {
        let mut h = WebOsHarness::new();
        let seen = record_all(&mut h.manager);
        h.manager.set_media_element(Box::new(FakeMedia::new(120.0)));
        let transport = h.connect();

        h.frame(
            r#"{"type":"p2p","from":"phone","payload":{"contentType":"connectsdk.mediaCommand","mediaCommand":{"type":"getDuration","requestId":7}}}"#,
        );

        assert_eq!(
            transport.sent_json(),
            vec![json!({
                "type": "p2p",
                "to": "phone",
                "payload": {
                    "contentType": "connectsdk.mediaCommandResponse",
                    "mediaCommandResponse": {"type": "getDuration", "duration": 120, "requestId": 7}
                }
            })]
        );
        assert!(seen.borrow().contains(&BridgeEvent::Ready));
    }

    #[test]
    fn test_webos_forwards_plain_messages_and_peers() {
        let mut h = WebOsHarness::new();
        let seen = record_all(&mut h.manager);
        h.connect();
        seen.borrow_mut().clear();

        h.frame(r#"{"type":"p2p.join","client":{"id":"phone"}}"#);
        h.frame(r#"{"type":"p2p","from":"phone","payload":"hi"}"#);
        h.frame(r#"{"type":"p2p.depart","from":"phone"}"#);

        assert_eq!(
            *seen.borrow(),
            vec![
                BridgeEvent::Join(Peer::new("phone")),
                BridgeEvent::Message(PeerMessage::new(Some("phone".to_string()), json!("hi"))),
                BridgeEvent::Depart(Peer::new("phone")),
            ]
        );
    }

    #[test]
    fn test_status_change_broadcasts_play_state_when_interactive() {
        let mut h = WebOsHarness::new();
        let media = FakeMedia::new(60.0);
        h.manager.set_media_element(Box::new(media.clone()));
        let transport = h.connect();

        media.raise(MediaEvent::Playing);
        h.manager.poll_media();
        h.manager.set_media_status(MediaStatus::Playing);

        let sent = transport.sent_json();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            json!({
                "type": "p2p",
                "payload": {
                    "contentType": "connectsdk.mediaEvent",
                    "mediaEvent": {
                        "type": "playState",
                        "playState": "playing",
                        "position": 0,
                        "duration": 60,
                        "requestId": -1
                    }
                }
            })
        );
        assert_eq!(h.manager.media_status(), Some(MediaStatus::Playing));
    }

    #[test]
    fn test_remote_keys_on_webos() {
        let mut h = WebOsHarness::new();
        let seen = record_all(&mut h.manager);
        h.manager.handle_key_down(415);
        assert!(seen.borrow().is_empty());

        let media = FakeMedia::new(60.0);
        h.manager.set_media_element(Box::new(media.clone()));
        seen.borrow_mut().clear();

        h.manager.handle_key_down(415);
        h.manager.handle_key_down(19);
        h.manager.handle_key_down(413);
        h.manager.handle_key_down(13);

        assert_eq!(media.calls(), vec!["play", "pause"]);
        assert_eq!(
            *seen.borrow(),
            vec![BridgeEvent::Play, BridgeEvent::Pause, BridgeEvent::Stop]
        );
    }

    #[test]
    fn test_remote_keys_ignored_off_webos() {
        let (output, _rx) = HostOutput::channel();
        let mut manager = ConnectManager::new(
            PlatformType::AirPlay,
            Profile::AirPlay(AirPlayProfile::new(Box::new(output))),
        );
        let media = FakeMedia::new(60.0);
        manager.set_media_element(Box::new(media.clone()));
        manager.handle_host_event(HostEvent::KeyDown { key_code: 415 });
        assert!(media.calls().is_empty());
    }

    #[test]
    fn test_airplay_injected_command_answers_through_signal() {
        let (output, mut rx) = HostOutput::channel();
        let mut manager = ConnectManager::new(
            PlatformType::AirPlay,
            Profile::AirPlay(AirPlayProfile::new(Box::new(output))),
        );
        manager.init();
        manager.set_media_element(Box::new(FakeMedia::new(30.0)));
        // Registration broadcasts the idle state
        let idle = rx.try_recv().unwrap();
        assert!(idle.starts_with("connectsdk://"));

        manager.handle_host_event(HostEvent::Message {
            from: Some("iphone".to_string()),
            message: json!({"contentType": MEDIA_COMMAND, "mediaCommand": {"type": "getPosition", "requestId": 2}}),
        });

        let signal = rx.try_recv().unwrap();
        let body: Value = serde_json::from_str(signal.trim_start_matches("connectsdk://")).unwrap();
        assert_eq!(body["mediaCommandResponse"]["position"], json!(0));
        assert_eq!(body["mediaCommandResponse"]["requestId"], json!(2));
    }

    #[test]
    fn test_cast_host_events() {
        let (output, _rx) = HostOutput::channel();
        let mut manager = ConnectManager::new(
            PlatformType::GoogleCast,
            Profile::GoogleCast(CastProfile::new(Box::new(output))),
        );
        let seen = record_all(&mut manager);

        manager.handle_host_event(HostEvent::CastReady {});
        manager.handle_host_event(HostEvent::SenderConnected {
            sender_id: Some("s1".to_string()),
            user_agent: None,
        });
        manager.handle_host_event(HostEvent::SenderConnected {
            sender_id: None,
            user_agent: None,
        });
        manager.handle_host_event(HostEvent::CastMessage {
            sender_id: Some("s1".to_string()),
            data: r#"{"contentType":"connectsdk.mediaCommand","mediaCommand":{"type":"play"}}"#
                .to_string(),
        });
        manager.handle_host_event(HostEvent::SenderDisconnected {
            sender_id: Some("s1".to_string()),
            reason: None,
        });

        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], BridgeEvent::Ready);
        assert_eq!(seen[1], BridgeEvent::Join(Peer::new("s1")));
        assert!(matches!(&seen[2], BridgeEvent::Message(m) if m.message["contentType"] == "connectsdk.mediaCommand"));
        assert_eq!(seen[3], BridgeEvent::Depart(Peer::new("s1")));
    }

    #[test]
    fn test_cast_events_ignored_on_other_profiles() {
        let mut h = WebOsHarness::new();
        let seen = record_all(&mut h.manager);
        h.manager.handle_host_event(HostEvent::CastReady {});
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_close_command_surfaces_event() {
        let mut h = WebOsHarness::new();
        let seen = record_all(&mut h.manager);
        h.connect();
        seen.borrow_mut().clear();

        h.frame(r#"{"type":"p2p","from":"phone","payload":{"contentType":"connectsdk.serviceCommand","serviceCommand":{"type":"close"}}}"#);
        assert_eq!(*seen.borrow(), vec![BridgeEvent::Close]);

        h.manager.shutdown();
        assert_eq!(
            match h.manager.profile() {
                Profile::WebOs(webos) => webos.channel().state(),
                _ => unreachable!(),
            },
            ConnectionState::Stopping
        );
    }

    #[test]
    fn test_bridge_event_json() {
        assert_eq!(BridgeEvent::Ready.to_json(), json!({"bridge": "ready"}));
        assert_eq!(
            BridgeEvent::MediaStatusUpdate(MediaStatus::Paused).to_json(),
            json!({"bridge": "mediaStatusUpdate", "data": "paused"})
        );
    }
}
