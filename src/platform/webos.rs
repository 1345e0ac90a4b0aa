// webOS profile
// Backed by the app channel; channel events are queued for the manager to route

use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, info};

use super::{Capability, PlatformType};
use crate::channel::{
    AppChannel, ChannelEvent, ChannelEventKind, MessageSink, TransportEvent,
};
use crate::events::{Listener, ListenerContext, Observable};

/// Hardware remote keys handled on webOS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKey {
    Play,
    Pause,
    Stop,
}

impl RemoteKey {
    pub fn from_key_code(code: u32) -> Option<Self> {
        match code {
            415 => Some(RemoteKey::Play),
            19 => Some(RemoteKey::Pause),
            413 => Some(RemoteKey::Stop),
            _ => None,
        }
    }
}

pub struct WebOsProfile {
    platform: PlatformType,
    channel: AppChannel,
    inbox: Rc<RefCell<VecDeque<ChannelEvent>>>,
    context: ListenerContext,
    listening: Option<Listener<ChannelEvent>>,
}

impl WebOsProfile {
    pub fn new(platform: PlatformType, channel: AppChannel) -> Self {
        Self {
            platform,
            channel,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            context: ListenerContext::new(),
            listening: None,
        }
    }

    pub fn channel(&self) -> &AppChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut AppChannel {
        &mut self.channel
    }

    /// Feed one transport event to the channel
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        self.channel.handle_transport_event(event);
    }

    /// Channel events received since the last call, in order
    pub fn take_events(&mut self) -> Vec<ChannelEvent> {
        self.inbox.borrow_mut().drain(..).collect()
    }

    /// Detach from the channel and close it
    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listening.take() {
            for kind in CHANNEL_KINDS {
                self.channel.off(kind, &listener, Some(self.context));
            }
        }
        self.channel.stop();
    }
}

const CHANNEL_KINDS: [ChannelEventKind; 4] = [
    ChannelEventKind::Ready,
    ChannelEventKind::Message,
    ChannelEventKind::Join,
    ChannelEventKind::Depart,
];

impl MessageSink for WebOsProfile {
    fn send_message(&mut self, to: &str, payload: Value) {
        self.channel.send_message(to, payload);
    }

    fn broadcast_message(&mut self, payload: Value) {
        self.channel.broadcast_message(payload);
    }
}

impl Capability for WebOsProfile {
    fn name(&self) -> &'static str {
        self.platform.display_name()
    }

    fn is_interactive(&self) -> bool {
        true
    }

    fn init(&mut self) {
        if self.listening.is_none() {
            let inbox = self.inbox.clone();
            let listener: Listener<ChannelEvent> =
                Rc::new(move |event: &ChannelEvent| inbox.borrow_mut().push_back(event.clone()));
            for kind in CHANNEL_KINDS {
                self.channel.on(kind, listener.clone(), Some(self.context));
            }
            self.listening = Some(listener);
        } else {
            debug!("webOS profile already listening to its channel");
        }

        info!("{} starting app channel", self.name());
        self.channel.start();
    }
}
