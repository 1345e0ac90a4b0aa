// Command dispatcher
// Turns received peer messages into media/service actions and correlated responses

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    play_state_event, Content, MediaCommand, MediaCommandResponse, MediaVerb, RequestId,
    ServiceVerb,
};
use crate::channel::{MessageSink, PeerMessage};
use crate::media::{ImageElement, MediaElement, MediaStatus};

/// What the surrounding app should hear about after a message was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Not a command; forwarded untouched
    Message(PeerMessage),
    /// `playMedia` loaded a new source
    LoadMedia { from: Option<String>, command: Value },
    /// `displayImage` loaded a new image
    LoadImage { from: Option<String>, command: Value },
    /// A sender asked the receiver to close
    Close,
}

/// Registered media state plus the command handlers acting on it
#[derive(Default)]
pub struct CommandDispatcher {
    media: Option<Box<dyn MediaElement>>,
    image: Option<Box<dyn ImageElement>>,
    status: Option<MediaStatus>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the element commands act on; status starts over at idle
    pub fn set_media_element(&mut self, element: Box<dyn MediaElement>) {
        self.media = Some(element);
        self.status = Some(MediaStatus::Idle);
    }

    pub fn clear_media_element(&mut self) -> Option<Box<dyn MediaElement>> {
        self.status = None;
        self.media.take()
    }

    pub fn media_element(&self) -> Option<&dyn MediaElement> {
        self.media.as_deref()
    }

    pub fn media_element_mut(&mut self) -> Option<&mut (dyn MediaElement + 'static)> {
        self.media.as_deref_mut()
    }

    pub fn set_image_element(&mut self, element: Box<dyn ImageElement>) {
        self.image = Some(element);
    }

    pub fn image_element(&self) -> Option<&dyn ImageElement> {
        self.image.as_deref()
    }

    pub fn status(&self) -> Option<MediaStatus> {
        self.status
    }

    /// Returns whether the status actually changed
    pub fn set_status(&mut self, status: MediaStatus) -> bool {
        if self.status == Some(status) {
            return false;
        }
        debug!("Media status {:?} -> {}", self.status, status);
        self.status = Some(status);
        true
    }

    /// Current `playState` event, if there is a media element and a status
    pub fn play_state(&self, request_id: &RequestId) -> Option<Value> {
        let media = self.media.as_deref()?;
        let status = self.status?;
        Some(play_state_event(
            status.as_str(),
            media.current_time(),
            media.duration(),
            request_id,
        ))
    }

    /// Route one received message
    ///
    /// Responses go out through `sink`, directed at the sender. Returns what
    /// the app should be told, if anything.
    pub fn handle_message(
        &mut self,
        message: &PeerMessage,
        sink: &mut dyn MessageSink,
    ) -> Option<Dispatch> {
        match Content::classify(&message.message) {
            Content::MediaCommand { media_command } => {
                let Some(raw) = media_command else {
                    debug!("Dropping media command without mediaCommand body");
                    return None;
                };
                self.handle_media_command(message.from.as_deref(), &raw, sink)
            }
            Content::ServiceCommand { service_command } => {
                self.handle_service_command(service_command.as_ref())
            }
            Content::Other => Some(Dispatch::Message(message.clone())),
        }
    }

    fn handle_media_command(
        &mut self,
        from: Option<&str>,
        raw: &Value,
        sink: &mut dyn MessageSink,
    ) -> Option<Dispatch> {
        let Some(command) = MediaCommand::parse(raw) else {
            debug!("Dropping media command without a type: {}", raw);
            return None;
        };
        debug!("Media command {} from {:?}", command.verb.name(), from);

        match &command.verb {
            MediaVerb::GetDuration {} => {
                let duration = self.media.as_ref().map_or(0.0, |m| m.duration());
                respond(
                    sink,
                    from,
                    &command,
                    MediaCommandResponse::ack(&command).with_duration(duration),
                );
                None
            }
            MediaVerb::GetPosition {} => {
                let position = self.media.as_ref().map_or(0.0, |m| m.current_time());
                respond(
                    sink,
                    from,
                    &command,
                    MediaCommandResponse::ack(&command).with_position(position),
                );
                None
            }
            MediaVerb::Seek { position } => {
                let Some(media) = self.media.as_mut() else {
                    return dropped(&command, "no media element");
                };
                if let Some(position) = position {
                    media.set_current_time(*position);
                }

                let correlation = command
                    .request_id
                    .clone()
                    .unwrap_or_else(RequestId::unsolicited);
                if let Some(event) = self.play_state(&correlation) {
                    sink.broadcast_message(event);
                }
                respond(sink, from, &command, MediaCommandResponse::ack(&command));
                None
            }
            MediaVerb::Play {} => {
                let Some(media) = self.media.as_mut() else {
                    return dropped(&command, "no media element");
                };
                media.play();
                respond(sink, from, &command, MediaCommandResponse::ack(&command));
                None
            }
            MediaVerb::Pause {} => {
                let Some(media) = self.media.as_mut() else {
                    return dropped(&command, "no media element");
                };
                media.pause();
                respond(sink, from, &command, MediaCommandResponse::ack(&command));
                None
            }
            MediaVerb::PlayMedia { media_url, .. } => {
                let Some(media) = self.media.as_mut() else {
                    return dropped(&command, "no media element");
                };
                match media_url {
                    Some(url) => {
                        info!("Loading media {}", url);
                        media.set_src(url);
                    }
                    None => match media.src() {
                        Some(current) => info!("Reloading media {}", current),
                        None => warn!("playMedia without a source"),
                    },
                }
                media.load();
                respond(sink, from, &command, MediaCommandResponse::ack(&command));
                Some(Dispatch::LoadMedia {
                    from: from.map(str::to_string),
                    command: command.raw,
                })
            }
            MediaVerb::DisplayImage { media_url } => {
                let Some(image) = self.image.as_mut() else {
                    return dropped(&command, "no image element");
                };
                match media_url {
                    Some(url) => image.set_src(url),
                    None => debug!("displayImage without a URL, keeping {:?}", image.src()),
                }
                respond(sink, from, &command, MediaCommandResponse::ack(&command));
                Some(Dispatch::LoadImage {
                    from: from.map(str::to_string),
                    command: command.raw,
                })
            }
            MediaVerb::Unrecognized => {
                debug!("Ignoring unknown media command {:?}", raw.get("type"));
                None
            }
        }
    }

    fn handle_service_command(&mut self, raw: Option<&Value>) -> Option<Dispatch> {
        let Some(verb) = raw.and_then(ServiceVerb::parse) else {
            debug!("Dropping service command without a type");
            return None;
        };

        match verb {
            ServiceVerb::Close {} => {
                info!("Close requested by sender");
                Some(Dispatch::Close)
            }
            ServiceVerb::Unrecognized => {
                debug!("Ignoring unknown service command {:?}", raw);
                None
            }
        }
    }
}

fn respond(
    sink: &mut dyn MessageSink,
    from: Option<&str>,
    command: &MediaCommand,
    response: MediaCommandResponse<'_>,
) {
    if !command.wants_response() {
        return;
    }
    let payload = response.into_payload();
    match from {
        Some(to) => sink.send_message(to, payload),
        // Nobody to direct at; the gateway delivers undirected frames to everyone
        None => sink.broadcast_message(payload),
    }
}

fn dropped(command: &MediaCommand, reason: &str) -> Option<Dispatch> {
    debug!("Dropping {} command: {}", command.verb.name(), reason);
    None
}
