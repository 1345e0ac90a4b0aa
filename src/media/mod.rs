// Media state seen by the command dispatcher
// The element traits are implemented by whatever actually renders media

pub mod player;

pub use player::{HeadlessImage, HeadlessPlayer};

use serde::{Deserialize, Serialize};

/// Playback status reported to senders in `playState` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
    Finished,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Idle => "idle",
            MediaStatus::Buffering => "buffering",
            MediaStatus::Playing => "playing",
            MediaStatus::Paused => "paused",
            MediaStatus::Finished => "finished",
        }
    }
}

impl std::fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events a media element raises while loading and playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    LoadStart,
    Playing,
    Waiting,
    Abort,
    Ended,
    Play,
    Pause,
}

impl MediaEvent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "loadstart" => Some(MediaEvent::LoadStart),
            "playing" => Some(MediaEvent::Playing),
            "waiting" => Some(MediaEvent::Waiting),
            "abort" => Some(MediaEvent::Abort),
            "ended" => Some(MediaEvent::Ended),
            "play" => Some(MediaEvent::Play),
            "pause" => Some(MediaEvent::Pause),
            _ => None,
        }
    }

    /// Status this event moves the player into
    pub fn status(&self) -> MediaStatus {
        match self {
            MediaEvent::LoadStart | MediaEvent::Waiting => MediaStatus::Buffering,
            MediaEvent::Playing | MediaEvent::Play => MediaStatus::Playing,
            MediaEvent::Abort | MediaEvent::Ended => MediaStatus::Finished,
            MediaEvent::Pause => MediaStatus::Paused,
        }
    }
}

/// The currently registered media element
pub trait MediaElement {
    /// Playback position in seconds
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, position: f64);

    /// Duration in seconds; NaN while unknown
    fn duration(&self) -> f64;

    fn play(&mut self);
    fn pause(&mut self);

    /// Current source URL, if one was set
    fn src(&self) -> Option<String>;
    fn set_src(&mut self, url: &str);
    fn load(&mut self);

    /// Next pending element event, if the element reports any
    fn poll_event(&mut self) -> Option<MediaEvent> {
        None
    }
}

/// The currently registered image element
pub trait ImageElement {
    fn src(&self) -> Option<String>;
    fn set_src(&mut self, url: &str);
}
