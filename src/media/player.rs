// Headless media elements
// Track what a display would show so the bridge can answer senders without one

use std::collections::VecDeque;
use std::time::Instant;
use tracing::info;

use super::{ImageElement, MediaElement, MediaEvent};

/// Media element with a wall-clock playhead
#[derive(Debug)]
pub struct HeadlessPlayer {
    src: Option<String>,
    // Position at the last play/pause/seek
    position: f64,
    // Set while playing; the playhead advances from here
    playing_since: Option<Instant>,
    duration: f64,
    assumed_duration: f64,
    events: VecDeque<MediaEvent>,
}

impl HeadlessPlayer {
    /// `assumed_duration` is reported once media is loaded; 0 means unknown
    pub fn new(assumed_duration: f64) -> Self {
        Self {
            src: None,
            position: 0.0,
            playing_since: None,
            duration: f64::NAN,
            assumed_duration,
            events: VecDeque::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    fn clamp(&self, position: f64) -> f64 {
        let position = position.max(0.0);
        if self.duration.is_finite() {
            position.min(self.duration)
        } else {
            position
        }
    }
}

impl MediaElement for HeadlessPlayer {
    fn current_time(&self) -> f64 {
        match self.playing_since {
            Some(since) => self.clamp(self.position + since.elapsed().as_secs_f64()),
            None => self.position,
        }
    }

    fn set_current_time(&mut self, position: f64) {
        self.position = self.clamp(position);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn play(&mut self) {
        if self.src.is_none() || self.playing_since.is_some() {
            return;
        }
        info!("Playing {}", self.src.as_deref().unwrap_or_default());
        self.playing_since = Some(Instant::now());
        self.events.push_back(MediaEvent::Play);
        self.events.push_back(MediaEvent::Playing);
    }

    fn pause(&mut self) {
        if self.playing_since.is_none() {
            return;
        }
        self.position = self.current_time();
        self.playing_since = None;
        info!("Paused at {:.1}s", self.position);
        self.events.push_back(MediaEvent::Pause);
    }

    fn src(&self) -> Option<String> {
        self.src.clone()
    }

    fn set_src(&mut self, url: &str) {
        self.src = Some(url.to_string());
    }

    fn load(&mut self) {
        self.position = 0.0;
        self.playing_since = None;
        self.duration = if self.assumed_duration > 0.0 {
            self.assumed_duration
        } else {
            f64::NAN
        };
        info!("Loading {}", self.src.as_deref().unwrap_or("<no source>"));
        self.events.push_back(MediaEvent::LoadStart);
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.events.pop_front()
    }
}

/// Image element that just remembers what it shows
#[derive(Debug, Default)]
pub struct HeadlessImage {
    src: Option<String>,
}

impl HeadlessImage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageElement for HeadlessImage {
    fn src(&self) -> Option<String> {
        self.src.clone()
    }

    fn set_src(&mut self, url: &str) {
        info!("Displaying image {}", url);
        self.src = Some(url.to_string());
    }
}
