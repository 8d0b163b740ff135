use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationType {
    #[default]
    None,
    Connecting,
    Streaming,
    Lag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stopped,
    Paused,
    Playing,
}

/// The visual playback surface as seen by a backend.
///
/// Durations use `-1` for "unknown / live": the widget hides its scrubber range.
pub trait FaceWidget {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn is_playing(&self) -> bool;

    fn duration_in_seconds(&self) -> i64;
    fn set_duration_in_seconds(&mut self, seconds: i64);
    fn time_in_seconds(&self) -> i64;
    fn set_time_in_seconds(&mut self, seconds: i64);

    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64);

    fn artist_text(&self) -> Option<String>;
    fn set_artist_text(&mut self, text: Option<String>);
    fn album_text(&self) -> Option<String>;
    fn set_album_text(&mut self, text: Option<String>);

    fn animation_type(&self) -> AnimationType;
    fn set_animation_type(&mut self, animation: AnimationType);

    fn is_inactive(&self) -> bool;
    fn set_inactive(&mut self, inactive: bool);
}

pub type SharedFace = Rc<RefCell<dyn FaceWidget>>;

/// Plain data model of a face. Renderers wrap it; tests inspect it.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceState {
    pub transport: Transport,
    pub duration_in_seconds: i64,
    pub time_in_seconds: i64,
    pub volume: f64,
    pub artist_text: Option<String>,
    pub album_text: Option<String>,
    pub animation_type: AnimationType,
    pub is_inactive: bool,
}

impl FaceState {
    pub fn new(volume: f64) -> Self {
        Self {
            transport: Transport::Stopped,
            duration_in_seconds: 0,
            time_in_seconds: 0,
            volume,
            artist_text: None,
            album_text: None,
            animation_type: AnimationType::None,
            is_inactive: false,
        }
    }

    /// Scrubber range is meaningful only with a known duration.
    pub fn has_scrub_range(&self) -> bool {
        self.duration_in_seconds > 0
    }
}

impl Default for FaceState {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl FaceWidget for FaceState {
    fn play(&mut self) {
        self.transport = Transport::Playing;
    }

    fn pause(&mut self) {
        self.transport = Transport::Paused;
    }

    fn stop(&mut self) {
        self.transport = Transport::Stopped;
        self.time_in_seconds = 0;
    }

    fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    fn duration_in_seconds(&self) -> i64 {
        self.duration_in_seconds
    }

    fn set_duration_in_seconds(&mut self, seconds: i64) {
        self.duration_in_seconds = seconds;
    }

    fn time_in_seconds(&self) -> i64 {
        self.time_in_seconds
    }

    fn set_time_in_seconds(&mut self, seconds: i64) {
        self.time_in_seconds = seconds;
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn artist_text(&self) -> Option<String> {
        self.artist_text.clone()
    }

    fn set_artist_text(&mut self, text: Option<String>) {
        self.artist_text = text;
    }

    fn album_text(&self) -> Option<String> {
        self.album_text.clone()
    }

    fn set_album_text(&mut self, text: Option<String>) {
        self.album_text = text;
    }

    fn animation_type(&self) -> AnimationType {
        self.animation_type
    }

    fn set_animation_type(&mut self, animation: AnimationType) {
        self.animation_type = animation;
    }

    fn is_inactive(&self) -> bool {
        self.is_inactive
    }

    fn set_inactive(&mut self, inactive: bool) {
        self.is_inactive = inactive;
    }
}
