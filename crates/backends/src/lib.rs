use audion_spotify::AuthEvent;
use tokio::sync::mpsc;
use url::Url;

pub mod auth;
pub mod local;
pub mod remote;

#[cfg(test)]
mod testing;

pub use auth::{AuthPhase, AuthorizationLifecycle};
pub use local::{
    EngineEvent, EngineSignal, EngineSink, EngineStatus, LocalConfig, LocalPlayer, MediaEngine,
    MediaEngineFactory, MetadataItem, MetadataKey, ObserverToken, TimeControlStatus,
};
pub use remote::{RemoteConfig, RemoteEvent, RemotePlayer, RemoteServices};

/// Everything that must reach a backend on the UI thread: engine callbacks, network
/// completions, authorization changes and inbound URLs.
#[derive(Debug)]
pub enum BackendEvent {
    Engine(EngineSignal),
    Remote(RemoteEvent),
    Auth(AuthEvent),
    Url(Url),
}

/// Sender side of the UI thread's event queue.
pub type Inbox = mpsc::UnboundedSender<BackendEvent>;

/// Which transport controls the face should offer. Read once when a backend is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub stop: bool,
    pub rewind: bool,
    pub fast_forward: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
    pub informative: String,
}

/// Services the hosting UI provides to a backend.
pub trait Host {
    fn alert(&self, alert: &Alert);
    /// Ask the user for something to play.
    fn request_open_document(&self);
    /// Hand a URL to the system (browser). Returns whether the hand-off was attempted.
    fn open_external(&self, url: &Url) -> bool;
    /// A remote command arrived while not authorized.
    fn authorization_fallback(&self) {}
}

/// The capability set a face drives. Implementations never assume which one is active.
pub trait PlaybackBackend {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> Capabilities;

    /// Entry point for background work. Until then a backend has no side effects.
    fn start(&mut self);
    /// Binds a new source. `false` means the caller must not go on to `play`.
    fn open(&mut self, source: &Url) -> bool;

    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn is_playing(&self) -> bool;

    fn toggle_play_pause(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    fn mute(&mut self);
    fn un_mute(&mut self);
    fn is_muted(&self) -> bool;

    fn toggle_mute(&mut self) {
        if self.is_muted() {
            self.un_mute();
        } else {
            self.mute();
        }
    }

    fn rewind(&mut self);
    fn fast_forward(&mut self);
    /// `volume` is normalized 0–1.
    fn volume_changed(&mut self, volume: f64);
    fn play_time_changed(&mut self, seconds: f64);
    fn pause_before_scrubbing(&mut self);
    fn play_after_scrubbing(&mut self);

    fn handle_event(&mut self, event: BackendEvent);

    fn open_and_play(&mut self, source: &Url) -> bool {
        if self.open(source) {
            self.play();
            true
        } else {
            false
        }
    }
}
