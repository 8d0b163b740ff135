use crate::{Alert, BackendEvent, Capabilities, Host, Inbox, PlaybackBackend};
use audion_core::urls::{display_name, source_kind};
use audion_core::{PlaybackPhase, PreferenceStore, SourceKind, VOLUME_PREF_KEY};
use audion_session::projection::{display_duration, joined_details};
use audion_session::{AnimationType, MuteState, PlaybackSession, SharedFace};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Unknown,
    ReadyToPlay,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControlStatus {
    Paused,
    WaitingToPlayAtSpecifiedRate,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    Title,
    Artist,
    AlbumName,
    Format,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub key: MetadataKey,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    RateChanged(f32),
    StatusChanged(EngineStatus),
    TimeControlStatusChanged(TimeControlStatus),
    PeriodicTime(f64),
}

/// An engine event stamped with the engine instance that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSignal {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Handed to an engine on subscription. Engines may call `emit` from any thread; delivery
/// happens on the UI thread through the inbox.
#[derive(Debug, Clone)]
pub struct EngineSink {
    generation: u64,
    inbox: Inbox,
}

impl EngineSink {
    pub fn new(generation: u64, inbox: Inbox) -> Self {
        Self { generation, inbox }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: EngineEvent) -> bool {
        self.inbox
            .send(BackendEvent::Engine(EngineSignal {
                generation: self.generation,
                event,
            }))
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub u64);

/// A decoder-backed player bound to one source.
pub trait MediaEngine {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64);
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn set_waits_to_minimize_stalling(&mut self, waits: bool);

    /// `None` (or a non-finite value) when the length is unknown, e.g. live streams.
    fn duration(&self) -> Option<f64>;
    /// Raw asset length in seconds; may be NaN for indefinite assets.
    fn asset_length(&self) -> f64;
    fn common_metadata(&self) -> Vec<MetadataItem>;

    /// Rate, status and control-status changes go to `sink` until unsubscribed.
    fn subscribe(&mut self, sink: EngineSink) -> ObserverToken;
    fn unsubscribe(&mut self, token: ObserverToken);
    fn add_periodic_time_observer(&mut self, interval: Duration, sink: EngineSink)
        -> ObserverToken;
}

pub trait MediaEngineFactory {
    fn open(&self, source: &Url) -> Box<dyn MediaEngine>;
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub position_sample: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            position_sample: Duration::from_secs(1),
        }
    }
}

pub fn connection_failed_alert() -> Alert {
    Alert {
        message: "Connection failed".to_string(),
        informative: "Could not connect, or connection was refused by server.".to_string(),
    }
}

/// Plays files and streams through an injected [`MediaEngine`].
pub struct LocalPlayer {
    factory: Box<dyn MediaEngineFactory>,
    engine: Option<Box<dyn MediaEngine>>,
    observer: Option<ObserverToken>,
    time_observer: Option<ObserverToken>,
    generation: u64,
    inbox: Inbox,
    face: SharedFace,
    host: Rc<dyn Host>,
    prefs: Arc<dyn PreferenceStore>,
    cfg: LocalConfig,
    session: PlaybackSession,
    mute: MuteState,
    phase: PlaybackPhase,
    filename: Option<String>,
    streaming: bool,
    started_stream: bool,
    pending_seek: Option<f64>,
}

impl LocalPlayer {
    pub fn new(
        factory: Box<dyn MediaEngineFactory>,
        face: SharedFace,
        host: Rc<dyn Host>,
        prefs: Arc<dyn PreferenceStore>,
        inbox: Inbox,
        cfg: LocalConfig,
    ) -> Self {
        let mut session = PlaybackSession::new(true);
        let initial_volume = prefs.f64_or(VOLUME_PREF_KEY, face.borrow().volume());
        session.volume.set(initial_volume);

        let f = face.clone();
        session
            .duration_seconds
            .subscribe(move |d| f.borrow_mut().set_duration_in_seconds(*d));
        let f = face.clone();
        session
            .position_seconds
            .subscribe(move |t| f.borrow_mut().set_time_in_seconds(*t));
        let f = face.clone();
        session
            .volume
            .subscribe(move |v| f.borrow_mut().set_volume(*v));

        Self {
            factory,
            engine: None,
            observer: None,
            time_observer: None,
            generation: 0,
            inbox,
            face,
            host,
            prefs,
            cfg,
            session,
            mute: MuteState::default(),
            phase: PlaybackPhase::Idle,
            filename: None,
            streaming: false,
            started_stream: false,
            pending_seek: None,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        if self.phase != phase {
            trace!(from = ?self.phase, to = ?phase, "local phase");
            self.phase = phase;
        }
    }

    fn detach(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if let Some(token) = self.observer.take() {
                engine.unsubscribe(token);
            }
            if let Some(token) = self.time_observer.take() {
                engine.unsubscribe(token);
            }
        }
    }

    /// Observers come off the old engine before it goes, and onto the new one after it
    /// is in place.
    fn replace_engine(&mut self, next: Option<Box<dyn MediaEngine>>) {
        self.detach();
        self.generation += 1;
        self.engine = next;
        if let Some(engine) = self.engine.as_mut() {
            let sink = EngineSink::new(self.generation, self.inbox.clone());
            self.observer = Some(engine.subscribe(sink));
        }
    }

    fn set_animation(&self, animation: AnimationType) {
        self.face.borrow_mut().set_animation_type(animation);
    }

    fn handle_engine(&mut self, signal: EngineSignal) {
        if signal.generation != self.generation || self.engine.is_none() {
            trace!(
                generation = signal.generation,
                current = self.generation,
                "dropping signal from a discarded engine"
            );
            return;
        }

        match signal.event {
            EngineEvent::RateChanged(rate) => {
                let playing = rate != 0.0;
                self.set_phase(if playing {
                    PlaybackPhase::Playing
                } else {
                    PlaybackPhase::Paused
                });
                self.session.is_playing.set(playing);
                if !self.session.is_scrubbing() {
                    let mut face = self.face.borrow_mut();
                    if playing {
                        face.play();
                    } else {
                        face.pause();
                    }
                }
            }
            EngineEvent::StatusChanged(EngineStatus::ReadyToPlay) => {
                if !matches!(self.phase, PlaybackPhase::Playing | PlaybackPhase::Paused) {
                    self.set_phase(PlaybackPhase::Ready);
                }
                self.update_metadata();
            }
            EngineEvent::StatusChanged(EngineStatus::Failed) => {
                warn!(source = ?self.filename, "engine failed to load source");
            }
            EngineEvent::StatusChanged(EngineStatus::Unknown) => {}
            EngineEvent::TimeControlStatusChanged(status) => {
                if !self.streaming {
                    return;
                }
                if status == TimeControlStatus::WaitingToPlayAtSpecifiedRate {
                    if self.started_stream {
                        self.set_animation(AnimationType::Lag);
                    } else {
                        self.set_animation(AnimationType::Connecting);
                    }
                } else {
                    self.started_stream = true;
                    self.set_animation(AnimationType::Streaming);
                }
            }
            EngineEvent::PeriodicTime(seconds) => {
                if seconds.is_finite() {
                    self.session.write_position(seconds.max(0.0) as i64);
                }
            }
        }
    }

    fn update_metadata(&mut self) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        let duration = engine.duration().filter(|d| d.is_finite());
        let metadata = engine.common_metadata();

        match duration {
            Some(d) if self.streaming && d == 0.0 => {
                self.stop();
                self.host.alert(&connection_failed_alert());
                return;
            }
            Some(d) => self.session.duration_seconds.set(display_duration(Some(d))),
            None => {
                self.session.duration_seconds.set(-1);
                self.play();
            }
        }

        let mut title = None;
        let mut artist = String::new();
        let mut album = String::new();
        let mut format = String::new();
        for item in metadata {
            let Some(value) = item.value else { continue };
            match item.key {
                MetadataKey::Title => title = Some(value),
                MetadataKey::Artist => artist = value,
                MetadataKey::AlbumName => album = value,
                MetadataKey::Format => format = value,
                MetadataKey::Other => {}
            }
        }

        // The title goes in the artist slot; the album slot carries the remaining details.
        let headline = title.or_else(|| self.filename.clone());
        let details = joined_details(&[&artist, &album, &format]);
        {
            let mut face = self.face.borrow_mut();
            face.set_artist_text(headline.clone());
            face.set_album_text(details);
        }
        self.session.song_name.set(headline.unwrap_or_default());
        self.session.song_artist.set(artist);
        self.session.song_album.set(album);

        if self.time_observer.is_none() {
            let sink = EngineSink::new(self.generation, self.inbox.clone());
            let interval = self.cfg.position_sample;
            if let Some(engine) = self.engine.as_mut() {
                self.time_observer = Some(engine.add_periodic_time_observer(interval, sink));
            }
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        if let Some(engine) = self.engine.as_mut() {
            engine.seek(seconds);
        }
        self.session.write_position(seconds.max(0.0) as i64);
    }
}

impl PlaybackBackend for LocalPlayer {
    fn name(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stop: true,
            rewind: true,
            fast_forward: true,
        }
    }

    fn start(&mut self) {
        debug!("local backend ready; waiting for a source");
    }

    fn open(&mut self, source: &Url) -> bool {
        let mut engine = self.factory.open(source);
        let volume = if self.mute.is_muted() {
            0.0
        } else {
            self.prefs.f64_or(VOLUME_PREF_KEY, *self.session.volume.get())
        };
        engine.set_volume(volume as f32);
        engine.set_waits_to_minimize_stalling(true);
        let duration = engine.duration();
        let length = engine.asset_length();

        self.set_phase(PlaybackPhase::Opening);
        self.pending_seek = None;
        self.replace_engine(Some(engine));
        self.face.borrow_mut().stop();

        self.session.duration_seconds.set(display_duration(duration));
        self.session
            .track_identifier
            .set_if_changed(Some(source.to_string()));
        self.filename = Some(display_name(source));
        self.streaming = source_kind(source) == SourceKind::Stream;
        self.started_stream = false;

        if self.streaming {
            self.set_phase(PlaybackPhase::Connecting);
            self.set_animation(AnimationType::Connecting);
        } else {
            self.set_animation(AnimationType::None);
        }

        let ok = length > 0.0;
        if !ok {
            debug!(source = %source, length, "source reports no playable length");
        }
        ok
    }

    fn play(&mut self) {
        match self.engine.as_mut() {
            Some(engine) => {
                engine.play();
                if !self.session.is_scrubbing() {
                    self.face.borrow_mut().play();
                }
            }
            None => self.host.request_open_document(),
        }
    }

    fn pause(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.pause();
        }
        if !self.session.is_scrubbing() {
            self.face.borrow_mut().pause();
        }
    }

    fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.pause();
        }
        if !self.session.is_scrubbing() {
            self.face.borrow_mut().stop();
        }
        self.started_stream = false;
        self.streaming = false;
        self.pending_seek = None;
        self.set_phase(PlaybackPhase::Stopped);
        self.replace_engine(None);
        self.session.is_playing.set(false);
        self.set_phase(PlaybackPhase::Idle);
    }

    fn is_playing(&self) -> bool {
        self.face.borrow().is_playing()
    }

    fn mute(&mut self) {
        if self.mute.is_muted() {
            return;
        }
        let current = self.face.borrow().volume();
        self.mute.mute(current);
        self.face.borrow_mut().set_volume(0.0);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_volume(0.0);
        }
    }

    fn un_mute(&mut self) {
        if !self.mute.is_muted() {
            return;
        }
        let restored = self.mute.unmute();
        self.face.borrow_mut().set_volume(restored);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_volume(restored as f32);
        }
    }

    fn is_muted(&self) -> bool {
        self.mute.is_muted()
    }

    // A single local source has nothing to skip to.
    fn rewind(&mut self) {}

    fn fast_forward(&mut self) {}

    fn volume_changed(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        self.mute.note_volume_change(volume);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_volume(volume as f32);
        }
        self.session.volume.set(volume);
        if let Err(err) = self.prefs.set_f64(VOLUME_PREF_KEY, volume) {
            warn!(error=%err, "failed to persist volume");
        }
    }

    fn play_time_changed(&mut self, seconds: f64) {
        if !self.session.has_known_duration() {
            debug!("ignoring seek on a source without a known duration");
            return;
        }
        if self.session.is_scrubbing() {
            self.pending_seek = Some(seconds);
            return;
        }
        self.seek_to(seconds);
    }

    fn pause_before_scrubbing(&mut self) {
        self.session.set_scrubbing(true);
        if let Some(engine) = self.engine.as_mut() {
            engine.pause();
        }
    }

    fn play_after_scrubbing(&mut self) {
        self.session.set_scrubbing(false);
        if let Some(seconds) = self.pending_seek.take() {
            self.seek_to(seconds);
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.play();
        }
    }

    fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Engine(signal) => self.handle_engine(signal),
            BackendEvent::Url(url) => {
                if !self.open_and_play(&url) {
                    debug!(url = %url, "source did not open for immediate playback");
                }
            }
            other => trace!(event = ?other, "local backend ignores event"),
        }
    }
}

impl Drop for LocalPlayer {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineEvent, EngineStatus, LocalPlayer, MetadataKey, TimeControlStatus};
    use crate::testing::{drain, face, FakeEngineFactory, RecordingHost};
    use crate::{BackendEvent, PlaybackBackend};
    use audion_core::{MemoryPreferenceStore, PlaybackPhase, PreferenceStore, VOLUME_PREF_KEY};
    use audion_session::{AnimationType, FaceState, Transport};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use url::Url;

    struct Rig {
        player: LocalPlayer,
        rx: mpsc::UnboundedReceiver<BackendEvent>,
        face: Rc<RefCell<FaceState>>,
        host: Rc<RecordingHost>,
        prefs: Arc<MemoryPreferenceStore>,
        engines: FakeEngineFactory,
    }

    fn rig() -> Rig {
        let (tx, rx) = mpsc::unbounded_channel();
        let face = face();
        let host = Rc::new(RecordingHost::default());
        let prefs = Arc::new(MemoryPreferenceStore::new());
        prefs.set_f64(VOLUME_PREF_KEY, 0.5).unwrap();
        let engines = FakeEngineFactory::default();
        let player = LocalPlayer::new(
            Box::new(engines.clone()),
            face.clone(),
            host.clone(),
            prefs.clone(),
            tx,
            Default::default(),
        );
        Rig {
            player,
            rx,
            face,
            host,
            prefs,
            engines,
        }
    }

    fn file() -> Url {
        Url::parse("file:///music/Intro%20Track.m4a").unwrap()
    }

    fn stream() -> Url {
        Url::parse("http://radio.example.com/live").unwrap()
    }

    impl Rig {
        fn pump(&mut self) {
            drain(&mut self.rx, &mut self.player);
        }
    }

    #[test]
    fn construction_has_no_side_effects() {
        let rig = rig();
        assert_eq!(*rig.face.borrow(), FaceState::default());
        assert_eq!(rig.engines.opened().len(), 0);
        assert_eq!(rig.player.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn volume_reaches_face_engine_and_preferences() {
        let mut rig = rig();
        rig.engines.prepare(Some(10.0), 10.0, vec![]);
        assert!(rig.player.open(&file()));
        let engine = rig.engines.engine(0);

        for step in 0..=10 {
            let v = step as f64 / 10.0;
            rig.player.volume_changed(v);
            assert_eq!(rig.face.borrow().volume, v);
            assert_eq!(engine.borrow().volume, v as f32);
            assert_eq!(rig.prefs.get_f64(VOLUME_PREF_KEY), Some(v));
        }
    }

    #[test]
    fn mute_then_unmute_restores_volume() {
        let mut rig = rig();
        rig.engines.prepare(Some(10.0), 10.0, vec![]);
        rig.player.open(&file());
        rig.player.volume_changed(0.73);

        rig.player.mute();
        assert!(rig.player.is_muted());
        assert_eq!(rig.face.borrow().volume, 0.0);
        assert_eq!(rig.engines.engine(0).borrow().volume, 0.0);
        assert_eq!(rig.prefs.get_f64(VOLUME_PREF_KEY), Some(0.73));

        rig.player.un_mute();
        assert_eq!(rig.face.borrow().volume, 0.73);
        assert_eq!(rig.engines.engine(0).borrow().volume, 0.73_f64 as f32);
    }

    #[test]
    fn repeated_mute_keeps_the_audible_volume() {
        let mut rig = rig();
        rig.engines.prepare(Some(10.0), 10.0, vec![]);
        rig.player.open(&file());
        rig.player.volume_changed(0.6);

        rig.player.un_mute();
        assert_eq!(rig.face.borrow().volume, 0.6);
        assert!(!rig.player.is_muted());

        rig.player.mute();
        rig.player.mute();
        rig.player.un_mute();
        assert_eq!(rig.face.borrow().volume, 0.6);
        assert_eq!(rig.engines.engine(0).borrow().volume, 0.6_f32);
    }

    #[test]
    fn volume_change_while_muted_clears_mute() {
        let mut rig = rig();
        rig.player.mute();
        rig.player.volume_changed(0.4);
        assert!(!rig.player.is_muted());
    }

    #[test]
    fn zero_length_asset_fails_open() {
        let mut rig = rig();
        rig.engines.prepare(Some(0.0), 0.0, vec![]);
        assert!(!rig.player.open(&file()));
    }

    #[test]
    fn zero_duration_stream_stops_and_alerts_once() {
        let mut rig = rig();
        rig.engines.prepare(Some(0.0), f64::NAN, vec![]);
        rig.player.open(&stream());
        assert_eq!(rig.face.borrow().animation_type, AnimationType::Connecting);

        let engine = rig.engines.engine(0);
        engine.borrow().emit(EngineEvent::StatusChanged(EngineStatus::ReadyToPlay));
        rig.pump();

        assert_eq!(rig.host.alerts.borrow().len(), 1);
        assert_eq!(rig.host.alerts.borrow()[0].message, "Connection failed");
        assert_eq!(engine.borrow().plays, 0);
        assert!(engine.borrow().sinks.is_empty());
        assert_eq!(rig.face.borrow().transport, Transport::Stopped);
        assert_eq!(rig.player.phase(), PlaybackPhase::Idle);

        // Late signals from the torn-down engine change nothing.
        engine.borrow().emit_detached(EngineEvent::RateChanged(1.0));
        rig.pump();
        assert_eq!(engine.borrow().plays, 0);
        assert_eq!(rig.host.alerts.borrow().len(), 1);
    }

    #[test]
    fn unknown_duration_starts_playback_and_blocks_seeks() {
        let mut rig = rig();
        rig.engines.prepare(None, f64::NAN, vec![]);
        rig.player.open(&stream());
        let engine = rig.engines.engine(0);
        engine.borrow().emit(EngineEvent::StatusChanged(EngineStatus::ReadyToPlay));
        rig.pump();

        assert_eq!(engine.borrow().plays, 1);
        assert_eq!(rig.face.borrow().duration_in_seconds, -1);
        assert!(!rig.face.borrow().has_scrub_range());

        rig.player.play_time_changed(12.0);
        assert!(engine.borrow().seeks.is_empty());
    }

    #[test]
    fn metadata_fills_display_slots() {
        let mut rig = rig();
        rig.engines.prepare(
            Some(245.6),
            245.6,
            vec![
                (MetadataKey::Title, "Windowlicker"),
                (MetadataKey::Artist, "Aphex Twin"),
                (MetadataKey::Format, "AAC"),
            ],
        );
        rig.player.open(&file());
        rig.engines
            .engine(0)
            .borrow()
            .emit(EngineEvent::StatusChanged(EngineStatus::ReadyToPlay));
        rig.pump();

        let face = rig.face.borrow();
        assert_eq!(face.artist_text.as_deref(), Some("Windowlicker"));
        assert_eq!(face.album_text.as_deref(), Some("Aphex Twin—AAC"));
        assert_eq!(face.duration_in_seconds, 245);
    }

    #[test]
    fn missing_title_falls_back_to_file_name() {
        let mut rig = rig();
        rig.engines.prepare(Some(30.0), 30.0, vec![]);
        rig.player.open(&file());
        rig.engines
            .engine(0)
            .borrow()
            .emit(EngineEvent::StatusChanged(EngineStatus::ReadyToPlay));
        rig.pump();

        let face = rig.face.borrow();
        assert_eq!(face.artist_text.as_deref(), Some("Intro Track.m4a"));
        assert_eq!(face.album_text, None);
    }

    #[test]
    fn reopening_detaches_previous_engine_first() {
        let mut rig = rig();
        rig.engines.prepare(Some(30.0), 30.0, vec![]);
        rig.engines.prepare(Some(60.0), 60.0, vec![]);
        rig.player.open(&file());
        rig.player.open(&Url::parse("file:///music/b.mp3").unwrap());

        let first = rig.engines.engine(0);
        let second = rig.engines.engine(1);
        assert!(first.borrow().sinks.is_empty());
        assert_eq!(second.borrow().sinks.len(), 1);

        first.borrow().emit_detached(EngineEvent::RateChanged(1.0));
        rig.pump();
        assert_eq!(rig.face.borrow().transport, Transport::Stopped);

        second.borrow().emit(EngineEvent::RateChanged(1.0));
        rig.pump();
        assert_eq!(rig.face.borrow().transport, Transport::Playing);
    }

    #[test]
    fn stream_animation_distinguishes_connecting_from_lag() {
        let mut rig = rig();
        rig.engines.prepare(None, f64::NAN, vec![]);
        rig.player.open(&stream());
        let engine = rig.engines.engine(0);

        engine.borrow().emit(EngineEvent::TimeControlStatusChanged(
            TimeControlStatus::WaitingToPlayAtSpecifiedRate,
        ));
        rig.pump();
        assert_eq!(rig.face.borrow().animation_type, AnimationType::Connecting);

        engine
            .borrow()
            .emit(EngineEvent::TimeControlStatusChanged(TimeControlStatus::Playing));
        rig.pump();
        assert_eq!(rig.face.borrow().animation_type, AnimationType::Streaming);

        engine.borrow().emit(EngineEvent::TimeControlStatusChanged(
            TimeControlStatus::WaitingToPlayAtSpecifiedRate,
        ));
        rig.pump();
        assert_eq!(rig.face.borrow().animation_type, AnimationType::Lag);
    }

    #[test]
    fn position_samples_start_when_ready_and_hold_during_scrub() {
        let mut rig = rig();
        rig.engines.prepare(Some(200.0), 200.0, vec![]);
        rig.player.open(&file());
        let engine = rig.engines.engine(0);
        engine.borrow().emit(EngineEvent::StatusChanged(EngineStatus::ReadyToPlay));
        rig.pump();
        assert_eq!(engine.borrow().time_observers, 1);

        engine.borrow().emit(EngineEvent::PeriodicTime(3.4));
        rig.pump();
        assert_eq!(rig.face.borrow().time_in_seconds, 3);

        rig.player.pause_before_scrubbing();
        engine.borrow().emit(EngineEvent::RateChanged(0.0));
        engine.borrow().emit(EngineEvent::PeriodicTime(4.0));
        rig.pump();
        rig.player.play_time_changed(90.0);
        assert_eq!(rig.face.borrow().time_in_seconds, 3);
        assert!(engine.borrow().seeks.is_empty());
        assert_ne!(rig.face.borrow().transport, Transport::Paused);

        rig.player.play_after_scrubbing();
        assert_eq!(engine.borrow().seeks, vec![90.0]);
        assert_eq!(rig.face.borrow().time_in_seconds, 90);
        assert_eq!(engine.borrow().pauses, 1);
        assert_eq!(engine.borrow().plays, 1);
    }

    #[test]
    fn play_without_source_asks_for_one() {
        let mut rig = rig();
        rig.player.play();
        assert_eq!(*rig.host.open_document_requests.borrow(), 1);
    }

    #[test]
    fn url_event_opens_and_plays() {
        let mut rig = rig();
        rig.engines.prepare(Some(10.0), 10.0, vec![]);
        rig.player.handle_event(BackendEvent::Url(file()));

        assert_eq!(rig.engines.opened(), vec![file()]);
        assert_eq!(rig.engines.engine(0).borrow().plays, 1);
        assert!(rig.player.is_playing());
    }
}
