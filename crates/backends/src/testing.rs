//! Recording fakes for the engine, the remote API, the authorizer and the host.

use crate::local::{
    EngineEvent, EngineSink, MediaEngine, MediaEngineFactory, MetadataItem, MetadataKey,
    ObserverToken,
};
use crate::{Alert, BackendEvent, Host, PlaybackBackend};
use async_trait::async_trait;
use audion_session::FaceState;
use audion_spotify::models::{AlbumRef, ArtistRef};
use audion_spotify::{
    ApiError, AuthEvent, Authorizer, CurrentPlayback, Device, PlaybackItem, RemotePlaybackApi,
    TrackInfo,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use url::Url;

pub fn face() -> Rc<RefCell<FaceState>> {
    Rc::new(RefCell::new(FaceState::default()))
}

/// Feeds everything queued so far into `backend`, including events queued while doing so.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<BackendEvent>, backend: &mut dyn PlaybackBackend) {
    while let Ok(event) = rx.try_recv() {
        backend.handle_event(event);
    }
}

#[derive(Debug, Default)]
pub struct FakeEngineState {
    pub plays: usize,
    pub pauses: usize,
    pub seeks: Vec<f64>,
    pub volume: f32,
    pub waits_to_minimize_stalling: bool,
    pub duration: Option<f64>,
    pub asset_length: f64,
    pub metadata: Vec<MetadataItem>,
    pub sinks: Vec<(ObserverToken, EngineSink)>,
    pub time_sinks: Vec<(ObserverToken, EngineSink)>,
    pub time_observers: usize,
    last_sink: Option<EngineSink>,
    next_token: u64,
}

impl FakeEngineState {
    /// Signals through the live subscription, if any.
    pub fn emit(&self, event: EngineEvent) {
        let sink = match event {
            EngineEvent::PeriodicTime(_) => self.time_sinks.first(),
            _ => self.sinks.first(),
        };
        if let Some((_, sink)) = sink {
            sink.emit(event);
        }
    }

    /// Signals as a callback that raced with unsubscription would.
    pub fn emit_detached(&self, event: EngineEvent) {
        if let Some(sink) = &self.last_sink {
            sink.emit(event);
        }
    }

    fn token(&mut self) -> ObserverToken {
        self.next_token += 1;
        ObserverToken(self.next_token)
    }
}

struct FakeEngine(Rc<RefCell<FakeEngineState>>);

impl MediaEngine for FakeEngine {
    fn play(&mut self) {
        self.0.borrow_mut().plays += 1;
    }

    fn pause(&mut self) {
        self.0.borrow_mut().pauses += 1;
    }

    fn seek(&mut self, seconds: f64) {
        self.0.borrow_mut().seeks.push(seconds);
    }

    fn volume(&self) -> f32 {
        self.0.borrow().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.0.borrow_mut().volume = volume;
    }

    fn set_waits_to_minimize_stalling(&mut self, waits: bool) {
        self.0.borrow_mut().waits_to_minimize_stalling = waits;
    }

    fn duration(&self) -> Option<f64> {
        self.0.borrow().duration
    }

    fn asset_length(&self) -> f64 {
        self.0.borrow().asset_length
    }

    fn common_metadata(&self) -> Vec<MetadataItem> {
        self.0.borrow().metadata.clone()
    }

    fn subscribe(&mut self, sink: EngineSink) -> ObserverToken {
        let mut state = self.0.borrow_mut();
        let token = state.token();
        state.last_sink = Some(sink.clone());
        state.sinks.push((token, sink));
        token
    }

    fn unsubscribe(&mut self, token: ObserverToken) {
        let mut state = self.0.borrow_mut();
        state.sinks.retain(|(t, _)| *t != token);
        state.time_sinks.retain(|(t, _)| *t != token);
    }

    fn add_periodic_time_observer(
        &mut self,
        _interval: Duration,
        sink: EngineSink,
    ) -> ObserverToken {
        let mut state = self.0.borrow_mut();
        let token = state.token();
        state.time_observers += 1;
        state.time_sinks.push((token, sink));
        token
    }
}

#[derive(Default)]
struct FactoryState {
    prepared: VecDeque<Rc<RefCell<FakeEngineState>>>,
    engines: Vec<Rc<RefCell<FakeEngineState>>>,
    opened: Vec<Url>,
}

/// Hands out engines in the order they were prepared.
#[derive(Clone, Default)]
pub struct FakeEngineFactory(Rc<RefCell<FactoryState>>);

impl FakeEngineFactory {
    pub fn prepare(
        &self,
        duration: Option<f64>,
        asset_length: f64,
        metadata: Vec<(MetadataKey, &str)>,
    ) {
        let state = FakeEngineState {
            duration,
            asset_length,
            metadata: metadata
                .into_iter()
                .map(|(key, value)| MetadataItem {
                    key,
                    value: Some(value.to_string()),
                })
                .collect(),
            ..FakeEngineState::default()
        };
        self.0
            .borrow_mut()
            .prepared
            .push_back(Rc::new(RefCell::new(state)));
    }

    pub fn engine(&self, index: usize) -> Rc<RefCell<FakeEngineState>> {
        self.0.borrow().engines[index].clone()
    }

    pub fn opened(&self) -> Vec<Url> {
        self.0.borrow().opened.clone()
    }
}

impl MediaEngineFactory for FakeEngineFactory {
    fn open(&self, source: &Url) -> Box<dyn MediaEngine> {
        let mut factory = self.0.borrow_mut();
        let state = factory.prepared.pop_front().unwrap_or_default();
        factory.engines.push(state.clone());
        factory.opened.push(source.clone());
        Box::new(FakeEngine(state))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resume,
    Pause,
    Seek(u64),
    Volume(u8),
    Next,
    Previous,
}

/// Records commands; serves whatever playback and tracks it was given.
#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    playback: Mutex<Option<CurrentPlayback>>,
    tracks: Mutex<HashMap<String, TrackInfo>>,
}

impl FakeApi {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_playback(&self, playback: Option<CurrentPlayback>) {
        *self.playback.lock().unwrap() = playback;
    }

    pub fn add_track(&self, uri: &str, track: TrackInfo) {
        self.tracks.lock().unwrap().insert(uri.to_string(), track);
    }

    fn record(&self, call: Call) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl RemotePlaybackApi for FakeApi {
    async fn current_playback(&self) -> Result<Option<CurrentPlayback>, ApiError> {
        Ok(self.playback.lock().unwrap().clone())
    }

    async fn resume_playback(&self) -> Result<(), ApiError> {
        self.record(Call::Resume)
    }

    async fn pause_playback(&self) -> Result<(), ApiError> {
        self.record(Call::Pause)
    }

    async fn seek_to_position(&self, position_ms: u64) -> Result<(), ApiError> {
        self.record(Call::Seek(position_ms))
    }

    async fn set_volume(&self, percent: u8) -> Result<(), ApiError> {
        self.record(Call::Volume(percent))
    }

    async fn skip_to_next(&self) -> Result<(), ApiError> {
        self.record(Call::Next)
    }

    async fn skip_to_previous(&self) -> Result<(), ApiError> {
        self.record(Call::Previous)
    }

    async fn track(&self, uri: &str) -> Result<TrackInfo, ApiError> {
        self.tracks
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or(ApiError::InvalidTrackUri(uri.to_string()))
    }
}

pub struct FakeAuthorizer {
    authorized: AtomicBool,
    fail_exchange: AtomicBool,
    restored: Mutex<Vec<Vec<u8>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for FakeAuthorizer {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            authorized: AtomicBool::new(false),
            fail_exchange: AtomicBool::new(false),
            restored: Mutex::new(Vec::new()),
            events,
        }
    }
}

impl FakeAuthorizer {
    pub fn restored(&self) -> Vec<Vec<u8>> {
        self.restored.lock().unwrap().clone()
    }

    pub fn fail_exchange(&self) {
        self.fail_exchange.store(true, Ordering::SeqCst);
    }

    /// What the API client does when the service revokes its grant.
    pub fn deauthorize_now(&self) {
        self.deauthorize();
    }

    fn publish(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Authorizer for FakeAuthorizer {
    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    fn authorization_url(&self) -> Result<Url, ApiError> {
        Ok(Url::parse(
            "https://accounts.example.com/authorize?client_id=cid&state=s",
        )?)
    }

    fn is_redirect(&self, url: &Url) -> bool {
        url.path() == "/callback"
    }

    async fn request_tokens(&self, _redirect: &Url) -> Result<(), ApiError> {
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(ApiError::InvalidCallback("access_denied".to_string()));
        }
        self.authorized.store(true, Ordering::SeqCst);
        self.publish(AuthEvent::Changed);
        Ok(())
    }

    fn credential(&self) -> Result<Option<Vec<u8>>, ApiError> {
        Ok(self
            .is_authorized()
            .then(|| b"{\"access_token\":\"t\"}".to_vec()))
    }

    fn restore(&self, credential: &[u8]) -> Result<(), ApiError> {
        self.restored.lock().unwrap().push(credential.to_vec());
        self.authorized.store(true, Ordering::SeqCst);
        self.publish(AuthEvent::Changed);
        Ok(())
    }

    fn deauthorize(&self) {
        self.authorized.store(false, Ordering::SeqCst);
        self.publish(AuthEvent::Deauthorized);
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct RecordingHost {
    pub alerts: RefCell<Vec<Alert>>,
    pub open_document_requests: RefCell<usize>,
    pub opened: RefCell<Vec<Url>>,
    pub fallbacks: RefCell<usize>,
}

impl Host for RecordingHost {
    fn alert(&self, alert: &Alert) {
        self.alerts.borrow_mut().push(alert.clone());
    }

    fn request_open_document(&self) {
        *self.open_document_requests.borrow_mut() += 1;
    }

    fn open_external(&self, url: &Url) -> bool {
        self.opened.borrow_mut().push(url.clone());
        true
    }

    fn authorization_fallback(&self) {
        *self.fallbacks.borrow_mut() += 1;
    }
}

/// A snapshot 12 s into a 200 s track on a device at 80 %.
pub fn playback(name: &str, uri: &str, is_playing: bool) -> CurrentPlayback {
    CurrentPlayback {
        is_playing,
        progress_ms: Some(12_000),
        item: Some(PlaybackItem {
            name: name.to_string(),
            uri: uri.to_string(),
            duration_ms: 200_000,
        }),
        device: Device {
            name: Some("Desk".to_string()),
            volume_percent: Some(80),
        },
    }
}

pub fn track(name: &str, artist: &str, album: &str) -> TrackInfo {
    TrackInfo {
        name: name.to_string(),
        uri: format!("spotify:track:{}", name.to_lowercase()),
        artists: vec![ArtistRef {
            name: artist.to_string(),
        }],
        album: Some(AlbumRef {
            name: album.to_string(),
        }),
    }
}
