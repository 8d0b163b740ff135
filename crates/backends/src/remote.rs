use crate::auth::AuthorizationLifecycle;
use crate::{BackendEvent, Capabilities, Host, Inbox, PlaybackBackend};
use audion_core::{PreferenceStore, SecretStore, VOLUME_PREF_KEY};
use audion_session::projection::{
    now_playing_line, percent_from_volume, seconds_from_millis, volume_from_percent,
};
use audion_session::{AnimationType, MuteState, PlaybackSession, SharedFace};
use audion_spotify::{
    ApiError, AuthEvent, Authorizer, CurrentPlayback, RemotePlaybackApi, TrackInfo,
};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Network completions, redelivered to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    PollTick,
    Playback(Option<CurrentPlayback>),
    PollFailed(String),
    TrackLoaded { uri: String, track: TrackInfo },
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub poll_interval: Duration,
    pub credential_key: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            credential_key: "auth".to_string(),
        }
    }
}

/// Collaborators a [`RemotePlayer`] is built from.
#[derive(Clone)]
pub struct RemoteServices {
    pub api: Arc<dyn RemotePlaybackApi>,
    pub authorizer: Arc<dyn Authorizer>,
    pub secrets: Arc<dyn SecretStore>,
    pub prefs: Arc<dyn PreferenceStore>,
}

/// Drives a remote playback session: polls it, pushes commands to it, and keeps the face
/// in step with what comes back.
pub struct RemotePlayer {
    api: Arc<dyn RemotePlaybackApi>,
    prefs: Arc<dyn PreferenceStore>,
    face: SharedFace,
    host: Rc<dyn Host>,
    inbox: Inbox,
    cfg: RemoteConfig,
    lifecycle: AuthorizationLifecycle,
    session: PlaybackSession,
    mute: MuteState,
    started: bool,
    poll_task: Option<JoinHandle<()>>,
    poll_in_flight: bool,
    track_fetch: Option<JoinHandle<()>>,
    pending_seek: Option<f64>,
}

impl RemotePlayer {
    pub fn new(
        services: RemoteServices,
        face: SharedFace,
        host: Rc<dyn Host>,
        inbox: Inbox,
        cfg: RemoteConfig,
    ) -> Self {
        let lifecycle = AuthorizationLifecycle::new(
            services.authorizer,
            services.secrets,
            host.clone(),
            inbox.clone(),
            cfg.credential_key.clone(),
        );
        let mut session = PlaybackSession::new(false);
        session.volume.set(100.0);

        Self {
            api: services.api,
            prefs: services.prefs,
            face,
            host,
            inbox,
            cfg,
            lifecycle,
            session,
            mute: MuteState::default(),
            started: false,
            poll_task: None,
            poll_in_flight: false,
            track_fetch: None,
            pending_seek: None,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn skip_next(&mut self) {
        self.fast_forward();
    }

    pub fn skip_previous(&mut self) {
        self.rewind();
    }

    fn bind_face(&mut self) {
        let face = self.face.clone();
        let scrub = self.session.scrub_flag();
        self.session.is_playing.subscribe(move |playing| {
            if scrub.get() {
                return;
            }
            let mut face = face.borrow_mut();
            if *playing {
                face.play();
            } else {
                face.pause();
            }
        });

        let line = Rc::new(RefCell::new((String::new(), String::new())));
        let (face, shared) = (self.face.clone(), line.clone());
        self.session.song_name.subscribe(move |name| {
            let mut parts = shared.borrow_mut();
            parts.0 = name.clone();
            face.borrow_mut()
                .set_album_text(non_empty(now_playing_line(&parts.0, &parts.1)));
        });
        let (face, shared) = (self.face.clone(), line);
        self.session.song_album.subscribe(move |album| {
            let mut parts = shared.borrow_mut();
            parts.1 = album.clone();
            face.borrow_mut()
                .set_album_text(non_empty(now_playing_line(&parts.0, &parts.1)));
        });

        let face = self.face.clone();
        self.session
            .song_artist
            .subscribe(move |artist| face.borrow_mut().set_artist_text(non_empty(artist.clone())));

        let face = self.face.clone();
        self.session.volume.subscribe(move |percent| {
            face.borrow_mut().set_volume(volume_from_percent(*percent))
        });
        let face = self.face.clone();
        self.session
            .duration_seconds
            .subscribe(move |d| face.borrow_mut().set_duration_in_seconds(*d));
        let face = self.face.clone();
        self.session
            .position_seconds
            .subscribe(move |t| face.borrow_mut().set_time_in_seconds(*t));

        let face = self.face.clone();
        self.session.is_authorized.bind(move |authorized| {
            let animation = if *authorized {
                AnimationType::None
            } else {
                AnimationType::Connecting
            };
            face.borrow_mut().set_animation_type(animation);
        });
    }

    fn spawn_poll_timer(&self) -> JoinHandle<()> {
        let inbox = self.inbox.clone();
        let period = self.cfg.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if inbox.send(BackendEvent::Remote(RemoteEvent::PollTick)).is_err() {
                    break;
                }
            }
        })
    }

    /// Fetches the current remote session unless a fetch is already outstanding.
    pub fn refresh(&mut self) {
        if self.poll_in_flight || !self.lifecycle.is_authorized() {
            return;
        }
        self.poll_in_flight = true;
        let api = self.api.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let event = match api.current_playback().await {
                Ok(playback) => RemoteEvent::Playback(playback),
                Err(err) => RemoteEvent::PollFailed(err.to_string()),
            };
            let _ = inbox.send(BackendEvent::Remote(event));
        });
    }

    fn apply_playback(&mut self, playback: Option<CurrentPlayback>) {
        let playback = playback.unwrap_or_default();
        let (name, uri, duration_ms) = match playback.item {
            Some(item) => (item.name, Some(item.uri), item.duration_ms),
            None => (String::new(), None, 0),
        };

        self.session.is_playing.set(playback.is_playing);
        self.session.song_name.set(name);
        self.session
            .duration_seconds
            .set(seconds_from_millis(duration_ms));
        if !self.mute.is_muted() {
            let percent = playback.device.volume_percent.unwrap_or(100);
            self.session.volume.set(f64::from(percent));
        }

        if self.session.track_identifier.set_if_changed(uri.clone()) {
            match uri {
                Some(uri) => self.fetch_track(uri),
                None => {
                    self.cancel_track_fetch();
                    self.session.clear_song();
                }
            }
        }

        self.session
            .write_position(seconds_from_millis(playback.progress_ms.unwrap_or(0)));
    }

    fn cancel_track_fetch(&mut self) {
        if let Some(fetch) = self.track_fetch.take() {
            fetch.abort();
        }
    }

    fn fetch_track(&mut self, uri: String) {
        self.cancel_track_fetch();
        let api = self.api.clone();
        let inbox = self.inbox.clone();
        self.track_fetch = Some(tokio::spawn(async move {
            match api.track(&uri).await {
                Ok(track) => {
                    let _ = inbox.send(BackendEvent::Remote(RemoteEvent::TrackLoaded { uri, track }));
                }
                Err(err) => warn!(uri = %uri, error=%err, "track lookup failed"),
            }
        }));
    }

    fn apply_track(&mut self, uri: String, track: TrackInfo) {
        if self.session.track_identifier.get().as_deref() != Some(uri.as_str()) {
            trace!(uri = %uri, "discarding metadata for a superseded track");
            return;
        }
        self.session.song_name.set(track.name.clone());
        self.session.song_artist.set(track.artist_names());
        self.session.song_album.set(track.album_name());
    }

    fn handle_remote(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::PollTick => self.refresh(),
            RemoteEvent::Playback(playback) => {
                self.poll_in_flight = false;
                self.apply_playback(playback);
            }
            RemoteEvent::PollFailed(reason) => {
                self.poll_in_flight = false;
                debug!(reason = %reason, "playback poll failed");
            }
            RemoteEvent::TrackLoaded { uri, track } => self.apply_track(uri, track),
        }
    }

    fn handle_auth(&mut self, event: AuthEvent) {
        let Some(authorized) = self.lifecycle.handle(&event) else {
            return;
        };
        let authorized = authorized && self.lifecycle.is_authorized();
        self.session.is_authorized.set_if_changed(authorized);
        if authorized {
            self.refresh();
        }
    }

    /// Commands go out only with an authorized session; otherwise the host decides.
    fn authorized_or_fallback(&self, command: &str) -> bool {
        if *self.session.is_authorized.get() {
            return true;
        }
        debug!(command, "remote command while unauthorized");
        self.host.authorization_fallback();
        false
    }

    fn dispatch<F, Fut>(&self, command: &'static str, request: F)
    where
        F: FnOnce(Arc<dyn RemotePlaybackApi>) -> Fut,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let fut = request(self.api.clone());
        tokio::spawn(async move {
            if let Err(err) = fut.await {
                warn!(command, error=%err, "remote command failed");
            }
        });
    }

    /// Authorization redirects complete the sign-in; anything else is a request to open.
    pub fn route_url(&mut self, url: Url) {
        if self.lifecycle.is_redirect(&url) {
            self.lifecycle.complete(url);
        } else if !self.open_and_play(&url) {
            debug!(url = %url, "ignoring url the remote backend cannot play");
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        let position_ms = (seconds.max(0.0) * 1_000.0) as u64;
        self.dispatch("seek", move |api| async move {
            api.seek_to_position(position_ms).await
        });
        self.session.write_position(seconds.max(0.0) as i64);
    }

    fn send_volume(&mut self, volume: f64) {
        let percent = percent_from_volume(volume);
        self.dispatch("volume", move |api| async move { api.set_volume(percent).await });
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl PlaybackBackend for RemotePlayer {
    fn name(&self) -> &'static str {
        "spotify"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stop: false,
            rewind: true,
            fast_forward: true,
        }
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.bind_face();

        let authorized = self.lifecycle.start();
        self.session.is_authorized.set_if_changed(authorized);
        if authorized {
            info!("remote session authorized");
            self.refresh();
        }
        self.poll_task = Some(self.spawn_poll_timer());
    }

    fn open(&mut self, source: &Url) -> bool {
        debug!(source = %source, "remote backend cannot open sources");
        false
    }

    fn play(&mut self) {
        if !self.authorized_or_fallback("play") {
            return;
        }
        self.dispatch("play", |api| async move { api.resume_playback().await });
        self.session.is_playing.set(true);
    }

    fn pause(&mut self) {
        if !self.authorized_or_fallback("pause") {
            return;
        }
        self.dispatch("pause", |api| async move { api.pause_playback().await });
        self.session.is_playing.set(false);
    }

    fn stop(&mut self) {
        if !self.authorized_or_fallback("stop") {
            return;
        }
        self.dispatch("stop", |api| async move { api.pause_playback().await });
        self.session.is_playing.set(false);
        if !self.session.is_scrubbing() {
            self.face.borrow_mut().stop();
        }
    }

    fn is_playing(&self) -> bool {
        *self.session.is_playing.get()
    }

    fn mute(&mut self) {
        if self.mute.is_muted() || !self.authorized_or_fallback("mute") {
            return;
        }
        let current = volume_from_percent(*self.session.volume.get());
        self.mute.mute(current);
        self.send_volume(0.0);
        self.face.borrow_mut().set_volume(0.0);
    }

    fn un_mute(&mut self) {
        if !self.mute.is_muted() || !self.authorized_or_fallback("unmute") {
            return;
        }
        let restored = self.mute.unmute();
        self.send_volume(restored);
        self.session.volume.set(restored * 100.0);
    }

    fn is_muted(&self) -> bool {
        self.mute.is_muted()
    }

    fn rewind(&mut self) {
        if !self.authorized_or_fallback("previous") {
            return;
        }
        self.dispatch("previous", |api| async move { api.skip_to_previous().await });
        self.session.clear_song();
    }

    fn fast_forward(&mut self) {
        if !self.authorized_or_fallback("next") {
            return;
        }
        self.dispatch("next", |api| async move { api.skip_to_next().await });
        self.session.clear_song();
    }

    fn volume_changed(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        if let Err(err) = self.prefs.set_f64(VOLUME_PREF_KEY, volume) {
            warn!(error=%err, "failed to persist volume");
        }
        if !self.authorized_or_fallback("volume") {
            return;
        }
        self.mute.note_volume_change(volume);
        self.send_volume(volume);
        self.session.volume.set(volume * 100.0);
    }

    fn play_time_changed(&mut self, seconds: f64) {
        if !self.authorized_or_fallback("seek") {
            return;
        }
        if !self.session.has_known_duration() {
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
    }

    fn play_after_scrubbing(&mut self) {
        self.session.set_scrubbing(false);
        if let Some(seconds) = self.pending_seek.take() {
            if *self.session.is_authorized.get() {
                self.seek_to(seconds);
            }
        }
    }

    fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Remote(event) => self.handle_remote(event),
            BackendEvent::Auth(event) => self.handle_auth(event),
            BackendEvent::Url(url) => self.route_url(url),
            BackendEvent::Engine(_) => {}
        }
    }
}

impl Drop for RemotePlayer {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.cancel_track_fetch();
    }
}
