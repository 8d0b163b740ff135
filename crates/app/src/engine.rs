//! [`MediaEngine`] over rodio for output, with symphonia reading tags and length.

use anyhow::{anyhow, bail, Context, Result};
use audion_backends::{
    EngineEvent, EngineSink, EngineStatus, MediaEngine, MediaEngineFactory, MetadataItem,
    MetadataKey, ObserverToken, TimeControlStatus,
};
use rodio::{Decoder, OutputStreamHandle, Sink};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag};
use symphonia::core::probe::Hint;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use url::Url;

const MAX_STREAM_BYTES: usize = 256 * 1024 * 1024;

/// Opens sources against one audio output.
pub struct RodioEngineFactory {
    output: OutputStreamHandle,
}

impl RodioEngineFactory {
    pub fn new(output: OutputStreamHandle) -> Self {
        Self { output }
    }
}

impl MediaEngineFactory for RodioEngineFactory {
    fn open(&self, source: &Url) -> Box<dyn MediaEngine> {
        Box::new(RodioEngine::open(self.output.clone(), source))
    }
}

/// What can be read from a source before it plays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Description {
    pub duration: Option<f64>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub format: Option<String>,
}

impl Description {
    fn apply(&mut self, tags: &[Tag]) {
        for tag in tags {
            let slot = match tag.std_key {
                Some(StandardTagKey::TrackTitle) => &mut self.title,
                Some(StandardTagKey::Artist) => &mut self.artist,
                Some(StandardTagKey::Album) => &mut self.album,
                _ => continue,
            };
            let value = tag.value.to_string();
            let value = value.trim();
            if !value.is_empty() {
                *slot = Some(value.to_string());
            }
        }
    }

    pub fn metadata(&self) -> Vec<MetadataItem> {
        [
            (MetadataKey::Title, &self.title),
            (MetadataKey::Artist, &self.artist),
            (MetadataKey::AlbumName, &self.album),
            (MetadataKey::Format, &self.format),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_some())
        .map(|(key, value)| MetadataItem {
            key,
            value: value.clone(),
        })
        .collect()
    }
}

/// Probes `bytes` for length, codec and the common tags.
pub fn describe(bytes: Vec<u8>, extension: Option<&str>) -> Result<Description> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unrecognized audio format")?;

    let (duration, format) = {
        let track = probed
            .format
            .default_track()
            .context("source has no playable track")?;
        let params = &track.codec_params;
        let duration = match (params.n_frames, params.sample_rate) {
            (Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / f64::from(rate)),
            _ => None,
        };
        let format = symphonia::default::get_codecs()
            .get_codec(params.codec)
            .map(|codec| codec.short_name.to_uppercase());
        (duration, format)
    };

    let mut description = Description {
        duration,
        format,
        ..Description::default()
    };
    // Tags found ahead of the container (ID3) first, the container's own on top.
    if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        description.apply(revision.tags());
    }
    if let Some(revision) = probed.format.metadata().current() {
        description.apply(revision.tags());
    }
    Ok(description)
}

fn extension_of(url: &Url) -> Option<String> {
    let name = url.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn decode_into(
    output: &OutputStreamHandle,
    bytes: Vec<u8>,
    extension: Option<&str>,
) -> Result<(Sink, Description)> {
    let description = describe(bytes.clone(), extension)?;
    let decoder = Decoder::new(Cursor::new(bytes)).context("unsupported audio data")?;
    let sink = Sink::try_new(output).context("audio output unavailable")?;
    sink.pause();
    sink.append(decoder);
    Ok((sink, description))
}

fn load_file(output: &OutputStreamHandle, source: &Url) -> Result<(Sink, Description)> {
    let path = source
        .to_file_path()
        .map_err(|()| anyhow!("not a local path: {source}"))?;
    let bytes =
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    decode_into(output, bytes, extension_of(source).as_deref())
}

async fn fetch(url: &Url) -> Result<Vec<u8>> {
    let mut resp = reqwest::get(url.clone()).await?.error_for_status()?;
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_STREAM_BYTES {
            bail!("stream did not end within {} MiB", MAX_STREAM_BYTES >> 20);
        }
    }
    Ok(body)
}

struct Shared {
    sink: Option<Sink>,
    status: EngineStatus,
    description: Description,
    observers: Vec<(ObserverToken, EngineSink)>,
    streaming: bool,
    playing: bool,
    volume: f32,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        for (_, sink) in &self.observers {
            sink.emit(event);
        }
    }

    fn install(&mut self, sink: Sink, description: Description) {
        sink.set_volume(self.volume);
        if self.playing {
            sink.play();
        }
        self.sink = Some(sink);
        self.description = description;
        self.status = EngineStatus::ReadyToPlay;
        self.emit(EngineEvent::StatusChanged(EngineStatus::ReadyToPlay));
        if self.playing && self.streaming {
            self.emit(EngineEvent::TimeControlStatusChanged(TimeControlStatus::Playing));
        }
    }

    fn fail(&mut self) {
        self.status = EngineStatus::Failed;
        self.emit(EngineEvent::StatusChanged(EngineStatus::Failed));
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// One source on the audio output. Network sources are buffered whole before they
/// play and report no duration.
pub struct RodioEngine {
    shared: Arc<Mutex<Shared>>,
    next_token: u64,
    timers: Vec<(ObserverToken, JoinHandle<()>)>,
    fetch: Option<JoinHandle<()>>,
}

impl RodioEngine {
    fn open(output: OutputStreamHandle, source: &Url) -> Self {
        let streaming = matches!(source.scheme(), "http" | "https");
        let shared = Arc::new(Mutex::new(Shared {
            sink: None,
            status: EngineStatus::Unknown,
            description: Description::default(),
            observers: Vec::new(),
            streaming,
            playing: false,
            volume: 1.0,
        }));
        let mut engine = Self {
            shared,
            next_token: 0,
            timers: Vec::new(),
            fetch: None,
        };

        match source.scheme() {
            "file" => match load_file(&output, source) {
                Ok((sink, description)) => lock(&engine.shared).install(sink, description),
                Err(err) => {
                    warn!(source = %source, error = %err, "failed to load source");
                    lock(&engine.shared).fail();
                }
            },
            "http" | "https" => engine.fetch = Some(engine.spawn_fetch(output, source.clone())),
            other => {
                warn!(scheme = other, "unsupported source scheme");
                lock(&engine.shared).fail();
            }
        }
        engine
    }

    // TODO: decode progressively so endless radio streams can start before the body ends.
    fn spawn_fetch(&self, output: OutputStreamHandle, url: Url) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let loaded = match fetch(&url).await {
                Ok(bytes) => {
                    let extension = extension_of(&url);
                    tokio::task::spawn_blocking(move || {
                        decode_into(&output, bytes, extension.as_deref())
                    })
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(|decoded| decoded)
                }
                Err(err) => Err(err),
            };
            let mut shared = lock(&shared);
            match loaded {
                Ok((sink, description)) => {
                    debug!(url = %url, "stream buffered");
                    shared.install(sink, description);
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "stream failed to load");
                    shared.fail();
                }
            }
        })
    }

    fn token(&mut self) -> ObserverToken {
        self.next_token += 1;
        ObserverToken(self.next_token)
    }
}

impl MediaEngine for RodioEngine {
    fn play(&mut self) {
        let mut shared = lock(&self.shared);
        shared.playing = true;
        let ready = match shared.sink.as_ref() {
            Some(sink) => {
                sink.play();
                true
            }
            None => false,
        };
        shared.emit(EngineEvent::RateChanged(1.0));
        if shared.streaming {
            let status = if ready {
                TimeControlStatus::Playing
            } else {
                TimeControlStatus::WaitingToPlayAtSpecifiedRate
            };
            shared.emit(EngineEvent::TimeControlStatusChanged(status));
        }
    }

    fn pause(&mut self) {
        let mut shared = lock(&self.shared);
        shared.playing = false;
        if let Some(sink) = shared.sink.as_ref() {
            sink.pause();
        }
        shared.emit(EngineEvent::RateChanged(0.0));
        if shared.streaming {
            shared.emit(EngineEvent::TimeControlStatusChanged(TimeControlStatus::Paused));
        }
    }

    fn seek(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let shared = lock(&self.shared);
        if let Some(sink) = shared.sink.as_ref() {
            if let Err(err) = sink.try_seek(Duration::from_secs_f64(seconds.max(0.0))) {
                warn!(seconds, error = %err, "seek failed");
            }
        }
    }

    fn volume(&self) -> f32 {
        lock(&self.shared).volume
    }

    fn set_volume(&mut self, volume: f32) {
        let mut shared = lock(&self.shared);
        shared.volume = volume;
        if let Some(sink) = shared.sink.as_ref() {
            sink.set_volume(volume);
        }
    }

    // Network bodies are buffered whole, so there is nothing to stall on.
    fn set_waits_to_minimize_stalling(&mut self, _waits: bool) {}

    fn duration(&self) -> Option<f64> {
        let shared = lock(&self.shared);
        if shared.streaming {
            None
        } else {
            shared.description.duration
        }
    }

    fn asset_length(&self) -> f64 {
        let shared = lock(&self.shared);
        match shared.status {
            EngineStatus::Failed => 0.0,
            _ if shared.streaming => f64::NAN,
            EngineStatus::ReadyToPlay => shared.description.duration.unwrap_or(f64::INFINITY),
            EngineStatus::Unknown => f64::NAN,
        }
    }

    fn common_metadata(&self) -> Vec<MetadataItem> {
        lock(&self.shared).description.metadata()
    }

    fn subscribe(&mut self, sink: EngineSink) -> ObserverToken {
        let token = self.token();
        debug!(generation = sink.generation(), "engine observer attached");
        let mut shared = lock(&self.shared);
        if shared.status != EngineStatus::Unknown {
            sink.emit(EngineEvent::StatusChanged(shared.status));
        }
        shared.observers.push((token, sink));
        token
    }

    fn unsubscribe(&mut self, token: ObserverToken) {
        lock(&self.shared).observers.retain(|(t, _)| *t != token);
        self.timers.retain(|(t, task)| {
            if *t == token {
                task.abort();
            }
            *t != token
        });
    }

    fn add_periodic_time_observer(
        &mut self,
        interval: Duration,
        sink: EngineSink,
    ) -> ObserverToken {
        let token = self.token();
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let mut shared = lock(&shared);
                let Some(position) = shared.sink.as_ref().map(|s| s.get_pos().as_secs_f64())
                else {
                    continue;
                };
                if !sink.emit(EngineEvent::PeriodicTime(position)) {
                    break;
                }
                if shared.playing && shared.sink.as_ref().is_some_and(Sink::empty) {
                    shared.playing = false;
                    shared.emit(EngineEvent::RateChanged(0.0));
                }
            }
        });
        self.timers.push((token, task));
        token
    }
}

impl Drop for RodioEngine {
    fn drop(&mut self) {
        if let Some(task) = self.fetch.take() {
            task.abort();
        }
        for (_, task) in self.timers.drain(..) {
            task.abort();
        }
        let mut shared = lock(&self.shared);
        shared.observers.clear();
        if let Some(sink) = shared.sink.take() {
            sink.stop();
        }
    }
}
