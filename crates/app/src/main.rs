mod callback;
mod engine;
mod face;
mod host;

use anyhow::{bail, Context, Result};
use audion_backends::{
    AuthorizationLifecycle, BackendEvent, Host, LocalConfig, LocalPlayer, PlaybackBackend,
    RemoteConfig, RemotePlayer, RemoteServices,
};
use audion_core::urls::parse_source;
use audion_core::{
    AppConfig, FileSecretStore, PreferenceStore, SecretStore, TomlPreferenceStore,
    VOLUME_PREF_KEY,
};
use audion_spotify::auth::now_epoch;
use audion_spotify::{Authorizer, RemotePlaybackApi, SpotifyClient};
use clap::{Parser, Subcommand};
use engine::RodioEngineFactory;
use face::TerminalFace;
use host::CliHost;
use rodio::OutputStream;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

const SECRET_PREFIX: &str = "com.audion";

#[derive(Parser, Debug)]
#[command(name = "audion", about = "Player face for local media and Spotify Connect sessions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run {
        /// Play files and streams on this machine instead of a Spotify device.
        #[arg(long)]
        local: bool,
        /// Path or URL to open once started.
        source: Option<String>,
    },
    Status,
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    Login,
    Logout,
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run {
        local: false,
        source: None,
    });
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Auth { action } => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            match action {
                AuthAction::Login => login(&cfg).await,
                AuthAction::Logout => logout(&cfg),
                AuthAction::Status => auth_status(&cfg),
            }
        }
        Commands::Run { local, source } => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            let source = source
                .map(|s| parse_source(&s).with_context(|| format!("cannot open {s}")))
                .transpose()?;
            run(cfg, local, source).await
        }
    }
}

/// A typed line of terminal input.
#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    TogglePlay,
    Stop,
    Next,
    Previous,
    ToggleMute,
    Volume(f64),
    Seek(f64),
    Open(Url),
    Help,
    Quit,
}

fn parse_gesture(line: &str) -> Option<Gesture> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match (word, rest) {
        ("p", "") => Some(Gesture::TogglePlay),
        ("s", "") => Some(Gesture::Stop),
        ("n", "") => Some(Gesture::Next),
        ("b", "") => Some(Gesture::Previous),
        ("m", "") => Some(Gesture::ToggleMute),
        ("q", "") => Some(Gesture::Quit),
        ("?" | "h" | "help", "") => Some(Gesture::Help),
        ("v", value) => value
            .parse::<f64>()
            .ok()
            .filter(|v| (0.0..=1.0).contains(v))
            .map(Gesture::Volume),
        ("seek", value) => value
            .parse::<f64>()
            .ok()
            .filter(|s| *s >= 0.0)
            .map(Gesture::Seek),
        ("open", source) => parse_source(source).map(Gesture::Open),
        _ => None,
    }
}

const HELP: &str = "p play/pause  s stop  n next  b previous  m mute  v <0..1> volume  seek <secs>  open <path|url>  q quit";

/// Returns `false` once the user asked to quit.
fn apply_gesture(backend: &mut dyn PlaybackBackend, gesture: Gesture) -> bool {
    let caps = backend.capabilities();
    match gesture {
        Gesture::TogglePlay => backend.toggle_play_pause(),
        Gesture::Stop if caps.stop => backend.stop(),
        Gesture::Next if caps.fast_forward => backend.fast_forward(),
        Gesture::Previous if caps.rewind => backend.rewind(),
        Gesture::Stop | Gesture::Next | Gesture::Previous => {
            println!("\nNot available for {}", backend.name());
        }
        Gesture::ToggleMute => backend.toggle_mute(),
        Gesture::Volume(v) => backend.volume_changed(v),
        Gesture::Seek(seconds) => {
            backend.pause_before_scrubbing();
            backend.play_time_changed(seconds);
            backend.play_after_scrubbing();
        }
        Gesture::Open(url) => backend.handle_event(BackendEvent::Url(url)),
        Gesture::Help => println!("\n{HELP}"),
        Gesture::Quit => return false,
    }
    true
}

async fn run(cfg: AppConfig, local: bool, source: Option<Url>) -> Result<()> {
    let prefs = Arc::new(open_preferences(&cfg)?);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let face = Rc::new(RefCell::new(TerminalFace::new(
        prefs.f64_or(VOLUME_PREF_KEY, cfg.default_volume),
    )));
    let host: Rc<dyn Host> = Rc::new(CliHost);

    // The output stream must outlive every engine opened on it.
    let audio = if local {
        Some(OutputStream::try_default().context("no audio output device")?)
    } else {
        None
    };
    let mut listener = None;
    let mut backend: Box<dyn PlaybackBackend> = match &audio {
        Some((_, output)) => Box::new(LocalPlayer::new(
            Box::new(RodioEngineFactory::new(output.clone())),
            face.clone(),
            host,
            prefs,
            tx.clone(),
            LocalConfig::default(),
        )),
        None => {
            let client = Arc::new(SpotifyClient::new(cfg.spotify.clone())?);
            listener = match callback::listen(client.redirect_uri(), tx.clone()).await {
                Ok(task) => Some(task),
                Err(err) => {
                    warn!(error=%err, "authorization callback listener unavailable");
                    None
                }
            };
            let services = RemoteServices {
                api: client.clone(),
                authorizer: client,
                secrets: Arc::new(secret_store()?),
                prefs,
            };
            let remote_cfg = RemoteConfig {
                poll_interval: cfg.intervals.poll(),
                credential_key: cfg.credential_key.clone(),
            };
            Box::new(RemotePlayer::new(
                services,
                face.clone(),
                host,
                tx.clone(),
                remote_cfg,
            ))
        }
    };

    info!(backend = backend.name(), "audion started");
    println!("{HELP}");
    backend.start();
    if let Some(url) = source {
        backend.handle_event(BackendEvent::Url(url));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(event) = rx.recv() => backend.handle_event(event),
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_gesture(&line) {
                    Some(gesture) => {
                        if !apply_gesture(backend.as_mut(), gesture) {
                            break;
                        }
                    }
                    None => println!("\n{HELP}"),
                },
                Ok(None) => {
                    info!("stdin closed; shutting down");
                    break;
                }
                Err(err) => {
                    warn!(error=%err, "failed to read input");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    if let Some(task) = listener {
        task.abort();
    }
    drop(backend);
    println!();
    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let client = SpotifyClient::new(cfg.spotify.clone())?;
    let secrets = secret_store()?;
    let Some(credential) = secrets.get_data(&cfg.credential_key)? else {
        println!("authorized: no (run `audion auth login`)");
        return Ok(());
    };
    client
        .restore(&credential)
        .context("stored credential is unusable; run `audion auth login`")?;

    match client.current_playback().await? {
        Some(playback) => {
            println!("playing: {}", playback.is_playing);
            if let Some(name) = playback.device.name.as_deref() {
                println!("device: {name}");
            }
            match playback.item {
                Some(item) => {
                    let track = client.track(&item.uri).await?;
                    println!("track: {}", item.name);
                    println!("artist: {}", track.artist_names());
                    println!("album: {}", track.album_name());
                    println!(
                        "position: {}s / {}s",
                        playback.progress_ms.unwrap_or(0) / 1_000,
                        item.duration_ms / 1_000
                    );
                }
                None => println!("track: <none>"),
            }
            if let Some(volume) = playback.device.volume_percent {
                println!("volume: {volume}%");
            }
        }
        None => println!("no active device"),
    }

    // A refresh during the requests above replaced the stored tokens.
    if let Some(current) = client.credential()? {
        if current != credential {
            secrets.set(&current, &cfg.credential_key)?;
        }
    }
    Ok(())
}

async fn login(cfg: &AppConfig) -> Result<()> {
    let client = Arc::new(SpotifyClient::new(cfg.spotify.clone())?);
    let secrets = Arc::new(secret_store()?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut lifecycle = AuthorizationLifecycle::new(
        client.clone(),
        secrets,
        Rc::new(CliHost),
        tx.clone(),
        cfg.credential_key.clone(),
    );

    let listener = callback::listen(client.redirect_uri(), tx).await?;
    if lifecycle.start() && lifecycle.is_authorized() {
        listener.abort();
        println!("Already authorized.");
        return Ok(());
    }

    let outcome = loop {
        tokio::select! {
            Some(event) = rx.recv() => match event {
                BackendEvent::Url(url) if lifecycle.is_redirect(&url) => lifecycle.complete(url),
                BackendEvent::Auth(event) => match lifecycle.handle(&event) {
                    Some(true) => break Ok(()),
                    Some(false) => break Err(anyhow::anyhow!("authorization failed: {event:?}")),
                    None => {}
                },
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => break Err(anyhow::anyhow!("authorization cancelled")),
        }
    };
    listener.abort();
    outcome?;
    println!("Authorized.");
    Ok(())
}

fn logout(cfg: &AppConfig) -> Result<()> {
    let client = Arc::new(SpotifyClient::new(cfg.spotify.clone())?);
    let secrets = Arc::new(secret_store()?);
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut lifecycle =
        AuthorizationLifecycle::new(client, secrets, Rc::new(CliHost), tx, cfg.credential_key.clone());
    lifecycle.deauthorize();
    if lifecycle.has_credential() {
        bail!("stored credential could not be removed");
    }
    println!("Signed out.");
    Ok(())
}

fn auth_status(cfg: &AppConfig) -> Result<()> {
    let client = SpotifyClient::new(cfg.spotify.clone())?;
    let secrets = secret_store()?;
    match secrets.get_data(&cfg.credential_key)? {
        Some(credential) => match client.restore(&credential) {
            Ok(()) => {
                let expires_in = client
                    .token_snapshot()
                    .map(|t| t.expires_at.saturating_sub(now_epoch()))
                    .unwrap_or(0);
                println!("credential: stored");
                println!("usable: {}", client.is_authorized());
                println!("access token expires in: {expires_in}s");
            }
            Err(err) => println!("credential: stored but unusable ({err}); run `audion auth login`"),
        },
        None => println!("credential: none"),
    }
    Ok(())
}

fn open_preferences(cfg: &AppConfig) -> Result<TomlPreferenceStore> {
    let path = app_dir(dirs::config_dir())?.join("prefs.toml");
    let prefs = TomlPreferenceStore::open(&path)
        .with_context(|| format!("failed to open preferences {}", path.display()))?;
    prefs.register_default(VOLUME_PREF_KEY, cfg.default_volume);
    Ok(prefs)
}

fn secret_store() -> Result<FileSecretStore> {
    let dir = app_dir(dirs::data_dir())?.join("secrets");
    Ok(FileSecretStore::new(dir, SECRET_PREFIX))
}

fn app_dir(base: Option<PathBuf>) -> Result<PathBuf> {
    let base = base.context("no per-user directory available on this platform")?;
    Ok(base.join("audion"))
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("audion").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("AUDION_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Ok(v) = std::env::var("AUDION_SPOTIFY_CLIENT_ID") {
        if !v.trim().is_empty() {
            cfg.spotify.client_id = v;
        }
    }
    if let Ok(v) = std::env::var("AUDION_SPOTIFY_CLIENT_SECRET") {
        if !v.trim().is_empty() {
            cfg.spotify.client_secret = Some(v);
        }
    }
}
