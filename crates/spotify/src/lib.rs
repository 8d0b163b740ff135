//! Remote playback service: the contracts backends consume, and an HTTP client for the
//! Spotify Web API that fulfils them.

use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

pub mod auth;
pub mod client;
pub mod error;
pub mod models;

pub use auth::TokenBundle;
pub use client::SpotifyClient;
pub use error::ApiError;
pub use models::{CurrentPlayback, Device, PlaybackItem, TrackInfo};

/// Authorization state changes published by an [`Authorizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// New or refreshed tokens are in place.
    Changed,
    Refreshing,
    RefreshFailed(String),
    ExchangeFailed(String),
    Deauthorized,
}

#[async_trait]
pub trait RemotePlaybackApi: Send + Sync {
    /// `None` when no device is active.
    async fn current_playback(&self) -> Result<Option<CurrentPlayback>, ApiError>;
    async fn resume_playback(&self) -> Result<(), ApiError>;
    async fn pause_playback(&self) -> Result<(), ApiError>;
    async fn seek_to_position(&self, position_ms: u64) -> Result<(), ApiError>;
    async fn set_volume(&self, percent: u8) -> Result<(), ApiError>;
    async fn skip_to_next(&self) -> Result<(), ApiError>;
    async fn skip_to_previous(&self) -> Result<(), ApiError>;
    async fn track(&self, uri: &str) -> Result<TrackInfo, ApiError>;
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self) -> bool;
    fn authorization_url(&self) -> Result<Url, ApiError>;
    fn is_redirect(&self, url: &Url) -> bool;
    async fn request_tokens(&self, redirect: &Url) -> Result<(), ApiError>;
    /// Serialized credential, opaque to callers.
    fn credential(&self) -> Result<Option<Vec<u8>>, ApiError>;
    fn restore(&self, credential: &[u8]) -> Result<(), ApiError>;
    fn deauthorize(&self);
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
