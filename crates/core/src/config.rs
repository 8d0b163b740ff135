use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIntervals {
    pub poll_ms: u64,
    pub position_sample_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            poll_ms: 1_000,
            position_sample_ms: 1_000,
        }
    }
}

impl ConfigIntervals {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(100))
    }

    pub fn position_sample(&self) -> Duration {
        Duration::from_millis(self.position_sample_ms.max(100))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub api_base: String,
    pub accounts_base: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: "YOUR_SPOTIFY_CLIENT_ID".to_string(),
            client_secret: None,
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            scopes: vec![
                "user-read-playback-state".to_string(),
                "user-modify-playback-state".to_string(),
                "user-read-playback-position".to_string(),
            ],
            api_base: "https://api.spotify.com/v1".to_string(),
            accounts_base: "https://accounts.spotify.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub log_level: String,
    pub default_volume: f64,
    pub credential_key: String,
    pub intervals: ConfigIntervals,
    pub spotify: SpotifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            log_level: "info".to_string(),
            default_volume: 0.5,
            credential_key: "auth".to_string(),
            intervals: ConfigIntervals::default(),
            spotify: SpotifyConfig::default(),
        }
    }
}
