pub mod config;
pub mod error;
pub mod model;
pub mod prefs;
pub mod secret;
pub mod urls;

pub use config::{AppConfig, ConfigIntervals, SpotifyConfig};
pub use error::StoreError;
pub use model::{PlaybackPhase, SourceKind};
pub use prefs::{MemoryPreferenceStore, PreferenceStore, TomlPreferenceStore, VOLUME_PREF_KEY};
pub use secret::{FileSecretStore, MemorySecretStore, SecretStore};
