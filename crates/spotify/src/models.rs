use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Device {
    pub name: Option<String>,
    pub volume_percent: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackItem {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Body of `GET /me/player`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CurrentPlayback {
    #[serde(default)]
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<PlaybackItem>,
    #[serde(default)]
    pub device: Device,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlbumRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
}

impl TrackInfo {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn album_name(&self) -> String {
        self.album
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_default()
    }
}

/// `spotify:track:<id>` or a bare id.
pub fn track_id_from_uri(uri: &str) -> Option<&str> {
    let id = uri.strip_prefix("spotify:track:").unwrap_or(uri);
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(id)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{track_id_from_uri, CurrentPlayback, TrackInfo};

    #[test]
    fn decodes_current_playback() {
        let raw = r#"{
            "device": {"id": "abc", "name": "Desk", "volume_percent": 64},
            "progress_ms": 42000,
            "is_playing": true,
            "item": {"name": "Harder", "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC", "duration_ms": 224000, "explicit": false},
            "shuffle_state": false
        }"#;
        let playback: CurrentPlayback = serde_json::from_str(raw).unwrap();

        assert!(playback.is_playing);
        assert_eq!(playback.device.volume_percent, Some(64));
        assert_eq!(playback.item.unwrap().duration_ms, 224_000);
    }

    #[test]
    fn track_joins_artists() {
        let raw = r#"{"name": "Song", "uri": "spotify:track:1",
            "artists": [{"name": "A"}, {"name": "B"}], "album": {"name": "LP"}}"#;
        let track: TrackInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(track.artist_names(), "A, B");
        assert_eq!(track.album_name(), "LP");
    }

    #[test]
    fn track_ids() {
        assert_eq!(track_id_from_uri("spotify:track:4uLU6h"), Some("4uLU6h"));
        assert_eq!(track_id_from_uri("4uLU6h"), Some("4uLU6h"));
        assert_eq!(track_id_from_uri("spotify:episode:x/y"), None);
    }
}
