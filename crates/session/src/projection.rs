//! Pure mappings from session facts to face text and units.

const SEPARATOR: &str = "—";

/// "name—album", either half alone, or empty.
pub fn now_playing_line(song_name: &str, song_album: &str) -> String {
    match (song_name.is_empty(), song_album.is_empty()) {
        (false, true) => song_name.to_string(),
        (true, false) => song_album.to_string(),
        (true, true) => String::new(),
        (false, false) => format!("{song_name}{SEPARATOR}{song_album}"),
    }
}

/// Joins the non-empty parts; `None` when nothing is left.
pub fn joined_details(parts: &[&str]) -> Option<String> {
    let kept: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(SEPARATOR))
    }
}

pub fn percent_from_volume(volume: f64) -> u8 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

pub fn volume_from_percent(percent: f64) -> f64 {
    (percent / 100.0).clamp(0.0, 1.0)
}

pub fn seconds_from_millis(ms: u64) -> i64 {
    (ms / 1_000) as i64
}

/// Whole seconds for a media duration; `-1` when unknown or infinite.
pub fn display_duration(seconds: Option<f64>) -> i64 {
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => s as i64,
        _ => -1,
    }
}
