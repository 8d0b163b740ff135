use audion_session::{AnimationType, FaceState, FaceWidget, Transport};
use std::io::Write;

/// Prints the face as a single status line whenever what it shows changes.
pub struct TerminalFace {
    state: FaceState,
    last_line: String,
}

impl TerminalFace {
    pub fn new(volume: f64) -> Self {
        Self {
            state: FaceState::new(volume),
            last_line: String::new(),
        }
    }

    fn refresh(&mut self) {
        let line = render_line(&self.state);
        if line == self.last_line {
            return;
        }
        self.last_line = line;
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r\x1b[2K{}", self.last_line);
        let _ = out.flush();
    }
}

fn clock(seconds: i64) -> String {
    if seconds < 0 {
        return "--:--".to_string();
    }
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn render_line(state: &FaceState) -> String {
    let transport = match state.transport {
        Transport::Playing => ">",
        Transport::Paused => "||",
        Transport::Stopped => "[]",
    };
    let time = if state.has_scrub_range() {
        format!("{} / {}", clock(state.time_in_seconds), clock(state.duration_in_seconds))
    } else {
        clock(state.time_in_seconds)
    };

    let mut line = format!(
        "{transport} {time}  vol {:>3}%",
        (state.volume * 100.0).round() as i64
    );
    if let Some(artist) = state.artist_text.as_deref() {
        line.push_str("  ");
        line.push_str(artist);
    }
    if let Some(album) = state.album_text.as_deref() {
        line.push_str("  (");
        line.push_str(album);
        line.push(')');
    }
    match state.animation_type {
        AnimationType::None => {}
        AnimationType::Connecting => line.push_str("  [connecting]"),
        AnimationType::Streaming => line.push_str("  [live]"),
        AnimationType::Lag => line.push_str("  [buffering]"),
    }
    if state.is_inactive {
        line.push_str("  [inactive]");
    }
    line
}

impl FaceWidget for TerminalFace {
    fn play(&mut self) {
        self.state.play();
        self.refresh();
    }

    fn pause(&mut self) {
        self.state.pause();
        self.refresh();
    }

    fn stop(&mut self) {
        self.state.stop();
        self.refresh();
    }

    fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    fn duration_in_seconds(&self) -> i64 {
        self.state.duration_in_seconds
    }

    fn set_duration_in_seconds(&mut self, seconds: i64) {
        self.state.set_duration_in_seconds(seconds);
        self.refresh();
    }

    fn time_in_seconds(&self) -> i64 {
        self.state.time_in_seconds
    }

    fn set_time_in_seconds(&mut self, seconds: i64) {
        self.state.set_time_in_seconds(seconds);
        self.refresh();
    }

    fn volume(&self) -> f64 {
        self.state.volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.set_volume(volume);
        self.refresh();
    }

    fn artist_text(&self) -> Option<String> {
        self.state.artist_text.clone()
    }

    fn set_artist_text(&mut self, text: Option<String>) {
        self.state.set_artist_text(text);
        self.refresh();
    }

    fn album_text(&self) -> Option<String> {
        self.state.album_text.clone()
    }

    fn set_album_text(&mut self, text: Option<String>) {
        self.state.set_album_text(text);
        self.refresh();
    }

    fn animation_type(&self) -> AnimationType {
        self.state.animation_type
    }

    fn set_animation_type(&mut self, animation: AnimationType) {
        self.state.set_animation_type(animation);
        self.refresh();
    }

    fn is_inactive(&self) -> bool {
        self.state.is_inactive
    }

    fn set_inactive(&mut self, inactive: bool) {
        self.state.set_inactive(inactive);
        self.refresh();
    }
}
