use crate::observable::Observable;
use std::cell::Cell;
use std::rc::Rc;
use tracing::trace;

/// Shared "a scrub gesture is in progress" bit. Projections read it to hold back
/// play/pause animation while the engine churns under a drag.
#[derive(Debug, Clone, Default)]
pub struct ScrubFlag(Rc<Cell<bool>>);

impl ScrubFlag {
    pub fn get(&self) -> bool {
        self.0.get()
    }

    pub fn set(&self, scrubbing: bool) {
        self.0.set(scrubbing);
    }
}

/// Observable facts about what is playing. Owned by the active backend.
///
/// `volume` is 0–1 for the local backend and 0–100 for the remote one.
#[derive(Debug)]
pub struct PlaybackSession {
    pub track_identifier: Observable<Option<String>>,
    pub is_playing: Observable<bool>,
    pub song_name: Observable<String>,
    pub song_artist: Observable<String>,
    pub song_album: Observable<String>,
    pub volume: Observable<f64>,
    pub duration_seconds: Observable<i64>,
    pub position_seconds: Observable<i64>,
    pub is_authorized: Observable<bool>,
    scrubbing: ScrubFlag,
}

impl PlaybackSession {
    pub fn new(is_authorized: bool) -> Self {
        Self {
            track_identifier: Observable::new(None),
            is_playing: Observable::new(false),
            song_name: Observable::default(),
            song_artist: Observable::default(),
            song_album: Observable::default(),
            volume: Observable::new(0.0),
            duration_seconds: Observable::new(0),
            position_seconds: Observable::new(0),
            is_authorized: Observable::new(is_authorized),
            scrubbing: ScrubFlag::default(),
        }
    }

    pub fn scrub_flag(&self) -> ScrubFlag {
        self.scrubbing.clone()
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing.get()
    }

    pub fn set_scrubbing(&self, scrubbing: bool) {
        self.scrubbing.set(scrubbing);
    }

    /// `-1` marks live or unknown-length media.
    pub fn has_known_duration(&self) -> bool {
        *self.duration_seconds.get() >= 0
    }

    /// Position writes are dropped while a scrub gesture owns the scrubber.
    pub fn write_position(&mut self, seconds: i64) -> bool {
        if self.scrubbing.get() {
            trace!(seconds, "position write held back while scrubbing");
            return false;
        }
        self.position_seconds.set(seconds);
        true
    }

    pub fn clear_song(&mut self) {
        self.song_name.set(String::new());
        self.song_artist.set(String::new());
        self.song_album.set(String::new());
    }
}

/// Mute is a display-level override; the stored volume is untouched while it is on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MuteState {
    muted: bool,
    pre_mute_volume: f64,
}

impl MuteState {
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn pre_mute_volume(&self) -> f64 {
        self.pre_mute_volume
    }

    pub fn mute(&mut self, current_volume: f64) {
        self.pre_mute_volume = current_volume;
        self.muted = true;
    }

    /// Returns the volume to restore.
    pub fn unmute(&mut self) -> f64 {
        self.muted = false;
        self.pre_mute_volume
    }

    /// A non-zero volume change implicitly lifts the mute.
    pub fn note_volume_change(&mut self, volume: f64) {
        if volume > 0.0 {
            self.muted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MuteState, PlaybackSession};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn position_writes_are_held_while_scrubbing() {
        let mut session = PlaybackSession::new(true);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        session
            .position_seconds
            .subscribe(move |s| sink.borrow_mut().push(*s));

        assert!(session.write_position(3));
        session.set_scrubbing(true);
        assert!(!session.write_position(4));
        session.set_scrubbing(false);
        assert!(session.write_position(9));

        assert_eq!(*seen.borrow(), vec![3, 9]);
    }

    #[test]
    fn mute_round_trip_restores_exact_volume() {
        for step in 0..=20 {
            let v = step as f64 / 20.0;
            let mut mute = MuteState::default();
            mute.mute(v);
            assert!(mute.is_muted());
            assert_eq!(mute.unmute(), v);
            assert!(!mute.is_muted());
        }
    }

    #[test]
    fn positive_volume_change_lifts_mute() {
        let mut mute = MuteState::default();
        mute.mute(0.7);
        mute.note_volume_change(0.0);
        assert!(mute.is_muted());
        mute.note_volume_change(0.2);
        assert!(!mute.is_muted());
    }

    #[test]
    fn unknown_duration_is_flagged() {
        let mut session = PlaybackSession::new(true);
        session.duration_seconds.set(-1);
        assert!(!session.has_known_duration());
        session.duration_seconds.set(0);
        assert!(session.has_known_duration());
    }
}
