use serde::{Deserialize, Serialize};

/// Where a local source's bytes come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Stream,
}

/// Lifecycle of a local engine instance.
///
/// `Idle -> Opening -> (Connecting | Ready) -> Playing <-> Paused -> Stopped -> Idle`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Opening,
    Connecting,
    Ready,
    Playing,
    Paused,
    Stopped,
}
