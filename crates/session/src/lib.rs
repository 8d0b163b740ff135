pub mod face;
pub mod observable;
pub mod projection;
pub mod session;

pub use face::{AnimationType, FaceState, FaceWidget, SharedFace, Transport};
pub use observable::{Observable, SubscriptionId};
pub use session::{MuteState, PlaybackSession, ScrubFlag};
