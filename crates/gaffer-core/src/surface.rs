//! The host-side seam
//!
//! The base playback the adapter builds on: starting and halting the media
//! surface, and the host's own teardown. These are the calls the adapter
//! delegates to once the engine side of an operation has settled.

use crate::engine::MediaTarget;

/// Base playback operations provided by the host framework
pub trait MediaSurface: Send + Sync {
    /// The media element the engine binds to
    fn target(&self) -> MediaTarget;

    /// Start base playback (the engine is loaded and ready)
    fn start(&self);

    /// Halt base playback (after a successful unload)
    fn halt(&self);

    /// Host-side teardown; invoked exactly once per destroy
    fn teardown(&self);
}
