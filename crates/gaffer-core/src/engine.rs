//! The engine seam
//!
//! The wrapped adaptive-streaming engine is reached only through the narrow
//! [`StreamingEngine`] trait: exactly the calls the adapter makes, nothing
//! more. This keeps ABR, manifest parsing, segment buffering, and DRM on the
//! far side of the boundary and lets tests substitute a double.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

use crate::error::Result;
use crate::types::Track;

/// Events raised by the engine that the adapter translates into host signals
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A runtime playback error; carries the engine's message
    Error(String),
    /// The engine switched the active variant
    Adaptation,
    /// Buffering state change: true = buffering, false = buffer full
    Buffering(bool),
}

/// Target media surface the engine binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    /// Host-assigned identifier of the media element
    pub element_id: String,
}

impl MediaTarget {
    pub fn new(element_id: impl Into<String>) -> Self {
        Self {
            element_id: element_id.into(),
        }
    }
}

/// The engine operations the adapter depends on.
///
/// Load, unload, and destroy represent asynchronous engine work; the rest
/// are synchronous reads or fire-and-forget calls. Implementations own all
/// track handles; the adapter reads them and passes references back.
#[async_trait]
pub trait StreamingEngine: Send + Sync {
    /// Apply opaque caller-supplied configuration
    fn configure(&self, config: serde_json::Value);

    /// Load the source; the adapter signals ready only after this resolves
    async fn load(&self, source: &Url) -> Result<()>;

    /// Unload the current source
    async fn unload(&self) -> Result<()>;

    /// Tear the engine down
    async fn destroy(&self) -> Result<()>;

    /// Current engine statistics as an opaque object
    fn stats(&self) -> serde_json::Value;

    /// Text tracks of the current source
    fn text_tracks(&self) -> Vec<Track>;

    /// Unified audio/video variant track list of the current source
    fn variant_tracks(&self) -> Vec<Track>;

    /// Force the given track
    fn select_track(&self, track: &Track);

    /// Enable or disable adaptive bitrate selection
    fn set_abr_enabled(&self, enabled: bool);

    /// Whether the current source is a live stream
    fn is_live(&self) -> bool;

    /// Subscribe to engine events
    fn events(&self) -> broadcast::Receiver<EngineEvent>;
}

/// Creates engine instances and answers the runtime-support check.
///
/// The adapter invokes `create` lazily, on the first play call.
pub trait EngineFactory: Send + Sync {
    /// Whether the underlying runtime can host the engine at all
    fn is_runtime_supported(&self) -> bool;

    /// Construct an engine bound to the given media target
    fn create(&self, target: &MediaTarget) -> Arc<dyn StreamingEngine>;
}
