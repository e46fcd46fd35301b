//! Gaffer Core - Playback Adapter Library
//!
//! This crate bridges a host video-player framework to a wrapped
//! adaptive-streaming engine:
//! - Lazy engine lifecycle (create on first play, tear down on stop/destroy)
//! - Track-selection bridging and quality-level derivation
//! - Engine-event translation into host signals
//! - Periodic stats polling and republication
//!
//! ABR heuristics, manifest parsing, segment buffering, and DRM all live in
//! the wrapped engine, behind the [`StreamingEngine`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   signals    ┌──────────────────┐   trait calls   ┌──────────┐
//! │    Host     │◄─────────────┤     Playback     ├────────────────►│  Engine  │
//! │  Framework  ├─────────────►│     Adapter      │◄────────────────┤ (wrapped)│
//! └─────────────┘  play/stop/  └──────────────────┘  engine events  └──────────┘
//!                  destroy/level
//! ```

pub mod adapter;
pub mod engine;
pub mod error;
pub mod events;
pub mod mock;
pub mod surface;
pub mod types;

pub use adapter::{PlaybackAdapter, ADAPTER_NAME};
pub use engine::{EngineEvent, EngineFactory, MediaTarget, StreamingEngine};
pub use error::{Error, Result};
pub use events::{EventBus, PlaybackEvent};
pub use surface::MediaSurface;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the adapter library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Gaffer Core initialized");
}
