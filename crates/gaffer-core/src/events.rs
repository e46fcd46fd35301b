//! Host-facing playback signals
//!
//! The adapter translates engine-level events into the signals the host
//! framework recognizes and publishes them on a broadcast bus. Buffering is
//! always reported as two distinct signals (started / buffer full), never a
//! combined state.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{BitrateInfo, Level};

/// Default bus capacity; slow subscribers lag rather than block the adapter.
const DEFAULT_BUS_CAPACITY: usize = 64;

/// Signals emitted toward the host framework
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// The engine finished loading the source
    Ready,

    /// The engine entered a buffering state
    BufferingStart,

    /// The engine left the buffering state
    BufferFull,

    /// A load failure or runtime engine error
    Error { message: String, adapter: String },

    /// Quality levels derived from the video tracks, highest first
    LevelsAvailable { levels: Vec<Level> },

    /// A level switch is about to be applied
    LevelSwitchStart,

    /// The level switch has been applied
    LevelSwitchEnd,

    /// Whether the active video track is high definition (height >= 720)
    HighDefinitionUpdate { high_definition: bool },

    /// Active track description after an adaptation
    BitrateInfo { info: BitrateInfo },

    /// Periodic engine statistics, republished verbatim
    StatsAdd { stats: serde_json::Value },
}

impl PlaybackEvent {
    /// Signal name as the host sees it
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::Ready => "ready",
            PlaybackEvent::BufferingStart => "buffering_start",
            PlaybackEvent::BufferFull => "buffer_full",
            PlaybackEvent::Error { .. } => "error",
            PlaybackEvent::LevelsAvailable { .. } => "levels_available",
            PlaybackEvent::LevelSwitchStart => "level_switch_start",
            PlaybackEvent::LevelSwitchEnd => "level_switch_end",
            PlaybackEvent::HighDefinitionUpdate { .. } => "high_definition_update",
            PlaybackEvent::BitrateInfo { .. } => "bitrate_info",
            PlaybackEvent::StatsAdd { .. } => "stats_add",
        }
    }
}

/// Broadcast bus carrying playback signals to host subscribers.
///
/// `publish()` is a sync call, safe from both async tasks and sync methods.
/// If there are no subscribers, events are silently dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a signal to all subscribers
    pub fn publish(&self, event: PlaybackEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future signals; each subscriber gets an independent
    /// receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
