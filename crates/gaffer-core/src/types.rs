//! Core types for the Gaffer playback adapter

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::engine::StreamingEngine;

/// Sentinel level id meaning "automatic": quality selection is left to the
/// engine's adaptive bitrate logic and no explicit track is forced.
pub const LEVEL_AUTO: i32 = -1;

/// Default period between stats emissions (30 seconds).
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Unique identifier for an adapter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdapterId(pub Uuid);

impl AdapterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AdapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AdapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media track kinds, derived from the engine's MIME type prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
    Text,
}

impl TrackKind {
    /// Classify an engine MIME type (`video/mp4`, `audio/mp4`, `text/vtt`)
    pub fn from_mime_type(mime_type: &str) -> Option<TrackKind> {
        if mime_type.starts_with("audio/") {
            Some(TrackKind::Audio)
        } else if mime_type.starts_with("video/") {
            Some(TrackKind::Video)
        } else if mime_type.starts_with("text/") {
            Some(TrackKind::Text)
        } else {
            None
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
            TrackKind::Text => write!(f, "text"),
        }
    }
}

/// Engine-owned track descriptor
///
/// The engine manages the track lifecycle; the adapter only reads these and
/// hands them back to `select_track`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Engine-assigned track id
    pub id: i32,
    /// Track kind (audio, video, text)
    pub kind: TrackKind,
    /// MIME type as reported by the engine
    pub mime_type: String,
    /// Whether this track is currently active
    pub active: bool,
    /// Vertical resolution in pixels (0 for non-video tracks)
    pub height: u32,
    /// Horizontal resolution in pixels (0 for non-video tracks)
    pub width: u32,
    /// Bandwidth in bits per second
    pub bandwidth: u64,
    /// Language code, if the engine reports one
    pub language: Option<String>,
}

impl Track {
    /// Build a video track descriptor
    pub fn video(id: i32, width: u32, height: u32, bandwidth: u64) -> Self {
        Self {
            id,
            kind: TrackKind::Video,
            mime_type: "video/mp4".to_string(),
            active: false,
            height,
            width,
            bandwidth,
            language: None,
        }
    }

    /// Build an audio track descriptor
    pub fn audio(id: i32, bandwidth: u64, language: Option<&str>) -> Self {
        Self {
            id,
            kind: TrackKind::Audio,
            mime_type: "audio/mp4".to_string(),
            active: false,
            height: 0,
            width: 0,
            bandwidth,
            language: language.map(str::to_string),
        }
    }

    /// Build a text track descriptor
    pub fn text(id: i32, language: Option<&str>) -> Self {
        Self {
            id,
            kind: TrackKind::Text,
            mime_type: "text/vtt".to_string(),
            active: false,
            height: 0,
            width: 0,
            bandwidth: 0,
            language: language.map(str::to_string),
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// A selectable quality tier derived from a video track's resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Track id this level maps back to
    pub id: i32,
    /// Human-readable label, `"<height>p"`
    pub label: String,
}

impl Level {
    pub fn from_video_track(track: &Track) -> Self {
        Self {
            id: track.id,
            label: format!("{}p", track.height),
        }
    }
}

/// Description of the active video track after an adaptation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitrateInfo {
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    pub level: i32,
}

/// Playback type reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackType {
    Vod,
    Live,
}

impl std::fmt::Display for PlaybackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackType::Vod => write!(f, "vod"),
            PlaybackType::Live => write!(f, "live"),
        }
    }
}

/// Hook invoked on the freshly created engine right before load is issued
pub type BeforeLoadHook = Arc<dyn Fn(&dyn StreamingEngine) + Send + Sync>;

/// Caller-supplied adapter configuration
#[derive(Clone)]
pub struct AdapterOptions {
    /// Source to load (manifest locator)
    pub source: Url,
    /// Start playback as soon as the adapter is constructed
    pub auto_play: bool,
    /// Opaque configuration forwarded to the engine's `configure`
    pub engine_config: Option<serde_json::Value>,
    /// Pre-load hook, run after configuration and before load
    pub on_before_load: Option<BeforeLoadHook>,
    /// Period between stats emissions
    pub stats_interval: Duration,
}

impl AdapterOptions {
    pub fn new(source: Url) -> Self {
        Self {
            source,
            auto_play: false,
            engine_config: None,
            on_before_load: None,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }

    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    pub fn with_engine_config(mut self, config: serde_json::Value) -> Self {
        self.engine_config = Some(config);
        self
    }

    pub fn with_before_load(mut self, hook: BeforeLoadHook) -> Self {
        self.on_before_load = Some(hook);
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}

impl std::fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("source", &self.source.as_str())
            .field("auto_play", &self.auto_play)
            .field("engine_config", &self.engine_config)
            .field(
                "on_before_load",
                &self.on_before_load.as_ref().map(|_| "<hook>"),
            )
            .field("stats_interval", &self.stats_interval)
            .finish()
    }
}
