//! Test doubles for the collaborator seams
//!
//! [`MockEngine`], [`MockEngineFactory`], and [`MockSurface`] stand in for
//! the wrapped streaming engine and the host's base playback. The engine
//! double records every call, can be scripted to fail any asynchronous
//! operation, and can hold a load open so teardown-during-load sequencing is
//! testable.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};
use url::Url;

use crate::engine::{EngineEvent, EngineFactory, MediaTarget, StreamingEngine};
use crate::error::{Error, Result};
use crate::surface::MediaSurface;
use crate::types::Track;

/// One recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Configure,
    Load,
    Unload,
    Destroy,
    SelectTrack(i32),
    SetAbrEnabled(bool),
}

/// Scriptable engine double
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    variant_tracks: Mutex<Vec<Track>>,
    text_tracks: Mutex<Vec<Track>>,
    stats: Mutex<serde_json::Value>,
    live: AtomicBool,
    fail_load: AtomicBool,
    fail_unload: AtomicBool,
    fail_destroy: AtomicBool,
    hold_load: AtomicBool,
    load_gate: Notify,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            variant_tracks: Mutex::new(Vec::new()),
            text_tracks: Mutex::new(Vec::new()),
            stats: Mutex::new(serde_json::json!({})),
            live: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
            fail_unload: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            hold_load: AtomicBool::new(false),
            load_gate: Notify::new(),
            events_tx,
        })
    }

    pub fn set_variant_tracks(&self, tracks: Vec<Track>) {
        *self.variant_tracks.lock().unwrap() = tracks;
    }

    pub fn set_text_tracks(&self, tracks: Vec<Track>) {
        *self.text_tracks.lock().unwrap() = tracks;
    }

    pub fn set_stats(&self, stats: serde_json::Value) {
        *self.stats.lock().unwrap() = stats;
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    pub fn fail_load(&self) {
        self.fail_load.store(true, Ordering::SeqCst);
    }

    pub fn fail_unload(&self) {
        self.fail_unload.store(true, Ordering::SeqCst);
    }

    pub fn fail_destroy(&self) {
        self.fail_destroy.store(true, Ordering::SeqCst);
    }

    /// Make the next load block until [`release_load`](Self::release_load)
    pub fn hold_load(&self) {
        self.hold_load.store(true, Ordering::SeqCst);
    }

    pub fn release_load(&self) {
        self.load_gate.notify_one();
    }

    /// Raise an engine event toward the adapter
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    /// All calls recorded so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, call: &EngineCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    /// Ids passed to select_track, in order
    pub fn selected_track_ids(&self) -> Vec<i32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                EngineCall::SelectTrack(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Last value passed to set_abr_enabled
    pub fn abr_enabled(&self) -> Option<bool> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                EngineCall::SetAbrEnabled(enabled) => Some(*enabled),
                _ => None,
            })
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StreamingEngine for MockEngine {
    fn configure(&self, _config: serde_json::Value) {
        self.record(EngineCall::Configure);
    }

    async fn load(&self, _source: &Url) -> Result<()> {
        self.record(EngineCall::Load);
        if self.hold_load.load(Ordering::SeqCst) {
            self.load_gate.notified().await;
        }
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Error::Load("mock load failure".to_string()));
        }
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        self.record(EngineCall::Unload);
        if self.fail_unload.load(Ordering::SeqCst) {
            return Err(Error::Unload("mock unload failure".to_string()));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.record(EngineCall::Destroy);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(Error::Destroy("mock destroy failure".to_string()));
        }
        Ok(())
    }

    fn stats(&self) -> serde_json::Value {
        self.stats.lock().unwrap().clone()
    }

    fn text_tracks(&self) -> Vec<Track> {
        self.text_tracks.lock().unwrap().clone()
    }

    fn variant_tracks(&self) -> Vec<Track> {
        self.variant_tracks.lock().unwrap().clone()
    }

    fn select_track(&self, track: &Track) {
        self.record(EngineCall::SelectTrack(track.id));
        let mut tracks = self.variant_tracks.lock().unwrap();
        for t in tracks.iter_mut() {
            if t.kind == track.kind {
                t.active = t.id == track.id;
            }
        }
    }

    fn set_abr_enabled(&self, enabled: bool) {
        self.record(EngineCall::SetAbrEnabled(enabled));
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }
}

/// Factory double handing out one preset engine
pub struct MockEngineFactory {
    supported: bool,
    engine: Arc<MockEngine>,
    created: AtomicUsize,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::with_engine(MockEngine::new())
    }

    pub fn with_engine(engine: Arc<MockEngine>) -> Self {
        Self {
            supported: true,
            engine,
            created: AtomicUsize::new(0),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            engine: MockEngine::new(),
            created: AtomicUsize::new(0),
        }
    }

    /// The engine this factory hands out
    pub fn engine(&self) -> Arc<MockEngine> {
        Arc::clone(&self.engine)
    }

    /// How many engine instances have been created
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Default for MockEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for MockEngineFactory {
    fn is_runtime_supported(&self) -> bool {
        self.supported
    }

    fn create(&self, _target: &MediaTarget) -> Arc<dyn StreamingEngine> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.engine.clone()
    }
}

/// Base-playback double counting lifecycle delegations
pub struct MockSurface {
    starts: AtomicUsize,
    halts: AtomicUsize,
    teardowns: AtomicUsize,
}

impl MockSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            starts: AtomicUsize::new(0),
            halts: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
        })
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn halt_count(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }

    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

impl MediaSurface for MockSurface {
    fn target(&self) -> MediaTarget {
        MediaTarget::new("mock-video")
    }

    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }

    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}
