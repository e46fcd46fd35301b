//! Playback Adapter - bridges the host framework to the wrapped engine
//!
//! Coordinates:
//! - Lazy engine creation on the first play call
//! - Forwarding play/stop/destroy/track-selection to engine calls
//! - Translating engine events into host signals
//! - Periodic stats polling and republication
//! - Deriving the quality-level list from the engine's video tracks
//!
//! The engine instance and the stats timer are owned exclusively by the
//! adapter. Teardown bumps a generation counter that fences the stats loop,
//! the engine-event pump, and any load still in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{EngineEvent, EngineFactory, StreamingEngine};
use crate::error::{Error, Result};
use crate::events::{EventBus, PlaybackEvent};
use crate::surface::MediaSurface;
use crate::types::{
    AdapterId, AdapterOptions, BitrateInfo, Level, PlaybackType, Track, TrackKind, LEVEL_AUTO,
};

/// Name the adapter reports on error signals
pub const ADAPTER_NAME: &str = "gaffer_playback";

/// Manifest extensions the adapter claims, query string stripped
const MANIFEST_EXTENSIONS: &[&str] = &["mpd", "m3u8"];

/// MIME type fragment naming DASH content
const DASH_MIME_TYPE: &str = "application/dash+xml";

/// Playback adapter wrapping one engine instance
pub struct PlaybackAdapter {
    /// Unique adapter id
    id: AdapterId,
    /// Caller-supplied configuration
    options: AdapterOptions,
    /// Engine constructor and runtime-support check
    factory: Arc<dyn EngineFactory>,
    /// Base playback provided by the host
    surface: Arc<dyn MediaSurface>,
    /// Host signal bus
    bus: EventBus,
    /// Engine instance; created on first play, cleared on stop/destroy
    engine: RwLock<Option<Arc<dyn StreamingEngine>>>,
    /// Set only after an asynchronous load completes successfully
    ready: RwLock<bool>,
    /// Requested level id; LEVEL_AUTO leaves selection to the engine's ABR
    current_level: RwLock<i32>,
    /// Level list, built once per load
    levels: RwLock<Vec<Level>>,
    /// Whether the active video track is high definition
    high_definition: RwLock<bool>,
    /// One-shot continuation: start base playback on the next ready transition
    play_when_ready: RwLock<bool>,
    /// Stats polling task
    stats_task: Mutex<Option<JoinHandle<()>>>,
    /// Engine-event pump task
    pump_task: Mutex<Option<JoinHandle<()>>>,
    /// True while a setup is in flight; later play calls park instead of
    /// creating a second engine
    setup_pending: AtomicBool,
    /// Bumped on every stop/destroy; stale work compares and bails
    generation: AtomicU64,
    /// Self-reference handed to background tasks; they upgrade before
    /// touching the adapter
    weak: Weak<Self>,
}

impl PlaybackAdapter {
    /// Capability check: can this adapter handle the given resource?
    ///
    /// True only when the runtime supports the engine and either the
    /// resource's extension names a streaming manifest or the MIME type
    /// names DASH content.
    pub fn can_play(factory: &dyn EngineFactory, resource: &str, mime_type: Option<&str>) -> bool {
        if !factory.is_runtime_supported() {
            return false;
        }

        let path = resource.split('?').next().unwrap_or(resource);
        let by_extension = path
            .rsplit_once('.')
            .map(|(_, ext)| MANIFEST_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let by_mime_type = mime_type.is_some_and(|m| m.contains(DASH_MIME_TYPE));

        by_extension || by_mime_type
    }

    /// Create a new adapter.
    ///
    /// The engine is not constructed here; that happens lazily on the first
    /// play call. With `auto_play` set, play is issued immediately.
    pub fn new(
        options: AdapterOptions,
        factory: Arc<dyn EngineFactory>,
        surface: Arc<dyn MediaSurface>,
    ) -> Arc<Self> {
        let adapter = Arc::new_cyclic(|weak| Self {
            id: AdapterId::new(),
            options,
            factory,
            surface,
            bus: EventBus::default(),
            engine: RwLock::new(None),
            ready: RwLock::new(false),
            current_level: RwLock::new(LEVEL_AUTO),
            levels: RwLock::new(Vec::new()),
            high_definition: RwLock::new(false),
            play_when_ready: RwLock::new(false),
            stats_task: Mutex::new(None),
            pump_task: Mutex::new(None),
            setup_pending: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            weak: weak.clone(),
        });

        if adapter.options.auto_play {
            let auto = Arc::clone(&adapter);
            tokio::spawn(async move {
                if let Err(e) = auto.play().await {
                    debug!(adapter_id = %auto.id, error = %e, "auto play failed");
                }
            });
        }

        adapter
    }

    /// Adapter id
    pub fn id(&self) -> AdapterId {
        self.id
    }

    /// Adapter name, as reported on error signals
    pub fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    /// Subscribe to host signals
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.bus.subscribe()
    }

    /// Whether the engine has finished loading the source
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Whether the active video track is high definition
    pub async fn is_high_definition_in_use(&self) -> bool {
        *self.high_definition.read().await
    }

    /// Quality levels, highest resolution first; empty before the first load
    pub async fn levels(&self) -> Vec<Level> {
        self.levels.read().await.clone()
    }

    /// Requested level id, LEVEL_AUTO when the engine's ABR is in control
    pub async fn current_level(&self) -> i32 {
        *self.current_level.read().await
    }

    /// Live or VOD per the engine; None without an engine instance
    pub async fn playback_type(&self) -> Option<PlaybackType> {
        let engine = self.engine.read().await.clone()?;
        Some(if engine.is_live() {
            PlaybackType::Live
        } else {
            PlaybackType::Vod
        })
    }

    /// Audio tracks of the current source; empty before the engine is ready
    pub async fn audio_tracks(&self) -> Vec<Track> {
        self.variant_tracks_of_kind(TrackKind::Audio).await
    }

    /// Video tracks of the current source; empty before the engine is ready
    pub async fn video_tracks(&self) -> Vec<Track> {
        self.variant_tracks_of_kind(TrackKind::Video).await
    }

    /// Text tracks of the current source; empty before the engine is ready
    pub async fn text_tracks(&self) -> Vec<Track> {
        match self.engine.read().await.clone() {
            Some(engine) => engine.text_tracks(),
            None => Vec::new(),
        }
    }

    async fn variant_tracks_of_kind(&self, kind: TrackKind) -> Vec<Track> {
        match self.engine.read().await.clone() {
            Some(engine) => engine
                .variant_tracks()
                .into_iter()
                .filter(|t| t.kind == kind)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Start playback.
    ///
    /// Idempotent at the adapter boundary: with no engine instance, setup is
    /// triggered and the play request is parked as a one-shot continuation
    /// that fires on the ready transition. Already ready, base playback
    /// starts directly.
    #[instrument(skip(self), fields(adapter_id = %self.id))]
    pub async fn play(&self) -> Result<()> {
        if self.engine.read().await.is_none() {
            *self.play_when_ready.write().await = true;
            if self.setup_pending.swap(true, Ordering::SeqCst) {
                // A setup is already in flight; the parked request fires on
                // its ready transition
                return Ok(());
            }
            let result = self.setup().await;
            self.setup_pending.store(false, Ordering::SeqCst);
            return result;
        }

        if !self.is_ready().await {
            *self.play_when_ready.write().await = true;
            return Ok(());
        }

        self.surface.start();
        Ok(())
    }

    /// Stop playback and unload the engine.
    ///
    /// Best-effort: the stats timer is cancelled and flushed one final time
    /// before unload is even issued; an unload failure is logged, never
    /// rethrown past this boundary.
    #[instrument(skip(self), fields(adapter_id = %self.id))]
    pub async fn stop(&self) {
        self.cancel_stats_loop().await;
        self.send_stats().await;

        let engine = self.engine.read().await.clone();
        let Some(engine) = engine else {
            self.surface.halt();
            *self.ready.write().await = false;
            return;
        };

        match engine.unload().await {
            Ok(()) => {
                // Fence the pump and any pending load only once the unload
                // has actually succeeded; a failed stop keeps the instance
                // and its event translation alive
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.cancel_event_pump().await;
                self.surface.halt();
                *self.engine.write().await = None;
                *self.ready.write().await = false;
                info!("engine unloaded");
            }
            Err(e) => {
                warn!(error = %e, error_code = e.error_code(), "engine could not be unloaded");
            }
        }
    }

    /// Destroy the adapter.
    ///
    /// The engine's asynchronous destroy is attempted when an instance
    /// exists; base teardown runs exactly once regardless of the outcome.
    #[instrument(skip(self), fields(adapter_id = %self.id))]
    pub async fn destroy(&self) {
        self.cancel_stats_loop().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_event_pump().await;

        let engine = self.engine.write().await.take();
        if let Some(engine) = engine {
            if let Err(e) = engine.destroy().await {
                error!(error = %e, error_code = e.error_code(), "engine could not be destroyed");
            }
        }

        *self.ready.write().await = false;
        *self.play_when_ready.write().await = false;
        self.surface.teardown();
        debug!("adapter destroyed");
    }

    /// Request a quality level.
    ///
    /// LEVEL_AUTO re-enables the engine's adaptive selection and forces no
    /// track. Any other id disables ABR and forces the first video track
    /// with a matching id; with no match no track is changed, but ABR stays
    /// disabled. Switch-start and switch-end signals bracket the switch
    /// synchronously.
    #[instrument(skip(self), fields(adapter_id = %self.id))]
    pub async fn set_current_level(&self, id: i32) {
        *self.current_level.write().await = id;
        let auto = id == LEVEL_AUTO;

        let engine = self.engine.read().await.clone();
        let Some(engine) = engine else {
            debug!(level = id, "level requested without an engine instance");
            return;
        };

        self.bus.publish(PlaybackEvent::LevelSwitchStart);
        engine.set_abr_enabled(auto);
        if !auto {
            let track = self
                .video_tracks()
                .await
                .into_iter()
                .find(|t| t.id == id);
            match track {
                Some(track) => self.select_track(&track).await,
                None => warn!(level = id, "no video track matches the requested level"),
            }
        }
        self.bus.publish(PlaybackEvent::LevelSwitchEnd);
    }

    /// Force a track and rerun the adaptation handler
    pub async fn select_track(&self, track: &Track) {
        let engine = self.engine.read().await.clone();
        let Some(engine) = engine else {
            return;
        };
        engine.select_track(track);
        self.on_adaptation().await;
    }

    /// Create, configure, and load the engine.
    ///
    /// A load failure is surfaced through the same error signal as runtime
    /// engine errors. A teardown issued while the load is pending wins: the
    /// late completion is discarded instead of resurrecting the adapter.
    async fn setup(&self) -> Result<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        *self.ready.write().await = false;

        let engine = self.factory.create(&self.surface.target());
        if let Some(config) = &self.options.engine_config {
            engine.configure(config.clone());
        }
        if let Some(hook) = &self.options.on_before_load {
            hook(engine.as_ref());
        }

        self.spawn_event_pump(engine.events(), generation).await;
        *self.engine.write().await = Some(Arc::clone(&engine));

        match engine.load(&self.options.source).await {
            Ok(()) => {
                if self.generation.load(Ordering::SeqCst) != generation {
                    debug!("load settled after teardown, discarding");
                    return Ok(());
                }
                self.on_loaded().await;
                Ok(())
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    /// Ready transition: signal, run the parked play request, arm the stats
    /// loop, compute the initial level list
    async fn on_loaded(&self) {
        *self.ready.write().await = true;
        self.bus.publish(PlaybackEvent::Ready);
        info!(source = %self.options.source, "engine loaded");

        let deferred = {
            let mut flag = self.play_when_ready.write().await;
            std::mem::take(&mut *flag)
        };
        if deferred {
            self.surface.start();
        }

        self.arm_stats_loop().await;
        self.fill_levels().await;
    }

    /// Build the level list from the current video tracks, highest
    /// resolution first. No-op once populated; the list is not refreshed
    /// across mid-session track-set changes.
    async fn fill_levels(&self) {
        if !self.levels.read().await.is_empty() {
            return;
        }

        let mut levels: Vec<Level> = self
            .video_tracks()
            .await
            .iter()
            .map(Level::from_video_track)
            .collect();
        levels.reverse();

        if levels.is_empty() {
            return;
        }

        *self.levels.write().await = levels.clone();
        self.bus.publish(PlaybackEvent::LevelsAvailable { levels });
    }

    /// Adaptation handler: refresh levels (no-op after the first
    /// population), flag high definition, describe the new active track
    async fn on_adaptation(&self) {
        self.fill_levels().await;

        let active = self
            .video_tracks()
            .await
            .into_iter()
            .find(|t| t.active);
        let Some(track) = active else {
            debug!("adaptation without an active video track");
            return;
        };

        debug!(track_id = track.id, height = track.height, "adaptation");
        let high_definition = track.height >= 720;
        *self.high_definition.write().await = high_definition;
        self.bus
            .publish(PlaybackEvent::HighDefinitionUpdate { high_definition });
        self.bus.publish(PlaybackEvent::BitrateInfo {
            info: BitrateInfo {
                bandwidth: track.bandwidth,
                width: track.width,
                height: track.height,
                level: track.id,
            },
        });
    }

    fn handle_error(&self, error: &Error) {
        error!(error = %error, error_code = error.error_code(), "engine error");
        self.bus.publish(PlaybackEvent::Error {
            message: error.to_string(),
            adapter: ADAPTER_NAME.to_string(),
        });
    }

    async fn on_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Error(message) => self.handle_error(&Error::Engine(message)),
            EngineEvent::Adaptation => self.on_adaptation().await,
            EngineEvent::Buffering(true) => self.bus.publish(PlaybackEvent::BufferingStart),
            EngineEvent::Buffering(false) => self.bus.publish(PlaybackEvent::BufferFull),
        }
    }

    /// Forward engine events until the channel closes or the adapter is
    /// torn down
    async fn spawn_event_pump(
        &self,
        mut events: broadcast::Receiver<EngineEvent>,
        generation: u64,
    ) {
        self.cancel_event_pump().await;

        let weak = self.weak.clone();
        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "engine event pump lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(adapter) = weak.upgrade() else {
                    break;
                };
                if adapter.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                adapter.on_engine_event(event).await;
            }
        });
        *self.pump_task.lock().await = Some(handle);
    }

    async fn cancel_event_pump(&self) {
        if let Some(handle) = self.pump_task.lock().await.take() {
            handle.abort();
        }
    }

    /// Arm the periodic stats emission; re-armed on every successful setup
    async fn arm_stats_loop(&self) {
        self.cancel_stats_loop().await;

        let weak = self.weak.clone();
        let generation = self.generation.load(Ordering::SeqCst);
        let period = self.options.stats_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of an interval resolves immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Liveness fence: never emit for a torn-down engine
                let Some(adapter) = weak.upgrade() else {
                    break;
                };
                if adapter.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                adapter.send_stats().await;
            }
        });
        *self.stats_task.lock().await = Some(handle);
    }

    async fn cancel_stats_loop(&self) {
        if let Some(handle) = self.stats_task.lock().await.take() {
            handle.abort();
        }
    }

    /// Poll the engine and republish its statistics as one signal payload
    async fn send_stats(&self) {
        let engine = self.engine.read().await.clone();
        if let Some(engine) = engine {
            self.bus.publish(PlaybackEvent::StatsAdd {
                stats: engine.stats(),
            });
        }
    }
}
