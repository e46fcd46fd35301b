//! Integration tests for the Gaffer playback adapter
//!
//! Everything runs against the mock engine/surface doubles; the adapter is
//! exercised through its public host-facing surface only.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use url::Url;

use gaffer_core::mock::{EngineCall, MockEngine, MockEngineFactory, MockSurface};
use gaffer_core::{
    AdapterOptions, EngineEvent, PlaybackAdapter, PlaybackEvent, PlaybackType, Track, ADAPTER_NAME,
    LEVEL_AUTO,
};

fn source() -> Url {
    Url::parse("https://cdn.example.com/movie.mpd").unwrap()
}

fn default_tracks() -> Vec<Track> {
    vec![
        Track::audio(10, 128_000, Some("en")),
        Track::video(1, 640, 360, 800_000),
        Track::video(2, 1280, 720, 2_400_000),
    ]
}

struct Fixture {
    adapter: Arc<PlaybackAdapter>,
    engine: Arc<MockEngine>,
    surface: Arc<MockSurface>,
    rx: broadcast::Receiver<PlaybackEvent>,
}

fn fixture() -> Fixture {
    fixture_with_options(AdapterOptions::new(source()))
}

fn fixture_with_options(options: AdapterOptions) -> Fixture {
    let engine = MockEngine::new();
    engine.set_variant_tracks(default_tracks());
    let factory = Arc::new(MockEngineFactory::with_engine(engine.clone()));
    let surface = MockSurface::new();
    let adapter = PlaybackAdapter::new(options, factory, surface.clone());
    let rx = adapter.subscribe();
    Fixture {
        adapter,
        engine,
        surface,
        rx,
    }
}

/// Let spawned adapter tasks (event pump, stats loop) run
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

fn count(events: &[PlaybackEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

// =============================================================================
// Play / setup
// =============================================================================

#[tokio::test]
async fn test_play_creates_engine_once_and_starts_on_ready() {
    let mut f = fixture();

    f.adapter.play().await.unwrap();
    settle().await;

    assert!(f.adapter.is_ready().await);
    assert_eq!(f.engine.call_count(&EngineCall::Load), 1);
    // Base playback started via the ready continuation, exactly once
    assert_eq!(f.surface.start_count(), 1);

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "ready"), 1);
    assert_eq!(count(&events, "levels_available"), 1);

    // Second play delegates straight to base playback
    f.adapter.play().await.unwrap();
    assert_eq!(f.surface.start_count(), 2);
    assert_eq!(f.engine.call_count(&EngineCall::Load), 1);
}

#[tokio::test]
async fn test_concurrent_first_plays_create_one_engine() {
    let engine = MockEngine::new();
    engine.set_variant_tracks(default_tracks());
    engine.hold_load();
    let factory = Arc::new(MockEngineFactory::with_engine(engine.clone()));
    let surface = MockSurface::new();
    let adapter = PlaybackAdapter::new(AdapterOptions::new(source()), factory.clone(), surface.clone());

    let first = tokio::spawn({
        let adapter = adapter.clone();
        async move { adapter.play().await }
    });
    let second = tokio::spawn({
        let adapter = adapter.clone();
        async move { adapter.play().await }
    });
    settle().await;

    engine.release_load();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    settle().await;

    assert_eq!(factory.created(), 1);
    assert_eq!(engine.call_count(&EngineCall::Load), 1);
    // The parked request is a one-shot continuation
    assert_eq!(surface.start_count(), 1);
    assert!(adapter.is_ready().await);
}

#[tokio::test]
async fn test_setup_applies_config_and_before_load_hook() {
    let hook_seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let seen = hook_seen.clone();
    let options = AdapterOptions::new(source())
        .with_engine_config(serde_json::json!({"abr": {"enabled": true}}))
        .with_before_load(Arc::new(
            move |_engine: &dyn gaffer_core::StreamingEngine| {
                seen.store(true, std::sync::atomic::Ordering::SeqCst);
            },
        ));
    let f = fixture_with_options(options);

    f.adapter.play().await.unwrap();

    assert_eq!(f.engine.call_count(&EngineCall::Configure), 1);
    assert!(hook_seen.load(std::sync::atomic::Ordering::SeqCst));
    // Configure precedes load
    let calls = f.engine.calls();
    assert_eq!(calls[0], EngineCall::Configure);
    assert_eq!(calls[1], EngineCall::Load);
}

#[tokio::test]
async fn test_load_failure_routes_through_error_signal() {
    let mut f = fixture();
    f.engine.fail_load();

    assert!(f.adapter.play().await.is_err());
    assert!(!f.adapter.is_ready().await);
    assert_eq!(f.surface.start_count(), 0);

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "ready"), 0);
    let error = events.iter().find(|e| e.name() == "error");
    match error {
        Some(PlaybackEvent::Error { adapter, .. }) => assert_eq!(adapter, ADAPTER_NAME),
        _ => panic!("expected an error signal"),
    }
}

// =============================================================================
// Level selection
// =============================================================================

#[tokio::test]
async fn test_level_auto_reenables_abr_with_bracketed_signals() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    f.adapter.set_current_level(LEVEL_AUTO).await;

    assert_eq!(f.adapter.current_level().await, LEVEL_AUTO);
    assert_eq!(f.engine.abr_enabled(), Some(true));
    assert!(f.engine.selected_track_ids().is_empty());

    let events = drain(&mut f.rx);
    assert_eq!(events[0].name(), "level_switch_start");
    assert_eq!(events[1].name(), "level_switch_end");
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_level_selection_forces_matching_track() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    f.adapter.set_current_level(2).await;

    assert_eq!(f.engine.abr_enabled(), Some(false));
    assert_eq!(f.engine.selected_track_ids(), vec![2]);

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "level_switch_start"), 1);
    assert_eq!(count(&events, "level_switch_end"), 1);
    assert_eq!(events.first().map(|e| e.name()), Some("level_switch_start"));
    assert_eq!(events.last().map(|e| e.name()), Some("level_switch_end"));
}

#[tokio::test]
async fn test_level_with_no_matching_track_changes_nothing_but_disables_abr() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    f.adapter.set_current_level(99).await;

    assert_eq!(f.engine.abr_enabled(), Some(false));
    assert!(f.engine.selected_track_ids().is_empty());

    let events = drain(&mut f.rx);
    assert_eq!(events[0].name(), "level_switch_start");
    assert_eq!(events[1].name(), "level_switch_end");
}

// =============================================================================
// Stop / destroy
// =============================================================================

#[tokio::test]
async fn test_stop_flushes_exactly_one_final_stats_emission() {
    let mut f = fixture();
    f.engine.set_stats(serde_json::json!({"width": 1280}));
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    f.adapter.stop().await;

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "stats_add"), 1);
    assert_eq!(f.engine.call_count(&EngineCall::Unload), 1);
    assert_eq!(f.surface.halt_count(), 1);
    assert!(!f.adapter.is_ready().await);
    assert_eq!(f.adapter.playback_type().await, None);
}

#[tokio::test]
async fn test_stop_unload_failure_is_swallowed() {
    let f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    f.engine.fail_unload();

    f.adapter.stop().await;

    // Best-effort: base stop is skipped and the instance is kept
    assert_eq!(f.surface.halt_count(), 0);
    assert!(f.adapter.playback_type().await.is_some());
}

#[tokio::test]
async fn test_failed_stop_keeps_engine_events_flowing() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    f.engine.fail_unload();

    f.adapter.stop().await;
    drain(&mut f.rx);

    // The surviving instance still translates engine events
    assert!(f.adapter.is_ready().await);
    f.engine.emit(EngineEvent::Buffering(true));
    settle().await;
    f.engine.emit(EngineEvent::Error("late failure".to_string()));
    settle().await;

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "buffering_start"), 1);
    assert_eq!(count(&events, "error"), 1);
}

#[tokio::test]
async fn test_destroy_with_engine_tears_down_exactly_once() {
    let f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;

    f.adapter.destroy().await;

    assert_eq!(f.engine.call_count(&EngineCall::Destroy), 1);
    assert_eq!(f.surface.teardown_count(), 1);
    assert!(!f.adapter.is_ready().await);
}

#[tokio::test]
async fn test_destroy_without_engine_tears_down_exactly_once() {
    let f = fixture();

    f.adapter.destroy().await;

    assert!(f.engine.calls().is_empty());
    assert_eq!(f.surface.teardown_count(), 1);
}

#[tokio::test]
async fn test_destroy_failure_still_tears_down_exactly_once() {
    let f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    f.engine.fail_destroy();

    f.adapter.destroy().await;

    assert_eq!(f.engine.call_count(&EngineCall::Destroy), 1);
    assert_eq!(f.surface.teardown_count(), 1);
}

#[tokio::test]
async fn test_destroy_during_pending_load_discards_late_ready() {
    let mut f = fixture();
    f.engine.hold_load();

    let adapter = f.adapter.clone();
    let pending = tokio::spawn(async move { adapter.play().await });
    settle().await;
    assert_eq!(f.engine.call_count(&EngineCall::Load), 1);

    f.adapter.destroy().await;
    f.engine.release_load();
    pending.await.unwrap().unwrap();
    settle().await;

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "ready"), 0);
    assert_eq!(count(&events, "stats_add"), 0);
    assert_eq!(f.surface.start_count(), 0);
    assert_eq!(f.surface.teardown_count(), 1);
    assert!(!f.adapter.is_ready().await);
}

// =============================================================================
// Levels / adaptation
// =============================================================================

#[tokio::test]
async fn test_levels_ordered_highest_first_and_computed_once_per_load() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;

    let levels = f.adapter.levels().await;
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0].label, "720p");
    assert_eq!(levels[0].id, 2);
    assert_eq!(levels[1].label, "360p");

    drain(&mut f.rx);

    // Two adaptations in succession recompute nothing
    f.engine.emit(EngineEvent::Adaptation);
    settle().await;
    f.engine.emit(EngineEvent::Adaptation);
    settle().await;

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "levels_available"), 0);
}

#[tokio::test]
async fn test_adaptation_flags_high_definition_at_720() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    let mut tracks = default_tracks();
    tracks[2].active = true; // 720p
    f.engine.set_variant_tracks(tracks);
    f.engine.emit(EngineEvent::Adaptation);
    settle().await;

    assert!(f.adapter.is_high_definition_in_use().await);
    let events = drain(&mut f.rx);
    match events.iter().find(|e| e.name() == "high_definition_update") {
        Some(PlaybackEvent::HighDefinitionUpdate { high_definition }) => {
            assert!(*high_definition)
        }
        _ => panic!("expected a high definition update"),
    }
    match events.iter().find(|e| e.name() == "bitrate_info") {
        Some(PlaybackEvent::BitrateInfo { info }) => {
            assert_eq!(info.level, 2);
            assert_eq!(info.height, 720);
            assert_eq!(info.width, 1280);
            assert_eq!(info.bandwidth, 2_400_000);
        }
        _ => panic!("expected bitrate info"),
    }
}

#[tokio::test]
async fn test_adaptation_below_720_is_not_high_definition() {
    let f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;

    let mut tracks = vec![
        Track::video(1, 1278, 719, 2_000_000),
        Track::video(2, 1280, 720, 2_400_000),
    ];
    tracks[0].active = true; // 719p
    f.engine.set_variant_tracks(tracks);
    f.engine.emit(EngineEvent::Adaptation);
    settle().await;

    assert!(!f.adapter.is_high_definition_in_use().await);
}

#[tokio::test]
async fn test_adaptation_without_active_video_track_emits_nothing() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    f.engine.emit(EngineEvent::Adaptation);
    settle().await;

    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "high_definition_update"), 0);
    assert_eq!(count(&events, "bitrate_info"), 0);
}

// =============================================================================
// Buffering / errors
// =============================================================================

#[tokio::test]
async fn test_buffering_translates_to_two_distinct_signals() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    f.engine.emit(EngineEvent::Buffering(true));
    settle().await;
    f.engine.emit(EngineEvent::Buffering(false));
    settle().await;

    let events = drain(&mut f.rx);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], PlaybackEvent::BufferingStart));
    assert!(matches!(events[1], PlaybackEvent::BufferFull));
}

#[tokio::test]
async fn test_runtime_engine_error_reaches_the_host() {
    let mut f = fixture();
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    f.engine.emit(EngineEvent::Error("segment fetch failed".to_string()));
    settle().await;

    let events = drain(&mut f.rx);
    match events.iter().find(|e| e.name() == "error") {
        Some(PlaybackEvent::Error { message, adapter }) => {
            assert!(message.contains("segment fetch failed"));
            assert_eq!(adapter, ADAPTER_NAME);
        }
        _ => panic!("expected an error signal"),
    }
}

// =============================================================================
// Accessors
// =============================================================================

#[tokio::test]
async fn test_track_accessors_filter_by_kind() {
    let f = fixture();
    f.engine.set_text_tracks(vec![Track::text(20, Some("en"))]);

    // Nothing meaningful before the engine exists
    assert!(f.adapter.video_tracks().await.is_empty());
    assert!(f.adapter.audio_tracks().await.is_empty());
    assert!(f.adapter.text_tracks().await.is_empty());

    f.adapter.play().await.unwrap();
    settle().await;

    let video = f.adapter.video_tracks().await;
    assert_eq!(video.len(), 2);
    assert!(video.iter().all(|t| t.mime_type.starts_with("video/")));
    assert_eq!(f.adapter.audio_tracks().await.len(), 1);
    assert_eq!(f.adapter.text_tracks().await.len(), 1);
}

#[tokio::test]
async fn test_playback_type_reports_live_vod_or_nothing() {
    let f = fixture();
    assert_eq!(f.adapter.playback_type().await, None);

    f.adapter.play().await.unwrap();
    settle().await;
    assert_eq!(f.adapter.playback_type().await, Some(PlaybackType::Vod));

    f.engine.set_live(true);
    assert_eq!(f.adapter.playback_type().await, Some(PlaybackType::Live));
}

// =============================================================================
// Stats loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stats_loop_emits_on_interval_and_never_after_teardown() {
    let mut f = fixture_with_options(
        AdapterOptions::new(source()).with_stats_interval(Duration::from_secs(30)),
    );
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;
    let events = drain(&mut f.rx);
    assert!(count(&events, "stats_add") >= 1);

    f.adapter.destroy().await;
    drain(&mut f.rx);

    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;
    let events = drain(&mut f.rx);
    assert_eq!(count(&events, "stats_add"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stats_interval_is_caller_overridable() {
    let mut f = fixture_with_options(
        AdapterOptions::new(source()).with_stats_interval(Duration::from_secs(5)),
    );
    f.adapter.play().await.unwrap();
    settle().await;
    drain(&mut f.rx);

    tokio::time::sleep(Duration::from_secs(16)).await;
    settle().await;
    let events = drain(&mut f.rx);
    assert!(count(&events, "stats_add") >= 3);
}

// =============================================================================
// Auto play
// =============================================================================

#[tokio::test]
async fn test_auto_play_starts_without_an_explicit_play_call() {
    let f = fixture_with_options(AdapterOptions::new(source()).with_auto_play(true));
    settle().await;

    assert!(f.adapter.is_ready().await);
    assert_eq!(f.surface.start_count(), 1);
}
