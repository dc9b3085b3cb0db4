//! Tests for StreamRegistry

mod common;

use binwatch_eye::camera::SourceLocator;
use binwatch_eye::error::EyeError;
use binwatch_eye::registry::StreamRegistry;
use common::*;
use std::sync::Arc;
use std::time::Duration;

fn registry() -> (Arc<SceneOpener>, StreamRegistry) {
    let opener = Arc::new(SceneOpener::default());
    let ctx = context(
        opener.clone(),
        Arc::new(MarkerDetector::default()),
        Arc::new(RecordingAlerter::new(true)),
        fast_config(),
    );
    (opener, StreamRegistry::new(ctx))
}

#[test]
fn test_register_rejects_missing_fields() {
    let (opener, registry) = registry();

    for (source, area) in [("", "Lobby"), ("0", ""), ("   ", "Lobby"), ("0", "  ")] {
        match registry.register(source, area) {
            Err(EyeError::Registration(msg)) => {
                assert_eq!(msg, "Please provide both URL and area name!")
            }
            other => panic!("Expected registration error, got {:?}", other.map(|w| w.area().to_string())),
        }
    }

    assert!(registry.is_empty());
    assert!(opener.opened.lock().is_empty());
}

#[test]
fn test_register_starts_worker() {
    let (opener, registry) = registry();
    let worker = registry.register("rtsp://cam-1/live", "Lobby").unwrap();

    assert_eq!(worker.area(), "Lobby");
    assert_eq!(worker.locator(), &SourceLocator::Uri("rtsp://cam-1/live".to_string()));
    assert!(worker.is_running());
    assert!(wait_until(Duration::from_secs(5), || worker.get_frame().is_some()));
    assert_eq!(opener.opened.lock().len(), 1);

    registry.shutdown();
}

#[test]
fn test_device_index_source() {
    let (opener, registry) = registry();
    registry.register("0", "Webcam").unwrap();
    assert_eq!(opener.opened.lock()[0], SourceLocator::Device(0));
    registry.shutdown();
}

#[test]
fn test_duplicate_area_replaces_worker() {
    let (opener, registry) = registry();
    let first = registry.register("rtsp://cam-1/live", "Lobby").unwrap();
    let second = registry.register("rtsp://cam-2/live", "Lobby").unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get("Lobby").unwrap().locator(),
        &SourceLocator::Uri("rtsp://cam-2/live".to_string())
    );

    // the replaced worker was stopped and its capture released
    assert!(!first.is_running());
    assert!(second.is_running());
    assert_eq!(opener.released_count(), 1);

    registry.shutdown();
}

#[test]
fn test_unopenable_source_still_registers() {
    let (_opener, registry) = registry();
    let worker = registry.register("broken://cam", "Dock").unwrap();

    std::thread::sleep(Duration::from_millis(50));
    assert!(worker.is_running());
    assert!(worker.get_frame().is_none());
    assert!(worker.stats().read_failures > 0);
    assert_eq!(worker.stats().frames_read, 0);

    registry.shutdown();
}

#[test]
fn test_areas_are_sorted_and_removable() {
    let (opener, registry) = registry();
    registry.register("1", "Yard").unwrap();
    registry.register("2", "Atrium").unwrap();
    registry.register("3", "Kitchen").unwrap();

    assert_eq!(registry.areas(), vec!["Atrium", "Kitchen", "Yard"]);

    assert!(registry.remove("Kitchen"));
    assert!(!registry.remove("Kitchen"));
    assert_eq!(registry.areas(), vec!["Atrium", "Yard"]);
    assert_eq!(opener.released_count(), 1);

    registry.shutdown();
    assert!(registry.is_empty());
    assert_eq!(opener.released_count(), 3);
}

#[test]
fn test_register_trims_input() {
    let (_opener, registry) = registry();
    registry.register("  rtsp://cam/live ", " Lobby ").unwrap();
    assert_eq!(registry.areas(), vec!["Lobby"]);
    registry.shutdown();
}
