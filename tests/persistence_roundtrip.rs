use std::sync::Arc;

use adaptive_light::callbacks::RecordingCallbacks;
use adaptive_light::clock::{LogicalClock, SimulatedClock};
use adaptive_light::error::StoreError;
use adaptive_light::persistence::{self, FileStore, KeyValueStore};
use adaptive_light::service::{CharacteristicDescriptor, ServiceDescriptor};
use adaptive_light::transition::definition::StartRequest;
use adaptive_light::transition::{
    SupportedTransition, TRANSITION_TYPE_LINEAR, TRANSITION_TYPE_LINEAR_DERIVED,
};
use adaptive_light::{AdaptiveLight, EngineSettings};
use tempfile::tempdir;

const BRIGHTNESS: u64 = 0x12;
const COLOR_TEMP: u64 = 0x13;

fn settings() -> EngineSettings {
    EngineSettings::new(
        ServiceDescriptor::new(
            0x10,
            vec![
                CharacteristicDescriptor::new(BRIGHTNESS, 0, 100),
                CharacteristicDescriptor::new(COLOR_TEMP, 140, 500),
            ],
        ),
        vec![
            SupportedTransition::new(BRIGHTNESS, TRANSITION_TYPE_LINEAR),
            SupportedTransition::new(COLOR_TEMP, TRANSITION_TYPE_LINEAR_DERIVED),
        ],
    )
}

const EVENING: &str = r#"
[[transition]]
characteristic = 18
context = "evening"
end = "loop"
update_interval_ms = 1000

[transition.curve]
type = "linear"
points = [
    { target = 90, duration_ms = 0 },
    { target = 40, duration_ms = 30000 },
    { target = 10, duration_ms = 30000, delay_ms = 1000 },
]

[[transition]]
characteristic = 19
update_interval_ms = 1000

[transition.curve]
type = "derived"
source = 18
lower = 0
upper = 100
points = [
    { scale = 1.5, offset = 150.0, duration_ms = 0 },
    { scale = 2.0, offset = 200.0, duration_ms = 60000 },
]
"#;

fn open_engine(
    path: &std::path::Path,
    clock: Arc<SimulatedClock>,
    persists: bool,
) -> AdaptiveLight<RecordingCallbacks, FileStore> {
    AdaptiveLight::new(
        settings(),
        RecordingCallbacks::new().with_value(BRIGHTNESS, 90),
        FileStore::open(path).unwrap(),
        LogicalClock::new(clock, persists),
    )
}

#[test]
fn test_transitions_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store").join("transitions.json");
    let clock = Arc::new(SimulatedClock::fast_forward(10_000));

    let mut engine = open_engine(&path, clock.clone(), true);
    assert_eq!(engine.initialize().unwrap(), 0);
    let request = StartRequest::from_toml_str(EVENING).unwrap();
    engine
        .handle_write(&request.to_write_request().unwrap())
        .unwrap();
    let before = engine.snapshot();
    drop(engine);

    clock.advance(5_000);
    let mut engine = open_engine(&path, clock.clone(), true);
    assert_eq!(engine.initialize().unwrap(), 2);
    let after = engine.snapshot();

    assert_eq!(after.transitions.len(), before.transitions.len());
    for (old, new) in before.transitions.iter().zip(&after.transitions) {
        assert_eq!(new.characteristic_id, old.characteristic_id);
        assert_eq!(new.kind, old.kind);
        assert_eq!(new.end_behavior, old.end_behavior);
        assert_eq!(new.request_time, old.request_time);
        assert_eq!(new.controller_context, old.controller_context);
        assert_eq!(new.points.len(), old.points.len());
        for (a, b) in old.points.iter().zip(&new.points) {
            assert_eq!(a.payload, b.payload);
            assert_eq!(a.start_delay, b.start_delay);
            assert_eq!(a.completion_duration, b.completion_duration);
        }
    }
    assert_eq!(after.transitions[1].source_id, Some(BRIGHTNESS));
}

#[test]
fn test_store_is_locked_while_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transitions.json");

    let first = FileStore::open(&path).unwrap();
    let second = FileStore::open(&path);
    assert!(matches!(second, Err(StoreError::Locked(_))));

    drop(first);
    assert!(FileStore::open(&path).is_ok());
}

#[test]
fn test_logical_clock_survives_host_clock_reset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transitions.json");

    let clock = Arc::new(SimulatedClock::fast_forward(40_000));
    let mut engine = open_engine(&path, clock.clone(), false);
    engine.initialize().unwrap();
    engine.persist_clock().unwrap();
    drop(engine);

    // Host clock restarts from zero after a reboot
    let rebooted = Arc::new(SimulatedClock::fast_forward(0));
    let mut engine = open_engine(&path, rebooted.clone(), false);
    engine.initialize().unwrap();
    assert_eq!(engine.clock().now(), 40_000);
    assert_eq!(engine.clock().to_host(41_000), 1_000);
}

#[test]
fn test_clear_purges_everything() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transitions.json");
    let clock = Arc::new(SimulatedClock::fast_forward(10_000));

    let mut engine = open_engine(&path, clock.clone(), false);
    engine.initialize().unwrap();
    let request = StartRequest::from_toml_str(EVENING).unwrap();
    engine
        .handle_write(&request.to_write_request().unwrap())
        .unwrap();
    engine.persist_clock().unwrap();
    let (_, mut store) = engine.into_parts();

    persistence::clear(&mut store).unwrap();
    assert!(persistence::load_records(&store, 2).unwrap().is_empty());
    assert_eq!(persistence::load_clock(&store).unwrap(), None);
    drop(store);

    let reopened = FileStore::open(&path).unwrap();
    assert!(persistence::load_records(&reopened, 2).unwrap().is_empty());
    assert!(reopened.get(0x01, 0xF0).unwrap().is_none());
}
