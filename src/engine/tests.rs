use std::sync::Arc;

use super::*;
use crate::callbacks::{MockTransitionCallbacks, RecordingCallbacks};
use crate::clock::{Clock, SimulatedClock};
use crate::common::constants::{KEY_CHARACTERISTIC_ID, STORAGE_DOMAIN};
use crate::persistence::MemoryStore;
use crate::service::CharacteristicDescriptor;
use crate::transition::codec::{decode_transition_state, encode_fetch_request, response};
use crate::transition::definition::{
    CurveDefinition, DerivedPointDefinition, EndMode, LinearPointDefinition, StartRequest,
    TransitionDefinition,
};
use crate::tlv::TlvReader;
use crate::transition::{TRANSITION_TYPE_LINEAR, TRANSITION_TYPE_LINEAR_DERIVED};

const BRIGHTNESS: u64 = 0x12;
const COLOR_TEMP: u64 = 0x13;
const HUE: u64 = 0x14;
const T0: u64 = 100_000;

fn settings() -> EngineSettings {
    EngineSettings::new(
        ServiceDescriptor::new(
            0x10,
            vec![
                CharacteristicDescriptor::new(BRIGHTNESS, 0, 100),
                CharacteristicDescriptor::new(COLOR_TEMP, 140, 500),
                CharacteristicDescriptor::new(HUE, 0, 360),
            ],
        ),
        vec![
            SupportedTransition::new(BRIGHTNESS, TRANSITION_TYPE_LINEAR),
            SupportedTransition::new(
                COLOR_TEMP,
                TRANSITION_TYPE_LINEAR | TRANSITION_TYPE_LINEAR_DERIVED,
            ),
            // Not part of the service, never advertised
            SupportedTransition::new(0x40, TRANSITION_TYPE_LINEAR),
        ],
    )
}

type TestEngine = AdaptiveLight<RecordingCallbacks, MemoryStore>;

fn engine_at(
    start_ms: u64,
    callbacks: RecordingCallbacks,
    storage: MemoryStore,
    persists: bool,
) -> (TestEngine, Arc<SimulatedClock>) {
    let sim = Arc::new(SimulatedClock::fast_forward(start_ms));
    let source: Arc<dyn Clock> = sim.clone();
    let mut engine = AdaptiveLight::new(
        settings(),
        callbacks,
        storage,
        LogicalClock::new(source, persists),
    );
    engine.initialize().unwrap();
    (engine, sim)
}

fn linear(
    characteristic: u64,
    points: &[(i32, u64)],
    end: EndMode,
    interval: u64,
) -> TransitionDefinition {
    TransitionDefinition {
        characteristic,
        context: Some("ctx".to_string()),
        end: Some(end),
        update_interval_ms: Some(interval),
        value_threshold: None,
        time_threshold_ms: None,
        curve: Some(CurveDefinition::Linear {
            points: points
                .iter()
                .map(|&(target, duration_ms)| LinearPointDefinition {
                    target,
                    duration_ms,
                    delay_ms: 0,
                })
                .collect(),
            start: Default::default(),
        }),
    }
}

fn start(transitions: Vec<TransitionDefinition>) -> Vec<u8> {
    StartRequest { transitions }.to_write_request().unwrap()
}

fn step(engine: &mut TestEngine, clock: &SimulatedClock, ms: u64) {
    clock.advance(ms);
    engine.poll(clock.now_ms()).unwrap();
}

fn values(engine: &TestEngine, characteristic_id: u64) -> Vec<i32> {
    engine
        .callbacks()
        .updates_for(characteristic_id)
        .map(|u| u.value)
        .collect()
}

#[test]
fn test_start_applies_initial_value_and_arms_timer() {
    let callbacks = RecordingCallbacks::new().with_value(BRIGHTNESS, 60);
    let (mut engine, _clock) = engine_at(T0, callbacks, MemoryStore::new(), true);

    let request = start(vec![linear(BRIGHTNESS, &[(50, 1_000), (90, 4_000)], EndMode::Stop, 1_000)]);
    engine.handle_write(&request).unwrap();

    assert_eq!(engine.transition_count(), 1);
    assert_eq!(engine.callbacks().count_changes, 1);
    let first = engine.callbacks().updates[0];
    assert_eq!((first.value, first.notify), (60, true));
    assert_eq!(engine.timer().deadline(), Some(T0 + 1_000));
    assert!(engine.storage().get(STORAGE_DOMAIN, KEY_CHARACTERISTIC_ID).unwrap().is_some());
}

#[test]
fn test_stop_transition_runs_to_completion() {
    let callbacks = RecordingCallbacks::new().with_value(BRIGHTNESS, 60);
    let (mut engine, clock) = engine_at(T0, callbacks, MemoryStore::new(), true);
    let request = start(vec![linear(BRIGHTNESS, &[(50, 1_000), (90, 4_000)], EndMode::Stop, 1_000)]);
    engine.handle_write(&request).unwrap();

    for _ in 0..8 {
        step(&mut engine, &clock, 1_000);
    }

    assert_eq!(values(&engine, BRIGHTNESS), vec![60, 50, 60, 70, 80, 90, 90]);
    assert_eq!(engine.transition_count(), 0);
    assert_eq!(engine.callbacks().count_changes, 2);
    assert_eq!(engine.timer().deadline(), None);
    // The persisted record went with it
    assert!(engine.storage().get(STORAGE_DOMAIN, KEY_CHARACTERISTIC_ID).unwrap().is_none());
}

#[test]
fn test_loop_transition_restarts() {
    let callbacks = RecordingCallbacks::new().with_value(BRIGHTNESS, 60);
    let (mut engine, clock) = engine_at(T0, callbacks, MemoryStore::new(), true);
    let request = start(vec![linear(BRIGHTNESS, &[(50, 1_000), (90, 4_000)], EndMode::Loop, 1_000)]);
    engine.handle_write(&request).unwrap();

    for _ in 0..11 {
        step(&mut engine, &clock, 1_000);
    }

    assert_eq!(
        values(&engine, BRIGHTNESS),
        vec![60, 50, 60, 70, 80, 90, 50, 60, 70, 80, 90, 50]
    );
    assert_eq!(engine.transition_count(), 1);
}

#[test]
fn test_recompute_is_idempotent() {
    let (mut engine, _clock) = engine_at(T0, RecordingCallbacks::new(), MemoryStore::new(), true);
    engine
        .handle_write(&start(vec![linear(BRIGHTNESS, &[(20, 0), (80, 60_000)], EndMode::Stop, 1_000)]))
        .unwrap();
    let updates = engine.callbacks().updates.len();
    let deadline = engine.timer().deadline();

    engine.recompute().unwrap();
    engine.recompute().unwrap();

    assert_eq!(engine.callbacks().updates.len(), updates);
    assert_eq!(engine.timer().deadline(), deadline);
}

#[test]
fn test_fetch_and_state_reads() {
    let (mut engine, clock) = engine_at(T0, RecordingCallbacks::new(), MemoryStore::new(), true);
    engine
        .handle_write(&start(vec![linear(BRIGHTNESS, &[(80, 60_000)], EndMode::Stop, 1_000)]))
        .unwrap();
    clock.advance(1_500);

    engine.handle_write(&encode_fetch_request(BRIGHTNESS).unwrap()).unwrap();
    let fetched = engine.handle_read().unwrap();
    let items = TlvReader::new(&fetched).read_all().unwrap();
    assert_eq!(items[0].ty, response::TRANSITION);

    // The fetch is answered once, then reads fall back to the state
    let state = decode_transition_state(&engine.handle_read().unwrap()).unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].characteristic_id, BRIGHTNESS);
    assert_eq!(state[0].controller_context, b"ctx");
    assert_eq!(state[0].time_elapsed_ms, 1_500);

    // No transition: empty fetch response
    engine.handle_write(&encode_fetch_request(COLOR_TEMP).unwrap()).unwrap();
    assert!(engine.handle_read().unwrap().is_empty());

    // In the service but without transition support
    engine.handle_write(&encode_fetch_request(HUE).unwrap()).unwrap();
    assert!(matches!(engine.handle_read(), Err(AdaptiveLightError::Unknown(_))));

    let err = engine.handle_write(&encode_fetch_request(0x99).unwrap()).unwrap_err();
    assert!(matches!(err, AdaptiveLightError::Unknown(_)));
}

#[test]
fn test_batch_is_all_or_nothing() {
    let sim = Arc::new(SimulatedClock::fast_forward(T0));
    let mut engine = AdaptiveLight::new(
        settings().with_capacity(2, 4),
        RecordingCallbacks::new(),
        MemoryStore::new(),
        LogicalClock::new(sim.clone(), true),
    );
    engine.initialize().unwrap();

    let three = linear(BRIGHTNESS, &[(10, 1_000), (20, 1_000), (30, 1_000)], EndMode::Stop, 1_000);
    let two = linear(COLOR_TEMP, &[(200, 1_000), (300, 1_000)], EndMode::Stop, 1_000);
    let err = engine.handle_write(&start(vec![three.clone(), two])).unwrap_err();
    assert!(matches!(err, AdaptiveLightError::OutOfResources(_)));
    assert_eq!(engine.transition_count(), 0);
    assert!(engine.callbacks().updates.is_empty());

    engine.handle_write(&start(vec![three])).unwrap();
    // Replacing a transition may reuse its points
    let four = linear(BRIGHTNESS, &[(10, 1_000), (20, 1_000), (30, 1_000), (40, 1_000)], EndMode::Stop, 1_000);
    engine.handle_write(&start(vec![four])).unwrap();
    assert_eq!(engine.transition_count(), 1);
    assert_eq!(engine.snapshot().points_used, 4);
}

#[test]
fn test_invalid_entry_rejects_whole_batch() {
    let (mut engine, _clock) = engine_at(T0, RecordingCallbacks::new(), MemoryStore::new(), true);
    let good = linear(BRIGHTNESS, &[(80, 1_000)], EndMode::Stop, 1_000);
    let out_of_range = linear(COLOR_TEMP, &[(900, 1_000)], EndMode::Stop, 1_000);

    let err = engine.handle_write(&start(vec![good, out_of_range])).unwrap_err();
    assert!(matches!(err, AdaptiveLightError::InvalidData(_)));
    assert_eq!(engine.transition_count(), 0);
    assert!(engine.storage().is_empty());
}

#[test]
fn test_empty_entry_clears_transition() {
    let (mut engine, _clock) = engine_at(T0, RecordingCallbacks::new(), MemoryStore::new(), true);
    engine
        .handle_write(&start(vec![linear(BRIGHTNESS, &[(80, 60_000)], EndMode::Stop, 1_000)]))
        .unwrap();

    let clear = TransitionDefinition {
        characteristic: BRIGHTNESS,
        context: None,
        end: None,
        update_interval_ms: None,
        value_threshold: None,
        time_threshold_ms: None,
        curve: None,
    };
    engine.handle_write(&start(vec![clear])).unwrap();

    assert_eq!(engine.transition_count(), 0);
    assert_eq!(engine.callbacks().count_changes, 2);
    assert!(engine.storage().get(STORAGE_DOMAIN, KEY_CHARACTERISTIC_ID).unwrap().is_none());
    assert_eq!(engine.timer().deadline(), None);
}

#[test]
fn test_restart_restores_transition() {
    let callbacks = RecordingCallbacks::new().with_value(BRIGHTNESS, 60);
    let (mut engine, clock) = engine_at(T0, callbacks, MemoryStore::new(), true);
    engine
        .handle_write(&start(vec![linear(BRIGHTNESS, &[(50, 1_000), (90, 4_000)], EndMode::Stop, 1_000)]))
        .unwrap();
    step(&mut engine, &clock, 1_000);
    let (callbacks, storage) = engine.into_parts();

    clock.advance(1_500);
    let mut restarted = AdaptiveLight::new(
        settings(),
        callbacks,
        storage,
        LogicalClock::new(clock.clone(), true),
    );
    assert_eq!(restarted.initialize().unwrap(), 1);
    assert_eq!(restarted.current_value(BRIGHTNESS), Some(65));
    assert_eq!(restarted.timer().deadline(), Some(T0 + 3_500));
}

#[test]
fn test_logical_clock_resumes_after_reboot() {
    let (mut engine, clock) = engine_at(50_000, RecordingCallbacks::new(), MemoryStore::new(), false);
    engine
        .handle_write(&start(vec![linear(BRIGHTNESS, &[(50, 1_000)], EndMode::Stop, 500)]))
        .unwrap();
    clock.advance(1_000);
    engine.persist_clock().unwrap();
    let (callbacks, storage) = engine.into_parts();

    // The host clock starts over from zero
    let rebooted: Arc<dyn Clock> = Arc::new(SimulatedClock::fast_forward(0));
    let mut restarted = AdaptiveLight::new(
        settings(),
        callbacks,
        storage,
        LogicalClock::new(rebooted, false),
    );
    restarted.initialize().unwrap();
    assert_eq!(restarted.clock().now(), 51_000);
    assert_eq!(restarted.current_value(BRIGHTNESS), Some(50));
    assert_eq!(restarted.timer().deadline(), Some(500));
}

#[test]
fn test_derived_transition_follows_clamped_source() {
    let callbacks = RecordingCallbacks::new().with_value(BRIGHTNESS, 150);
    let (mut engine, _clock) = engine_at(T0, callbacks, MemoryStore::new(), true);
    let derived = TransitionDefinition {
        characteristic: COLOR_TEMP,
        context: None,
        end: Some(EndMode::Stop),
        update_interval_ms: Some(1_000),
        value_threshold: None,
        time_threshold_ms: None,
        curve: Some(CurveDefinition::Derived {
            source: BRIGHTNESS,
            lower: 0,
            upper: 100,
            points: vec![DerivedPointDefinition {
                scale: 1.0,
                offset: 200.0,
                duration_ms: 60_000,
                delay_ms: 0,
            }],
        }),
    };
    engine.handle_write(&start(vec![derived])).unwrap();
    // 150 is clamped to 100
    assert_eq!(engine.current_value(COLOR_TEMP), Some(300));

    engine.callbacks_mut().values.insert(BRIGHTNESS, 40);
    engine.handle_source_value_change(BRIGHTNESS).unwrap();
    let last = *engine.callbacks().updates.last().unwrap();
    assert_eq!((last.characteristic_id, last.value, last.notify), (COLOR_TEMP, 240, true));

    // Unrelated characteristics are ignored
    let before = engine.callbacks().updates.len();
    engine.handle_source_value_change(HUE).unwrap();
    assert_eq!(engine.callbacks().updates.len(), before);
}

#[test]
fn test_count_change_fires_once_per_request() {
    let mut callbacks = MockTransitionCallbacks::new();
    callbacks.expect_value_request().returning(|_| 10);
    callbacks.expect_value_update().returning(|_, _, _| ());
    callbacks.expect_transition_count_changed().times(1).returning(|| ());

    let sim: Arc<dyn Clock> = Arc::new(SimulatedClock::fast_forward(T0));
    let mut engine = AdaptiveLight::new(
        settings(),
        callbacks,
        MemoryStore::new(),
        LogicalClock::new(sim, true),
    );
    engine.initialize().unwrap();
    engine
        .handle_write(&start(vec![
            linear(BRIGHTNESS, &[(80, 60_000)], EndMode::Stop, 1_000),
            linear(COLOR_TEMP, &[(300, 60_000)], EndMode::Stop, 1_000),
        ]))
        .unwrap();
    assert_eq!(engine.transition_count(), 2);
}

#[test]
fn test_value_threshold_suppresses_notifications() {
    let mut callbacks = MockTransitionCallbacks::new();
    callbacks.expect_value_request().returning(|_| 0);
    callbacks.expect_transition_count_changed().returning(|| ());
    // Values 0, 10 ... 80; only 20, 40, 60 and 80 move far enough
    callbacks
        .expect_value_update()
        .withf(|_, _, notify| *notify)
        .times(4)
        .returning(|_, _, _| ());
    callbacks
        .expect_value_update()
        .withf(|_, _, notify| !*notify)
        .times(5)
        .returning(|_, _, _| ());

    let sim = Arc::new(SimulatedClock::fast_forward(T0));
    let mut engine = AdaptiveLight::new(
        settings(),
        callbacks,
        MemoryStore::new(),
        LogicalClock::new(sim.clone(), true),
    );
    engine.initialize().unwrap();
    let mut definition = linear(BRIGHTNESS, &[(80, 8_000)], EndMode::Loop, 1_000);
    definition.value_threshold = Some(15);
    definition.time_threshold_ms = Some(0);
    engine.handle_write(&start(vec![definition])).unwrap();

    for _ in 0..8 {
        sim.advance(1_000);
        engine.poll(sim.now_ms()).unwrap();
    }
}

#[test]
fn test_supported_configuration_lists_service_members() {
    let (engine, _clock) = engine_at(T0, RecordingCallbacks::new(), MemoryStore::new(), true);
    let bytes = engine.supported_transition_configuration().unwrap();
    let entries: Vec<_> = TlvReader::new(&bytes)
        .read_all()
        .unwrap()
        .into_iter()
        .filter(|tlv| !tlv.is_separator())
        .collect();
    assert_eq!(entries.len(), 2);
}

#[test]
fn test_remove_transition() {
    let (mut engine, _clock) = engine_at(T0, RecordingCallbacks::new(), MemoryStore::new(), true);
    engine
        .handle_write(&start(vec![linear(BRIGHTNESS, &[(80, 60_000)], EndMode::Stop, 1_000)]))
        .unwrap();
    assert!(engine.remove_transition(BRIGHTNESS).unwrap());
    assert!(!engine.remove_transition(BRIGHTNESS).unwrap());
    assert_eq!(engine.transition_count(), 0);
    assert!(engine.storage().get(STORAGE_DOMAIN, KEY_CHARACTERISTIC_ID).unwrap().is_none());
}

#[test]
fn test_faulty_transition_does_not_stall_others() {
    use crate::tlv::NarrowInt;
    use crate::transition::timing::update_point_times;
    use crate::transition::{EndBehavior, StartCondition, Transition, TransitionKind, TransitionPoint};

    let callbacks = RecordingCallbacks::new().with_value(COLOR_TEMP, 300);
    let (mut engine, clock) = engine_at(T0, callbacks, MemoryStore::new(), true);
    engine
        .handle_write(&start(vec![linear(COLOR_TEMP, &[(400, 10_000)], EndMode::Stop, 1_000)]))
        .unwrap();

    // A loop whose cycle has no length can never move forward
    let mut stuck = Transition::new(BRIGHTNESS, 0x10, T0);
    stuck.kind = Some(TransitionKind::Linear {
        start_condition: StartCondition::None,
        threshold: 0,
    });
    stuck.end_behavior = EndBehavior::Loop;
    let id = engine.live.allocate(stuck).unwrap();
    engine
        .live
        .push_point(id, TransitionPoint::linear(NarrowInt::fit(20), 0, 0))
        .unwrap();
    let (transition, points) = engine.live.split_mut(id).unwrap();
    update_point_times(transition, points, T0).unwrap();

    step(&mut engine, &clock, 1_000);

    assert!(!engine.has_transition(BRIGHTNESS));
    assert!(engine.has_transition(COLOR_TEMP));
    assert_eq!(engine.callbacks().count_changes, 2);
    assert_eq!(engine.timer().deadline(), Some(T0 + 2_000));
    assert!(engine.current_value(COLOR_TEMP).unwrap() > 300);
}

#[test]
fn test_capacity_is_capped_at_storage_slots() {
    use crate::common::constants::MAX_STORAGE_SLOTS;

    let capped = settings().with_capacity(40, 64);
    assert_eq!(capped.max_transitions, MAX_STORAGE_SLOTS);
    assert_eq!(capped.max_transition_points, 64);
    assert_eq!(settings().with_capacity(3, 8).max_transitions, 3);
}
