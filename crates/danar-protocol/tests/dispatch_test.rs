//! Integration tests for inbound dispatch through the default registry.
//!
//! These feed complete packets through the frame codec and registry and
//! check the resulting pump state and events.

use danar_protocol::*;

/// Helper to wrap a payload in a packet and dispatch it.
fn feed(
    registry: &MessageRegistry,
    state: &mut PumpState,
    command: u16,
    payload: &[u8],
) -> ProtocolResult<Option<PumpEvent>> {
    let packet = FrameCodec::encode(command, payload).expect("payload fits");
    let mut codec = FrameCodec::new();
    codec.push(&packet);
    let frame = codec.decode()?.expect("complete packet");
    registry.dispatch(frame.command, &frame.payload, state)
}

fn glucose_record(first: u8) -> [u8; HISTORY_RECORD_SIZE] {
    [first, 0x24, 0x03, 0x05, 0x12, 0x00, 0x00, 0, 0x00, 0x64]
}

// ============================================================================
// History Terminal Markers
// ============================================================================

#[test]
fn test_glucose_terminal_marker_sets_done() {
    let registry = MessageRegistry::with_defaults();
    let mut state = PumpState::new();

    let event = feed(&registry, &mut state, CMD_HISTORY_GLUCOSE, &glucose_record(0xFF)).unwrap();
    assert_eq!(event, Some(PumpEvent::HistoryBatchComplete(HistoryCategory::Glucose)));
    assert!(state.is_history_done(HistoryCategory::Glucose));

    let event = feed(&registry, &mut state, CMD_HISTORY_GLUCOSE, &glucose_record(0x01)).unwrap();
    assert_eq!(event, None);
    assert!(!state.is_history_done(HistoryCategory::Glucose));
}

#[test]
fn test_every_category_terminal_behaviour() {
    let registry = MessageRegistry::with_defaults();

    for category in HistoryCategory::ALL {
        let mut state = PumpState::new();
        state.begin_history_load(category);

        let record_code = category.record_code().unwrap_or(RECORD_TYPE_REFILL);
        // Event records carry one byte more than the classic layout
        let mut record = glucose_record(record_code).to_vec();
        record.resize(category.record_size(), 0);
        feed(&registry, &mut state, category.command(), &record).unwrap();
        assert!(!state.is_history_done(category), "{} done too early", category);
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].category, category);

        record[0] = RECORD_END_OF_STREAM;
        let event = feed(&registry, &mut state, category.command(), &record).unwrap();
        assert_eq!(event, Some(PumpEvent::HistoryBatchComplete(category)));
        assert!(state.is_history_done(category), "{} never completed", category);
    }
}

#[test]
fn test_done_messages_complete_their_streams() {
    let registry = MessageRegistry::with_defaults();
    let mut state = PumpState::new();

    state.begin_history_load(HistoryCategory::Bolus);
    let event = feed(&registry, &mut state, CMD_HISTORY_DONE, &[]).unwrap();
    assert_eq!(event, Some(PumpEvent::HistoryBatchComplete(HistoryCategory::Bolus)));

    state.begin_history_load(HistoryCategory::All);
    // The per-category marker does not belong to an All download
    assert_eq!(feed(&registry, &mut state, CMD_HISTORY_DONE, &[]).unwrap(), None);
    assert!(!state.is_history_done(HistoryCategory::All));

    let event = feed(&registry, &mut state, CMD_HISTORY_ALL_DONE, &[]).unwrap();
    assert_eq!(event, Some(PumpEvent::HistoryBatchComplete(HistoryCategory::All)));

    state.begin_history_load(HistoryCategory::New);
    let event = feed(&registry, &mut state, CMD_HISTORY_NEW_DONE, &[]).unwrap();
    assert_eq!(event, Some(PumpEvent::HistoryBatchComplete(HistoryCategory::New)));
    assert!(!state.is_any_history_loading());
}

#[test]
fn test_second_request_does_not_see_stale_done() {
    let registry = MessageRegistry::with_defaults();
    let mut state = PumpState::new();
    let category = HistoryCategory::Carbohydrate;

    state.begin_history_load(category);
    feed(&registry, &mut state, category.command(), &[0xFF]).unwrap();
    assert!(state.is_history_done(category));

    state.begin_history_load(category);
    assert!(!state.is_history_done(category));
    let record = [RECORD_TYPE_CARBO, 0x24, 0x03, 0x05, 0x12, 0x00, 0x00, 0, 0x00, 0x2D];
    feed(&registry, &mut state, category.command(), &record).unwrap();
    assert!(!state.is_history_done(category));

    let records = state.take_history();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].detail, RecordDetail::Carbohydrate { grams: 45 });
}

// ============================================================================
// Malformed and Unknown Frames
// ============================================================================

#[test]
fn test_unknown_code_leaves_state_unchanged() {
    let registry = MessageRegistry::with_defaults();
    let mut state = PumpState::new();
    state.begin_history_load(HistoryCategory::Alarm);
    let before = state.clone();

    for code in [0x0000u16, 0x1234, 0x31F0, 0xFFFF] {
        assert_eq!(feed(&registry, &mut state, code, &[0xFF, 0x01, 0x02]).unwrap(), None);
    }
    assert_eq!(state, before);
}

#[test]
fn test_short_history_record_is_rejected() {
    let registry = MessageRegistry::with_defaults();
    let mut state = PumpState::new();
    state.begin_history_load(HistoryCategory::Bolus);
    let before = state.clone();

    let result = feed(&registry, &mut state, CMD_HISTORY_MEAL_INS, &[RECORD_TYPE_BOLUS, 0x24]);
    assert!(matches!(
        result,
        Err(ProtocolError::FrameTooShort {
            command: CMD_HISTORY_MEAL_INS,
            expected: HISTORY_RECORD_SIZE,
            actual: 2,
        })
    ));
    assert_eq!(state, before);
}

#[test]
fn test_every_handler_rejects_short_payload() {
    let registry = MessageRegistry::with_defaults();
    for handler in Handler::all() {
        let min = handler.min_payload_len();
        if min == 0 {
            continue;
        }
        let mut state = PumpState::new();
        let before = state.clone();
        let payload = vec![0u8; min - 1];
        assert!(
            registry.dispatch(handler.command(), &payload, &mut state).is_err(),
            "{} accepted a short payload",
            handler.name()
        );
        assert_eq!(state, before, "{} mutated state", handler.name());
    }
}

#[test]
fn test_every_handler_tolerates_trailing_bytes() {
    let registry = MessageRegistry::with_defaults();
    for handler in Handler::all() {
        let mut state = PumpState::new();
        let payload = vec![0u8; handler.min_payload_len().max(HISTORY_RECORD_SIZE) + 16];
        assert!(
            registry.dispatch(handler.command(), &payload, &mut state).is_ok(),
            "{} failed on a long payload",
            handler.name()
        );
    }
}

// ============================================================================
// Connect Sequence
// ============================================================================

#[test]
fn test_connect_sequence_populates_state() {
    let registry = MessageRegistry::with_defaults();
    let mut state = PumpState::new();

    feed(&registry, &mut state, CMD_PUMP_CHECK_VALUE, &[HW_MODEL_EXPORT, 2, 0]).unwrap();
    feed(&registry, &mut state, CMD_PUMPINIT_TIME_INFO, &[0x24, 0x06, 0x15, 0x08, 0x00, 0x30]).unwrap();
    // Extended on, step 0.05 U, max bolus 10 U
    feed(&registry, &mut state, CMD_PUMPINIT_BOLUS_INFO, &[1, 5, 0x03, 0xE8]).unwrap();
    feed(&registry, &mut state, CMD_SETTING_V_GLUCOSE_AND_EASY, &[1, 0]).unwrap();

    assert_eq!(state.model.map(|m| m.hw_model), Some(HW_MODEL_EXPORT));
    assert_eq!(state.pump_time, Some(PumpDateTime::new(2024, 6, 15, 8, 0, 30)));
    assert!(state.bolus_settings.extended_bolus_enabled);
    approx::assert_abs_diff_eq!(state.bolus_settings.bolus_step, 0.05, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(state.max_values.max_bolus, 10.0, epsilon = 1e-9);
    assert_eq!(state.units, GlucoseUnits::MmolL);
}
