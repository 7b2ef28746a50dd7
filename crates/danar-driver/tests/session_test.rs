//! End-to-end tests for the pump session.
//!
//! Commands go out through the queue as real packets and responses come back
//! as raw bytes, so every test crosses the codec, registry and state.

use danar_driver::danar_protocol::*;
use danar_driver::*;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session() -> PumpSession {
    init_tracing();
    PumpSession::new(DriverConfig::default())
}

/// Wrap a response payload as the pump would send it.
fn response(command: u16, payload: &[u8]) -> Vec<u8> {
    FrameCodec::encode(command, payload).expect("payload fits")
}

fn record(code: u8, value: u16) -> Vec<u8> {
    let [hi, lo] = value.to_be_bytes();
    vec![code, 0x24, 0x03, 0x05, 0x12, 0x00, 0x00, 0, hi, lo]
}

// ============================================================================
// Constraints
// ============================================================================

#[test]
fn test_carbs_are_constrained_before_sending() {
    let session = session();
    let time = PumpDateTime::new(2024, 3, 5, 12, 30, 0);

    let c = session.carbs(time, 120).unwrap();
    assert_eq!(c.value, 48);
    assert!(c.was_constrained());

    let packet = session.next_outbound().expect("carbs queued");
    let frame = parse_packet(&packet).unwrap();
    assert_eq!(frame.command, CMD_PUMPSET_HIS_S);
    assert_eq!(frame.payload[0], RECORD_TYPE_CARBO);
    assert_eq!(u16::from_be_bytes([frame.payload[8], frame.payload[9]]), 48);
}

#[test]
fn test_zero_carbs_are_not_sent() {
    let session = session();
    let time = PumpDateTime::new(2024, 3, 5, 12, 30, 0);

    let c = session.carbs(time, -5).unwrap();
    assert_eq!(c.value, 0);
    assert!(session.queue().is_idle());

    assert_eq!(session.carbs(time, 0).unwrap().value, 0);
    assert!(session.next_outbound().is_none());
}

#[test]
fn test_bolus_uses_pump_limits() {
    let session = session();
    // Extended on, step 0.1 U, max bolus 2 U
    session
        .on_bytes_received(&response(CMD_PUMPINIT_BOLUS_INFO, &[1, 10, 0x00, 0xC8]))
        .unwrap();

    let c = session.bolus(5.0).unwrap();
    approx::assert_abs_diff_eq!(c.value, 2.0, epsilon = 1e-9);
    assert_eq!(c.reasons.len(), 2);

    let packet = session.next_outbound().unwrap();
    let frame = parse_packet(&packet).unwrap();
    assert_eq!(frame.command, CMD_MEALINS_START_DATA);
    assert_eq!(frame.payload, vec![0x00, 0xC8]);

    let events = session
        .on_bytes_received(&response(CMD_MEALINS_START_DATA, &[RESULT_BOLUS_ACCEPTED]))
        .unwrap();
    assert!(events.is_empty());
    let state = session.state_snapshot();
    assert!(state.bolus.in_progress);
    approx::assert_abs_diff_eq!(state.bolus.requested, 2.0, epsilon = 1e-9);
    assert!(session.queue().is_idle());
}

#[test]
fn test_temp_target_is_only_constrained() {
    let session = session();
    let c = session.constrain_temp_target(TempTarget {
        low_mgdl: 40.0,
        high_mgdl: 90.0,
        duration_min: 30,
    });
    assert_eq!(c.value.low_mgdl, 72.0);
    assert_eq!(c.value.high_mgdl, 90.0);
    assert!(session.queue().is_idle());
}

// ============================================================================
// History
// ============================================================================

#[test]
fn test_sequential_history_requests() {
    let session = session();
    let category = HistoryCategory::Glucose;

    session.request_history(category).unwrap();
    let packet = session.next_outbound().unwrap();
    assert_eq!(parse_packet(&packet).unwrap().command, CMD_HISTORY_GLUCOSE);

    let mut bytes = response(CMD_HISTORY_GLUCOSE, &record(RECORD_TYPE_GLUCOSE, 110));
    bytes.extend(response(CMD_HISTORY_GLUCOSE, &record(RECORD_TYPE_GLUCOSE, 95)));
    bytes.extend(response(CMD_HISTORY_GLUCOSE, &[RECORD_END_OF_STREAM]));
    let events = session.on_bytes_received(&bytes).unwrap();
    assert_eq!(events, vec![PumpEvent::HistoryBatchComplete(category)]);
    assert_eq!(session.take_history().len(), 2);

    // The flag from the first batch must not leak into the second
    session.request_history(category).unwrap();
    assert!(session.next_outbound().is_some());
    assert!(!session.with_state(|s| s.is_history_done(category)));

    session
        .on_bytes_received(&response(CMD_HISTORY_GLUCOSE, &record(RECORD_TYPE_GLUCOSE, 140)))
        .unwrap();
    assert!(!session.with_state(|s| s.is_history_done(category)));

    session
        .on_bytes_received(&response(CMD_HISTORY_GLUCOSE, &[RECORD_END_OF_STREAM]))
        .unwrap();
    assert!(session.with_state(|s| s.is_history_done(category)));

    let history = session.take_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].detail, RecordDetail::Glucose { mgdl: 140 });
}

#[test]
fn test_queued_request_does_not_clear_done_flag() {
    let session = session();
    let category = HistoryCategory::Glucose;
    session.request_history(category).unwrap();
    session.request_history(category).unwrap();

    session.next_outbound().unwrap();
    session
        .on_bytes_received(&response(CMD_HISTORY_GLUCOSE, &[RECORD_END_OF_STREAM]))
        .unwrap();
    // The second request is still waiting, so the first batch stays done
    assert!(session.with_state(|s| s.is_history_done(category)));

    session.next_outbound().unwrap();
    assert!(!session.with_state(|s| s.is_history_done(category)));
}

#[test]
fn test_done_message_completes_the_sent_category() {
    let session = session();
    session.request_history(HistoryCategory::Refill).unwrap();
    session.request_history(HistoryCategory::Alarm).unwrap();
    let packet = session.next_outbound().unwrap();
    assert_eq!(parse_packet(&packet).unwrap().command, CMD_HISTORY_REFILL);

    let events = session
        .on_bytes_received(&response(CMD_HISTORY_DONE, &[]))
        .unwrap();
    assert_eq!(events, vec![PumpEvent::HistoryBatchComplete(HistoryCategory::Refill)]);
    assert!(session.with_state(|s| s.is_history_done(HistoryCategory::Refill)));
    assert_eq!(
        session.with_state(|s| s.history_state(HistoryCategory::Alarm)),
        LoadState::Idle
    );

    let packet = session.next_outbound().unwrap();
    assert_eq!(parse_packet(&packet).unwrap().command, CMD_HISTORY_ALARM);
}

#[test]
fn test_done_message_settles_per_category_request() {
    let session = session();
    session.request_history(HistoryCategory::Bolus).unwrap();
    session.next_outbound().unwrap();

    let events = session
        .on_bytes_received(&response(CMD_HISTORY_DONE, &[]))
        .unwrap();
    assert_eq!(events, vec![PumpEvent::HistoryBatchComplete(HistoryCategory::Bolus)]);
    assert!(session.queue().is_idle());
}

#[test]
fn test_abandon_resets_loading_categories() {
    let session = session();
    session.request_history(HistoryCategory::Alarm).unwrap();
    session.request_history(HistoryCategory::Refill).unwrap();
    session.next_outbound().unwrap();

    // Half a packet left in the codec
    let partial = response(CMD_HISTORY_ALARM, &record(RECORD_TYPE_ALARM, 1));
    session.on_bytes_received(&partial[..5]).unwrap();

    let dropped = session.abandon();
    assert_eq!(dropped.len(), 2);
    assert!(session.queue().is_idle());
    assert!(!session.with_state(|s| s.is_any_history_loading()));
    assert_eq!(
        session.with_state(|s| s.history_state(HistoryCategory::Alarm)),
        LoadState::Idle
    );

    // A fresh packet after the reset decodes cleanly
    let events = session
        .on_bytes_received(&response(CMD_HISTORY_ALARM, &[RECORD_END_OF_STREAM]))
        .unwrap();
    assert_eq!(events, vec![PumpEvent::HistoryBatchComplete(HistoryCategory::Alarm)]);
}

// ============================================================================
// Queue and Events
// ============================================================================

#[test]
fn test_single_command_in_flight() {
    let session = session();
    session.submit(Command::CommStart).unwrap();
    session.submit(Command::Query(StatusQuery::InitTime)).unwrap();

    assert!(session.next_outbound().is_some());
    assert!(session.next_outbound().is_none());

    // A response for some other code does not release the queue
    session
        .on_bytes_received(&response(CMD_PUMPINIT_OPTION, &[0; 20]))
        .unwrap();
    assert!(session.next_outbound().is_none());

    session.on_bytes_received(&response(CMD_CONNECT, &[])).unwrap();
    let packet = session.next_outbound().unwrap();
    assert_eq!(parse_packet(&packet).unwrap().command, CMD_PUMPINIT_TIME_INFO);
}

#[test]
fn test_queue_limit_from_config() {
    init_tracing();
    let config = DriverConfig::from_yaml_str("queue:\n  max_pending: 2\n").unwrap();
    let session = PumpSession::new(config);
    session.submit(Command::CommStart).unwrap();
    session.submit(Command::CommStop).unwrap();
    assert!(matches!(
        session.submit(Command::BolusStop),
        Err(DriverError::QueueFull { max_pending: 2 })
    ));
}

#[test]
fn test_subscribers_receive_events() {
    let session = session();
    let rx = session.subscribe();
    let dropped = session.subscribe();
    drop(dropped);

    session
        .on_bytes_received(&response(CMD_HISTORY_GLUCOSE, &[RECORD_END_OF_STREAM]))
        .unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        PumpEvent::HistoryBatchComplete(HistoryCategory::Glucose)
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_corrupt_packet_is_skipped() {
    let session = session();
    let mut bad = response(CMD_HISTORY_GLUCOSE, &record(RECORD_TYPE_GLUCOSE, 100));
    let crc_at = bad.len() - 4;
    bad[crc_at] ^= 0xFF;

    let mut bytes = vec![0x00, 0x13];
    bytes.extend(bad);
    bytes.extend(response(CMD_HISTORY_GLUCOSE, &[RECORD_END_OF_STREAM]));

    let events = session.on_bytes_received(&bytes).unwrap();
    assert_eq!(events, vec![PumpEvent::HistoryBatchComplete(HistoryCategory::Glucose)]);
    assert!(session.take_history().is_empty());
}

#[test]
fn test_unknown_and_short_frames() {
    let session = session();
    let before = session.state_snapshot();

    let mut bytes = response(0x7777, &[1, 2, 3]);
    bytes.extend(response(CMD_PUMPINIT_BOLUS_INFO, &[1]));
    let events = session.on_bytes_received(&bytes).unwrap();

    assert!(events.is_empty());
    assert_eq!(session.state_snapshot(), before);
}
