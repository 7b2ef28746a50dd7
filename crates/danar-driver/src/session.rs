//! Pump session.
//!
//! [`PumpSession`] ties the pieces together for one connected pump: inbound
//! bytes are framed and dispatched into the shared [`PumpState`], user values
//! pass through the [`ConstraintPipeline`] into the [`CommandQueue`], and
//! decoded events are fanned out to subscribers over channels.
//!
//! The session does not own a transport. The caller feeds received bytes to
//! [`PumpSession::on_bytes_received`] and writes whatever
//! [`PumpSession::next_outbound`] returns.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use danar_protocol::{
    Command, FrameCodec, HistoryCategory, HistoryRecord, MessageRegistry, PumpDateTime,
    PumpEvent, PumpState,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::DriverConfig;
use crate::constraints::{Constrained, ConstraintPipeline, DeviceLimits, TempTarget};
use crate::error::DriverResult;
use crate::queue::CommandQueue;
use crate::telemetry::{command_label, metric_defs};

/// One connected pump.
#[derive(Debug)]
pub struct PumpSession {
    registry: Arc<MessageRegistry>,
    state: Mutex<PumpState>,
    codec: Mutex<FrameCodec>,
    queue: CommandQueue,
    constraints: ConstraintPipeline,
    subscribers: Mutex<Vec<Sender<PumpEvent>>>,
}

impl PumpSession {
    /// Create a session with the built-in handlers.
    pub fn new(config: DriverConfig) -> Self {
        Self::with_registry(config, Arc::new(MessageRegistry::with_defaults()))
    }

    /// Create a session sharing an existing registry.
    pub fn with_registry(config: DriverConfig, registry: Arc<MessageRegistry>) -> Self {
        PumpSession {
            registry,
            state: Mutex::new(PumpState::new()),
            codec: Mutex::new(FrameCodec::new()),
            queue: CommandQueue::new(config.queue.max_pending),
            constraints: ConstraintPipeline::new(config.constraints),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Handler registry used for dispatch.
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Outbound command queue.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Constraint pipeline applied to user values.
    pub fn constraints(&self) -> &ConstraintPipeline {
        &self.constraints
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Dispatch one decoded message.
    ///
    /// Unknown codes are counted and ignored. A malformed payload is counted
    /// and returned as an error with the state left as it was.
    pub fn on_frame_received(&self, command: u16, payload: &[u8]) -> DriverResult<Option<PumpEvent>> {
        let label = command_label(command);
        metrics::counter!(metric_defs::FRAMES_RECEIVED.name, "command" => label.clone()).increment(1);
        if !self.registry.contains(command) {
            metrics::counter!(metric_defs::UNKNOWN_COMMANDS.name, "command" => label.clone())
                .increment(1);
        }

        let result = {
            let mut state = self.state.lock();
            self.registry.dispatch(command, payload, &mut state)
        };
        let event = match result {
            Ok(event) => event,
            Err(err) => {
                metrics::counter!(metric_defs::MALFORMED_FRAMES.name, "command" => label.clone())
                    .increment(1);
                warn!(command = %label, len = payload.len(), "dropping message: {}", err);
                return Err(err.into());
            }
        };

        self.settle_in_flight(command, event.as_ref());

        if let Some(event) = &event {
            self.record_event(event);
            self.publish(event);
        }
        Ok(event)
    }

    /// Feed raw bytes from the transport.
    ///
    /// Every complete packet in the buffer is dispatched. Bad packets are
    /// logged and skipped so one corrupt frame does not stall the stream.
    pub fn on_bytes_received(&self, data: &[u8]) -> DriverResult<Vec<PumpEvent>> {
        let mut frames = Vec::new();
        {
            let mut codec = self.codec.lock();
            codec.push(data);
            loop {
                match codec.decode() {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => break,
                    Err(err) => {
                        metrics::counter!(metric_defs::MALFORMED_FRAMES.name, "command" => "envelope")
                            .increment(1);
                        warn!("dropping packet: {}", err);
                    }
                }
            }
        }

        let mut events = Vec::new();
        for frame in frames {
            match self.on_frame_received(frame.command, &frame.payload) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                // Already counted and logged
                Err(_) => {}
            }
        }
        Ok(events)
    }

    /// Release the in-flight command once the response that ends it arrives.
    ///
    /// A history request ends with its batch-complete event rather than with
    /// the first record carrying its code.
    fn settle_in_flight(&self, command: u16, event: Option<&PumpEvent>) {
        let Some(in_flight) = self.queue.in_flight() else {
            return;
        };
        let settled = match in_flight.history_category() {
            Some(category) => {
                event == Some(&PumpEvent::HistoryBatchComplete(category))
                    && self.queue.complete_in_flight().is_some()
            }
            None => self.queue.complete(command).is_some(),
        };
        if settled {
            trace!(code = in_flight.code(), "in-flight command settled");
        }
    }

    fn record_event(&self, event: &PumpEvent) {
        match event {
            PumpEvent::ErrorOccurred(code) => {
                metrics::counter!(metric_defs::DEVICE_ERRORS.name).increment(1);
                warn!(?code, "pump reported an error");
            }
            PumpEvent::HistoryBatchComplete(category) => {
                metrics::counter!(metric_defs::HISTORY_BATCHES.name, "category" => category.as_str())
                    .increment(1);
                debug!(%category, "history batch complete");
            }
            PumpEvent::CommandRejected { command, code } => {
                warn!(command = %command_label(*command), code, "command rejected");
            }
            PumpEvent::UnsupportedModel { hw_model } => {
                warn!(hw_model, "unsupported pump model");
            }
            PumpEvent::BolusProgress { .. } | PumpEvent::BolusStopped { .. } => {
                trace!(event = event.name(), "bolus update");
            }
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Receive every event decoded from now on.
    pub fn subscribe(&self) -> Receiver<PumpEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, event: &PumpEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Queue a command as given.
    pub fn submit(&self, command: Command) -> DriverResult<()> {
        self.queue.enqueue(command)?;
        metrics::gauge!(metric_defs::QUEUE_PENDING.name).set(self.queue.pending_len() as f64);
        Ok(())
    }

    /// Encoded packet for the next command, if nothing is in flight.
    ///
    /// A command that fails to encode is dropped and the following one is
    /// tried. Releasing a history request clears its category's done flag,
    /// so a flag left over from an earlier batch is never observed.
    pub fn next_outbound(&self) -> Option<Vec<u8>> {
        // Lock order is state then queue
        let mut state = self.state.lock();
        while let Some(command) = self.queue.next_to_send() {
            metrics::gauge!(metric_defs::QUEUE_PENDING.name).set(self.queue.pending_len() as f64);
            match command.to_frame() {
                Ok(packet) => {
                    if let Some(category) = command.history_category() {
                        state.begin_history_load(category);
                    }
                    let label = command_label(command.code());
                    debug!(command = %label, len = packet.len(), "sending");
                    metrics::counter!(metric_defs::COMMANDS_SENT.name, "command" => label).increment(1);
                    return Some(packet);
                }
                Err(err) => {
                    warn!(code = command.code(), "dropping command: {}", err);
                    self.queue.complete_in_flight();
                }
            }
        }
        None
    }

    /// Build the packet for a parameterless command code.
    pub fn build_frame(&self, code: u16) -> DriverResult<Vec<u8>> {
        Ok(Command::request(code)?.to_frame()?)
    }

    /// Build the packet for a command.
    pub fn build_command_frame(&self, command: &Command) -> DriverResult<Vec<u8>> {
        Ok(command.to_frame()?)
    }

    /// Request a history batch.
    ///
    /// The category starts loading when the request is released by
    /// [`PumpSession::next_outbound`].
    pub fn request_history(&self, category: HistoryCategory) -> DriverResult<()> {
        let command = match category {
            HistoryCategory::Events => Command::RequestEvents { from: None },
            _ => Command::RequestHistory(category),
        };
        self.submit(command)?;
        debug!(%category, "history requested");
        Ok(())
    }

    /// Request treatment events newer than `from`.
    pub fn request_events(&self, from: Option<PumpDateTime>) -> DriverResult<()> {
        self.submit(Command::RequestEvents { from })
    }

    /// Return a category to idle without waiting for its batch.
    pub fn reset_history(&self, category: HistoryCategory) {
        self.state.lock().reset_history(category);
    }

    /// Drop every queued command and any partial inbound data.
    ///
    /// Used when the transport is lost. Loading history categories return to
    /// idle. Returns the dropped commands.
    pub fn abandon(&self) -> Vec<Command> {
        let dropped = self.queue.abandon();
        let categories = self.state.lock().abandon_history_loads();
        self.codec.lock().clear();
        metrics::gauge!(metric_defs::QUEUE_PENDING.name).set(0.0);
        if !categories.is_empty() {
            debug!(?categories, "history loads abandoned");
        }
        dropped
    }

    /// Queue a bolus after limiting the amount.
    pub fn bolus(&self, amount: f64) -> DriverResult<Constrained<f64>> {
        let c = self.constrain_bolus(amount);
        self.submit(Command::BolusStart { amount: c.value })?;
        self.state.lock().bolus.begin(c.value);
        Ok(c)
    }

    /// Queue a bolus with a delivery speed after limiting the amount.
    pub fn bolus_with_speed(&self, amount: f64, speed: u8) -> DriverResult<Constrained<f64>> {
        let c = self.constrain_bolus(amount);
        self.submit(Command::BolusStartWithSpeed {
            amount: c.value,
            speed,
        })?;
        self.state.lock().bolus.begin(c.value);
        Ok(c)
    }

    /// Queue a bolus stop.
    pub fn stop_bolus(&self) -> DriverResult<()> {
        self.submit(Command::BolusStop)
    }

    /// Queue a carbohydrate entry after limiting the grams.
    ///
    /// An entry that limits to zero grams is not sent.
    pub fn carbs(&self, time: PumpDateTime, grams: i32) -> DriverResult<Constrained<i32>> {
        let c = self.constraints.apply_carbs(grams);
        count_constrained("carbs", c.was_constrained());
        if c.value <= 0 {
            debug!(requested = grams, "no carbs to record");
            return Ok(c);
        }
        // Non-negative and at most the hard limit after the pipeline
        let grams = u16::try_from(c.value).unwrap_or(0);
        self.submit(Command::SetCarbsEntry { time, grams })?;
        Ok(c)
    }

    /// Queue a temporary basal after limiting it.
    pub fn temp_basal(&self, percent: i32, duration_hours: i32) -> DriverResult<()> {
        let c = self.constraints.apply_temp_basal(percent, duration_hours);
        count_constrained("temp_basal", c.was_constrained());
        self.submit(Command::SetTempBasalStart {
            percent: c.value.percent,
            duration_hours: c.value.duration_hours,
        })
    }

    /// Queue an extended bolus after limiting it.
    pub fn extended_bolus(&self, amount: f64, half_hours: i32) -> DriverResult<()> {
        let limits = DeviceLimits::from_state(&self.state.lock());
        let c = self.constraints.apply_extended_bolus(amount, half_hours, &limits);
        count_constrained("extended_bolus", c.was_constrained());
        self.submit(Command::SetExtendedBolusStart {
            amount: c.value.amount,
            half_hours: c.value.half_hours,
        })
    }

    /// Limit a temporary target. Targets are kept by the host, so nothing is
    /// queued.
    pub fn constrain_temp_target(&self, target: TempTarget) -> Constrained<TempTarget> {
        let c = self.constraints.apply_temp_target(target);
        count_constrained("temp_target", c.was_constrained());
        c
    }

    fn constrain_bolus(&self, amount: f64) -> Constrained<f64> {
        let limits = DeviceLimits::from_state(&self.state.lock());
        let c = self.constraints.apply_bolus(amount, &limits);
        count_constrained("bolus", c.was_constrained());
        c
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Copy of the current pump state.
    pub fn state_snapshot(&self) -> PumpState {
        self.state.lock().clone()
    }

    /// Run a closure with the state locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut PumpState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Remove and return the history records received so far.
    pub fn take_history(&self) -> Vec<HistoryRecord> {
        self.state.lock().take_history()
    }
}

fn count_constrained(value: &'static str, constrained: bool) {
    if constrained {
        metrics::counter!(metric_defs::CONSTRAINTS_APPLIED.name, "value" => value).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danar_protocol::*;

    #[test]
    fn test_history_command_settles_on_batch_complete() {
        let session = PumpSession::new(DriverConfig::default());
        session.request_history(HistoryCategory::Alarm).unwrap();
        assert!(session.next_outbound().is_some());

        let record = [RECORD_TYPE_ALARM, 0x24, 0x03, 0x05, 0x12, 0x00, 0x00, 0, 0x00, 0x64];
        session.on_frame_received(CMD_HISTORY_ALARM, &record).unwrap();
        assert!(session.queue().in_flight().is_some());

        let event = session.on_frame_received(CMD_HISTORY_ALARM, &[0xFF]).unwrap();
        assert_eq!(event, Some(PumpEvent::HistoryBatchComplete(HistoryCategory::Alarm)));
        assert!(session.queue().is_idle());
    }

    #[test]
    fn test_history_loads_when_request_is_sent() {
        let session = PumpSession::new(DriverConfig::default());
        session.request_history(HistoryCategory::Refill).unwrap();
        session.request_history(HistoryCategory::Alarm).unwrap();
        assert_eq!(
            session.with_state(|s| s.history_state(HistoryCategory::Alarm)),
            LoadState::Idle
        );

        session.next_outbound().unwrap();
        assert_eq!(
            session.with_state(|s| s.active_history()),
            Some(HistoryCategory::Refill)
        );
        assert_eq!(
            session.with_state(|s| s.history_state(HistoryCategory::Alarm)),
            LoadState::Idle
        );
    }

    #[test]
    fn test_malformed_frame_is_reported() {
        let session = PumpSession::new(DriverConfig::default());
        let before = session.state_snapshot();
        assert!(session.on_frame_received(CMD_HISTORY_GLUCOSE, &[]).is_err());
        assert_eq!(session.state_snapshot(), before);
    }

    #[test]
    fn test_build_frame() {
        let session = PumpSession::new(DriverConfig::default());
        let packet = session.build_frame(CMD_CONNECT).unwrap();
        assert_eq!(parse_packet(&packet).unwrap().command, CMD_CONNECT);
        assert!(session.build_frame(CMD_MEALINS_START_DATA).is_err());
    }
}
