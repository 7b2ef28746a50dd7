//! Command code to handler lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::*;
use crate::events::PumpEvent;
use crate::handlers::{Handler, MessageHandler, NoopHandler};
use crate::state::PumpState;

/// Maps command codes to their inbound handlers.
///
/// Built once at startup, then shared read-only. Unknown codes resolve to a
/// [`NoopHandler`] so unrecognised frames are dropped quietly.
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    handlers: HashMap<u16, Arc<dyn MessageHandler>>,
    fallback: Arc<dyn MessageHandler>,
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        MessageRegistry {
            handlers: HashMap::new(),
            fallback: Arc::new(NoopHandler),
        }
    }

    /// Create a registry holding every built-in handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for handler in Handler::all() {
            registry.register(handler);
        }
        registry
    }

    /// Register a handler under its own command code.
    ///
    /// Replaces and returns any handler already registered for that code.
    pub fn register<H>(&mut self, handler: H) -> Option<Arc<dyn MessageHandler>>
    where
        H: MessageHandler + 'static,
    {
        self.register_arc(Arc::new(handler))
    }

    /// Register an already shared handler.
    pub fn register_arc(&mut self, handler: Arc<dyn MessageHandler>) -> Option<Arc<dyn MessageHandler>> {
        let code = handler.command();
        let previous = self.handlers.insert(code, handler);
        if let Some(previous) = &previous {
            log::debug!("replaced handler {} for 0x{:04X}", previous.name(), code);
        }
        previous
    }

    /// Handler for a command code, or the no-op fallback.
    pub fn resolve(&self, code: u16) -> &dyn MessageHandler {
        match self.handlers.get(&code) {
            Some(handler) => handler.as_ref(),
            None => self.fallback.as_ref(),
        }
    }

    /// Whether a handler is registered for a code.
    pub fn contains(&self, code: u16) -> bool {
        self.handlers.contains_key(&code)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered codes, sorted.
    pub fn codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.handlers.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Resolve and decode one inbound message.
    ///
    /// The payload length is checked against the handler's minimum before
    /// decoding; a short payload returns [`ProtocolError::FrameTooShort`] and
    /// leaves `state` untouched.
    pub fn dispatch(
        &self,
        command: u16,
        payload: &[u8],
        state: &mut PumpState,
    ) -> ProtocolResult<Option<PumpEvent>> {
        if !self.contains(command) {
            log::trace!("ignoring unknown command 0x{:04X} ({} bytes)", command, payload.len());
        }
        let handler = self.resolve(command);

        let min = handler.min_payload_len();
        if payload.len() < min {
            return Err(ProtocolError::FrameTooShort {
                command,
                expected: min,
                actual: payload.len(),
            });
        }

        handler.decode(payload, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::history::HistoryCategory;

    #[derive(Debug)]
    struct CountingHandler;

    impl MessageHandler for CountingHandler {
        fn command(&self) -> u16 {
            CMD_SETTING_V_PROFILE_NUMBER
        }

        fn name(&self) -> &'static str {
            "counting"
        }

        fn min_payload_len(&self) -> usize {
            0
        }

        fn decode(&self, _payload: &[u8], state: &mut PumpState) -> ProtocolResult<Option<PumpEvent>> {
            state.active_profile += 1;
            Ok(None)
        }
    }

    #[test]
    fn test_with_defaults_covers_all_handlers() {
        let registry = MessageRegistry::with_defaults();
        assert_eq!(registry.len(), Handler::all().len());
        assert!(registry.contains(CMD_HISTORY_GLUCOSE));
        assert!(registry.contains(CMD_PUMP_CHECK_VALUE));
        assert_eq!(registry.resolve(CMD_HISTORY_DONE).name(), "history_done");
    }

    #[test]
    fn test_unknown_code_is_noop() {
        let registry = MessageRegistry::with_defaults();
        let mut state = PumpState::new();
        let before = state.clone();
        assert_eq!(registry.resolve(0xBEEF).name(), "unknown");
        assert_eq!(registry.dispatch(0xBEEF, &[0xFF; 32], &mut state).unwrap(), None);
        assert_eq!(state, before);
    }

    #[test]
    fn test_register_overrides() {
        let mut registry = MessageRegistry::with_defaults();
        let previous = registry.register(CountingHandler);
        assert_eq!(previous.map(|h| h.name()), Some("setting_active_profile"));

        let mut state = PumpState::new();
        registry.dispatch(CMD_SETTING_V_PROFILE_NUMBER, &[], &mut state).unwrap();
        assert_eq!(state.active_profile, 1);
    }

    #[test]
    fn test_dispatch_checks_length_first() {
        let registry = MessageRegistry::with_defaults();
        let mut state = PumpState::new();
        state.begin_history_load(HistoryCategory::Glucose);
        let before = state.clone();
        assert_eq!(
            registry.dispatch(CMD_HISTORY_GLUCOSE, &[], &mut state),
            Err(ProtocolError::FrameTooShort {
                command: CMD_HISTORY_GLUCOSE,
                expected: 1,
                actual: 0,
            })
        );
        assert_eq!(state, before);
    }
}
