//! Outbound command queue.
//!
//! The pump processes one command at a time. Commands wait in FIFO order until
//! the in-flight command is answered, then the next one is released.

use std::collections::VecDeque;

use danar_protocol::Command;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{DriverError, DriverResult};

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<Command>,
    in_flight: Option<Command>,
}

/// Single in-flight command queue.
#[derive(Debug)]
pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    max_pending: usize,
}

impl CommandQueue {
    /// Create a queue holding at most `max_pending` waiting commands.
    pub fn new(max_pending: usize) -> Self {
        CommandQueue {
            inner: Mutex::new(QueueInner::default()),
            max_pending,
        }
    }

    /// Configured limit on waiting commands.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Add a command behind everything already queued.
    pub fn enqueue(&self, command: Command) -> DriverResult<()> {
        let mut inner = self.inner.lock();
        if inner.pending.len() >= self.max_pending {
            return Err(DriverError::QueueFull {
                max_pending: self.max_pending,
            });
        }
        trace!(code = command.code(), pending = inner.pending.len(), "command queued");
        inner.pending.push_back(command);
        Ok(())
    }

    /// Release the next command if nothing is in flight.
    pub fn next_to_send(&self) -> Option<Command> {
        let mut inner = self.inner.lock();
        if inner.in_flight.is_some() {
            return None;
        }
        let command = inner.pending.pop_front()?;
        inner.in_flight = Some(command.clone());
        Some(command)
    }

    /// Finish the in-flight command if its code matches the response.
    pub fn complete(&self, code: u16) -> Option<Command> {
        let mut inner = self.inner.lock();
        let answered = inner
            .in_flight
            .as_ref()
            .is_some_and(|command| command.code() == code);
        if !answered {
            return None;
        }
        debug!(code, "command answered");
        inner.in_flight.take()
    }

    /// Finish the in-flight command regardless of code.
    pub fn complete_in_flight(&self) -> Option<Command> {
        self.inner.lock().in_flight.take()
    }

    /// The command awaiting a response.
    pub fn in_flight(&self) -> Option<Command> {
        self.inner.lock().in_flight.clone()
    }

    /// Drop everything. Returns the in-flight command first, then the
    /// waiting ones in order.
    pub fn abandon(&self) -> Vec<Command> {
        let mut inner = self.inner.lock();
        let mut dropped: Vec<Command> = inner.in_flight.take().into_iter().collect();
        dropped.extend(inner.pending.drain(..));
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "commands abandoned");
        }
        dropped
    }

    /// Commands waiting behind the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.in_flight.is_none() && inner.pending.is_empty()
    }
}
