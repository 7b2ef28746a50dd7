//! DanaR Pump Serial Protocol
//!
//! This crate provides types and utilities for talking to DanaR insulin pumps
//! over their binary serial protocol. Every message is a packet carrying a
//! 16-bit command code and a fixed-layout payload.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → pump): built from [`Command`] and wrapped in the
//!   packet envelope by [`FrameCodec`]
//! - **Messages** (pump → host): extracted by [`FrameCodec`], then decoded
//!   into [`PumpState`] by the [`Handler`] that [`MessageRegistry`] resolves
//!   for the command code
//! - **History**: requested per [`HistoryCategory`]; the pump streams one
//!   record per message and ends the batch with a terminal marker
//!
//! Decoding is synchronous and never blocks. Handlers emit [`PumpEvent`]s for
//! the application layer (history batch complete, device errors, bolus
//! progress).
//!
//! # Example
//!
//! ```rust,ignore
//! use danar_protocol::{Command, FrameCodec, MessageRegistry, PumpState};
//!
//! let registry = MessageRegistry::with_defaults();
//! let mut state = PumpState::new();
//!
//! // Build a command
//! let packet = Command::BolusStart { amount: 1.5 }.to_frame()?;
//!
//! // Decode what comes back
//! let mut codec = FrameCodec::new();
//! codec.push(&received);
//! while let Some(frame) = codec.decode()? {
//!     let event = registry.dispatch(frame.command, &frame.payload, &mut state)?;
//! }
//! ```

mod codec;
mod commands;
mod constants;
mod error;
mod events;
mod frame;
mod handlers;
mod history;
mod registry;
mod state;
mod types;

pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use events::*;
pub use frame::*;
pub use handlers::*;
pub use history::*;
pub use registry::*;
pub use state::*;
pub use types::*;
