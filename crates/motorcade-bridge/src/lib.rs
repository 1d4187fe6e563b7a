//! Session protocol bridge between a real-time simulation and its client.
//!
//! This crate provides the communication layer between a simulation host and
//! an external control client:
//!
//! - [`protocol`] — wire records, the tri-state [`Outcome`], and the fault
//!   taxonomy
//! - [`codec`] — conversions from simulation values to wire records
//! - [`framing`] — length-prefixed JSON wire format (4-byte LE `u32` +
//!   payload)
//! - [`channel`] — the [`Channel`] transport seam, over TCP or in-process
//!   queues
//! - [`state_machine`] — [`SessionStateMachine`] enforcing session order
//! - [`engine`] — [`SessionEngine`], the protocol operations a driver calls
//! - [`server`] — the [`run_session`] episode driver and [`BridgeServer`]
//! - [`client`] — [`BridgeClient`], the reference client half
//!
//! One episode runs connect, a four-message handshake (episode request,
//! scene description, episode start, ready), then a control/measurements
//! tick loop until the client disconnects.

pub mod channel;
pub mod client;
pub mod codec;
pub mod engine;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod state_machine;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use channel::{Channel, MemoryChannel, TcpChannel};
pub use client::BridgeClient;
pub use engine::SessionEngine;
pub use protocol::{
    MAX_MESSAGE_SIZE, Operation, Outcome, SessionError, SessionPhase, TransportError,
};
pub use server::{BridgeServer, EndReason, SessionOptions, SessionSummary, run_session};
pub use state_machine::SessionStateMachine;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        BridgeClient, BridgeServer, Channel, MemoryChannel, SessionEngine, SessionStateMachine,
        TcpChannel,
        protocol::{
            ControlCommand, EpisodeReady, EpisodeRequest, EpisodeStart, MeasurementsSnapshot,
            Operation, Outcome, PlayerMeasurements, SceneDescription, SessionError, SessionPhase,
            TransportError,
        },
        server::{EndReason, SessionOptions, SessionSummary, run_session},
    };
}
