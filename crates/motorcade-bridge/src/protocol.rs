//! Session wire protocol.
//!
//! Message records, the tri-state operation outcome, and the fault taxonomy
//! shared by the engine, the channels, and the reference client.
//!
//! The session is strictly ordered: both peers always know which record the
//! next frame carries, so records go on the wire untagged. One episode runs
//!
//! 1. `EpisodeRequest` (client → server)
//! 2. `SceneDescription` (server → client)
//! 3. `EpisodeStart` (client → server)
//! 4. `EpisodeReady` (server → client)
//! 5. tick loop: `ControlCommand` (client → server), then
//!    `MeasurementsSnapshot` (server → client)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use motorcade_core::types::DriveInputs;

use crate::codec::{WireAgent, WireImage, WireTransform};

/// Maximum frame payload size (16 MiB). Inbound frames above this are
/// rejected before deserialization.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Faults raised by a channel while moving frames.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Peer disconnected")]
    Disconnected,

    #[error("No client connected within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Channel is not connected")]
    NotConnected,

    #[error("No data within the wait window")]
    TimedOut,
}

/// Faults that end a session: a transport failure or a protocol-order
/// violation by the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Operation {operation} out of order in phase {phase:?} (expected one of {expected:?})")]
    OutOfOrder {
        operation: Operation,
        phase: SessionPhase,
        expected: &'static [Operation],
    },
}

// ---------------------------------------------------------------------------
// Operations and phases
// ---------------------------------------------------------------------------

/// The seven protocol operations, in handshake order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    ReadNewEpisode,
    SendSceneDescription,
    ReadEpisodeStart,
    SendEpisodeReady,
    ReadControl,
    SendMeasurements,
}

impl Operation {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ReadNewEpisode => "read_new_episode",
            Self::SendSceneDescription => "send_scene_description",
            Self::ReadEpisodeStart => "read_episode_start",
            Self::SendEpisodeReady => "send_episode_ready",
            Self::ReadControl => "read_control",
            Self::SendMeasurements => "send_measurements",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the session currently stands. Strictly forward-moving within an
/// episode; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    AwaitingEpisodeRequest,
    AwaitingSceneAck,
    AwaitingEpisodeStart,
    AwaitingReady,
    TickLoop,
    Failed,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Tri-state result of one protocol operation.
///
/// `TryAgain` is the expected, recoverable no-data case of a non-blocking
/// call; `Error` carries a session-ending fault.
#[must_use]
#[derive(Debug)]
pub enum Outcome<T = ()> {
    Success(T),
    TryAgain,
    Error(SessionError),
}

impl<T> Outcome<T> {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub const fn is_try_again(&self) -> bool {
        matches!(self, Self::TryAgain)
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Map the success value, preserving the other two states.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::TryAgain => Outcome::TryAgain,
            Self::Error(e) => Outcome::Error(e),
        }
    }

    /// View as a `Result`, with `TryAgain` as `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>, SessionError> {
        match self {
            Self::Success(value) => Ok(Some(value)),
            Self::TryAgain => Ok(None),
            Self::Error(e) => Err(e),
        }
    }

    /// Map a channel read to the tri-state: data is success, an empty wait
    /// window is try-again, a fault is an error.
    pub fn from_read(result: Result<Option<T>, TransportError>) -> Self {
        match result {
            Ok(Some(value)) => Self::Success(value),
            Ok(None) => Self::TryAgain,
            Err(e) => Self::Error(e.into()),
        }
    }
}

impl Outcome<()> {
    /// Map a channel write to the tri-state. A full outbound buffer on a
    /// zero-wait write is try-again, any other fault is an error.
    pub fn from_write(result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => Self::Success(()),
            Err(TransportError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Self::TryAgain
            }
            Err(e) => Self::Error(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake records
// ---------------------------------------------------------------------------

/// Opens an episode: an opaque configuration blob for the settings sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRequest {
    pub config_text: String,
}

/// The spawn points a client may choose from, in selection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub spawn_points: Vec<WireTransform>,
}

/// The client's chosen spawn point index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeStart {
    pub spawn_point_index: u32,
}

/// Server readiness signal. Always carries `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeReady {
    pub ready: bool,
}

// ---------------------------------------------------------------------------
// Tick records
// ---------------------------------------------------------------------------

/// One tick's control command. `autopilot: true` hands the wheel to the
/// simulation; otherwise the five manual inputs apply as a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub autopilot: bool,
    pub steer: f32,
    pub throttle: f32,
    pub brake: f32,
    pub hand_brake: bool,
    pub reverse: bool,
}

impl ControlCommand {
    /// The manual input set carried by this command.
    #[must_use]
    pub const fn drive_inputs(&self) -> DriveInputs {
        DriveInputs {
            steer: self.steer,
            throttle: self.throttle,
            brake: self.brake,
            hand_brake: self.hand_brake,
            reverse: self.reverse,
        }
    }
}

/// Player kinematics and episode scalars, in wire field names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerMeasurements {
    pub transform: WireTransform,
    pub acceleration: crate::codec::WireVector3,
    pub forward_speed: f32,
    pub collision_vehicles: f32,
    pub collision_pedestrians: f32,
    pub collision_other: f32,
    pub intersection_otherlane: f32,
    pub intersection_offroad: f32,
}

/// One tick's full snapshot. Image pixel buffers are borrowed from the
/// capture side; the snapshot must not outlive the write call that sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementsSnapshot<'a> {
    pub platform_timestamp: u32,
    pub game_timestamp: u32,
    pub player: PlayerMeasurements,
    pub agents: Vec<WireAgent>,
    pub images: Vec<WireImage<'a>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Outcome ----

    #[test]
    fn outcome_predicates() {
        assert!(Outcome::Success(5).is_success());
        assert!(Outcome::<u32>::TryAgain.is_try_again());
        assert!(Outcome::<u32>::Error(TransportError::Disconnected.into()).is_error());
    }

    #[test]
    fn outcome_map_preserves_state() {
        let doubled = Outcome::Success(21).map(|v| v * 2);
        assert!(matches!(doubled, Outcome::Success(42)));
        let still_try_again = Outcome::<u32>::TryAgain.map(|v| v * 2);
        assert!(still_try_again.is_try_again());
    }

    #[test]
    fn outcome_from_read_mapping() {
        assert!(Outcome::from_read(Ok(Some(1))).is_success());
        assert!(Outcome::<i32>::from_read(Ok(None)).is_try_again());
        assert!(Outcome::<i32>::from_read(Err(TransportError::Disconnected)).is_error());
    }

    #[test]
    fn outcome_from_write_mapping() {
        assert!(Outcome::from_write(Ok(())).is_success());
        let would_block = std::io::Error::new(std::io::ErrorKind::WouldBlock, "full");
        assert!(Outcome::from_write(Err(would_block.into())).is_try_again());
        assert!(Outcome::from_write(Err(TransportError::Disconnected)).is_error());
    }

    #[test]
    fn outcome_into_result() {
        assert_eq!(Outcome::Success(3).into_result().unwrap(), Some(3));
        assert_eq!(Outcome::<i32>::TryAgain.into_result().unwrap(), None);
        assert!(
            Outcome::<i32>::Error(TransportError::Disconnected.into())
                .into_result()
                .is_err()
        );
    }

    // ---- Operations ----

    #[test]
    fn operation_names_are_snake_case() {
        assert_eq!(Operation::Connect.to_string(), "connect");
        assert_eq!(Operation::ReadNewEpisode.to_string(), "read_new_episode");
        assert_eq!(
            Operation::SendMeasurements.to_string(),
            "send_measurements"
        );
    }

    // ---- Errors ----

    #[test]
    fn session_error_from_transport() {
        let err: SessionError = TransportError::Disconnected.into();
        assert!(matches!(err, SessionError::Transport(_)));
        assert!(err.to_string().contains("Peer disconnected"));
    }

    #[test]
    fn out_of_order_display_names_the_operation() {
        let err = SessionError::OutOfOrder {
            operation: Operation::ReadEpisodeStart,
            phase: SessionPhase::AwaitingSceneAck,
            expected: &[Operation::SendSceneDescription],
        };
        let msg = err.to_string();
        assert!(msg.contains("read_episode_start"));
        assert!(msg.contains("AwaitingSceneAck"));
    }

    #[test]
    fn payload_too_large_display() {
        let err = TransportError::PayloadTooLarge {
            size: 20,
            max: 10,
        };
        assert_eq!(err.to_string(), "Message size 20 exceeds maximum 10");
    }

    // ---- Records ----

    #[test]
    fn episode_request_roundtrip() {
        let req = EpisodeRequest {
            config_text: "[server]\nport = 2000\n".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let req2: EpisodeRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, req2);
    }

    #[test]
    fn episode_start_field_name() {
        let json = r#"{"spawn_point_index":4}"#;
        let start: EpisodeStart = serde_json::from_str(json).unwrap();
        assert_eq!(start.spawn_point_index, 4);
    }

    #[test]
    fn control_command_is_flat() {
        let json = r#"{"autopilot":false,"steer":-0.25,"throttle":1.0,"brake":0.0,"hand_brake":false,"reverse":true}"#;
        let cmd: ControlCommand = serde_json::from_str(json).unwrap();
        assert!(!cmd.autopilot);
        assert!((cmd.steer - (-0.25)).abs() < f32::EPSILON);
        assert!(cmd.reverse);
        let inputs = cmd.drive_inputs();
        assert!((inputs.throttle - 1.0).abs() < f32::EPSILON);
        assert!(inputs.reverse);
    }

    #[test]
    fn control_command_default_is_neutral_manual() {
        let cmd = ControlCommand::default();
        assert!(!cmd.autopilot);
        assert_eq!(cmd.drive_inputs(), DriveInputs::default());
    }
}
