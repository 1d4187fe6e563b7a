//! Session order enforcement.
//!
//! [`SessionStateMachine`] tracks the current [`SessionPhase`] and validates
//! each operation before the engine performs it. The protocol is strictly
//! ordered, so every phase admits exactly the operations due next.
//!
//! Validation and transition are split: [`on_operation`] only checks, and
//! [`advance`] commits once the operation actually completed. A try-again
//! therefore never moves the phase.
//!
//! [`on_operation`]: SessionStateMachine::on_operation
//! [`advance`]: SessionStateMachine::advance

use crate::protocol::{Operation, SessionError, SessionPhase};

/// Tracks the session phase and enforces operation order.
///
/// # Example
///
/// ```
/// use motorcade_bridge::protocol::SessionPhase;
/// use motorcade_bridge::state_machine::SessionStateMachine;
///
/// let sm = SessionStateMachine::new();
/// assert_eq!(sm.phase(), SessionPhase::Disconnected);
/// ```
#[derive(Debug)]
pub struct SessionStateMachine {
    phase: SessionPhase,
}

impl SessionStateMachine {
    /// Create a state machine in the
    /// [`Disconnected`](SessionPhase::Disconnected) phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
        }
    }

    /// Current session phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Validate an operation against the current phase without moving it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OutOfOrder`] naming the phase and the
    /// operations it admits. The phase is unchanged on failure.
    pub fn on_operation(&self, operation: Operation) -> Result<(), SessionError> {
        let expected = Self::allowed(self.phase);
        if expected.contains(&operation) {
            return Ok(());
        }
        Err(SessionError::OutOfOrder {
            operation,
            phase: self.phase,
            expected,
        })
    }

    /// Commit a completed operation, moving to the next phase. The tick
    /// operations keep the session in the tick loop.
    pub const fn advance(&mut self, operation: Operation) {
        self.phase = match operation {
            Operation::Connect => SessionPhase::AwaitingEpisodeRequest,
            Operation::ReadNewEpisode => SessionPhase::AwaitingSceneAck,
            Operation::SendSceneDescription => SessionPhase::AwaitingEpisodeStart,
            Operation::ReadEpisodeStart => SessionPhase::AwaitingReady,
            Operation::SendEpisodeReady
            | Operation::ReadControl
            | Operation::SendMeasurements => SessionPhase::TickLoop,
        };
    }

    /// Enter the terminal failed phase; no operation is admitted after this.
    pub const fn enter_failed(&mut self) {
        self.phase = SessionPhase::Failed;
    }

    /// Operations admitted in the given phase.
    const fn allowed(phase: SessionPhase) -> &'static [Operation] {
        match phase {
            SessionPhase::Disconnected => &[Operation::Connect],
            SessionPhase::AwaitingEpisodeRequest => &[Operation::ReadNewEpisode],
            SessionPhase::AwaitingSceneAck => &[Operation::SendSceneDescription],
            SessionPhase::AwaitingEpisodeStart => &[Operation::ReadEpisodeStart],
            SessionPhase::AwaitingReady => &[Operation::SendEpisodeReady],
            SessionPhase::TickLoop => &[Operation::ReadControl, Operation::SendMeasurements],
            SessionPhase::Failed => &[],
        }
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_starts_disconnected() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn default_starts_disconnected() {
        let sm = SessionStateMachine::default();
        assert_eq!(sm.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn connect_is_the_only_opening_operation() {
        let sm = SessionStateMachine::new();
        sm.on_operation(Operation::Connect).unwrap();
        for operation in [
            Operation::ReadNewEpisode,
            Operation::SendSceneDescription,
            Operation::ReadEpisodeStart,
            Operation::SendEpisodeReady,
            Operation::ReadControl,
            Operation::SendMeasurements,
        ] {
            assert!(sm.on_operation(operation).is_err());
        }
    }

    #[test]
    fn handshake_advances_in_order() {
        let mut sm = SessionStateMachine::new();

        sm.on_operation(Operation::Connect).unwrap();
        sm.advance(Operation::Connect);
        assert_eq!(sm.phase(), SessionPhase::AwaitingEpisodeRequest);

        sm.on_operation(Operation::ReadNewEpisode).unwrap();
        sm.advance(Operation::ReadNewEpisode);
        assert_eq!(sm.phase(), SessionPhase::AwaitingSceneAck);

        sm.on_operation(Operation::SendSceneDescription).unwrap();
        sm.advance(Operation::SendSceneDescription);
        assert_eq!(sm.phase(), SessionPhase::AwaitingEpisodeStart);

        sm.on_operation(Operation::ReadEpisodeStart).unwrap();
        sm.advance(Operation::ReadEpisodeStart);
        assert_eq!(sm.phase(), SessionPhase::AwaitingReady);

        sm.on_operation(Operation::SendEpisodeReady).unwrap();
        sm.advance(Operation::SendEpisodeReady);
        assert_eq!(sm.phase(), SessionPhase::TickLoop);
    }

    #[test]
    fn tick_operations_stay_in_tick_loop() {
        let mut sm = tick_loop_sm();

        sm.on_operation(Operation::ReadControl).unwrap();
        sm.advance(Operation::ReadControl);
        assert_eq!(sm.phase(), SessionPhase::TickLoop);

        sm.on_operation(Operation::SendMeasurements).unwrap();
        sm.advance(Operation::SendMeasurements);
        assert_eq!(sm.phase(), SessionPhase::TickLoop);
    }

    #[test]
    fn tick_loop_rejects_handshake_operations() {
        let sm = tick_loop_sm();
        assert!(sm.on_operation(Operation::Connect).is_err());
        assert!(sm.on_operation(Operation::ReadNewEpisode).is_err());
        assert!(sm.on_operation(Operation::SendEpisodeReady).is_err());
    }

    #[test]
    fn violation_leaves_phase_unchanged() {
        let sm = SessionStateMachine::new();
        let err = sm.on_operation(Operation::ReadControl).unwrap_err();
        assert!(matches!(err, SessionError::OutOfOrder { .. }));
        assert_eq!(sm.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn out_of_order_error_names_the_expected_operations() {
        let mut sm = SessionStateMachine::new();
        sm.advance(Operation::ReadNewEpisode);
        assert_eq!(sm.phase(), SessionPhase::AwaitingSceneAck);

        let err = sm.on_operation(Operation::ReadEpisodeStart).unwrap_err();
        let SessionError::OutOfOrder {
            operation,
            phase,
            expected,
        } = err
        else {
            panic!("expected OutOfOrder");
        };
        assert_eq!(operation, Operation::ReadEpisodeStart);
        assert_eq!(phase, SessionPhase::AwaitingSceneAck);
        assert_eq!(expected, &[Operation::SendSceneDescription]);
    }

    #[test]
    fn failed_rejects_everything() {
        let mut sm = tick_loop_sm();
        sm.enter_failed();
        assert_eq!(sm.phase(), SessionPhase::Failed);
        assert!(sm.on_operation(Operation::Connect).is_err());
        assert!(sm.on_operation(Operation::ReadControl).is_err());
        assert!(sm.on_operation(Operation::SendMeasurements).is_err());
    }

    // --- Helpers ---

    fn tick_loop_sm() -> SessionStateMachine {
        let mut sm = SessionStateMachine::new();
        for operation in [
            Operation::Connect,
            Operation::ReadNewEpisode,
            Operation::SendSceneDescription,
            Operation::ReadEpisodeStart,
            Operation::SendEpisodeReady,
        ] {
            sm.on_operation(operation).unwrap();
            sm.advance(operation);
        }
        assert_eq!(sm.phase(), SessionPhase::TickLoop);
        sm
    }
}
