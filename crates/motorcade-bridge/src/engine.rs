//! Session engine: the protocol operations a simulation driver calls.
//!
//! [`SessionEngine`] owns one channel and the session state machine, and
//! exposes the protocol as seven operations returning the tri-state
//! [`Outcome`]. Each operation validates its place in the session order,
//! performs exactly one read or write, and only then advances the phase, so
//! a try-again can be re-issued without disturbing the session.
//!
//! The `blocking` flag picks the wait window: the full session timeout, or
//! zero for a poll that never stalls the caller's frame. Connecting always
//! waits the full timeout regardless.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use motorcade_core::traits::{PlayerView, SettingsSink, VehicleController, WorldView};
use motorcade_core::types::Transform;

use crate::channel::Channel;
use crate::codec::{AgentKind, WireImage, push_agents, wire_image, wire_transform, wire_vector3};
use crate::protocol::{
    ControlCommand, EpisodeReady, EpisodeRequest, EpisodeStart, MeasurementsSnapshot, Operation,
    Outcome, PlayerMeasurements, SceneDescription, SessionPhase,
};
use crate::state_machine::SessionStateMachine;

/// Protocol operations over one channel, in enforced session order.
#[derive(Debug)]
pub struct SessionEngine<C: Channel> {
    channel: C,
    timeout: Duration,
    state: SessionStateMachine,
}

impl<C: Channel> SessionEngine<C> {
    /// Wrap a channel. `timeout` bounds blocking operations and the
    /// committed remainder of partially arrived frames.
    #[must_use]
    pub fn new(channel: C, timeout: Duration) -> Self {
        Self {
            channel,
            timeout,
            state: SessionStateMachine::new(),
        }
    }

    /// Current session phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// The session timeout this engine was built with.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    const fn wait_for(&self, blocking: bool) -> Duration {
        if blocking { self.timeout } else { Duration::ZERO }
    }

    /// Advance or fail the state machine to match a completed operation.
    fn finish<T>(&mut self, operation: Operation, outcome: Outcome<T>) -> Outcome<T> {
        match &outcome {
            Outcome::Success(_) => self.state.advance(operation),
            Outcome::Error(_) => self.state.enter_failed(),
            Outcome::TryAgain => {}
        }
        outcome
    }

    fn read_record<T: DeserializeOwned>(&mut self, blocking: bool) -> Outcome<T> {
        Outcome::from_read(self.channel.read(self.wait_for(blocking)))
    }

    fn write_record<T: Serialize>(&mut self, record: &T, blocking: bool) -> Outcome {
        Outcome::from_write(self.channel.write(record, self.wait_for(blocking)))
    }

    // -----------------------------------------------------------------------
    // Handshake operations
    // -----------------------------------------------------------------------

    /// Wait for a client to connect. Always waits the full session timeout;
    /// there is no frame to protect before a client exists.
    pub fn connect(&mut self) -> Outcome {
        if let Err(e) = self.state.on_operation(Operation::Connect) {
            return Outcome::Error(e);
        }
        info!("waiting for the client to connect");
        let outcome = match self.channel.connect(self.timeout) {
            Ok(()) => Outcome::Success(()),
            Err(e) => Outcome::Error(e.into()),
        };
        self.finish(Operation::Connect, outcome)
    }

    /// Read the client's episode request and hand its configuration text to
    /// the sink. The sink decides what malformed text means.
    pub fn read_new_episode(&mut self, sink: &mut dyn SettingsSink, blocking: bool) -> Outcome {
        if let Err(e) = self.state.on_operation(Operation::ReadNewEpisode) {
            return Outcome::Error(e);
        }
        let outcome = match self.read_record::<EpisodeRequest>(blocking) {
            Outcome::Success(request) => {
                info!("received new episode");
                debug!(config = %request.config_text, "episode configuration");
                sink.load_text(&request.config_text);
                Outcome::Success(())
            }
            Outcome::TryAgain => Outcome::TryAgain,
            Outcome::Error(e) => Outcome::Error(e),
        };
        self.finish(Operation::ReadNewEpisode, outcome)
    }

    /// Send the spawn points the client may choose from. An empty scene is
    /// legal and sends an empty list.
    pub fn send_scene_description(
        &mut self,
        spawn_points: &[Transform],
        blocking: bool,
    ) -> Outcome {
        if let Err(e) = self.state.on_operation(Operation::SendSceneDescription) {
            return Outcome::Error(e);
        }
        let scene = SceneDescription {
            spawn_points: spawn_points.iter().map(wire_transform).collect(),
        };
        info!(
            count = scene.spawn_points.len(),
            "sending available start positions"
        );
        let outcome = self.write_record(&scene, blocking);
        self.finish(Operation::SendSceneDescription, outcome)
    }

    /// Read the client's chosen spawn point index.
    pub fn read_episode_start(&mut self, blocking: bool) -> Outcome<u32> {
        if let Err(e) = self.state.on_operation(Operation::ReadEpisodeStart) {
            return Outcome::Error(e);
        }
        let outcome = self.read_record::<EpisodeStart>(blocking);
        if let Outcome::Success(start) = &outcome {
            info!(index = start.spawn_point_index, "episode start received");
        }
        self.finish(Operation::ReadEpisodeStart, outcome)
            .map(|start| start.spawn_point_index)
    }

    /// Tell the client the episode is in place. The signal always carries
    /// `true`; a server that is not ready sends nothing instead.
    pub fn send_episode_ready(&mut self, blocking: bool) -> Outcome {
        if let Err(e) = self.state.on_operation(Operation::SendEpisodeReady) {
            return Outcome::Error(e);
        }
        info!("ready to play, notifying client");
        let outcome = self.write_record(&EpisodeReady { ready: true }, blocking);
        self.finish(Operation::SendEpisodeReady, outcome)
    }

    // -----------------------------------------------------------------------
    // Tick operations
    // -----------------------------------------------------------------------

    /// Read one control command and apply it to the vehicle controller.
    ///
    /// The autopilot flag is always forwarded. Manual inputs apply as one
    /// unit, and only to a possessed vehicle.
    ///
    /// # Panics
    ///
    /// Panics if a manual command arrives while no vehicle is possessed;
    /// that is a driver wiring bug, not a client error.
    pub fn read_control(
        &mut self,
        controller: &mut dyn VehicleController,
        blocking: bool,
    ) -> Outcome {
        if let Err(e) = self.state.on_operation(Operation::ReadControl) {
            return Outcome::Error(e);
        }
        let outcome = match self.read_record::<ControlCommand>(blocking) {
            Outcome::Success(command) => {
                controller.set_autopilot(command.autopilot);
                if !command.autopilot {
                    assert!(
                        controller.is_possessing_vehicle(),
                        "manual control requires a possessed vehicle"
                    );
                    let inputs = command.drive_inputs();
                    debug!(
                        steer = inputs.steer,
                        throttle = inputs.throttle,
                        brake = inputs.brake,
                        hand_brake = inputs.hand_brake,
                        reverse = inputs.reverse,
                        "applying manual control"
                    );
                    controller.apply_inputs(&inputs);
                }
                Outcome::Success(())
            }
            Outcome::TryAgain => {
                if !blocking {
                    warn!("no control received from the client this frame");
                }
                Outcome::TryAgain
            }
            Outcome::Error(e) => Outcome::Error(e),
        };
        self.finish(Operation::ReadControl, outcome)
    }

    /// Assemble and send one measurements snapshot: timestamps and player
    /// state, then non-player agents when requested, then images. The
    /// snapshot goes out as a single frame.
    pub fn send_measurements(
        &mut self,
        world: &dyn WorldView,
        player: &dyn PlayerView,
        include_agents: bool,
        blocking: bool,
    ) -> Outcome {
        if let Err(e) = self.state.on_operation(Operation::SendMeasurements) {
            return Outcome::Error(e);
        }

        let platform_timestamp = player.platform_timestamp();
        let game_timestamp = player.game_timestamp();
        let measurements = PlayerMeasurements {
            transform: wire_transform(&player.transform()),
            acceleration: wire_vector3(player.acceleration()),
            forward_speed: player.forward_speed(),
            collision_vehicles: player.collision_vehicles(),
            collision_pedestrians: player.collision_pedestrians(),
            collision_other: player.collision_other(),
            intersection_otherlane: player.intersection_other_lane(),
            intersection_offroad: player.intersection_off_road(),
        };

        let mut agents = Vec::new();
        if include_agents {
            push_agents(&mut agents, world.walkers(), AgentKind::Pedestrian);
            push_agents(&mut agents, world.stuck_walkers(), AgentKind::Pedestrian);
            push_agents(&mut agents, world.vehicles(), AgentKind::Vehicle);
            debug!(count = agents.len(), "non-player agents in snapshot");
        }

        let images: Vec<WireImage<'_>> = player.captured_frames().iter().map(wire_image).collect();

        let snapshot = MeasurementsSnapshot {
            platform_timestamp,
            game_timestamp,
            player: measurements,
            agents,
            images,
        };
        let outcome = self.write_record(&snapshot, blocking);
        self.finish(Operation::SendMeasurements, outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::protocol::SessionError;
    use motorcade_test_utils::mocks::{
        CapturingSink, RecordingController, ScriptedPlayer, ScriptedWorld,
    };
    use nalgebra::Vector3;

    const WAIT: Duration = Duration::from_secs(1);

    fn engine_pair() -> (SessionEngine<MemoryChannel>, MemoryChannel) {
        let (server_half, client) = MemoryChannel::pair();
        (SessionEngine::new(server_half, WAIT), client)
    }

    /// Drive the handshake to the tick loop, consuming the client-side
    /// frames along the way.
    fn handshaken_engine() -> (SessionEngine<MemoryChannel>, MemoryChannel) {
        let (mut engine, mut client) = engine_pair();
        assert!(engine.connect().is_success());

        client
            .write(
                &EpisodeRequest {
                    config_text: String::new(),
                },
                WAIT,
            )
            .unwrap();
        let mut sink = CapturingSink::default();
        assert!(engine.read_new_episode(&mut sink, true).is_success());

        assert!(
            engine
                .send_scene_description(&[Transform::default()], true)
                .is_success()
        );
        let _: Option<SceneDescription> = client.read(WAIT).unwrap();

        client
            .write(
                &EpisodeStart {
                    spawn_point_index: 0,
                },
                WAIT,
            )
            .unwrap();
        assert!(matches!(
            engine.read_episode_start(true),
            Outcome::Success(0)
        ));

        assert!(engine.send_episode_ready(true).is_success());
        let ready: Option<EpisodeReady> = client.read(WAIT).unwrap();
        assert!(ready.unwrap().ready);

        assert_eq!(engine.phase(), SessionPhase::TickLoop);
        (engine, client)
    }

    // ---- Ordering ----

    #[test]
    fn operations_out_of_order_are_rejected_without_phase_change() {
        let (mut engine, _client) = engine_pair();
        let mut controller = RecordingController::possessing();

        let outcome = engine.read_control(&mut controller, true);
        assert!(matches!(
            outcome,
            Outcome::Error(SessionError::OutOfOrder { .. })
        ));
        assert_eq!(engine.phase(), SessionPhase::Disconnected);
        assert!(controller.autopilot.is_none());
    }

    #[test]
    fn connect_advances_to_awaiting_episode_request() {
        let (mut engine, _client) = engine_pair();
        assert!(engine.connect().is_success());
        assert_eq!(engine.phase(), SessionPhase::AwaitingEpisodeRequest);
    }

    // ---- Episode request ----

    #[test]
    fn read_new_episode_feeds_the_sink() {
        let (mut engine, mut client) = engine_pair();
        assert!(engine.connect().is_success());

        client
            .write(
                &EpisodeRequest {
                    config_text: "[level]\nnumber_of_vehicles = 7\n".into(),
                },
                WAIT,
            )
            .unwrap();

        let mut sink = CapturingSink::default();
        assert!(engine.read_new_episode(&mut sink, true).is_success());
        assert_eq!(sink.texts, vec!["[level]\nnumber_of_vehicles = 7\n"]);
        assert_eq!(engine.phase(), SessionPhase::AwaitingSceneAck);
    }

    #[test]
    fn non_blocking_read_try_again_keeps_the_phase() {
        let (mut engine, _client) = engine_pair();
        assert!(engine.connect().is_success());

        let mut sink = CapturingSink::default();
        let outcome = engine.read_new_episode(&mut sink, false);
        assert!(outcome.is_try_again());
        assert!(sink.texts.is_empty());
        assert_eq!(engine.phase(), SessionPhase::AwaitingEpisodeRequest);
    }

    // ---- Control ----

    #[test]
    fn manual_control_applies_inputs_as_a_unit() {
        let (mut engine, mut client) = handshaken_engine();
        let mut controller = RecordingController::possessing();

        client
            .write(
                &ControlCommand {
                    autopilot: false,
                    steer: -0.5,
                    throttle: 0.8,
                    brake: 0.0,
                    hand_brake: false,
                    reverse: false,
                },
                WAIT,
            )
            .unwrap();

        assert!(engine.read_control(&mut controller, true).is_success());
        assert_eq!(controller.autopilot, Some(false));
        assert_eq!(controller.inputs.len(), 1);
        assert!((controller.inputs[0].steer - (-0.5)).abs() < f32::EPSILON);
        assert!((controller.inputs[0].throttle - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn autopilot_command_skips_manual_inputs() {
        let (mut engine, mut client) = handshaken_engine();
        let mut controller = RecordingController::detached();

        client
            .write(
                &ControlCommand {
                    autopilot: true,
                    ..ControlCommand::default()
                },
                WAIT,
            )
            .unwrap();

        assert!(engine.read_control(&mut controller, true).is_success());
        assert_eq!(controller.autopilot, Some(true));
        assert!(controller.inputs.is_empty());
    }

    #[test]
    #[should_panic(expected = "manual control requires a possessed vehicle")]
    fn manual_control_without_possession_panics() {
        let (mut engine, mut client) = handshaken_engine();
        let mut controller = RecordingController::detached();

        client
            .write(&ControlCommand::default(), WAIT)
            .unwrap();
        let _ = engine.read_control(&mut controller, true);
    }

    #[test]
    fn control_try_again_leaves_the_controller_untouched() {
        let (mut engine, _client) = handshaken_engine();
        let mut controller = RecordingController::possessing();

        let outcome = engine.read_control(&mut controller, false);
        assert!(outcome.is_try_again());
        assert!(controller.autopilot.is_none());
        assert!(controller.inputs.is_empty());
        assert_eq!(engine.phase(), SessionPhase::TickLoop);
    }

    // ---- Measurements ----

    #[test]
    fn measurements_snapshot_orders_agents_and_carries_player_state() {
        let (mut engine, mut client) = handshaken_engine();
        let world = ScriptedWorld::new()
            .with_walker(1, Vector3::new(100.0, 0.0, 0.0))
            .with_stuck_walker(2, Vector3::zeros())
            .with_vehicle(3, 25.0);
        let player = ScriptedPlayer::new();

        assert!(
            engine
                .send_measurements(&world, &player, true, true)
                .is_success()
        );

        let snapshot: MeasurementsSnapshot<'static> =
            client.read(WAIT).unwrap().expect("snapshot frame");
        assert_eq!(snapshot.agents.len(), 3);
        assert_eq!(snapshot.agents[0].kind, AgentKind::Pedestrian);
        assert_eq!(snapshot.agents[1].kind, AgentKind::Pedestrian);
        assert_eq!(snapshot.agents[2].kind, AgentKind::Vehicle);
        assert_eq!(snapshot.game_timestamp, player.game_timestamp());
        assert!(
            (snapshot.player.forward_speed - player.forward_speed()).abs() < f32::EPSILON
        );
        assert_eq!(snapshot.images.len(), player.captured_frames().len());
    }

    #[test]
    fn measurements_without_agents_sends_an_empty_list() {
        let (mut engine, mut client) = handshaken_engine();
        let world = ScriptedWorld::new().with_vehicle(3, 25.0);
        let player = ScriptedPlayer::new();

        assert!(
            engine
                .send_measurements(&world, &player, false, true)
                .is_success()
        );
        let snapshot: MeasurementsSnapshot<'static> =
            client.read(WAIT).unwrap().expect("snapshot frame");
        assert!(snapshot.agents.is_empty());
    }

    // ---- Faults ----

    #[test]
    fn transport_fault_fails_the_session() {
        let (mut engine, client) = engine_pair();
        assert!(engine.connect().is_success());
        drop(client);

        let mut sink = CapturingSink::default();
        let outcome = engine.read_new_episode(&mut sink, true);
        assert!(outcome.is_error());
        assert_eq!(engine.phase(), SessionPhase::Failed);

        // Nothing is admitted after a fault.
        let again = engine.read_new_episode(&mut sink, true);
        assert!(matches!(
            again,
            Outcome::Error(SessionError::OutOfOrder { .. })
        ));
    }
}
