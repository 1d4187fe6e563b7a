//! Mock implementations of the simulation-side traits.
//!
//! Scripted worlds and players return fixed state; the recording controller
//! and capturing sink keep what the engine hands them so tests can assert
//! on it afterwards.

use nalgebra::Vector3;

use motorcade_core::traits::{
    PlayerView, SettingsSink, SimulationHost, VehicleController, WorldView,
};
use motorcade_core::types::{
    ActorId, CapturedFrame, DriveInputs, SceneEffect, Transform, VehicleAgent, WalkerAgent,
};

// ---------------------------------------------------------------------------
// CapturingSink
// ---------------------------------------------------------------------------

/// A settings sink that records every configuration text it receives.
#[derive(Debug, Clone, Default)]
pub struct CapturingSink {
    pub texts: Vec<String>,
}

impl SettingsSink for CapturingSink {
    fn load_text(&mut self, text: &str) {
        self.texts.push(text.to_owned());
    }
}

// ---------------------------------------------------------------------------
// ScriptedWorld
// ---------------------------------------------------------------------------

/// A world view with a fixed, builder-configured actor population.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWorld {
    spawn_points: Vec<Transform>,
    walkers: Vec<WalkerAgent>,
    stuck_walkers: Vec<WalkerAgent>,
    vehicles: Vec<VehicleAgent>,
}

impl ScriptedWorld {
    /// An empty world: no spawn points, no agents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the spawn point list.
    #[must_use]
    pub fn with_spawn_points(mut self, spawn_points: Vec<Transform>) -> Self {
        self.spawn_points = spawn_points;
        self
    }

    /// Add a roaming walker with the given velocity in cm/s.
    #[must_use]
    pub fn with_walker(mut self, id: u32, velocity: Vector3<f32>) -> Self {
        self.walkers.push(WalkerAgent {
            id: ActorId(id),
            transform: Transform::default(),
            velocity,
        });
        self
    }

    /// Add a stuck walker awaiting respawn.
    #[must_use]
    pub fn with_stuck_walker(mut self, id: u32, velocity: Vector3<f32>) -> Self {
        self.stuck_walkers.push(WalkerAgent {
            id: ActorId(id),
            transform: Transform::default(),
            velocity,
        });
        self
    }

    /// Add a non-player vehicle with the given forward speed in km/h.
    #[must_use]
    pub fn with_vehicle(mut self, id: u32, forward_speed: f32) -> Self {
        self.vehicles.push(VehicleAgent {
            id: ActorId(id),
            transform: Transform::default(),
            forward_speed,
            bounds_extent: Vector3::new(230.0, 95.0, 75.0),
        });
        self
    }
}

impl WorldView for ScriptedWorld {
    fn spawn_points(&self) -> &[Transform] {
        &self.spawn_points
    }

    fn walkers(&self) -> &[WalkerAgent] {
        &self.walkers
    }

    fn stuck_walkers(&self) -> &[WalkerAgent] {
        &self.stuck_walkers
    }

    fn vehicles(&self) -> &[VehicleAgent] {
        &self.vehicles
    }
}

// ---------------------------------------------------------------------------
// ScriptedPlayer
// ---------------------------------------------------------------------------

/// A player view reporting fixed, distinctive values.
#[derive(Debug, Clone)]
pub struct ScriptedPlayer {
    frames: Vec<CapturedFrame>,
}

impl ScriptedPlayer {
    /// A player with one small captured frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![CapturedFrame {
                width: 2,
                height: 2,
                effect: SceneEffect::SceneFinal,
                pixels: vec![0xff00_0000, 1, 2, 3],
            }],
        }
    }

    /// Replace the captured frame list.
    #[must_use]
    pub fn with_frames(mut self, frames: Vec<CapturedFrame>) -> Self {
        self.frames = frames;
        self
    }
}

impl Default for ScriptedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerView for ScriptedPlayer {
    fn platform_timestamp(&self) -> u32 {
        11_250
    }

    fn game_timestamp(&self) -> u32 {
        42_000
    }

    fn transform(&self) -> Transform {
        Transform::facing(Vector3::new(120.0, -40.0, 38.0), Vector3::x())
    }

    fn acceleration(&self) -> Vector3<f32> {
        Vector3::new(15.0, -2.5, 0.0)
    }

    fn forward_speed(&self) -> f32 {
        36.0
    }

    fn collision_vehicles(&self) -> f32 {
        1.0
    }

    fn collision_pedestrians(&self) -> f32 {
        0.0
    }

    fn collision_other(&self) -> f32 {
        2.5
    }

    fn intersection_other_lane(&self) -> f32 {
        0.25
    }

    fn intersection_off_road(&self) -> f32 {
        0.1
    }

    fn captured_frames(&self) -> &[CapturedFrame] {
        &self.frames
    }
}

// ---------------------------------------------------------------------------
// RecordingController
// ---------------------------------------------------------------------------

/// A vehicle controller that records everything applied to it.
#[derive(Debug, Clone, Default)]
pub struct RecordingController {
    /// Last autopilot flag received, `None` until the first command.
    pub autopilot: Option<bool>,
    /// Manual input sets, in arrival order.
    pub inputs: Vec<DriveInputs>,
    /// Whether a drivable body is currently possessed.
    pub possessing: bool,
}

impl RecordingController {
    /// A controller possessing a vehicle; manual input is legal.
    #[must_use]
    pub fn possessing() -> Self {
        Self {
            possessing: true,
            ..Self::default()
        }
    }

    /// A controller without a vehicle; manual input is a contract breach.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }
}

impl VehicleController for RecordingController {
    fn set_autopilot(&mut self, enabled: bool) {
        self.autopilot = Some(enabled);
    }

    fn is_possessing_vehicle(&self) -> bool {
        self.possessing
    }

    fn apply_inputs(&mut self, inputs: &DriveInputs) {
        self.inputs.push(*inputs);
    }
}

// ---------------------------------------------------------------------------
// MockHost
// ---------------------------------------------------------------------------

/// A full simulation host assembled from the scripted parts above.
///
/// Fields are public so tests can swap in a configured world or player and
/// inspect the recorded calls afterwards.
#[derive(Debug, Clone)]
pub struct MockHost {
    pub sink: CapturingSink,
    pub world: ScriptedWorld,
    pub player: ScriptedPlayer,
    pub controller: RecordingController,
    pub synchronous: bool,
    pub send_agents: bool,
    /// Spawn indices passed to `restart`, in call order.
    pub restarts: Vec<usize>,
    /// Number of `step` calls.
    pub steps: u64,
}

impl MockHost {
    /// A synchronous host with an empty world, a possessing controller, and
    /// agent reporting enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sink: CapturingSink::default(),
            world: ScriptedWorld::new(),
            player: ScriptedPlayer::new(),
            controller: RecordingController::possessing(),
            synchronous: true,
            send_agents: true,
            restarts: Vec::new(),
            steps: 0,
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationHost for MockHost {
    fn settings_sink(&mut self) -> &mut dyn SettingsSink {
        &mut self.sink
    }

    fn world(&self) -> &dyn WorldView {
        &self.world
    }

    fn player(&self) -> &dyn PlayerView {
        &self.player
    }

    fn controller(&mut self) -> &mut dyn VehicleController {
        &mut self.controller
    }

    fn synchronous(&self) -> bool {
        self.synchronous
    }

    fn send_agents(&self) -> bool {
        self.send_agents
    }

    fn restart(&mut self, spawn_index: usize) {
        self.restarts.push(spawn_index);
    }

    fn step(&mut self) {
        self.steps += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- CapturingSink --

    #[test]
    fn capturing_sink_keeps_texts_in_order() {
        let mut sink = CapturingSink::default();
        sink.load_text("first");
        sink.load_text("second");
        assert_eq!(sink.texts, vec!["first", "second"]);
    }

    // -- ScriptedWorld --

    #[test]
    fn scripted_world_builders_populate_views() {
        let world = ScriptedWorld::new()
            .with_spawn_points(vec![Transform::default(), Transform::default()])
            .with_walker(1, Vector3::x())
            .with_stuck_walker(2, Vector3::zeros())
            .with_vehicle(3, 50.0);

        assert_eq!(world.spawn_points().len(), 2);
        assert_eq!(world.walkers().len(), 1);
        assert_eq!(world.walkers()[0].id, ActorId(1));
        assert_eq!(world.stuck_walkers().len(), 1);
        assert_eq!(world.vehicles().len(), 1);
        assert!((world.vehicles()[0].forward_speed - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn scripted_world_starts_empty() {
        let world = ScriptedWorld::new();
        assert!(world.spawn_points().is_empty());
        assert!(world.walkers().is_empty());
        assert!(world.stuck_walkers().is_empty());
        assert!(world.vehicles().is_empty());
    }

    // -- ScriptedPlayer --

    #[test]
    fn scripted_player_has_one_frame_by_default() {
        let player = ScriptedPlayer::new();
        assert_eq!(player.captured_frames().len(), 1);
        assert!(!player.captured_frames()[0].is_empty());
    }

    #[test]
    fn scripted_player_frames_can_be_replaced() {
        let player = ScriptedPlayer::new().with_frames(Vec::new());
        assert!(player.captured_frames().is_empty());
    }

    // -- RecordingController --

    #[test]
    fn recording_controller_tracks_commands() {
        let mut controller = RecordingController::possessing();
        assert!(controller.is_possessing_vehicle());
        assert!(controller.autopilot.is_none());

        controller.set_autopilot(true);
        controller.apply_inputs(&DriveInputs {
            throttle: 0.5,
            ..DriveInputs::default()
        });

        assert_eq!(controller.autopilot, Some(true));
        assert_eq!(controller.inputs.len(), 1);
    }

    #[test]
    fn detached_controller_possesses_nothing() {
        let controller = RecordingController::detached();
        assert!(!controller.is_possessing_vehicle());
    }

    // -- MockHost --

    #[test]
    fn mock_host_dispatches_through_trait_objects() {
        let mut host = MockHost::new();
        let host_dyn: &mut dyn SimulationHost = &mut host;

        host_dyn.settings_sink().load_text("cfg");
        host_dyn.restart(2);
        host_dyn.step();
        host_dyn.step();

        assert!(host_dyn.synchronous());
        assert!(host_dyn.send_agents());
        assert_eq!(host.sink.texts, vec!["cfg"]);
        assert_eq!(host.restarts, vec![2]);
        assert_eq!(host.steps, 2);
    }

    // -- Send + Sync --

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn mock_types_are_send_sync() {
        assert_send_sync::<CapturingSink>();
        assert_send_sync::<ScriptedWorld>();
        assert_send_sync::<ScriptedPlayer>();
        assert_send_sync::<RecordingController>();
        assert_send_sync::<MockHost>();
    }
}
