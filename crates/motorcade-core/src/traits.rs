use nalgebra::Vector3;

use crate::types::{CapturedFrame, DriveInputs, Transform, VehicleAgent, WalkerAgent};

// ---------------------------------------------------------------------------
// SettingsSink
// ---------------------------------------------------------------------------

/// Receives the configuration blob a client sends with each episode request.
pub trait SettingsSink: Send + Sync + 'static {
    /// Consume an episode configuration blob. Parse failures stay inside the
    /// sink; the protocol never sees them.
    fn load_text(&mut self, text: &str);
}

// ---------------------------------------------------------------------------
// WorldView
// ---------------------------------------------------------------------------

/// Read-only view of the level's actor populations.
pub trait WorldView: Send + Sync + 'static {
    /// Spawn transforms available for the next episode, in selection order.
    fn spawn_points(&self) -> &[Transform];

    /// Walkers currently roaming the level.
    fn walkers(&self) -> &[WalkerAgent];

    /// Walkers stuck and awaiting respawn. Reported after the roaming ones.
    fn stuck_walkers(&self) -> &[WalkerAgent];

    /// Non-player vehicles.
    fn vehicles(&self) -> &[VehicleAgent];
}

// ---------------------------------------------------------------------------
// PlayerView
// ---------------------------------------------------------------------------

/// Read-only view of the player vehicle's state for one snapshot.
pub trait PlayerView: Send + Sync + 'static {
    /// Platform clock at snapshot time, wrapping `u32` milliseconds.
    fn platform_timestamp(&self) -> u32;

    /// Game clock at snapshot time, wrapping `u32` milliseconds.
    fn game_timestamp(&self) -> u32;

    fn transform(&self) -> Transform;

    /// World-space acceleration in cm/s^2.
    fn acceleration(&self) -> Vector3<f32>;

    /// Forward speed in km/h.
    fn forward_speed(&self) -> f32;

    /// Accumulated collision intensity with other vehicles.
    fn collision_vehicles(&self) -> f32;

    /// Accumulated collision intensity with pedestrians.
    fn collision_pedestrians(&self) -> f32;

    /// Accumulated collision intensity with everything else.
    fn collision_other(&self) -> f32;

    /// Fraction of the vehicle footprint over the opposite lane, in [0, 1].
    fn intersection_other_lane(&self) -> f32;

    /// Fraction of the vehicle footprint off the road, in [0, 1].
    fn intersection_off_road(&self) -> f32;

    /// Frames captured this tick. Pixel buffers are borrowed for the
    /// duration of the snapshot write only.
    fn captured_frames(&self) -> &[CapturedFrame];
}

// ---------------------------------------------------------------------------
// VehicleController
// ---------------------------------------------------------------------------

/// Applies received control commands to the player vehicle.
pub trait VehicleController: Send + Sync + 'static {
    /// Toggle the built-in autopilot. Forwarded on every control command.
    fn set_autopilot(&mut self, enabled: bool);

    /// True while a drivable body is possessed. Manual input requires it.
    fn is_possessing_vehicle(&self) -> bool;

    /// Apply one tick's manual inputs in a single call.
    fn apply_inputs(&mut self, inputs: &DriveInputs);
}

// ---------------------------------------------------------------------------
// SimulationHost
// ---------------------------------------------------------------------------

/// Everything the episode driver needs from the simulation side, bundled
/// behind one object.
pub trait SimulationHost: Send + Sync + 'static {
    fn settings_sink(&mut self) -> &mut dyn SettingsSink;

    fn world(&self) -> &dyn WorldView;

    fn player(&self) -> &dyn PlayerView;

    fn controller(&mut self) -> &mut dyn VehicleController;

    /// Blocking mode for the tick loop's control read.
    fn synchronous(&self) -> bool;

    /// Whether measurement snapshots include non-player agents.
    fn send_agents(&self) -> bool;

    /// Begin a new episode at the selected spawn point.
    fn restart(&mut self, spawn_index: usize);

    /// Advance the simulation by one tick.
    fn step(&mut self);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
