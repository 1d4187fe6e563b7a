//! Built-in demonstration world.
//!
//! A small kinematic stand-in for a real simulation host: the player
//! drives a ring road, walkers stroll the plaza inside it, and traffic
//! vehicles orbit an outer loop. All distances are in centimeters.

use std::f32::consts::TAU;
use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, info};

use motorcade_core::config::EpisodeSettings;
use motorcade_core::time::{SimTime, platform_timestamp_ms};
use motorcade_core::traits::{
    PlayerView, SettingsSink, SimulationHost, VehicleController, WorldView,
};
use motorcade_core::types::{
    ActorId, CapturedFrame, DriveInputs, SceneEffect, Transform, VehicleAgent, WalkerAgent,
};

// ---------------------------------------------------------------------------
// Layout and motion constants
// ---------------------------------------------------------------------------

const SPAWN_COUNT: usize = 8;

/// Radius of the ring road the player drives on.
const SPAWN_RING_RADIUS: f32 = 2_000.0;

/// Half-width of the drivable band around the ring road.
const ROAD_HALF_WIDTH: f32 = 400.0;

/// Radius of the walker plaza inside the ring.
const WALKER_RING_RADIUS: f32 = 800.0;

/// Radius of the outer loop the traffic vehicles orbit.
const VEHICLE_RING_RADIUS: f32 = 2_600.0;

/// Fixed simulation step.
const TICK: Duration = Duration::from_millis(50);

/// Top player speed in cm/s (90 km/h).
const MAX_SPEED: f32 = 2_500.0;

/// Speed change toward the throttle target, in cm/s per second.
const DRIVE_RATE: f32 = 600.0;

/// Speed change while braking, in cm/s per second.
const BRAKE_RATE: f32 = 1_800.0;

/// Yaw rate at full steer and full speed, in rad/s.
const STEER_RATE: f32 = 1.2;

/// Walker stroll speed in cm/s.
const WALK_SPEED: f32 = 150.0;

/// Turn rate that closes the stroll into a circle at [`WALK_SPEED`].
const WALKER_TURN_RATE: f32 = WALK_SPEED / WALKER_RING_RADIUS;

/// Traffic loop speed in cm/s (~40 km/h).
const VEHICLE_SPEED: f32 = 1_100.0;

const CM_S_TO_KM_H: f32 = 0.036;

const FRAME_WIDTH: u32 = 32;
const FRAME_HEIGHT: u32 = 24;

/// Scripted lap the autopilot drives: half throttle, gentle left turn.
const AUTOPILOT_INPUTS: DriveInputs = DriveInputs {
    steer: 0.25,
    throttle: 0.5,
    brake: 0.0,
    hand_brake: false,
    reverse: false,
};

// ---------------------------------------------------------------------------
// DemoWorld
// ---------------------------------------------------------------------------

/// Self-contained simulation host backing the `serve` and `demo` commands.
pub struct DemoWorld {
    settings: EpisodeSettings,
    spawn_points: Vec<Transform>,
    walkers: Vec<WalkerAgent>,
    stuck_walkers: Vec<WalkerAgent>,
    vehicles: Vec<VehicleAgent>,
    vehicle_angles: Vec<f32>,
    clock: SimTime,
    player: PlayerState,
    autopilot: bool,
    inputs: DriveInputs,
    frames: Vec<CapturedFrame>,
}

struct PlayerState {
    transform: Transform,
    velocity: Vector3<f32>,
    acceleration: Vector3<f32>,
    heading: f32,
    speed: f32,
    off_road: f32,
    other_lane: f32,
}

impl PlayerState {
    fn at(spawn: Transform) -> Self {
        let forward = spawn.forward();
        Self {
            transform: spawn,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            heading: forward.y.atan2(forward.x),
            speed: 0.0,
            off_road: 0.0,
            other_lane: 0.0,
        }
    }
}

impl DemoWorld {
    pub fn new() -> Self {
        let spawn_points = (0..SPAWN_COUNT)
            .map(|i| ring_transform(SPAWN_RING_RADIUS, TAU * i as f32 / SPAWN_COUNT as f32))
            .collect();
        let mut world = Self {
            settings: EpisodeSettings::default(),
            spawn_points,
            walkers: Vec::new(),
            stuck_walkers: Vec::new(),
            vehicles: Vec::new(),
            vehicle_angles: Vec::new(),
            clock: SimTime::new(),
            player: PlayerState::at(Transform::default()),
            autopilot: false,
            inputs: DriveInputs::default(),
            frames: vec![CapturedFrame {
                width: FRAME_WIDTH,
                height: FRAME_HEIGHT,
                effect: SceneEffect::SceneFinal,
                pixels: Vec::new(),
            }],
        };
        world.reset(0);
        world
    }

    /// World seeded with settings loaded ahead of the first episode.
    pub fn with_settings(settings: EpisodeSettings) -> Self {
        let mut world = Self::new();
        world.settings = settings;
        world.reset(0);
        world
    }

    fn reset(&mut self, spawn_index: usize) {
        self.clock.reset();
        self.inputs = DriveInputs::default();
        self.autopilot = false;
        let spawn = self
            .spawn_points
            .get(spawn_index)
            .copied()
            .unwrap_or_default();
        self.player = PlayerState::at(spawn);
        self.populate();
        self.render_frame();
    }

    fn populate(&mut self) {
        let pedestrians = self.settings.level.number_of_pedestrians;
        let vehicles = self.settings.level.number_of_vehicles;
        let walker_seed = self.settings.level.seed_pedestrians;
        let vehicle_seed = self.settings.level.seed_vehicles;

        self.walkers.clear();
        self.stuck_walkers.clear();
        let spread = pedestrians.max(1) as f32;
        for i in 0..pedestrians {
            let angle = TAU * (i as f32 + 0.5) / spread;
            let heading = tangent(angle);
            let walker = WalkerAgent {
                // Even handles for walkers, odd for vehicles, so the two id
                // spaces stay disjoint even when the seeds match.
                id: ActorId::from_handle(walker_seed.wrapping_add(u64::from(i)) << 1),
                transform: Transform::facing(polar(WALKER_RING_RADIUS, angle), heading),
                velocity: heading * WALK_SPEED,
            };
            if i % 4 == 3 {
                // Every fourth walker spawns parked and is reported as stuck.
                let mut stuck = walker;
                stuck.velocity = Vector3::zeros();
                self.stuck_walkers.push(stuck);
            } else {
                self.walkers.push(walker);
            }
        }

        self.vehicles.clear();
        self.vehicle_angles.clear();
        let spread = vehicles.max(1) as f32;
        for i in 0..vehicles {
            let angle = TAU * i as f32 / spread;
            self.vehicle_angles.push(angle);
            self.vehicles.push(VehicleAgent {
                id: ActorId::from_handle((vehicle_seed.wrapping_add(u64::from(i)) << 1) | 1),
                transform: ring_transform(VEHICLE_RING_RADIUS, angle),
                forward_speed: VEHICLE_SPEED * CM_S_TO_KM_H,
                bounds_extent: Vector3::new(230.0, 95.0, 75.0),
            });
        }
    }

    fn step_player(&mut self, dt: f32) {
        let inputs = if self.autopilot {
            AUTOPILOT_INPUTS
        } else {
            self.inputs
        };

        let direction = if inputs.reverse { -1.0 } else { 1.0 };
        let target = if inputs.hand_brake {
            0.0
        } else {
            inputs.throttle * MAX_SPEED * direction
        };
        let rate = if inputs.brake > 0.0 || inputs.hand_brake {
            BRAKE_RATE
        } else {
            DRIVE_RATE
        };
        let step = rate * dt;
        self.player.speed += (target - self.player.speed).clamp(-step, step);
        // Steering authority scales with speed.
        self.player.heading += inputs.steer * STEER_RATE * dt * (self.player.speed / MAX_SPEED);

        let forward = Vector3::new(self.player.heading.cos(), self.player.heading.sin(), 0.0);
        let velocity = forward * self.player.speed;
        self.player.acceleration = (velocity - self.player.velocity) / dt;
        self.player.velocity = velocity;
        let location = self.player.transform.location + velocity * dt;
        self.player.transform = Transform::facing(location, forward);

        let radial = location.x.hypot(location.y);
        let off_center = (radial - SPAWN_RING_RADIUS).abs();
        self.player.off_road = ((off_center - ROAD_HALF_WIDTH) / ROAD_HALF_WIDTH).clamp(0.0, 1.0);
        // Drifting inside the ring counts as the oncoming lane.
        self.player.other_lane = ((SPAWN_RING_RADIUS - radial) / ROAD_HALF_WIDTH).clamp(0.0, 1.0);
    }

    fn step_walkers(&mut self, dt: f32) {
        let turn = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), WALKER_TURN_RATE * dt);
        for walker in &mut self.walkers {
            walker.velocity = turn * walker.velocity;
            let location = walker.transform.location + walker.velocity * dt;
            walker.transform = Transform::facing(location, walker.velocity);
        }
    }

    fn step_vehicles(&mut self, dt: f32) {
        let omega = VEHICLE_SPEED / VEHICLE_RING_RADIUS;
        for (vehicle, angle) in self.vehicles.iter_mut().zip(self.vehicle_angles.iter_mut()) {
            *angle += omega * dt;
            vehicle.transform = ring_transform(VEHICLE_RING_RADIUS, *angle);
        }
    }

    fn render_frame(&mut self) {
        // 0xAARRGGBB; the blue channel carries the tick so frames differ.
        let tint = (self.clock.millis() / 50 % 256) as u32;
        let frame = &mut self.frames[0];
        frame.pixels.clear();
        for y in 0..frame.height {
            for x in 0..frame.width {
                let r = x * 255 / (FRAME_WIDTH - 1);
                let g = y * 255 / (FRAME_HEIGHT - 1);
                frame.pixels.push(0xff00_0000 | (r << 16) | (g << 8) | tint);
            }
        }
    }
}

impl Default for DemoWorld {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Host trait impls
// ---------------------------------------------------------------------------

impl SettingsSink for DemoWorld {
    fn load_text(&mut self, text: &str) {
        self.settings.load_text(text);
    }
}

impl WorldView for DemoWorld {
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

impl PlayerView for DemoWorld {
    fn platform_timestamp(&self) -> u32 {
        platform_timestamp_ms()
    }

    fn game_timestamp(&self) -> u32 {
        self.clock.timestamp_ms()
    }

    fn transform(&self) -> Transform {
        self.player.transform
    }

    fn acceleration(&self) -> Vector3<f32> {
        self.player.acceleration
    }

    fn forward_speed(&self) -> f32 {
        self.player.speed * CM_S_TO_KM_H
    }

    // The demo world has no collision response.
    fn collision_vehicles(&self) -> f32 {
        0.0
    }

    fn collision_pedestrians(&self) -> f32 {
        0.0
    }

    fn collision_other(&self) -> f32 {
        0.0
    }

    fn intersection_other_lane(&self) -> f32 {
        self.player.other_lane
    }

    fn intersection_off_road(&self) -> f32 {
        self.player.off_road
    }

    fn captured_frames(&self) -> &[CapturedFrame] {
        &self.frames
    }
}

impl VehicleController for DemoWorld {
    fn set_autopilot(&mut self, enabled: bool) {
        if enabled != self.autopilot {
            debug!(enabled, "autopilot switched");
        }
        self.autopilot = enabled;
    }

    fn is_possessing_vehicle(&self) -> bool {
        true
    }

    fn apply_inputs(&mut self, inputs: &DriveInputs) {
        self.inputs = *inputs;
    }
}

impl SimulationHost for DemoWorld {
    fn settings_sink(&mut self) -> &mut dyn SettingsSink {
        self
    }

    fn world(&self) -> &dyn WorldView {
        self
    }

    fn player(&self) -> &dyn PlayerView {
        self
    }

    fn controller(&mut self) -> &mut dyn VehicleController {
        self
    }

    fn synchronous(&self) -> bool {
        self.settings.server.synchronous_mode
    }

    fn send_agents(&self) -> bool {
        self.settings.server.send_non_player_agents
    }

    fn restart(&mut self, spawn_index: usize) {
        info!(spawn_index, "demo episode restarting");
        self.reset(spawn_index);
    }

    fn step(&mut self) {
        self.clock.advance_duration(TICK);
        let dt = TICK.as_secs_f32();
        self.step_player(dt);
        self.step_walkers(dt);
        self.step_vehicles(dt);
        self.render_frame();
    }
}

// ---------------------------------------------------------------------------
// Geometry helpers
// ---------------------------------------------------------------------------

fn polar(radius: f32, angle: f32) -> Vector3<f32> {
    Vector3::new(angle.cos() * radius, angle.sin() * radius, 0.0)
}

fn tangent(angle: f32) -> Vector3<f32> {
    Vector3::new(-angle.sin(), angle.cos(), 0.0)
}

fn ring_transform(radius: f32, angle: f32) -> Transform {
    Transform::facing(polar(radius, angle), tangent(angle))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
