use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Position and orientation of an actor in world space.
///
/// Distances are in centimeters. Forward is the rotated +X axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub location: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Transform {
    pub fn new(location: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { location, rotation }
    }

    /// Transform at `location` oriented so that `forward()` points along
    /// `direction`. The direction need not be normalized. Roll around the
    /// heading axis is unconstrained; callers that care about roll must
    /// construct the rotation themselves.
    pub fn facing(location: Vector3<f32>, direction: Vector3<f32>) -> Self {
        let rotation = UnitQuaternion::rotation_between(&Vector3::x(), &direction)
            .unwrap_or_else(|| {
                // Anti-parallel case: rotation_between has no unique answer.
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::PI)
            });
        Self { location, rotation }
    }

    /// Unit heading vector (the rotated +X axis).
    #[must_use]
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::x()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActorId
// ---------------------------------------------------------------------------

/// Stable 32-bit identity of a simulation actor, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u32);

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

impl ActorId {
    /// Derive the wire id from an engine actor handle.
    ///
    /// FNV-1a over the handle bits: ids must be identical across runs for
    /// the same handle so clients can track agents between snapshots.
    #[must_use]
    pub const fn from_handle(handle: u64) -> Self {
        let bytes = handle.to_le_bytes();
        let mut hash = FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// A pedestrian actor. Speed is derived from the velocity at encode time.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkerAgent {
    pub id: ActorId,
    pub transform: Transform,
    /// World-space velocity in cm/s.
    pub velocity: Vector3<f32>,
}

/// A non-player vehicle actor with engine-reported kinematics.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleAgent {
    pub id: ActorId,
    pub transform: Transform,
    /// Forward speed in km/h, as the engine reports it.
    pub forward_speed: f32,
    /// Half-extent of the chassis bounding box, in centimeters.
    pub bounds_extent: Vector3<f32>,
}

// ---------------------------------------------------------------------------
// Captured frames
// ---------------------------------------------------------------------------

/// Post-process effect applied to a captured frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneEffect {
    #[default]
    None,
    SceneFinal,
    Depth,
    SemanticSegmentation,
}

/// One captured camera frame. Pixels are packed 32-bit color values; an
/// empty pixel buffer marks a frame the capture side failed to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub effect: SceneEffect,
    pub pixels: Vec<u32>,
}

impl CapturedFrame {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Drive inputs
// ---------------------------------------------------------------------------

/// Manual driving inputs applied to the player vehicle in one call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveInputs {
    pub steer: f32,
    pub throttle: f32,
    pub brake: f32,
    pub hand_brake: bool,
    pub reverse: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
