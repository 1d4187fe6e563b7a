//! Wire codec: pure, stateless conversions from simulation-domain values to
//! the flat records that go on the wire.
//!
//! Garbage in, garbage out: these functions have no error cases. The one
//! degraded path is an empty pixel buffer, which encodes as a zeroed image
//! with a warning instead of failing the snapshot.

use std::borrow::Cow;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use motorcade_core::types::{
    ActorId, CapturedFrame, SceneEffect, Transform, VehicleAgent, WalkerAgent,
};

// ---------------------------------------------------------------------------
// Wire values
// ---------------------------------------------------------------------------

/// Plain x/y/z triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WireVector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WireVector3 {
    #[must_use]
    pub fn to_vector(self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Location plus unit heading vector.
///
/// Orientation goes out as the forward direction only. Two transforms that
/// differ by a roll around the heading axis encode identically; clients
/// cannot recover roll. Kept for compatibility with existing clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WireTransform {
    pub location: WireVector3,
    pub orientation: WireVector3,
}

/// One captured frame on the wire. Pixels borrow from the capture side on
/// the way out and own their buffer on the way in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireImage<'a> {
    pub width: u32,
    pub height: u32,
    pub effect: SceneEffect,
    pub pixels: Cow<'a, [u32]>,
}

/// Wire type tag for non-player agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Pedestrian,
    Vehicle,
}

/// One non-player agent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireAgent {
    pub id: ActorId,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub transform: WireTransform,
    pub forward_speed: f32,
    pub box_extent: WireVector3,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Vector3 → wire vector: direct field copy.
#[must_use]
pub fn wire_vector3(v: Vector3<f32>) -> WireVector3 {
    WireVector3 {
        x: v.x,
        y: v.y,
        z: v.z,
    }
}

/// Transform → wire transform: location verbatim, orientation as the unit
/// forward vector. Roll is dropped here.
#[must_use]
pub fn wire_transform(t: &Transform) -> WireTransform {
    WireTransform {
        location: wire_vector3(t.location),
        orientation: wire_vector3(t.forward()),
    }
}

/// Frame → wire image. An empty source buffer produces a zeroed record and
/// a diagnostic instead of failing the snapshot.
#[must_use]
pub fn wire_image(frame: &CapturedFrame) -> WireImage<'_> {
    if frame.is_empty() {
        warn!(
            width = frame.width,
            height = frame.height,
            "sending empty image"
        );
        return WireImage::default();
    }
    WireImage {
        width: frame.width,
        height: frame.height,
        effect: frame.effect,
        pixels: Cow::Borrowed(&frame.pixels),
    }
}

// ---------------------------------------------------------------------------
// Agent kinematics
// ---------------------------------------------------------------------------

/// cm/s to km/h, applied to the walker's projected velocity.
pub const WALKER_SPEED_SCALE: f32 = 0.036;

/// Canonical walker bounding-box half-extent in centimeters.
// TODO: per-walker boxes; every walker currently reports the same extent.
pub const WALKER_BOX_EXTENT: Vector3<f32> = Vector3::new(45.0, 35.0, 100.0);

/// Per-kind kinematics contract: how an agent kind derives the forward
/// speed and box extent it reports. New agent kinds implement this instead
/// of adding type inspection to the snapshot path.
pub trait AgentKinematics {
    fn id(&self) -> ActorId;

    fn transform(&self) -> &Transform;

    /// Forward speed in km/h and box half-extent in centimeters.
    fn kinematics(&self) -> (f32, Vector3<f32>);
}

impl AgentKinematics for WalkerAgent {
    fn id(&self) -> ActorId {
        self.id
    }

    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn kinematics(&self) -> (f32, Vector3<f32>) {
        // Velocity projected onto the heading, cm/s scaled to km/h.
        let speed = self.velocity.dot(&self.transform.forward()) * WALKER_SPEED_SCALE;
        (speed, WALKER_BOX_EXTENT)
    }
}

impl AgentKinematics for VehicleAgent {
    fn id(&self) -> ActorId {
        self.id
    }

    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn kinematics(&self) -> (f32, Vector3<f32>) {
        (self.forward_speed, self.bounds_extent)
    }
}

/// Encode a batch of agents of one kind onto the end of `out`.
pub fn push_agents<T: AgentKinematics>(out: &mut Vec<WireAgent>, agents: &[T], kind: AgentKind) {
    out.reserve(agents.len());
    for agent in agents {
        let (forward_speed, box_extent) = agent.kinematics();
        out.push(WireAgent {
            id: agent.id(),
            kind,
            transform: wire_transform(agent.transform()),
            forward_speed,
            box_extent: wire_vector3(box_extent),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
