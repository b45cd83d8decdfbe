//! Core value types: what the transport engine hands us per step, and the
//! normalized record the pipeline produces from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::StepPointKind;
use crate::ids::{RunId, VolumeHandle};

// ---------------------------------------------------------------------------
// Geometry primitives
// ---------------------------------------------------------------------------

/// A 3-vector of reals (position or direction).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeVector {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl ThreeVector {
    /// Construct a vector from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Dot product.
    pub fn dot(self, other: Self) -> f64 {
        self.z.mul_add(other.z, self.x.mul_add(other.x, self.y * other.y))
    }
}

/// Global-to-local coordinate transform of a volume instance.
///
/// `local = rotation * global + translation`, with `rotation` stored as
/// three row vectors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    /// Rotation matrix rows.
    pub rotation: [ThreeVector; 3],
    /// Translation applied after rotation.
    pub translation: ThreeVector,
}

impl AffineTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: [
            ThreeVector::new(1.0, 0.0, 0.0),
            ThreeVector::new(0.0, 1.0, 0.0),
            ThreeVector::new(0.0, 0.0, 1.0),
        ],
        translation: ThreeVector::new(0.0, 0.0, 0.0),
    };

    /// A pure translation.
    pub const fn translation(offset: ThreeVector) -> Self {
        Self {
            rotation: Self::IDENTITY.rotation,
            translation: offset,
        }
    }

    /// Map a global point into this frame.
    pub fn apply(&self, point: ThreeVector) -> ThreeVector {
        let [r0, r1, r2] = self.rotation;
        ThreeVector {
            x: r0.dot(point) + self.translation.x,
            y: r1.dot(point) + self.translation.y,
            z: r2.dot(point) + self.translation.z,
        }
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Engine-side step notification
// ---------------------------------------------------------------------------

/// A physical volume as seen by a step point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeRef {
    /// Stable interned identity.
    pub handle: VolumeHandle,
    /// Display name; classification rules match against it.
    pub name: String,
}

impl VolumeRef {
    /// Construct a volume reference.
    pub fn new(handle: u32, name: impl Into<String>) -> Self {
        Self {
            handle: VolumeHandle(handle),
            name: name.into(),
        }
    }
}

/// State of the particle at one end of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPoint {
    /// Volume containing the point; `None` once the particle left the world.
    pub volume: Option<VolumeRef>,
    /// Kinetic energy at this point.
    pub kinetic_energy: f64,
    /// Global position.
    pub position: ThreeVector,
    /// Unit momentum direction.
    pub momentum_direction: ThreeVector,
    /// Global time.
    pub global_time: f64,
    /// Copy/replica number of the volume instance.
    #[serde(default)]
    pub replica: i32,
    /// Global-to-local transform of the volume instance.
    #[serde(default)]
    pub frame: AffineTransform,
}

impl StepPoint {
    /// Handle of the containing volume, if any.
    pub fn volume_handle(&self) -> Option<VolumeHandle> {
        self.volume.as_ref().map(|v| v.handle)
    }
}

/// One step notification pushed by the transport engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNotification {
    /// Index of the event in flight.
    pub event_id: i32,
    /// Number of events the run will process.
    pub run_event_count: i32,
    /// Particle species code.
    pub particle_id: i32,
    /// Track id (1 is the primary).
    pub track_id: i32,
    /// Parent track id (0 for primaries).
    pub parent_id: i32,
    /// Ordinal of this step within its track, starting at 1.
    pub step_number: i32,
    /// Energy deposited along the step.
    pub energy_deposit: f64,
    /// Point where the step started.
    pub pre: StepPoint,
    /// Point where the step ended.
    pub post: StepPoint,
}

impl StepNotification {
    /// Whether this is the first step of its track.
    pub const fn is_first_step(&self) -> bool {
        self.step_number == 1
    }

    /// Whether this is the primary particle's first step in the event.
    pub const fn is_primary_first_step(&self) -> bool {
        self.track_id == 1 && self.step_number == 1
    }

    /// Whether the step crosses from one volume into another.
    pub fn crosses_boundary(&self) -> bool {
        self.pre.volume_handle() != self.post.volume_handle()
    }
}

// ---------------------------------------------------------------------------
// Normalized record
// ---------------------------------------------------------------------------

/// One measurement kept by the pipeline: the normalized, format-independent
/// row source for every output backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Which step point was sampled.
    pub kind: StepPointKind,
    /// Event index.
    pub event_index: i32,
    /// Total events in the run.
    pub run_event_count: i32,
    /// Particle species code.
    pub particle_id: i32,
    /// Track id.
    pub track_id: i32,
    /// Parent track id.
    pub parent_id: i32,
    /// Step ordinal; one less than the engine's ordinal for pre-step samples.
    pub step_number: i32,
    /// Kinetic energy at the sampled point.
    pub kinetic_energy: f64,
    /// Energy deposit; zero for pre-step samples and boundary markers.
    pub energy_deposit: f64,
    /// Global position.
    pub global_position: ThreeVector,
    /// Position in the attributed volume's frame.
    pub local_position: ThreeVector,
    /// Unit momentum direction.
    pub momentum_direction: ThreeVector,
    /// Global time.
    pub time: f64,
    /// Classification of the attributed volume (0 = insensitive).
    pub volume_id: i32,
    /// Replica index of the attributed volume instance.
    pub replica_index: i32,
}

/// Metadata written into every output artifact's header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Identifier of the recording run.
    pub run_id: RunId,
    /// When the sink was opened.
    pub created_at: DateTime<Utc>,
}

impl RunMeta {
    /// Metadata for a run starting now.
    pub fn now() -> Self {
        Self {
            run_id: RunId::new(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn translation_shifts_point() {
        let frame = AffineTransform::translation(ThreeVector::new(-1.0, 2.0, 0.5));
        let local = frame.apply(ThreeVector::new(1.0, 1.0, 1.0));
        assert_eq!(local, ThreeVector::new(0.0, 3.0, 1.5));
    }

    #[test]
    fn rotation_is_applied_before_translation() {
        // 90 degrees about z: (x, y) -> (-y, x)
        let frame = AffineTransform {
            rotation: [
                ThreeVector::new(0.0, -1.0, 0.0),
                ThreeVector::new(1.0, 0.0, 0.0),
                ThreeVector::new(0.0, 0.0, 1.0),
            ],
            translation: ThreeVector::new(10.0, 0.0, 0.0),
        };
        let local = frame.apply(ThreeVector::new(1.0, 2.0, 3.0));
        assert_eq!(local, ThreeVector::new(8.0, 1.0, 3.0));
    }

    #[test]
    fn step_point_frame_defaults_to_identity() {
        let json = r#"{
            "volume": {"handle": 3, "name": "Detector"},
            "kinetic_energy": 1.0,
            "position": {"x": 0.0, "y": 0.0, "z": 0.0},
            "momentum_direction": {"x": 0.0, "y": 0.0, "z": 1.0},
            "global_time": 0.0
        }"#;
        let point: StepPoint = serde_json::from_str(json).unwrap();
        assert_eq!(point.frame, AffineTransform::IDENTITY);
        assert_eq!(point.replica, 0);
        assert_eq!(point.volume_handle(), Some(VolumeHandle(3)));
    }
}
