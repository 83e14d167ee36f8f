//! Common types and enums for the ballistics system.

use bevy::prelude::*;

use crate::error::RaycastError;

/// Integration method used to advance bullets.
///
/// # Variants
/// * `SemiImplicitEuler` - Velocity is updated before position (default, matches live flight)
/// * `RK4` - Runge-Kutta 4th order on the velocity, then position from the new velocity
///
/// # Example
/// ```
/// use bevy_bullet_sim::types::PhysicsModel;
///
/// let model = PhysicsModel::default();
/// assert_eq!(model, PhysicsModel::SemiImplicitEuler);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Reflect)]
pub enum PhysicsModel {
    /// Semi-implicit Euler (fast, matches reference flight)
    #[default]
    SemiImplicitEuler,
    /// Runge-Kutta 4th order (accurate, slightly slower)
    RK4,
}

/// Stable reference to a live bullet.
///
/// The generation changes every time a slot is reused, so a handle kept
/// after its bullet died never aliases a newer bullet in the same slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BulletHandle {
    /// Slot index in the registry
    pub slot: u32,
    /// Generation of the slot when the handle was issued
    pub generation: u32,
}

/// Identifier of a physical surface, mapped to a material by the [`MaterialTable`].
///
/// [`MaterialTable`]: crate::material::MaterialTable
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Reflect)]
pub struct SurfaceId(pub u32);

/// Per-bullet interaction bitset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct BulletFlags(pub u8);

impl BulletFlags {
    pub const NONE: Self = Self(0);
    /// Hit something at least once
    pub const HIT: Self = Self(1);
    /// Ricocheted at least once
    pub const RICOCHETED: Self = Self(1 << 1);
    /// Passed through at least one surface
    pub const PENETRATED: Self = Self(1 << 2);
    /// Stopped inside or against a surface
    pub const STOPPED: Self = Self(1 << 3);
    /// Ran out of lifetime, range or speed
    pub const EXPIRED: Self = Self(1 << 4);
    /// A non-finite state was replaced by the fallback direction
    pub const DEGENERATE: Self = Self(1 << 5);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// True once the bullet must leave the registry.
    pub const fn is_terminal(self) -> bool {
        self.0 & (Self::STOPPED.0 | Self::EXPIRED.0) != 0
    }
}

impl std::ops::BitOr for BulletFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Pose handed to visual callbacks.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BulletPose {
    /// World-space position including the visual catch-up offset
    pub position: Vec3,
    /// Unit flight direction
    pub direction: Vec3,
    /// Current speed (m/s)
    pub speed: f32,
}

/// Line-segment raycast issued for one bullet step.
///
/// # Fields
/// * `origin` - Start of the segment (pre-step position)
/// * `direction` - Unit direction of the segment
/// * `length` - Segment length in meters
/// * `layer_mask` - Collision layers the bullet may hit
/// * `target` - Restrict hits to one collider (used by exit probes)
/// * `ignore` - Collider to skip (used when continuing past a `pass_through` surface)
#[derive(Clone, Copy, Debug)]
pub struct RaySegment {
    pub origin: Vec3,
    pub direction: Vec3,
    pub length: f32,
    pub layer_mask: u32,
    pub target: Option<Entity>,
    pub ignore: Option<Entity>,
}

impl RaySegment {
    /// Builds a segment between two points.
    ///
    /// Returns `None` for zero-length or non-finite segments, which are
    /// treated as pass-through.
    pub fn between(start: Vec3, end: Vec3, layer_mask: u32) -> Option<Self> {
        let delta = end - start;
        let length = delta.length();
        if !length.is_finite() || length < 1.0e-6 {
            return None;
        }
        Some(Self {
            origin: start,
            direction: delta / length,
            length,
            layer_mask,
            target: None,
            ignore: None,
        })
    }

    /// Whether a hit on `entity` may be reported for this segment.
    pub fn accepts(&self, entity: Entity) -> bool {
        self.target.is_none_or(|target| target == entity) && self.ignore != Some(entity)
    }

    /// End point of the segment.
    pub fn end(&self) -> Vec3 {
        self.origin + self.direction * self.length
    }
}

/// Hit result from raycasting.
///
/// # Fields
/// * `entity` - The collider that was hit
/// * `point` - World-space coordinates of the hit point
/// * `normal` - Outward surface normal at the hit point
/// * `distance` - Distance from the ray origin to the hit point
/// * `surface` - Surface identifier used for material lookup, if tagged
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_bullet_sim::types::HitResult;
///
/// let hit_result = HitResult {
///     entity: Entity::PLACEHOLDER,
///     point: Vec3::ZERO,
///     normal: Vec3::Y,
///     distance: 10.0,
///     surface: None,
/// };
/// ```
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct HitResult {
    /// Hit entity
    pub entity: Entity,
    /// World-space hit point
    pub point: Vec3,
    /// Outward surface normal
    pub normal: Vec3,
    /// Distance from ray origin
    pub distance: f32,
    /// Surface identifier of the collider
    pub surface: Option<SurfaceId>,
}

impl HitResult {
    /// Checks that the hit is usable for a segment of `max_distance`.
    pub fn is_well_formed(&self, max_distance: f32) -> bool {
        self.point.is_finite()
            && self.normal.is_finite()
            && self.normal.length_squared() > 1.0e-8
            && self.distance.is_finite()
            && self.distance >= 0.0
            && self.distance <= max_distance + 1.0e-3
    }
}

/// Outcome of one raycast query.
pub type RayOutcome = Result<Option<HitResult>, RaycastError>;

/// Raycast abstraction over the physical world.
///
/// The simulation never casts rays one at a time from inside the pure
/// phases: it collects every [`RaySegment`] of a tick and hands them to
/// [`RaycastBackend::cast_batch`] in one call. Results are matched back to
/// bullets by index.
pub trait RaycastBackend: Sync {
    /// Cast a single segment and return the first hit.
    fn cast_segment(&self, segment: &RaySegment) -> RayOutcome;

    /// Cast every segment, writing one outcome per segment into `out`.
    ///
    /// Backends with a native batch query should override this.
    fn cast_batch(&self, segments: &[RaySegment], out: &mut Vec<RayOutcome>) {
        out.clear();
        out.extend(segments.iter().map(|segment| self.cast_segment(segment)));
    }
}

impl<T: RaycastBackend + ?Sized> RaycastBackend for &T {
    fn cast_segment(&self, segment: &RaySegment) -> RayOutcome {
        (**self).cast_segment(segment)
    }

    fn cast_batch(&self, segments: &[RaySegment], out: &mut Vec<RayOutcome>) {
        (**self).cast_batch(segments, out)
    }
}
