//! Components linking scene entities to the ballistics simulation.
//!
//! Bullets themselves are not entities; they live in the
//! [`BulletSimulation`](crate::simulation::BulletSimulation) registry. These
//! components tag colliders with a surface identifier and carry weapon
//! zeroing requests and results.

use bevy::prelude::*;

use crate::systems::zeroing::{ZeroingParams, ZeroingResult, ZeroingTask};
use crate::types::SurfaceId;

/// Names the ballistic material of a collider.
///
/// Colliders without this component resolve to the material table's default.
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_bullet_sim::components::Surface;
/// use bevy_bullet_sim::types::SurfaceId;
///
/// const METAL: SurfaceId = SurfaceId(2);
///
/// let mut world = World::new();
/// let plate = world.spawn((Transform::default(), Surface::new(METAL))).id();
/// assert_eq!(world.get::<Surface>(plate).map(|s| s.id), Some(METAL));
/// ```
#[derive(Component, Reflect, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[reflect(Component)]
pub struct Surface {
    /// Key into the material table
    pub id: SurfaceId,
}

impl Surface {
    pub fn new(id: SurfaceId) -> Self {
        Self { id }
    }
}

/// Asks for the weapon on this entity to be zeroed.
///
/// The request is taken by the zeroing system, solved on the async compute
/// pool when drag is involved, and replaced by a [`WeaponZeroing`].
///
/// # Fields
/// * `params` - Distances, muzzle speed, gravity, sight height and optional drag
#[derive(Component, Reflect, Clone, Debug)]
#[reflect(Component)]
pub struct ZeroingRequest {
    pub params: ZeroingParams,
}

impl ZeroingRequest {
    pub fn new(params: ZeroingParams) -> Self {
        Self { params }
    }
}

/// A zeroing solve running in the background.
#[derive(Component)]
pub struct ZeroingInProgress(pub ZeroingTask);

/// Solved elevations of a weapon, sorted by distance.
///
/// # Example
/// ```
/// use bevy_bullet_sim::components::WeaponZeroing;
/// use bevy_bullet_sim::systems::zeroing::ZeroingResult;
///
/// let zeroing = WeaponZeroing::new(vec![
///     ZeroingResult { distance: 200.0, angle: 0.004 },
///     ZeroingResult { distance: 100.0, angle: 0.002 },
/// ]);
/// assert_eq!(zeroing.results[0].distance, 100.0);
/// assert!((zeroing.angle_at(150.0).unwrap() - 0.003).abs() < 1.0e-6);
/// ```
#[derive(Component, Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Component)]
pub struct WeaponZeroing {
    /// Solved (distance, angle) pairs
    pub results: Vec<ZeroingResult>,
}

impl WeaponZeroing {
    pub fn new(mut results: Vec<ZeroingResult>) -> Self {
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Self { results }
    }

    /// Elevation for `distance`, linearly interpolated between solved
    /// distances and clamped to the solved range.
    pub fn angle_at(&self, distance: f32) -> Option<f32> {
        let first = self.results.first()?;
        let last = self.results.last()?;
        if distance <= first.distance {
            return Some(first.angle);
        }
        if distance >= last.distance {
            return Some(last.angle);
        }
        self.results.windows(2).find_map(|pair| {
            let (near, far) = (pair[0], pair[1]);
            (distance >= near.distance && distance <= far.distance).then(|| {
                let span = far.distance - near.distance;
                if span <= f32::EPSILON {
                    return near.angle;
                }
                near.angle + (far.angle - near.angle) * (distance - near.distance) / span
            })
        })
    }
}
