//! Trajectory preview - the live flight path of a shot, without a registry slot.
//!
//! The preview drives the same [`kinematics::advance`] and the same batched
//! raycast as [`BulletSimulation::tick`](crate::simulation::BulletSimulation::tick),
//! so a live bullet fired with the same shot and step size passes through
//! exactly the points written here. The path ends at the first surface that
//! is not `pass_through`, or where a live bullet would be pruned.

use bevy::prelude::*;

use crate::error::SpawnError;
use crate::material::MaterialTable;
use crate::registry::BulletState;
use crate::resources::{BallisticsConfig, BallisticsEnvironment};
use crate::simulation::Shot;
use crate::systems::collision::cast_blocking;
use crate::systems::kinematics;
use crate::types::{BulletFlags, HitResult, RaySegment, RaycastBackend};

/// Upper bound on preview steps regardless of `max_time / time_step`.
const MAX_PREVIEW_STEPS: usize = 100_000;

/// Sampling of a preview.
///
/// # Fields
/// * `time_step` - Seconds per step; use the fixed timestep of the live simulation for parity
/// * `max_time` - Longest flight time previewed
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct PreviewSettings {
    pub time_step: f32,
    pub max_time: f32,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 64.0,
            max_time: 3.0,
        }
    }
}

/// How a previewed path ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PreviewEnd {
    /// `max_time` elapsed with the bullet still flying
    #[default]
    TimeLimit,
    /// The path struck a surface
    Impact,
    /// Lifetime, range or speed ran out, or the state became non-finite
    Expired,
}

/// Outcome of [`simulate`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PreviewResult {
    pub end: PreviewEnd,
    /// First blocking hit, if any
    pub hit: Option<HitResult>,
    /// Flight time covered by the path (seconds)
    pub flight_time: f32,
}

/// Writes the flight path of `shot` into `out`.
///
/// `out[0]` is the muzzle and each following point is the visual position
/// after one step, the same pose a live visual receives. A blocking hit
/// replaces the last point with the impact point. Pellet spread is not
/// applied; the path follows `shot.direction`.
///
/// # Arguments
/// * `shot` - Shot to preview
/// * `env` - Environment the live bullet would fly in
/// * `config` - Simulation settings (physics model, pruning limits)
/// * `materials` - Used to see through `pass_through` surfaces
/// * `backend` - Raycast backend for the physical world
/// * `settings` - Step size and maximum flight time
/// * `out` - Caller-owned polyline buffer, cleared first
///
/// # Returns
/// How the path ended, or the spawn error the live shot would produce
pub fn simulate<B: RaycastBackend + ?Sized>(
    shot: &Shot,
    env: &BallisticsEnvironment,
    config: &BallisticsConfig,
    materials: &MaterialTable,
    backend: &B,
    settings: PreviewSettings,
    out: &mut Vec<Vec3>,
) -> Result<PreviewResult, SpawnError> {
    shot.template.validate()?;
    let mut state = shot.initial_state(shot.direction, env, 0)?;
    let catch_up = env.catch_up_distance;

    out.clear();
    out.push(state.visual_position(catch_up));

    let dt = settings.time_step;
    if !(dt > 0.0) || !dt.is_finite() || !(settings.max_time > 0.0) {
        return Ok(PreviewResult::default());
    }
    // tolerate float noise in max_time / dt
    let steps = ((settings.max_time / dt - 1.0e-3).ceil().max(1.0) as usize).min(MAX_PREVIEW_STEPS);

    // per segment: index of the point it ends at, distance flown at its start
    let mut segments = Vec::with_capacity(steps);
    let mut owners = Vec::with_capacity(steps);
    let mut result = PreviewResult::default();

    for _ in 0..steps {
        state.prev_position = state.position;
        let start_distance = state.distance;
        if !kinematics::advance(&mut state, dt, env, config.physics_model) {
            result.end = PreviewEnd::Expired;
            break;
        }
        out.push(state.visual_position(catch_up));
        result.flight_time = state.elapsed;

        if let Some(segment) = RaySegment::between(state.prev_position, state.position, state.hit_mask) {
            segments.push(segment);
            owners.push((out.len() - 1, start_distance));
        }
        if is_spent(&state, config) {
            result.end = PreviewEnd::Expired;
            break;
        }
    }

    let mut scratch = Vec::new();
    let hits = cast_blocking(backend, &segments, materials, &mut scratch);
    let first = hits
        .into_iter()
        .zip(owners)
        .find_map(|(hit, owner)| hit.filter(|hit| !materials.resolve(hit.surface).pass_through).map(|hit| (hit, owner)));

    if let Some((hit, (point, start_distance))) = first {
        let weight = BulletState {
            distance: start_distance + hit.distance,
            ..state
        }
        .visual_weight(catch_up);
        out.truncate(point + 1);
        out[point] = hit.point + state.visual_offset * weight;
        result.end = PreviewEnd::Impact;
        result.hit = Some(hit);
        result.flight_time = point as f32 * dt;
    }

    Ok(result)
}

/// Same pruning rule as the live tick.
fn is_spent(state: &BulletState, config: &BallisticsConfig) -> bool {
    state.flags.contains(BulletFlags::EXPIRED)
        || state.lifetime <= 0.0
        || state.distance >= config.max_projectile_distance
        || state.velocity.length_squared() < config.min_projectile_speed * config.min_projectile_speed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{presets as materials, BallisticMaterial};
    use crate::template::{presets, BulletTemplate};
    use crate::types::SurfaceId;
    use crate::world::{NoCollision, SlabWorld};
    use std::sync::Arc;

    #[test]
    fn test_preview_stops_at_wall() {
        let wall = World::new().spawn_empty().id();
        let mut world = SlabWorld::default();
        world.add_box(wall, Vec3::new(0.0, 0.0, -100.0), Vec3::new(10.0, 10.0, 1.0), None);

        let shot = Shot::new(Vec3::ZERO, Vec3::NEG_Z, Arc::new(presets::rifle()));
        let mut path = Vec::new();
        let result = simulate(
            &shot,
            &BallisticsEnvironment::vacuum(),
            &BallisticsConfig::default(),
            &MaterialTable::default(),
            &world,
            PreviewSettings::default(),
            &mut path,
        )
        .unwrap();

        assert_eq!(result.end, PreviewEnd::Impact);
        assert_eq!(result.hit.map(|h| h.entity), Some(wall));
        let last = *path.last().unwrap();
        assert!((last.z + 99.0).abs() < 1.0e-3);
        assert!(path.windows(2).all(|pair| pair[1].z < pair[0].z));
    }

    #[test]
    fn test_preview_ignores_pass_through() {
        let foliage = World::new().spawn_empty().id();
        let mut world = SlabWorld::default();
        world.add_box(foliage, Vec3::new(0.0, 0.0, -50.0), Vec3::splat(5.0), Some(SurfaceId(7)));
        let table = MaterialTable::default().with(SurfaceId(7), materials::foliage());

        let shot = Shot::new(Vec3::ZERO, Vec3::NEG_Z, Arc::new(presets::rifle()));
        let mut path = Vec::new();
        let result = simulate(
            &shot,
            &BallisticsEnvironment::vacuum(),
            &BallisticsConfig::default(),
            &table,
            &world,
            PreviewSettings {
                time_step: 1.0 / 60.0,
                max_time: 0.5,
            },
            &mut path,
        )
        .unwrap();

        assert_eq!(result.end, PreviewEnd::TimeLimit);
        assert!(result.hit.is_none());
        assert_eq!(path.len(), 31);
    }

    #[test]
    fn test_preview_sees_wall_behind_foliage() {
        let mut entities = World::new();
        let (bush, wall) = (entities.spawn_empty().id(), entities.spawn_empty().id());
        let mut world = SlabWorld::default();
        world
            .add_box(bush, Vec3::new(0.0, 0.0, -5.0), Vec3::new(2.0, 2.0, 0.5), Some(SurfaceId(7)))
            .add_box(wall, Vec3::new(0.0, 0.0, -10.0), Vec3::new(2.0, 2.0, 0.25), None);
        let table = MaterialTable::default().with(SurfaceId(7), materials::foliage());

        let template = Arc::new(BulletTemplate {
            speed: 900.0,
            ..presets::rifle()
        });
        let shot = Shot::new(Vec3::ZERO, Vec3::NEG_Z, template);
        let mut path = Vec::new();
        let result = simulate(
            &shot,
            &BallisticsEnvironment::vacuum(),
            &BallisticsConfig::default(),
            &table,
            &world,
            PreviewSettings {
                time_step: 1.0 / 60.0,
                max_time: 0.5,
            },
            &mut path,
        )
        .unwrap();

        assert_eq!(result.end, PreviewEnd::Impact);
        assert_eq!(result.hit.map(|h| h.entity), Some(wall));
        assert_eq!(path.len(), 2);
        assert!((path[1].z + 9.75).abs() < 1.0e-3);
    }

    #[test]
    fn test_preview_ends_with_lifetime() {
        let template = Arc::new(BulletTemplate {
            lifetime: 0.1,
            ..presets::pistol()
        });
        let shot = Shot::new(Vec3::ZERO, Vec3::NEG_Z, template);
        let mut path = Vec::new();
        let result = simulate(
            &shot,
            &BallisticsEnvironment::default(),
            &BallisticsConfig::default(),
            &MaterialTable::default(),
            &NoCollision,
            PreviewSettings {
                time_step: 0.02,
                max_time: 10.0,
            },
            &mut path,
        )
        .unwrap();

        assert_eq!(result.end, PreviewEnd::Expired);
        assert!(path.len() <= 7);
    }

    #[test]
    fn test_preview_reports_invalid_template() {
        let template = Arc::new(BulletTemplate {
            mass: 0.0,
            ..presets::pistol()
        });
        let shot = Shot::new(Vec3::ZERO, Vec3::NEG_Z, template);
        let mut path = vec![Vec3::ONE];
        let result = simulate(
            &shot,
            &BallisticsEnvironment::default(),
            &BallisticsConfig::default(),
            &MaterialTable::new(BallisticMaterial::default()),
            &NoCollision,
            PreviewSettings::default(),
            &mut path,
        );
        assert!(matches!(result, Err(SpawnError::InvalidTemplate(_))));
    }

}
