//! Raycast backends that need no physics engine.
//!
//! [`NoCollision`] is used when the host has no collision world at all;
//! [`SlabWorld`] is a small set of axis-aligned boxes for headless runs,
//! benchmarks and tests.

use bevy::prelude::*;

use crate::types::{HitResult, RayOutcome, RaySegment, RaycastBackend, SurfaceId};

/// Backend that never reports a hit.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCollision;

impl RaycastBackend for NoCollision {
    fn cast_segment(&self, _segment: &RaySegment) -> RayOutcome {
        Ok(None)
    }

    fn cast_batch(&self, segments: &[RaySegment], out: &mut Vec<RayOutcome>) {
        out.clear();
        out.resize(segments.len(), Ok(None));
    }
}

/// Solid axis-aligned box.
#[derive(Clone, Copy, Debug)]
pub struct WorldBox {
    pub entity: Entity,
    pub min: Vec3,
    pub max: Vec3,
    pub surface: Option<SurfaceId>,
    pub layers: u32,
}

/// Collection of solid boxes queried with slab tests.
///
/// Boxes are solid: a ray starting inside one reports a hit at distance 0.
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_bullet_sim::prelude::*;
///
/// let mut world = SlabWorld::default();
/// world.add_box(Entity::PLACEHOLDER, Vec3::new(0.0, 0.0, -20.0), Vec3::splat(1.0), None);
///
/// let segment = RaySegment::between(Vec3::ZERO, Vec3::new(0.0, 0.0, -50.0), u32::MAX).unwrap();
/// let hit = world.cast_segment(&segment).unwrap().unwrap();
/// assert!((hit.distance - 19.0).abs() < 1.0e-4);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SlabWorld {
    boxes: Vec<WorldBox>,
}

impl SlabWorld {
    /// Adds a box on every collision layer.
    pub fn add_box(
        &mut self,
        entity: Entity,
        center: Vec3,
        half_extents: Vec3,
        surface: Option<SurfaceId>,
    ) -> &mut Self {
        self.boxes.push(WorldBox {
            entity,
            min: center - half_extents,
            max: center + half_extents,
            surface,
            layers: u32::MAX,
        });
        self
    }

    pub fn push(&mut self, world_box: WorldBox) -> &mut Self {
        self.boxes.push(world_box);
        self
    }

    pub fn boxes(&self) -> &[WorldBox] {
        &self.boxes
    }

    fn intersect(world_box: &WorldBox, segment: &RaySegment) -> Option<(f32, Vec3)> {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut enter_normal = Vec3::ZERO;

        for axis in 0..3 {
            let origin = segment.origin[axis];
            let direction = segment.direction[axis];
            let (min, max) = (world_box.min[axis], world_box.max[axis]);

            if direction.abs() < 1.0e-12 {
                if origin < min || origin > max {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction;
            let (mut t0, mut t1) = ((min - origin) * inv, (max - origin) * inv);
            let mut normal = Vec3::ZERO;
            normal[axis] = -direction.signum();
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_enter {
                t_enter = t0;
                enter_normal = normal;
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        if t_exit < 0.0 {
            return None;
        }
        if t_enter <= 0.0 {
            // origin inside the box
            return Some((0.0, -segment.direction));
        }
        (t_enter <= segment.length).then_some((t_enter, enter_normal))
    }
}

impl RaycastBackend for SlabWorld {
    fn cast_segment(&self, segment: &RaySegment) -> RayOutcome {
        let closest = self
            .boxes
            .iter()
            .filter(|b| b.layers & segment.layer_mask != 0)
            .filter(|b| segment.accepts(b.entity))
            .filter_map(|b| Self::intersect(b, segment).map(|(t, normal)| (b, t, normal)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        Ok(closest.map(|(b, distance, normal)| HitResult {
            entity: b.entity,
            point: segment.origin + segment.direction * distance,
            normal,
            distance,
            surface: b.surface,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_wall() -> (SlabWorld, Entity) {
        let entity = World::new().spawn_empty().id();
        let mut world = SlabWorld::default();
        world.add_box(entity, Vec3::new(0.0, 0.0, -10.0), Vec3::new(5.0, 5.0, 0.5), Some(SurfaceId(3)));
        (world, entity)
    }

    #[test]
    fn test_hit_front_face() {
        let (world, entity) = world_with_wall();
        let segment = RaySegment::between(Vec3::ZERO, Vec3::new(0.0, 0.0, -20.0), u32::MAX).unwrap();
        let hit = world.cast_segment(&segment).unwrap().unwrap();
        assert_eq!(hit.entity, entity);
        assert_eq!(hit.normal, Vec3::Z);
        assert!((hit.distance - 9.5).abs() < 1.0e-4);
        assert_eq!(hit.surface, Some(SurfaceId(3)));
    }

    #[test]
    fn test_short_segment_misses() {
        let (world, _) = world_with_wall();
        let segment = RaySegment::between(Vec3::ZERO, Vec3::new(0.0, 0.0, -5.0), u32::MAX).unwrap();
        assert!(world.cast_segment(&segment).unwrap().is_none());
    }

    #[test]
    fn test_reverse_probe_finds_far_face() {
        let (world, entity) = world_with_wall();
        let probe = RaySegment {
            origin: Vec3::new(0.0, 0.0, -11.0),
            direction: Vec3::Z,
            length: 1.5,
            layer_mask: u32::MAX,
            target: Some(entity),
            ignore: None,
        };
        let hit = world.cast_segment(&probe).unwrap().unwrap();
        assert!((hit.distance - 0.5).abs() < 1.0e-4);
        assert_eq!(hit.normal, Vec3::NEG_Z);
    }

    #[test]
    fn test_origin_inside_is_distance_zero() {
        let (world, _) = world_with_wall();
        let segment = RaySegment::between(Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 0.0, -10.2), u32::MAX).unwrap();
        let hit = world.cast_segment(&segment).unwrap().unwrap();
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn test_layer_mask_filters() {
        let (mut world, _) = world_with_wall();
        world.boxes[0].layers = 0b10;
        let segment = RaySegment::between(Vec3::ZERO, Vec3::new(0.0, 0.0, -20.0), 0b01).unwrap();
        assert!(world.cast_segment(&segment).unwrap().is_none());
    }

    #[test]
    fn test_no_collision_fills_batch() {
        let segments = vec![RaySegment::between(Vec3::ZERO, Vec3::X, 1).unwrap(); 3];
        let mut out = Vec::new();
        NoCollision.cast_batch(&segments, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|o| matches!(o, Ok(None))));
    }
}
