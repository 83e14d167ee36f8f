//! Collision - batched raycasts between the pre-step and post-step positions.

use bevy::prelude::*;

#[cfg(feature = "dim3")]
use avian3d::prelude::*;
#[cfg(feature = "dim3")]
use bevy::ecs::system::SystemParam;

#[cfg(feature = "dim3")]
use crate::components::Surface;
use crate::material::MaterialTable;
use crate::types::{HitResult, RayOutcome, RaySegment, RaycastBackend};

/// Most `pass_through` surfaces one segment is continued past.
const MAX_PASS_THROUGH_ROUNDS: usize = 16;

/// Casts a batch of segments and validates every outcome.
///
/// Backend errors, malformed hits, hits outside the segment and hits on a
/// collider other than the requested target all become `None`, so the
/// bullet simply passes through for this step. `scratch` is reused between
/// calls to keep the batch allocation off the hot path.
///
/// # Arguments
/// * `backend` - Raycast backend for the physical world
/// * `segments` - Segments to cast, one per querying bullet
/// * `scratch` - Reusable buffer for the raw outcomes
///
/// # Returns
/// One validated hit per segment, in the same order
pub fn cast_segments<B: RaycastBackend + ?Sized>(
    backend: &B,
    segments: &[RaySegment],
    scratch: &mut Vec<RayOutcome>,
) -> Vec<Option<HitResult>> {
    if segments.is_empty() {
        return Vec::new();
    }

    backend.cast_batch(segments, scratch);
    if scratch.len() != segments.len() {
        warn!(
            "raycast backend returned {} results for {} segments, missing ones pass through",
            scratch.len(),
            segments.len()
        );
    }

    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| match scratch.get(index) {
            Some(Ok(Some(hit))) => validate_hit(segment, hit),
            Some(Ok(None)) | None => None,
            Some(Err(err)) => {
                warn!("raycast from {:?} failed: {}", segment.origin, err);
                None
            }
        })
        .collect()
}

fn validate_hit(segment: &RaySegment, hit: &HitResult) -> Option<HitResult> {
    if !hit.is_well_formed(segment.length) {
        warn!(
            "discarding malformed hit on {:?} (distance {}, normal {:?})",
            hit.entity, hit.distance, hit.normal
        );
        return None;
    }
    if !segment.accepts(hit.entity) {
        return None;
    }
    let mut hit = *hit;
    hit.normal = hit.normal.normalize();
    hit.distance = hit.distance.min(segment.length);
    Some(hit)
}

/// Casts a batch of segments, continuing past `pass_through` surfaces.
///
/// A segment whose closest hit is transparent to bullets is cast again from
/// that hit point with the transparent collider ignored, in further batches,
/// until it reaches a blocking surface or its end. Returned distances are
/// measured from the original segment origins. After
/// `MAX_PASS_THROUGH_ROUNDS` rounds the last transparent hit is returned
/// as is.
///
/// # Arguments
/// * `backend` - Raycast backend for the physical world
/// * `segments` - Segments to cast, one per querying bullet
/// * `materials` - Resolves which surfaces are `pass_through`
/// * `scratch` - Reusable buffer for the raw outcomes
///
/// # Returns
/// One validated hit per segment, in the same order
pub fn cast_blocking<B: RaycastBackend + ?Sized>(
    backend: &B,
    segments: &[RaySegment],
    materials: &MaterialTable,
    scratch: &mut Vec<RayOutcome>,
) -> Vec<Option<HitResult>> {
    let mut hits = cast_segments(backend, segments, scratch);
    let mut retry = Vec::new();
    let mut owners = Vec::new();

    for _ in 0..MAX_PASS_THROUGH_ROUNDS {
        retry.clear();
        owners.clear();
        for (index, hit) in hits.iter_mut().enumerate() {
            let Some(found) = *hit else {
                continue;
            };
            if !materials.resolve(found.surface).pass_through {
                continue;
            }
            let segment = &segments[index];
            *hit = None;
            let remaining = segment.length - found.distance;
            if remaining <= 1.0e-6 {
                continue;
            }
            retry.push(RaySegment {
                origin: segment.origin + segment.direction * found.distance,
                length: remaining,
                ignore: Some(found.entity),
                ..*segment
            });
            owners.push((index, found.distance));
        }
        if retry.is_empty() {
            break;
        }

        let results = cast_segments(backend, &retry, scratch);
        for (result, &(index, passed)) in results.into_iter().zip(&owners) {
            hits[index] = result.map(|mut next| {
                next.distance += passed;
                next
            });
        }
    }

    hits
}

/// Raycast backend over the avian3d spatial query pipeline.
///
/// Colliders carrying a [`Surface`] component report its identifier so the
/// struck material can be resolved.
#[cfg(feature = "dim3")]
#[derive(SystemParam)]
pub struct AvianRaycaster<'w, 's> {
    spatial_query: SpatialQuery<'w, 's>,
    surfaces: Query<'w, 's, &'static Surface>,
}

#[cfg(feature = "dim3")]
impl RaycastBackend for AvianRaycaster<'_, '_> {
    fn cast_segment(&self, segment: &RaySegment) -> RayOutcome {
        let Ok(direction) = Dir3::new(segment.direction) else {
            return Ok(None);
        };
        let filter = SpatialQueryFilter::from_mask(LayerMask(segment.layer_mask));

        let hit = if segment.target.is_some() || segment.ignore.is_some() {
            self.spatial_query.cast_ray_predicate(
                segment.origin,
                direction,
                segment.length,
                true,
                &filter,
                &|entity| segment.accepts(entity),
            )
        } else {
            self.spatial_query
                .cast_ray(segment.origin, direction, segment.length, true, &filter)
        };

        Ok(hit.map(|hit| HitResult {
            entity: hit.entity,
            point: segment.origin + *direction * hit.distance,
            // solid casts starting inside a collider report a zero normal
            normal: if hit.normal == Vec3::ZERO {
                -segment.direction
            } else {
                hit.normal
            },
            distance: hit.distance,
            surface: self.surfaces.get(hit.entity).ok().map(|surface| surface.id),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RaycastError;
    use crate::material::{presets, BallisticMaterial};
    use crate::types::SurfaceId;
    use crate::world::SlabWorld;

    struct Flaky;

    impl RaycastBackend for Flaky {
        fn cast_segment(&self, segment: &RaySegment) -> RayOutcome {
            if segment.origin.x < 0.0 {
                Err(RaycastError::Backend("shape cache miss".to_string()))
            } else {
                Ok(Some(HitResult {
                    entity: Entity::PLACEHOLDER,
                    point: Vec3::NAN,
                    normal: Vec3::Y,
                    distance: 1.0,
                    surface: None,
                }))
            }
        }
    }

    struct Truncating;

    impl RaycastBackend for Truncating {
        fn cast_segment(&self, _segment: &RaySegment) -> RayOutcome {
            Ok(None)
        }

        fn cast_batch(&self, _segments: &[RaySegment], out: &mut Vec<RayOutcome>) {
            out.clear();
        }
    }

    #[test]
    fn test_failures_pass_through() {
        let segments = vec![
            RaySegment::between(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, -5.0), 1).unwrap(),
            RaySegment::between(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, -5.0), 1).unwrap(),
        ];
        let mut scratch = Vec::new();
        let hits = cast_segments(&Flaky, &segments, &mut scratch);
        assert_eq!(hits, vec![None, None]);
    }

    #[test]
    fn test_short_batch_pads_with_misses() {
        let segments = vec![RaySegment::between(Vec3::ZERO, Vec3::X, 1).unwrap(); 4];
        let mut scratch = Vec::new();
        let hits = cast_segments(&Truncating, &segments, &mut scratch);
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(Option::is_none));
    }

    #[test]
    fn test_hits_matched_by_index() {
        let wall = World::new().spawn_empty().id();
        let mut world = SlabWorld::default();
        world.add_box(wall, Vec3::new(0.0, 0.0, -10.0), Vec3::new(1.0, 1.0, 0.5), None);

        let segments = vec![
            RaySegment::between(Vec3::new(5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, -20.0), u32::MAX).unwrap(),
            RaySegment::between(Vec3::ZERO, Vec3::new(0.0, 0.0, -20.0), u32::MAX).unwrap(),
        ];
        let mut scratch = Vec::new();
        let hits = cast_segments(&world, &segments, &mut scratch);

        assert!(hits[0].is_none());
        assert_eq!(hits[1].map(|h| h.entity), Some(wall));
    }

    fn foliage_then_wall() -> (SlabWorld, MaterialTable, Entity, Entity) {
        let mut entities = World::new();
        let (bush, wall) = (entities.spawn_empty().id(), entities.spawn_empty().id());
        let mut world = SlabWorld::default();
        world
            .add_box(bush, Vec3::new(0.0, 0.0, -5.0), Vec3::new(2.0, 2.0, 0.5), Some(SurfaceId(7)))
            .add_box(wall, Vec3::new(0.0, 0.0, -10.0), Vec3::new(2.0, 2.0, 0.25), None);
        let table = MaterialTable::new(BallisticMaterial::default()).with(SurfaceId(7), presets::foliage());
        (world, table, bush, wall)
    }

    #[test]
    fn test_blocking_cast_continues_past_foliage() {
        let (world, table, _, wall) = foliage_then_wall();
        let segments = vec![RaySegment::between(Vec3::ZERO, Vec3::new(0.0, 0.0, -15.0), u32::MAX).unwrap()];
        let mut scratch = Vec::new();

        let hits = cast_blocking(&world, &segments, &table, &mut scratch);
        let hit = hits[0].unwrap();
        assert_eq!(hit.entity, wall);
        assert!((hit.distance - 9.75).abs() < 1.0e-4);
        assert!((hit.point.z + 9.75).abs() < 1.0e-4);
    }

    #[test]
    fn test_blocking_cast_misses_behind_foliage_only() {
        let (world, table, _, _) = foliage_then_wall();
        let segments = vec![RaySegment::between(Vec3::ZERO, Vec3::new(0.0, 0.0, -8.0), u32::MAX).unwrap()];
        let mut scratch = Vec::new();

        assert_eq!(cast_blocking(&world, &segments, &table, &mut scratch), vec![None]);
        // a plain cast still reports the foliage
        let plain = cast_segments(&world, &segments, &mut scratch);
        assert_eq!(plain[0].map(|hit| hit.surface), Some(Some(SurfaceId(7))));
    }
}
