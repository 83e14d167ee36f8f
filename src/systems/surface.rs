//! Surface interaction - ricochet, penetration and stopping.
//!
//! Resolution of one hit is split in two pure steps so both can run in
//! parallel across bullets:
//!
//! 1. [`decide_impact`] draws the ricochet roll and either resolves the hit
//!    outright (ricochet, stop) or asks for an exit probe.
//! 2. [`finalize_penetration`] consumes the probe result, charges the energy
//!    lost inside the material and either stops the bullet or lets it exit.
//!
//! Exit probes are reverse raycasts from `hit + dir * reach` back towards
//! the entry point, restricted to the struck collider. The distance from the
//! entry point to the probe hit is the thickness the bullet must cross.

use bevy::prelude::*;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use crate::handlers::InteractionKind;
use crate::material::BallisticMaterial;
use crate::registry::BulletState;
use crate::resources::{BallisticsConfig, BallisticsEnvironment};
use crate::types::{BulletFlags, HitResult, RaySegment};

/// Probe hits closer than this to the probe origin mean the bullet never
/// reached the far side.
const PROBE_EPSILON: f32 = 1.0e-4;

/// Interaction produced during the parallel phases, before the managed
/// context (template, shooter) is attached for dispatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpactRecord {
    pub kind: InteractionKind,
    pub hit: HitResult,
    pub impact_velocity: Vec3,
    pub velocity: Vec3,
    pub spread_angle: f32,
    pub speed_factor: f32,
    pub energy: f32,
    pub penetration_depth: f32,
}

/// Outcome of the first resolution step for one hit.
#[derive(Clone, Copy, Debug)]
pub enum HitDecision {
    /// The surface is transparent to bullets
    Ignored,
    /// Ricochet or stop, fully applied to the bullet state
    Resolved(ImpactRecord),
    /// Penetration attempt waiting for the exit probe
    Penetrating(PendingPenetration),
}

/// Entry data carried from [`decide_impact`] to [`finalize_penetration`].
#[derive(Clone, Copy, Debug)]
pub struct PendingPenetration {
    pub entry: HitResult,
    pub impact_velocity: Vec3,
    pub energy: f32,
    pub reach: f32,
    pub probe: RaySegment,
}

/// Angle of impact in degrees: 0° head-on, 90° grazing.
///
/// Measured between the velocity and the reversed outward normal, so hits
/// from behind the surface clamp to 90°.
pub fn impact_angle_deg(velocity: Vec3, normal: Vec3) -> f32 {
    let direction = velocity.normalize_or_zero();
    let normal = normal.normalize_or_zero();
    let cos = direction.dot(-normal).clamp(-1.0, 1.0);
    cos.acos().to_degrees().min(90.0)
}

/// Mirror `direction` about the plane with `normal`.
pub fn reflect(direction: Vec3, normal: Vec3) -> Vec3 {
    direction - 2.0 * direction.dot(normal) * normal
}

/// Random direction within a cone around `direction`.
///
/// Offsets are drawn from a center-weighted normal distribution
/// (`sigma = spread / 3`) and clamped to the cone. Returns the perturbed
/// unit direction and the angle it deviates by.
pub fn perturb_direction(direction: Vec3, spread: f32, rng: &mut impl Rng) -> (Vec3, f32) {
    if !(spread > 0.0) {
        return (direction, 0.0);
    }
    let Ok(normal) = Normal::new(0.0, spread / 3.0) else {
        return (direction, 0.0);
    };

    let (right, up) = direction.any_orthonormal_pair();
    let offset = Vec2::new(normal.sample(rng), normal.sample(rng));
    let angle = offset.length().min(spread);
    let axis = (right * offset.x + up * offset.y).normalize_or_zero();
    if axis == Vec3::ZERO {
        return (direction, 0.0);
    }

    let perturbed = (direction * angle.cos() + axis * angle.sin()).normalize();
    (perturbed, angle)
}

/// Private random stream of a bullet.
///
/// The stream depends only on the bullet's state, so a trajectory preview
/// with the same initial state draws the same numbers as the live bullet.
pub fn bullet_rng(state: &BulletState) -> StdRng {
    StdRng::seed_from_u64(state.rng_seed)
}

/// First resolution step: ricochet roll, stop, or penetration attempt.
///
/// `segment_length` is the length of the raycast segment the hit was found
/// on, used to roll back distance the bullet did not actually fly.
pub fn decide_impact(
    state: &mut BulletState,
    hit: &HitResult,
    segment_length: f32,
    material: &BallisticMaterial,
    env: &BallisticsEnvironment,
    config: &BallisticsConfig,
) -> HitDecision {
    if material.pass_through {
        return HitDecision::Ignored;
    }

    let impact_velocity = state.velocity;
    let speed = impact_velocity.length();
    let direction = impact_velocity.normalize_or(env.fallback_dir());
    let energy = state.kinetic_energy();
    let normal = hit.normal.normalize_or(-direction);

    state.flags.insert(BulletFlags::HIT);
    state.distance -= (segment_length - hit.distance).max(0.0);

    let mut rng = bullet_rng(state);
    let angle = impact_angle_deg(impact_velocity, normal);
    let roll: f32 = rng.random();
    let ricochets = env.ricochet && roll < material.ricochet_probability_at(angle);

    let decision = if ricochets {
        let reflected = reflect(direction, normal);
        let (mut outgoing, mut spread_angle) =
            perturb_direction(reflected, material.ricochet_spread, &mut rng);
        if outgoing.dot(normal) <= 0.0 {
            // spread pushed it back into the surface
            outgoing = reflected;
            spread_angle = 0.0;
        }
        let bounciness = material.ricochet_bounciness;
        let speed_factor = if bounciness.max > bounciness.min {
            rng.random_range(bounciness.min..=bounciness.max)
        } else {
            bounciness.min
        };

        state.position = hit.point + normal * config.surface_skin;
        state.velocity = outgoing * speed * speed_factor;
        state.flags.insert(BulletFlags::RICOCHETED);

        HitDecision::Resolved(ImpactRecord {
            kind: InteractionKind::Ricochet,
            hit: *hit,
            impact_velocity,
            velocity: state.velocity,
            spread_angle,
            speed_factor,
            energy: state.kinetic_energy(),
            penetration_depth: 0.0,
        })
    } else {
        let reach = penetration_reach(energy, material, config);
        if env.penetration && reach > PROBE_EPSILON {
            let probe = RaySegment {
                origin: hit.point + direction * reach,
                direction: -direction,
                length: reach,
                layer_mask: state.hit_mask,
                target: Some(hit.entity),
                ignore: None,
            };
            state.position = hit.point;
            HitDecision::Penetrating(PendingPenetration {
                entry: *hit,
                impact_velocity,
                energy,
                reach,
                probe,
            })
        } else {
            HitDecision::Resolved(stop(state, hit, impact_velocity, 0.0))
        }
    };

    state.rng_seed = rng.random();
    decision
}

/// Deepest a bullet with `energy` joules could travel inside `material`.
pub fn penetration_reach(energy: f32, material: &BallisticMaterial, config: &BallisticsConfig) -> f32 {
    if material.energy_loss_per_unit > 0.0 {
        (energy / material.energy_loss_per_unit).min(config.max_penetration_depth)
    } else {
        config.max_penetration_depth
    }
}

/// Second resolution step: charge the energy lost crossing the material.
///
/// `probe` is the outcome of the pending exit probe. A probe that found no
/// far face is read as a zero-thickness shell; one that hit right at its
/// origin means the material is thicker than the bullet can cross.
///
/// Always yields an `Enter` record followed by either `Exit` or `Stop`.
pub fn finalize_penetration(
    state: &mut BulletState,
    pending: &PendingPenetration,
    probe: Option<HitResult>,
    material: &BallisticMaterial,
    env: &BallisticsEnvironment,
    config: &BallisticsConfig,
) -> [ImpactRecord; 2] {
    let direction = pending.impact_velocity.normalize_or(env.fallback_dir());
    let blocked = probe.is_some_and(|exit| exit.distance <= PROBE_EPSILON);
    let depth = match probe {
        Some(exit) => (pending.reach - exit.distance).max(0.0),
        None => 0.0,
    };

    let remaining = pending.energy - material.energy_loss_per_unit * depth;
    let min_energy = 0.5 * state.mass * config.min_projectile_speed * config.min_projectile_speed;
    let exit_speed = if remaining > 0.0 {
        (2.0 * remaining / state.mass).sqrt()
    } else {
        0.0
    };
    let impact_speed = pending.impact_velocity.length();

    let enter = ImpactRecord {
        kind: InteractionKind::Enter,
        hit: pending.entry,
        impact_velocity: pending.impact_velocity,
        velocity: direction * exit_speed,
        spread_angle: 0.0,
        speed_factor: if impact_speed > 0.0 { exit_speed / impact_speed } else { 0.0 },
        energy: remaining.max(0.0),
        penetration_depth: depth,
    };

    if blocked || remaining <= min_energy {
        let stop_depth = if blocked { pending.reach } else { depth };
        let mut stop_hit = pending.entry;
        stop_hit.point = pending.entry.point + direction * stop_depth;
        state.distance += stop_depth;
        return [enter, stop(state, &stop_hit, pending.impact_velocity, stop_depth)];
    }

    let mut rng = bullet_rng(state);
    let (outgoing, spread_angle) = perturb_direction(direction, material.exit_spread, &mut rng);
    state.rng_seed = rng.random();

    let exit_hit = match probe {
        Some(exit) => exit,
        None => HitResult {
            normal: direction,
            distance: 0.0,
            ..pending.entry
        },
    };
    state.position = exit_hit.point + outgoing * config.surface_skin;
    state.velocity = outgoing * exit_speed;
    state.distance += depth;
    state.flags.insert(BulletFlags::PENETRATED);

    let exit = ImpactRecord {
        kind: InteractionKind::Exit,
        hit: exit_hit,
        impact_velocity: pending.impact_velocity,
        velocity: state.velocity,
        spread_angle,
        speed_factor: enter.speed_factor,
        energy: remaining,
        penetration_depth: depth,
    };
    [enter, exit]
}

fn stop(state: &mut BulletState, hit: &HitResult, impact_velocity: Vec3, depth: f32) -> ImpactRecord {
    state.position = hit.point;
    state.velocity = Vec3::ZERO;
    state.flags.insert(BulletFlags::STOPPED);
    ImpactRecord {
        kind: InteractionKind::Stop,
        hit: *hit,
        impact_velocity,
        velocity: Vec3::ZERO,
        spread_angle: 0.0,
        speed_factor: 0.0,
        energy: 0.0,
        penetration_depth: depth,
    }
}
