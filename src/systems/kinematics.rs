//! Kinematics - semi-implicit Euler and RK4 integration for bullet flight.
//!
//! Every function here is a pure function of one bullet's state plus the
//! read-only environment, so bullets can be integrated in parallel.

use bevy::prelude::*;

use crate::registry::BulletState;
use crate::resources::BallisticsEnvironment;
use crate::types::{BulletFlags, PhysicsModel};

/// Advances one bullet by `dt` seconds.
///
/// Frames longer than `env.max_delta_time` are split into equal sub-steps,
/// so one call with `2 * max_delta_time` matches two calls with
/// `max_delta_time`. Integration ends where the lifetime runs out, so the
/// last sub-step may be shorter. Lifetime, elapsed time and distance are
/// accumulated; `prev_position` is left to the caller.
///
/// # Arguments
/// * `state` - Bullet state before the step
/// * `dt` - Frame time in seconds
/// * `env` - Environment snapshot for this tick
/// * `model` - Integration method
///
/// # Returns
/// The bullet state after the step
pub fn step(
    state: &BulletState,
    dt: f32,
    env: &BallisticsEnvironment,
    model: PhysicsModel,
) -> BulletState {
    let mut next = *state;
    let (steps, h) = env.substeps(dt);
    if steps == 0 {
        return next;
    }

    let air_density = env.effective_air_density();
    for _ in 0..steps {
        if next.lifetime <= 0.0 {
            break;
        }
        let h = h.min(next.lifetime);
        let before = next.position;
        match model {
            PhysicsModel::SemiImplicitEuler => integrate_euler(&mut next, h, env, air_density),
            PhysicsModel::RK4 => integrate_rk4(&mut next, h, env, air_density),
        }
        next.distance += next.position.distance(before);
        next.elapsed += h;
        next.lifetime -= h;
    }

    next
}

/// Filters non-finite state out before integration.
///
/// A non-finite velocity is replaced by the environment's fallback
/// direction at `last_speed` (or the muzzle speed when that is not usable)
/// and the bullet is flagged `DEGENERATE`. A non-finite position has no
/// fallback: the bullet is flagged `DEGENERATE | EXPIRED` and never reaches
/// a raycast. Returns `false` only in that case.
pub fn sanitize(state: &mut BulletState, env: &BallisticsEnvironment, last_speed: f32) -> bool {
    if !state.position.is_finite() {
        warn!("bullet has non-finite position {:?}, expiring it", state.position);
        state.flags.insert(BulletFlags::DEGENERATE | BulletFlags::EXPIRED);
        state.position = state.prev_position;
        state.velocity = Vec3::ZERO;
        return false;
    }
    if !state.velocity.is_finite() {
        let speed = if last_speed.is_finite() && last_speed > 0.0 {
            last_speed
        } else {
            state.muzzle_speed
        };
        warn!(
            "bullet at {:?} has non-finite velocity {:?}, redirecting along the fallback direction",
            state.position, state.velocity
        );
        state.velocity = env.fallback_dir() * speed;
        state.flags.insert(BulletFlags::DEGENERATE);
    }
    true
}

/// [`sanitize`], then [`step`], then [`sanitize`] again.
///
/// The per-bullet update shared by the live tick and the trajectory preview.
/// Returns `false` when the bullet became unusable and must not be cast.
pub fn advance(state: &mut BulletState, dt: f32, env: &BallisticsEnvironment, model: PhysicsModel) -> bool {
    if !sanitize(state, env, f32::NAN) {
        return false;
    }
    let speed = state.speed();
    *state = step(state, dt, env, model);
    sanitize(state, env, speed)
}

/// Semi-implicit Euler: velocity first, then position from the new velocity.
fn integrate_euler(state: &mut BulletState, dt: f32, env: &BallisticsEnvironment, air_density: f32) {
    let accel = calculate_acceleration(state, state.velocity, env, air_density);
    state.velocity += accel * dt;
    state.position += state.velocity * dt;
}

/// RK4 on the velocity, then position from the new velocity.
fn integrate_rk4(state: &mut BulletState, dt: f32, env: &BallisticsEnvironment, air_density: f32) {
    let vel = state.velocity;

    let k1 = calculate_acceleration(state, vel, env, air_density);
    let k2 = calculate_acceleration(state, vel + k1 * (dt / 2.0), env, air_density);
    let k3 = calculate_acceleration(state, vel + k2 * (dt / 2.0), env, air_density);
    let k4 = calculate_acceleration(state, vel + k3 * dt, env, air_density);

    let final_accel = (k1 + k2 * 2.0 + k3 * 2.0 + k4) / 6.0;

    state.velocity += final_accel * dt;
    state.position += state.velocity * dt;
}

/// Acceleration from drag, Magnus lift and gravity, in that order.
///
/// Drag uses `F = 0.5 * ρ * v² * Cd * A` against the air-relative velocity;
/// `drag_factor` already holds `0.5 * A * Cd / m`. The spin axis stays fixed
/// in space, so Magnus lift appears once the flight path bends away from it
/// or a crosswind skews the relative velocity.
///
/// # Arguments
/// * `state` - Bullet state providing the aerodynamic factors and spin
/// * `vel` - Velocity to evaluate at
/// * `env` - Environment snapshot
/// * `air_density` - Effective air density
pub fn calculate_acceleration(
    state: &BulletState,
    vel: Vec3,
    env: &BallisticsEnvironment,
    air_density: f32,
) -> Vec3 {
    let mut accel = Vec3::ZERO;
    let relative_vel = vel - env.wind;

    if env.air_resistance {
        let speed = relative_vel.length();
        if speed > 0.001 {
            accel -= relative_vel * (speed * state.drag_factor * air_density);
        }
    }

    if env.spin {
        accel += state.spin.cross(relative_vel) * (state.magnus_factor * air_density);
    }

    accel + env.gravity
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bullet(velocity: Vec3) -> BulletState {
        BulletState {
            velocity,
            lifetime: 5.0,
            mass: 0.01,
            drag_factor: 0.5 * 0.0001 * 0.3 / 0.01,
            magnus_factor: 0.0001,
            spin: velocity.normalize_or_zero() * 2000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_drag_calculation() {
        let state = bullet(Vec3::new(400.0, 0.0, 0.0));
        let env = BallisticsEnvironment::default();
        let accel = calculate_acceleration(&state, state.velocity, &env, env.air_density);

        // Should have downward gravity component
        assert!(accel.y < 0.0);
        // Should have drag opposing velocity (negative X)
        assert!(accel.x < 0.0);
    }

    #[test]
    fn test_stationary_projectile() {
        let state = bullet(Vec3::ZERO);
        let env = BallisticsEnvironment::default();
        let accel = calculate_acceleration(&state, Vec3::ZERO, &env, env.air_density);
        assert_eq!(accel, env.gravity);
    }

    #[test]
    fn test_straight_line_in_vacuum() {
        let env = BallisticsEnvironment::vacuum();
        let velocity = Vec3::new(120.0, 30.0, -45.0);
        let mut state = bullet(velocity);
        for _ in 0..100 {
            state = step(&state, 1.0 / 60.0, &env, PhysicsModel::SemiImplicitEuler);
        }
        assert_eq!(state.velocity, velocity);
        let expected = velocity * (100.0 / 60.0);
        assert_relative_eq!(state.position.x, expected.x, max_relative = 1.0e-4);
        assert_relative_eq!(state.position.y, expected.y, max_relative = 1.0e-4);
        assert_relative_eq!(state.position.z, expected.z, max_relative = 1.0e-4);
        assert_relative_eq!(state.distance, expected.length(), max_relative = 1.0e-4);
    }

    #[test]
    fn test_double_frame_equals_two_steps() {
        let env = BallisticsEnvironment {
            wind: Vec3::new(3.0, 0.0, 1.0),
            ..Default::default()
        };
        let start = bullet(Vec3::new(0.0, 10.0, -600.0));
        let cap = env.max_delta_time;

        let once = step(&start, 2.0 * cap, &env, PhysicsModel::SemiImplicitEuler);
        let twice = step(
            &step(&start, cap, &env, PhysicsModel::SemiImplicitEuler),
            cap,
            &env,
            PhysicsModel::SemiImplicitEuler,
        );

        assert_relative_eq!(once.position.x, twice.position.x, epsilon = 1.0e-4);
        assert_relative_eq!(once.position.y, twice.position.y, epsilon = 1.0e-4);
        assert_relative_eq!(once.position.z, twice.position.z, epsilon = 1.0e-4);
        assert_relative_eq!(once.velocity.z, twice.velocity.z, epsilon = 1.0e-4);
        assert_relative_eq!(once.lifetime, twice.lifetime, epsilon = 1.0e-6);
    }

    #[test]
    fn test_rk4_close_to_euler_for_small_steps() {
        let env = BallisticsEnvironment::default();
        let start = bullet(Vec3::new(0.0, 0.0, -400.0));
        let euler = step(&start, 0.5, &env, PhysicsModel::SemiImplicitEuler);
        let rk4 = step(&start, 0.5, &env, PhysicsModel::RK4);
        assert!(euler.position.distance(rk4.position) < 1.0);
    }

    #[test]
    fn test_lifetime_counts_down() {
        let env = BallisticsEnvironment::default();
        let state = step(&bullet(Vec3::X * 100.0), 0.1, &env, PhysicsModel::SemiImplicitEuler);
        assert_relative_eq!(state.lifetime, 4.9, epsilon = 1.0e-5);
        assert_relative_eq!(state.elapsed, 0.1, epsilon = 1.0e-5);
    }

    #[test]
    fn test_crosswind_produces_magnus_drift() {
        let env = BallisticsEnvironment {
            gravity: Vec3::ZERO,
            air_resistance: false,
            wind: Vec3::new(5.0, 0.0, 0.0),
            ..Default::default()
        };
        let state = bullet(Vec3::new(0.0, 0.0, -800.0));
        let accel = calculate_acceleration(&state, state.velocity, &env, env.air_density);
        assert!(accel.y.abs() > 0.0);
    }

    #[test]
    fn test_sanitize_redirects_nan_velocity() {
        let env = BallisticsEnvironment::default();
        let mut state = bullet(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(sanitize(&mut state, &env, 350.0));
        assert!(state.flags.contains(BulletFlags::DEGENERATE));
        assert!(!state.flags.is_terminal());
        assert_eq!(state.velocity, Vec3::NEG_Z * 350.0);
    }

    #[test]
    fn test_sanitize_falls_back_to_muzzle_speed() {
        let env = BallisticsEnvironment {
            fallback_direction: Vec3::X,
            ..Default::default()
        };
        let mut state = BulletState {
            muzzle_speed: 800.0,
            ..bullet(Vec3::new(0.0, f32::INFINITY, 0.0))
        };
        assert!(sanitize(&mut state, &env, f32::NAN));
        assert_eq!(state.velocity, Vec3::X * 800.0);
    }

    #[test]
    fn test_sanitize_expires_nan_position() {
        let env = BallisticsEnvironment::default();
        let mut state = BulletState {
            position: Vec3::new(0.0, f32::NAN, 0.0),
            prev_position: Vec3::new(1.0, 2.0, 3.0),
            ..bullet(Vec3::NEG_Z * 300.0)
        };
        assert!(!sanitize(&mut state, &env, 300.0));
        assert!(state.flags.contains(BulletFlags::DEGENERATE));
        assert!(state.flags.is_terminal());
        assert_eq!(state.position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_redirected_bullet_keeps_flying() {
        let env = BallisticsEnvironment::vacuum();
        let mut state = BulletState {
            muzzle_speed: 600.0,
            ..bullet(Vec3::splat(f32::NAN))
        };
        assert!(advance(&mut state, 0.01, &env, PhysicsModel::SemiImplicitEuler));
        assert_relative_eq!(state.position.z, -6.0, epsilon = 1.0e-4);
        assert!(state.flags.contains(BulletFlags::DEGENERATE));
    }

    #[test]
    fn test_step_stops_at_end_of_lifetime() {
        let env = BallisticsEnvironment::vacuum();
        let state = BulletState {
            lifetime: 0.01,
            ..bullet(Vec3::NEG_Z * 100.0)
        };
        let next = step(&state, 0.1, &env, PhysicsModel::SemiImplicitEuler);
        assert!(next.lifetime.abs() < 1.0e-6);
        assert_relative_eq!(next.elapsed, 0.01, epsilon = 1.0e-6);
        assert_relative_eq!(next.position.z, -1.0, epsilon = 1.0e-4);
        assert_relative_eq!(next.distance, 1.0, epsilon = 1.0e-4);
    }
}
