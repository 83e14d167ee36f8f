//! Global resources for the ballistics system.

use bevy::prelude::*;

use crate::types::PhysicsModel;

/// Global environment settings affecting all bullets.
///
/// The simulation takes a copy of this resource between ticks, so a tick
/// never observes a half-updated environment.
///
/// # Fields
/// * `gravity` - Gravity vector in meters per second squared
/// * `air_density` - Sea-level air density in kg/m³ affecting drag calculations
/// * `wind` - Wind velocity vector in meters per second
/// * `temperature` - Ambient temperature in Celsius affecting air density
/// * `altitude` - Altitude in meters affecting air density
/// * `max_delta_time` - Longest single integration step; longer frames are sub-stepped
/// * `max_substeps` - Most sub-steps per frame; frame time beyond that is dropped
/// * `catch_up_distance` - Distance over which the visual muzzle offset fades out
/// * `air_resistance` - Enables drag
/// * `spin` - Enables the Magnus term
/// * `ricochet` / `penetration` - Enable the respective impact outcomes
/// * `fallback_direction` - Direction used when a spawn direction or velocity is degenerate
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_bullet_sim::resources::BallisticsEnvironment;
///
/// let env = BallisticsEnvironment {
///     wind: Vec3::new(2.0, 0.0, 0.0),
///     altitude: 100.0,
///     ..Default::default()
/// };
/// assert!(env.effective_air_density() < env.air_density);
/// ```
#[derive(Resource, Reflect, Clone, Debug, PartialEq)]
#[reflect(Resource)]
pub struct BallisticsEnvironment {
    /// Gravity vector (m/s²)
    pub gravity: Vec3,
    /// Air density at sea level and 15 °C (kg/m³)
    pub air_density: f32,
    /// Wind velocity vector (m/s)
    pub wind: Vec3,
    /// Temperature affecting air density calculations (Celsius)
    pub temperature: f32,
    /// Altitude affecting air density (meters)
    pub altitude: f32,
    /// Maximum integration step (seconds)
    pub max_delta_time: f32,
    /// Maximum sub-steps per frame
    pub max_substeps: u32,
    /// Distance over which visual offsets converge onto the flight path (meters)
    pub catch_up_distance: f32,
    /// Apply aerodynamic drag
    pub air_resistance: bool,
    /// Apply spin (Magnus) acceleration
    pub spin: bool,
    /// Allow ricochets
    pub ricochet: bool,
    /// Allow penetration
    pub penetration: bool,
    /// Direction substituted for zero-length or non-finite directions
    pub fallback_direction: Vec3,
}

impl Default for BallisticsEnvironment {
    /// Earth-like conditions at sea level with every feature enabled.
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            air_density: 1.225,
            wind: Vec3::ZERO,
            temperature: 15.0,
            altitude: 0.0,
            max_delta_time: 1.0 / 60.0,
            max_substeps: 256,
            catch_up_distance: 10.0,
            air_resistance: true,
            spin: true,
            ricochet: true,
            penetration: true,
            fallback_direction: Vec3::NEG_Z,
        }
    }
}

impl BallisticsEnvironment {
    /// Vacuum with no gravity: bullets fly in straight lines.
    pub fn vacuum() -> Self {
        Self {
            gravity: Vec3::ZERO,
            air_resistance: false,
            spin: false,
            ..Default::default()
        }
    }

    /// Calculate adjusted air density based on altitude and temperature.
    ///
    /// Uses a simplified barometric formula.
    pub fn effective_air_density(&self) -> f32 {
        let temp_kelvin = self.temperature + 273.15;
        let pressure_ratio = (-self.altitude / 8500.0).exp();
        self.air_density * pressure_ratio * (288.15 / temp_kelvin)
    }

    /// Unit fallback direction, defaulting to -Z if the configured one is unusable.
    pub fn fallback_dir(&self) -> Vec3 {
        self.fallback_direction
            .try_normalize()
            .unwrap_or(Vec3::NEG_Z)
    }

    /// Number of sub-steps and their length for a frame of `dt` seconds.
    ///
    /// Frames longer than [`max_frame_time`](Self::max_frame_time) get
    /// `max_substeps` full-length steps; the rest of the frame is not integrated.
    pub fn substeps(&self, dt: f32) -> (u32, f32) {
        if dt <= 0.0 || !dt.is_finite() {
            return (0, 0.0);
        }
        if !(self.max_delta_time > 0.0) {
            return (1, dt);
        }
        let limit = self.max_substeps.max(1);
        let steps = (dt / self.max_delta_time).ceil().max(1.0);
        if steps > limit as f32 {
            return (limit, self.max_delta_time);
        }
        let steps = steps as u32;
        (steps, dt / steps as f32)
    }

    /// Longest frame integrated in full.
    pub fn max_frame_time(&self) -> f32 {
        if self.max_delta_time > 0.0 {
            self.max_delta_time * self.max_substeps.max(1) as f32
        } else {
            f32::INFINITY
        }
    }
}

/// Policy applied when a spawn would exceed the registry capacity.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Reflect)]
pub enum CapacityPolicy {
    /// Refuse the new bullet with [`SpawnError::CapacityExhausted`](crate::error::SpawnError)
    #[default]
    Reject,
    /// Double the capacity (amortised growth off the hot path)
    Grow,
}

/// Global configuration for the ballistics system.
///
/// # Fields
/// * `capacity` - Number of registry slots pre-allocated at startup
/// * `capacity_policy` - What happens when every slot is occupied
/// * `physics_model` - Integration method
/// * `max_projectile_distance` - Distance in meters after which bullets expire
/// * `min_projectile_speed` - Speed below which a bullet is spent
/// * `max_penetration_depth` - Longest exit probe cast through a surface
/// * `surface_skin` - Offset applied when leaving a surface so it is not hit again
/// * `seed` - Seed for the deterministic per-bullet random streams
/// * `debug_draw` - Whether to draw active bullets with gizmos
///
/// # Example
/// ```
/// use bevy_bullet_sim::resources::{BallisticsConfig, CapacityPolicy};
///
/// let config = BallisticsConfig {
///     capacity: 256,
///     capacity_policy: CapacityPolicy::Grow,
///     ..Default::default()
/// };
/// assert_eq!(config.capacity, 256);
/// ```
#[derive(Resource, Reflect, Clone, Debug)]
#[reflect(Resource)]
pub struct BallisticsConfig {
    /// Initial registry capacity
    pub capacity: usize,
    /// Behaviour when the registry is full
    pub capacity_policy: CapacityPolicy,
    /// Integration method
    pub physics_model: PhysicsModel,
    /// Maximum projectile distance before expiry (meters)
    pub max_projectile_distance: f32,
    /// Minimum projectile speed before expiry (m/s).
    /// Bullets slower than this after impact or flight are considered spent.
    pub min_projectile_speed: f32,
    /// Maximum exit probe depth (meters)
    pub max_penetration_depth: f32,
    /// Offset from surfaces after ricochet or exit (meters)
    pub surface_skin: f32,
    /// Seed for per-bullet random streams
    pub seed: u64,
    /// Debug visualization
    pub debug_draw: bool,
}

impl Default for BallisticsConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            capacity_policy: CapacityPolicy::Reject,
            physics_model: PhysicsModel::SemiImplicitEuler,
            max_projectile_distance: 2000.0,
            min_projectile_speed: 20.0,
            max_penetration_depth: 1.0,
            surface_skin: 0.001,
            seed: 0x5EED_B011_E7,
            debug_draw: false,
        }
    }
}
