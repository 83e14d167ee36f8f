//! Ammunition templates.
//!
//! A [`BulletTemplate`] is immutable once loaded and shared by every bullet
//! fired with it through an `Arc`.

use std::f32::consts::PI;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SpawnError};
use crate::handlers::ImpactHandler;

/// Physical description of one ammunition type.
///
/// # Fields
/// * `speed` - Muzzle speed in meters per second
/// * `mass` - Bullet mass in kilograms
/// * `diameter` - Bullet diameter in meters
/// * `drag_coefficient` - Dimensionless drag coefficient
/// * `spin` - Spin rate around the flight axis in rad/s (positive = right-hand twist)
/// * `magnus_coefficient` - Dimensionless lift coefficient of the Magnus term
/// * `lifetime` - Seconds before the bullet expires
/// * `hit_mask` - Collision layers this bullet can hit
/// * `damage` - Base damage reported with each interaction
/// * `pellet_count` - Bullets spawned per shot
/// * `pellet_spread` - Cone half-angle for pellets in radians
/// * `handler` - Per-bullet impact handler, attached in code after loading
///
/// # Example
/// ```
/// use bevy_bullet_sim::template::BulletTemplate;
///
/// let template = BulletTemplate {
///     speed: 900.0,
///     mass: 0.004,
///     ..Default::default()
/// };
/// assert!(template.drag_factor() > 0.0);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletTemplate {
    pub name: String,
    pub speed: f32,
    pub mass: f32,
    pub diameter: f32,
    pub drag_coefficient: f32,
    pub spin: f32,
    pub magnus_coefficient: f32,
    pub lifetime: f32,
    pub hit_mask: u32,
    pub damage: f32,
    pub pellet_count: u32,
    pub pellet_spread: f32,
    #[serde(skip)]
    pub handler: Option<Arc<dyn ImpactHandler>>,
}

impl Default for BulletTemplate {
    /// A generic 10 g rifle-calibre bullet at 400 m/s.
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            speed: 400.0,
            mass: 0.01,
            diameter: 0.00762,
            drag_coefficient: 0.3,
            spin: 0.0,
            magnus_coefficient: 0.0,
            lifetime: 5.0,
            hit_mask: u32::MAX,
            damage: 25.0,
            pellet_count: 1,
            pellet_spread: 0.0,
            handler: None,
        }
    }
}

impl BulletTemplate {
    /// Parses a template from RON.
    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        let template: Self = ron::from_str(source)?;
        template
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(template)
    }

    /// Attaches a per-bullet impact handler.
    pub fn with_handler(mut self, handler: Arc<dyn ImpactHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Cross-sectional area in m².
    pub fn cross_section_area(&self) -> f32 {
        let radius = self.diameter * 0.5;
        PI * radius * radius
    }

    /// `0.5 * area * Cd / mass`; multiplied by air density and `|v|·v` it gives drag deceleration.
    pub fn drag_factor(&self) -> f32 {
        0.5 * self.cross_section_area() * self.drag_coefficient / self.mass
    }

    /// Magnus factor; multiplied by air density and `spin × v` it gives lift acceleration.
    pub fn magnus_factor(&self) -> f32 {
        0.5 * self.magnus_coefficient * self.cross_section_area() * self.diameter * 0.5 / self.mass
    }

    /// Kinetic energy at muzzle speed in joules.
    pub fn muzzle_energy(&self) -> f32 {
        0.5 * self.mass * self.speed * self.speed
    }

    pub fn validate(&self) -> Result<(), SpawnError> {
        let invalid = |reason: &str| Err(SpawnError::InvalidTemplate(format!("{}: {}", self.name, reason)));
        if !self.speed.is_finite() || self.speed < 0.0 {
            return invalid("speed must be finite and non-negative");
        }
        if !(self.mass > 0.0) || !self.mass.is_finite() {
            return invalid("mass must be positive");
        }
        if !(self.diameter > 0.0) || !self.diameter.is_finite() {
            return invalid("diameter must be positive");
        }
        if !self.drag_coefficient.is_finite() || self.drag_coefficient < 0.0 {
            return invalid("drag coefficient must be non-negative");
        }
        if !(self.lifetime > 0.0) {
            return invalid("lifetime must be positive");
        }
        if self.pellet_count == 0 {
            return invalid("pellet count must be at least 1");
        }
        Ok(())
    }
}

/// Template presets for common weapon types.
pub mod presets {
    use super::*;

    pub fn pistol() -> BulletTemplate {
        BulletTemplate {
            name: "Pistol".to_string(),
            speed: 350.0,
            mass: 0.008,
            diameter: 0.009,
            drag_coefficient: 0.35,
            spin: 150.0,
            magnus_coefficient: 0.1,
            lifetime: 3.0,
            damage: 20.0,
            ..Default::default()
        }
    }

    pub fn rifle() -> BulletTemplate {
        BulletTemplate {
            name: "Rifle".to_string(),
            speed: 900.0,
            mass: 0.004,
            diameter: 0.00556,
            drag_coefficient: 0.25,
            spin: 2500.0,
            magnus_coefficient: 0.1,
            lifetime: 4.0,
            damage: 35.0,
            ..Default::default()
        }
    }

    pub fn sniper() -> BulletTemplate {
        BulletTemplate {
            name: "Sniper".to_string(),
            speed: 1200.0,
            mass: 0.01,
            diameter: 0.00782,
            drag_coefficient: 0.2,
            spin: 3000.0,
            magnus_coefficient: 0.1,
            lifetime: 6.0,
            damage: 100.0,
            ..Default::default()
        }
    }

    /// Nine pellets in a 3° cone.
    pub fn shotgun() -> BulletTemplate {
        BulletTemplate {
            name: "Shotgun".to_string(),
            speed: 400.0,
            mass: 0.0035,
            diameter: 0.0084,
            drag_coefficient: 0.47,
            lifetime: 1.5,
            damage: 12.0,
            pellet_count: 9,
            pellet_spread: 0.05,
            ..Default::default()
        }
    }

    pub fn bow() -> BulletTemplate {
        BulletTemplate {
            name: "Bow".to_string(),
            speed: 80.0,
            mass: 0.03,
            diameter: 0.008,
            drag_coefficient: 0.5,
            spin: 50.0,
            lifetime: 8.0,
            damage: 45.0,
            ..Default::default()
        }
    }

    /// Every preset, lightest first.
    pub fn all() -> Vec<BulletTemplate> {
        vec![pistol(), rifle(), sniper(), shotgun(), bow()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_factor_matches_formula() {
        let template = BulletTemplate {
            mass: 0.01,
            diameter: 0.01,
            drag_coefficient: 0.3,
            ..Default::default()
        };
        let area = PI * 0.005 * 0.005;
        let expected = 0.5 * area * 0.3 / 0.01;
        assert!((template.drag_factor() - expected).abs() < 1.0e-9);
    }

    #[test]
    fn test_presets_are_valid_and_diverse() {
        let presets = presets::all();
        assert!(presets.len() >= 5);
        for preset in &presets {
            assert!(preset.validate().is_ok(), "{} should be valid", preset.name);
        }
        let speeds: std::collections::HashSet<u32> =
            presets.iter().map(|p| p.speed as u32).collect();
        assert!(speeds.len() > 1);
    }

    #[test]
    fn test_invalid_template_rejected() {
        let template = BulletTemplate {
            mass: 0.0,
            ..Default::default()
        };
        assert!(matches!(template.validate(), Err(SpawnError::InvalidTemplate(_))));
    }

    #[test]
    fn test_template_from_ron() {
        let template = BulletTemplate::from_ron(
            r#"(name: "Slug", speed: 450.0, mass: 0.028, diameter: 0.018, pellet_count: 1)"#,
        )
        .unwrap();
        assert_eq!(template.name, "Slug");
        assert_eq!(template.speed, 450.0);
        assert!(template.handler.is_none());
        // unspecified fields keep their defaults
        assert_eq!(template.lifetime, BulletTemplate::default().lifetime);
    }

    #[test]
    fn test_template_from_ron_rejects_invalid() {
        let result = BulletTemplate::from_ron(r#"(pellet_count: 0)"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
