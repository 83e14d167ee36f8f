//! Ballistic materials and the surface-to-material table.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::handlers::ImpactHandler;
use crate::types::SurfaceId;

/// Inclusive `[min, max]` range of floats.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f32,
    pub max: f32,
}

impl FloatRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Linear interpolation between `min` and `max`, exact at both ends.
    pub fn lerp(&self, t: f32) -> f32 {
        if t >= 1.0 {
            return self.max;
        }
        let value = self.min + (self.max - self.min) * t;
        value.max(self.min.min(self.max)).min(self.min.max(self.max))
    }
}

/// How bullets interact with one kind of surface.
///
/// # Fields
/// * `energy_loss_per_unit` - Joules lost per meter travelled inside the material
/// * `exit_spread` - Cone half-angle applied to the direction on exit (radians)
/// * `ricochet_probability` - Ricochet chance at 0° (head-on) and 90° (grazing)
/// * `ricochet_bounciness` - Range the outgoing speed factor is sampled from
/// * `ricochet_spread` - Cone half-angle applied to the reflected direction (radians)
/// * `pass_through` - Bullets ignore this surface entirely
/// * `handler` - Material-level handler, attached in code after loading
///
/// # Example
/// ```
/// use bevy_bullet_sim::material::presets;
///
/// let metal = presets::metal();
/// assert!(metal.ricochet_probability_at(80.0) > metal.ricochet_probability_at(10.0));
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BallisticMaterial {
    pub name: String,
    pub energy_loss_per_unit: f32,
    pub exit_spread: f32,
    pub ricochet_probability: FloatRange,
    pub ricochet_bounciness: FloatRange,
    pub ricochet_spread: f32,
    pub pass_through: bool,
    #[serde(skip)]
    pub handler: Option<Arc<dyn ImpactHandler>>,
}

impl Default for BallisticMaterial {
    /// A generic hard surface.
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            energy_loss_per_unit: 20_000.0,
            exit_spread: 0.05,
            ricochet_probability: FloatRange::new(0.0, 0.5),
            ricochet_bounciness: FloatRange::new(0.4, 0.7),
            ricochet_spread: 0.05,
            pass_through: false,
            handler: None,
        }
    }
}

impl BallisticMaterial {
    /// Ricochet chance for an impact angle in degrees.
    ///
    /// 0° is a head-on impact and 90° is grazing. The chance grows with the
    /// square of the normalised angle, so head-on impacts rarely deflect.
    pub fn ricochet_probability_at(&self, impact_angle_deg: f32) -> f32 {
        let t = (impact_angle_deg / 90.0).clamp(0.0, 1.0);
        self.ricochet_probability.lerp(t * t)
    }

    /// Attaches a material-level handler.
    pub fn with_handler(mut self, handler: Arc<dyn ImpactHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let probability_ok = |r: FloatRange| (0.0..=1.0).contains(&r.min) && (0.0..=1.0).contains(&r.max);
        if !self.energy_loss_per_unit.is_finite() || self.energy_loss_per_unit < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "{}: energy loss must be non-negative",
                self.name
            )));
        }
        if !probability_ok(self.ricochet_probability) {
            return Err(ConfigError::Invalid(format!(
                "{}: ricochet probability must lie in [0, 1]",
                self.name
            )));
        }
        if self.ricochet_bounciness.min < 0.0 || self.ricochet_bounciness.min > self.ricochet_bounciness.max {
            return Err(ConfigError::Invalid(format!(
                "{}: ricochet bounciness range is inverted or negative",
                self.name
            )));
        }
        Ok(())
    }
}

/// Serialized form of a [`MaterialTable`].
#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MaterialTableConfig {
    pub default: BallisticMaterial,
    pub surfaces: HashMap<u32, BallisticMaterial>,
}

/// Maps surface identifiers to materials, with a default fallback.
#[derive(Clone, Default)]
pub struct MaterialTable {
    default: BallisticMaterial,
    entries: HashMap<SurfaceId, BallisticMaterial>,
}

impl MaterialTable {
    pub fn new(default: BallisticMaterial) -> Self {
        Self {
            default,
            entries: HashMap::new(),
        }
    }

    /// Parses a table from RON.
    ///
    /// ```
    /// use bevy_bullet_sim::material::MaterialTable;
    /// use bevy_bullet_sim::types::SurfaceId;
    ///
    /// let table = MaterialTable::from_ron(r#"(
    ///     default: (name: "Stone"),
    ///     surfaces: { 7: (name: "Glass", energy_loss_per_unit: 500.0) },
    /// )"#).unwrap();
    /// assert_eq!(table.resolve(Some(SurfaceId(7))).name, "Glass");
    /// assert_eq!(table.resolve(Some(SurfaceId(8))).name, "Stone");
    /// ```
    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        let config: MaterialTableConfig = ron::from_str(source)?;
        Self::from_config(config)
    }

    pub fn from_config(config: MaterialTableConfig) -> Result<Self, ConfigError> {
        config.default.validate()?;
        let mut table = Self::new(config.default);
        for (id, material) in config.surfaces {
            material.validate()?;
            table.entries.insert(SurfaceId(id), material);
        }
        Ok(table)
    }

    pub fn insert(&mut self, surface: SurfaceId, material: BallisticMaterial) -> Option<BallisticMaterial> {
        self.entries.insert(surface, material)
    }

    pub fn with(mut self, surface: SurfaceId, material: BallisticMaterial) -> Self {
        self.insert(surface, material);
        self
    }

    pub fn default_material(&self) -> &BallisticMaterial {
        &self.default
    }

    /// Material for a surface, or the default when the surface is untagged or unmapped.
    pub fn resolve(&self, surface: Option<SurfaceId>) -> &BallisticMaterial {
        match surface {
            Some(id) => self.entries.get(&id).unwrap_or_else(|| {
                debug!("no material mapped for surface {:?}, using default", id);
                &self.default
            }),
            None => &self.default,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Material presets for common surfaces.
pub mod presets {
    use super::*;

    /// Hard, difficult to penetrate, ricochets readily at shallow angles.
    pub fn concrete() -> BallisticMaterial {
        BallisticMaterial {
            name: "Concrete".to_string(),
            energy_loss_per_unit: 30_000.0,
            exit_spread: 0.08,
            ricochet_probability: FloatRange::new(0.02, 0.7),
            ricochet_bounciness: FloatRange::new(0.3, 0.5),
            ricochet_spread: 0.1,
            ..Default::default()
        }
    }

    /// Steel plate.
    pub fn metal() -> BallisticMaterial {
        BallisticMaterial {
            name: "Metal".to_string(),
            energy_loss_per_unit: 150_000.0,
            exit_spread: 0.03,
            ricochet_probability: FloatRange::new(0.05, 0.9),
            ricochet_bounciness: FloatRange::new(0.6, 0.8),
            ricochet_spread: 0.04,
            ..Default::default()
        }
    }

    pub fn wood() -> BallisticMaterial {
        BallisticMaterial {
            name: "Wood".to_string(),
            energy_loss_per_unit: 5_000.0,
            exit_spread: 0.06,
            ricochet_probability: FloatRange::new(0.0, 0.3),
            ricochet_bounciness: FloatRange::new(0.2, 0.4),
            ricochet_spread: 0.15,
            ..Default::default()
        }
    }

    /// Almost never deflects.
    pub fn flesh() -> BallisticMaterial {
        BallisticMaterial {
            name: "Flesh".to_string(),
            energy_loss_per_unit: 3_000.0,
            exit_spread: 0.1,
            ricochet_probability: FloatRange::new(0.0, 0.02),
            ricochet_bounciness: FloatRange::new(0.1, 0.2),
            ricochet_spread: 0.2,
            ..Default::default()
        }
    }

    pub fn glass() -> BallisticMaterial {
        BallisticMaterial {
            name: "Glass".to_string(),
            energy_loss_per_unit: 1_000.0,
            exit_spread: 0.02,
            ricochet_probability: FloatRange::new(0.0, 0.2),
            ricochet_bounciness: FloatRange::new(0.3, 0.5),
            ricochet_spread: 0.05,
            ..Default::default()
        }
    }

    /// Skips bullets at grazing angles, slows them quickly otherwise.
    pub fn water() -> BallisticMaterial {
        BallisticMaterial {
            name: "Water".to_string(),
            energy_loss_per_unit: 2_000.0,
            exit_spread: 0.15,
            ricochet_probability: FloatRange::new(0.0, 0.95),
            ricochet_bounciness: FloatRange::new(0.5, 0.7),
            ricochet_spread: 0.08,
            ..Default::default()
        }
    }

    pub fn dirt() -> BallisticMaterial {
        BallisticMaterial {
            name: "Dirt".to_string(),
            energy_loss_per_unit: 8_000.0,
            exit_spread: 0.12,
            ricochet_probability: FloatRange::new(0.0, 0.4),
            ricochet_bounciness: FloatRange::new(0.2, 0.4),
            ricochet_spread: 0.15,
            ..Default::default()
        }
    }

    /// Foliage and similar surfaces that never stop a bullet.
    pub fn foliage() -> BallisticMaterial {
        BallisticMaterial {
            name: "Foliage".to_string(),
            energy_loss_per_unit: 0.0,
            pass_through: true,
            ..Default::default()
        }
    }
}
