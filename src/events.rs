//! Messages exchanged between the host app and the ballistics plugin.
//!
//! Note: In Bevy 0.18, buffered events use the `Message` trait instead of `Event`.

use std::sync::Arc;

use bevy::ecs::message::Message;
use bevy::prelude::*;

use crate::error::SpawnError;
use crate::handlers::{HandledFlags, Interaction};
use crate::simulation::{DestroyedBullet, InteractionEvent, Shot};
use crate::template::BulletTemplate;

/// Request to fire a weapon.
///
/// Consumed by the core plugin before the next fixed tick; every pellet of
/// the template is spawned, or none when the registry cannot hold them all.
///
/// # Fields
/// * `position` - World-space muzzle position
/// * `direction` - Direction of the shot (normalized on spawn)
/// * `visual_offset` - Offset of the visual muzzle from the physical one
/// * `template` - Ammunition fired
/// * `shooter` - Optional entity that fired (carried into every interaction)
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use bevy::prelude::*;
/// use bevy_bullet_sim::events::FireEvent;
/// use bevy_bullet_sim::template::presets;
///
/// let fire_event = FireEvent::new(Vec3::new(0.0, 1.5, 0.0), Vec3::NEG_Z, Arc::new(presets::rifle()))
///     .with_visual_offset(Vec3::new(0.1, -0.1, 0.0))
///     .with_shooter(Entity::PLACEHOLDER);
/// ```
#[derive(Message, Clone)]
pub struct FireEvent {
    pub position: Vec3,
    pub direction: Vec3,
    pub visual_offset: Vec3,
    pub template: Arc<BulletTemplate>,
    pub shooter: Option<Entity>,
}

impl FireEvent {
    pub fn new(position: Vec3, direction: Vec3, template: Arc<BulletTemplate>) -> Self {
        Self {
            position,
            direction,
            visual_offset: Vec3::ZERO,
            template,
            shooter: None,
        }
    }

    /// Sets the offset of the visual muzzle (e.g. a weapon model held off-center).
    pub fn with_visual_offset(mut self, offset: Vec3) -> Self {
        self.visual_offset = offset;
        self
    }

    /// Sets the shooter entity for ownership tracking.
    pub fn with_shooter(mut self, shooter: Entity) -> Self {
        self.shooter = Some(shooter);
        self
    }

    /// The shot this event describes.
    pub fn to_shot(&self) -> Shot {
        Shot {
            position: self.position,
            direction: self.direction,
            visual_offset: self.visual_offset,
            template: self.template.clone(),
            shooter: self.shooter,
        }
    }
}

/// A fire request that could not be spawned.
#[derive(Message, Clone, Debug)]
pub struct FireRejected {
    pub shooter: Option<Entity>,
    pub error: SpawnError,
}

/// A dispatched interaction: stop, enter, exit or ricochet.
///
/// `handled` holds the effects the handler chain already produced, so
/// listeners can skip duplicates (decals, sounds).
#[derive(Message, Clone)]
pub struct BulletInteraction {
    pub interaction: Interaction,
    pub handled: HandledFlags,
}

impl From<InteractionEvent> for BulletInteraction {
    fn from(event: InteractionEvent) -> Self {
        Self {
            interaction: event.interaction,
            handled: event.handled,
        }
    }
}

/// A bullet left the simulation.
#[derive(Message, Clone, Copy, Debug)]
pub struct BulletDestroyed(pub DestroyedBullet);

/// Sent right before a fixed tick advances the bullets.
#[derive(Message, Clone, Copy, Debug, PartialEq)]
pub struct BeforeBulletUpdate {
    pub tick: u64,
    pub dt: f32,
}

/// Sent after a fixed tick, once every removal and deferred action has run.
#[derive(Message, Clone, Copy, Debug, PartialEq)]
pub struct BulletUpdateCompleted {
    pub tick: u64,
    pub active: usize,
}

/// Sent before visuals are interpolated for rendering.
#[derive(Message, Clone, Copy, Debug, PartialEq)]
pub struct BeforeBulletRender {
    /// Fraction of a fixed step elapsed since the last tick
    pub alpha: f32,
}
