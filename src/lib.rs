//! # Bevy Bullet Sim
//!
//! Batched ballistic bullet simulation for Bevy 0.18.
//!
//! ## Features
//! - Thousands of bullets in a dense sparse-set registry, no entity per bullet
//! - Sub-stepped flight with drag, wind, Magnus spin drift and gravity
//! - One batched raycast per tick, backed by avian3d or any [`RaycastBackend`](types::RaycastBackend)
//! - Material-driven ricochet, penetration and stopping
//! - Chained impact handlers with handled-effect flags
//! - Sight zeroing (analytic, or with drag on the async compute pool)
//! - Trajectory preview sharing the live integrator
//!
//! The [`BulletSimulation`](simulation::BulletSimulation) context works on
//! its own, without an `App`; the plugins host it inside the fixed timestep.
//!
//! ## Quick Start
//! ```rust,no_run
//! use bevy::prelude::*;
//! use bevy_bullet_sim::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(BallisticsPluginGroup)
//!         .run();
//! }
//! ```

pub mod components;
pub mod error;
pub mod events;
pub mod handlers;
pub mod material;
pub mod registry;
pub mod resources;
pub mod simulation;
pub mod systems;
pub mod template;
pub mod types;
pub mod world;

pub mod prelude {
    pub use crate::components::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::handlers::{DispatchContext, HandledFlags, HandlerResult, ImpactHandler, Interaction, InteractionKind};
    pub use crate::material::{BallisticMaterial, FloatRange, MaterialTable};
    pub use crate::resources::*;
    pub use crate::simulation::{
        BulletSimulation, BulletVisual, DeferredAction, DestroyReason, DestroyedBullet, Shot, TickEvent, TickReport,
    };
    pub use crate::systems::preview::{PreviewEnd, PreviewResult, PreviewSettings};
    pub use crate::systems::zeroing::{DragParams, ZeroingParams, ZeroingResult};
    pub use crate::template::BulletTemplate;
    pub use crate::types::*;
    pub use crate::world::{NoCollision, SlabWorld};
    pub use crate::BallisticsPluginGroup;
    pub use crate::{BallisticsCorePlugin, BallisticsDebugPlugin, BallisticsSet};
}

use bevy::prelude::*;

use material::MaterialTable;
use simulation::BulletSimulation;

/// Main plugin group that includes all ballistics subsystems.
///
/// # Example
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_bullet_sim::prelude::*;
///
/// fn main() {
///     App::new()
///         .add_plugins(DefaultPlugins)
///         .add_plugins(BallisticsPluginGroup)
///         .run();
/// }
/// ```
#[derive(Default)]
pub struct BallisticsPluginGroup;

impl PluginGroup for BallisticsPluginGroup {
    fn build(self) -> bevy::app::PluginGroupBuilder {
        bevy::app::PluginGroupBuilder::start::<Self>()
            .add(BallisticsCorePlugin::default())
            .add(BallisticsDebugPlugin)
    }
}

/// Ordering of the ballistics systems inside `FixedUpdate`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum BallisticsSet {
    /// Environment sync and fire requests
    Prepare,
    /// The tick itself
    Simulate,
}

/// Core simulation plugin.
///
/// Inserts a [`BulletSimulation`] built from the [`BallisticsConfig`] and
/// [`BallisticsEnvironment`] resources (unless one already exists), and
/// schedules:
/// - `sync_environment` / `spawn_fired_bullets` - between ticks
/// - `advance_with_physics` - the tick against avian3d, when a spatial query pipeline exists
/// - `advance_without_collisions` - the tick otherwise
/// - `interpolate_visuals` - render interpolation in `PostUpdate`
/// - `start_zeroing` / `poll_zeroing` - weapon zeroing in `Update`
///
/// [`BallisticsConfig`]: resources::BallisticsConfig
/// [`BallisticsEnvironment`]: resources::BallisticsEnvironment
#[derive(Default)]
pub struct BallisticsCorePlugin {
    /// Material table handed to the simulation
    pub materials: MaterialTable,
}

impl BallisticsCorePlugin {
    pub fn with_materials(materials: MaterialTable) -> Self {
        Self { materials }
    }
}

impl Plugin for BallisticsCorePlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<components::Surface>()
            .register_type::<components::WeaponZeroing>()
            .register_type::<components::ZeroingRequest>()
            .register_type::<resources::BallisticsEnvironment>()
            .register_type::<resources::BallisticsConfig>()
            .init_resource::<resources::BallisticsEnvironment>()
            .init_resource::<resources::BallisticsConfig>()
            .add_message::<events::FireEvent>()
            .add_message::<events::FireRejected>()
            .add_message::<events::BulletInteraction>()
            .add_message::<events::BulletDestroyed>()
            .add_message::<events::BeforeBulletUpdate>()
            .add_message::<events::BulletUpdateCompleted>()
            .add_message::<events::BeforeBulletRender>();

        if !app.world().contains_resource::<BulletSimulation>() {
            let world = app.world();
            let sim = BulletSimulation::new(
                world.resource::<resources::BallisticsConfig>().clone(),
                world.resource::<resources::BallisticsEnvironment>().clone(),
                self.materials.clone(),
            );
            app.insert_resource(sim);
        }

        app.configure_sets(FixedUpdate, (BallisticsSet::Prepare, BallisticsSet::Simulate).chain())
            .add_systems(
                FixedUpdate,
                (systems::logic::sync_environment, systems::logic::spawn_fired_bullets)
                    .chain()
                    .in_set(BallisticsSet::Prepare),
            )
            .add_systems(PostUpdate, systems::logic::interpolate_visuals)
            .add_systems(
                Update,
                (systems::logic::start_zeroing, systems::logic::poll_zeroing).chain(),
            );

        // 3D Physics Systems
        #[cfg(feature = "dim3")]
        {
            use avian3d::prelude::SpatialQueryPipeline;
            app.add_systems(
                FixedUpdate,
                (
                    systems::logic::advance_with_physics.run_if(resource_exists::<SpatialQueryPipeline>),
                    systems::logic::advance_without_collisions
                        .run_if(not(resource_exists::<SpatialQueryPipeline>)),
                )
                    .in_set(BallisticsSet::Simulate),
            );
        }

        #[cfg(not(feature = "dim3"))]
        app.add_systems(
            FixedUpdate,
            systems::logic::advance_without_collisions.in_set(BallisticsSet::Simulate),
        );
    }
}

/// Debug plugin for ballistics visualization.
pub struct BallisticsDebugPlugin;

impl Plugin for BallisticsDebugPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, systems::debug::draw_bullet_debug);
    }
}
