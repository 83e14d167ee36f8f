//! Simulation driver systems - host the [`BulletSimulation`] in the Bevy schedule.
//!
//! Fire requests are spawned before the fixed tick, the tick runs in
//! `FixedUpdate` against avian3d when a spatial query pipeline exists (or
//! without collisions otherwise), and visuals are interpolated in
//! `PostUpdate` from the fixed-timestep overstep.

use bevy::ecs::message::{MessageReader, MessageWriter};
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;

use crate::components::{WeaponZeroing, ZeroingInProgress, ZeroingRequest};
use crate::error::ZeroingError;
use crate::events::{
    BeforeBulletRender, BeforeBulletUpdate, BulletDestroyed, BulletInteraction, BulletUpdateCompleted, FireEvent,
    FireRejected,
};
use crate::resources::BallisticsEnvironment;
use crate::simulation::{BulletSimulation, TickReport};
use crate::systems::zeroing::{Zeroing, ZeroingResult};
use crate::types::RaycastBackend;
use crate::world::NoCollision;

#[cfg(feature = "dim3")]
use crate::systems::collision::AvianRaycaster;

/// Writers for everything a tick reports.
#[derive(SystemParam)]
pub struct TickWriters<'w> {
    before: MessageWriter<'w, BeforeBulletUpdate>,
    completed: MessageWriter<'w, BulletUpdateCompleted>,
    interactions: MessageWriter<'w, BulletInteraction>,
    destroyed: MessageWriter<'w, BulletDestroyed>,
}

/// Copies the environment resource into the simulation.
///
/// Runs only when the resource changed, and always between ticks, so a tick
/// never sees a partially edited environment.
pub fn sync_environment(env: Res<BallisticsEnvironment>, mut sim: ResMut<BulletSimulation>) {
    if env.is_changed() {
        sim.set_environment(env.clone());
    }
}

/// Spawns bullets for every pending [`FireEvent`].
///
/// Rejected shots are reported through [`FireRejected`]; nothing else is
/// dropped to make room.
///
/// # Arguments
/// * `fire_events` - Message reader for fire requests
/// * `sim` - The simulation resource
/// * `rejected` - Message writer for refused shots
pub fn spawn_fired_bullets(
    mut fire_events: MessageReader<FireEvent>,
    mut sim: ResMut<BulletSimulation>,
    mut rejected: MessageWriter<FireRejected>,
) {
    for event in fire_events.read() {
        if let Err(error) = sim.fire(&event.to_shot(), || None) {
            rejected.write(FireRejected {
                shooter: event.shooter,
                error,
            });
        }
    }
}

/// Advances the simulation one fixed step against the avian3d world.
#[cfg(feature = "dim3")]
pub fn advance_with_physics(
    time: Res<Time<Fixed>>,
    mut sim: ResMut<BulletSimulation>,
    raycaster: AvianRaycaster,
    mut writers: TickWriters,
) {
    run_tick(time.delta_secs(), &mut sim, &raycaster, &mut writers);
}

/// Advances the simulation one fixed step with nothing to collide with.
pub fn advance_without_collisions(
    time: Res<Time<Fixed>>,
    mut sim: ResMut<BulletSimulation>,
    mut writers: TickWriters,
) {
    run_tick(time.delta_secs(), &mut sim, &NoCollision, &mut writers);
}

fn run_tick<B: RaycastBackend + ?Sized>(dt: f32, sim: &mut BulletSimulation, backend: &B, writers: &mut TickWriters) {
    writers.before.write(BeforeBulletUpdate {
        tick: sim.tick_count() + 1,
        dt,
    });
    let report = sim.tick(dt, backend);
    forward_report(report, writers);
}

fn forward_report(report: TickReport, writers: &mut TickWriters) {
    writers
        .interactions
        .write_batch(report.interactions.into_iter().map(BulletInteraction::from));
    writers
        .destroyed
        .write_batch(report.destroyed.into_iter().map(BulletDestroyed));
    writers.completed.write(BulletUpdateCompleted {
        tick: report.tick,
        active: report.active,
    });
}

/// Interpolates bullet visuals between the last two fixed steps.
pub fn interpolate_visuals(
    time: Res<Time<Fixed>>,
    mut sim: ResMut<BulletSimulation>,
    mut before_render: MessageWriter<BeforeBulletRender>,
) {
    let alpha = time.overstep_fraction();
    before_render.write(BeforeBulletRender { alpha });
    sim.before_render(alpha);
}

/// Starts zeroing for new [`ZeroingRequest`]s.
///
/// Drag-free requests are answered in place; the rest continue as a
/// [`ZeroingInProgress`] task.
pub fn start_zeroing(mut commands: Commands, requests: Query<(Entity, &ZeroingRequest)>) {
    for (entity, request) in requests.iter() {
        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<ZeroingRequest>();
        match Zeroing::start(request.params.clone()) {
            Zeroing::Ready(result) => {
                if let Some(zeroing) = zeroing_component(entity, result) {
                    entity_commands.insert(zeroing);
                }
            }
            Zeroing::Pending(task) => {
                entity_commands.insert(ZeroingInProgress(task));
            }
        }
    }
}

/// Collects finished background zeroing tasks.
pub fn poll_zeroing(mut commands: Commands, mut tasks: Query<(Entity, &mut ZeroingInProgress)>) {
    for (entity, mut in_progress) in tasks.iter_mut() {
        let Some(result) = in_progress.0.poll() else {
            continue;
        };
        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<ZeroingInProgress>();
        if let Some(zeroing) = zeroing_component(entity, result) {
            entity_commands.insert(zeroing);
        }
    }
}

fn zeroing_component(entity: Entity, result: Result<Vec<ZeroingResult>, ZeroingError>) -> Option<WeaponZeroing> {
    match result {
        Ok(results) => {
            debug!("zeroed {:?} for {} distance(s)", entity, results.len());
            Some(WeaponZeroing::new(results))
        }
        Err(err) => {
            warn!("zeroing failed for {:?}: {}", entity, err);
            None
        }
    }
}
