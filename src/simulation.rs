//! The simulation context.
//!
//! [`BulletSimulation`] owns the registry, the environment snapshot and the
//! material table, and advances every bullet in one [`tick`]:
//!
//! * (a) integrate all bullets (parallel) and build their raycast segments
//! * (b) cast every segment in one batch
//! * (c) decide each hit and finalize penetrations (parallel), casting the
//!   exit probes of all penetrating bullets as a second batch in between
//! * (d) dispatch interaction records through the handler chains and update
//!   visuals (sequential, in dense order)
//! * (e) prune stopped and expired bullets, then run due deferred actions
//!
//! Nothing reaches the registry from outside a phase boundary: handlers and
//! deferred actions go through [`DispatchContext`] and [`DeferredAction`].
//!
//! [`tick`]: BulletSimulation::tick

use std::sync::Arc;

use bevy::prelude::*;
use rand::prelude::*;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::SpawnError;
use crate::handlers::{DispatchContext, HandledFlags, HandlerChain, ImpactHandler, Interaction};
use crate::material::MaterialTable;
use crate::registry::{BulletRegistry, BulletState};
use crate::resources::{BallisticsConfig, BallisticsEnvironment, CapacityPolicy};
use crate::systems::collision::{cast_blocking, cast_segments};
use crate::systems::kinematics;
use crate::systems::preview::{self, PreviewResult, PreviewSettings};
use crate::systems::surface::{self, HitDecision, ImpactRecord};
use crate::template::BulletTemplate;
use crate::types::{BulletFlags, BulletHandle, BulletPose, HitResult, RayOutcome, RaySegment, RaycastBackend};

/// Per-bullet visual callbacks.
///
/// `initialize` runs once after spawn, `update` after every tick and every
/// render interpolation, and `destroy` exactly once when the bullet leaves
/// the simulation for any reason.
pub trait BulletVisual: Send + Sync {
    fn initialize(&mut self, _pose: &BulletPose) {}
    fn update(&mut self, _pose: &BulletPose) {}
    fn destroy(&mut self) {}
}

/// Context paired with each bullet, kept out of the packed state array.
pub struct ManagedBullet {
    pub template: Arc<BulletTemplate>,
    pub visual: Option<Box<dyn BulletVisual>>,
    pub shooter: Option<Entity>,
}

/// A fire request.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use bevy::prelude::*;
/// use bevy_bullet_sim::prelude::*;
/// use bevy_bullet_sim::template::presets;
///
/// let shot = Shot::new(Vec3::ZERO, Vec3::NEG_Z, Arc::new(presets::rifle()))
///     .with_visual_offset(Vec3::new(0.1, -0.05, 0.0));
/// let mut sim = BulletSimulation::default();
/// let handle = sim.spawn(&shot, None).unwrap();
/// assert!(sim.get(handle).is_some());
/// ```
#[derive(Clone)]
pub struct Shot {
    pub position: Vec3,
    pub direction: Vec3,
    pub visual_offset: Vec3,
    pub template: Arc<BulletTemplate>,
    pub shooter: Option<Entity>,
}

impl Shot {
    pub fn new(position: Vec3, direction: Vec3, template: Arc<BulletTemplate>) -> Self {
        Self {
            position,
            direction,
            visual_offset: Vec3::ZERO,
            template,
            shooter: None,
        }
    }

    pub fn with_visual_offset(mut self, offset: Vec3) -> Self {
        self.visual_offset = offset;
        self
    }

    pub fn with_shooter(mut self, shooter: Entity) -> Self {
        self.shooter = Some(shooter);
        self
    }

    /// Physical state of a bullet leaving the muzzle along `direction`.
    ///
    /// Zero-length or non-finite directions are replaced by the
    /// environment's fallback direction and the bullet is flagged
    /// `DEGENERATE`.
    pub fn initial_state(
        &self,
        direction: Vec3,
        env: &BallisticsEnvironment,
        rng_seed: u64,
    ) -> Result<BulletState, SpawnError> {
        if !self.position.is_finite() {
            return Err(SpawnError::NonFinitePosition(self.position));
        }
        let template = &self.template;
        let mut flags = BulletFlags::NONE;
        let direction = match direction.try_normalize() {
            Some(direction) => direction,
            None => {
                warn!("degenerate fire direction {:?}, using fallback", direction);
                flags.insert(BulletFlags::DEGENERATE);
                env.fallback_dir()
            }
        };

        Ok(BulletState {
            position: self.position,
            prev_position: self.position,
            velocity: direction * template.speed,
            spin: direction * template.spin,
            lifetime: template.lifetime,
            elapsed: 0.0,
            distance: 0.0,
            hit_mask: template.hit_mask,
            flags,
            mass: template.mass,
            drag_factor: template.drag_factor(),
            magnus_factor: template.magnus_factor(),
            rng_seed,
            visual_offset: if self.visual_offset.is_finite() {
                self.visual_offset
            } else {
                Vec3::ZERO
            },
            muzzle_speed: template.speed,
        })
    }
}

/// Why a bullet left the simulation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DestroyReason {
    /// Stopped against or inside a surface
    Stopped,
    /// Ran out of lifetime, range or speed
    Expired,
    /// Removed by `despawn`, a handler request or a deferred action
    Despawned,
    /// Removed by `clear`
    Cleared,
}

/// Final record of a destroyed bullet.
#[derive(Clone, Copy, Debug)]
pub struct DestroyedBullet {
    pub handle: BulletHandle,
    pub reason: DestroyReason,
    pub position: Vec3,
    pub distance: f32,
    pub flags: BulletFlags,
    pub shooter: Option<Entity>,
}

/// An interaction after dispatch, with the effects the handlers produced.
#[derive(Clone)]
pub struct InteractionEvent {
    pub interaction: Interaction,
    pub handled: HandledFlags,
}

/// Summary of one tick.
#[derive(Default, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub dt: f32,
    /// Live bullets after pruning
    pub active: usize,
    /// Bullets whose segment struck something
    pub hits: usize,
    /// Records dropped because their bullet was removed first
    pub discarded: usize,
    pub interactions: Vec<InteractionEvent>,
    /// Every bullet removed since the previous tick, including by `despawn` and `clear`
    pub destroyed: Vec<DestroyedBullet>,
}

/// Tick-boundary notifications.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickEvent {
    BeforeUpdate { tick: u64, dt: f32 },
    UpdateCompleted { tick: u64, active: usize },
    BeforeRender { alpha: f32 },
}

/// Work scheduled for a later tick.
pub enum DeferredAction {
    Despawn(BulletHandle),
    Call(Box<dyn FnOnce(&mut BulletSimulation) + Send + Sync>),
}

struct Deferred {
    deadline: f64,
    sequence: u64,
    action: DeferredAction,
}

type TickListener = Box<dyn FnMut(&TickEvent) + Send + Sync>;

#[derive(Default)]
struct Scratch {
    segments: Vec<RaySegment>,
    owners: Vec<usize>,
    outcomes: Vec<RayOutcome>,
}

/// Simulation context for one independent population of bullets.
///
/// Several simulations can coexist (tests, previews, split worlds); none of
/// them shares state with another.
#[derive(Resource)]
pub struct BulletSimulation {
    config: BallisticsConfig,
    env: BallisticsEnvironment,
    materials: MaterialTable,
    registry: BulletRegistry<ManagedBullet>,
    global_handler: Option<Arc<dyn ImpactHandler>>,
    listeners: Vec<TickListener>,
    deferred: Vec<Deferred>,
    deferred_sequence: u64,
    destroyed: Vec<DestroyedBullet>,
    spawn_rng: StdRng,
    clock: f64,
    tick: u64,
    scratch: Scratch,
}

impl Default for BulletSimulation {
    fn default() -> Self {
        Self::new(
            BallisticsConfig::default(),
            BallisticsEnvironment::default(),
            MaterialTable::default(),
        )
    }
}

impl BulletSimulation {
    pub fn new(config: BallisticsConfig, env: BallisticsEnvironment, materials: MaterialTable) -> Self {
        Self {
            registry: BulletRegistry::with_capacity(config.capacity, config.capacity_policy),
            spawn_rng: StdRng::seed_from_u64(config.seed),
            config,
            env,
            materials,
            global_handler: None,
            listeners: Vec::new(),
            deferred: Vec::new(),
            deferred_sequence: 0,
            destroyed: Vec::new(),
            clock: 0.0,
            tick: 0,
            scratch: Scratch::default(),
        }
    }

    pub fn config(&self) -> &BallisticsConfig {
        &self.config
    }

    pub fn environment(&self) -> &BallisticsEnvironment {
        &self.env
    }

    /// Replaces the environment; takes effect from the next tick.
    pub fn set_environment(&mut self, env: BallisticsEnvironment) {
        self.env = env;
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn set_materials(&mut self, materials: MaterialTable) {
        self.materials = materials;
    }

    /// Handler run last for every interaction.
    pub fn set_global_handler(&mut self, handler: Option<Arc<dyn ImpactHandler>>) {
        self.global_handler = handler;
    }

    pub fn add_tick_listener(&mut self, listener: impl FnMut(&TickEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Seconds simulated so far.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Spawns one bullet along the shot direction, ignoring pellet settings.
    pub fn spawn(&mut self, shot: &Shot, visual: Option<Box<dyn BulletVisual>>) -> Result<BulletHandle, SpawnError> {
        shot.template.validate()?;
        let seed = self.spawn_rng.random();
        let state = shot.initial_state(shot.direction, &self.env, seed)?;
        self.insert(state, shot, visual)
    }

    /// Fires a shot: `pellet_count` bullets spread inside `pellet_spread`.
    ///
    /// Under [`CapacityPolicy::Reject`] the whole shot is refused when not
    /// every pellet fits, so a shot never arrives partially.
    pub fn fire(
        &mut self,
        shot: &Shot,
        mut make_visual: impl FnMut() -> Option<Box<dyn BulletVisual>>,
    ) -> Result<Vec<BulletHandle>, SpawnError> {
        let template = shot.template.clone();
        template.validate()?;

        let pellets = template.pellet_count.max(1) as usize;
        if self.config.capacity_policy == CapacityPolicy::Reject
            && self.registry.count() + pellets > self.registry.capacity()
        {
            warn!(
                "rejecting {} pellet(s) of {}: registry full ({} slots)",
                pellets,
                template.name,
                self.registry.capacity()
            );
            return Err(SpawnError::CapacityExhausted {
                capacity: self.registry.capacity(),
            });
        }

        let base = shot.direction.try_normalize().unwrap_or(shot.direction);
        let mut handles = Vec::with_capacity(pellets);
        for _ in 0..pellets {
            let direction = if template.pellet_spread > 0.0 && base.is_normalized() {
                surface::perturb_direction(base, template.pellet_spread, &mut self.spawn_rng).0
            } else {
                base
            };
            let seed = self.spawn_rng.random();
            let state = shot.initial_state(direction, &self.env, seed)?;
            handles.push(self.insert(state, shot, make_visual())?);
        }
        Ok(handles)
    }

    fn insert(
        &mut self,
        state: BulletState,
        shot: &Shot,
        visual: Option<Box<dyn BulletVisual>>,
    ) -> Result<BulletHandle, SpawnError> {
        let pose = pose_of(&state, self.env.catch_up_distance);
        let managed = ManagedBullet {
            template: shot.template.clone(),
            visual,
            shooter: shot.shooter,
        };
        let handle = self.registry.insert(state, managed).inspect_err(|err| {
            warn!("failed to spawn {}: {}", shot.template.name, err);
        })?;
        if let Some(visual) = self
            .registry
            .managed_mut(handle)
            .and_then(|managed| managed.visual.as_mut())
        {
            visual.initialize(&pose);
        }
        Ok(handle)
    }

    /// Removes a bullet now. Returns `false` for stale handles.
    pub fn despawn(&mut self, handle: BulletHandle) -> bool {
        self.remove(handle, DestroyReason::Despawned)
    }

    /// Removes every bullet, calling each visual's `destroy` once.
    ///
    /// Returns how many bullets were removed.
    pub fn clear(&mut self) -> usize {
        let destroyed = &mut self.destroyed;
        let mut removed = 0;
        self.registry.drain(|handle, state, managed| {
            destroyed.push(finish(handle, &state, managed, DestroyReason::Cleared));
            removed += 1;
        });
        if removed > 0 {
            info!("cleared {} bullet(s)", removed);
        }
        removed
    }

    fn remove(&mut self, handle: BulletHandle, reason: DestroyReason) -> bool {
        match self.registry.remove(handle) {
            Some((state, managed)) => {
                self.destroyed.push(finish(handle, &state, managed, reason));
                true
            }
            None => false,
        }
    }

    /// Runs `action` once `delay` seconds of simulation time have passed.
    pub fn schedule(&mut self, delay: f32, action: DeferredAction) {
        self.deferred_sequence += 1;
        self.deferred.push(Deferred {
            deadline: self.clock + delay.max(0.0) as f64,
            sequence: self.deferred_sequence,
            action,
        });
    }

    pub fn pending_actions(&self) -> usize {
        self.deferred.len()
    }

    pub fn active_count(&self) -> usize {
        self.registry.count()
    }

    /// Read-only view of every live bullet.
    pub fn iter_active(&self) -> impl Iterator<Item = (BulletHandle, &BulletState)> + '_ {
        self.registry.iter()
    }

    pub fn get(&self, handle: BulletHandle) -> Option<&BulletState> {
        self.registry.get(handle)
    }

    pub fn template_of(&self, handle: BulletHandle) -> Option<&Arc<BulletTemplate>> {
        self.registry.managed(handle).map(|managed| &managed.template)
    }

    /// Flight path of `shot` under this simulation's environment, config and
    /// materials, without spawning it.
    pub fn preview<B: RaycastBackend + ?Sized>(
        &self,
        shot: &Shot,
        backend: &B,
        settings: PreviewSettings,
        out: &mut Vec<Vec3>,
    ) -> Result<PreviewResult, SpawnError> {
        preview::simulate(shot, &self.env, &self.config, &self.materials, backend, settings, out)
    }

    /// Advances the simulation by `dt` seconds against `backend`.
    pub fn tick<B: RaycastBackend + ?Sized>(&mut self, dt: f32, backend: &B) -> TickReport {
        self.tick += 1;
        let mut dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let max_frame = self.env.max_frame_time();
        if dt > max_frame {
            warn!(
                "ballistics frame of {:.3}s exceeds {:.3}s, dropping {:.3}s",
                dt,
                max_frame,
                dt - max_frame
            );
            dt = max_frame;
        }
        self.emit(TickEvent::BeforeUpdate { tick: self.tick, dt });

        let mut report = TickReport {
            tick: self.tick,
            dt,
            ..Default::default()
        };

        if dt > 0.0 && !self.registry.is_empty() {
            let records = self.simulate(dt, backend, &mut report);
            self.dispatch(records, &mut report);
            self.update_visuals();
        }

        self.clock += dt as f64;
        self.prune();
        self.run_deferred();

        report.destroyed = std::mem::take(&mut self.destroyed);
        report.active = self.registry.count();
        debug!(
            "ballistics tick {}: {} active, {} hits, {} interactions, {} destroyed",
            report.tick,
            report.active,
            report.hits,
            report.interactions.len(),
            report.destroyed.len()
        );
        self.emit(TickEvent::UpdateCompleted {
            tick: self.tick,
            active: report.active,
        });
        report
    }

    /// Phases (a) to (c): pure per-bullet work plus the two raycast batches.
    fn simulate<B: RaycastBackend + ?Sized>(
        &mut self,
        dt: f32,
        backend: &B,
        report: &mut TickReport,
    ) -> Vec<(BulletHandle, ImpactRecord)> {
        let env = &self.env;
        let config = &self.config;
        let materials = &self.materials;
        let model = config.physics_model;
        let scratch = &mut self.scratch;

        // (a) integrate
        let integrate = |state: &mut BulletState| -> Option<RaySegment> {
            if state.flags.is_terminal() {
                return None;
            }
            state.prev_position = state.position;
            if !kinematics::advance(state, dt, env, model) {
                return None;
            }
            RaySegment::between(state.prev_position, state.position, state.hit_mask)
        };
        #[cfg(feature = "parallel")]
        let segments: Vec<Option<RaySegment>> =
            self.registry.states_mut().par_iter_mut().map(integrate).collect();
        #[cfg(not(feature = "parallel"))]
        let segments: Vec<Option<RaySegment>> =
            self.registry.states_mut().iter_mut().map(integrate).collect();

        // (b) one batch for every moving bullet, plus follow-up batches past pass-through surfaces
        let count = segments.len();
        scratch.segments.clear();
        scratch.owners.clear();
        for (index, segment) in segments.iter().enumerate() {
            if let Some(segment) = segment {
                scratch.segments.push(*segment);
                scratch.owners.push(index);
            }
        }
        let mut hits: Vec<Option<(HitResult, f32)>> = vec![None; count];
        let results = cast_blocking(backend, &scratch.segments, materials, &mut scratch.outcomes);
        for ((hit, &owner), segment) in results.into_iter().zip(&scratch.owners).zip(&scratch.segments) {
            hits[owner] = hit.map(|hit| (hit, segment.length));
        }
        report.hits = hits.iter().filter(|hit| hit.is_some()).count();
        if report.hits == 0 {
            return Vec::new();
        }

        // (c) decide
        let decide = |(state, hit): (&mut BulletState, &Option<(HitResult, f32)>)| -> Option<HitDecision> {
            let (hit, segment_length) = (*hit)?;
            let material = materials.resolve(hit.surface);
            Some(surface::decide_impact(state, &hit, segment_length, material, env, config))
        };
        #[cfg(feature = "parallel")]
        let decisions: Vec<Option<HitDecision>> = self
            .registry
            .states_mut()
            .par_iter_mut()
            .zip(hits.par_iter())
            .map(decide)
            .collect();
        #[cfg(not(feature = "parallel"))]
        let decisions: Vec<Option<HitDecision>> = self
            .registry
            .states_mut()
            .iter_mut()
            .zip(hits.iter())
            .map(decide)
            .collect();

        // (b) exit probes of every penetrating bullet, batched
        scratch.segments.clear();
        scratch.owners.clear();
        for (index, decision) in decisions.iter().enumerate() {
            if let Some(HitDecision::Penetrating(pending)) = decision {
                scratch.segments.push(pending.probe);
                scratch.owners.push(index);
            }
        }
        let mut probes: Vec<Option<HitResult>> = vec![None; count];
        let results = cast_segments(backend, &scratch.segments, &mut scratch.outcomes);
        for (hit, &owner) in results.into_iter().zip(&scratch.owners) {
            probes[owner] = hit;
        }

        // (c) finalize
        let finalize = |(index, (state, decision)): (usize, (&mut BulletState, &Option<HitDecision>))| {
            match decision {
                Some(HitDecision::Resolved(record)) => [Some((index, *record)), None],
                Some(HitDecision::Penetrating(pending)) => {
                    let material = materials.resolve(pending.entry.surface);
                    let [enter, outcome] =
                        surface::finalize_penetration(state, pending, probes[index], material, env, config);
                    [Some((index, enter)), Some((index, outcome))]
                }
                Some(HitDecision::Ignored) | None => [None, None],
            }
        };
        #[cfg(feature = "parallel")]
        let records: Vec<(usize, ImpactRecord)> = self
            .registry
            .states_mut()
            .par_iter_mut()
            .zip(decisions.par_iter())
            .enumerate()
            .flat_map_iter(|item| finalize(item).into_iter().flatten())
            .collect();
        #[cfg(not(feature = "parallel"))]
        let records: Vec<(usize, ImpactRecord)> = self
            .registry
            .states_mut()
            .iter_mut()
            .zip(decisions.iter())
            .enumerate()
            .flat_map(|item| finalize(item).into_iter().flatten())
            .collect();

        // dense indices shift once removals start, so pin handles now
        records
            .into_iter()
            .filter_map(|(index, record)| Some((self.registry.handle_at(index)?, record)))
            .collect()
    }

    /// Phase (d): handler chains in dense order, one record at a time.
    fn dispatch(&mut self, records: Vec<(BulletHandle, ImpactRecord)>, report: &mut TickReport) {
        let mut ctx = DispatchContext::default();

        for (handle, record) in records {
            let (Some(state), Some(managed)) = (self.registry.get(handle), self.registry.managed(handle)) else {
                report.discarded += 1;
                continue;
            };

            let interaction = Interaction {
                kind: record.kind,
                bullet: handle,
                hit: record.hit,
                impact_velocity: record.impact_velocity,
                velocity: record.velocity,
                spread_angle: record.spread_angle,
                speed_factor: record.speed_factor,
                energy: record.energy,
                penetration_depth: record.penetration_depth,
                remaining_lifetime: state.lifetime.max(0.0),
                distance_traveled: state.distance,
                template: managed.template.clone(),
                shooter: managed.shooter,
            };

            let chain = HandlerChain {
                bullet: interaction.template.handler.as_deref(),
                material: self.materials.resolve(record.hit.surface).handler.as_deref(),
                global: self.global_handler.as_deref(),
            };
            let handled = chain.dispatch(&interaction, &mut ctx);
            report.interactions.push(InteractionEvent { interaction, handled });

            for handle in ctx.despawn_requests.drain(..) {
                self.remove(handle, DestroyReason::Despawned);
            }
            if std::mem::take(&mut ctx.teardown_requested) {
                self.clear();
            }
        }
    }

    fn update_visuals(&mut self) {
        let catch_up = self.env.catch_up_distance;
        let (states, managed) = self.registry.parts_mut();
        for (state, managed) in states.iter().zip(managed.iter_mut()) {
            if let Some(visual) = managed.visual.as_mut() {
                visual.update(&pose_of(state, catch_up));
            }
        }
    }

    /// Phase (e): removes stopped bullets and expires spent ones.
    fn prune(&mut self) {
        let max_distance = self.config.max_projectile_distance;
        let min_speed_sq = self.config.min_projectile_speed * self.config.min_projectile_speed;

        // reverse order: swap-remove only moves entries already visited
        for index in (0..self.registry.count()).rev() {
            let Some(handle) = self.registry.handle_at(index) else {
                continue;
            };
            let Some(state) = self.registry.get_mut(handle) else {
                continue;
            };

            let reason = if state.flags.contains(BulletFlags::STOPPED) {
                DestroyReason::Stopped
            } else if state.flags.contains(BulletFlags::EXPIRED)
                || state.lifetime <= 0.0
                || state.distance >= max_distance
                || state.velocity.length_squared() < min_speed_sq
            {
                state.flags.insert(BulletFlags::EXPIRED);
                DestroyReason::Expired
            } else {
                continue;
            };
            self.remove(handle, reason);
        }
    }

    fn run_deferred(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        let clock = self.clock;
        let (mut due, pending): (Vec<Deferred>, Vec<Deferred>) =
            std::mem::take(&mut self.deferred)
                .into_iter()
                .partition(|entry| entry.deadline <= clock);
        self.deferred = pending;
        due.sort_by(|a, b| a.deadline.total_cmp(&b.deadline).then(a.sequence.cmp(&b.sequence)));

        for entry in due {
            match entry.action {
                DeferredAction::Despawn(handle) => {
                    self.remove(handle, DestroyReason::Despawned);
                }
                DeferredAction::Call(action) => action(self),
            }
        }
    }

    /// Interpolates visuals between the last two physical positions.
    ///
    /// `alpha` is the fraction of a fixed step elapsed since the last tick.
    pub fn before_render(&mut self, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        self.emit(TickEvent::BeforeRender { alpha });

        let catch_up = self.env.catch_up_distance;
        let (states, managed) = self.registry.parts_mut();
        for (state, managed) in states.iter().zip(managed.iter_mut()) {
            let Some(visual) = managed.visual.as_mut() else {
                continue;
            };
            let position = state.prev_position.lerp(state.position, alpha);
            let mut pose = pose_of(state, catch_up);
            pose.position = position + state.visual_offset * state.visual_weight(catch_up);
            visual.update(&pose);
        }
    }

    fn emit(&mut self, event: TickEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

pub(crate) fn pose_of(state: &BulletState, catch_up_distance: f32) -> BulletPose {
    BulletPose {
        position: state.visual_position(catch_up_distance),
        direction: state.direction(),
        speed: state.speed(),
    }
}

fn finish(handle: BulletHandle, state: &BulletState, mut managed: ManagedBullet, reason: DestroyReason) -> DestroyedBullet {
    if let Some(visual) = managed.visual.as_mut() {
        visual.destroy();
    }
    DestroyedBullet {
        handle,
        reason,
        position: state.position,
        distance: state.distance,
        flags: state.flags,
        shooter: managed.shooter,
    }
}
