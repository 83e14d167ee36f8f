//! Impact handler chain.
//!
//! Every interaction record is passed through up to three handlers in a
//! fixed order: the bullet template's handler, the struck material's
//! handler, then the simulation-wide handler. Each returns the effects it
//! produced; the flags are OR'd into an accumulator that later handlers
//! receive, so an effect already produced (damage, audio, decal...) is not
//! produced twice.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bevy::log::warn;
use bevy::prelude::*;

use crate::error::HandlerError;
use crate::template::BulletTemplate;
use crate::types::{BulletHandle, HitResult};

/// Bitmask of impact effects already produced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct HandledFlags(pub u8);

impl HandledFlags {
    pub const NONE: Self = Self(0);
    pub const DAMAGE: Self = Self(1);
    pub const AUDIO: Self = Self(1 << 1);
    pub const PARTICLES: Self = Self(1 << 2);
    pub const DECAL: Self = Self(1 << 3);
    pub const PHYSICS: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for HandledFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for HandledFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Outcome of a bullet striking a surface.
///
/// # Variants
/// * `Stop` - The bullet stopped against or inside the surface
/// * `Enter` - The bullet started penetrating the surface
/// * `Exit` - The bullet left the surface on the far side
/// * `Ricochet` - The bullet deflected off the surface
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum InteractionKind {
    Stop,
    Enter,
    Exit,
    Ricochet,
}

/// Interaction record handed to handlers and subscribers.
///
/// # Fields
/// * `kind` - What happened
/// * `bullet` - Handle of the bullet involved
/// * `hit` - Raycast hit (for `Exit`, the exit point and its outward normal)
/// * `impact_velocity` - Velocity before the interaction
/// * `velocity` - Velocity after the interaction (zero for `Stop`)
/// * `spread_angle` - Angle the direction was perturbed by (radians)
/// * `speed_factor` - Ratio of outgoing to incoming speed
/// * `energy` - Kinetic energy left after the interaction (joules)
/// * `penetration_depth` - Distance travelled inside the material (meters)
/// * `remaining_lifetime` - Seconds of flight left
/// * `distance_traveled` - Total distance flown so far (meters)
/// * `template` - Ammunition template of the bullet
/// * `shooter` - Entity that fired the bullet, if known
#[derive(Clone)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub bullet: BulletHandle,
    pub hit: HitResult,
    pub impact_velocity: Vec3,
    pub velocity: Vec3,
    pub spread_angle: f32,
    pub speed_factor: f32,
    pub energy: f32,
    pub penetration_depth: f32,
    pub remaining_lifetime: f32,
    pub distance_traveled: f32,
    pub template: Arc<BulletTemplate>,
    pub shooter: Option<Entity>,
}

/// Requests a handler may make while interactions are dispatched.
///
/// Handlers never touch the registry directly; requests are applied after
/// the record being dispatched, and records still pending for a removed
/// bullet are dropped.
#[derive(Default, Debug)]
pub struct DispatchContext {
    pub(crate) despawn_requests: Vec<BulletHandle>,
    pub(crate) teardown_requested: bool,
}

impl DispatchContext {
    /// Removes a bullet once the current record has been handled.
    pub fn request_despawn(&mut self, bullet: BulletHandle) {
        self.despawn_requests.push(bullet);
    }

    /// Removes every bullet once the current record has been handled.
    pub fn request_teardown(&mut self) {
        self.teardown_requested = true;
    }
}

/// Return type of handler callbacks.
pub type HandlerResult = Result<HandledFlags, HandlerError>;

/// Capability interface implemented by impact handlers.
///
/// Bullet and simulation-wide handlers receive `handle_impact`; material
/// handlers receive `handle_surface_interaction`. Both return the effects
/// they produced; returning an error contributes no flags.
pub trait ImpactHandler: Send + Sync {
    fn handle_impact(
        &self,
        _interaction: &Interaction,
        _handled: HandledFlags,
        _ctx: &mut DispatchContext,
    ) -> HandlerResult {
        Ok(HandledFlags::NONE)
    }

    fn handle_surface_interaction(
        &self,
        _interaction: &Interaction,
        _handled: HandledFlags,
        _ctx: &mut DispatchContext,
    ) -> HandlerResult {
        Ok(HandledFlags::NONE)
    }
}

impl<F> ImpactHandler for F
where
    F: Fn(&Interaction, HandledFlags, &mut DispatchContext) -> HandlerResult
        + Send
        + Sync,
{
    fn handle_impact(
        &self,
        interaction: &Interaction,
        handled: HandledFlags,
        ctx: &mut DispatchContext,
    ) -> HandlerResult {
        self(interaction, handled, ctx)
    }

    fn handle_surface_interaction(
        &self,
        interaction: &Interaction,
        handled: HandledFlags,
        ctx: &mut DispatchContext,
    ) -> HandlerResult {
        self(interaction, handled, ctx)
    }
}

/// Ordered handlers for one interaction.
#[derive(Default, Clone, Copy)]
pub struct HandlerChain<'a> {
    pub bullet: Option<&'a dyn ImpactHandler>,
    pub material: Option<&'a dyn ImpactHandler>,
    pub global: Option<&'a dyn ImpactHandler>,
}

impl HandlerChain<'_> {
    /// Runs the chain and returns the accumulated flags.
    ///
    /// A handler that errors or panics is logged and contributes nothing;
    /// the remaining handlers still run.
    pub fn dispatch(&self, interaction: &Interaction, ctx: &mut DispatchContext) -> HandledFlags {
        let mut handled = HandledFlags::NONE;

        if let Some(handler) = self.bullet {
            let seen = handled;
            let produced = guarded("bullet", interaction, || {
                handler.handle_impact(interaction, seen, ctx)
            });
            handled |= produced;
        }
        if let Some(handler) = self.material {
            let seen = handled;
            let produced = guarded("material", interaction, || {
                handler.handle_surface_interaction(interaction, seen, ctx)
            });
            handled |= produced;
        }
        if let Some(handler) = self.global {
            let seen = handled;
            let produced = guarded("global", interaction, || {
                handler.handle_impact(interaction, seen, ctx)
            });
            handled |= produced;
        }

        handled
    }
}

fn guarded(
    stage: &str,
    interaction: &Interaction,
    call: impl FnOnce() -> HandlerResult,
) -> HandledFlags {
    let result = catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(HandlerError::Panicked(message))
    });

    match result {
        Ok(flags) => flags,
        Err(err) => {
            warn!(
                "{} handler failed for bullet {:?} ({:?}): {}",
                stage, interaction.bullet, interaction.kind, err
            );
            HandledFlags::NONE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    pub(crate) fn sample_interaction() -> Interaction {
        Interaction {
            kind: InteractionKind::Stop,
            bullet: BulletHandle { slot: 0, generation: 0 },
            hit: HitResult {
                entity: Entity::PLACEHOLDER,
                point: Vec3::ZERO,
                normal: Vec3::Y,
                distance: 1.0,
                surface: None,
            },
            impact_velocity: Vec3::NEG_Y * 300.0,
            velocity: Vec3::ZERO,
            spread_angle: 0.0,
            speed_factor: 0.0,
            energy: 0.0,
            penetration_depth: 0.0,
            remaining_lifetime: 1.0,
            distance_traveled: 10.0,
            template: Arc::new(BulletTemplate::default()),
            shooter: None,
        }
    }

    #[test]
    fn test_flags_accumulate_in_order() {
        let seen_by_global = Arc::new(AtomicU8::new(0));
        let seen = seen_by_global.clone();

        let bullet = |_: &Interaction, _: HandledFlags, _: &mut DispatchContext| -> HandlerResult { Ok(HandledFlags::DAMAGE) };
        let material = |_: &Interaction, handled: HandledFlags, _: &mut DispatchContext| -> HandlerResult {
            assert!(handled.contains(HandledFlags::DAMAGE));
            Ok(HandledFlags::DECAL | HandledFlags::AUDIO)
        };
        let global = move |_: &Interaction, handled: HandledFlags, _: &mut DispatchContext| -> HandlerResult {
            seen.store(handled.0, Ordering::SeqCst);
            Ok(HandledFlags::NONE)
        };

        let chain = HandlerChain {
            bullet: Some(&bullet),
            material: Some(&material),
            global: Some(&global),
        };
        let mut ctx = DispatchContext::default();
        let handled = chain.dispatch(&sample_interaction(), &mut ctx);

        assert_eq!(handled, HandledFlags::DAMAGE | HandledFlags::DECAL | HandledFlags::AUDIO);
        assert_eq!(seen_by_global.load(Ordering::SeqCst), handled.0);
    }

    #[test]
    fn test_failing_handler_contributes_nothing() {
        let failing = |_: &Interaction, _: HandledFlags, _: &mut DispatchContext| -> HandlerResult {
            Err(HandlerError::Failed("boom".to_string()))
        };
        let panicking = |_: &Interaction, _: HandledFlags, _: &mut DispatchContext| -> HandlerResult {
            panic!("handler exploded")
        };
        let global = |_: &Interaction, _: HandledFlags, _: &mut DispatchContext| -> HandlerResult { Ok(HandledFlags::PARTICLES) };

        let chain = HandlerChain {
            bullet: Some(&failing),
            material: Some(&panicking),
            global: Some(&global),
        };
        let mut ctx = DispatchContext::default();
        let handled = chain.dispatch(&sample_interaction(), &mut ctx);

        assert_eq!(handled, HandledFlags::PARTICLES);
    }

    #[test]
    fn test_empty_chain_handles_nothing() {
        let mut ctx = DispatchContext::default();
        let handled = HandlerChain::default().dispatch(&sample_interaction(), &mut ctx);
        assert!(handled.is_empty());
    }
}
