//! Active bullet registry.
//!
//! A sparse set: `sparse` maps a slot to its position in the dense arrays,
//! `dense` lists occupied slots, and the physical state of every live bullet
//! sits in `native` in the same order as `dense`. The hot array stays packed
//! and plain-old-data; anything owning heap data lives in `managed`.
//!
//! Removal swaps the last live entry into the freed position, so insert and
//! remove are O(1) and the dense order is not stable across removals.

use bevy::prelude::*;

use crate::error::SpawnError;
use crate::resources::CapacityPolicy;
use crate::types::{BulletFlags, BulletHandle};

const VACANT: u32 = u32::MAX;

/// Physical state of one bullet.
///
/// # Fields
/// * `position` - Current world position
/// * `prev_position` - Position at the start of the last tick
/// * `velocity` - Velocity in meters per second
/// * `spin` - Spin vector in rad/s (axis times rate)
/// * `lifetime` - Seconds of flight left
/// * `elapsed` - Seconds flown so far
/// * `distance` - Meters flown so far
/// * `hit_mask` - Collision layers this bullet can hit
/// * `flags` - Interaction history
/// * `mass` - Mass in kilograms, used for kinetic energy
/// * `drag_factor` / `magnus_factor` - Aerodynamic factors precomputed from the template
/// * `rng_seed` - State of the bullet's private random stream
/// * `visual_offset` - Offset of the visual from the physical position at spawn
/// * `muzzle_speed` - Launch speed, used to recover from a non-finite velocity
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct BulletState {
    pub position: Vec3,
    pub prev_position: Vec3,
    pub velocity: Vec3,
    pub spin: Vec3,
    pub lifetime: f32,
    pub elapsed: f32,
    pub distance: f32,
    pub hit_mask: u32,
    pub flags: BulletFlags,
    pub mass: f32,
    pub drag_factor: f32,
    pub magnus_factor: f32,
    pub rng_seed: u64,
    pub visual_offset: Vec3,
    pub muzzle_speed: f32,
}

impl BulletState {
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Kinetic energy in joules.
    pub fn kinetic_energy(&self) -> f32 {
        0.5 * self.mass * self.velocity.length_squared()
    }

    /// Unit flight direction, or zero when the bullet is at rest.
    pub fn direction(&self) -> Vec3 {
        self.velocity.normalize_or_zero()
    }

    /// Position of the visual, converging on the physical position over `catch_up_distance`.
    pub fn visual_position(&self, catch_up_distance: f32) -> Vec3 {
        self.position + self.visual_offset * self.visual_weight(catch_up_distance)
    }

    /// Weight of the visual offset after flying `self.distance`.
    pub fn visual_weight(&self, catch_up_distance: f32) -> f32 {
        if catch_up_distance <= 0.0 {
            return 0.0;
        }
        (1.0 - self.distance / catch_up_distance).max(0.0)
    }
}

/// Sparse-set storage of live bullets.
///
/// `M` is the managed context paired with each bullet (template reference,
/// visual callbacks); it never enters the packed state array.
pub struct BulletRegistry<M> {
    native: Vec<BulletState>,
    managed: Vec<M>,
    dense: Vec<u32>,
    sparse: Vec<u32>,
    generations: Vec<u32>,
    free: Vec<u32>,
    capacity: usize,
    policy: CapacityPolicy,
}

impl<M> BulletRegistry<M> {
    /// Creates a registry with every slot pre-allocated.
    pub fn with_capacity(capacity: usize, policy: CapacityPolicy) -> Self {
        let mut registry = Self {
            native: Vec::new(),
            managed: Vec::new(),
            dense: Vec::new(),
            sparse: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            capacity: 0,
            policy,
        };
        registry.reserve_slots(capacity);
        registry
    }

    fn reserve_slots(&mut self, capacity: usize) {
        let additional = capacity.saturating_sub(self.capacity);
        self.native.reserve_exact(additional);
        self.managed.reserve_exact(additional);
        self.dense.reserve_exact(additional);
        self.sparse.resize(capacity, VACANT);
        self.generations.resize(capacity, 0);
        // popped from the back, so low slots are handed out first
        let mut fresh: Vec<u32> = (self.capacity as u32..capacity as u32).rev().collect();
        fresh.append(&mut self.free);
        self.free = fresh;
        self.capacity = capacity.max(self.capacity);
    }

    /// Adds a bullet and returns its handle.
    ///
    /// When every slot is taken the registry either doubles its capacity or
    /// rejects the bullet, according to its [`CapacityPolicy`]. Existing
    /// bullets are never evicted.
    pub fn insert(&mut self, native: BulletState, managed: M) -> Result<BulletHandle, SpawnError> {
        if self.free.is_empty() {
            match self.policy {
                CapacityPolicy::Reject => {
                    return Err(SpawnError::CapacityExhausted {
                        capacity: self.capacity,
                    });
                }
                CapacityPolicy::Grow => {
                    let grown = (self.capacity * 2).max(16);
                    debug!("bullet registry growing from {} to {} slots", self.capacity, grown);
                    self.reserve_slots(grown);
                }
            }
        }
        let Some(slot) = self.free.pop() else {
            return Err(SpawnError::CapacityExhausted {
                capacity: self.capacity,
            });
        };

        self.sparse[slot as usize] = self.dense.len() as u32;
        self.dense.push(slot);
        self.native.push(native);
        self.managed.push(managed);

        Ok(BulletHandle {
            slot,
            generation: self.generations[slot as usize],
        })
    }

    /// Removes a bullet, returning its state and context.
    ///
    /// Stale handles (the slot was freed or reused since) return `None`.
    pub fn remove(&mut self, handle: BulletHandle) -> Option<(BulletState, M)> {
        let index = self.dense_index(handle)?;
        let slot = handle.slot as usize;

        self.dense.swap_remove(index);
        let native = self.native.swap_remove(index);
        let managed = self.managed.swap_remove(index);
        if let Some(&moved) = self.dense.get(index) {
            self.sparse[moved as usize] = index as u32;
        }

        self.sparse[slot] = VACANT;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(handle.slot);

        Some((native, managed))
    }

    /// Removes every bullet in dense order, handing each to `on_removed`.
    pub fn drain(&mut self, mut on_removed: impl FnMut(BulletHandle, BulletState, M)) {
        while let Some(&slot) = self.dense.last() {
            let handle = BulletHandle {
                slot,
                generation: self.generations[slot as usize],
            };
            if let Some((native, managed)) = self.remove(handle) {
                on_removed(handle, native, managed);
            }
        }
    }

    /// Occupied slots, in dense order.
    pub fn active_slots(&self) -> &[u32] {
        &self.dense
    }

    pub fn count(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, handle: BulletHandle) -> bool {
        self.dense_index(handle).is_some()
    }

    /// Handle of the bullet at a dense position.
    pub fn handle_at(&self, index: usize) -> Option<BulletHandle> {
        let slot = *self.dense.get(index)?;
        Some(BulletHandle {
            slot,
            generation: self.generations[slot as usize],
        })
    }

    pub fn dense_index(&self, handle: BulletHandle) -> Option<usize> {
        let slot = handle.slot as usize;
        if slot >= self.capacity || self.generations[slot] != handle.generation {
            return None;
        }
        match self.sparse[slot] {
            VACANT => None,
            index => Some(index as usize),
        }
    }

    pub fn get(&self, handle: BulletHandle) -> Option<&BulletState> {
        self.dense_index(handle).map(|index| &self.native[index])
    }

    pub fn get_mut(&mut self, handle: BulletHandle) -> Option<&mut BulletState> {
        self.dense_index(handle).map(|index| &mut self.native[index])
    }

    pub fn managed(&self, handle: BulletHandle) -> Option<&M> {
        self.dense_index(handle).map(|index| &self.managed[index])
    }

    pub fn managed_mut(&mut self, handle: BulletHandle) -> Option<&mut M> {
        self.dense_index(handle).map(|index| &mut self.managed[index])
    }

    /// Packed states in dense order.
    pub fn states(&self) -> &[BulletState] {
        &self.native
    }

    pub fn states_mut(&mut self) -> &mut [BulletState] {
        &mut self.native
    }

    /// Managed contexts in dense order.
    pub fn managed_slice(&self) -> &[M] {
        &self.managed
    }

    /// Split borrow used by phases that read contexts while mutating states.
    pub fn parts_mut(&mut self) -> (&mut [BulletState], &mut [M]) {
        (&mut self.native, &mut self.managed)
    }

    /// Iterates `(handle, state)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (BulletHandle, &BulletState)> + '_ {
        self.dense.iter().zip(self.native.iter()).map(|(&slot, state)| {
            (
                BulletHandle {
                    slot,
                    generation: self.generations[slot as usize],
                },
                state,
            )
        })
    }
}
