//! Incremental reconciliation of named transient entities (asteroids, laser
//! shots) against add/remove diffs from the authoritative peer.
//!
//! Each transient-entity subsystem owns its own [`EntityStore`]. The store
//! plays both roles of the protocol:
//!
//! - the receiving side applies inbound diffs with [`EntityStore::apply`],
//!   touching only the entities the diff names;
//! - the authoritative side journals local spawns and despawns and emits the
//!   delta since the previous tick with [`EntityStore::capture`], so peers
//!   get sparse diffs instead of full-state snapshots.

use log::debug;
use shared::{EntityDiff, EntityState, NamedEntity};
use std::collections::HashMap;

/// A locally simulated stand-in for one named entity.
///
/// `detach` is the seam to engine-owned resources (sprites, physics bodies);
/// it runs before the entity is dropped and defaults to a no-op.
pub trait Simulated {
    fn materialize(state: &EntityState) -> Self;
    fn state(&self) -> EntityState;
    fn step(&mut self, dt: f32);
    fn detach(&mut self) {}
}

/// Name-keyed collection of locally simulated entities with journals for
/// delta capture.
pub struct EntityStore<T> {
    entities: HashMap<String, T>,
    created: Vec<String>,
    destroyed: Vec<String>,
}

impl<T: Simulated> EntityStore<T> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            created: Vec::new(),
            destroyed: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entities.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entities.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Current kinematic state of every entity, in no particular order.
    pub fn states(&self) -> Vec<EntityState> {
        self.entities.values().map(Simulated::state).collect()
    }

    /// Applies a diff from the authoritative peer.
    ///
    /// Removal is idempotent: a name absent from the collection is a no-op.
    /// Re-adding a name that is already present replaces the entity
    /// (last-write-wins), detaching the displaced one. Entities not named in
    /// the diff are never inspected or mutated, and applying a remote diff
    /// never feeds the local capture journals.
    pub fn apply(&mut self, diff: &EntityDiff) {
        for name in &diff.remove {
            if let Some(mut entity) = self.entities.remove(name) {
                entity.detach();
            }
        }
        for added in &diff.add {
            let entity = T::materialize(&added.state);
            if let Some(mut displaced) = self.entities.insert(added.name.clone(), entity) {
                debug!("entity \"{}\" re-added, replacing the old one", added.name);
                displaced.detach();
            }
        }
    }

    /// Inserts a locally created entity and journals it for the next capture.
    pub fn spawn(&mut self, name: impl Into<String>, entity: T) {
        let name = name.into();
        if let Some(mut displaced) = self.entities.insert(name.clone(), entity) {
            displaced.detach();
        }
        self.destroyed.retain(|n| n != &name);
        if !self.created.contains(&name) {
            self.created.push(name);
        }
    }

    /// Removes a locally destroyed entity and journals the removal, unless
    /// the entity was spawned after the last capture: peers never learned
    /// that name, so the next diff mentions it on neither side.
    pub fn despawn(&mut self, name: &str) -> bool {
        match self.entities.remove(name) {
            Some(mut entity) => {
                entity.detach();
                if let Some(pos) = self.created.iter().position(|n| n == name) {
                    self.created.remove(pos);
                } else if !self.destroyed.iter().any(|n| n == name) {
                    self.destroyed.push(name.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Drains the journals into a diff against the previous capture: `add`
    /// carries the full current kinematic state of entities created since
    /// then, `remove` the names destroyed since then. `None` when there is
    /// nothing to announce.
    pub fn capture(&mut self) -> Option<EntityDiff> {
        if self.created.is_empty() && self.destroyed.is_empty() {
            return None;
        }
        let remove = std::mem::take(&mut self.destroyed);
        let created = std::mem::take(&mut self.created);
        let add = created
            .into_iter()
            .filter_map(|name| {
                let state = self.entities.get(&name)?.state();
                Some(NamedEntity { name, state })
            })
            .collect();
        let diff = EntityDiff { remove, add };
        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }

    /// Advances the local simulation of every entity. Untouched by diffs in
    /// between, entities keep integrating under local physics.
    pub fn step(&mut self, dt: f32) {
        for entity in self.entities.values_mut() {
            entity.step(dt);
        }
    }
}

impl<T: Simulated> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
