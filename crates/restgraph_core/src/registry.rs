//! Resource identity registry.
//!
//! Bidirectional map between local identities and remote resource
//! identifiers. The registry is what makes the same remote resource always
//! materialize as the same local object: `local_identity_for` hands out a
//! fresh identity only the first time a `(entity, resource id)` pair is seen.
//!
//! One registry belongs to exactly one graph context.

use crate::error::{CoreError, CoreResult};
use crate::id::LocalId;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Maps {
    by_resource: HashMap<(String, String), LocalId>,
    by_local: HashMap<LocalId, (String, String)>,
}

/// Process-local identity map. Lookups never touch the network.
#[derive(Default)]
pub struct IdentityRegistry {
    maps: RwLock<Maps>,
}

impl IdentityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resource identifier bound to a local identity.
    pub fn identifier_for(&self, local: LocalId) -> Option<String> {
        self.maps
            .read()
            .by_local
            .get(&local)
            .map(|(_, resource_id)| resource_id.clone())
    }

    /// Returns the local identity for a resource, without creating one.
    pub fn lookup(&self, resource_id: &str, entity: &str) -> Option<LocalId> {
        self.maps
            .read()
            .by_resource
            .get(&(entity.to_string(), resource_id.to_string()))
            .copied()
    }

    /// Returns the local identity for a resource, creating one on first sight.
    pub fn local_identity_for(&self, resource_id: &str, entity: &str) -> LocalId {
        let key = (entity.to_string(), resource_id.to_string());
        if let Some(id) = self.maps.read().by_resource.get(&key) {
            return *id;
        }

        let mut maps = self.maps.write();
        // Another caller may have won the race between the two locks.
        if let Some(id) = maps.by_resource.get(&key) {
            return *id;
        }
        let id = LocalId::new();
        maps.by_local.insert(id, key.clone());
        maps.by_resource.insert(key, id);
        id
    }

    /// Binds a resource identifier to an existing local identity.
    ///
    /// Binding the same pair twice is a no-op. Fails with `IdentityConflict`
    /// if the local identity already carries a different identifier, or if
    /// the identifier already belongs to another local identity.
    pub fn bind(&self, local: LocalId, resource_id: &str, entity: &str) -> CoreResult<()> {
        let mut maps = self.maps.write();

        if let Some((_, existing)) = maps.by_local.get(&local) {
            if existing == resource_id {
                return Ok(());
            }
            return Err(CoreError::IdentityConflict {
                local,
                existing: existing.clone(),
                attempted: resource_id.to_string(),
            });
        }

        let key = (entity.to_string(), resource_id.to_string());
        if let Some(other) = maps.by_resource.get(&key) {
            if *other != local {
                return Err(CoreError::IdentityConflict {
                    local: *other,
                    existing: resource_id.to_string(),
                    attempted: resource_id.to_string(),
                });
            }
        }

        maps.by_local.insert(local, key.clone());
        maps.by_resource.insert(key, local);
        Ok(())
    }

    /// Forgets a local identity, e.g. after a confirmed remote delete.
    pub fn unbind(&self, local: LocalId) -> Option<String> {
        let mut maps = self.maps.write();
        let key = maps.by_local.remove(&local)?;
        maps.by_resource.remove(&key);
        Some(key.1)
    }

    /// Number of bound identities.
    pub fn len(&self) -> usize {
        self.maps.read().by_local.len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
