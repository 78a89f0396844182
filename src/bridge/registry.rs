//! Compact identifiers for IM-network entities.
//!
//! The operator addresses friends, groups, discussions and session peers
//! by small numbers (`#3 hello`). Ids are handed out on first sight,
//! starting at 1, and stay valid for the life of the process.

use std::collections::HashMap;

use crate::common::types::{CompactId, EntityKind, EntityRef, NativeId};

/// Append-only two-way map between native entities and compact ids.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    /// `(native id, kind)` -> compact id.
    ids: HashMap<EntityRef, CompactId>,
    /// Entity for compact id `n` lives at index `n - 1`.
    entities: Vec<EntityRef>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compact id for an entity, issuing the next one if unseen.
    pub fn get_or_create(&mut self, native_id: &NativeId, kind: EntityKind) -> CompactId {
        let entity = EntityRef::new(native_id.clone(), kind);
        if let Some(id) = self.ids.get(&entity) {
            return *id;
        }

        let id = CompactId::new(self.entities.len() as u64 + 1);
        self.entities.push(entity.clone());
        self.ids.insert(entity, id);
        id
    }

    /// Look up an entity by compact id. `None` for ids never issued.
    pub fn resolve(&self, id: CompactId) -> Option<&EntityRef> {
        let index = usize::try_from(id.get()).ok()?.checked_sub(1)?;
        self.entities.get(index)
    }

    /// Number of ids issued so far.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
