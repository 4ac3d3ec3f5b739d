use meridian_protocol::EntityId;

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Deterministic, generational storage for units and cities.
///
/// - Stable iteration order: ascending slot index.
/// - Safe handles: `EntityId { index, generation }` — a stale handle after
///   removal never resolves.
#[derive(Clone, Debug)]
pub struct EntityStore<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for EntityStore<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> EntityStore<T> {
    pub fn insert(&mut self, value: T) -> EntityId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            EntityId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            EntityId::new(index, 0)
        }
    }

    /// Re-seat an entity at a specific handle, used by snapshot restore so
    /// recovered ids match the persisted ones. Grows the slot table as needed.
    pub fn insert_at(&mut self, id: EntityId, value: T) {
        let index = id.index as usize;
        while self.slots.len() <= index {
            let free_index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: None,
            });
            self.free.push(free_index);
        }
        self.free.retain(|&i| i != id.index);
        let slot = &mut self.slots[index];
        slot.generation = id.generation;
        slot.value = Some(value);
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation {
            slot.value.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation == id.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.value.is_none())
    }

    pub fn iter_ordered(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            Some((EntityId::new(index as u32, slot.generation), value))
        })
    }

    pub fn iter_ordered_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let value = slot.value.as_mut()?;
                Some((EntityId::new(index as u32, slot.generation), value))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_does_not_resolve() {
        let mut store = EntityStore::default();
        let id = store.insert("a");
        assert_eq!(store.remove(id), Some("a"));
        assert_eq!(store.get(id), None);

        let reused = store.insert("b");
        assert_eq!(reused.index, id.index);
        assert_ne!(reused.generation, id.generation);
        assert_eq!(store.get(id), None);
        assert_eq!(store.get(reused), Some(&"b"));
    }

    #[test]
    fn insert_at_restores_exact_handles() {
        let mut store = EntityStore::default();
        let id = EntityId::new(3, 7);
        store.insert_at(id, "restored");
        assert_eq!(store.get(id), Some(&"restored"));

        // Fresh inserts must not collide with the restored slot.
        let fresh = store.insert("fresh");
        assert_ne!(fresh.index, id.index);
        assert_eq!(store.get(id), Some(&"restored"));
    }

    #[test]
    fn iteration_is_index_ordered() {
        let mut store = EntityStore::default();
        store.insert(10);
        store.insert(20);
        store.insert(30);
        let values: Vec<i32> = store.iter_ordered().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10, 20, 30]);
    }
}
