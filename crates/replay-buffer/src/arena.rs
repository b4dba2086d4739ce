//! Generational slot arena backing blocks and handles.
//!
//! Slots freed by a merge or a handle release are recycled; the generation
//! counter makes ids that pointed at the old occupant fail lookups instead of
//! aliasing the new one.

/// Raw arena key: slot index plus the generation it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Never issued by an arena; used only while wiring up a new buffer.
    pub(crate) const DANGLING: Key = Key {
        index: u32::MAX,
        generation: u32::MAX,
    };
}

#[derive(Debug)]
struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

/// Slot arena with free-list reuse.
#[derive(Debug)]
pub(crate) struct Arena<V> {
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
    len: usize,
}

impl<V> Arena<V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value and return its key.
    pub(crate) fn insert(&mut self, value: V) -> Key {
        self.insert_with(|_| value)
    }

    /// Store a value built from its own key, for self-referential links.
    pub(crate) fn insert_with(&mut self, build: impl FnOnce(Key) -> V) -> Key {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let key = Key {
                index,
                generation: slot.generation,
            };
            slot.value = Some(build(key));
            return key;
        }

        let key = Key {
            index: self.slots.len() as u32,
            generation: 0,
        };
        self.slots.push(Slot {
            generation: 0,
            value: Some(build(key)),
        });
        key
    }

    /// Remove a value, bumping the slot generation.
    pub(crate) fn remove(&mut self, key: Key) -> Option<V> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn get(&self, key: Key) -> Option<&V> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut V> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Iterate live entries in slot order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Key, &V)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Key {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

impl<V> std::ops::Index<Key> for Arena<V> {
    type Output = V;

    fn index(&self, key: Key) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("arena lookup with stale key {:?}", key),
        }
    }
}

impl<V> std::ops::IndexMut<Key> for Arena<V> {
    fn index_mut(&mut self, key: Key) -> &mut V {
        match self.get_mut(key) {
            Some(value) => value,
            None => panic!("arena lookup with stale key {:?}", key),
        }
    }
}
