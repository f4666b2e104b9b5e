// SPDX-License-Identifier: CEPL-1.0
/// Index of a material's slot in its subsystem's descriptor batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u32);

impl MaterialId {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

struct Entry<T> {
    params: T,
    dirty: bool,
}

/// Live materials with stable slot indices.
///
/// Freed indices are handed to later materials; the slot span never shrinks.
pub struct MaterialRegistry<T> {
    entries: Vec<Option<Entry<T>>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for MaterialRegistry<T> {
    fn default() -> Self {
        MaterialRegistry {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> MaterialRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, params: T) -> MaterialId {
        let entry = Some(Entry {
            params,
            dirty: true,
        });
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = entry;
                MaterialId(index)
            }
            None => {
                self.entries.push(entry);
                MaterialId(self.entries.len() as u32 - 1)
            }
        }
    }

    pub fn remove(&mut self, id: MaterialId) -> Option<T> {
        let entry = self.entries.get_mut(id.0 as usize)?.take()?;
        self.free.push(id.0);
        self.live -= 1;
        Some(entry.params)
    }

    pub fn get(&self, id: MaterialId) -> Option<&T> {
        self.entries
            .get(id.0 as usize)
            .and_then(|e| e.as_ref())
            .map(|e| &e.params)
    }

    /// Replaces the parameters and marks the material for upload.
    pub fn set(&mut self, id: MaterialId, params: T) -> bool {
        match self.entries.get_mut(id.0 as usize).and_then(|e| e.as_mut()) {
            Some(entry) => {
                entry.params = params;
                entry.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        self.get(id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Slots a descriptor batch must provide: highest index ever issued + 1.
    pub fn required_capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Live materials as `(id, params, dirty)`.
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &T, bool)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            e.as_ref()
                .map(|e| (MaterialId(i as u32), &e.params, e.dirty))
        })
    }

    pub fn mark_clean(&mut self, id: MaterialId) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize).and_then(|e| e.as_mut()) {
            entry.dirty = false;
        }
    }
}
