//! Generational Arena
//!
//! Slot storage addressed by an index plus a generation counter. A key stays
//! meaningful when the backing `Vec` grows, and a key to a removed slot never
//! resolves again, even after the slot is reused.

/// Generation counter - bumped every time a slot is freed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Generation(u32);

impl Generation {
    /// Initial generation (slot never freed)
    pub const INITIAL: Self = Generation(0);

    /// Get the raw value
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Get the next generation
    #[inline]
    pub const fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Stable arena key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    index: u32,
    generation: Generation,
}

impl Key {
    /// Slot index
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation the key was minted with
    #[inline]
    pub fn generation(self) -> Generation {
        self.generation
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    generation: Generation,
    value: Option<T>,
}

/// Generational arena
#[derive(Debug, Clone)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new(), free: Vec::new(), len: 0 }
    }

    /// Insert a value and return its key
    pub fn insert(&mut self, value: T) -> Key {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.value = Some(value);
            return Key { index, generation: entry.generation };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry { generation: Generation::INITIAL, value: Some(value) });
        Key { index, generation: Generation::INITIAL }
    }

    /// Remove a value. Stale keys return `None`.
    pub fn remove(&mut self, key: Key) -> Option<T> {
        let entry = self.entries.get_mut(key.index as usize)?;
        if entry.generation != key.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.next();
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    /// Remove every value. Keys minted before the call never resolve again.
    pub fn clear(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.value.take().is_some() {
                entry.generation = entry.generation.next();
                self.free.push(index as u32);
            }
        }
        self.len = 0;
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.entries
            .get(key.index as usize)
            .filter(|e| e.generation == key.generation)
            .and_then(|e| e.value.as_ref())
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.entries
            .get_mut(key.index as usize)
            .filter(|e| e.generation == key.generation)
            .and_then(|e| e.value.as_mut())
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            e.value.as_ref().map(|v| (Key { index: i as u32, generation: e.generation }, v))
        })
    }

    /// Keys of all live entries
    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_stale_key_after_reuse() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2);

        // Same slot, newer generation
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&2));
        assert!(arena.remove(a).is_none());
    }

    #[test]
    fn test_clear_stales_every_key() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        arena.clear();
        assert!(arena.is_empty());

        let c = arena.insert("c");
        let d = arena.insert("d");
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_none());
        assert_eq!(arena.get(c), Some(&"c"));
        assert_eq!(arena.get(d), Some(&"d"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_keys_survive_growth() {
        let mut arena = Arena::new();
        let first = arena.insert(0usize);
        for i in 1..1000 {
            arena.insert(i);
        }
        assert_eq!(arena.get(first), Some(&0));
        assert_eq!(arena.keys().len(), 1000);
    }
}
