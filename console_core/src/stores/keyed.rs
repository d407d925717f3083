use std::collections::BTreeMap;

/// An entity plus the bookkeeping eviction and flushing need.
#[derive(Debug)]
pub(crate) struct Tracked<T> {
    pub value: T,
    pub last_update: u64,
    pub dirty: bool,
}

/// Identifier-keyed entities that age out when not refreshed.
#[derive(Debug)]
pub(crate) struct KeyedEntities<T> {
    items: BTreeMap<String, Tracked<T>>,
    max_age_ms: u64,
}

impl<T> KeyedEntities<T> {
    pub fn new(max_age_ms: u64) -> Self {
        Self {
            items: BTreeMap::new(),
            max_age_ms: max_age_ms.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key).map(|tracked| &tracked.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Insert or update `key`, stamping it with `now`. `update` receives the
    /// existing value, or `None` for a new key, and returns the value to keep.
    pub fn upsert(&mut self, key: &str, now: u64, update: impl FnOnce(Option<T>) -> T) {
        let previous = self.items.remove(key);
        let last_update = previous
            .as_ref()
            .map_or(now, |tracked| tracked.last_update.max(now));
        let value = update(previous.map(|tracked| tracked.value));
        self.items.insert(
            key.to_string(),
            Tracked {
                value,
                last_update,
                dirty: true,
            },
        );
    }

    /// Remove and return every entity whose age reached the timeout.
    pub fn evict(&mut self, now: u64) -> Vec<(String, T)> {
        let max_age = self.max_age_ms;
        let stale: Vec<String> = self
            .items
            .iter()
            .filter(|(_, tracked)| now.saturating_sub(tracked.last_update) >= max_age)
            .map(|(key, _)| key.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|key| self.items.remove(&key).map(|tracked| (key, tracked.value)))
            .collect()
    }

    /// Entities changed since the last call, clearing their dirty flag.
    pub fn take_dirty(&mut self) -> Vec<(&str, &T)> {
        self.items
            .iter_mut()
            .filter(|(_, tracked)| tracked.dirty)
            .map(|(key, tracked)| {
                tracked.dirty = false;
                (key.as_str(), &tracked.value)
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
