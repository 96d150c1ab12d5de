use std::collections::BTreeMap;

/// Reorders timestamped entries from decode order into presentation order.
///
/// At most `max_size` entries are held back. When a new entry would exceed
/// that, the entry with the smallest timestamp is released first, even if
/// the new entry is smaller still. Entries with equal timestamps are released
/// in insertion order.
///
/// Released entries are handed to the consumer passed to each call.
#[derive(Debug)]
pub struct ReorderingQueue<T> {
    /// Keyed by timestamp, then insertion sequence.
    entries: BTreeMap<(i64, u64), T>,
    next_sequence: u64,
    max_size: Option<usize>,
}

impl<T> Default for ReorderingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderingQueue<T> {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_sequence: 0,
            max_size: None,
        }
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
            ..Self::new()
        }
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamps currently held back, in ascending order.
    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().map(|(timestamp_us, _)| *timestamp_us)
    }

    /// Changes the bound. A smaller bound releases the oldest entries until
    /// it is satisfied. `None` removes the bound.
    pub fn set_max_size(&mut self, max_size: Option<usize>, consumer: impl FnMut(i64, T)) {
        self.max_size = max_size;
        if let Some(max_size) = max_size {
            self.release_until(max_size, consumer);
        }
    }

    pub fn add(&mut self, timestamp_us: i64, payload: T, mut consumer: impl FnMut(i64, T)) {
        if self.max_size == Some(0) {
            consumer(timestamp_us, payload);
            return;
        }

        if let Some(max_size) = self.max_size {
            self.release_until(max_size - 1, &mut consumer);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert((timestamp_us, sequence), payload);
    }

    /// Releases every entry in presentation order.
    pub fn flush(&mut self, consumer: impl FnMut(i64, T)) {
        self.release_until(0, consumer);
    }

    /// Drops every entry without releasing it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn release_until(&mut self, size: usize, mut consumer: impl FnMut(i64, T)) {
        while self.entries.len() > size {
            let Some(((timestamp_us, _), payload)) = self.entries.pop_first() else {
                break;
            };
            consumer(timestamp_us, payload);
        }
    }
}
