//! Store Statistics Module
//!
//! Tracks read hits and misses plus write and delete volume.

// == Store Stats ==
/// Tracks store activity counters.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of reads that found a value
    pub hits: u64,
    /// Number of reads for absent keys
    pub misses: u64,
    /// Number of applied writes (single and pipelined)
    pub writes: u64,
    /// Number of entries actually removed
    pub deletes: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
}

impl StoreStats {
    // == Constructor ==
    /// Creates a new StoreStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the read hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_deletes(&mut self, count: u64) {
        self.deletes += count;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
