//! # Attainment Cache
//!
//! Version-keyed memoization of attainment results.
//!
//! Entries are keyed by (entity, configuration version, data version).
//! There are no TTLs: a freeze or a mapping edit advances one of the
//! versions, the old key simply stops matching, and the stale value can
//! never be served again. `retain_current` drops superseded entries.

use crate::outcome::{AttainmentOutcome, ConfigVersion};
use crate::types::{CoId, PoId};
use std::collections::BTreeMap;

/// The entity a cached attainment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheScope {
    /// A course outcome.
    Co(CoId),
    /// A program outcome.
    Po(PoId),
}

/// Full cache key: entity plus the versions the value was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheKey {
    /// The entity.
    pub scope: CacheScope,
    /// Configuration version at computation time.
    pub config: ConfigVersion,
    /// Store data version at computation time.
    pub data: u64,
}

impl CacheKey {
    /// Key for a CO attainment.
    #[must_use]
    pub const fn co(co: CoId, config: ConfigVersion, data: u64) -> Self {
        Self {
            scope: CacheScope::Co(co),
            config,
            data,
        }
    }

    /// Key for a PO attainment.
    #[must_use]
    pub const fn po(po: PoId, config: ConfigVersion, data: u64) -> Self {
        Self {
            scope: CacheScope::Po(po),
            config,
            data,
        }
    }
}

/// The attainment cache.
#[derive(Debug, Clone, Default)]
pub struct AttainmentCache {
    entries: BTreeMap<CacheKey, AttainmentOutcome>,
    hits: u64,
    misses: u64,
}

impl AttainmentCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached outcome.
    pub fn get(&mut self, key: &CacheKey) -> Option<AttainmentOutcome> {
        match self.entries.get(key) {
            Some(outcome) => {
                self.hits = self.hits.saturating_add(1);
                Some(*outcome)
            }
            None => {
                self.misses = self.misses.saturating_add(1);
                None
            }
        }
    }

    /// Insert an outcome computed for a key.
    pub fn insert(&mut self, key: CacheKey, outcome: AttainmentOutcome) {
        self.entries.insert(key, outcome);
    }

    /// Look up, or compute and remember.
    pub fn get_or_insert_with(
        &mut self,
        key: CacheKey,
        compute: impl FnOnce() -> AttainmentOutcome,
    ) -> AttainmentOutcome {
        if let Some(outcome) = self.get(&key) {
            return outcome;
        }
        let outcome = compute();
        self.entries.insert(key, outcome);
        outcome
    }

    /// Drop every entry not computed at the given versions.
    pub fn retain_current(&mut self, config: ConfigVersion, data: u64) {
        self.entries
            .retain(|key, _| key.config == config && key.data == data);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache hits so far.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Cache misses so far.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

// =============================================================================
// TESTS
// =============================================================================
