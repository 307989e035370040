//! Short-lived per-identity de-duplication window.
//!
//! Rejects re-reads of the same subject within a cooldown before the store is
//! consulted, and enforces a human-scale gap between accepted scans. State is
//! in memory only and lost on restart; the store's compare-and-rotate remains
//! the authoritative guard against double acceptance.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use rollcall_types::{IdentityId, Timestamp};

/// Default capacity: track up to 65 536 identities.
pub const DEFAULT_GUARD_CAPACITY: usize = 65_536;

/// Entries older than `cooldown * DEFAULT_SWEEP_MULTIPLIER` are swept.
pub const DEFAULT_SWEEP_MULTIPLIER: u64 = 10;

/// Opportunistic sweeps run at most once per this many seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardConfig {
    pub capacity: usize,
    pub sweep_multiplier: u64,
    pub sweep_interval_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_GUARD_CAPACITY,
            sweep_multiplier: DEFAULT_SWEEP_MULTIPLIER,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Not seen within the cooldown; now marked as seen at `now`.
    Fresh,
    /// Seen at `last_seen`, still inside the cooldown. The mark is unchanged.
    WithinCooldown { last_seen: Timestamp },
}

struct GuardState {
    last_seen: HashMap<IdentityId, Timestamp>,
    /// The same marks ordered oldest first, for eviction and sweeping.
    by_age: BTreeSet<(Timestamp, IdentityId)>,
    last_sweep: Timestamp,
}

impl GuardState {
    fn new() -> Self {
        Self {
            last_seen: HashMap::new(),
            by_age: BTreeSet::new(),
            last_sweep: Timestamp::EPOCH,
        }
    }

    fn mark(&mut self, identity_id: &IdentityId, at: Timestamp) {
        if let Some(previous) = self.last_seen.insert(identity_id.clone(), at) {
            self.by_age.remove(&(previous, identity_id.clone()));
        }
        self.by_age.insert((at, identity_id.clone()));
    }

    fn remove(&mut self, identity_id: &IdentityId) {
        if let Some(at) = self.last_seen.remove(identity_id) {
            self.by_age.remove(&(at, identity_id.clone()));
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((_, identity_id)) = self.by_age.pop_first() {
            self.last_seen.remove(&identity_id);
        }
    }

    fn drop_expired(&mut self, horizon_secs: u64, now: Timestamp) -> usize {
        let mut removed = 0;
        while self
            .by_age
            .first()
            .is_some_and(|(at, _)| at.has_expired(horizon_secs, now))
        {
            if let Some((_, identity_id)) = self.by_age.pop_first() {
                self.last_seen.remove(&identity_id);
                removed += 1;
            }
        }
        removed
    }
}

pub struct ReplayGuard {
    config: GuardConfig,
    state: Mutex<GuardState>,
}

impl ReplayGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GuardState::new()),
        }
    }

    /// Check `identity_id` against the cooldown and mark it when fresh.
    ///
    /// A mark in the future (the clock moved backwards) counts as within the
    /// cooldown.
    pub fn check_and_mark(
        &self,
        identity_id: &IdentityId,
        now: Timestamp,
        cooldown_secs: u64,
    ) -> GuardDecision {
        let mut state = self.lock();

        if state
            .last_sweep
            .has_expired(self.config.sweep_interval_secs, now)
        {
            let removed = self.sweep_locked(&mut state, now, cooldown_secs);
            if removed > 0 {
                tracing::debug!(removed, remaining = state.last_seen.len(), "replay guard swept");
            }
        }

        if let Some(&last_seen) = state.last_seen.get(identity_id) {
            if last_seen.elapsed_since(now) < cooldown_secs {
                return GuardDecision::WithinCooldown { last_seen };
            }
        } else if state.last_seen.len() >= self.config.capacity {
            state.evict_oldest();
        }

        state.mark(identity_id, now);
        GuardDecision::Fresh
    }

    /// Undo a mark made at `marked_at`, unless a later attempt replaced it.
    ///
    /// Used when an attempt could not be classified (store unavailable) so a
    /// retry of the same frame is not mistaken for a duplicate.
    pub fn release(&self, identity_id: &IdentityId, marked_at: Timestamp) -> bool {
        let mut state = self.lock();
        if state.last_seen.get(identity_id) == Some(&marked_at) {
            state.remove(identity_id);
            true
        } else {
            false
        }
    }

    /// Drop entries older than `cooldown * sweep_multiplier`. Returns the
    /// number of entries removed.
    pub fn sweep(&self, now: Timestamp, cooldown_secs: u64) -> usize {
        let mut state = self.lock();
        self.sweep_locked(&mut state, now, cooldown_secs)
    }

    pub fn len(&self) -> usize {
        self.lock().last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_locked(&self, state: &mut GuardState, now: Timestamp, cooldown_secs: u64) -> usize {
        // Never shorter than the cooldown itself, so a sweep cannot admit a
        // read that the cooldown would have rejected.
        let horizon = cooldown_secs.saturating_mul(self.config.sweep_multiplier.max(1));
        state.last_sweep = now;
        state.drop_expired(horizon, now)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}
