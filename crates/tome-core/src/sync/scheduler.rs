//! Debounced, single-flight scheduling of reconciliation passes
//!
//! Pure state machine: all time comes in as [`Instant`] arguments, so
//! every transition is testable without sleeping. The engine drives it.
//!
//! Per key, the machine is one of three states: idle (absent from the
//! map), pending with a due time, or in flight. A mutation while pending
//! pushes the due time back (debounce); a mutation while in flight only
//! marks the flight dirty, and completion re-arms the key so the edit is
//! picked up by a later pass. At most one flight exists per key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::sync::cursor::SyncKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Pending { due: Instant },
    InFlight { dirty: bool },
}

/// Debounce and single-flight bookkeeping for sync keys
#[derive(Debug)]
pub struct Scheduler {
    debounce: Duration,
    keys: HashMap<SyncKey, KeyState>,
}

impl Scheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            keys: HashMap::new(),
        }
    }

    /// Record a local mutation under a key
    ///
    /// Arms or re-arms the debounce window. If a flight for the key is
    /// already running, the mutation is folded into a dirty marker
    /// instead of starting anything new.
    pub fn record_mutation(&mut self, key: SyncKey, now: Instant) {
        match self.keys.get_mut(&key) {
            Some(KeyState::InFlight { dirty }) => {
                trace!(%key, "mutation during flight, marking dirty");
                *dirty = true;
            }
            _ => {
                trace!(%key, "mutation recorded, debounce armed");
                self.keys
                    .insert(key, KeyState::Pending { due: now + self.debounce });
            }
        }
    }

    /// Take every key whose debounce window has expired, marking each as
    /// in flight
    ///
    /// Keys already in flight are never returned, which is the
    /// single-flight rule.
    pub fn take_due(&mut self, now: Instant) -> Vec<SyncKey> {
        let due: Vec<SyncKey> = self
            .keys
            .iter()
            .filter_map(|(key, state)| match state {
                KeyState::Pending { due } if *due <= now => Some(key.clone()),
                _ => None,
            })
            .collect();
        for key in &due {
            self.keys.insert(key.clone(), KeyState::InFlight { dirty: false });
        }
        due
    }

    /// Mark a flight finished
    ///
    /// A key dirtied during its flight goes back to pending with a fresh
    /// debounce window; otherwise it returns to idle.
    pub fn complete(&mut self, key: &SyncKey, now: Instant) {
        match self.keys.remove(key) {
            Some(KeyState::InFlight { dirty: true }) => {
                trace!(%key, "flight done with pending edits, re-arming");
                self.keys
                    .insert(key.clone(), KeyState::Pending { due: now + self.debounce });
            }
            _ => {
                trace!(%key, "flight done");
            }
        }
    }

    /// Begin an out-of-band flight for a key, if none is running
    ///
    /// Used for one-shot pulls (book open) that bypass debouncing. A
    /// pending push consumed this way is preserved as a dirty marker so
    /// completion re-arms it.
    pub fn try_begin(&mut self, key: SyncKey) -> bool {
        match self.keys.get(&key) {
            Some(KeyState::InFlight { .. }) => false,
            Some(KeyState::Pending { .. }) => {
                self.keys.insert(key, KeyState::InFlight { dirty: true });
                true
            }
            None => {
                self.keys.insert(key, KeyState::InFlight { dirty: false });
                true
            }
        }
    }

    /// Make every pending key due immediately
    ///
    /// Used at teardown so buffered edits are pushed before exit.
    pub fn flush(&mut self, now: Instant) {
        for state in self.keys.values_mut() {
            if let KeyState::Pending { due } = state {
                *due = now;
            }
        }
    }

    /// Whether any key is pending or in flight
    pub fn has_work(&self) -> bool {
        !self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(100);

    fn scheduler() -> (Scheduler, Instant) {
        (Scheduler::new(DEBOUNCE), Instant::now())
    }

    #[test]
    fn test_nothing_due_inside_debounce_window() {
        let (mut s, t0) = scheduler();
        s.record_mutation(SyncKey::progress("abc"), t0);

        assert!(s.take_due(t0).is_empty());
        assert!(s.take_due(t0 + DEBOUNCE / 2).is_empty());
        assert_eq!(s.take_due(t0 + DEBOUNCE), vec![SyncKey::progress("abc")]);
    }

    #[test]
    fn test_repeated_mutations_coalesce_into_one_flight() {
        let (mut s, t0) = scheduler();
        s.record_mutation(SyncKey::progress("abc"), t0);
        s.record_mutation(SyncKey::progress("abc"), t0 + Duration::from_millis(50));

        // The second mutation pushed the window back
        assert!(s.take_due(t0 + DEBOUNCE).is_empty());
        let due = s.take_due(t0 + Duration::from_millis(50) + DEBOUNCE);
        assert_eq!(due, vec![SyncKey::progress("abc")]);
    }

    #[test]
    fn test_single_flight_per_key() {
        let (mut s, t0) = scheduler();
        s.record_mutation(SyncKey::progress("abc"), t0);

        let first = s.take_due(t0 + DEBOUNCE);
        assert_eq!(first.len(), 1);

        // While in flight, a new mutation never produces a second flight
        s.record_mutation(SyncKey::progress("abc"), t0 + DEBOUNCE);
        assert!(s.take_due(t0 + DEBOUNCE * 10).is_empty());
    }

    #[test]
    fn test_dirty_flight_rearms_on_completion() {
        let (mut s, t0) = scheduler();
        let key = SyncKey::notes("abc");
        s.record_mutation(key.clone(), t0);
        s.take_due(t0 + DEBOUNCE);
        s.record_mutation(key.clone(), t0 + DEBOUNCE);

        let t1 = t0 + DEBOUNCE * 2;
        s.complete(&key, t1);
        assert!(s.take_due(t1).is_empty());
        assert_eq!(s.take_due(t1 + DEBOUNCE), vec![key]);
    }

    #[test]
    fn test_clean_flight_goes_idle() {
        let (mut s, t0) = scheduler();
        let key = SyncKey::progress("abc");
        s.record_mutation(key.clone(), t0);
        s.take_due(t0 + DEBOUNCE);
        s.complete(&key, t0 + DEBOUNCE * 2);

        assert!(!s.has_work());
        assert!(s.take_due(t0 + DEBOUNCE * 10).is_empty());
    }

    #[test]
    fn test_distinct_keys_fly_independently() {
        let (mut s, t0) = scheduler();
        s.record_mutation(SyncKey::progress("abc"), t0);
        s.record_mutation(SyncKey::notes("abc"), t0);

        let mut due = s.take_due(t0 + DEBOUNCE);
        due.sort_by_key(|k| k.to_string());
        assert_eq!(due, vec![SyncKey::notes("abc"), SyncKey::progress("abc")]);
    }

    #[test]
    fn test_try_begin_respects_running_flight() {
        let (mut s, t0) = scheduler();
        let key = SyncKey::progress("abc");

        assert!(s.try_begin(key.clone()));
        assert!(!s.try_begin(key.clone()));

        s.complete(&key, t0);
        assert!(s.try_begin(key));
    }

    #[test]
    fn test_try_begin_preserves_buffered_mutation() {
        let (mut s, t0) = scheduler();
        let key = SyncKey::progress("abc");
        s.record_mutation(key.clone(), t0);

        assert!(s.try_begin(key.clone()));
        s.complete(&key, t0);
        // The buffered mutation survived as a re-armed window
        assert_eq!(s.take_due(t0 + DEBOUNCE), vec![key]);
    }

    #[test]
    fn test_flush_makes_pending_due_now() {
        let (mut s, t0) = scheduler();
        s.record_mutation(SyncKey::progress("abc"), t0);

        s.flush(t0);
        assert_eq!(s.take_due(t0), vec![SyncKey::progress("abc")]);
    }
}
