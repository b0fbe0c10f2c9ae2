//! In-process concurrency guard for per-session orchestrator runs.
//!
//! A process-wide registry of session ids with an active generation run.
//! Claiming is a single check-and-insert under one mutex, so two concurrent
//! callers can never both claim the same session. The guard is advisory and
//! process-local: it coordinates tasks inside one process, not across
//! replicas.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use docflow_utils::SessionId;
use tracing::trace;

/// Process-wide set of sessions currently being orchestrated.
///
/// Constructed once at startup and shared (`Arc`) between the orchestrator
/// and the trigger surface. A claim conflict is a normal outcome, not an
/// error.
#[derive(Debug, Default)]
pub struct ConcurrencyGuard {
    active: Mutex<HashSet<SessionId>>,
}

impl ConcurrencyGuard {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempt to claim exclusive execution for `session_id`.
    ///
    /// The membership check and the insert are one atomic step: a single
    /// `HashSet::insert` under the lock. Returns `None` when another run
    /// already owns the session.
    ///
    /// The returned [`Claim`] releases on drop, so release happens on every
    /// exit path of the holder, including panics.
    #[must_use]
    pub fn try_claim(self: &Arc<Self>, session_id: &SessionId) -> Option<Claim> {
        let inserted = self
            .lock_active()
            .insert(session_id.clone());

        if inserted {
            trace!(session_id = %session_id, "claimed session for generation run");
            Some(Claim {
                guard: Arc::clone(self),
                session_id: session_id.clone(),
            })
        } else {
            trace!(session_id = %session_id, "claim conflict, session already running");
            None
        }
    }

    /// Whether `session_id` is currently claimed.
    #[must_use]
    pub fn is_claimed(&self, session_id: &SessionId) -> bool {
        self.lock_active().contains(session_id)
    }

    /// Number of sessions with an active claim.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashSet<SessionId>> {
        // A panicking holder still releases via Claim's Drop, so the set
        // remains consistent even through poisoning.
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, session_id: &SessionId) {
        let removed = self.lock_active().remove(session_id);
        if removed {
            trace!(session_id = %session_id, "released session claim");
        }
    }
}

/// Exclusive ownership of one session's generation run.
///
/// Dropping the claim releases the session.
#[derive(Debug)]
pub struct Claim {
    guard: Arc<ConcurrencyGuard>,
    session_id: SessionId,
}

impl Claim {
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Explicitly release the claim. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.guard.release(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    #[test]
    fn claim_and_release() {
        let guard = ConcurrencyGuard::new();
        let id = sid("sess-1");

        let claim = guard.try_claim(&id).unwrap();
        assert!(guard.is_claimed(&id));
        assert_eq!(claim.session_id(), &id);

        claim.release();
        assert!(!guard.is_claimed(&id));

        // Claimable again after release.
        let _again = guard.try_claim(&id).unwrap();
    }

    #[test]
    fn second_claim_conflicts() {
        let guard = ConcurrencyGuard::new();
        let id = sid("sess-1");

        let _held = guard.try_claim(&id).unwrap();
        assert!(guard.try_claim(&id).is_none());
    }

    #[test]
    fn distinct_sessions_are_independent() {
        let guard = ConcurrencyGuard::new();

        let _a = guard.try_claim(&sid("sess-a")).unwrap();
        let _b = guard.try_claim(&sid("sess-b")).unwrap();
        assert_eq!(guard.active_count(), 2);
    }

    #[test]
    fn releases_on_drop() {
        let guard = ConcurrencyGuard::new();
        let id = sid("sess-1");

        {
            let _claim = guard.try_claim(&id).unwrap();
            assert!(guard.is_claimed(&id));
        }
        assert!(!guard.is_claimed(&id));
    }

    #[test]
    fn releases_when_holder_panics() {
        let guard = ConcurrencyGuard::new();
        let id = sid("sess-1");

        let guard_clone = Arc::clone(&guard);
        let id_clone = id.clone();
        let result = std::thread::spawn(move || {
            let _claim = guard_clone.try_claim(&id_clone).unwrap();
            panic!("holder dies mid-run");
        })
        .join();

        assert!(result.is_err());
        assert!(!guard.is_claimed(&id));
    }

    #[test]
    fn exactly_one_of_many_racing_claims_wins() {
        let guard = ConcurrencyGuard::new();
        let id = sid("sess-contended");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = Arc::clone(&guard);
            let id = id.clone();
            handles.push(std::thread::spawn(move || {
                guard.try_claim(&id).map(std::mem::forget).is_some()
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(wins, 1);
    }
}
