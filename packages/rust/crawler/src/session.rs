//! Rotatable session pool.
//!
//! A session is a network identity: a browser profile plus an error score
//! and usage count. Workers check one out per request and report a
//! good/bad verdict afterwards; sessions that serve too many requests or
//! collect too many bad verdicts are retired, so rotation naturally drifts
//! away from identities the target has started blocking.

use std::sync::Mutex;

use uuid::Uuid;

use agencyscout_shared::SessionLimits;

/// Browser profiles rotated across sessions.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
];

/// Checked-out view of a session, valid for exactly one request.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub user_agent: &'static str,
}

#[derive(Debug)]
struct Slot {
    id: Uuid,
    user_agent: &'static str,
    usage: u32,
    errors: u32,
}

impl Slot {
    fn fresh() -> Self {
        Self {
            id: Uuid::now_v7(),
            user_agent: USER_AGENTS[fastrand::usize(..USER_AGENTS.len())],
            usage: 0,
            errors: 0,
        }
    }
}

/// Pool of rotatable sessions with crawlee-style retirement thresholds.
pub struct SessionPool {
    limits: SessionLimits,
    slots: Mutex<Vec<Slot>>,
}

impl SessionPool {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Check out a session for one request. Exhausted sessions are retired
    /// here; the pool grows lazily up to its size limit.
    pub fn acquire(&self) -> SessionHandle {
        let mut slots = self.slots.lock().unwrap();

        slots.retain(|s| s.usage < self.limits.max_usage_count);

        if slots.is_empty() || slots.len() < self.limits.max_pool_size.max(1) {
            slots.push(Slot::fresh());
        }

        let index = fastrand::usize(..slots.len());
        let slot = &mut slots[index];
        slot.usage += 1;
        SessionHandle {
            id: slot.id,
            user_agent: slot.user_agent,
        }
    }

    /// Report a successful request; decays the error score.
    pub fn mark_good(&self, handle: &SessionHandle) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.iter_mut().find(|s| s.id == handle.id) {
            slot.errors = slot.errors.saturating_sub(1);
        }
    }

    /// Report a blocked or failed request; evicts the session once its
    /// error score exceeds the limit.
    pub fn mark_bad(&self, handle: &SessionHandle) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(pos) = slots.iter().position(|s| s.id == handle.id) {
            slots[pos].errors += 1;
            if slots[pos].errors > self.limits.max_error_score {
                tracing::debug!(session = %handle.id, "evicting degraded session");
                slots.remove(pos);
            }
        }
    }

    /// Live sessions currently in the pool.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
