//! In-memory per-user session stores.
//!
//! Sessions are volatile by design: a process restart drops in-progress
//! conversations (completed follow-up answers are already durable by
//! the time the session is discarded). Stores are explicit objects
//! injected into the dispatcher, never ambient globals.
//!
//! Concurrency contract: entries are keyed by user id and mutated in
//! place. Two in-flight events for the same user race, and the last
//! write wins. That matches human-paced chat; no per-user locking is
//! attempted.

use dashmap::DashMap;
use ondam_core::flow::FormSession;
use ondam_core::questions::{Category, PlaceholderCtx};

/// A diagnosis conversation: category selection, then the five-step
/// question tree.
#[derive(Debug, Clone, Default)]
pub struct DiagnosisSession {
    pub category: Option<Category>,
    pub form: FormSession,
}

/// A follow-up check-in conversation. The placeholder context is
/// resolved from the profile once at start so each step renders
/// without another storage read.
#[derive(Debug, Clone)]
pub struct FollowupSession {
    pub form: FormSession,
    pub ctx: PlaceholderCtx,
}

/// Keyed session store with an explicit create/get/delete lifecycle.
pub struct SessionStore<S> {
    inner: DashMap<String, S>,
}

impl<S> SessionStore<S> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Create (or overwrite) the session for a user. Overwriting is the
    /// last-start-wins rule: a fresh trigger discards prior progress.
    pub fn create(&self, user_id: &str, session: S) {
        self.inner.insert(user_id.to_string(), session);
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.inner.contains_key(user_id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn delete(&self, user_id: &str) {
        self.inner.remove(user_id);
    }

    /// Run `f` against the user's session, if any, with the entry
    /// locked for the duration.
    pub fn with<R>(&self, user_id: &str, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.inner.get_mut(user_id).map(|mut entry| f(entry.value_mut()))
    }
}

impl<S> Default for SessionStore<S> {
    fn default() -> Self {
        Self::new()
    }
}
