//! Auth-session store: the single source of truth for the bearer token.
//!
//! SYSTEM CONTEXT
//! ==============
//! The API client reads a token snapshot at the start of every request and
//! signs the session out when the service reports the token as expired or
//! invalid. Hosts (the CLI, tests) subscribe to state changes and register
//! a [`Navigator`] to react to sign-out.
//!
//! DESIGN
//! ======
//! - Every change is mirrored to a [`KeyValueStore`] under [`TOKEN_KEY`];
//!   clearing the token removes the key.
//! - The identity view is decoded once per change and cached next to the
//!   raw token.
//! - Listeners run synchronously after the change is applied, outside the
//!   state lock, so a listener may read the session again.
//! - Changes are delivered one at a time, in the order they were applied.
//!   The last state a listener sees is always the current one. A listener
//!   must not change the session itself; that would block on delivery.
//!
//! A token whose payload cannot be decoded stays in place (the service is
//! still the one to reject it) but yields no identity.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::claims::{self, Identity};
use crate::storage::{KeyValueStore, MemoryStore};

/// Storage key holding the raw token.
pub const TOKEN_KEY: &str = "token";

/// Route the navigator is sent to after sign-out.
pub const SIGN_OUT_ROUTE: &str = "/";

/// Snapshot delivered to listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub token: Option<String>,
    pub identity: Option<Identity>,
}

impl SessionState {
    fn from_token(token: Option<String>) -> Self {
        let identity = token.as_deref().and_then(derive_identity);
        Self { token, identity }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().is_some_and(|identity| identity.admin)
    }
}

/// Navigation hook invoked on sign-out.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, path: &str) {
        self(path);
    }
}

/// Handle returned by [`Session::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

struct SessionInner {
    state: RwLock<SessionState>,
    store: Arc<dyn KeyValueStore>,
    listeners: Mutex<Listeners>,
    navigator: RwLock<Option<Arc<dyn Navigator>>>,
    /// Held from applying a change until its listeners return.
    delivery: Mutex<()>,
}

/// Shared handle to the current session. Cloning shares the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("signed_in", &state.token.is_some())
            .field("identity", &state.identity)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session whose initial token is read from `store`.
    ///
    /// A read failure is logged and the session starts anonymous.
    #[must_use]
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let token = match store.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored token; starting signed out");
                None
            }
        };
        let state = SessionState::from_token(token);
        if let Some(identity) = &state.identity {
            tracing::debug!(user_id = %identity.user_id, admin = identity.admin, "restored session");
        }
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(state),
                store,
                listeners: Mutex::new(Listeners::default()),
                navigator: RwLock::new(None),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Session backed by a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStore::new()))
    }

    /// Current token snapshot.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.read_state().token.clone()
    }

    /// Current full state snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.read_state().clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.read_state().identity.clone()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.read_state().is_admin()
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.read_state().token.is_some()
    }

    /// Replace the current token. No shape validation is done here.
    pub fn set_token(&self, token: impl Into<String>) {
        self.replace(Some(token.into()));
    }

    /// Clear the token and send the navigator to [`SIGN_OUT_ROUTE`].
    pub fn sign_out(&self) {
        self.replace(None);
        let navigator = self
            .inner
            .navigator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(navigator) = navigator {
            navigator.navigate(SIGN_OUT_ROUTE);
        }
    }

    /// Register the sign-out navigation hook, replacing any previous one.
    pub fn set_navigator(&self, navigator: impl Navigator + 'static) {
        *self
            .inner
            .navigator
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(navigator));
    }

    /// Register `listener`. It receives the current state immediately and
    /// every later change synchronously.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let _delivery = self.lock_delivery();
        let id = {
            let mut listeners = self.lock_listeners();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::clone(&listener)));
            id
        };
        listener(&self.state());
        Subscription(id)
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.entries.len();
        listeners.entries.retain(|(id, _)| *id != subscription.0);
        listeners.entries.len() != before
    }

    fn replace(&self, token: Option<String>) {
        let _delivery = self.lock_delivery();
        let snapshot = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *state = SessionState::from_token(token);
            self.persist(state.token.as_deref());
            state.clone()
        };

        match &snapshot.identity {
            Some(identity) => {
                tracing::info!(user_id = %identity.user_id, admin = identity.admin, "session identity set");
            }
            None if snapshot.token.is_none() => tracing::info!("session cleared"),
            None => {}
        }

        let listeners: Vec<Listener> = self
            .lock_listeners()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn persist(&self, token: Option<&str>) {
        let result = match token {
            Some(token) => self.inner.store.set(TOKEN_KEY, token),
            None => self.inner.store.remove(TOKEN_KEY),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist session token");
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_delivery(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn derive_identity(token: &str) -> Option<Identity> {
    match claims::decode(token) {
        Ok(claims) => Some(claims.into()),
        Err(e) => {
            tracing::warn!(error = %e, "session token could not be decoded; identity unavailable");
            None
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
