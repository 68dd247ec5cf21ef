//! The per-request session.
//!
//! State machine:
//!
//! ```text
//! Unstarted --start / first insert--> Active --rotate--> Active (new id)
//!                                       |
//!                                       +--terminate--> Terminated
//! ```
//!
//! All mutations only touch the in-memory payload until [`Session::save`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::cookie::CookieCodec;
use crate::error::{Result, SessionError};
use crate::id::SessionId;
use crate::tiered::{SaveOutcome, TwoTierStore};
use crate::value::{EXPIRATION_KEY, Payload, Record, Value, parse_timestamp};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No identifier; nothing will be persisted.
    Unstarted,
    /// Identifier assigned, payload loaded or freshly created.
    Active,
    /// Storage cleared and identifier discarded.
    Terminated,
}

/// A live session bound to one request.
pub struct Session {
    store: Arc<TwoTierStore>,
    config: Arc<SessionConfig>,
    state: SessionState,
    id: Option<SessionId>,
    payload: Payload,
    dirty: bool,
    pending_cookie: bool,
}

impl Session {
    /// Create an unstarted session.
    pub fn new(store: Arc<TwoTierStore>, config: Arc<SessionConfig>) -> Self {
        Self {
            store,
            config,
            state: SessionState::Unstarted,
            id: None,
            payload: Payload::new(),
            dirty: false,
            pending_cookie: false,
        }
    }

    /// Resume the session named by `id`.
    ///
    /// Lost, corrupt and expired sessions all come back unstarted, exactly
    /// like a visitor without a cookie. Expired data is removed from storage.
    pub fn load(store: Arc<TwoTierStore>, config: Arc<SessionConfig>, id: SessionId) -> Self {
        let mut session = Self::new(store, config);

        let Some(payload) = session.store.load(&id).into_payload() else {
            return session;
        };

        match payload.expiration() {
            Some(expiration) if expiration > Utc::now() => {
                trace!(sid = %id.short(), entries = payload.len(), "Session resumed");
                session.state = SessionState::Active;
                session.id = Some(id);
                session.payload = payload;
            }
            _ => {
                debug!(sid = %id.short(), "Session expired, discarding");
                session.store.delete(&id);
            }
        }
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The current identifier (`None` unless active).
    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Whether the payload changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a cookie announcing a new identifier is waiting to be emitted.
    pub fn has_pending_cookie(&self) -> bool {
        self.pending_cookie
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.payload.expiration()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start a new session expiring at `expiration` (default: now + lifetime).
    ///
    /// Starting over an active session discards its payload and storage
    /// entries and assigns a new identifier.
    pub fn start(&mut self, expiration: Option<DateTime<Utc>>) -> Result<()> {
        self.ensure_not_terminated()?;
        if let Some(old) = self.id.take() {
            self.store.delete(&old);
        }

        let expiration = expiration.unwrap_or_else(|| Utc::now() + self.config.lifetime);
        let id = SessionId::generate();
        debug!(sid = %id.short(), %expiration, "Session started");

        self.payload = Payload::with_expiration(expiration);
        self.id = Some(id);
        self.state = SessionState::Active;
        self.dirty = true;
        self.pending_cookie = true;
        Ok(())
    }

    /// Assign a new identifier while keeping the payload.
    ///
    /// Call after a privilege change such as login. The old identifier's
    /// storage entries are removed. An unstarted session is started instead.
    pub fn rotate(&mut self) -> Result<()> {
        self.ensure_not_terminated()?;
        let Some(old) = self.id.take() else {
            return self.start(None);
        };

        self.store.delete(&old);
        let id = SessionId::generate();
        debug!(old = %old.short(), sid = %id.short(), "Session identifier rotated");

        self.id = Some(id);
        self.dirty = true;
        self.pending_cookie = true;
        Ok(())
    }

    /// End the session and remove it from storage.
    pub fn terminate(&mut self) {
        if let Some(id) = self.id.take() {
            debug!(sid = %id.short(), "Session terminated");
            self.store.delete(&id);
        }
        self.payload = Payload::new();
        self.state = SessionState::Terminated;
        self.dirty = false;
        self.pending_cookie = false;
    }

    /// Persist the payload.
    ///
    /// Returns `Ok(None)` when nothing was written: the session is not
    /// active, or `only_if_dirty` is set and nothing changed. Storage
    /// failures are reported through the [`SaveOutcome`], never as `Err`.
    pub fn save(&mut self, only_if_dirty: bool) -> Result<Option<SaveOutcome>> {
        let Some(id) = self.id.as_ref().filter(|_| self.is_active()) else {
            return Ok(None);
        };
        if only_if_dirty && !self.dirty {
            return Ok(None);
        }

        let outcome = self.store.save(id, &self.payload)?;
        if outcome.stored() {
            self.dirty = false;
        }
        Ok(Some(outcome))
    }

    /// The `Set-Cookie` value to emit, at most once per identifier change.
    pub fn take_cookie_to_emit(&mut self) -> Option<String> {
        if !self.pending_cookie {
            return None;
        }
        self.pending_cookie = false;

        let id = self.id.as_ref()?;
        let expiration = self
            .payload
            .expiration()
            .unwrap_or_else(|| Utc::now() + self.config.lifetime);
        Some(CookieCodec::from_config(&self.config).serialize(id, expiration))
    }

    // ── Mapping interface ───────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The value for `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.payload.get(key).cloned().unwrap_or(default)
    }

    /// The value for `key`; absence is an error.
    pub fn value(&self, key: &str) -> Result<&Value> {
        self.payload
            .get(key)
            .ok_or_else(|| SessionError::KeyNotFound(key.to_string()))
    }

    /// Deserialize a plain value into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.payload.get_as(key)
    }

    /// Borrow a structured record of type `T`.
    pub fn get_record<T: Record>(&self, key: &str) -> Option<&T> {
        self.payload.get_record(key)
    }

    /// Set `key` to `value`, starting the session first if needed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        self.ensure_not_terminated()?;
        let key = key.into();
        let value = value.into();

        if key == EXPIRATION_KEY && parse_timestamp(&value).is_none() {
            return Err(SessionError::InvalidExpiration(format!("{:?}", value)));
        }
        if self.state == SessionState::Unstarted {
            self.start(None)?;
        }

        self.dirty = true;
        Ok(self.payload.insert(key, value))
    }

    /// Move the expiration, starting the session first if needed.
    pub fn set_expiration(&mut self, expiration: DateTime<Utc>) -> Result<()> {
        self.insert(EXPIRATION_KEY, expiration).map(|_| ())
    }

    /// Remove `key` and return its value.
    pub fn remove(&mut self, key: &str) -> Result<Value> {
        self.ensure_not_terminated()?;
        if key == EXPIRATION_KEY {
            return Err(SessionError::ProtectedKey(key.to_string()));
        }

        let value = self
            .payload
            .remove(key)
            .ok_or_else(|| SessionError::KeyNotFound(key.to_string()))?;
        self.dirty = true;
        Ok(value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }

    /// Iterate over the payload keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.payload.keys()
    }

    fn ensure_not_terminated(&self) -> Result<()> {
        if self.state == SessionState::Terminated {
            return Err(SessionError::Terminated);
        }
        Ok(())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "SID={} {}", id, self.payload),
            None => write!(f, "uninitialized session"),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("id", &self.id.as_ref().map(SessionId::short))
            .field("entries", &self.payload.len())
            .field("dirty", &self.dirty)
            .field("pending_cookie", &self.pending_cookie)
            .finish()
    }
}
