//! Cookie-identified sessions over a two-tier store.
//!
//! This crate provides:
//! - A per-request [`Session`] with a dictionary-like interface and an
//!   explicit `Unstarted → Active → Terminated` lifecycle
//! - Unguessable [`SessionId`]s, rotated on privilege changes
//! - A [`TwoTierStore`]: cache-aside loads and write-through saves across a
//!   volatile [`Cache`] and an authoritative [`DurableStore`], absorbing
//!   partial failures of either tier
//! - A [`PayloadCodec`] that stores structured [`Record`]s in their own
//!   compact form next to plain JSON values
//! - A [`SessionManager`] hook for the host's request pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_session::{
//!     MemoryCache, NoDurableStore, PayloadCodec, SessionConfig, SessionManager, TwoTierStore,
//! };
//!
//! let store = TwoTierStore::new(MemoryCache::default(), NoDurableStore, PayloadCodec::default());
//! let manager = SessionManager::new(store, SessionConfig::default());
//!
//! let mut headers = http::HeaderMap::new();
//! manager.run(cookie_header, &mut headers, |session| {
//!     session.insert("visits", 1_i64)?;
//!     Ok::<_, strata_session::SessionError>(())
//! })?;
//! ```

mod codec;
mod config;
mod cookie;
mod error;
mod id;
mod lru_cache;
mod manager;
mod session;
mod store;
mod tiered;
mod ttl;
mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use codec::{FORMAT_VERSION, PayloadCodec};
pub use config::{
    CacheConfig, DEFAULT_COOKIE_NAME, DEFAULT_COOKIE_PATH, DEFAULT_LIFETIME, SessionConfig,
};
pub use cookie::CookieCodec;
pub use error::{Result, SessionError, StoreError};
pub use id::{SESSION_ID_LEN, SessionId};
pub use lru_cache::{CacheStats, MemoryCache};
pub use manager::SessionManager;
pub use session::{Session, SessionState};
pub use store::{Cache, DurableStore, NoDurableStore};
pub use tiered::{LoadOutcome, LoadSource, SaveOutcome, TwoTierStore};
pub use value::{
    EXPIRATION_KEY, Payload, Record, RecordRegistry, RecordValue, Value, format_timestamp,
    parse_timestamp,
};
