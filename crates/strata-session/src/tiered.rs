//! Cache-aside loads and write-through saves across two storage tiers.
//!
//! Reads try the cache first and fall back to the durable store, repairing
//! the cache on the way out. Writes go to the cache, then the durable store,
//! and retry the cache once if its first write failed. No storage failure
//! escapes this module: everything is logged and folded into
//! [`LoadOutcome`] / [`SaveOutcome`].

use tracing::{debug, error, trace, warn};

use crate::codec::PayloadCodec;
use crate::error::{Result, StoreError};
use crate::id::SessionId;
use crate::store::{Cache, DurableStore};
use crate::value::Payload;

/// Tier a payload was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Durable,
}

/// Result of [`TwoTierStore::load`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The payload was found and decoded.
    Loaded {
        payload: Payload,
        source: LoadSource,
    },
    /// Neither tier holds the identifier (or the durable read failed).
    Missing,
    /// Stored bytes could not be decoded; both tiers have been cleared.
    Corrupt,
}

impl LoadOutcome {
    /// The loaded payload, if any.
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            LoadOutcome::Loaded { payload, .. } => Some(payload),
            LoadOutcome::Missing | LoadOutcome::Corrupt => None,
        }
    }
}

/// Result of [`TwoTierStore::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Both tiers hold the new payload.
    Persisted,
    /// The cache holds the new payload; the durable write failed.
    CacheOnly,
    /// The durable store holds the new payload; both cache writes failed.
    DurableOnly,
    /// Neither tier accepted the write.
    Lost,
}

impl SaveOutcome {
    /// Whether the payload reached the cache tier.
    pub fn cached(self) -> bool {
        matches!(self, SaveOutcome::Persisted | SaveOutcome::CacheOnly)
    }

    /// Whether the payload reached at least one tier.
    pub fn stored(self) -> bool {
        !matches!(self, SaveOutcome::Lost)
    }
}

/// Two-tier session storage: a volatile cache over an authoritative store.
pub struct TwoTierStore {
    cache: Box<dyn Cache>,
    durable: Box<dyn DurableStore>,
    codec: PayloadCodec,
}

impl TwoTierStore {
    pub fn new(
        cache: impl Cache + 'static,
        durable: impl DurableStore + 'static,
        codec: PayloadCodec,
    ) -> Self {
        Self {
            cache: Box::new(cache),
            durable: Box::new(durable),
            codec,
        }
    }

    pub fn codec(&self) -> &PayloadCodec {
        &self.codec
    }

    /// Encode a payload with this store's codec.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        self.codec.encode(payload)
    }

    /// Load the payload for `id`, cache first.
    ///
    /// An undecodable cache entry is evicted and the durable copy is read in
    /// its place. Both tiers are cleared only when the durable bytes are bad.
    pub fn load(&self, id: &SessionId) -> LoadOutcome {
        let key = id.as_str();

        let mut cache_corrupt = false;
        if let Some(bytes) = self.cache.get(key) {
            trace!(sid = %id.short(), "Session cache hit");
            match self.codec.decode(&bytes) {
                Ok(payload) => {
                    return LoadOutcome::Loaded {
                        payload,
                        source: LoadSource::Cache,
                    };
                }
                Err(e) => {
                    warn!(sid = %id.short(), error = %e, "Evicting undecodable cache entry");
                    self.cache.delete(key);
                    cache_corrupt = true;
                }
            }
        } else {
            debug!(sid = %id.short(), "Session cache miss, reading durable store");
        }

        let bytes = match self.durable.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) if cache_corrupt => return LoadOutcome::Corrupt,
            Ok(None) => {
                warn!(sid = %id.short(), "Session data not found in cache or durable store");
                return LoadOutcome::Missing;
            }
            Err(e) => {
                warn!(sid = %id.short(), error = %e, "Durable store read failed, treating session as missing");
                return LoadOutcome::Missing;
            }
        };

        match self.codec.decode(&bytes) {
            Ok(payload) => {
                if !self.cache.set(key, &bytes) {
                    debug!(sid = %id.short(), "Cache repopulation failed");
                }
                LoadOutcome::Loaded {
                    payload,
                    source: LoadSource::Durable,
                }
            }
            Err(e) => {
                warn!(sid = %id.short(), error = %e, "Discarding undecodable session data");
                self.delete(id);
                LoadOutcome::Corrupt
            }
        }
    }

    /// Persist `payload` under `id` to both tiers.
    ///
    /// Returns `Err` only if the payload itself cannot be encoded.
    pub fn save(&self, id: &SessionId, payload: &Payload) -> Result<SaveOutcome> {
        let bytes = self.codec.encode(payload)?;
        Ok(self.save_encoded(id, &bytes))
    }

    /// Persist already-encoded payload bytes under `id` to both tiers.
    pub fn save_encoded(&self, id: &SessionId, bytes: &[u8]) -> SaveOutcome {
        let key = id.as_str();
        let mut cached = self.cache.set(key, bytes);

        let durable_ok = match self.durable.put(key, bytes) {
            Ok(()) => true,
            Err(StoreError::CapabilityDisabled(reason)) => {
                debug!(sid = %id.short(), %reason, "Durable store writes disabled");
                false
            }
            Err(e) => {
                warn!(sid = %id.short(), error = %e, "Unable to persist session to durable store");
                false
            }
        };

        // Retry the cache once after the durable write, whatever its result.
        if !cached {
            cached = self.cache.set(key, bytes);
            if !cached {
                warn!(sid = %id.short(), "Cache write failed twice, invalidating cached copy");
                self.cache.delete(key);
            }
        }

        let outcome = match (cached, durable_ok) {
            (true, true) => SaveOutcome::Persisted,
            (true, false) => SaveOutcome::CacheOnly,
            (false, true) => SaveOutcome::DurableOnly,
            (false, false) => SaveOutcome::Lost,
        };

        if outcome == SaveOutcome::Lost {
            error!(sid = %id.short(), "Session write rejected by both storage tiers");
        } else {
            trace!(sid = %id.short(), ?outcome, bytes = bytes.len(), "Session saved");
        }
        outcome
    }

    /// Remove `id` from both tiers. Never fails.
    pub fn delete(&self, id: &SessionId) {
        let key = id.as_str();
        self.cache.delete(key);
        if let Err(e) = self.durable.delete(key) {
            warn!(sid = %id.short(), error = %e, "Unable to delete session from durable store");
        }
    }
}

impl std::fmt::Debug for TwoTierStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoTierStore")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
