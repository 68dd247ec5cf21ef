//! Request lifecycle integration.
//!
//! The host pipeline calls [`SessionManager::begin`] before handler code
//! runs and [`SessionManager::finalize`] after it, on every exit path.
//! [`SessionManager::run`] packages both around a closure.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderValue};
use tracing::{error, warn};

use crate::config::SessionConfig;
use crate::cookie::CookieCodec;
use crate::session::Session;
use crate::tiered::{SaveOutcome, TwoTierStore};

/// Builds sessions from inbound cookies and finalizes them into responses.
///
/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: Arc<TwoTierStore>,
    config: Arc<SessionConfig>,
    cookies: CookieCodec,
}

impl SessionManager {
    pub fn new(store: TwoTierStore, config: SessionConfig) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(config))
    }

    pub fn from_shared(store: Arc<TwoTierStore>, config: Arc<SessionConfig>) -> Self {
        let cookies = CookieCodec::from_config(&config);
        Self {
            store,
            config,
            cookies,
        }
    }

    pub fn store(&self) -> &Arc<TwoTierStore> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cookies(&self) -> &CookieCodec {
        &self.cookies
    }

    /// Build the session for a request carrying `cookie_header`.
    ///
    /// No header, no session cookie, or a malformed identifier all yield an
    /// unstarted session.
    pub fn begin(&self, cookie_header: Option<&str>) -> Session {
        match cookie_header.and_then(|h| self.cookies.parse(h)) {
            Some(id) => Session::load(self.store.clone(), self.config.clone(), id),
            None => Session::new(self.store.clone(), self.config.clone()),
        }
    }

    /// Build the session from every `Cookie` header of a request.
    pub fn begin_from_headers(&self, headers: &HeaderMap) -> Session {
        match self.cookies.parse_headers(headers) {
            Some(id) => Session::load(self.store.clone(), self.config.clone(), id),
            None => Session::new(self.store.clone(), self.config.clone()),
        }
    }

    /// Emit the pending cookie into `headers`, then save the session if dirty.
    ///
    /// Returns the save outcome, or `None` when nothing needed saving.
    pub fn finalize(&self, session: &mut Session, headers: &mut HeaderMap) -> Option<SaveOutcome> {
        if let Some(cookie) = session.take_cookie_to_emit() {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => warn!(error = %e, "Session cookie is not a valid header value"),
            }
        }

        match session.save(true) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Unable to encode session payload");
                None
            }
        }
    }

    /// Run `handler` inside a session scope.
    ///
    /// The session is finalized into `headers` whether the handler returns
    /// `Ok`, returns `Err`, or panics. A panic is resumed after finalizing.
    pub fn run<T, E, F>(&self, cookie_header: Option<&str>, headers: &mut HeaderMap, handler: F) -> Result<T, E>
    where
        F: FnOnce(&mut Session) -> Result<T, E>,
    {
        let mut session = self.begin(cookie_header);
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut session)));
        self.finalize(&mut session, headers);

        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadCodec;
    use crate::error::{SessionError, StoreError};
    use crate::id::SessionId;
    use crate::session::SessionState;
    use crate::testing::{FlakyCache, FlakyStore};
    use crate::tiered::LoadOutcome;
    use crate::value::{RecordRegistry, Value};
    use crate::value::tests::Account;
    use chrono::{TimeDelta, Utc};
    use serde_json::json;

    struct Fixture {
        cache: Arc<FlakyCache>,
        durable: Arc<FlakyStore>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(FlakyCache::new());
        let durable = Arc::new(FlakyStore::new());
        let codec = PayloadCodec::new(RecordRegistry::new().with::<Account>());
        let store = TwoTierStore::new(cache.clone(), durable.clone(), codec);
        Fixture {
            cache,
            durable,
            manager: SessionManager::new(store, SessionConfig::default()),
        }
    }

    /// Pull the identifier out of a `Set-Cookie` header.
    fn cookie_id(headers: &HeaderMap) -> SessionId {
        let value = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        let pair = value.split(';').next().unwrap();
        SessionId::parse(pair.strip_prefix("sid=").unwrap()).unwrap()
    }

    #[test]
    fn test_new_visitor_cart_scenario() {
        let f = fixture();
        let mut headers = HeaderMap::new();
        let before = Utc::now();

        let mut session = f.manager.begin(None);
        assert_eq!(session.state(), SessionState::Unstarted);
        session.insert("cart", json!([1, 2, 3])).unwrap();
        let outcome = f.manager.finalize(&mut session, &mut headers);

        assert_eq!(outcome, Some(SaveOutcome::Persisted));
        let set_cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains("; Path=/; Expires="));

        let id = cookie_id(&headers);
        assert!(f.cache.contains(id.as_str()));
        assert!(f.durable.contains(id.as_str()));

        let stored = f.manager.store().load(&id).into_payload().unwrap();
        assert_eq!(stored.get("cart"), Some(&Value::from(json!([1, 2, 3]))));
        let expiration = stored.expiration().unwrap();
        assert!(expiration >= before + TimeDelta::days(7) - TimeDelta::seconds(1));
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_returning_visitor_gets_no_new_cookie() {
        let f = fixture();
        let mut headers = HeaderMap::new();
        let mut session = f.manager.begin(None);
        session.insert("n", 1_i64).unwrap();
        f.manager.finalize(&mut session, &mut headers);
        let id = cookie_id(&headers);

        let header = format!("sid={}", id);
        let mut headers = HeaderMap::new();
        let mut session = f.manager.begin(Some(&header));
        assert_eq!(session.id(), Some(&id));
        assert_eq!(session.get_as::<i64>("n").unwrap(), Some(1));

        session.insert("n", 2_i64).unwrap();
        assert_eq!(
            f.manager.finalize(&mut session, &mut headers),
            Some(SaveOutcome::Persisted)
        );
        assert!(headers.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_read_only_request_writes_nothing() {
        let f = fixture();
        let mut headers = HeaderMap::new();
        let mut session = f.manager.begin(None);
        session.insert("n", 1_i64).unwrap();
        f.manager.finalize(&mut session, &mut headers);
        let header = format!("sid={}", cookie_id(&headers));
        let puts = f.durable.put_calls();

        let mut session = f.manager.begin(Some(&header));
        assert!(session.contains_key("n"));
        assert_eq!(f.manager.finalize(&mut session, &mut HeaderMap::new()), None);
        assert_eq!(f.durable.put_calls(), puts);
    }

    #[test]
    fn test_malformed_cookie_is_no_session() {
        let f = fixture();
        for header in ["sid=../../etc", "garbage", "", "other=1"] {
            let session = f.manager.begin(Some(header));
            assert_eq!(session.state(), SessionState::Unstarted);
        }
        assert_eq!(f.durable.get_calls(), 0);
    }

    #[test]
    fn test_lost_session_is_fresh() {
        let f = fixture();
        let header = format!("sid={}", SessionId::generate());

        let session = f.manager.begin(Some(&header));

        assert_eq!(session.state(), SessionState::Unstarted);
        assert!(session.payload().is_empty());
    }

    #[test]
    fn test_durable_fallback_then_cache_hit() {
        let f = fixture();
        let mut headers = HeaderMap::new();
        let mut session = f.manager.begin(None);
        session.insert("k", "v").unwrap();
        f.manager.finalize(&mut session, &mut headers);
        let id = cookie_id(&headers);
        f.cache.evict(id.as_str());

        let header = format!("sid={}", id);
        let session = f.manager.begin(Some(&header));
        assert_eq!(session.get("k"), Some(&Value::from("v")));
        assert_eq!(f.durable.get_calls(), 1);

        let session = f.manager.begin(Some(&header));
        assert_eq!(session.get("k"), Some(&Value::from("v")));
        assert_eq!(f.durable.get_calls(), 1);
    }

    #[test]
    fn test_transient_durable_failure_is_absorbed() {
        let f = fixture();
        f.durable
            .fail_puts_with(Some(StoreError::TransientFailure("deadline".into())));
        let mut headers = HeaderMap::new();

        let mut session = f.manager.begin(None);
        session.insert("k", "v").unwrap();
        let outcome = f.manager.finalize(&mut session, &mut headers);

        assert_eq!(outcome, Some(SaveOutcome::CacheOnly));
        let id = cookie_id(&headers);
        assert!(f.cache.contains(id.as_str()));
        assert!(!f.durable.contains(id.as_str()));
    }

    #[test]
    fn test_login_rotation_across_requests() {
        let f = fixture();

        // Request 1: anonymous visitor adds to cart.
        let mut headers = HeaderMap::new();
        let mut session = f.manager.begin(None);
        session.insert("cart", json!(["book"])).unwrap();
        f.manager.finalize(&mut session, &mut headers);
        let anonymous = cookie_id(&headers);

        // Request 2: login rotates the identifier.
        let header = format!("sid={}", anonymous);
        let mut headers = HeaderMap::new();
        let mut session = f.manager.begin(Some(&header));
        session
            .insert("user", Value::record(Account { id: 1, name: "ada".into() }))
            .unwrap();
        session.rotate().unwrap();
        f.manager.finalize(&mut session, &mut headers);
        let authenticated = cookie_id(&headers);

        assert_ne!(anonymous, authenticated);
        assert_eq!(f.manager.store().load(&anonymous), LoadOutcome::Missing);

        let header = format!("sid={}", anonymous);
        assert_eq!(
            f.manager.begin(Some(&header)).state(),
            SessionState::Unstarted
        );

        let header = format!("sid={}", authenticated);
        let session = f.manager.begin(Some(&header));
        assert_eq!(session.get_record::<Account>("user").unwrap().name, "ada");
        assert_eq!(session.get("cart"), Some(&Value::from(json!(["book"]))));
    }

    #[test]
    fn test_run_finalizes_on_error() {
        let f = fixture();
        let mut headers = HeaderMap::new();

        let result: Result<(), SessionError> = f.manager.run(None, &mut headers, |session| {
            session.insert("partial", true)?;
            session.value("missing").map(|_| ())
        });

        assert!(matches!(result, Err(SessionError::KeyNotFound(_))));
        let id = cookie_id(&headers);
        assert!(f.durable.contains(id.as_str()));
    }

    #[test]
    fn test_run_finalizes_on_panic() {
        let f = fixture();
        let mut headers = HeaderMap::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), SessionError> = f.manager.run(None, &mut headers, |session| {
                session.insert("k", 1_i64)?;
                panic!("handler blew up");
            });
        }));

        assert!(result.is_err());
        let id = cookie_id(&headers);
        assert!(f.cache.contains(id.as_str()));
    }

    #[test]
    fn test_unfinalized_session_persists_nothing() {
        let f = fixture();
        {
            let mut session = f.manager.begin(None);
            session.insert("k", 1_i64).unwrap();
        }
        assert!(f.cache.is_empty());
        assert!(f.durable.is_empty());
    }
}
