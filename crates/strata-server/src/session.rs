//! Session middleware and request-scoped session extractor.
//!
//! [`session_middleware`] loads the session named by the request's cookie
//! before the handler runs and finalizes it afterwards, appending any
//! `Set-Cookie` header to the response. Store I/O runs on the blocking pool.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use parking_lot::{Mutex, MutexGuard};
use strata_session::Session;
use tokio::task;
use tracing::{debug, error};

use crate::error::{Result, ServerError};
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// The current request's session.
///
/// Extract it in handlers:
///
/// ```ignore
/// async fn visits(session: SessionHandle) -> Result<String> {
///     let mut session = session.lock();
///     let n = session.get_as::<i64>("visits")?.unwrap_or(0) + 1;
///     session.insert("visits", n)?;
///     Ok(n.to_string())
/// }
/// ```
///
/// Do not hold the guard across an `.await`. Operations that touch the store
/// (`rotate`, `terminate`, `start` on an active session) belong in
/// [`SessionHandle::blocking`].
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock()
    }

    /// Run `f` against the session on the blocking pool.
    pub async fn blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.0.clone();
        task::spawn_blocking(move || f(&mut *inner.lock()))
            .await
            .map_err(|e| ServerError::Internal(format!("session task failed: {}", e)))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.try_lock() {
            Some(session) => f.debug_tuple("SessionHandle").field(&*session).finish(),
            None => f.write_str("SessionHandle(<locked>)"),
        }
    }
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or_else(|| ServerError::Internal("session middleware is not installed".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Session lifecycle middleware.
///
/// A handler panic is caught, the session is still finalized, and the client
/// receives a 500.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let manager = state.sessions().clone();
    let cookies = request.headers().clone();
    let session = match task::spawn_blocking(move || manager.begin_from_headers(&cookies)).await {
        Ok(session) => session,
        Err(e) => return ServerError::Internal(format!("session load failed: {}", e)).into_response(),
    };

    let handle = SessionHandle::new(session);
    request.extensions_mut().insert(handle.clone());

    let mut response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!(panic = %panic_message(&*panic), "Handler panicked");
            ServerError::Internal("handler panicked".into()).into_response()
        }
    };

    let manager = state.sessions().clone();
    let finalized = task::spawn_blocking(move || {
        let mut headers = HeaderMap::new();
        let outcome = manager.finalize(&mut *handle.lock(), &mut headers);
        (headers, outcome)
    })
    .await;

    match finalized {
        Ok((headers, outcome)) => {
            if let Some(outcome) = outcome {
                debug!(?outcome, "Session saved");
            }
            for value in headers.get_all(SET_COOKIE) {
                response.headers_mut().append(SET_COOKIE, value.clone());
            }
        }
        Err(e) => error!(error = %e, "Session finalize task failed"),
    }

    response
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header::COOKIE},
        middleware,
        routing::get,
    };
    use strata_session::testing::{FlakyCache, FlakyStore};
    use strata_session::{PayloadCodec, SessionConfig, SessionManager, TwoTierStore};
    use tower::ServiceExt;

    struct Fixture {
        cache: Arc<FlakyCache>,
        durable: Arc<FlakyStore>,
        state: AppState,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(FlakyCache::new());
        let durable = Arc::new(FlakyStore::new());
        let store = TwoTierStore::new(cache.clone(), durable.clone(), PayloadCodec::default());
        let state = AppState::new(SessionManager::new(store, SessionConfig::default()));
        Fixture {
            cache,
            durable,
            state,
        }
    }

    async fn count(session: SessionHandle) -> Result<String> {
        let mut session = session.lock();
        let n = session.get_as::<i64>("n")?.unwrap_or(0) + 1;
        session.insert("n", n)?;
        Ok(n.to_string())
    }

    async fn peek(session: SessionHandle) -> String {
        session.lock().contains_key("n").to_string()
    }

    async fn explode(session: SessionHandle) -> String {
        session.lock().insert("before_panic", true).unwrap();
        panic!("handler exploded");
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/count", get(count))
            .route("/peek", get(peek))
            .route("/explode", get(explode))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                session_middleware,
            ))
            .with_state(state)
    }

    async fn send(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// `sid=<id>` from the response's `Set-Cookie` header.
    fn cookie_pair(response: &Response) -> Option<String> {
        let value = response.headers().get(SET_COOKIE)?.to_str().ok()?;
        value.split(';').next().map(str::to_string)
    }

    #[tokio::test]
    async fn test_first_write_sets_cookie_once() {
        let f = fixture();
        let app = router(f.state.clone());

        let first = send(&app, "/count", None).await;
        assert_eq!(first.status(), StatusCode::OK);
        let cookie = cookie_pair(&first).unwrap();
        assert_eq!(body_string(first).await, "1");

        let second = send(&app, "/count", Some(&cookie)).await;
        assert!(second.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_string(second).await, "2");

        let id = cookie.strip_prefix("sid=").unwrap();
        assert!(f.cache.contains(id));
        assert!(f.durable.contains(id));
    }

    #[tokio::test]
    async fn test_read_only_request_leaves_no_trace() {
        let f = fixture();
        let app = router(f.state.clone());

        let response = send(&app, "/peek", None).await;

        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "false");
        assert!(f.cache.is_empty());
        assert!(f.durable.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_cookie_starts_fresh() {
        let f = fixture();
        let app = router(f.state.clone());
        let stale = format!("sid={}", strata_session::SessionId::generate());

        let response = send(&app, "/count", Some(&stale)).await;

        let cookie = cookie_pair(&response).unwrap();
        assert_ne!(cookie, stale);
        assert_eq!(body_string(response).await, "1");
    }

    #[tokio::test]
    async fn test_panicking_handler_still_saves() {
        let f = fixture();
        let app = router(f.state.clone());

        let response = send(&app, "/explode", None).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let cookie = cookie_pair(&response).unwrap();
        let id = cookie.strip_prefix("sid=").unwrap();
        assert!(f.durable.contains(id));
    }

    #[tokio::test]
    async fn test_extractor_without_middleware() {
        let app: Router = Router::new().route("/count", get(count));

        let response = send(&app, "/count", None).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("internal_error"));
    }

    #[tokio::test]
    async fn test_blocking_runs_against_shared_session() {
        let f = fixture();
        let handle = SessionHandle::new(f.state.sessions().begin(None));

        let started = handle.blocking(|s| s.insert("k", 1_i64).is_ok()).await.unwrap();

        assert!(started);
        assert!(handle.lock().is_active());
    }
}
