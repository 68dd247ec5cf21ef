//! Demo endpoints exercising the session API.
//!
//! - `GET /` counts visits in a plain value
//! - `POST /login` stores a [`UserRecord`] and rotates the identifier
//! - `POST /logout` terminates the session
//! - `GET /whoami` reads the record back
//! - `GET /session/{key}` shows one stored value

use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strata_session::Value;

use crate::error::{Result, ServerError};
use crate::session::SessionHandle;
use crate::state::AppState;
use crate::user::{USER_KEY, UserRecord};

const VISITS_KEY: &str = "visits";

#[derive(Debug, Serialize, Deserialize)]
pub struct VisitResponse {
    pub visits: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: u64,
    pub name: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: u64,
    pub name: String,
    pub admin: bool,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            name: user.name.clone(),
            admin: user.admin,
        }
    }
}

/// Count this visitor's requests.
pub async fn visit_handler(session: SessionHandle) -> Result<Json<VisitResponse>> {
    let mut session = session.lock();
    let visits = session.get_as::<i64>(VISITS_KEY)?.unwrap_or(0) + 1;
    session.insert(VISITS_KEY, visits)?;
    Ok(Json(VisitResponse { visits }))
}

/// Sign a user in.
///
/// The identifier is rotated before the user is stored, so a pre-login
/// identifier never names an authenticated session.
pub async fn login_handler(
    session: SessionHandle,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserResponse>> {
    if req.name.trim().is_empty() {
        return Err(ServerError::BadRequest("name must not be empty".into()));
    }

    let user = UserRecord {
        user_id: req.user_id,
        name: req.name,
        admin: req.admin,
    };
    let response = UserResponse::from(&user);

    session
        .blocking(move |s| -> strata_session::Result<()> {
            s.rotate()?;
            s.insert(USER_KEY, Value::record(user))?;
            Ok(())
        })
        .await??;

    Ok(Json(response))
}

/// Sign out and drop the session from both tiers.
pub async fn logout_handler(session: SessionHandle) -> Result<StatusCode> {
    session.blocking(|s| s.terminate()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The signed-in user, or 401.
pub async fn whoami_handler(session: SessionHandle) -> Result<Json<UserResponse>> {
    let session = session.lock();
    session
        .get_record::<UserRecord>(USER_KEY)
        .map(|user| Json(UserResponse::from(user)))
        .ok_or_else(|| ServerError::Unauthorized("not signed in".into()))
}

/// One stored value. Records are shown by kind and encoded size.
pub async fn get_value_handler(
    session: SessionHandle,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let session = session.lock();
    let body = match session.value(&key)? {
        Value::Plain(value) => json!({ "key": key, "value": value }),
        Value::Record(record) => json!({
            "key": key,
            "record": record.kind(),
            "bytes": record.to_bytes().len(),
        }),
    };
    Ok(Json(body))
}

/// Routes that need the session middleware.
pub fn demo_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(visit_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/whoami", get(whoami_handler))
        .route("/session/{key}", get(get_value_handler))
}
