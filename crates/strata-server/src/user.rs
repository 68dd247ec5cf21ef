//! The signed-in user, stored in the session as a structured record.

use serde::Serialize;
use strata_session::{Record, RecordRegistry, SessionError};

/// Session key holding the [`UserRecord`].
pub const USER_KEY: &str = "user";

/// A signed-in user.
///
/// Binary form: `user_id` (u64 little-endian), `admin` (one byte), then the
/// UTF-8 name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub user_id: u64,
    pub name: String,
    pub admin: bool,
}

const HEADER_LEN: usize = 9;

impl Record for UserRecord {
    const KIND: &'static str = "user";

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.name.len());
        out.extend_from_slice(&self.user_id.to_le_bytes());
        out.push(u8::from(self.admin));
        out.extend_from_slice(self.name.as_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> strata_session::Result<Self> {
        let (header, name) = bytes
            .split_at_checked(HEADER_LEN)
            .ok_or_else(|| SessionError::CorruptPayload("user record too short".into()))?;
        let (id, admin) = header.split_at(8);
        let user_id = u64::from_le_bytes(
            id.try_into()
                .map_err(|_| SessionError::CorruptPayload("user id".into()))?,
        );
        let admin = match admin[0] {
            0 => false,
            1 => true,
            other => {
                return Err(SessionError::CorruptPayload(format!(
                    "user admin flag {}",
                    other
                )));
            }
        };
        let name = String::from_utf8(name.to_vec())
            .map_err(|e| SessionError::CorruptPayload(format!("user name: {}", e)))?;

        Ok(Self {
            user_id,
            name,
            admin,
        })
    }
}

/// Every record type the demo server stores in sessions.
pub fn record_registry() -> RecordRegistry {
    RecordRegistry::new().with::<UserRecord>()
}
