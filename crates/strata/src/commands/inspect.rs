//! Inspect command - prints a stored session as JSON.

use anyhow::{Context as _, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::Args;
use serde_json::json;
use strata_server::record_registry;
use strata_session::{DurableStore, Payload, PayloadCodec, SessionId, Value};
use strata_sqlite::SqliteStore;

use super::Context;

/// Arguments for the inspect command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Session identifier (the cookie value)
    pub sid: String,
}

/// Run the inspect command.
pub fn run(args: InspectArgs, ctx: &Context) -> Result<()> {
    let id = SessionId::parse(&args.sid)
        .ok_or_else(|| anyhow!("'{}' is not a session identifier", args.sid))?;
    let store = SqliteStore::open(&ctx.db_path)
        .with_context(|| format!("opening {}", ctx.db_path.display()))?;

    let bytes = store
        .get(id.as_str())?
        .ok_or_else(|| anyhow!("session {} not found", id))?;
    let payload = PayloadCodec::new(record_registry())
        .decode(&bytes)
        .with_context(|| format!("session {} is unreadable", id))?;
    let updated_at = store.updated_at(id.as_str())?;

    let rendered = render(&id, &payload, updated_at, Utc::now());
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

/// Records are shown by kind and encoded size.
fn render(
    id: &SessionId,
    payload: &Payload,
    updated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> serde_json::Value {
    let values: serde_json::Map<String, serde_json::Value> = payload
        .iter()
        .map(|(key, value)| {
            let shown = match value {
                Value::Plain(plain) => plain.clone(),
                Value::Record(record) => json!({
                    "record": record.kind(),
                    "bytes": record.to_bytes().len(),
                }),
            };
            (key.clone(), shown)
        })
        .collect();

    let expiration = payload.expiration();
    json!({
        "sid": id.as_str(),
        "updated_at": updated_at.map(|t| t.to_rfc3339()),
        "expired": expiration.is_none_or(|e| e <= now),
        "values": values,
    })
}
