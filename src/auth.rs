//! Caller identity
//!
//! Authentication happens upstream of the ledger. The gateway in front of
//! the server verifies the account and forwards it in the `x-actor-id`
//! header; this module only checks that the value is a well-formed address.

use axum::http::HeaderMap;
use tracing::debug;

use crate::error::LedgerError;
use crate::types::ActorId;

/// Header carrying the verified caller address
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Check if a string is a valid `0x`-prefixed 20-byte account address
pub fn is_valid_actor_id(raw: &str) -> bool {
    ActorId::parse(raw).is_ok()
}

/// Extract the calling actor from request headers
pub fn caller_from_headers(headers: &HeaderMap) -> Result<ActorId, LedgerError> {
    let value = match headers.get(ACTOR_HEADER) {
        Some(v) => v,
        None => {
            debug!("Request without {} header", ACTOR_HEADER);
            return Err(LedgerError::InvalidActorId(String::new()));
        }
    };

    let raw = value.to_str().map_err(|e| {
        debug!("Non-ASCII {} header: {}", ACTOR_HEADER, e);
        LedgerError::InvalidActorId(String::from_utf8_lossy(value.as_bytes()).into_owned())
    })?;

    ActorId::parse(raw)
}
