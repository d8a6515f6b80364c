//! Content-addressed configuration versions
//!
//! Every export topic has an append-only ledger of `(signature, version)`
//! rows. A version is reused as long as the exported content keeps the same
//! signature; otherwise a new timestamp version is minted.

use crate::errors::{Result, SwitchyardError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version carried by a payload before it is stamped
pub const ZERO_VERSION: &str = "0";

/// `YYYYMMDDHHMMSSmmm`
const VERSION_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub topic: String,
    pub signature: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

/// A payload that carries its own version field
pub trait Versioned {
    fn version(&self) -> &str;
    fn set_version(&mut self, version: String);
}

/// SHA-256 hex digest of the canonical JSON form of `payload`.
///
/// The payload is first converted into a `serde_json::Value`, whose object
/// keys are kept sorted, so map iteration order never affects the digest.
pub fn sign<T: Serialize>(payload: &T) -> Result<String> {
    let canonical = serde_json::to_value(payload)
        .and_then(|value| serde_json::to_string(&value))
        .map_err(|e| {
            SwitchyardError::Serialization {
                source: e,
                context: "Failed to canonicalize payload".to_string(),
            }
        })?;

    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Mint a version for `now` that is strictly greater than `last`.
///
/// Versions are numeric timestamps; when the clock has not advanced past the
/// last version (same millisecond or clock skew) the last version plus one is
/// used instead.
pub fn mint_version(now: DateTime<Utc>, last: Option<&str>) -> Result<String> {
    let candidate: u64 = now
        .format(VERSION_FORMAT)
        .to_string()
        .parse()
        .map_err(|e| {
            SwitchyardError::internal(format!("Failed to format version timestamp: {}", e))
        })?;

    let last = match last {
        Some(raw) => Some(
            raw.parse::<u64>()
                .map_err(|_| {
                    SwitchyardError::dirty(format!(
                        "Stored config version '{}' is not numeric",
                        raw
                    ))
                })?,
        ),
        None => None,
    };

    let version = match last {
        Some(last) if candidate <= last => last + 1,
        _ => candidate,
    };

    Ok(version.to_string())
}
