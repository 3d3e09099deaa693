//! Fixed-window request limiter for the public endpoints.
//!
//! Each (bucket, identifier) pair owns one counter row. Identifiers are
//! normalized and hashed before they reach the store, so raw emails and
//! addresses never appear in limiter keys.

use std::sync::Arc;

use chrono::Duration;
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::{Store, in_transaction};
use crate::types::RateLimitBucket;

const IDENT_HASH_LEN: usize = 16;

pub struct RateLimiter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Counts one hit against `bucket` for `identifier` and reports whether it is allowed.
    /// A denied hit leaves the counter untouched.
    pub fn check_and_consume(
        &self,
        bucket: &str,
        identifier: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<bool> {
        let ident_hash = hash_identifier(identifier);
        let now = self.clock.now();
        let window_end = now + Duration::seconds(window_seconds as i64);

        let allowed = in_transaction(self.store.as_ref(), |tx| {
            let existing = tx.get_rate_limit(bucket, &ident_hash)?;

            match existing {
                Some(rec) if rec.window_end > now => {
                    if rec.count >= i64::from(limit) {
                        return Ok(false);
                    }
                    tx.increment_rate_limit(bucket, &ident_hash)?;
                    Ok(true)
                }
                // Missing or expired window: start over at one.
                _ => {
                    tx.put_rate_limit(&RateLimitBucket {
                        bucket: bucket.to_string(),
                        ident_hash: ident_hash.clone(),
                        count: 1,
                        window_end,
                    })?;
                    Ok(true)
                }
            }
        })?;

        if !allowed {
            tracing::info!(bucket, ident = %ident_hash, limit, "rate limit exceeded");
        }
        Ok(allowed)
    }

    /// Like [`Self::check_and_consume`], but a denied hit is [`Error::RateLimited`].
    pub fn enforce(
        &self,
        bucket: &str,
        identifier: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<()> {
        if self.check_and_consume(bucket, identifier, limit, window_seconds)? {
            Ok(())
        } else {
            Err(Error::RateLimited)
        }
    }
}

/// Trims, lower-cases and hashes an identifier for storage.
#[must_use]
pub fn hash_identifier(identifier: &str) -> String {
    let normalized = identifier.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..IDENT_HASH_LEN].to_string()
}
