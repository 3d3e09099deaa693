//! Admin bearer tokens of the form `rafflebox_<lookup>_<secret>`.
//!
//! The lookup segment indexes the stored row. The whole raw token is checked
//! against an Argon2id hash, so a leaked database does not leak credentials.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Token;

pub const TOKEN_PREFIX: &str = "rafflebox";

const LOOKUP_BYTES: usize = 4;
const SECRET_BYTES: usize = 12;

// Admin calls are rare, so a light profile is enough.
const HASH_MEMORY_KIB: u32 = 64 * 1024;
const HASH_PASSES: u32 = 1;
const HASH_LANES: u32 = 4;

/// A freshly minted token. `raw` is shown to the operator once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenParts<'a> {
    pub lookup: &'a str,
    pub secret: &'a str,
}

pub struct TokenHasher {
    argon2: Argon2<'static>,
}

impl Default for TokenHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenHasher {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(HASH_MEMORY_KIB, HASH_PASSES, HASH_LANES, Some(32))
            .unwrap_or_default();
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    pub fn issue(&self) -> Result<IssuedToken> {
        let lookup = random_hex(LOOKUP_BYTES);
        let raw = format!("{TOKEN_PREFIX}_{lookup}_{}", random_hex(SECRET_BYTES));
        let hash = self.hash(&raw)?;
        Ok(IssuedToken { raw, lookup, hash })
    }

    /// PHC-formatted Argon2id hash with a fresh salt.
    pub fn hash(&self, raw: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(raw.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))
    }

    pub fn verify(&self, raw: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("stored token hash is malformed: {e}")))?;
        match self.argon2.verify_password(raw.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify token: {e}"))),
        }
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill(bytes.as_mut_slice());
    hex::encode(bytes)
}

/// Splits a raw token into its segments without touching the store.
pub fn parse_token(raw: &str) -> Result<TokenParts<'_>> {
    let rest = raw
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;
    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    let is_hex = |part: &str, bytes: usize| {
        part.len() == bytes * 2 && part.bytes().all(|b| b.is_ascii_hexdigit())
    };
    if !is_hex(lookup, LOOKUP_BYTES) || !is_hex(secret, SECRET_BYTES) {
        return Err(Error::InvalidTokenFormat);
    }

    Ok(TokenParts { lookup, secret })
}

/// Mints an admin token and stores its hash, returning the raw value.
pub fn issue_admin_token(store: &dyn Store, hasher: &TokenHasher) -> Result<String> {
    let issued = hasher.issue()?;
    store.create_token(&Token {
        id: Uuid::new_v4().to_string(),
        token_hash: issued.hash,
        token_lookup: issued.lookup,
        created_at: Utc::now(),
        expires_at: None,
        last_used_at: None,
    })?;
    Ok(issued.raw)
}
