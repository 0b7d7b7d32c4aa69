use std::fmt;
use std::str::FromStr;

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Argon2,
};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use tracing::error;

/// bcrypt cost factor: 2^10 rounds.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

pub const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    Bcrypt,
    Argon2,
}

impl fmt::Display for PasswordScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordScheme::Bcrypt => f.write_str("bcrypt"),
            PasswordScheme::Argon2 => f.write_str("argon2"),
        }
    }
}

impl FromStr for PasswordScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bcrypt" => Ok(PasswordScheme::Bcrypt),
            "argon2" => Ok(PasswordScheme::Argon2),
            other => anyhow::bail!("unknown password scheme `{other}`"),
        }
    }
}

/// Salted one-way hashing of passwords.
///
/// New hashes use the configured scheme. Verification picks the scheme from
/// the stored hash itself, so records hashed under a previous setting keep
/// working after the scheme changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    scheme: PasswordScheme,
    bcrypt_cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::bcrypt(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher {
    pub fn new(scheme: PasswordScheme, bcrypt_cost: u32) -> anyhow::Result<Self> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            anyhow::bail!(
                "bcrypt cost {bcrypt_cost} outside {MIN_BCRYPT_COST}..={MAX_BCRYPT_COST}"
            );
        }
        Ok(Self {
            scheme,
            bcrypt_cost,
        })
    }

    /// Unchecked: an out-of-range cost surfaces as an error from [`hash`](Self::hash).
    pub fn bcrypt(cost: u32) -> Self {
        Self {
            scheme: PasswordScheme::Bcrypt,
            bcrypt_cost: cost,
        }
    }

    pub fn argon2() -> Self {
        Self {
            scheme: PasswordScheme::Argon2,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    pub fn scheme(&self) -> PasswordScheme {
        self.scheme
    }

    pub fn generate_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = Self::generate_salt();
        match self.scheme {
            PasswordScheme::Bcrypt => hash_bcrypt(plain, self.bcrypt_cost, salt),
            PasswordScheme::Argon2 => hash_argon2(plain, &salt),
        }
    }

    /// `Ok(false)` on mismatch; `Err` only when `hash` cannot be parsed.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        if hash.starts_with("$argon2") {
            verify_argon2(plain, hash)
        } else {
            verify_bcrypt(plain, hash)
        }
    }
}

fn hash_bcrypt(plain: &str, cost: u32, salt: [u8; SALT_LEN]) -> anyhow::Result<String> {
    let parts = bcrypt::hash_with_salt(plain, cost, salt).map_err(|e| {
        error!(error = %e, cost, "bcrypt hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(parts.format_for_version(bcrypt::Version::TwoB))
}

fn verify_bcrypt(plain: &str, hash: &str) -> anyhow::Result<bool> {
    bcrypt::verify(plain, hash).map_err(|e| {
        error!(error = %e, "bcrypt verify error");
        anyhow::anyhow!(e.to_string())
    })
}

fn hash_argon2(plain: &str, salt: &[u8]) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(salt).map_err(|e| {
        error!(error = %e, "argon2 salt encoding error");
        anyhow::anyhow!(e.to_string())
    })?;
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

fn verify_argon2(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    // A PHC string without salt or output parses, but can never match.
    if parsed.salt.is_none() || parsed.hash.is_none() {
        error!("argon2 hash is missing its salt or output");
        anyhow::bail!("malformed argon2 hash: missing salt or output");
    }
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "argon2 verify error");
            Err(anyhow::anyhow!(e.to_string()))
        }
    }
}
