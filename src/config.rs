use serde::Deserialize;

use crate::users::password::{PasswordHasher, PasswordScheme, DEFAULT_BCRYPT_COST};

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub scheme: PasswordScheme,
    pub bcrypt_cost: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            scheme: PasswordScheme::Bcrypt,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl PasswordConfig {
    pub fn hasher(&self) -> anyhow::Result<PasswordHasher> {
        PasswordHasher::new(self.scheme, self.bcrypt_cost)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub password: PasswordConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url =
            var("DATABASE_URL").ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        let max_connections = var("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let scheme = match var("PASSWORD_SCHEME") {
            Some(v) => v.parse()?,
            None => PasswordScheme::Bcrypt,
        };
        let bcrypt_cost = match var("BCRYPT_COST") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|e| anyhow::anyhow!("invalid BCRYPT_COST `{v}`: {e}"))?,
            None => DEFAULT_BCRYPT_COST,
        };
        let password = PasswordConfig {
            scheme,
            bcrypt_cost,
        };
        // Fails on an out-of-range cost.
        password.hasher()?;
        Ok(Self {
            database_url,
            max_connections,
            password,
        })
    }
}
