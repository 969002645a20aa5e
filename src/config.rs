use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `None` runs the service on the in-memory stores.
    pub database: Option<DatabaseConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("APP_PORT").or_else(|| lookup("PORT")) {
            Some(v) => v.parse::<u16>().with_context(|| format!("invalid port '{}'", v))?,
            None => 5000,
        };

        let database = match lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => {
                let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
                    Some(v) => v
                        .parse::<u32>()
                        .with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS '{}'", v))?,
                    None => 10,
                };
                Some(DatabaseConfig {
                    url,
                    max_connections,
                })
            }
            None => None,
        };

        Ok(Self {
            host,
            port,
            database,
        })
    }
}
