//! API server configuration

use anyhow::Context;

/// Configuration loaded once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// HS256 secret shared with the identity service issuing the tokens
    pub jwt_secret: String,
    pub frontend_url: String,
    /// Allowed CORS origins, comma separated; empty = frontend_url only
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 bytes");
        }

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("PORT must be a valid port number")?;

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "https://trustlist.app".to_string());

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| vec![frontend_url.clone()]);

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            frontend_url,
            cors_origins,
        })
    }
}
