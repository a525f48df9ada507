use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: Option<String>, max_connections: u32) -> anyhow::Result<Self> {
        let url = url.context("DATABASE_URL must be set to a production Postgres instance")?;
        Ok(Self {
            url,
            max_connections: max_connections.max(1),
        })
    }

    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await
            .context("failed to connect to Postgres")?;
        tracing::info!(max_connections = self.max_connections, "connected to Postgres");
        Ok(pool)
    }
}

/// Installs the global subscriber; `RUST_LOG` wins over the `info` default.
pub fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_is_required() {
        let err = DatabaseConfig::new(None, 5).expect_err("missing url");
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn pool_size_has_a_floor() {
        let config =
            DatabaseConfig::new(Some("postgres://localhost/churn".to_string()), 0).expect("config");
        assert_eq!(config.max_connections, 1);
    }
}
