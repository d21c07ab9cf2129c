use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres connection string. Without one the service keeps records in memory.
    pub database_url: Option<String>,
    pub port: u16,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("DB_URL"))
            .ok();

        let config = Self::from_parts(
            database_url,
            std::env::var("PORT").ok(),
            std::env::var("DB_MAX_CONNECTIONS").ok(),
        )?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        match config.database_url {
            Some(ref url) => {
                let prefix: String = url.chars().take(20).collect();
                tracing::debug!("Database URL: {}...", prefix);
            }
            None => tracing::info!("No DATABASE_URL set, using in-memory record store"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Validates raw setting values. Split from `from_env` so it can be tested
    /// without touching the process environment.
    pub fn from_parts(
        database_url: Option<String>,
        port: Option<String>,
        db_max_connections: Option<String>,
    ) -> anyhow::Result<Self> {
        let database_url = match database_url.filter(|url| !url.trim().is_empty()) {
            Some(url) => {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                }
                Some(url)
            }
            None => None,
        };

        let port = port
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?;

        let db_max_connections = db_max_connections
            .unwrap_or_else(|| "10".to_string())
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a positive number"))
            .and_then(|n| {
                if n == 0 {
                    anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
                }
                Ok(n)
            })?;

        Ok(Self {
            database_url,
            port,
            db_max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_parts(None, None, None).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 10);
    }

    #[test]
    fn test_blank_database_url_means_memory() {
        let config = Config::from_parts(Some("  ".to_string()), None, None).unwrap();
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn test_rejects_non_postgres_url() {
        assert!(Config::from_parts(Some("mysql://localhost/db".to_string()), None, None).is_err());
        assert!(
            Config::from_parts(Some("postgres://localhost/records".to_string()), None, None)
                .is_ok()
        );
    }

    #[test]
    fn test_rejects_bad_numbers() {
        assert!(Config::from_parts(None, Some("http".to_string()), None).is_err());
        assert!(Config::from_parts(None, Some("70000".to_string()), None).is_err());
        assert!(Config::from_parts(None, None, Some("0".to_string())).is_err());
    }
}
