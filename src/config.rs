use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Smallest batch that still fits one settlement of an uncontested rider.
pub const MIN_LEDGER_BATCH_LIMIT: usize = 4;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub game_config_url: String,
    /// Maximum ledger writes per atomic finalization/reset chunk.
    pub ledger_batch_limit: usize,
    /// CAS attempts for one bid before giving up with `Contention`.
    pub bid_retry_limit: u32,
    pub scheduler_interval_ms: u64,
    pub scheduled_games: Vec<String>,
    pub admin_users: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let game_config_url = env_map
            .get("GAME_CONFIG_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("GAME_CONFIG_URL".to_string()))?;

        let ledger_batch_limit = parse_or(
            &env_map,
            "LEDGER_BATCH_LIMIT",
            500usize,
            "must be a positive integer",
        )?;
        if ledger_batch_limit < MIN_LEDGER_BATCH_LIMIT {
            return Err(ConfigError::InvalidValue(
                "LEDGER_BATCH_LIMIT".to_string(),
                format!("must be at least {}", MIN_LEDGER_BATCH_LIMIT),
            ));
        }

        let bid_retry_limit = parse_or(&env_map, "BID_RETRY_LIMIT", 16u32, "must be a valid u32")?;
        if bid_retry_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "BID_RETRY_LIMIT".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let scheduler_interval_ms = parse_or(
            &env_map,
            "SCHEDULER_INTERVAL_MS",
            60_000u64,
            "must be a valid u64",
        )?;
        if scheduler_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_INTERVAL_MS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let scheduled_games = parse_list_from_map(&env_map, "SCHEDULED_GAMES")?;
        let admin_users = parse_list_from_map(&env_map, "ADMIN_USERS")?;

        Ok(Config {
            port,
            database_path,
            game_config_url,
            ledger_batch_limit,
            bid_retry_limit,
            scheduler_interval_ms,
            scheduled_games,
            admin_users,
        })
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_users.iter().any(|admin| admin == user_id)
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    message: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), message.to_string())),
        None => Ok(default),
    }
}

/// Read a list from `KEY` (comma separated) or `KEY_FILE` (one per line).
fn parse_list_from_map(env_map: &HashMap<String, String>, key: &str) -> Result<Vec<String>, ConfigError> {
    if let Some(list) = env_map.get(key) {
        Ok(list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else if let Some(file_path) = env_map.get(&format!("{}_FILE", key)) {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                format!("{}_FILE", key),
                "file not found or unreadable".to_string(),
            )
        })?;
        Ok(content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else {
        Ok(Vec::new())
    }
}
