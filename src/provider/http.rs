//! HTTP client for the game configuration service.

use super::{GameConfig, GameConfigProvider, GameLimits, ProviderError};
use crate::domain::{AuctionPeriod, GameId, PeriodStatus, RiderId, TimeMs};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Game configuration provider backed by `GET {base}/games/{id}/config`.
#[derive(Debug, Clone)]
pub struct HttpGameConfigProvider {
    client: Client,
    base_url: String,
}

impl HttpGameConfigProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self.client.get(url).send().await.map_err(|e| {
                backoff::Error::transient(ProviderError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ProviderError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ProviderError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ProviderError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ProviderError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl GameConfigProvider for HttpGameConfigProvider {
    async fn game_config(&self, game_id: &GameId) -> Result<GameConfig, ProviderError> {
        let url = format!("{}/games/{}/config", self.base_url, game_id);
        debug!(game_id = %game_id, "Fetching game config from {}", url);

        let body = match self.get_json(&url).await {
            Err(ProviderError::HttpError { status: 404, .. }) => {
                return Err(ProviderError::UnknownGame(game_id.to_string()))
            }
            other => other?,
        };
        parse_game_config(game_id, &body)
    }
}

/// Parse the provider's JSON document into a `GameConfig`.
///
/// Expected shape:
/// `{"periods":[{"name","startDate","endDate","finalizeDate"}],"riders":[..],"maxRiders":32,"currencyScale":0}`
pub fn parse_game_config(game_id: &GameId, body: &Value) -> Result<GameConfig, ProviderError> {
    let periods_json = body
        .get("periods")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::ParseError("missing periods array".to_string()))?;

    let mut periods = Vec::with_capacity(periods_json.len());
    for period in periods_json {
        periods.push(parse_period(game_id, period)?);
    }

    let eligible_riders = body
        .get("riders")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::ParseError("missing riders array".to_string()))?
        .iter()
        .filter_map(|r| match r {
            Value::String(s) => Some(RiderId::new(s.clone())),
            Value::Number(n) => Some(RiderId::new(n.to_string())),
            other => {
                warn!(game_id = %game_id, rider = %other, "Skipping malformed rider id");
                None
            }
        })
        .collect();

    let defaults = GameLimits::default();
    let limits = GameLimits {
        max_riders: body
            .get("maxRiders")
            .and_then(Value::as_i64)
            .unwrap_or(defaults.max_riders),
        currency_scale: body
            .get("currencyScale")
            .and_then(Value::as_u64)
            .map(|s| s as u32)
            .unwrap_or(defaults.currency_scale),
    };

    Ok(GameConfig {
        game_id: game_id.clone(),
        periods,
        eligible_riders,
        limits,
    })
}

fn parse_period(game_id: &GameId, period: &Value) -> Result<AuctionPeriod, ProviderError> {
    let name = period
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::ParseError("period missing name".to_string()))?;

    let start = parse_instant(period.get("startDate"), name, "startDate")?;
    let end = parse_instant(period.get("endDate"), name, "endDate")?;
    let finalize_at = match period.get("finalizeDate") {
        Some(Value::Null) | None => end,
        v => parse_instant(v, name, "finalizeDate")?,
    };

    // window ordering is checked by period sync, which rejects per period
    Ok(AuctionPeriod {
        game_id: game_id.clone(),
        name: name.to_string(),
        start,
        end,
        finalize_at,
        status: PeriodStatus::Pending,
    })
}

/// Convert an edge timestamp into `TimeMs`.
///
/// Accepts epoch milliseconds (integer) or an RFC 3339 string.
fn parse_instant(value: Option<&Value>, period: &str, field: &str) -> Result<TimeMs, ProviderError> {
    match value {
        Some(Value::Number(n)) => n.as_i64().map(TimeMs::new).ok_or_else(|| {
            ProviderError::ParseError(format!("period {}: {} is not an integer", period, field))
        }),
        Some(Value::String(s)) => TimeMs::parse_rfc3339(s).map_err(|e| {
            ProviderError::ParseError(format!("period {}: {}: {}", period, field, e))
        }),
        _ => Err(ProviderError::ParseError(format!(
            "period {}: missing {}",
            period, field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_game_config_mixed_timestamps() {
        let body = json!({
            "periods": [
                {"name": "auction-1", "startDate": 1000, "endDate": 2000, "finalizeDate": 2500},
                {"name": "auction-2", "startDate": "2024-07-01T00:00:00Z", "endDate": "2024-07-02T00:00:00Z"}
            ],
            "riders": ["r1", "r2", 42],
            "maxRiders": 20,
            "currencyScale": 2
        });
        let game = GameId::new("tdf");
        let config = parse_game_config(&game, &body).unwrap();

        assert_eq!(config.periods.len(), 2);
        assert_eq!(config.periods[0].start, TimeMs::new(1000));
        assert_eq!(config.periods[0].finalize_at, TimeMs::new(2500));
        assert_eq!(config.periods[0].status, PeriodStatus::Pending);
        assert_eq!(config.periods[1].start.as_ms(), 1_719_792_000_000);
        assert_eq!(config.periods[1].finalize_at, config.periods[1].end);
        assert!(config.is_eligible(&RiderId::new("42")));
        assert_eq!(config.limits.max_riders, 20);
        assert_eq!(config.limits.currency_scale, 2);
    }

    #[test]
    fn test_parse_game_config_keeps_inverted_window_for_sync() {
        let body = json!({
            "periods": [{"name": "bad", "startDate": 3000, "endDate": 2000}],
            "riders": []
        });
        let config = parse_game_config(&GameId::new("tdf"), &body).unwrap();
        assert_eq!(config.periods[0].end, TimeMs::new(2000));

        let body = json!({
            "periods": [{"name": "bad", "startDate": "yesterday", "endDate": 2000}],
            "riders": []
        });
        let err = parse_game_config(&GameId::new("tdf"), &body).unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_parse_game_config_defaults_limits() {
        let body = json!({"periods": [], "riders": []});
        let config = parse_game_config(&GameId::new("tdf"), &body).unwrap();
        assert_eq!(config.limits, GameLimits::default());
    }

    #[test]
    fn test_parse_game_config_missing_riders() {
        let body = json!({"periods": []});
        assert!(parse_game_config(&GameId::new("tdf"), &body).is_err());
    }
}
