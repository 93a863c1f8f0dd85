//! Domain primitives: TimeMs and the string identifiers used across the ledger.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Time in milliseconds since Unix epoch.
///
/// This is the only instant representation inside the core. Collaborators
/// convert RFC 3339 strings, seconds, or driver timestamps at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Parse an RFC 3339 timestamp.
    pub fn parse_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        Ok(TimeMs(
            DateTime::parse_from_rfc3339(s)?
                .with_timezone(&Utc)
                .timestamp_millis(),
        ))
    }

    /// Render as an RFC 3339 string (UTC, millisecond precision).
    pub fn to_rfc3339(&self) -> String {
        match Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            None => self.0.to_string(),
        }
    }
}

impl std::fmt::Display for TimeMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Contest (game) identifier.
    GameId
);
string_id!(
    /// Authenticated user identifier, supplied by the identity collaborator.
    UserId
);
string_id!(
    /// Rider identifier within a game's rider pool.
    RiderId
);
string_id!(
    /// Bid identifier (UUID v4 for bids created by intake).
    BidId
);

impl BidId {
    /// Generate a fresh random bid id.
    pub fn generate() -> Self {
        BidId(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timems_ordering() {
        let t1 = TimeMs::new(1000);
        let t2 = TimeMs::new(2000);
        assert!(t1 < t2);
    }

    #[test]
    fn test_rfc3339_roundtrip_at_edge() {
        let t = TimeMs::parse_rfc3339("2024-07-01T12:00:00Z").unwrap();
        assert_eq!(t.as_ms(), 1_719_835_200_000);
        assert_eq!(t.to_rfc3339(), "2024-07-01T12:00:00.000Z");
    }

    #[test]
    fn test_rfc3339_with_offset_normalized_to_utc() {
        let t = TimeMs::parse_rfc3339("2024-07-01T14:00:00+02:00").unwrap();
        assert_eq!(t.as_ms(), 1_719_835_200_000);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let rider = RiderId::new("pogacar-tadej");
        assert_eq!(serde_json::to_string(&rider).unwrap(), "\"pogacar-tadej\"");
        assert_eq!(rider.to_string(), "pogacar-tadej");
    }

    #[test]
    fn test_generated_bid_ids_are_unique() {
        assert_ne!(BidId::generate(), BidId::generate());
    }
}
