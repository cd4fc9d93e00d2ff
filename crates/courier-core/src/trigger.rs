use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When a task fires. Stored as tagged JSON in both the task row and the
/// scheduler's trigger registry; matched exhaustively everywhere it is
/// consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire repeatedly with a fixed period.
    Interval { every_secs: u64 },

    /// Fire exactly once at the given UTC instant, then self-remove.
    OneTime { at: DateTime<Utc> },
}

impl Trigger {
    pub fn is_one_time(&self) -> bool {
        matches!(self, Trigger::OneTime { .. })
    }
}

/// Unit of the primary component of an interval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

/// Normalize a two-part interval request into whole seconds.
///
/// Owners express repeat intervals as a primary value with a unit plus an
/// optional minutes remainder, e.g. "every 2 hours 30 minutes" → 9000 s.
pub fn interval_seconds(primary: u64, unit: IntervalUnit, extra_minutes: u64) -> u64 {
    let base = match unit {
        IntervalUnit::Minutes => primary * 60,
        IntervalUnit::Hours => primary * 3_600,
        IntervalUnit::Days => primary * 86_400,
    };
    base + extra_minutes * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hours_thirty_minutes_is_9000_seconds() {
        assert_eq!(interval_seconds(2, IntervalUnit::Hours, 30), 9_000);
    }

    #[test]
    fn plain_units() {
        assert_eq!(interval_seconds(5, IntervalUnit::Minutes, 0), 300);
        assert_eq!(interval_seconds(1, IntervalUnit::Days, 0), 86_400);
    }

    #[test]
    fn trigger_json_round_trips_tagged() {
        let t = Trigger::Interval { every_secs: 60 };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"kind\":\"interval\""));
        assert_eq!(serde_json::from_str::<Trigger>(&json).unwrap(), t);
    }
}
