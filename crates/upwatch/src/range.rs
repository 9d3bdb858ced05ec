//! Query window vocabulary.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::RangeError;

/// One of the accepted query windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeRange {
    Hour1,
    Hours3,
    Hours6,
    Hours12,
    #[default]
    Hours24,
    Days2,
    Days7,
    Days14,
    Days30,
    Days90,
}

impl TimeRange {
    pub const ALL: [TimeRange; 10] = [
        TimeRange::Hour1,
        TimeRange::Hours3,
        TimeRange::Hours6,
        TimeRange::Hours12,
        TimeRange::Hours24,
        TimeRange::Days2,
        TimeRange::Days7,
        TimeRange::Days14,
        TimeRange::Days30,
        TimeRange::Days90,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Hour1 => "1h",
            TimeRange::Hours3 => "3h",
            TimeRange::Hours6 => "6h",
            TimeRange::Hours12 => "12h",
            TimeRange::Hours24 => "24h",
            TimeRange::Days2 => "2d",
            TimeRange::Days7 => "7d",
            TimeRange::Days14 => "14d",
            TimeRange::Days30 => "30d",
            TimeRange::Days90 => "90d",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            TimeRange::Hour1 => Duration::hours(1),
            TimeRange::Hours3 => Duration::hours(3),
            TimeRange::Hours6 => Duration::hours(6),
            TimeRange::Hours12 => Duration::hours(12),
            TimeRange::Hours24 => Duration::hours(24),
            TimeRange::Days2 => Duration::days(2),
            TimeRange::Days7 => Duration::days(7),
            TimeRange::Days14 => Duration::days(14),
            TimeRange::Days30 => Duration::days(30),
            TimeRange::Days90 => Duration::days(90),
        }
    }

    /// Number of raw samples averaged into one presentation point
    pub fn bucket_size(self) -> usize {
        match self {
            TimeRange::Hour1 => 1,
            TimeRange::Hours3 => 3,
            TimeRange::Hours6 => 5,
            TimeRange::Hours12 => 10,
            TimeRange::Hours24 => 15,
            TimeRange::Days2 => 30,
            TimeRange::Days7 => 20,
            TimeRange::Days14 => 40,
            TimeRange::Days30 => 50,
            TimeRange::Days90 => 100,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = RangeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TimeRange::ALL
            .into_iter()
            .find(|range| range.as_str() == value)
            .ok_or_else(|| RangeError::Unknown(value.to_string()))
    }
}

impl TryFrom<String> for TimeRange {
    type Error = RangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeRange> for String {
    fn from(range: TimeRange) -> Self {
        range.as_str().to_string()
    }
}
