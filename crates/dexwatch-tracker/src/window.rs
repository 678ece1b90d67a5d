//! Aggregation windows.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed rolling horizons aggregates are kept over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    TwentyFourHours,
}

impl Window {
    pub const ALL: [Window; 3] = [Self::TenMinutes, Self::OneHour, Self::TwentyFourHours];

    /// Horizon of this window.
    pub fn horizon(&self) -> Duration {
        match self {
            Self::TenMinutes => Duration::minutes(10),
            Self::OneHour => Duration::hours(1),
            Self::TwentyFourHours => Duration::hours(24),
        }
    }

    /// Cadence of the periodic eviction sweep: larger windows are swept
    /// less often.
    pub fn sweep_interval(&self) -> std::time::Duration {
        match self {
            Self::TenMinutes => std::time::Duration::from_secs(2 * 60),
            Self::OneHour => std::time::Duration::from_secs(10 * 60),
            Self::TwentyFourHours => std::time::Duration::from_secs(60 * 60),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenMinutes => "10m",
            Self::OneHour => "1h",
            Self::TwentyFourHours => "24h",
        }
    }

    /// Parse the query-string form ("10m", "1h", "24h").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "10m" => Some(Self::TenMinutes),
            "1h" => Some(Self::OneHour),
            "24h" => Some(Self::TwentyFourHours),
            _ => None,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for window in Window::ALL {
            assert_eq!(Window::parse(window.as_str()), Some(window));
        }
        assert_eq!(Window::parse("7d"), None);
    }

    #[test]
    fn test_horizons_ordered() {
        assert!(Window::TenMinutes.horizon() < Window::OneHour.horizon());
        assert!(Window::OneHour.horizon() < Window::TwentyFourHours.horizon());
    }
}
