use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Classification of a single lookup against the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckState {
    Available,
    Reserved,
    Taken,
    /// Name is registered and currently in an auction phase, e.g. `BIDDING` or `ENDING`.
    Auction(String),
    ApiError,
    NetworkError,
}

impl CheckState {
    /// Builds the state for an unopenable name from the upstream auction status.
    ///
    /// Empty or missing statuses collapse to [`CheckState::Taken`].
    pub fn from_auction_status(status: Option<&str>) -> Self {
        match status.filter(|value| !value.is_empty()) {
            Some(value) => Self::Auction(value.to_uppercase()),
            None => Self::Taken,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Taken => "TAKEN",
            Self::Auction(status) => status,
            Self::ApiError => "API_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }

    /// Bounded label for metrics; auction statuses share one bucket.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Taken => "taken",
            Self::Auction(_) => "auction",
            Self::ApiError => "api_error",
            Self::NetworkError => "network_error",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckState {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "AVAILABLE" => Self::Available,
            "RESERVED" => Self::Reserved,
            "TAKEN" => Self::Taken,
            "API_ERROR" => Self::ApiError,
            "NETWORK_ERROR" => Self::NetworkError,
            other => Self::Auction(other.to_string()),
        })
    }
}

impl Serialize for CheckState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CheckState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(CheckState::from_str(&value).unwrap_or_else(|never| match never {}))
    }
}

/// One line of the availability stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Token as the caller typed it (after lowercasing), before ASCII conversion.
    pub name: String,
    pub available: bool,
    pub state: CheckState,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, state: CheckState) -> Self {
        Self {
            name: name.into(),
            available: state.is_available(),
            state,
        }
    }
}
