use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// Latitude/longitude as the decimal strings the providers return.
///
/// Either half may be missing (`None`) or blank (`Some("")`) until a
/// resolution succeeds for both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl Coordinate {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: Some(latitude.into()),
            longitude: Some(longitude.into()),
        }
    }

    /// Both halves present and non-blank.
    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.latitude) && filled(&self.longitude)
    }

    pub fn latitude_str(&self) -> &str {
        self.latitude.as_deref().unwrap_or("")
    }

    pub fn longitude_str(&self) -> &str {
        self.longitude.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude_str(), self.longitude_str())
    }
}

// ---------------------------------------------------------------------------
// AddressRecord
// ---------------------------------------------------------------------------

/// One row of the address backlog. `address` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    pub motivation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
}

impl AddressRecord {
    pub fn new(address: impl Into<String>, motivation: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            motivation: motivation.into(),
            coordinate: None,
        }
    }
}

// ---------------------------------------------------------------------------
// GeocodeOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GeocodeOutcome {
    Resolved(Coordinate),
    NotFound,
    ProviderError { reason: String },
}

impl GeocodeOutcome {
    pub fn provider_error(reason: impl Into<String>) -> Self {
        GeocodeOutcome::ProviderError {
            reason: reason.into(),
        }
    }

    /// The coordinate, if this outcome resolved both halves.
    pub fn complete_coordinate(&self) -> Option<&Coordinate> {
        match self {
            GeocodeOutcome::Resolved(c) if c.is_complete() => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for GeocodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeOutcome::Resolved(c) => write!(f, "resolved {c}"),
            GeocodeOutcome::NotFound => f.write_str("not found"),
            GeocodeOutcome::ProviderError { reason } => write!(f, "provider error: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
