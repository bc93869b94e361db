//! Release data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability of a release bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseState {
    NotAvailable,
    Downloading,
    Available,
    Error,
}

impl ReleaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::NotAvailable => "not_available",
            ReleaseState::Downloading => "downloading",
            ReleaseState::Available => "available",
            ReleaseState::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_available" => Some(ReleaseState::NotAvailable),
            "downloading" => Some(ReleaseState::Downloading),
            "available" => Some(ReleaseState::Available),
            "error" => Some(ReleaseState::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A downloadable OS/platform bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub state: ReleaseState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
