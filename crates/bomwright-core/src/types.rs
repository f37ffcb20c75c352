use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle state of a session's background enrichment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// No enrichment has been scheduled yet.
    #[default]
    Idle,
    /// A task is scheduled but has not started executing.
    Queued,
    /// A task is waiting on the completion service.
    Processing,
    /// The last task merged its result into the artifact.
    Complete,
    /// The last task timed out or failed.
    Error,
}

impl EnrichmentStatus {
    /// Whether no task is associated with this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrichmentStatus::Idle | EnrichmentStatus::Complete | EnrichmentStatus::Error
        )
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentStatus::Idle => write!(f, "idle"),
            EnrichmentStatus::Queued => write!(f, "queued"),
            EnrichmentStatus::Processing => write!(f, "processing"),
            EnrichmentStatus::Complete => write!(f, "complete"),
            EnrichmentStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for EnrichmentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(EnrichmentStatus::Idle),
            "queued" => Ok(EnrichmentStatus::Queued),
            "processing" => Ok(EnrichmentStatus::Processing),
            "complete" => Ok(EnrichmentStatus::Complete),
            "error" => Ok(EnrichmentStatus::Error),
            _ => Err(format!("Unknown enrichment status: {}", s)),
        }
    }
}

/// Speaker of a conversational turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

// =============================================================================
// Structs
// =============================================================================

/// One entry of a session's conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A single line of the bill of materials.
///
/// Field names on the wire follow the completion payload format
/// (`serviceName`, `armRegionName`, `hours_per_month`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BomItem {
    #[serde(rename = "serviceName")]
    pub service_name: String,
    pub sku: String,
    pub quantity: f64,
    pub region: String,
    #[serde(rename = "armRegionName")]
    pub arm_region_name: String,
    pub hours_per_month: f64,
}

impl BomItem {
    /// Identity of this item within an artifact.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.service_name, &self.region)
    }
}

/// Composite identity `(service name, region)` of a [`BomItem`].
///
/// Both parts are compared trimmed and case-insensitively, so
/// "App Service / East US" and "app service / east us" are the same line.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemKey {
    service_name: String,
    region: String,
}

impl ItemKey {
    pub fn new(service_name: &str, region: &str) -> Self {
        Self {
            service_name: service_name.trim().to_lowercase(),
            region: region.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.service_name, self.region)
    }
}
