//! Progress event contract for sync jobs.
//!
//! Events are pushed through a per-job channel and drained by the transport
//! layer (out of scope here). The serialized shape is an external contract
//! consumed by operator dashboards; field names must not drift.

use serde::{Deserialize, Serialize};

/// Stage labels reported alongside progress percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Init,
    RosterFetch,
    RegistryFetch,
    Validation,
    Processing,
    Saving,
    Finalizing,
    Complete,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SyncStage::Init => "init",
            SyncStage::RosterFetch => "roster_fetch",
            SyncStage::RegistryFetch => "registry_fetch",
            SyncStage::Validation => "validation",
            SyncStage::Processing => "processing",
            SyncStage::Saving => "saving",
            SyncStage::Finalizing => "finalizing",
            SyncStage::Complete => "complete",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEventType {
    Progress,
    Complete,
    Cancelled,
    Error,
}

/// One event on a sync job's stream. The stream closes after a terminal
/// event (`complete`, `cancelled` or `error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub event_type: SyncEventType,
    pub stage: SyncStage,
    pub message: String,
    pub percentage: u8,
    pub sync_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_count: Option<u64>,
}

impl SyncEvent {
    pub fn progress(
        sync_id: &str,
        stage: SyncStage,
        message: impl Into<String>,
        percentage: u8,
    ) -> Self {
        Self {
            event_type: SyncEventType::Progress,
            stage,
            message: message.into(),
            percentage: percentage.min(100),
            sync_id: sync_id.to_string(),
            saved_count: None,
        }
    }

    pub fn saving(sync_id: &str, message: impl Into<String>, percentage: u8, saved: u64) -> Self {
        Self {
            event_type: SyncEventType::Progress,
            stage: SyncStage::Saving,
            message: message.into(),
            percentage: percentage.min(100),
            sync_id: sync_id.to_string(),
            saved_count: Some(saved),
        }
    }

    pub fn complete(sync_id: &str, message: impl Into<String>) -> Self {
        Self {
            event_type: SyncEventType::Complete,
            stage: SyncStage::Complete,
            message: message.into(),
            percentage: 100,
            sync_id: sync_id.to_string(),
            saved_count: None,
        }
    }

    pub fn cancelled(sync_id: &str, reason: &str, saved: u64) -> Self {
        Self {
            event_type: SyncEventType::Cancelled,
            stage: SyncStage::Processing,
            message: format!("Sync cancelled: {reason} - {saved} records saved"),
            percentage: 0,
            sync_id: sync_id.to_string(),
            saved_count: Some(saved),
        }
    }

    pub fn error(sync_id: &str, message: impl Into<String>) -> Self {
        Self {
            event_type: SyncEventType::Error,
            stage: SyncStage::Processing,
            message: message.into(),
            percentage: 0,
            sync_id: sync_id.to_string(),
            saved_count: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.event_type, SyncEventType::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_shape_matches_contract() {
        let event = SyncEvent::saving("sync-1", "Saving data: 40/100", 59, 40);
        let json = serde_json::to_value(&event).expect("serializable");

        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "saving");
        assert_eq!(json["percentage"], 59);
        assert_eq!(json["sync_id"], "sync-1");
        assert_eq!(json["saved_count"], 40);
    }

    #[test]
    fn saved_count_omitted_when_absent() {
        let event = SyncEvent::progress("sync-1", SyncStage::Init, "Initializing", 0);
        let json = serde_json::to_value(&event).expect("serializable");
        assert!(json.get("saved_count").is_none());
    }

    #[test]
    fn terminal_events() {
        assert!(SyncEvent::complete("s", "done").is_terminal());
        assert!(SyncEvent::cancelled("s", "why", 3).is_terminal());
        assert!(SyncEvent::error("s", "boom").is_terminal());
        assert!(!SyncEvent::progress("s", SyncStage::Saving, "m", 50).is_terminal());
    }

    #[test]
    fn percentage_is_clamped() {
        let event = SyncEvent::progress("s", SyncStage::Saving, "m", 150);
        assert_eq!(event.percentage, 100);
    }
}
