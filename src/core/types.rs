use std::fmt;
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use super::errors::Result;

/// Opaque job identifier assigned by the backend when it accepts an upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UploadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend processing phase. Declaration order is the order a job moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parsing,
    Deduping,
    Inserting,
    Done,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Parsing => "Parsing",
            Stage::Deduping => "Deduping",
            Stage::Inserting => "Inserting",
            Stage::Done => "Done",
        }
    }

    pub fn indicator(&self) -> &'static str {
        match self {
            Stage::Parsing => "📄",
            Stage::Deduping => "🔍",
            Stage::Inserting => "💾",
            Stage::Done => "✅",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One progress report for a job. Always replaces the previous one whole.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<UploadId>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub processed: u64,
    /// Server computed, never recomputed here. Kept as a float so a backend
    /// sending `33.3` or an out of range value still decodes.
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub duplicates: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub remaining: u64,
    pub stage: Stage,
}

impl ProgressSnapshot {
    /// Zero state installed as soon as the upload is accepted. Every counter
    /// starts at zero; the upload's row estimate is kept on the job instead.
    pub fn initial(upload_id: &UploadId) -> Self {
        Self {
            upload_id: Some(upload_id.clone()),
            total: 0,
            processed: 0,
            percentage: 0.0,
            inserted: 0,
            duplicates: 0,
            errors: 0,
            remaining: 0,
            stage: Stage::Parsing,
        }
    }

    /// True unless the snapshot names a different job.
    pub fn concerns(&self, upload_id: &UploadId) -> bool {
        self.upload_id.as_ref().is_none_or(|id| id == upload_id)
    }
}

/// Body returned by the import endpoint on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_id: UploadId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SubscriberState {
    /// No job
    #[default]
    Idle,
    /// Job set, waiting for the channel to be connected
    Connecting,
    /// Subscribe announced, waiting for acknowledgement
    Subscribing,
    /// Acknowledged, applying progress events
    Listening,
    /// No event for the configured stall timeout
    Stalled,
    /// Last snapshot was `done`
    Done,
}

/// Client side view of one import, owned by a single manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportJob {
    pub upload_id: Option<UploadId>,
    pub snapshot: Option<ProgressSnapshot>,
    /// Row estimate from the upload response, if the server gave one
    pub estimated_total: Option<u64>,
    pub subscribed: bool,
    pub state: SubscriberState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn is_active(&self) -> bool {
        self.upload_id.is_some()
    }
}

/// Final counts reported once a job reaches `done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub upload_id: UploadId,
    pub total: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub errors: u64,
}

impl ImportSummary {
    pub fn from_snapshot(upload_id: &UploadId, snapshot: &ProgressSnapshot) -> Self {
        Self {
            upload_id: upload_id.clone(),
            total: snapshot.total,
            inserted: snapshot.inserted,
            duplicates: snapshot.duplicates,
            errors: snapshot.errors,
        }
    }
}

/// Transient user notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    UploadFailed {
        message: String,
    },
    ImportCompleted(ImportSummary),
    ConnectionLost {
        upload_id: UploadId,
    },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::UploadFailed { message } => write!(f, "Upload failed: {}", message),
            Notification::ImportCompleted(summary) => write!(
                f,
                "Import completed: {} inserted, {} duplicates, {} errors",
                summary.inserted, summary.duplicates, summary.errors
            ),
            Notification::ConnectionLost { upload_id } => {
                write!(f, "Connection lost while tracking import {}", upload_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    StateChanged {
        old_state: SubscriberState,
        new_state: SubscriberState,
    },

    /// A snapshot was applied to the job
    Snapshot(ProgressSnapshot),

    Notification(Notification),

    /// The job was cleared
    Reset,
}

/// Import manager commands
pub enum ManagerCommand {
    StartImport {
        files: Vec<PathBuf>,
        reply: oneshot::Sender<Result<UploadResponse>>,
    },

    Reset {
        reply: oneshot::Sender<()>,
    },

    GetJob {
        reply: oneshot::Sender<ImportJob>,
    },

    Shutdown,
}
