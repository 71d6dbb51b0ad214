//! Progress subscriber state machine.
//!
//! `ImportSession` is pure: it takes channel events in and hands back the
//! message to send or the notification to raise, and never does I/O itself.
//! The manager worker owns one and drives it from the channel.
//!
//! ```text
//! Idle -> Connecting -> Subscribing -> Listening -> Done
//!              ^             |             |
//!              +-------------+-------------+   (disconnect)
//! ```
//! `Stalled` is entered from any active non terminal state when no event
//! arrives in time. A disconnect keeps it; a connect, acknowledgement or
//! progress event leaves it.
//! `reset` returns to `Idle` from anywhere.

use chrono::Utc;
use tracing::{debug, info, warn};
use crate::channel::OutboundMessage;
use super::types::{
    ImportJob, ImportSummary, Notification, ProgressSnapshot, SubscriberState, UploadId,
    UploadResponse,
};

/// What applying a progress event did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Not for the tracked job (or nothing is tracked)
    Ignored,
    Applied,
    /// Applied and this was the first `done` for the job
    Completed(Notification),
}

#[derive(Debug, Default)]
pub struct ImportSession {
    job: ImportJob,
    completion_sent: bool,
}

impl ImportSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self) -> &ImportJob {
        &self.job
    }

    pub fn state(&self) -> SubscriberState {
        self.job.state
    }

    pub fn snapshot(&self) -> Option<&ProgressSnapshot> {
        self.job.snapshot.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.job.is_active()
    }

    /// Installs a freshly accepted job with its zero snapshot. If the channel
    /// is already up the subscribe announcement is returned straight away.
    pub fn begin(&mut self, response: UploadResponse, connected: bool) -> Option<OutboundMessage> {
        self.reset();

        let snapshot = ProgressSnapshot::initial(&response.upload_id);
        info!(upload_id = %response.upload_id, total = ?response.total, "import job started");

        self.job.upload_id = Some(response.upload_id);
        self.job.snapshot = Some(snapshot);
        self.job.estimated_total = response.total;
        self.job.state = SubscriberState::Connecting;
        self.touch();

        if connected {
            self.on_connect()
        } else {
            None
        }
    }

    /// A (re)connection. Subscriptions do not survive reconnects, so every
    /// connect with a live job produces exactly one announcement.
    pub fn on_connect(&mut self) -> Option<OutboundMessage> {
        if self.job.state == SubscriberState::Done {
            return None;
        }
        let upload_id = self.job.upload_id.clone()?;

        self.job.subscribed = false;
        self.job.state = SubscriberState::Subscribing;
        self.touch();
        debug!(%upload_id, "announcing subscription");

        Some(OutboundMessage::Subscribe { upload_id })
    }

    /// A stalled job stays stalled; only a connect or a live event moves it on.
    pub fn on_disconnect(&mut self) {
        if !self.is_active() || self.job.state == SubscriberState::Done {
            return;
        }

        self.job.subscribed = false;
        if self.job.state != SubscriberState::Stalled {
            self.job.state = SubscriberState::Connecting;
        }
        self.touch();
    }

    /// Returns whether the acknowledgement was accepted.
    pub fn on_subscribed(&mut self, acked: Option<&UploadId>) -> bool {
        let Some(upload_id) = self.job.upload_id.as_ref() else {
            return false;
        };
        if acked.is_some_and(|acked| acked != upload_id) {
            debug!(%upload_id, ?acked, "ignoring acknowledgement for another job");
            return false;
        }

        self.job.subscribed = true;
        if self.job.state != SubscriberState::Done {
            self.job.state = SubscriberState::Listening;
        }
        self.touch();
        true
    }

    pub fn on_progress(&mut self, snapshot: ProgressSnapshot) -> ProgressUpdate {
        let Some(upload_id) = self.job.upload_id.clone() else {
            debug!("progress event with no tracked job");
            return ProgressUpdate::Ignored;
        };
        if !snapshot.concerns(&upload_id) {
            debug!(%upload_id, other = ?snapshot.upload_id, "ignoring progress for another job");
            return ProgressUpdate::Ignored;
        }
        if self.job.state == SubscriberState::Done && !snapshot.stage.is_terminal() {
            warn!(%upload_id, stage = %snapshot.stage, "progress after done, ignoring");
            return ProgressUpdate::Ignored;
        }

        // A progress event for our job proves the subscription is live even
        // if the acknowledgement was lost.
        self.job.subscribed = true;
        self.job.state = if snapshot.stage.is_terminal() {
            SubscriberState::Done
        } else {
            SubscriberState::Listening
        };

        let completed = snapshot.stage.is_terminal() && !self.completion_sent;
        let summary = ImportSummary::from_snapshot(&upload_id, &snapshot);
        self.job.snapshot = Some(snapshot);
        self.touch();

        if completed {
            self.completion_sent = true;
            info!(%upload_id, inserted = summary.inserted, duplicates = summary.duplicates,
                errors = summary.errors, "import job done");
            ProgressUpdate::Completed(Notification::ImportCompleted(summary))
        } else {
            ProgressUpdate::Applied
        }
    }

    /// No event arrived within the stall timeout.
    pub fn on_stall(&mut self) -> Option<Notification> {
        let upload_id = self.job.upload_id.clone()?;

        match self.job.state {
            SubscriberState::Connecting | SubscriberState::Subscribing | SubscriberState::Listening => {
                warn!(%upload_id, from = ?self.job.state, "import stalled");
                self.job.state = SubscriberState::Stalled;
                self.touch();
                Some(Notification::ConnectionLost { upload_id })
            }
            _ => None,
        }
    }

    /// Clears the job. Safe to call in any state, any number of times.
    pub fn reset(&mut self) {
        if let Some(upload_id) = &self.job.upload_id {
            info!(%upload_id, "import job reset");
        }
        self.job = ImportJob::default();
        self.completion_sent = false;
    }

    fn touch(&mut self) {
        self.job.updated_at = Some(Utc::now());
    }
}
