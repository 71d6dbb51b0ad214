use std::path::PathBuf;
use async_trait::async_trait;
use tracing::{info, warn};
use crate::channel::SharedChannel;
use super::types::{Notification, UploadResponse};
use super::errors::Result;

/// Submits the selected files to the ingestion endpoint and returns the job id.
#[async_trait]
pub trait ImportInitiator: Send + Sync {
    async fn start_import(&self, files: &[PathBuf]) -> Result<UploadResponse>;
}

/// Hands out the shared push channel. Implementations decide when the
/// underlying connection is created; callers only ever see the handle.
pub trait ChannelProvider: Send + Sync {
    fn channel(&self) -> SharedChannel;
}

impl ChannelProvider for SharedChannel {
    fn channel(&self) -> SharedChannel {
        self.clone()
    }
}

/// Receives every transient notification raised by a manager.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Default notifier, writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::ImportCompleted(_) => info!("{}", notification),
            Notification::UploadFailed { .. } | Notification::ConnectionLost { .. } => {
                warn!("{}", notification)
            }
        }
    }
}
