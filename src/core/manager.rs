use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use crate::config::Config;
use super::errors::{ImportError, Result};
use super::traits::{ChannelProvider, ImportInitiator, Notifier, TracingNotifier};
use super::types::{ImportEvent, ImportJob, ManagerCommand, UploadResponse};
use super::worker::ImportWorker;

#[derive(Clone)]
pub struct ManagerOptions {
    /// Time without any event for the job before it is reported stalled.
    /// `None` waits forever.
    pub stall_timeout: Option<Duration>,
    pub event_buffer: usize,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            stall_timeout: None,
            event_buffer: 256,
            notifier: Arc::new(TracingNotifier),
        }
    }
}

impl ManagerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stall_timeout: config.stall_timeout(),
            event_buffer: config.event_buffer.max(1),
            ..Default::default()
        }
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Front of one import dialog: start an import, follow it, reset it.
///
/// Each manager owns its job exclusively; several managers may share one
/// channel provider.
#[derive(Clone)]
pub struct ImportManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<ImportEvent>,
    job_rx: watch::Receiver<ImportJob>,
}

/// Manager plus its worker task
pub struct ImportManagerHandle {
    pub manager: ImportManager,
    pub worker_handle: JoinHandle<()>,
}

impl ImportManagerHandle {
    pub async fn shutdown(self) -> Result<()> {
        // The worker may already be gone, in which case there is nothing to stop
        let _ = self.manager.command_tx.send(ManagerCommand::Shutdown).await;
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|err| ImportError::internal_error(format!("Worker panic: {}", err)))
    }
}

impl ImportManager {
    pub fn new(
        initiator: Arc<dyn ImportInitiator>,
        provider: Arc<dyn ChannelProvider>,
        options: ManagerOptions,
    ) -> ImportManagerHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(options.event_buffer);
        let (job_tx, job_rx) = watch::channel(ImportJob::default());

        let worker_handle = tokio::spawn(ImportWorker::run(
            initiator,
            provider,
            options,
            command_rx,
            event_tx.clone(),
            job_tx,
        ));

        let manager = Self {
            command_tx,
            event_tx,
            job_rx,
        };

        ImportManagerHandle {
            manager,
            worker_handle,
        }
    }

    /// Uploads `files` and starts tracking the resulting job.
    ///
    /// Resolves once the upload request finishes. Fails with
    /// [`ImportError::Busy`] while another upload or job is live, and with
    /// [`ImportError::Abandoned`] if the manager was reset meanwhile.
    pub async fn start_import(&self, files: Vec<PathBuf>) -> Result<UploadResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::StartImport {
                files,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ImportError::ManagerShutdown)?;

        reply_rx
            .await
            .map_err(|_| ImportError::ManagerShutdown)?
    }

    /// Drop the current job
    pub async fn reset(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Reset { reply: reply_tx })
            .await
            .map_err(|_| ImportError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| ImportError::ManagerShutdown)
    }

    pub async fn job(&self) -> Result<ImportJob> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::GetJob { reply: reply_tx })
            .await
            .map_err(|_| ImportError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| ImportError::ManagerShutdown)
    }

    /// Subscribe to events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ImportEvent> {
        self.event_tx.subscribe()
    }

    pub fn watch_job(&self) -> watch::Receiver<ImportJob> {
        self.job_rx.clone()
    }
}
