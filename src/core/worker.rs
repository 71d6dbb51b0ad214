use std::future::pending;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use crate::channel::{ChannelEvent, Listener, OutboundMessage, SharedChannel};
use crate::initiator::validate_files;
use super::errors::{ImportError, Result};
use super::manager::ManagerOptions;
use super::session::{ImportSession, ProgressUpdate};
use super::traits::{ChannelProvider, ImportInitiator};
use super::types::{
    ImportEvent, ImportJob, ManagerCommand, Notification, SubscriberState, UploadResponse,
};

struct UploadFinished {
    generation: u64,
    result: Result<UploadResponse>,
    reply: oneshot::Sender<Result<UploadResponse>>,
}

pub(crate) struct ImportWorker {
    initiator: Arc<dyn ImportInitiator>,
    provider: Arc<dyn ChannelProvider>,
    options: ManagerOptions,
    session: ImportSession,
    channel: Option<SharedChannel>,
    listener: Option<Listener>,
    uploading: bool,
    /// Bumped on every reset so uploads from an abandoned cycle are dropped
    generation: u64,
    stall_deadline: Option<Instant>,

    event_tx: broadcast::Sender<ImportEvent>,
    job_tx: watch::Sender<ImportJob>,
    upload_tx: mpsc::UnboundedSender<UploadFinished>,
    upload_rx: mpsc::UnboundedReceiver<UploadFinished>,
}

impl ImportWorker {
    pub(crate) async fn run(
        initiator: Arc<dyn ImportInitiator>,
        provider: Arc<dyn ChannelProvider>,
        options: ManagerOptions,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<ImportEvent>,
        job_tx: watch::Sender<ImportJob>,
    ) {
        let (upload_tx, upload_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            initiator,
            provider,
            options,
            session: ImportSession::new(),
            channel: None,
            listener: None,
            uploading: false,
            generation: 0,
            stall_deadline: None,
            event_tx,
            job_tx,
            upload_tx,
            upload_rx,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(ManagerCommand::Shutdown) | None => break,
                    Some(command) => worker.handle_command(command).await,
                },
                Some(finished) = worker.upload_rx.recv() => {
                    worker.handle_upload_finished(finished);
                }
                event = next_event(&mut worker.listener) => {
                    worker.handle_channel_event(event);
                }
                _ = wait_until(worker.stall_deadline) => {
                    worker.handle_stall();
                }
            }
        }

        if let Some(listener) = worker.listener.take() {
            listener.close();
        }
        info!("import manager stopped");
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::StartImport { files, reply } => {
                self.start_import(files, reply).await;
            }
            ManagerCommand::Reset { reply } => {
                self.reset();
                let _ = reply.send(());
            }
            ManagerCommand::GetJob { reply } => {
                let _ = reply.send(self.session.job().clone());
            }
            ManagerCommand::Shutdown => {}
        }
    }

    async fn start_import(&mut self, files: Vec<PathBuf>, reply: oneshot::Sender<Result<UploadResponse>>) {
        if self.uploading || self.session.is_active() {
            let _ = reply.send(Err(ImportError::Busy));
            return;
        }

        if let Err(err) = validate_files(&files).await {
            warn!(error = %err, "rejected import input");
            self.notify(Notification::UploadFailed {
                message: err.user_message(),
            });
            let _ = reply.send(Err(err));
            return;
        }

        self.uploading = true;
        let generation = self.generation;
        let initiator = self.initiator.clone();
        let upload_tx = self.upload_tx.clone();
        info!(files = files.len(), "uploading import files");

        tokio::spawn(async move {
            let result = initiator.start_import(&files).await;
            let _ = upload_tx.send(UploadFinished {
                generation,
                result,
                reply,
            });
        });
    }

    fn handle_upload_finished(&mut self, finished: UploadFinished) {
        if finished.generation != self.generation {
            warn!("upload finished after reset, discarding");
            let _ = finished.reply.send(Err(ImportError::Abandoned));
            return;
        }
        self.uploading = false;

        let response = match finished.result {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "import upload failed");
                self.notify(Notification::UploadFailed {
                    message: err.user_message(),
                });
                let _ = finished.reply.send(Err(err));
                return;
            }
        };

        let provider = &self.provider;
        let channel = self.channel.get_or_insert_with(|| provider.channel()).clone();
        let listener = channel.listen();

        let old_state = self.session.state();
        let announce = self.session.begin(response.clone(), listener.connected_at_open());
        self.listener = Some(listener);
        self.announce(announce);
        self.rearm_stall();

        if let Some(snapshot) = self.session.snapshot().cloned() {
            let _ = self.event_tx.send(ImportEvent::Snapshot(snapshot));
        }
        self.publish(old_state);

        let _ = finished.reply.send(Ok(response));
    }

    fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        let Some(event) = event else {
            self.listener = None;
            return;
        };

        let old_state = self.session.state();
        match event {
            ChannelEvent::Connect => {
                let announce = self.session.on_connect();
                if announce.is_some() {
                    self.rearm_stall();
                }
                self.announce(announce);
            }
            ChannelEvent::Disconnect { reason } => {
                info!(%reason, "channel disconnected");
                self.session.on_disconnect();
            }
            ChannelEvent::Subscribed { upload_id } => {
                if self.session.on_subscribed(upload_id.as_ref()) {
                    self.rearm_stall();
                }
            }
            ChannelEvent::Progress(snapshot) => match self.session.on_progress(snapshot) {
                ProgressUpdate::Ignored => {}
                ProgressUpdate::Applied => {
                    self.emit_snapshot();
                    self.rearm_stall();
                }
                ProgressUpdate::Completed(notification) => {
                    self.emit_snapshot();
                    self.stall_deadline = None;
                    self.notify(notification);
                }
            },
            ChannelEvent::Other { name, .. } => {
                debug!(event = %name, "ignoring channel event");
            }
        }

        self.publish(old_state);
    }

    fn handle_stall(&mut self) {
        self.stall_deadline = None;

        let old_state = self.session.state();
        if let Some(notification) = self.session.on_stall() {
            self.notify(notification);
        }
        self.publish(old_state);
    }

    fn reset(&mut self) {
        let old_state = self.session.state();

        // Detach before clearing so nothing queued for the old job is read
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
        self.session.reset();
        self.uploading = false;
        self.generation += 1;
        self.stall_deadline = None;

        let _ = self.event_tx.send(ImportEvent::Reset);
        self.publish(old_state);
    }

    fn announce(&self, message: Option<OutboundMessage>) {
        let (Some(message), Some(channel)) = (message, self.channel.as_ref()) else {
            return;
        };

        if let Err(err) = channel.send(message) {
            // Retried on the next connect
            warn!(error = %err, "failed to announce subscription");
        }
    }

    fn rearm_stall(&mut self) {
        let waiting = matches!(
            self.session.state(),
            SubscriberState::Connecting | SubscriberState::Subscribing | SubscriberState::Listening
        );

        self.stall_deadline = match self.options.stall_timeout {
            Some(timeout) if waiting => Some(Instant::now() + timeout),
            _ => None,
        };
    }

    fn emit_snapshot(&self) {
        if let Some(snapshot) = self.session.snapshot() {
            let _ = self.event_tx.send(ImportEvent::Snapshot(snapshot.clone()));
        }
    }

    fn notify(&self, notification: Notification) {
        self.options.notifier.notify(&notification);
        let _ = self.event_tx.send(ImportEvent::Notification(notification));
    }

    fn publish(&self, old_state: SubscriberState) {
        let new_state = self.session.state();
        if old_state != new_state {
            debug!(?old_state, ?new_state, "subscriber state changed");
            let _ = self.event_tx.send(ImportEvent::StateChanged {
                old_state,
                new_state,
            });
        }
        self.job_tx.send_replace(self.session.job().clone());
    }
}

async fn next_event(listener: &mut Option<Listener>) -> Option<ChannelEvent> {
    match listener {
        Some(listener) => listener.recv().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
