//! Bulk lead import client.
//!
//! Uploads spreadsheet files to the CRM's import endpoint, then follows the
//! resulting job over the push channel until the backend reports `done`.

pub mod channel;
pub mod config;
pub mod core;
pub mod initiator;
pub mod view;

pub use crate::core::{
    ChannelProvider,
    ImportError,
    ImportEvent,
    ImportInitiator,
    ImportJob,
    ImportManager,
    ImportManagerHandle,
    ImportSession,
    ManagerOptions,
    Notification,
    Notifier,
    ProgressSnapshot,
    Result,
    Stage,
    SubscriberState,
    UploadId,
    UploadResponse,
};

pub use channel::{InMemoryChannel, LazyChannelProvider, SharedChannel, WsConfig};
pub use config::Config;
pub use initiator::HttpInitiator;
pub use view::ImportView;
