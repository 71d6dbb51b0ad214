mod errors;
mod manager;
mod session;
mod traits;
mod types;
mod worker;


pub use errors::{ImportError, Result};
pub use manager::{ImportManager, ImportManagerHandle, ManagerOptions};
pub use session::{ImportSession, ProgressUpdate};
pub use traits::{ChannelProvider, ImportInitiator, Notifier, TracingNotifier};
pub use types::{
    ImportEvent,
    ImportJob,
    ImportSummary,
    ManagerCommand,
    Notification,
    ProgressSnapshot,
    Stage,
    SubscriberState,
    UploadId,
    UploadResponse,
};
