mod config;
mod memory;
mod shared;
mod ws;
pub mod message;

pub use config::WsConfig;
pub use memory::InMemoryChannel;
pub use message::{ChannelEvent, OutboundMessage};
pub use shared::{Listener, SharedChannel};
pub use ws::{spawn_ws_channel, LazyChannelProvider};
