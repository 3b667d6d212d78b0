// src/stream/mod.rs

pub mod channel;
pub mod metrics;
pub mod notices;
pub mod protocol;
pub mod session;

pub use channel::{event_queue, WsTransport};
pub use notices::NoticeKind;
pub use protocol::StreamSource;
pub use session::{SessionController, SessionStatus};
