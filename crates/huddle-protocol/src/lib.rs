//! Wire protocol shared by the Huddle server and its clients.

pub mod messages;
pub mod types;

pub use messages::{ClientEvent, FrameError, ServerEvent};
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid room key: {0}")]
    InvalidRoom(String),

    #[error("Message must have content or a file")]
    EmptyMessage,

    #[error("Update must change content or file")]
    EmptyUpdate,
}
