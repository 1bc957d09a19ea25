pub mod channel;
pub mod conversation;
pub mod message;
pub mod profile;
pub mod server;

pub use channel::*;
pub use conversation::*;
pub use message::*;
pub use profile::*;
pub use server::*;
