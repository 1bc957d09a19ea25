pub mod connections;
pub mod handler;
pub mod hub;
pub mod relay;

pub use connections::LocalHub;
pub use hub::RoomHub;
pub use relay::{RelayBus, RelayHub};
