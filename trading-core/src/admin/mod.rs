pub mod command;
pub mod inbox;

pub use command::{AddressedCommand, AdminCommand, AdminResponse, CommandEnvelope, StatusReport};
pub use inbox::{ChannelInbox, CommandSource};
