pub mod connection;
pub mod data;
pub mod ping;

pub use data::{DelCommand, GetCommand, SetCommand, TakeCommand};
pub use ping::PingCommand;
