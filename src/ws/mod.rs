pub mod connection;
pub mod consts;
pub mod deflate;
mod encoding;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod opcode;
mod read;
mod write;

pub use connection::{State, WebSocket};
pub use frame::Frame;
pub use handshake::{negotiate, Accepted, Rejection};
pub use message::{CloseReason, Message};
pub use opcode::Opcode;
pub use read::*;
pub use write::*;
