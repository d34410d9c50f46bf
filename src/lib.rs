pub mod config;
pub mod endpoints;
pub mod error;
pub mod server;
pub mod tls;
mod utils;
pub mod ws;

pub use error::{Error, Result};
