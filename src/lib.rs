mod board;
mod cell;
pub mod client;
mod common;
mod config;
pub mod connection;
mod fleet;
mod game;
mod logging;
mod placement;
pub mod protocol;
pub mod registry;
pub mod server;
mod ship;
pub mod store;
pub mod transport;

pub use board::*;
pub use cell::*;
pub use client::{Bot, BotOutcome, BotReport, Client};
pub use common::*;
pub use config::*;
pub use connection::{serve_connection, ServerContext};
pub use fleet::*;
pub use game::*;
pub use logging::init_logging;
pub use placement::*;
pub use protocol::{redact_credentials, split_reply, Command, Reply};
pub use registry::{MatchHandle, SessionRegistry};
pub use server::Server;
pub use ship::*;
pub use store::*;
pub use transport::in_memory::InMemoryTransport;
pub use transport::tcp::TcpTransport;
