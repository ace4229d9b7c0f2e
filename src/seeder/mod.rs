pub mod client;
pub mod error;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod server;

pub use peer::{Peer, PeerConfig};
pub use server::Server;
