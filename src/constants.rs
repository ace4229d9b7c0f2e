use std::time::Duration;

pub const PSTRLEN: u8 = 19;
pub const PSTR: &[u8] = b"BitTorrent protocol";
pub const RESERVED_LEN: usize = 8;
pub const HANDSHAKE_LENGTH_FOR_BITTORRENT_PROTOCOL: usize = 68;

/// Prefix of our own peer id, Azureus-style client tag.
pub const CLIENT_TAG: &[u8] = b"-PT0001-";

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6881;
pub const DEFAULT_PEER_FORKS: usize = 5;
pub const DEFAULT_PIECE_LENGTH: u64 = 1 << 18;
pub const DEFAULT_PID_FILE: &str = "/var/run/seeder.pid";

/// A worker exits after this many loop iterations and gets replaced by its supervisor.
pub const STOP_AFTER_ITERATIONS: usize = 20;
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

pub const READ_CHUNK_SIZE: usize = 2048;
pub const LISTEN_BACKLOG: u32 = 5;
