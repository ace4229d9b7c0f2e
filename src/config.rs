use crate::constants::{
    ANNOUNCE_INTERVAL, DEFAULT_ADDRESS, DEFAULT_PEER_FORKS, DEFAULT_PID_FILE,
    DEFAULT_PIECE_LENGTH, DEFAULT_PORT,
};
use crate::seeder::PeerConfig;
use anyhow::Result;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct Config {
    /// file to seed, repeat for more files
    #[clap(long, value_name = "FILE", value_parser)]
    pub seed: Vec<PathBuf>,

    /// address the listening socket binds to
    #[clap(long, default_value = DEFAULT_ADDRESS, value_parser)]
    pub internal_address: IpAddr,

    /// address other peers reach us on, the first local address if omitted
    #[clap(long, value_parser)]
    pub external_address: Option<IpAddr>,

    #[clap(short, long, default_value_t = DEFAULT_PORT, value_parser)]
    pub port: u16,

    /// number of workers serving connections
    #[clap(long, default_value_t = DEFAULT_PEER_FORKS, value_parser)]
    pub peer_forks: usize,

    /// stop accepting downloaders once this many other seeders exist, 0 never stops
    #[clap(long, default_value_t = 0, value_parser)]
    pub seeders_stop_seeding: u64,

    /// seconds between self announces
    #[clap(long, default_value_t = ANNOUNCE_INTERVAL.as_secs(), value_parser)]
    pub announce_interval: u64,

    #[clap(long, default_value_t = DEFAULT_PIECE_LENGTH, value_parser)]
    pub piece_length: u64,

    /// mark seeded torrents private
    #[clap(long)]
    pub private: bool,

    /// tracker url written into metainfo and magnet links, repeatable
    #[clap(long, value_name = "URL", value_parser)]
    pub announce: Vec<String>,

    /// write a .torrent file per seeded file into this directory
    #[clap(long, value_parser)]
    pub torrent_dir: Option<PathBuf>,

    /// run in the background
    #[clap(short, long)]
    pub detach: bool,

    #[clap(long, default_value = DEFAULT_PID_FILE, value_parser)]
    pub pid_file: PathBuf,

    #[clap(long, value_parser)]
    pub log_file: Option<PathBuf>,

    #[clap(long, default_value_t = Level::INFO, value_parser)]
    pub log_level: Level,
}

impl Config {
    pub fn new() -> Config {
        Config::parse()
    }

    pub fn external_address(&self) -> IpAddr {
        self.external_address
            .or_else(|| local_ip_address::local_ip().ok())
            .unwrap_or(self.internal_address)
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            internal_address: self.internal_address,
            external_address: self.external_address(),
            port: self.port,
            peer_forks: self.peer_forks,
            seeders_stop_seeding: self.seeders_stop_seeding,
        }
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval)
    }

    /// Detaching changes the working directory to `/`, relative paths have to
    /// be resolved first.
    pub fn resolve_paths(&mut self) -> Result<()> {
        let cwd = std::env::current_dir()?;

        for path in self.seed.iter_mut() {
            *path = cwd.join(&*path);
        }
        for path in [&mut self.torrent_dir, &mut self.log_file].into_iter().flatten() {
            *path = cwd.join(&*path);
        }
        self.pid_file = cwd.join(&self.pid_file);

        Ok(())
    }
}
