use crate::data_structures::ID;
use crate::transcoding::metainfo::Torrent;
use anyhow::Result;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

mod memory;

pub use memory::MemoryPersistence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Complete,
    Incomplete,
}

/// One peer's report about one torrent. `status: None` keeps whatever was
/// recorded before (a new record starts out incomplete).
#[derive(Debug, Clone)]
pub struct Announce {
    pub info_hash: ID,
    pub peer_id: ID,
    pub ip: IpAddr,
    pub port: u16,
    pub downloaded: u64,
    pub uploaded: u64,
    pub left: u64,
    pub status: Option<PeerStatus>,
    pub ttl: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PeerStats {
    pub complete: u64,
    pub incomplete: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorrentSummary {
    pub info_hash: ID,
    pub length: u64,
}

/// Storage shared by every worker.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Saving the same info hash twice overwrites the first torrent.
    async fn save_torrent(&self, torrent: Torrent) -> Result<()>;

    async fn get_torrent(&self, info_hash: &ID) -> Result<Option<Arc<Torrent>>>;

    /// Upsert keyed by (info hash, peer id).
    async fn save_announce(&self, announce: Announce) -> Result<()>;

    async fn get_all_info_hash(&self) -> Result<Vec<TorrentSummary>>;

    /// Counts live peers of `info_hash`, leaving `excluded` out.
    async fn get_peer_stats(&self, info_hash: &ID, excluded: &ID) -> Result<PeerStats>;

    /// Called once at the start of every worker. Backends holding
    /// per-connection state reconnect here.
    async fn reset_after_forking(&self) -> Result<()> {
        Ok(())
    }
}
