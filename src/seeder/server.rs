use super::peer::Peer;
use crate::constants::STOP_AFTER_ITERATIONS;
use crate::data_structures::ID;
use crate::forker::{self, Forker};
use crate::persistence::{Announce, PeerStatus, Persistence, TorrentSummary};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

const SLOT_PEER: usize = 0;
const SLOT_ANNOUNCE: usize = 1;

/// Runs the peer pool next to a loop that keeps announcing us as a seeder of
/// every known torrent.
pub struct Server {
    peer: Arc<Peer>,
    persistence: Arc<dyn Persistence>,
    announce_interval: Duration,
}

impl Server {
    pub fn new(peer: Peer, persistence: Arc<dyn Persistence>, announce_interval: Duration) -> Self {
        Self {
            peer: Arc::new(peer),
            persistence,
            announce_interval,
        }
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    async fn announce(&self) -> Result<()> {
        for _ in 0..STOP_AFTER_ITERATIONS {
            let torrents = self.persistence.get_all_info_hash().await?;

            for TorrentSummary { info_hash, length } in torrents.iter().copied() {
                self.persistence
                    .save_announce(self.announce_for(info_hash, length))
                    .await?;
                debug!(%info_hash, "announced");
            }

            info!(torrents = torrents.len(), "announced as seeder");

            sleep(self.announce_interval).await;
        }

        info!("announced {STOP_AFTER_ITERATIONS} times, exiting");

        Ok(())
    }

    fn announce_for(&self, info_hash: ID, length: u64) -> Announce {
        let config = self.peer.config();

        Announce {
            info_hash,
            peer_id: *self.peer.peer_id(),
            ip: config.external_address,
            port: config.port,
            downloaded: length,
            uploaded: 0,
            left: 0,
            status: Some(PeerStatus::Complete),
            ttl: self.announce_interval,
        }
    }
}

#[async_trait]
impl Forker for Server {
    /// Binds for the peer pool up front, so a taken port fails startup
    /// instead of failing slot 0 over and over.
    async fn start_parent_process(&self) -> Result<i32> {
        self.peer.listen().await?;

        Ok(-2)
    }

    async fn start_child_process(&self, slot: usize) -> Result<()> {
        self.persistence.reset_after_forking().await?;

        match slot {
            SLOT_PEER => forker::start(self.peer.clone()).await?.wait().await,
            SLOT_ANNOUNCE => self.announce().await,
            _ => bail!("invalid slot {slot}, a server only has a peer and an announcer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Server;
    use crate::data_structures::ID;
    use crate::forker::{self, Forker};
    use crate::persistence::{MemoryPersistence, PeerStats, Persistence};
    use crate::seeder::peer::{Peer, PeerConfig};
    use crate::transcoding::metainfo::tests::mock_torrent;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::fs::remove_file;
    use tokio::net::TcpStream;
    use tokio::time::{sleep, timeout};

    fn server(persistence: &MemoryPersistence, announce_interval: Duration) -> Arc<Server> {
        server_on(persistence, announce_interval, 0)
    }

    fn server_on(persistence: &MemoryPersistence, announce_interval: Duration, port: u16) -> Arc<Server> {
        let config = PeerConfig {
            internal_address: "127.0.0.1".parse().unwrap(),
            external_address: "192.0.2.1".parse().unwrap(),
            port,
            peer_forks: 1,
            seeders_stop_seeding: 0,
        };
        let persistence: Arc<dyn Persistence> = Arc::new(persistence.clone());
        let peer = Peer::new(config, persistence.clone());

        Arc::new(Server::new(peer, persistence, announce_interval))
    }

    async fn torrent_path(persistence: &MemoryPersistence, info_hash: &ID) -> PathBuf {
        let torrent = persistence.get_torrent(info_hash).await.unwrap().unwrap();
        torrent.path().to_path_buf()
    }

    #[tokio::test]
    async fn announce_as_complete_seeder() {
        let persistence = MemoryPersistence::new();
        let torrent = mock_torrent("server_announce", b"abcdef", 2).await;
        let info_hash = torrent.info_hash;
        persistence.save_torrent(torrent).await.unwrap();

        let server = server(&persistence, Duration::from_secs(60));
        let peer_id = *server.peer().peer_id();

        let announcer = {
            let server = server.clone();
            tokio::spawn(async move { server.start_child_process(1).await })
        };

        let path = torrent_path(&persistence, &info_hash).await;
        let stranger = ID::new([3; 20]);
        timeout(Duration::from_secs(5), async {
            while persistence
                .get_peer_stats(&info_hash, &stranger)
                .await
                .unwrap()
                .complete
                == 0
            {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            PeerStats {
                complete: 1,
                incomplete: 0
            },
            persistence.get_peer_stats(&info_hash, &stranger).await.unwrap()
        );
        assert_eq!(
            PeerStats::default(),
            persistence.get_peer_stats(&info_hash, &peer_id).await.unwrap()
        );

        announcer.abort();
        remove_file(path).await.unwrap();
    }

    #[tokio::test]
    async fn announce_loop_ends() {
        let persistence = MemoryPersistence::new();
        let server = server(&persistence, Duration::from_millis(1));

        timeout(Duration::from_secs(5), server.start_child_process(1))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_slot() {
        let server = server(&MemoryPersistence::new(), Duration::from_secs(60));

        assert_eq!(-2, server.start_parent_process().await.unwrap());
        assert!(server.start_child_process(2).await.is_err());
    }

    #[tokio::test]
    async fn two_level_tree() {
        let server = server(&MemoryPersistence::new(), Duration::from_secs(60));

        let supervisor = forker::start(server.clone()).await.unwrap();
        assert_eq!(2, supervisor.live_workers());

        let addr = server.peer().local_addr().unwrap();
        assert!(TcpStream::connect(addr).await.is_ok());

        supervisor.shutdown();
    }

    #[tokio::test]
    async fn taken_port_fails_startup() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let server = server_on(&MemoryPersistence::new(), Duration::from_secs(60), port);

        assert!(forker::start(server.clone()).await.is_err());
        assert!(server.peer().local_addr().is_none());
    }
}
