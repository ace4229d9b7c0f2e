use super::{Announce, PeerStats, PeerStatus, Persistence, TorrentSummary};
use crate::data_structures::ID;
use crate::transcoding::metainfo::Torrent;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct PeerRecord {
    announce: Announce,
    status: PeerStatus,
    expires: Instant,
}

#[derive(Debug, Default)]
struct Data {
    torrents: HashMap<ID, Arc<Torrent>>,
    peers: HashMap<(ID, ID), PeerRecord>,
}

/// Keeps torrents and announces in process memory. Clones share the same
/// tables, so every worker sees every announce.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    data: Arc<StdMutex<Data>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn save_torrent(&self, torrent: Torrent) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .torrents
            .insert(torrent.info_hash, Arc::new(torrent));

        Ok(())
    }

    async fn get_torrent(&self, info_hash: &ID) -> Result<Option<Arc<Torrent>>> {
        Ok(self.data.lock().unwrap().torrents.get(info_hash).cloned())
    }

    async fn save_announce(&self, announce: Announce) -> Result<()> {
        let key = (announce.info_hash, announce.peer_id);
        let now = Instant::now();
        let expires = now + announce.ttl;

        debug!(
            info_hash = %announce.info_hash,
            peer = %SocketAddr::new(announce.ip, announce.port),
            downloaded = announce.downloaded,
            uploaded = announce.uploaded,
            left = announce.left,
            "announce"
        );

        let mut data = self.data.lock().unwrap();

        // an expired record is forgotten, status included
        data.peers.retain(|_, record| record.expires > now);

        let status = match (announce.status, data.peers.get(&key)) {
            (Some(status), _) => status,
            (None, Some(previous)) => previous.status,
            (None, None) => PeerStatus::Incomplete,
        };

        data.peers.insert(
            key,
            PeerRecord {
                announce,
                status,
                expires,
            },
        );

        Ok(())
    }

    async fn get_all_info_hash(&self) -> Result<Vec<TorrentSummary>> {
        let data = self.data.lock().unwrap();

        Ok(data
            .torrents
            .values()
            .map(|torrent| TorrentSummary {
                info_hash: torrent.info_hash,
                length: torrent.info.length,
            })
            .collect())
    }

    async fn get_peer_stats(&self, info_hash: &ID, excluded: &ID) -> Result<PeerStats> {
        let now = Instant::now();
        let data = self.data.lock().unwrap();

        let live = data.peers.values().filter(|record| {
            record.announce.info_hash == *info_hash
                && record.announce.peer_id != *excluded
                && record.expires > now
        });

        let mut stats = PeerStats::default();
        for record in live {
            match record.status {
                PeerStatus::Complete => stats.complete += 1,
                PeerStatus::Incomplete => stats.incomplete += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryPersistence;
    use crate::data_structures::ID;
    use crate::persistence::{Announce, PeerStats, PeerStatus, Persistence};
    use crate::transcoding::metainfo::tests::{mock_torrent, remove_mock};
    use std::time::Duration;
    use tokio::time::sleep;

    fn announce(info_hash: ID, peer: u8, status: Option<PeerStatus>, ttl: Duration) -> Announce {
        Announce {
            info_hash,
            peer_id: ID::new([peer; 20]),
            ip: "10.0.0.1".parse().unwrap(),
            port: 6881,
            downloaded: 0,
            uploaded: 0,
            left: 6,
            status,
            ttl,
        }
    }

    #[tokio::test]
    async fn torrents() {
        let persistence = MemoryPersistence::new();
        let torrent = mock_torrent("memory_torrents", b"abcdef", 2).await;
        let info_hash = torrent.info_hash;

        assert!(persistence.get_torrent(&info_hash).await.unwrap().is_none());

        persistence.save_torrent(torrent.clone()).await.unwrap();
        persistence.save_torrent(torrent).await.unwrap();

        let saved = persistence.get_torrent(&info_hash).await.unwrap().unwrap();
        assert_eq!(info_hash, saved.info_hash);

        let all = persistence.get_all_info_hash().await.unwrap();
        assert_eq!(1, all.len());
        assert_eq!(info_hash, all[0].info_hash);
        assert_eq!(6, all[0].length);

        remove_mock(&saved).await;
    }

    #[tokio::test]
    async fn status_is_kept_when_not_reported() {
        let persistence = MemoryPersistence::new();
        let info_hash = ID::new([7; 20]);
        let excluded = ID::new([0; 20]);
        let ttl = Duration::from_secs(60);

        persistence
            .save_announce(announce(info_hash, 1, None, ttl))
            .await
            .unwrap();
        assert_eq!(
            PeerStats {
                complete: 0,
                incomplete: 1
            },
            persistence.get_peer_stats(&info_hash, &excluded).await.unwrap()
        );

        persistence
            .save_announce(announce(info_hash, 1, Some(PeerStatus::Complete), ttl))
            .await
            .unwrap();
        persistence
            .save_announce(announce(info_hash, 1, None, ttl))
            .await
            .unwrap();
        assert_eq!(
            PeerStats {
                complete: 1,
                incomplete: 0
            },
            persistence.get_peer_stats(&info_hash, &excluded).await.unwrap()
        );
    }

    #[tokio::test]
    async fn stats_skip_excluded_and_expired_peers() {
        let persistence = MemoryPersistence::new();
        let info_hash = ID::new([7; 20]);
        let other_hash = ID::new([8; 20]);
        let ttl = Duration::from_secs(60);

        for (peer, status) in [
            (1, PeerStatus::Complete),
            (2, PeerStatus::Complete),
            (3, PeerStatus::Incomplete),
        ] {
            persistence
                .save_announce(announce(info_hash, peer, Some(status), ttl))
                .await
                .unwrap();
        }
        persistence
            .save_announce(announce(info_hash, 4, Some(PeerStatus::Complete), Duration::ZERO))
            .await
            .unwrap();
        persistence
            .save_announce(announce(other_hash, 5, Some(PeerStatus::Complete), ttl))
            .await
            .unwrap();

        assert_eq!(
            PeerStats {
                complete: 1,
                incomplete: 1
            },
            persistence
                .get_peer_stats(&info_hash, &ID::new([2; 20]))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn expired_peers_are_pruned() {
        let persistence = MemoryPersistence::new();
        let info_hash = ID::new([7; 20]);
        let ttl = Duration::from_secs(60);

        persistence
            .save_announce(announce(info_hash, 1, Some(PeerStatus::Complete), Duration::from_millis(1)))
            .await
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        persistence
            .save_announce(announce(info_hash, 2, None, ttl))
            .await
            .unwrap();

        assert_eq!(1, persistence.data.lock().unwrap().peers.len());

        // peer 1 comes back without a status, its old one is gone with the record
        persistence
            .save_announce(announce(info_hash, 1, None, ttl))
            .await
            .unwrap();

        assert_eq!(
            PeerStats {
                complete: 0,
                incomplete: 2
            },
            persistence
                .get_peer_stats(&info_hash, &ID::new([0; 20]))
                .await
                .unwrap()
        );
    }
}
