use super::client::Client;
use super::error::CloseConnection;
use super::handshake::Handshake;
use super::message::{self, Header, Message, MessageId, Piece, Request};
use super::message::{BYTES_IN_ID, BYTES_IN_LEN_PREFIX, REQUEST_PAYLOAD_LEN};
use crate::constants::{CLIENT_TAG, LISTEN_BACKLOG, STOP_AFTER_ITERATIONS};
use crate::data_structures::{Bitmap, ID, ID_LEN};
use crate::forker::Forker;
use crate::persistence::Persistence;
use crate::transcoding::metainfo::Torrent;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use openssl::sha;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub internal_address: IpAddr,
    pub external_address: IpAddr,
    pub port: u16,
    pub peer_forks: usize,
    /// Refuse new downloaders once this many other seeders are known. 0 never refuses.
    pub seeders_stop_seeding: u64,
}

/// Seeds every torrent known to persistence on one listening socket.
pub struct Peer {
    config: PeerConfig,
    peer_id: ID,
    persistence: Arc<dyn Persistence>,
    listener: OnceCell<TcpListener>,
}

impl Peer {
    pub fn new(config: PeerConfig, persistence: Arc<dyn Persistence>) -> Self {
        let peer_id = generate_peer_id(&config.external_address, config.port);

        Self {
            config,
            peer_id,
            persistence,
            listener: OnceCell::new(),
        }
    }

    pub fn peer_id(&self) -> &ID {
        &self.peer_id
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.get()?.local_addr().ok()
    }

    /// Binds the listening socket on the first call. Later calls, from a
    /// restarted pool included, get the same socket back.
    pub async fn listen(&self) -> Result<&TcpListener> {
        self.listener.get_or_try_init(|| self.bind()).await
    }

    async fn bind(&self) -> Result<TcpListener> {
        let addr = SocketAddr::new(self.config.internal_address, self.config.port);

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .with_context(|| format!("unable to bind {addr}"))?;

        Ok(socket.listen(LISTEN_BACKLOG)?)
    }

    /// Serves one client until the session ends. Never returns success, the
    /// result is why the connection should be closed.
    #[instrument(skip_all, fields(addr = %client.addr()))]
    async fn communicate<S>(&self, client: &mut Client<S>) -> CloseConnection
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        loop {
            let result = match client.torrent().cloned() {
                None => self.start_session(client).await,
                Some(torrent) => self.answer(client, &torrent).await,
            };

            if let Err(reason) = result {
                return reason;
            }
        }
    }

    async fn start_session<S>(&self, client: &mut Client<S>) -> Result<(), CloseConnection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let torrent = self.shake_hand(client).await?;

        client
            .send(Message::bitfield(&Bitmap::full(torrent.count_pieces())))
            .await?;
        client.unchoke().await?;
        client.set_torrent(torrent);

        Ok(())
    }

    async fn shake_hand<S>(&self, client: &mut Client<S>) -> Result<Arc<Torrent>, CloseConnection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let Handshake { info_hash, peer_id } = Handshake::receive(client).await?;

        let torrent = self
            .persistence
            .get_torrent(&info_hash)
            .await?
            .ok_or(CloseConnection::UnknownInfoHash { info_hash })?;

        if self.config.seeders_stop_seeding > 0 {
            let stats = self
                .persistence
                .get_peer_stats(&info_hash, &self.peer_id)
                .await?;
            debug!(seeders = stats.complete, leechers = stats.incomplete, "swarm");

            if stats.complete >= self.config.seeders_stop_seeding {
                return Err(CloseConnection::EnoughSeeders {
                    info_hash,
                    seeders: stats.complete,
                });
            }
        }

        client
            .write(&Handshake::new(&info_hash, &self.peer_id).to_bytes())
            .await?;
        client.set_peer_id(peer_id);

        info!(%info_hash, ?peer_id, "handshake done");

        Ok(torrent)
    }

    async fn answer<S>(&self, client: &mut Client<S>, torrent: &Torrent) -> Result<(), CloseConnection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let len = message::len(&client.read(BYTES_IN_LEN_PREFIX).await?);

        let header = if len == 0 {
            Header::KeepAlive
        } else {
            let id = client.read(BYTES_IN_ID).await?[0];
            Header::new(len, id).map_err(|id| CloseConnection::UnsupportedMessage { id })?
        };

        let (id, payload_len) = match header {
            Header::KeepAlive => {
                trace!("keep alive");
                return Ok(());
            }
            Header::Message { id, payload_len } => (id, payload_len),
        };

        match id {
            MessageId::Choke
            | MessageId::Unchoke
            | MessageId::Interested
            | MessageId::NotInterested => {
                trace!(?id, "ignored");
                Ok(())
            }
            MessageId::Have | MessageId::Bitfield | MessageId::Piece | MessageId::Cancel => {
                trace!(?id, payload_len, "discarded");
                client.discard(payload_len).await
            }
            MessageId::Request => {
                if payload_len != REQUEST_PAYLOAD_LEN {
                    return Err(CloseConnection::MalformedRequest { payload_len });
                }

                let payload = client.read(payload_len).await?;
                let request = Request::from_payload(&payload)
                    .ok_or(CloseConnection::MalformedRequest { payload_len })?;

                send_block(client, torrent, request).await
            }
        }
    }
}

async fn send_block<S>(client: &mut Client<S>, torrent: &Torrent, request: Request) -> Result<(), CloseConnection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Request {
        index,
        begin,
        length,
    } = request;

    if client.is_choked() {
        debug!(index, begin, length, "request while choked, ignored");
        return Ok(());
    }

    let block = torrent.read_block(index, begin, length).await?;

    client
        .send(Message::Piece(Piece::new(index, begin, block)))
        .await?;
    client.add_data_sent(u64::from(length));

    debug!(index, begin, length, "block sent");

    Ok(())
}

fn generate_peer_id(external_address: &IpAddr, port: u16) -> ID {
    let mut id = [0u8; ID_LEN];
    let digest = sha::sha1(format!("{external_address}{port}").as_bytes());

    id[..CLIENT_TAG.len()].copy_from_slice(CLIENT_TAG);
    id[CLIENT_TAG.len()..].copy_from_slice(&digest[..ID_LEN - CLIENT_TAG.len()]);

    ID::new(id)
}

fn log_close<S>(client: &Client<S>, reason: &CloseConnection) {
    let addr = client.addr();
    let peer_id = client.peer_id();
    let stats = client.stats();

    match reason {
        CloseConnection::UnsupportedProtocol { protocol } => error!(
            %addr,
            protocol = %String::from_utf8_lossy(protocol),
            "closing connection: {reason}; {stats}"
        ),
        CloseConnection::Socket { .. } | CloseConnection::Persistence { .. } => {
            warn!(%addr, ?peer_id, "closing connection: {reason}; {stats}")
        }
        _ => info!(%addr, ?peer_id, "closing connection: {reason}; {stats}"),
    }
}

#[async_trait]
impl Forker for Peer {
    async fn start_parent_process(&self) -> Result<i32> {
        if self.config.peer_forks < 1 {
            bail!("at least one peer worker is needed, got {}", self.config.peer_forks);
        }

        let listener = self.listen().await?;

        info!(
            addr = %listener.local_addr()?,
            peer_id = ?self.peer_id,
            "seeding"
        );

        let workers = i32::try_from(self.config.peer_forks).context("too many peer workers")?;

        Ok(-workers)
    }

    async fn start_child_process(&self, _slot: usize) -> Result<()> {
        self.persistence.reset_after_forking().await?;

        let listener = self
            .listener
            .get()
            .ok_or_else(|| anyhow!("peer worker started before binding"))?;

        for _ in 0..STOP_AFTER_ITERATIONS {
            let mut client = match Client::accept(listener).await {
                Ok(client) => client,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };

            let reason = self.communicate(&mut client).await;
            log_close(&client, &reason);
        }

        info!("served {STOP_AFTER_ITERATIONS} connections, exiting");

        Ok(())
    }
}
