use super::error::CloseConnection;
use super::message::Message;
use crate::constants::READ_CHUNK_SIZE;
use crate::data_structures::ID;
use crate::transcoding::metainfo::Torrent;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::trace;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub data_sent: u64,
}

/// One accepted connection and what we know about the peer on the other end.
#[derive(Debug)]
pub struct Client<S = TcpStream> {
    stream: S,
    addr: SocketAddr,
    peer_id: Option<ID>,
    torrent: Option<Arc<Torrent>>,
    choked: bool,
    stats: Stats,
}

impl Client<TcpStream> {
    pub async fn accept(listener: &TcpListener) -> Result<Self, CloseConnection> {
        let (stream, addr) = listener.accept().await?;

        Ok(Self::new(stream, addr))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            peer_id: None,
            torrent: None,
            choked: true,
            stats: Stats::default(),
        }
    }

    /// Reads exactly `wanted` bytes. A zero-length read means the peer hung up.
    pub async fn read(&mut self, wanted: usize) -> Result<Vec<u8>, CloseConnection> {
        let mut message = vec![0u8; wanted];
        let mut filled = 0;

        while filled < wanted {
            let chunk_end = filled + std::cmp::min(wanted - filled, READ_CHUNK_SIZE);

            match self.stream.read(&mut message[filled..chunk_end]).await? {
                0 => return Err(CloseConnection::PeerClosed),
                n => filled += n,
            }
        }

        self.stats.bytes_received += wanted as u64;
        trace!(wanted, "read");

        Ok(message)
    }

    /// Like `read`, but drops the bytes instead of collecting them.
    pub async fn discard(&mut self, wanted: usize) -> Result<(), CloseConnection> {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let mut left = wanted;

        while left > 0 {
            let chunk = std::cmp::min(left, READ_CHUNK_SIZE);

            match self.stream.read(&mut buf[..chunk]).await? {
                0 => return Err(CloseConnection::PeerClosed),
                n => left -= n,
            }
        }

        self.stats.bytes_received += wanted as u64;

        Ok(())
    }

    pub async fn write(&mut self, message: &[u8]) -> Result<(), CloseConnection> {
        self.stream.write_all(message).await?;
        self.stats.bytes_sent += message.len() as u64;

        Ok(())
    }

    pub async fn send(&mut self, message: Message) -> Result<(), CloseConnection> {
        let bytes = message
            .into_bytes()
            .map_err(|source| CloseConnection::Encoding { source })?;

        self.write(&bytes).await
    }

    pub async fn unchoke(&mut self) -> Result<(), CloseConnection> {
        self.send(Message::Unchoke).await?;
        self.choked = false;

        Ok(())
    }

    #[cfg(test)]
    pub async fn choke(&mut self) -> Result<(), CloseConnection> {
        self.send(Message::Choke).await?;
        self.choked = true;

        Ok(())
    }

    pub fn add_data_sent(&mut self, bytes: u64) {
        self.stats.data_sent += bytes;
    }
}

impl<S> Client<S> {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peer_id(&self) -> Option<&ID> {
        self.peer_id.as_ref()
    }

    pub fn set_peer_id(&mut self, peer_id: ID) {
        self.peer_id = Some(peer_id);
    }

    pub fn torrent(&self) -> Option<&Arc<Torrent>> {
        self.torrent.as_ref()
    }

    pub fn set_torrent(&mut self, torrent: Arc<Torrent>) {
        self.torrent = Some(torrent);
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bytes sent: {}, bytes received: {}, data sent: {}",
            self.bytes_sent, self.bytes_received, self.data_sent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Client, Stats};
    use crate::constants::READ_CHUNK_SIZE;
    use crate::seeder::error::CloseConnection;
    use std::net::SocketAddr;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn addr() -> SocketAddr {
        "127.0.0.1:51413".parse().unwrap()
    }

    #[tokio::test]
    async fn read_exact_amount_across_writes() {
        let (local, mut remote) = duplex(64);
        let mut client = Client::new(local, addr());

        tokio::spawn(async move {
            remote.write_all(b"Bit").await.unwrap();
            remote.write_all(b"Torrent").await.unwrap();
            remote.write_all(b"!").await.unwrap();
        });

        assert_eq!(b"BitTorrent".to_vec(), client.read(10).await.unwrap());
        assert_eq!(b"!".to_vec(), client.read(1).await.unwrap());
        assert_eq!(11, client.stats().bytes_received);
    }

    #[tokio::test]
    async fn read_larger_than_chunk() {
        let (local, mut remote) = duplex(READ_CHUNK_SIZE * 4);
        let mut client = Client::new(local, addr());

        let data: Vec<u8> = (0..READ_CHUNK_SIZE * 3 + 7).map(|i| i as u8).collect();
        let expected = data.clone();

        tokio::spawn(async move {
            remote.write_all(&data).await.unwrap();
        });

        assert_eq!(expected, client.read(expected.len()).await.unwrap());
    }

    #[tokio::test]
    async fn peer_hang_up() {
        let (local, mut remote) = duplex(64);
        let mut client = Client::new(local, addr());

        remote.write_all(b"ab").await.unwrap();
        drop(remote);

        assert!(matches!(
            client.read(3).await,
            Err(CloseConnection::PeerClosed)
        ));
        assert_eq!(0, client.stats().bytes_received);
    }

    #[tokio::test]
    async fn discard() {
        let (local, mut remote) = duplex(64);
        let mut client = Client::new(local, addr());

        remote.write_all(b"xxxxxok").await.unwrap();

        client.discard(5).await.unwrap();
        assert_eq!(b"ok".to_vec(), client.read(2).await.unwrap());
        assert_eq!(7, client.stats().bytes_received);
    }

    #[tokio::test]
    async fn choke_state() {
        let (local, mut remote) = duplex(64);
        let mut client = Client::new(local, addr());

        assert!(client.is_choked());

        client.unchoke().await.unwrap();
        assert!(!client.is_choked());

        client.choke().await.unwrap();
        assert!(client.is_choked());

        let mut buf = [0u8; 10];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!([0, 0, 0, 1, 1, 0, 0, 0, 1, 0], buf);

        client.add_data_sent(16384);
        assert_eq!(
            Stats {
                bytes_sent: 10,
                bytes_received: 0,
                data_sent: 16384,
            },
            client.stats()
        );
    }

    #[tokio::test]
    async fn accept() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();

        let remote = TcpStream::connect(server_addr).await.unwrap();
        let client = Client::accept(&listener).await.unwrap();

        assert_eq!(remote.local_addr().unwrap(), client.addr());
        assert!(client.peer_id().is_none());
        assert!(client.torrent().is_none());
    }
}
