use super::client::Client;
use super::error::CloseConnection;
use crate::constants::{HANDSHAKE_LENGTH_FOR_BITTORRENT_PROTOCOL, PSTR, PSTRLEN, RESERVED_LEN};
use crate::data_structures::{ID, ID_LEN};
use tokio::io::{AsyncRead, AsyncWrite};

const INFO_HASH_OFFSET: usize = 1 + PSTRLEN as usize + RESERVED_LEN;
const PEER_ID_OFFSET: usize = INFO_HASH_OFFSET + ID_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: ID,
    pub peer_id: ID,
}

impl Handshake {
    pub fn new(info_hash: &ID, peer_id: &ID) -> Self {
        Self {
            info_hash: info_hash.to_owned(),
            peer_id: peer_id.to_owned(),
        }
    }

    /// Reads the remote half of the handshake field by field. The protocol
    /// string is checked before anything after it is consumed.
    pub async fn receive<S>(client: &mut Client<S>) -> Result<Self, CloseConnection>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let pstrlen = client.read(1).await?[0];
        let protocol = client.read(pstrlen as usize).await?;

        if protocol != PSTR {
            return Err(CloseConnection::UnsupportedProtocol { protocol });
        }

        client.discard(RESERVED_LEN).await?;

        let info_hash = read_id(client).await?;
        let peer_id = read_id(client).await?;

        Ok(Self { info_hash, peer_id })
    }

    /// Reserved bytes are always zero, we support no extensions.
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LENGTH_FOR_BITTORRENT_PROTOCOL] {
        let mut buf = [0u8; HANDSHAKE_LENGTH_FOR_BITTORRENT_PROTOCOL];

        buf[0] = PSTRLEN;
        buf[1..=PSTRLEN as usize].copy_from_slice(PSTR);
        buf[INFO_HASH_OFFSET..PEER_ID_OFFSET].copy_from_slice(self.info_hash.as_byte_ref());
        buf[PEER_ID_OFFSET..].copy_from_slice(self.peer_id.as_byte_ref());

        buf
    }
}

async fn read_id<S>(client: &mut Client<S>) -> Result<ID, CloseConnection>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&client.read(ID_LEN).await?);

    Ok(ID::new(id))
}
