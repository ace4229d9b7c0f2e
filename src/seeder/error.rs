use crate::data_structures::ID;
use crate::transcoding::metainfo::BlockError;

/// Every condition that ends a peer session. The worker logs it and goes back
/// to accepting; none of these reach the supervisor.
pub enum CloseConnection {
    PeerClosed,
    Socket {
        source: std::io::Error,
    },
    UnsupportedProtocol {
        protocol: Vec<u8>,
    },
    UnknownInfoHash {
        info_hash: ID,
    },
    EnoughSeeders {
        info_hash: ID,
        seeders: u64,
    },
    UnsupportedMessage {
        id: u8,
    },
    MalformedRequest {
        payload_len: usize,
    },
    InvalidBlock {
        source: BlockError,
    },
    Persistence {
        source: anyhow::Error,
    },
    Encoding {
        source: bincode::Error,
    },
}

impl std::fmt::Debug for CloseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("PeerClosed"),
            Self::Socket { source } => f.debug_struct("Socket").field("source", source).finish(),
            Self::UnsupportedProtocol { protocol } => f
                .debug_struct("UnsupportedProtocol")
                .field("protocol", &String::from_utf8_lossy(protocol))
                .finish(),
            Self::UnknownInfoHash { info_hash } => f
                .debug_struct("UnknownInfoHash")
                .field("info_hash", info_hash)
                .finish(),
            Self::EnoughSeeders { info_hash, seeders } => f
                .debug_struct("EnoughSeeders")
                .field("info_hash", info_hash)
                .field("seeders", seeders)
                .finish(),
            Self::UnsupportedMessage { id } => f
                .debug_struct("UnsupportedMessage")
                .field("id", id)
                .finish(),
            Self::MalformedRequest { payload_len } => f
                .debug_struct("MalformedRequest")
                .field("payload_len", payload_len)
                .finish(),
            Self::InvalidBlock { source } => f
                .debug_struct("InvalidBlock")
                .field("source", source)
                .finish(),
            Self::Persistence { source } => f
                .debug_struct("Persistence")
                .field("source", source)
                .finish(),
            Self::Encoding { source } => f
                .debug_struct("Encoding")
                .field("source", source)
                .finish(),
        }
    }
}

impl std::fmt::Display for CloseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "client closed the connection"),
            Self::Socket { source } => write!(f, "socket failure: {source}"),
            Self::UnsupportedProtocol { .. } => write!(f, "unsupported protocol"),
            Self::UnknownInfoHash { info_hash } => write!(f, "unknown info hash {info_hash}"),
            Self::EnoughSeeders { seeders, .. } => {
                write!(f, "stop seeding, {seeders} others are seeding")
            }
            Self::UnsupportedMessage { id } => {
                write!(f, "protocol violation, unsupported message {id}")
            }
            Self::MalformedRequest { payload_len } => {
                write!(f, "protocol violation, request payload of {payload_len} bytes")
            }
            Self::InvalidBlock { source } => write!(f, "block request refused, {source}"),
            Self::Persistence { source } => write!(f, "persistence failure: {source}"),
            Self::Encoding { source } => write!(f, "message encoding failed: {source}"),
        }
    }
}

impl std::error::Error for CloseConnection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Socket { source } => Some(source),
            Self::InvalidBlock { source } => Some(source),
            Self::Persistence { source } => Some(source.as_ref()),
            Self::Encoding { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CloseConnection {
    fn from(source: std::io::Error) -> Self {
        Self::Socket { source }
    }
}

impl From<BlockError> for CloseConnection {
    fn from(source: BlockError) -> Self {
        Self::InvalidBlock { source }
    }
}

impl From<anyhow::Error> for CloseConnection {
    fn from(source: anyhow::Error) -> Self {
        Self::Persistence { source }
    }
}
