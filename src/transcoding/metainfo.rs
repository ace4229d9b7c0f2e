use crate::data_structures::ID;
use crate::fs::SingleFile;
use crate::unsigned_ceil_div;
use anyhow::{bail, Result};
use bendy::encoding::{AsString, SingleItemEncoder, ToBencode};
use std::fmt;
use std::path::Path;

const CREATED_BY: &str = "seeder";

#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub name: String,
    pub piece_length: u64,
    pub pieces: Vec<ID>,
    pub length: u64,
    pub private: bool,
}

/// Immutable description of one seeded file together with the handle used to
/// read its blocks.
#[derive(Debug, Clone)]
pub struct Torrent {
    pub info: Info,
    pub info_hash: ID,
    file: SingleFile,
}

#[derive(Debug)]
pub enum BlockError {
    InvalidPieceIndex(u32),
    InvalidBlockBoundary { begin: u32, length: u32 },
    Read(std::io::Error),
}

impl Torrent {
    pub fn new(file: SingleFile, info: Info) -> Result<Self> {
        if info.piece_length == 0 {
            bail!("invalid piece size: {}", info.piece_length);
        }

        let info_hash = ID::from_sha1(&info.to_bencode()?);

        Ok(Self {
            info,
            info_hash,
            file,
        })
    }

    /// Hashes `path` into pieces and builds the info dictionary for it.
    pub async fn from_file(path: impl AsRef<Path>, piece_length: u64, private: bool) -> Result<Self> {
        let file = SingleFile::new(path.as_ref());

        let pieces = file.hash_pieces(piece_length).await?;
        let info = Info {
            name: file.basename(),
            piece_length,
            length: file.size().await?,
            pieces,
            private,
        };

        Self::new(file, info)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn count_pieces(&self) -> u32 {
        self.info.number_of_pieces()
    }

    pub async fn read_block(&self, index: u32, begin: u32, length: u32) -> Result<Vec<u8>, BlockError> {
        if index >= self.count_pieces() {
            return Err(BlockError::InvalidPieceIndex(index));
        }

        if u64::from(begin) + u64::from(length) > self.info.piece_length {
            return Err(BlockError::InvalidBlockBoundary { begin, length });
        }

        let offset = u64::from(index) * self.info.piece_length + u64::from(begin);

        self.file
            .read_block(offset, length as usize)
            .await
            .map_err(BlockError::Read)
    }

    /// Bencoded `.torrent` file contents. Every tracker gets its own tier.
    pub fn to_metainfo(&self, announce: &[String]) -> Result<Vec<u8>> {
        let metainfo = Metainfo {
            announce,
            info: &self.info,
        };

        Ok(metainfo.to_bencode()?)
    }

    pub fn magnet_uri(&self, announce: &[String]) -> String {
        let mut magnet = format!("magnet:?xt=urn:btih:{}", self.info_hash.hex());

        for tracker in announce {
            magnet.push_str("&tr=");
            magnet.push_str(&urlencoding::encode(tracker));
        }

        magnet
    }
}

impl Info {
    pub fn number_of_pieces(&self) -> u32 {
        if self.length == 0 {
            0
        } else {
            unsigned_ceil_div!(self.length, self.piece_length) as u32
        }
    }
}

impl ToBencode for Info {
    const MAX_DEPTH: usize = 10;

    fn encode(&self, encoder: SingleItemEncoder) -> Result<(), bendy::encoding::Error> {
        let pieces: Vec<u8> = self
            .pieces
            .iter()
            .flat_map(|piece| piece.as_byte_ref().iter().copied())
            .collect();

        encoder.emit_dict(|mut e| {
            e.emit_pair(b"length", self.length)?;
            e.emit_pair(b"name", &self.name)?;
            e.emit_pair(b"piece length", self.piece_length)?;
            e.emit_pair(b"pieces", AsString(pieces))?;
            e.emit_pair(b"private", u8::from(self.private))
        })
    }
}

struct Metainfo<'a> {
    announce: &'a [String],
    info: &'a Info,
}

impl ToBencode for Metainfo<'_> {
    const MAX_DEPTH: usize = 10;

    fn encode(&self, encoder: SingleItemEncoder) -> Result<(), bendy::encoding::Error> {
        let tiers: Vec<Vec<String>> = self
            .announce
            .iter()
            .map(|tracker| vec![tracker.to_owned()])
            .collect();

        encoder.emit_dict(|mut e| {
            if let Some(first) = self.announce.first() {
                e.emit_pair(b"announce", first)?;
                e.emit_pair(b"announce-list", &tiers)?;
            }
            e.emit_pair(b"created by", &CREATED_BY.to_string())?;
            e.emit_pair(b"info", self.info)
        })
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::InvalidPieceIndex(index) => write!(f, "invalid piece index: {index}"),
            BlockError::InvalidBlockBoundary { begin, length } => {
                write!(f, "invalid block boundary: {begin}, {length}")
            }
            BlockError::Read(e) => write!(f, "block read failed: {e}"),
        }
    }
}

impl std::error::Error for BlockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlockError::Read(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Torrent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "info hash:\t{}\n\
            name:\t\t{}\n\
            path:\t\t{}\n\
            piece length:\t{}\n\
            piece count:\t{}\n\
            length:\t\t{}",
            self.info_hash,
            self.info.name,
            self.path().display(),
            self.info.piece_length,
            self.count_pieces(),
            self.info.length,
        )
    }
}
