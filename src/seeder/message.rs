use crate::data_structures::{Bitmap, NoSizeBytes};
use bincode::Options;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

pub const BYTES_IN_LEN_PREFIX: usize = 4;
pub const BYTES_IN_ID: usize = 1;
pub const REQUEST_PAYLOAD_LEN: usize = 12;

#[cfg(test)]
const CHOKE_LEN: u32 = 1;
const UNCHOKE_LEN: u32 = 1;
const BITFIELD_LEN: u32 = 1;
const PIECE_LEN: u32 = 9;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

/// What the 4-byte length prefix (and, if present, the id byte) of an incoming
/// frame says is coming next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    KeepAlive,
    Message { id: MessageId, payload_len: usize },
}

/// Everything a seeder ever sends.
#[derive(Debug, PartialEq)]
pub enum Message {
    #[cfg(test)]
    Choke,
    Unchoke,
    Bitfield(NoSizeBytes),
    Piece(Piece),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Request {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Piece {
    pub index: u32,
    pub begin: u32,
    pub block: NoSizeBytes,
}

macro_rules! u32_from_be_slice {
    ($slice:expr) => {
        (($slice[0] as u32) << 24)
            + (($slice[1] as u32) << 16)
            + (($slice[2] as u32) << 8)
            + ($slice[3] as u32)
    };
}

pub fn len(buf: &[u8]) -> usize {
    u32_from_be_slice!(buf[0..BYTES_IN_LEN_PREFIX]) as usize
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Choke),
            1 => Ok(Self::Unchoke),
            2 => Ok(Self::Interested),
            3 => Ok(Self::NotInterested),
            4 => Ok(Self::Have),
            5 => Ok(Self::Bitfield),
            6 => Ok(Self::Request),
            7 => Ok(Self::Piece),
            8 => Ok(Self::Cancel),
            unsupported => Err(unsupported),
        }
    }
}

impl Header {
    /// `len` is the decoded length prefix, `id` the byte that follows it when `len > 0`.
    pub fn new(len: usize, id: u8) -> Result<Self, u8> {
        Ok(Self::Message {
            id: MessageId::try_from(id)?,
            payload_len: len - BYTES_IN_ID,
        })
    }
}

impl Request {
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != REQUEST_PAYLOAD_LEN {
            return None;
        }

        Some(Self {
            index: u32_from_be_slice!(payload[0..]),
            begin: u32_from_be_slice!(payload[4..]),
            length: u32_from_be_slice!(payload[8..]),
        })
    }
}

impl Message {
    pub fn bitfield(bitmap: &Bitmap) -> Self {
        Self::Bitfield(NoSizeBytes::from(bitmap.as_bytes()))
    }

    pub fn into_bytes(self) -> bincode::Result<Vec<u8>> {
        bincode::DefaultOptions::new()
            .with_big_endian()
            .with_fixint_encoding()
            .serialize(&self)
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            #[cfg(test)]
            Message::Choke => {
                let mut tup = serializer.serialize_tuple(2)?;
                tup.serialize_element(&CHOKE_LEN)?;
                tup.serialize_element(&(MessageId::Choke as u8))?;
                tup.end()
            }
            Message::Unchoke => {
                let mut tup = serializer.serialize_tuple(2)?;
                tup.serialize_element(&UNCHOKE_LEN)?;
                tup.serialize_element(&(MessageId::Unchoke as u8))?;
                tup.end()
            }
            Message::Bitfield(bitfield) => {
                let mut tup = serializer.serialize_tuple(bitfield.len() + 2)?;
                tup.serialize_element(&(BITFIELD_LEN + bitfield.len() as u32))?;
                tup.serialize_element(&(MessageId::Bitfield as u8))?;
                for byte in bitfield.iter() {
                    tup.serialize_element(byte)?;
                }
                tup.end()
            }
            Message::Piece(piece) => {
                let mut tup = serializer.serialize_tuple(piece.len() + 4)?;
                tup.serialize_element(&(PIECE_LEN + piece.len() as u32))?;
                tup.serialize_element(&(MessageId::Piece as u8))?;
                tup.serialize_element(&piece.index)?;
                tup.serialize_element(&piece.begin)?;
                for byte in piece.block.iter() {
                    tup.serialize_element(byte)?;
                }
                tup.end()
            }
        }
    }
}

impl Piece {
    pub fn new(index: u32, begin: u32, block: Vec<u8>) -> Piece {
        Piece {
            index,
            begin,
            block: NoSizeBytes::from(block),
        }
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }
}
