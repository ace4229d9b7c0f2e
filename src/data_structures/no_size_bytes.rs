use bytes::Bytes;

/// Raw payload bytes that go on the wire without their own length prefix.
#[derive(Debug, PartialEq, Clone)]
pub struct NoSizeBytes(Bytes);

impl NoSizeBytes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &u8> {
        self.0.iter()
    }
}

impl From<Vec<u8>> for NoSizeBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&[u8]> for NoSizeBytes {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}
