use openssl::sha;
use std::fmt;

pub const ID_LEN: usize = 20;

/// 20-byte identifier used on the wire both as info hash and as peer id.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ID([u8; ID_LEN]);

impl ID {
    pub const fn new(id_array: [u8; ID_LEN]) -> Self {
        Self(id_array)
    }

    pub fn from_sha1(data: &[u8]) -> Self {
        Self(sha::sha1(data))
    }

    pub fn as_byte_ref(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

// peer ids are mostly printable ("-PT0001-..."), info hashes never are
impl fmt::Debug for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rv = String::with_capacity(64);

        for chunk in self.0.chunks(4) {
            rv.push(' ');
            for byte in chunk {
                if byte.is_ascii_graphic() {
                    rv.push(*byte as char);
                } else {
                    rv.push_str(&format!("\\x{byte:02X?}"));
                }
            }
        }

        f.write_str(&rv[1..])
    }
}
