mod bitmap;
mod id;
mod no_size_bytes;

pub use bitmap::Bitmap;
pub use id::{ID, ID_LEN};
pub use no_size_bytes::NoSizeBytes;
