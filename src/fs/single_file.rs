use crate::data_structures::ID;
use anyhow::{bail, Result};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read-only view of the single file backing a torrent.
#[derive(Debug, Clone)]
pub struct SingleFile {
    path: PathBuf,
}

impl SingleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Reads exactly `length` bytes starting at the absolute `offset`.
    pub async fn read_block(&self, offset: u64, length: usize) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(&self.path).await?;

        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf).await?;

        Ok(buf)
    }

    /// SHA-1 of every `piece_length` slice of the file, the last one possibly shorter.
    pub async fn hash_pieces(&self, piece_length: u64) -> Result<Vec<ID>> {
        if piece_length == 0 {
            bail!("invalid piece length: {}", piece_length);
        }

        let mut file = File::open(&self.path).await?;
        let mut buf = vec![0u8; piece_length as usize];
        let mut pieces = Vec::new();

        loop {
            let filled = read_up_to(&mut file, &mut buf).await?;
            if filled == 0 {
                break;
            }

            pieces.push(ID::from_sha1(&buf[..filled]));

            if filled < buf.len() {
                break;
            }
        }

        Ok(pieces)
    }

    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

async fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::SingleFile;
    use crate::data_structures::ID;
    use openssl::sha;
    use rand::RngCore;
    use tokio::fs::{remove_file, DirBuilder};

    const PATH: &str = "single_file_test";

    async fn with_file(name: &str, data: &[u8]) -> SingleFile {
        DirBuilder::new()
            .recursive(true)
            .create(PATH)
            .await
            .unwrap();

        let path = format!("{PATH}/{name}");
        tokio::fs::write(&path, data).await.unwrap();

        SingleFile::new(path)
    }

    #[tokio::test]
    async fn read_blocks() {
        let file = with_file("read_blocks", b"abcdef").await;

        assert_eq!(b"b".to_vec(), file.read_block(1, 1).await.unwrap());
        assert_eq!(b"cdef".to_vec(), file.read_block(2, 4).await.unwrap());
        assert!(file.read_block(5, 2).await.is_err());
        assert_eq!(6, file.size().await.unwrap());
        assert_eq!("read_blocks", file.basename());

        remove_file(file.path()).await.unwrap();
    }

    #[tokio::test]
    async fn hash_pieces_with_short_last_piece() {
        let mut data = vec![0u8; 3 * 1024 + 100];
        rand::thread_rng().fill_bytes(&mut data);

        let file = with_file("hash_pieces", &data).await;

        let pieces = file.hash_pieces(1024).await.unwrap();

        assert_eq!(4, pieces.len());
        for (piece, chunk) in pieces.iter().zip(data.chunks(1024)) {
            assert_eq!(ID::new(sha::sha1(chunk)), *piece);
        }

        remove_file(file.path()).await.unwrap();
    }

    #[tokio::test]
    async fn hash_pieces_rejects_zero_piece_length() {
        let file = with_file("zero_piece_length", b"abc").await;

        assert!(file.hash_pieces(0).await.is_err());

        remove_file(file.path()).await.unwrap();
    }
}
