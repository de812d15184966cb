//! Byte stream adapters over backing media.
//!
//! The engine streams encrypted bytes through these adapters. The contract
//! is deliberately small: ordered, lossless transport with an unambiguous
//! end-of-stream signal.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use sable_common::{Error, Result};

/// Outcome of a single read from a blob stream.
///
/// A read never reports a count of zero: a zero-byte read from the backing
/// medium is translated to `Eof`, because the engine treats a zero count as
/// "try again" rather than end-of-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the front of the buffer; always `n > 0`.
    Data(usize),
    /// The stream is exhausted.
    Eof,
}

impl ReadOutcome {
    /// Number of bytes read, or None at end of stream.
    pub fn bytes(self) -> Option<usize> {
        match self {
            ReadOutcome::Data(n) => Some(n),
            ReadOutcome::Eof => None,
        }
    }
}

/// Readable byte source over a backing medium.
#[async_trait]
pub trait BlobRead: Send {
    /// Read up to `buf.len()` bytes into `buf`.
    ///
    /// # Postconditions
    /// - Returns `Data(n)` with `0 < n <= buf.len()`, or `Eof`
    ///
    /// # Errors
    /// - `State` if the stream has been closed
    /// - `Io` on backing-medium failure
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Release the underlying resource.
    ///
    /// Idempotent: closing an already-closed stream succeeds. After close,
    /// reads fail with a `State` error.
    async fn close(&mut self) -> Result<()>;
}

/// Writable byte sink over a backing medium.
#[async_trait]
pub trait BlobWrite: Send {
    /// Append the entire buffer at the current position.
    ///
    /// # Errors
    /// - `State` if the stream has been closed
    /// - `Io` on backing-medium failure
    async fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Force buffered bytes to the backing medium without closing.
    async fn flush(&mut self) -> Result<()>;

    /// Flush and release the underlying resource.
    ///
    /// Idempotent: closing an already-closed stream succeeds and does not
    /// disturb previously flushed data. After close, writes fail with a
    /// `State` error.
    async fn close(&mut self) -> Result<()>;
}

/// File-backed readable stream.
///
/// Construction fails if the file cannot be opened, so a degraded adapter
/// whose reads silently do nothing cannot exist.
pub struct FileReader {
    file: Option<File>,
}

impl FileReader {
    /// Open a file for reading.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self { file: Some(file) })
    }
}

#[async_trait]
impl BlobRead for FileReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::State("read from closed stream".to_string()))?;

        let n = file.read(buf).await?;
        if n == 0 {
            Ok(ReadOutcome::Eof)
        } else {
            Ok(ReadOutcome::Data(n))
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.file.take();
        Ok(())
    }
}

/// File-backed writable stream.
pub struct FileWriter {
    file: Option<File>,
}

impl FileWriter {
    /// Create (or truncate) a file for writing.
    ///
    /// # Errors
    /// - `Io` if the file cannot be created
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref()).await?;
        Ok(Self { file: Some(file) })
    }

    /// Open a file for appending, creating it if absent.
    pub async fn append(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self { file: Some(file) })
    }
}

#[async_trait]
impl BlobWrite for FileWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::State("write to closed stream".to_string()))?;
        file.write_all(buf).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.bin");
        let data = b"ordered, lossless transport".to_vec();

        let mut writer = FileWriter::create(&path).await.unwrap();
        writer.write(&data).await.unwrap();
        writer.close().await.unwrap();

        let mut reader = FileReader::open(&path).await.unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 8];
        loop {
            match reader.read(&mut buf).await.unwrap() {
                ReadOutcome::Data(n) => {
                    assert!(n > 0);
                    out.extend_from_slice(&buf[..n]);
                }
                ReadOutcome::Eof => break,
            }
        }
        reader.close().await.unwrap();

        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_empty_file_reads_eof_not_zero() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.bin");

        let mut writer = FileWriter::create(&path).await.unwrap();
        writer.close().await.unwrap();

        let mut reader = FileReader::open(&path).await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Eof);
        // Repeated reads keep reporting Eof.
        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Eof);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.bin");

        let mut writer = FileWriter::create(&path).await.unwrap();
        writer.write(b"data").await.unwrap();
        writer.close().await.unwrap();
        writer.close().await.unwrap();

        let mut reader = FileReader::open(&path).await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Data(4));
        reader.close().await.unwrap();
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_use_after_close_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.bin");

        let mut writer = FileWriter::create(&path).await.unwrap();
        writer.close().await.unwrap();
        assert!(matches!(writer.write(b"late").await, Err(Error::State(_))));

        let mut reader = FileReader::open(&path).await.unwrap();
        reader.close().await.unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(reader.read(&mut buf).await, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = FileReader::open(temp.path().join("nope.bin")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_append_continues_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.bin");

        let mut writer = FileWriter::create(&path).await.unwrap();
        writer.write(b"first ").await.unwrap();
        writer.close().await.unwrap();

        let mut writer = FileWriter::append(&path).await.unwrap();
        writer.write(b"second").await.unwrap();
        writer.close().await.unwrap();

        let mut reader = FileReader::open(&path).await.unwrap();
        let mut buf = [0u8; 32];
        let ReadOutcome::Data(n) = reader.read(&mut buf).await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(&buf[..n], b"first second");
    }
}
