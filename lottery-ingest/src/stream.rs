//! Exact-length reads and writes over any duplex byte channel.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Wraps a transport so every read returns exactly the requested number of
/// bytes and every write delivers the whole buffer.
///
/// Works for `TcpStream`, its split halves, or `tokio::io::duplex` in tests.
pub struct Stream<T> {
    inner: T,
}

impl<T> Stream<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T> Stream<T>
where
    T: AsyncRead + Unpin,
{
    /// Reads exactly `n` bytes, looping over short reads.
    pub async fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; n];
        let mut received = 0;
        while received < n {
            let read = self.inner.read(&mut buf[received..]).await?;
            if read == 0 {
                return Err(TransportError::Closed {
                    expected: n,
                    received,
                });
            }
            received += read;
        }
        Ok(buf)
    }
}

impl<T> Stream<T>
where
    T: AsyncWrite + Unpin,
{
    /// Writes the whole buffer and flushes it.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flushes and closes the write side of the transport.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_collects_bytes_split_across_writes() {
        // A tiny duplex buffer forces the reader to observe partial chunks.
        let (client, server) = tokio::io::duplex(3);
        let mut writer = Stream::new(client);
        let mut reader = Stream::new(server);

        let write = tokio::spawn(async move {
            writer.write(b"hello world").await.expect("write");
        });

        let bytes = reader.read(11).await.expect("read");
        assert_eq!(bytes, b"hello world");
        write.await.expect("writer task");
    }

    #[tokio::test]
    async fn read_fails_when_peer_closes_early() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = Stream::new(client);
        let mut reader = Stream::new(server);

        writer.write(b"abc").await.expect("write");
        drop(writer);

        let err = reader.read(5).await.expect_err("short read must fail");
        assert!(matches!(
            err,
            TransportError::Closed {
                expected: 5,
                received: 3
            }
        ));
    }

    #[tokio::test]
    async fn write_fails_once_the_peer_is_gone() {
        let (client, server) = tokio::io::duplex(4);
        let mut writer = Stream::new(client);
        drop(server);

        let err = writer.write(b"hello").await.expect_err("peer dropped");
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn zero_length_read_returns_empty() {
        let (_client, server) = tokio::io::duplex(8);
        let mut reader = Stream::new(server);
        assert!(reader.read(0).await.expect("read").is_empty());
    }
}
