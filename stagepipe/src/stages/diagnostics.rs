//! The diagnostic stream shared by all stages of a run.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// A clonable handle onto one diagnostic writer.
///
/// Every stage of a run holds the same handle, so writes from different
/// stages are serialized but may interleave at message granularity.
#[derive(Clone)]
pub struct Diagnostics {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl Diagnostics {
    /// Wraps `writer` as a shared diagnostic stream.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// A diagnostic stream that discards everything.
    #[must_use]
    pub fn sink() -> Self {
        Self::new(tokio::io::sink())
    }

    /// Writes `bytes` as one message.
    pub async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Writes `message` followed by a newline.
    pub async fn line(&self, message: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(message.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedBuffer;

    #[tokio::test]
    async fn test_clones_share_one_stream() {
        let buffer = SharedBuffer::new();
        let diagnostics = Diagnostics::new(buffer.clone());
        let other = diagnostics.clone();

        diagnostics.line("first").await.expect("write");
        other.write_all(b"second\n").await.expect("write");

        assert_eq!(buffer.contents_string(), "first\nsecond\n");
    }
}
