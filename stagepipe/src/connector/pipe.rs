//! A synchronous, unbuffered in-memory byte pipe.
//!
//! A write is handed to the reader directly; it completes only once the reader
//! has consumed bytes from it. Either side may be closed independently, and
//! the write side may be closed with an error that the reader then observes.

use parking_lot::Mutex;
use std::error::Error;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Errors surfaced by connector ends.
#[derive(Debug, Clone, Error)]
pub enum PipeError {
    /// The other end (or this one) has been closed.
    #[error("read/write on closed connector")]
    Closed,

    /// The writer closed the connector with an error.
    #[error("upstream failed: {0}")]
    Upstream(#[source] Arc<dyn Error + Send + Sync>),
}

impl PipeError {
    fn into_io(self) -> io::Error {
        let kind = match self {
            Self::Closed => io::ErrorKind::BrokenPipe,
            Self::Upstream(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, self)
    }
}

#[derive(Debug)]
enum WriteClosed {
    Eof,
    Failed(Arc<dyn Error + Send + Sync>),
}

#[derive(Debug)]
struct Handoff {
    data: Vec<u8>,
    consumed: usize,
}

impl Handoff {
    fn remaining(&self) -> &[u8] {
        &self.data[self.consumed..]
    }
}

#[derive(Debug, Default)]
struct State {
    handoff: Option<Handoff>,
    read_closed: bool,
    write_closed: Option<WriteClosed>,
    reader_waker: Option<Waker>,
    writer_waker: Option<Waker>,
}

impl State {
    fn wake_all(&mut self) {
        if let Some(waker) = self.reader_waker.take() {
            waker.wake();
        }
        if let Some(waker) = self.writer_waker.take() {
            waker.wake();
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn close_read(&self) {
        let mut state = self.state.lock();
        state.read_closed = true;
        state.handoff = None;
        state.wake_all();
    }

    fn close_write(&self, closed: WriteClosed) {
        let mut state = self.state.lock();
        if state.write_closed.is_none() {
            state.write_closed = Some(closed);
        }
        state.wake_all();
    }
}

/// Creates one connector and returns its read and write ends.
#[must_use]
pub fn pipe() -> (PipeReader, PipeWriter) {
    let shared = Arc::new(Shared::default());
    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter { shared },
    )
}

/// The read end of a connector. Dropping it closes the read side.
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Closes the read side; blocked and future writes fail with [`PipeError::Closed`].
    pub fn close(&self) {
        self.shared.close_read();
    }

    /// Returns a control handle onto this connector.
    #[must_use]
    pub fn handle(&self) -> ConnectorHandle {
        ConnectorHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        if state.read_closed {
            return Poll::Ready(Err(PipeError::Closed.into_io()));
        }

        if let Some(handoff) = state.handoff.as_mut() {
            let remaining = handoff.remaining();
            if !remaining.is_empty() {
                let n = remaining.len().min(buf.remaining());
                buf.put_slice(&remaining[..n]);
                handoff.consumed += n;
                if let Some(waker) = state.writer_waker.take() {
                    waker.wake();
                }
                return Poll::Ready(Ok(()));
            }
        }

        match &state.write_closed {
            Some(WriteClosed::Eof) => Poll::Ready(Ok(())),
            Some(WriteClosed::Failed(cause)) => {
                Poll::Ready(Err(PipeError::Upstream(Arc::clone(cause)).into_io()))
            }
            None => {
                state.reader_waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.close_read();
    }
}

/// The write end of a connector. Dropping it closes the write side.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Closes the write side; the reader sees end-of-stream once pending bytes drain.
    pub fn close(&self) {
        self.shared.close_write(WriteClosed::Eof);
    }

    /// Closes the write side with `cause`; the reader fails with [`PipeError::Upstream`].
    pub fn close_with_error(&self, cause: Arc<dyn Error + Send + Sync>) {
        self.shared.close_write(WriteClosed::Failed(cause));
    }

    /// Returns a control handle onto this connector.
    #[must_use]
    pub fn handle(&self) -> ConnectorHandle {
        ConnectorHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        if state.read_closed || state.write_closed.is_some() {
            state.handoff = None;
            return Poll::Ready(Err(PipeError::Closed.into_io()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        // A pending hand-off may belong to an abandoned write; only the bytes
        // the reader already took from a prefix of `buf` count for this call.
        match state.handoff.as_mut() {
            Some(handoff)
                if handoff.consumed > 0 && buf.starts_with(&handoff.data[..handoff.consumed]) =>
            {
                let consumed = handoff.consumed;
                // Unconsumed tail is dropped; the caller resubmits it.
                state.handoff = None;
                Poll::Ready(Ok(consumed))
            }
            Some(handoff) if handoff.consumed == 0 => {
                if handoff.data != buf {
                    handoff.data = buf.to_vec();
                }
                state.writer_waker = Some(cx.waker().clone());
                Poll::Pending
            }
            // No hand-off yet, or an abandoned write was partly delivered.
            _ => {
                state.handoff = Some(Handoff {
                    data: buf.to_vec(),
                    consumed: 0,
                });
                state.writer_waker = Some(cx.waker().clone());
                if let Some(waker) = state.reader_waker.take() {
                    waker.wake();
                }
                Poll::Pending
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.close_write(WriteClosed::Eof);
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.close_write(WriteClosed::Eof);
    }
}

/// A clonable control handle onto a connector.
///
/// It can close either side but cannot read or write, so the I/O ends stay
/// exclusively owned by their stages.
#[derive(Debug, Clone)]
pub struct ConnectorHandle {
    shared: Arc<Shared>,
}

impl ConnectorHandle {
    /// Force-closes the read side, unblocking a writer stuck in a hand-off.
    pub fn close_read(&self) {
        self.shared.close_read();
    }

    /// Closes the write side with `cause` unless it is already closed.
    pub fn close_write_with_error(&self, cause: Arc<dyn Error + Send + Sync>) {
        self.shared.close_write(WriteClosed::Failed(cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_test::{assert_pending, assert_ready};

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct DiskOnFire;

    #[tokio::test]
    async fn test_write_waits_for_reader() {
        let (mut reader, mut writer) = pipe();

        let mut write = tokio_test::task::spawn(async move {
            writer.write_all(b"hello").await
        });
        assert_pending!(write.poll());

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"hello");

        assert!(write.is_woken());
        assert_ready!(write.poll()).expect("write completes");
    }

    #[tokio::test]
    async fn test_abandoned_write_is_replaced() {
        let (mut reader, mut writer) = pipe();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), writer.write(b"abc")).await;
        assert!(abandoned.is_err());

        let (written, read) = tokio::join!(writer.write(b"xyz"), async {
            let mut buf = [0u8; 8];
            let n = reader.read(&mut buf).await.expect("read");
            buf[..n].to_vec()
        });
        assert_eq!(written.expect("write"), 3);
        assert_eq!(read, b"xyz");
    }

    #[tokio::test]
    async fn test_partly_delivered_abandoned_write_is_not_credited() {
        let (mut reader, mut writer) = pipe();

        let mut first = tokio_test::task::spawn(async { writer.write(b"abc").await });
        assert_pending!(first.poll());
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"a");
        drop(first);

        let (written, read) = tokio::join!(writer.write(b"xyz"), async {
            let mut buf = [0u8; 8];
            let n = reader.read(&mut buf).await.expect("read");
            buf[..n].to_vec()
        });
        assert_eq!(written.expect("write"), 3);
        assert_eq!(read, b"xyz");
    }

    #[tokio::test]
    async fn test_partial_reads_complete_write_all() {
        let (mut reader, mut writer) = pipe();

        let write = tokio::spawn(async move { writer.write_all(b"abcdefgh").await });

        let mut out = Vec::new();
        let mut chunk = [0u8; 3];
        while out.len() < 8 {
            let n = reader.read(&mut chunk).await.expect("read");
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, b"abcdefgh");
        write.await.expect("join").expect("write");
    }

    #[tokio::test]
    async fn test_close_write_gives_eof() {
        let (mut reader, writer) = pipe();
        writer.close();

        let mut buf = Vec::new();
        let n = reader.read_to_end(&mut buf).await.expect("eof is not an error");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_drop_writer_gives_eof() {
        let (mut reader, mut writer) = pipe();
        let write = tokio::spawn(async move {
            writer.write_all(b"last").await?;
            drop(writer);
            Ok::<_, io::Error>(())
        });

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.expect("read");
        assert_eq!(buf, b"last");
        write.await.expect("join").expect("write");
    }

    #[tokio::test]
    async fn test_closed_reader_unblocks_writer() {
        let (reader, mut writer) = pipe();
        let handle = reader.handle();

        let write = tokio::spawn(async move { writer.write_all(b"never read").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.close_read();

        let err = tokio::time::timeout(Duration::from_secs(1), write)
            .await
            .expect("writer unblocked")
            .expect("join")
            .expect_err("write on closed connector");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(matches!(
            err.get_ref().and_then(|e| e.downcast_ref::<PipeError>()),
            Some(PipeError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_read_after_close_read_fails() {
        let (mut reader, _writer) = pipe();
        reader.close();

        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).await.expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_close_with_error_reaches_reader() {
        let (mut reader, writer) = pipe();
        writer.close_with_error(Arc::new(DiskOnFire));

        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).await.expect_err("propagated");
        assert_eq!(err.kind(), io::ErrorKind::Other);
        let pipe_err = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<PipeError>())
            .expect("pipe error");
        assert_eq!(pipe_err.to_string(), "upstream failed: disk on fire");
        assert_eq!(
            pipe_err.source().map(ToString::to_string),
            Some("disk on fire".to_string())
        );
    }

    #[tokio::test]
    async fn test_first_close_wins() {
        let (mut reader, writer) = pipe();
        let handle = writer.handle();

        handle.close_write_with_error(Arc::new(DiskOnFire));
        writer.close();
        drop(writer);

        let mut buf = [0u8; 1];
        assert!(reader.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (_reader, mut writer) = pipe();
        writer.shutdown().await.expect("shutdown");
        writer.shutdown().await.expect("second shutdown is a no-op");

        let err = writer.write_all(b"x").await.expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
