//! Connectors between adjacent stages.
//!
//! This module provides:
//! - `pipe`, a synchronous unbuffered byte connector with separately owned ends
//! - `ConnectorHandle` for closing a connector without owning its ends
//! - `Fabric`, the N-1 connectors of an N-stage pipeline

mod pipe;

pub use pipe::{pipe, ConnectorHandle, PipeError, PipeReader, PipeWriter};

/// The connectors of one pipeline run.
///
/// Connector `i` links stage `i` (writer) to stage `i + 1` (reader).
#[derive(Debug)]
pub struct Fabric {
    readers: Vec<PipeReader>,
    writers: Vec<PipeWriter>,
    handles: Vec<ConnectorHandle>,
}

impl Fabric {
    /// Allocates `stage_count - 1` connectors (none for zero or one stage).
    #[must_use]
    pub fn allocate(stage_count: usize) -> Self {
        let count = stage_count.saturating_sub(1);
        let mut readers = Vec::with_capacity(count);
        let mut writers = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            let (reader, writer) = pipe();
            handles.push(reader.handle());
            readers.push(reader);
            writers.push(writer);
        }
        Self {
            readers,
            writers,
            handles,
        }
    }

    /// Returns the number of connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if the fabric holds no connectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Splits the fabric into read ends, write ends and control handles,
    /// each in connector order.
    #[must_use]
    pub fn into_parts(self) -> (Vec<PipeReader>, Vec<PipeWriter>, Vec<ConnectorHandle>) {
        (self.readers, self.writers, self.handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_n_minus_one() {
        assert_eq!(Fabric::allocate(0).len(), 0);
        assert!(Fabric::allocate(1).is_empty());
        assert_eq!(Fabric::allocate(4).len(), 3);
    }

    #[tokio::test]
    async fn test_parts_are_linked_in_order() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (readers, writers, handles) = Fabric::allocate(3).into_parts();
        assert_eq!((readers.len(), writers.len(), handles.len()), (2, 2, 2));

        let mut readers = readers.into_iter();
        let mut writers = writers.into_iter();
        let (Some(_r0), Some(mut r1)) = (readers.next(), readers.next()) else {
            panic!("two readers");
        };
        let (Some(_w0), Some(mut w1)) = (writers.next(), writers.next()) else {
            panic!("two writers");
        };

        let write = tokio::spawn(async move {
            w1.write_all(b"x").await?;
            w1.shutdown().await
        });
        let mut buf = Vec::new();
        r1.read_to_end(&mut buf).await.expect("read");
        assert_eq!(buf, b"x");
        write.await.expect("join").expect("write");
    }
}
