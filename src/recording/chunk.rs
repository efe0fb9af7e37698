use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Default)]
struct Chunks {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

/// Ordered store of encoded chunks
///
/// Shared between the collector task and the recorder, so whatever arrived
/// before a crash or a forced stop is still there to assemble.
#[derive(Clone, Default)]
pub struct ChunkBuffer {
    inner: Arc<Mutex<Chunks>>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Chunks> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk; empty chunks are skipped
    pub fn push(&self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return false;
        }

        let mut inner = self.lock();
        inner.total_bytes += chunk.len();
        inner.chunks.push(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    /// Concatenate every chunk in arrival order
    pub fn assemble(&self) -> Vec<u8> {
        let inner = self.lock();
        let mut data = Vec::with_capacity(inner.total_bytes);
        for chunk in &inner.chunks {
            data.extend_from_slice(chunk);
        }
        data
    }

    /// Drain the receiver into this buffer until the encoder closes it
    ///
    /// Returns the number of chunks appended.
    pub async fn collect(&self, mut chunk_rx: mpsc::Receiver<Vec<u8>>) -> usize {
        let mut appended = 0;

        while let Some(chunk) = chunk_rx.recv().await {
            if self.push(chunk) {
                appended += 1;
            }
        }

        debug!("Chunk stream closed after {} chunks", appended);
        appended
    }

    /// Run `collect` on its own task
    pub fn spawn_collector(&self, chunk_rx: mpsc::Receiver<Vec<u8>>) -> JoinHandle<usize> {
        let buffer = self.clone();
        info!("Starting chunk collection");
        tokio::spawn(async move { buffer.collect(chunk_rx).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_preserves_order_and_skips_empty() {
        let buffer = ChunkBuffer::new();
        let (tx, rx) = mpsc::channel(8);

        let handle = buffer.spawn_collector(rx);
        tx.send(b"one-".to_vec()).await.unwrap();
        tx.send(Vec::new()).await.unwrap();
        tx.send(b"two-".to_vec()).await.unwrap();
        tx.send(b"three".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_bytes(), 13);
        assert_eq!(buffer.assemble(), b"one-two-three".to_vec());
    }

    #[tokio::test]
    async fn test_partial_chunks_survive_aborted_collector() {
        let buffer = ChunkBuffer::new();
        let (tx, rx) = mpsc::channel(8);

        let handle = buffer.spawn_collector(rx);
        tx.send(vec![1, 2]).await.unwrap();
        tx.send(vec![3]).await.unwrap();

        while buffer.len() < 2 {
            tokio::task::yield_now().await;
        }
        handle.abort();

        assert_eq!(buffer.assemble(), vec![1, 2, 3]);
    }
}
