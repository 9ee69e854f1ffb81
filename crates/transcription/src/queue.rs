//! Bounded audio-chunk queue with drop-oldest overflow.
//!
//! Producers never block: when the queue is saturated the oldest chunk is
//! discarded to make room. The consumer pops with a short timeout so it
//! can observe session deactivation promptly.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use cs_domain::types::AudioChunk;

pub struct BoundedChunkQueue {
    inner: Mutex<VecDeque<AudioChunk>>,
    capacity: usize,
    notify: Notify,
}

impl BoundedChunkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Enqueue a chunk. Returns the dropped oldest chunk when the queue
    /// was already full.
    pub fn push(&self, chunk: AudioChunk) -> Option<AudioChunk> {
        let dropped = {
            let mut queue = self.inner.lock();
            let dropped = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(chunk);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Dequeue the next chunk, waiting up to `timeout`. Returns `None`
    /// on timeout so the worker can re-check its exit conditions.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<AudioChunk> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(chunk) = self.inner.lock().pop_front() {
                return Some(chunk);
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // One last non-blocking check: a producer may have pushed
                // between the lock release and the timeout firing.
                return self.inner.lock().pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> AudioChunk {
        AudioChunk::new(id, vec![0; 8], 0.0, 2.0)
    }

    #[test]
    fn overflow_drops_oldest_and_keeps_length() {
        let queue = BoundedChunkQueue::new(3);
        for i in 0..3 {
            assert!(queue.push(chunk(&format!("c{i}"))).is_none());
        }
        assert_eq!(queue.len(), 3);

        let dropped = queue.push(chunk("c3")).expect("oldest should drop");
        assert_eq!(dropped.chunk_id, "c0");
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn pop_returns_fifo_order() {
        let queue = BoundedChunkQueue::new(5);
        queue.push(chunk("a"));
        queue.push(chunk("b"));
        let first = queue.pop_timeout(Duration::from_millis(50)).await.unwrap();
        let second = queue.pop_timeout(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.chunk_id, "a");
        assert_eq!(second.chunk_id, "b");
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let queue = BoundedChunkQueue::new(2);
        let start = std::time::Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(30)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = std::sync::Arc::new(BoundedChunkQueue::new(2));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(chunk("late"));
        let got = consumer.await.unwrap().unwrap();
        assert_eq!(got.chunk_id, "late");
    }
}
