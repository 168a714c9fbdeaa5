//! Bounded single-producer/single-consumer chunk queue.
//!
//! Overflow policy is drop-newest: when the queue is full the producer throws
//! the chunk it just captured away and bumps a shared counter. Capture never
//! blocks on the consumer, and the chunks already queued keep their order.

use super::chunk::AudioChunk;
use super::window::RollingWindow;
use crate::error::QueueOverflow;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared, monotonically increasing count of dropped chunks.
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Create a queue holding at most `capacity` chunks.
pub fn chunk_queue(capacity: usize) -> (ChunkProducer, ChunkConsumer) {
    let capacity = capacity.max(1);
    let (sender, receiver) = bounded(capacity);
    let dropped = DropCounter::new();
    (
        ChunkProducer {
            sender,
            dropped: dropped.clone(),
            capacity,
        },
        ChunkConsumer {
            receiver,
            dropped,
            capacity,
        },
    )
}

pub struct ChunkProducer {
    sender: Sender<AudioChunk>,
    dropped: DropCounter,
    capacity: usize,
}

impl ChunkProducer {
    /// Enqueue without blocking. A full queue drops `chunk`; a disconnected
    /// consumer is treated the same way since nobody is left to read it.
    pub fn offer(&self, chunk: AudioChunk) -> Result<(), QueueOverflow> {
        match self.sender.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(chunk)) | Err(TrySendError::Disconnected(chunk)) => {
                let total_dropped = self.dropped.increment();
                Err(QueueOverflow {
                    seq: chunk.seq(),
                    total_dropped,
                })
            }
        }
    }

    pub fn dropped(&self) -> &DropCounter {
        &self.dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

pub struct ChunkConsumer {
    receiver: Receiver<AudioChunk>,
    dropped: DropCounter,
    capacity: usize,
}

impl ChunkConsumer {
    /// Block until a chunk arrives, the producer goes away, or `timeout` passes.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<AudioChunk, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<AudioChunk, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Move every chunk that is already queued into `window`, in order.
    /// Returns how many were moved.
    pub fn drain_into(&self, window: &mut RollingWindow) -> usize {
        let mut moved = 0;
        while let Ok(chunk) = self.receiver.try_recv() {
            window.append(chunk);
            moved += 1;
        }
        moved
    }

    pub fn dropped(&self) -> &DropCounter {
        &self.dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
