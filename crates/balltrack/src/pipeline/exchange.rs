//! Bounded buffer exchange between the render thread and the analysis thread.
//!
//! A fixed pool of readback buffers circulates through two bounded queues: a
//! free queue seeded with the whole pool and a full queue that starts empty.
//! The producer blocks on the free queue when the analysis thread falls
//! behind, so backpressure raises frame latency but never corrupts a buffer:
//! each buffer is owned by exactly one side at any time and ownership only
//! changes hands through the queues. Dropping the producer disconnects the
//! full queue, which is how the analysis thread is woken for shutdown while
//! blocked on an empty queue.

use std::ops::{Deref, DerefMut};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Number of buffers in flight between the two threads.
pub const POOL_SIZE: usize = 4;

/// What a filled buffer contains, since both detectors share the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Ball,
    Field,
}

/// One pool slot: a fixed-capacity pixel buffer plus its tag.
pub struct PixelBuffer {
    pub kind: BufferKind,
    pub data: Vec<u8>,
}

/// Render-thread handle. Filling a buffer blocks until one is free.
pub struct Producer {
    free_rx: Receiver<PixelBuffer>,
    free_tx: Sender<PixelBuffer>,
    full_tx: Sender<PixelBuffer>,
}

/// Analysis-thread handle.
pub struct Consumer {
    full_rx: Receiver<PixelBuffer>,
    free_tx: Sender<PixelBuffer>,
}

/// A filled buffer on loan to the analysis thread; returns to the free pool
/// when dropped.
pub struct Loan {
    buffer: Option<PixelBuffer>,
    free_tx: Sender<PixelBuffer>,
}

/// Create an exchange with `pool_size` buffers of `buffer_len` bytes each.
pub fn exchange(pool_size: usize, buffer_len: usize) -> (Producer, Consumer) {
    let (free_tx, free_rx) = bounded(pool_size);
    let (full_tx, full_rx) = bounded(pool_size);
    for _ in 0..pool_size {
        free_tx
            .send(PixelBuffer {
                kind: BufferKind::Ball,
                data: vec![0u8; buffer_len],
            })
            .expect("seeding an empty bounded queue cannot fail");
    }
    (
        Producer {
            free_rx,
            free_tx: free_tx.clone(),
            full_tx,
        },
        Consumer { full_rx, free_tx },
    )
}

impl Producer {
    /// Claim a free buffer, fill it via `fill`, tag it and hand it to the
    /// analysis thread. Blocks while all buffers are in flight. If `fill`
    /// fails the buffer goes straight back to the free pool and the error is
    /// returned to the caller.
    pub fn submit<E>(
        &self,
        kind: BufferKind,
        fill: impl FnOnce(&mut [u8]) -> Result<(), E>,
    ) -> Result<(), SubmitError<E>> {
        let mut buffer = self
            .free_rx
            .recv()
            .map_err(|_| SubmitError::Disconnected)?;
        buffer.kind = kind;
        if let Err(err) = fill(&mut buffer.data) {
            let _ = self.free_tx.send(buffer);
            return Err(SubmitError::Fill(err));
        }
        self.full_tx
            .send(buffer)
            .map_err(|_| SubmitError::Disconnected)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitError<E> {
    /// The consumer side is gone; the pipeline is shutting down.
    Disconnected,
    /// The fill callback failed; the buffer was returned to the pool.
    Fill(E),
}

impl Consumer {
    /// Block until a filled buffer is available. Returns `None` once the
    /// producer has been dropped, which is the shutdown signal.
    pub fn take(&self) -> Option<Loan> {
        self.full_rx.recv().ok().map(|buffer| Loan {
            buffer: Some(buffer),
            free_tx: self.free_tx.clone(),
        })
    }

    /// Non-blocking variant used by tests.
    pub fn try_take(&self) -> Option<Loan> {
        self.full_rx.try_recv().ok().map(|buffer| Loan {
            buffer: Some(buffer),
            free_tx: self.free_tx.clone(),
        })
    }
}

impl Deref for Loan {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        self.buffer.as_ref().expect("loan accessed after drop")
    }
}

impl DerefMut for Loan {
    fn deref_mut(&mut self) -> &mut PixelBuffer {
        self.buffer.as_mut().expect("loan accessed after drop")
    }
}

impl Drop for Loan {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            // The producer may already be gone during shutdown.
            let _ = self.free_tx.send(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn buffers_arrive_in_order_with_their_kind() {
        let (producer, consumer) = exchange(POOL_SIZE, 4);
        producer
            .submit::<()>(BufferKind::Ball, |buf| {
                buf.copy_from_slice(&[1, 2, 3, 4]);
                Ok(())
            })
            .unwrap();
        producer
            .submit::<()>(BufferKind::Field, |buf| {
                buf.copy_from_slice(&[5, 6, 7, 8]);
                Ok(())
            })
            .unwrap();

        let first = consumer.take().unwrap();
        assert_eq!(first.kind, BufferKind::Ball);
        assert_eq!(first.data, vec![1, 2, 3, 4]);
        drop(first);

        let second = consumer.take().unwrap();
        assert_eq!(second.kind, BufferKind::Field);
        assert_eq!(second.data, vec![5, 6, 7, 8]);
    }

    #[test]
    fn failed_fill_returns_buffer_to_pool() {
        let (producer, consumer) = exchange(1, 4);
        let result = producer.submit(BufferKind::Ball, |_| Err("readback failed"));
        assert_eq!(result, Err(SubmitError::Fill("readback failed")));
        assert!(consumer.try_take().is_none());
        // The single buffer must be usable again.
        producer.submit::<()>(BufferKind::Field, |_| Ok(())).unwrap();
        assert!(consumer.take().is_some());
    }

    #[test]
    fn consumer_wakes_up_when_producer_drops() {
        let (producer, consumer) = exchange(POOL_SIZE, 4);
        let handle = thread::spawn(move || consumer.take().is_none());
        thread::sleep(Duration::from_millis(20));
        drop(producer);
        assert!(handle.join().unwrap());
    }

    /// Fast producer against a randomly delayed slow consumer: the producer
    /// must block rather than skip or corrupt buffers, and every submitted
    /// sequence number must arrive exactly once, in order.
    #[test]
    fn backpressure_preserves_every_buffer() {
        const TOTAL: u32 = 200;
        let (producer, consumer) = exchange(POOL_SIZE, 4);

        let consumer_handle = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut seen = Vec::with_capacity(TOTAL as usize);
            while let Some(loan) = consumer.take() {
                seen.push(u32::from_le_bytes(loan.data[..4].try_into().unwrap()));
                if rng.gen_bool(0.3) {
                    thread::sleep(Duration::from_micros(rng.gen_range(50..500)));
                }
            }
            seen
        });

        for seq in 0..TOTAL {
            producer
                .submit::<()>(BufferKind::Ball, |buf| {
                    buf[..4].copy_from_slice(&seq.to_le_bytes());
                    Ok(())
                })
                .unwrap();
        }
        drop(producer);

        let seen = consumer_handle.join().unwrap();
        assert_eq!(seen, (0..TOTAL).collect::<Vec<_>>());
    }
}
