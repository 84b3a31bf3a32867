//! Outbound queue between the sample readers and the broadcaster.
//!
//! Any number of reader threads call [`OutboundQueue::push`]; the broadcaster
//! task alone calls [`OutboundQueue::drain`] or [`OutboundQueue::pop`].
//!
//! # Overflow policy
//!
//! A bounded queue never makes a producer wait.  When it is full, `push`
//! evicts the **oldest** queued message to make room and counts the loss in
//! [`OutboundQueue::dropped`].
//!
//! A capacity of `0` selects an unbounded queue that never drops.
//!
//! # Ordering
//!
//! FIFO overall, so messages from one producer come out in the order that
//! producer pushed them.  Messages from different producers interleave in
//! whatever order their pushes happened to land.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::{ArrayQueue, SegQueue};
use telemetry_core::Message;
use tracing::warn;

/// Default number of messages held before the oldest is evicted.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Slots {
    Bounded(ArrayQueue<Message>),
    Unbounded(SegQueue<Message>),
}

/// Lock-free multi-producer FIFO of messages awaiting broadcast.
pub struct OutboundQueue {
    slots: Slots,
    dropped: AtomicU64,
}

impl OutboundQueue {
    /// Creates a queue holding at most `capacity` messages, or an unbounded
    /// queue when `capacity` is `0`.
    pub fn new(capacity: usize) -> Self {
        let slots = if capacity == 0 {
            Slots::Unbounded(SegQueue::new())
        } else {
            Slots::Bounded(ArrayQueue::new(capacity))
        };
        Self {
            slots,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Appends `message`.  Never blocks and never fails.
    ///
    /// On a full bounded queue the oldest message is discarded.
    pub fn push(&self, message: Message) {
        match &self.slots {
            Slots::Unbounded(q) => q.push(message),
            Slots::Bounded(q) => {
                if let Some(evicted) = q.force_push(message) {
                    let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    // Log the first loss and every 100th after it.
                    if total == 1 || total % 100 == 0 {
                        warn!(
                            "outbound queue full ({} slots), dropped oldest {} message ({total} dropped so far)",
                            q.capacity(),
                            evicted.message_type()
                        );
                    }
                }
            }
        }
    }

    /// Removes and returns the oldest message, if any.
    pub fn pop(&self) -> Option<Message> {
        match &self.slots {
            Slots::Unbounded(q) => q.pop(),
            Slots::Bounded(q) => q.pop(),
        }
    }

    /// Removes every message queued at the moment of the call, oldest first.
    ///
    /// Messages pushed while draining are left for the next call, so a
    /// fast producer cannot keep the consumer here forever.
    pub fn drain(&self) -> Vec<Message> {
        let pending = self.len();
        let mut out = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.pop() {
                Some(message) => out.push(message),
                None => break,
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        match &self.slots {
            Slots::Unbounded(q) => q.len(),
            Slots::Bounded(q) => q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for an unbounded queue.
    pub fn capacity(&self) -> Option<usize> {
        match &self.slots {
            Slots::Unbounded(_) => None,
            Slots::Bounded(q) => Some(q.capacity()),
        }
    }

    /// Total messages evicted by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use telemetry_core::MessageType;

    use super::*;

    fn msg(tag: u8) -> Message {
        Message::new(MessageType::Gps, vec![tag])
    }

    #[test]
    fn test_pop_returns_messages_in_push_order() {
        // Arrange
        let queue = OutboundQueue::new(8);
        queue.push(msg(1));
        queue.push(msg(2));

        // Act / Assert
        assert_eq!(queue.pop(), Some(msg(1)));
        assert_eq!(queue.pop(), Some(msg(2)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_full_bounded_queue_drops_oldest() {
        // Arrange
        let queue = OutboundQueue::new(2);

        // Act
        queue.push(msg(1));
        queue.push(msg(2));
        queue.push(msg(3));

        // Assert
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec![msg(2), msg(3)]);
    }

    #[test]
    fn test_zero_capacity_selects_unbounded_queue() {
        let queue = OutboundQueue::new(0);
        for i in 0..5000u32 {
            queue.push(Message::new(MessageType::Orientation, i.to_be_bytes().to_vec()));
        }
        assert_eq!(queue.capacity(), None);
        assert_eq!(queue.len(), 5000);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_drain_empties_queue_and_next_drain_is_empty() {
        let queue = OutboundQueue::default();
        queue.push(msg(7));
        assert_eq!(queue.drain(), vec![msg(7)]);
        assert!(queue.drain().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        // Arrange – four producers, each tagging payloads with (producer, seq)
        let queue = Arc::new(OutboundQueue::unbounded());
        const PER_PRODUCER: u32 = 1000;

        // Act
        std::thread::scope(|s| {
            for producer in 0..4u8 {
                let queue = Arc::clone(&queue);
                s.spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        let mut payload = vec![producer];
                        payload.extend_from_slice(&seq.to_be_bytes());
                        queue.push(Message::new(MessageType::Gps, payload));
                    }
                });
            }
        });

        // Assert – each producer's sequence numbers come out strictly increasing
        let mut last_seen: [Option<u32>; 4] = [None; 4];
        let drained = queue.drain();
        assert_eq!(drained.len(), 4 * PER_PRODUCER as usize);
        for message in drained {
            let p = message.payload();
            let producer = p[0] as usize;
            let seq = u32::from_be_bytes([p[1], p[2], p[3], p[4]]);
            if let Some(prev) = last_seen[producer] {
                assert!(seq > prev, "producer {producer} reordered: {prev} then {seq}");
            }
            last_seen[producer] = Some(seq);
        }
    }
}
