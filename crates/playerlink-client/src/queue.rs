use std::collections::VecDeque;

use playerlink_frame::Message;

/// Default number of messages held while a request is in flight.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Bounded FIFO of messages that arrived while a request was waiting for
/// its reply.
///
/// When full, the oldest message is evicted to make room. Losing a stale
/// sample is preferred over blocking the request or growing without bound.
#[derive(Debug)]
pub struct PendingQueue {
    entries: VecDeque<Message>,
    capacity: usize,
}

impl PendingQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, returning the evicted oldest message if the queue
    /// was full.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<Message> {
        self.entries.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use playerlink_frame::{DeviceAddr, MessageHeader, MessageKind};
    use proptest::prelude::*;

    use super::*;

    fn message(seq: u16) -> Message {
        let header = MessageHeader::new(MessageKind::Data, DeviceAddr::new(5, 0), seq);
        Message::new(header, Bytes::copy_from_slice(&seq.to_be_bytes()))
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let mut queue = PendingQueue::new(4);
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn fifo_order() {
        let mut queue = PendingQueue::new(4);
        for seq in 0..3 {
            assert!(queue.push(message(seq)).is_none());
        }
        assert_eq!(queue.len(), 3);

        let order: Vec<u16> = std::iter::from_fn(|| queue.pop())
            .map(|m| m.header.subtype)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let mut queue = PendingQueue::new(2);
        queue.push(message(1));
        queue.push(message(2));

        let evicted = queue.push(message(3)).unwrap();
        assert_eq!(evicted.header.subtype, 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().header.subtype, 2);
        assert_eq!(queue.pop().unwrap().header.subtype, 3);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut queue = PendingQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(message(1));
        assert_eq!(queue.push(message(2)).unwrap().header.subtype, 1);
    }

    proptest! {
        #[test]
        fn overflow_keeps_last_capacity_entries(capacity in 1usize..16, extra in 1usize..16) {
            let mut queue = PendingQueue::new(capacity);
            let total = capacity + extra;
            let mut evicted = 0;
            for seq in 0..total {
                if queue.push(message(seq as u16)).is_some() {
                    evicted += 1;
                }
            }
            prop_assert_eq!(evicted, extra);
            prop_assert_eq!(queue.len(), capacity);

            let kept: Vec<u16> = std::iter::from_fn(|| queue.pop())
                .map(|m| m.header.subtype)
                .collect();
            let expected: Vec<u16> = (extra..total).map(|seq| seq as u16).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
