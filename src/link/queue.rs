//! Bounded parameter request mailbox
//!
//! Pure data structure: no locking of its own. The command assembler keeps
//! it inside the same exclusion scope as the frame buffer so a compound
//! command (enqueue + field reset) is seen by the cycle engine all at once.

use crate::codec::ParameterRequest;
use std::collections::VecDeque;

/// FIFO of out-of-band parameter requests with drop-oldest overflow
#[derive(Debug)]
pub struct ParameterQueue {
    entries: VecDeque<ParameterRequest>,
    capacity: usize,
}

impl ParameterQueue {
    /// Create a queue holding at most `capacity` requests
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a request, evicting the oldest one when full
    ///
    /// Never blocks and never rejects the new request. Returns the evicted
    /// request, if any.
    pub fn enqueue(&mut self, request: ParameterRequest) -> Option<ParameterRequest> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(request);
        evicted
    }

    /// Pop the oldest request, or the `Free` sentinel when empty
    pub fn dequeue_or_free(&mut self) -> ParameterRequest {
        self.entries.pop_front().unwrap_or(ParameterRequest::FREE)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything (connection teardown)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FunctionCode;
    use crate::constants::QUEUE_CAPACITY;
    use proptest::prelude::*;

    fn req(value: i32) -> ParameterRequest {
        ParameterRequest::new(FunctionCode::Write, 3, 0, 0, value)
    }

    fn drain(queue: &mut ParameterQueue) -> Vec<i32> {
        let mut out = Vec::new();
        while !queue.is_empty() {
            out.push(queue.dequeue_or_free().value);
        }
        out
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = ParameterQueue::new(QUEUE_CAPACITY);
        for i in 0..10 {
            assert!(queue.enqueue(req(i)).is_none());
        }
        assert_eq!(drain(&mut queue), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = ParameterQueue::new(QUEUE_CAPACITY);
        let mut evicted = Vec::new();
        for i in 0..105 {
            if let Some(old) = queue.enqueue(req(i)) {
                evicted.push(old.value);
            }
        }
        assert_eq!(queue.len(), 100);
        assert_eq!(evicted, vec![0, 1, 2, 3, 4]);
        assert_eq!(drain(&mut queue), (5..105).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_returns_free_repeatedly() {
        let mut queue = ParameterQueue::new(4);
        for _ in 0..3 {
            let free = queue.dequeue_or_free();
            assert!(free.is_free());
            assert_eq!(free, ParameterRequest::FREE);
        }
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn test_clear() {
        let mut queue = ParameterQueue::new(4);
        queue.enqueue(req(1));
        queue.enqueue(req(2));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.dequeue_or_free().is_free());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity_and_keeps_newest(values in proptest::collection::vec(any::<i32>(), 0..300)) {
            let mut queue = ParameterQueue::new(QUEUE_CAPACITY);
            for v in &values {
                queue.enqueue(req(*v));
                prop_assert!(queue.len() <= QUEUE_CAPACITY);
            }
            let skip = values.len().saturating_sub(QUEUE_CAPACITY);
            prop_assert_eq!(drain(&mut queue), values[skip..].to_vec());
        }
    }
}
