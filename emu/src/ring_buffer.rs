use std::collections::VecDeque;

/// Keeps the most recent `capacity` elements. Audio samples wait here until
/// the host drains them; a host that stops draining loses the oldest ones.
pub struct RingBuffer<T> {
    capacity: usize,
    buffer: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends `element`, dropping the oldest one when full.
    pub fn push(&mut self, element: T) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(element);
    }

    /// Removes every element, oldest first.
    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, T> {
        self.buffer.drain(..)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
