use heapless::Deque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    Empty,
}

/// Queue usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStats {
    pub puts: u32,
    pub gets: u32,
    pub overflows: u32,
    /// Maximal number of items observed in the queue
    pub high_water: usize,
}

/// Fixed capacity FIFO that never rejects an item
///
/// When the queue is full, `put` drops the oldest item to make room and counts an overflow.
pub struct RingQueue<T, const N: usize> {
    items: Deque<T, N>,
    stats: QueueStats,
}

impl<T, const N: usize> RingQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
            stats: QueueStats {
                puts: 0,
                gets: 0,
                overflows: 0,
                high_water: 0,
            },
        }
    }

    pub fn put(&mut self, item: T) {
        if self.items.is_full() {
            self.items.pop_front();
            self.stats.overflows = self.stats.overflows.wrapping_add(1);
            warn!("Action queue overflow, oldest item dropped");
        }
        // Room is guaranteed by the check above
        if self.items.push_back(item).is_err() {
            unreachable!();
        }
        self.stats.puts = self.stats.puts.wrapping_add(1);
        self.stats.high_water = self.stats.high_water.max(self.items.len());
    }

    pub fn pop(&mut self) -> Result<T, QueueError> {
        let item = self.items.pop_front().ok_or(QueueError::Empty)?;
        self.stats.gets = self.stats.gets.wrapping_add(1);
        Ok(item)
    }

    pub fn available(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl<T, const N: usize> Default for RingQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
