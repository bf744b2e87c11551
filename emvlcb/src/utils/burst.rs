use embassy_time::{Duration, Instant};

/// Paced iteration over a range of reply indices
///
/// Multi-frame replies (parameter dumps, node variable dumps, event table reads) emit one item
/// per interval instead of filling the action queue at once. The first item is due immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Burst<K> {
    kind: K,
    next: u16,
    end: u16,
    due: Instant,
}

impl<K: Copy> Burst<K> {
    /// Creates a burst over `start..end`.
    pub fn new(kind: K, start: u16, end: u16, now: Instant) -> Self {
        Self {
            kind,
            next: start,
            end,
            due: now,
        }
    }

    pub fn kind(&self) -> K {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.end
    }

    /// Moves past indices that produce no output.
    pub fn skip_while(&mut self, mut predicate: impl FnMut(u16) -> bool) {
        while !self.is_finished() && predicate(self.next) {
            self.next += 1;
        }
    }

    /// Returns the next index if it is due.
    pub fn poll(&mut self, now: Instant, interval: Duration) -> Option<(K, u16)> {
        if self.is_finished() || now < self.due {
            return None;
        }
        let index = self.next;
        self.next += 1;
        self.due = super::deadline(now, interval);
        Some((self.kind, index))
    }
}
