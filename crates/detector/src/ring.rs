//! Fixed-capacity sample window
//!
//! Flat ring with overwrite-on-full; never reallocates after construction.

use std::fmt;

use ringbuf::{traits::*, HeapRb};

pub struct SampleRing {
    buffer: HeapRb<f64>,
    capacity: usize,
}

impl fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleRing")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: HeapRb::new(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.buffer.push_overwrite(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean of the stored entries; 0 when empty
    pub fn mean(&self) -> f64 {
        let len = self.len();
        if len == 0 {
            return 0.0;
        }
        self.buffer.iter().sum::<f64>() / len as f64
    }

    /// Largest stored entry; 0 when empty
    pub fn max(&self) -> f64 {
        self.buffer.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |m| m.max(v)))
        })
        .unwrap_or(0.0)
    }

    pub fn min(&self) -> f64 {
        self.buffer.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |m| m.min(v)))
        })
        .unwrap_or(0.0)
    }

    /// Most recent entry
    pub fn last(&self) -> Option<f64> {
        self.buffer.iter().last().copied()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrites_oldest() {
        let mut ring = SampleRing::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            ring.push(v);
        }
        assert!(ring.is_full());
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.mean(), 3.0);
        assert_eq!(ring.max(), 4.0);
        assert_eq!(ring.min(), 2.0);
        assert_eq!(ring.last(), Some(4.0));
    }

    #[test]
    fn test_empty_ring() {
        let mut ring = SampleRing::new(0);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.mean(), 0.0);
        assert_eq!(ring.max(), 0.0);
        ring.push(5.0);
        ring.clear();
        assert!(ring.is_empty());
    }
}
