use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Keeps the most recent `capacity` values, dropping the oldest on overflow.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoundedHistory<T> {
    capacity: usize,
    values: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Appends `value`, returning the evicted oldest entry when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.values.len() == self.capacity {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(value);
        evicted
    }

    pub fn latest(&self) -> Option<&T> {
        self.values.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl BoundedHistory<f32> {
    pub fn mean(&self) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f32>() / self.values.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_drops_oldest() {
        let mut h = BoundedHistory::new(3);
        assert!(h.is_empty());

        assert_eq!(h.push(1), None);
        assert_eq!(h.push(2), None);
        assert_eq!(h.push(3), None);
        assert_eq!(h.push(4), Some(1));
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(h.latest(), Some(&4));
    }

    #[test]
    fn mean_of_recent_values() {
        let mut h = BoundedHistory::new(2);
        assert_eq!(h.mean(), None);
        h.push(10.0);
        h.push(20.0);
        h.push(40.0);
        assert_eq!(h.mean(), Some(30.0));
        assert_eq!(BoundedHistory::<f32>::new(0).capacity(), 1);
    }
}
