//! Frequency-bucketed LFU cache policy, used when ARC is disabled (§3, §4.3).
//!
//! Each resident key lives in the list whose index equals its observed access frequency, capped
//! at `THRESHOLD - 1`. Eviction scans buckets from 0 upward and removes the oldest entry of the
//! lowest non-empty one.

use std::collections::VecDeque;

/// Frequency ceiling; a key's bucket index saturates here rather than growing unbounded.
pub const THRESHOLD: usize = 1000;

pub struct Lfu {
    buckets: Vec<VecDeque<u32>>,
    freq: std::collections::HashMap<u32, usize>,
    capacity: usize,
}

impl Lfu {
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: (0..THRESHOLD).map(|_| VecDeque::new()).collect(),
            freq: std::collections::HashMap::new(),
            capacity,
        }
    }

    /// True if `key` is resident.
    pub fn contains(&self, key: u32) -> bool {
        self.freq.contains_key(&key)
    }

    /// Records a hit on `key`, promoting it to the next-higher frequency bucket.
    pub fn touch(&mut self, key: u32) {
        let f = *self.freq.get(&key).unwrap_or(&0);
        if let Some(bucket) = self.buckets.get_mut(f) {
            if let Some(pos) = bucket.iter().position(|&k| k == key) {
                bucket.remove(pos);
            }
        }
        let next = (f + 1).min(THRESHOLD - 1);
        self.freq.insert(key, next);
        self.buckets[next].push_back(key);
    }

    /// Inserts a new key at frequency 0, evicting the oldest entry of the lowest non-empty
    /// bucket if the cache is full. Returns the evicted key, if any.
    pub fn insert(&mut self, key: u32) -> Option<u32> {
        let victim = if self.freq.len() >= self.capacity {
            self.evict()
        } else {
            None
        };
        self.freq.insert(key, 0);
        self.buckets[0].push_back(key);
        victim
    }

    fn evict(&mut self) -> Option<u32> {
        for bucket in &mut self.buckets {
            if let Some(victim) = bucket.pop_front() {
                self.freq.remove(&victim);
                return Some(victim);
            }
        }
        None
    }

    /// Returns the current frequency bucket for `key`, used by `is_hot`.
    pub fn frequency(&self, key: u32) -> usize {
        *self.freq.get(&key).unwrap_or(&0)
    }

    pub fn forget(&mut self, key: u32) {
        if let Some(f) = self.freq.remove(&key) {
            if let Some(pos) = self.buckets[f].iter().position(|&k| k == key) {
                self.buckets[f].remove(pos);
            }
        }
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.freq.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_touch_promotes_bucket() {
        let mut lfu = Lfu::new(4);
        lfu.insert(1);
        assert_eq!(lfu.frequency(1), 0);
        lfu.touch(1);
        assert_eq!(lfu.frequency(1), 1);
    }

    #[test]
    fn eviction_prefers_lowest_frequency_bucket() {
        let mut lfu = Lfu::new(2);
        lfu.insert(1);
        lfu.touch(1);
        lfu.insert(2); // stays at frequency 0
        let victim = lfu.insert(3);
        assert_eq!(victim, Some(2));
        assert!(lfu.contains(1));
        assert!(!lfu.contains(2));
    }
}
