//! Retransmission registry: the sender's collection of in-flight segments.
//!
//! Keyed by sequence number; unique per segment (`spec.md` §3). Selection
//! of the segment to retransmit on a timer tick is by *smallest
//! `sent_time`*, never by smallest sequence number — the canonical
//! implementation compares raw sequence numbers against an uninitialized
//! baseline, which `spec.md` §9 flags as a latent bug that must not be
//! reproduced.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Segment {
    pub sequence: u16,
    pub file_position: u64,
    pub data: Vec<u8>,
    pub sent_time: Instant,
}

#[derive(Debug, Default)]
pub struct Registry {
    segments: HashMap<u16, Segment>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            segments: HashMap::new(),
        }
    }

    pub fn insert(&mut self, segment: Segment) {
        self.segments.insert(segment.sequence, segment);
    }

    pub fn remove(&mut self, sequence: u16) -> Option<Segment> {
        self.segments.remove(&sequence)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// The segment with the smallest `sent_time` whose age exceeds
    /// `timeout`, if any. Only one segment is ever selected per call —
    /// this is a go-back-to-oldest scheme, not go-back-N (`spec.md` §4.5).
    pub fn oldest_expired(&self, now: Instant, timeout: Duration) -> Option<u16> {
        self.segments
            .values()
            .filter(|seg| now.duration_since(seg.sent_time) >= timeout)
            .min_by_key(|seg| seg.sent_time)
            .map(|seg| seg.sequence)
    }

    pub fn mark_sent(&mut self, sequence: u16, now: Instant) {
        if let Some(seg) = self.segments.get_mut(&sequence) {
            seg.sent_time = now;
        }
    }

    pub fn get(&self, sequence: u16) -> Option<&Segment> {
        self.segments.get(&sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn seg(sequence: u16, sent_time: Instant) -> Segment {
        Segment {
            sequence,
            file_position: 0,
            data: vec![0; 4],
            sent_time,
        }
    }

    #[test]
    fn selects_the_segment_with_the_smallest_sent_time_not_smallest_sequence() {
        let mut reg = Registry::new();
        let base = Instant::now();

        // Sequence 200 was sent before sequence 50 (e.g. after wraparound);
        // the registry must still pick 200 as "oldest".
        reg.insert(seg(200, base));
        reg.insert(seg(50, base + Duration::from_millis(50)));

        let now = base + Duration::from_millis(200);
        assert_eq!(reg.oldest_expired(now, Duration::from_millis(100)), Some(200));
    }

    #[test]
    fn returns_none_when_nothing_has_expired() {
        let mut reg = Registry::new();
        let base = Instant::now();
        reg.insert(seg(1, base));

        assert_eq!(
            reg.oldest_expired(base + Duration::from_millis(10), Duration::from_millis(100)),
            None
        );
    }

    #[test]
    fn remove_drops_ownership_of_the_segment() {
        let mut reg = Registry::new();
        reg.insert(seg(1, Instant::now()));
        assert_eq!(reg.len(), 1);
        assert!(reg.remove(1).is_some());
        assert!(reg.is_empty());
        assert!(reg.remove(1).is_none());
    }
}
