//! The shuffled list of equivalent target streams.

use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Holds the (once-shuffled) list of target stream names and hands out a
/// deterministic next-stream index for each new [`PendingWrite`]
/// (`crate::pending_write::PendingWrite`).
pub struct Roster {
    streams: Vec<String>,
    next_stream_id: AtomicUsize,
}

impl Roster {
    /// Shuffle `streams` once, at construction. `streams` must be non-empty;
    /// callers are expected to have validated this already (see
    /// `crate::error::ConfigError::EmptyRoster`).
    pub fn new(mut streams: Vec<String>) -> Self {
        streams.shuffle(&mut rand::thread_rng());
        Self {
            streams,
            next_stream_id: AtomicUsize::new(0),
        }
    }

    /// Number of streams in the roster.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// The stream name at roster index `i`, modulo `len()`.
    pub fn get(&self, i: usize) -> &str {
        &self.streams[i % self.streams.len()]
    }

    /// A fresh starting index for a new Pending Write, drawn from a
    /// monotonically increasing counter so consecutive sets fan out evenly
    /// across the roster instead of always starting at index 0.
    pub fn next_start_index(&self) -> usize {
        let counter = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        counter % self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn roster_is_a_permutation_of_input() {
        let input = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let roster = Roster::new(input.clone());

        assert_eq!(roster.len(), input.len());
        let got: HashSet<_> = (0..roster.len()).map(|i| roster.get(i).to_string()).collect();
        let want: HashSet<_> = input.into_iter().collect();
        assert_eq!(got, want);
    }

    #[test]
    fn get_wraps_modularly() {
        let roster = Roster::new(vec!["A".to_string(), "B".to_string()]);
        assert_eq!(roster.get(0), roster.get(2));
        assert_eq!(roster.get(1), roster.get(3));
    }

    #[test]
    fn next_start_index_advances_monotonically() {
        let roster = Roster::new(vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        let i0 = roster.next_start_index();
        let i1 = roster.next_start_index();
        let i2 = roster.next_start_index();
        let i3 = roster.next_start_index();
        assert_eq!(vec![i0, i1, i2, i3], vec![0, 1, 2, 0]);
    }
}
