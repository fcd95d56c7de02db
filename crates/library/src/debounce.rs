//! Coalescing of bursts of filesystem events.
//!
//! Owned by the watcher task alone; nothing else touches the table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct Debouncer {
    quiet: Duration,
    deadlines: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub(crate) fn new(quiet: Duration) -> Self {
        Self { quiet, deadlines: HashMap::new() }
    }

    /// Note an event for `path`, (re)starting its quiet period.
    pub(crate) fn record(&mut self, path: PathBuf, now: Instant) {
        self.deadlines.insert(path, now + self.quiet);
    }

    /// The earliest moment a pending path becomes due.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every path whose quiet period has elapsed, oldest
    /// deadline first.
    pub(crate) fn drain_expired(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut expired: Vec<(Instant, PathBuf)> = Vec::new();
        self.deadlines.retain(|path, deadline| {
            if *deadline <= now {
                expired.push((*deadline, path.clone()));
                false
            } else {
                true
            }
        });
        expired.sort();
        expired.into_iter().map(|(_, path)| path).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.deadlines.len()
    }
}
