//! The work queue between discovery (scan and watcher) and the workers.
//!
//! Unbounded; a large initial scan queues every eligible file at once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

#[derive(Debug)]
pub(crate) struct Queue {
    sender: mpsc::UnboundedSender<PathBuf>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<PathBuf>>,
    /// Paths pushed but not yet finished with.
    pending: watch::Sender<usize>,
    in_flight: Mutex<InFlight>,
}

/// Paths currently being processed by some worker.
#[derive(Debug, Default)]
struct InFlight {
    claimed: HashSet<PathBuf>,
    /// Claimed paths that were dequeued again while being processed.
    retriggered: HashSet<PathBuf>,
}

/// A dequeued path. The queue counts it as pending until this is dropped.
#[derive(Debug)]
pub(crate) struct Ticket<'a> {
    path: PathBuf,
    queue: &'a Queue,
}

/// Exclusive right to process a path. Dropping it queues the path again if it
/// was re-triggered in the meantime.
#[derive(Debug)]
pub(crate) struct Claim<'a> {
    path: PathBuf,
    queue: &'a Queue,
}

impl Queue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            pending: watch::Sender::new(0),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub(crate) fn push(&self, path: PathBuf) {
        self.pending.send_modify(|n| *n += 1);
        // The receiver lives as long as the queue, so this cannot fail.
        if self.sender.send(path).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    /// Wait for the next path. Workers share the receiver, one at a time.
    pub(crate) async fn pop(&self) -> Option<Ticket<'_>> {
        let path = self.receiver.lock().await.recv().await?;
        Some(Ticket { path, queue: self })
    }

    pub(crate) fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolve once every pushed path has been processed (or dropped).
    pub(crate) async fn idle(&self) {
        let mut pending = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        _ = pending.wait_for(|n| *n == 0).await;
    }

    /// Claim a path for processing.
    ///
    /// A scan and a watcher event can queue the same path twice; only the
    /// first worker to claim it does the work. A losing claim marks the path
    /// as re-triggered, and it is queued once more when the winner is done.
    pub(crate) fn claim(&self, path: &Path) -> Option<Claim<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.claimed.insert(path.to_path_buf()) {
            Some(Claim { path: path.to_path_buf(), queue: self })
        } else {
            in_flight.retriggered.insert(path.to_path_buf());
            None
        }
    }
}

impl Ticket<'_> {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.queue.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let retriggered = {
            let mut in_flight = self.queue.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.claimed.remove(&self.path);
            in_flight.retriggered.remove(&self.path)
        };
        if retriggered {
            tracing::debug!(path = %self.path.display(), "Changed while being processed; queueing again");
            self.queue.push(self.path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_idle_waits_for_tickets() {
        let queue = Queue::new();
        queue.idle().await;
        queue.push(PathBuf::from("a.fb2"));
        queue.push(PathBuf::from("b.zip"));
        assert_eq!(queue.pending(), 2);

        let first = queue.pop().await.unwrap();
        assert_eq!(first.path(), Path::new("a.fb2"));
        drop(first);
        assert_eq!(queue.pending(), 1);
        assert!(tokio::time::timeout(Duration::from_millis(50), queue.idle()).await.is_err());

        let second = queue.pop().await.unwrap();
        assert_eq!(second.path(), Path::new("b.zip"));
        drop(second);
        tokio::time::timeout(Duration::from_secs(1), queue.idle()).await.unwrap();
    }

    #[tokio::test]
    async fn test_claims_are_per_path() {
        let queue = Queue::new();
        let claim = queue.claim(Path::new("greek.zip")).unwrap();
        assert!(queue.claim(Path::new("plato.fb2")).is_some());
        drop(claim);
        assert!(queue.claim(Path::new("greek.zip")).is_some());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_retriggered_claim_is_queued_again() {
        let queue = Queue::new();
        let claim = queue.claim(Path::new("greek.zip")).unwrap();
        assert!(queue.claim(Path::new("greek.zip")).is_none());
        assert!(queue.claim(Path::new("greek.zip")).is_none());
        assert_eq!(queue.pending(), 0);

        drop(claim);
        assert_eq!(queue.pending(), 1);
        let ticket = queue.pop().await.unwrap();
        assert_eq!(ticket.path(), Path::new("greek.zip"));
        // Re-triggered once, however many losing claims there were.
        assert!(queue.claim(ticket.path()).is_some());
        drop(ticket);
        assert_eq!(queue.pending(), 0);
    }
}
