//! Live discovery: a `notify` watcher feeding the debouncer.

use crate::container_kind;
use crate::debounce::Debouncer;
use crate::error::{ErrorKind, Result};
use crate::queue::Queue;
use exn::ResultExt;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// How long to sleep when nothing is waiting on the debouncer. The sleep is
/// never actually awaited in that case, it only has to be a valid deadline.
const IDLE: Duration = Duration::from_secs(3600);

/// A watcher attached to the library root, and the events it reports.
pub(crate) struct Watch {
    // Events stop as soon as the watcher is dropped.
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl Watch {
    pub(crate) fn new(root: &Path) -> Result<Self> {
        let (sender, events) = mpsc::unbounded_channel();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| {
            // Only fails once the loop has exited.
            _ = sender.send(event);
        })
        .or_raise(|| ErrorKind::Watch)?;
        watcher.watch(root, RecursiveMode::Recursive).or_raise(|| ErrorKind::Watch)?;
        Ok(Self { _watcher: watcher, events })
    }

    /// Debounce events until cancelled, queueing eligible paths relative to
    /// `root`.
    pub(crate) async fn run(mut self, root: PathBuf, mut debouncer: Debouncer, queue: &Queue, token: CancellationToken) {
        tracing::info!(root = %root.display(), "Watching library for changes");
        loop {
            let deadline = debouncer.next_deadline();
            let wake = sleep_until(deadline.unwrap_or_else(|| Instant::now() + IDLE));
            tokio::select! {
                _ = token.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(Ok(event)) => {
                        let now = Instant::now();
                        for path in changed_paths(&event) {
                            if container_kind(path).is_some() {
                                tracing::trace!(path = %path.display(), kind = ?event.kind, "Change recorded");
                                debouncer.record(path.to_path_buf(), now);
                            }
                        }
                    },
                    Some(Err(e)) => tracing::warn!(error = %e, "Filesystem watcher error"),
                    None => break,
                },
                _ = wake, if deadline.is_some() => {
                    for path in debouncer.drain_expired(Instant::now()) {
                        match path.strip_prefix(&root) {
                            Ok(relative) => {
                                tracing::debug!(path = %relative.display(), "Queueing changed file");
                                queue.push(relative.to_path_buf());
                            },
                            Err(_) => tracing::warn!(path = %path.display(), "Change reported outside the library root"),
                        }
                    }
                },
            }
        }
        tracing::debug!(pending = debouncer.len(), "Watcher stopped");
    }
}

/// The paths of an event that may now hold a complete file.
fn changed_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) => &event.paths,
        // The source side of a rename no longer exists.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1..).unwrap_or_default(),
        EventKind::Modify(ModifyKind::Metadata(_)) => &[],
        EventKind::Modify(_) => &event.paths,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => &event.paths,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use rstest::rstest;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths.iter().fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[rstest]
    #[case(EventKind::Create(CreateKind::File), &["/books/a.fb2"], &["/books/a.fb2"])]
    #[case(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/books/a.fb2"], &["/books/a.fb2"])]
    #[case(EventKind::Modify(ModifyKind::Any), &["/books/a.fb2"], &["/books/a.fb2"])]
    #[case(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/books/a.fb2"], &["/books/a.fb2"])]
    #[case(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &["/tmp/a.part", "/books/a.fb2"], &["/books/a.fb2"])]
    #[case(EventKind::Access(AccessKind::Close(AccessMode::Write)), &["/books/a.fb2"], &["/books/a.fb2"])]
    #[case(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/books/a.fb2"], &[])]
    #[case(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), &["/books/a.fb2"], &[])]
    #[case(EventKind::Access(AccessKind::Close(AccessMode::Read)), &["/books/a.fb2"], &[])]
    #[case(EventKind::Remove(RemoveKind::File), &["/books/a.fb2"], &[])]
    fn test_changed_paths(#[case] kind: EventKind, #[case] paths: &[&str], #[case] expected: &[&str]) {
        let event = event(kind, paths);
        let expected: Vec<PathBuf> = expected.iter().map(PathBuf::from).collect();
        assert_eq!(changed_paths(&event), expected.as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_events_queues_once() {
        let (sender, events) = mpsc::unbounded_channel();
        let watch = Watch { _watcher: recommended_watcher(|_: notify::Result<Event>| {}).unwrap(), events };
        let queue = Queue::new();
        let token = CancellationToken::new();
        let ms = Duration::from_millis;

        let run = watch.run(PathBuf::from("/books"), Debouncer::new(ms(500)), &queue, token.clone());
        let writes = async {
            for _ in 0..5 {
                let written = EventKind::Modify(ModifyKind::Data(DataChange::Content));
                sender.send(Ok(event(written, &["/books/greek/iliad.zip"]))).unwrap();
                sender.send(Ok(event(EventKind::Create(CreateKind::File), &["/books/cover.jpg"]))).unwrap();
                tokio::time::sleep(ms(100)).await;
            }
            // The last write was 400ms ago.
            tokio::time::sleep(ms(300)).await;
            assert_eq!(queue.pending(), 0);
            tokio::time::sleep(ms(200)).await;
            assert_eq!(queue.pending(), 1);
            tokio::time::sleep(Duration::from_secs(10)).await;
            assert_eq!(queue.pending(), 1);

            let ticket = queue.pop().await.unwrap();
            assert_eq!(ticket.path(), Path::new("greek/iliad.zip"));
            drop(ticket);
            token.cancel();
        };
        tokio::join!(run, writes);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_watch_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = Watch::new(&dir.path().join("missing")).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Watch));
    }
}
