use crate::error::{ErrorKind, Result};
use async_stream::stream;
use exn::ResultExt;
use futures::Stream;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Recursively list every regular file below `root`.
///
/// Symbolic links are not followed. An unreadable directory yields an error
/// and the walk carries on with the rest of the tree.
pub(crate) fn walk(root: &Path) -> impl Stream<Item = Result<PathBuf>> + use<> {
    let mut stack = vec![root.to_path_buf()];
    stream! {
        'dirs: while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await.or_raise(|| ErrorKind::Walk) {
                Ok(entries) => entries,
                Err(e) => {
                    yield Err(e);
                    continue 'dirs;
                },
            };
            'entries: loop {
                let entry = match entries.next_entry().await.or_raise(|| ErrorKind::Walk) {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break 'entries,
                    Err(e) => {
                        yield Err(e);
                        continue 'dirs;
                    },
                };
                match entry.file_type().await.or_raise(|| ErrorKind::Walk) {
                    Ok(kind) if kind.is_dir() => stack.push(entry.path()),
                    Ok(kind) if kind.is_file() => yield Ok(entry.path()),
                    Ok(_) => {},
                    Err(e) => yield Err(e),
                }
            }
        }
    }
}
