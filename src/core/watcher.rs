use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::audio_reader::{self, count_audio_files, DiscPatternSet};
use crate::core::queue::WorkQueue;

/// Polls the library root for new or changed album folders and pushes the
/// Work Queue accordingly. Holds no database handle: a freshly discovered
/// folder is enqueued as `FolderScanAndTag` and the Scanner does the actual
/// reconciliation against persisted rows.
pub struct Watcher {
    root: PathBuf,
    poll_interval: Duration,
    known: HashMap<PathBuf, usize>,
}

impl Watcher {
    pub fn new(root: PathBuf, poll_interval: Duration, known_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let known = known_paths.into_iter().map(|p| (p, 0)).collect();
        Self { root, poll_interval, known }
    }

    /// Runs until `shutdown` reports `true`. Each tick re-derives disc
    /// patterns from `patterns` so a settings change takes effect on the
    /// next poll without a restart.
    pub async fn run(
        mut self,
        queue: WorkQueue,
        patterns: impl Fn() -> DiscPatternSet + Send + 'static,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {},
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let current_patterns = patterns();
            self.poll_once(&queue, &current_patterns);
        }

        log::info!("Watcher stopped");
    }

    /// Single pass: diffs against `self.known`, enqueueing a `FolderScanAndTag`
    /// for any newly discovered album folder or any known folder whose audio
    /// file count changed (a track added/removed since the last poll).
    fn poll_once(&mut self, queue: &WorkQueue, patterns: &DiscPatternSet) {
        let discovered = audio_reader::discover_album_folders(&self.root, patterns);
        let mut seen = HashMap::with_capacity(discovered.len());

        for path in discovered {
            let count = Self::total_audio_files(&path);
            seen.insert(path.clone(), count);

            match self.known.get(&path) {
                None => {
                    log::info!("Watcher found new album folder: {}", path.display());
                    queue.enqueue_folder(path);
                }
                Some(&previous) if previous != count => {
                    log::info!("Watcher noticed track count change in {}: {previous} -> {count}", path.display());
                    queue.enqueue_folder(path);
                }
                Some(_) => {}
            }
        }

        self.known = seen;
    }

    fn total_audio_files(path: &Path) -> usize {
        let direct = count_audio_files(path);
        let nested: usize = std::fs::read_dir(path)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_dir())
            .map(|p| count_audio_files(&p))
            .sum();
        direct + nested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_audio_file(path: &Path) {
        fs::write(path, b"fake").unwrap();
    }

    #[test]
    fn poll_once_enqueues_new_folders_and_ignores_unchanged() {
        let dir = tempdir().unwrap();
        let album_dir = dir.path().join("Artist - Album");
        fs::create_dir_all(&album_dir).unwrap();
        write_audio_file(&album_dir.join("01.flac"));

        let (queue, _worker) = WorkQueue::new();
        let patterns = DiscPatternSet::compile(&[], 0);
        let mut watcher = Watcher::new(dir.path().to_path_buf(), Duration::from_secs(60), []);

        watcher.poll_once(&queue, &patterns);
        assert_eq!(queue.depth(), 1);

        watcher.poll_once(&queue, &patterns);
        assert_eq!(queue.depth(), 1, "unchanged folder should not be re-enqueued");
    }

    #[test]
    fn poll_once_enqueues_on_track_count_change() {
        let dir = tempdir().unwrap();
        let album_dir = dir.path().join("Artist - Album");
        fs::create_dir_all(&album_dir).unwrap();
        write_audio_file(&album_dir.join("01.flac"));

        let (queue, _worker) = WorkQueue::new();
        let patterns = DiscPatternSet::compile(&[], 0);
        let mut watcher = Watcher::new(dir.path().to_path_buf(), Duration::from_secs(60), []);
        watcher.poll_once(&queue, &patterns);
        assert_eq!(queue.depth(), 1);

        write_audio_file(&album_dir.join("02.flac"));
        watcher.poll_once(&queue, &patterns);
        assert_eq!(queue.depth(), 2);
    }
}
