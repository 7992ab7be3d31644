//! Atomic publication of artifacts polled by external readers.
//!
//! Published paths are only ever replaced by a same-directory rename, so a
//! reader opening the path sees either the previous complete file or the next
//! complete file. Nothing in this module truncates a published path.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum FileSwapError {
    #[error("couldn't copy {} to {}: {}", .from.display(), .to.display(), .source)]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't rename {} to {}: {}", .from.display(), .to.display(), .source)]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no backup of {} to restore", .published.display())]
    MissingBackup { published: PathBuf },
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Staging file beside `published`; lives on the same filesystem so the final rename is atomic.
pub fn staging_path(published: &Path) -> PathBuf {
    with_suffix(published, ".tmp")
}

fn backup_path(published: &Path) -> PathBuf {
    with_suffix(published, ".bak")
}

/// Moves a fully written `staged` file over `published`.
pub fn publish_atomically(staged: &Path, published: &Path) -> Result<(), FileSwapError> {
    fs::rename(staged, published).map_err(|source| FileSwapError::Rename {
        from: staged.to_path_buf(),
        to: published.to_path_buf(),
        source,
    })
}

/// Copies `from` beside `published` and renames it into place.
fn copy_then_publish(from: &Path, published: &Path) -> Result<(), FileSwapError> {
    let staged = staging_path(published);
    if let Err(source) = fs::copy(from, &staged) {
        let _ = fs::remove_file(&staged);
        return Err(FileSwapError::Copy {
            from: from.to_path_buf(),
            to: staged,
            source,
        });
    }
    publish_atomically(&staged, published)
}

/// What the published cover currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverState {
    #[default]
    Unknown,
    Placeholder,
    Artifact,
}

/// Owns the published cover path and its placeholder fallback.
#[derive(Debug)]
pub struct CoverPublisher {
    published: PathBuf,
    placeholder: PathBuf,
    state: CoverState,
    current_source: Option<String>,
    backup_source: Option<String>,
}

impl CoverPublisher {
    pub fn new(published: PathBuf, placeholder: PathBuf) -> Self {
        Self {
            published,
            placeholder,
            state: CoverState::Unknown,
            current_source: None,
            backup_source: None,
        }
    }

    pub fn state(&self) -> CoverState {
        self.state
    }

    pub fn published_path(&self) -> &Path {
        &self.published
    }

    /// Staging path fetches write into before `commit`.
    pub fn staging_path(&self) -> PathBuf {
        staging_path(&self.published)
    }

    /// Returns `true` when a backup of exactly `source` can be restored without refetching.
    pub fn can_restore(&self, source: &str) -> bool {
        self.state == CoverState::Placeholder
            && self.backup_source.as_deref() == Some(source)
            && backup_path(&self.published).exists()
    }

    /// Publishes a fetched cover for `source`.
    pub fn commit(&mut self, staged: &Path, source: &str) -> Result<(), FileSwapError> {
        publish_atomically(staged, &self.published)?;
        self.state = CoverState::Artifact;
        self.current_source = Some(source.to_string());
        self.discard_backup();
        info!(
            "CoverPublisher: published cover from {} to {}",
            source,
            self.published.display()
        );
        Ok(())
    }

    /// Shows the placeholder. No filesystem work when it's already showing.
    ///
    /// The state moves to `Placeholder` even when the swap fails; the next
    /// attempt happens on the next cover change, not on every tick.
    pub fn activate_placeholder(&mut self) -> Result<(), FileSwapError> {
        if self.state == CoverState::Placeholder {
            return Ok(());
        }
        let previous_state = self.state;
        self.state = CoverState::Placeholder;

        if previous_state == CoverState::Artifact && self.published.exists() {
            if let Err(err) = self.backup_published() {
                warn!("CoverPublisher: {}; the cover will be refetched", err);
            }
        } else {
            self.discard_backup();
        }
        self.current_source = None;
        copy_then_publish(&self.placeholder, &self.published)?;
        debug!(
            "CoverPublisher: placeholder {} published to {}",
            self.placeholder.display(),
            self.published.display()
        );
        Ok(())
    }

    /// Restores the cover that was showing before the placeholder.
    /// No filesystem work when the placeholder isn't showing.
    pub fn deactivate_placeholder(&mut self) -> Result<(), FileSwapError> {
        if self.state != CoverState::Placeholder {
            return Ok(());
        }
        let backup = backup_path(&self.published);
        if self.backup_source.is_none() || !backup.exists() {
            return Err(FileSwapError::MissingBackup {
                published: self.published.clone(),
            });
        }
        publish_atomically(&backup, &self.published)?;
        self.state = CoverState::Artifact;
        self.current_source = self.backup_source.take();
        debug!(
            "CoverPublisher: restored previous cover at {}",
            self.published.display()
        );
        Ok(())
    }

    fn backup_published(&mut self) -> Result<(), FileSwapError> {
        let backup = backup_path(&self.published);
        let staged_backup = with_suffix(&backup, ".tmp");
        if let Err(source) = fs::copy(&self.published, &staged_backup) {
            let _ = fs::remove_file(&staged_backup);
            self.backup_source = None;
            return Err(FileSwapError::Copy {
                from: self.published.clone(),
                to: staged_backup,
                source,
            });
        }
        fs::rename(&staged_backup, &backup).map_err(|source| {
            self.backup_source = None;
            FileSwapError::Rename {
                from: staged_backup.clone(),
                to: backup.clone(),
                source,
            }
        })?;
        self.backup_source = self.current_source.clone();
        Ok(())
    }

    fn discard_backup(&mut self) {
        self.backup_source = None;
        let backup = backup_path(&self.published);
        if backup.exists() {
            let _ = fs::remove_file(backup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        backup_path, publish_atomically, staging_path, CoverPublisher, CoverState, FileSwapError,
    };
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(name: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be valid")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("songsink_publish_{name}_{nonce}"));
        fs::create_dir_all(&dir).expect("should create temp dir");
        dir
    }

    fn publisher_in(dir: &Path) -> CoverPublisher {
        let placeholder = dir.join("placeholder.png");
        fs::write(&placeholder, b"placeholder").expect("should write placeholder");
        CoverPublisher::new(dir.join("cover.png"), placeholder)
    }

    fn stage(publisher: &CoverPublisher, bytes: &[u8]) -> PathBuf {
        let staged = publisher.staging_path();
        fs::write(&staged, bytes).expect("should stage");
        staged
    }

    #[test]
    fn test_staging_path_sits_beside_published() {
        assert_eq!(
            staging_path(Path::new("/overlay/cover.png")),
            PathBuf::from("/overlay/cover.png.tmp")
        );
    }

    #[test]
    fn test_commit_replaces_published_and_consumes_staging() {
        let dir = unique_temp_dir("commit");
        let mut publisher = publisher_in(&dir);
        let staged = stage(&publisher, b"first");

        publisher
            .commit(&staged, "https://example.com/first.png")
            .expect("commit should succeed");
        assert_eq!(publisher.state(), CoverState::Artifact);
        assert_eq!(fs::read(publisher.published_path()).unwrap(), b"first");
        assert!(!staged.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_activate_placeholder_is_idempotent() {
        let dir = unique_temp_dir("idempotent");
        let mut publisher = publisher_in(&dir);

        publisher.activate_placeholder().expect("first activation");
        assert_eq!(publisher.state(), CoverState::Placeholder);
        assert_eq!(fs::read(publisher.published_path()).unwrap(), b"placeholder");

        // A second activation must not touch the filesystem: swap the
        // placeholder source out and remove the published file to prove it.
        fs::write(dir.join("placeholder.png"), b"changed").unwrap();
        fs::remove_file(publisher.published_path()).unwrap();
        publisher.activate_placeholder().expect("second activation");
        assert!(!publisher.published_path().exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_deactivate_without_placeholder_is_noop() {
        let dir = unique_temp_dir("deactivate_noop");
        let mut publisher = publisher_in(&dir);
        publisher
            .deactivate_placeholder()
            .expect("nothing to deactivate");
        assert_eq!(publisher.state(), CoverState::Unknown);
        assert!(!publisher.published_path().exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_placeholder_backs_up_and_restores_cover() {
        let dir = unique_temp_dir("restore");
        let mut publisher = publisher_in(&dir);
        let staged = stage(&publisher, b"real-cover");
        publisher.commit(&staged, "cover-a").unwrap();

        publisher.activate_placeholder().unwrap();
        assert_eq!(fs::read(publisher.published_path()).unwrap(), b"placeholder");
        assert!(publisher.can_restore("cover-a"));
        assert!(!publisher.can_restore("cover-b"));

        publisher.deactivate_placeholder().unwrap();
        assert_eq!(publisher.state(), CoverState::Artifact);
        assert_eq!(fs::read(publisher.published_path()).unwrap(), b"real-cover");
        assert!(!backup_path(publisher.published_path()).exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_deactivate_without_backup_reports_missing() {
        let dir = unique_temp_dir("missing_backup");
        let mut publisher = publisher_in(&dir);
        publisher.activate_placeholder().unwrap();
        let result = publisher.deactivate_placeholder();
        assert!(matches!(result, Err(FileSwapError::MissingBackup { .. })));
        assert_eq!(publisher.state(), CoverState::Placeholder);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_placeholder_source_is_reported_but_state_moves() {
        let dir = unique_temp_dir("missing_placeholder");
        let mut publisher = CoverPublisher::new(dir.join("cover.png"), dir.join("nope.png"));
        let result = publisher.activate_placeholder();
        assert!(matches!(result, Err(FileSwapError::Copy { .. })));
        assert_eq!(publisher.state(), CoverState::Placeholder);
        assert!(!staging_path(publisher.published_path()).exists());
        publisher
            .activate_placeholder()
            .expect("retry waits for the next state change");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_concurrent_reader_never_sees_partial_cover() {
        let dir = unique_temp_dir("atomic");
        let published = dir.join("cover.png");
        let first = vec![b'a'; 64 * 1024];
        let second = vec![b'b'; 96 * 1024];
        fs::write(&published, &first).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let stop = Arc::clone(&stop);
            let published = published.clone();
            let (first_len, second_len) = (first.len(), second.len());
            thread::spawn(move || {
                let mut reads = 0usize;
                loop {
                    let bytes = fs::read(&published).expect("published cover should always exist");
                    assert!(
                        bytes.len() == first_len || bytes.len() == second_len,
                        "reader saw {} bytes",
                        bytes.len()
                    );
                    assert!(bytes.iter().all(|byte| *byte == bytes[0]));
                    reads += 1;
                    if stop.load(Ordering::Relaxed) {
                        break reads;
                    }
                }
            })
        };

        let staged = staging_path(&published);
        for round in 0..200 {
            let bytes = if round % 2 == 0 { &second } else { &first };
            fs::write(&staged, bytes).unwrap();
            publish_atomically(&staged, &published).unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        let reads = reader.join().expect("reader thread should not panic");
        assert!(reads > 0);
        let _ = fs::remove_dir_all(dir);
    }
}
