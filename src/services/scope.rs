//! Per-request working directories
//!
//! A `WorkingScope` owns one fresh directory and every path registered in it.
//! Teardown runs exactly once, either through `close()` or on drop, so a
//! request that returns early, errors or panics still leaves nothing behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ResourceCleanupError;

const SCOPE_PREFIX: &str = "clean-audio";

/// Removes one tracked path during teardown
pub type RemovePath = fn(&Path) -> io::Result<()>;

pub struct WorkingScope {
    root: PathBuf,
    tracked: Vec<PathBuf>,
    closed: bool,
    remove: RemovePath,
}

impl WorkingScope {
    /// Create a fresh directory under `base` (created if missing)
    pub fn create(base: &Path) -> io::Result<Self> {
        fs::create_dir_all(base)?;
        let root = base.join(format!("{}-{}", SCOPE_PREFIX, Uuid::new_v4()));
        fs::create_dir(&root)?;
        log::debug!("Opened working scope {:?}", root);
        Ok(Self {
            root,
            tracked: Vec::new(),
            closed: false,
            remove: remove_path,
        })
    }

    /// Replace how tracked paths are removed at teardown
    pub fn with_remover(mut self, remove: RemovePath) -> Self {
        self.remove = remove;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register `name` inside the scope and return its path. Nothing is created.
    pub fn track(&mut self, name: &str) -> PathBuf {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string().into());
        let path = self.root.join(file_name);
        if !self.tracked.contains(&path) {
            self.tracked.push(path.clone());
        }
        path
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }

    /// Tear down now and report what couldn't be removed
    pub fn close(mut self) -> Vec<ResourceCleanupError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Vec<ResourceCleanupError> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;

        let mut failures = Vec::new();
        for path in self.tracked.drain(..) {
            if let Err(e) = (self.remove)(&path) {
                failures.push(ResourceCleanupError { path, source: e });
            }
        }

        match fs::remove_dir(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                // Something untracked landed in the directory; sweep it rather than leak
                log::warn!(
                    "Working scope {:?} not empty after teardown ({}), sweeping",
                    self.root,
                    e
                );
                if let Err(e) = fs::remove_dir_all(&self.root) {
                    failures.push(ResourceCleanupError {
                        path: self.root.clone(),
                        source: e,
                    });
                }
            }
        }

        for failure in &failures {
            log::warn!("{}", failure);
        }
        log::debug!("Closed working scope {:?}", self.root);
        failures
    }
}

impl std::fmt::Debug for WorkingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingScope")
            .field("root", &self.root)
            .field("tracked", &self.tracked)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for WorkingScope {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Remove a file or directory; a missing path is not an error
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Run `body` inside a fresh working scope; the scope is torn down on every exit path
pub fn with_scope<T>(
    base: &Path,
    body: impl FnOnce(&mut WorkingScope) -> T,
) -> io::Result<T> {
    let mut scope = WorkingScope::create(base)?;
    let result = body(&mut scope);
    scope.close();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_scope_removes_tracked_files() {
        let base = tempfile::tempdir().unwrap();
        let root = with_scope(base.path(), |scope| {
            let a = scope.track("source.mp3");
            let b = scope.track("normalized.wav");
            fs::write(&a, b"a").unwrap();
            fs::write(&b, b"b").unwrap();
            assert_eq!(scope.tracked().len(), 2);
            scope.root().to_path_buf()
        })
        .unwrap();

        assert!(!root.exists());
        assert_eq!(entries(base.path()), 0);
    }

    #[test]
    fn test_never_created_paths_are_ignored() {
        let base = tempfile::tempdir().unwrap();
        let mut scope = WorkingScope::create(base.path()).unwrap();
        scope.track("never-written.wav");
        assert!(scope.close().is_empty());
        assert_eq!(entries(base.path()), 0);
    }

    #[test]
    fn test_track_is_deduplicated_and_confined() {
        let base = tempfile::tempdir().unwrap();
        let mut scope = WorkingScope::create(base.path()).unwrap();
        let a = scope.track("x.wav");
        let b = scope.track("x.wav");
        assert_eq!(a, b);
        assert_eq!(scope.tracked().len(), 1);

        let escaped = scope.track("../../etc/passwd");
        assert_eq!(escaped.parent().unwrap(), scope.root());
    }

    #[test]
    fn test_drop_cleans_up_on_error() {
        let base = tempfile::tempdir().unwrap();
        let result: Result<(), String> = (|| {
            let mut scope = WorkingScope::create(base.path()).map_err(|e| e.to_string())?;
            let path = scope.track("source.ogg");
            fs::write(&path, b"data").map_err(|e| e.to_string())?;
            Err("decode failed".to_string())
        })();
        assert!(result.is_err());
        assert_eq!(entries(base.path()), 0);
    }

    #[test]
    fn test_drop_cleans_up_on_panic() {
        let base = tempfile::tempdir().unwrap();
        let path = base.path().to_path_buf();
        let outcome = std::panic::catch_unwind(move || {
            with_scope(&path, |scope| {
                fs::write(scope.track("source.flac"), b"data").unwrap();
                panic!("inference blew up");
            })
        });
        assert!(outcome.is_err());
        assert_eq!(entries(base.path()), 0);
    }

    fn refuse_wav(path: &Path) -> io::Result<()> {
        if path.extension().map(|e| e == "wav").unwrap_or(false) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"));
        }
        remove_path(path)
    }

    #[test]
    fn test_close_reports_failed_removal() {
        let base = tempfile::tempdir().unwrap();
        let mut scope = WorkingScope::create(base.path())
            .unwrap()
            .with_remover(refuse_wav);
        let stuck = scope.track("normalized.wav");
        let source = scope.track("source.mp3");
        fs::write(&stuck, b"wav").unwrap();
        fs::write(&source, b"mp3").unwrap();

        let failures = scope.close();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, stuck);
        assert_eq!(failures[0].source.kind(), io::ErrorKind::PermissionDenied);
        // The directory sweep still leaves nothing behind
        assert_eq!(entries(base.path()), 0);
    }

    #[test]
    fn test_untracked_files_are_swept() {
        let base = tempfile::tempdir().unwrap();
        let scope = WorkingScope::create(base.path()).unwrap();
        fs::write(scope.root().join("stray.tmp"), b"x").unwrap();
        drop(scope);
        assert_eq!(entries(base.path()), 0);
    }
}
