// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
enum MockEntry {
    File,
    Dir,
}

/// In-memory tree of files and directories.
///
/// Paths are stored as given; parents are created implicitly. There is no
/// content, since nothing in the supervisor reads watched files.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        Self::ensure_parents(&mut entries, path);
        entries.insert(path.to_path_buf(), MockEntry::File);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        Self::ensure_parents(&mut entries, path);
        entries.insert(path.to_path_buf(), MockEntry::Dir);
    }

    /// Remove a path and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.lock().retain(|p, _| !p.starts_with(path));
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_parents(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = path.parent();
        while let Some(parent) = current {
            if parent.as_os_str().is_empty() {
                break;
            }
            entries.entry(parent.to_path_buf()).or_insert(MockEntry::Dir);
            current = parent.parent();
        }
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        if self.exists(path) {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("not found: {:?}", path))
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.lock();
        match entries.get(path) {
            Some(MockEntry::Dir) => Ok(entries
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect()),
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_create_their_parent_directories() {
        let fs = MockFileSystem::new();
        fs.add_file("/proj/src/app/main.js");

        assert!(fs.is_dir(Path::new("/proj/src/app")));
        assert!(fs.is_dir(Path::new("/proj")));
        assert!(fs.is_file(Path::new("/proj/src/app/main.js")));
        assert_eq!(
            fs.read_dir(Path::new("/proj/src")).unwrap(),
            vec![PathBuf::from("/proj/src/app")]
        );
    }

    #[test]
    fn remove_drops_the_whole_subtree() {
        let fs = MockFileSystem::new();
        fs.add_file("/proj/lib/a.js");
        fs.add_file("/proj/lib/b.js");
        fs.remove("/proj/lib");

        assert!(!fs.exists(Path::new("/proj/lib/a.js")));
        assert!(fs.read_dir(Path::new("/proj/lib")).is_err());
        assert!(fs.is_dir(Path::new("/proj")));
    }
}
