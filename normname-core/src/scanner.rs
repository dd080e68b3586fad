use crate::error::{EngineError, EngineResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Normalize a path by removing Windows long path prefix if present
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let path_str = path.to_string_lossy();
        if let Some(stripped) = path_str.strip_prefix("\\\\?\\") {
            PathBuf::from(stripped)
        } else {
            path.to_path_buf()
        }
    }
    #[cfg(not(windows))]
    {
        path.to_path_buf()
    }
}

/// A directory entry found by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the entry
    pub path: PathBuf,
    /// Final path component, lossily converted to UTF-8
    pub name: String,
    pub is_dir: bool,
    #[serde(default)]
    pub is_symlink: bool,
}

impl FileRecord {
    /// Build a record from a path on disk without following symlinks
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::symlink_metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

        Ok(Self {
            path: path.to_path_buf(),
            name,
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
        })
    }

    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// An entry the scanner could not read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// List all descendants instead of immediate children
    pub recursive: bool,
    /// Include names starting with a dot
    pub include_hidden: bool,
    /// Traverse symbolic links to directories (off by default to avoid cycles)
    pub follow_symlinks: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Absolute root that was scanned
    pub root: PathBuf,
    /// Entries in lexicographic path order
    pub records: Vec<FileRecord>,
    /// Descendants that could not be read
    pub skipped: Vec<SkippedEntry>,
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Resolve and validate the scan root. Failures here are fatal.
pub fn resolve_root(root: &Path) -> EngineResult<PathBuf> {
    let metadata = match fs::metadata(root) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::RootNotFound(root.to_path_buf()));
        },
        Err(source) => {
            return Err(EngineError::RootUnreadable {
                path: root.to_path_buf(),
                source,
            });
        },
    };

    if !metadata.is_dir() {
        return Err(EngineError::RootNotDirectory(root.to_path_buf()));
    }

    let canonical = fs::canonicalize(root).map_err(|source| EngineError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    Ok(normalize_path(&canonical))
}

/// List the entries under `root`.
///
/// A root that cannot be opened is returned as an error. Descendants that
/// cannot be read are reported in [`ScanReport::skipped`].
pub fn scan(root: &Path, options: &ScanOptions) -> EngineResult<ScanReport> {
    let root = resolve_root(root)?;

    // Opening the root up front turns a permission problem into a fatal error
    // instead of a skipped entry.
    fs::read_dir(&root).map_err(|source| EngineError::RootUnreadable {
        path: root.clone(),
        source,
    })?;

    let mut report = if options.recursive {
        scan_recursive(&root, options)
    } else {
        scan_children(&root, options)?
    };

    report.records.sort_by(|a, b| a.path.cmp(&b.path));
    report.skipped.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::info!(
        root = %root.display(),
        records = report.records.len(),
        skipped = report.skipped.len(),
        recursive = options.recursive,
        "Scan complete"
    );

    Ok(report)
}

fn scan_children(root: &Path, options: &ScanOptions) -> EngineResult<ScanReport> {
    let mut report = ScanReport {
        root: root.to_path_buf(),
        ..ScanReport::default()
    };

    let entries = fs::read_dir(root).map_err(|source| EngineError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                report.skipped.push(SkippedEntry {
                    path: root.to_path_buf(),
                    kind: ErrorKind::classify(&e),
                    detail: e.to_string(),
                });
                continue;
            },
        };

        if !options.include_hidden && is_hidden(&entry.file_name()) {
            continue;
        }

        let path = entry.path();
        match FileRecord::from_path(&path) {
            Ok(record) => report.records.push(record),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push(SkippedEntry {
                    path,
                    kind: ErrorKind::classify(&e),
                    detail: e.to_string(),
                });
            },
        }
    }

    Ok(report)
}

fn scan_recursive(root: &Path, options: &ScanOptions) -> ScanReport {
    let mut report = ScanReport {
        root: root.to_path_buf(),
        ..ScanReport::default()
    };

    let include_hidden = options.include_hidden;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| include_hidden || !is_hidden(e.file_name()));

    for entry in walker {
        match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                report.records.push(FileRecord {
                    path: entry.path().to_path_buf(),
                    name: entry.file_name().to_string_lossy().into_owned(),
                    is_dir: file_type.is_dir(),
                    is_symlink: entry.path_is_symlink(),
                });
            },
            Err(e) => {
                let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                let kind = e.io_error().map_or(ErrorKind::Unknown, ErrorKind::classify);
                tracing::warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push(SkippedEntry {
                    path,
                    kind,
                    detail: e.to_string(),
                });
            },
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("A.txt"), "a").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();
        fs::create_dir(root.join("Sub Dir")).unwrap();
        fs::write(root.join("Sub Dir").join("Inner File.md"), "i").unwrap();
        temp_dir
    }

    #[test]
    fn test_scan_immediate_children_sorted() {
        let temp_dir = setup_tree();
        let report = scan(temp_dir.path(), &ScanOptions::default()).unwrap();

        let names: Vec<_> = report.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A.txt", "Sub Dir", "b.txt"]);
        assert!(report.records[1].is_dir);
        assert!(report.records.iter().all(|r| r.path.is_absolute()));
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_scan_recursive_lists_descendants() {
        let temp_dir = setup_tree();
        let options = ScanOptions {
            recursive: true,
            ..ScanOptions::default()
        };
        let report = scan(temp_dir.path(), &options).unwrap();

        let names: Vec<_> = report.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A.txt", "Sub Dir", "Inner File.md", "b.txt"]);
    }

    #[test]
    fn test_scan_includes_hidden_when_asked() {
        let temp_dir = setup_tree();
        let options = ScanOptions {
            include_hidden: true,
            ..ScanOptions::default()
        };
        let report = scan(temp_dir.path(), &options).unwrap();
        assert!(report.records.iter().any(|r| r.name == ".hidden"));
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let err = scan(&missing, &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::RootNotFound(_)));
    }

    #[test]
    fn test_scan_file_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        let err = scan(&file, &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::RootNotDirectory(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_listed_but_not_traversed() {
        let temp_dir = setup_tree();
        let root = temp_dir.path();
        std::os::unix::fs::symlink(root.join("Sub Dir"), root.join("link")).unwrap();

        let options = ScanOptions {
            recursive: true,
            ..ScanOptions::default()
        };
        let report = scan(root, &options).unwrap();

        let link = report.records.iter().find(|r| r.name == "link").unwrap();
        assert!(link.is_symlink);
        assert!(!link.is_dir);
        let inner_count = report
            .records
            .iter()
            .filter(|r| r.name == "Inner File.md")
            .count();
        assert_eq!(inner_count, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_descendant_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        // Root ignores permission bits
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let temp_dir = setup_tree();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("secret.txt"), "s").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let options = ScanOptions {
            recursive: true,
            ..ScanOptions::default()
        };
        let report = scan(temp_dir.path(), &options).unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].kind, ErrorKind::PermissionDenied);
        assert!(report.records.iter().any(|r| r.name == "locked"));
        assert!(!report.records.iter().any(|r| r.name == "secret.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_root_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("sealed");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("Inside.txt"), "x").unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o000)).unwrap();

        let result = scan(&root, &ScanOptions::default());

        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            Err(EngineError::RootUnreadable { path, source }) => {
                assert!(path.ends_with("sealed"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            },
            other => panic!("expected RootUnreadable, got {other:?}"),
        }
    }
}
