// crates/suite-relay-core/src/runtime/packager.rs
// ============================================================================
// Module: Suite Packager
// Description: Directory snapshots into bundles and staged materialization.
// Purpose: Move suite files between disk and the wire without escaping roots.
// Dependencies: std::fs
// ============================================================================

//! ## Overview
//! [`Packager::pack`] walks a suite directory and produces a [`SuiteBundle`]
//! in sorted path order. [`unpack`] writes bundle files back under a
//! destination directory, staging each file next to its final location and
//! renaming it into place.
//!
//! Security posture: symlinks are resolved and must stay inside the root.
//! Symlinked files are packed as regular files; symlinked directories are
//! never descended. Unpack validates every path before touching the disk and
//! rolls back every written file on failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::bundle::BundleError;
use crate::core::bundle::ExecutionOptions;
use crate::core::bundle::FileEntry;
use crate::core::bundle::SuiteBundle;
use crate::core::bundle::validate_relative_path;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Suffix appended to staging files during unpack.
const STAGING_SUFFIX: &str = ".suite-relay-staging";
/// Permission bits preserved across pack and unpack.
const MODE_MASK: u32 = 0o777;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Packaging and materialization errors.
#[derive(Debug, Error)]
pub enum PackError {
    /// Path escapes its root or is otherwise unsafe.
    #[error("path security violation for {path}: {reason}")]
    PathSecurity {
        /// Offending path.
        path: String,
        /// Violation description.
        reason: String,
    },
    /// Reading the source tree failed.
    #[error("failed to read {path}: {message}")]
    Read {
        /// Path being read.
        path: String,
        /// I/O error description.
        message: String,
    },
    /// Writing the destination tree failed; written files were removed.
    #[error("failed to write {path}: {message}")]
    Write {
        /// Path being written.
        path: String,
        /// I/O error description.
        message: String,
    },
    /// Resulting bundle is structurally invalid.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),
    /// Bundle contents exceed the configured size limit.
    #[error("bundle content of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Total content bytes.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },
}

impl From<BundleError> for PackError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::UnsafePath {
                path,
                reason,
            } => Self::PathSecurity {
                path,
                reason: reason.to_string(),
            },
            other => Self::InvalidBundle(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Packager
// ============================================================================

/// Directory walker producing bundles and file snapshots.
#[derive(Debug, Clone, Default)]
pub struct Packager {
    /// Lowercase extensions to include; `None` includes every file.
    extensions: Option<BTreeSet<String>>,
    /// Maximum total content bytes per bundle.
    max_bundle_bytes: Option<usize>,
}

impl Packager {
    /// Creates a packager that includes every regular file without a limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts packing to files with the given extensions (case-insensitive,
    /// without the leading dot). The entry point is always included.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.extensions = if set.is_empty() { None } else { Some(set) };
        self
    }

    /// Caps the total content bytes of a packed bundle.
    #[must_use]
    pub const fn with_max_bundle_bytes(mut self, limit: usize) -> Self {
        self.max_bundle_bytes = Some(limit);
        self
    }

    /// Packs a suite directory into a validated bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::PathSecurity`] for unsafe paths or escaping
    /// symlinks, [`PackError::Read`] on I/O failures,
    /// [`PackError::InvalidBundle`] when the entry point is missing, and
    /// [`PackError::TooLarge`] when the size limit is exceeded.
    pub fn pack(
        &self,
        root: &Path,
        entry_point: &str,
        options: ExecutionOptions,
    ) -> Result<SuiteBundle, PackError> {
        validate_relative_path(entry_point)?;
        let files: Vec<FileEntry> = self
            .snapshot(root)?
            .into_iter()
            .filter(|entry| entry.path == entry_point || self.includes(&entry.path))
            .collect();
        let size: usize = files.iter().map(|entry| entry.content.len()).sum();
        if let Some(limit) = self.max_bundle_bytes
            && size > limit
        {
            return Err(PackError::TooLarge {
                size,
                limit,
            });
        }
        Ok(SuiteBundle::new(files, entry_point, options)?)
    }

    /// Reads every regular file under `root` in sorted path order.
    ///
    /// The extension filter does not apply to snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`PackError`] on unsafe paths, escaping symlinks, or I/O
    /// failures.
    pub fn snapshot(&self, root: &Path) -> Result<Vec<FileEntry>, PackError> {
        let root = fs::canonicalize(root).map_err(|err| read_error(root, &err))?;
        let mut pending = vec![root.clone()];
        let mut files = Vec::new();
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|err| read_error(&dir, &err))?;
            for entry in entries {
                let entry = entry.map_err(|err| read_error(&dir, &err))?;
                let path = entry.path();
                let metadata = fs::symlink_metadata(&path).map_err(|err| read_error(&path, &err))?;
                let file_type = metadata.file_type();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    files.push(read_entry(&root, &path, &path)?);
                } else if file_type.is_symlink() {
                    let target = resolve_symlink(&root, &path)?;
                    if target.is_file() {
                        files.push(read_entry(&root, &path, &target)?);
                    }
                }
            }
        }
        files.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(files)
    }

    /// Returns true when the extension filter admits the path.
    fn includes(&self, path: &str) -> bool {
        let Some(extensions) = &self.extensions else {
            return true;
        };
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// Packs a directory with the default packager (no filter, no limit).
///
/// # Errors
///
/// Returns [`PackError`] as described on [`Packager::pack`].
pub fn pack(
    root: &Path,
    entry_point: &str,
    options: ExecutionOptions,
) -> Result<SuiteBundle, PackError> {
    Packager::new().pack(root, entry_point, options)
}

// ============================================================================
// SECTION: Pack Helpers
// ============================================================================

/// Builds a read error for a path.
fn read_error(path: &Path, err: &std::io::Error) -> PackError {
    PackError::Read {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Resolves a symlink and requires the target to stay inside `root`.
fn resolve_symlink(root: &Path, link: &Path) -> Result<PathBuf, PackError> {
    let target = fs::canonicalize(link).map_err(|err| PackError::PathSecurity {
        path: link.display().to_string(),
        reason: format!("unresolvable symlink: {err}"),
    })?;
    if !target.starts_with(root) {
        return Err(PackError::PathSecurity {
            path: link.display().to_string(),
            reason: "symlink resolves outside the suite root".to_string(),
        });
    }
    Ok(target)
}

/// Converts an absolute path under `root` into a bundle-relative POSIX path.
fn relative_path(root: &Path, path: &Path) -> Result<String, PackError> {
    let relative = path.strip_prefix(root).map_err(|_| PackError::PathSecurity {
        path: path.display().to_string(),
        reason: "path is outside the suite root".to_string(),
    })?;
    let mut segments = Vec::new();
    for component in relative.components() {
        let Component::Normal(segment) = component else {
            return Err(PackError::PathSecurity {
                path: path.display().to_string(),
                reason: "unexpected path component".to_string(),
            });
        };
        let segment = segment.to_str().ok_or_else(|| PackError::PathSecurity {
            path: path.display().to_string(),
            reason: "path is not valid utf-8".to_string(),
        })?;
        segments.push(segment);
    }
    let joined = segments.join("/");
    validate_relative_path(&joined)?;
    Ok(joined)
}

/// Reads one file into an entry named after `path` with bytes from `source`.
fn read_entry(root: &Path, path: &Path, source: &Path) -> Result<FileEntry, PackError> {
    let relative = relative_path(root, path)?;
    let content = fs::read(source).map_err(|err| read_error(source, &err))?;
    let entry = FileEntry::new(relative, content);
    Ok(match file_mode(source) {
        Some(mode) => entry.with_mode(mode),
        None => entry,
    })
}

/// Returns the permission bits of a file on Unix.
#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|metadata| metadata.permissions().mode() & MODE_MASK)
}

/// Returns no permission bits on non-Unix platforms.
#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

// ============================================================================
// SECTION: Unpack
// ============================================================================

/// Materializes a bundle under `destination`.
///
/// # Errors
///
/// Returns [`PackError`] as described on [`unpack_files`].
pub fn unpack(bundle: &SuiteBundle, destination: &Path) -> Result<Vec<PathBuf>, PackError> {
    unpack_files(&bundle.files, destination)
}

/// Writes file entries under `destination` and returns the written paths.
///
/// Every path is validated before anything is written. Each file is written
/// to a staging name in its final directory and renamed into place. On any
/// failure the staging file and every file already written are removed.
///
/// # Errors
///
/// Returns [`PackError::PathSecurity`] for unsafe or duplicate paths (nothing
/// written) and [`PackError::Write`] when writing fails.
pub fn unpack_files(files: &[FileEntry], destination: &Path) -> Result<Vec<PathBuf>, PackError> {
    let mut seen = BTreeSet::new();
    for entry in files {
        validate_relative_path(&entry.path)?;
        if !seen.insert(entry.path.as_str()) {
            return Err(PackError::PathSecurity {
                path: entry.path.clone(),
                reason: "duplicate path".to_string(),
            });
        }
    }
    fs::create_dir_all(destination).map_err(|err| write_error(destination, &err))?;
    let root = fs::canonicalize(destination).map_err(|err| write_error(destination, &err))?;
    let mut written = Vec::with_capacity(files.len());
    for entry in files {
        match write_entry(&root, entry) {
            Ok(path) => written.push(path),
            Err(err) => {
                for path in &written {
                    let _ = fs::remove_file(path);
                }
                return Err(err);
            }
        }
    }
    Ok(written)
}

/// Builds a write error for a path.
fn write_error(path: &Path, err: &std::io::Error) -> PackError {
    PackError::Write {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Stages and renames a single entry into place under `root`.
fn write_entry(root: &Path, entry: &FileEntry) -> Result<PathBuf, PackError> {
    let target = root.join(&entry.path);
    let parent = target.parent().unwrap_or(root).to_path_buf();
    fs::create_dir_all(&parent).map_err(|err| write_error(&parent, &err))?;
    let resolved_parent = fs::canonicalize(&parent).map_err(|err| write_error(&parent, &err))?;
    if !resolved_parent.starts_with(root) {
        return Err(PackError::PathSecurity {
            path: entry.path.clone(),
            reason: "destination directory resolves outside the root".to_string(),
        });
    }
    let file_name = target.file_name().map(|name| name.to_string_lossy().into_owned()).ok_or_else(
        || PackError::PathSecurity {
            path: entry.path.clone(),
            reason: "missing file name".to_string(),
        },
    )?;
    let target = resolved_parent.join(&file_name);
    let staging = resolved_parent.join(format!(".{file_name}{STAGING_SUFFIX}"));
    let result = write_staged(&staging, &target, entry);
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result.map(|()| target)
}

/// Writes the staging file, applies mode bits, and renames it to `target`.
fn write_staged(staging: &Path, target: &Path, entry: &FileEntry) -> Result<(), PackError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(staging)
        .map_err(|err| write_error(staging, &err))?;
    file.write_all(&entry.content).map_err(|err| write_error(staging, &err))?;
    file.sync_all().map_err(|err| write_error(staging, &err))?;
    drop(file);
    apply_mode(staging, entry.mode)?;
    fs::rename(staging, target).map_err(|err| write_error(target, &err))
}

/// Restores permission bits on Unix.
#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<(), PackError> {
    use std::os::unix::fs::PermissionsExt;
    let Some(mode) = mode else {
        return Ok(());
    };
    fs::set_permissions(path, fs::Permissions::from_mode(mode & MODE_MASK))
        .map_err(|err| write_error(path, &err))
}

/// Ignores permission bits on non-Unix platforms.
#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<(), PackError> {
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only packager assertions."
    )]

    use super::*;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn pack_walks_nested_directories_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "suite.robot", b"*** Test Cases ***");
        write(dir.path(), "b/z.txt", b"z");
        write(dir.path(), "a/y.resource", b"y");
        let bundle = pack(dir.path(), "suite.robot", ExecutionOptions::new()).unwrap();
        let paths: Vec<&str> = bundle.files.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, vec!["a/y.resource", "b/z.txt", "suite.robot"]);
    }

    #[test]
    fn extension_filter_keeps_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.suite", b"entry");
        write(dir.path(), "keep.robot", b"k");
        write(dir.path(), "drop.bin", b"d");
        let bundle = Packager::new()
            .with_extensions(["robot", ".TXT"])
            .pack(dir.path(), "main.suite", ExecutionOptions::new())
            .unwrap();
        let paths: Vec<&str> = bundle.files.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, vec!["keep.robot", "main.suite"]);
    }

    #[test]
    fn pack_reports_missing_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "other.robot", b"x");
        let err = pack(dir.path(), "suite.robot", ExecutionOptions::new()).unwrap_err();
        assert!(matches!(err, PackError::InvalidBundle(_)));
    }

    #[test]
    fn pack_rejects_traversal_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let err = pack(dir.path(), "../escape.txt", ExecutionOptions::new()).unwrap_err();
        assert!(matches!(err, PackError::PathSecurity { .. }));
    }

    #[test]
    fn pack_enforces_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "suite.robot", &[b'x'; 32]);
        let err = Packager::new()
            .with_max_bundle_bytes(16)
            .pack(dir.path(), "suite.robot", ExecutionOptions::new())
            .unwrap_err();
        assert!(matches!(err, PackError::TooLarge { size: 32, limit: 16 }));
    }

    #[cfg(unix)]
    #[test]
    fn pack_rejects_symlink_outside_root() {
        let outside = tempfile::tempdir().unwrap();
        write(outside.path(), "secret.txt", b"secret");
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "suite.robot", b"x");
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("leak.txt"))
            .unwrap();
        let err = pack(dir.path(), "suite.robot", ExecutionOptions::new()).unwrap_err();
        assert!(matches!(err, PackError::PathSecurity { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn pack_follows_inner_file_symlinks_but_not_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "suite.robot", b"x");
        write(dir.path(), "data/real.txt", b"real");
        std::os::unix::fs::symlink(dir.path().join("data/real.txt"), dir.path().join("alias.txt"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("data"), dir.path().join("linked")).unwrap();
        let bundle = pack(dir.path(), "suite.robot", ExecutionOptions::new()).unwrap();
        let paths: Vec<&str> = bundle.files.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, vec!["alias.txt", "data/real.txt", "suite.robot"]);
        assert_eq!(bundle.files[0].content, b"real");
    }

    #[test]
    fn unpack_rejects_unsafe_paths_before_writing() {
        let dest = tempfile::tempdir().unwrap();
        let files = vec![
            FileEntry::new("ok.txt", b"fine".to_vec()),
            FileEntry::new("../escape.txt", b"bad".to_vec()),
        ];
        let err = unpack_files(&files, dest.path()).unwrap_err();
        assert!(matches!(err, PackError::PathSecurity { .. }));
        assert!(!dest.path().join("ok.txt").exists());
        assert!(!dest.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn unpack_rolls_back_written_files_on_failure() {
        let dest = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed makes the second write fail.
        write(dest.path(), "blocker", b"file");
        let files = vec![
            FileEntry::new("first.txt", b"1".to_vec()),
            FileEntry::new("blocker/second.txt", b"2".to_vec()),
        ];
        let err = unpack_files(&files, dest.path()).unwrap_err();
        assert!(matches!(err, PackError::Write { .. }));
        assert!(!dest.path().join("first.txt").exists());
        let leftovers: Vec<_> = fs::read_dir(dest.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn unpack_restores_mode_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dest = tempfile::tempdir().unwrap();
        let files = vec![FileEntry::new("run.sh", b"#!/bin/sh\n".to_vec()).with_mode(0o750)];
        unpack_files(&files, dest.path()).unwrap();
        let mode = fs::metadata(dest.path().join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & MODE_MASK, 0o750);
    }
}
