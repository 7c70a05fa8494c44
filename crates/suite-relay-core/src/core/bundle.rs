// crates/suite-relay-core/src/core/bundle.rs
// ============================================================================
// Module: Suite Bundles
// Description: File entries, execution options, and suite bundles.
// Purpose: Model a transportable snapshot of a test suite directory.
// Dependencies: base64, serde
// ============================================================================

//! ## Overview
//! A [`SuiteBundle`] is an ordered list of [`FileEntry`] values, the entry
//! point handed to the execution engine, and a map of typed execution options.
//! File contents travel as base64 inside the JSON payload so binary resources
//! survive the envelope unchanged.
//!
//! Security posture: every path is untrusted. [`validate_relative_path`] is the
//! single gate used by the packager, the agent, and the client before anything
//! touches the filesystem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single path component.
pub const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total length of a bundle-relative path.
pub const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Option Values
// ============================================================================

/// Execution option value forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    /// Single string value (for example a log level).
    String(String),
    /// Boolean switch.
    Bool(bool),
    /// Repeated string values (for example include tags).
    StringList(Vec<String>),
}

/// Execution options keyed by option name.
pub type ExecutionOptions = BTreeMap<String, OptionValue>;

// ============================================================================
// SECTION: File Entries
// ============================================================================

/// Single file carried inside a bundle or a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// POSIX-style path relative to the bundle root.
    pub path: String,
    /// Raw file contents.
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Unix permission bits when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

impl FileEntry {
    /// Creates a file entry without mode bits.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mode: None,
        }
    }

    /// Attaches Unix permission bits.
    #[must_use]
    pub const fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

// ============================================================================
// SECTION: Suite Bundle
// ============================================================================

/// Transportable snapshot of a suite directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteBundle {
    /// Files in deterministic (sorted) order.
    pub files: Vec<FileEntry>,
    /// Path of the file handed to the execution engine.
    pub entry_point: String,
    /// Options forwarded to the execution engine.
    #[serde(default)]
    pub options: ExecutionOptions,
}

impl SuiteBundle {
    /// Builds and validates a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError`] when a path is unsafe, duplicated, or the entry
    /// point is not among the files.
    pub fn new(
        files: Vec<FileEntry>,
        entry_point: impl Into<String>,
        options: ExecutionOptions,
    ) -> Result<Self, BundleError> {
        let bundle = Self {
            files,
            entry_point: entry_point.into(),
            options,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Checks path safety, uniqueness, and entry point presence.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), BundleError> {
        let mut seen = BTreeSet::new();
        for entry in &self.files {
            validate_relative_path(&entry.path)?;
            if !seen.insert(entry.path.as_str()) {
                return Err(BundleError::DuplicatePath(entry.path.clone()));
            }
        }
        validate_relative_path(&self.entry_point)?;
        if !seen.contains(self.entry_point.as_str()) {
            return Err(BundleError::MissingEntryPoint(self.entry_point.clone()));
        }
        Ok(())
    }

    /// Returns the set of relative paths carried by the bundle.
    #[must_use]
    pub fn paths(&self) -> BTreeSet<String> {
        self.files.iter().map(|entry| entry.path.clone()).collect()
    }

    /// Returns the total number of content bytes.
    #[must_use]
    pub fn content_bytes(&self) -> usize {
        self.files.iter().map(|entry| entry.content.len()).sum()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bundle validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    /// Path escapes the bundle root or is otherwise unsafe.
    #[error("unsafe path {path:?}: {reason}")]
    UnsafePath {
        /// Offending path.
        path: String,
        /// Violation description.
        reason: &'static str,
    },
    /// Two entries share the same path.
    #[error("duplicate path {0:?}")]
    DuplicatePath(String),
    /// Entry point is not part of the bundle.
    #[error("entry point {0:?} not found in bundle")]
    MissingEntryPoint(String),
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

/// Validates a bundle-relative POSIX path.
///
/// Accepts only `segment/segment/...` forms where every segment is a normal
/// name. Absolute paths, drive prefixes, backslashes, `.`/`..` segments, empty
/// segments, and NUL bytes are rejected.
///
/// # Errors
///
/// Returns [`BundleError::UnsafePath`] naming the violation.
pub fn validate_relative_path(path: &str) -> Result<(), BundleError> {
    let reject = |reason: &'static str| BundleError::UnsafePath {
        path: path.to_string(),
        reason,
    };
    if path.is_empty() {
        return Err(reject("path is empty"));
    }
    if path.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(reject("path exceeds max length"));
    }
    if path.contains('\0') {
        return Err(reject("path contains nul byte"));
    }
    if path.contains('\\') {
        return Err(reject("path contains backslash"));
    }
    if path.starts_with('/') {
        return Err(reject("absolute path not allowed"));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(reject("drive prefix not allowed"));
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err(reject("empty path segment")),
            "." => return Err(reject("current-directory segment not allowed")),
            ".." => return Err(reject("path escapes bundle root")),
            _ if segment.len() > MAX_PATH_COMPONENT_LENGTH => {
                return Err(reject("path component too long"));
            }
            _ => {}
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Base64 Serde
// ============================================================================

/// Serde adapter encoding byte vectors as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    /// Serializes bytes as a base64 string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserializes a base64 string into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
