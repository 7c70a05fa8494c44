// crates/suite-relay-cli/src/options.rs
// ============================================================================
// Module: Run Options
// Description: Map CLI selection flags to typed engine options.
// Purpose: Build the option map forwarded with an execution request.
// Dependencies: suite-relay-core, thiserror
// ============================================================================

//! ## Overview
//! Test selection flags (`--include`, `--exclude`, `--test`, `--suite`,
//! `--log-level`) become the engine options `include`, `exclude`, `test`,
//! `suite`, and `loglevel`. Free-form `--option name=value` entries are added
//! as strings; `--option name` sets a boolean flag; repeating a name collects
//! the values into a list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use suite_relay_core::ExecutionOptions;
use suite_relay_core::OptionValue;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Selection flags collected from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilters {
    /// Tags to include.
    pub include: Vec<String>,
    /// Tags to exclude.
    pub exclude: Vec<String>,
    /// Test names to select.
    pub test: Vec<String>,
    /// Suite names to select.
    pub suite: Vec<String>,
    /// Engine log level.
    pub log_level: Option<String>,
    /// Raw `name=value` or `name` entries.
    pub extra: Vec<String>,
}

/// Invalid `--option` entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    /// Entry has no name.
    #[error("option name is empty")]
    EmptyName,
    /// Name contains characters other than letters, digits, `-`, and `_`, or
    /// does not start with a letter.
    #[error("option name {0:?} must start with a letter and contain only letters, digits, - or _")]
    InvalidName(String),
    /// Name conflicts with a boolean flag of the same name.
    #[error("option {0:?} is used both as a flag and with a value")]
    Conflict(String),
}

// ============================================================================
// SECTION: Building
// ============================================================================

/// Builds engine options from command-line filters.
///
/// # Errors
///
/// Returns [`OptionError`] when an `--option` entry is malformed.
pub fn build_options(filters: &RunFilters) -> Result<ExecutionOptions, OptionError> {
    let mut options = ExecutionOptions::new();
    for (name, values) in [
        ("include", &filters.include),
        ("exclude", &filters.exclude),
        ("test", &filters.test),
        ("suite", &filters.suite),
    ] {
        if !values.is_empty() {
            options.insert(name.to_string(), OptionValue::StringList(values.clone()));
        }
    }
    if let Some(level) = &filters.log_level {
        options.insert("loglevel".to_string(), OptionValue::String(level.clone()));
    }
    for raw in &filters.extra {
        let (name, value) = parse_option(raw)?;
        merge(&mut options, name, value)?;
    }
    Ok(options)
}

/// Splits `name=value` or `name` and validates the name.
///
/// # Errors
///
/// Returns [`OptionError`] for an empty or invalid name.
pub fn parse_option(raw: &str) -> Result<(String, Option<String>), OptionError> {
    let (name, value) = match raw.split_once('=') {
        Some((name, value)) => (name.trim(), Some(value.to_string())),
        None => (raw.trim(), None),
    };
    if name.is_empty() {
        return Err(OptionError::EmptyName);
    }
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(OptionError::InvalidName(name.to_string()));
    }
    Ok((name.to_string(), value))
}

/// Inserts one entry, collecting repeated names into a list.
fn merge(
    options: &mut ExecutionOptions,
    name: String,
    value: Option<String>,
) -> Result<(), OptionError> {
    let Some(value) = value else {
        return match options.get(&name) {
            None | Some(OptionValue::Bool(_)) => {
                options.insert(name, OptionValue::Bool(true));
                Ok(())
            }
            Some(_) => Err(OptionError::Conflict(name)),
        };
    };
    match options.remove(&name) {
        None => {
            options.insert(name, OptionValue::String(value));
        }
        Some(OptionValue::String(first)) => {
            options.insert(name, OptionValue::StringList(vec![first, value]));
        }
        Some(OptionValue::StringList(mut items)) => {
            items.push(value);
            options.insert(name, OptionValue::StringList(items));
        }
        Some(OptionValue::Bool(_)) => return Err(OptionError::Conflict(name)),
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
