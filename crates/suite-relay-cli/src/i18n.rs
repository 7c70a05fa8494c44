// crates/suite-relay-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Keyed user-facing strings with placeholder substitution.
// Purpose: Keep every line the CLI prints in one reviewed table.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! All runtime output of the `suite-relay` binary is routed through the
//! [`t!`](crate::t) macro, which looks a key up in the catalog and replaces
//! `{name}` placeholders. Unknown keys render as the key itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
#[derive(Clone)]
pub struct MessageArg {
    /// Placeholder name without braces.
    pub key: &'static str,
    /// Preformatted substitution value.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`].
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English catalog entries.
const CATALOG: &[(&str, &str)] = &[
    ("main.version", "suite-relay {version}"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config valid."),
    ("serve.init_failed", "Failed to start agent: {error}"),
    ("serve.listening", "Agent listening on {address} (mutual TLS: {mutual_tls})."),
    ("serve.failed", "Agent stopped with an error: {error}"),
    ("serve.stopped", "Agent stopped."),
    ("client.init_failed", "Failed to initialize client: {error}"),
    ("run.option_invalid", "Invalid --option: {error}"),
    ("run.input_missing", "Input directory {path} does not exist."),
    ("run.failed", "Suite run failed: {error}"),
    ("run.retry_hint", "The failure happened before the agent saw the request; retrying is safe."),
    ("run.summary", "Status: {status} (exit code {exit_code}) after {attempts} attempt(s)."),
    ("run.request_id", "Request: {request_id}"),
    ("run.message", "Agent message: {message}"),
    ("run.artifact", "Artifact: {path}"),
    ("ping.failed", "Agent unreachable: {error}"),
    (
        "ping.ok",
        "Agent reachable: version {version}, protocol {protocol}, busy {busy}, mutual TLS \
         {mutual_tls} ({attempts} attempt(s)).",
    ),
];

/// Returns the catalog as a map.
fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_MAP.get_or_init(|| CATALOG.iter().copied().collect())
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Renders `key` with `args` substituted.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}
