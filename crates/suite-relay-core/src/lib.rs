// crates/suite-relay-core/src/lib.rs
// ============================================================================
// Module: Suite Relay Core Library
// Description: Public API surface for the Suite Relay core.
// Purpose: Expose core types, the envelope codec, and the suite packager.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! Suite Relay core holds everything both ends of the wire agree on: the
//! bundle and result model, the length-prefixed envelope codec, and the
//! packager that turns a directory into a bundle and back. It performs no
//! networking; transports and orchestration live in sibling crates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use runtime::Envelope;
pub use runtime::EnvelopeError;
pub use runtime::PROTOCOL_VERSION;
pub use runtime::PackError;
pub use runtime::Packager;
pub use runtime::PayloadKind;
pub use runtime::decode;
pub use runtime::encode;
pub use runtime::pack;
pub use runtime::read_envelope;
pub use runtime::unpack;
pub use runtime::unpack_files;
pub use runtime::write_envelope;
