// crates/suite-relay-core/src/runtime/mod.rs
// ============================================================================
// Module: Suite Relay Runtime Helpers
// Description: Envelope codec and suite packager.
// Purpose: Move bundles between the filesystem and the wire.
// Dependencies: crate::core, tokio
// ============================================================================

//! ## Overview
//! Runtime helpers are the moving parts around the core types: the envelope
//! codec frames payloads for a stream transport, and the packager converts
//! directories to bundles and back with strict path checks.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod envelope;
pub mod packager;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use envelope::Envelope;
pub use envelope::EnvelopeError;
pub use envelope::PROTOCOL_VERSION;
pub use envelope::PayloadKind;
pub use envelope::decode;
pub use envelope::encode;
pub use envelope::read_envelope;
pub use envelope::write_envelope;
pub use packager::PackError;
pub use packager::Packager;
pub use packager::pack;
pub use packager::unpack;
pub use packager::unpack_files;
