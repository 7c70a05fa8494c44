// crates/suite-relay-core/src/runtime/envelope.rs
// ============================================================================
// Module: Envelope Codec
// Description: Length-prefixed, checksum-verified frames for RPC payloads.
// Purpose: Carry requests and results over a stream transport without ambiguity.
// Dependencies: serde_json, sha2, tokio
// ============================================================================

//! ## Overview
//! Every message on the wire is one envelope frame:
//!
//! ```text
//! magic "SRLY" | version u16 | kind u8 | id_len u16 | id | sha256 [32] | len u32 | payload
//! ```
//!
//! All integers are big-endian. Lengths are explicit, so binary payload bytes
//! never need escaping. The version is checked before anything else is read
//! and a mismatch is reported as [`EnvelopeError::UnsupportedVersion`], never
//! decoded on a best-effort basis. The payload checksum is verified before the
//! payload is handed to a JSON parser.
//!
//! Security posture: frames are untrusted. The stream reader refuses an
//! announced payload above the caller's limit before allocating for it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::core::hashing::CHECKSUM_LEN;
use crate::core::hashing::checksum;
use crate::core::identifiers::RequestId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Envelope protocol version spoken by this build.
pub const PROTOCOL_VERSION: u16 = 1;
/// Frame magic bytes.
pub const MAGIC: [u8; 4] = *b"SRLY";
/// Maximum request identifier length in bytes.
pub const MAX_REQUEST_ID_LEN: usize = 1024;
/// Size of the fixed prefix: magic, version, kind, and id length.
const PREFIX_LEN: usize = 4 + 2 + 1 + 2;
/// Size of the checksum and payload length fields.
const TRAILER_HEADER_LEN: usize = CHECKSUM_LEN + 4;

// ============================================================================
// SECTION: Payload Kinds
// ============================================================================

/// Payload type tag carried in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Client asks the agent to execute a suite.
    ExecuteRequest,
    /// Agent reports that execution has started.
    ExecutionAccepted,
    /// Agent returns an execution result.
    ExecutionResult,
    /// Client asks for agent status.
    PingRequest,
    /// Agent returns its status.
    AgentStatus,
    /// Agent refuses a request.
    Rejection,
}

impl PayloadKind {
    /// Returns the wire tag for the kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::ExecuteRequest => 1,
            Self::ExecutionAccepted => 2,
            Self::ExecutionResult => 3,
            Self::PingRequest => 4,
            Self::AgentStatus => 5,
            Self::Rejection => 6,
        }
    }

    /// Parses a wire tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::ExecuteRequest),
            2 => Some(Self::ExecutionAccepted),
            3 => Some(Self::ExecutionResult),
            4 => Some(Self::PingRequest),
            5 => Some(Self::AgentStatus),
            6 => Some(Self::Rejection),
            _ => None,
        }
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecuteRequest => "execute_request",
            Self::ExecutionAccepted => "execution_accepted",
            Self::ExecutionResult => "execution_result",
            Self::PingRequest => "ping_request",
            Self::AgentStatus => "agent_status",
            Self::Rejection => "rejection",
        }
    }
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Versioned, checksummed wrapper around a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Protocol version.
    version: u16,
    /// Correlation identifier.
    request_id: RequestId,
    /// Payload type tag.
    kind: PayloadKind,
    /// Serialized payload bytes.
    payload: Vec<u8>,
    /// SHA-256 checksum of the payload.
    checksum: [u8; CHECKSUM_LEN],
}

impl Envelope {
    /// Wraps raw payload bytes, computing the checksum.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Oversized`] when the identifier or payload
    /// cannot be represented in the frame header.
    pub fn new(
        request_id: RequestId,
        kind: PayloadKind,
        payload: Vec<u8>,
    ) -> Result<Self, EnvelopeError> {
        if request_id.as_str().len() > MAX_REQUEST_ID_LEN {
            return Err(EnvelopeError::Oversized("request id exceeds max length".to_string()));
        }
        if u32::try_from(payload.len()).is_err() {
            return Err(EnvelopeError::Oversized("payload exceeds frame length field".to_string()));
        }
        let checksum = checksum(&payload);
        Ok(Self {
            version: PROTOCOL_VERSION,
            request_id,
            kind,
            payload,
            checksum,
        })
    }

    /// Serializes a message as JSON and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when serialization fails or the frame would be
    /// oversized.
    pub fn from_message<T: Serialize>(
        request_id: RequestId,
        kind: PayloadKind,
        message: &T,
    ) -> Result<Self, EnvelopeError> {
        let payload = serde_json::to_vec(message)
            .map_err(|err| EnvelopeError::Serialization(err.to_string()))?;
        Self::new(request_id, kind, payload)
    }

    /// Decodes the JSON payload after checking the kind.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::UnexpectedKind`] for a different payload kind
    /// and [`EnvelopeError::Malformed`] when the payload does not parse.
    pub fn message<T: DeserializeOwned>(&self, expected: PayloadKind) -> Result<T, EnvelopeError> {
        if self.kind != expected {
            return Err(EnvelopeError::UnexpectedKind {
                expected: expected.as_str(),
                found: self.kind.as_str(),
            });
        }
        serde_json::from_slice(&self.payload)
            .map_err(|err| EnvelopeError::Malformed(format!("invalid payload json: {err}")))
    }

    /// Returns the protocol version.
    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the payload kind.
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload checksum.
    #[must_use]
    pub const fn checksum(&self) -> &[u8; CHECKSUM_LEN] {
        &self.checksum
    }

    /// Returns the number of bytes [`encode`] produces for this envelope.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        PREFIX_LEN + self.request_id.as_str().len() + TRAILER_HEADER_LEN + self.payload.len()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope codec errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Frame structure, checksum, or payload is invalid.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// Frame was produced by an incompatible protocol version.
    #[error("unsupported protocol version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version announced by the peer.
        found: u16,
        /// Version this build speaks.
        supported: u16,
    },
    /// Announced payload exceeds the reader's limit.
    #[error("payload of {announced} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Payload size announced in the header.
        announced: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// Envelope fields exceed what the frame header can express.
    #[error("oversized envelope: {0}")]
    Oversized(String),
    /// Payload kind differs from the one expected.
    #[error("unexpected payload kind {found} (expected {expected})")]
    UnexpectedKind {
        /// Expected kind label.
        expected: &'static str,
        /// Received kind label.
        found: &'static str,
    },
    /// Payload serialization failed.
    #[error("payload serialization failed: {0}")]
    Serialization(String),
    /// Stream I/O failed.
    #[error("envelope io error: {message}")]
    Io {
        /// I/O error description.
        message: String,
        /// I/O error kind (`InvalidData` for TLS alerts surfaced by the stream).
        kind: std::io::ErrorKind,
        /// Whether any byte of the frame had been read when the error occurred.
        started: bool,
    },
}

impl EnvelopeError {
    /// Returns true when the error reflects corrupt or untrusted frame content.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::UnsupportedVersion { .. } | Self::TooLarge { .. })
    }
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes an envelope into a single frame.
#[must_use]
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let id = envelope.request_id.as_str().as_bytes();
    let mut out = Vec::with_capacity(envelope.encoded_len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&envelope.version.to_be_bytes());
    out.push(envelope.kind.tag());
    // Lengths fit: `Envelope::new` bounds both fields.
    let id_len = u16::try_from(id.len()).unwrap_or(u16::MAX);
    out.extend_from_slice(&id_len.to_be_bytes());
    out.extend_from_slice(id);
    out.extend_from_slice(&envelope.checksum);
    let payload_len = u32::try_from(envelope.payload.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&payload_len.to_be_bytes());
    out.extend_from_slice(&envelope.payload);
    out
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Fixed prefix fields parsed from the start of a frame.
struct FramePrefix {
    /// Payload kind.
    kind: PayloadKind,
    /// Request identifier length.
    id_len: usize,
}

/// Parses and validates the fixed frame prefix.
fn parse_prefix(prefix: &[u8; PREFIX_LEN]) -> Result<FramePrefix, EnvelopeError> {
    if prefix[0..4] != MAGIC {
        return Err(EnvelopeError::Malformed("bad frame magic".to_string()));
    }
    let version = u16::from_be_bytes([prefix[4], prefix[5]]);
    if version != PROTOCOL_VERSION {
        return Err(EnvelopeError::UnsupportedVersion {
            found: version,
            supported: PROTOCOL_VERSION,
        });
    }
    let kind = PayloadKind::from_tag(prefix[6])
        .ok_or_else(|| EnvelopeError::Malformed(format!("unknown payload kind {}", prefix[6])))?;
    let id_len = usize::from(u16::from_be_bytes([prefix[7], prefix[8]]));
    if id_len > MAX_REQUEST_ID_LEN {
        return Err(EnvelopeError::Malformed("request id length exceeds limit".to_string()));
    }
    Ok(FramePrefix {
        kind,
        id_len,
    })
}

/// Builds an envelope from parsed parts, verifying id encoding and checksum.
fn assemble(
    kind: PayloadKind,
    id: &[u8],
    expected: [u8; CHECKSUM_LEN],
    payload: Vec<u8>,
) -> Result<Envelope, EnvelopeError> {
    let id = std::str::from_utf8(id)
        .map_err(|_| EnvelopeError::Malformed("request id is not utf-8".to_string()))?;
    if checksum(&payload) != expected {
        return Err(EnvelopeError::Malformed("payload checksum mismatch".to_string()));
    }
    Ok(Envelope {
        version: PROTOCOL_VERSION,
        request_id: RequestId::new(id),
        kind,
        payload,
        checksum: expected,
    })
}

/// Decodes a complete frame.
///
/// # Errors
///
/// Returns [`EnvelopeError::UnsupportedVersion`] for a version mismatch and
/// [`EnvelopeError::Malformed`] for bad magic, unknown kinds, inconsistent
/// lengths, trailing bytes, or a checksum mismatch.
pub fn decode(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
    let truncated = || EnvelopeError::Malformed("truncated frame".to_string());
    let prefix: &[u8; PREFIX_LEN] =
        bytes.get(..PREFIX_LEN).and_then(|slice| slice.try_into().ok()).ok_or_else(truncated)?;
    let parsed = parse_prefix(prefix)?;
    let mut offset = PREFIX_LEN;
    let id = bytes.get(offset..offset + parsed.id_len).ok_or_else(truncated)?;
    offset += parsed.id_len;
    let expected: [u8; CHECKSUM_LEN] = bytes
        .get(offset..offset + CHECKSUM_LEN)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(truncated)?;
    offset += CHECKSUM_LEN;
    let len_bytes: [u8; 4] =
        bytes.get(offset..offset + 4).and_then(|slice| slice.try_into().ok()).ok_or_else(truncated)?;
    offset += 4;
    let payload_len = usize::try_from(u32::from_be_bytes(len_bytes))
        .map_err(|_| EnvelopeError::Malformed("payload length overflow".to_string()))?;
    let remaining = bytes.len() - offset;
    if remaining < payload_len {
        return Err(truncated());
    }
    if remaining > payload_len {
        return Err(EnvelopeError::Malformed("trailing bytes after payload".to_string()));
    }
    assemble(parsed.kind, id, expected, bytes[offset..].to_vec())
}

// ============================================================================
// SECTION: Stream Framing
// ============================================================================

/// Maps an I/O error to an envelope error.
fn io_error(err: &std::io::Error, started: bool) -> EnvelopeError {
    EnvelopeError::Io {
        message: err.to_string(),
        kind: err.kind(),
        started,
    }
}

/// Reads one envelope from a stream.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte.
///
/// # Errors
///
/// Returns [`EnvelopeError::TooLarge`] when the announced payload exceeds
/// `max_payload_bytes`, [`EnvelopeError::Io`] on stream failures, and the
/// [`decode`] errors for invalid frames.
pub async fn read_envelope<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload_bytes: usize,
) -> Result<Option<Envelope>, EnvelopeError> {
    let mut prefix = [0u8; PREFIX_LEN];
    let first = reader.read(&mut prefix[..1]).await.map_err(|err| io_error(&err, false))?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut prefix[1..]).await.map_err(|err| io_error(&err, true))?;
    let parsed = parse_prefix(&prefix)?;
    let mut id = vec![0u8; parsed.id_len];
    reader.read_exact(&mut id).await.map_err(|err| io_error(&err, true))?;
    let mut trailer = [0u8; TRAILER_HEADER_LEN];
    reader.read_exact(&mut trailer).await.map_err(|err| io_error(&err, true))?;
    let mut expected = [0u8; CHECKSUM_LEN];
    expected.copy_from_slice(&trailer[..CHECKSUM_LEN]);
    let announced = u32::from_be_bytes([
        trailer[CHECKSUM_LEN],
        trailer[CHECKSUM_LEN + 1],
        trailer[CHECKSUM_LEN + 2],
        trailer[CHECKSUM_LEN + 3],
    ]);
    let announced = usize::try_from(announced)
        .map_err(|_| EnvelopeError::Malformed("payload length overflow".to_string()))?;
    if announced > max_payload_bytes {
        return Err(EnvelopeError::TooLarge {
            announced,
            limit: max_payload_bytes,
        });
    }
    let mut payload = vec![0u8; announced];
    reader.read_exact(&mut payload).await.map_err(|err| io_error(&err, true))?;
    assemble(parsed.kind, &id, expected, payload).map(Some)
}

/// Writes one envelope to a stream and flushes it.
///
/// # Errors
///
/// Returns [`EnvelopeError::Io`] when the write fails.
pub async fn write_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
) -> Result<(), EnvelopeError> {
    let frame = encode(envelope);
    writer.write_all(&frame).await.map_err(|err| io_error(&err, true))?;
    writer.flush().await.map_err(|err| io_error(&err, true))
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
        clippy::use_debug,
        reason = "Test-only codec assertions."
    )]

    use super::*;

    fn sample() -> Envelope {
        Envelope::new(RequestId::new("req-1"), PayloadKind::PingRequest, b"{}".to_vec()).unwrap()
    }

    #[test]
    fn encode_decode_preserves_all_fields() {
        let envelope = sample();
        let bytes = encode(&envelope);
        assert_eq!(bytes.len(), envelope.encoded_len());
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn version_mismatch_is_distinct_error() {
        let mut bytes = encode(&sample());
        bytes[5] = 9;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnsupportedVersion { found: 9, supported: 1 }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&sample());
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(EnvelopeError::Malformed(_))));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let bytes = encode(&sample());
        assert!(matches!(decode(&bytes[..bytes.len() - 1]), Err(EnvelopeError::Malformed(_))));
        assert!(matches!(decode(&bytes[..3]), Err(EnvelopeError::Malformed(_))));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = encode(&sample());
        bytes[6] = 42;
        assert!(matches!(decode(&bytes), Err(EnvelopeError::Malformed(_))));
    }

    #[test]
    fn message_checks_payload_kind() {
        let envelope = sample();
        let err = envelope.message::<serde_json::Value>(PayloadKind::AgentStatus).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnexpectedKind { .. }));
        let value = envelope.message::<serde_json::Value>(PayloadKind::PingRequest).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[tokio::test]
    async fn stream_reader_returns_none_on_clean_eof() {
        let mut empty: &[u8] = &[];
        assert!(read_envelope(&mut empty, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stream_reader_enforces_limit_before_reading_payload() {
        let envelope =
            Envelope::new(RequestId::new("big"), PayloadKind::Rejection, vec![b'x'; 64]).unwrap();
        let bytes = encode(&envelope);
        let mut reader: &[u8] = &bytes;
        let err = read_envelope(&mut reader, 63).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::TooLarge { announced: 64, limit: 63 }));
    }

    #[tokio::test]
    async fn stream_reader_reads_back_to_back_frames() {
        let first = sample();
        let second =
            Envelope::new(RequestId::new("req-2"), PayloadKind::Rejection, vec![0, 1, 2]).unwrap();
        let mut bytes = encode(&first);
        bytes.extend(encode(&second));
        let mut reader: &[u8] = &bytes;
        assert_eq!(read_envelope(&mut reader, 1024).await.unwrap(), Some(first));
        assert_eq!(read_envelope(&mut reader, 1024).await.unwrap(), Some(second));
        assert_eq!(read_envelope(&mut reader, 1024).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_stream_reports_started_io_error() {
        let bytes = encode(&sample());
        let mut reader: &[u8] = &bytes[..10];
        let err = read_envelope(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::Io { started: true, .. }));
    }
}
