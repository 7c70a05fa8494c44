// crates/suite-relay-agent/src/runtime.rs
// ============================================================================
// Module: Agent Runtime
// Description: TLS accept loop and per-connection request dispatch.
// Purpose: Own listener, slot, ledger, orchestrator, and audit sink.
// Dependencies: tokio, suite-relay-core, suite-relay-transport
// ============================================================================

//! ## Overview
//! One task per accepted connection completes the handshake, then reads
//! envelopes until the peer closes. `Ping` is answered inline. `Execute`
//! is validated, checked against the idempotency ledger, admitted through
//! the execution slot, acknowledged with `ExecutionAccepted`, run, and
//! answered with the packaged result. Undecodable frames get a best-effort
//! `malformed_envelope` rejection and the connection is dropped. An
//! oversized frame is refused from its header; its body is discarded up to a
//! bound first so the sender finishes writing and can read the refusal.
//!
//! A request waits in the slot queue for at most its effective timeout. Past
//! that it is refused as busy instead of running after its client gave up.
//!
//! An execution that has been admitted always runs to completion and is
//! recorded in the ledger, even if its connection goes away, so a retry with
//! the same identifier receives the cached result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use suite_relay_config::AgentConfig;
use suite_relay_config::AuditConfig;
use suite_relay_core::AgentStatus;
use suite_relay_core::Envelope;
use suite_relay_core::EnvelopeError;
use suite_relay_core::ExecutionAccepted;
use suite_relay_core::ExecutionRequest;
use suite_relay_core::ExecutionResult;
use suite_relay_core::PROTOCOL_VERSION;
use suite_relay_core::PayloadKind;
use suite_relay_core::Rejection;
use suite_relay_core::RejectionCode;
use suite_relay_core::RequestId;
use suite_relay_core::read_envelope;
use suite_relay_core::write_envelope;
use suite_relay_transport::Incoming;
use suite_relay_transport::SecureListener;
use suite_relay_transport::ServerStream;
use suite_relay_transport::ServerTlsSettings;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;

use crate::audit::AuditEvent;
use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::StderrAuditSink;
use crate::engine::ExecutionEngine;
use crate::error::AgentError;
use crate::ledger::Admission;
use crate::ledger::IdempotencyLedger;
use crate::orchestrator::Orchestrator;
use crate::result::ResultError;
use crate::result::package;
use crate::slot::ExecutionSlot;
use crate::slot::SlotBusy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Agent software version reported by `Ping`.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
/// Largest oversized frame body read and discarded before refusing it.
const DISCARD_LIMIT_BYTES: usize = 64 * 1024 * 1024;
/// Time allowed for discarding an oversized frame body.
const DISCARD_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Bound agent ready to serve.
pub struct AgentRuntime {
    /// TLS listener.
    listener: SecureListener,
    /// State shared with connection tasks.
    state: Arc<AgentState>,
}

impl AgentRuntime {
    /// Validates configuration, prepares the work root, and binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] when configuration, TLS material, the bind
    /// address, or the work root is unusable.
    pub async fn bind(
        config: &AgentConfig,
        engine: Arc<dyn ExecutionEngine>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let orchestrator = Orchestrator::from_config(config, engine, Arc::clone(&audit));
        std::fs::create_dir_all(orchestrator.work_root()).map_err(|err| {
            AgentError::Io(format!(
                "failed to create work root {}: {err}",
                orchestrator.work_root().display()
            ))
        })?;
        let settings = ServerTlsSettings {
            cert_path: PathBuf::from(&config.server_cert_path),
            key_path: PathBuf::from(&config.server_key_path),
            client_ca_path: config.trusted_client_ca_path.as_ref().map(PathBuf::from),
        };
        let listener = SecureListener::bind(config.socket_addr()?, &settings).await?;
        let local_addr = listener.local_addr()?;
        audit.record(&AuditEvent::agent_started(local_addr.to_string(), listener.mutual_tls()));
        let state = Arc::new(AgentState {
            mutual_tls: listener.mutual_tls(),
            orchestrator,
            slot: ExecutionSlot::new(config.max_queue_depth),
            ledger: IdempotencyLedger::default(),
            audit,
            max_payload_bytes: config.max_payload_bytes,
        });
        Ok(Self {
            listener,
            state,
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Transport`] when the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, AgentError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves connections until the process exits.
    ///
    /// # Errors
    ///
    /// Currently never returns an error; accept failures are retried.
    pub async fn serve(self) -> Result<(), AgentError> {
        self.serve_until(std::future::pending()).await
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// Connection tasks already running are left to finish.
    ///
    /// # Errors
    ///
    /// Currently never returns an error; accept failures are retried.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), AgentError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let incoming = match accepted {
                        Ok(incoming) => incoming,
                        Err(err) => {
                            self.state.audit.record(&AuditEvent::accept_failed(err.to_string()));
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move { state.handle_connection(incoming).await });
                }
            }
        }
        Ok(())
    }
}

/// Builds the audit sink described by configuration.
///
/// # Errors
///
/// Returns [`AgentError::Io`] when the audit file cannot be opened.
pub fn audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, AgentError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(path.as_ref())
                .map_err(|err| AgentError::Io(format!("failed to open audit log {path}: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Connection Handling
// ============================================================================

/// State shared by all connection tasks.
struct AgentState {
    /// Per-request state machine.
    orchestrator: Orchestrator,
    /// Single execution slot.
    slot: ExecutionSlot,
    /// Recent request identifiers.
    ledger: IdempotencyLedger,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Maximum envelope payload in both directions.
    max_payload_bytes: usize,
    /// Whether client certificates are required.
    mutual_tls: bool,
}

impl AgentState {
    /// Handshakes and serves one connection until it closes.
    async fn handle_connection(&self, incoming: Incoming) {
        let peer_addr = incoming.peer_addr().to_string();
        let connection = match incoming.handshake().await {
            Ok(connection) => connection,
            Err(err) => {
                self.audit.record(&AuditEvent::handshake_failed(peer_addr, err.to_string()));
                return;
            }
        };
        self.audit
            .record(&AuditEvent::connection_accepted(peer_addr, connection.identity.to_string()));
        let mut stream = connection.stream;
        loop {
            let envelope = match read_envelope(&mut stream, self.max_payload_bytes).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break,
                Err(err) => {
                    self.reject_frame(&mut stream, &err).await;
                    break;
                }
            };
            if self.dispatch(&mut stream, &envelope).await.is_err() {
                break;
            }
        }
        let _ = stream.shutdown().await;
    }

    /// Routes one decoded envelope.
    async fn dispatch(
        &self,
        stream: &mut ServerStream,
        envelope: &Envelope,
    ) -> Result<(), EnvelopeError> {
        match envelope.kind() {
            PayloadKind::PingRequest => self.handle_ping(stream, envelope.request_id()).await,
            PayloadKind::ExecuteRequest => self.handle_execute(stream, envelope).await,
            other => {
                self.reject(
                    stream,
                    Some(envelope.request_id()),
                    RejectionCode::InvalidRequest,
                    format!("agent does not accept {} messages", other.as_str()),
                )
                .await
            }
        }
    }

    /// Answers a ping with the agent status.
    async fn handle_ping(
        &self,
        stream: &mut ServerStream,
        request_id: &RequestId,
    ) -> Result<(), EnvelopeError> {
        let status = AgentStatus {
            protocol_version: PROTOCOL_VERSION,
            agent_version: AGENT_VERSION.to_string(),
            busy: self.slot.is_busy(),
            mutual_tls: self.mutual_tls,
        };
        let envelope = Envelope::from_message(request_id.clone(), PayloadKind::AgentStatus, &status)?;
        write_envelope(stream, &envelope).await
    }

    /// Runs the execute flow for one request.
    async fn handle_execute(
        &self,
        stream: &mut ServerStream,
        envelope: &Envelope,
    ) -> Result<(), EnvelopeError> {
        let request: ExecutionRequest = match envelope.message(PayloadKind::ExecuteRequest) {
            Ok(request) => request,
            Err(err) => {
                return self
                    .reject(
                        stream,
                        Some(envelope.request_id()),
                        RejectionCode::InvalidRequest,
                        err.to_string(),
                    )
                    .await;
            }
        };
        let request_id = request.request_id.clone();
        if &request_id != envelope.request_id() {
            return self
                .reject(
                    stream,
                    Some(envelope.request_id()),
                    RejectionCode::InvalidRequest,
                    "envelope and request identifiers differ".to_string(),
                )
                .await;
        }
        if let Err(err) = self.orchestrator.validate(&request) {
            return self
                .reject(stream, Some(&request_id), RejectionCode::InvalidRequest, err.to_string())
                .await;
        }

        match self.ledger.admit(&request_id) {
            Admission::Admitted => {}
            Admission::InFlight => {
                return self
                    .reject(
                        stream,
                        Some(&request_id),
                        RejectionCode::DuplicateRequest,
                        format!("request {request_id} is already executing"),
                    )
                    .await;
            }
            Admission::Completed(result) => return self.send_result(stream, &result).await,
        }

        let limit = self.orchestrator.effective_timeout(request.timeout_seconds);
        let permit = match tokio::time::timeout(limit, self.slot.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(SlotBusy)) => {
                self.ledger.abandon(&request_id);
                return self
                    .reject(
                        stream,
                        Some(&request_id),
                        RejectionCode::Busy,
                        "an execution is in progress and the queue is full".to_string(),
                    )
                    .await;
            }
            Err(_) => {
                self.ledger.abandon(&request_id);
                return self
                    .reject(
                        stream,
                        Some(&request_id),
                        RejectionCode::Busy,
                        format!(
                            "request waited {}s for the execution slot without starting",
                            limit.as_secs()
                        ),
                    )
                    .await;
            }
        };
        let accepted = ExecutionAccepted {
            request_id: request_id.clone(),
            effective_timeout_seconds: limit.as_secs(),
        };
        let acknowledged = match Envelope::from_message(
            request_id.clone(),
            PayloadKind::ExecutionAccepted,
            &accepted,
        ) {
            Ok(frame) => write_envelope(stream, &frame).await,
            Err(err) => Err(err),
        };
        let result = self.orchestrator.run(&request).await;
        self.ledger.complete(&request_id, &result);
        drop(permit);
        acknowledged?;
        self.send_result(stream, &result).await
    }

    /// Sends a result, or a size rejection when it does not fit.
    async fn send_result(
        &self,
        stream: &mut ServerStream,
        result: &ExecutionResult,
    ) -> Result<(), EnvelopeError> {
        match package(result, self.max_payload_bytes) {
            Ok(envelope) => write_envelope(stream, &envelope).await,
            Err(ResultError::PayloadTooLarge {
                size,
                limit,
            }) => {
                self.reject(
                    stream,
                    Some(&result.request_id),
                    RejectionCode::PayloadTooLarge,
                    format!(
                        "result with status {} encodes to {size} bytes, over the {limit} byte limit",
                        result.status
                    ),
                )
                .await
            }
            Err(ResultError::Envelope(err)) => {
                self.reject(
                    stream,
                    Some(&result.request_id),
                    RejectionCode::Internal,
                    err.to_string(),
                )
                .await
            }
        }
    }

    /// Sends a best-effort rejection for a frame that could not be read.
    async fn reject_frame(&self, stream: &mut ServerStream, err: &EnvelopeError) {
        let code = match err {
            EnvelopeError::TooLarge {
                announced,
                ..
            } => {
                if *announced <= DISCARD_LIMIT_BYTES {
                    discard(stream, *announced).await;
                }
                RejectionCode::PayloadTooLarge
            }
            EnvelopeError::Malformed(_)
            | EnvelopeError::UnsupportedVersion {
                ..
            } => RejectionCode::MalformedEnvelope,
            _ => return,
        };
        let _ = self.reject(stream, None, code, err.to_string()).await;
    }

    /// Audits and sends a rejection.
    async fn reject(
        &self,
        stream: &mut ServerStream,
        request_id: Option<&RequestId>,
        code: RejectionCode,
        message: String,
    ) -> Result<(), EnvelopeError> {
        self.audit.record(&AuditEvent::request_rejected(
            request_id.map(ToString::to_string),
            code.as_str(),
            message.clone(),
        ));
        let id = request_id.cloned().unwrap_or_else(|| RequestId::new(""));
        let envelope =
            Envelope::from_message(id, PayloadKind::Rejection, &Rejection::new(code, message))?;
        write_envelope(stream, &envelope).await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads and drops the body of a refused frame.
async fn discard(stream: &mut ServerStream, bytes: usize) {
    let mut body = (&mut *stream).take(u64::try_from(bytes).unwrap_or(u64::MAX));
    let _ = tokio::time::timeout(DISCARD_TIMEOUT, tokio::io::copy(&mut body, &mut tokio::io::sink()))
        .await;
}
