// crates/suite-relay-client/src/client.rs
// ============================================================================
// Module: Relay Client
// Description: Submit suites to an agent and collect the results.
// Purpose: Pack, send with bounded retries, await, and materialize artifacts.
// Dependencies: tokio, suite-relay-core, suite-relay-transport
// ============================================================================

//! ## Overview
//! [`RelayClient::run_suite`] packs a suite directory, sends it under one
//! [`RequestId`] for every attempt, waits up to `timeout + grace` for the
//! agent to start the run and again from its acknowledgement for the result,
//! and writes returned artifacts into the output directory.
//!
//! Retry rules: an attempt is repeated only when it failed before any
//! response byte arrived (see [`ClientError::is_retryable`]). Once the agent
//! acknowledges with `ExecutionAccepted`, or sends anything else, the attempt
//! is final. The agent deduplicates identifiers, so a retry of a request it
//! did observe never executes twice.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use suite_relay_config::ClientConfig;
use suite_relay_core::AgentStatus;
use suite_relay_core::Envelope;
use suite_relay_core::ExecutionAccepted;
use suite_relay_core::ExecutionOptions;
use suite_relay_core::ExecutionRequest;
use suite_relay_core::ExecutionResult;
use suite_relay_core::ExecutionStatus;
use suite_relay_core::PackError;
use suite_relay_core::Packager;
use suite_relay_core::PayloadKind;
use suite_relay_core::Rejection;
use suite_relay_core::RejectionCode;
use suite_relay_core::RequestId;
use suite_relay_core::read_envelope;
use suite_relay_core::unpack_files;
use suite_relay_core::write_envelope;
use suite_relay_transport::ClientIdentity;
use suite_relay_transport::ClientTlsSettings;
use suite_relay_transport::SecureConnector;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::error::ClientError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Extensions packed when the caller does not choose any.
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["robot", "txt", "text", "resource"];
/// Bound on a ping round trip after the handshake.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Suite submission parameters.
#[derive(Debug, Clone)]
pub struct SuiteJob {
    /// Directory containing the suite.
    pub input_dir: PathBuf,
    /// Entry point relative to `input_dir`.
    pub entry_point: String,
    /// Directory receiving returned artifacts.
    pub output_dir: PathBuf,
    /// Declared timeout; the configured default when unset.
    pub timeout_seconds: Option<u64>,
    /// Options forwarded to the engine.
    pub options: ExecutionOptions,
    /// Extensions to pack; [`DEFAULT_EXTENSIONS`] when empty.
    pub extensions: Vec<String>,
}

impl SuiteJob {
    /// Creates a job with default timeout, options, and extensions.
    #[must_use]
    pub fn new(
        input_dir: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            entry_point: entry_point.into(),
            output_dir: output_dir.into(),
            timeout_seconds: None,
            options: ExecutionOptions::new(),
            extensions: Vec::new(),
        }
    }
}

/// Completed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteOutcome {
    /// Identifier shared by every attempt.
    pub request_id: RequestId,
    /// Execution classification.
    pub status: ExecutionStatus,
    /// Engine exit code.
    pub exit_code: i32,
    /// Agent-supplied detail.
    pub message: Option<String>,
    /// Engine standard output.
    pub stdout: String,
    /// Engine standard error.
    pub stderr: String,
    /// Artifacts written locally.
    pub artifacts: Vec<PathBuf>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Result of one exchange plus the attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered<T> {
    /// Decoded response.
    pub value: T,
    /// Attempts made.
    pub attempts: u32,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Client bound to one agent.
#[derive(Clone)]
pub struct RelayClient {
    /// Validated configuration.
    config: ClientConfig,
    /// TLS connector.
    connector: SecureConnector,
}

impl RelayClient {
    /// Validates configuration and loads TLS material.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for invalid settings and
    /// [`ClientError::Transport`] for unusable TLS material.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let identity = match (&config.client_cert_path, &config.client_key_path) {
            (Some(cert), Some(key)) => Some(ClientIdentity {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => None,
        };
        let settings = ClientTlsSettings {
            trust_anchor_path: PathBuf::from(&config.trust_anchor_path),
            identity,
            server_name: config.resolved_server_name()?,
        };
        let connector = SecureConnector::new(&settings)?;
        Ok(Self {
            config,
            connector,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Packs a job into a request with a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Pack`] when the directory cannot be packed and
    /// [`ClientError::PayloadTooLarge`] when its content exceeds the limit.
    pub fn prepare(&self, job: &SuiteJob) -> Result<ExecutionRequest, ClientError> {
        let packager = if job.extensions.is_empty() {
            Packager::new().with_extensions(DEFAULT_EXTENSIONS)
        } else {
            Packager::new().with_extensions(&job.extensions)
        }
        .with_max_bundle_bytes(self.config.max_payload_bytes);
        let bundle = packager
            .pack(&job.input_dir, &job.entry_point, job.options.clone())
            .map_err(|err| match err {
                PackError::TooLarge {
                    ..
                } => ClientError::PayloadTooLarge(err.to_string()),
                other => ClientError::Pack(other),
            })?;
        Ok(ExecutionRequest {
            request_id: RequestId::generate(),
            timeout_seconds: job.timeout_seconds.unwrap_or(self.config.default_timeout_seconds),
            bundle,
        })
    }

    /// Packs, executes, and materializes one suite.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for packing, transport, protocol, rejection,
    /// or artifact write failures.
    pub async fn run_suite(&self, job: &SuiteJob) -> Result<SuiteOutcome, ClientError> {
        let request = self.prepare(job)?;
        let delivered = self.execute(&request).await?;
        let result = delivered.value;
        let artifacts = materialize(&result, &job.output_dir)?;
        Ok(SuiteOutcome {
            request_id: result.request_id,
            status: result.status,
            exit_code: result.exit_code,
            message: result.message,
            stdout: result.stdout,
            stderr: result.stderr,
            artifacts,
            attempts: delivered.attempts,
        })
    }

    /// Sends a prepared request, retrying per the retry rules.
    ///
    /// # Errors
    ///
    /// Returns the last [`ClientError`] once retries are exhausted or a
    /// final error occurs.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<Delivered<ExecutionResult>, ClientError> {
        let envelope = Envelope::from_message(
            request.request_id.clone(),
            PayloadKind::ExecuteRequest,
            request,
        )
        .map_err(|err| ClientError::Protocol(err.to_string()))?;
        if envelope.encoded_len() > self.config.max_payload_bytes {
            return Err(ClientError::PayloadTooLarge(format!(
                "request encodes to {} bytes, over the {} byte limit",
                envelope.encoded_len(),
                self.config.max_payload_bytes
            )));
        }
        let grace = self.config.response_grace();
        let wait = Duration::from_secs(request.timeout_seconds) + grace;
        let connector = &self.connector;
        let address = self.config.agent_address.as_str();
        let max_payload_bytes = self.config.max_payload_bytes;
        let envelope = &envelope;
        self.with_retries(|| async move {
            let mut stream = connector.connect(address).await?;
            let outcome = exchange_execute(&mut stream, envelope, wait, grace, max_payload_bytes).await;
            let _ = stream.shutdown().await;
            outcome
        })
        .await
    }

    /// Checks connectivity and reports agent status.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the agent cannot be reached or answers
    /// incorrectly.
    pub async fn ping(&self) -> Result<Delivered<AgentStatus>, ClientError> {
        let request_id = RequestId::generate();
        let envelope = Envelope::new(request_id, PayloadKind::PingRequest, b"{}".to_vec())
            .map_err(|err| ClientError::Protocol(err.to_string()))?;
        let connector = &self.connector;
        let address = self.config.agent_address.as_str();
        let max_payload_bytes = self.config.max_payload_bytes;
        let envelope = &envelope;
        self.with_retries(|| async move {
            let mut stream = connector.connect(address).await?;
            let outcome = exchange_ping(&mut stream, envelope, PING_TIMEOUT, max_payload_bytes).await;
            let _ = stream.shutdown().await;
            outcome
        })
        .await
    }

    /// Runs `attempt` until it succeeds, fails finally, or attempts run out.
    async fn with_retries<T, F, Fut>(&self, mut attempt: F) -> Result<Delivered<T>, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match attempt().await {
                Ok(value) => {
                    return Ok(Delivered {
                        value,
                        attempts,
                    });
                }
                Err(err) if err.is_retryable() && attempts < self.config.max_attempts => {
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ============================================================================
// SECTION: Exchanges
// ============================================================================

/// Sends an execute request and reads until a result or rejection.
///
/// `wait` bounds the time until the first response. The agent acknowledges
/// a request only once it holds the execution slot, so when the
/// acknowledgement arrives the bound restarts at the acknowledged timeout
/// plus `grace`. Refusals of an unreadable frame carry an empty identifier
/// and surface like any other rejection.
///
/// # Errors
///
/// Returns [`ClientError`] classified by whether any response byte arrived.
pub async fn exchange_execute<S>(
    stream: &mut S,
    request: &Envelope,
    wait: Duration,
    grace: Duration,
    max_payload_bytes: usize,
) -> Result<ExecutionResult, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_envelope(stream, request).await.map_err(ClientError::from_write)?;
    let mut window = wait;
    let mut deadline = Instant::now() + window;
    let mut responded = false;
    loop {
        let frame = tokio::time::timeout_at(deadline, read_envelope(stream, max_payload_bytes))
            .await
            .map_err(|_| ClientError::ResponseTimeout {
                seconds: window.as_secs(),
            })?;
        let envelope = match (frame, responded) {
            (Ok(Some(envelope)), _) => envelope,
            (Ok(None), false) => {
                return Err(ClientError::Reset(
                    "agent closed the connection before responding".to_string(),
                ));
            }
            (Ok(None), true) => {
                return Err(ClientError::ConnectionLost(
                    "agent closed the connection before sending a result".to_string(),
                ));
            }
            (Err(err), false) => return Err(ClientError::from_first_read(err)),
            (Err(err), true) => return Err(ClientError::from_later_read(err)),
        };
        responded = true;
        if is_frame_rejection(&envelope) {
            return Err(rejected(&envelope)?);
        }
        if envelope.request_id() != request.request_id() {
            return Err(ClientError::Protocol(format!(
                "response for {} does not match request {}",
                envelope.request_id(),
                request.request_id()
            )));
        }
        match envelope.kind() {
            PayloadKind::ExecutionAccepted => {
                let accepted: ExecutionAccepted = decode(&envelope, PayloadKind::ExecutionAccepted)?;
                window = Duration::from_secs(accepted.effective_timeout_seconds) + grace;
                deadline = Instant::now() + window;
            }
            PayloadKind::ExecutionResult => {
                return decode(&envelope, PayloadKind::ExecutionResult);
            }
            PayloadKind::Rejection => return Err(rejected(&envelope)?),
            other => {
                return Err(ClientError::Protocol(format!(
                    "unexpected {} response",
                    other.as_str()
                )));
            }
        }
    }
}

/// Sends a ping and reads the status reply.
///
/// # Errors
///
/// Returns [`ClientError`] classified by whether any response byte arrived.
pub async fn exchange_ping<S>(
    stream: &mut S,
    request: &Envelope,
    wait: Duration,
    max_payload_bytes: usize,
) -> Result<AgentStatus, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_envelope(stream, request).await.map_err(ClientError::from_write)?;
    let frame = tokio::time::timeout(wait, read_envelope(stream, max_payload_bytes))
        .await
        .map_err(|_| ClientError::ResponseTimeout {
            seconds: wait.as_secs(),
        })?;
    let envelope = match frame {
        Ok(Some(envelope)) => envelope,
        Ok(None) => {
            return Err(ClientError::Reset("agent closed the connection before responding".to_string()));
        }
        Err(err) => return Err(ClientError::from_first_read(err)),
    };
    match envelope.kind() {
        PayloadKind::AgentStatus => decode(&envelope, PayloadKind::AgentStatus),
        PayloadKind::Rejection => Err(rejected(&envelope)?),
        other => Err(ClientError::Protocol(format!("unexpected {} response", other.as_str()))),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes returned artifacts into `output_dir`.
///
/// # Errors
///
/// Returns [`ClientError::Materialize`] when a path is unsafe or a write
/// fails; nothing is left behind in that case.
pub fn materialize(result: &ExecutionResult, output_dir: &Path) -> Result<Vec<PathBuf>, ClientError> {
    unpack_files(&result.artifacts, output_dir).map_err(ClientError::Materialize)
}

/// Decodes a payload of the expected kind.
fn decode<T: DeserializeOwned>(envelope: &Envelope, kind: PayloadKind) -> Result<T, ClientError> {
    envelope.message(kind).map_err(|err| ClientError::Protocol(err.to_string()))
}

/// Returns true for a rejection of a frame the agent could not read.
fn is_frame_rejection(envelope: &Envelope) -> bool {
    matches!(envelope.kind(), PayloadKind::Rejection) && envelope.request_id().is_blank()
}

/// Converts a rejection frame into the matching error.
fn rejected(envelope: &Envelope) -> Result<ClientError, ClientError> {
    let rejection: Rejection = decode(envelope, PayloadKind::Rejection)?;
    Ok(match rejection.code {
        RejectionCode::PayloadTooLarge => ClientError::PayloadTooLarge(rejection.message),
        code => ClientError::Rejected {
            code,
            message: rejection.message,
        },
    })
}
