// system-tests/tests/suites/resilience.rs
// ============================================================================
// Module: Resilience Scenarios
// Description: Busy agents, queues, retries, timeouts, TLS, bad frames.
// Purpose: Ensure every refusal is explicit and nothing runs twice.
// Dependencies: system-tests helpers, suite-relay-client, suite-relay-transport
// ============================================================================

//! Failure and refusal scenarios.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use suite_relay_agent::AuditEvent;
use suite_relay_agent::NO_EXIT_CODE;
use suite_relay_client::ClientError;
use suite_relay_client::RelayClient;
use suite_relay_client::SuiteJob;
use suite_relay_core::Envelope;
use suite_relay_core::ExecutionStatus;
use suite_relay_core::PayloadKind;
use suite_relay_core::Rejection;
use suite_relay_core::RejectionCode;
use suite_relay_core::RequestId;
use suite_relay_core::encode;
use suite_relay_core::read_envelope;
use suite_relay_transport::ClientTlsSettings;
use suite_relay_transport::SecureConnector;
use system_tests::engines::ReportEngine;
use system_tests::tls::TlsFixtures;
use tokio::io::AsyncWriteExt;

use crate::helpers::harness::AgentHandle;
use crate::helpers::harness::AgentOptions;
use crate::helpers::harness::client_config;
use crate::helpers::harness::spawn_agent;
use crate::helpers::harness::spawn_flaky_front;
use crate::helpers::harness::write_suite;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn rejected_code(err: &ClientError) -> Option<RejectionCode> {
    match err {
        ClientError::Rejected {
            code, ..
        } => Some(*code),
        _ => None,
    }
}

/// Sends raw bytes over TLS and decodes the agent's single reply.
async fn raw_exchange(tls: &TlsFixtures, agent: &AgentHandle, bytes: &[u8]) -> Rejection {
    let settings = ClientTlsSettings {
        trust_anchor_path: tls.ca_pem.clone(),
        identity: None,
        server_name: "localhost".to_string(),
    };
    let connector = SecureConnector::new(&settings).unwrap();
    let mut stream = connector.connect(agent.address()).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream.flush().await.unwrap();
    let reply = read_envelope(&mut stream, 1024 * 1024).await.unwrap().expect("reply frame");
    assert_eq!(reply.kind(), PayloadKind::Rejection);
    reply.message(PayloadKind::Rejection).unwrap()
}

fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}

fn received_ids(agent: &AgentHandle) -> Vec<String> {
    agent
        .audit_events()
        .into_iter()
        .filter_map(|event| match event {
            AuditEvent::ExecutionPhase {
                request_id,
                phase: "received",
                ..
            } => Some(request_id),
            _ => None,
        })
        .collect()
}

fn rejection_audited(agent: &AgentHandle, expected: &str) -> bool {
    agent.audit_events().iter().any(|event| {
        matches!(event, AuditEvent::RequestRejected { code, .. } if *code == expected)
    })
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// With no queue, a second request is refused while one runs, and the
/// running request's id is refused as a duplicate.
#[tokio::test(flavor = "multi_thread")]
async fn busy_agent_refuses_without_running() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::gated());
    let agent = spawn_agent(&tls, engine.clone(), AgentOptions::default()).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let job = SuiteJob::new(input.path(), "suite.robot", ".");
    let running = client.prepare(&job).unwrap();
    let other = client.prepare(&job).unwrap();

    let first = tokio::spawn({
        let client = client.clone();
        let running = running.clone();
        async move { client.execute(&running).await }
    });
    engine.wait_started().await;

    let status = client.ping().await.unwrap();
    assert!(status.value.busy);

    let busy = client.execute(&other).await.unwrap_err();
    assert_eq!(rejected_code(&busy), Some(RejectionCode::Busy));
    assert!(!busy.is_retryable());

    let duplicate = client.execute(&running).await.unwrap_err();
    assert_eq!(rejected_code(&duplicate), Some(RejectionCode::DuplicateRequest));

    engine.release();
    let delivered = first.await.unwrap().unwrap();
    assert_eq!(delivered.value.status, ExecutionStatus::Success);
    assert_eq!(engine.runs(), 1);
    assert!(rejection_audited(&agent, "busy"));
    assert!(rejection_audited(&agent, "duplicate_request"));
    agent.shutdown().await;
}

/// A queued request whose timeout passes before the slot frees is refused,
/// and the agent does not run it later.
#[tokio::test(flavor = "multi_thread")]
async fn queued_request_past_its_timeout_is_refused_not_run() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::gated());
    let options = AgentOptions {
        max_queue_depth: 1,
        ..AgentOptions::default()
    };
    let agent = spawn_agent(&tls, engine.clone(), options).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let job = SuiteJob::new(input.path(), "suite.robot", ".");
    let running = client.prepare(&job).unwrap();
    let mut queued = client.prepare(&job).unwrap();
    queued.timeout_seconds = 1;

    let first = tokio::spawn({
        let client = client.clone();
        let running = running.clone();
        async move { client.execute(&running).await }
    });
    engine.wait_started().await;

    let started = std::time::Instant::now();
    let err = client.execute(&queued).await.unwrap_err();
    assert_eq!(rejected_code(&err), Some(RejectionCode::Busy), "unexpected error: {err}");
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    engine.release();
    let delivered = first.await.unwrap().unwrap();
    assert_eq!(delivered.value.status, ExecutionStatus::Success);
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(engine.runs(), 1);

    // The refused identifier was never run, so it may be sent again.
    engine.release();
    let retried = client.execute(&queued).await.unwrap();
    assert_eq!(retried.value.status, ExecutionStatus::Success);
    assert_eq!(engine.runs(), 2);
    agent.shutdown().await;
}

/// A connection dropped before any response is retried under the same
/// identifier, and the suite runs once.
#[tokio::test(flavor = "multi_thread")]
async fn dropped_connection_is_retried_under_the_same_id() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::new());
    let agent = spawn_agent(&tls, engine.clone(), AgentOptions::default()).await;
    let (front, front_task) = spawn_flaky_front(agent.address(), 1).await;
    let client = RelayClient::new(client_config(&tls, &front, true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let request = client.prepare(&SuiteJob::new(input.path(), "suite.robot", ".")).unwrap();

    let delivered = client.execute(&request).await.unwrap();
    assert_eq!(delivered.attempts, 2);
    assert_eq!(delivered.value.request_id, request.request_id);
    assert_eq!(delivered.value.status, ExecutionStatus::Success);
    assert_eq!(engine.runs(), 1);
    assert_eq!(received_ids(&agent), vec![request.request_id.to_string()]);

    let again = client.execute(&request).await.unwrap();
    assert_eq!(again.attempts, 1);
    assert_eq!(again.value, delivered.value);
    assert_eq!(engine.runs(), 1);

    front_task.abort();
    agent.shutdown().await;
}

/// A run exceeding the agent's bound is reported as a timeout.
#[tokio::test(flavor = "multi_thread")]
async fn agent_bound_times_out_run() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::gated());
    let options = AgentOptions {
        execution_timeout_seconds: 1,
        ..AgentOptions::default()
    };
    let agent = spawn_agent(&tls, engine.clone(), options).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let output = tempfile::tempdir().unwrap();
    let outcome =
        client.run_suite(&SuiteJob::new(input.path(), "suite.robot", output.path())).await.unwrap();
    assert_eq!(outcome.status, ExecutionStatus::Timeout);
    assert_eq!(outcome.exit_code, NO_EXIT_CODE);
    assert!(outcome.artifacts.is_empty());
    assert!(outcome.message.is_some());
    assert!(dir_is_empty(agent.work_root()));
    agent.shutdown().await;
}

/// Without a client certificate the handshake fails and is retryable.
#[tokio::test(flavor = "multi_thread")]
async fn missing_client_certificate_is_refused() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::new());
    let agent = spawn_agent(&tls, engine.clone(), AgentOptions::default()).await;
    let mut config = client_config(&tls, agent.address(), false);
    config.max_attempts = 2;
    let client = RelayClient::new(config).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let output = tempfile::tempdir().unwrap();
    let err = client
        .run_suite(&SuiteJob::new(input.path(), "suite.robot", output.path()))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {err}");
    assert!(matches!(err, ClientError::Transport(_) | ClientError::Reset(_)));
    assert_eq!(engine.runs(), 0);
    assert!(dir_is_empty(output.path()));
    agent.shutdown().await;
}

/// A frame announcing more than the agent accepts is refused from its header
/// once its body has been discarded.
#[tokio::test(flavor = "multi_thread")]
async fn oversized_frame_is_refused_from_header() {
    let tls = TlsFixtures::generate().unwrap();
    let options = AgentOptions {
        mutual_tls: false,
        max_payload_bytes: 4096,
        ..AgentOptions::default()
    };
    let agent = spawn_agent(&tls, Arc::new(ReportEngine::new()), options).await;

    let payload = vec![b'x'; 64 * 1024];
    let envelope =
        Envelope::new(RequestId::new("big-1"), PayloadKind::ExecuteRequest, payload).unwrap();
    let frame = encode(&envelope);

    let rejection = raw_exchange(&tls, &agent, &frame).await;
    assert_eq!(rejection.code, RejectionCode::PayloadTooLarge);
    assert!(rejection_audited(&agent, "payload_too_large"));
    agent.shutdown().await;
}

/// A prefix-sized run of foreign bytes is refused as malformed.
#[tokio::test(flavor = "multi_thread")]
async fn foreign_bytes_are_refused_as_malformed() {
    let tls = TlsFixtures::generate().unwrap();
    let options = AgentOptions {
        mutual_tls: false,
        ..AgentOptions::default()
    };
    let agent = spawn_agent(&tls, Arc::new(ReportEngine::new()), options).await;

    let rejection = raw_exchange(&tls, &agent, b"JUNKFRAME").await;
    assert_eq!(rejection.code, RejectionCode::MalformedEnvelope);
    assert!(rejection_audited(&agent, "malformed_envelope"));
    agent.shutdown().await;
}

/// An agent limit below the client's surfaces as a payload-size refusal.
#[tokio::test(flavor = "multi_thread")]
async fn agent_limit_below_client_limit_is_reported_as_too_large() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::new());
    let options = AgentOptions {
        max_payload_bytes: 4096,
        ..AgentOptions::default()
    };
    let agent = spawn_agent(&tls, engine.clone(), options).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    fs::write(input.path().join("data.resource"), "x".repeat(16 * 1024)).unwrap();
    let output = tempfile::tempdir().unwrap();
    let err = client
        .run_suite(&SuiteJob::new(input.path(), "suite.robot", output.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::PayloadTooLarge(_)), "unexpected error: {err}");
    assert!(!err.is_retryable());
    assert_eq!(engine.runs(), 0);
    assert!(rejection_audited(&agent, "payload_too_large"));
    agent.shutdown().await;
}

/// The client refuses a suite over its own limit before connecting.
#[tokio::test(flavor = "multi_thread")]
async fn oversized_suite_is_refused_locally() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::new());
    let agent = spawn_agent(&tls, engine.clone(), AgentOptions::default()).await;
    let mut config = client_config(&tls, agent.address(), true);
    config.max_payload_bytes = 2048;
    let client = RelayClient::new(config).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    fs::write(input.path().join("data.resource"), "x".repeat(8 * 1024)).unwrap();
    let output = tempfile::tempdir().unwrap();
    let err = client
        .run_suite(&SuiteJob::new(input.path(), "suite.robot", output.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::PayloadTooLarge(_)));
    assert_eq!(engine.runs(), 0);
    let connected = agent
        .audit_events()
        .iter()
        .any(|event| matches!(event, AuditEvent::ConnectionAccepted { .. }));
    assert!(!connected);
    agent.shutdown().await;
}
