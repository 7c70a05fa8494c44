// system-tests/tests/suites/execution.rs
// ============================================================================
// Module: Execution Scenarios
// Description: Suites packed, executed remotely, and materialized locally.
// Purpose: Cover the success path, exit statuses, replays, and ping.
// Dependencies: system-tests helpers, suite-relay-client
// ============================================================================

//! Execution scenarios over mutual TLS.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use suite_relay_agent::AGENT_VERSION;
use suite_relay_agent::AuditEvent;
use suite_relay_client::RelayClient;
use suite_relay_client::SuiteJob;
use suite_relay_core::ExecutionStatus;
use suite_relay_core::OptionValue;
use suite_relay_core::PROTOCOL_VERSION;
use system_tests::engines::EXIT_CODE_OPTION;
use system_tests::engines::LOG_HTML;
use system_tests::engines::ReportEngine;
use system_tests::tls::TlsFixtures;

use crate::helpers::harness::AgentOptions;
use crate::helpers::harness::client_config;
use crate::helpers::harness::spawn_agent;
use crate::helpers::harness::write_suite;

/// Runs a two-file suite and checks every returned artifact.
#[tokio::test(flavor = "multi_thread")]
async fn suite_round_trip_returns_reports() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::new());
    let agent = spawn_agent(&tls, engine.clone(), AgentOptions::default()).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let output = tempfile::tempdir().unwrap();
    let out_dir = output.path().join("results");
    let job = SuiteJob::new(input.path(), "suite.robot", &out_dir);

    let outcome = client.run_suite(&job).await.unwrap();
    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.stdout, "Executed suite.robot with 2 file(s)");
    assert_eq!(
        outcome.artifacts,
        vec![
            PathBuf::from("log.html"),
            PathBuf::from("output.xml"),
            PathBuf::from("report/summary.txt"),
        ]
    );
    assert_eq!(fs::read(out_dir.join("log.html")).unwrap(), LOG_HTML);
    assert_eq!(
        fs::read_to_string(out_dir.join("report/summary.txt")).unwrap(),
        "resource.txt\nsuite.robot"
    );
    assert!(!out_dir.join("suite.robot").exists());
    assert_eq!(engine.runs(), 1);
    assert!(fs::read_dir(agent.work_root()).unwrap().next().is_none());

    let phases: Vec<&'static str> = agent
        .audit_events()
        .into_iter()
        .filter_map(|event| match event {
            AuditEvent::ExecutionPhase {
                phase, ..
            } => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec!["received", "unpacking", "running", "collecting", "done"]);
    agent.shutdown().await;
}

/// Forwards options and maps a nonzero exit code to test failures.
#[tokio::test(flavor = "multi_thread")]
async fn failing_tests_report_exit_code() {
    let tls = TlsFixtures::generate().unwrap();
    let agent = spawn_agent(&tls, Arc::new(ReportEngine::new()), AgentOptions::default()).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let output = tempfile::tempdir().unwrap();
    let mut job = SuiteJob::new(input.path(), "suite.robot", output.path());
    job.options.insert(EXIT_CODE_OPTION.to_string(), OptionValue::String("3".to_string()));

    let outcome = client.run_suite(&job).await.unwrap();
    assert_eq!(outcome.status, ExecutionStatus::TestFailures);
    assert_eq!(outcome.exit_code, 3);
    assert!(output.path().join("log.html").is_file());
    agent.shutdown().await;
}

/// Resending a completed request returns the stored result without a rerun.
#[tokio::test(flavor = "multi_thread")]
async fn completed_request_is_replayed() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::new());
    let agent = spawn_agent(&tls, engine.clone(), AgentOptions::default()).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let input = tempfile::tempdir().unwrap();
    write_suite(input.path());
    let request = client.prepare(&SuiteJob::new(input.path(), "suite.robot", ".")).unwrap();

    let first = client.execute(&request).await.unwrap();
    let second = client.execute(&request).await.unwrap();
    assert_eq!(first.value, second.value);
    assert_eq!(second.value.request_id, request.request_id);
    assert_eq!(engine.runs(), 1);
    agent.shutdown().await;
}

/// Ping reports versions and mutual TLS without running anything.
#[tokio::test(flavor = "multi_thread")]
async fn ping_reports_agent_status() {
    let tls = TlsFixtures::generate().unwrap();
    let engine = Arc::new(ReportEngine::new());
    let agent = spawn_agent(&tls, engine.clone(), AgentOptions::default()).await;
    let client = RelayClient::new(client_config(&tls, agent.address(), true)).unwrap();

    let status = client.ping().await.unwrap();
    assert_eq!(status.attempts, 1);
    assert_eq!(status.value.protocol_version, PROTOCOL_VERSION);
    assert_eq!(status.value.agent_version, AGENT_VERSION);
    assert!(status.value.mutual_tls);
    assert!(!status.value.busy);
    assert_eq!(engine.runs(), 0);
    agent.shutdown().await;
}
