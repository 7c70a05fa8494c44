// system-tests/tests/helpers/harness.rs
// ============================================================================
// Module: Agent Harness
// Description: Spawn agents, flaky fronts, and client configs for tests.
// Purpose: Deterministic agent startup and teardown per scenario.
// Dependencies: suite-relay-agent, suite-relay-config, tokio
// ============================================================================

use std::fs;
use std::path::Path;
use std::sync::Arc;

use suite_relay_agent::AgentRuntime;
use suite_relay_agent::AuditEvent;
use suite_relay_agent::AuditSink;
use suite_relay_agent::ExecutionEngine;
use suite_relay_agent::MemoryAuditSink;
use suite_relay_config::AgentConfig;
use suite_relay_config::ArtifactsConfig;
use suite_relay_config::AuditConfig;
use suite_relay_config::ClientConfig;
use suite_relay_config::EngineConfig;
use system_tests::tls::TlsFixtures;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Agent knobs varied across scenarios.
#[derive(Clone, Copy)]
pub struct AgentOptions {
    /// Require client certificates.
    pub mutual_tls: bool,
    /// Requests allowed to wait for the slot.
    pub max_queue_depth: usize,
    /// Frame payload limit.
    pub max_payload_bytes: usize,
    /// Configured execution bound.
    pub execution_timeout_seconds: u64,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            mutual_tls: true,
            max_queue_depth: 0,
            max_payload_bytes: 4 * 1024 * 1024,
            execution_timeout_seconds: 30,
        }
    }
}

/// Handle for a spawned agent.
pub struct AgentHandle {
    /// Bound address.
    address: String,
    /// Captured audit events.
    audit: Arc<MemoryAuditSink>,
    /// Per-request working directories live here.
    work_root: TempDir,
    /// Stops the accept loop.
    shutdown: Option<oneshot::Sender<()>>,
    /// Accept loop task.
    join: JoinHandle<()>,
}

impl AgentHandle {
    /// Returns `127.0.0.1:<port>`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns recorded audit events.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit.events()
    }

    /// Returns the agent's work root.
    pub fn work_root(&self) -> &Path {
        self.work_root.path()
    }

    /// Stops accepting connections and waits for the accept loop.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.join.await;
    }
}

/// Binds an agent on an ephemeral port and serves it in the background.
pub async fn spawn_agent(
    tls: &TlsFixtures,
    engine: Arc<dyn ExecutionEngine>,
    options: AgentOptions,
) -> AgentHandle {
    let work_root = tempfile::tempdir().expect("work root");
    let config = AgentConfig {
        bind_address: "127.0.0.1:0".to_string(),
        server_cert_path: tls.agent_cert.display().to_string(),
        server_key_path: tls.agent_key.display().to_string(),
        trusted_client_ca_path: options.mutual_tls.then(|| tls.ca_pem.display().to_string()),
        execution_timeout_seconds: options.execution_timeout_seconds,
        max_queue_depth: options.max_queue_depth,
        max_payload_bytes: options.max_payload_bytes,
        work_root: Some(work_root.path().display().to_string()),
        engine: EngineConfig::default(),
        artifacts: ArtifactsConfig::default(),
        audit: AuditConfig::default(),
    };
    let audit = Arc::new(MemoryAuditSink::new());
    let sink: Arc<dyn AuditSink> = audit.clone();
    let runtime = AgentRuntime::bind(&config, engine, sink).await.expect("bind agent");
    let address = runtime.local_addr().expect("agent address").to_string();
    let (shutdown, stop) = oneshot::channel::<()>();
    let join = tokio::spawn(async move {
        let _ = runtime
            .serve_until(async {
                let _ = stop.await;
            })
            .await;
    });
    AgentHandle {
        address,
        audit,
        work_root,
        shutdown: Some(shutdown),
        join,
    }
}

/// Listens on loopback, closes its first `drops` connections unanswered, and
/// forwards later ones to `target`. Returns the front address.
pub async fn spawn_flaky_front(target: &str, drops: usize) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind front");
    let address = listener.local_addr().expect("front address").to_string();
    let target = target.to_string();
    let join = tokio::spawn(async move {
        let mut seen = 0;
        while let Ok((mut inbound, _)) = listener.accept().await {
            seen += 1;
            if seen <= drops {
                drop(inbound);
                continue;
            }
            let target = target.clone();
            tokio::spawn(async move {
                if let Ok(mut outbound) = TcpStream::connect(&target).await {
                    let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                }
            });
        }
    });
    (address, join)
}

/// Builds a client config for `address` trusting the fixture CA.
pub fn client_config(tls: &TlsFixtures, address: &str, with_identity: bool) -> ClientConfig {
    ClientConfig {
        agent_address: address.to_string(),
        server_name: Some("localhost".to_string()),
        trust_anchor_path: tls.ca_pem.display().to_string(),
        client_cert_path: with_identity.then(|| tls.client_cert.display().to_string()),
        client_key_path: with_identity.then(|| tls.client_key.display().to_string()),
        max_attempts: 3,
        retry_backoff_ms: 50,
        response_grace_seconds: 5,
        max_payload_bytes: 4 * 1024 * 1024,
        default_timeout_seconds: 30,
    }
}

/// Writes a two-file suite plus a file the packager must skip.
pub fn write_suite(root: &Path) {
    fs::write(
        root.join("suite.robot"),
        "*** Settings ***\nResource    resource.txt\n\n*** Test Cases ***\nGreets\n    Say Hello\n",
    )
    .expect("write suite");
    fs::write(root.join("resource.txt"), "*** Keywords ***\nSay Hello\n    Log    hello\n")
        .expect("write resource");
    fs::write(root.join("notes.md"), "not packed").expect("write notes");
}
