// crates/suite-relay-cli/src/main.rs
// ============================================================================
// Module: Suite Relay CLI Entry Point
// Description: Command dispatcher for the agent and the client.
// Purpose: Serve suites, submit suites, check connectivity, validate config.
// Dependencies: clap, suite-relay-agent, suite-relay-client, suite-relay-config, tokio.
// ============================================================================

//! ## Overview
//! `suite-relay serve` runs the agent until interrupted. `suite-relay run`
//! packs a local suite, executes it remotely, and writes the artifacts into
//! the output directory; its exit code reflects the execution status.
//! `suite-relay ping` checks TLS connectivity and reports agent status.
//! `suite-relay config validate` loads and validates a configuration file.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use suite_relay_agent::AgentRuntime;
use suite_relay_agent::ExecutionEngine;
use suite_relay_agent::ProcessEngine;
use suite_relay_agent::audit_sink;
use suite_relay_cli::options::RunFilters;
use suite_relay_cli::options::build_options;
use suite_relay_cli::t;
use suite_relay_client::RelayClient;
use suite_relay_client::SuiteJob;
use suite_relay_config::AgentConfig;
use suite_relay_config::ClientConfig;
use suite_relay_core::ExecutionStatus;
use thiserror::Error;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Exit code for `TEST_FAILURES`.
const EXIT_TEST_FAILURES: u8 = 1;
/// Exit code for `EXECUTION_ERROR`.
const EXIT_EXECUTION_ERROR: u8 = 2;
/// Exit code for `TIMEOUT`.
const EXIT_TIMEOUT: u8 = 3;
/// Exit code when the CLI itself fails (config, transport, rejection).
const EXIT_CLI_ERROR: u8 = 4;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "suite-relay", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the execution agent.
    Serve(ServeCommand),
    /// Execute a local suite on a remote agent.
    Run(Box<RunCommand>),
    /// Check connectivity and report agent status.
    Ping(PingCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Agent config file (defaults to `SUITE_RELAY_AGENT_CONFIG` or
    /// `suite-relay-agent.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Client config file (defaults to `SUITE_RELAY_CLIENT_CONFIG` or
    /// `suite-relay-client.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory containing the suite.
    #[arg(long, value_name = "DIR", default_value = ".")]
    input_dir: PathBuf,
    /// Entry point relative to the input directory.
    #[arg(long, value_name = "FILE")]
    entry_point: String,
    /// Directory receiving returned artifacts (created when missing).
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,
    /// Declared execution timeout in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Engine option as `name=value`, or `name` for a flag. Repeatable.
    #[arg(long = "option", value_name = "NAME[=VALUE]")]
    options: Vec<String>,
    /// Select tests by tag.
    #[arg(long, value_name = "TAG", num_args = 1 ..)]
    include: Vec<String>,
    /// Skip tests by tag.
    #[arg(long, value_name = "TAG", num_args = 1 ..)]
    exclude: Vec<String>,
    /// Select tests by name.
    #[arg(long, value_name = "NAME", num_args = 1 ..)]
    test: Vec<String>,
    /// Select suites by name.
    #[arg(long, value_name = "NAME", num_args = 1 ..)]
    suite: Vec<String>,
    /// Engine log level.
    #[arg(long, value_enum, ignore_case = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
    /// File extensions to pack (default: robot, txt, text, resource).
    #[arg(long, value_name = "EXT", num_args = 1 ..)]
    extension: Vec<String>,
}

/// Engine log levels.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
#[value(rename_all = "UPPER")]
enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug output.
    Debug,
    /// Informational output.
    Info,
    /// Warnings only.
    Warn,
    /// No engine logging.
    None,
}

impl LogLevel {
    /// Returns the engine spelling.
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::None => "NONE",
        }
    }
}

/// Arguments for `ping`.
#[derive(Args, Debug)]
struct PingCommand {
    /// Client config file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config file to validate.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Validate as a client config instead of an agent config.
    #[arg(long, action = ArgAction::SetTrue)]
    client: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        let _ = <Cli as clap::CommandFactory>::command().print_help();
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Run(command) => command_run(*command).await,
        Commands::Ping(command) => command_ping(command).await,
        Commands::Config {
            command,
        } => command_config(command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = AgentConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let audit =
        audit_sink(&config.audit).map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    let engine: Arc<dyn ExecutionEngine> = Arc::new(ProcessEngine::from_config(&config.engine));
    let runtime = AgentRuntime::bind(&config, engine, audit)
        .await
        .map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    let address =
        runtime.local_addr().map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    write_stderr_line(&t!(
        "serve.listening",
        address = address,
        mutual_tls = config.mutual_tls()
    ))
    .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    runtime
        .serve_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|err| CliError::new(t!("serve.failed", error = err)))?;
    write_stderr_line(&t!("serve.stopped"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Run Command
// ============================================================================

/// Executes the `run` command.
async fn command_run(command: RunCommand) -> CliResult<ExitCode> {
    let config = ClientConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    if !command.input_dir.is_dir() {
        return Err(CliError::new(t!("run.input_missing", path = command.input_dir.display())));
    }
    let job = build_job(command)?;
    let client =
        RelayClient::new(config).map_err(|err| CliError::new(t!("client.init_failed", error = err)))?;
    let outcome = match client.run_suite(&job).await {
        Ok(outcome) => outcome,
        Err(err) => {
            let mut message = t!("run.failed", error = err);
            if err.is_retryable() {
                message.push('\n');
                message.push_str(&t!("run.retry_hint"));
            }
            return Err(CliError::new(message));
        }
    };

    if !outcome.stdout.is_empty() {
        write_stdout_line(outcome.stdout.trim_end())
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    if !outcome.stderr.is_empty() {
        write_stderr_line(outcome.stderr.trim_end())
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let mut lines = vec![t!("run.request_id", request_id = outcome.request_id)];
    if let Some(message) = &outcome.message {
        lines.push(t!("run.message", message = message));
    }
    for path in &outcome.artifacts {
        lines.push(t!("run.artifact", path = path.display()));
    }
    lines.push(t!(
        "run.summary",
        status = outcome.status,
        exit_code = outcome.exit_code,
        attempts = outcome.attempts
    ));
    for line in lines {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(exit_code_for(outcome.status))
}

/// Builds the submission from parsed arguments.
fn build_job(command: RunCommand) -> CliResult<SuiteJob> {
    let filters = RunFilters {
        include: command.include,
        exclude: command.exclude,
        test: command.test,
        suite: command.suite,
        log_level: command.log_level.map(|level| level.as_str().to_string()),
        extra: command.options,
    };
    let options = build_options(&filters)
        .map_err(|err| CliError::new(t!("run.option_invalid", error = err)))?;
    let mut job = SuiteJob::new(command.input_dir, command.entry_point, command.output_dir);
    job.timeout_seconds = command.timeout;
    job.options = options;
    job.extensions = command.extension;
    Ok(job)
}

/// Maps an execution status to the process exit code.
fn exit_code_for(status: ExecutionStatus) -> ExitCode {
    match status {
        ExecutionStatus::Success => ExitCode::SUCCESS,
        ExecutionStatus::TestFailures => ExitCode::from(EXIT_TEST_FAILURES),
        ExecutionStatus::ExecutionError => ExitCode::from(EXIT_EXECUTION_ERROR),
        ExecutionStatus::Timeout => ExitCode::from(EXIT_TIMEOUT),
    }
}

// ============================================================================
// SECTION: Ping Command
// ============================================================================

/// Executes the `ping` command.
async fn command_ping(command: PingCommand) -> CliResult<ExitCode> {
    let config = ClientConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let client =
        RelayClient::new(config).map_err(|err| CliError::new(t!("client.init_failed", error = err)))?;
    let delivered =
        client.ping().await.map_err(|err| CliError::new(t!("ping.failed", error = err)))?;
    let status = delivered.value;
    write_stdout_line(&t!(
        "ping.ok",
        version = status.agent_version,
        protocol = status.protocol_version,
        busy = status.busy,
        mutual_tls = status.mutual_tls,
        attempts = delivered.attempts
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(&command),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let loaded = if command.client {
        ClientConfig::load(command.config.as_deref()).map(|_| ())
    } else {
        AgentConfig::load(command.config.as_deref()).map(|_| ())
    };
    loaded.map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    write_stdout_line(&t!("config.validate.ok"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    t!("output.write_failed", stream = stream, error = error)
}

/// Emits an error message and returns the CLI failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::from(EXIT_CLI_ERROR)
}
