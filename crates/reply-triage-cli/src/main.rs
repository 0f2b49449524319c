// crates/reply-triage-cli/src/main.rs
// ============================================================================
// Module: Reply Triage CLI Entry Point
// Description: Command dispatcher for driving obligee-action wizards.
// Purpose: Run, inspect, and commit reply classification flows from a shell.
// Dependencies: clap, reply-triage-cli, reply-triage-config, reply-triage-core, serde_json, time
// ============================================================================

//! ## Overview
//! The CLI drives one wizard per thread against a JSON thread fixture. Step
//! commands (`open`, `show`, `submit`, `back`, `commit`) persist between
//! invocations and therefore require the sqlite store; `replay` runs a whole
//! scripted flow in one process and works with either store. All output is
//! canonical JSON on stdout; errors go to stderr with a failing exit code.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use reply_triage_cli::fixture::ThreadFixture;
use reply_triage_cli::host::HostError;
use reply_triage_cli::host::HostWizard;
use reply_triage_cli::host::JsonlHelpDesk;
use reply_triage_cli::host::build_wizard;
use reply_triage_cli::input::MAX_INPUT_BYTES;
use reply_triage_cli::input::read_json_with_limit;
use reply_triage_config::TriageConfig;
use reply_triage_config::config_toml_example;
use reply_triage_core::DraftId;
use reply_triage_core::DraftRef;
use reply_triage_core::InputSource;
use reply_triage_core::InstanceId;
use reply_triage_core::MessageSnapshot;
use reply_triage_core::OpenRequest;
use reply_triage_core::RawInput;
use reply_triage_core::SessionId;
use reply_triage_core::StepCatalog;
use reply_triage_core::StepCursor;
use reply_triage_core::StepKey;
use reply_triage_core::SubmitOutcome;
use reply_triage_core::SubmitRequest;
use reply_triage_core::ThreadId;
use reply_triage_core::WizardError;
use reply_triage_core::core::dates::parse_calendar_date;
use reply_triage_core::hashing::canonical_json_bytes_with_limit;
use reply_triage_core::runtime::Applicability;
use reply_triage_core::step_address;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a single JSON document written to stdout.
const MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;
/// Exit code for a submission rejected with field errors.
const EXIT_REJECTED: u8 = 2;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "reply-triage", version, about = "Classify obligee replies step by step.")]
struct Cli {
    /// Path to `reply-triage.toml` (defaults to `REPLY_TRIAGE_CONFIG`, then the working directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Command to run.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the step catalog with applicability conditions.
    Catalog,
    /// Configuration utilities.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Open or resume the flow for a thread.
    Open(OpenCommand),
    /// Show a step of a flow (the current step by default).
    Show(ShowCommand),
    /// Submit input for the current step.
    Submit(SubmitCommand),
    /// Return to an earlier step, discarding later answers.
    Back(BackCommand),
    /// Commit a terminal flow.
    Commit(CommitCommand),
    /// Print the committed outputs of a thread.
    Ledger(LedgerCommand),
    /// List stored in-progress flows.
    List(ListCommand),
    /// Run a scripted flow from open to commit in one process.
    Replay(ReplayCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print a canonical example configuration.
    Example,
}

/// Collaborator inputs shared by flow commands.
#[derive(Args, Debug)]
struct HostArgs {
    /// Thread fixture JSON file.
    #[arg(long, value_name = "PATH")]
    fixture: PathBuf,
    /// JSON-lines file help requests are appended to.
    #[arg(long, value_name = "PATH", default_value = "reply-triage-help.jsonl")]
    help_log: PathBuf,
}

/// Arguments for `open`.
#[derive(Args, Debug)]
struct OpenCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Thread the reply belongs to.
    #[arg(long)]
    thread: String,
    /// Parsed incoming message JSON; omit for a manually entered reply.
    #[arg(long, value_name = "PATH")]
    message: Option<PathBuf>,
    /// Session part of the draft holder for staged uploads.
    #[arg(long, default_value = "cli")]
    session: String,
    /// Draft part of the draft holder for staged uploads.
    #[arg(long, default_value = "cli")]
    draft: String,
}

/// Arguments for `show`.
#[derive(Args, Debug)]
struct ShowCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Instance identifier.
    #[arg(long)]
    instance: String,
    /// Step to show; defaults to the current step.
    #[arg(long, value_parser = parse_step_key)]
    step: Option<StepKey>,
}

/// Arguments for `submit`.
#[derive(Args, Debug)]
struct SubmitCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Instance identifier.
    #[arg(long)]
    instance: String,
    /// Step the input answers.
    #[arg(long, value_parser = parse_step_key)]
    step: StepKey,
    /// Input fields as an inline JSON object.
    #[arg(long, conflicts_with = "input_file")]
    input: Option<String>,
    /// Input fields as a JSON object file.
    #[arg(long, value_name = "PATH")]
    input_file: Option<PathBuf>,
    /// Local calendar day of the submission (`YYYY-MM-DD`); defaults to today.
    #[arg(long, value_parser = parse_date)]
    today: Option<Date>,
}

/// Arguments for `back`.
#[derive(Args, Debug)]
struct BackCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Instance identifier.
    #[arg(long)]
    instance: String,
    /// Earlier step to return to.
    #[arg(long, value_parser = parse_step_key)]
    step: StepKey,
}

/// Arguments for `commit`.
#[derive(Args, Debug)]
struct CommitCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Instance identifier.
    #[arg(long)]
    instance: String,
}

/// Arguments for `ledger`.
#[derive(Args, Debug)]
struct LedgerCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Thread to read.
    #[arg(long)]
    thread: String,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
struct ListCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Restrict to one thread.
    #[arg(long)]
    thread: Option<String>,
}

/// Arguments for `replay`.
#[derive(Args, Debug)]
struct ReplayCommand {
    /// Collaborator inputs.
    #[command(flatten)]
    host: HostArgs,
    /// Replay script JSON file.
    #[arg(long, value_name = "PATH")]
    script: PathBuf,
}

// ============================================================================
// SECTION: Replay Scripts
// ============================================================================

/// Scripted flow for `replay`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReplayScript {
    /// Open request.
    open: OpenRequest,
    /// Local calendar day used for every submission.
    today: Date,
    /// Answers in order.
    steps: Vec<ReplayStep>,
    /// Whether to commit after the last answer.
    #[serde(default)]
    commit: bool,
}

/// One scripted answer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReplayStep {
    /// Step answered.
    step: StepKey,
    /// Raw input fields.
    input: RawInput,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Catalog entry printed by `catalog`.
#[derive(Serialize)]
struct CatalogEntry<'a> {
    /// Step key.
    key: StepKey,
    /// Applicability condition.
    applicability: &'a Applicability,
}

/// Flow position printed after navigation commands.
#[derive(Serialize)]
struct PositionReport {
    /// Instance identifier.
    instance_id: InstanceId,
    /// Current position.
    cursor: StepCursor,
    /// Address of the current step, when one remains.
    address: Option<String>,
}

/// Submission result printed by `submit`.
#[derive(Serialize)]
struct SubmitReport {
    /// Submission outcome.
    outcome: SubmitOutcome,
    /// Address of the step to show next, when one remains.
    address: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying the message shown to the user.
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

impl From<HostError> for CliError {
    fn from(err: HostError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<WizardError> for CliError {
    fn from(err: WizardError) -> Self {
        Self::new(format!("{} ({})", err, err.kind()))
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Catalog => command_catalog(),
        Commands::Config {
            command,
        } => command_config(&command, cli.config),
        Commands::Open(command) => command_open(command, &load_config(cli.config)?),
        Commands::Show(command) => command_show(command, &load_config(cli.config)?),
        Commands::Submit(command) => command_submit(command, &load_config(cli.config)?),
        Commands::Back(command) => command_back(command, &load_config(cli.config)?),
        Commands::Commit(command) => command_commit(command, &load_config(cli.config)?),
        Commands::Ledger(command) => command_ledger(command, &load_config(cli.config)?),
        Commands::List(command) => command_list(command, &load_config(cli.config)?),
        Commands::Replay(command) => command_replay(command, &load_config(cli.config)?),
    }
}

// ============================================================================
// SECTION: Catalog and Config Commands
// ============================================================================

/// Prints the step catalog.
fn command_catalog() -> CliResult<ExitCode> {
    let catalog = StepCatalog::obligee_action();
    let entries: Vec<CatalogEntry<'_>> = catalog
        .steps()
        .iter()
        .map(|step| CatalogEntry {
            key: step.key,
            applicability: &step.applicability,
        })
        .collect();
    write_json(&entries)?;
    Ok(ExitCode::SUCCESS)
}

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand, path: Option<PathBuf>) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate => {
            let config = load_config(path)?;
            write_json(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        ConfigCommand::Example => {
            write_stdout(&config_toml_example())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Flow Commands
// ============================================================================

/// Opens or resumes a flow.
fn command_open(command: OpenCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let wizard = durable_wizard(config, &command.host, "open")?;
    let source = match &command.message {
        Some(path) => InputSource::Message(
            read_json_with_limit::<MessageSnapshot>(path, MAX_INPUT_BYTES)
                .map_err(|err| CliError::new(format!("message {}: {err}", path.display())))?,
        ),
        None => InputSource::Manual,
    };
    let instance = wizard.open(OpenRequest {
        thread_id: ThreadId::new(command.thread),
        source,
        draft: DraftRef {
            session_id: SessionId::new(command.session),
            draft_id: DraftId::new(command.draft),
        },
    })?;
    write_position(&wizard, config, &instance.instance_id)
}

/// Shows a step view, or the terminal position when no step remains.
fn command_show(command: ShowCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let wizard = durable_wizard(config, &command.host, "show")?;
    let instance_id = InstanceId::from_raw(command.instance);
    let step = match command.step {
        Some(step) => step,
        None => match wizard.resolve_current_step(&instance_id)? {
            StepCursor::Step(step) => step,
            StepCursor::Terminal(_) => return write_position(&wizard, config, &instance_id),
        },
    };
    write_json(&wizard.step_view(&instance_id, step)?)?;
    Ok(ExitCode::SUCCESS)
}

/// Submits input for a step.
fn command_submit(command: SubmitCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let wizard = durable_wizard(config, &command.host, "submit")?;
    let input: RawInput = match (&command.input, &command.input_file) {
        (Some(inline), _) => {
            serde_json::from_str(inline).map_err(|err| CliError::new(format!("invalid --input json: {err}")))?
        }
        (None, Some(path)) => read_json_with_limit(path, MAX_INPUT_BYTES)
            .map_err(|err| CliError::new(format!("input {}: {err}", path.display())))?,
        (None, None) => RawInput::new(),
    };
    let instance_id = InstanceId::from_raw(command.instance);
    let outcome = wizard.submit(SubmitRequest {
        instance_id: instance_id.clone(),
        step: command.step,
        input,
        today: command.today.unwrap_or_else(local_today),
    })?;
    let rejected = matches!(outcome, SubmitOutcome::Rejected(_));
    let address = match &outcome {
        SubmitOutcome::Advanced(cursor) => cursor_address(config, &instance_id, *cursor),
        SubmitOutcome::Rejected(_) => Some(step_address(&config.navigation.base_path, &instance_id, command.step)),
    };
    write_json(&SubmitReport {
        outcome,
        address,
    })?;
    Ok(if rejected { ExitCode::from(EXIT_REJECTED) } else { ExitCode::SUCCESS })
}

/// Returns to an earlier step.
fn command_back(command: BackCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let wizard = durable_wizard(config, &command.host, "back")?;
    let instance_id = InstanceId::from_raw(command.instance);
    wizard.go_back(&instance_id, command.step)?;
    write_position(&wizard, config, &instance_id)
}

/// Commits a terminal flow.
fn command_commit(command: CommitCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let wizard = durable_wizard(config, &command.host, "commit")?;
    let outcome = wizard.commit(&InstanceId::from_raw(command.instance))?;
    write_json(&outcome)?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the committed outputs of a thread.
fn command_ledger(command: LedgerCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let wizard = durable_wizard(config, &command.host, "ledger")?;
    write_json(&wizard.ledger(&ThreadId::new(command.thread))?)?;
    Ok(ExitCode::SUCCESS)
}

/// Lists stored in-progress flows.
fn command_list(command: ListCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let wizard = durable_wizard(config, &command.host, "list")?;
    let thread = command.thread.map(ThreadId::new);
    write_json(&wizard.store().list_instances(thread.as_ref())?)?;
    Ok(ExitCode::SUCCESS)
}

/// Runs a scripted flow in one process.
fn command_replay(command: ReplayCommand, config: &TriageConfig) -> CliResult<ExitCode> {
    let script: ReplayScript = read_json_with_limit(&command.script, MAX_INPUT_BYTES)
        .map_err(|err| CliError::new(format!("script {}: {err}", command.script.display())))?;
    let wizard = host_wizard(config, &command.host)?;
    let instance = wizard.open(script.open)?;
    let instance_id = instance.instance_id;
    for answer in script.steps {
        let outcome = wizard.submit(SubmitRequest {
            instance_id: instance_id.clone(),
            step: answer.step,
            input: answer.input,
            today: script.today,
        })?;
        if let SubmitOutcome::Rejected(_) = outcome {
            write_json(&SubmitReport {
                outcome,
                address: Some(step_address(&config.navigation.base_path, &instance_id, answer.step)),
            })?;
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
    }
    if script.commit {
        write_json(&wizard.commit(&instance_id)?)?;
        return Ok(ExitCode::SUCCESS);
    }
    write_position(&wizard, config, &instance_id)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(path: Option<PathBuf>) -> CliResult<TriageConfig> {
    TriageConfig::load(path.as_deref()).map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Builds a wizard from configuration and host arguments.
fn host_wizard(config: &TriageConfig, host: &HostArgs) -> CliResult<HostWizard> {
    let fixture = ThreadFixture::load(&host.fixture)
        .map_err(|err| CliError::new(format!("fixture {}: {err}", host.fixture.display())))?;
    Ok(build_wizard(config, fixture, JsonlHelpDesk::new(host.help_log.clone()))?)
}

/// Builds a wizard whose flows survive between invocations.
fn durable_wizard(config: &TriageConfig, host: &HostArgs, command: &'static str) -> CliResult<HostWizard> {
    let wizard = host_wizard(config, host)?;
    if !wizard.store().is_durable() {
        return Err(HostError::NotDurable(command).into());
    }
    Ok(wizard)
}

/// Returns the step address for a cursor, when a step remains.
fn cursor_address(config: &TriageConfig, instance_id: &InstanceId, cursor: StepCursor) -> Option<String> {
    match cursor {
        StepCursor::Step(step) => Some(step_address(&config.navigation.base_path, instance_id, step)),
        StepCursor::Terminal(_) => None,
    }
}

/// Prints the current position of a flow.
fn write_position(wizard: &HostWizard, config: &TriageConfig, instance_id: &InstanceId) -> CliResult<ExitCode> {
    let cursor = wizard.resolve_current_step(instance_id)?;
    write_json(&PositionReport {
        instance_id: instance_id.clone(),
        cursor,
        address: cursor_address(config, instance_id, cursor),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Today's local calendar day, falling back to UTC when the offset is unknown.
fn local_today() -> Date {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()).date()
}

/// Parses a `YYYY-MM-DD` argument.
fn parse_date(value: &str) -> Result<Date, String> {
    parse_calendar_date(value).ok_or_else(|| format!("invalid date {value}; expected YYYY-MM-DD"))
}

/// Parses a step key argument.
fn parse_step_key(value: &str) -> Result<StepKey, String> {
    value.parse::<StepKey>().map_err(|err| err.to_string())
}

/// Writes canonical JSON to stdout with a size limit.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = canonical_json_bytes_with_limit(value, MAX_OUTPUT_BYTES)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    bytes.push(b'\n');
    std::io::stdout().write_all(&bytes).map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes text to stdout.
fn write_stdout(text: &str) -> CliResult<()> {
    write!(std::io::stdout(), "{text}").map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes an error message to stderr and returns a failing exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = writeln!(std::io::stderr(), "{message}");
    ExitCode::FAILURE
}
