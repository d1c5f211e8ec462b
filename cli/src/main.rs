use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use auditgate::budget::BudgetStatus;
use auditgate::journal::JournalStore;
use auditgate::{
    catalog, AuditGateway, ContextPurpose, DispatchOptions, DomainContext, PipelineConfig,
    PipelineError, ResponseSchema, ResponseShape,
};
use chrono::Duration as ChronoDuration;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit code when the daily budget is exhausted.
const EXIT_QUOTA: u8 = 2;

#[derive(Parser)]
#[command(name = "auditgate")]
#[command(version, about = "Quota-governed AI audit pipeline")]
struct Cli {
    /// Configuration file (TOML). Defaults to <config_dir>/auditgate/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show today's budget usage.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Send one document to the model.
    Dispatch {
        #[command(flatten)]
        request: RequestArgs,

        /// Transport timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long)]
        json: bool,
    },
    /// Print the instruction a dispatch would send. Uses no budget.
    Instruction {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print the effective configuration as TOML.
    Config,
    /// List the built-in response schemas.
    Schemas,
    /// Delete journal files older than the retention period.
    PruneJournal,
}

#[derive(Args)]
struct RequestArgs {
    /// File holding the content to audit.
    #[arg(long)]
    content: PathBuf,

    /// Domain context as JSON. Defaults to a document audit of the content file.
    #[arg(long)]
    context: Option<PathBuf>,

    /// Response schema as JSON.
    #[arg(long, conflicts_with = "builtin")]
    schema: Option<PathBuf>,

    /// Built-in response schema name.
    #[arg(long)]
    builtin: Option<String>,
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    error: &'a str,
    message: String,
    retryable: bool,
    charged_units: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("auditgate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("auditgate=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config =
        PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(
        path = ?cli.config,
        ledger_dir = %config.ledger_dir().display(),
        "configuration loaded"
    );

    match cli.command {
        Command::Status { json } => status(&config, json),
        Command::Dispatch {
            request,
            timeout_ms,
            json,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(dispatch(&config, &request, timeout_ms, json))
        }
        Command::Instruction { request } => instruction(&config, &request),
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Schemas => {
            for name in catalog::names() {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::PruneJournal => prune_journal(&config),
    }
}

fn status(config: &PipelineConfig, json: bool) -> Result<ExitCode> {
    let status = config
        .quota_guard()
        .context("failed to open usage ledger")?
        .status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(ExitCode::SUCCESS);
    }

    print!("{}", status.format());
    let level = match status.level {
        BudgetStatus::Ok => status.level.as_str().green(),
        BudgetStatus::Warning => status.level.as_str().yellow(),
        BudgetStatus::Critical | BudgetStatus::Exceeded => status.level.as_str().red(),
    };
    println!("**Level**: {}", level);
    println!("**Resets**: {} 00:00 UTC", status.date + ChronoDuration::days(1));
    Ok(ExitCode::SUCCESS)
}

async fn dispatch(
    config: &PipelineConfig,
    request: &RequestArgs,
    timeout_ms: Option<u64>,
    json: bool,
) -> Result<ExitCode> {
    let content = read_content(&request.content)?;
    let context = load_context(request)?;
    let shape = load_shape(request)?;
    let gateway = AuditGateway::from_config(config)?;

    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut options = DispatchOptions::new().with_cancellation(cancellation);
    if let Some(timeout_ms) = timeout_ms {
        options = options.with_timeout(Duration::from_millis(timeout_ms));
    }

    match gateway.dispatch(&content, &context, &shape, options).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let Some(parsed) = &result.parsed {
                println!("{}", serde_json::to_string_pretty(parsed)?);
                eprintln!("{} {} units charged", "ok:".green().bold(), result.estimated_cost);
            } else {
                println!("{}", result.raw);
                eprintln!("{} {} units charged", "ok:".green().bold(), result.estimated_cost);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report_failure(&err, json)?;
            Ok(exit_code_for(&err))
        }
    }
}

fn report_failure(err: &PipelineError, json: bool) -> Result<()> {
    if json {
        let report = ErrorReport {
            error: err.label(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            charged_units: err.charged_units(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    eprintln!("{} {}", format!("{}:", err.label()).red().bold(), err);
    match err {
        PipelineError::QuotaExceeded(_) => {
            eprintln!("The daily AI budget is exhausted; it resets at midnight UTC.")
        }
        _ if err.is_retryable() => eprintln!("This failure is transient; retrying may succeed."),
        _ => {}
    }
    Ok(())
}

fn exit_code_for(err: &PipelineError) -> ExitCode {
    match err {
        PipelineError::QuotaExceeded(_) => ExitCode::from(EXIT_QUOTA),
        _ => ExitCode::FAILURE,
    }
}

fn instruction(config: &PipelineConfig, request: &RequestArgs) -> Result<ExitCode> {
    let content = read_content(&request.content)?;
    let context = load_context(request)?;
    let shape = load_shape(request)?;

    let assembler = auditgate::ContextAssembler::new(config.content.max_content_chars);
    let instruction = assembler.build(&content, &context, &shape)?;

    println!("{}", "# System directive".bold());
    println!("{}", instruction.system_directive);
    println!();
    println!("{}", "# User content".bold());
    println!("{}", instruction.user_content);
    Ok(ExitCode::SUCCESS)
}

fn prune_journal(config: &PipelineConfig) -> Result<ExitCode> {
    let journal = JournalStore::new(config.journal_dir(), &config.journal)
        .context("failed to open dispatch journal")?;
    let deleted = journal.enforce_retention()?;
    println!(
        "Pruned {} journal file(s) older than {} days from {}",
        deleted,
        config.journal.retention_days,
        journal.dir().display()
    );
    Ok(ExitCode::SUCCESS)
}

fn read_content(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_context(request: &RequestArgs) -> Result<DomainContext> {
    match &request.context {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid domain context in {}", path.display()))
        }
        None => {
            let label = request
                .content
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            Ok(DomainContext::new(ContextPurpose::DocumentAudit, label))
        }
    }
}

fn load_shape(request: &RequestArgs) -> Result<ResponseShape> {
    if let Some(path) = &request.schema {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let schema: ResponseSchema = serde_json::from_str(&raw)
            .with_context(|| format!("invalid response schema in {}", path.display()))?;
        return Ok(ResponseShape::structured(schema));
    }

    match &request.builtin {
        Some(name) => match catalog::by_name(name) {
            Some(schema) => Ok(ResponseShape::structured(schema)),
            None => bail!(
                "unknown built-in schema '{}' (available: {})",
                name,
                catalog::names().join(", ")
            ),
        },
        None => Ok(ResponseShape::FreeText),
    }
}
