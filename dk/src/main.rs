//! Docket - project documentation to linked tracker tickets and git branches
//!
//! CLI entry point.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use docket::cli::{Cli, Command, generate_after_help, get_log_path};
use docket::config::{Config, Requirements};
use docket::domain::TaskTree;
use docket::extract::{HierarchyExtractor, TextNormalizer};
use docket::hierarchy;
use docket::llm::create_client;
use docket::pipeline::{
    AbortReason, AbortReport, PipelineCoordinator, PipelineEvent, PipelineOutcome, PipelineSettings, ProgressBus,
    next_event,
};
use docket::planning::{self, OperationKind};
use docket::prompts::PromptLoader;
use docket::report::{self, OutputFormat};
use docket::scm::GitHubClient;
use docket::tracker::JiraClient;

fn setup_logging(verbose: bool) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("Docket loaded config: provider={} model={}", config.llm.provider, config.llm.model);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Plan { file, format } => {
            debug!(?file, %format, "main: matched Plan command");
            cmd_plan(&config, &file, format).await
        }
        Command::Parse { response, format } => {
            debug!(?response, %format, "main: matched Parse command");
            cmd_parse(&response, format)
        }
        Command::Run {
            file,
            base_branch,
            no_branches,
            dry_run,
            format,
        } => {
            debug!(?file, ?base_branch, no_branches, dry_run, %format, "main: matched Run command");
            let create_branches = config.pipeline.create_branches && !no_branches;
            if dry_run {
                cmd_dry_run(&config, &file, create_branches, format).await
            } else {
                cmd_run(&config, &file, base_branch, create_branches, format).await
            }
        }
        Command::ShowConfig => {
            debug!("main: matched ShowConfig command");
            cmd_show_config(&config)
        }
    }
}

fn read_document(path: &Path) -> Result<String> {
    let bytes = fs::read(path).context(format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Coordinator with the model side wired; tracker and host are added by the caller
fn build_coordinator(config: &Config, settings: PipelineSettings) -> Result<PipelineCoordinator> {
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let root = std::env::current_dir().context("Failed to determine working directory")?;
    let prompts = PromptLoader::new(root, config.prompts.override_dir.as_deref());
    let extractor = HierarchyExtractor::from_config(llm, prompts, &config.llm);

    Ok(PipelineCoordinator::new(extractor, settings).with_normalizer(TextNormalizer::from(&config.normalize)))
}

/// Keep an unparseable model response for inspection
fn save_raw_response(config: &Config, run_id: &str, raw: &str) -> Result<PathBuf> {
    let dir = config.pipeline.responses_dir();
    fs::create_dir_all(&dir).context(format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.txt", run_id));
    fs::write(&path, raw).context(format!("Failed to write {}", path.display()))?;
    info!(?path, "Saved raw model response");
    Ok(path)
}

fn report_abort(config: &Config, report: &AbortReport) -> Result<()> {
    eprintln!("{} {}", "Error:".red().bold(), report.reason);
    if let (AbortReason::Parse(_), Some(raw)) = (&report.reason, &report.raw_response) {
        match save_raw_response(config, &report.run_id, raw) {
            Ok(path) => {
                eprintln!("Raw model response saved to: {}", path.display());
                eprintln!("Inspect it with: dk parse {}", path.display());
            }
            Err(e) => {
                warn!("Could not save raw response: {}", e);
                eprintln!("--- raw model response ---\n{}\n--- end ---", raw);
            }
        }
    }
    Ok(())
}

fn print_tree(tree: &TaskTree, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree.to_json())?),
        OutputFormat::Tree => print!("{}", report::render_tree(tree, None)),
        OutputFormat::Text => {
            for id in tree.pre_order() {
                println!("{}", tree.path(id).join(" > "));
            }
        }
    }
    Ok(())
}

/// Extract and show the hierarchy, no provisioning
async fn cmd_plan(config: &Config, file: &Path, format: OutputFormat) -> Result<()> {
    debug!(?file, "cmd_plan: called");
    config.validate(Requirements::extraction())?;

    let document = read_document(file)?;
    let coordinator = build_coordinator(config, PipelineSettings::from_config(config))?;

    match coordinator.extract_tree(&document).await {
        Ok(extraction) => {
            if extraction.document.truncated && format != OutputFormat::Json {
                eprintln!(
                    "{} document truncated from {} characters",
                    "Warning:".yellow().bold(),
                    extraction.document.original_chars
                );
            }
            print_tree(&extraction.tree, format)
        }
        Err(report) => {
            report_abort(config, &report)?;
            Err(eyre!("Extraction aborted"))
        }
    }
}

/// Parse a saved model response offline
fn cmd_parse(response: &Path, format: OutputFormat) -> Result<()> {
    debug!(?response, "cmd_parse: called");
    let raw = read_document(response)?;

    match hierarchy::parse(&raw) {
        Ok(tree) => {
            info!(nodes = tree.len(), "cmd_parse: parsed");
            print_tree(&tree, format)
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            Err(eyre!("Response could not be parsed"))
        }
    }
}

/// Extract and list the operations a run would perform
async fn cmd_dry_run(config: &Config, file: &Path, create_branches: bool, format: OutputFormat) -> Result<()> {
    debug!(?file, create_branches, "cmd_dry_run: called");
    config.validate(Requirements::extraction())?;

    let document = read_document(file)?;
    let coordinator = build_coordinator(config, PipelineSettings::from_config(config))?;
    let extraction = match coordinator.extract_tree(&document).await {
        Ok(extraction) => extraction,
        Err(report) => {
            report_abort(config, &report)?;
            return Err(eyre!("Extraction aborted"));
        }
    };

    let operations: Vec<_> = planning::plan(&extraction.tree)
        .into_iter()
        .filter(|op| create_branches || op.kind() == OperationKind::Ticket)
        .collect();

    if format == OutputFormat::Json {
        let value = serde_json::json!({
            "tree": extraction.tree,
            "operations": operations,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", report::render_tree(&extraction.tree, None));
        println!();
        println!("{} ({} operations, nothing created)", "Plan".bold(), operations.len());
        print!("{}", report::render_plan(&extraction.tree, &operations));
    }
    Ok(())
}

/// Full pipeline
async fn cmd_run(
    config: &Config,
    file: &Path,
    base_branch: Option<String>,
    create_branches: bool,
    format: OutputFormat,
) -> Result<()> {
    debug!(?file, ?base_branch, create_branches, "cmd_run: called");
    config.validate(Requirements::full_run(create_branches))?;

    let document = read_document(file)?;
    let mut settings = PipelineSettings::from_config(config);
    if let Some(base) = base_branch {
        settings = settings.with_base_branch(base);
    }

    let tracker = JiraClient::from_config(&config.tracker)?;
    let bus = Arc::new(ProgressBus::with_default_capacity());
    let mut events = bus.subscribe();

    let mut coordinator = build_coordinator(config, settings)?
        .with_tracker(Arc::new(tracker))
        .with_progress(bus);
    if create_branches {
        coordinator = coordinator.with_source_host(Arc::new(GitHubClient::from_config(&config.scm)?));
    }

    let stop = coordinator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping after in-flight operations finish...");
            stop.stop();
        }
    });

    let show_progress = format != OutputFormat::Json;
    let printer = tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            if !show_progress {
                continue;
            }
            match event {
                PipelineEvent::StateChanged { to, .. } => eprintln!("{} {}", "==>".cyan(), to),
                PipelineEvent::OperationFinished {
                    kind,
                    status,
                    external_ref,
                    detail,
                    ..
                } => {
                    let what = external_ref.or(detail).unwrap_or_default();
                    eprintln!("    {} {} {}", kind, status, what);
                }
                PipelineEvent::Warning { message, .. } => eprintln!("    {} {}", "warning:".yellow(), message),
                PipelineEvent::OperationStarted { .. } => {}
            }
        }
    });

    let outcome = coordinator.run(&document).await;
    drop(coordinator);
    if let Err(e) = printer.await {
        warn!("Progress printer ended abnormally: {}", e);
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report::outcome_json(&outcome))?);
    } else {
        print!("{}", report::render_outcome(&outcome, format));
    }

    match &outcome {
        PipelineOutcome::Completed(report) => {
            let failed = report.ledger.summary().failed;
            if failed > 0 {
                return Err(eyre!("{} operations failed", failed));
            }
            Ok(())
        }
        PipelineOutcome::Aborted(report) => {
            report_abort(config, report)?;
            Err(eyre!("Run aborted"))
        }
    }
}

fn cmd_show_config(config: &Config) -> Result<()> {
    debug!("cmd_show_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}
