//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::report::OutputFormat;

/// Docket - project documentation to tracker tickets and git branches
#[derive(Parser)]
#[command(
    name = "dk",
    about = "Turn project documentation into linked tracker tickets and git branches",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log at DEBUG level
    #[arg(short, long, global = true, help = "Log at DEBUG level")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract the task hierarchy from a document and show it, without provisioning
    Plan {
        /// Document to decompose
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format (text, tree, json)
        #[arg(short, long, default_value = "tree")]
        format: OutputFormat,
    },

    /// Parse a saved model response offline
    Parse {
        /// File holding the raw model response
        #[arg(value_name = "RESPONSE_FILE")]
        response: PathBuf,

        /// Output format (text, tree, json)
        #[arg(short, long, default_value = "tree")]
        format: OutputFormat,
    },

    /// Extract, plan and provision tickets and branches for a document
    Run {
        /// Document to decompose
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Branch new branches are cut from (overrides scm.base-branch)
        #[arg(short, long)]
        base_branch: Option<String>,

        /// Create tickets only
        #[arg(long)]
        no_branches: bool,

        /// Show the operations that would run, without provisioning
        #[arg(long)]
        dry_run: bool,

        /// Output format (text, tree, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    ShowConfig,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docket")
        .join("logs")
        .join("docket.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Help footer listing where logs and saved responses go
pub fn generate_after_help() -> String {
    let responses = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docket")
        .join("responses");
    format!(
        "Logs are written to: {}\nUnparseable model responses are saved to: {}\n",
        get_log_path().display(),
        responses.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["dk"]).is_err());
    }

    #[test]
    fn test_cli_parse_plan() {
        let cli = Cli::try_parse_from(["dk", "plan", "notes.md"]).unwrap();
        match cli.command {
            Command::Plan { file, format } => {
                assert_eq!(file, PathBuf::from("notes.md"));
                assert_eq!(format, OutputFormat::Tree);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "dk",
            "run",
            "notes.md",
            "--base-branch",
            "develop",
            "--no-branches",
            "--dry-run",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                file,
                base_branch,
                no_branches,
                dry_run,
                format,
            } => {
                assert_eq!(file, PathBuf::from("notes.md"));
                assert_eq!(base_branch.as_deref(), Some("develop"));
                assert!(no_branches);
                assert!(dry_run);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::try_parse_from(["dk", "run", "notes.md"]).unwrap();
        match cli.command {
            Command::Run {
                base_branch,
                no_branches,
                dry_run,
                format,
                ..
            } => {
                assert!(base_branch.is_none());
                assert!(!no_branches);
                assert!(!dry_run);
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from(["dk", "show-config", "--config", "/tmp/dk.yml", "-v"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/dk.yml")));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::ShowConfig));
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["dk", "parse", "resp.txt", "--format", "yaml"]).is_err());
    }
}
