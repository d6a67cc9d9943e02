//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// litscout - automated literature review with local LLMs
///
/// Searches arXiv for papers in a research domain, downloads and reads
/// them, analyzes each one with an Ollama model and writes a review.
///
/// Examples:
///   litscout run --domain "self-evolving agents" --start-year 2023
///   litscout run --keywords "skill library,lifelong learning"
///   litscout --config research.toml schedule
///   litscout init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .litscout.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true, env = "LITSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the pipeline once and write a report
    Run(PipelineArgs),

    /// Run the pipeline on the configured schedule until Ctrl-C
    Schedule(PipelineArgs),

    /// Generate a default .litscout.toml configuration file
    InitConfig,
}

/// Research overrides shared by `run` and `schedule`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Research domain to search
    #[arg(short, long, value_name = "DOMAIN")]
    pub domain: Option<String>,

    /// First publication year to include
    #[arg(long, value_name = "YEAR")]
    pub start_year: Option<i32>,

    /// Last publication year to include
    #[arg(long, value_name = "YEAR")]
    pub end_year: Option<i32>,

    /// Search keywords (comma-separated)
    ///
    /// Example: --keywords "skill library,tool learning"
    #[arg(short, long, value_name = "WORDS", value_delimiter = ',')]
    pub keywords: Option<Vec<String>>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The research overrides of the chosen command, if it takes any.
    pub fn pipeline_args(&self) -> Option<&PipelineArgs> {
        match self.command {
            Command::Run(ref args) | Command::Schedule(ref args) => Some(args),
            Command::InitConfig => None,
        }
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        let Some(args) = self.pipeline_args() else {
            return Ok(());
        };

        if let Some(ref domain) = args.domain {
            if domain.trim().is_empty() {
                return Err("Domain must not be empty".to_string());
            }
        }

        if let (Some(start), Some(end)) = (args.start_year, args.end_year) {
            if start > end {
                return Err(format!(
                    "Start year {} is after end year {}",
                    start, end
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            config: None,
            verbose: false,
            quiet: false,
            command,
        }
    }

    #[test]
    fn test_parse_run_overrides() {
        let args = Args::try_parse_from([
            "litscout",
            "-v",
            "run",
            "--domain",
            "self-evolving agents",
            "--start-year",
            "2023",
            "--keywords",
            "skill library,tool learning",
        ])
        .unwrap();

        assert!(args.verbose);
        let overrides = args.pipeline_args().unwrap();
        assert_eq!(overrides.domain.as_deref(), Some("self-evolving agents"));
        assert_eq!(overrides.start_year, Some(2023));
        assert!(overrides.end_year.is_none());
        assert_eq!(
            overrides.keywords.as_deref(),
            Some(&["skill library".to_string(), "tool learning".to_string()][..])
        );
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let args =
            Args::try_parse_from(["litscout", "schedule", "--config", "research.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("research.toml")));
        assert!(matches!(args.command, Command::Schedule(_)));
    }

    #[test]
    fn test_parse_init_config() {
        let args = Args::try_parse_from(["litscout", "init-config"]).unwrap();
        assert!(matches!(args.command, Command::InitConfig));
        assert!(args.pipeline_args().is_none());
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Args::try_parse_from(["litscout"]).is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::InitConfig);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_year_range() {
        let args = make_args(Command::Run(PipelineArgs {
            start_year: Some(2025),
            end_year: Some(2024),
            ..PipelineArgs::default()
        }));
        assert!(args.validate().is_err());

        let args = make_args(Command::Run(PipelineArgs {
            domain: Some("  ".to_string()),
            ..PipelineArgs::default()
        }));
        assert!(args.validate().is_err());

        assert!(make_args(Command::Run(PipelineArgs::default()))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::InitConfig);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
