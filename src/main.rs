//! litscout - automated literature review with local LLMs
//!
//! A CLI tool that collects papers for a research domain, downloads and
//! reads them, analyzes each with an Ollama model, stores the results in
//! SQLite and writes a literature review report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Configuration error or failed pipeline run

mod cli;
mod config;
mod error;
mod llm;
mod models;
mod optimizer;
mod pipeline;
mod prompts;
mod report;
mod retrieval;
mod scheduler;
mod sources;
mod store;

use anyhow::{Context, Result};
use cli::{Args, Command};
use config::{Config, DEFAULT_CONFIG_FILE};
use futures::future::BoxFuture;
use llm::{LlmAnalyzer, OllamaClient, OllamaConfig};
use models::PipelineRun;
use optimizer::{OptimizerSettings, PromptOptimizer, RandomSampler};
use pipeline::collaborators::{Generator, Source};
use pipeline::{Collaborators, Orchestrator};
use report::{MarkdownReporter, ReportSettings};
use retrieval::{HttpDownloader, PdftotextExtractor, RetryPolicy};
use scheduler::{Job, Scheduler, SystemClock};
use sources::{ArxivQuery, ArxivSource};
use std::path::Path;
use std::sync::Arc;
use store::SqliteStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig = args.command {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("litscout v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match args.command {
        Command::Run(_) => run_once(&args).await,
        Command::Schedule(_) => run_scheduled(&args).await,
        Command::InitConfig => Ok(0),
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("litscout failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .litscout.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Set research.domain, then adjust keywords, models and schedule.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        Config::load(config_path)?
    } else {
        match Config::load_default()? {
            Some(config) => {
                info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
                config
            }
            None => {
                debug!("No config file found, using defaults");
                Config::default()
            }
        }
    };

    if let Some(overrides) = args.pipeline_args() {
        config.merge_with_args(overrides);
    }
    config.validate()?;

    Ok(config)
}

fn ollama_client(config: &Config, model_name: &str) -> Result<Arc<OllamaClient>> {
    let client = OllamaClient::new(OllamaConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: model_name.to_string(),
        temperature: config.model.temperature,
        timeout_seconds: config.model.timeout_seconds,
    })?;
    Ok(Arc::new(client))
}

/// Wire the collaborators described by `config` into an orchestrator.
fn build_orchestrator(config: &Config, quiet: bool) -> Result<Orchestrator> {
    let research = &config.research;
    let end_year = research.effective_end_year();

    let mut sources: Vec<Arc<dyn Source>> = Vec::new();
    if config.sources.arxiv.enabled {
        let arxiv = ArxivSource::new(ArxivQuery {
            domain: research.domain.clone(),
            keywords: research.keywords.clone(),
            categories: config.sources.arxiv.categories.clone(),
            start_year: research.start_year,
            end_year,
            max_results: config.sources.arxiv.max_results,
        })?;
        sources.push(Arc::new(arxiv));
    }

    let analysis_model = ollama_client(config, &config.model.name)?;
    let proposer = ollama_client(config, config.proposer_model())?;
    let evaluator = ollama_client(config, config.evaluator_model())?;

    println!("🤖 Models (Ollama at {}):", config.model.ollama_url);
    println!("   Analysis:  {}", analysis_model.model_name());
    if config.optimizer.enabled && config.optimizer.rounds > 0 {
        println!("   Proposer:  {}", proposer.model_name());
        println!("   Evaluator: {}", evaluator.model_name());
    }

    let store = Arc::new(
        SqliteStore::open(&config.storage.db_path).with_context(|| {
            format!(
                "Failed to open database {}",
                config.storage.db_path.display()
            )
        })?,
    );

    let downloader = HttpDownloader::new(
        &config.storage.pdf_dir,
        config.storage.download_timeout_seconds,
    )?
    .with_progress(!quiet)
    .with_retry(RetryPolicy {
        attempts: config.storage.download_retries,
        ..RetryPolicy::default()
    })
    .with_unpaywall(config.storage.unpaywall_email.clone());

    let reporter = MarkdownReporter::new(
        Arc::clone(&store),
        ReportSettings {
            output_dir: config.report.output_dir.clone(),
            format: config.report.format,
            generate_charts: config.report.generate_charts,
            domain: research.domain.clone(),
            start_year: research.start_year,
            end_year,
            model_used: config.model.name.clone(),
        },
    );

    let analysis_generator: Arc<dyn Generator> = analysis_model;
    let collaborators = Collaborators {
        sources,
        downloader: Arc::new(downloader),
        extractor: Arc::new(PdftotextExtractor::new()),
        analyzer: Arc::new(LlmAnalyzer::new(analysis_generator)),
        store,
        reporter: Arc::new(reporter),
    };

    let optimizer = PromptOptimizer::new(
        proposer,
        evaluator,
        OptimizerSettings {
            enabled: config.optimizer.enabled,
            rounds: config.optimizer.rounds,
            samples_per_round: config.optimizer.samples_per_round,
            domain: research.domain.clone(),
            keywords: research.keywords.clone(),
        },
        Box::new(RandomSampler::new()),
    );

    let initial_prompt =
        prompts::load_analysis_template(config.optimizer.prompt_template.as_deref())?;

    Ok(Orchestrator::new(collaborators, optimizer, initial_prompt))
}

fn print_research(config: &Config) {
    let research = &config.research;
    println!("🔎 Research domain: {}", research.domain);
    println!(
        "   Years: {}-{}",
        research.start_year,
        research.effective_end_year()
    );
    if !research.keywords.is_empty() {
        println!("   Keywords: {}", research.keywords.join(", "));
    }
}

/// Print the outcome of one run.
fn print_summary(run: &PipelineRun) {
    println!("\n📊 Run #{} Summary:", run.run_id);
    for count in &run.stages {
        println!(
            "   {:<10} {:>4} in → {:>4} out",
            count.stage.to_string(),
            count.input,
            count.output
        );
    }
    println!("   Persisted: {}", run.persisted);
    println!("   Duration: {:.1}s", run.duration_seconds());

    if let Some(ref failure) = run.failure {
        eprintln!("\n❌ Run failed: {}", failure);
    } else if let Some(ref path) = run.report_path {
        println!("\n✅ Run complete! Report saved to: {}", path.display());
    } else {
        println!("\n✅ Run complete. No report was written.");
    }
}

/// `litscout run`: execute the pipeline once.
async fn run_once(args: &Args) -> Result<i32> {
    let config = load_config(args)?;
    print_research(&config);

    let orchestrator = build_orchestrator(&config, args.quiet)?;

    println!("\n🔬 Running pipeline...");
    let run = orchestrator.run().await;

    if let Some(prompt) = orchestrator.analysis_prompt() {
        debug!("Analysis prompt used ({} chars)", prompt.chars().count());
    }
    print_summary(&run);

    Ok(if run.success { 0 } else { 1 })
}

/// `litscout schedule`: run on the configured schedule until Ctrl-C.
async fn run_scheduled(args: &Args) -> Result<i32> {
    let config = load_config(args)?;
    print_research(&config);

    if config.schedule.is_empty() {
        anyhow::bail!("No [[schedule]] entries configured");
    }

    let orchestrator = Arc::new(build_orchestrator(&config, args.quiet)?);

    let job_orchestrator = Arc::clone(&orchestrator);
    let job: Job = Arc::new(move || -> BoxFuture<'static, anyhow::Result<()>> {
        let orchestrator = Arc::clone(&job_orchestrator);
        Box::pin(async move {
            match orchestrator.try_run().await {
                Some(run) => {
                    print_summary(&run);
                    if run.success {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!(run
                            .failure
                            .unwrap_or_else(|| "pipeline run failed".to_string())))
                    }
                }
                None => {
                    warn!("A run is already in progress, skipping");
                    Ok(())
                }
            }
        })
    });

    let scheduler = Scheduler::new(job, Arc::new(SystemClock));
    for entry in &config.schedule {
        let added = match entry.weekday {
            Some(ref weekday) => scheduler.add_weekly(weekday, entry.hour, entry.minute),
            None => scheduler.add_daily(entry.hour, entry.minute),
        };
        added.context("Invalid [[schedule]] entry")?;
    }

    println!("\n⏰ Scheduled runs:");
    for entry in scheduler.entries() {
        println!("   - {}", entry.timing);
    }

    scheduler.start();
    println!("\n   Waiting for the next run. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("\n🛑 Stopping scheduler...");
    scheduler.stop().await;
    scheduler.wait_for_run().await;

    println!("✅ Scheduler stopped.");
    Ok(0)
}
