//! # ScanIQ Research CLI
//!
//! Runs an evidence-driven due diligence loop against a company and prints
//! the graded, citation-backed report.
//!
//! ## Quick Start
//! ```bash
//! TAVILY_API_KEY=tvly-... scaniq-research "Acme" --domain acme.io \
//!     --criterion "scalability:40:technical" --criterion "growth:30:market"
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::ollama;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scaniq_research::research::synthesis::Recommendation;
use scaniq_research::research::ResearchPrompts;
use scaniq_research::{
    Criterion, FileStore, InvestmentThesis, ResearchController, ResearchGoal, RigOracle,
    RunConfig, RunOutcome, RunStatus, TavilyGatherer,
};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "scaniq-research",
    version,
    about = "Evidence-driven technical due diligence research",
    long_about = r#"
ScanIQ Research - iterative, evidence-driven due diligence.

The goal is decomposed into prioritized questions, evidence is gathered and
scored in rounds until critical coverage and confidence are sufficient (or
the iteration budget runs out), then a graded report with numbered
citations is compiled.

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Set TAVILY_API_KEY

EXAMPLES:
  # Default criteria
  scaniq-research "Acme" --domain acme.io

  # Weighted criteria (name:weight:category) and a thesis
  scaniq-research "Acme" -c "api quality:40:technical" -c "retention:30:business" \
      --thesis buy-and-build

  # Resume an interrupted run
  scaniq-research --resume 2f1c...
"#
)]
struct Args {
    /// Company or subject to research
    #[arg(value_name = "SUBJECT", required_unless_present = "resume")]
    subject: Option<String>,

    /// Domain context, usually the company's website
    #[arg(short = 'd', long = "domain", default_value = "")]
    domain: String,

    /// Evaluation criterion as name:weight:category (repeatable)
    #[arg(short = 'c', long = "criterion", value_name = "NAME:WEIGHT:CATEGORY")]
    criteria: Vec<Criterion>,

    /// Investment thesis
    #[arg(short = 't', long = "thesis", default_value = "general")]
    thesis: InvestmentThesis,

    /// Maximum research iterations
    #[arg(short = 'i', long = "max-iterations")]
    max_iterations: Option<usize>,

    /// Resume the run with this id instead of starting a new one
    #[arg(short = 'r', long = "resume", value_name = "RUN_ID")]
    resume: Option<String>,

    /// Ollama model to use (overrides OLLAMA_MODEL)
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Directory for run state (overrides SCANIQ_STORE_DIR)
    #[arg(long = "store-dir", env = "SCANIQ_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Store snapshots uncompressed
    #[arg(long = "no-compress", default_value = "false")]
    no_compress: bool,

    /// Print the full report as JSON
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut config = Config::from_env()?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(dir) = &args.store_dir {
        config.store_dir = dir.clone();
    }
    config.validate()?;

    info!(
        model = %config.model,
        host = %config.ollama_host,
        store = %config.store_dir.display(),
        "Configuration loaded"
    );

    let controller = build_controller(&config, !args.no_compress)?;

    let cancellation = controller.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next phase boundary");
            cancellation.cancel();
        }
    });

    let outcome = match &args.resume {
        Some(run_id) => controller
            .resume(run_id)
            .await
            .with_context(|| format!("failed to resume run {}", run_id))?,
        None => {
            let goal = build_goal(&args)?;
            controller.start(goal).await.context("research run failed")?
        }
    };

    print_outcome(&outcome, args.json)?;

    if outcome.status == RunStatus::Failed {
        anyhow::bail!("run {} failed", outcome.run_id);
    }
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

fn build_controller(config: &Config, compress: bool) -> Result<ResearchController> {
    // Rig's Ollama client reads its base URL from the environment
    std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
    let client = ollama::Client::from_env();
    let agent = client
        .agent(&config.model)
        .preamble(&ResearchPrompts::preamble())
        .temperature(f64::from(config.temperature))
        .build();
    let oracle = Arc::new(RigOracle::new(agent).with_model_name(&config.model));

    let api_key = config
        .tavily_api_key
        .clone()
        .context("TAVILY_API_KEY must be set")?;
    let gatherer = Arc::new(TavilyGatherer::new(api_key));
    let store = Arc::new(FileStore::new(&config.store_dir, compress));

    Ok(ResearchController::new(oracle, gatherer, store))
}

fn build_goal(args: &Args) -> Result<ResearchGoal> {
    let subject = args
        .subject
        .clone()
        .context("a subject is required unless --resume is given")?;

    let mut run_config = RunConfig::default();
    if let Some(max) = args.max_iterations {
        run_config = run_config.with_max_iterations(max);
    }

    let goal = args
        .criteria
        .iter()
        .cloned()
        .fold(
            ResearchGoal::new(subject, args.domain.clone()).with_thesis(args.thesis),
            ResearchGoal::with_criterion,
        )
        .with_config(run_config);
    goal.validate()?;
    Ok(goal)
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> Result<()> {
    println!("\n{}", "=".repeat(60));
    println!("RUN {} ({:?})", outcome.run_id, outcome.status);
    println!("{}", "=".repeat(60));

    if let Some(failure) = &outcome.state.failure {
        println!("{} {} during {}: {}", "FAILED".red().bold(), failure.kind, failure.phase.as_str(), failure.message);
    }

    let Some(report) = &outcome.report else {
        println!(
            "No report. {} questions, {} findings after {} iterations.",
            outcome.state.questions.len(),
            outcome.state.findings.len(),
            outcome.state.iteration_count
        );
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let recommendation = match report.recommendation {
        Recommendation::Proceed => report.recommendation.to_string().green().bold(),
        Recommendation::ProceedWithConditions => report.recommendation.to_string().yellow().bold(),
        Recommendation::Decline => report.recommendation.to_string().red().bold(),
    };
    println!(
        "{} {:.1}/100  grade {}  confidence {:.0}%  critical coverage {:.0}%",
        "Score:".bold(),
        report.overall_score,
        report.grade,
        report.overall_confidence * 100.0,
        report.critical_coverage * 100.0
    );
    println!("{} {}", "Recommendation:".bold(), recommendation);
    println!("{} {} ({:?})\n", "Iterations:".bold(), report.iterations, report.decision);

    println!("{}", report.executive_summary);

    if !report.citations.is_empty() {
        println!("\n{}", "Sources".bold());
        for citation in &report.citations {
            println!("[{}] {} - {}", citation.number, citation.claim, citation.source.dimmed());
        }
    }
    println!("\n{}", "=".repeat(60));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaniq_research::Category;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["test", "Acme"]);
        assert_eq!(args.subject.as_deref(), Some("Acme"));
        assert_eq!(args.thesis, InvestmentThesis::General);
        assert!(args.criteria.is_empty());
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_with_criteria_and_thesis() {
        let args = Args::parse_from([
            "test",
            "--domain",
            "acme.io",
            "-c",
            "api quality:40:technical",
            "-c",
            "growth:20:market",
            "--thesis",
            "buy-and-build",
            "--max-iterations",
            "2",
            "Acme",
        ]);

        assert_eq!(args.criteria.len(), 2);
        assert_eq!(args.criteria[1].category, Category::Market);
        assert_eq!(args.thesis, InvestmentThesis::BuyAndBuild);

        let goal = build_goal(&args).unwrap();
        assert_eq!(goal.config.max_iterations, 2);
        assert_eq!(goal.criteria.len(), 2);
        assert_eq!(goal.domain, "acme.io");
    }

    #[test]
    fn test_resume_does_not_need_subject() {
        let args = Args::parse_from(["test", "--resume", "run-1"]);
        assert_eq!(args.resume.as_deref(), Some("run-1"));
        assert!(build_goal(&args).is_err());
    }

    #[test]
    fn test_subject_required_without_resume() {
        assert!(Args::try_parse_from(["test"]).is_err());
    }
}
