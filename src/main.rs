use anyhow::{Context, Result};
use audit_harvester::config::{HarvestConfig, MAX_CONCURRENCY};
use audit_harvester::export;
use audit_harvester::harvest::{
    analyze, render_analysis, Enrichment, HarvestInputs, HarvestPipeline, MergePolicy,
    PipelineError, TreeSource,
};
use audit_harvester::registry::NpmRegistry;
use audit_harvester::EnrichmentExecutor;
use clap::{Parser, ValueEnum};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "audit-harvester")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find which dependencies pull in the packages flagged by npm audit")]
struct Args {
    /// `npm audit --json` report
    #[arg(short, long, default_value = "npm-audit.json")]
    audit: PathBuf,

    /// `npm ls --all --json` output; `npm ls` is run in --project-dir when omitted
    #[arg(short, long)]
    tree: Option<PathBuf>,

    /// Project directory for `npm ls` and `.auditharvesterrc`
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Write the rows as CSV to this file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Look up the latest published version of each vulnerable package
    #[arg(long)]
    latest: bool,

    /// Output format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Include the per-package analysis
    #[arg(long)]
    analysis: bool,

    /// Which detail wins when a report lists a package twice
    /// (first-seen, highest-severity)
    #[arg(long)]
    merge_policy: Option<MergePolicy>,

    /// Registry used for --latest
    #[arg(long)]
    registry: Option<String>,

    /// Maximum concurrent registry lookups
    #[arg(long)]
    concurrency: Option<usize>,

    /// Config file (JSON); defaults to .auditharvesterrc in --project-dir
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<HarvestConfig> {
    let config = HarvestConfig::load(&args.project_dir, args.config.as_deref())
        .context("Failed to load configuration")?;
    Ok(apply_flags(config, args))
}

/// Flags given on the command line win over every other source.
fn apply_flags(mut config: HarvestConfig, args: &Args) -> HarvestConfig {
    if let Some(policy) = args.merge_policy {
        config.merge_policy = policy;
    }
    if let Some(url) = &args.registry {
        config.registry_url = url.clone();
    }
    if let Some(n) = args.concurrency {
        config.concurrency = n.clamp(1, MAX_CONCURRENCY);
    }
    if args.latest {
        config.fetch_latest = true;
    }
    config
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;

    let mut pipeline = HarvestPipeline::new().with_merge_policy(config.merge_policy);
    if config.fetch_latest {
        let registry =
            NpmRegistry::new(&config.registry_url).context("Failed to build registry client")?;
        let executor =
            EnrichmentExecutor::new(config.concurrency).with_timeout(config.lookup_timeout());
        pipeline = pipeline.with_enrichment(Enrichment {
            executor: Arc::new(executor),
            source: Arc::new(registry),
        });
    }

    let tree = match &args.tree {
        Some(path) => TreeSource::File(path.clone()),
        None => TreeSource::NpmLs {
            project_dir: args.project_dir.clone(),
        },
    };
    let inputs = HarvestInputs {
        report: args.audit.clone(),
        tree,
    };

    let result = pipeline.execute(&inputs).await?;
    let resolution = &result.resolution;

    if let Some(path) = &args.csv {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        export::write_csv(BufWriter::new(file), &resolution.rows, result.enriched)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = resolution.rows.len(), "Saved CSV");
    }

    let analyses = args.analysis.then(|| analyze(&resolution.rows));

    match args.format {
        OutputFormat::Json => {
            println!("{}", export::to_json(resolution, analyses.as_deref())?);
        }
        OutputFormat::Text => {
            if resolution.index.is_empty() {
                println!("No vulnerable packages found in audit JSON.");
            } else if resolution.rows.is_empty() {
                println!("No vulnerable packages found in the dependency tree.");
            } else {
                let names: Vec<&str> = resolution.index.names().collect();
                println!("Vulnerable packages found: {}", names.join(", "));
                println!();
                print!("{}", export::render_table(&resolution.rows, result.enriched));
                println!();
                println!("{}", export::upgrade_summary(&resolution.upgrades));
            }

            if let Some(analyses) = &analyses {
                println!();
                println!("{}", render_analysis(analyses));
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let missing_report = e
                .downcast_ref::<PipelineError>()
                .is_some_and(PipelineError::is_missing_report);
            if missing_report {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
