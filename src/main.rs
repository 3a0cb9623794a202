//! kyc-triage CLI - Risk-based identity verification triage.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kyc_triage::{
    BatchRunner, Config, ErrorKind, RecommendationPolicy, RetryPolicy, TriageError, UserContext,
    VerificationOrchestrator,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "kyc-triage")]
#[command(version)]
#[command(about = "Risk-based identity verification triage backed by an LLM risk classifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (omit to configure from environment only)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one applicant context and print the required verification steps
    Verify {
        /// Context text (reads --file or stdin when omitted)
        #[arg(long, conflicts_with = "file")]
        context: Option<String>,

        /// File holding the context ("-" for stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,

        /// Total attempts on transient classifier failures (overrides [retry])
        #[arg(long)]
        attempts: Option<u32>,
    },

    /// Triage every request in a JSONL file
    Batch {
        /// Path to input JSONL file ({"id": ..., "context": ...} per line)
        #[arg(short, long)]
        input: PathBuf,

        /// Path to output JSONL file
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum requests in flight (overrides [batch])
        #[arg(long)]
        concurrency: Option<usize>,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Validate configuration
    Validate,

    /// Show the recommendation policy
    Policy,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# kyc-triage configuration file

[classifier]
# "azure" (deployment in URL, api-key header) or "openai" (model field, bearer token)
flavor = "azure"
# Each of endpoint / deployment / api_key may be set here (with ${VAR} expansion)
# or left out and read from the env var named by *_env.
# endpoint = "https://my-resource.openai.azure.com"
endpoint_env = "OPENAI_ENDPOINT"
# deployment = "gpt-4o-mini"
deployment_env = "OPENAI_DEPLOYMENT"
# api_key = "${OPENAI_KEY}"
api_key_env = "OPENAI_KEY"
api_version = "2024-06-01"
task = "ClassifyRisk"
# Template file, or a prompt directory holding <task>/skprompt.txt
# prompt = "Skills/KYC"
timeout_secs = 30
max_tokens = 8
temperature = 0.0

[retry]
max_attempts = 3
base_backoff_ms = 1000
max_backoff_secs = 30

[batch]
concurrency = 8
"#;
    println!("{example}");
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
        }
        None => Ok(Config::default()),
    }
}

fn read_context(context: Option<String>, file: Option<PathBuf>) -> Result<Vec<u8>> {
    if let Some(text) = context {
        return Ok(text.into_bytes());
    }

    match file {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::read(&path).with_context(|| format!("Failed to read context from {path:?}"))
        }
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read context from stdin")?;
            Ok(buf)
        }
    }
}

/// Print a per-request failure and pick an exit code for it.
fn report_failure(e: &TriageError) -> ExitCode {
    eprintln!("error: {e}");
    if e.is_retryable() {
        eprintln!("hint: the classifier failure is transient; retry later");
    }
    match e.kind() {
        ErrorKind::InvalidInput => ExitCode::from(2),
        ErrorKind::ClassifierUnavailable => ExitCode::from(3),
        ErrorKind::UnrecognizedRiskLabel => ExitCode::from(4),
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Policy => {
            let policy = RecommendationPolicy::canonical();
            for (level, steps) in policy.entries() {
                let steps: Vec<&str> = steps.iter().map(|s| s.as_str()).collect();
                println!("{:<8}{}", level.as_str(), steps.join(", "));
            }
        }

        Commands::Validate => {
            let config = load_config(cli.config.as_deref())?;
            let settings = config
                .resolve_classifier()
                .context("Classifier configuration is incomplete")?;
            VerificationOrchestrator::from_config(&config)
                .context("Failed to build verification pipeline")?;

            info!("Configuration is valid");
            info!("  Endpoint:    {}", settings.endpoint);
            info!("  Deployment:  {}", settings.deployment);
            info!("  Task:        {}", config.classifier.task);
            info!("  Timeout:     {}s", settings.timeout.as_secs());
            info!("  Attempts:    {}", config.retry.max_attempts);
            info!("  Concurrency: {}", config.batch.concurrency);
        }

        Commands::Verify {
            context,
            file,
            json,
            attempts,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let orchestrator = VerificationOrchestrator::from_config(&config)
                .context("Failed to build verification pipeline")?;

            let mut retry_config = config.retry.clone();
            if let Some(n) = attempts {
                retry_config.max_attempts = n;
            }
            let retry = RetryPolicy::from_config(&retry_config);

            let user_context = match UserContext::from_bytes(read_context(context, file)?) {
                Ok(c) => c,
                Err(e) => return Ok(report_failure(&e)),
            };

            let (result, tries) = retry
                .run(|| orchestrator.decide_context(&user_context))
                .await;

            match result {
                Ok(decision) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&decision)?);
                    } else {
                        println!("{decision}");
                    }
                    if tries > 1 {
                        info!(attempts = tries, "Decided after retry");
                    }
                }
                Err(e) => return Ok(report_failure(&e)),
            }
        }

        Commands::Batch {
            input,
            output,
            concurrency,
            quiet,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let orchestrator = VerificationOrchestrator::from_config(&config)
                .context("Failed to build verification pipeline")?;

            let requests = BatchRunner::load_requests(&input)
                .with_context(|| format!("Failed to load requests from {input:?}"))?;

            let runner = BatchRunner::new(
                orchestrator,
                RetryPolicy::from_config(&config.retry),
                concurrency.unwrap_or(config.batch.concurrency),
            )
            .with_progress(!quiet);

            let (outcomes, stats) = runner.run(requests).await;
            BatchRunner::write_outcomes(&output, &outcomes)
                .with_context(|| format!("Failed to write outcomes to {output:?}"))?;

            println!("\n=== Triage Complete ===");
            println!("Requests:    {}", stats.total);
            println!("Decided:     {}", stats.decided);
            for (level, count) in &stats.by_risk {
                println!("  {:<10} {count}", level.as_str());
            }
            println!("Failed:      {}", stats.failed);
            for (kind, count) in &stats.by_error {
                println!("  {kind:<24} {count}");
            }
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {output:?}");
        }
    }

    Ok(ExitCode::SUCCESS)
}
