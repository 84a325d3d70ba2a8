//! # Rosetta CLI
//!
//! Command-line interface for the Rosetta Stone solver.
//!
//! Usage:
//!   rosetta solve [FILE]
//!   rosetta config
//!
//! Examples:
//!   rosetta solve problems/pwiha.txt
//!   cat problem.txt | rosetta solve --provider anthropic --max-iterations 2
//!   rosetta solve --json --events problem.txt > result.json
//!   rosetta config > rosetta.toml

use clap::{Parser, Subcommand};
use rosetta_agent::{
    ChannelSink, ExecutionLog, Pipeline, PipelineOutput, RunContext, RunOptions, WorkflowConfig,
};
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::{AnyProvider, ProviderModel, ProviderType};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit status for a run interrupted with Ctrl-C
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "rosetta")]
#[command(author, version, about = "Rosetta - solve Linguistics Olympiad translation problems")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print the answers
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem read from FILE, or from stdin when absent
    Solve {
        file: Option<PathBuf>,

        /// openai, anthropic, bridge, or local
        #[arg(long)]
        provider: Option<ProviderType>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        max_iterations: Option<u32>,

        /// Leaf verifier calls in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Also test every dataset pair in reverse
        #[arg(long)]
        bidirectional: bool,

        /// Directory for the markdown execution log
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Stream workflow events to stderr as JSON lines
        #[arg(long)]
        events: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<WorkflowConfig> {
    match path {
        Some(path) => WorkflowConfig::load(path),
        None => Ok(WorkflowConfig::default()),
    }
}

fn read_problem(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("cli::read_problem")
                .with_context("path", path.display().to_string())
        }),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| Error::from(e).with_operation("cli::read_problem"))?;
            Ok(text)
        }
    }
}

fn print_output(output: &PipelineOutput, ctx: &RunContext, quiet: bool) {
    if !quiet {
        println!("--- ANSWERS ---\n");
    }
    for answer in &output.answers {
        println!("[{}] {}", answer.question_id, answer.answer);
        if !quiet {
            println!("    confidence: {}", answer.confidence.as_str());
        }
    }
    if quiet {
        return;
    }

    println!("\n--- RULES ({}) ---\n", output.rules.len());
    for (i, rule) in output.rules.iter().enumerate() {
        println!("{}. {} [{}]", i + 1, rule.title, rule.confidence.as_str());
        println!("   {}", rule.description);
    }

    println!(
        "\nOutcome: {} after {} improvement(s), {} vocabulary entries",
        output.outcome.as_str(),
        output.iterations,
        output.vocabulary.len()
    );
    if let Some(feedback) = &output.final_feedback {
        println!("Last verification: {}", feedback.conclusion);
    }
    println!("\n{}", ctx.timings().render_table());
    if let Some(path) = ctx.log().path() {
        println!("Execution log: {}", path.display());
    }
}

#[allow(clippy::too_many_arguments)]
async fn solve(
    mut config: WorkflowConfig,
    file: Option<PathBuf>,
    provider: Option<ProviderType>,
    model: Option<String>,
    max_iterations: Option<u32>,
    concurrency: Option<usize>,
    bidirectional: bool,
    log_dir: Option<PathBuf>,
    events: bool,
    json: bool,
    quiet: bool,
) -> Result<i32> {
    if let Some(kind) = provider {
        config.provider.kind = kind;
    }
    if model.is_some() {
        config.provider.model = model;
    }
    if let Some(concurrency) = concurrency {
        config.workflow.concurrency = concurrency;
    }
    if log_dir.is_some() {
        config.logging.log_dir = log_dir;
    }
    config.validate()?;

    let text = read_problem(file.as_ref())?;

    let mut model = ProviderModel::new(AnyProvider::from_config(config.provider_config()?)?)
        .with_retry(config.retry_policy())
        .with_timeout(config.call_timeout());
    if let Some(temperature) = config.provider.temperature {
        model = model.with_temperature(temperature);
    }

    let mut ctx = RunContext::new();
    if let Some(dir) = &config.logging.log_dir {
        let log = ExecutionLog::create(dir, &ctx.run_id().to_string())?;
        ctx = ctx.with_log(log);
    }
    let printer = if events {
        let (sink, mut rx) = ChannelSink::new();
        ctx = ctx.with_sink(Arc::new(sink));
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
            }
        }))
    } else {
        None
    };

    let token = ctx.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });

    let options = RunOptions {
        bidirectional: bidirectional.then_some(true),
        max_iterations,
    };
    let pipeline = Pipeline::new(model, config);
    let result = pipeline.run(&ctx, &text, options).await;

    let code = match &result {
        Ok(output) if json => {
            let rendered = serde_json::to_string_pretty(output).map_err(|e| {
                Error::new(ErrorKind::SerializationFailed, "failed to render output").set_source(e)
            })?;
            println!("{}", rendered);
            0
        }
        Ok(output) => {
            print_output(output, &ctx, quiet);
            0
        }
        Err(failure) if failure.is_cancelled() => {
            eprintln!("{}", failure);
            EXIT_CANCELLED
        }
        Err(failure) => {
            eprintln!("Error: {}", failure);
            1
        }
    };

    // Closing the context closes the event channel
    drop(ctx);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    Ok(code)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Config => match config.to_toml() {
            Ok(text) => {
                print!("{}", text);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Solve {
            file,
            provider,
            model,
            max_iterations,
            concurrency,
            bidirectional,
            log_dir,
            events,
            json,
        } => solve(
            config,
            file,
            provider,
            model,
            max_iterations,
            concurrency,
            bidirectional,
            log_dir,
            events,
            json,
            cli.quiet,
        )
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            1
        }),
    };
    std::process::exit(code);
}
