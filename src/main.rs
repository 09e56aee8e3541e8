use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use got_reasoning::{
    config::{Config, GraphDefaults, LogFormat},
    error::{AppError, GraphResult},
    langbase::LangbaseClient,
    operations::{Aggregate, Generate, KeepBestN, Score},
    Controller, GraphOfOperations, JsonStrategy, Payload, Strategies,
};

/// Run a Generate → Score → KeepBestN graph against a Langbase pipe.
#[derive(Parser, Debug)]
#[command(name = "got-reasoning", version, about)]
struct Cli {
    /// Task description given to every prompt
    #[arg(long)]
    task: String,

    /// JSON file holding the initial payload (a flat object)
    #[arg(long, conflicts_with = "input")]
    payload: Option<PathBuf>,

    /// Initial payload as a single `input` field
    #[arg(long)]
    input: Option<String>,

    /// Field the model is asked to fill
    #[arg(long, default_value = "answer")]
    output_field: String,

    /// Branches per thought (defaults to GOT_BRANCHES)
    #[arg(long)]
    branches: Option<usize>,

    /// Thoughts kept after scoring (defaults to GOT_KEEP_BEST)
    #[arg(long)]
    keep: Option<usize>,

    /// Score completions averaged per thought (defaults to GOT_SCORE_SAMPLES)
    #[arg(long)]
    samples: Option<usize>,

    /// How candidates are scored
    #[arg(long, value_enum, default_value_t = ScoreModeArg::Independent)]
    score_mode: ScoreModeArg,

    /// Merge the kept thoughts and score the result
    #[arg(long)]
    aggregate: bool,

    /// Write a JSON snapshot of the executed graph to this path
    #[arg(long, visible_alias = "output")]
    snapshot: Option<PathBuf>,

    /// Skip creating the Langbase pipe
    #[arg(long)]
    skip_pipe_setup: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScoreModeArg {
    Independent,
    Combined,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "got-reasoning starting...");

    let payload = load_payload(&cli)?;

    let langbase = match LangbaseClient::new(
        &config.langbase,
        config.request.clone(),
        config.pricing.clone(),
    ) {
        Ok(c) => {
            info!(
                base_url = %config.langbase.base_url,
                pipe = %config.langbase.pipe,
                "Langbase client initialized"
            );
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    if !cli.skip_pipe_setup {
        if let Err(e) = langbase.ensure_pipe().await {
            error!(error = %e, "Failed to ensure reasoning pipe exists");
            return Err(e.into());
        }
    }

    let mut graph = build_graph(&cli, &config.graph)?;
    let strategy = JsonStrategy::new(&cli.task).with_output_field(&cli.output_field);
    let controller = Controller::new(Arc::new(langbase), Strategies::uniform(Arc::new(strategy)));

    let outcome = controller.run(&mut graph, payload).await;

    if let Some(path) = &cli.snapshot {
        let json = serde_json::to_string_pretty(&graph.snapshot())?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Snapshot written");
    }

    let results = match outcome {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Run failed");
            return Err(e.into());
        }
    };

    let usage = controller.usage();
    info!(
        calls = usage.calls,
        failed_calls = usage.failed_calls,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        cost = usage.cost,
        "Backend usage"
    );

    if results.is_empty() {
        info!("Run finished without surviving thoughts");
    }
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}

fn load_payload(cli: &Cli) -> Result<Payload, AppError> {
    if let Some(path) = &cli.payload {
        let raw = std::fs::read_to_string(path)?;
        return Payload::from_json_str(&raw).map_err(|e| AppError::Payload {
            message: format!("{}: {}", path.display(), e),
        });
    }

    Ok(match &cli.input {
        Some(input) => Payload::new().with("input", input.as_str()),
        None => Payload::new(),
    })
}

/// Generate(k) → Score → KeepBestN(n) [→ Aggregate → Score]
fn build_graph(cli: &Cli, defaults: &GraphDefaults) -> GraphResult<GraphOfOperations> {
    let score = || match cli.score_mode {
        ScoreModeArg::Independent => {
            Score::independent().with_samples(cli.samples.unwrap_or(defaults.score_samples))
        }
        ScoreModeArg::Combined => Score::combined(),
    };

    let mut graph = GraphOfOperations::new();
    let generate = graph.add_operation(Generate::new(cli.branches.unwrap_or(defaults.branches)));
    let scored = graph.add_successor(generate, score())?;
    let kept = graph.add_successor(
        scored,
        KeepBestN::new(cli.keep.unwrap_or(defaults.keep_best)),
    )?;

    if cli.aggregate {
        let merged = graph.add_successor(kept, Aggregate::new())?;
        graph.add_successor(merged, score())?;
    }

    Ok(graph)
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
