use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_config::{CancelPolicy, EngineConfig, PipelineDef};
use weft_orchestrator::{Executor, expand};
use weft_resolver::{Pipeline, Registry, Resolver, StandardResolver};
use weft_store::{CacheStore, MemoryStore, SqliteStore};

/// Weft - a dataflow pipeline engine with parameter sweeps and result caching
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.weft)
  #[arg(long, global = true, env = "WEFT_DATA_DIR")]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a pipeline and freeze its graph
  Build {
    /// Path to the pipeline file (JSON)
    pipeline_file: PathBuf,
  },

  /// Expand a pipeline and describe the execution plan without running it
  Plan {
    /// Path to the pipeline file (JSON)
    pipeline_file: PathBuf,
  },

  /// Run a pipeline and print the run report
  Run {
    /// Path to the pipeline file (JSON)
    pipeline_file: PathBuf,

    /// Maximum number of concurrently running actions
    #[arg(long, env = "WEFT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Cache database (default: <data-dir>/cache.db)
    #[arg(long, env = "WEFT_CACHE", conflicts_with = "no_cache")]
    cache: Option<PathBuf>,

    /// Keep the cache in memory for this run only
    #[arg(long)]
    no_cache: bool,

    /// Root of per-instance working directories (default: <data-dir>/work)
    #[arg(long, env = "WEFT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Ask running actions to stop on Ctrl-C instead of letting them finish
    #[arg(long)]
    terminate_on_cancel: bool,
  },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".weft"),
  };

  match cli.command {
    Some(Commands::Build { pipeline_file }) => build(pipeline_file),
    Some(Commands::Plan { pipeline_file }) => plan(pipeline_file),
    Some(Commands::Run {
      pipeline_file,
      concurrency,
      cache,
      no_cache,
      work_dir,
      terminate_on_cancel,
    }) => {
      let mut config = EngineConfig {
        work_dir: work_dir.unwrap_or_else(|| data_dir.join("work")),
        cache_path: (!no_cache).then(|| cache.unwrap_or_else(|| data_dir.join("cache.db"))),
        ..EngineConfig::default()
      };
      if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
      }
      if terminate_on_cancel {
        config.cancel_policy = CancelPolicy::Terminate;
      }
      run(pipeline_file, config)
    }
    None => {
      println!("weft - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info,warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

fn build(pipeline_file: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let pipeline = load_pipeline(&pipeline_file).await?;
    let graph = &pipeline.graph;

    eprintln!("Built pipeline: {}", pipeline.name);
    println!(
      "{}",
      serde_json::to_string_pretty(&serde_json::json!({
        "pipeline_id": pipeline.pipeline_id,
        "nodes": graph.nodes().len(),
        "edges": graph.edges().len(),
        "entry_points": graph.entry_points(),
        "contexts": pipeline.parameters.context_count(),
      }))?
    );
    Ok(())
  })
}

fn plan(pipeline_file: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let pipeline = load_pipeline(&pipeline_file).await?;
    let plan = expand(&pipeline.graph, &pipeline.parameters).context("failed to expand pipeline")?;

    println!("{}", serde_json::to_string_pretty(&plan.summary())?);
    Ok(())
  })
}

fn run(pipeline_file: PathBuf, config: EngineConfig) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  let failed = rt.block_on(async { run_async(pipeline_file, config).await })?;
  if failed {
    std::process::exit(1);
  }
  Ok(())
}

async fn run_async(pipeline_file: PathBuf, config: EngineConfig) -> Result<bool> {
  let pipeline = load_pipeline(&pipeline_file).await?;
  let plan = expand(&pipeline.graph, &pipeline.parameters).context("failed to expand pipeline")?;

  let store: Arc<dyn CacheStore> = match &config.cache_path {
    Some(path) => {
      if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
          .await
          .with_context(|| format!("failed to create cache directory: {}", parent.display()))?;
      }
      let store = SqliteStore::open(path)
        .await
        .with_context(|| format!("failed to open cache database: {}", path.display()))?;
      Arc::new(store)
    }
    None => Arc::new(MemoryStore::new()),
  };

  info!(
    pipeline = %pipeline.name,
    instances = plan.len(),
    concurrency = config.concurrency,
    "pipeline_loaded"
  );

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt_received");
      on_interrupt.cancel();
    }
  });

  let concurrency = config.concurrency;
  let executor = Executor::new(store, config);
  let result = executor.run(&plan, concurrency, cancel).await;

  let summary = result.summary();
  eprintln!(
    "Run {} finished: {} done, {} cached, {} failed, {} skipped, {} cancelled",
    result.run_id, summary.done, summary.cached, summary.failed, summary.skipped, summary.cancelled
  );

  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(result.has_failures())
}

async fn load_pipeline(pipeline_file: &Path) -> Result<Pipeline> {
  let content = tokio::fs::read_to_string(pipeline_file)
    .await
    .with_context(|| format!("failed to read pipeline file: {}", pipeline_file.display()))?;

  let mut def: PipelineDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse pipeline file: {}", pipeline_file.display()))?;

  let overrides = read_params_from_stdin()?;
  def.params.extend(overrides);

  StandardResolver::new(Registry::default())
    .resolve(def)
    .await
    .context("failed to build pipeline")
}

/// Parameter overrides piped on stdin, merged over the file's `params`.
fn read_params_from_stdin() -> Result<serde_json::Map<String, serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read params from stdin")?;

  if input.trim().is_empty() {
    return Ok(serde_json::Map::new());
  }

  match serde_json::from_str(&input).context("failed to parse params JSON from stdin")? {
    serde_json::Value::Object(params) => Ok(params),
    _ => bail!("params on stdin must be a JSON object"),
  }
}
