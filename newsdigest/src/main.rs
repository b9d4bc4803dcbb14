/*
newsdigest - single-binary main.rs
Runs the news pipeline once, on a schedule, or on a schedule behind the HTTP status server.
*/

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{init_db_pool, run_migrations, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use newsdigest::ingestion::{HttpNewsSource, NewsSource};
use newsdigest::llm::remote::RemoteLlmProvider;
use newsdigest::llm::{LlmProvider, LlmRequest};
use newsdigest::pipeline::Pipeline;
use newsdigest::processing::LlmAnalyzer;
use newsdigest::scheduler::Scheduler;
use newsdigest::server::launch_rocket;
use newsdigest::storage::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "newsdigest", version, about = "Fetch news, keep what matters, store a digest")]
struct Args {
    /// Path to config.toml (merged over config.default.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check database, news source and LLM connectivity
    Check,
    /// Run the pipeline once and print the report as JSON
    RunOnce,
    /// Run the scheduler in the foreground until Ctrl-C
    Start {
        /// Run once immediately instead of waiting for the first interval
        #[arg(long)]
        now: bool,
    },
    /// Run the scheduler in the background and serve the HTTP status API
    Serve {
        #[arg(long)]
        now: bool,
    },
    /// Print the effective configuration
    Info,
    /// Print the most recently stored records
    Latest {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

/// Everything a run needs, built once at startup.
struct App {
    config: Config,
    store: SqliteStore,
    source: Arc<HttpNewsSource>,
    provider: Arc<dyn LlmProvider>,
    pipeline: Arc<Pipeline>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = load_config(args.config.as_ref()).await?;
    config.apply_env_overrides();
    if let Some(level) = &args.log_level {
        config.logging.level = Some(level.clone());
    }

    let _log_guard = newsdigest::logging::init(&config.logging)?;

    if let Command::Info = args.command {
        print_info(&config)?;
        return Ok(());
    }

    if let Err(e) = config.validate() {
        error!(%e, "invalid configuration");
        return Err(e.into());
    }

    let app = build_app(config).await?;

    match args.command {
        Command::Check => check(&app).await,
        Command::RunOnce => run_once(&app).await,
        Command::Start { now } => start(&app, now).await,
        Command::Serve { now } => serve(&app, now).await,
        Command::Latest { limit } => latest(&app, limit).await,
        Command::Info => Ok(()),
    }
}

async fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = match explicit {
        Some(p) => {
            if !p.exists() {
                bail!("Config file not found: {}", p.display());
            }
            Some(p.clone())
        }
        None => {
            let p = PathBuf::from("config.toml");
            p.exists().then_some(p)
        }
    };

    Config::load_with_defaults(
        default_path.exists().then_some(default_path.as_path()),
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")
}

async fn build_app(config: Config) -> Result<App> {
    let db_path = match tokio::fs::canonicalize(&config.database.path).await {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => config.database.path.clone(),
    };
    info!(db_path = %db_path, "resolved DB path");

    let pool = init_db_pool(&db_path).await?;
    run_migrations(&pool).await?;
    let store = SqliteStore::new(pool);

    let source = Arc::new(HttpNewsSource::from_config(&config.source)?);

    let api_key = config.api_key()?;
    let provider: Arc<dyn LlmProvider> = Arc::new(RemoteLlmProvider::from_config(&config.llm, api_key));
    info!("LLM provider initialized: {} at {}", provider.model(), config.llm.api_url());

    let analyzer = Arc::new(LlmAnalyzer::from_config(provider.clone(), &config.llm));
    let pipeline = Arc::new(Pipeline::new(
        source.clone(),
        analyzer,
        Arc::new(store.clone()),
    ));

    Ok(App {
        config,
        store,
        source,
        provider,
        pipeline,
    })
}

async fn check(app: &App) -> Result<()> {
    let mut failed = 0;

    match app.store.ping().await {
        Ok(()) => println!("database   ok   {}", app.config.database.path),
        Err(e) => {
            failed += 1;
            println!("database   FAIL {}", e);
        }
    }

    match app.source.fetch().await {
        Ok(articles) => println!("source     ok   {} articles from {}", articles.len(), app.source.name()),
        Err(e) => {
            failed += 1;
            println!("source     FAIL {}", e);
        }
    }

    let mut ping = LlmRequest::new("Reply with the single word OK.");
    ping.max_tokens = Some(5);
    match app.provider.generate(ping).await {
        Ok(resp) => println!("llm        ok   {} replied {:?}", resp.model, resp.content.trim()),
        Err(e) => {
            failed += 1;
            println!("llm        FAIL {:#}", e);
        }
    }

    if failed > 0 {
        bail!("{} of 3 connectivity checks failed", failed);
    }
    Ok(())
}

async fn run_once(app: &App) -> Result<()> {
    let report = app.pipeline.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_success() {
        bail!(
            "run aborted: {}",
            report.fetch_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn scheduler_for(app: &App) -> Scheduler {
    Scheduler::new(app.pipeline.clone(), app.config.scheduler.interval_hours())
}

async fn start(app: &App, now: bool) -> Result<()> {
    let scheduler = scheduler_for(app);
    let shutdown = Arc::new(Notify::new());
    spawn_ctrl_c(shutdown.clone());

    scheduler
        .run_forever(now || app.config.scheduler.run_on_start(), shutdown)
        .await;

    info!("Shutdown complete");
    Ok(())
}

async fn serve(app: &App, now: bool) -> Result<()> {
    let scheduler = scheduler_for(app);
    let shutdown = Arc::new(Notify::new());

    info!("Spawning background scheduler task");
    let worker = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        let run_immediately = now || app.config.scheduler.run_on_start();
        async move { scheduler.run_forever(run_immediately, shutdown).await }
    });

    // Rocket handles Ctrl-C itself and returns once it has shut down
    if let Err(e) = launch_rocket(scheduler.clone(), &app.config.server).await {
        error!(%e, "Rocket server failed");
    }

    info!("HTTP server stopped; notifying scheduler to shutdown");
    shutdown.notify_one();
    if let Err(join_err) = worker.await {
        error!(%join_err, "scheduler task panicked");
    }

    // A manual run started through `POST /run` may still be in flight
    if scheduler.is_busy() {
        info!("waiting for the run in progress to finish");
    }
    scheduler.wait_idle().await;

    info!("Shutdown complete");
    Ok(())
}

async fn latest(app: &App, limit: u32) -> Result<()> {
    let records = app.store.latest(limit).await?;
    if records.is_empty() {
        println!("No records stored yet.");
    }
    for record in records {
        println!(
            "#{} [{} / {}] {} {}",
            record.id,
            record.kind.as_str(),
            record.importance,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.title
        );
        if !record.summary.is_empty() {
            println!("    {}", record.summary);
        }
    }
    Ok(())
}

fn print_info(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    let key_state = match config.api_key() {
        Ok(_) => "set (redacted)",
        Err(_) => "NOT SET",
    };
    println!("LLM API key ({}): {}", config.llm.api_key_env(), key_state);
    Ok(())
}

fn spawn_ctrl_c(shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, stopping after the current run");
                // Stored permit: observed even if a run is in progress right now
                shutdown.notify_one();
            }
            Err(e) => warn!(%e, "failed to listen for ctrl-c"),
        }
    });
}
