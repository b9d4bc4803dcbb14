use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Build, Rocket, State};
use serde::Serialize;

use common::ServerConfig;

use crate::pipeline::RunReport;
use crate::scheduler::{Scheduler, SchedulerStatus};

/// Application state stored inside Rocket managed state.
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub scheduler: Scheduler,
}

/// Response structure for `/status`.
#[derive(Serialize)]
struct StatusResponse {
    service: &'static str,
    version: &'static str,
    uptime_seconds: i64,
    scheduler: SchedulerStatus,
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

#[get("/status")]
async fn status(state: &State<AppState>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();

    Json(StatusResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
        scheduler: state.scheduler.status().await,
    })
}

/// Run the pipeline now. 409 when a run is already in progress.
///
/// The run executes on its own task so a dropped request or a server shutdown
/// does not cut it short.
#[post("/run")]
async fn trigger_run(state: &State<AppState>) -> Result<Json<RunReport>, Status> {
    let scheduler = state.scheduler.clone();
    match tokio::spawn(async move { scheduler.trigger().await }).await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => {
            tracing::info!("manual run rejected, scheduler busy");
            Err(Status::Conflict)
        }
        Err(join_err) => {
            tracing::error!(%join_err, "manual run task failed");
            Err(Status::InternalServerError)
        }
    }
}

/// Assemble the status server without launching it.
pub fn build_rocket(scheduler: Scheduler, config: &ServerConfig) -> Rocket<Build> {
    let state = AppState {
        started_at: Utc::now(),
        scheduler,
    };

    let fig = rocket::Config::figment()
        .merge(("address", config.address().to_string()))
        .merge(("port", config.port()))
        .merge(("log_level", "critical"));

    rocket::custom(fig)
        .manage(state)
        .mount("/", routes![health, status, trigger_run])
}

/// Serve until Rocket shuts down (Ctrl-C or SIGTERM).
pub async fn launch_rocket(scheduler: Scheduler, config: &ServerConfig) -> Result<()> {
    tracing::info!(
        "Starting Rocket HTTP server on {}:{}",
        config.address(),
        config.port()
    );
    build_rocket(scheduler, config)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
