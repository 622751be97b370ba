use std::sync::Arc;

use thiserror::Error;

use crate::api::middleware::MiddlewareErr;
use crate::api::server::AppState;
use crate::db::StoreError;
use crate::util::env::{Env, EnvErr};
use crate::util::identity::{IdentityErr, SupabaseAuth};
use crate::util::telemetry::{self, TelemetryErr};

mod api;
mod constants;
mod db;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Telemetry(#[from] TelemetryErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityErr),

    #[error(transparent)]
    Middleware(#[from] MiddlewareErr),

    #[error("while building http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let env = Env::new()?;
    let telemetry_registry = telemetry::Telemetry::new(&env)?.register();

    tracing::info!(backend = ?env.store_backend, "starting main application");

    let client = util::http_client(&env)?;
    let store = db::connect_store(&env, &client).await?;
    let identity = SupabaseAuth::new(client, env.supabase_url()?, env.supabase_key()?)?;

    let state = Arc::new(AppState {
        store,
        identity: Arc::new(identity),
    });

    let app = api::server::router(state, api::middleware::cors(&env.cors_allow_origins)?);
    let server_handle = api::server::start_server(env.port, app).await?;

    let served = server_handle.await?;
    if let Err(e) = &served {
        tracing::error!(error = ?e, "server exited with an error");
    }

    telemetry_registry.shutdown();
    Ok(served?)
}
