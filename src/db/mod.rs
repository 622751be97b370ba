use std::sync::Arc;

use http::header::InvalidHeaderValue;
use thiserror::Error;
use tracing::instrument;

use crate::db::store::Store;
use crate::util::env::{Env, EnvErr, StoreBackend};

pub mod memory;
pub mod models;
pub mod pg;
pub mod postgrest;
pub mod repositories;
pub mod store;

pub mod prelude {
    pub use crate::db::StoreError;
    pub use crate::db::store::{Order, Query, Row, Store};

    pub use crate::db::models::leaderboard::LeaderboardEntry;
    pub use crate::db::models::quiz::{QuestionView, QuizAttempt, QuizQuestion, UserQuizSummary};
    pub use crate::db::models::user::{User, UserAuth, UserId};

    pub use crate::db::repositories::Repository;
    pub use crate::db::repositories::leaderboard::LeaderboardRepository;
    pub use crate::db::repositories::quiz::{QuestionRepository, QuizRepository};
    pub use crate::db::repositories::user::{UserAuthRepository, UserRepository};
}

/// Builds the store client selected by `STORE_BACKEND`.
#[instrument(skip(env, client), fields(backend = ?env.store_backend))]
pub async fn connect_store(env: &Env, client: &reqwest::Client) -> StoreResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match env.store_backend {
        StoreBackend::Postgrest => Arc::new(postgrest::PostgrestStore::new(
            client.clone(),
            env.supabase_url()?,
            env.supabase_key()?,
        )?),
        StoreBackend::Postgres => Arc::new(pg::PgStore::connect(env.database_url()?).await?),
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, nothing will be persisted");
            Arc::new(memory::MemoryStore::new())
        }
    };

    tracing::info!("store client ready");
    Ok(store)
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error("store request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("malformed row: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("expected a JSON object for a table row")]
    NotARow,

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error(transparent)]
    EnvError(#[from] EnvErr),
}
