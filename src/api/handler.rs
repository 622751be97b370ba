use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::api::middleware::bearer::BearerToken;
use crate::api::server::{AppState, JsonResult, RouteError};
use crate::db::models::loose_string_opt;
use crate::db::prelude::*;

#[derive(Debug, Deserialize)]
pub struct StoryFilter {
    pub story_id: Option<String>,
}

impl StoryFilter {
    fn story_id(&self) -> Option<&str> {
        self.story_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuiz {
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub story_id: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuizLookup {
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub story_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub info: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: &'static str,
    pub data: Vec<QuizAttempt>,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Trimmed value of a required text field, `None` if absent or blank.
fn present(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub async fn home() -> Json<Value> {
    Json(json!({ "message": "API running" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[instrument(skip(state, token))]
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> JsonResult<VerifyResponse> {
    let identity = state
        .identity
        .get_user(&token)
        .await?
        .ok_or(RouteError::UserNotFound)?;

    UserRepository::new(state.store.clone())
        .provision(&identity)
        .await?;

    Ok(Json(VerifyResponse {
        info: UserInfo {
            email: identity.email().to_string(),
            name: identity.display_name().to_string(),
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitQuiz>, JsonRejection>,
) -> JsonResult<SubmitResponse> {
    let Json(body) = payload?;
    let (Some(user_id), Some(story_id), Some(points)) =
        (present(body.user_id), present(body.story_id), body.points)
    else {
        return Err(RouteError::MissingFields);
    };

    let data = QuizRepository::new(state.store.clone())
        .submit(UserId(user_id), story_id, points)
        .await?;

    Ok(Json(SubmitResponse {
        message: "Quiz submission recorded",
        data,
    }))
}

#[instrument(skip(state, payload))]
pub async fn user_quiz_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UserQuizLookup>, JsonRejection>,
) -> JsonResult<UserQuizSummary> {
    let Json(body) = payload?;
    let (Some(user_id), Some(story_id)) = (present(body.user_id), present(body.story_id)) else {
        return Err(RouteError::MissingFields);
    };

    let Some(attempt) = QuizRepository::new(state.store.clone())
        .find_attempt(&UserId(user_id), &story_id)
        .await?
    else {
        return Ok(Json(UserQuizSummary::not_found()));
    };

    let leaderboard_position = match attempt.leaderboard_rank {
        Some(rank) => Some(rank),
        None => {
            LeaderboardRepository::new(state.store.clone())
                .position_of(&attempt.id)
                .await?
        }
    };

    Ok(Json(UserQuizSummary {
        quiz_score: Some(attempt.quiz_score),
        leaderboard_position,
        completed_at: attempt.completed_at,
    }))
}

#[instrument(skip(state))]
pub async fn quiz_questions(
    Query(filter): Query<StoryFilter>,
    State(state): State<Arc<AppState>>,
) -> JsonResult<QuestionsResponse> {
    let questions = QuestionRepository::new(state.store.clone())
        .questions_or_fallback(filter.story_id())
        .await?;

    Ok(Json(QuestionsResponse {
        questions: questions.into_iter().map(QuestionView::from).collect(),
    }))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    Query(filter): Query<StoryFilter>,
    State(state): State<Arc<AppState>>,
) -> JsonResult<LeaderboardResponse> {
    let leaderboard = LeaderboardRepository::new(state.store.clone())
        .top(filter.story_id())
        .await?;

    Ok(Json(LeaderboardResponse { leaderboard }))
}
