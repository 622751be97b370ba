use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::quiz::QuizAttempt;
use crate::db::models::user::UserId;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: UserId,
    pub story_id: String,
    pub score: i64,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub attempt_id: String,
}

impl LeaderboardEntry {
    pub fn from_attempt(rank: i64, attempt: QuizAttempt) -> Self {
        Self {
            rank,
            user_id: attempt.user_id,
            story_id: attempt.story_id,
            score: attempt.quiz_score,
            completed_at: attempt.completed_at,
            attempt_id: attempt.id,
        }
    }
}
