use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::FALLBACK_QUESTIONS;
use crate::db::models::{lenient_utc_opt, loose_string, loose_string_opt, or_not_available};
use crate::db::models::user::UserId;

/// `UserAchievements` table model; one row per quiz submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    #[serde(deserialize_with = "loose_string")]
    pub id: String,
    pub user_id: UserId,
    #[serde(deserialize_with = "loose_string")]
    pub story_id: String,
    pub quiz_score: i64,
    #[serde(default, deserialize_with = "lenient_utc_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub leaderboard_rank: Option<i64>,
}

impl QuizAttempt {
    /// A fresh submission: new id, stamped now, not yet ranked.
    pub fn new(user_id: UserId, story_id: String, quiz_score: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            story_id,
            quiz_score,
            completed_at: Some(Utc::now()),
            leaderboard_rank: None,
        }
    }
}

/// `QuizQuestions` table model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub story_id: Option<String>,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_option: String,
}

impl QuizQuestion {
    pub fn options(&self) -> [&str; 4] {
        [
            self.option_a.as_str(),
            self.option_b.as_str(),
            self.option_c.as_str(),
            self.option_d.as_str(),
        ]
    }

    /// Text of the option the `correct_option` letter points at.
    pub fn correct_answer(&self) -> Option<&str> {
        let idx = match self.correct_option.trim().to_ascii_uppercase().as_str() {
            "A" => 0,
            "B" => 1,
            "C" => 2,
            "D" => 3,
            _ => return None,
        };

        self.options().get(idx).copied()
    }

    pub fn fallback_set() -> Vec<Self> {
        FALLBACK_QUESTIONS
            .iter()
            .enumerate()
            .map(|(idx, (question, [a, b, c, d], correct))| Self {
                id: Some((idx + 1).to_string()),
                story_id: None,
                question: question.to_string(),
                option_a: a.to_string(),
                option_b: b.to_string(),
                option_c: c.to_string(),
                option_d: d.to_string(),
                correct_option: correct.to_string(),
            })
            .collect()
    }
}

/// Client-facing shape of a question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: Option<String>,
    pub story_id: Option<String>,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
}

impl From<QuizQuestion> for QuestionView {
    fn from(q: QuizQuestion) -> Self {
        let correct_answer = q.correct_answer().map(String::from);
        if correct_answer.is_none() {
            tracing::warn!(
                question_id = ?q.id,
                correct_option = %q.correct_option,
                "correct option does not name one of A-D"
            );
        }

        Self {
            options: q.options().iter().map(|o| o.to_string()).collect(),
            id: q.id,
            story_id: q.story_id,
            question: q.question,
            correct_answer,
        }
    }
}

/// A user's stored result for one story, as reported back to them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuizSummary {
    #[serde(serialize_with = "or_not_available")]
    pub quiz_score: Option<i64>,
    #[serde(serialize_with = "or_not_available")]
    pub leaderboard_position: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserQuizSummary {
    pub fn not_found() -> Self {
        Self {
            quiz_score: None,
            leaderboard_position: None,
            completed_at: None,
        }
    }
}
