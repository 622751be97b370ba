use std::sync::Arc;

use tracing::instrument;

use crate::constants::{TABLE_ACHIEVEMENTS, TABLE_QUESTIONS};
use crate::db::StoreResult;
use crate::db::models::quiz::{QuizAttempt, QuizQuestion};
use crate::db::models::user::UserId;
use crate::db::repositories::Repository;
use crate::db::store::{Order, Store};

pub struct QuizRepository {
    store: Arc<dyn Store>,
}

impl Repository for QuizRepository {
    type Output = QuizAttempt;

    const TABLE_NAME: &'static str = TABLE_ACHIEVEMENTS;
    const BASE_FIELDS: &'static str =
        "id, user_id, story_id, quiz_score, completed_at, leaderboard_rank";

    fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

impl QuizRepository {
    /// Records a new attempt and returns the stored row(s).
    #[instrument(skip(self))]
    pub async fn submit(
        &self,
        user_id: UserId,
        story_id: String,
        points: i64,
    ) -> StoreResult<Vec<QuizAttempt>> {
        let attempt = QuizAttempt::new(user_id, story_id, points);
        tracing::debug!(attempt_id = %attempt.id, "recording quiz attempt");

        self.insert(&attempt).await
    }

    /// Any one attempt by `user_id` on `story_id`. Which one is up to the store when several exist.
    #[instrument(skip(self))]
    pub async fn find_attempt(
        &self,
        user_id: &UserId,
        story_id: &str,
    ) -> StoreResult<Option<QuizAttempt>> {
        let query = Self::base_query()
            .eq("user_id", user_id.0.as_str())
            .eq("story_id", story_id)
            .limit(1);

        Ok(self.fetch(query).await?.into_iter().next())
    }
}

pub struct QuestionRepository {
    store: Arc<dyn Store>,
}

impl Repository for QuestionRepository {
    type Output = QuizQuestion;

    const TABLE_NAME: &'static str = TABLE_QUESTIONS;
    const BASE_FIELDS: &'static str =
        "id, story_id, question, option_a, option_b, option_c, option_d, correct_option";

    fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

impl QuestionRepository {
    /// All stored questions in id order (optionally for one story), or the built-in set if there
    /// are none.
    #[instrument(skip(self))]
    pub async fn questions_or_fallback(
        &self,
        story_id: Option<&str>,
    ) -> StoreResult<Vec<QuizQuestion>> {
        let mut query = Self::base_query().order("id", Order::Asc);
        if let Some(story_id) = story_id {
            query = query.eq("story_id", story_id);
        }

        let questions = self.fetch(query).await?;
        if questions.is_empty() {
            tracing::debug!("no stored questions, serving fallback set");
            return Ok(QuizQuestion::fallback_set());
        }

        Ok(questions)
    }
}
