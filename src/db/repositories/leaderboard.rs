use std::sync::Arc;

use tracing::instrument;

use crate::constants::LEADERBOARD_SIZE;
use crate::db::StoreResult;
use crate::db::models::leaderboard::LeaderboardEntry;
use crate::db::models::quiz::QuizAttempt;
use crate::db::repositories::Repository;
use crate::db::repositories::quiz::QuizRepository;
use crate::db::store::{Order, Store};

pub struct LeaderboardRepository {
    attempts: QuizRepository,
}

impl LeaderboardRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            attempts: QuizRepository::new(store),
        }
    }

    /// Highest-scoring attempts, best first, ranked 1..=`LEADERBOARD_SIZE` by position.
    #[instrument(skip(self))]
    pub async fn top(&self, story_id: Option<&str>) -> StoreResult<Vec<LeaderboardEntry>> {
        let mut query = QuizRepository::base_query()
            .order("quiz_score", Order::Desc)
            .limit(LEADERBOARD_SIZE);
        if let Some(story_id) = story_id {
            query = query.eq("story_id", story_id);
        }

        let attempts: Vec<QuizAttempt> = self.attempts.fetch(query).await?;
        tracing::debug!(entries = attempts.len(), "fetched leaderboard segment");

        Ok(attempts
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .zip(1..)
            .map(|(attempt, rank)| LeaderboardEntry::from_attempt(rank, attempt))
            .collect())
    }

    /// Position of the given attempt on the overall board, if it made the cut.
    #[instrument(skip(self))]
    pub async fn position_of(&self, attempt_id: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .top(None)
            .await?
            .into_iter()
            .find(|entry| entry.attempt_id == attempt_id)
            .map(|entry| entry.rank))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::user::UserId;

    async fn seeded(scores: &[(&str, &str, i64)]) -> (Arc<MemoryStore>, Vec<String>) {
        let store = Arc::new(MemoryStore::new());
        let quiz = QuizRepository::new(store.clone());

        let mut ids = Vec::new();
        for (user, story, score) in scores {
            let rows = quiz
                .submit(UserId(user.to_string()), story.to_string(), *score)
                .await
                .unwrap();
            ids.push(rows[0].id.clone());
        }

        (store, ids)
    }

    #[tokio::test]
    async fn test_empty_board() {
        let store = Arc::new(MemoryStore::new());
        let board = LeaderboardRepository::new(store).top(None).await.unwrap();
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn test_top_is_sorted_and_truncated() {
        let scores: Vec<(String, i64)> = (0..25).map(|i| (format!("u{i}"), (i * 37) % 101)).collect();
        let refs: Vec<(&str, &str, i64)> = scores
            .iter()
            .map(|(u, s)| (u.as_str(), "s1", *s))
            .collect();
        let (store, _) = seeded(&refs).await;

        let board = LeaderboardRepository::new(store).top(None).await.unwrap();

        assert_eq!(board.len(), LEADERBOARD_SIZE);
        assert!(board.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(
            board.iter().map(|e| e.rank).collect::<Vec<_>>(),
            (1..=10).collect::<Vec<i64>>()
        );

        let best = scores.iter().map(|(_, s)| *s).max().unwrap();
        assert_eq!(board[0].score, best);
    }

    #[tokio::test]
    async fn test_story_filter_and_position() {
        let (store, ids) = seeded(&[
            ("alice", "s1", 40),
            ("bob", "s2", 95),
            ("carol", "s1", 70),
        ])
        .await;
        let repo = LeaderboardRepository::new(store);

        let s1 = repo.top(Some("s1")).await.unwrap();
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[0].user_id, UserId("carol".into()));

        assert_eq!(repo.position_of(&ids[1]).await.unwrap(), Some(1));
        assert_eq!(repo.position_of(&ids[0]).await.unwrap(), Some(3));
        assert_eq!(repo.position_of("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_integer_user_ids_are_read_back() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                crate::constants::TABLE_ACHIEVEMENTS,
                [serde_json::json!({
                    "id": 1,
                    "user_id": 42,
                    "story_id": 3,
                    "quiz_score": 55,
                    "completed_at": "2025-01-02T03:04:05+00:00",
                    "leaderboard_rank": null,
                })
                .as_object()
                .cloned()
                .unwrap()],
            )
            .await;

        let board = LeaderboardRepository::new(store).top(None).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, UserId("42".into()));
        assert_eq!(board[0].story_id, "3");
    }
}
