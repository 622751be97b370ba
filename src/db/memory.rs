use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::db::StoreResult;
use crate::db::store::{Order, Query, Row, Store, compare_values, value_as_text};

/// In-process table store.
///
/// Filters compare the text form of values, so `1` and `"1"` match the same way a `::text`
/// comparison would on the hosted store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    #[cfg(test)]
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn matches(row: &Row, filters: &[(String, serde_json::Value)]) -> bool {
    filters.iter().all(|(column, expected)| {
        row.get(column)
            .is_some_and(|v| !v.is_null() && value_as_text(v) == value_as_text(expected))
    })
}

fn project(row: &Row, columns: Option<&Vec<String>>) -> Row {
    match columns {
        Some(columns) => columns
            .iter()
            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
            .collect(),
        None => row.clone(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    #[instrument(skip(self))]
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Row> = tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| matches(r, &query.filters)).collect())
            .unwrap_or_default();

        if let Some((column, order)) = &query.order {
            let null = serde_json::Value::Null;
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(column).unwrap_or(&null),
                    b.get(column).unwrap_or(&null),
                );
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|r| project(r, query.columns.as_ref()))
            .collect())
    }

    #[instrument(skip(self, row))]
    async fn insert(&self, table: &str, row: Row) -> StoreResult<Vec<Row>> {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(row.clone());

        Ok(vec![row])
    }

    #[instrument(skip(self, row))]
    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> StoreResult<Vec<Row>> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();

        let key = row.get(on_conflict).map(value_as_text);
        let exists = key.is_some()
            && rows
                .iter()
                .any(|r| r.get(on_conflict).map(value_as_text) == key);

        if exists {
            tracing::trace!(table, on_conflict, "row already present, skipping insert");
            return Ok(Vec::new());
        }

        rows.push(row.clone());
        Ok(vec![row])
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let store = MemoryStore::new();
        store
            .seed(
                "scores",
                [
                    row(json!({ "user_id": "a", "score": 10 })),
                    row(json!({ "user_id": "b", "score": 90 })),
                    row(json!({ "user_id": "a", "score": 50 })),
                    row(json!({ "user_id": "c", "score": null })),
                ],
            )
            .await;

        let top = store
            .select(
                &Query::table("scores")
                    .select("score")
                    .order("score", Order::Desc)
                    .limit(2),
            )
            .await
            .unwrap();
        // NULL sorts first when descending
        assert_eq!(top, vec![row(json!({ "score": null })), row(json!({ "score": 90 }))]);

        let only_a = store
            .select(&Query::table("scores").eq("user_id", "a"))
            .await
            .unwrap();
        assert_eq!(only_a.len(), 2);

        let missing = store.select(&Query::table("nothing")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_filters_compare_text() {
        let store = MemoryStore::new();
        store
            .seed("t", [row(json!({ "story_id": 1, "v": "x" }))])
            .await;

        let rows = store
            .select(&Query::table("t").eq("story_id", "1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_skips_existing_key() {
        let store = MemoryStore::new();

        let first = store
            .upsert("Users", row(json!({ "id": "u1", "name": "A" })), "id")
            .await
            .unwrap();
        let second = store
            .upsert("Users", row(json!({ "id": "u1", "name": "B" })), "id")
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        let rows = store.rows("Users").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "A");
    }
}
