use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

use crate::db::store::{Query, Row, Store};
use crate::db::{StoreError, StoreResult};

pub mod leaderboard;
pub mod quiz;
pub mod user;

pub fn to_row<T: Serialize>(item: &T) -> StoreResult<Row> {
    match serde_json::to_value(item)? {
        Value::Object(row) => Ok(row),
        _ => Err(StoreError::NotARow),
    }
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(StoreError::from))
        .collect()
}

/// Typed access to one table of the store.
#[async_trait]
pub trait Repository {
    type Output: Serialize + DeserializeOwned + Send + Sync + fmt::Debug;

    const TABLE_NAME: &'static str;
    const BASE_FIELDS: &'static str;

    fn new(store: Arc<dyn Store>) -> Self
    where
        Self: Sized;

    fn store(&self) -> &dyn Store;

    fn base_query() -> Query
    where
        Self: Sized,
    {
        Query::table(Self::TABLE_NAME).select(Self::BASE_FIELDS)
    }

    #[instrument(skip(self), fields(table = Self::TABLE_NAME))]
    async fn fetch(&self, query: Query) -> StoreResult<Vec<Self::Output>> {
        let rows = self.store().select(&query).await?;
        from_rows(rows)
    }

    #[cfg(test)]
    #[instrument(skip(self, value), fields(table = Self::TABLE_NAME))]
    async fn get_by(&self, column: &str, value: Value) -> StoreResult<Option<Self::Output>>
    where
        Self: Sized,
    {
        let query = Self::base_query().eq(column, value).limit(1);
        Ok(self.fetch(query).await?.into_iter().next())
    }

    #[instrument(skip(self, item), fields(table = Self::TABLE_NAME))]
    async fn insert(&self, item: &Self::Output) -> StoreResult<Vec<Self::Output>> {
        let rows = self.store().insert(Self::TABLE_NAME, to_row(item)?).await?;
        from_rows(rows)
    }

    /// Inserts `item` unless a row with the same `key` exists; `Ok(true)` if a row was written.
    #[instrument(skip(self, item), fields(table = Self::TABLE_NAME))]
    async fn insert_if_absent(&self, item: &Self::Output, key: &str) -> StoreResult<bool> {
        let inserted = self
            .store()
            .upsert(Self::TABLE_NAME, to_row(item)?, key)
            .await?;

        Ok(!inserted.is_empty())
    }
}
