//! Hosted store access through its REST (PostgREST) interface.

use async_trait::async_trait;
use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::instrument;

use crate::constants::SUPABASE_REST_PATH;
use crate::db::store::{Query, Row, Store, check_ident, value_as_text};
use crate::db::{StoreError, StoreResult};

const PREFER_RETURN: &str = "return=representation";
const PREFER_IGNORE_DUPLICATES: &str = "resolution=ignore-duplicates,return=representation";

#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl PostgrestStore {
    pub fn new(client: reqwest::Client, project_url: &str, api_key: &str) -> StoreResult<Self> {
        Ok(Self {
            client,
            base_url: format!("{}{}", project_url.trim_end_matches('/'), SUPABASE_REST_PATH),
            headers: auth_headers(api_key)?,
        })
    }

    fn table_url(&self, table: &str) -> StoreResult<String> {
        Ok(format!("{}/{}", self.base_url, check_ident(table)?))
    }

    /// URL query pairs for a select, e.g. `select=a,b&user_id=eq.u1&order=score.desc&limit=10`.
    pub fn query_params(query: &Query) -> StoreResult<Vec<(String, String)>> {
        for ident in query.identifiers() {
            check_ident(ident)?;
        }

        let select = query
            .columns
            .as_ref()
            .map(|cols| cols.join(","))
            .unwrap_or_else(|| String::from("*"));

        let mut params = vec![(String::from("select"), select)];
        params.extend(
            query
                .filters
                .iter()
                .map(|(column, value)| (column.clone(), format!("eq.{}", value_as_text(value)))),
        );

        if let Some((column, order)) = &query.order {
            params.push((String::from("order"), format!("{column}.{}", order.as_str())));
        }

        if let Some(limit) = query.limit {
            params.push((String::from("limit"), limit.to_string()));
        }

        Ok(params)
    }

    #[instrument(skip(self, row))]
    async fn post_row(
        &self,
        table: &str,
        row: Row,
        prefer: &'static str,
        on_conflict: Option<&str>,
    ) -> StoreResult<Vec<Row>> {
        let mut request = self
            .client
            .post(self.table_url(table)?)
            .headers(self.headers.clone())
            .header("Prefer", prefer)
            .json(&[row]);

        if let Some(column) = on_conflict {
            request = request.query(&[("on_conflict", check_ident(column)?)]);
        }

        read_rows(request.send().await?).await
    }
}

/// Checks the response status, surfacing the store's own error message when it provides one.
async fn read_rows(res: reqwest::Response) -> StoreResult<Vec<Row>> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(String::from))
            .unwrap_or(body);

        tracing::error!(code = %status, reason = %message, "store rejected request");
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    // an empty body is returned when nothing was written under `ignore-duplicates`
    let bytes = res.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    Ok(serde_json::from_slice::<Vec<Row>>(&bytes)?)
}

fn auth_headers(api_key: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert("apikey", HeaderValue::from_str(api_key)?);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}"))?,
    );

    Ok(headers)
}

#[async_trait]
impl Store for PostgrestStore {
    #[instrument(skip(self), fields(table = %query.table))]
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>> {
        let params = Self::query_params(query)?;
        let res = self
            .client
            .get(self.table_url(&query.table)?)
            .headers(self.headers.clone())
            .query(&params)
            .send()
            .await?;

        let rows = read_rows(res).await?;
        tracing::debug!(row_count = rows.len(), "select complete");

        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Vec<Row>> {
        self.post_row(table, row, PREFER_RETURN, None).await
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> StoreResult<Vec<Row>> {
        self.post_row(table, row, PREFER_IGNORE_DUPLICATES, Some(on_conflict))
            .await
    }
}
