//! Direct Postgres access for deployments that connect to the database without the REST layer.
//!
//! Rows travel as JSON in both directions (`row_to_json` on the way out, `json_populate_record`
//! on the way in) so the generic [`Store`] interface doesn't need per-table structs here.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::instrument;

use crate::db::StoreResult;
use crate::db::store::{Query, Row, Store, check_ident, value_as_text};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Builds the select statement along with its positional text binds.
    pub fn select_sql(query: &Query) -> StoreResult<(String, Vec<String>)> {
        for ident in query.identifiers() {
            check_ident(ident)?;
        }

        let columns = query
            .columns
            .as_ref()
            .map(|cols| {
                cols.iter()
                    .map(|c| format!("\"{c}\""))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| String::from("*"));

        let mut sql = format!("SELECT {columns} FROM \"{}\"", query.table);
        let mut binds = Vec::with_capacity(query.filters.len());

        for (idx, (column, value)) in query.filters.iter().enumerate() {
            let keyword = if idx == 0 { "WHERE" } else { "AND" };
            sql.push_str(&format!(" {keyword} \"{column}\"::text = ${}", idx + 1));
            binds.push(value_as_text(value));
        }

        if let Some((column, order)) = &query.order {
            sql.push_str(&format!(
                " ORDER BY \"{column}\" {}",
                order.as_str().to_uppercase()
            ));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok((format!("SELECT row_to_json(t) FROM ({sql}) t"), binds))
    }

    /// Insert statement writing only the columns present in `row`, so the rest keep their
    /// defaults.
    pub fn insert_sql(table: &str, row: &Row, on_conflict: Option<&str>) -> StoreResult<String> {
        let table = check_ident(table)?;
        let mut columns = row
            .keys()
            .map(|c| check_ident(c).map(|c| format!("\"{c}\"")))
            .collect::<StoreResult<Vec<_>>>()?;
        columns.sort();
        let columns = columns.join(", ");

        let conflict = match on_conflict {
            Some(column) => format!(" ON CONFLICT (\"{}\") DO NOTHING", check_ident(column)?),
            None => String::new(),
        };

        let insert = if columns.is_empty() {
            format!("INSERT INTO \"{table}\" DEFAULT VALUES")
        } else {
            format!(
                "INSERT INTO \"{table}\" ({columns}) \
                 SELECT {columns} FROM json_populate_record(NULL::\"{table}\", $1::json)"
            )
        };

        Ok(format!(
            "WITH inserted AS ({insert}{conflict} RETURNING *) \
             SELECT row_to_json(inserted) FROM inserted"
        ))
    }

    #[instrument(skip(self, row))]
    async fn insert_row(
        &self,
        table: &str,
        row: Row,
        on_conflict: Option<&str>,
    ) -> StoreResult<Vec<Row>> {
        let sql = Self::insert_sql(table, &row, on_conflict)?;
        let mut statement = sqlx::query_scalar::<_, Value>(&sql);
        if !row.is_empty() {
            statement = statement.bind(Value::Object(row));
        }

        let rows = statement
            .fetch_all(&self.pool)
            .await
            .inspect_err(|e| tracing::error!(error = ?e, table, "insert failure"))?;

        Ok(into_rows(rows))
    }
}

fn into_rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self), fields(table = %query.table))]
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>> {
        let (sql, binds) = Self::select_sql(query)?;

        let mut statement = sqlx::query_scalar::<_, Value>(&sql);
        for bind in binds {
            statement = statement.bind(bind);
        }

        let rows = statement.fetch_all(&self.pool).await?;
        tracing::debug!(row_count = rows.len(), "select complete");

        Ok(into_rows(rows))
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Vec<Row>> {
        self.insert_row(table, row, None).await
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> StoreResult<Vec<Row>> {
        self.insert_row(table, row, Some(on_conflict)).await
    }
}
