//! `SqlStore` backed by a sqlx MySQL pool

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{MySql, MySqlPool, Row as _, ValueRef as _};

use super::store::{Cell, Param, Row, SqlStore, Statement, StoreError};

/// Runs statements on connections borrowed from a shared pool
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [Param]) -> Query<'q, MySql, MySqlArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            Param::Text(value) => query.bind(value.as_str()),
            Param::Int(value) => query.bind(*value),
        })
}

fn decode_cell(row: &MySqlRow, column: usize) -> Result<Cell, StoreError> {
    if row.try_get_raw(column)?.is_null() {
        return Ok(Cell::Null);
    }
    if let Ok(value) = row.try_get::<i64, _>(column) {
        return Ok(Cell::Int(value));
    }
    if let Ok(value) = row.try_get::<u64, _>(column) {
        return i64::try_from(value)
            .map(Cell::Int)
            .map_err(|_| StoreError::Backend(format!("column {column} value {value} overflows i64")));
    }
    Ok(Cell::Text(row.try_get::<String, _>(column)?))
}

fn decode_row(row: &MySqlRow) -> Result<Row, StoreError> {
    (0..row.len()).map(|column| decode_cell(row, column)).collect()
}

#[async_trait]
impl SqlStore for MySqlStore {
    async fn execute(&self, statement: &Statement<'_>) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = bind_params(statement.sql, &statement.params)
            .execute(&mut *conn)
            .await;
        // Back to the pool before the outcome is reported
        drop(conn);
        Ok(result?.rows_affected())
    }

    async fn query(&self, statement: &Statement<'_>) -> Result<Vec<Row>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = bind_params(statement.sql, &statement.params)
            .fetch_all(&mut *conn)
            .await;
        drop(conn);
        result?.iter().map(decode_row).collect()
    }
}
