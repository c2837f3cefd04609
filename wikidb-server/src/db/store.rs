//! Store seam between the database service and the relational backend
//!
//! The service builds a [`Statement`] from a catalog template plus
//! positional parameters and hands it to a [`SqlStore`]. Rows come back as
//! loosely typed [`Cell`]s so the service can shape replies without caring
//! which backend answered.

use async_trait::async_trait;
use wikidb_core::{QueryCatalog, QueryName};

/// Positional statement parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Int(i64),
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_owned())
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

/// One column value of a result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Null,
    Int(i64),
    Text(String),
}

impl Cell {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Cell::Null => "NULL",
            Cell::Int(_) => "integer",
            Cell::Text(_) => "text",
        }
    }
}

pub type Row = Vec<Cell>;

/// A catalog template bound to its parameters
#[derive(Debug, Clone)]
pub struct Statement<'a> {
    pub query: QueryName,
    pub sql: &'a str,
    pub params: Vec<Param>,
}

impl<'a> Statement<'a> {
    pub fn new(catalog: &'a QueryCatalog, query: QueryName) -> Self {
        Self {
            query,
            sql: catalog.get(query),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// Failure reported by a non-SQL backend
    #[error("{0}")]
    Backend(String),

    #[error("unexpected {found} value in column {column}, expected {expected}")]
    Decode {
        column: usize,
        expected: &'static str,
        found: &'static str,
    },
}

impl StoreError {
    pub fn decode(column: usize, expected: &'static str, cell: Option<&Cell>) -> Self {
        Self::Decode {
            column,
            expected,
            found: cell.map(Cell::kind).unwrap_or("missing"),
        }
    }
}

/// Executes parameterized statements.
///
/// Each call borrows a connection for its own duration and has released it
/// by the time the returned future resolves.
#[async_trait]
pub trait SqlStore: Send + Sync {
    /// Run a statement that returns no rows; yields the affected row count.
    async fn execute(&self, statement: &Statement<'_>) -> Result<u64, StoreError>;

    /// Run a statement and collect its rows.
    async fn query(&self, statement: &Statement<'_>) -> Result<Vec<Row>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_uses_catalog_template() {
        let catalog = QueryCatalog::bundled().unwrap();
        let statement = Statement::new(&catalog, QueryName::SavePage)
            .bind("# new")
            .bind(7_i64);

        assert_eq!(statement.sql, "update Pages set content = ? where id = ?");
        assert_eq!(
            statement.params,
            vec![Param::Text("# new".into()), Param::Int(7)]
        );
    }

    #[test]
    fn decode_error_names_found_kind() {
        let err = StoreError::decode(1, "text", Some(&Cell::Int(3)));
        assert_eq!(
            err.to_string(),
            "unexpected integer value in column 1, expected text"
        );

        let err = StoreError::decode(0, "integer", None);
        assert!(err.to_string().contains("missing"));
    }
}
