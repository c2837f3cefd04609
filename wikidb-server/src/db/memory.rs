//! In-memory `SqlStore`
//!
//! Interprets statements by their [`QueryName`] rather than their SQL text,
//! mirroring the bundled schema: auto-increment ids, unique titles, and a
//! table that must be created before use. Used by tests and by
//! `wikidb serve --in-memory`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use wikidb_core::{Page, QueryName};

use super::store::{Cell, Param, Row, SqlStore, Statement, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    table_ready: bool,
    pages: BTreeMap<i64, Page>,
    next_id: i64,
    failure: Option<String>,
    statements: usize,
}

enum Outcome {
    Rows(Vec<Row>),
    Affected(u64),
}

/// Page table held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Empty store; the table does not exist until `create-pages-table` runs
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with an existing table holding `pages` as `(title, content)`
    pub fn with_pages<I, T, C>(pages: I) -> Self
    where
        I: IntoIterator<Item = (T, C)>,
        T: Into<String>,
        C: Into<String>,
    {
        let mut state = MemoryState {
            table_ready: true,
            ..MemoryState::default()
        };
        for (title, content) in pages {
            state.insert(title.into(), content.into());
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make every following statement fail with `message`
    pub async fn fail_with(&self, message: impl Into<String>) {
        self.state.lock().await.failure = Some(message.into());
    }

    pub async fn clear_failure(&self) {
        self.state.lock().await.failure = None;
    }

    /// Number of statements received, including failed ones
    pub async fn statement_count(&self) -> usize {
        self.state.lock().await.statements
    }

    /// Snapshot of stored pages ordered by id
    pub async fn pages(&self) -> Vec<Page> {
        self.state.lock().await.pages.values().cloned().collect()
    }

    async fn run(&self, statement: &Statement<'_>) -> Result<Outcome, StoreError> {
        let mut state = self.state.lock().await;
        state.statements += 1;
        if let Some(message) = &state.failure {
            return Err(StoreError::Backend(message.clone()));
        }
        state.apply(statement)
    }
}

impl MemoryState {
    fn insert(&mut self, title: String, raw_content: String) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.pages.insert(
            id,
            Page {
                id,
                title,
                raw_content,
            },
        );
        id
    }

    fn apply(&mut self, statement: &Statement<'_>) -> Result<Outcome, StoreError> {
        if statement.query == QueryName::CreateTable {
            self.table_ready = true;
            return Ok(Outcome::Affected(0));
        }
        if !self.table_ready {
            return Err(StoreError::Backend("Table 'Pages' doesn't exist".into()));
        }

        let params = &statement.params;
        match statement.query {
            QueryName::CreateTable => Ok(Outcome::Affected(0)),
            QueryName::ListPages => Ok(Outcome::Rows(
                self.pages
                    .values()
                    .map(|page| vec![Cell::Text(page.title.clone())])
                    .collect(),
            )),
            QueryName::GetPage => {
                let title = text_param(params, 0)?;
                Ok(Outcome::Rows(
                    self.pages
                        .values()
                        .filter(|page| page.title == title)
                        .map(|page| vec![Cell::Int(page.id), Cell::Text(page.raw_content.clone())])
                        .collect(),
                ))
            }
            QueryName::CreatePage => {
                let title = text_param(params, 0)?;
                let content = text_param(params, 1)?;
                if self.pages.values().any(|page| page.title == title) {
                    return Err(StoreError::Backend(format!(
                        "Duplicate entry '{title}' for key 'title'"
                    )));
                }
                self.insert(title.to_owned(), content.to_owned());
                Ok(Outcome::Affected(1))
            }
            QueryName::SavePage => {
                let content = text_param(params, 0)?;
                let id = int_param(params, 1)?;
                match self.pages.get_mut(&id) {
                    Some(page) => {
                        page.raw_content = content.to_owned();
                        Ok(Outcome::Affected(1))
                    }
                    None => Ok(Outcome::Affected(0)),
                }
            }
            QueryName::DeletePage => {
                let id = int_param(params, 0)?;
                Ok(Outcome::Affected(u64::from(self.pages.remove(&id).is_some())))
            }
        }
    }
}

fn text_param(params: &[Param], index: usize) -> Result<&str, StoreError> {
    match params.get(index) {
        Some(Param::Text(value)) => Ok(value),
        other => Err(StoreError::Backend(format!(
            "parameter {index} must be text, got {other:?}"
        ))),
    }
}

fn int_param(params: &[Param], index: usize) -> Result<i64, StoreError> {
    match params.get(index) {
        Some(Param::Int(value)) => Ok(*value),
        other => Err(StoreError::Backend(format!(
            "parameter {index} must be an integer, got {other:?}"
        ))),
    }
}

#[async_trait]
impl SqlStore for MemoryStore {
    async fn execute(&self, statement: &Statement<'_>) -> Result<u64, StoreError> {
        match self.run(statement).await? {
            Outcome::Affected(count) => Ok(count),
            Outcome::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    async fn query(&self, statement: &Statement<'_>) -> Result<Vec<Row>, StoreError> {
        match self.run(statement).await? {
            Outcome::Rows(rows) => Ok(rows),
            Outcome::Affected(_) => Ok(Vec::new()),
        }
    }
}
