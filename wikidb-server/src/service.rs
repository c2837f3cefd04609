//! Database access service
//!
//! Translates bus requests into catalog statements and shapes the rows into
//! replies. Startup runs in a fixed order: load catalog, open the shared
//! pool, create the page table, register on the queue. Readiness is only
//! reported once all four have succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use wikidb_core::{
    Action, Envelope, ErrorCode, Failure, PageLookup, QueryCatalog, QueryName, Reply, Request,
    WikiDbConfig,
};

use crate::bootstrap::{Component, ComponentError};
use crate::bus::{EventBus, MessageHandler};
use crate::db::{Cell, MySqlStore, PoolRegistry, SqlStore, Statement, StoreError};
use crate::error::StartupError;

/// Handles page requests against a [`SqlStore`]
pub struct WikiDatabaseService {
    catalog: Arc<QueryCatalog>,
    store: Arc<dyn SqlStore>,
}

impl WikiDatabaseService {
    pub fn new(catalog: Arc<QueryCatalog>, store: Arc<dyn SqlStore>) -> Self {
        Self { catalog, store }
    }

    /// Create the page table if it does not exist yet.
    pub async fn prepare(&self) -> Result<(), StoreError> {
        self.store
            .execute(&self.statement(QueryName::CreateTable))
            .await
            .map(|_| ())
            .inspect_err(|err| tracing::error!(error = ?err, "Database preparation error"))
    }

    /// Prepare the table and register under `queue`.
    pub async fn start(self: Arc<Self>, bus: &EventBus, queue: &str) -> Result<(), StartupError> {
        self.prepare().await.map_err(StartupError::Prepare)?;
        bus.consumer(queue, self).await?;
        tracing::info!(queue = %queue, "Wiki database service ready");
        Ok(())
    }

    /// Entry point for one envelope from the bus.
    pub async fn on_message(&self, envelope: &Envelope) -> Result<Reply, Failure> {
        let request = Request::from_envelope(envelope).inspect_err(|failure| {
            match failure.code {
                ErrorCode::NoActionSpecified => tracing::error!(
                    headers = ?envelope.headers,
                    body = %envelope.body,
                    "No action header specified for message"
                ),
                _ => tracing::warn!(
                    headers = ?envelope.headers,
                    error = %failure.message,
                    "Rejected message"
                ),
            }
        })?;

        self.dispatch(request).await
    }

    /// Run a validated request.
    pub async fn dispatch(&self, request: Request) -> Result<Reply, Failure> {
        let action = request.action();
        tracing::debug!(action = %action, "Dispatching");

        let result = match request {
            Request::AllPages => self.fetch_all_pages().await,
            Request::GetPage { page } => self.fetch_page(&page).await,
            Request::CreatePage { title, markdown } => self.create_page(title, markdown).await,
            Request::SavePage { id, markdown } => self.save_page(id, markdown).await,
            Request::DeletePage { id } => self.delete_page(id).await,
        };

        result.map_err(|err| report_query_error(action, &err))
    }

    fn statement(&self, query: QueryName) -> Statement<'_> {
        Statement::new(&self.catalog, query)
    }

    async fn fetch_all_pages(&self) -> Result<Reply, StoreError> {
        let rows = self.store.query(&self.statement(QueryName::ListPages)).await?;

        let mut pages = rows
            .iter()
            .map(|row| {
                row.first()
                    .and_then(|cell| cell.as_text())
                    .map(str::to_owned)
                    .ok_or_else(|| StoreError::decode(0, "text", row.first()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        pages.sort();

        Ok(Reply::Pages(pages))
    }

    async fn fetch_page(&self, title: &str) -> Result<Reply, StoreError> {
        let rows = self
            .store
            .query(&self.statement(QueryName::GetPage).bind(title))
            .await?;

        let Some(row) = rows.first() else {
            return Ok(Reply::Page(PageLookup::Missing));
        };

        let id = row
            .first()
            .and_then(|cell| cell.as_int())
            .ok_or_else(|| StoreError::decode(0, "integer", row.first()))?;
        let raw_content = match row.get(1) {
            Some(Cell::Text(content)) => content.clone(),
            Some(Cell::Null) => String::new(),
            other => return Err(StoreError::decode(1, "text", other)),
        };

        Ok(Reply::Page(PageLookup::Found { id, raw_content }))
    }

    async fn create_page(&self, title: String, markdown: String) -> Result<Reply, StoreError> {
        self.store
            .execute(&self.statement(QueryName::CreatePage).bind(title).bind(markdown))
            .await?;
        Ok(Reply::Ack)
    }

    async fn save_page(&self, id: i64, markdown: String) -> Result<Reply, StoreError> {
        self.store
            .execute(&self.statement(QueryName::SavePage).bind(markdown).bind(id))
            .await?;
        Ok(Reply::Ack)
    }

    async fn delete_page(&self, id: i64) -> Result<Reply, StoreError> {
        self.store
            .execute(&self.statement(QueryName::DeletePage).bind(id))
            .await?;
        Ok(Reply::Ack)
    }
}

/// Log the full cause, reply with the message only.
fn report_query_error(action: Action, err: &StoreError) -> Failure {
    tracing::error!(action = %action, error = ?err, "Database query error");
    Failure::db_error(err.to_string())
}

#[async_trait]
impl MessageHandler for WikiDatabaseService {
    async fn handle(&self, envelope: Envelope) -> Result<Value, Failure> {
        self.on_message(&envelope).await.map(|reply| reply.to_body())
    }
}

/// Deployable wrapper running the full startup sequence
pub struct DatabaseComponent {
    config: WikiDbConfig,
    backend: Backend,
}

enum Backend {
    MySql(PoolRegistry),
    Store(Arc<dyn SqlStore>),
}

impl DatabaseComponent {
    /// Service backed by the shared MySQL pool for `config.mysql`
    pub fn mysql(config: WikiDbConfig, pools: PoolRegistry) -> Self {
        Self {
            config,
            backend: Backend::MySql(pools),
        }
    }

    /// Service backed by an already constructed store
    pub fn with_store(config: WikiDbConfig, store: Arc<dyn SqlStore>) -> Self {
        Self {
            config,
            backend: Backend::Store(store),
        }
    }

    /// Run startup and return the registered service.
    pub async fn launch(&self, bus: &EventBus) -> Result<Arc<WikiDatabaseService>, StartupError> {
        let source = self.config.catalog_source();
        let catalog = QueryCatalog::load(&source)?;
        tracing::info!(source = %source, "Query catalog loaded");

        let store: Arc<dyn SqlStore> = match &self.backend {
            Backend::MySql(pools) => {
                let pool = pools
                    .get_or_connect(&self.config.mysql)
                    .await
                    .inspect_err(|err| {
                        tracing::error!(error = ?err, "Could not open a database connection")
                    })
                    .map_err(StartupError::Connect)?;
                Arc::new(MySqlStore::new(pool))
            }
            Backend::Store(store) => Arc::clone(store),
        };

        let service = Arc::new(WikiDatabaseService::new(Arc::new(catalog), store));
        Arc::clone(&service).start(bus, &self.config.queue).await?;
        Ok(service)
    }
}

#[async_trait]
impl Component for DatabaseComponent {
    fn name(&self) -> &str {
        "wiki-database"
    }

    async fn start(&self, bus: &EventBus) -> Result<(), ComponentError> {
        self.launch(bus).await?;
        Ok(())
    }
}
