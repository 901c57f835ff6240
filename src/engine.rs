//! Engine facade
//!
//! Wires the column store, ingest service, query service, and index
//! manager together and owns their background tasks. This is the
//! embeddable entry point; HTTP, WebSocket, and consumer front ends sit
//! on top of it.

use crate::config::Config;
use crate::index::{IndexManager, IndexManagerStats};
use crate::ingest::{IngestError, IngestService, IngestStats};
use crate::query::{PhysicalPlan, QueryError, QueryRequest, QueryResult, QueryService};
use crate::storage::{ColumnStore, Event};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Combined engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub ingest: IngestStats,
    pub index: IndexManagerStats,
}

/// The assembled analytics engine
pub struct Engine {
    store: Arc<ColumnStore>,
    index: Arc<IndexManager>,
    ingest: Arc<IngestService>,
    query: QueryService,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Assemble an engine from configuration
    ///
    /// Background loops are not running yet; call [`Engine::start`] from
    /// within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let store = Arc::new(ColumnStore::new());
        let index = Arc::new(IndexManager::new(config.index.clone()));
        let ingest = Arc::new(IngestService::with_index_manager(
            Arc::clone(&store),
            Arc::clone(&index),
            config.ingest.clone(),
        ));
        let query = QueryService::with_index_manager(Arc::clone(&store), Arc::clone(&index));

        Self {
            store,
            index,
            ingest,
            query,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the periodic ingest flush and the adaptive index tick
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(self.ingest.start());
        tasks.push(self.index.start());
        tracing::info!("engine background tasks started");
    }

    /// Submit events for ingestion
    pub fn submit(&self, events: Vec<Event>) -> Result<usize, IngestError> {
        self.ingest.submit(events)
    }

    /// Force-flush the ingest buffer
    pub fn flush(&self) {
        self.ingest.flush();
    }

    /// Execute a SQL string
    pub fn execute_sql(&self, sql: &str) -> Result<QueryResult, QueryError> {
        self.query.execute_sql(sql)
    }

    /// Execute a query request
    pub fn execute(&self, request: &QueryRequest) -> Result<QueryResult, QueryError> {
        self.query.execute(request)
    }

    /// Plan a query without executing it
    pub fn explain(&self, request: &QueryRequest) -> Result<PhysicalPlan, QueryError> {
        self.query.explain(request)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ingest: self.ingest.stats(),
            index: self.index.stats(),
        }
    }

    pub fn store(&self) -> &Arc<ColumnStore> {
        &self.store
    }

    pub fn ingest(&self) -> &Arc<IngestService> {
        &self.ingest
    }

    pub fn query_service(&self) -> &QueryService {
        &self.query
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index
    }

    /// Stop schedulers, drain the ingest buffer, and shut the builder down
    pub fn shutdown(&self) {
        tracing::info!("engine shutting down");
        self.ingest.stop();
        self.index.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
