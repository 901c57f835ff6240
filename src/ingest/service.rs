//! Ingest service
//!
//! Coalesces event submissions into batches for the column store. The
//! staging buffer flushes synchronously when it reaches `batch_size` and
//! periodically via a background task; submissions arriving while the
//! buffer holds more than `2 × batch_size` events are dropped whole as
//! soft backpressure.
//!
//! Every flushed per-table batch becomes a segment: it is registered with
//! the index manager, which then builds indexes for desired columns in
//! the background.

use crate::config::IngestConfig;
use crate::index::IndexManager;
use crate::storage::{ColumnStore, Event, Row, StoreStats};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{interval, Duration};

/// Errors surfaced by the ingest path
#[derive(Error, Debug)]
pub enum IngestError {
    /// The staging buffer is over capacity; the submitted batch was
    /// dropped whole and counted
    #[error("ingest buffer overloaded; dropped {dropped} events")]
    Overloaded { dropped: usize },
}

/// Ingest statistics
#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub buffer_size: usize,
    pub dropped: u64,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub store: StoreStats,
}

/// Buffered ingest front end over the column store
pub struct IngestService {
    store: Arc<ColumnStore>,
    index: Option<Arc<IndexManager>>,
    config: IngestConfig,
    buffer: Mutex<Vec<Event>>,
    dropped: AtomicU64,
    segment_seq: AtomicU64,
    shutdown: AtomicBool,
}

impl IngestService {
    pub fn new(store: Arc<ColumnStore>, config: IngestConfig) -> Self {
        Self {
            store,
            index: None,
            buffer: Mutex::new(Vec::with_capacity(config.batch_size)),
            config,
            dropped: AtomicU64::new(0),
            segment_seq: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Attach an index manager so flushed batches register as segments
    /// and trigger background index builds
    pub fn with_index_manager(
        store: Arc<ColumnStore>,
        index: Arc<IndexManager>,
        config: IngestConfig,
    ) -> Self {
        Self {
            index: Some(index),
            ..Self::new(store, config)
        }
    }

    /// Accept a batch of events into the staging buffer
    ///
    /// Returns the accepted count. When the buffer already holds more
    /// than `2 × batch_size` events the whole submission is refused,
    /// counted as dropped, and never retried here.
    pub fn submit(&self, events: Vec<Event>) -> Result<usize, IngestError> {
        if events.is_empty() {
            return Ok(0);
        }
        let count = events.len();

        let full_batch = {
            let mut buffer = self.buffer.lock();
            if buffer.len() > 2 * self.config.batch_size {
                self.dropped.fetch_add(count as u64, Ordering::Relaxed);
                tracing::warn!(dropped = count, "ingest buffer overloaded, dropping batch");
                return Err(IngestError::Overloaded { dropped: count });
            }

            buffer.extend(events);
            if buffer.len() >= self.config.batch_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };

        // Delivery happens outside the buffer lock
        if let Some(batch) = full_batch {
            self.deliver(batch);
        }
        Ok(count)
    }

    /// Drain whatever is buffered into the store
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if !batch.is_empty() {
            self.deliver(batch);
        }
    }

    fn deliver(&self, batch: Vec<Event>) {
        tracing::debug!(events = batch.len(), "flushing ingest batch");
        let table_batches = self.store.append_batch(batch);

        if let Some(index) = &self.index {
            for table_batch in table_batches {
                let seq = self.segment_seq.fetch_add(1, Ordering::Relaxed) + 1;
                let segment_id = format!("{}-{}", table_batch.table, seq);
                index.register_segment(&table_batch.table, &segment_id, table_batch.rows.len());
                index.on_segment_flushed(&table_batch.table, &segment_id, &table_batch.rows);
            }
        }
    }

    /// Start the periodic flush task
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        let period = Duration::from_millis(service.config.flush_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if service.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                service.flush();
            }
        })
    }

    /// Stop the flush scheduler and drain the buffer one last time
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.flush();
    }

    /// Scan pass-through for callers that want raw rows
    pub fn scan(
        &self,
        table: &str,
        from_ts: i64,
        to_ts: i64,
        filter: Option<&dyn Fn(&Row) -> bool>,
    ) -> Vec<Row> {
        self.store.scan(table, from_ts, to_ts, filter)
    }

    /// Raw events of a table within a time range
    pub fn query_events(&self, table: &str, from_ts: i64, to_ts: i64) -> Vec<Event> {
        self.store
            .scan(table, from_ts, to_ts, None)
            .into_iter()
            .map(|row| row.event().as_ref().clone())
            .collect()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            buffer_size: self.buffer.lock().len(),
            dropped: self.dropped(),
            batch_size: self.config.batch_size,
            flush_interval_ms: self.config.flush_interval_ms,
            store: self.store.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> IngestConfig {
        IngestConfig {
            batch_size: 4,
            flush_interval_ms: 50,
        }
    }

    fn service() -> (Arc<IngestService>, Arc<ColumnStore>) {
        let store = Arc::new(ColumnStore::new());
        let service = Arc::new(IngestService::new(Arc::clone(&store), small_config()));
        (service, store)
    }

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event::with_timestamp(1000 + i as i64, format!("u{}", i), "click"))
            .collect()
    }

    #[test]
    fn test_submit_buffers_until_flush() {
        let (service, store) = service();

        assert_eq!(service.submit(events(2)).unwrap(), 2);
        assert_eq!(store.size(), 0);
        assert_eq!(service.stats().buffer_size, 2);

        service.flush();
        assert_eq!(store.size(), 2);
        assert_eq!(service.stats().buffer_size, 0);
    }

    #[test]
    fn test_submit_empty_is_zero() {
        let (service, store) = service();
        assert_eq!(service.submit(Vec::new()).unwrap(), 0);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_batch_size_triggers_synchronous_flush() {
        let (service, store) = service();

        service.submit(events(4)).unwrap();
        assert_eq!(store.size(), 4);
        assert_eq!(service.stats().buffer_size, 0);
    }

    #[test]
    fn test_overload_drops_whole_batch() {
        let store = Arc::new(ColumnStore::new());
        let service = IngestService::new(
            Arc::clone(&store),
            IngestConfig {
                batch_size: 2,
                flush_interval_ms: 60_000,
            },
        );

        // Fill the buffer past 2 × batch_size without hitting a flush:
        // single-event submits flush at 2, so prime with sub-batch sizes
        {
            let mut buffer = service.buffer.lock();
            buffer.extend(events(5));
        }

        let err = service.submit(events(3)).unwrap_err();
        assert!(matches!(err, IngestError::Overloaded { dropped: 3 }));
        assert_eq!(service.dropped(), 3);

        // The buffered events are intact; the refused batch is gone
        service.flush();
        assert_eq!(store.size(), 5);
    }

    #[test]
    fn test_no_event_lost_or_duplicated() {
        let (service, store) = service();

        for chunk in events(10).chunks(3) {
            service.submit(chunk.to_vec()).unwrap();
        }
        service.flush();

        assert_eq!(store.size(), 10);
        let rows = store.scan("events", i64::MIN, i64::MAX, None);
        let mut users: Vec<String> = rows
            .iter()
            .map(|r| r.user_id().unwrap().to_string())
            .collect();
        users.sort();
        users.dedup();
        assert_eq!(users.len(), 10);
    }

    #[tokio::test]
    async fn test_periodic_flush() {
        let (service, store) = service();
        let handle = service.start();

        service.submit(events(2)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.size(), 2);

        service.stop();
        handle.abort();
    }

    #[tokio::test]
    async fn test_stop_performs_final_flush() {
        let (service, store) = service();
        service.submit(events(2)).unwrap();

        service.stop();
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_stats_shape() {
        let (service, _store) = service();
        service.submit(events(1)).unwrap();

        let stats = service.stats();
        assert_eq!(stats.buffer_size, 1);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.batch_size, 4);
        assert_eq!(stats.flush_interval_ms, 50);
        assert_eq!(stats.store.total_events, 0);
    }

    #[test]
    fn test_query_events_round_trip() {
        let (service, _store) = service();
        service.submit(events(3)).unwrap();
        service.flush();

        let fetched = service.query_events("events", 1000, 1001);
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|e| e.event == "click"));
    }

    #[tokio::test]
    async fn test_flush_registers_segments_with_index_manager() {
        use crate::config::IndexConfig;
        use crate::index::IndexQuery;

        let store = Arc::new(ColumnStore::new());
        let index = Arc::new(IndexManager::new(IndexConfig::default()));
        index.ensure_index("events", "userId");

        let service =
            IngestService::with_index_manager(Arc::clone(&store), Arc::clone(&index), small_config());

        service.submit(events(3)).unwrap();
        service.flush();

        assert_eq!(index.segment_row_count("events", "events-1"), Some(3));

        // The background build eventually serves lookups
        for _ in 0..200 {
            if !index
                .lookup("events", "userId", &IndexQuery::equals("u0"))
                .is_empty()
            {
                index.shutdown();
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("segment index never became visible");
    }
}
