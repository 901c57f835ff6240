//! Eventide demo
//!
//! Wires up the engine, ingests a stream of synthetic events, and runs a
//! few queries against them.

use eventide::{Config, Engine, Event};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "eventide=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Eventide v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_default();
    let engine = Engine::new(config);
    engine.start();

    ingest_synthetic_events(&engine)?;
    engine.flush();

    run_demo_queries(&engine)?;

    let stats = engine.stats();
    tracing::info!(
        "ingested {} events across {} tables, {} dropped",
        stats.ingest.store.total_events,
        stats.ingest.store.table_count,
        stats.ingest.dropped
    );

    engine.shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}

fn ingest_synthetic_events(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let regions = ["us", "eu", "apac"];
    let names = ["click", "view", "purchase"];
    let base = chrono::Utc::now().timestamp_millis() - 60_000;

    let events: Vec<Event> = (0..10_000)
        .map(|i| {
            Event::with_timestamp(base + i as i64, format!("u{}", i % 100), names[i % names.len()])
                .prop("region", regions[i % regions.len()])
                .prop("price", ((i * 7) % 100 + 1).to_string())
        })
        .collect();

    let accepted = engine.submit(events)?;
    tracing::info!("submitted {} synthetic events", accepted);
    Ok(())
}

fn run_demo_queries(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let queries = [
        "SELECT userId, event FROM events WHERE userId = 'u1' LIMIT 5",
        "SELECT region, COUNT(*) AS c FROM events GROUP BY region ORDER BY c DESC",
        "SELECT region, SUM(price) AS total, AVG(price) AS avg_price \
         FROM events WHERE event = 'purchase' GROUP BY region ORDER BY total DESC",
        "SELECT * FROM events ORDER BY ts DESC LIMIT 3",
    ];

    for sql in queries {
        let result = engine.execute_sql(sql)?;
        tracing::info!(
            "{} → {} rows (scanned {}, matched {}, {} ms)",
            sql,
            result.row_count(),
            result.scanned_rows,
            result.matched_rows,
            result.elapsed_millis
        );
        for row in result.rows.iter().take(5) {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            tracing::info!("  {}", cells.join(" | "));
        }
    }

    Ok(())
}
