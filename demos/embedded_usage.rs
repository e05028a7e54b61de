//! Minimal embedding example for glucolink-core
//!
//! This example demonstrates using glucolink-core as a library in a custom
//! application. The application owns the settings, feeds readings and
//! decides when the engine stops.

use chrono::{Duration as ChronoDuration, Utc};
use glucolink_core::traits::{
    AlertSink, Collector, CollectorRequest, CollectorResponse, Reading, SettingKey, SettingValue,
    SettingsStore, Trend,
};
use glucolink_core::{MemoryReadingSource, MemorySettingsStore, Result, SyncConfig, SyncEngine};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Collector that accepts everything without touching the network
struct EmbeddedCollector {
    posts: AtomicUsize,
}

#[async_trait::async_trait]
impl Collector for EmbeddedCollector {
    async fn probe(&self, request: &CollectorRequest) -> Result<CollectorResponse> {
        println!("[Embedded] Probe {}", request.endpoint);
        Ok(CollectorResponse::new(200, "{}"))
    }

    async fn post_entries(
        &self,
        request: &CollectorRequest,
        body: Vec<u8>,
    ) -> Result<CollectorResponse> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        println!(
            "[Embedded] POST {} byte(s) to {}",
            body.len(),
            request.endpoint
        );
        Ok(CollectorResponse::new(200, "[]"))
    }

    fn collector_name(&self) -> &'static str {
        "embedded"
    }
}

/// Alert sink printing to stdout, standing in for a UI notification
struct ConsoleAlerts;

impl AlertSink for ConsoleAlerts {
    fn present(&self, title: &str, message: &str) {
        println!("[Alert] {}: {}", title, message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Embedded glucolink-core Example ===\n");

    // Settings as the host application would keep them
    let settings = Arc::new(MemorySettingsStore::from_values([
        (SettingKey::Enabled, SettingValue::Flag(true)),
        (
            SettingKey::Url,
            SettingValue::Text("https://ns.example.com".to_string()),
        ),
        (
            SettingKey::ApiKey,
            SettingValue::Text("first-api-secret".to_string()),
        ),
    ]));

    // An hour of five-minute readings
    let readings = MemoryReadingSource::new();
    let now = Utc::now();
    readings
        .extend((0..12).map(|i| {
            Reading::new(now - ChronoDuration::minutes(5 * i), 110.0 + i as f64)
                .with_trend(Trend::Flat)
        }))
        .await;

    let collector = Arc::new(EmbeddedCollector {
        posts: AtomicUsize::new(0),
    });

    println!("1. Creating engine...");
    let (engine, mut event_rx) = SyncEngine::new(
        settings.clone(),
        Arc::new(readings.clone()),
        collector.clone(),
        Arc::new(ConsoleAlerts),
        SyncConfig::default(),
    )?;

    let event_listener = tokio::spawn(async move {
        println!("2. Event listener started");
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
        println!("Event listener stopped");
    });

    println!("3. Starting engine in background...");
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_with_shutdown(Some(shutdown_rx)).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n4. User edits the API key (verify, then sync)...");
    settings
        .set(
            SettingKey::ApiKey,
            Some(SettingValue::Text("rotated-api-secret".to_string())),
        )
        .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("\n5. A new reading arrives; application asks for a sync...");
    readings
        .push(Reading::new(Utc::now(), 118.0).with_trend(Trend::FortyFiveUp))
        .await;
    let outcome = engine.synchronize().await?;
    println!("   Outcome: {:?}", outcome);

    println!("\n6. Stopping engine...");
    let _ = shutdown_tx.send(());
    if let Ok(joined) = engine_handle.await {
        joined?;
    }
    drop(engine);
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    println!("Uploads sent: {}", collector.posts.load(Ordering::SeqCst));
    println!(
        "Watermark: {:?}",
        settings.watermark().await?.map(|w| w.to_rfc3339())
    );

    Ok(())
}
