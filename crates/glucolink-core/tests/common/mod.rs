//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that record how the core
//! talks to its seams without doing real I/O.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use glucolink_core::config::SyncConfig;
use glucolink_core::engine::SyncEvent;
use glucolink_core::error::{Error, Result};
use glucolink_core::settings::MemorySettingsStore;
use glucolink_core::traits::{
    AlertSink, Collector, CollectorRequest, CollectorResponse, Reading, SettingChange, SettingKey,
    SettingValue, SettingsStore,
};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;

pub const ENDPOINT: &str = "https://ns.example.com";
pub const API_KEY: &str = "correct-horse-battery";

/// One scripted collector answer
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, &'static str),
    Transport(&'static str),
    Unreadable(&'static str),
}

impl Reply {
    fn into_result(self) -> Result<CollectorResponse> {
        match self {
            Reply::Status(status, body) => Ok(CollectorResponse::new(status, body)),
            Reply::Transport(detail) => Err(Error::transport(detail)),
            Reply::Unreadable(detail) => Err(Error::invalid_response(detail)),
        }
    }
}

/// A Collector that answers from a script and counts calls
///
/// When a script runs dry, probes answer 200 and posts answer 200 `[]`.
pub struct ScriptedCollector {
    probe_replies: Mutex<VecDeque<Reply>>,
    post_replies: Mutex<VecDeque<Reply>>,
    probe_delay: Duration,
    post_delay: Duration,
    probe_call_count: AtomicUsize,
    post_call_count: AtomicUsize,
    probe_requests: Mutex<Vec<CollectorRequest>>,
    posted_bodies: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedCollector {
    pub fn new() -> Self {
        Self {
            probe_replies: Mutex::new(VecDeque::new()),
            post_replies: Mutex::new(VecDeque::new()),
            probe_delay: Duration::ZERO,
            post_delay: Duration::ZERO,
            probe_call_count: AtomicUsize::new(0),
            post_call_count: AtomicUsize::new(0),
            probe_requests: Mutex::new(Vec::new()),
            posted_bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn with_probe_reply(self, reply: Reply) -> Self {
        self.probe_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_post_reply(self, reply: Reply) -> Self {
        self.post_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }

    /// Get the number of times probe() was called
    pub fn probe_call_count(&self) -> usize {
        self.probe_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times post_entries() was called
    pub fn post_call_count(&self) -> usize {
        self.post_call_count.load(Ordering::SeqCst)
    }

    pub fn probe_requests(&self) -> Vec<CollectorRequest> {
        self.probe_requests.lock().unwrap().clone()
    }

    /// Posted bodies parsed as JSON
    pub fn posted_documents(&self) -> Vec<serde_json::Value> {
        self.posted_bodies
            .lock()
            .unwrap()
            .iter()
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect()
    }
}

#[async_trait::async_trait]
impl Collector for ScriptedCollector {
    async fn probe(&self, request: &CollectorRequest) -> Result<CollectorResponse> {
        self.probe_call_count.fetch_add(1, Ordering::SeqCst);
        self.probe_requests.lock().unwrap().push(request.clone());
        let reply = self.probe_replies.lock().unwrap().pop_front();

        tokio::time::sleep(self.probe_delay).await;
        reply.unwrap_or(Reply::Status(200, "")).into_result()
    }

    async fn post_entries(&self, _request: &CollectorRequest, body: Vec<u8>) -> Result<CollectorResponse> {
        self.post_call_count.fetch_add(1, Ordering::SeqCst);
        self.posted_bodies.lock().unwrap().push(body);
        let reply = self.post_replies.lock().unwrap().pop_front();

        tokio::time::sleep(self.post_delay).await;
        reply.unwrap_or(Reply::Status(200, "[]")).into_result()
    }

    fn collector_name(&self) -> &'static str {
        "scripted"
    }
}

/// A SettingsStore that counts writes per key and flushes
pub struct CountingSettingsStore {
    inner: MemorySettingsStore,
    watermark_set_count: AtomicUsize,
    flush_call_count: AtomicUsize,
}

impl CountingSettingsStore {
    pub fn new(inner: MemorySettingsStore) -> Self {
        Self {
            inner,
            watermark_set_count: AtomicUsize::new(0),
            flush_call_count: AtomicUsize::new(0),
        }
    }

    /// Get the number of watermark writes
    pub fn watermark_set_count(&self) -> usize {
        self.watermark_set_count.load(Ordering::SeqCst)
    }

    /// Get the number of times flush() was called
    pub fn flush_call_count(&self) -> usize {
        self.flush_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SettingsStore for CountingSettingsStore {
    async fn get(&self, key: SettingKey) -> Result<Option<SettingValue>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: SettingKey, value: Option<SettingValue>) -> Result<()> {
        if key == SettingKey::WatermarkTimestamp {
            self.watermark_set_count.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.set(key, value).await
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>> {
        self.inner.watch()
    }

    async fn flush(&self) -> Result<()> {
        self.flush_call_count.fetch_add(1, Ordering::SeqCst);
        self.inner.flush().await
    }
}

/// An AlertSink that records every presentation
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|(title, _)| title).collect()
    }
}

impl AlertSink for RecordingAlertSink {
    fn present(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Settings for an enabled primary instance with credentials
pub fn configured_store() -> MemorySettingsStore {
    MemorySettingsStore::from_values([
        (SettingKey::Enabled, SettingValue::Flag(true)),
        (SettingKey::Url, SettingValue::Text(ENDPOINT.to_string())),
        (SettingKey::ApiKey, SettingValue::Text(API_KEY.to_string())),
    ])
}

/// `count` readings, five minutes apart, the newest one minute ago
pub fn recent_readings(count: usize) -> Vec<Reading> {
    let newest = Utc::now() - ChronoDuration::minutes(1);
    (0..count)
        .map(|i| {
            let timestamp = newest - ChronoDuration::minutes(5 * i as i64);
            Reading::new(timestamp, 100.0 + i as f64)
        })
        .collect()
}

pub fn newest_timestamp(readings: &[Reading]) -> DateTime<Utc> {
    readings.iter().map(|r| r.timestamp).max().unwrap()
}

/// Helper to create a SyncConfig for testing
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.engine.event_channel_capacity = 100;
    config
}

/// Wait for the first event matching `predicate`, skipping others
pub async fn wait_for_event<F>(rx: &mut mpsc::Receiver<SyncEvent>, predicate: F) -> SyncEvent
where
    F: Fn(&SyncEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event should arrive within 5 seconds")
}

/// Drain events already queued without waiting
pub fn drain_events(rx: &mut mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
