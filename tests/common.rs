#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sealbatch::{
    CompressionAdapter, ContentRef, Digest, Engine, EngineConfig, MessageType, NetworkError,
    NetworkReceipt, Record, RecordKind,
};

pub const HASH_REF: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

pub fn text_record(sender: &str, created_ms: u64) -> Record {
    Record::new(
        RecordKind::ChannelMessage(MessageType::Text),
        "general",
        sender,
        ContentRef::new(HASH_REF),
        created_ms,
    )
}

pub fn numbered_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| text_record(&format!("producer-{}", i), 1_700_000_000_000 + i as u64))
        .collect()
}

/// Config whose time trigger never fires during a test.
pub fn size_only_config(max_batch_size: usize) -> EngineConfig {
    EngineConfig {
        max_batch_size,
        batch_timeout: Duration::from_secs(3600),
        ..EngineConfig::default()
    }
}

pub fn engine_with(config: EngineConfig, adapter: Arc<dyn CompressionAdapter>) -> Engine {
    Engine::new(config, adapter).expect("start engine")
}

// =============================================================================
// Adapters
// =============================================================================

/// Replays scripted responses, then accepts everything.
#[derive(Default)]
pub struct ScriptedAdapter {
    script: Mutex<VecDeque<Result<NetworkReceipt, NetworkError>>>,
    calls: Mutex<Vec<(Digest, usize)>>,
}

impl ScriptedAdapter {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<Result<NetworkReceipt, NetworkError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(Digest, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompressionAdapter for ScriptedAdapter {
    async fn submit(&self, root: &Digest, leaf_count: usize) -> Result<NetworkReceipt, NetworkError> {
        self.calls.lock().unwrap().push((*root, leaf_count));
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(NetworkReceipt::new(format!("sig-{}", root))))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Accepts after a fixed delay and tracks how many calls overlap.
pub struct SlowAdapter {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowAdapter {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompressionAdapter for SlowAdapter {
    async fn submit(&self, root: &Digest, _leaf_count: usize) -> Result<NetworkReceipt, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(NetworkReceipt::new(format!("slow-{}", root)))
    }
}

// =============================================================================
// Polling
// =============================================================================

pub async fn eventually<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(interval).await;
    }
}
