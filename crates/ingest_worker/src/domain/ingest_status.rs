use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time view of the ingestion worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatus {
    pub connected: bool,
    /// `host:port` of the broker
    pub broker: String,
    pub topic: String,
    pub messages_processed: u64,
    pub tls_enabled: bool,
    pub authenticated: bool,
}

#[derive(Debug)]
struct IngestStatusInner {
    connected: AtomicBool,
    messages_processed: AtomicU64,
    broker: String,
    topic: String,
    tls_enabled: bool,
    authenticated: bool,
}

/// Cheap, cloneable handle shared between the worker loop and status readers
#[derive(Debug, Clone)]
pub struct IngestStatusHandle {
    inner: Arc<IngestStatusInner>,
}

impl IngestStatusHandle {
    pub fn new(broker: String, topic: String, tls_enabled: bool, authenticated: bool) -> Self {
        Self {
            inner: Arc::new(IngestStatusInner {
                connected: AtomicBool::new(false),
                messages_processed: AtomicU64::new(0),
                broker,
                topic,
                tls_enabled,
                authenticated,
            }),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Relaxed);
    }

    /// Count one committed message; returns the new total
    pub fn record_processed(&self) -> u64 {
        self.inner.messages_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    pub fn messages_processed(&self) -> u64 {
        self.inner.messages_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> IngestStatus {
        IngestStatus {
            connected: self.is_connected(),
            broker: self.inner.broker.clone(),
            topic: self.inner.topic.clone(),
            messages_processed: self.messages_processed(),
            tls_enabled: self.inner.tls_enabled,
            authenticated: self.inner.authenticated,
        }
    }
}
