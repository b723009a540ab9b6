//! Metrics collection for the Concord document engine
//!
//! Prometheus metrics grouped by concern, registered once in the default
//! registry and exposed through the `/metrics` endpoint. Histograms use
//! exponential bucketing; collection is designed for negligible overhead
//! on the hot submit path.

use crate::core::error::Result;
use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram, register_int_counter, register_int_gauge,
    Histogram, IntCounter, IntGauge,
};
use std::time::Instant;

/// Connection lifecycle metrics
pub struct ConnectionMetrics {
    /// Total accepted connections
    pub total: IntCounter,
    /// Transport and protocol failures
    pub errors: IntCounter,
    /// Currently open connections
    pub active: IntGauge,
    /// Connection duration in seconds
    pub duration: Histogram,
}

/// Per-document lifecycle metrics
pub struct DocumentMetrics {
    /// Documents created empty
    pub created: IntCounter,
    /// Documents restored from storage
    pub restored: IntCounter,
    /// Documents evicted while idle
    pub evicted: IntCounter,
    /// Documents currently resident
    pub active: IntGauge,
    /// Snapshot read latency in seconds
    pub snapshot_latency: Histogram,
}

/// Transaction pipeline metrics
pub struct TransactionMetrics {
    /// Successfully applied transactions
    pub processed: IntCounter,
    /// Rejected transactions (validation, duplicates, storage)
    pub rejected: IntCounter,
    /// Submit latency in seconds, lock to broadcast
    pub latency: Histogram,
}

/// Storage adapter metrics
pub struct StorageMetrics {
    /// Snapshots written to cold storage
    pub snapshots: IntCounter,
    /// Write-ahead log appends
    pub wal_appends: IntCounter,
    /// Version gaps detected during WAL replay
    pub version_gaps: IntCounter,
    /// WAL entries that failed to replay
    pub wal_load_failures: IntCounter,
    /// Cold snapshot loads that failed
    pub cold_load_failures: IntCounter,
}

/// Presence channel metrics
pub struct PresenceMetrics {
    /// Presence upserts
    pub updates: IntCounter,
    /// Presence entries currently held
    pub active: IntGauge,
}

/// Centralized metrics collection
pub struct Metrics {
    /// Connection lifecycle
    pub connections: ConnectionMetrics,
    /// Document lifecycle
    pub documents: DocumentMetrics,
    /// Transaction pipeline
    pub transactions: TransactionMetrics,
    /// Storage adapters
    pub storage: StorageMetrics,
    /// Presence channel
    pub presence: PresenceMetrics,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self> {
        Ok(Self {
            connections: ConnectionMetrics::new()?,
            documents: DocumentMetrics::new()?,
            transactions: TransactionMetrics::new()?,
            storage: StorageMetrics::new()?,
            presence: PresenceMetrics::new()?,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> =
            Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
        &INSTANCE
    }
}

impl ConnectionMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            total: register_int_counter!(
                "concord_connections_total",
                "Total number of accepted connections"
            )?,
            errors: register_int_counter!(
                "concord_connection_errors_total",
                "Total number of connection-level errors"
            )?,
            active: register_int_gauge!(
                "concord_connections_active",
                "Number of currently open connections"
            )?,
            duration: register_histogram!(
                "concord_connection_duration_seconds",
                "Connection lifetime in seconds",
                exponential_buckets(0.1, 2.0, 16)?
            )?,
        })
    }
}

impl DocumentMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            created: register_int_counter!(
                "concord_documents_created_total",
                "Documents created empty"
            )?,
            restored: register_int_counter!(
                "concord_documents_restored_total",
                "Documents restored from storage"
            )?,
            evicted: register_int_counter!(
                "concord_documents_evicted_total",
                "Documents evicted while idle"
            )?,
            active: register_int_gauge!(
                "concord_documents_active",
                "Documents currently resident in memory"
            )?,
            snapshot_latency: register_histogram!(
                "concord_snapshot_latency_seconds",
                "Snapshot read latency in seconds",
                exponential_buckets(0.000_05, 2.0, 14)?
            )?,
        })
    }
}

impl TransactionMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            processed: register_int_counter!(
                "concord_transactions_processed_total",
                "Successfully applied transactions"
            )?,
            rejected: register_int_counter!(
                "concord_transactions_rejected_total",
                "Rejected transactions"
            )?,
            latency: register_histogram!(
                "concord_transaction_latency_seconds",
                "Submit latency from lock to broadcast in seconds",
                exponential_buckets(0.000_05, 2.0, 14)?
            )?,
        })
    }
}

impl StorageMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            snapshots: register_int_counter!(
                "concord_storage_snapshots_total",
                "Snapshots written to cold storage"
            )?,
            wal_appends: register_int_counter!(
                "concord_storage_wal_appends_total",
                "Write-ahead log appends"
            )?,
            version_gaps: register_int_counter!(
                "concord_storage_version_gaps_total",
                "Version gaps detected during WAL replay"
            )?,
            wal_load_failures: register_int_counter!(
                "concord_storage_wal_load_failures_total",
                "WAL entries that failed to replay"
            )?,
            cold_load_failures: register_int_counter!(
                "concord_storage_cold_load_failures_total",
                "Cold snapshot loads that failed"
            )?,
        })
    }
}

impl PresenceMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            updates: register_int_counter!(
                "concord_presence_updates_total",
                "Presence upserts"
            )?,
            active: register_int_gauge!(
                "concord_presence_active",
                "Presence entries currently held"
            )?,
        })
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    /// Start a new timer
    pub fn start(histogram: Histogram) -> Self {
        Self { start: Instant::now(), histogram }
    }

    /// Record the elapsed time and consume the timer
    pub fn finish(self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Initialize the metrics registry
pub fn init_registry() {
    // Force registration of all metric families
    let _ = Metrics::global();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default()
}
