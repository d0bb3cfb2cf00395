//! OpenTelemetry metrics.
//!
//! Key metrics:
//! - spillway_flush_total: Counter of applied batches
//! - spillway_flushed_writes_total: Counter of writes in applied batches
//! - spillway_flush_latency_seconds: Histogram of store write latency
//! - spillway_flush_failures_total: Counter of batches the store rejected
//! - spillway_dropped_writes_total: Counter of writes in rejected batches
//! - spillway_submit_rejected_total: Counter of rejected submits by reason

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

use crate::notify::FlushTrigger;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Spillway metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Batches applied to the store.
    pub flush_total: Counter<u64>,
    /// Writes contained in applied batches.
    pub flushed_writes: Counter<u64>,
    /// Store write latency per batch, in seconds.
    pub flush_latency: Histogram<f64>,
    /// Batches the store rejected (and that were dropped).
    pub flush_failures: Counter<u64>,
    /// Writes contained in rejected batches.
    pub dropped_writes: Counter<u64>,
    /// Submits rejected before reaching the queue.
    pub submit_rejected: Counter<u64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            flush_total: meter
                .u64_counter("spillway_flush_total")
                .with_description("Number of batches applied to the store")
                .with_unit("1")
                .init(),
            flushed_writes: meter
                .u64_counter("spillway_flushed_writes_total")
                .with_description("Number of writes in applied batches")
                .with_unit("1")
                .init(),
            flush_latency: meter
                .f64_histogram("spillway_flush_latency_seconds")
                .with_description("Time spent in the store's batch write")
                .with_unit("s")
                .init(),
            flush_failures: meter
                .u64_counter("spillway_flush_failures_total")
                .with_description("Number of batches rejected by the store")
                .with_unit("1")
                .init(),
            dropped_writes: meter
                .u64_counter("spillway_dropped_writes_total")
                .with_description("Number of writes in batches rejected by the store")
                .with_unit("1")
                .init(),
            submit_rejected: meter
                .u64_counter("spillway_submit_rejected_total")
                .with_description("Number of submits rejected (queue full or not running)")
                .with_unit("1")
                .init(),
        }
    }

    fn flush_failed(&self, trigger: FlushTrigger, len: usize) {
        let attrs = [trigger_attr(trigger)];
        self.flush_failures.add(1, &attrs);
        self.dropped_writes.add(len as u64, &attrs);
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    install_manual_provider();
                }
            }
        } else {
            // Recorded but not exported
            install_manual_provider();
        }

        let meter = global::meter("spillway");
        Metrics::new(&meter)
    });
}

fn install_manual_provider() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

fn trigger_attr(trigger: FlushTrigger) -> KeyValue {
    let name = match trigger {
        FlushTrigger::Size => "size",
        FlushTrigger::Timer => "timer",
        FlushTrigger::Shutdown => "shutdown",
    };
    KeyValue::new("trigger", name)
}

/// Record a batch the store accepted.
pub fn record_flush(trigger: FlushTrigger, len: usize, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [trigger_attr(trigger)];
        m.flush_total.add(1, &attrs);
        m.flushed_writes.add(len as u64, &attrs);
        m.flush_latency.record(latency_seconds, &attrs);
    }
}

/// Record a batch the store rejected.
pub fn record_flush_failure(trigger: FlushTrigger, len: usize) {
    if let Some(m) = METRICS.get() {
        m.flush_failed(trigger, len);
    }
}

/// Record a rejected submit.
pub fn record_submit_rejected(reason: &'static str) {
    if let Some(m) = METRICS.get() {
        m.submit_rejected.add(1, &[KeyValue::new("reason", reason)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::data::{ResourceMetrics, Sum, Temporality};
    use opentelemetry_sdk::metrics::reader::{MetricReader, TemporalitySelector};
    use opentelemetry_sdk::metrics::{InstrumentKind, Pipeline};
    use opentelemetry_sdk::Resource;
    use std::sync::{Arc, Weak};

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
        assert!(metrics().is_some());
    }

    #[test]
    fn test_record_flush() {
        init_metrics();
        // Should not panic
        record_flush(FlushTrigger::Size, 10, 0.001);
        record_flush(FlushTrigger::Timer, 3, 0.002);
    }

    #[test]
    fn test_flush_failure_series_keyed_by_trigger_only() {
        let reader = SharedReader::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let m = Metrics::new(&provider.meter("test"));

        m.flush_failed(FlushTrigger::Shutdown, 4);
        m.flush_failed(FlushTrigger::Shutdown, 7);

        let mut rm = ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: vec![],
        };
        reader.collect(&mut rm).unwrap();

        let sum = |name: &str| -> Vec<(Vec<KeyValue>, u64)> {
            rm.scope_metrics
                .iter()
                .flat_map(|scope| scope.metrics.iter())
                .find(|metric| metric.name == name)
                .and_then(|metric| metric.data.as_any().downcast_ref::<Sum<u64>>())
                .map(|sum| {
                    sum.data_points
                        .iter()
                        .map(|dp| (dp.attributes.clone(), dp.value))
                        .collect()
                })
                .unwrap_or_default()
        };

        let shutdown = vec![trigger_attr(FlushTrigger::Shutdown)];
        assert_eq!(sum("spillway_flush_failures_total"), vec![(shutdown.clone(), 2)]);
        assert_eq!(sum("spillway_dropped_writes_total"), vec![(shutdown, 11)]);
    }

    /// Lets the test keep a handle on the reader it gives the provider.
    #[derive(Debug, Clone, Default)]
    struct SharedReader(Arc<ManualReader>);

    impl TemporalitySelector for SharedReader {
        fn temporality(&self, kind: InstrumentKind) -> Temporality {
            self.0.temporality(kind)
        }
    }

    impl MetricReader for SharedReader {
        fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
            self.0.register_pipeline(pipeline)
        }

        fn collect(&self, rm: &mut ResourceMetrics) -> opentelemetry::metrics::Result<()> {
            self.0.collect(rm)
        }

        fn force_flush(&self) -> opentelemetry::metrics::Result<()> {
            self.0.force_flush()
        }

        fn shutdown(&self) -> opentelemetry::metrics::Result<()> {
            self.0.shutdown()
        }
    }

    #[test]
    fn test_record_failures_and_rejections() {
        init_metrics();
        // Should not panic
        record_flush_failure(FlushTrigger::Shutdown, 4);
        record_submit_rejected("queue_full");
    }
}
