//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing via tracing-subscriber (text or JSON)
//! - OpenTelemetry metrics for flushes and rejected submits

pub mod metrics;
pub mod tracing;
