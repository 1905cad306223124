//! OpenTelemetry counters for the stream controller.
//!
//! Counters are created on the global meter, which is a no-op until a meter
//! provider is installed. With the `otlp` feature, [`init_metrics`] installs
//! one that exports over OTLP/gRPC.

use std::fmt;

use opentelemetry::{
    global,
    metrics::{Counter, Meter},
};

/// Instrumentation scope name.
pub const METER_NAME: &str = "fleet-stream";

/// Counters recorded by the controller.
#[derive(Clone)]
pub struct StreamMetrics {
    pub sessions_opened: Counter<u64>,
    pub snapshots_decoded: Counter<u64>,
    pub decode_failures: Counter<u64>,
    pub server_errors: Counter<u64>,
    pub transport_failures: Counter<u64>,
    pub retries_scheduled: Counter<u64>,
    pub reconnects_requested: Counter<u64>,
}

impl StreamMetrics {
    /// Counters on the global meter.
    pub fn new() -> Self {
        Self::from_meter(&global::meter(METER_NAME))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            sessions_opened: meter
                .u64_counter("fleet_stream.sessions_opened")
                .with_description("Transport sessions started")
                .build(),
            snapshots_decoded: meter
                .u64_counter("fleet_stream.snapshots_decoded")
                .with_description("Snapshot events decoded successfully")
                .build(),
            decode_failures: meter
                .u64_counter("fleet_stream.decode_failures")
                .with_description("Snapshot events that failed to decode")
                .build(),
            server_errors: meter
                .u64_counter("fleet_stream.server_errors")
                .with_description("Error events sent by the producer")
                .build(),
            transport_failures: meter
                .u64_counter("fleet_stream.transport_failures")
                .with_description("Sessions ended by a transport failure")
                .build(),
            retries_scheduled: meter
                .u64_counter("fleet_stream.retries_scheduled")
                .with_description("Backoff retries scheduled")
                .build(),
            reconnects_requested: meter
                .u64_counter("fleet_stream.reconnects_requested")
                .with_description("Manual reconnects requested by consumers")
                .build(),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamMetrics").finish_non_exhaustive()
    }
}

/// Install a global meter provider exporting to the OTLP collector at
/// `endpoint` every 15 seconds.
///
/// Keep the returned provider alive and call `shutdown` on it before exit to
/// flush pending data points.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built.
#[cfg(feature = "otlp")]
pub fn init_metrics(
    endpoint: &str,
) -> crate::error::StreamResult<opentelemetry_sdk::metrics::SdkMeterProvider> {
    use std::time::Duration;

    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| {
            crate::error::StreamError::config(format!("Failed to create OTLP metrics exporter: {e}"))
        })?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(15))
        .build();

    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider.clone());

    Ok(provider)
}
