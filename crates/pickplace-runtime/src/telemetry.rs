//! Tracing initialisation for the `pickplace` binary.
//!
//! [`init_tracing`] reads [`TelemetrySettings`] from the environment and
//! installs one subscriber: an `EnvFilter`, an optional OTLP span layer and a
//! console formatter.  Every frame runs inside the `process_frame` span
//! (fields `frame_id` and `scene`), so stage logs and exported spans of one
//! frame share a parent.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). Enables span export. |
//! | `RUST_LOG` | Log filter (default [`DEFAULT_FILTER`]). |
//! | `PICKPLACE_LOG_FORMAT` | `compact` (default), `json` or `pretty`. |
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = pickplace_runtime::telemetry::init_tracing("pickplace");
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.  Per-cluster and per-stage debug
/// lines stay hidden.
pub const DEFAULT_FILTER: &str = "info";

/// Instrumentation scope name of every exported span.
const TRACER_NAME: &str = "pickplace";

/// Console log layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

impl LogFormat {
    /// Unknown values fall back to [`LogFormat::Compact`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub service_name: String,
    pub filter: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl TelemetrySettings {
    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup(service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            service_name: service_name.to_string(),
            filter: non_empty("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            format: non_empty("PICKPLACE_LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
        }
    }
}

/// Install the global subscriber described by the environment.
///
/// The returned [`TracerProviderGuard`] must be held for the lifetime of the
/// process; dropping it flushes pending spans.  A second call leaves the
/// first subscriber in place.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_with(&TelemetrySettings::from_env(service_name))
}

pub fn init_with(settings: &TelemetrySettings) -> TracerProviderGuard {
    let filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|e| {
        eprintln!("[pickplace] invalid log filter {:?} ({e}), using {DEFAULT_FILTER:?}", settings.filter);
        EnvFilter::new(DEFAULT_FILTER)
    });
    let provider = settings.otlp_endpoint.as_deref().and_then(|endpoint| build_provider(&settings.service_name, endpoint));
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

    let (json, compact, pretty) = match settings.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None, None),
        LogFormat::Compact => (None, Some(tracing_subscriber::fmt::layer().compact()), None),
        LogFormat::Pretty => (None, None, Some(tracing_subscriber::fmt::layer().pretty())),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json)
        .with(compact)
        .with(pretty)
        .try_init()
    {
        eprintln!("[pickplace] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[pickplace] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// `None` when the exporter cannot be built; the error goes to stderr and
/// logging continues without export.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[pickplace] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new("service.namespace", "pickplace"))
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The CLI builds its Tokio runtime after this call, so no batch
            // task can be spawned yet.
            .with_simple_exporter(exporter)
            .build(),
    )
}
