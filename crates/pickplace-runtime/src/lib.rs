//! `pickplace-runtime` – runs frames through the perception pipeline.
//!
//! # Modules
//!
//! - [`context`] – [`PipelineContext`]: configuration, classifier, arm
//!   policy, parameter source and manifest writer, built once and shared
//!   read-only by every frame.
//! - [`params`] – the [`ParameterSource`] capability supplying the pick list
//!   and drop table per frame.
//! - [`pipeline`] – [`process_frame`]: one frame from raw cloud to manifest,
//!   publishing intermediate results on the bus.
//! - [`dispatcher`] – [`FrameDispatcher`]: pulls frames off
//!   [`Topic::SensorFrames`][pickplace_middleware::Topic::SensorFrames] and
//!   isolates failures to the frame that caused them.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod context;
pub mod dispatcher;
pub mod params;
pub mod pipeline;
pub mod telemetry;

pub use context::{MarkerConfig, PipelineConfig, PipelineContext};
pub use dispatcher::{DispatchStats, FrameDispatcher};
pub use params::{ParamError, ParameterSource, StaticParams, TomlParamFile};
pub use pipeline::process_frame;
pub use telemetry::{TracerProviderGuard, init_tracing};
