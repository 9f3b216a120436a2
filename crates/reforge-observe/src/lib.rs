//! Observability setup for Reforge: the tracing subscriber and the optional
//! OpenTelemetry bridge.

pub mod tracing_setup;
