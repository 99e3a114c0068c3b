//! `cputune-runtime` – The reconciliation loop
//!
//! Where directives meet hardware: the engine that decides which register
//! writes a tick needs, and the Tokio ticker that drives it.
//!
//! # Modules
//!
//! - [`engine`] – [`ReconciliationEngine`][engine::ReconciliationEngine]:
//!   startup capture, initial apply, the periodic tick and shutdown restore,
//!   with every write funnelled through the kernel's
//!   [`write_if_changed`][cputune_kernel::write_if_changed] and
//!   [`Interlock`][cputune_kernel::Interlock].
//! - [`directive`] – decoding of toggle bytes and the hexadecimal HWP request
//!   word.
//! - [`ticker`] – [`spawn`][ticker::spawn] runs the engine on a Tokio task and
//!   returns a [`TickerHandle`][ticker::TickerHandle] for changing the period
//!   and cancelling.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber (compact or JSON) with an
//!   optional OTLP span exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to
//!   enable trace export to any OTLP-compatible collector.

pub mod directive;
pub mod engine;
pub mod telemetry;
pub mod ticker;

pub use directive::{parse_hex_word, parse_toggle};
pub use engine::{
    DirectivePaths, EngineConfig, InitialIntent, IntervalControl, ReconciliationEngine,
    RestoreReport,
};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
pub use ticker::TickerHandle;
