//! `cputune-middleware` – Event routing
//!
//! Carries register-change notifications and diagnostics from the
//! reconciliation engine to whoever wants them (the CLI log view, tests)
//! without the engine knowing who is listening.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
