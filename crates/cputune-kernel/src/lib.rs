//! `cputune-kernel` – Feature model & safety rules
//!
//! The part of CPUTune that knows what the registers mean and which changes
//! are allowed.  It does not schedule anything; the runtime's
//! reconciliation engine drives it.
//!
//! # Modules
//!
//! - [`descriptor`] – [`FeatureDescriptor`][descriptor::FeatureDescriptor]:
//!   static register address, enable/disable transforms and comparison
//!   policy of every [`Feature`][cputune_types::Feature].
//! - [`write_guard`] – [`write_if_changed`][write_guard::write_if_changed]:
//!   the only path through which registers are mutated.
//! - [`interlock`] – [`Interlock`][interlock::Interlock]: ordering rules
//!   between features (PROCHOT may not be disabled under Turbo Boost).
//! - [`latch`] – [`LatchSet`][latch::LatchSet]: write-once bits that must
//!   never be enabled twice.
//! - [`snapshot`] – [`OriginalSnapshot`][snapshot::OriginalSnapshot]: the
//!   register values captured at startup, restored at shutdown.

pub mod descriptor;
pub mod interlock;
pub mod latch;
pub mod snapshot;
pub mod write_guard;

pub use descriptor::{
    ComparisonPolicy, Control, FeatureDescriptor, Transform, descriptor, managed_registers,
};
pub use interlock::{Interlock, PowerState, ProcHotInterlock, Rule, Transition};
pub use latch::LatchSet;
pub use snapshot::OriginalSnapshot;
pub use write_guard::write_if_changed;
