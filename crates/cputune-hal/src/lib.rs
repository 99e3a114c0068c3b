//! `cputune-hal` – Hardware Abstraction Layer
//!
//! Everything the reconciliation engine needs from the outside world, behind
//! two traits so the engine can run against real hardware or a simulation.
//!
//! # Modules
//!
//! - [`register`] – [`RegisterAccessor`]: 64-bit register read/write.
//! - [`msr_device`] – [`MsrDevice`]: `/dev/cpu/<n>/msr` backend.
//! - [`directive`] – [`DirectiveSource`]: bounded byte reads of requested
//!   feature state, with the file-backed [`FileDirectiveSource`].
//! - [`cpu`] – [`CpuCapabilities`]: HWP detection from `/proc/cpuinfo`.
//! - [`sim`] – [`SimRegisterFile`] and [`SimDirectives`] for headless tests.

pub mod cpu;
pub mod directive;
#[cfg(unix)]
pub mod msr_device;
pub mod register;
pub mod sim;

pub use cpu::CpuCapabilities;
pub use directive::{DirectiveSource, FileDirectiveSource};
#[cfg(unix)]
pub use msr_device::MsrDevice;
pub use register::RegisterAccessor;
pub use sim::{RecordedWrite, SimDirectives, SimRegisterFile};
