//! [`ReconciliationEngine`] – keeps CPU power features in line with their
//! directives.
//!
//! The engine has four entry points, driven by the host in this order:
//!
//! 1. [`on_startup_capture`](ReconciliationEngine::on_startup_capture) –
//!    snapshot every managed register before anything is written.
//! 2. [`on_initial_apply`](ReconciliationEngine::on_initial_apply) – apply the
//!    configured startup intent once.
//! 3. [`on_tick`](ReconciliationEngine::on_tick) – called periodically by the
//!    [`ticker`](crate::ticker).  Reads each directive, compares it with the
//!    hardware, and writes only on a real difference.  Returns the period
//!    after which it wants to run again.
//! 4. [`on_shutdown_restore`](ReconciliationEngine::on_shutdown_restore) –
//!    write every captured register back to its original value.
//!
//! # Per-tick rules
//!
//! | Feature | Directive | Notes |
//! |---|---|---|
//! | Turbo Boost | 1 byte, `'1'` = on | unreadable counts as off |
//! | PROCHOT | 1 byte, `'1'` = on | disabling refused while Turbo Boost is on |
//! | HWP request | ≤ 10 bytes hex | HWP CPUs only; bad input is reported, not written |
//! | Speed Shift | 1 byte, `'1'` = on | HWP CPUs only; unreadable is skipped; never re-enabled after latching |
//!
//! Features are reconciled independently: a refusal, malformed directive or
//! register fault in one of them is reported and the rest of the tick still
//! runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cputune_hal::{CpuCapabilities, DirectiveSource, RegisterAccessor};
use cputune_kernel::{
    FeatureDescriptor, Interlock, LatchSet, OriginalSnapshot, PowerState, Transition, descriptor,
    managed_registers, write_if_changed,
};
use cputune_middleware::EventBus;
use cputune_types::{EventPayload, Feature, Msr, TuneError, TuneEvent};
use tracing::{debug, info, trace, warn};

use crate::directive::{HWP_DIRECTIVE_LEN, TOGGLE_DIRECTIVE_LEN, parse_hex_word, parse_toggle};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default tick period.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 5000;

/// Shortest period the engine will ask to be re-armed with.
const MIN_UPDATE_INTERVAL_MS: u64 = 1;

const EVENT_SOURCE: &str = "cputune-runtime::engine";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// What to do once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitialIntent {
    pub turbo_boost: bool,
    pub proc_hot: bool,
    pub speed_shift: bool,
}

/// Where each feature's runtime directive lives.  `None` disables runtime
/// control of that feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectivePaths {
    pub turbo_boost: Option<PathBuf>,
    pub proc_hot: Option<PathBuf>,
    pub speed_shift: Option<PathBuf>,
    pub hwp_request: Option<PathBuf>,
}

impl DirectivePaths {
    /// Directive handle configured for `feature`.
    pub fn for_feature(&self, feature: Feature) -> Option<&Path> {
        match feature {
            Feature::TurboBoost => self.turbo_boost.as_deref(),
            Feature::ProcHot => self.proc_hot.as_deref(),
            Feature::SpeedShift => self.speed_shift.as_deref(),
            Feature::HwpRequest => self.hwp_request.as_deref(),
        }
    }
}

/// Configuration bundle for [`ReconciliationEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub directives: DirectivePaths,
    /// Tick period in milliseconds.
    pub update_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directives: DirectivePaths::default(),
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interval control
// ─────────────────────────────────────────────────────────────────────────────

/// Shared, lock-free handle on the tick period.
///
/// Clones observe the same value.  A change takes effect the next time the
/// ticker re-arms, never in the middle of a pending sleep.
#[derive(Debug, Clone)]
pub struct IntervalControl(Arc<AtomicU64>);

impl IntervalControl {
    pub fn new(millis: u64) -> Self {
        Self(Arc::new(AtomicU64::new(millis.max(MIN_UPDATE_INTERVAL_MS))))
    }

    /// Set the period.  Zero is raised to one millisecond.
    pub fn set(&self, millis: u64) {
        self.0
            .store(millis.max(MIN_UPDATE_INTERVAL_MS), Ordering::Relaxed);
    }

    pub fn millis(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.millis())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Restore report
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of [`ReconciliationEngine::on_shutdown_restore`], per register in
/// restore order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Registers written back to their original value.
    pub restored: Vec<Msr>,
    /// Registers that already held their original value.
    pub unchanged: Vec<Msr>,
    /// Registers whose read or write failed.
    pub failed: Vec<(Msr, TuneError)>,
}

impl RestoreReport {
    /// `true` when no register failed to restore.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ReconciliationEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Owns all mutable engine state: the original snapshot, the latches and the
/// tick period.
///
/// # Example
///
/// ```rust
/// use cputune_hal::{CpuCapabilities, SimDirectives, SimRegisterFile};
/// use cputune_runtime::engine::{DirectivePaths, EngineConfig, ReconciliationEngine};
/// use cputune_types::msr;
///
/// let regs = SimRegisterFile::new().with_value(msr::IA32_MISC_ENABLE, 1 << 38);
/// let directives = SimDirectives::new();
/// directives.set("/run/cputune/turbo", "1");
///
/// let config = EngineConfig {
///     directives: DirectivePaths {
///         turbo_boost: Some("/run/cputune/turbo".into()),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// let mut engine = ReconciliationEngine::new(
///     regs.clone(),
///     directives,
///     CpuCapabilities::default(),
///     config,
/// );
///
/// engine.on_startup_capture();
/// engine.on_tick();
/// assert_eq!(regs.value(msr::IA32_MISC_ENABLE), Some(0));
///
/// engine.on_shutdown_restore();
/// assert_eq!(regs.value(msr::IA32_MISC_ENABLE), Some(1 << 38));
/// ```
pub struct ReconciliationEngine<R, D> {
    registers: R,
    directives: D,
    capabilities: CpuCapabilities,
    paths: DirectivePaths,
    interlock: Interlock,
    latches: LatchSet,
    original: Option<OriginalSnapshot>,
    interval: IntervalControl,
    bus: Option<EventBus>,
}

impl<R, D> ReconciliationEngine<R, D>
where
    R: RegisterAccessor,
    D: DirectiveSource,
{
    /// Create an engine.  Nothing is read or written until the first entry
    /// point is called.
    pub fn new(
        registers: R,
        directives: D,
        capabilities: CpuCapabilities,
        config: EngineConfig,
    ) -> Self {
        Self {
            registers,
            directives,
            capabilities,
            paths: config.directives,
            interlock: Interlock::with_default_rules(),
            latches: LatchSet::new(),
            original: None,
            interval: IntervalControl::new(config.update_interval_ms),
            bus: None,
        }
    }

    /// Publish register changes and diagnostics on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    // ── Entry points ─────────────────────────────────────────────────────────

    /// Snapshot every register a supported feature touches, plus
    /// `IA32_PERF_CTL`.  Only the first call reads anything.
    pub fn on_startup_capture(&mut self) -> &OriginalSnapshot {
        if self.original.is_some() {
            debug!("original register state already captured");
        } else {
            let registers = managed_registers(self.capabilities.hwp);
            let snapshot = OriginalSnapshot::capture(&mut self.registers, &registers);
            info!(
                captured = snapshot.len(),
                expected = registers.len(),
                "captured original register state"
            );
            self.original = Some(snapshot);
        }
        self.original.get_or_insert_with(OriginalSnapshot::default)
    }

    /// Apply the startup intent.
    pub fn on_initial_apply(&mut self, intent: &InitialIntent) {
        self.ensure_captured();

        self.apply_intent(Feature::TurboBoost, intent.turbo_boost);

        if intent.proc_hot {
            self.apply_intent(Feature::ProcHot, true);
        } else if !intent.turbo_boost {
            self.apply_intent(Feature::ProcHot, false);
        } else {
            self.report(&TuneError::UnsafeTransition {
                feature: Feature::ProcHot,
                details: "cannot deactivate PROCHOT while turboboost is active".to_string(),
            });
        }

        if !self.supports(Feature::SpeedShift) {
            self.diagnostic(
                Some(Feature::SpeedShift),
                format!(
                    "cpu model (0x{:x}) does not support {}",
                    self.capabilities.model,
                    Feature::SpeedShift
                ),
            );
        } else if intent.speed_shift {
            self.apply_intent(Feature::SpeedShift, true);
        }
    }

    /// Run one reconciliation pass and return the period to re-arm with.
    pub fn on_tick(&mut self) -> Duration {
        self.ensure_captured();
        for feature in Feature::ALL {
            let outcome = match feature {
                Feature::TurboBoost | Feature::ProcHot => self.reconcile_toggle(feature),
                Feature::HwpRequest => self.reconcile_hwp_request(),
                Feature::SpeedShift => self.reconcile_speed_shift(),
            };
            if let Err(e) = outcome {
                self.report(&e);
            }
        }
        self.interval.period()
    }

    /// Write every captured register back to its original value.
    ///
    /// Each register is handled on its own; a failure is logged and recorded
    /// in the report, and the remaining registers are still restored.
    pub fn on_shutdown_restore(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let Some(original) = self.original.clone() else {
            warn!("no original register state captured; nothing to restore");
            return report;
        };

        for register in managed_registers(self.capabilities.hwp) {
            let Some(value) = original.get(register) else {
                continue;
            };
            let outcome = self.registers.read(register).and_then(|current| {
                write_if_changed(&mut self.registers, register, current, value)
                    .map(|wrote| (current, wrote))
            });
            match outcome {
                Ok((current, true)) => {
                    info!(
                        %register,
                        from = format_args!("0x{current:x}"),
                        to = format_args!("0x{value:x}"),
                        "restored original value"
                    );
                    self.notify(EventPayload::RegisterRestored {
                        register,
                        from: current,
                        to: value,
                    });
                    report.restored.push(register);
                }
                Ok((_, false)) => report.unchanged.push(register),
                Err(e) => {
                    warn!(%register, error = %e, "restore failed");
                    report.failed.push((register, e));
                }
            }
        }
        report
    }

    /// Change the tick period; effective from the next re-arm.
    pub fn set_schedule_interval(&self, millis: u64) {
        self.interval.set(millis);
        debug!(interval_ms = self.interval.millis(), "tick interval updated");
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// A handle that can change the tick period from elsewhere.
    pub fn interval_control(&self) -> IntervalControl {
        self.interval.clone()
    }

    pub fn tick_interval(&self) -> Duration {
        self.interval.period()
    }

    pub fn original(&self) -> Option<&OriginalSnapshot> {
        self.original.as_ref()
    }

    pub fn is_latched(&self, feature: Feature) -> bool {
        self.latches.is_fired(feature)
    }

    // ── Per-feature reconciliation ───────────────────────────────────────────

    /// Turbo Boost and PROCHOT.
    fn reconcile_toggle(&mut self, feature: Feature) -> Result<(), TuneError> {
        let Some(path) = self.paths.for_feature(feature) else {
            return Ok(());
        };
        let requested = parse_toggle(
            self.directives
                .read_bytes(path, 0, TOGGLE_DIRECTIVE_LEN)
                .as_deref(),
        );

        let desc = descriptor(feature);
        let current = self.registers.read(desc.register)?;
        if requested == self.observed_enabled(desc, current) {
            trace!(%feature, requested, "directive unchanged");
            return Ok(());
        }
        info!(%feature, requested, "directive changed");
        self.apply_transition(Transition { feature, enable: requested }, current)?;
        Ok(())
    }

    fn reconcile_hwp_request(&mut self) -> Result<(), TuneError> {
        let feature = Feature::HwpRequest;
        if !self.supports(feature) {
            return Ok(());
        }
        let Some(path) = self.paths.for_feature(feature) else {
            return Ok(());
        };
        let Some(bytes) = self.directives.read_bytes(path, 0, HWP_DIRECTIVE_LEN) else {
            trace!(%feature, "directive unreadable; skipped");
            return Ok(());
        };
        let requested = parse_hex_word(&bytes)?;

        let register = descriptor(feature).register;
        let current = self.registers.read(register)?;
        if write_if_changed(&mut self.registers, register, current, requested)? {
            self.record_change(feature, register, current, requested);
        }
        Ok(())
    }

    fn reconcile_speed_shift(&mut self) -> Result<(), TuneError> {
        let feature = Feature::SpeedShift;
        if self.latches.is_fired(feature) || !self.supports(feature) {
            return Ok(());
        }
        let Some(path) = self.paths.for_feature(feature) else {
            return Ok(());
        };
        let Some(bytes) = self.directives.read_bytes(path, 0, TOGGLE_DIRECTIVE_LEN) else {
            trace!(%feature, "directive unreadable; skipped");
            return Ok(());
        };
        let requested = parse_toggle(Some(bytes.as_slice()));

        let desc = descriptor(feature);
        let current = self.registers.read(desc.register)?;
        if requested == desc.is_enabled(current) {
            return Ok(());
        }
        info!(%feature, requested, "directive changed");
        self.apply_transition(Transition { feature, enable: requested }, current)?;
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Whether `feature` can be managed on this CPU.
    fn supports(&self, feature: Feature) -> bool {
        !descriptor(feature).requires_hwp || self.capabilities.hwp
    }

    fn ensure_captured(&mut self) {
        if self.original.is_none() {
            self.on_startup_capture();
        }
    }

    /// Whether `feature` counts as enabled given the raw `current` value.
    ///
    /// Turbo Boost is on only while its register equals the captured
    /// baseline with the enable transform applied.
    fn observed_enabled(&self, desc: &FeatureDescriptor, current: u64) -> bool {
        if desc.feature != Feature::TurboBoost {
            return desc.is_enabled(current);
        }
        match self.original.as_ref().and_then(|s| s.get(desc.register)) {
            Some(baseline) => desc.target(baseline, true) == Some(current),
            None => desc.is_enabled(current),
        }
    }

    fn apply_intent(&mut self, feature: Feature, enable: bool) {
        let register = descriptor(feature).register;
        let outcome = self
            .registers
            .read(register)
            .and_then(|current| self.apply_transition(Transition { feature, enable }, current));
        if let Err(e) = outcome {
            self.report(&e);
        }
    }

    /// Apply `transition` to a toggle feature whose register currently holds
    /// `current`.  Returns whether a write was issued.
    fn apply_transition(&mut self, transition: Transition, current: u64) -> Result<bool, TuneError> {
        let feature = transition.feature;
        if !self.supports(feature) {
            return Err(TuneError::Unsupported(feature));
        }
        if transition.enable && self.latches.is_fired(feature) {
            debug!(%feature, "already latched; enable skipped");
            return Ok(false);
        }
        if self.interlock.guards(&transition) {
            let state = self.power_state()?;
            self.interlock.verify(&transition, &state)?;
        }

        let desc = descriptor(feature);
        let Some(target) = desc.target(current, transition.enable) else {
            return Ok(false);
        };
        let wrote = write_if_changed(&mut self.registers, desc.register, current, target)?;
        if wrote {
            self.record_change(feature, desc.register, current, target);
        } else {
            debug!(%feature, enable = transition.enable, "register already in requested state");
        }

        if transition.enable && self.latches.fire(feature) {
            info!(%feature, "latched until next reset");
        }
        Ok(wrote)
    }

    fn power_state(&mut self) -> Result<PowerState, TuneError> {
        let turbo = descriptor(Feature::TurboBoost);
        let raw = self.registers.read(turbo.register)?;
        Ok(PowerState {
            turbo_enabled: turbo.is_enabled(raw),
        })
    }

    fn record_change(&self, feature: Feature, register: Msr, from: u64, to: u64) {
        info!(
            %feature,
            %register,
            from = format_args!("0x{from:x}"),
            to = format_args!("0x{to:x}"),
            "register changed"
        );
        self.notify(EventPayload::RegisterChanged {
            feature: Some(feature),
            register,
            from,
            to,
        });
    }

    fn report(&self, error: &TuneError) {
        let feature = match error {
            TuneError::Unsupported(feature)
            | TuneError::UnsafeTransition { feature, .. }
            | TuneError::MalformedDirective { feature, .. } => Some(*feature),
            _ => None,
        };
        self.diagnostic(feature, error.to_string());
    }

    fn diagnostic(&self, feature: Option<Feature>, message: String) {
        warn!(feature = ?feature, "{message}");
        self.notify(EventPayload::Diagnostic { feature, message });
    }

    fn notify(&self, payload: EventPayload) {
        if let Some(bus) = &self.bus {
            // Nobody listening is fine.
            let _ = bus.publish(TuneEvent::new(EVENT_SOURCE, payload));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
