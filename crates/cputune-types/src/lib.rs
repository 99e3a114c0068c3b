use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Model-specific register addresses touched by CPUTune.
///
/// Values follow the Intel SDM, volume 4.
pub mod msr {
    use super::Msr;

    /// Miscellaneous feature enables; bit 38 is the Turbo Mode *disable* bit.
    pub const IA32_MISC_ENABLE: Msr = Msr(0x1A0);
    /// Performance state control (target P-state).
    pub const IA32_PERF_CTL: Msr = Msr(0x199);
    /// Power control; bit 0 enables bi-directional PROCHOT.
    pub const MSR_POWER_CTL: Msr = Msr(0x1FC);
    /// Hardware P-state package enable; bit 0 is write-once until reset.
    pub const IA32_PM_ENABLE: Msr = Msr(0x770);
    /// Hardware P-state request (min/max/desired/EPP configuration word).
    pub const IA32_HWP_REQUEST: Msr = Msr(0x774);
}

/// A model-specific register address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Msr(pub u32);

impl Msr {
    /// Human-readable register name for log output.
    pub fn name(self) -> &'static str {
        match self {
            msr::IA32_MISC_ENABLE => "IA32_MISC_ENABLE",
            msr::IA32_PERF_CTL => "IA32_PERF_CTL",
            msr::MSR_POWER_CTL => "MSR_POWER_CTL",
            msr::IA32_PM_ENABLE => "IA32_PM_ENABLE",
            msr::IA32_HWP_REQUEST => "IA32_HWP_REQUEST",
            _ => "MSR",
        }
    }
}

impl fmt::Display for Msr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:x})", self.name(), self.0)
    }
}

/// The closed set of power controls managed by CPUTune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Intel Turbo Boost.
    TurboBoost,
    /// Bi-directional PROCHOT.
    ProcHot,
    /// Intel Speed Shift (HWP package enable).
    SpeedShift,
    /// HWP request configuration word.
    HwpRequest,
}

impl Feature {
    /// Every feature, in reconciliation order.
    pub const ALL: [Feature; 4] = [
        Feature::TurboBoost,
        Feature::ProcHot,
        Feature::HwpRequest,
        Feature::SpeedShift,
    ];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::TurboBoost => write!(f, "Intel Turbo Boost"),
            Feature::ProcHot => write!(f, "Intel Proc Hot"),
            Feature::SpeedShift => write!(f, "Intel Speed Shift"),
            Feature::HwpRequest => write!(f, "HWP Request"),
        }
    }
}

/// Notification emitted by the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "cputune-runtime::engine"
    pub source: String,
    pub payload: EventPayload,
}

impl TuneEvent {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// A register write was issued.
    RegisterChanged {
        feature: Option<Feature>,
        register: Msr,
        from: u64,
        to: u64,
    },
    /// A register was written back to its startup value.
    RegisterRestored { register: Msr, from: u64, to: u64 },
    /// A diagnostic that did not change hardware state.
    Diagnostic {
        feature: Option<Feature>,
        message: String,
    },
}

/// Global error type spanning register access, directive parsing and safety
/// refusals.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TuneError {
    #[error("Feature not supported on this CPU: {0}")]
    Unsupported(Feature),

    #[error("Unsafe transition refused for {feature}: {details}")]
    UnsafeTransition { feature: Feature, details: String },

    #[error("Malformed directive for {feature}: {details}")]
    MalformedDirective { feature: Feature, details: String },

    #[error("Register access failed on {register}: {details}")]
    RegisterAccess { register: Msr, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event channel error: {0}")]
    Channel(String),

    #[error("Tick scheduler error: {0}")]
    Scheduler(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msr_display_includes_name_and_address() {
        assert_eq!(msr::IA32_MISC_ENABLE.to_string(), "IA32_MISC_ENABLE(0x1a0)");
        assert_eq!(Msr(0x10).to_string(), "MSR(0x10)");
    }

    #[test]
    fn feature_order_puts_speed_shift_last() {
        assert_eq!(Feature::ALL[0], Feature::TurboBoost);
        assert_eq!(Feature::ALL[3], Feature::SpeedShift);
    }

    #[test]
    fn event_roundtrip() {
        let event = TuneEvent::new(
            "cputune-runtime::engine",
            EventPayload::RegisterChanged {
                feature: Some(Feature::TurboBoost),
                register: msr::IA32_MISC_ENABLE,
                from: 0x40_0000_0000,
                to: 0,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: TuneEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.payload, back.payload);
    }

    #[test]
    fn tune_error_display() {
        let err = TuneError::Unsupported(Feature::SpeedShift);
        assert!(err.to_string().contains("Intel Speed Shift"));

        let err2 = TuneError::RegisterAccess {
            register: msr::MSR_POWER_CTL,
            details: "permission denied".to_string(),
        };
        assert!(err2.to_string().contains("MSR_POWER_CTL"));
    }
}
