//! Static feature descriptors.
//!
//! Each [`Feature`] maps to exactly one [`FeatureDescriptor`] describing the
//! register it lives in and how enabling, disabling and "is it enabled?" are
//! expressed on the raw register value.  The engine never manipulates bits
//! directly; it only applies these transforms.

use cputune_types::{Feature, Msr, msr};

/// Bit 38 of `IA32_MISC_ENABLE`: Turbo Mode disable.
pub const TURBO_DISABLE_BIT: u64 = 1 << 38;
/// Bit 0 of `MSR_POWER_CTL`: bi-directional PROCHOT enable.
pub const PROCHOT_ENABLE_BIT: u64 = 1 << 0;
/// `IA32_PM_ENABLE` value with HWP enabled.
pub const HWP_ENABLE_VALUE: u64 = 1;
/// `IA32_PM_ENABLE` value with HWP disabled.
pub const HWP_DISABLE_VALUE: u64 = 0;

/// A pure value transform applied to a register's current contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// `current | mask`
    SetBits(u64),
    /// `current & !mask`
    ClearBits(u64),
    /// Replace the whole value.
    Assign(u64),
}

impl Transform {
    pub fn apply(self, current: u64) -> u64 {
        match self {
            Transform::SetBits(mask) => current | mask,
            Transform::ClearBits(mask) => current & !mask,
            Transform::Assign(value) => value,
        }
    }
}

/// How to tell from a raw value whether a toggle feature is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPolicy {
    /// Enabled when every bit of the mask is set.
    BitsSet(u64),
    /// Enabled when every bit of the mask is clear.
    BitsClear(u64),
    /// Enabled when the register holds exactly this value.
    Equals(u64),
}

impl ComparisonPolicy {
    pub fn is_enabled(self, raw: u64) -> bool {
        match self {
            ComparisonPolicy::BitsSet(mask) => raw & mask == mask,
            ComparisonPolicy::BitsClear(mask) => raw & mask == 0,
            ComparisonPolicy::Equals(value) => raw == value,
        }
    }
}

/// The shape of control a feature exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// An on/off feature.
    Toggle {
        enable: Transform,
        disable: Transform,
        policy: ComparisonPolicy,
    },
    /// A full configuration word written verbatim.
    ConfigWord,
}

/// Static metadata for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDescriptor {
    pub feature: Feature,
    pub register: Msr,
    pub control: Control,
    /// Hardware ignores further enables once set, until reset.
    pub latch_once: bool,
    /// Only present on CPUs with hardware P-states.
    pub requires_hwp: bool,
}

impl FeatureDescriptor {
    /// Value the register would hold after enabling (`true`) or disabling
    /// (`false`) the feature.  `None` for configuration words.
    pub fn target(&self, current: u64, enable: bool) -> Option<u64> {
        match self.control {
            Control::Toggle {
                enable: on,
                disable: off,
                ..
            } => Some(if enable { on.apply(current) } else { off.apply(current) }),
            Control::ConfigWord => None,
        }
    }

    /// Whether `raw` shows the feature enabled.  Configuration words are
    /// never "enabled".
    pub fn is_enabled(&self, raw: u64) -> bool {
        match self.control {
            Control::Toggle { policy, .. } => policy.is_enabled(raw),
            Control::ConfigWord => false,
        }
    }
}

static DESCRIPTORS: [FeatureDescriptor; 4] = [
    FeatureDescriptor {
        feature: Feature::TurboBoost,
        register: msr::IA32_MISC_ENABLE,
        control: Control::Toggle {
            enable: Transform::ClearBits(TURBO_DISABLE_BIT),
            disable: Transform::SetBits(TURBO_DISABLE_BIT),
            policy: ComparisonPolicy::BitsClear(TURBO_DISABLE_BIT),
        },
        latch_once: false,
        requires_hwp: false,
    },
    FeatureDescriptor {
        feature: Feature::ProcHot,
        register: msr::MSR_POWER_CTL,
        control: Control::Toggle {
            enable: Transform::SetBits(PROCHOT_ENABLE_BIT),
            disable: Transform::ClearBits(PROCHOT_ENABLE_BIT),
            policy: ComparisonPolicy::BitsSet(PROCHOT_ENABLE_BIT),
        },
        latch_once: false,
        requires_hwp: false,
    },
    FeatureDescriptor {
        feature: Feature::SpeedShift,
        register: msr::IA32_PM_ENABLE,
        control: Control::Toggle {
            enable: Transform::Assign(HWP_ENABLE_VALUE),
            disable: Transform::Assign(HWP_DISABLE_VALUE),
            policy: ComparisonPolicy::Equals(HWP_ENABLE_VALUE),
        },
        latch_once: true,
        requires_hwp: true,
    },
    FeatureDescriptor {
        feature: Feature::HwpRequest,
        register: msr::IA32_HWP_REQUEST,
        control: Control::ConfigWord,
        latch_once: false,
        requires_hwp: true,
    },
];

/// Look up the descriptor of `feature`.
pub fn descriptor(feature: Feature) -> &'static FeatureDescriptor {
    match feature {
        Feature::TurboBoost => &DESCRIPTORS[0],
        Feature::ProcHot => &DESCRIPTORS[1],
        Feature::SpeedShift => &DESCRIPTORS[2],
        Feature::HwpRequest => &DESCRIPTORS[3],
    }
}

/// Registers to snapshot at startup and restore at shutdown, in restore
/// order.  `IA32_PERF_CTL` is not owned by any feature but is captured too.
pub fn managed_registers(hwp: bool) -> Vec<Msr> {
    let mut regs = vec![
        msr::MSR_POWER_CTL,
        msr::IA32_MISC_ENABLE,
        msr::IA32_PERF_CTL,
    ];
    if hwp {
        regs.push(msr::IA32_PM_ENABLE);
        regs.push(msr::IA32_HWP_REQUEST);
    }
    regs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_feature_has_its_own_descriptor() {
        for feature in Feature::ALL {
            assert_eq!(descriptor(feature).feature, feature);
        }
    }

    #[test]
    fn turbo_transforms_only_touch_bit_38() {
        let d = descriptor(Feature::TurboBoost);
        let raw = 0x0085_0089 | TURBO_DISABLE_BIT;
        assert_eq!(d.target(raw, true), Some(0x0085_0089));
        assert_eq!(d.target(0x0085_0089, false), Some(raw));
        assert!(d.is_enabled(0x0085_0089));
        assert!(!d.is_enabled(raw));
    }

    #[test]
    fn prochot_is_bit_zero() {
        let d = descriptor(Feature::ProcHot);
        assert_eq!(d.target(0x2904_005c, true), Some(0x2904_005d));
        assert_eq!(d.target(0x2904_005d, false), Some(0x2904_005c));
        assert!(d.is_enabled(0x2904_005d));
        assert!(!d.is_enabled(0x2904_005c));
    }

    #[test]
    fn speed_shift_compares_full_value() {
        let d = descriptor(Feature::SpeedShift);
        assert!(d.latch_once);
        assert_eq!(d.target(0xdead, true), Some(1));
        assert_eq!(d.target(0xdead, false), Some(0));
        assert!(d.is_enabled(1));
        assert!(!d.is_enabled(3));
    }

    #[test]
    fn hwp_request_is_a_config_word() {
        let d = descriptor(Feature::HwpRequest);
        assert_eq!(d.target(5, true), None);
        assert!(!d.is_enabled(5));
    }

    #[test]
    fn only_hwp_features_require_hwp() {
        let gated: Vec<_> = Feature::ALL
            .into_iter()
            .filter(|f| descriptor(*f).requires_hwp)
            .collect();
        assert_eq!(gated, vec![Feature::HwpRequest, Feature::SpeedShift]);
    }

    #[test]
    fn only_speed_shift_latches() {
        let latching: Vec<_> = Feature::ALL
            .into_iter()
            .filter(|f| descriptor(*f).latch_once)
            .collect();
        assert_eq!(latching, vec![Feature::SpeedShift]);
    }

    #[test]
    fn managed_registers_follow_restore_order() {
        assert_eq!(
            managed_registers(false),
            vec![msr::MSR_POWER_CTL, msr::IA32_MISC_ENABLE, msr::IA32_PERF_CTL]
        );
        let with_hwp = managed_registers(true);
        assert_eq!(with_hwp.len(), 5);
        assert_eq!(with_hwp[3], msr::IA32_PM_ENABLE);
        assert_eq!(with_hwp[4], msr::IA32_HWP_REQUEST);
    }
}
