//! CPU capability detection.
//!
//! Only one capability gates behaviour: hardware P-states (HWP).  Which
//! features depend on it is recorded in each feature's descriptor.

use std::fs;

use tracing::debug;

const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// What the running CPU supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCapabilities {
    /// `hwp` flag present (Skylake and later).
    pub hwp: bool,
    /// CPU model number, reported in diagnostics.
    pub model: u32,
}

impl CpuCapabilities {
    /// Probe `/proc/cpuinfo`.  Falls back to "no HWP, model 0" when the file
    /// is unreadable.
    pub fn detect() -> Self {
        match fs::read_to_string(CPUINFO_PATH) {
            Ok(raw) => Self::from_cpuinfo(&raw),
            Err(e) => {
                debug!(error = %e, "cannot read {CPUINFO_PATH}; assuming no HWP");
                Self::default()
            }
        }
    }

    /// Parse the first processor block of a `/proc/cpuinfo` dump.
    pub fn from_cpuinfo(raw: &str) -> Self {
        let mut caps = Self::default();
        for line in raw.lines() {
            if line.trim().is_empty() {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "model" => caps.model = value.trim().parse().unwrap_or(0),
                "flags" => caps.hwp = value.split_whitespace().any(|f| f == "hwp"),
                _ => {}
            }
        }
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKYLAKE: &str = "processor\t: 0\n\
vendor_id\t: GenuineIntel\n\
cpu family\t: 6\n\
model\t\t: 94\n\
model name\t: Intel(R) Core(TM) i7-6700K CPU @ 4.00GHz\n\
flags\t\t: fpu vme de pse tsc msr ida arat pln pts hwp hwp_notify hwp_act_window hwp_epp\n\
\n\
processor\t: 1\n\
model\t\t: 1\n";

    #[test]
    fn parses_model_and_hwp_flag() {
        let caps = CpuCapabilities::from_cpuinfo(SKYLAKE);
        assert!(caps.hwp);
        assert_eq!(caps.model, 94);
    }

    #[test]
    fn hwp_prefixed_flags_alone_do_not_count() {
        let caps = CpuCapabilities::from_cpuinfo("model : 58\nflags : msr hwp_epp hwp_notify\n");
        assert!(!caps.hwp);
        assert_eq!(caps.model, 58);
    }

    #[test]
    fn empty_input_is_default() {
        assert_eq!(CpuCapabilities::from_cpuinfo(""), CpuCapabilities::default());
    }
}
