//! [`OriginalSnapshot`] – register values observed before CPUTune touched
//! anything.
//!
//! The snapshot is taken once and has no mutating API, so whatever the
//! engine does during its lifetime, shutdown can put the pre-start state
//! back.

use std::collections::BTreeMap;

use cputune_hal::RegisterAccessor;
use cputune_types::Msr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalSnapshot {
    values: BTreeMap<Msr, u64>,
}

impl OriginalSnapshot {
    /// Read every register in `registers` exactly once.
    ///
    /// Registers that cannot be read are left out (and logged); they will be
    /// skipped at restore time instead of being overwritten with a guess.
    pub fn capture<A>(accessor: &mut A, registers: &[Msr]) -> Self
    where
        A: RegisterAccessor + ?Sized,
    {
        let mut snapshot = Self::default();
        for &register in registers {
            if snapshot.values.contains_key(&register) {
                continue;
            }
            match accessor.read(register) {
                Ok(value) => {
                    debug!(%register, value = format_args!("0x{value:x}"), "captured original value");
                    snapshot.values.insert(register, value);
                }
                Err(e) => warn!(%register, error = %e, "cannot capture original value"),
            }
        }
        snapshot
    }

    /// Captured value of `register`, if any.
    pub fn get(&self, register: Msr) -> Option<u64> {
        self.values.get(&register).copied()
    }

    pub fn contains(&self, register: Msr) -> bool {
        self.values.contains_key(&register)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cputune_hal::SimRegisterFile;
    use cputune_types::msr;

    #[test]
    fn captures_each_register_once() {
        let mut regs = SimRegisterFile::new()
            .with_value(msr::MSR_POWER_CTL, 0x2904_005d)
            .with_value(msr::IA32_MISC_ENABLE, 0x0085_0089);
        let snap = OriginalSnapshot::capture(
            &mut regs,
            &[msr::MSR_POWER_CTL, msr::IA32_MISC_ENABLE, msr::MSR_POWER_CTL],
        );
        assert_eq!(snap.len(), 2);
        assert_eq!(regs.read_count(), 2);
        assert_eq!(snap.get(msr::MSR_POWER_CTL), Some(0x2904_005d));
        assert_eq!(snap.get(msr::IA32_MISC_ENABLE), Some(0x0085_0089));
    }

    #[test]
    fn capture_issues_no_writes() {
        let mut regs = SimRegisterFile::new();
        let _ = OriginalSnapshot::capture(&mut regs, &[msr::IA32_PERF_CTL]);
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn unreadable_register_is_skipped() {
        let mut regs = SimRegisterFile::new();
        regs.fail(msr::IA32_HWP_REQUEST);
        let snap = OriginalSnapshot::capture(
            &mut regs,
            &[msr::IA32_PM_ENABLE, msr::IA32_HWP_REQUEST],
        );
        assert!(snap.contains(msr::IA32_PM_ENABLE));
        assert!(!snap.contains(msr::IA32_HWP_REQUEST));
        assert_eq!(snap.get(msr::IA32_HWP_REQUEST), None);
    }
}
