//! The write-if-changed primitive.
//!
//! Every register mutation in CPUTune goes through [`write_if_changed`].
//! The caller supplies the value it just read, so one tick performs exactly
//! one read per register decision and never writes blindly.

use cputune_hal::RegisterAccessor;
use cputune_types::{Msr, TuneError};
use tracing::trace;

/// Write `target` to `register` only when it differs from `current`.
///
/// Returns `Ok(true)` when a write was issued and `Ok(false)` when the
/// register already held `target`.
///
/// # Errors
///
/// Propagates the accessor's [`TuneError::RegisterAccess`] when the write
/// fails.
///
/// # Example
///
/// ```
/// use cputune_hal::SimRegisterFile;
/// use cputune_kernel::write_guard::write_if_changed;
/// use cputune_types::msr;
///
/// let mut regs = SimRegisterFile::new();
/// assert!(write_if_changed(&mut regs, msr::IA32_PM_ENABLE, 0, 1).unwrap());
/// assert!(!write_if_changed(&mut regs, msr::IA32_PM_ENABLE, 1, 1).unwrap());
/// assert_eq!(regs.writes().len(), 1);
/// ```
pub fn write_if_changed<A>(
    accessor: &mut A,
    register: Msr,
    current: u64,
    target: u64,
) -> Result<bool, TuneError>
where
    A: RegisterAccessor + ?Sized,
{
    if current == target {
        trace!(%register, value = format_args!("0x{current:x}"), "register remains the same");
        return Ok(false);
    }
    accessor.write(register, target)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cputune_hal::SimRegisterFile;
    use cputune_types::msr;

    #[test]
    fn equal_values_issue_no_write() {
        let mut regs = SimRegisterFile::new();
        let wrote = write_if_changed(&mut regs, msr::MSR_POWER_CTL, 7, 7).unwrap();
        assert!(!wrote);
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn differing_value_issues_one_write() {
        let mut regs = SimRegisterFile::new();
        let wrote = write_if_changed(&mut regs, msr::MSR_POWER_CTL, 6, 7).unwrap();
        assert!(wrote);
        assert_eq!(regs.writes_to(msr::MSR_POWER_CTL), vec![7]);
    }

    #[test]
    fn repeated_target_is_idempotent() {
        let mut regs = SimRegisterFile::new();
        for register in [msr::IA32_MISC_ENABLE, msr::IA32_HWP_REQUEST] {
            for target in [0u64, 1, u64::MAX] {
                regs.clear_writes();
                let current = regs.read(register).unwrap();
                write_if_changed(&mut regs, register, current, target).unwrap();
                let current = regs.read(register).unwrap();
                write_if_changed(&mut regs, register, current, target).unwrap();
                assert!(regs.writes().len() <= 1);
                assert_eq!(regs.value(register).unwrap_or(0), target);
            }
        }
    }

    #[test]
    fn write_failure_is_propagated() {
        let mut regs = SimRegisterFile::new();
        regs.fail(msr::IA32_PM_ENABLE);
        let err = write_if_changed(&mut regs, msr::IA32_PM_ENABLE, 0, 1).unwrap_err();
        assert!(matches!(err, TuneError::RegisterAccess { .. }));
    }
}
