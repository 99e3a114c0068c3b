//! In-process simulation doubles for CI/CD testing without MSR access.
//!
//! [`SimRegisterFile`] and [`SimDirectives`] are cheap to clone; all clones
//! share the same underlying state, so a test can hand one clone to the
//! engine and keep another to set up hardware state and assert on the
//! writes that were issued.
//!
//! # Example
//!
//! ```rust
//! use cputune_hal::register::RegisterAccessor;
//! use cputune_hal::sim::SimRegisterFile;
//! use cputune_types::msr;
//!
//! let regs = SimRegisterFile::new().with_value(msr::IA32_PM_ENABLE, 0);
//! let mut engine_side = regs.clone();
//! engine_side.write(msr::IA32_PM_ENABLE, 1).unwrap();
//!
//! assert_eq!(regs.value(msr::IA32_PM_ENABLE), Some(1));
//! assert_eq!(regs.writes().len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use cputune_types::{Msr, TuneError};

use crate::directive::DirectiveSource;
use crate::register::RegisterAccessor;

// ────────────────────────────────────────────────────────────────────────────
// Simulated register bank
// ────────────────────────────────────────────────────────────────────────────

/// One write recorded by [`SimRegisterFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedWrite {
    pub register: Msr,
    pub value: u64,
}

#[derive(Debug, Default)]
struct SimBank {
    values: HashMap<Msr, u64>,
    writes: Vec<RecordedWrite>,
    reads: usize,
    failing: HashSet<Msr>,
}

/// A simulated register bank that records every write.
///
/// Reading an unmapped register yields `0`, like a freshly reset MSR.
#[derive(Debug, Default, Clone)]
pub struct SimRegisterFile {
    inner: Arc<Mutex<SimBank>>,
}

impl SimRegisterFile {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: preset `register` to `value` without recording a write.
    pub fn with_value(self, register: Msr, value: u64) -> Self {
        self.set(register, value);
        self
    }

    /// Preset `register` to `value` without recording a write, e.g. to model
    /// an external agent (firmware, another tool) changing it.
    pub fn set(&self, register: Msr, value: u64) {
        self.lock().values.insert(register, value);
    }

    /// Make every subsequent access to `register` fail.
    pub fn fail(&self, register: Msr) {
        self.lock().failing.insert(register);
    }

    /// Undo [`fail`](Self::fail).
    pub fn recover(&self, register: Msr) {
        self.lock().failing.remove(&register);
    }

    /// Current value of `register`, if it has ever been set or written.
    pub fn value(&self, register: Msr) -> Option<u64> {
        self.lock().values.get(&register).copied()
    }

    /// All writes issued so far, oldest first.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    /// Writes issued to a single register.
    pub fn writes_to(&self, register: Msr) -> Vec<u64> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.register == register)
            .map(|w| w.value)
            .collect()
    }

    /// Number of reads served so far.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Forget the write log (values are kept).
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SimBank> {
        // A poisoned bank only means a test panicked mid-access; the data is
        // still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RegisterAccessor for SimRegisterFile {
    fn read(&mut self, register: Msr) -> Result<u64, TuneError> {
        let mut bank = self.lock();
        if bank.failing.contains(&register) {
            return Err(TuneError::RegisterAccess {
                register,
                details: "simulated read fault".to_string(),
            });
        }
        bank.reads += 1;
        Ok(bank.values.get(&register).copied().unwrap_or(0))
    }

    fn write(&mut self, register: Msr, value: u64) -> Result<(), TuneError> {
        let mut bank = self.lock();
        if bank.failing.contains(&register) {
            return Err(TuneError::RegisterAccess {
                register,
                details: "simulated write fault".to_string(),
            });
        }
        bank.values.insert(register, value);
        bank.writes.push(RecordedWrite { register, value });
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated directive store
// ────────────────────────────────────────────────────────────────────────────

/// A simulated directive store keyed by path.
#[derive(Debug, Default, Clone)]
pub struct SimDirectives {
    inner: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl SimDirectives {
    /// Create an empty store; every read returns `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bytes served for `path`.
    pub fn set(&self, path: impl Into<PathBuf>, bytes: impl AsRef<[u8]>) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), bytes.as_ref().to_vec());
    }

    /// Make `path` unreadable again.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path.as_ref());
    }
}

impl DirectiveSource for SimDirectives {
    fn read_bytes(&self, handle: &Path, offset: u64, max_len: usize) -> Option<Vec<u8>> {
        let store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let bytes = store.get(handle)?;
        let start = usize::try_from(offset).ok()?.min(bytes.len());
        let end = start.saturating_add(max_len).min(bytes.len());
        Some(bytes[start..end].to_vec())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use cputune_types::msr;

    #[test]
    fn unmapped_register_reads_zero() {
        let mut regs = SimRegisterFile::new();
        assert_eq!(regs.read(msr::IA32_HWP_REQUEST).unwrap(), 0);
        assert_eq!(regs.read_count(), 1);
    }

    #[test]
    fn clones_share_state() {
        let regs = SimRegisterFile::new().with_value(msr::MSR_POWER_CTL, 0x1);
        let mut other = regs.clone();
        other.write(msr::MSR_POWER_CTL, 0x0).unwrap();
        assert_eq!(regs.value(msr::MSR_POWER_CTL), Some(0));
        assert_eq!(
            regs.writes(),
            vec![RecordedWrite {
                register: msr::MSR_POWER_CTL,
                value: 0
            }]
        );
    }

    #[test]
    fn preset_values_are_not_recorded_as_writes() {
        let regs = SimRegisterFile::new();
        regs.set(msr::IA32_MISC_ENABLE, 0x850089);
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn failing_register_rejects_access() {
        let mut regs = SimRegisterFile::new();
        regs.fail(msr::IA32_PM_ENABLE);
        assert!(regs.read(msr::IA32_PM_ENABLE).is_err());
        assert!(regs.write(msr::IA32_PM_ENABLE, 1).is_err());
        assert!(regs.writes().is_empty());

        regs.recover(msr::IA32_PM_ENABLE);
        assert!(regs.write(msr::IA32_PM_ENABLE, 1).is_ok());
    }

    #[test]
    fn writes_to_filters_by_register() {
        let mut regs = SimRegisterFile::new();
        regs.write(msr::IA32_PM_ENABLE, 1).unwrap();
        regs.write(msr::MSR_POWER_CTL, 1).unwrap();
        regs.write(msr::IA32_PM_ENABLE, 0).unwrap();
        assert_eq!(regs.writes_to(msr::IA32_PM_ENABLE), vec![1, 0]);
    }

    #[test]
    fn sim_directives_bound_reads() {
        let dirs = SimDirectives::new();
        dirs.set("/run/hwp", "0x80002a2a\n");
        assert_eq!(dirs.read_bytes(Path::new("/run/hwp"), 0, 1).unwrap(), b"0");
        assert_eq!(
            dirs.read_bytes(Path::new("/run/hwp"), 0, 10).unwrap(),
            b"0x80002a2a"
        );
        assert_eq!(dirs.read_bytes(Path::new("/run/hwp"), 50, 4).unwrap(), b"");
        assert!(dirs.read_bytes(Path::new("/run/other"), 0, 1).is_none());

        dirs.remove("/run/hwp");
        assert!(dirs.read_bytes(Path::new("/run/hwp"), 0, 1).is_none());
    }
}
