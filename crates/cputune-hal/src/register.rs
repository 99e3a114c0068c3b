//! Generic `RegisterAccessor` trait for 64-bit model-specific registers.
//!
//! The reconciliation engine only ever talks to this trait, so the real
//! `/dev/cpu/<n>/msr` backend ([`MsrDevice`][crate::msr_device::MsrDevice])
//! and the in-memory [`SimRegisterFile`][crate::sim::SimRegisterFile] are
//! interchangeable.

use cputune_types::{Msr, TuneError};

/// Read/write access to a bank of 64-bit registers.
pub trait RegisterAccessor: Send + Sync {
    /// Read the current value of `register`.
    ///
    /// # Errors
    ///
    /// Returns [`TuneError::RegisterAccess`] if the register cannot be read.
    fn read(&mut self, register: Msr) -> Result<u64, TuneError>;

    /// Write `value` to `register`.
    ///
    /// # Errors
    ///
    /// Returns [`TuneError::RegisterAccess`] if the write is rejected.
    fn write(&mut self, register: Msr, value: u64) -> Result<(), TuneError>;
}

impl<T: RegisterAccessor + ?Sized> RegisterAccessor for Box<T> {
    fn read(&mut self, register: Msr) -> Result<u64, TuneError> {
        (**self).read(register)
    }

    fn write(&mut self, register: Msr, value: u64) -> Result<(), TuneError> {
        (**self).write(register, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal accessor that fails on unknown registers.
    struct MockBank {
        values: HashMap<Msr, u64>,
    }

    impl RegisterAccessor for MockBank {
        fn read(&mut self, register: Msr) -> Result<u64, TuneError> {
            self.values
                .get(&register)
                .copied()
                .ok_or_else(|| TuneError::RegisterAccess {
                    register,
                    details: "unmapped".to_string(),
                })
        }

        fn write(&mut self, register: Msr, value: u64) -> Result<(), TuneError> {
            self.values.insert(register, value);
            Ok(())
        }
    }

    #[test]
    fn boxed_accessor_forwards_calls() {
        let mut bank: Box<dyn RegisterAccessor> = Box::new(MockBank {
            values: HashMap::new(),
        });
        assert!(bank.read(Msr(0x10)).is_err());
        bank.write(Msr(0x10), 42).unwrap();
        assert_eq!(bank.read(Msr(0x10)).unwrap(), 42);
    }
}
