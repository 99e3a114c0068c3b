//! [`MsrDevice`] – register accessor backed by the Linux `msr` driver.
//!
//! Each logical CPU exposes `/dev/cpu/<n>/msr`; an 8-byte `pread`/`pwrite`
//! at file offset `address` reads or writes that register.  Requires the
//! `msr` kernel module and `CAP_SYS_RAWIO`.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use cputune_types::{Msr, TuneError};
use tracing::debug;

use crate::register::RegisterAccessor;

/// Path of the msr character device for logical CPU `cpu`.
pub fn device_path(cpu: u32) -> PathBuf {
    PathBuf::from(format!("/dev/cpu/{cpu}/msr"))
}

/// An open `/dev/cpu/<n>/msr` handle.
#[derive(Debug)]
pub struct MsrDevice {
    path: PathBuf,
    file: File,
}

impl MsrDevice {
    /// Open the msr device of logical CPU `cpu` for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns [`TuneError::Config`] when the device cannot be opened (module
    /// not loaded, missing privileges, CPU offline).
    pub fn open(cpu: u32) -> Result<Self, TuneError> {
        Self::open_path(&device_path(cpu))
    }

    /// Open an explicit device path.
    pub fn open_path(path: &Path) -> Result<Self, TuneError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TuneError::Config(format!("cannot open {}: {e}", path.display())))?;
        debug!(path = %path.display(), "opened msr device");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegisterAccessor for MsrDevice {
    fn read(&mut self, register: Msr) -> Result<u64, TuneError> {
        let mut buf = [0u8; 8];
        self.file
            .read_exact_at(&mut buf, u64::from(register.0))
            .map_err(|e| TuneError::RegisterAccess {
                register,
                details: format!("rdmsr via {}: {e}", self.path.display()),
            })?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write(&mut self, register: Msr, value: u64) -> Result<(), TuneError> {
        self.file
            .write_all_at(&value.to_le_bytes(), u64::from(register.0))
            .map_err(|e| TuneError::RegisterAccess {
                register,
                details: format!("wrmsr via {}: {e}", self.path.display()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cputune_types::msr;

    #[test]
    fn device_path_per_cpu() {
        assert_eq!(device_path(0), PathBuf::from("/dev/cpu/0/msr"));
        assert_eq!(device_path(7), PathBuf::from("/dev/cpu/7/msr"));
    }

    #[test]
    fn open_missing_device_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = MsrDevice::open_path(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, TuneError::Config(_)));
    }

    // A regular file behaves like the msr device for positional I/O, which
    // lets the little-endian encoding be checked without root.
    #[test]
    fn positional_read_write_on_backing_file() {
        let file = tempfile::NamedTempFile::new().expect("tmp file");
        file.as_file().set_len(0x800).unwrap();
        let mut dev = MsrDevice::open_path(file.path()).unwrap();

        dev.write(msr::IA32_HWP_REQUEST, 0x8000_2a2a).unwrap();
        assert_eq!(dev.read(msr::IA32_HWP_REQUEST).unwrap(), 0x8000_2a2a);
        assert_eq!(dev.read(msr::IA32_PM_ENABLE).unwrap(), 0);
    }

    #[test]
    fn read_past_end_is_register_error() {
        let file = tempfile::NamedTempFile::new().expect("tmp file");
        let mut dev = MsrDevice::open_path(file.path()).unwrap();
        let err = dev.read(msr::IA32_MISC_ENABLE).unwrap_err();
        assert!(matches!(err, TuneError::RegisterAccess { .. }));
    }
}
