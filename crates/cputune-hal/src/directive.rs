//! Directive sources: where the engine reads the requested state of each
//! feature from.
//!
//! A directive is a handful of raw bytes (one byte for on/off toggles, up to
//! ten for the HWP request word).  The source never interprets them.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::trace;

/// Read-only access to directive bytes.
pub trait DirectiveSource: Send + Sync {
    /// Read at most `max_len` bytes from `handle` starting at `offset`.
    ///
    /// Returns `None` when the source is absent or unreadable.
    fn read_bytes(&self, handle: &Path, offset: u64, max_len: usize) -> Option<Vec<u8>>;
}

impl<T: DirectiveSource + ?Sized> DirectiveSource for Box<T> {
    fn read_bytes(&self, handle: &Path, offset: u64, max_len: usize) -> Option<Vec<u8>> {
        (**self).read_bytes(handle, offset, max_len)
    }
}

/// Reads directives from plain files, e.g. `/run/cputune/turbo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDirectiveSource;

impl FileDirectiveSource {
    pub fn new() -> Self {
        Self
    }
}

impl DirectiveSource for FileDirectiveSource {
    fn read_bytes(&self, handle: &Path, offset: u64, max_len: usize) -> Option<Vec<u8>> {
        let mut file = match File::open(handle) {
            Ok(f) => f,
            Err(e) => {
                trace!(path = %handle.display(), error = %e, "directive not readable");
                return None;
            }
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).ok()?;
        }
        let mut buf = Vec::with_capacity(max_len);
        file.take(max_len as u64).read_to_end(&mut buf).ok()?;
        Some(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let src = FileDirectiveSource::new();
        assert!(src.read_bytes(&dir.path().join("absent"), 0, 1).is_none());
    }

    #[test]
    fn reads_at_most_max_len_bytes() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp file");
        file.write_all(b"0x80002a2a\n").unwrap();
        let src = FileDirectiveSource::new();

        let one = src.read_bytes(file.path(), 0, 1).unwrap();
        assert_eq!(one, b"0");

        let ten = src.read_bytes(file.path(), 0, 10).unwrap();
        assert_eq!(ten, b"0x80002a2a");
    }

    #[test]
    fn honours_offset() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp file");
        file.write_all(b"01").unwrap();
        let src = FileDirectiveSource::new();
        assert_eq!(src.read_bytes(file.path(), 1, 1).unwrap(), b"1");
    }

    #[test]
    fn empty_file_yields_empty_buffer() {
        let file = tempfile::NamedTempFile::new().expect("tmp file");
        let src = FileDirectiveSource::new();
        assert_eq!(src.read_bytes(file.path(), 0, 1).unwrap(), Vec::<u8>::new());
    }
}
