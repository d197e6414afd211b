//! Filesystem abstraction so accounting reads can run against the real
//! `/proc` or an in-memory mock in tests and on non-Linux hosts.

use std::io;
use std::path::Path;

/// Read access to the proc filesystem.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "VmRSS:\t    1024 kB").unwrap();

        let content = RealFs::new().read_to_string(file.path()).unwrap();

        assert!(content.contains("VmRSS"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = RealFs::new()
            .read_to_string(Path::new("/definitely/not/a/real/path"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
