//! Mock filesystem for tests and for running on hosts without `/proc`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::traits::FileSystem;

/// In-memory [`FileSystem`] backed by a path → contents map.
///
/// The map is shared behind an `Arc`, so tests can add or remove files
/// while a probe (or a running observer) holds a clone. Removing a file
/// makes subsequent queries fail the way the real kernel refusing a read
/// would.
#[derive(Debug, Default, Clone)]
pub struct MockFs {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any previous contents.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), content.into());
    }

    /// Removes a file; reads of it fail with `NotFound` afterwards.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files.lock().unwrap().remove(path.as_ref());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// A process with steady, unremarkable memory usage under `/proc/self`:
    /// 48 MiB resident (64 MiB peak), 240 MiB of address space, 32 MiB
    /// anonymous plus 4 MiB swapped.
    pub fn observed_process() -> Self {
        Self::new()
            .with_file("/proc/self/status", SELF_STATUS)
            .with_file("/proc/self/smaps_rollup", SELF_SMAPS_ROLLUP)
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.lock().unwrap().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }
}

const SELF_STATUS: &str = "\
Name:\tmemwatchd
Umask:\t0022
State:\tS (sleeping)
Pid:\t4242
PPid:\t1
Uid:\t1000\t1000\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
VmPeak:\t  262144 kB
VmSize:\t  245760 kB
VmLck:\t       0 kB
VmHWM:\t   65536 kB
VmRSS:\t   49152 kB
RssAnon:\t   32768 kB
RssFile:\t   16384 kB
VmData:\t   81920 kB
VmStk:\t     132 kB
VmExe:\t    2048 kB
VmLib:\t    8192 kB
VmSwap:\t    4096 kB
Threads:\t8
";

const SELF_SMAPS_ROLLUP: &str = "\
556e2a400000-7ffd9e9ea000 ---p 00000000 00:00 0                          [rollup]
Rss:               49152 kB
Pss:               41200 kB
Shared_Clean:       8192 kB
Shared_Dirty:          0 kB
Private_Clean:      8192 kB
Private_Dirty:     32768 kB
Referenced:        45056 kB
Anonymous:         32768 kB
LazyFree:              0 kB
AnonHugePages:         0 kB
Swap:               4096 kB
SwapPss:            4096 kB
Locked:                0 kB
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_inserted_files() {
        let fs = MockFs::new().with_file("/proc/self/status", "VmRSS:\t 1 kB\n");
        let content = fs.read_to_string(Path::new("/proc/self/status")).unwrap();
        assert!(content.contains("VmRSS"));
    }

    #[test]
    fn removed_files_read_as_not_found() {
        let fs = MockFs::observed_process();
        fs.remove("/proc/self/status");
        let err = fs
            .read_to_string(Path::new("/proc/self/status"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn clones_share_the_same_files() {
        let fs = MockFs::new();
        let other = fs.clone();
        other.insert("/proc/self/status", "Pid:\t1\n");
        assert!(fs.read_to_string(Path::new("/proc/self/status")).is_ok());
    }
}
