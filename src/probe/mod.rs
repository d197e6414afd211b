//! Kernel query adapter: low-level reads of per-process memory accounting
//! records.
//!
//! One probe addresses one process (the current one by default). Each
//! record kind is fetched with exactly one read of its backing `/proc`
//! file, and a query either yields the full record or an error, never a
//! partial result. There are no retries; a failed query is reported to the
//! caller immediately.

pub mod mock;
mod parser;
mod traits;

pub use parser::{ParseError, TaskRecord, VmRecord, parse_task_record, parse_vm_record};
pub use traits::{FileSystem, RealFs};

use std::path::Path;

use tracing::trace;

use crate::bytes::ByteSize;
use crate::snapshot::MemorySnapshot;

/// Error produced when an accounting query fails.
#[derive(Debug, Clone)]
pub enum ProbeError {
    /// The kernel refused the query, the record was unreadable, or its
    /// layout was not the expected one. Carries a human-readable reason
    /// built from the OS's own error string where one is available.
    QueryFailed(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::QueryFailed(reason) => {
                write!(f, "memory accounting query failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for ProbeError {}

/// Reads per-process memory accounting records from `/proc`.
pub struct MemoryProbe<F: FileSystem> {
    fs: F,
    proc_path: String,
    pid_dir: String,
    total_memory: u64,
}

impl<F: FileSystem> MemoryProbe<F> {
    /// Creates a probe observing the current process.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to the proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self::with_pid_dir(fs, proc_path, "self".to_string())
    }

    /// Creates a probe observing another visible process.
    pub fn for_pid(fs: F, proc_path: impl Into<String>, pid: u32) -> Self {
        Self::with_pid_dir(fs, proc_path, pid.to_string())
    }

    fn with_pid_dir(fs: F, proc_path: impl Into<String>, pid_dir: String) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            pid_dir,
            total_memory: total_physical_memory(),
        }
    }

    /// Overrides the cached total-physical-memory constant.
    ///
    /// The real value is read from the OS once at construction and does not
    /// change over a process's life; tests (and hosts where the constant is
    /// unavailable) set it here.
    pub fn set_total_memory(&mut self, bytes: u64) {
        self.total_memory = bytes;
    }

    /// Total physical memory of the machine, in bytes. Zero when unknown.
    pub fn total_memory(&self) -> u64 {
        self.total_memory
    }

    /// Fetches the basic task accounting record.
    pub fn task_record(&self) -> Result<TaskRecord, ProbeError> {
        let content = self.read_record("status")?;
        parse_task_record(&content).map_err(|e| ProbeError::QueryFailed(e.message))
    }

    /// Fetches the virtual-memory accounting record.
    pub fn vm_record(&self) -> Result<VmRecord, ProbeError> {
        let content = self.read_record("smaps_rollup")?;
        parse_vm_record(&content).map_err(|e| ProbeError::QueryFailed(e.message))
    }

    /// Builds a full snapshot: task record, then virtual-memory record,
    /// then the cached total. Either query failing fails the whole pass;
    /// no partial snapshot is ever produced.
    pub fn snapshot(&self) -> Result<MemorySnapshot, ProbeError> {
        let task = self.task_record()?;
        let vm = self.vm_record()?;
        let used = vm.anonymous + vm.swapped;
        trace!(
            resident = task.resident,
            used,
            total = self.total_memory,
            "sampled memory accounting"
        );
        Ok(MemorySnapshot::new(
            ByteSize::new(task.resident),
            ByteSize::new(task.peak_resident),
            ByteSize::new(task.virtual_size),
            ByteSize::new(used),
            ByteSize::new(self.total_memory),
        ))
    }

    // One query = one read of the record's backing file.
    fn read_record(&self, record: &str) -> Result<String, ProbeError> {
        let path = format!("{}/{}/{}", self.proc_path, self.pid_dir, record);
        self.fs
            .read_to_string(Path::new(&path))
            .map_err(|e| ProbeError::QueryFailed(format!("{}: {}", path, e)))
    }
}

/// Total physical memory reported by the OS.
#[cfg(target_os = "linux")]
fn total_physical_memory() -> u64 {
    // SAFETY: sysconf takes no pointers and cannot violate memory safety.
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages > 0 && page_size > 0 {
        pages as u64 * page_size as u64
    } else {
        0
    }
}

/// The constant is unavailable off-Linux; callers override via
/// [`MemoryProbe::set_total_memory`].
#[cfg(not(target_os = "linux"))]
fn total_physical_memory() -> u64 {
    0
}
