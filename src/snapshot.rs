//! Structured result of one memory sampling pass.

use serde::{Deserialize, Serialize};

use crate::bytes::ByteSize;

/// One observation of a process's memory usage.
///
/// Built once per sampling pass and never mutated afterwards; values travel
/// by copy, so snapshots can be shared freely between tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Bytes currently mapped into physical RAM.
    pub resident: ByteSize,
    /// Historical maximum resident size observed for the process.
    pub max_resident: ByteSize,
    /// Total reserved address space, including unmapped and swapped regions.
    pub virtual_size: ByteSize,
    /// Bytes the process actively uses: anonymous pages plus pages the
    /// kernel has swapped out (possibly compressed).
    pub used: ByteSize,
    /// Total physical memory of the machine.
    pub total: ByteSize,
}

impl MemorySnapshot {
    pub const fn new(
        resident: ByteSize,
        max_resident: ByteSize,
        virtual_size: ByteSize,
        used: ByteSize,
        total: ByteSize,
    ) -> Self {
        Self {
            resident,
            max_resident,
            virtual_size,
            used,
            total,
        }
    }

    /// Fraction of total physical memory the process uses.
    ///
    /// Always finite: zero when the total is unknown, and within `[0, 1]`
    /// for any values the kernel actually reports.
    pub fn used_fraction(&self) -> f64 {
        if self.total.as_u64() == 0 {
            return 0.0;
        }
        self.used.as_u64() as f64 / self.total.as_u64() as f64
    }
}
