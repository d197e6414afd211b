//! Parsers for the fixed-layout memory accounting records under `/proc`.
//!
//! Both record files share the `Key:\tvalue kB` line format. A record
//! missing any required field is rejected whole; callers never see a
//! partially populated record.

use std::collections::HashMap;

/// Error produced when an accounting record does not have the expected
/// layout.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Basic task accounting record. All values in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    /// Bytes currently resident in physical RAM (`VmRSS`).
    pub resident: u64,
    /// Peak resident size (`VmHWM`).
    pub peak_resident: u64,
    /// Reserved address space (`VmSize`).
    pub virtual_size: u64,
}

/// Virtual-memory accounting record. All values in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmRecord {
    /// Anonymous resident pages (`Anonymous`).
    pub anonymous: u64,
    /// Pages swapped out, possibly compressed by the kernel (`Swap`).
    pub swapped: u64,
}

fn record_fields(content: &str) -> HashMap<&str, &str> {
    let mut fields = HashMap::new();
    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }
    fields
}

/// Extracts a required `"<n> kB"` field, converted to bytes.
fn require_kb(fields: &HashMap<&str, &str>, key: &str) -> Result<u64, ParseError> {
    let raw = fields
        .get(key)
        .ok_or_else(|| ParseError::new(format!("missing field {}", key)))?;
    let count: u64 = raw
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::new(format!("malformed field {}: '{}'", key, raw)))?;
    Ok(count * 1024)
}

/// Parses `/proc/<pid>/status` into a [`TaskRecord`].
pub fn parse_task_record(content: &str) -> Result<TaskRecord, ParseError> {
    let fields = record_fields(content);
    Ok(TaskRecord {
        resident: require_kb(&fields, "VmRSS")?,
        peak_resident: require_kb(&fields, "VmHWM")?,
        virtual_size: require_kb(&fields, "VmSize")?,
    })
}

/// Parses `/proc/<pid>/smaps_rollup` into a [`VmRecord`].
pub fn parse_vm_record(content: &str) -> Result<VmRecord, ParseError> {
    let fields = record_fields(content);
    Ok(VmRecord {
        anonymous: require_kb(&fields, "Anonymous")?,
        swapped: require_kb(&fields, "Swap")?,
    })
}
