//! Byte count value type with human-readable rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A count of bytes.
///
/// Thin wrapper used for every memory quantity so raw integers never leak
/// through the public API. Serializes transparently as the raw count.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Creates a byte count from a raw number of bytes.
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Returns the raw number of bytes.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ByteSize {
    /// `"1.5 GiB"`, `"100.3 MiB"`, `"50.0 KiB"`, `"512 B"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0 as f64;
        if self.0 >= 1024 * 1024 * 1024 {
            write!(f, "{:.1} GiB", v / (1024.0 * 1024.0 * 1024.0))
        } else if self.0 >= 1024 * 1024 {
            write!(f, "{:.1} MiB", v / (1024.0 * 1024.0))
        } else if self.0 >= 1024 {
            write!(f, "{:.1} KiB", v / 1024.0)
        } else {
            write!(f, "{} B", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_magnitude() {
        assert_eq!(ByteSize::new(512).to_string(), "512 B");
        assert_eq!(ByteSize::new(51_200).to_string(), "50.0 KiB");
        assert_eq!(ByteSize::new(105_168_896).to_string(), "100.3 MiB");
        assert_eq!(ByteSize::new(1_610_612_736).to_string(), "1.5 GiB");
    }

    #[test]
    fn zero_is_plain_bytes() {
        assert_eq!(ByteSize::new(0).to_string(), "0 B");
    }

    #[test]
    fn preserves_the_raw_count() {
        assert_eq!(ByteSize::new(123_456_789).as_u64(), 123_456_789);
        assert_eq!(ByteSize::from(42u64), ByteSize::new(42));
    }
}
