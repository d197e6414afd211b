//! memwatch - periodic process memory observation library.
//!
//! Samples a process's memory accounting records from the kernel at a
//! configurable cadence and broadcasts structured snapshots to any number
//! of subscribers:
//! - `probe` - kernel query adapter reading `/proc` accounting records
//! - `snapshot` - the immutable result of one sampling pass
//! - `observer` - the engine: cadence, timer lifecycle, broadcast
//! - `bytes` - byte count value type with human-readable rendering
//!
//! ```no_run
//! use memwatch::{MemoryObserver, MemoryProbe, ObservationInterval, RealFs};
//!
//! # async fn demo() {
//! let observer = MemoryObserver::new(MemoryProbe::new(RealFs::new(), "/proc"));
//! let mut updates = observer.subscribe();
//! observer.start_observing(ObservationInterval::Frequent);
//! while let Ok(snapshot) = updates.recv().await {
//!     println!("resident {} of {}", snapshot.resident, snapshot.total);
//! }
//! # }
//! ```

pub mod bytes;
pub mod observer;
pub mod probe;
pub mod snapshot;

pub use bytes::ByteSize;
pub use observer::{MemoryObserver, ObservationInterval, SNAPSHOT_EVENT, SNAPSHOT_PAYLOAD_KEY};
pub use probe::{FileSystem, MemoryProbe, ProbeError, RealFs};
pub use snapshot::MemorySnapshot;

/// Crate version, for binaries to report.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
