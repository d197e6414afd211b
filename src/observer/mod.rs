//! Observation engine: sampling cadence, the single recurring timer, and
//! snapshot broadcast.
//!
//! The engine owns a [`MemoryProbe`] and a broadcast channel. While
//! observing, one timer task samples the probe at the armed cadence and
//! publishes each successful snapshot to every subscriber. Publishing never
//! waits on subscriber progress, so a slow consumer cannot delay ticks.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::probe::{FileSystem, MemoryProbe, ProbeError};
use crate::snapshot::MemorySnapshot;

/// Event name external consumers subscribe to. Stable across releases.
pub const SNAPSHOT_EVENT: &str = "memwatch.snapshot";

/// Key the snapshot payload travels under in serialized event streams.
/// Stable across releases.
pub const SNAPSHOT_PAYLOAD_KEY: &str = "snapshot";

/// How many published snapshots a subscriber may fall behind before it
/// starts observing [`broadcast::error::RecvError::Lagged`].
const CHANNEL_CAPACITY: usize = 64;

/// Sampling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationInterval {
    /// Every 100 ms.
    Live,
    /// Every 500 ms.
    Frequent,
    /// Every second.
    #[default]
    Default,
    /// Every 5 seconds.
    Deferred,
}

impl ObservationInterval {
    /// The duration between ticks at this cadence.
    pub const fn duration(self) -> Duration {
        match self {
            ObservationInterval::Live => Duration::from_millis(100),
            ObservationInterval::Frequent => Duration::from_millis(500),
            ObservationInterval::Default => Duration::from_millis(1000),
            ObservationInterval::Deferred => Duration::from_millis(5000),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            ObservationInterval::Live => "live",
            ObservationInterval::Frequent => "frequent",
            ObservationInterval::Default => "default",
            ObservationInterval::Deferred => "deferred",
        }
    }
}

impl std::fmt::Display for ObservationInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for unrecognized cadence names (CLI and config input).
#[derive(Debug, Clone)]
pub struct ParseIntervalError {
    input: String,
}

impl std::fmt::Display for ParseIntervalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown interval '{}', expected live, frequent, default or deferred",
            self.input
        )
    }
}

impl std::error::Error for ParseIntervalError {}

impl FromStr for ObservationInterval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(ObservationInterval::Live),
            "frequent" => Ok(ObservationInterval::Frequent),
            "default" => Ok(ObservationInterval::Default),
            "deferred" => Ok(ObservationInterval::Deferred),
            _ => Err(ParseIntervalError {
                input: s.to_string(),
            }),
        }
    }
}

/// The armed timer: cadence plus the task driving its ticks.
///
/// Held as one value so the interval and the timer handle are always both
/// present or both absent.
struct ArmedTimer {
    interval: ObservationInterval,
    ticker: JoinHandle<()>,
}

/// Periodic memory observer.
///
/// At most one timer is armed at any instant; re-arming with a different
/// cadence replaces the previous timer atomically, and re-arming with the
/// same cadence is a no-op. The observer captures the current Tokio runtime
/// at construction, so its methods may afterwards be called from any
/// thread.
pub struct MemoryObserver<F: FileSystem + 'static> {
    probe: Arc<MemoryProbe<F>>,
    tx: broadcast::Sender<MemorySnapshot>,
    runtime: Handle,
    armed: Mutex<Option<ArmedTimer>>,
}

impl<F: FileSystem + 'static> MemoryObserver<F> {
    /// Creates an observer around `probe`.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime, which is where the timer
    /// task runs.
    pub fn new(probe: MemoryProbe<F>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            probe: Arc::new(probe),
            tx,
            runtime: Handle::current(),
            armed: Mutex::new(None),
        }
    }

    /// Registers a new subscriber.
    ///
    /// Each subscriber receives published snapshots in publish order,
    /// independently of the others. A subscriber registered while a publish
    /// is in flight need not observe that publish.
    pub fn subscribe(&self) -> broadcast::Receiver<MemorySnapshot> {
        self.tx.subscribe()
    }

    /// Performs one synchronous sampling pass without touching the timer.
    ///
    /// Query failures are reported to the caller rather than collapsed into
    /// an absent value, so "no data" and "the kernel refused the query"
    /// stay distinguishable.
    pub fn current_snapshot(&self) -> Result<MemorySnapshot, ProbeError> {
        self.probe.snapshot()
    }

    /// The armed cadence, if observation is running.
    pub fn interval(&self) -> Option<ObservationInterval> {
        self.armed.lock().unwrap().as_ref().map(|t| t.interval)
    }

    /// Whether a timer is currently armed.
    pub fn is_observing(&self) -> bool {
        self.interval().is_some()
    }

    /// Starts observing at the default cadence.
    pub fn start_observing_default(&self) {
        self.start_observing(ObservationInterval::default());
    }

    /// Starts (or re-arms) observation at `interval`.
    ///
    /// Calling this with the already-armed cadence is a no-op. Any other
    /// call cancels the previous timer, arms exactly one new recurring
    /// timer, and immediately publishes one baseline snapshot so
    /// subscribers need not wait a full period for data. A failed baseline
    /// publishes nothing.
    pub fn start_observing(&self, interval: ObservationInterval) {
        let mut armed = self.armed.lock().unwrap();
        if let Some(timer) = armed.as_ref() {
            if timer.interval == interval {
                return;
            }
        }
        if let Some(timer) = armed.take() {
            timer.ticker.abort();
        }

        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        let period = interval.duration();
        let ticker = self.runtime.spawn(async move {
            // First fire lands one full period after arming; the baseline
            // below covers the instant of the start call itself.
            let start = tokio::time::Instant::now() + period;
            let mut tick = tokio::time::interval_at(start, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                match probe.snapshot() {
                    Ok(snapshot) => {
                        let _ = tx.send(snapshot);
                    }
                    Err(e) => {
                        // A failed tick publishes nothing and never stops
                        // the timer.
                        debug!(error = %e, "sampling tick failed");
                    }
                }
            }
        });
        *armed = Some(ArmedTimer { interval, ticker });
        debug!(interval = %interval, "observation armed");

        match self.probe.snapshot() {
            Ok(snapshot) => {
                let _ = self.tx.send(snapshot);
            }
            Err(e) => {
                debug!(error = %e, "baseline snapshot failed");
            }
        }
    }

    /// Stops observation and clears the armed state. A no-op when nothing
    /// is armed.
    pub fn stop_observing(&self) {
        let mut armed = self.armed.lock().unwrap();
        if let Some(timer) = armed.take() {
            timer.ticker.abort();
            debug!(interval = %timer.interval, "observation stopped");
        }
    }
}

impl<F: FileSystem + 'static> Drop for MemoryObserver<F> {
    fn drop(&mut self) {
        self.stop_observing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::MockFs;
    use tokio::sync::broadcast::error::TryRecvError;

    const TOTAL: u64 = 8 * 1024 * 1024 * 1024;

    fn observer() -> (MemoryObserver<MockFs>, MockFs) {
        let fs = MockFs::observed_process();
        let mut probe = MemoryProbe::new(fs.clone(), "/proc");
        probe.set_total_memory(TOTAL);
        (MemoryObserver::new(probe), fs)
    }

    /// Lets spawned timer tasks run without moving the paused clock.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    async fn start(obs: &MemoryObserver<MockFs>, interval: ObservationInterval) {
        obs.start_observing(interval);
        settle().await;
    }

    /// Advances the paused clock one period at a time so every tick fires.
    async fn advance_ticks(interval: ObservationInterval, n: u32) {
        for _ in 0..n {
            tokio::time::advance(interval.duration()).await;
            settle().await;
        }
    }

    fn drain(rx: &mut broadcast::Receiver<MemorySnapshot>) -> usize {
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        received
    }

    #[test]
    fn interval_durations() {
        assert_eq!(ObservationInterval::Live.duration().as_millis(), 100);
        assert_eq!(ObservationInterval::Frequent.duration().as_millis(), 500);
        assert_eq!(ObservationInterval::Default.duration().as_millis(), 1000);
        assert_eq!(ObservationInterval::Deferred.duration().as_millis(), 5000);
        assert_eq!(
            ObservationInterval::default(),
            ObservationInterval::Default
        );
    }

    #[test]
    fn interval_round_trips_through_strings() {
        for interval in [
            ObservationInterval::Live,
            ObservationInterval::Frequent,
            ObservationInterval::Default,
            ObservationInterval::Deferred,
        ] {
            let parsed: ObservationInterval = interval.to_string().parse().unwrap();
            assert_eq!(parsed, interval);
        }
        assert!("occasionally".parse::<ObservationInterval>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_publishes_an_immediate_baseline() {
        let (obs, _fs) = observer();
        let mut rx = obs.subscribe();

        obs.start_observing(ObservationInterval::Live);

        let snap = rx.try_recv().unwrap();
        assert!(snap.used.as_u64() <= snap.total.as_u64());
        assert!(snap.used_fraction() > 0.0 && snap.used_fraction() <= 1.0);
        assert_eq!(obs.interval(), Some(ObservationInterval::Live));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_publish_at_the_armed_cadence() {
        let (obs, _fs) = observer();
        let mut rx = obs.subscribe();

        start(&obs, ObservationInterval::Live).await;
        assert_eq!(drain(&mut rx), 1); // baseline

        advance_ticks(ObservationInterval::Live, 3).await;
        assert_eq!(drain(&mut rx), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_with_same_interval_is_a_noop() {
        let (obs, _fs) = observer();
        let mut rx = obs.subscribe();

        start(&obs, ObservationInterval::Live).await;
        start(&obs, ObservationInterval::Live).await;
        assert_eq!(drain(&mut rx), 1); // one baseline, no second timer

        advance_ticks(ObservationInterval::Live, 5).await;
        assert_eq!(drain(&mut rx), 5); // N ticks publish N times, not 2N
    }

    #[tokio::test(start_paused = true)]
    async fn switching_interval_replaces_the_timer() {
        let (obs, _fs) = observer();
        let mut rx = obs.subscribe();

        start(&obs, ObservationInterval::Live).await;
        start(&obs, ObservationInterval::Deferred).await;
        assert_eq!(obs.interval(), Some(ObservationInterval::Deferred));
        assert_eq!(drain(&mut rx), 2); // one baseline per arming

        // No leftover ticks at the old 100 ms cadence.
        tokio::time::advance(Duration::from_millis(4900)).await;
        settle().await;
        assert_eq!(drain(&mut rx), 0);

        // The new cadence fires on schedule.
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(drain(&mut rx), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_silences_the_channel() {
        let (obs, _fs) = observer();
        let mut rx = obs.subscribe();

        start(&obs, ObservationInterval::Frequent).await;
        obs.stop_observing();
        drain(&mut rx);

        advance_ticks(ObservationInterval::Frequent, 10).await;
        assert_eq!(drain(&mut rx), 0);
        assert_eq!(obs.interval(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn default_start_arms_the_default_cadence() {
        let (obs, _fs) = observer();
        obs.start_observing_default();
        assert_eq!(obs.interval(), Some(ObservationInterval::Default));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_start_is_a_noop() {
        let (obs, _fs) = observer();
        obs.stop_observing();
        obs.stop_observing();
        assert!(!obs.is_observing());
    }

    #[tokio::test(start_paused = true)]
    async fn engine_is_reusable_across_start_stop_cycles() {
        let (obs, _fs) = observer();
        let mut rx = obs.subscribe();

        start(&obs, ObservationInterval::Live).await;
        obs.stop_observing();
        start(&obs, ObservationInterval::Deferred).await;
        drain(&mut rx);

        advance_ticks(ObservationInterval::Deferred, 2).await;
        assert_eq!(drain(&mut rx), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_publishes_nothing_and_keeps_ticking() {
        let (obs, fs) = observer();
        let mut rx = obs.subscribe();

        start(&obs, ObservationInterval::Live).await;
        drain(&mut rx);

        fs.remove("/proc/self/smaps_rollup");
        advance_ticks(ObservationInterval::Live, 3).await;
        assert_eq!(drain(&mut rx), 0);
        assert!(obs.current_snapshot().is_err());
        assert!(obs.is_observing());

        // Queries succeed again, ticks resume publishing.
        fs.insert(
            "/proc/self/smaps_rollup",
            "Anonymous:\t 1024 kB\nSwap:\t 0 kB\n",
        );
        advance_ticks(ObservationInterval::Live, 2).await;
        assert_eq!(drain(&mut rx), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn current_snapshot_reports_query_failures() {
        let (obs, fs) = observer();
        fs.remove("/proc/self/status");

        let ProbeError::QueryFailed(reason) = obs.current_snapshot().unwrap_err();
        assert!(reason.contains("status"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_start_stop_never_leaves_extra_timers() {
        let (obs, _fs) = observer();
        let obs = Arc::new(obs);

        let mut handles = Vec::new();
        for i in 0..32 {
            let obs = Arc::clone(&obs);
            handles.push(tokio::spawn(async move {
                match i % 3 {
                    0 => obs.start_observing(ObservationInterval::Live),
                    1 => obs.start_observing(ObservationInterval::Frequent),
                    _ => obs.stop_observing(),
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Whatever interleaving happened, a single stop must leave the
        // channel silent; a leaked second timer would keep publishing.
        obs.stop_observing();
        assert_eq!(obs.interval(), None);
        // A tick already mid-sample when the abort landed may still finish;
        // let it drain before listening.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut rx = obs.subscribe();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
