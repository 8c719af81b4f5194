//! Resource-budgeted background sampler for per-stage memory usage.
//!
//! One shared thread periodically copies every registered stage's
//! [`MemoryProbe`] into a read-mostly usage table. The thread budgets
//! itself to a small fraction of one core: after each sweep it sleeps
//! long enough that sweeping accounts for roughly `duty_cycle` of its
//! wall-clock time. The table is advisory telemetry; nothing in the
//! engine enforces limits from it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Advisory gauge a stage updates with its current memory footprint.
pub type MemoryProbe = Arc<AtomicU64>;

/// Default fraction of one core the sampler may consume.
pub const DEFAULT_DUTY_CYCLE: f64 = 0.01;

/// Floor between sweeps so a near-instant sweep does not spin.
const MIN_SLEEP: Duration = Duration::from_millis(100);
/// Ceiling so shutdown latency stays bounded.
const MAX_SLEEP: Duration = Duration::from_secs(10);
/// Granularity at which a sleeping sampler notices shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Shared read path over the per-stage usage table.
///
/// Cheap to clone; every stage context holds one.
#[derive(Clone, Default)]
pub struct MemoryUsageTable {
    inner: Arc<RwLock<HashMap<String, u64>>>,
}

impl MemoryUsageTable {
    /// Last sampled usage for a stage instance, if it has been swept.
    #[must_use]
    pub fn get(&self, instance_name: &str) -> Option<u64> {
        self.inner
            .read()
            .map(|table| table.get(instance_name).copied())
            .unwrap_or(None)
    }

    /// Snapshot of the whole table.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.inner.read().map(|t| t.clone()).unwrap_or_default()
    }

    fn store(&self, instance_name: &str, bytes: u64) {
        if let Ok(mut table) = self.inner.write() {
            match table.get_mut(instance_name) {
                Some(slot) => *slot = bytes,
                None => {
                    table.insert(instance_name.to_string(), bytes);
                }
            }
        }
    }

    fn remove(&self, instance_name: &str) {
        if let Ok(mut table) = self.inner.write() {
            table.remove(instance_name);
        }
    }
}

struct SamplerShared {
    probes: Mutex<HashMap<String, MemoryProbe>>,
    table: MemoryUsageTable,
    duty_cycle: f64,
    running: AtomicBool,
}

impl SamplerShared {
    fn sweep(&self) {
        let probes = match self.probes.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        for (instance, probe) in probes.iter() {
            self.table.store(instance, probe.load(Ordering::Relaxed));
        }
    }
}

/// Shared background sampler, one per built pipeline.
///
/// Started lazily on the first probe registration; stopped exactly once
/// from the pipeline's destroy path. Restart after shutdown is not
/// supported.
pub struct MemorySampler {
    shared: Arc<SamplerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl MemorySampler {
    /// Create a sampler with the given CPU duty cycle.
    ///
    /// The duty cycle is clamped to `(0, 0.5]`; out-of-range values fall
    /// back to [`DEFAULT_DUTY_CYCLE`].
    #[must_use]
    pub fn new(duty_cycle: f64) -> Self {
        let duty_cycle = if duty_cycle > 0.0 && duty_cycle <= 0.5 {
            duty_cycle
        } else {
            DEFAULT_DUTY_CYCLE
        };
        Self {
            shared: Arc::new(SamplerShared {
                probes: Mutex::new(HashMap::new()),
                table: MemoryUsageTable::default(),
                duty_cycle,
                running: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Read handle over the usage table.
    #[must_use]
    pub fn usage_table(&self) -> MemoryUsageTable {
        self.shared.table.clone()
    }

    /// Register a stage's probe and start the sampling thread if needed.
    pub fn register(&self, instance_name: &str, probe: MemoryProbe) {
        if let Ok(mut probes) = self.shared.probes.lock() {
            probes.insert(instance_name.to_string(), probe);
        }
        self.ensure_started();
    }

    /// Remove a stage's probe and its table entry.
    pub fn unregister(&self, instance_name: &str) {
        if let Ok(mut probes) = self.shared.probes.lock() {
            probes.remove(instance_name);
        }
        self.shared.table.remove(instance_name);
    }

    /// Stop the sampling thread and wait for it. Idempotent.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("memory sampler thread panicked during shutdown");
            }
        }
    }

    fn ensure_started(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("rillflow-memory-sampler".to_string())
            .spawn(move || sampler_loop(&shared));
        match spawned {
            Ok(handle) => {
                if let Ok(mut slot) = self.handle.lock() {
                    *slot = Some(handle);
                }
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, "failed to spawn memory sampler thread");
            }
        }
    }
}

fn sampler_loop(shared: &SamplerShared) {
    while shared.running.load(Ordering::SeqCst) {
        let sweep_start = Instant::now();
        shared.sweep();
        let pause = budgeted_delay(sweep_start.elapsed(), shared.duty_cycle);
        // Sleep in slices so shutdown is not stuck behind a long pause.
        let deadline = Instant::now() + pause;
        while shared.running.load(Ordering::SeqCst) && Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(remaining.min(SHUTDOWN_POLL));
        }
    }
}

/// Pause that keeps sweep time at `duty_cycle` of the thread's wall clock.
fn budgeted_delay(elapsed: Duration, duty_cycle: f64) -> Duration {
    let scaled = elapsed.as_secs_f64() * (1.0 - duty_cycle) / duty_cycle;
    Duration::from_secs_f64(scaled).clamp(MIN_SLEEP, MAX_SLEEP)
}
