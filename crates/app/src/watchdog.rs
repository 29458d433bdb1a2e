//! Stale-stage supervision for the producer pipeline.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tracing::error;

pub(crate) const WATCHDOG_POLL_INTERVAL_MS: u64 = 500;
pub(crate) const WATCHDOG_STALE_THRESHOLD_MS: u64 = 2_000;
pub(crate) const WATCHDOG_STARTUP_GRACE_MS: u64 = 5_000;

/// Pipeline stages that report heartbeats.
#[derive(Copy, Clone, Debug)]
#[repr(usize)]
pub(crate) enum HealthComponent {
    Capture = 0,
    Estimator = 1,
    Publisher = 2,
}

impl HealthComponent {
    const COUNT: usize = 3;
    const ALL: [HealthComponent; Self::COUNT] = [
        HealthComponent::Capture,
        HealthComponent::Estimator,
        HealthComponent::Publisher,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            HealthComponent::Capture => "capture",
            HealthComponent::Estimator => "estimation",
            HealthComponent::Publisher => "publish",
        }
    }
}

/// Per-stage heartbeat timestamps, seeded with a startup grace period.
pub(crate) struct PipelineHealth {
    beats: [AtomicU64; HealthComponent::COUNT],
}

impl PipelineHealth {
    pub(crate) fn new() -> Self {
        let grace_deadline = current_millis().saturating_add(WATCHDOG_STARTUP_GRACE_MS);
        Self {
            beats: std::array::from_fn(|_| AtomicU64::new(grace_deadline)),
        }
    }

    pub(crate) fn beat(&self, component: HealthComponent) {
        self.beats[component as usize].store(current_millis(), Ordering::Relaxed);
    }

    pub(crate) fn stale_component(&self, now: u64) -> Option<HealthComponent> {
        HealthComponent::ALL.into_iter().find(|component| {
            let last = self.beats[*component as usize].load(Ordering::Relaxed);
            now.saturating_sub(last) > WATCHDOG_STALE_THRESHOLD_MS
        })
    }
}

/// Records whether the watchdog fired and which stage it blamed.
pub(crate) struct WatchdogState {
    triggered: AtomicBool,
    reason: Mutex<Option<HealthComponent>>,
}

impl WatchdogState {
    pub(crate) fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            reason: Mutex::new(None),
        }
    }

    pub(crate) fn arm(&self, component: HealthComponent) {
        if let Ok(mut guard) = self.reason.lock() {
            *guard = Some(component);
        }
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub(crate) fn reason(&self) -> Option<HealthComponent> {
        match self.reason.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        }
    }
}

/// Spawn the supervision thread; it clears `running` when a stage stalls.
pub(crate) fn spawn_watchdog(
    health: Arc<PipelineHealth>,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    state: Arc<WatchdogState>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("posewatch-watchdog".into())
        .spawn(move || {
            while running.load(Ordering::Relaxed) && !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));
                let now = current_millis();
                if let Some(component) = health.stale_component(now) {
                    error!(
                        "Watchdog detected stalled {} stage; requesting pipeline restart",
                        component.label()
                    );
                    state.arm(component);
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        })
        .expect("failed to spawn watchdog thread")
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
