//! Periodic push stream of recomputed tracked values.
//!
//! A [`TickerCore`] owns a fixed, ordered set of [`TrackedValue`]s. Each tick
//! recomputes every value through a [`ValueGenerator`] and publishes the whole
//! set as one snapshot. Subscribers get no replay; the current snapshot is
//! always available through [`TickerCore::snapshot`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::channel::{BroadcastChannel, Subscription};
use crate::error::{HubError, HubResult};
use crate::lock;

/// One entity in the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedValue {
    pub key: String,
    pub label: String,
    pub value: f64,
    pub delta: f64,
    pub delta_percent: f64,
}

impl TrackedValue {
    pub fn new(key: impl Into<String>, label: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            value,
            delta: 0.0,
            delta_percent: 0.0,
        }
    }
}

/// The recomputed numeric fields of a tracked value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub value: f64,
    pub delta: f64,
    pub delta_percent: f64,
}

/// Produces the next value from the previous one.
pub trait ValueGenerator: Send {
    fn next(&mut self, previous: &TrackedValue) -> Tick;
}

/// Random walk: each tick moves the value by a uniform percentage in
/// `[-max_swing_percent, max_swing_percent]`, rounded to cents.
pub struct RandomWalk {
    rng: StdRng,
    max_swing_percent: f64,
}

impl RandomWalk {
    pub fn new(max_swing_percent: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            max_swing_percent,
        }
    }

    /// Reproducible walk for tests and demos.
    pub fn seeded(seed: u64, max_swing_percent: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_swing_percent,
        }
    }
}

impl ValueGenerator for RandomWalk {
    fn next(&mut self, previous: &TrackedValue) -> Tick {
        let swing = self.max_swing_percent.abs();
        let delta_percent = self.rng.gen_range(-swing..=swing);
        let delta = previous.value * (delta_percent / 100.0);
        Tick {
            value: round_cents(previous.value + delta),
            delta: round_cents(delta),
            delta_percent: round_cents(delta_percent),
        }
    }
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// The fixed seed set published by the stock stream.
pub fn default_seed() -> Vec<TrackedValue> {
    vec![
        TrackedValue::new("AAPL", "Apple Inc.", 178.5),
        TrackedValue::new("GOOGL", "Alphabet Inc.", 140.25),
        TrackedValue::new("MSFT", "Microsoft Corp.", 380.75),
        TrackedValue::new("AMZN", "Amazon.com Inc.", 155.3),
        TrackedValue::new("TSLA", "Tesla Inc.", 242.8),
        TrackedValue::new("META", "Meta Platforms", 485.2),
    ]
}

/// Full state of the tracked set at one instant.
pub type Snapshot = Arc<Vec<TrackedValue>>;

struct TickerState {
    current: Snapshot,
    generator: Box<dyn ValueGenerator>,
    ticks: u64,
}

/// Single-producer recomputation loop.
pub struct TickerCore {
    state: Mutex<TickerState>,
    channel: BroadcastChannel<Snapshot>,
    running: AtomicBool,
}

impl TickerCore {
    /// Build a ticker over `seed`. Keys must be unique.
    pub fn new(seed: Vec<TrackedValue>, generator: Box<dyn ValueGenerator>) -> HubResult<Self> {
        let mut keys = HashSet::new();
        if let Some(dup) = seed.iter().find(|v| !keys.insert(v.key.as_str())) {
            return Err(HubError::config(format!("Duplicate tracked key '{}'", dup.key)));
        }

        Ok(Self {
            state: Mutex::new(TickerState {
                current: Arc::new(seed),
                generator,
                ticks: 0,
            }),
            channel: BroadcastChannel::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Current snapshot, without waiting for a tick.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&lock(&self.state).current)
    }

    /// Number of ticks performed so far.
    pub fn ticks(&self) -> u64 {
        lock(&self.state).ticks
    }

    /// Join the stream. The first value arrives with the next tick.
    pub fn subscribe(&self) -> Subscription<Snapshot> {
        self.channel.join()
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Recompute every value and publish the new snapshot.
    pub fn tick(&self) -> Snapshot {
        let mut state = lock(&self.state);
        let TickerState {
            current, generator, ..
        } = &mut *state;

        let next: Vec<TrackedValue> = current
            .iter()
            .map(|previous| {
                let tick = generator.next(previous);
                TrackedValue {
                    value: tick.value,
                    delta: tick.delta,
                    delta_percent: tick.delta_percent,
                    ..previous.clone()
                }
            })
            .collect();

        state.current = Arc::new(next);
        state.ticks += 1;
        let snapshot = Arc::clone(&state.current);
        // Published under the lock so a pull never races ahead of a push.
        let delivered = self.channel.publish(Arc::clone(&snapshot));
        debug!(tick = state.ticks, delivered, "Published ticker snapshot");
        snapshot
    }

    /// Spawn the periodic loop on the current tokio runtime.
    ///
    /// The first tick fires one `period` after start. Only one loop may run
    /// at a time.
    pub fn start(self: &Arc<Self>, period: Duration) -> HubResult<TickerHandle> {
        if period.is_zero() {
            return Err(HubError::config("Tick interval must be greater than zero"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HubError::config("Ticker is already running"));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let core = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "Ticker started");

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        core.tick();
                    }
                }
            }

            core.running.store(false, Ordering::SeqCst);
            info!(ticks = core.ticks(), "Ticker stopped");
        });

        Ok(TickerHandle {
            stop: Some(stop_tx),
            task,
        })
    }
}

/// Control handle for a running ticker loop. Dropping it also stops the loop.
pub struct TickerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Stop the loop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Adds a fixed step to every value.
    struct Step(f64);

    impl ValueGenerator for Step {
        fn next(&mut self, previous: &TrackedValue) -> Tick {
            Tick {
                value: previous.value + self.0,
                delta: self.0,
                delta_percent: self.0 / previous.value * 100.0,
            }
        }
    }

    fn ticker() -> TickerCore {
        TickerCore::new(default_seed(), Box::new(Step(1.0))).unwrap()
    }

    #[test]
    fn test_one_tick_recomputes_every_value() {
        let ticker = ticker();
        let before = ticker.snapshot();
        let after = ticker.tick();

        assert_eq!(after.len(), 6);
        for (old, new) in before.iter().zip(after.iter()) {
            assert_eq!(old.key, new.key);
            assert_eq!(old.label, new.label);
            assert_eq!(new.value, old.value + 1.0);
            assert_eq!(new.delta, 1.0);
        }
    }

    #[test]
    fn test_pull_between_ticks_matches_last_push() {
        let ticker = ticker();
        let mut sub = ticker.subscribe();
        ticker.tick();
        let pushed = sub.try_recv().unwrap();
        assert_eq!(*ticker.snapshot(), *pushed);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_late_subscriber_gets_no_replay() {
        let ticker = ticker();
        ticker.tick();
        let mut sub = ticker.subscribe();
        assert_eq!(sub.try_recv(), None);
        ticker.tick();
        assert_eq!(sub.try_recv().unwrap()[0].value, 180.5);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let seed = vec![TrackedValue::new("A", "a", 1.0), TrackedValue::new("A", "b", 2.0)];
        assert!(matches!(
            TickerCore::new(seed, Box::new(Step(1.0))),
            Err(HubError::Config(_))
        ));
    }

    #[test]
    fn test_random_walk_stays_within_swing() {
        let mut walk = RandomWalk::seeded(7, 2.0);
        let mut current = TrackedValue::new("X", "x", 100.0);
        for _ in 0..200 {
            let tick = walk.next(&current);
            assert!(tick.delta_percent.abs() <= 2.0);
            assert!((tick.value - (current.value + tick.delta)).abs() < 0.011);
            current.value = tick.value;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_pushes_on_interval_until_stopped() {
        let ticker = Arc::new(ticker());
        let mut sub = ticker.subscribe();
        let handle = ticker.start(Duration::from_millis(1000)).unwrap();
        assert!(ticker.start(Duration::from_millis(1000)).is_err());

        let first = sub.recv().await.unwrap();
        assert_eq!(first[0].value, 179.5);
        let second = sub.recv().await.unwrap();
        assert_eq!(second[0].value, 180.5);

        handle.stop().await;
        assert!(!ticker.is_running());
        assert_eq!(ticker.ticks(), 2);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let ticker = Arc::new(ticker());
        assert!(ticker.start(Duration::ZERO).is_err());
        assert!(!ticker.is_running());
    }
}
