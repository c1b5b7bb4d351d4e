use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::{ClockTime, DaemonConfig, REARM_AT};
use crate::dish_client::DishClient;
use crate::obstruction_log::{ObstructionLog, ObstructionSample};
use crate::status::StatusService;

/// Timing of the background jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// Pause between evaluations of the timers.
    pub tick: Duration,
    pub keepalive_interval: Duration,
    /// Delay before the first keep-alive after startup.
    pub keepalive_delay: Duration,
    pub obstruction_interval: Duration,
    /// Delay before the first obstruction sample after startup.
    pub obstruction_delay: Duration,
    /// UTC minutes at which the obstruction map is reset each day.
    pub reset_times: Vec<ClockTime>,
    /// UTC minute at which fired resets are forgotten for the new day.
    pub rearm_at: ClockTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(120),
            keepalive_delay: Duration::from_secs(2),
            obstruction_interval: Duration::from_secs(300),
            obstruction_delay: Duration::from_secs(5),
            reset_times: vec![
                ClockTime { hour: 0, minute: 0 },
                ClockTime { hour: 12, minute: 0 },
            ],
            rearm_at: REARM_AT,
        }
    }
}

impl ScheduleConfig {
    pub fn from_daemon(config: &DaemonConfig) -> Self {
        Self {
            keepalive_interval: config.keepalive_interval,
            obstruction_interval: config.obstruction_interval,
            reset_times: config.reset_times.clone(),
            ..Self::default()
        }
    }
}

/// Deadlines and the per-day set of resets already fired. Only the
/// scheduler loop writes it.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    pub next_keepalive_due: Instant,
    pub next_obstruction_log_due: Instant,
    pub reset_fired_today: BTreeSet<ClockTime>,
}

/// What a single tick did. `None` means the job was not due.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub keepalive: Option<bool>,
    pub reset: Option<bool>,
    pub obstruction_logged: Option<bool>,
}

/// Deadline-driven dispatcher for keep-alive polls, daily obstruction map
/// resets and obstruction logging.
///
/// Each job reschedules from the time it ran, not from the missed deadline,
/// so a stalled process never fires a burst of catch-up runs. Failures are
/// logged and never delay another job.
pub struct Scheduler<C: DishClient> {
    service: Arc<StatusService<C>>,
    log: Arc<ObstructionLog>,
    config: ScheduleConfig,
    state: SchedulerState,
}

impl<C: DishClient> Scheduler<C> {
    pub fn new(
        service: Arc<StatusService<C>>,
        log: Arc<ObstructionLog>,
        config: ScheduleConfig,
        now: Instant,
    ) -> Self {
        let state = SchedulerState {
            next_keepalive_due: now + config.keepalive_delay,
            next_obstruction_log_due: now + config.obstruction_delay,
            reset_fired_today: BTreeSet::new(),
        };
        Self {
            service,
            log,
            config,
            state,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Evaluate all three timers once against `now` (monotonic) and `wall` (UTC).
    pub async fn tick(&mut self, now: Instant, wall: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        if now >= self.state.next_keepalive_due {
            report.keepalive = Some(self.keepalive().await);
            self.state.next_keepalive_due = now + self.config.keepalive_interval;
        }

        let minute = ClockTime::of(&wall);
        if self.config.reset_times.contains(&minute) && !self.state.reset_fired_today.contains(&minute) {
            report.reset = Some(self.reset(minute).await);
            // Marked whether or not it worked; there is no retry within the minute.
            self.state.reset_fired_today.insert(minute);
        }
        if minute == self.config.rearm_at && !self.state.reset_fired_today.is_empty() {
            log::debug!("[SCHED] rearming daily resets");
            self.state.reset_fired_today.clear();
        }

        if now >= self.state.next_obstruction_log_due {
            report.obstruction_logged = Some(self.log_obstruction(wall).await);
            self.state.next_obstruction_log_due = now + self.config.obstruction_interval;
        }

        report
    }

    async fn keepalive(&self) -> bool {
        match self.service.keepalive().await {
            Ok(_) => {
                log::info!("[SCHED] keep-alive ok");
                true
            }
            Err(e) => {
                log::warn!("[SCHED] keep-alive failed: {}", e);
                false
            }
        }
    }

    async fn reset(&self, minute: ClockTime) -> bool {
        match self.service.reset_obstruction_map().await {
            Ok(_) => {
                log::info!("[SCHED] obstruction map reset ({} UTC)", minute);
                true
            }
            Err(e) => {
                log::warn!("[SCHED] obstruction map reset ({} UTC) failed: {}", minute, e);
                false
            }
        }
    }

    /// Append the current obstruction fraction. A failed poll or a payload
    /// without a fraction skips this round quietly.
    async fn log_obstruction(&self, wall: DateTime<Utc>) -> bool {
        let fraction = match self.service.status().await {
            Ok(report) => report.obstruction_fraction(),
            Err(e) => {
                log::debug!("[SCHED] obstruction sample skipped: {}", e);
                return false;
            }
        };
        let Some(fraction) = fraction else {
            log::debug!("[SCHED] obstruction sample skipped: no fraction in status");
            return false;
        };

        // The store rewrites the whole file, so keep it off the runtime threads.
        let store = Arc::clone(&self.log);
        let sample = ObstructionSample::new(fraction, wall);
        match tokio::task::spawn_blocking(move || store.append(sample)).await {
            Ok(Ok(retained)) => {
                log::info!(
                    "[LOG] obstruction {:.3}% recorded ({} samples)",
                    fraction * 100.0,
                    retained
                );
                true
            }
            Ok(Err(e)) => {
                log::warn!("[LOG] {}", e);
                false
            }
            Err(e) => {
                log::warn!("[LOG] obstruction append task failed: {}", e);
                false
            }
        }
    }

    /// Tick until `shutdown` turns true or its sender goes away. A tick that is
    /// already talking to the dish finishes before the loop exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let resets: Vec<String> = self.config.reset_times.iter().map(ToString::to_string).collect();
        log::info!(
            "[SCHED] keep-alive every {}s, obstruction map reset at {} UTC, obstruction log every {}s",
            self.config.keepalive_interval.as_secs(),
            resets.join(" / "),
            self.config.obstruction_interval.as_secs()
        );

        while !*shutdown.borrow() {
            self.tick(Instant::now(), Utc::now()).await;

            tokio::select! {
                _ = sleep(self.config.tick) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        log::info!("[SCHED] stopped");
    }
}
