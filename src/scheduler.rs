use std::time::{Duration, Instant};

pub const DEFAULT_UPDATE_HZ: u32 = 30;
/// Upper bound on the analysis rate; keeps the interval at one millisecond or more.
pub const MAX_UPDATE_HZ: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Scheduler is not running
    Idle,
    NotDue,
    /// Work ran; `dropped` intervals were missed and will not be replayed
    Ran { dropped: u32 },
    /// Previous tick still in progress
    Skipped,
}

/// Proof that a tick was started, handed back to [`UpdateScheduler::finish`].
#[derive(Debug)]
#[must_use]
pub struct TickToken {
    epoch: u64,
    dropped: u32,
}

/// Fixed-rate timer for analysis updates, decoupled from the display rate.
///
/// The host polls it from whatever loop it runs; ticks never queue up. A tick
/// that comes due while the previous one is still running is skipped, and a
/// poll that arrives several intervals late runs once.
#[derive(Debug)]
pub struct UpdateScheduler {
    interval: Duration,
    epoch: u64,
    next_due: Option<Instant>,
    busy: bool,
    ran: u64,
    skipped: u64,
    dropped: u64,
}

impl UpdateScheduler {
    pub fn new(rate_hz: u32) -> Self {
        let clamped = rate_hz.clamp(1, MAX_UPDATE_HZ);
        if clamped != rate_hz {
            log::warn!("Update rate {} Hz out of range, using {} Hz", rate_hz, clamped);
        }
        let rate_hz = clamped;
        Self {
            interval: Duration::from_secs(1) / rate_hz,
            epoch: 0,
            next_due: None,
            busy: false,
            ran: 0,
            skipped: 0,
            dropped: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn ticks_run(&self) -> u64 {
        self.ran
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.skipped
    }

    pub fn ticks_dropped(&self) -> u64 {
        self.dropped
    }

    /// Start ticking one interval from `now`, cancelling any running instance.
    pub fn start(&mut self, now: Instant) {
        if self.is_running() {
            log::debug!("Cancelling running update scheduler (epoch {})", self.epoch);
            self.stop();
        }
        self.epoch += 1;
        self.next_due = Some(now + self.interval);
        log::debug!(
            "Update scheduler started at {:.1} Hz (epoch {})",
            1.0 / self.interval.as_secs_f64(),
            self.epoch
        );
    }

    pub fn stop(&mut self) {
        self.next_due = None;
        self.busy = false;
        self.epoch += 1;
    }

    /// Begin a tick if one is due.
    pub fn begin(&mut self, now: Instant) -> Result<TickToken, Tick> {
        let Some(due) = self.next_due else {
            return Err(Tick::Idle);
        };
        if now < due {
            return Err(Tick::NotDue);
        }

        let missed = ((now - due).as_nanos() / self.interval.as_nanos()) as u32;
        self.next_due = Some(due + self.interval * (missed + 1));

        if self.busy {
            self.skipped += 1;
            log::trace!("Update tick skipped: previous tick still running");
            return Err(Tick::Skipped);
        }

        self.busy = true;
        self.dropped += missed as u64;
        if missed > 0 {
            log::trace!("Update scheduler dropped {} late tick(s)", missed);
        }
        Ok(TickToken {
            epoch: self.epoch,
            dropped: missed,
        })
    }

    /// Finish a tick. Tokens from a cancelled instance are ignored.
    pub fn finish(&mut self, token: TickToken) -> Tick {
        if token.epoch != self.epoch {
            return Tick::Idle;
        }
        self.busy = false;
        self.ran += 1;
        Tick::Ran {
            dropped: token.dropped,
        }
    }

    /// Run `work` if a tick is due.
    pub fn poll<E>(&mut self, now: Instant, work: impl FnOnce() -> Result<(), E>) -> Result<Tick, E> {
        let token = match self.begin(now) {
            Ok(token) => token,
            Err(tick) => return Ok(tick),
        };
        let result = work();
        let tick = self.finish(token);
        result.map(|_| tick)
    }
}
