use std::time::Duration;

use tokio::time::Instant;

/// Elapsed recording time, excluding paused intervals
///
/// Time is accumulated at pause boundaries instead of being derived from
/// the start instant, so pausing freezes the reading exactly.
#[derive(Debug, Default, Clone)]
pub(crate) struct ElapsedClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl ElapsedClock {
    pub(crate) fn start(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(now);
    }

    pub(crate) fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub(crate) fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = None;
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }
}
