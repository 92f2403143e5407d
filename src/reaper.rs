use crate::multitouch::TouchEvent;
use crate::normalizer::EventNormalizer;
use std::time::Duration;
use tracing::debug;

/// How long to wait for more moves before declaring a point dead.
pub const TOUCH_WAIT_TIME_MS: u64 = 75;

/// Sweep interval while the hardware is still reporting.
pub const ACTIVE_SWEEP_INTERVAL: Duration = Duration::from_millis(5);

/// Result of one reaper sweep.
#[derive(Debug, PartialEq)]
pub enum Sweep {
    /// Ticks arrived since the previous sweep; nothing was inspected.
    Active,
    /// The hardware was quiet; these points were declared dead.
    Quiet(Vec<TouchEvent>),
}

/// Forces deaths for points the hardware stopped reporting on. The panel
/// reports a full release only when the next touch arrives, which may be
/// minutes later.
pub struct IdleReaper {
    wait_ms: u64,
    last_seen_tick: Option<u64>,
}

impl IdleReaper {
    pub fn new(wait_ms: u64) -> Self {
        Self {
            wait_ms,
            last_seen_tick: None,
        }
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Interval to sleep after a sweep with the given outcome.
    pub fn interval_after(&self, sweep: &Sweep) -> Duration {
        match sweep {
            Sweep::Active => ACTIVE_SWEEP_INTERVAL,
            Sweep::Quiet(_) => self.wait(),
        }
    }

    /// Inspect the registry. `last_tick_ms` is the time of the most recent
    /// hardware tick, if any has arrived.
    pub fn sweep(
        &mut self,
        normalizer: &mut EventNormalizer,
        last_tick_ms: Option<u64>,
        now_ms: u64,
    ) -> Sweep {
        if last_tick_ms != self.last_seen_tick {
            self.last_seen_tick = last_tick_ms;
            return Sweep::Active;
        }
        let Some(last_tick) = last_tick_ms else {
            return Sweep::Quiet(Vec::new());
        };

        let idle = now_ms.saturating_sub(last_tick);
        if idle <= self.wait_ms {
            return Sweep::Quiet(Vec::new());
        }

        let mut events = Vec::new();
        for slot in normalizer.registry().alive().iter() {
            let Some(point) = normalizer.registry().point(slot) else {
                continue;
            };
            // Don't hand the server a timestamp from before a long gap.
            let refresh = (now_ms.saturating_sub(point.sent_ms) > self.wait_ms * 2).then_some(now_ms);
            debug!(slot, idle_ms = idle, "killing idle point");
            events.extend(normalizer.force_death(slot, refresh));
        }
        Sweep::Quiet(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multitouch::{DisplaySize, EventKind, HardwareState, SlotReport, TouchTick};

    fn normalizer_with_touch(slot: usize, at_ms: u64) -> EventNormalizer {
        let mut n = EventNormalizer::new(DisplaySize::new(100.0, 100.0));
        let tick = TouchTick::touches(vec![SlotReport::new(slot, HardwareState::Down, 5.0, 5.0)]);
        n.process_tick(&tick, at_ms);
        n
    }

    #[test]
    fn new_ticks_keep_the_reaper_idle() {
        let mut n = normalizer_with_touch(2, 100);
        let mut reaper = IdleReaper::new(TOUCH_WAIT_TIME_MS);
        assert_eq!(reaper.sweep(&mut n, Some(100), 500), Sweep::Active);
        assert_eq!(reaper.sweep(&mut n, Some(450), 500), Sweep::Active);
        assert_eq!(n.registry().alive_count(), 1);
    }

    #[test]
    fn kills_exactly_once_after_the_wait() {
        let mut n = normalizer_with_touch(2, 100);
        let mut reaper = IdleReaper::new(TOUCH_WAIT_TIME_MS);
        assert_eq!(reaper.sweep(&mut n, Some(100), 110), Sweep::Active);

        // Not yet past the threshold.
        assert_eq!(reaper.sweep(&mut n, Some(100), 175), Sweep::Quiet(vec![]));

        let Sweep::Quiet(events) = reaper.sweep(&mut n, Some(100), 176) else {
            panic!("expected a quiet sweep");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Death);
        assert_eq!(events[0].slot, 2);
        // Last record went out at 100, so 176 is still inside twice the wait.
        assert_eq!(events[0].time_ms, 100);

        assert_eq!(reaper.sweep(&mut n, Some(100), 500), Sweep::Quiet(vec![]));
        assert_eq!(n.registry().alive_count(), 0);
    }

    #[test]
    fn stale_points_get_a_fresh_timestamp() {
        let mut n = normalizer_with_touch(4, 100);
        let mut reaper = IdleReaper::new(TOUCH_WAIT_TIME_MS);
        reaper.sweep(&mut n, Some(100), 100);

        let Sweep::Quiet(events) = reaper.sweep(&mut n, Some(100), 300) else {
            panic!("expected a quiet sweep");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time_ms, 300);
    }

    #[test]
    fn no_ticks_means_nothing_to_do() {
        let mut n = EventNormalizer::new(DisplaySize::new(1.0, 1.0));
        let mut reaper = IdleReaper::new(TOUCH_WAIT_TIME_MS);
        assert_eq!(reaper.sweep(&mut n, None, 1_000), Sweep::Quiet(vec![]));
    }

    #[test]
    fn interval_tracks_activity() {
        let reaper = IdleReaper::new(TOUCH_WAIT_TIME_MS);
        assert_eq!(reaper.interval_after(&Sweep::Active), ACTIVE_SWEEP_INTERVAL);
        assert_eq!(
            reaper.interval_after(&Sweep::Quiet(vec![])),
            Duration::from_millis(TOUCH_WAIT_TIME_MS)
        );
    }
}
