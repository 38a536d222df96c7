//! Live capture scheduling.
//!
//! The host owns the timer and polls [`LiveCapture::begin_tick`]. A tick that
//! comes due while the previous one is still running is skipped, never
//! queued, so a slow capture cannot build up a backlog.

use std::time::Duration;
use web_time::Instant;

/// Fixed frame rates offered besides the screen refresh rate.
pub const FPS_CHOICES: &[u32] = &[30, 60, 120, 15, 10];

/// Rate used when the screen refresh rate is unknown.
pub const DEFAULT_FPS: u32 = 60;

/// Highest accepted frame rate.
pub const MAX_FPS: u32 = 240;

/// Selectable rates as (label, fps), screen rate first.
pub fn rate_choices(screen_refresh: u32) -> Vec<(String, u32)> {
    let mut choices = vec![(
        format!("Screen Rate ({screen_refresh} Hz)"),
        screen_refresh,
    )];
    choices.extend(FPS_CHOICES.iter().map(|&fps| (format!("{fps} FPS"), fps)));
    choices
}

/// Tick interval for `fps`, truncated to whole milliseconds.
pub fn interval_for(fps: u32) -> Duration {
    let fps = fps.clamp(1, MAX_FPS);
    Duration::from_millis(u64::from(1000 / fps))
}

/// Proof that a tick is running. Hand it back to [`LiveCapture::finish_tick`].
#[derive(Debug)]
#[must_use = "a started tick must be finished"]
pub struct TickToken {
    started: Instant,
    generation: u64,
}

impl TickToken {
    pub fn started(&self) -> Instant {
        self.started
    }
}

/// Schedules periodic captures.
#[derive(Debug)]
pub struct LiveCapture {
    fps: u32,
    interval: Duration,
    running: bool,
    next_due: Option<Instant>,
    in_flight: bool,
    /// Bumped on every start/stop so stale tokens are recognised.
    generation: u64,
    ticks: u64,
    skipped: u64,
}

impl LiveCapture {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.clamp(1, MAX_FPS),
            interval: interval_for(fps),
            running: false,
            next_due: None,
            in_flight: false,
            generation: 0,
            ticks: 0,
            skipped: 0,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Completed ticks since the last start.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks dropped because the previous one had not finished.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Start ticking; the first tick is due immediately.
    pub fn start(&mut self, now: Instant) {
        self.generation += 1;
        self.running = true;
        self.in_flight = false;
        self.next_due = Some(now);
        self.ticks = 0;
        self.skipped = 0;
        log::info!(
            "Live capture started at {} fps ({}ms interval)",
            self.fps,
            self.interval.as_millis()
        );
    }

    /// Stop ticking. No token is handed out afterwards, and tokens from
    /// before the stop are ignored when finished.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.generation += 1;
        self.running = false;
        self.in_flight = false;
        self.next_due = None;
        log::info!(
            "Live capture stopped after {} ticks ({} skipped)",
            self.ticks,
            self.skipped
        );
    }

    /// Change the rate. A running schedule keeps going at the new rate.
    pub fn set_fps(&mut self, fps: u32, now: Instant) {
        self.fps = fps.clamp(1, MAX_FPS);
        self.interval = interval_for(self.fps);
        if self.running {
            self.next_due = Some(now + self.interval);
        }
        log::debug!("Live capture rate set to {} fps", self.fps);
    }

    /// Poll the schedule. Returns a token when a tick should run now.
    pub fn begin_tick(&mut self, now: Instant) -> Option<TickToken> {
        if !self.running {
            return None;
        }
        let due = self.next_due?;
        if now < due {
            return None;
        }
        self.next_due = Some(now + self.interval);

        if self.in_flight {
            self.skipped += 1;
            log::trace!("Live tick skipped, previous tick still running");
            return None;
        }
        self.in_flight = true;
        Some(TickToken {
            started: now,
            generation: self.generation,
        })
    }

    /// Mark the tick done. Returns its duration, or `None` for a token that
    /// predates the last start/stop.
    pub fn finish_tick(&mut self, token: TickToken, now: Instant) -> Option<Duration> {
        if token.generation != self.generation {
            log::trace!("Ignoring stale live tick");
            return None;
        }
        self.in_flight = false;
        self.ticks += 1;

        let elapsed = now.saturating_duration_since(token.started);
        if elapsed > self.interval {
            log::debug!(
                "Live tick took {}ms, longer than the {}ms interval",
                elapsed.as_millis(),
                self.interval.as_millis()
            );
        } else {
            log::trace!("Live tick took {}us", elapsed.as_micros());
        }
        Some(elapsed)
    }
}

impl Default for LiveCapture {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_intervals() {
        assert_eq!(interval_for(60), ms(16));
        assert_eq!(interval_for(30), ms(33));
        assert_eq!(interval_for(120), ms(8));
        assert_eq!(interval_for(0), ms(1000));
    }

    #[test]
    fn test_rate_choices() {
        let choices = rate_choices(75);
        assert_eq!(choices[0], ("Screen Rate (75 Hz)".to_string(), 75));
        assert_eq!(choices.len(), 6);
        assert_eq!(choices[5], ("10 FPS".to_string(), 10));
    }

    #[test]
    fn test_not_running_gives_no_ticks() {
        let mut live = LiveCapture::new(10);
        assert!(live.begin_tick(Instant::now()).is_none());
    }

    #[test]
    fn test_ticks_follow_interval() {
        let t0 = Instant::now();
        let mut live = LiveCapture::new(10);
        live.start(t0);

        let token = live.begin_tick(t0).unwrap();
        assert_eq!(live.finish_tick(token, t0 + ms(5)), Some(ms(5)));
        assert!(live.begin_tick(t0 + ms(50)).is_none());

        let token = live.begin_tick(t0 + ms(100)).unwrap();
        live.finish_tick(token, t0 + ms(110));
        assert_eq!(live.ticks(), 2);
        assert_eq!(live.skipped(), 0);
    }

    #[test]
    fn test_overlapping_tick_is_skipped() {
        let t0 = Instant::now();
        let mut live = LiveCapture::new(10);
        live.start(t0);

        let slow = live.begin_tick(t0).unwrap();
        assert!(live.begin_tick(t0 + ms(100)).is_none());
        assert!(live.begin_tick(t0 + ms(200)).is_none());
        assert_eq!(live.skipped(), 2);

        assert_eq!(live.finish_tick(slow, t0 + ms(250)), Some(ms(250)));
        assert!(live.begin_tick(t0 + ms(300)).is_some());
    }

    #[test]
    fn test_stop_invalidates_tokens() {
        let t0 = Instant::now();
        let mut live = LiveCapture::new(30);
        live.start(t0);
        let token = live.begin_tick(t0).unwrap();
        live.stop();

        assert!(live.begin_tick(t0 + ms(500)).is_none());
        assert_eq!(live.finish_tick(token, t0 + ms(10)), None);
        assert_eq!(live.ticks(), 0);
    }

    #[test]
    fn test_set_fps_while_running() {
        let t0 = Instant::now();
        let mut live = LiveCapture::new(10);
        live.start(t0);
        live.set_fps(120, t0);
        assert_eq!(live.interval(), ms(8));
        assert!(live.begin_tick(t0 + ms(4)).is_none());
        assert!(live.begin_tick(t0 + ms(8)).is_some());
    }
}
