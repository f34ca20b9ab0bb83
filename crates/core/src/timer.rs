//! High-resolution timers for frame timing and FPS reporting.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts frames and reports a rate once per reporting interval.
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
    interval: Duration,
}

impl FpsCounter {
    /// Create a counter that reports once per second.
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    /// Create a counter with a custom reporting interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            interval,
        }
    }

    /// Record one frame at the current instant.
    ///
    /// Returns `Some(frames_per_second)` when the interval has elapsed.
    pub fn frame(&mut self) -> Option<f32> {
        self.frame_at(Instant::now())
    }

    /// Record one frame at `now`.
    pub fn frame_at(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_tick_is_monotonic() {
        let mut timer = Timer::new();
        let first = timer.tick();
        let second = timer.tick();
        assert!(first >= Duration::ZERO);
        assert!(second >= Duration::ZERO);
        assert!(timer.elapsed() >= first);
    }

    #[test]
    fn test_fps_counter_reports_after_interval() {
        let mut counter = FpsCounter::with_interval(Duration::from_secs(1));
        let start = counter.window_start;

        for i in 1..60 {
            let t = start + Duration::from_millis(i * 10);
            assert!(counter.frame_at(t).is_none());
        }

        let fps = counter
            .frame_at(start + Duration::from_secs(2))
            .expect("interval elapsed");
        assert!((fps - 30.0).abs() < 0.01);
        assert_eq!(counter.frames, 0);
    }
}
