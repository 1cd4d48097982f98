//! Engine clock

use std::time::Instant;

/// Wall clock sampled once per frame
///
/// `time_ms` is what animators see: milliseconds since the timer was built,
/// frozen between calls to `update`.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_frame: Instant,
    delta_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Timer at frame zero
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta_time: 0.0,
            frame_count: 0,
        }
    }

    /// Sample the clock and advance the frame counter
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Seconds between the last two samples
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Milliseconds from creation to the last sample, saturating at `u32::MAX`
    pub fn time_ms(&self) -> u32 {
        let elapsed = self.last_frame.duration_since(self.start).as_millis();
        u32::try_from(elapsed).unwrap_or(u32::MAX)
    }

    /// Number of `update` calls so far
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
