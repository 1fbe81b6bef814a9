pub use std::time::Instant;

/// Frame gating with an optional frame-rate limit.
///
/// Without a limit every frame renders and `delta_time` is the time since the
/// previous frame. With a limit, `delta_time` grows from the last accepted
/// frame until it reaches the frame budget.
#[derive(Clone, Debug)]
pub struct Timing {
    started: Instant,
    fps: u32,
    frame_time: f32,
    delta_time: f32,
    last_frame: f64,
    current: f64,
}

impl Timing {
    /// `fps_limit` of 0 disables the limit.
    pub fn new(fps_limit: u32) -> Self {
        Self {
            started: Instant::now(),
            fps: fps_limit,
            frame_time: if fps_limit > 0 {
                1.0 / fps_limit as f32
            } else {
                0.0
            },
            delta_time: 0.0,
            last_frame: 0.0,
            current: 0.0,
        }
    }

    pub fn fps_limit(&self) -> u32 {
        self.fps
    }

    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    /// Seconds since this timer was created.
    pub fn uptime(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Sample the wall clock.
    pub fn tick(&mut self) {
        let now = self.uptime();
        self.process_timing(now);
    }

    /// Update `delta_time` for the frame at `now` seconds.
    pub fn process_timing(&mut self, now: f64) {
        self.current = now;
        self.delta_time = (now - self.last_frame) as f32;
        if self.fps == 0 {
            self.last_frame = now;
        }
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Whether the frame sampled last should be drawn. Accepting a frame
    /// under a limit starts the next frame interval from it.
    pub fn should_render(&mut self) -> bool {
        if self.delta_time < self.frame_time {
            return false;
        }
        if self.fps > 0 {
            self.last_frame = self.current;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_renders_every_frame() {
        let mut timing = Timing::new(0);
        timing.process_timing(0.5);
        assert!(timing.should_render());
        timing.process_timing(0.51);
        assert!((timing.delta_time() - 0.01).abs() < 1e-6);
        assert!(timing.should_render());
    }

    #[test]
    fn limit_waits_for_the_frame_budget() {
        let mut timing = Timing::new(60);
        assert!((timing.frame_time() - 1.0 / 60.0).abs() < 1e-7);

        timing.process_timing(0.01);
        assert!(!timing.should_render());
        timing.process_timing(0.02);
        assert!(timing.should_render());

        // the accepted frame at 0.02 becomes the new baseline
        timing.process_timing(0.03);
        assert!((timing.delta_time() - 0.01).abs() < 1e-6);
        assert!(!timing.should_render());
        timing.process_timing(0.04);
        assert!(timing.should_render());
    }
}
