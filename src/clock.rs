use crate::{
    context::FlowContext,
    error::{FlowError, FlowResult},
    math::{MIN_TIMELINE_DURATION, sanitize_duration},
};

/// Cooperative frame scheduling seam. Production embeds bind this to their
/// presentation clock; tests drive `tick` by hand with synthetic deltas.
pub trait FrameScheduler {
    /// Requests that the owner call `tick` at the next frame opportunity.
    fn schedule_next_frame(&mut self);
    fn cancel_scheduled(&mut self);
    fn has_pending(&self) -> bool;
}

/// Scheduler that only records whether a frame was requested; the test (or
/// export loop) invokes `tick` itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManualScheduler {
    pending: bool,
}

impl FrameScheduler for ManualScheduler {
    fn schedule_next_frame(&mut self) {
        self.pending = true;
    }

    fn cancel_scheduled(&mut self) {
        self.pending = false;
    }

    fn has_pending(&self) -> bool {
        self.pending
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Playing,
    Paused,
}

impl FlowContext {
    pub fn clock_state(&self) -> ClockState {
        if !self.animating {
            ClockState::Idle
        } else if self.paused {
            ClockState::Paused
        } else {
            ClockState::Playing
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub fn has_scheduled_frame(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// Enters `Playing` from the top of the timeline. Refused when nothing
    /// would visibly move.
    pub fn start(&mut self) -> FlowResult<()> {
        self.scheduler.cancel_scheduled();
        if !self.regions.has_playable() {
            self.animating = false;
            return Err(FlowError::animation(
                "no region with a selection and nonzero direction",
            ));
        }
        self.animating = true;
        self.paused = false;
        self.timeline_duration = sanitize_duration(self.timeline_duration);
        self.timeline_elapsed = 0.0;
        for region in self.regions.iter_mut() {
            region.reset_transients();
        }
        tracing::debug!(duration = self.timeline_duration, "animation started");
        self.scheduler.schedule_next_frame();
        Ok(())
    }

    /// One clock step of `delta` seconds. Returns the renderer's active
    /// region count (0 when the clock is not running).
    pub fn tick(&mut self, delta: f64) -> usize {
        if !self.animating || self.paused {
            return 0;
        }
        self.scheduler.cancel_scheduled();

        let duration = self.timeline_duration.max(MIN_TIMELINE_DURATION);
        if delta.is_finite() && delta > 0.0 {
            self.timeline_elapsed += delta;
            if self.loop_mode == crate::core::LoopMode::Once
                && !self.exporting
                && self.timeline_elapsed >= duration
            {
                // Natural completion: clamp, render the final pose, stop.
                self.timeline_elapsed = duration;
                let active = self.render_frame(self.timeline_elapsed, duration, delta);
                self.stop(false);
                return active;
            }
            if self.timeline_elapsed >= duration {
                self.timeline_elapsed %= duration;
            }
        }

        let active = self.render_frame(self.timeline_elapsed, duration, delta.max(0.0));
        if active == 0 && !self.exporting {
            self.stop(false);
            return 0;
        }
        self.scheduler.schedule_next_frame();
        active
    }

    pub fn pause(&mut self) {
        if self.animating {
            self.paused = true;
            self.scheduler.cancel_scheduled();
        }
    }

    pub fn resume(&mut self) {
        if self.animating && self.paused {
            self.paused = false;
            self.scheduler.schedule_next_frame();
        }
    }

    /// Idempotent: always lands in `Idle` with nothing scheduled and the
    /// timeline rewound.
    pub fn stop(&mut self, reset_offsets: bool) {
        self.scheduler.cancel_scheduled();
        self.animating = false;
        self.paused = false;
        self.timeline_elapsed = 0.0;
        if reset_offsets {
            for region in self.regions.iter_mut() {
                region.reset_transients();
            }
        }
    }

    /// Auto-starts playback after a motion-relevant edit so changes are
    /// visible without an explicit play action.
    pub fn maybe_start_live_preview(&mut self) {
        if self.painting || self.exporting || self.animating || self.paused {
            return;
        }
        if self.regions.has_playable() {
            let _ = self.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Canvas, LoopMode, Rect, Vec2};

    fn playable_context() -> FlowContext {
        let mut ctx = FlowContext::new(Canvas::new(100, 100).unwrap());
        ctx.seed_mask(Rect::new(10.0, 10.0, 40.0, 40.0)).unwrap();
        ctx.set_direction(Some(Vec2::new(40.0, 0.0))).unwrap();
        ctx
    }

    #[test]
    fn start_refuses_without_playable_region() {
        let mut ctx = FlowContext::new(Canvas::new(64, 64).unwrap());
        assert!(ctx.start().is_err());
        assert_eq!(ctx.clock_state(), ClockState::Idle);
        assert!(!ctx.has_scheduled_frame());
    }

    #[test]
    fn seeded_region_with_direction_auto_starts() {
        let ctx = playable_context();
        assert_eq!(ctx.clock_state(), ClockState::Playing);
        assert!(ctx.has_scheduled_frame());
    }

    #[test]
    fn tick_advances_and_wraps_the_timeline() {
        let mut ctx = playable_context();
        ctx.set_duration(10.0);
        let active = ctx.tick(2.5);
        assert_eq!(active, 1);
        assert!((ctx.timeline_elapsed - 2.5).abs() < 1e-12);

        ctx.tick(9.0);
        assert!((ctx.timeline_elapsed - 1.5).abs() < 1e-12);
        assert_eq!(ctx.clock_state(), ClockState::Playing);
    }

    #[test]
    fn once_mode_clamps_and_stops_at_the_end() {
        let mut ctx = playable_context();
        ctx.set_loop_mode(LoopMode::Once);
        ctx.set_duration(1.0);
        ctx.start().unwrap();
        let active = ctx.tick(2.0);
        assert_eq!(active, 1);
        assert_eq!(ctx.clock_state(), ClockState::Idle);
        assert!(!ctx.has_scheduled_frame());
    }

    #[test]
    fn auto_stops_when_nothing_moves() {
        let mut ctx = playable_context();
        ctx.regions_mut().active_region_mut().unwrap().direction = Vec2::ZERO;
        assert_eq!(ctx.tick(0.016), 0);
        assert_eq!(ctx.clock_state(), ClockState::Idle);
    }

    #[test]
    fn pause_resume_preserves_elapsed() {
        let mut ctx = playable_context();
        ctx.tick(1.0);
        ctx.pause();
        assert_eq!(ctx.clock_state(), ClockState::Paused);
        assert!(!ctx.has_scheduled_frame());
        assert_eq!(ctx.tick(5.0), 0);
        assert!((ctx.timeline_elapsed - 1.0).abs() < 1e-12);

        ctx.resume();
        assert_eq!(ctx.clock_state(), ClockState::Playing);
        assert!(ctx.has_scheduled_frame());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut ctx = playable_context();
        ctx.tick(1.0);
        ctx.stop(true);
        assert_eq!(ctx.clock_state(), ClockState::Idle);
        assert!(!ctx.has_scheduled_frame());
        assert_eq!(ctx.timeline_elapsed, 0.0);
        ctx.stop(true);
        assert_eq!(ctx.clock_state(), ClockState::Idle);
        assert!(!ctx.has_scheduled_frame());
    }

    #[test]
    fn stop_with_reset_zeroes_region_transients() {
        let mut ctx = playable_context();
        ctx.tick(2.5);
        let offset = ctx.regions().active_region().unwrap().offset;
        assert!(offset.x > 0.0);
        ctx.stop(true);
        let offset = ctx.regions().active_region().unwrap().offset;
        assert_eq!(offset, Vec2::ZERO);
    }
}
