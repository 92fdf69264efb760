use std::f64::consts::TAU;

use crate::{
    core::{Bounds, LoopMode, Vec2},
    math::clamp01,
};

pub const REGION_SPEED_DEFAULT: f64 = 1.0;
pub const DEFAULT_BASE_SPEED: f64 = 6.0;

/// Shape function mapping cycle progress to motion amplitude fraction.
///
/// `Once` is the identity ramp, `PingPong` a triangle (0 -> 1 -> 0), `Loop` a
/// raised cosine with zero velocity at both ends so loop boundaries are
/// seamless.
pub fn travel_wave(progress: f64, mode: LoopMode) -> f64 {
    let t = clamp01(progress);
    match mode {
        LoopMode::Once => t,
        LoopMode::PingPong => {
            if t < 0.5 {
                t * 2.0
            } else {
                2.0 - t * 2.0
            }
        }
        LoopMode::Loop => 0.5 - 0.5 * (t * TAU).cos(),
    }
}

/// Clamps each axis of `direction` to the magnitude of the selection's own
/// width/height, so a layer can never travel clear of its silhouette.
pub fn clamp_offset_to_bounds(direction: Vec2, bounds: Bounds) -> Vec2 {
    let limit_x = f64::from(bounds.w);
    let limit_y = f64::from(bounds.h);
    let x = if direction.x.is_finite() {
        direction.x.clamp(-limit_x, limit_x)
    } else {
        0.0
    };
    let y = if direction.y.is_finite() {
        direction.y.clamp(-limit_y, limit_y)
    } else {
        0.0
    };
    Vec2::new(x, y)
}

#[derive(Clone, Copy, Debug)]
pub struct MotionInput {
    pub direction: Vec2,
    pub region_speed: f64,
    pub base_speed: f64,
    pub loop_mode: LoopMode,
    /// Crossfade enabled and not oscillating: motion shares the fade's
    /// linear ramp instead of the loop-mode wave.
    pub crossfade_linear: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionSample {
    pub offset: Vec2,
    /// Whether this region keeps the animation session alive.
    pub active: bool,
}

impl MotionSample {
    fn stationary() -> Self {
        Self {
            offset: Vec2::ZERO,
            active: false,
        }
    }
}

/// Resolves a region's displacement at normalized time `t` in [0, 1).
pub fn resolve_motion(t: f64, input: &MotionInput, selection: Bounds) -> MotionSample {
    let direction_length = input.direction.hypot();
    if !direction_length.is_finite() || direction_length == 0.0 {
        return MotionSample::stationary();
    }

    let effective_speed = {
        let s = input.base_speed * input.region_speed;
        if s.is_finite() { s.max(0.0) } else { 0.0 }
    };
    // Amplitude saturates at 1 so high speeds raise oscillation rate, not
    // displacement.
    let amplitude_scale = effective_speed.min(1.0);

    let cycles = match input.loop_mode {
        LoopMode::Once => 1.0,
        _ => effective_speed.max(1.0).round().max(1.0),
    };
    let cycle_progress = match input.loop_mode {
        LoopMode::Once => clamp01(t),
        _ => (clamp01(t) * cycles).fract(),
    };

    let travel = if input.crossfade_linear {
        cycle_progress
    } else {
        travel_wave(cycle_progress, input.loop_mode)
    };

    let max_offset = clamp_offset_to_bounds(input.direction, selection);
    MotionSample {
        offset: Vec2::new(
            max_offset.x * amplitude_scale * travel,
            max_offset.y * amplitude_scale * travel,
        ),
        active: amplitude_scale > 0.0,
    }
}

/// Per-region opacity modulation between two alpha bounds.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct Crossfade {
    pub enabled: bool,
    pub speed: f64,
    pub min: f64,
    pub max: f64,
    /// Current waveform phase; transient, written back on every resolve.
    pub phase: f64,
    /// Sine-wave round trip when true; sawtooth fade-down-and-snap when
    /// false.
    pub oscillate: bool,
}

impl Default for Crossfade {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: 0.3,
            min: 0.2,
            max: 0.9,
            phase: 0.0,
            oscillate: false,
        }
    }
}

impl Crossfade {
    /// Clamps bounds into [0,1] and swaps them when min > max. Idempotent.
    pub fn sanitize(&mut self) {
        self.min = clamp01(self.min);
        self.max = clamp01(self.max);
        if self.min > self.max {
            std::mem::swap(&mut self.min, &mut self.max);
        }
        if !self.speed.is_finite() || self.speed < 0.01 {
            self.speed = 0.01;
        }
        if !self.phase.is_finite() {
            self.phase = 0.0;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossfadeSample {
    pub alpha: f64,
    pub phase: f64,
    /// Fraction of alpha's position within [min, max]; scales offset and
    /// jitter so a fully faded region also sits at its rest position.
    pub normalized_travel: f64,
}

/// Alpha for a given phase. Oscillating mode treats `phase` as radians of a
/// sine; otherwise `phase` is a 0..1 progress and alpha ramps from max down
/// to min (sawtooth, restarting each cycle — deliberately not a round trip).
pub fn crossfade_alpha(phase: f64, min: f64, max: f64, oscillate: bool) -> f64 {
    let safe_min = clamp01(min.min(max));
    let safe_max = clamp01(min.max(max));
    let amplitude = safe_max - safe_min;
    let normalized = if oscillate {
        let radians = if phase.is_finite() { phase } else { 0.0 };
        (radians.sin() + 1.0) / 2.0
    } else {
        1.0 - clamp01(phase)
    };
    safe_min + amplitude * normalized
}

/// Resolves a region's crossfade at normalized time `t` in [0, 1).
pub fn resolve_crossfade(t: f64, loop_mode: LoopMode, cf: &Crossfade) -> CrossfadeSample {
    if !cf.enabled {
        return CrossfadeSample {
            alpha: 1.0,
            phase: cf.phase,
            normalized_travel: 1.0,
        };
    }

    let speed = if cf.speed.is_finite() {
        cf.speed.max(0.0)
    } else {
        0.0
    };
    let (alpha, phase) = if cf.oscillate {
        // Phase accumulates with normalized time, not wall clock, so fade
        // rate is tied to the timeline like motion is.
        let phase = clamp01(t) * TAU * speed.max(1.0);
        (crossfade_alpha(phase, cf.min, cf.max, true), phase)
    } else {
        let cycles = speed.max(1.0).round().max(1.0);
        let cycle_progress = match loop_mode {
            LoopMode::Once => clamp01(t),
            _ => (clamp01(t) * cycles).fract(),
        };
        let progress = clamp01(cycle_progress);
        (crossfade_alpha(progress, cf.min, cf.max, false), progress)
    };

    let safe_min = clamp01(cf.min.min(cf.max));
    let safe_max = clamp01(cf.min.max(cf.max));
    let span = safe_max - safe_min;
    let normalized_travel = if span > 0.0 {
        clamp01((alpha - safe_min) / span)
    } else {
        1.0
    };

    CrossfadeSample {
        alpha,
        phase,
        normalized_travel,
    }
}
