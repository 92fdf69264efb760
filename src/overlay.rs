use crate::{
    core::Point,
    math::{SplitMix64, wrap_value},
    surface::{Surface, premul_color},
};

pub const RAIN_BASE_COUNT: f64 = 140.0;
pub const SNOW_BASE_COUNT: f64 = 100.0;

const RAIN_SPEED_RANGE: (f64, f64) = (320.0, 520.0);
const SNOW_SPEED_RANGE: (f64, f64) = (40.0, 80.0);
const RAIN_LENGTH_RANGE: (f64, f64) = (12.0, 20.0);
const SNOW_RADIUS_RANGE: (f64, f64) = (1.0, 3.0);
const SNOW_DRIFT_RANGE: (f64, f64) = (-30.0, 30.0);

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    #[default]
    None,
    Rain,
    Snow,
}

pub fn clamp_overlay_size(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.5;
    }
    value.min(4.0)
}

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct OverlayConfig {
    pub kind: OverlayKind,
    pub intensity: f64,
    /// Signed horizontal wind, px/s.
    pub wind: f64,
    /// Particle size multiplier, clamped to [0.5, 4].
    pub size: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            kind: OverlayKind::None,
            intensity: 1.0,
            wind: 0.0,
            size: 1.0,
        }
    }
}

impl OverlayConfig {
    pub fn sanitize(&mut self) {
        if !self.intensity.is_finite() || self.intensity < 0.0 {
            self.intensity = 0.0;
        }
        if !self.wind.is_finite() {
            self.wind = 0.0;
        }
        self.size = clamp_overlay_size(self.size);
    }
}

/// One weather particle. Lengths and radii are stored pre-scaled by the
/// overlay size; particles are regenerated whenever size changes.
#[derive(Clone, Copy, Debug)]
pub enum Particle {
    Rain {
        x: f64,
        y: f64,
        speed: f64,
        length: f64,
    },
    Snow {
        x: f64,
        y: f64,
        speed: f64,
        radius: f64,
        drift: f64,
    },
}

/// Reference density is `base * intensity`, rounded; rain 140 and snow 100
/// at intensity 1.
pub fn particle_count(kind: OverlayKind, intensity: f64) -> usize {
    let base = match kind {
        OverlayKind::None => 0.0,
        OverlayKind::Rain => RAIN_BASE_COUNT,
        OverlayKind::Snow => SNOW_BASE_COUNT,
    };
    let multiplier = if intensity.is_finite() {
        intensity.max(0.0)
    } else {
        0.0
    };
    (base * multiplier).round().max(0.0) as usize
}

pub fn generate_particles(
    kind: OverlayKind,
    count: usize,
    width: u32,
    height: u32,
    size: f64,
    rng: &mut SplitMix64,
) -> Vec<Particle> {
    let w = f64::from(width.max(1));
    let h = f64::from(height.max(1));
    let scale = clamp_overlay_size(size);
    let mut particles = Vec::with_capacity(count);
    match kind {
        OverlayKind::None => {}
        OverlayKind::Rain => {
            for _ in 0..count {
                particles.push(Particle::Rain {
                    x: rng.next_f64() * w,
                    y: rng.next_f64() * h,
                    speed: rng.range(RAIN_SPEED_RANGE.0, RAIN_SPEED_RANGE.1),
                    length: rng.range(RAIN_LENGTH_RANGE.0, RAIN_LENGTH_RANGE.1) * scale,
                });
            }
        }
        OverlayKind::Snow => {
            for _ in 0..count {
                particles.push(Particle::Snow {
                    x: rng.next_f64() * w,
                    y: rng.next_f64() * h,
                    speed: rng.range(SNOW_SPEED_RANGE.0, SNOW_SPEED_RANGE.1),
                    radius: rng.range(SNOW_RADIUS_RANGE.0, SNOW_RADIUS_RANGE.1) * scale,
                    drift: rng.range(SNOW_DRIFT_RANGE.0, SNOW_DRIFT_RANGE.1),
                });
            }
        }
    }
    particles
}

/// Advances the simulation by `delta_seconds`. Non-finite or non-positive
/// deltas are a no-op so a static re-render never disturbs particle state.
pub fn step_particles(
    particles: &mut [Particle],
    delta_seconds: f64,
    width: u32,
    height: u32,
    wind: f64,
    size: f64,
    rng: &mut SplitMix64,
) {
    if particles.is_empty() || !delta_seconds.is_finite() || delta_seconds <= 0.0 {
        return;
    }
    let w = f64::from(width.max(1));
    let h = f64::from(height.max(1));
    let scale = clamp_overlay_size(size);
    let wind = if wind.is_finite() { wind } else { 0.0 };
    let min_reset = 20.0 * scale;

    for particle in particles {
        match particle {
            Particle::Rain {
                x, y, speed, length, ..
            } => {
                *y += *speed * delta_seconds;
                *x += wind * delta_seconds;
                if *y > h + *length {
                    *y = -length.max(min_reset);
                    *x = rng.next_f64() * w;
                }
                *x = wrap_value(*x, w);
            }
            Particle::Snow {
                x,
                y,
                speed,
                radius,
                drift,
            } => {
                let r = radius.max(0.5);
                *y += *speed * delta_seconds;
                *x += (*drift + wind) * delta_seconds * 0.25;
                if *y > h + r {
                    *y = -r;
                    *x = rng.next_f64() * w;
                }
                // Edge teleport, not a bounce.
                if *x < -r {
                    *x = w + r;
                } else if *x > w + r {
                    *x = -r;
                }
            }
        }
    }
}

/// Draws particles onto `target`. Callers composite the target onto the main
/// surface once at full opacity so translucency does not compound.
pub fn draw_particles(target: &mut Surface, particles: &[Particle], size: f64) {
    if particles.is_empty() {
        return;
    }
    let scale = clamp_overlay_size(size);
    let rain_color = premul_color(180, 220, 255, 191);
    let snow_color = premul_color(255, 255, 255, 230);
    let rain_width = scale.max(0.5);

    for particle in particles {
        match *particle {
            Particle::Rain { x, y, length, .. } => {
                target.stroke_segment(
                    Point::new(x, y),
                    Point::new(x, y + length),
                    rain_width,
                    rain_color,
                );
            }
            Particle::Snow { x, y, radius, .. } => {
                target.fill_circle(Point::new(x, y), radius.max(0.5), snow_color);
            }
        }
    }
}
