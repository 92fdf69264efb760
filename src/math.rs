pub const DEFAULT_TIMELINE_DURATION: f64 = 10.0;
pub const MIN_TIMELINE_DURATION: f64 = 0.1;

pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Wraps `value` into `[0, max)`. Non-finite input or a non-positive `max`
/// collapses to 0 rather than propagating NaN/Infinity into geometry.
pub fn wrap_value(value: f64, max: f64) -> f64 {
    if !value.is_finite() || !max.is_finite() || max <= 0.0 {
        return 0.0;
    }
    let mut result = value % max;
    if result < 0.0 {
        result += max;
    }
    result
}

pub fn sanitize_duration(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return DEFAULT_TIMELINE_DURATION;
    }
    value.max(MIN_TIMELINE_DURATION)
}

pub fn sanitize_non_negative(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        return 0.0;
    }
    value
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

/// SplitMix64. Small, seedable, and stable across platforms; renders stay
/// reproducible for a given seed without pulling in an RNG dependency.
#[derive(Clone, Copy, Debug)]
pub struct SplitMix64(u64);

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in [min, max).
    pub fn range(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp01_handles_nan_and_bounds() {
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(-1.0), 0.0);
        assert_eq!(clamp01(2.0), 1.0);
        assert_eq!(clamp01(0.25), 0.25);
    }

    #[test]
    fn wrap_value_is_always_in_range() {
        assert_eq!(wrap_value(7.5, 5.0), 2.5);
        assert_eq!(wrap_value(-1.0, 5.0), 4.0);
        assert_eq!(wrap_value(f64::INFINITY, 5.0), 0.0);
        assert_eq!(wrap_value(3.0, 0.0), 0.0);
    }

    #[test]
    fn sanitize_duration_defaults_and_floors() {
        assert_eq!(sanitize_duration(f64::NAN), DEFAULT_TIMELINE_DURATION);
        assert_eq!(sanitize_duration(-2.0), DEFAULT_TIMELINE_DURATION);
        assert_eq!(sanitize_duration(0.01), MIN_TIMELINE_DURATION);
        assert_eq!(sanitize_duration(3.5), 3.5);
    }

    #[test]
    fn splitmix_is_deterministic_and_in_range() {
        let mut a = SplitMix64::new(42);
        let mut b = SplitMix64::new(42);
        for _ in 0..100 {
            let x = a.next_f64();
            assert_eq!(x, b.next_f64());
            assert!((0.0..1.0).contains(&x));
        }
        let mut c = SplitMix64::new(7);
        for _ in 0..100 {
            let v = c.range(12.0, 20.0);
            assert!((12.0..20.0).contains(&v));
        }
    }
}
