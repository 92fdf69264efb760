use crate::{
    core::{Bounds, Point},
    error::{FlowError, FlowResult},
};

fn check_len(alpha: &[u8], width: u32, height: u32) -> FlowResult<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| FlowError::validation("mask buffer size overflow"))?;
    if alpha.len() != expected {
        return Err(FlowError::validation(
            "mask analysis expects alpha matching width*height",
        ));
    }
    Ok(())
}

/// Tightest axis-aligned box containing every pixel with alpha > 0, or None
/// when the mask is empty. Exact full scan; a sampling shortcut could miss an
/// isolated painted pixel.
pub fn compute_bounds(alpha: &[u8], width: u32, height: u32) -> FlowResult<Option<Bounds>> {
    check_len(alpha, width, height)?;
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x: i64 = -1;
    let mut max_y: i64 = -1;
    for y in 0..height {
        let row = (y * width) as usize;
        for x in 0..width {
            if alpha[row + x as usize] > 0 {
                if x < min_x {
                    min_x = x;
                }
                if y < min_y {
                    min_y = y;
                }
                if i64::from(x) > max_x {
                    max_x = i64::from(x);
                }
                if i64::from(y) > max_y {
                    max_y = i64::from(y);
                }
            }
        }
    }
    if max_x < i64::from(min_x) || max_y < i64::from(min_y) {
        return Ok(None);
    }
    Ok(Some(Bounds {
        x: min_x,
        y: min_y,
        w: (max_x as u32) - min_x + 1,
        h: (max_y as u32) - min_y + 1,
    }))
}

/// Alpha-weighted center of mass, or None when total alpha is zero. Weights
/// use the raw alpha value so feathered edges pull less than solid paint.
pub fn compute_centroid(alpha: &[u8], width: u32, height: u32) -> FlowResult<Option<Point>> {
    check_len(alpha, width, height)?;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut total = 0.0f64;
    for y in 0..height {
        let row = (y * width) as usize;
        for x in 0..width {
            let a = alpha[row + x as usize];
            if a > 0 {
                let w = f64::from(a);
                sum_x += f64::from(x) * w;
                sum_y += f64::from(y) * w;
                total += w;
            }
        }
    }
    if total == 0.0 {
        return Ok(None);
    }
    Ok(Some(Point::new(sum_x / total, sum_y / total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_of_single_pixel() {
        let mut alpha = vec![0u8; 64];
        alpha[5 * 8 + 3] = 255;
        let b = compute_bounds(&alpha, 8, 8).unwrap().unwrap();
        assert_eq!(
            b,
            Bounds {
                x: 3,
                y: 5,
                w: 1,
                h: 1
            }
        );
    }

    #[test]
    fn bounds_of_empty_mask_is_none() {
        let alpha = vec![0u8; 64];
        assert!(compute_bounds(&alpha, 8, 8).unwrap().is_none());
        assert!(compute_centroid(&alpha, 8, 8).unwrap().is_none());
    }

    #[test]
    fn bounds_are_tight_around_scattered_pixels() {
        let mut alpha = vec![0u8; 16 * 16];
        alpha[2 * 16 + 4] = 1;
        alpha[11 * 16 + 9] = 200;
        let b = compute_bounds(&alpha, 16, 16).unwrap().unwrap();
        assert_eq!(
            b,
            Bounds {
                x: 4,
                y: 2,
                w: 6,
                h: 10
            }
        );
    }

    #[test]
    fn centroid_of_two_equal_pixels_is_midpoint() {
        let mut alpha = vec![0u8; 11 * 11];
        alpha[0] = 128;
        alpha[10] = 128;
        let c = compute_centroid(&alpha, 11, 11).unwrap().unwrap();
        assert_eq!(c.x, 5.0);
        assert_eq!(c.y, 0.0);
    }

    #[test]
    fn centroid_weights_by_raw_alpha() {
        // 255 at x=0, 85 at x=4: centroid sits a quarter of the way across.
        let mut alpha = vec![0u8; 5];
        alpha[0] = 255;
        alpha[4] = 85;
        let c = compute_centroid(&alpha, 5, 1).unwrap().unwrap();
        assert!((c.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let alpha = vec![0u8; 10];
        assert!(compute_bounds(&alpha, 8, 8).is_err());
        assert!(compute_centroid(&alpha, 8, 8).is_err());
    }
}
