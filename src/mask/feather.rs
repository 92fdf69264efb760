use crate::error::{FlowError, FlowResult};

/// Gaussian blur of a single-channel alpha mask. `radius_px` of 0 is the
/// identity. Sigma is radius/2, matching the soft falloff of a CSS-style
/// `blur(Npx)` filter.
pub fn feather_alpha(src: &[u8], width: u32, height: u32, radius_px: u32) -> FlowResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| FlowError::validation("feather buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(FlowError::validation(
            "feather_alpha expects src matching width*height",
        ));
    }
    if radius_px == 0 {
        return Ok(src.to_vec());
    }

    let sigma = radius_px as f32 * 0.5;
    let kernel = gaussian_kernel_q16(radius_px, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    horizontal_pass(src, &mut tmp, width, height, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Ok(out)
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> FlowResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(FlowError::validation("feather sigma must be > 0"));
    }

    let r = radius as i32;
    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    let sigma = sigma as f64;
    let denom = 2.0 * sigma * sigma;
    for i in -r..=r {
        let x = i as f64;
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        return Err(FlowError::render("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = ((wf / sum) * 65536.0).round() as i64;
        let q = q.clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Nudge the center tap so the kernel sums to exactly 1.0 in Q16.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        let new_mid = (i64::from(weights[mid]) + delta).clamp(0, 65536);
        weights[mid] = new_mid as u32;
    }

    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = 0u64;
            for (ki, &kw) in k.iter().enumerate() {
                let dx = ki as i32 - radius;
                let sx = (x + dx).clamp(0, w - 1);
                acc += u64::from(kw) * u64::from(src[(y * w + sx) as usize]);
            }
            dst[(y * w + x) as usize] = q16_to_u8(acc);
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u64;
            for (ki, &kw) in k.iter().enumerate() {
                let dy = ki as i32 - radius;
                let sy = (y + dy).clamp(0, h - 1);
                acc += u64::from(kw) * u64::from(src[(sy * w + x) as usize]);
            }
            dst[(y * w + x) as usize] = q16_to_u8(acc);
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    let v = (acc + 32768) >> 16;
    v.min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_0_is_identity() {
        let src = vec![0u8, 128, 255, 64];
        let out = feather_alpha(&src, 2, 2, 0).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn constant_mask_is_unchanged() {
        let src = vec![200u8; 4 * 3];
        let out = feather_alpha(&src, 4, 3, 3).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn single_pixel_spreads_and_conserves_mass() {
        let (w, h) = (7u32, 7u32);
        let mut src = vec![0u8; (w * h) as usize];
        src[(3 * w + 3) as usize] = 255;

        let out = feather_alpha(&src, w, h, 2).unwrap();

        let nonzero = out.iter().filter(|&&a| a != 0).count();
        assert!(nonzero > 1);
        assert!(out[(3 * w + 3) as usize] > out[(3 * w + 1) as usize]);

        let sum: u32 = out.iter().map(|&a| u32::from(a)).sum();
        assert!((sum as i32 - 255).abs() <= 4);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(feather_alpha(&[0u8; 5], 2, 2, 1).is_err());
    }
}
