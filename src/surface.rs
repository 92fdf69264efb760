use crate::{
    core::{FrameRgba, Point},
    error::{FlowError, FlowResult},
    math::mul_div255,
};

pub type PremulRgba8 = [u8; 4];

pub fn premul_color(r: u8, g: u8, b: u8, a: u8) -> PremulRgba8 {
    [
        mul_div255(u16::from(r), u16::from(a)),
        mul_div255(u16::from(g), u16::from(a)),
        mul_div255(u16::from(b), u16::from(a)),
        a,
    ]
}

/// Source-over with an extra global opacity, on premultiplied pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// An immediate-mode 2D raster surface: premultiplied RGBA8, row-major.
/// Covers the drawing capability the engine needs — clear, opacity-scoped
/// blits, circle stamps, segment strokes, and pixel readback.
#[derive(Clone, Debug)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn from_premul_data(width: u32, height: u32, data: Vec<u8>) -> FlowResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| FlowError::validation("surface size overflow"))?;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(FlowError::validation(
                "surface data must match width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = ((y * self.width + x) as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn fill(&mut self, color: PremulRgba8) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Draws `src` with its top-left corner at (dx, dy), rounded to the
    /// nearest pixel, scaled by a global opacity. Out-of-bounds parts clip.
    pub fn blit(&mut self, src: &Surface, dx: f64, dy: f64, opacity: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let ox = dx.round() as i64;
        let oy = dy.round() as i64;
        for sy in 0..src.height as i64 {
            let ty = oy + sy;
            if ty < 0 || ty >= i64::from(self.height) {
                continue;
            }
            for sx in 0..src.width as i64 {
                let tx = ox + sx;
                if tx < 0 || tx >= i64::from(self.width) {
                    continue;
                }
                let s = src.pixel(sx as u32, sy as u32);
                if s[3] == 0 {
                    continue;
                }
                let d = self.pixel(tx as u32, ty as u32);
                self.put_pixel(tx as u32, ty as u32, over(d, s, opacity));
            }
        }
    }

    pub fn fill_circle(&mut self, center: Point, radius: f64, color: PremulRgba8) {
        if !center.x.is_finite() || !center.y.is_finite() || !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let r2 = radius * radius;
        let x0 = ((center.x - radius).floor() as i64).max(0);
        let y0 = ((center.y - radius).floor() as i64).max(0);
        let x1 = ((center.x + radius).ceil() as i64).min(i64::from(self.width));
        let y1 = ((center.y + radius).ceil() as i64).min(i64::from(self.height));
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f64 + 0.5 - center.x;
                let dy = y as f64 + 0.5 - center.y;
                if dx * dx + dy * dy <= r2 {
                    let d = self.pixel(x as u32, y as u32);
                    self.put_pixel(x as u32, y as u32, over(d, color, 1.0));
                }
            }
        }
    }

    /// Strokes a segment by stamping circles along it. Adequate for guide
    /// arrows and particle streaks; not an anti-aliased line rasterizer.
    pub fn stroke_segment(&mut self, a: Point, b: Point, width: f64, color: PremulRgba8) {
        if !a.x.is_finite() || !a.y.is_finite() || !b.x.is_finite() || !b.y.is_finite() {
            return;
        }
        let radius = (width * 0.5).max(0.5);
        let len = a.distance(b);
        let steps = (len / radius).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let p = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
            self.fill_circle(p, radius, color);
        }
    }

    /// Outlined circle, used for the brush-size preview.
    pub fn stroke_circle(&mut self, center: Point, radius: f64, width: f64, color: PremulRgba8) {
        if !center.x.is_finite() || !center.y.is_finite() || !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let stamp = (width * 0.5).max(0.5);
        let steps = ((std::f64::consts::TAU * radius) / stamp).ceil().max(8.0) as usize;
        for i in 0..steps {
            let theta = i as f64 / steps as f64 * std::f64::consts::TAU;
            let p = Point::new(
                center.x + theta.cos() * radius,
                center.y + theta.sin() * radius,
            );
            self.fill_circle(p, stamp, color);
        }
    }

    pub fn to_frame(&self) -> FrameRgba {
        FrameRgba {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
            premultiplied: true,
        }
    }

    fn put_pixel(&mut self, x: u32, y: u32, px: PremulRgba8) {
        let i = ((y * self.width + x) as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn over_dst_transparent_returns_src() {
        let dst = [0, 0, 0, 0];
        let src = [100, 110, 120, 200];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn blit_clips_and_respects_opacity() {
        let mut dst = Surface::new(4, 4);
        let mut src = Surface::new(2, 2);
        src.fill([255, 255, 255, 255]);

        dst.blit(&src, 3.0, 3.0, 1.0);
        assert_eq!(dst.pixel(3, 3), [255, 255, 255, 255]);
        assert_eq!(dst.pixel(2, 2), [0, 0, 0, 0]);

        let mut half = Surface::new(4, 4);
        half.blit(&src, 0.0, 0.0, 0.5);
        assert_eq!(half.pixel(0, 0)[3], 128);
    }

    #[test]
    fn fill_circle_covers_center_not_corner() {
        let mut s = Surface::new(9, 9);
        s.fill_circle(Point::new(4.5, 4.5), 3.0, premul_color(255, 0, 0, 255));
        assert_eq!(s.pixel(4, 4)[3], 255);
        assert_eq!(s.pixel(0, 0)[3], 0);
    }

    #[test]
    fn stroke_segment_touches_both_endpoints() {
        let mut s = Surface::new(16, 16);
        s.stroke_segment(
            Point::new(2.5, 2.5),
            Point::new(12.5, 2.5),
            1.0,
            premul_color(255, 255, 255, 255),
        );
        assert!(s.pixel(2, 2)[3] > 0);
        assert!(s.pixel(12, 2)[3] > 0);
        assert_eq!(s.pixel(2, 10)[3], 0);
    }

    #[test]
    fn from_premul_data_validates_length() {
        assert!(Surface::from_premul_data(2, 2, vec![0u8; 15]).is_err());
        assert!(Surface::from_premul_data(2, 2, vec![0u8; 16]).is_ok());
    }
}
