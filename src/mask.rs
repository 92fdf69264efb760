use crate::core::{Bounds, Canvas, Point, Rect};

pub mod analysis;
pub mod feather;

pub const MAX_UNDO: usize = 20;

/// A region's paintable alpha channel over the full canvas. One byte per
/// pixel, row-major; 0 is unpainted.
#[derive(Clone, Debug)]
pub struct MaskLayer {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
    undo: Vec<Vec<u8>>,
}

impl MaskLayer {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            alpha: vec![0; canvas.pixel_count()],
            undo: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Stamps one circular brush dab. Paint sets full alpha, erase clears it;
    /// feathering happens later on the derived mask, not here.
    pub fn stamp(&mut self, center: Point, radius: f64, erase: bool) {
        if !center.x.is_finite() || !center.y.is_finite() || !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let value = if erase { 0u8 } else { 255u8 };
        let r2 = radius * radius;
        let x0 = (center.x - radius).floor().max(0.0) as u32;
        let y0 = (center.y - radius).floor().max(0.0) as u32;
        let x1 = ((center.x + radius).ceil() as i64).clamp(0, i64::from(self.width)) as u32;
        let y1 = ((center.y + radius).ceil() as i64).clamp(0, i64::from(self.height)) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f64 + 0.5 - center.x;
                let dy = y as f64 + 0.5 - center.y;
                if dx * dx + dy * dy <= r2 {
                    self.alpha[(y * self.width + x) as usize] = value;
                }
            }
        }
    }

    /// Replaces the whole mask with one solid rectangle and drops undo
    /// history. Returns the normalized rectangle actually painted.
    pub fn seed_rect(&mut self, rect: Rect) -> Bounds {
        let target = normalize_seed_rect(rect, self.width, self.height);
        self.alpha.fill(0);
        for y in target.y..target.y + target.h {
            let row = (y * self.width + target.x) as usize;
            self.alpha[row..row + target.w as usize].fill(255);
        }
        self.undo.clear();
        target
    }

    pub fn clear(&mut self) {
        self.alpha.fill(0);
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.iter().all(|&a| a == 0)
    }

    pub fn push_undo(&mut self) {
        if self.undo.len() >= MAX_UNDO {
            self.undo.remove(0);
        }
        self.undo.push(self.alpha.clone());
    }

    /// Restores the most recent snapshot. Returns false when there is none.
    pub fn undo(&mut self) -> bool {
        match self.undo.pop() {
            Some(snapshot) => {
                self.alpha = snapshot;
                true
            }
            None => false,
        }
    }
}

/// Clamps a requested seed rectangle into the canvas, substituting a centered
/// default block for non-finite coordinates.
fn normalize_seed_rect(rect: Rect, width: u32, height: u32) -> Bounds {
    let wf = width as f64;
    let hf = height as f64;
    let default_w = (wf * 0.35).floor().max(1.0);
    let default_h = (hf * 0.3).floor().max(1.0);
    let raw_x = if rect.x0.is_finite() {
        rect.x0
    } else {
        (wf * 0.3).floor()
    };
    let raw_y = if rect.y0.is_finite() {
        rect.y0
    } else {
        (hf * 0.3).floor()
    };
    let raw_w = if rect.width().is_finite() && rect.width() > 0.0 {
        rect.width()
    } else {
        default_w
    };
    let raw_h = if rect.height().is_finite() && rect.height() > 0.0 {
        rect.height()
    } else {
        default_h
    };

    let x = (raw_x.floor() as i64).clamp(0, i64::from(width) - 1) as u32;
    let y = (raw_y.floor() as i64).clamp(0, i64::from(height) - 1) as u32;
    let w = (raw_w.floor() as i64).clamp(1, i64::from(width - x)) as u32;
    let h = (raw_h.floor() as i64).clamp(1, i64::from(height - y)) as u32;
    Bounds { x, y, w, h }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(w: u32, h: u32) -> MaskLayer {
        MaskLayer::new(Canvas::new(w, h).unwrap())
    }

    #[test]
    fn stamp_paints_and_erases_within_radius() {
        let mut m = mask(16, 16);
        m.stamp(Point::new(8.0, 8.0), 3.0, false);
        assert_eq!(m.alpha()[(8 * 16 + 8) as usize], 255);
        assert_eq!(m.alpha()[0], 0);

        m.stamp(Point::new(8.0, 8.0), 3.0, true);
        assert!(m.is_empty());
    }

    #[test]
    fn stamp_near_edge_does_not_panic() {
        let mut m = mask(8, 8);
        m.stamp(Point::new(0.0, 0.0), 5.0, false);
        m.stamp(Point::new(7.9, 7.9), 5.0, false);
        assert!(!m.is_empty());
    }

    #[test]
    fn stamp_ignores_degenerate_input() {
        let mut m = mask(8, 8);
        m.stamp(Point::new(f64::NAN, 2.0), 3.0, false);
        m.stamp(Point::new(2.0, 2.0), 0.0, false);
        assert!(m.is_empty());
    }

    #[test]
    fn seed_rect_clamps_into_canvas() {
        let mut m = mask(100, 100);
        let b = m.seed_rect(Rect::new(90.0, 90.0, 90.0 + 50.0, 90.0 + 50.0));
        assert_eq!(
            b,
            Bounds {
                x: 90,
                y: 90,
                w: 10,
                h: 10
            }
        );
        assert_eq!(m.alpha()[(90 * 100 + 90) as usize], 255);
        assert_eq!(m.alpha()[0], 0);
    }

    #[test]
    fn seed_rect_substitutes_defaults_for_nan() {
        let mut m = mask(100, 100);
        let b = m.seed_rect(Rect::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN));
        assert_eq!(
            b,
            Bounds {
                x: 30,
                y: 30,
                w: 35,
                h: 30
            }
        );
    }

    #[test]
    fn undo_restores_previous_snapshot_and_is_bounded() {
        let mut m = mask(8, 8);
        m.push_undo();
        m.stamp(Point::new(4.0, 4.0), 2.0, false);
        assert!(!m.is_empty());
        assert!(m.undo());
        assert!(m.is_empty());
        assert!(!m.undo());

        for _ in 0..(MAX_UNDO + 5) {
            m.push_undo();
        }
        assert_eq!(m.undo.len(), MAX_UNDO);
    }
}
