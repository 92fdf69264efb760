use crate::{
    context::FlowContext,
    core::Point,
    math::{MIN_TIMELINE_DURATION, sanitize_duration},
    motion::{self, MotionInput},
    overlay::{self, OverlayKind},
    region::{DEFAULT_ACCENT_COLOR, Region},
    surface::premul_color,
};

const GUIDE_LINE_WIDTH: f64 = 3.0;
const GUIDE_ARROW_SIZE: f64 = 10.0;

impl FlowContext {
    /// Composites one full frame into the canonical surface and returns the
    /// number of regions that are actively moving.
    ///
    /// Callable with `delta = 0` for a static re-render (no time advance, no
    /// jitter, particles untouched) or with `delta > 0` during playback and
    /// export; the deterministic geometry is identical either way.
    pub fn render_frame(&mut self, elapsed: f64, duration: f64, delta: f64) -> usize {
        self.flush_pending();

        let duration = sanitize_duration(duration).max(MIN_TIMELINE_DURATION);
        let elapsed = if elapsed.is_finite() { elapsed } else { 0.0 };
        let normalized = (((elapsed % duration) + duration) % duration) / duration;

        let jitter_active = self.animating || delta > 0.0;
        let jiggle = if jitter_active { self.jiggle } else { 0.0 };
        let base_speed = self.base_speed;
        let loop_mode = self.loop_mode;
        let image_loaded = self.image_loaded;

        let mut active = 0usize;
        {
            let FlowContext {
                frame,
                base,
                regions,
                rng,
                ..
            } = self;

            frame.clear();
            if image_loaded {
                frame.blit(base, 0.0, 0.0, 1.0);
            }

            for region in regions.iter_mut() {
                let Some(selection) = region.selection else {
                    continue;
                };

                let sample = motion::resolve_motion(
                    normalized,
                    &MotionInput {
                        direction: region.direction,
                        region_speed: region.speed,
                        base_speed,
                        loop_mode,
                        crossfade_linear: region.crossfade.enabled
                            && !region.crossfade.oscillate,
                    },
                    selection,
                );
                region.offset = sample.offset;
                if sample.active {
                    active += 1;
                }

                let fade = motion::resolve_crossfade(normalized, loop_mode, &region.crossfade);
                region.crossfade.phase = fade.phase;

                let (jx, jy) = if jiggle > 0.0 {
                    (
                        (rng.next_f64() - 0.5) * jiggle,
                        (rng.next_f64() - 0.5) * jiggle,
                    )
                } else {
                    (0.0, 0.0)
                };

                let dx = f64::from(selection.x)
                    + sample.offset.x * fade.normalized_travel
                    + jx * fade.normalized_travel;
                let dy = f64::from(selection.y)
                    + sample.offset.y * fade.normalized_travel
                    + jy * fade.normalized_travel;
                frame.blit(&region.layer, dx, dy, fade.alpha as f32);
            }
        }

        self.render_overlay(delta);

        if self.overlay_visible && !self.exporting {
            self.draw_guides();
        } else if self.painting {
            self.draw_brush_preview();
        }

        active
    }

    /// Steps and draws the global particle overlay onto an offscreen buffer,
    /// then composites it once at full opacity so translucency does not
    /// compound frame over frame.
    fn render_overlay(&mut self, delta: f64) {
        if self.overlay.kind == OverlayKind::None || self.overlay_particles.is_empty() {
            return;
        }
        let FlowContext {
            frame,
            overlay_buffer,
            overlay_particles,
            overlay: config,
            canvas,
            rng,
            ..
        } = self;
        overlay_buffer.clear();
        overlay::step_particles(
            overlay_particles,
            delta,
            canvas.width,
            canvas.height,
            config.wind,
            config.size,
            rng,
        );
        overlay::draw_particles(overlay_buffer, overlay_particles, config.size);
        frame.blit(overlay_buffer, 0.0, 0.0, 1.0);
    }

    fn draw_guides(&mut self) {
        let Some(region) = self.regions.active_region() else {
            return;
        };
        let arrow = direction_arrow(region);
        let accent = accent_premul(&region.color, 230);
        if let Some((origin, dest)) = arrow {
            self.frame
                .stroke_segment(origin, dest, GUIDE_LINE_WIDTH, accent);
            let angle = (dest.y - origin.y).atan2(dest.x - origin.x);
            for wing in [-std::f64::consts::FRAC_PI_6, std::f64::consts::FRAC_PI_6] {
                let tip = Point::new(
                    dest.x - (angle + wing).cos() * GUIDE_ARROW_SIZE,
                    dest.y - (angle + wing).sin() * GUIDE_ARROW_SIZE,
                );
                self.frame
                    .stroke_segment(dest, tip, GUIDE_LINE_WIDTH, accent);
            }
        }
        self.draw_brush_preview();
    }

    fn draw_brush_preview(&mut self) {
        let Some(pos) = self.brush_pos else {
            return;
        };
        let accent = self
            .regions
            .active_region()
            .map(|r| accent_premul(&r.color, 115))
            .unwrap_or(premul_color(255, 255, 255, 230));
        self.frame
            .stroke_circle(pos, self.brush_radius, 1.0, accent);
    }
}

/// Guide arrow from the region centroid along its normalized direction; the
/// length is half the selection span, clamped to [60, 200] px.
fn direction_arrow(region: &Region) -> Option<(Point, Point)> {
    let magnitude = region.direction.hypot();
    if magnitude == 0.0 || !magnitude.is_finite() {
        return None;
    }
    let origin = region.centroid?;
    let base_span = region
        .selection
        .map(|sel| f64::from(sel.span()))
        .unwrap_or(160.0);
    let length = (base_span * 0.5).clamp(60.0, 200.0);
    let dest = Point::new(
        origin.x + region.direction.x / magnitude * length,
        origin.y + region.direction.y / magnitude * length,
    );
    Some((origin, dest))
}

fn accent_premul(color: &str, alpha: u8) -> crate::surface::PremulRgba8 {
    let [r, g, b] = parse_hex_color(color)
        .or_else(|| parse_hex_color(DEFAULT_ACCENT_COLOR))
        .unwrap_or([59, 130, 246]);
    premul_color(r, g, b, alpha)
}

fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Bounds, Canvas, Rect, Vec2};

    /// Opaque 100x100 image whose red channel encodes the x coordinate, so
    /// a displaced layer is distinguishable from the base underneath it.
    fn gradient_context() -> FlowContext {
        let mut data = Vec::with_capacity(100 * 100 * 4);
        for _y in 0..100u32 {
            for x in 0..100u32 {
                data.extend_from_slice(&[(x * 2) as u8, 0, 0, 255]);
            }
        }
        let image = crate::assets::SourceImage::from_premul(100, 100, data).unwrap();
        let mut ctx = FlowContext::new(Canvas::new(100, 100).unwrap());
        ctx.set_image(image).unwrap();
        ctx.seed_mask(Rect::new(10.0, 10.0, 40.0, 40.0)).unwrap();
        ctx
    }

    #[test]
    fn parse_hex_color_round_trip() {
        assert_eq!(parse_hex_color("#3b82f6"), Some([59, 130, 246]));
        assert_eq!(parse_hex_color("#7CD992"), Some([124, 217, 146]));
        assert_eq!(parse_hex_color("3b82f6"), None);
        assert_eq!(parse_hex_color("#xyzxyz"), None);
    }

    #[test]
    fn direction_arrow_clamps_length() {
        let mut ctx = gradient_context();
        ctx.set_direction(Some(Vec2::new(1.0, 0.0))).unwrap();
        let region = ctx.regions().active_region().unwrap();
        let (origin, dest) = direction_arrow(region).unwrap();
        // Selection span is 30, so half-span 15 clamps up to 60.
        assert!((dest.x - origin.x - 60.0).abs() < 1e-9);
        assert_eq!(dest.y, origin.y);
    }

    #[test]
    fn negative_elapsed_wraps_into_range() {
        let mut ctx = gradient_context();
        ctx.set_direction(Some(Vec2::new(40.0, 0.0))).unwrap();
        ctx.stop(true);
        // -7.5 mod 10 is 2.5: same frame as elapsed 2.5.
        ctx.render_frame(-7.5, 10.0, 0.0);
        let a = ctx.capture_frame();
        ctx.render_frame(2.5, 10.0, 0.0);
        let b = ctx.capture_frame();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn static_render_is_deterministic() {
        let mut ctx = gradient_context();
        ctx.set_direction(Some(Vec2::new(40.0, 0.0))).unwrap();
        ctx.set_jiggle(5.0);
        ctx.stop(true);
        ctx.render_frame(2.5, 10.0, 0.0);
        let a = ctx.capture_frame();
        ctx.render_frame(2.5, 10.0, 0.0);
        let b = ctx.capture_frame();
        // Jitter is off when idle with delta 0, so frames match bytewise.
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn empty_region_is_skipped() {
        let mut ctx = FlowContext::new(Canvas::new(64, 64).unwrap());
        let active = ctx.render_frame(0.0, 10.0, 0.0);
        assert_eq!(active, 0);
    }

    #[test]
    fn active_count_reflects_moving_regions() {
        let mut ctx = gradient_context();
        ctx.set_direction(Some(Vec2::new(40.0, 0.0))).unwrap();
        ctx.stop(true);
        assert_eq!(ctx.render_frame(0.0, 10.0, 0.0), 1);

        ctx.regions_mut().active_region_mut().unwrap().direction = Vec2::ZERO;
        assert_eq!(ctx.render_frame(0.0, 10.0, 0.0), 0);
    }

    #[test]
    fn layer_lands_at_expected_offset() {
        let mut ctx = gradient_context();
        ctx.set_direction(Some(Vec2::new(40.0, 0.0))).unwrap();
        ctx.set_base_speed(1.0);
        ctx.set_overlay_visible(false);
        ctx.stop(true);
        // normalizedTime 0.25, loop wave = 0.5, offset x = 20.
        ctx.render_frame(2.5, 10.0, 0.0);
        let region = ctx.regions().active_region().unwrap();
        assert_eq!(
            region.selection.unwrap(),
            Bounds {
                x: 10,
                y: 10,
                w: 30,
                h: 30
            }
        );
        assert!((region.offset.x - 20.0).abs() < 1e-9);
        // Layer column 0 (source x=10, red 20) lands at canvas x=30,
        // covering the base gradient (red 60) there.
        let frame = &ctx.frame;
        assert_eq!(frame.pixel(30, 15)[0], 20);
        // Left of the displaced layer the base shows through.
        assert_eq!(frame.pixel(5, 15)[0], 10);
    }
}
