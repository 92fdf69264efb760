use crate::{
    assets::SourceImage,
    clock::{FrameScheduler, ManualScheduler},
    core::{Bounds, Canvas, FrameRgba, LoopMode, Point, Rect, Vec2},
    error::{FlowError, FlowResult},
    math::{SplitMix64, sanitize_duration, sanitize_non_negative},
    motion::{Crossfade, DEFAULT_BASE_SPEED},
    overlay::{self, OverlayConfig, OverlayKind, Particle},
    region::{RegionId, RegionSet},
    surface::Surface,
};

pub const DEFAULT_BRUSH_RADIUS: f64 = 20.0;

/// Single-slot, last-write-wins cell for deferred work. Setting it again
/// before a flush replaces the stale entry; there is never a queue.
#[derive(Clone, Copy, Debug, Default)]
pub struct PendingCell<T> {
    slot: Option<T>,
}

impl<T> PendingCell<T> {
    pub fn set(&mut self, value: T) {
        self.slot = Some(value);
    }

    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

/// Snapshot of engine state for callers and tests.
#[derive(Clone, Debug, serde::Serialize)]
pub struct FlowStatus {
    pub regions: usize,
    pub animating: bool,
    pub paused: bool,
    pub exporting: bool,
    pub overlay_type: OverlayKind,
    pub has_selection: bool,
    pub global_particles: usize,
}

/// The whole engine: base image, regions, overlay, clock, and the canonical
/// drawing surface. All state lives here; components receive it explicitly.
pub struct FlowContext {
    pub(crate) canvas: Canvas,
    pub(crate) image: SourceImage,
    pub(crate) image_loaded: bool,
    /// Base image pre-rasterized once per image swap.
    pub(crate) base: Surface,
    /// The canonical composition target.
    pub(crate) frame: Surface,
    pub(crate) overlay_buffer: Surface,
    pub(crate) overlay_particles: Vec<Particle>,
    pub(crate) overlay: OverlayConfig,
    pub(crate) overlay_visible: bool,
    pub(crate) regions: RegionSet,
    pub(crate) feather_radius: u32,
    pub(crate) brush_radius: f64,
    pub(crate) brush_pos: Option<Point>,
    pub(crate) painting: bool,
    pub(crate) pending_refresh: PendingCell<RegionId>,
    pub(crate) animating: bool,
    pub(crate) paused: bool,
    pub(crate) exporting: bool,
    pub(crate) loop_mode: LoopMode,
    pub(crate) timeline_elapsed: f64,
    pub(crate) timeline_duration: f64,
    pub(crate) base_speed: f64,
    pub(crate) jiggle: f64,
    pub(crate) rng: SplitMix64,
    pub(crate) scheduler: Box<dyn FrameScheduler>,
}

impl FlowContext {
    /// Starts with a solid blank stand-in image so painting and playback
    /// work before anything loads.
    pub fn new(canvas: Canvas) -> Self {
        Self::with_scheduler(canvas, Box::new(ManualScheduler::default()))
    }

    pub fn with_scheduler(canvas: Canvas, scheduler: Box<dyn FrameScheduler>) -> Self {
        let image = SourceImage::blank(canvas.width, canvas.height);
        let base = image.to_surface();
        let mut ctx = Self {
            canvas,
            image,
            image_loaded: true,
            base,
            frame: Surface::new(canvas.width, canvas.height),
            overlay_buffer: Surface::new(canvas.width, canvas.height),
            overlay_particles: Vec::new(),
            overlay: OverlayConfig::default(),
            overlay_visible: true,
            regions: RegionSet::default(),
            feather_radius: 0,
            brush_radius: DEFAULT_BRUSH_RADIUS,
            brush_pos: None,
            painting: false,
            pending_refresh: PendingCell::default(),
            animating: false,
            paused: false,
            exporting: false,
            loop_mode: LoopMode::default(),
            timeline_elapsed: 0.0,
            timeline_duration: crate::math::DEFAULT_TIMELINE_DURATION,
            base_speed: DEFAULT_BASE_SPEED,
            jiggle: 0.0,
            rng: SplitMix64::new(0x5eed),
            scheduler,
        };
        ctx.regions.ensure_one(canvas);
        ctx
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn regions_mut(&mut self) -> &mut RegionSet {
        &mut self.regions
    }

    pub fn status(&self) -> FlowStatus {
        FlowStatus {
            regions: self.regions.len(),
            animating: self.animating,
            paused: self.paused,
            exporting: self.exporting,
            overlay_type: self.overlay.kind,
            has_selection: self
                .regions
                .active_region()
                .is_some_and(|r| r.selection.is_some()),
            global_particles: self.overlay_particles.len(),
        }
    }

    /// Swaps in a new base image, resizing every canvas-sized buffer and
    /// clearing all region state.
    pub fn set_image(&mut self, image: SourceImage) -> FlowResult<()> {
        self.stop(true);
        let canvas = Canvas::new(image.width(), image.height())?;
        tracing::info!(
            width = canvas.width,
            height = canvas.height,
            "loaded base image"
        );
        self.canvas = canvas;
        self.base = image.to_surface();
        self.frame = Surface::new(canvas.width, canvas.height);
        self.overlay_buffer = Surface::new(canvas.width, canvas.height);
        self.image = image;
        self.image_loaded = true;
        self.pending_refresh.clear();
        self.regions.reset_for_canvas(canvas);
        self.regenerate_overlay_particles(true);
        self.render_static();
        Ok(())
    }

    /// Swaps in a solid stand-in, e.g. when a real image fails to load.
    pub fn load_blank(&mut self, width: u32, height: u32) -> FlowResult<()> {
        self.set_image(SourceImage::blank(width, height))
    }

    // -- paint input ------------------------------------------------------

    /// Called once at pointer-down: snapshots the active mask for undo and
    /// enters painting mode.
    pub fn begin_stroke(&mut self) {
        if let Some(region) = self.regions.active_region_mut() {
            region.mask.push_undo();
        }
        self.painting = true;
    }

    /// One circular stamp of the active brush. Derived-state recomputation
    /// is coalesced onto the next flush rather than done per event.
    pub fn apply_stroke(&mut self, pos: Point, radius: f64, erase: bool) {
        self.brush_pos = Some(pos);
        let Some(region) = self.regions.active_region_mut() else {
            return;
        };
        region.mask.stamp(pos, radius, erase);
        region.mark_dirty();
        let id = region.id;
        self.pending_refresh.set(id);
        if !self.animating {
            self.flush_pending();
            self.render_static();
        }
    }

    pub fn end_stroke(&mut self) {
        self.painting = false;
        self.brush_pos = None;
        self.flush_pending();
        self.render_static();
        self.maybe_start_live_preview();
    }

    pub fn set_brush_radius(&mut self, radius: f64) {
        self.brush_radius = if radius.is_finite() && radius > 0.0 {
            radius
        } else {
            DEFAULT_BRUSH_RADIUS
        };
    }

    /// Applies the coalesced mask refresh, if any. Failures are isolated to
    /// the region and logged; other regions keep rendering.
    pub fn flush_pending(&mut self) {
        let Some(id) = self.pending_refresh.take() else {
            return;
        };
        let feather = self.feather_radius;
        let image = self.image.clone();
        if let Some(region) = self.regions.get_mut(id) {
            if let Err(err) = region.refresh(&image, feather) {
                tracing::warn!(region = %region.name, %err, "mask refresh failed");
            }
            self.regenerate_region_particles(id);
        }
    }

    pub fn undo_mask(&mut self) {
        let feather = self.feather_radius;
        let image = self.image.clone();
        let Some(region) = self.regions.active_region_mut() else {
            return;
        };
        if !region.mask.undo() {
            return;
        }
        if let Err(err) = region.refresh(&image, feather) {
            tracing::warn!(region = %region.name, %err, "mask refresh failed");
        }
        let id = region.id;
        self.regenerate_region_particles(id);
        self.render_static();
        if !self.painting {
            self.maybe_start_live_preview();
        }
    }

    /// Replaces the active region's mask with one solid rectangle. The
    /// rectangle is clamped into the canvas; the painted bounds are returned.
    pub fn seed_mask(&mut self, rect: Rect) -> FlowResult<Bounds> {
        let feather = self.feather_radius;
        let image = self.image.clone();
        let region = self
            .regions
            .active_region_mut()
            .ok_or_else(|| FlowError::validation("no active region"))?;
        let bounds = region.mask.seed_rect(rect);
        region.refresh(&image, feather)?;
        let id = region.id;
        self.regenerate_region_particles(id);
        self.render_static();
        self.maybe_start_live_preview();
        Ok(bounds)
    }

    /// Sets the active region's motion vector. Non-finite components fall
    /// back to a rightward default sized from the selection; a zero vector
    /// is replaced entirely by that default.
    pub fn set_direction(&mut self, vector: Option<Vec2>) -> FlowResult<()> {
        let canvas_width = f64::from(self.canvas.width);
        let region = self
            .regions
            .active_region_mut()
            .ok_or_else(|| FlowError::validation("no active region"))?;
        let fallback = match region.selection {
            Some(sel) => f64::from(sel.w) * 0.35,
            None => canvas_width * 0.25,
        };
        let default_x = fallback.max(40.0);
        let v = vector.unwrap_or(Vec2::new(f64::NAN, f64::NAN));
        let mut x = if v.x.is_finite() { v.x } else { default_x };
        let mut y = if v.y.is_finite() { v.y } else { 0.0 };
        if x == 0.0 && y == 0.0 {
            x = default_x;
            y = 0.0;
        }
        region.direction = Vec2::new(x, y);
        self.render_static();
        self.maybe_start_live_preview();
        Ok(())
    }

    pub fn set_region_speed(&mut self, speed: f64) -> FlowResult<()> {
        let region = self
            .regions
            .active_region_mut()
            .ok_or_else(|| FlowError::validation("no active region"))?;
        region.speed = sanitize_non_negative(speed);
        self.maybe_start_live_preview();
        Ok(())
    }

    pub fn set_crossfade(&mut self, crossfade: Crossfade) -> FlowResult<()> {
        let region = self
            .regions
            .active_region_mut()
            .ok_or_else(|| FlowError::validation("no active region"))?;
        let mut cf = crossfade;
        cf.sanitize();
        region.crossfade = cf;
        self.maybe_start_live_preview();
        Ok(())
    }

    // -- global settings --------------------------------------------------

    pub fn set_duration(&mut self, seconds: f64) {
        self.timeline_duration = sanitize_duration(seconds);
    }

    pub fn set_base_speed(&mut self, speed: f64) {
        self.base_speed = sanitize_non_negative(speed);
        self.maybe_start_live_preview();
    }

    pub fn set_jiggle(&mut self, amplitude: f64) {
        self.jiggle = sanitize_non_negative(amplitude);
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    pub fn set_feather_radius(&mut self, radius: u32) {
        self.feather_radius = radius;
        let ids: Vec<RegionId> = self.regions.iter().map(|r| r.id).collect();
        let image = self.image.clone();
        for id in ids {
            if let Some(region) = self.regions.get_mut(id) {
                if region.mask.is_empty() {
                    continue;
                }
                if let Err(err) = region.refresh(&image, radius) {
                    tracing::warn!(region = %region.name, %err, "mask refresh failed");
                }
                self.regenerate_region_particles(id);
            }
        }
        self.render_static();
    }

    pub fn set_overlay(&mut self, config: OverlayConfig) {
        let mut config = config;
        config.sanitize();
        self.overlay = config;
        self.regenerate_overlay_particles(true);
        self.render_static();
        self.maybe_start_live_preview();
    }

    pub fn set_overlay_visible(&mut self, visible: bool) {
        self.overlay_visible = visible;
        self.render_static();
    }

    // -- overlay particles ------------------------------------------------

    pub(crate) fn regenerate_overlay_particles(&mut self, force: bool) {
        if self.overlay.kind == OverlayKind::None {
            if force || !self.overlay_particles.is_empty() {
                self.overlay_particles.clear();
            }
        } else {
            let count = overlay::particle_count(self.overlay.kind, self.overlay.intensity);
            self.overlay_particles = overlay::generate_particles(
                self.overlay.kind,
                count,
                self.canvas.width,
                self.canvas.height,
                self.overlay.size,
                &mut self.rng,
            );
        }
        let ids: Vec<RegionId> = self.regions.iter().map(|r| r.id).collect();
        for id in ids {
            self.regenerate_region_particles(id);
        }
    }

    /// Region-local particle sets sized to the region's selection; kept on
    /// the entity so a future per-region overlay mode has state to draw.
    pub(crate) fn regenerate_region_particles(&mut self, id: RegionId) {
        let kind = self.overlay.kind;
        let intensity = self.overlay.intensity;
        let size = self.overlay.size;
        let count = overlay::particle_count(kind, intensity);
        let Some(region) = self.regions.get_mut(id) else {
            return;
        };
        if kind == OverlayKind::None {
            region.particles.clear();
            return;
        }
        let Some(selection) = region.selection else {
            region.particles.clear();
            return;
        };
        region.particles = overlay::generate_particles(
            kind,
            count,
            selection.w.max(1),
            selection.h.max(1),
            size,
            &mut self.rng,
        );
    }

    // -- bulk operations --------------------------------------------------

    /// Wipes every region's mask and derived state, stopping playback.
    pub fn clear_all_regions(&mut self) {
        self.stop(true);
        for region in self.regions.iter_mut() {
            region.mask.clear();
            region.selection = None;
            region.centroid = None;
            region.layer = Surface::new(1, 1);
            region.particles.clear();
            region.reset_transients();
            region.mark_dirty();
        }
        self.pending_refresh.clear();
        self.render_static();
    }

    // -- programmatic control surface -------------------------------------

    /// Advances the animation by one synthetic delta and returns the raster,
    /// regardless of clock state. Clock flags are restored afterwards.
    pub fn step_animation(&mut self, delta: f64) -> FrameRgba {
        let step = if delta.is_finite() && delta > 0.0 {
            delta
        } else {
            1.0 / 60.0
        };
        let was_animating = self.animating;
        let was_paused = self.paused;
        self.animating = true;
        self.paused = false;

        let duration = self.timeline_duration.max(crate::math::MIN_TIMELINE_DURATION);
        self.timeline_elapsed += step;
        if self.timeline_elapsed >= duration {
            self.timeline_elapsed %= duration;
        }
        self.render_frame(self.timeline_elapsed, self.timeline_duration, step);

        self.animating = was_animating;
        self.paused = was_paused;
        self.capture_frame()
    }

    pub fn capture_frame(&self) -> FrameRgba {
        self.frame.to_frame()
    }

    /// Re-renders at the current timeline position without advancing time
    /// or jitter.
    pub fn render_static(&mut self) {
        self.render_frame(self.timeline_elapsed, self.timeline_duration, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_cell_is_last_write_wins() {
        let mut cell = PendingCell::default();
        assert!(!cell.is_pending());
        cell.set(1u32);
        cell.set(2u32);
        assert!(cell.is_pending());
        assert_eq!(cell.take(), Some(2));
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn new_context_has_one_region_and_blank_image() {
        let ctx = FlowContext::new(Canvas::new(64, 48).unwrap());
        let status = ctx.status();
        assert_eq!(status.regions, 1);
        assert!(!status.animating);
        assert!(!status.has_selection);
        assert_eq!(status.overlay_type, OverlayKind::None);
    }

    #[test]
    fn seed_mask_produces_selection_and_status_reflects_it() {
        let mut ctx = FlowContext::new(Canvas::new(100, 100).unwrap());
        let bounds = ctx
            .seed_mask(Rect::new(10.0, 10.0, 40.0, 40.0))
            .unwrap();
        assert_eq!(
            bounds,
            Bounds {
                x: 10,
                y: 10,
                w: 30,
                h: 30
            }
        );
        assert!(ctx.status().has_selection);
    }

    #[test]
    fn set_direction_defaults_and_rejects_zero() {
        let mut ctx = FlowContext::new(Canvas::new(100, 100).unwrap());
        ctx.seed_mask(Rect::new(10.0, 10.0, 40.0, 40.0)).unwrap();

        ctx.set_direction(Some(Vec2::ZERO)).unwrap();
        let dir = ctx.regions().active_region().unwrap().direction;
        // Zero falls back to max(40, 0.35 * selection width) rightward.
        assert_eq!(dir, Vec2::new(40.0, 0.0));

        ctx.set_direction(Some(Vec2::new(12.0, -8.0))).unwrap();
        let dir = ctx.regions().active_region().unwrap().direction;
        assert_eq!(dir, Vec2::new(12.0, -8.0));
    }

    #[test]
    fn stroke_paints_through_the_pending_cell() {
        let mut ctx = FlowContext::new(Canvas::new(64, 64).unwrap());
        ctx.begin_stroke();
        ctx.apply_stroke(Point::new(32.0, 32.0), 6.0, false);
        ctx.end_stroke();
        assert!(ctx.status().has_selection);
        assert!(!ctx.pending_refresh.is_pending());

        ctx.undo_mask();
        assert!(!ctx.status().has_selection);
    }

    #[test]
    fn clear_all_regions_resets_masks_and_stops() {
        let mut ctx = FlowContext::new(Canvas::new(100, 100).unwrap());
        ctx.seed_mask(Rect::new(10.0, 10.0, 40.0, 40.0)).unwrap();
        ctx.set_direction(None).unwrap();
        assert!(ctx.status().animating);

        ctx.clear_all_regions();
        let status = ctx.status();
        assert!(!status.animating);
        assert!(!status.has_selection);
    }

    #[test]
    fn overlay_config_regenerates_particles() {
        let mut ctx = FlowContext::new(Canvas::new(64, 64).unwrap());
        ctx.set_overlay(OverlayConfig {
            kind: OverlayKind::Rain,
            intensity: 1.0,
            wind: 0.0,
            size: 1.0,
        });
        assert_eq!(ctx.status().global_particles, 140);

        ctx.set_overlay(OverlayConfig::default());
        assert_eq!(ctx.status().global_particles, 0);
    }
}
