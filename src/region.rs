use crate::{
    assets::SourceImage,
    core::{Bounds, Canvas, Point, Vec2},
    error::{FlowError, FlowResult},
    mask::{MaskLayer, analysis, feather},
    motion::{Crossfade, REGION_SPEED_DEFAULT},
    overlay::Particle,
    surface::Surface,
};

pub const DEFAULT_ACCENT_COLOR: &str = "#3b82f6";

/// Accent colors handed out round-robin as regions are created.
pub const REGION_COLORS: [&str; 8] = [
    "#7CD992", "#F6A96C", "#8AC5FF", "#E3A7F9", "#F6D86B", "#A4E4D7", "#F49FB6", "#B5B7F9",
];

pub type RegionId = u64;

/// One independently animated cut-out: a painted mask plus everything derived
/// from it (feathered alpha, selection bounds, centroid, matted layer) and
/// the per-region animation settings.
#[derive(Clone, Debug)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub color: String,
    pub mask: MaskLayer,
    feathered: Vec<u8>,
    pub selection: Option<Bounds>,
    pub centroid: Option<Point>,
    /// The selection-sized slice of the base image matted by the feathered
    /// mask. 1x1 transparent while the mask is empty.
    pub layer: Surface,
    pub direction: Vec2,
    pub speed: f64,
    pub crossfade: Crossfade,
    /// Transient displacement written back by the renderer.
    pub offset: Vec2,
    pub particles: Vec<Particle>,
    metrics_dirty: bool,
}

impl Region {
    fn new(id: RegionId, name: String, color: String, canvas: Canvas) -> Self {
        Self {
            id,
            name,
            color,
            mask: MaskLayer::new(canvas),
            feathered: vec![0; canvas.pixel_count()],
            selection: None,
            centroid: None,
            layer: Surface::new(1, 1),
            direction: Vec2::ZERO,
            speed: REGION_SPEED_DEFAULT,
            crossfade: Crossfade::default(),
            offset: Vec2::ZERO,
            particles: Vec::new(),
            metrics_dirty: true,
        }
    }

    pub fn feathered_alpha(&self) -> &[u8] {
        &self.feathered
    }

    pub fn mark_dirty(&mut self) {
        self.metrics_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.metrics_dirty
    }

    /// Playable means the renderer would move this layer: something is
    /// painted and the direction is nonzero.
    pub fn is_playable(&self) -> bool {
        self.selection.is_some() && self.direction.hypot() > 0.0
    }

    pub fn reset_transients(&mut self) {
        self.offset = Vec2::ZERO;
        self.crossfade.phase = 0.0;
    }

    /// Rebuilds everything derived from the mask: feathered alpha, selection
    /// bounds, centroid, and the matted layer surface. Resets transient
    /// animation state, matching a fresh edit.
    pub fn refresh(&mut self, image: &SourceImage, feather_radius: u32) -> FlowResult<()> {
        let width = self.mask.width();
        let height = self.mask.height();
        self.feathered = feather::feather_alpha(self.mask.alpha(), width, height, feather_radius)?;
        self.selection = analysis::compute_bounds(&self.feathered, width, height)?;
        self.centroid = analysis::compute_centroid(&self.feathered, width, height)?;

        let Some(selection) = self.selection else {
            self.layer = Surface::new(1, 1);
            self.centroid = None;
            self.reset_transients();
            self.metrics_dirty = true;
            return Ok(());
        };

        self.layer = extract_layer(image, &self.feathered, width, selection)?;
        self.reset_transients();
        self.metrics_dirty = false;
        Ok(())
    }
}

/// Cuts the selection rectangle out of the base image and mattes it by the
/// feathered mask (destination-in).
fn extract_layer(
    image: &SourceImage,
    feathered: &[u8],
    mask_width: u32,
    selection: Bounds,
) -> FlowResult<Surface> {
    if image.width() < selection.x + selection.w || image.height() < selection.y + selection.h {
        return Err(FlowError::render("selection exceeds image bounds"));
    }
    let mut out = vec![0u8; selection.w as usize * selection.h as usize * 4];
    let src = image.data();
    for row in 0..selection.h {
        let sy = selection.y + row;
        for col in 0..selection.w {
            let sx = selection.x + col;
            let a = u16::from(feathered[(sy * mask_width + sx) as usize]);
            if a == 0 {
                continue;
            }
            let si = ((sy * image.width() + sx) as usize) * 4;
            let di = ((row * selection.w + col) as usize) * 4;
            for c in 0..4 {
                out[di + c] = crate::math::mul_div255(u16::from(src[si + c]), a);
            }
        }
    }
    Surface::from_premul_data(selection.w, selection.h, out)
}

/// Ordered collection of regions plus the active-region pointer. Creation
/// order is presentation order; at least one region always exists once
/// `ensure_one` has run.
#[derive(Clone, Debug, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    active: Option<RegionId>,
    next_id: RegionId,
    color_index: usize,
}

impl RegionSet {
    fn next_color(&mut self) -> String {
        let color = REGION_COLORS[self.color_index % REGION_COLORS.len()];
        self.color_index += 1;
        color.to_string()
    }

    pub fn ensure_one(&mut self, canvas: Canvas) {
        if self.regions.is_empty() {
            self.add(canvas);
        } else if self.active_region().is_none() {
            self.active = Some(self.regions[0].id);
        }
    }

    pub fn add(&mut self, canvas: Canvas) -> RegionId {
        self.next_id += 1;
        let id = self.next_id;
        let name = format!("Region {}", self.regions.len() + 1);
        let color = self.next_color();
        self.regions.push(Region::new(id, name, color, canvas));
        self.active = Some(id);
        id
    }

    /// Deep copy of settings and mask state; transient offset, particles,
    /// and undo history start fresh. The copy becomes active.
    pub fn duplicate(&mut self, id: RegionId) -> FlowResult<RegionId> {
        let source = self
            .get(id)
            .ok_or_else(|| FlowError::validation("unknown region id"))?
            .clone();
        self.next_id += 1;
        let new_id = self.next_id;
        let color = self.next_color();
        let mut clone = source;
        clone.id = new_id;
        clone.name = format!("{} Copy", clone.name);
        clone.color = color;
        clone.offset = Vec2::ZERO;
        clone.particles = Vec::new();
        self.regions.push(clone);
        self.active = Some(new_id);
        Ok(new_id)
    }

    /// Removing the last region is refused; the canvas always has somewhere
    /// to paint.
    pub fn remove(&mut self, id: RegionId) -> FlowResult<()> {
        if self.regions.len() <= 1 {
            return Err(FlowError::validation("cannot remove the last region"));
        }
        let index = self
            .regions
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| FlowError::validation("unknown region id"))?;
        self.regions.remove(index);
        if self.active == Some(id) {
            self.active = self.regions.first().map(|r| r.id);
        }
        Ok(())
    }

    pub fn set_active(&mut self, id: RegionId) -> FlowResult<()> {
        if self.get(id).is_none() {
            return Err(FlowError::validation("unknown region id"));
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn active_id(&self) -> Option<RegionId> {
        self.active
    }

    pub fn active_region(&self) -> Option<&Region> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_region_mut(&mut self) -> Option<&mut Region> {
        let id = self.active?;
        self.get_mut(id)
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.regions.iter_mut()
    }

    pub fn has_playable(&self) -> bool {
        self.regions.iter().any(Region::is_playable)
    }

    /// Replaces every region's canvas-sized state, e.g. after an image swap.
    pub fn reset_for_canvas(&mut self, canvas: Canvas) {
        for region in &mut self.regions {
            region.mask = MaskLayer::new(canvas);
            region.feathered = vec![0; canvas.pixel_count()];
            region.selection = None;
            region.centroid = None;
            region.layer = Surface::new(1, 1);
            region.particles = Vec::new();
            region.reset_transients();
            region.metrics_dirty = true;
        }
    }
}
