#![forbid(unsafe_code)]

//! Region-based motion animation over a still image.
//!
//! Paint per-region alpha masks, derive selection bounds and a matted layer
//! from each, then translate the layers along configured direction vectors
//! with per-region crossfade and an optional rain/snow particle overlay.
//! One deterministic frame renderer serves both live preview ticks and
//! fixed-rate export.

pub mod assets;
pub mod clock;
pub mod context;
pub mod core;
pub mod error;
pub mod export;
pub mod mask;
pub mod math;
pub mod motion;
pub mod overlay;
pub mod region;
pub mod renderer;
pub mod surface;

pub use assets::{SourceImage, decode_image, load_image};
pub use clock::{ClockState, FrameScheduler, ManualScheduler};
pub use context::{FlowContext, FlowStatus, PendingCell};
pub use crate::core::{Bounds, Canvas, FrameRgba, LoopMode, Point, Rect, Vec2};
pub use error::{FlowError, FlowResult};
pub use export::{
    ExportConfig, ExportControl, ExportProgress, ExportSink, FfmpegSink, encode_mask_png,
};
pub use mask::MaskLayer;
pub use motion::{Crossfade, CrossfadeSample, MotionInput, MotionSample};
pub use overlay::{OverlayConfig, OverlayKind, Particle};
pub use region::{Region, RegionId, RegionSet};
pub use surface::Surface;
