use crate::error::{FlowError, FlowResult};

pub use kurbo::{Point, Rect, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> FlowResult<Self> {
        if width == 0 || height == 0 {
            return Err(FlowError::validation("canvas width/height must be > 0"));
        }
        Ok(Self { width, height })
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Axis-aligned pixel bounding box of a mask's painted area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Bounds {
    pub fn span(self) -> u32 {
        self.w.max(self.h)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Play the timeline through once, then stop.
    Once,
    /// Smooth repeat: raised-cosine travel wave, zero velocity at both ends.
    #[default]
    Loop,
    /// Forward-then-reverse repeat: triangle travel wave.
    PingPong,
}

/// One rendered frame: premultiplied RGBA8, row-major.
#[derive(Clone, Debug)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_rejects_zero_dimensions() {
        assert!(Canvas::new(0, 10).is_err());
        assert!(Canvas::new(10, 0).is_err());
        assert_eq!(Canvas::new(4, 3).unwrap().pixel_count(), 12);
    }

    #[test]
    fn loop_mode_serde_uses_lowercase_names() {
        let s = serde_json::to_string(&LoopMode::PingPong).unwrap();
        assert_eq!(s, "\"pingpong\"");
        let de: LoopMode = serde_json::from_str("\"once\"").unwrap();
        assert_eq!(de, LoopMode::Once);
    }

    #[test]
    fn bounds_span_is_max_axis() {
        let b = Bounds {
            x: 0,
            y: 0,
            w: 50,
            h: 20,
        };
        assert_eq!(b.span(), 50);
    }
}
