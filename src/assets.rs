use std::{path::Path, sync::Arc};

use anyhow::Context as _;

use crate::{
    error::{FlowError, FlowResult},
    math::mul_div255,
    surface::Surface,
};

/// Fill color used when no image has been loaded (dark slate).
pub const BLANK_FILL_RGB: [u8; 3] = [31, 41, 55];

/// A decoded base image: premultiplied RGBA8, row-major, shared cheaply
/// between the context and the surfaces built from it.
#[derive(Clone, Debug)]
pub struct SourceImage {
    width: u32,
    height: u32,
    rgba8_premul: Arc<Vec<u8>>,
}

impl SourceImage {
    pub fn from_premul(width: u32, height: u32, data: Vec<u8>) -> FlowResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| FlowError::validation("image size overflow"))?;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(FlowError::validation("image data must match width*height*4"));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(data),
        })
    }

    /// Solid stand-in so painting and playback work before any image loads.
    pub fn blank(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let [r, g, b] = BLANK_FILL_RGB;
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[r, g, b, 255]);
        }
        Self {
            width,
            height,
            rgba8_premul: Arc::new(data),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.rgba8_premul
    }

    pub fn to_surface(&self) -> Surface {
        Surface::from_premul_data(self.width, self.height, self.rgba8_premul.as_ref().clone())
            .unwrap_or_else(|_| Surface::new(self.width, self.height))
    }
}

/// Decodes any format the `image` crate recognizes and premultiplies in
/// place, so everything downstream works on one pixel model.
pub fn decode_image(bytes: &[u8]) -> FlowResult<SourceImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| FlowError::validation(format!("image decode failed: {e}")))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut data = rgba.into_raw();
    premultiply_rgba8_in_place(&mut data);
    tracing::debug!(width, height, "decoded source image");
    SourceImage::from_premul(width, height, data)
}

pub fn load_image(path: &Path) -> FlowResult<SourceImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading image {}", path.display()))
        .map_err(FlowError::Other)?;
    decode_image(&bytes)
}

fn premultiply_rgba8_in_place(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        px[0] = mul_div255(u16::from(px[0]), a);
        px[1] = mul_div255(u16::from(px[1]), a);
        px[2] = mul_div255(u16::from(px[2]), a);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn blank_image_is_solid_slate() {
        let img = SourceImage::blank(4, 2);
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 2);
        for px in img.data().chunks_exact(4) {
            assert_eq!(px, [31, 41, 55, 255]);
        }
    }

    #[test]
    fn decode_premultiplies_translucent_pixels() {
        let mut buf = image::RgbaImage::new(2, 1);
        buf.put_pixel(0, 0, image::Rgba([200, 100, 50, 128]));
        buf.put_pixel(1, 0, image::Rgba([200, 100, 50, 255]));
        let mut bytes = Vec::new();
        buf.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let img = decode_image(&bytes).unwrap();
        let data = img.data();
        // Half-alpha pixel scales channels; opaque pixel passes through.
        assert_eq!(data[0], 100);
        assert_eq!(data[3], 128);
        assert_eq!(&data[4..8], &[200, 100, 50, 255]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(&[0, 1, 2, 3]).is_err());
    }

    #[test]
    fn from_premul_validates_length() {
        assert!(SourceImage::from_premul(2, 2, vec![0; 15]).is_err());
        assert!(SourceImage::from_premul(0, 2, vec![]).is_err());
    }
}
