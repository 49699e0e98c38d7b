use std::{path::Path, sync::Arc};

use anyhow::Context as _;

use crate::{
    error::{IconError, IconResult},
    geom::{CanvasSize, Rgba8},
};

/// Owned raster pixel buffer in premultiplied RGBA8, row-major, tightly packed.
///
/// Compositing never mutates a `RasterImage` in place; every transform yields
/// a fresh buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    rgba8_premul: Vec<u8>,
    opaque: bool,
}

impl RasterImage {
    pub fn from_premul_rgba8(width: u32, height: u32, rgba8_premul: Vec<u8>) -> IconResult<Self> {
        if width == 0 || height == 0 {
            return Err(IconError::geometry("image width/height must be > 0"));
        }
        if rgba8_premul.len() != width as usize * height as usize * 4 {
            return Err(IconError::validation("image byte length mismatch"));
        }
        let opaque = rgba8_premul.chunks_exact(4).all(|px| px[3] == 255);
        Ok(Self {
            width,
            height,
            rgba8_premul,
            opaque,
        })
    }

    /// Decode any format the `image` crate understands into premultiplied RGBA8.
    pub fn decode(bytes: &[u8]) -> IconResult<Self> {
        let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut data = rgba.into_raw();
        premultiply_rgba8_in_place(&mut data);
        Self::from_premul_rgba8(width, height, data)
    }

    pub fn decode_file(path: &Path) -> IconResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read image file '{}'", path.display()))?;
        Self::decode(&bytes)
    }

    /// Uniform fill, mostly useful for tests and placeholder icons.
    pub fn solid(size: CanvasSize, color: Rgba8) -> Self {
        let px = premul_px(color);
        let mut data = Vec::with_capacity(size.width as usize * size.height as usize * 4);
        for _ in 0..(size.width as usize * size.height as usize) {
            data.extend_from_slice(&px);
        }
        Self {
            width: size.width,
            height: size.height,
            rgba8_premul: data,
            opaque: color.a == 255,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> CanvasSize {
        CanvasSize {
            width: self.width,
            height: self.height,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn premul_data(&self) -> &[u8] {
        &self.rgba8_premul
    }

    /// Whether this image can be drawn at `target` pixels per edge without
    /// upscaling. Callers must consult this before compositing when upscaling
    /// is disallowed.
    pub fn can_be_scaled_to(&self, target: u32) -> bool {
        self.width >= target && self.height >= target
    }

    pub fn from_pixmap(pixmap: &vello_cpu::Pixmap) -> IconResult<Self> {
        Self::from_premul_rgba8(
            u32::from(pixmap.width()),
            u32::from(pixmap.height()),
            pixmap.data_as_u8_slice().to_vec(),
        )
    }

    pub fn to_pixmap(&self) -> IconResult<vello_cpu::Pixmap> {
        premul_bytes_to_pixmap(&self.rgba8_premul, self.width, self.height)
    }

    /// Image paint for drawing into a `vello_cpu::RenderContext`.
    pub fn to_paint(&self) -> IconResult<vello_cpu::Image> {
        Ok(vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(self.to_pixmap()?)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        })
    }

    /// Straight-alpha RGBA8 copy, suitable for PNG encoding.
    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        let mut out = self.rgba8_premul.clone();
        unpremultiply_rgba8_in_place(&mut out);
        out
    }

    pub fn encode_png(&self) -> IconResult<Vec<u8>> {
        let data = self.to_straight_rgba8();
        let img = image::RgbaImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| IconError::encode("pixel buffer does not match dimensions"))?;
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .context("encode png")?;
        Ok(buf)
    }
}

pub(crate) fn premul_px(color: Rgba8) -> [u8; 4] {
    let a = u16::from(color.a);
    let premul = |c: u8| -> u8 { ((u16::from(c) * a + 127) / 255) as u8 };
    [premul(color.r), premul(color.g), premul(color.b), color.a]
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

pub(crate) fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u32 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u32 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u32 * 255 + a / 2) / a).min(255) as u8;
    }
}

pub(crate) fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> IconResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| IconError::geometry("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| IconError::geometry("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(IconError::validation("image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

// vello_cpu re-exports its own kurbo; bridge from the crate-level kurbo types
// at the draw seam.
pub(crate) fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

pub(crate) fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

pub(crate) fn rect_to_cpu(r: kurbo::Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn decode_png_dimensions_and_premul() {
        let src_rgba = vec![100u8, 50u8, 200u8, 128u8];
        let img = image::RgbaImage::from_raw(1, 1, src_rgba).unwrap();

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let decoded = RasterImage::decode(&buf).unwrap();
        assert_eq!(decoded.width(), 1);
        assert_eq!(decoded.height(), 1);
        assert!(!decoded.is_opaque());
        assert_eq!(
            decoded.premul_data(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn solid_opaque_roundtrips_through_png() {
        let img = RasterImage::solid(CanvasSize::new(3, 2).unwrap(), Rgba8::opaque(10, 20, 30));
        assert!(img.is_opaque());

        let png = img.encode_png().unwrap();
        let back = RasterImage::decode(&png).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn unpremultiply_inverts_premultiply_for_opaque_alpha() {
        let mut data = vec![10, 20, 30, 255, 0, 0, 0, 0];
        let original = data.clone();
        premultiply_rgba8_in_place(&mut data);
        unpremultiply_rgba8_in_place(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn can_be_scaled_to_requires_both_edges() {
        let img = RasterImage::solid(CanvasSize::new(256, 128).unwrap(), Rgba8::BLACK);
        assert!(img.can_be_scaled_to(128));
        assert!(!img.can_be_scaled_to(256)); // height is only 128
        assert!(!img.can_be_scaled_to(512));
    }

    #[test]
    fn pixmap_roundtrip_preserves_pixels() {
        let img = RasterImage::solid(CanvasSize::new(4, 4).unwrap(), Rgba8::new(64, 0, 0, 128));
        let pixmap = img.to_pixmap().unwrap();
        let back = RasterImage::from_pixmap(&pixmap).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn byte_length_mismatch_is_rejected() {
        assert!(RasterImage::from_premul_rgba8(2, 2, vec![0u8; 4]).is_err());
        assert!(premul_bytes_to_pixmap(&[0u8; 4], 2, 2).is_err());
    }
}
