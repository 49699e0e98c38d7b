use crate::{
    banner::{BannerCompositor, BannerSpec},
    error::{IconError, IconResult},
    geom::{Affine, CanvasSize, Transform2D},
    overlay::{OverlayPlacer, OverlaySpec},
    raster::{self, RasterImage},
    text::TextShaper,
};

/// Result of a layered composition.
#[derive(Clone, Debug)]
pub struct ComposedIcon {
    pub image: RasterImage,
    /// True when the banner text had to be truncated to fit.
    pub banner_truncated: bool,
}

/// Merges a base image, an optional overlay and an optional banner into one
/// raster at a requested size. Composition order is fixed: base, overlay,
/// banner (the banner always paints last so it is never obscured).
pub struct LayeredCompositor {
    shaper: TextShaper,
}

impl Default for LayeredCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl LayeredCompositor {
    pub fn new() -> Self {
        Self {
            shaper: TextShaper::new(),
        }
    }

    pub fn with_shaper(shaper: TextShaper) -> Self {
        Self { shaper }
    }

    /// Access for registering fonts before composing.
    pub fn shaper_mut(&mut self) -> &mut TextShaper {
        &mut self.shaper
    }

    /// Pure except for shaper-internal caches: the same inputs always produce
    /// a pixel-identical image.
    pub fn compose(
        &mut self,
        base: &RasterImage,
        overlay: Option<&OverlaySpec>,
        banner: Option<&BannerSpec>,
        output: CanvasSize,
        allow_upscale: bool,
    ) -> IconResult<ComposedIcon> {
        let base_w = f64::from(base.width());
        let base_h = f64::from(base.height());
        let scale = (f64::from(output.width) / base_w).min(f64::from(output.height) / base_h);
        if scale > 1.0 && !allow_upscale {
            return Err(IconError::Upscale {
                source_width: base.width(),
                source_height: base.height(),
                target_width: output.width,
                target_height: output.height,
            });
        }

        let width_u16: u16 = output
            .width
            .try_into()
            .map_err(|_| IconError::geometry("output width exceeds u16"))?;
        let height_u16: u16 = output
            .height
            .try_into()
            .map_err(|_| IconError::geometry("output height exceeds u16"))?;
        let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);

        // Base: aspect-fit, centered.
        let offset = (
            (f64::from(output.width) - base_w * scale) / 2.0,
            (f64::from(output.height) - base_h * scale) / 2.0,
        );
        let transform = Affine::translate(offset) * Affine::scale(scale);
        ctx.set_transform(raster::affine_to_cpu(transform));
        ctx.set_paint(base.to_paint()?);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, base_w, base_h));

        if let Some(spec) = overlay {
            let placed = OverlayPlacer::place(spec, output)?;
            draw_full_canvas(&mut ctx, &placed)?;
        }

        let mut banner_truncated = false;
        if let Some(spec) = banner {
            let (rendered, truncated) =
                BannerCompositor::new(&mut self.shaper).render(spec, output)?;
            banner_truncated = truncated;
            draw_full_canvas(&mut ctx, &rendered)?;
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        ctx.render_to_pixmap(&mut pixmap);

        Ok(ComposedIcon {
            image: RasterImage::from_pixmap(&pixmap)?,
            banner_truncated,
        })
    }
}

/// Redraw `base` onto a transparent canvas under an arbitrary transform.
/// This is the scene builder primitive for animation frames.
pub fn transformed(
    base: &RasterImage,
    transform: &Transform2D,
    canvas: CanvasSize,
) -> IconResult<RasterImage> {
    let width_u16: u16 = canvas
        .width
        .try_into()
        .map_err(|_| IconError::geometry("canvas width exceeds u16"))?;
    let height_u16: u16 = canvas
        .height
        .try_into()
        .map_err(|_| IconError::geometry("canvas height exceeds u16"))?;

    let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);
    ctx.set_transform(raster::affine_to_cpu(transform.to_affine()));
    ctx.set_paint(base.to_paint()?);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(base.width()),
        f64::from(base.height()),
    ));
    ctx.flush();

    let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
    ctx.render_to_pixmap(&mut pixmap);
    RasterImage::from_pixmap(&pixmap)
}

fn draw_full_canvas(ctx: &mut vello_cpu::RenderContext, layer: &RasterImage) -> IconResult<()> {
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(layer.to_paint()?);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(layer.width()),
        f64::from(layer.height()),
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        banner::BannerPosition,
        geom::{Rgba8, Vec2},
        text::StyledText,
    };

    fn base(edge: u32) -> RasterImage {
        RasterImage::solid(
            CanvasSize::new(edge, edge).unwrap(),
            Rgba8::opaque(0, 0, 200),
        )
    }

    #[test]
    fn compose_is_idempotent() {
        let mut compositor = LayeredCompositor::new();
        let base = base(128);
        let overlay = OverlaySpec::centered(
            RasterImage::solid(CanvasSize::new(32, 32).unwrap(), Rgba8::opaque(255, 0, 0)),
            0.4,
        );
        let banner = BannerSpec::new(BannerPosition::Top, StyledText::plain("BETA"), 0.1);
        let output = CanvasSize::new(64, 64).unwrap();

        let a = compositor
            .compose(&base, Some(&overlay), Some(&banner), output, false)
            .unwrap();
        let b = compositor
            .compose(&base, Some(&overlay), Some(&banner), output, false)
            .unwrap();
        assert_eq!(a.image, b.image);
        assert_eq!(a.banner_truncated, b.banner_truncated);
    }

    #[test]
    fn upscale_is_rejected_unless_allowed() {
        let mut compositor = LayeredCompositor::new();
        let small = base(32);
        let output = CanvasSize::new(64, 64).unwrap();

        let err = compositor
            .compose(&small, None, None, output, false)
            .unwrap_err();
        assert!(matches!(
            err,
            IconError::Upscale {
                target_width: 64,
                target_height: 64,
                ..
            }
        ));

        let ok = compositor.compose(&small, None, None, output, true).unwrap();
        assert_eq!(ok.image.size(), output);
    }

    #[test]
    fn upscale_error_carries_the_requested_output_edges() {
        // The wider requested edge is the one forcing the upscale; both edges
        // are reported as asked for, not reduced to the smaller one.
        let mut compositor = LayeredCompositor::new();
        let small = base(32);
        let output = CanvasSize::new(100, 40).unwrap();

        let err = compositor
            .compose(&small, None, None, output, false)
            .unwrap_err();
        match err {
            IconError::Upscale {
                source_width,
                source_height,
                target_width,
                target_height,
            } => {
                assert_eq!((source_width, source_height), (32, 32));
                assert_eq!((target_width, target_height), (100, 40));
            }
            other => panic!("expected an upscale error, got {other}"),
        }
    }

    #[test]
    fn banner_paints_on_top_of_the_base() {
        let mut compositor = LayeredCompositor::new();
        let base = base(64);
        let banner = BannerSpec::new(BannerPosition::Top, StyledText::plain(""), 0.0);
        let out = compositor
            .compose(&base, None, Some(&banner), CanvasSize::new(64, 64).unwrap(), false)
            .unwrap();

        // Inside the top strip the banner fill wins over the blue base.
        let idx = ((4 * 64 + 32) * 4) as usize;
        let px = &out.image.premul_data()[idx..idx + 4];
        assert!(px[0] > 150, "expected banner red channel, got {px:?}");
        assert!(px[2] < 100, "expected base blue to be covered, got {px:?}");
    }

    #[test]
    fn base_is_centered_when_aspect_ratios_differ() {
        let mut compositor = LayeredCompositor::new();
        let wide = RasterImage::solid(
            CanvasSize::new(128, 64).unwrap(),
            Rgba8::opaque(0, 255, 0),
        );
        let out = compositor
            .compose(&wide, None, None, CanvasSize::new(64, 64).unwrap(), false)
            .unwrap();

        let alpha = |x: u32, y: u32| out.image.premul_data()[((y * 64 + x) * 4 + 3) as usize];
        // Fitted to 64x32, vertically centered: rows 0..16 and 48.. stay clear.
        assert_eq!(alpha(32, 4), 0);
        assert_ne!(alpha(32, 32), 0);
        assert_eq!(alpha(32, 60), 0);
    }

    #[test]
    fn transformed_moves_pixels() {
        let canvas = CanvasSize::new(32, 32).unwrap();
        let img = RasterImage::solid(canvas, Rgba8::opaque(10, 10, 10));
        let shift = Transform2D {
            translate: Vec2::new(16.0, 0.0),
            ..Transform2D::default()
        };
        let moved = transformed(&img, &shift, canvas).unwrap();
        let alpha = |x: u32, y: u32| moved.premul_data()[((y * 32 + x) * 4 + 3) as usize];
        assert_eq!(alpha(2, 16), 0);
        assert_ne!(alpha(30, 16), 0);
    }
}
