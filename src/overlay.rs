use crate::{
    anim::AnimationSpec,
    error::{IconError, IconResult},
    geom::{CanvasSize, Rect, Vec2},
    raster::{self, RasterImage},
};

/// Default sampling granularity for [`auto_inset`] (1% of the sweep).
pub const AUTO_INSET_STEPS: usize = 100;

const INSET_EPSILON: f64 = 1e-6;
const MAX_INSET_PASSES: usize = 8;

/// A secondary image composited into a host canvas at a normalized position
/// and scale.
#[derive(Clone, Debug)]
pub struct OverlaySpec {
    pub image: RasterImage,
    /// Center offset in `[-1, 1]` per axis; `(0, 0)` is the host center.
    pub center_offset: Vec2,
    /// Drawn size as a fraction of the host's min dimension, in `(0, 1]`.
    pub scale: f64,
    /// Width/height ratio of the drawn overlay.
    pub aspect_ratio: f64,
}

impl OverlaySpec {
    pub fn centered(image: RasterImage, scale: f64) -> Self {
        let aspect_ratio = f64::from(image.width()) / f64::from(image.height());
        Self {
            image,
            center_offset: Vec2::ZERO,
            scale,
            aspect_ratio,
        }
    }

    pub fn validate(&self) -> IconResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 || self.scale > 1.0 {
            return Err(IconError::validation("overlay scale must be in (0, 1]"));
        }
        if !self.aspect_ratio.is_finite() || self.aspect_ratio <= 0.0 {
            return Err(IconError::validation("overlay aspect_ratio must be > 0"));
        }
        if self.center_offset.x.abs() > 1.0 || self.center_offset.y.abs() > 1.0 {
            return Err(IconError::validation(
                "overlay center_offset components must be in [-1, 1]",
            ));
        }
        Ok(())
    }

    /// Canvas-space rect the overlay will occupy inside `host`.
    pub fn placement_rect(&self, host: CanvasSize) -> IconResult<Rect> {
        self.validate()?;

        let base = f64::from(host.min_dimension()) * self.scale;
        let (w, h) = if self.aspect_ratio >= 1.0 {
            (base, base / self.aspect_ratio)
        } else {
            (base * self.aspect_ratio, base)
        };

        let host_w = f64::from(host.width);
        let host_h = f64::from(host.height);
        let center = host.center()
            + Vec2::new(
                self.center_offset.x * host_w / 2.0,
                self.center_offset.y * host_h / 2.0,
            );

        // Clamp the center, not the size, so the bounding box stays inside
        // the host.
        let cx = center.x.clamp(w / 2.0, (host_w - w / 2.0).max(w / 2.0));
        let cy = center.y.clamp(h / 2.0, (host_h - h / 2.0).max(h / 2.0));

        Ok(Rect::new(
            cx - w / 2.0,
            cy - h / 2.0,
            cx + w / 2.0,
            cy + h / 2.0,
        ))
    }
}

/// Positions and scales overlay images within a host canvas.
pub struct OverlayPlacer;

impl OverlayPlacer {
    /// Composite the overlay onto a transparent host-sized canvas.
    pub fn place(spec: &OverlaySpec, host: CanvasSize) -> IconResult<RasterImage> {
        let rect = spec.placement_rect(host)?;

        let width_u16: u16 = host
            .width
            .try_into()
            .map_err(|_| IconError::geometry("host width exceeds u16"))?;
        let height_u16: u16 = host
            .height
            .try_into()
            .map_err(|_| IconError::geometry("host height exceeds u16"))?;

        let img_w = f64::from(spec.image.width());
        let img_h = f64::from(spec.image.height());
        let transform = kurbo::Affine::translate((rect.x0, rect.y0))
            * kurbo::Affine::scale_non_uniform(rect.width() / img_w, rect.height() / img_h);

        let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);
        ctx.set_transform(raster::affine_to_cpu(transform));
        ctx.set_paint(spec.image.to_paint()?);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, img_w, img_h));
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        ctx.render_to_pixmap(&mut pixmap);
        RasterImage::from_pixmap(&pixmap)
    }
}

/// Minimum uniform inset keeping `bounds` inside the host canvas across the
/// whole transform sweep of `anim`.
///
/// The transform is caller-defined and may be arbitrary, so there is no
/// closed form; the sweep is sampled at `steps` points. A coarse step count
/// can miss narrow excursions, which is why the granularity is a parameter
/// rather than a constant. The inset is refined over a few passes until the
/// shrunken bounds show no remaining excursion.
pub fn auto_inset(
    anim: &AnimationSpec,
    bounds: Rect,
    host: CanvasSize,
    steps: usize,
) -> IconResult<f64> {
    if steps == 0 {
        return Err(IconError::validation("auto_inset steps must be > 0"));
    }
    if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return Err(IconError::geometry("auto_inset bounds must have positive size"));
    }

    let mut total = 0.0;
    for _ in 0..MAX_INSET_PASSES {
        let shrunk = Rect::new(
            bounds.x0 + total,
            bounds.y0 + total,
            bounds.x1 - total,
            bounds.y1 - total,
        );
        if shrunk.width() <= 0.0 || shrunk.height() <= 0.0 {
            break;
        }
        let excursion = max_excursion(anim, shrunk, host, steps);
        if excursion <= INSET_EPSILON {
            break;
        }
        total += excursion;
    }
    Ok(total)
}

/// Worst-case distance any transformed corner of `bounds` travels beyond the
/// host edges, sampled across the sweep.
fn max_excursion(anim: &AnimationSpec, bounds: Rect, host: CanvasSize, steps: usize) -> f64 {
    let host_w = f64::from(host.width);
    let host_h = f64::from(host.height);
    let corners = [
        kurbo::Point::new(bounds.x0, bounds.y0),
        kurbo::Point::new(bounds.x1, bounds.y0),
        kurbo::Point::new(bounds.x1, bounds.y1),
        kurbo::Point::new(bounds.x0, bounds.y1),
    ];

    let mut worst: f64 = 0.0;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let affine = anim.transform_at(t).to_affine();
        for corner in corners {
            let p = affine * corner;
            worst = worst
                .max(-p.x)
                .max(-p.y)
                .max(p.x - host_w)
                .max(p.y - host_h);
        }
    }
    worst
}
