use crate::{
    error::IconResult,
    geom::{Affine, BezPath, CanvasSize, Point, Rect, Rgba8, Vec2},
    raster::{self, RasterImage},
    text::{StyledText, TextShaper},
};

/// Default banner fill when the styled text carries no background color.
pub const DEFAULT_BANNER_COLOR: Rgba8 = Rgba8::from_rgb_hex(0xFFCC00);

/// Upper clamp for [`BannerSpec::min_margin`].
pub const MAX_TEXT_MARGIN: f64 = 0.4;

/// Inner and outer corner-band edges as fractions of the canvas min dimension.
const CORNER_BAND_INNER: f64 = 0.20;
const CORNER_BAND_OUTER: f64 = 0.45;

/// Strip height as a fraction of the canvas min dimension.
const STRIP_FRACTION: f64 = 0.25;

const MIN_FONT_SIZE: f64 = 1.0;
const TRUNCATION_TOLERANCE: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BannerPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
}

impl BannerPosition {
    fn is_corner(self) -> bool {
        !matches!(self, Self::Top | Self::Bottom)
    }

    /// Horizontal reflection of corner placement; edge strips are unaffected.
    fn mirrored(self) -> Self {
        match self {
            Self::TopLeft => Self::TopRight,
            Self::TopRight => Self::TopLeft,
            Self::BottomLeft => Self::BottomRight,
            Self::BottomRight => Self::BottomLeft,
            other => other,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerSpec {
    pub position: BannerPosition,
    pub text: StyledText,
    #[serde(default)]
    pub mirrored: bool,
    #[serde(default)]
    pub min_margin: f64,
    #[serde(default)]
    pub debug_overlay: bool,
}

impl BannerSpec {
    /// Out-of-range margins are clamped, not rejected.
    pub fn new(position: BannerPosition, text: StyledText, min_margin: f64) -> Self {
        Self {
            position,
            text,
            mirrored: false,
            min_margin: clamp_margin(min_margin),
            debug_overlay: false,
        }
    }

    pub fn fill_color(&self) -> Rgba8 {
        self.text.background_color.unwrap_or(DEFAULT_BANNER_COLOR)
    }
}

fn clamp_margin(m: f64) -> f64 {
    if m.is_finite() {
        m.clamp(0.0, MAX_TEXT_MARGIN)
    } else {
        0.0
    }
}

/// Placement of the banner shape and its text within a canvas.
struct BannerLayout {
    shape: BezPath,
    /// Fit rect dimensions in (possibly rotated) text space.
    fit_width: f64,
    fit_height: f64,
    /// Canvas-space point the fitted text is centered on.
    anchor: Point,
    rotation_rad: f64,
}

/// Renders color-filled banner shapes carrying fitted styled text.
pub struct BannerCompositor<'a> {
    shaper: &'a mut TextShaper,
}

impl<'a> BannerCompositor<'a> {
    pub fn new(shaper: &'a mut TextShaper) -> Self {
        Self { shaper }
    }

    /// Render the banner onto a transparent canvas of `canvas` size.
    ///
    /// The returned flag is true when the text is truncated: even at the
    /// minimum font size its ink bounds exceed the margin-adjusted fit rect.
    pub fn render(
        &mut self,
        spec: &BannerSpec,
        canvas: CanvasSize,
    ) -> IconResult<(RasterImage, bool)> {
        spec.text.validate()?;
        let margin = clamp_margin(spec.min_margin);
        let layout = banner_layout(spec, canvas, margin);

        // Diagonal shapes risk glyph clipping at typographic tolerance, so
        // corners fit against ink bounds; straight strips use line metrics.
        let use_ink = effective_position(spec).is_corner();
        let fit_rect = Rect::new(0.0, 0.0, layout.fit_width, layout.fit_height);
        let max_size = (layout.fit_height * 3.0).max(MIN_FONT_SIZE);
        let size = self
            .shaper
            .optimal_font_size(&spec.text, fit_rect, MIN_FONT_SIZE, max_size, use_ink)?;

        let ink = self.shaper.ink_bounds(&spec.text, size)?;
        let truncated = ink.width() > layout.fit_width + TRUNCATION_TOLERANCE
            || ink.height() > layout.fit_height + TRUNCATION_TOLERANCE;

        let width_u16: u16 = canvas
            .width
            .try_into()
            .map_err(|_| crate::error::IconError::geometry("canvas width exceeds u16"))?;
        let height_u16: u16 = canvas
            .height
            .try_into()
            .map_err(|_| crate::error::IconError::geometry("canvas height exceeds u16"))?;
        let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);

        let fill = spec.fill_color();
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            fill.r, fill.g, fill.b, fill.a,
        ));
        ctx.fill_path(&raster::bezpath_to_cpu(&layout.shape));

        let text_transform = self.draw_banner_text(&mut ctx, spec, &layout, size, ink)?;

        if spec.debug_overlay {
            let placement = Affine::translate(layout.anchor.to_vec2())
                * Affine::rotate(layout.rotation_rad);
            let half = Vec2::new(layout.fit_width / 2.0, layout.fit_height / 2.0);
            draw_rect_outline(
                &mut ctx,
                placement,
                Rect::new(-half.x, -half.y, half.x, half.y),
                Rgba8::opaque(255, 0, 0),
            );
            if ink.area() > 0.0 {
                draw_rect_outline(&mut ctx, text_transform, ink, Rgba8::opaque(0, 0, 255));
            }
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        ctx.render_to_pixmap(&mut pixmap);
        Ok((RasterImage::from_pixmap(&pixmap)?, truncated))
    }

    /// Draw the fitted text; returns the canvas-space transform it was drawn
    /// under (layout space -> canvas space).
    fn draw_banner_text(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        spec: &BannerSpec,
        layout: &BannerLayout,
        size: f64,
        ink: Rect,
    ) -> IconResult<Affine> {
        let fg = spec.text.foreground();
        let shaped = self.shaper.layout(
            &spec.text.text,
            spec.text.font_family(),
            size as f32,
            fg.into(),
            None,
        )?;

        // Center the painted glyphs (falling back to typographic bounds when
        // nothing was measured) on the banner anchor.
        let center = if ink.area() > 0.0 {
            ink.center()
        } else {
            Point::new(
                f64::from(shaped.full_width()) / 2.0,
                f64::from(shaped.height()) / 2.0,
            )
        };
        let transform = Affine::translate(layout.anchor.to_vec2())
            * Affine::rotate(layout.rotation_rad)
            * Affine::translate(-center.to_vec2());

        if let Some(font) = self.shaper.font_paint_for(spec.text.font_family()) {
            ctx.set_transform(raster::affine_to_cpu(transform));
            crate::text::draw_layout(ctx, &shaped, &font);
        }
        Ok(transform)
    }
}

fn effective_position(spec: &BannerSpec) -> BannerPosition {
    if spec.mirrored {
        spec.position.mirrored()
    } else {
        spec.position
    }
}

fn banner_layout(spec: &BannerSpec, canvas: CanvasSize, margin: f64) -> BannerLayout {
    let w = f64::from(canvas.width);
    let h = f64::from(canvas.height);
    let m = f64::from(canvas.min_dimension());

    match effective_position(spec) {
        BannerPosition::Top => strip_layout(w, h, m, margin, true),
        BannerPosition::Bottom => strip_layout(w, h, m, margin, false),
        corner => corner_layout(w, h, m, margin, corner),
    }
}

fn strip_layout(w: f64, h: f64, m: f64, margin: f64, top: bool) -> BannerLayout {
    let strip_h = (STRIP_FRACTION * m).max(1.0);
    let (y0, y1) = if top { (0.0, strip_h) } else { (h - strip_h, h) };

    let mut shape = BezPath::new();
    shape.move_to((0.0, y0));
    shape.line_to((w, y0));
    shape.line_to((w, y1));
    shape.line_to((0.0, y1));
    shape.close_path();

    BannerLayout {
        shape,
        fit_width: w * (1.0 - 2.0 * margin),
        fit_height: strip_h * (1.0 - 2.0 * margin),
        anchor: Point::new(w / 2.0, (y0 + y1) / 2.0),
        rotation_rad: 0.0,
    }
}

fn corner_layout(w: f64, h: f64, m: f64, margin: f64, corner: BannerPosition) -> BannerLayout {
    let inner = CORNER_BAND_INNER * m;
    let outer = CORNER_BAND_OUTER * m;

    // Band between the diagonals x + y = inner and x + y = outer in the
    // top-left frame; other corners are reflections.
    let base = [
        Point::new(0.0, inner),
        Point::new(inner, 0.0),
        Point::new(outer, 0.0),
        Point::new(0.0, outer),
    ];
    let mid = (inner + outer) / 2.0;
    let base_anchor = Point::new(mid / 2.0, mid / 2.0);

    let (flip_x, flip_y, rotation_deg) = match corner {
        BannerPosition::TopLeft => (false, false, -45.0),
        BannerPosition::TopRight => (true, false, 45.0),
        BannerPosition::BottomLeft => (false, true, 45.0),
        BannerPosition::BottomRight => (true, true, -45.0),
        _ => unreachable!("strip positions handled by strip_layout"),
    };

    let reflect = |p: Point| -> Point {
        Point::new(
            if flip_x { w - p.x } else { p.x },
            if flip_y { h - p.y } else { p.y },
        )
    };

    let mut shape = BezPath::new();
    shape.move_to(reflect(base[0]));
    shape.line_to(reflect(base[1]));
    shape.line_to(reflect(base[2]));
    shape.line_to(reflect(base[3]));
    shape.close_path();

    // Usable band: midline length along the diagonal, thickness between the
    // two diagonal edges.
    let band_length = mid * std::f64::consts::SQRT_2;
    let band_thickness = (outer - inner) / std::f64::consts::SQRT_2;

    BannerLayout {
        shape,
        fit_width: band_length * (1.0 - 2.0 * margin),
        fit_height: band_thickness * (1.0 - 2.0 * margin),
        anchor: reflect(base_anchor),
        rotation_rad: rotation_deg * std::f64::consts::PI / 180.0,
    }
}

/// Thin outline via four filled rects; stroke-free so it stays within the
/// vello_cpu API surface used elsewhere.
fn draw_rect_outline(
    ctx: &mut vello_cpu::RenderContext,
    transform: Affine,
    rect: Rect,
    color: Rgba8,
) {
    let t = 1.0;
    ctx.set_transform(raster::affine_to_cpu(transform));
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
        color.r, color.g, color.b, color.a,
    ));
    for edge in [
        Rect::new(rect.x0, rect.y0, rect.x1, rect.y0 + t),
        Rect::new(rect.x0, rect.y1 - t, rect.x1, rect.y1),
        Rect::new(rect.x0, rect.y0, rect.x0 + t, rect.y1),
        Rect::new(rect.x1 - t, rect.y0, rect.x1, rect.y1),
    ] {
        ctx.fill_rect(&raster::rect_to_cpu(edge));
    }
}
