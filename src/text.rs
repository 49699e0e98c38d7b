use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::Context as _;

use crate::{
    error::{IconError, IconResult},
    geom::{Rect, Rgba8},
};

/// Default typeface used when styled text names no (or an unknown) family.
/// DejaVu Sans, Bitstream Vera license; see `assets/fonts/LICENSE-DejaVu`.
const DEFAULT_FONT_BYTES: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// Search interval below which the font-size search stops refining.
pub const FONT_SIZE_EPSILON: f64 = 0.1;

/// Upper bound used by the legacy single-bound search form.
const LEGACY_START_SIZE: f64 = 512.0;

/// Fit tolerance in pixels when comparing measured text against a rect.
const FIT_TOLERANCE: f64 = 0.5;

const MAX_SEARCH_ITERATIONS: u32 = 24;

/// Font reference for styled text: a registered family name and a size.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FontSpec {
    pub family: String,
    pub size: f64,
}

/// Styled text with a closed attribute set.
///
/// Absent font and colors have defined defaults (black foreground, no
/// background); deserialization rejects unrecognized attributes so the
/// compositor only ever sees these four fields.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StyledText {
    pub text: String,
    #[serde(default)]
    pub font: Option<FontSpec>,
    #[serde(default)]
    pub foreground_color: Option<Rgba8>,
    #[serde(default)]
    pub background_color: Option<Rgba8>,
}

impl StyledText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: None,
            foreground_color: None,
            background_color: None,
        }
    }

    pub fn validate(&self) -> IconResult<()> {
        if let Some(font) = &self.font {
            if !font.size.is_finite() || font.size <= 0.0 {
                return Err(IconError::validation("font size must be finite and > 0"));
            }
        }
        Ok(())
    }

    pub fn foreground(&self) -> Rgba8 {
        self.foreground_color.unwrap_or(Rgba8::BLACK)
    }

    pub fn font_family(&self) -> Option<&str> {
        self.font.as_ref().map(|f| f.family.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrush {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

impl From<Rgba8> for TextBrush {
    fn from(c: Rgba8) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        }
    }
}

struct RegisteredFont {
    family: String,
    bytes: Arc<Vec<u8>>,
}

/// Stateful text measurement and shaping engine.
///
/// Owns the Parley font and layout contexts plus the set of fonts registered
/// from raw bytes. A bundled default face is registered up front so absent or
/// unknown families always resolve to real glyphs; nothing is discovered from
/// the host system, keeping output identical across machines. An explicitly
/// empty shaper (no fonts at all) produces empty layouts and zero
/// measurements (styling inputs degrade, they never fail).
pub struct TextShaper {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    fonts: Vec<RegisteredFont>,
    font_data_cache: HashMap<String, vello_cpu::peniko::FontData>,
}

impl Default for TextShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl TextShaper {
    /// Shaper with the bundled default face registered.
    pub fn new() -> Self {
        let mut shaper = Self::empty();
        if shaper
            .register_font_bytes(DEFAULT_FONT_BYTES.to_vec())
            .is_err()
        {
            // The embedded font is known-good; registration only fails on
            // malformed bytes.
            tracing::warn!("bundled default font failed to register");
        }
        shaper
    }

    /// Shaper with no fonts at all; text measures zero and nothing is drawn.
    pub fn empty() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            fonts: Vec::new(),
            font_data_cache: HashMap::new(),
        }
    }

    /// Register a font from raw bytes and return its family name.
    pub fn register_font_bytes(&mut self, bytes: Vec<u8>) -> IconResult<String> {
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| IconError::validation("no font families registered from font bytes"))?;

        let family = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| IconError::validation("registered font family has no name"))?
            .to_string();

        self.fonts.push(RegisteredFont {
            family: family.clone(),
            bytes: Arc::new(bytes),
        });
        Ok(family)
    }

    pub fn register_font_file(&mut self, path: &Path) -> IconResult<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read font file '{}'", path.display()))?;
        self.register_font_bytes(bytes)
    }

    pub fn has_fonts(&self) -> bool {
        !self.fonts.is_empty()
    }

    /// Match the requested family, or fall back to the most recently
    /// registered font so caller-supplied fonts shadow the bundled default.
    fn resolve_family(&self, requested: Option<&str>) -> Option<&RegisteredFont> {
        if let Some(name) = requested
            && let Some(font) = self
                .fonts
                .iter()
                .find(|f| f.family.eq_ignore_ascii_case(name))
        {
            return Some(font);
        }
        self.fonts.last()
    }

    pub(crate) fn font_paint_for(
        &mut self,
        requested: Option<&str>,
    ) -> Option<vello_cpu::peniko::FontData> {
        let font = self.resolve_family(requested)?;
        let family = font.family.clone();
        let bytes = Arc::clone(&font.bytes);
        Some(
            self.font_data_cache
                .entry(family)
                .or_insert_with(|| {
                    vello_cpu::peniko::FontData::new(
                        vello_cpu::peniko::Blob::from(bytes.as_ref().clone()),
                        0,
                    )
                })
                .clone(),
        )
    }

    /// Shape and lay out a single run of text at the given size.
    pub(crate) fn layout(
        &mut self,
        text: &str,
        requested_family: Option<&str>,
        size_px: f32,
        brush: TextBrush,
        max_width_px: Option<f32>,
    ) -> IconResult<parley::Layout<TextBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(IconError::validation("text size_px must be finite and > 0"));
        }

        let family = self
            .resolve_family(requested_family)
            .map(|f| f.family.clone());

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        if let Some(name) = family {
            builder.push_default(parley::style::StyleProperty::FontStack(
                parley::style::FontStack::Source(std::borrow::Cow::Owned(name)),
            ));
        }
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }

    /// Typographic (line-metric) bounds of `text` laid out at `size_px`.
    pub fn typographic_bounds(&mut self, text: &StyledText, size_px: f64) -> IconResult<Rect> {
        text.validate()?;
        let layout = self.layout(
            &text.text,
            text.font_family(),
            size_px as f32,
            TextBrush::default(),
            None,
        )?;
        Ok(Rect::new(
            0.0,
            0.0,
            f64::from(layout.full_width()),
            f64::from(layout.height()),
        ))
    }

    /// Tight bounds of actually-painted glyph pixels at `size_px`.
    ///
    /// Computed by rasterizing the layout and scanning coverage, so the result
    /// reflects what the banner renderer will really paint. The rect origin is
    /// relative to the layout origin and may be negative for glyphs with side
    /// bearings. Empty layouts (empty text, no registered font) yield a zero
    /// rect.
    pub fn ink_bounds(&mut self, text: &StyledText, size_px: f64) -> IconResult<Rect> {
        text.validate()?;
        if text.text.is_empty() {
            return Ok(Rect::ZERO);
        }

        let layout = self.layout(
            &text.text,
            text.font_family(),
            size_px as f32,
            TextBrush {
                r: 255,
                g: 255,
                b: 255,
                a: 255,
            },
            None,
        )?;
        let Some(font) = self.font_paint_for(text.font_family()) else {
            return Ok(Rect::ZERO);
        };

        let layout_w = f64::from(layout.full_width());
        let layout_h = f64::from(layout.height());
        if layout_w <= 0.0 || layout_h <= 0.0 {
            return Ok(Rect::ZERO);
        }

        // Padding absorbs negative bearings and overshoot outside the
        // typographic box.
        let pad = (4.0 + size_px * 0.25).ceil();
        let canvas_w = clamp_to_u16(layout_w + pad * 2.0)?;
        let canvas_h = clamp_to_u16(layout_h + pad * 2.0)?;

        let mut ctx = vello_cpu::RenderContext::new(canvas_w, canvas_h);
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((pad, pad)));
        draw_layout(&mut ctx, &layout, &font);
        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(canvas_w, canvas_h);
        ctx.render_to_pixmap(&mut pixmap);

        Ok(scan_coverage(
            pixmap.data_as_u8_slice(),
            u32::from(canvas_w),
            u32::from(canvas_h),
        )
        .map(|r| r - kurbo::Vec2::new(pad, pad))
        .unwrap_or(Rect::ZERO))
    }

    /// Largest font size in `[min_size, max_size]` at which `text` fits into
    /// `rect`, measured by ink bounds or typographic bounds per `use_ink`.
    ///
    /// Never fails for fit reasons: if even `min_size` does not fit, returns
    /// `min_size` and leaves truncation reporting to the caller. Empty text
    /// fits trivially and returns `max_size`.
    pub fn optimal_font_size(
        &mut self,
        text: &StyledText,
        rect: Rect,
        min_size: f64,
        max_size: f64,
        use_ink: bool,
    ) -> IconResult<f64> {
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return Err(IconError::geometry("fit rect must have positive size"));
        }
        if min_size < 0.0 || max_size < min_size {
            return Err(IconError::validation(
                "font size bounds must satisfy 0 <= min <= max",
            ));
        }
        if text.text.is_empty() {
            return Ok(max_size);
        }

        if self.fits(text, rect, max_size, use_ink)? {
            return Ok(max_size);
        }

        let mut lo = min_size;
        let mut hi = max_size;
        let mut best = min_size;
        let mut iterations = 0;
        while hi - lo > FONT_SIZE_EPSILON && iterations < MAX_SEARCH_ITERATIONS {
            let mid = (lo + hi) / 2.0;
            if self.fits(text, rect, mid, use_ink)? {
                best = mid;
                lo = mid;
            } else {
                hi = mid;
            }
            iterations += 1;
        }
        Ok(best.clamp(min_size, max_size))
    }

    /// Legacy single-bound form: searches downward from a large starting size.
    pub fn optimal_font_size_from(
        &mut self,
        text: &StyledText,
        rect: Rect,
        min_size: f64,
    ) -> IconResult<f64> {
        self.optimal_font_size(text, rect, min_size, LEGACY_START_SIZE.max(min_size), true)
    }

    fn fits(&mut self, text: &StyledText, rect: Rect, size: f64, use_ink: bool) -> IconResult<bool> {
        if size <= 0.0 {
            return Ok(true);
        }
        let measured = if use_ink {
            self.ink_bounds(text, size)?
        } else {
            self.typographic_bounds(text, size)?
        };
        Ok(measured.width() <= rect.width() + FIT_TOLERANCE
            && measured.height() <= rect.height() + FIT_TOLERANCE)
    }
}

/// Draw a finished parley layout into a render context, one glyph run at a
/// time, using each run's brush color.
pub(crate) fn draw_layout(
    ctx: &mut vello_cpu::RenderContext,
    layout: &parley::Layout<TextBrush>,
    font: &vello_cpu::peniko::FontData,
) {
    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };

            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));

            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
}

fn clamp_to_u16(v: f64) -> IconResult<u16> {
    if !v.is_finite() || v < 1.0 {
        return Err(IconError::font_fit("glyph measurement canvas is degenerate"));
    }
    Ok(v.min(f64::from(u16::MAX)) as u16)
}

/// Bounding rect of pixels with non-zero alpha, or None for a blank buffer.
fn scan_coverage(rgba: &[u8], width: u32, height: u32) -> Option<Rect> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;

    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 4 + 3) as usize;
            if rgba[idx] != 0 {
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    any.then(|| {
        Rect::new(
            f64::from(min_x),
            f64::from(min_y),
            f64::from(max_x + 1),
            f64::from(max_y + 1),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaper() -> TextShaper {
        TextShaper::new()
    }

    #[test]
    fn styled_text_defaults() {
        let t = StyledText::plain("hello");
        assert_eq!(t.foreground(), Rgba8::BLACK);
        assert!(t.background_color.is_none());
        t.validate().unwrap();
    }

    #[test]
    fn styled_text_rejects_unknown_attributes() {
        let err = serde_json::from_str::<StyledText>(
            r#"{"text": "x", "underline": true}"#,
        );
        assert!(err.is_err());

        let ok: StyledText = serde_json::from_str(
            r#"{"text": "x", "foregroundColor": {"r": 1, "g": 2, "b": 3, "a": 255}}"#,
        )
        .unwrap();
        assert_eq!(ok.foreground(), Rgba8::opaque(1, 2, 3));
    }

    #[test]
    fn styled_text_rejects_non_positive_font_size() {
        let t = StyledText {
            font: Some(FontSpec {
                family: "Any".into(),
                size: 0.0,
            }),
            ..StyledText::plain("x")
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn default_shaper_measures_real_glyphs() {
        let mut s = shaper();
        assert!(s.has_fonts());
        let r = s.ink_bounds(&StyledText::plain("X"), 24.0).unwrap();
        assert!(r.width() > 0.0 && r.height() > 0.0, "ink bounds {r:?}");
    }

    #[test]
    fn unknown_family_falls_back_to_the_bundled_face() {
        let mut s = shaper();
        let text = StyledText {
            font: Some(FontSpec {
                family: "No Such Family".into(),
                size: 24.0,
            }),
            ..StyledText::plain("X")
        };
        let r = s.ink_bounds(&text, 24.0).unwrap();
        assert!(r.width() > 0.0 && r.height() > 0.0);
    }

    #[test]
    fn empty_shaper_measures_nothing() {
        let mut s = TextShaper::empty();
        assert!(!s.has_fonts());
        let r = s.ink_bounds(&StyledText::plain("X"), 24.0).unwrap();
        assert_eq!(r, Rect::ZERO);
    }

    #[test]
    fn long_text_in_a_small_rect_shrinks_below_max() {
        let mut s = shaper();
        let text = StyledText::plain("UNINSTALL BEFORE UPGRADING");
        let rect = Rect::new(0.0, 0.0, 60.0, 12.0);
        let size = s.optimal_font_size(&text, rect, 1.0, 96.0, true).unwrap();
        assert!(size < 96.0, "expected a shrunk size, got {size}");
        assert!(size >= 1.0);
    }

    #[test]
    fn empty_text_returns_max_size() {
        let mut s = shaper();
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let size = s
            .optimal_font_size(&StyledText::plain(""), rect, 2.0, 96.0, true)
            .unwrap();
        assert_eq!(size, 96.0);
    }

    #[test]
    fn optimal_size_stays_within_bounds() {
        let mut s = shaper();
        let text = StyledText::plain("UNINSTALL");
        for &(w, h) in &[(8.0, 4.0), (120.0, 40.0), (512.0, 64.0)] {
            let rect = Rect::new(0.0, 0.0, w, h);
            for &(lo, hi) in &[(0.0, 12.0), (4.0, 96.0), (10.0, 10.0)] {
                let size = s.optimal_font_size(&text, rect, lo, hi, true).unwrap();
                assert!(size >= lo && size <= hi, "size {size} not in [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn shrinking_rect_never_increases_optimal_size() {
        let mut s = shaper();
        let text = StyledText::plain("BETA");
        let large = Rect::new(0.0, 0.0, 400.0, 80.0);
        let small = Rect::new(0.0, 0.0, 100.0, 20.0);
        let at_large = s.optimal_font_size(&text, large, 1.0, 128.0, false).unwrap();
        let at_small = s.optimal_font_size(&text, small, 1.0, 128.0, false).unwrap();
        assert!(at_small < at_large, "{at_small} vs {at_large}");
    }

    #[test]
    fn degenerate_rect_is_a_geometry_error() {
        let mut s = shaper();
        let err = s
            .optimal_font_size(
                &StyledText::plain("x"),
                Rect::new(0.0, 0.0, 0.0, 10.0),
                1.0,
                10.0,
                true,
            )
            .unwrap_err();
        assert!(matches!(err, IconError::Geometry(_)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut s = shaper();
        let err = s
            .optimal_font_size(
                &StyledText::plain("x"),
                Rect::new(0.0, 0.0, 10.0, 10.0),
                20.0,
                10.0,
                true,
            )
            .unwrap_err();
        assert!(matches!(err, IconError::Validation(_)));
    }

    #[test]
    fn legacy_form_respects_the_minimum_bound() {
        let mut s = shaper();
        let rect = Rect::new(0.0, 0.0, 50.0, 12.0);
        let size = s
            .optimal_font_size_from(&StyledText::plain("UNINSTALL"), rect, 6.0)
            .unwrap();
        assert!(size >= 6.0);
        assert!(size <= LEGACY_START_SIZE);
    }

    #[test]
    fn ink_bounds_of_empty_text_is_zero() {
        let mut s = shaper();
        let r = s.ink_bounds(&StyledText::plain(""), 24.0).unwrap();
        assert_eq!(r, Rect::ZERO);
    }

    #[test]
    fn scan_coverage_finds_tight_rect() {
        // 4x3 buffer with two painted pixels at (1,1) and (2,1).
        let mut rgba = vec![0u8; 4 * 3 * 4];
        for x in [1u32, 2u32] {
            rgba[((1 * 4 + x) * 4 + 3) as usize] = 255;
        }
        let r = scan_coverage(&rgba, 4, 3).unwrap();
        assert_eq!(r, Rect::new(1.0, 1.0, 3.0, 2.0));
        assert!(scan_coverage(&vec![0u8; 16], 2, 2).is_none());
    }
}
