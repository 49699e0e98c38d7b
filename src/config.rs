use crate::{
    anim::{ANIMATION_DURATION_DEFAULT, ANIMATION_DURATION_MAX, ANIMATION_DURATION_MIN},
    banner::{BannerPosition, MAX_TEXT_MARGIN},
    error::{IconError, IconResult},
    export::MAX_OUTPUT_SIZE,
    geom::Vec2,
};

pub const OUTPUT_SIZE_DEFAULT: u32 = 512;
/// The standard size ladder used when exporting every size.
pub const OUTPUT_SIZES: [u32; 5] = [64, 128, 256, 512, 1024];

/// Floor for normalized overlay scaling; `OverlaySpec` rejects zero, so
/// clamping stops short of it.
pub const MIN_OVERLAY_SCALING: f64 = 0.01;

/// Caller-facing configuration values. A plain value type deserialized from
/// JSON; unknown keys are rejected so typos surface instead of silently
/// falling back to defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Preferences {
    pub output_size: u32,
    /// When set, export the full size ladder instead of `output_size` alone.
    pub auto_output_size: bool,
    pub animation_duration: f64,
    pub banner_position: BannerPosition,
    pub banner_text_margin: f64,
    pub overlay_scaling: f64,
    /// Normalized center offset in `[-1, 1]` per axis.
    pub overlay_position: Vec2,
    pub file_prefix: String,
    pub use_prefix: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            output_size: OUTPUT_SIZE_DEFAULT,
            auto_output_size: false,
            animation_duration: ANIMATION_DURATION_DEFAULT,
            banner_position: BannerPosition::TopLeft,
            banner_text_margin: 0.1,
            overlay_scaling: 0.25,
            overlay_position: Vec2::ZERO,
            file_prefix: String::new(),
            use_prefix: false,
        }
    }
}

impl Preferences {
    pub fn from_json_str(json: &str) -> IconResult<Self> {
        let prefs: Self = serde_json::from_str(json)
            .map_err(|e| IconError::validation(format!("invalid preferences: {e}")))?;
        prefs.validate()?;
        Ok(prefs.normalized())
    }

    /// Out-of-range real values are clamped, matching the engine's own
    /// clamping behavior, so stale preference files keep working.
    pub fn normalized(mut self) -> Self {
        self.animation_duration = self
            .animation_duration
            .clamp(ANIMATION_DURATION_MIN, ANIMATION_DURATION_MAX);
        self.banner_text_margin = self.banner_text_margin.clamp(0.0, MAX_TEXT_MARGIN);
        self.overlay_scaling = self.overlay_scaling.clamp(MIN_OVERLAY_SCALING, 1.0);
        self.overlay_position = Vec2::new(
            self.overlay_position.x.clamp(-1.0, 1.0),
            self.overlay_position.y.clamp(-1.0, 1.0),
        );
        self
    }

    pub fn validate(&self) -> IconResult<()> {
        if self.output_size == 0 || self.output_size > MAX_OUTPUT_SIZE {
            return Err(IconError::validation(format!(
                "outputSize must be in 1..={MAX_OUTPUT_SIZE}"
            )));
        }
        if !self.animation_duration.is_finite()
            || !self.banner_text_margin.is_finite()
            || !self.overlay_scaling.is_finite()
        {
            return Err(IconError::validation(
                "preference values must be finite numbers",
            ));
        }
        Ok(())
    }

    /// Sizes to export: the full ladder under `autoOutputSize`, otherwise the
    /// single configured size.
    pub fn export_sizes(&self) -> Vec<u32> {
        if self.auto_output_size {
            OUTPUT_SIZES.to_vec()
        } else {
            vec![self.output_size]
        }
    }

    pub fn effective_prefix(&self) -> &str {
        if self.use_prefix { &self.file_prefix } else { "" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let prefs = Preferences::default();
        assert_eq!(prefs.output_size, 512);
        assert_eq!(prefs.animation_duration, 0.5);
        assert!(!prefs.auto_output_size);
        assert_eq!(prefs.export_sizes(), vec![512]);
    }

    #[test]
    fn json_roundtrip_with_partial_keys() {
        let prefs =
            Preferences::from_json_str(r#"{"outputSize": 256, "autoOutputSize": true}"#).unwrap();
        assert_eq!(prefs.output_size, 256);
        assert_eq!(prefs.export_sizes(), OUTPUT_SIZES.to_vec());
        assert_eq!(prefs.animation_duration, ANIMATION_DURATION_DEFAULT);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Preferences::from_json_str(r#"{"outputSizes": 256}"#).is_err());
    }

    #[test]
    fn out_of_range_reals_are_clamped() {
        let prefs = Preferences::from_json_str(
            r#"{"animationDuration": 5.0, "bannerTextMargin": 0.9, "overlayScaling": 2.0}"#,
        )
        .unwrap();
        assert_eq!(prefs.animation_duration, ANIMATION_DURATION_MAX);
        assert_eq!(prefs.banner_text_margin, MAX_TEXT_MARGIN);
        assert_eq!(prefs.overlay_scaling, 1.0);
    }

    #[test]
    fn non_positive_overlay_scaling_normalizes_to_a_usable_value() {
        for json in [
            r#"{"overlayScaling": 0.0}"#,
            r#"{"overlayScaling": -0.5}"#,
        ] {
            let prefs = Preferences::from_json_str(json).unwrap();
            assert_eq!(prefs.overlay_scaling, MIN_OVERLAY_SCALING);

            let overlay = crate::overlay::OverlaySpec::centered(
                crate::raster::RasterImage::solid(
                    crate::geom::CanvasSize::new(8, 8).unwrap(),
                    crate::geom::Rgba8::opaque(255, 255, 255),
                ),
                prefs.overlay_scaling,
            );
            overlay.validate().unwrap();
        }
    }

    #[test]
    fn invalid_output_size_is_an_error() {
        assert!(Preferences::from_json_str(r#"{"outputSize": 0}"#).is_err());
        assert!(Preferences::from_json_str(r#"{"outputSize": 2048}"#).is_err());
    }

    #[test]
    fn prefix_applies_only_when_enabled() {
        let mut prefs = Preferences::default();
        prefs.file_prefix = "corp_".into();
        assert_eq!(prefs.effective_prefix(), "");
        prefs.use_prefix = true;
        assert_eq!(prefs.effective_prefix(), "corp_");
    }
}
