use std::sync::Arc;

use crate::{
    error::{IconError, IconResult},
    geom::{Point, Transform2D},
    raster::RasterImage,
};

/// Animation duration clamp range in seconds.
pub const ANIMATION_DURATION_MIN: f64 = 0.0;
pub const ANIMATION_DURATION_MAX: f64 = 0.9;
pub const ANIMATION_DURATION_DEFAULT: f64 = 0.5;

/// Parametric transform over normalized time `t` in `[0, 1]`.
///
/// Replacing the wall-clock animation timeline with a pure function of
/// normalized time is what makes sampling deterministic and headless; any
/// reimplementation must preserve this.
pub type TransformFn = Arc<dyn Fn(f64) -> Transform2D + Send + Sync>;

#[derive(Clone)]
pub struct AnimationSpec {
    duration: f64,
    /// 0 means loop forever.
    pub repeat_count: u32,
    pub frame_rate: u32,
    transform: TransformFn,
}

impl std::fmt::Debug for AnimationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationSpec")
            .field("duration", &self.duration)
            .field("repeat_count", &self.repeat_count)
            .field("frame_rate", &self.frame_rate)
            .finish_non_exhaustive()
    }
}

impl AnimationSpec {
    /// Durations outside `[0, 0.9]` are clamped, not rejected.
    pub fn new(duration: f64, repeat_count: u32, frame_rate: u32, transform: TransformFn) -> Self {
        let duration = if duration.is_finite() {
            duration.clamp(ANIMATION_DURATION_MIN, ANIMATION_DURATION_MAX)
        } else {
            ANIMATION_DURATION_DEFAULT
        };
        Self {
            duration,
            repeat_count,
            frame_rate,
            transform,
        }
    }

    /// The close-box jiggle: one full back-and-forth rotation about `center`,
    /// peaking at `max_angle_deg`.
    pub fn wobble(
        duration: f64,
        repeat_count: u32,
        frame_rate: u32,
        max_angle_deg: f64,
        center: Point,
    ) -> Self {
        let max_rad = max_angle_deg.to_radians();
        Self::new(
            duration,
            repeat_count,
            frame_rate,
            Arc::new(move |t| {
                let angle = max_rad * (t * std::f64::consts::TAU).sin();
                Transform2D::rotation_about(angle, center)
            }),
        )
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn transform_at(&self, t: f64) -> Transform2D {
        (self.transform)(t.clamp(0.0, 1.0))
    }

    pub fn validate(&self) -> IconResult<()> {
        if self.frame_rate == 0 {
            return Err(IconError::validation("frame_rate must be > 0"));
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        ((self.duration * f64::from(self.frame_rate)).round() as usize).max(1)
    }
}

/// One sampled frame with its display duration in seconds.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RasterImage,
    pub display_duration: f64,
}

/// Finite, ordered frame sequence for one animation cycle.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    pub frames: Vec<Frame>,
    /// Carried to the container encoder; 0 is the loop-forever marker.
    pub loop_count: u32,
}

impl FrameSequence {
    pub fn total_duration(&self) -> f64 {
        self.frames.iter().map(|f| f.display_duration).sum()
    }
}

/// Sample one animation cycle into discrete frames.
///
/// `scene_builder` maps a transform to a fully composited frame; the sampler
/// knows nothing about what is being animated. Sampling is deterministic:
/// the same spec and builder reproduce the identical sequence.
pub fn sample<F>(spec: &AnimationSpec, mut scene_builder: F) -> IconResult<FrameSequence>
where
    F: FnMut(&Transform2D) -> IconResult<RasterImage>,
{
    spec.validate()?;

    let count = spec.frame_count();
    let display_duration = spec.duration() / count as f64;

    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        // t covers [0, 1) so the last frame does not duplicate the loop start.
        let t = i as f64 / count as f64;
        let transform = spec.transform_at(t);
        frames.push(Frame {
            image: scene_builder(&transform)?,
            display_duration,
        });
    }

    Ok(FrameSequence {
        frames,
        loop_count: spec.repeat_count,
    })
}
