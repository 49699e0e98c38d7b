#![forbid(unsafe_code)]

pub mod anim;
pub mod banner;
pub mod compose;
pub mod config;
pub mod encode;
pub mod error;
pub mod export;
pub mod geom;
pub mod overlay;
pub mod raster;
pub mod text;

pub use anim::{AnimationSpec, Frame, FrameSequence};
pub use banner::{BannerCompositor, BannerPosition, BannerSpec};
pub use compose::{ComposedIcon, LayeredCompositor};
pub use config::Preferences;
pub use error::{IconError, IconResult};
pub use export::{ExportOptions, ExportReport, IconSet, IconSetExporter};
pub use geom::{CanvasSize, Point, Rect, Rgba8, Transform2D, Vec2};
pub use overlay::{OverlayPlacer, OverlaySpec};
pub use raster::RasterImage;
pub use text::{StyledText, TextShaper};
