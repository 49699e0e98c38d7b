use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, warn};

use crate::{
    anim::{self, AnimationSpec},
    compose::{self, LayeredCompositor},
    encode,
    error::{IconError, IconResult},
    geom::{CanvasSize, Transform2D},
    raster::RasterImage,
};

/// Hard per-edge cap on output sizes.
pub const MAX_OUTPUT_SIZE: u32 = 1024;

/// One exportable icon family: the still install/uninstall sources plus an
/// optional uninstall animation, rendered at each requested size.
///
/// Assembled by the caller and consumed by [`IconSetExporter::export`]; the
/// engine retains nothing afterwards.
#[derive(Clone, Debug)]
pub struct IconSet {
    pub install_icon: Option<RasterImage>,
    pub uninstall_icon: Option<RasterImage>,
    /// Transforms are authored on the unit square (canvas edge = 1.0) and
    /// scaled to each output size at sampling time.
    pub animation: Option<AnimationSpec>,
    pub file_prefix: String,
    requested_sizes: Vec<u32>,
}

impl IconSet {
    /// Sizes are deduplicated and sorted ascending; zero, oversized or empty
    /// requests are rejected.
    pub fn new(file_prefix: impl Into<String>, sizes: &[u32]) -> IconResult<Self> {
        let mut requested_sizes: Vec<u32> = sizes.to_vec();
        if requested_sizes.iter().any(|&s| s == 0) {
            return Err(IconError::validation("output sizes must be > 0"));
        }
        if let Some(&over) = requested_sizes.iter().find(|&&s| s > MAX_OUTPUT_SIZE) {
            return Err(IconError::validation(format!(
                "output size {over} exceeds the {MAX_OUTPUT_SIZE} px cap"
            )));
        }
        requested_sizes.sort_unstable();
        requested_sizes.dedup();
        if requested_sizes.is_empty() {
            return Err(IconError::validation("at least one output size is required"));
        }
        Ok(Self {
            install_icon: None,
            uninstall_icon: None,
            animation: None,
            file_prefix: file_prefix.into(),
            requested_sizes,
        })
    }

    pub fn requested_sizes(&self) -> &[u32] {
        &self.requested_sizes
    }

    /// The image the uninstall outputs are derived from.
    fn uninstall_source(&self) -> Option<&RasterImage> {
        self.uninstall_icon.as_ref().or(self.install_icon.as_ref())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExportOptions {
    /// Create the resolved output directory if it does not exist.
    pub create_dir: bool,
    /// Suffix the output directory name with the current Unix timestamp.
    pub append_timestamp: bool,
    /// Skip the still install/uninstall files.
    pub animated_only: bool,
    /// Permit sizes larger than the source image.
    pub allow_upscale: bool,
}

/// Outcome of one `export` call, delivered exactly once via the completion
/// callback.
#[derive(Debug)]
pub struct ExportReport {
    pub success: bool,
    pub resolved_path: PathBuf,
    /// First error encountered; later failures are visible in `files_failed`.
    pub first_error: Option<IconError>,
    pub files_written: Vec<PathBuf>,
    pub files_failed: Vec<PathBuf>,
}

/// Create `{name}` (or `{name}_{unix_seconds}`) under `parent` and return the
/// new directory's path.
pub fn create_folder(parent: &Path, name: &str, append_timestamp: bool) -> IconResult<PathBuf> {
    let folder = if append_timestamp {
        format!("{name}_{}", unix_seconds())
    } else {
        name.to_owned()
    };
    let path = parent.join(folder);
    fs::create_dir_all(&path).map_err(|source| IconError::DirectoryCreation {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Renders an [`IconSet`] at every requested size and writes the results.
///
/// All I/O is blocking and runs on the calling thread; there is no
/// cancellation. Individual file failures are collected and do not stop the
/// remaining writes, while a directory-creation failure aborts the whole
/// export. The completion callback fires exactly once per call.
pub struct IconSetExporter {
    compositor: LayeredCompositor,
}

impl Default for IconSetExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IconSetExporter {
    pub fn new() -> Self {
        Self {
            compositor: LayeredCompositor::new(),
        }
    }

    pub fn with_compositor(compositor: LayeredCompositor) -> Self {
        Self { compositor }
    }

    pub fn compositor_mut(&mut self) -> &mut LayeredCompositor {
        &mut self.compositor
    }

    pub fn export<F>(
        &mut self,
        set: &IconSet,
        target_dir: &Path,
        opts: ExportOptions,
        on_complete: F,
    ) where
        F: FnOnce(ExportReport),
    {
        let report = self.run(set, target_dir, opts);
        if report.success {
            debug!(
                path = %report.resolved_path.display(),
                files = report.files_written.len(),
                "icon set export finished"
            );
        } else {
            warn!(
                path = %report.resolved_path.display(),
                error = ?report.first_error,
                "icon set export failed"
            );
        }
        on_complete(report);
    }

    fn run(&mut self, set: &IconSet, target_dir: &Path, opts: ExportOptions) -> ExportReport {
        let mut report = ExportReport {
            success: false,
            resolved_path: target_dir.to_path_buf(),
            first_error: None,
            files_written: Vec::new(),
            files_failed: Vec::new(),
        };

        let resolved = match resolve_output_dir(target_dir, opts) {
            Ok(path) => path,
            Err(err) => {
                report.first_error = Some(err);
                return report;
            }
        };
        report.resolved_path = resolved.clone();

        let nested = set.requested_sizes.len() > 1;
        for &size in &set.requested_sizes {
            let size_dir = if nested {
                resolved.join(format!("{size}x{size}"))
            } else {
                resolved.clone()
            };
            if nested {
                if let Err(source) = fs::create_dir_all(&size_dir) {
                    // Directory creation is fatal to the whole export.
                    report.first_error = Some(IconError::DirectoryCreation {
                        path: size_dir,
                        source,
                    });
                    return report;
                }
            }
            self.export_one_size(set, size, &size_dir, opts, &mut report);
        }

        report.success = report.first_error.is_none();
        report
    }

    fn export_one_size(
        &mut self,
        set: &IconSet,
        size: u32,
        dir: &Path,
        opts: ExportOptions,
        report: &mut ExportReport,
    ) {
        let prefix = &set.file_prefix;

        if !opts.animated_only {
            if let Some(install) = &set.install_icon {
                let path = dir.join(format!("{prefix}install.png"));
                let result = self
                    .render_still(install, size, opts.allow_upscale)
                    .and_then(|img| encode::write_png(&path, &img));
                record(report, path, result);
            }
            if let Some(uninstall) = set.uninstall_source() {
                let path = dir.join(format!("{prefix}uninstall.png"));
                let result = self
                    .render_still(uninstall, size, opts.allow_upscale)
                    .and_then(|img| encode::write_png(&path, &img));
                record(report, path, result);
            }
        }

        if let (Some(anim), Some(subject)) = (&set.animation, set.uninstall_source()) {
            let path = dir.join(format!("{prefix}uninstall_animated.png"));
            let result = self
                .render_animation(anim, subject, size, opts.allow_upscale)
                .and_then(|seq| encode::write_apng(&path, &seq));
            record(report, path, result);
        }
    }

    fn render_still(
        &mut self,
        base: &RasterImage,
        size: u32,
        allow_upscale: bool,
    ) -> IconResult<RasterImage> {
        if !allow_upscale && !base.can_be_scaled_to(size) {
            return Err(IconError::Upscale {
                source_width: base.width(),
                source_height: base.height(),
                target_width: size,
                target_height: size,
            });
        }
        let canvas = CanvasSize::square(size)?;
        Ok(self
            .compositor
            .compose(base, None, None, canvas, true)?
            .image)
    }

    fn render_animation(
        &mut self,
        spec: &AnimationSpec,
        subject: &RasterImage,
        size: u32,
        allow_upscale: bool,
    ) -> IconResult<anim::FrameSequence> {
        let canvas = CanvasSize::square(size)?;
        let still = self.render_still(subject, size, allow_upscale)?;
        let edge = f64::from(size);
        anim::sample(spec, |transform| {
            compose::transformed(&still, &scale_transform(transform, edge), canvas)
        })
    }
}

/// Map a unit-square transform onto a canvas with edge length `s`. Rotation
/// and scale are scale-invariant; only the pixel-space quantities move.
fn scale_transform(transform: &Transform2D, s: f64) -> Transform2D {
    Transform2D {
        translate: transform.translate * s,
        anchor: transform.anchor * s,
        ..*transform
    }
}

fn record(report: &mut ExportReport, path: PathBuf, result: IconResult<()>) {
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "wrote icon file");
            report.files_written.push(path);
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "icon file failed");
            if report.first_error.is_none() {
                report.first_error = Some(err);
            }
            report.files_failed.push(path);
        }
    }
}

fn resolve_output_dir(target: &Path, opts: ExportOptions) -> IconResult<PathBuf> {
    let resolved = if opts.append_timestamp {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "icons".to_owned());
        target.with_file_name(format!("{name}_{}", unix_seconds()))
    } else {
        target.to_path_buf()
    };
    if opts.create_dir {
        fs::create_dir_all(&resolved).map_err(|source| IconError::DirectoryCreation {
            path: resolved.clone(),
            source,
        })?;
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Rgba8;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("iconforge_export_{}_{}", name, std::process::id()))
    }

    #[test]
    fn icon_set_normalizes_sizes() {
        let set = IconSet::new("", &[512, 64, 512, 256]).unwrap();
        assert_eq!(set.requested_sizes(), &[64, 256, 512]);

        assert!(IconSet::new("", &[]).is_err());
        assert!(IconSet::new("", &[0]).is_err());
        assert!(IconSet::new("", &[2048]).is_err());
        assert!(IconSet::new("", &[MAX_OUTPUT_SIZE]).is_ok());
    }

    #[test]
    fn create_folder_appends_a_timestamp_suffix() {
        let parent = temp_dir("folder");
        std::fs::create_dir_all(&parent).unwrap();

        let plain = create_folder(&parent, "out", false).unwrap();
        assert_eq!(plain, parent.join("out"));
        assert!(plain.is_dir());

        let stamped = create_folder(&parent, "out", true).unwrap();
        let name = stamped.file_name().unwrap().to_string_lossy().into_owned();
        let suffix = name.strip_prefix("out_").expect("timestamp suffix");
        assert!(suffix.parse::<u64>().is_ok());

        std::fs::remove_dir_all(&parent).ok();
    }

    #[test]
    fn upscale_pre_check_rejects_small_sources() {
        let mut exporter = IconSetExporter::new();
        let small = RasterImage::solid(CanvasSize::new(32, 32).unwrap(), Rgba8::BLACK);
        let err = exporter.render_still(&small, 64, false).unwrap_err();
        assert!(matches!(
            err,
            IconError::Upscale {
                target_width: 64,
                target_height: 64,
                ..
            }
        ));
        assert!(exporter.render_still(&small, 64, true).is_ok());
    }

    #[test]
    fn unit_transform_scales_to_pixel_space() {
        let unit = Transform2D {
            translate: crate::geom::Vec2::new(0.1, 0.0),
            anchor: crate::geom::Vec2::new(0.5, 0.5),
            rotation_rad: 1.0,
            ..Transform2D::default()
        };
        let scaled = scale_transform(&unit, 100.0);
        assert_eq!(scaled.translate, crate::geom::Vec2::new(10.0, 0.0));
        assert_eq!(scaled.anchor, crate::geom::Vec2::new(50.0, 50.0));
        assert_eq!(scaled.rotation_rad, 1.0);
    }

    #[test]
    fn empty_icon_set_exports_nothing_but_succeeds() {
        let dir = temp_dir("empty");
        let set = IconSet::new("", &[64]).unwrap();
        let mut exporter = IconSetExporter::new();
        let mut calls = 0;
        exporter.export(
            &set,
            &dir,
            ExportOptions {
                create_dir: true,
                ..ExportOptions::default()
            },
            |report| {
                calls += 1;
                assert!(report.success);
                assert!(report.files_written.is_empty());
                assert!(report.files_failed.is_empty());
            },
        );
        assert_eq!(calls, 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
