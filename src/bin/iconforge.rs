use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use iconforge::{
    AnimationSpec, BannerPosition, BannerSpec, CanvasSize, ExportOptions, IconSet,
    IconSetExporter, OverlaySpec, Point, Preferences, RasterImage, StyledText,
};

#[derive(Parser, Debug)]
#[command(name = "iconforge", version)]
struct Cli {
    /// Preferences JSON file.
    #[arg(long, global = true)]
    prefs: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite a single icon (base + optional overlay + optional banner) as a PNG.
    Compose(ComposeArgs),
    /// Render the full install/uninstall icon set into a directory.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Base image (any decodable raster format).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Output edge length in pixels; defaults to the configured output size.
    #[arg(long)]
    size: Option<u32>,

    /// Banner text; no banner is drawn when absent.
    #[arg(long)]
    banner_text: Option<String>,

    /// Banner position: top-left, top-right, bottom-left, bottom-right, top, bottom.
    #[arg(long)]
    banner_position: Option<String>,

    /// Overlay image composited on top of the base.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Font file to register for banner text (repeatable).
    #[arg(long = "font")]
    fonts: Vec<PathBuf>,

    /// Permit output sizes larger than the source image.
    #[arg(long)]
    allow_upscale: bool,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Base image used for the install icon.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Separate uninstall base; defaults to the install image.
    #[arg(long)]
    uninstall: Option<PathBuf>,

    /// Target directory (created if missing).
    #[arg(long)]
    out_dir: PathBuf,

    /// Output edge length in pixels (repeatable); defaults to the configured sizes.
    #[arg(long = "size")]
    sizes: Vec<u32>,

    /// Suffix the output directory with a Unix timestamp.
    #[arg(long)]
    timestamp: bool,

    /// Only write the animated uninstall icon.
    #[arg(long)]
    animated_only: bool,

    /// Skip the animated uninstall icon.
    #[arg(long)]
    no_animation: bool,

    /// Peak wobble angle of the uninstall animation, in degrees.
    #[arg(long, default_value_t = 6.0)]
    wobble_degrees: f64,

    /// Permit output sizes larger than the source image.
    #[arg(long)]
    allow_upscale: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let prefs = load_prefs(cli.prefs.as_deref())?;
    match cli.cmd {
        Command::Compose(args) => cmd_compose(args, &prefs),
        Command::Export(args) => cmd_export(args, &prefs),
    }
}

fn load_prefs(path: Option<&Path>) -> anyhow::Result<Preferences> {
    let Some(path) = path else {
        return Ok(Preferences::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("read preferences '{}'", path.display()))?;
    Ok(Preferences::from_json_str(&json)?)
}

fn parse_position(name: &str) -> anyhow::Result<BannerPosition> {
    Ok(match name {
        "top-left" => BannerPosition::TopLeft,
        "top-right" => BannerPosition::TopRight,
        "bottom-left" => BannerPosition::BottomLeft,
        "bottom-right" => BannerPosition::BottomRight,
        "top" => BannerPosition::Top,
        "bottom" => BannerPosition::Bottom,
        other => anyhow::bail!("unknown banner position '{other}'"),
    })
}

fn read_image(path: &Path) -> anyhow::Result<RasterImage> {
    RasterImage::decode_file(path).with_context(|| format!("decode image '{}'", path.display()))
}

fn cmd_compose(args: ComposeArgs, prefs: &Preferences) -> anyhow::Result<()> {
    let base = read_image(&args.in_path)?;

    let overlay = args
        .overlay
        .as_deref()
        .map(read_image)
        .transpose()?
        .map(|image| {
            let mut spec = OverlaySpec::centered(image, prefs.overlay_scaling);
            spec.center_offset = prefs.overlay_position;
            spec
        });

    let banner = args
        .banner_text
        .as_deref()
        .map(|text| -> anyhow::Result<BannerSpec> {
            let position = match args.banner_position.as_deref() {
                Some(name) => parse_position(name)?,
                None => prefs.banner_position,
            };
            Ok(BannerSpec::new(
                position,
                StyledText::plain(text),
                prefs.banner_text_margin,
            ))
        })
        .transpose()?;

    let edge = args.size.unwrap_or(prefs.output_size);
    let output = CanvasSize::square(edge)?;

    let mut compositor = iconforge::LayeredCompositor::new();
    for font in &args.fonts {
        compositor.shaper_mut().register_font_file(font)?;
    }

    let composed = compositor.compose(
        &base,
        overlay.as_ref(),
        banner.as_ref(),
        output,
        args.allow_upscale,
    )?;
    if composed.banner_truncated {
        eprintln!("warning: banner text was truncated to fit");
    }

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    iconforge::encode::write_png(&args.out, &composed.image)?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs, prefs: &Preferences) -> anyhow::Result<()> {
    let sizes = if args.sizes.is_empty() {
        prefs.export_sizes()
    } else {
        args.sizes.clone()
    };

    let mut set = IconSet::new(prefs.effective_prefix(), &sizes)?;
    set.install_icon = Some(read_image(&args.in_path)?);
    set.uninstall_icon = args.uninstall.as_deref().map(read_image).transpose()?;
    if !args.no_animation {
        // Unit-square transform; the exporter scales it per output size.
        set.animation = Some(AnimationSpec::wobble(
            prefs.animation_duration,
            0,
            30,
            args.wobble_degrees,
            Point::new(0.5, 0.5),
        ));
    }

    let opts = ExportOptions {
        create_dir: true,
        append_timestamp: args.timestamp,
        animated_only: args.animated_only,
        allow_upscale: args.allow_upscale,
    };

    let mut exporter = IconSetExporter::new();
    let mut outcome = None;
    exporter.export(&set, &args.out_dir, opts, |report| outcome = Some(report));
    let report = outcome.context("export completion was not delivered")?;

    for path in &report.files_failed {
        eprintln!("failed: {}", path.display());
    }
    if !report.success {
        let err = report
            .first_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown export failure".to_owned());
        anyhow::bail!("export failed: {err}");
    }

    eprintln!(
        "wrote {} file(s) to {}",
        report.files_written.len(),
        report.resolved_path.display()
    );
    Ok(())
}
