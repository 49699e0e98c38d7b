use iconforge::{
    AnimationSpec, CanvasSize, ExportOptions, IconSet, IconSetExporter, Point, RasterImage, Rgba8,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let base = RasterImage::solid(
        CanvasSize::square(512)?,
        Rgba8::opaque(52, 120, 246),
    );

    let mut set = IconSet::new("demo_", &[64, 128, 256, 512])?;
    set.install_icon = Some(base.clone());
    set.uninstall_icon = Some(base);
    set.animation = Some(AnimationSpec::wobble(0.5, 0, 30, 6.0, Point::new(0.5, 0.5)));

    let mut exporter = IconSetExporter::new();
    exporter.export(
        &set,
        std::path::Path::new("target/demo_icons"),
        ExportOptions {
            create_dir: true,
            ..ExportOptions::default()
        },
        |report| {
            println!(
                "success={} files={} dir={}",
                report.success,
                report.files_written.len(),
                report.resolved_path.display()
            );
        },
    );

    Ok(())
}
