use iconforge::{
    BannerPosition, BannerSpec, CanvasSize, LayeredCompositor, OverlaySpec, RasterImage, Rgba8,
    StyledText,
};

fn base(width: u32, height: u32) -> RasterImage {
    RasterImage::solid(
        CanvasSize::new(width, height).unwrap(),
        Rgba8::opaque(30, 30, 120),
    )
}

#[test]
fn independent_compositors_agree_pixel_for_pixel() {
    let base = base(256, 256);
    let overlay = OverlaySpec::centered(
        RasterImage::solid(CanvasSize::new(64, 64).unwrap(), Rgba8::opaque(220, 40, 40)),
        0.3,
    );
    let banner = BannerSpec::new(
        BannerPosition::BottomRight,
        StyledText::plain("TEST"),
        0.15,
    );
    let output = CanvasSize::new(128, 128).unwrap();

    let a = LayeredCompositor::new()
        .compose(&base, Some(&overlay), Some(&banner), output, false)
        .unwrap();
    let b = LayeredCompositor::new()
        .compose(&base, Some(&overlay), Some(&banner), output, false)
        .unwrap();

    assert_eq!(a.image, b.image);
    assert_eq!(a.banner_truncated, b.banner_truncated);
}

#[test]
fn wide_strip_banner_fits_real_glyphs_without_truncation() {
    // The bundled default font shapes "UNINSTALL" on a wide strip; the fitted
    // size leaves room, so the banner paints glyphs and reports no truncation.
    let base = base(512, 64);
    let banner = BannerSpec::new(BannerPosition::Top, StyledText::plain("UNINSTALL"), 0.2);

    let out = LayeredCompositor::new()
        .compose(
            &base,
            None,
            Some(&banner),
            CanvasSize::new(512, 64).unwrap(),
            false,
        )
        .unwrap();
    assert!(!out.banner_truncated);

    // Black glyphs over the yellow strip leave opaque pixels that neither the
    // fill (red 255) nor the blue base (blue 120) produces.
    let glyph_pixels = out
        .image
        .premul_data()
        .chunks_exact(4)
        .filter(|px| px[3] == 255 && px[0] < 128 && px[2] < 64)
        .count();
    assert!(glyph_pixels > 0, "banner text was not painted");
}

#[test]
fn every_banner_position_composes() {
    let base = base(128, 128);
    let output = CanvasSize::new(128, 128).unwrap();
    let mut compositor = LayeredCompositor::new();

    for position in [
        BannerPosition::TopLeft,
        BannerPosition::TopRight,
        BannerPosition::BottomLeft,
        BannerPosition::BottomRight,
        BannerPosition::Top,
        BannerPosition::Bottom,
    ] {
        let banner = BannerSpec::new(position, StyledText::plain("A"), 0.1);
        let out = compositor
            .compose(&base, None, Some(&banner), output, false)
            .unwrap();
        assert_eq!(out.image.size(), output);
    }
}
