use std::{fs::File, io::BufWriter, path::Path};

use crate::{
    anim::FrameSequence,
    error::{IconError, IconResult},
    raster::RasterImage,
};

/// Frame-delay denominator for APNG fcTL chunks (millisecond resolution).
const DELAY_DENOMINATOR: u16 = 1000;

/// Write a still image as PNG.
pub fn write_png(path: &Path, image: &RasterImage) -> IconResult<()> {
    let bytes = image.encode_png()?;
    std::fs::write(path, bytes).map_err(|source| IconError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Write one animation cycle as an APNG.
///
/// Per-frame display durations become fcTL delays; `loop_count = 0` maps to
/// `num_plays = 0`, the APNG loop-forever marker.
pub fn write_apng(path: &Path, sequence: &FrameSequence) -> IconResult<()> {
    let first = sequence
        .frames
        .first()
        .ok_or_else(|| IconError::encode("animation sequence has no frames"))?;
    let width = first.image.width();
    let height = first.image.height();
    if sequence
        .frames
        .iter()
        .any(|f| f.image.width() != width || f.image.height() != height)
    {
        return Err(IconError::encode("animation frames differ in size"));
    }
    let frame_count: u32 = sequence
        .frames
        .len()
        .try_into()
        .map_err(|_| IconError::encode("too many animation frames"))?;

    let file = File::create(path).map_err(|source| IconError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    let writer = BufWriter::new(file);

    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .set_animated(frame_count, sequence.loop_count)
        .map_err(encode_err)?;

    let mut writer = encoder.write_header().map_err(encode_err)?;
    for frame in &sequence.frames {
        writer
            .set_frame_delay(delay_numerator(frame.display_duration), DELAY_DENOMINATOR)
            .map_err(encode_err)?;
        writer
            .write_image_data(&frame.image.to_straight_rgba8())
            .map_err(encode_err)?;
    }
    writer.finish().map_err(encode_err)?;
    Ok(())
}

fn delay_numerator(display_duration: f64) -> u16 {
    let ms = (display_duration * f64::from(DELAY_DENOMINATOR)).round();
    ms.clamp(0.0, f64::from(u16::MAX)) as u16
}

fn encode_err(e: png::EncodingError) -> IconError {
    IconError::encode(e.to_string())
}
