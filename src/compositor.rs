//! Frame composition: load, rotate, stretch to the output, present

use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Rotation;
use crate::display::Surface;

pub fn load_frame(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).context(format!("Failed to load image {}", path.display()))?;
    Ok(image.to_rgba8())
}

/// Rotate counter-clockwise by `rotation`, then stretch to exactly `size`
///
/// Scaling is non-uniform so the frame always covers the whole panel.
pub fn compose(image: RgbaImage, rotation: Rotation, size: (u32, u32)) -> RgbaImage {
    let rotated = match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate270(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate90(&image),
    };

    if rotated.dimensions() == size {
        rotated
    } else {
        imageops::resize(&rotated, size.0, size.1, FilterType::Triangle)
    }
}

/// Show the image at `path` on `surface`
pub fn render(surface: &mut Surface, path: &Path, rotation: Rotation) -> Result<()> {
    let size = surface.size();
    if size.0 == 0 || size.1 == 0 {
        bail!("Output surface has no area ({}x{})", size.0, size.1);
    }

    let image = load_frame(path)?;
    let source = image.dimensions();
    if rotation != Rotation::Deg0 {
        debug!(rotation = %rotation, "Rotating image");
    }

    let frame = compose(image, rotation, size);
    surface.present(&frame).context("Failed to present frame")?;

    info!(source = ?source, output = ?size, "Image displayed successfully");
    Ok(())
}
