//! RGBA8 → native scanout pixel encoding

use anyhow::{bail, Result};

use crate::constants::pixel;

/// Memory layout of a scanout buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32bpp little-endian: B, G, R, X
    Xrgb8888,
    /// 16bpp little-endian: RRRRRGGG GGGBBBBB
    Rgb565,
}

impl PixelFormat {
    pub fn from_bits_per_pixel(bpp: u32) -> Result<Self> {
        match bpp {
            32 => Ok(Self::Xrgb8888),
            16 => Ok(Self::Rgb565),
            other => bail!("Unsupported pixel depth: {} bits per pixel", other),
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Xrgb8888 => pixel::XRGB8888_BYTES,
            Self::Rgb565 => pixel::RGB565_BYTES,
        }
    }

    /// Encode one row of RGBA8 pixels into `out`
    ///
    /// Converts `min(rgba.len() / 4, out.len() / bytes_per_pixel)` pixels.
    pub fn encode_row(self, rgba: &[u8], out: &mut [u8]) {
        match self {
            Self::Xrgb8888 => {
                for (src, dst) in rgba.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
                    dst.copy_from_slice(&[src[2], src[1], src[0], 0xFF]);
                }
            }
            Self::Rgb565 => {
                for (src, dst) in rgba.chunks_exact(4).zip(out.chunks_exact_mut(2)) {
                    let value = ((src[0] as u16 >> 3) << 11)
                        | ((src[1] as u16 >> 2) << 5)
                        | (src[2] as u16 >> 3);
                    dst.copy_from_slice(&value.to_le_bytes());
                }
            }
        }
    }
}
