use anyhow::{Context, Result};
use image::RgbaImage;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use tracing::{debug, info};

use super::pixel::PixelFormat;
use super::{resolve_size, ModeRequest};

/// Linux framebuffer console (`/dev/fbN`)
#[derive(Debug)]
pub struct FbSurface {
    device: File,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

/// Parse `/sys/class/graphics/fbN/modes` entries such as `U:1920x1080p-60`
fn parse_fb_mode(line: &str) -> Option<(u32, u32)> {
    let mode = line.trim();
    let mode = mode.split_once(':').map_or(mode, |(_, rest)| rest);
    let end = mode
        .find(|c: char| !(c.is_ascii_digit() || c == 'x'))
        .unwrap_or(mode.len());
    let (w, h) = mode[..end].split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Parse `virtual_size` (`1920,1080`)
fn parse_fb_virtual_size(input: &str) -> Option<(u32, u32)> {
    let (w, h) = input.trim().split_once(',')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn read_attr(sysfs: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(sysfs.join(name)).ok()
}

impl FbSurface {
    pub fn open(device: &Path, sysfs: &Path, request: &ModeRequest) -> Result<Self> {
        // The visible mode wins over the virtual size, which may include
        // off-screen pages for panning
        let native = read_attr(sysfs, "modes")
            .and_then(|modes| modes.lines().find_map(parse_fb_mode))
            .or_else(|| read_attr(sysfs, "virtual_size").and_then(|v| parse_fb_virtual_size(&v)))
            .context(format!("Failed to read framebuffer geometry from {}", sysfs.display()))?;

        let bpp: u32 = read_attr(sysfs, "bits_per_pixel")
            .context(format!("Failed to read bits_per_pixel from {}", sysfs.display()))?
            .trim()
            .parse()
            .context("Invalid bits_per_pixel value")?;
        let format = PixelFormat::from_bits_per_pixel(bpp)?;

        let stride = match read_attr(sysfs, "stride").and_then(|s| s.trim().parse::<usize>().ok()) {
            Some(stride) => stride,
            None => native.0 as usize * format.bytes_per_pixel(),
        };

        let (width, height) = resolve_size(request, native)?;

        let device_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .context(format!("Failed to open framebuffer device {}", device.display()))?;

        info!(
            device = %device.display(),
            native = ?native,
            width,
            height,
            bpp,
            stride,
            "Opened framebuffer"
        );

        Ok(Self {
            device: device_file,
            width,
            height,
            stride,
            format,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Write the frame row by row starting at the top-left corner
    pub fn present(&mut self, frame: &RgbaImage) -> Result<()> {
        let cols = frame.width().min(self.width) as usize;
        let rows = frame.height().min(self.height);
        if cols == 0 || rows == 0 {
            return Ok(());
        }
        let mut row = vec![0u8; cols * self.format.bytes_per_pixel()];
        let src_stride = frame.width() as usize * 4;

        for (y, src) in frame.as_raw().chunks_exact(src_stride).take(rows as usize).enumerate() {
            self.format.encode_row(&src[..cols * 4], &mut row);
            let offset = (y * self.stride) as u64;
            self.device
                .write_all_at(&row, offset)
                .context(format!("Failed to write framebuffer row {}", y))?;
        }

        debug!(rows, cols, "Framebuffer updated");
        Ok(())
    }
}
