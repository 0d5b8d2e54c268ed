use anyhow::{anyhow, Context, Result};
use drm::buffer::{Buffer, DrmFourcc};
use drm::control::dumbbuffer::DumbBuffer;
use drm::control::{connector, crtc, framebuffer, Device as ControlDevice, Mode, ModeTypeFlags};
use image::RgbaImage;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::pixel::PixelFormat;
use super::{resolve_size, ModeRequest};
use crate::constants::pixel;

/// Opened `/dev/dri/cardN` node
#[derive(Debug)]
struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

/// Single-buffered scanout on the first connected KMS output
///
/// The dumb buffer is scanned out directly, so writing into it is the flip.
pub struct KmsSurface {
    card: Card,
    buffer: Option<DumbBuffer>,
    framebuffer: framebuffer::Handle,
    width: u32,
    height: u32,
    pitch: usize,
}

impl std::fmt::Debug for KmsSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsSurface")
            .field("card", &self.card)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pitch", &self.pitch)
            .finish_non_exhaustive()
    }
}

/// `card0`, `card1`, ... in name order; render nodes are skipped
fn list_cards(dri_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut cards: Vec<PathBuf> = std::fs::read_dir(dri_dir)
        .context(format!("Failed to read {}", dri_dir.display()))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("card"))
        })
        .collect();
    cards.sort();
    Ok(cards)
}

/// The entry flagged preferred, else the first
fn preferred_or_first<T: Copy>(items: &[T], is_preferred: impl Fn(&T) -> bool) -> Option<T> {
    items
        .iter()
        .find(|item| is_preferred(item))
        .or_else(|| items.first())
        .copied()
}

/// CRTC for a connector: the one already driving it, else the first CRTC any
/// of its encoders can drive (`compatible` holds one list per encoder)
fn choose_crtc<H: Copy>(current: Option<H>, compatible: &[Vec<H>]) -> Option<H> {
    current.or_else(|| compatible.iter().find_map(|crtcs| crtcs.first().copied()))
}

impl KmsSurface {
    /// Open the first card that has a connected output
    pub fn open(dri_dir: &Path, request: &ModeRequest) -> Result<Self> {
        let cards = list_cards(dri_dir)?;
        let mut last_error = anyhow!("No DRM cards found in {}", dri_dir.display());

        for path in cards {
            match Self::open_card(&path, request) {
                Ok(surface) => return Ok(surface),
                Err(e) => {
                    debug!(card = %path.display(), error = %format!("{e:#}"), "DRM card unusable");
                    last_error = e.context(format!("{}", path.display()));
                }
            }
        }

        Err(last_error)
    }

    fn open_card(path: &Path, request: &ModeRequest) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .context("Failed to open DRM device")?;
        let card = Card(file);

        let resources = card
            .resource_handles()
            .context("Failed to query DRM resources")?;

        let output = resources
            .connectors()
            .iter()
            .filter_map(|handle| card.get_connector(*handle, true).ok())
            .find(|info| info.state() == connector::State::Connected && !info.modes().is_empty())
            .context("No connected output")?;
        let mode: Mode = preferred_or_first(output.modes(), |mode| {
            mode.mode_type().contains(ModeTypeFlags::PREFERRED)
        })
        .context("Connected output reports no modes")?;

        let current = output
            .current_encoder()
            .and_then(|encoder| card.get_encoder(encoder).ok())
            .and_then(|encoder| encoder.crtc());
        let compatible: Vec<Vec<crtc::Handle>> = output
            .encoders()
            .iter()
            .filter_map(|handle| card.get_encoder(*handle).ok())
            .map(|encoder| resources.filter_crtcs(encoder.possible_crtcs()))
            .collect();
        let crtc = choose_crtc(current, &compatible).context("No CRTC can drive the connected output")?;

        let (mode_w, mode_h) = mode.size();
        let native = (u32::from(mode_w), u32::from(mode_h));
        let (width, height) = resolve_size(request, native)?;

        let buffer = card
            .create_dumb_buffer(native, DrmFourcc::Xrgb8888, pixel::DRM_BPP)
            .context("Failed to allocate dumb buffer")?;
        let framebuffer = match card.add_framebuffer(&buffer, pixel::DRM_DEPTH, pixel::DRM_BPP) {
            Ok(fb) => fb,
            Err(e) => {
                let _ = card.destroy_dumb_buffer(buffer);
                return Err(e).context("Failed to add framebuffer");
            }
        };
        let pitch = buffer.pitch() as usize;

        let mut surface = Self {
            card,
            buffer: Some(buffer),
            framebuffer,
            width,
            height,
            pitch,
        };
        surface.clear()?;

        // Fails without DRM master (e.g. a compositor owns the card); Drop cleans up
        surface
            .card
            .set_crtc(crtc, Some(framebuffer), (0, 0), &[output.handle()], Some(mode))
            .context("Failed to set CRTC")?;

        info!(card = %path.display(), mode = ?native, width, height, "KMS output configured");
        Ok(surface)
    }

    fn clear(&mut self) -> Result<()> {
        let buffer = self.buffer.as_mut().context("DRM buffer already released")?;
        let mut mapping = self
            .card
            .map_dumb_buffer(buffer)
            .context("Failed to map dumb buffer")?;
        mapping.as_mut().fill(0);
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn present(&mut self, frame: &RgbaImage) -> Result<()> {
        let cols = frame.width().min(self.width) as usize;
        let rows = frame.height().min(self.height) as usize;
        if cols == 0 || rows == 0 {
            return Ok(());
        }

        let buffer = self.buffer.as_mut().context("DRM buffer already released")?;
        let mut mapping = self
            .card
            .map_dumb_buffer(buffer)
            .context("Failed to map dumb buffer")?;
        let pixels: &mut [u8] = mapping.as_mut();

        let src_stride = frame.width() as usize * 4;
        let row_bytes = cols * PixelFormat::Xrgb8888.bytes_per_pixel();
        for (y, src) in frame.as_raw().chunks_exact(src_stride).take(rows).enumerate() {
            let start = y * self.pitch;
            let dst = pixels
                .get_mut(start..start + row_bytes)
                .context(format!("Row {} is outside the mapped buffer", y))?;
            PixelFormat::Xrgb8888.encode_row(&src[..cols * 4], dst);
        }

        Ok(())
    }
}

impl Drop for KmsSurface {
    fn drop(&mut self) {
        if let Err(e) = self.card.destroy_framebuffer(self.framebuffer) {
            warn!(error = %e, "Failed to destroy DRM framebuffer");
        }
        if let Some(buffer) = self.buffer.take() {
            if let Err(e) = self.card.destroy_dumb_buffer(buffer) {
                warn!(error = %e, "Failed to destroy dumb buffer");
            }
        }
    }
}
