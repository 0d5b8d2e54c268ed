use anyhow::{bail, Context, Result};
use image::RgbaImage;
use tracing::{debug, info};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use super::pixel::PixelFormat;
use super::{resolve_size, ModeRequest};

/// Fixed size of a PutImage request header in bytes
const PUT_IMAGE_HEADER: usize = 24;

/// Override-redirect window on an X11 server
///
/// Only used when explicitly preferred; kiosks normally run without X.
pub struct X11Surface {
    conn: RustConnection,
    window: Window,
    gc: Gcontext,
    depth: u8,
    width: u16,
    height: u16,
}

impl std::fmt::Debug for X11Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X11Surface")
            .field("window", &self.window)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Rows per PutImage request so each request stays under the server limit
fn rows_per_request(max_request_bytes: usize, width: u16) -> u16 {
    let row_bytes = usize::from(width) * PixelFormat::Xrgb8888.bytes_per_pixel();
    let rows = max_request_bytes.saturating_sub(PUT_IMAGE_HEADER) / row_bytes.max(1);
    rows.clamp(1, usize::from(u16::MAX)) as u16
}

impl X11Surface {
    pub fn open(request: &ModeRequest) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;

        let setup = conn.setup();
        let screen = setup
            .roots
            .get(screen_num)
            .context(format!("X11 screen {} does not exist", screen_num))?;
        let (root, depth, visual, black) = (
            screen.root,
            screen.root_depth,
            screen.root_visual,
            screen.black_pixel,
        );
        let native = (
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        );

        // Frames are uploaded as 32bpp little-endian BGRX
        let bits_per_pixel = setup
            .pixmap_formats
            .iter()
            .find(|format| format.depth == depth)
            .map(|format| format.bits_per_pixel);
        if bits_per_pixel != Some(32) || setup.image_byte_order != ImageOrder::LSB_FIRST {
            bail!(
                "Unsupported X11 pixel layout (depth={}, bpp={:?}, byte order={:?})",
                depth,
                bits_per_pixel,
                setup.image_byte_order
            );
        }

        let (width, height) = resolve_size(request, native)?;
        let width = u16::try_from(width).context("Window width exceeds X11 limits")?;
        let height = u16::try_from(height).context("Window height exceeds X11 limits")?;

        let window = conn.generate_id().context("Failed to generate X11 window ID")?;
        conn.create_window(
            depth,
            window,
            root,
            0,
            0,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &CreateWindowAux::new()
                .override_redirect(1)
                .background_pixel(black),
        )
        .context("Failed to create output window")?;

        let gc = conn.generate_id().context("Failed to generate X11 graphics context ID")?;
        conn.create_gc(gc, window, &CreateGCAux::new())
            .context("Failed to create graphics context")?;
        conn.map_window(window).context("Failed to map output window")?;
        conn.flush().context("Failed to flush X11 connection")?;

        info!(window, width, height, screen = screen_num, "X11 output window mapped");

        Ok(Self {
            conn,
            window,
            gc,
            depth,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (u32::from(self.width), u32::from(self.height))
    }

    pub fn present(&mut self, frame: &RgbaImage) -> Result<()> {
        let cols = frame.width().min(u32::from(self.width)) as u16;
        let rows = frame.height().min(u32::from(self.height)) as u16;
        if cols == 0 || rows == 0 {
            return Ok(());
        }

        let strip = rows_per_request(self.conn.maximum_request_bytes(), cols);
        let src_stride = frame.width() as usize * 4;
        let row_bytes = usize::from(cols) * PixelFormat::Xrgb8888.bytes_per_pixel();
        let src = frame.as_raw();

        let mut y = 0u16;
        let mut last = None;
        while y < rows {
            let strip_rows = strip.min(rows - y);
            let mut data = vec![0u8; row_bytes * usize::from(strip_rows)];
            for (i, dst) in data.chunks_exact_mut(row_bytes).enumerate() {
                let start = (usize::from(y) + i) * src_stride;
                PixelFormat::Xrgb8888.encode_row(&src[start..start + usize::from(cols) * 4], dst);
            }

            let cookie = self
                .conn
                .put_image(
                    ImageFormat::Z_PIXMAP,
                    self.window,
                    self.gc,
                    cols,
                    strip_rows,
                    0,
                    y as i16,
                    0,
                    self.depth,
                    &data,
                )
                .context("Failed to send PutImage")?;
            last = Some(cookie);
            y += strip_rows;
        }

        // Round-trip on the final request so protocol errors surface here
        if let Some(cookie) = last {
            cookie.check().context("X11 server rejected frame upload")?;
        }
        debug!(cols, rows, strip, "X11 frame uploaded");
        Ok(())
    }
}

impl Drop for X11Surface {
    fn drop(&mut self) {
        let _ = self.conn.free_gc(self.gc);
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_request_fits_limit() {
        // 262144 byte limit (no BIG-REQUESTS), 800px rows of 3200 bytes
        assert_eq!(rows_per_request(262_144, 800), 81);
    }

    #[test]
    fn test_rows_per_request_never_zero() {
        assert_eq!(rows_per_request(100, 4000), 1);
        assert_eq!(rows_per_request(0, 0), 1);
    }

    #[test]
    fn test_rows_per_request_capped() {
        assert_eq!(rows_per_request(usize::MAX, 1), u16::MAX);
    }
}
