use image::{imageops, Rgba, RgbaImage};

/// In-memory surface used when no real output is available
///
/// Keeps the last presented frame so the rest of the pipeline behaves the same
/// with or without a screen attached.
#[derive(Debug)]
pub struct HeadlessSurface {
    frame: RgbaImage,
    presents: u64,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
            presents: 0,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    pub fn present(&mut self, frame: &RgbaImage) {
        imageops::replace(&mut self.frame, frame, 0, 0);
        self.presents += 1;
    }

    /// Contents after the most recent present
    #[cfg(test)]
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    #[cfg(test)]
    pub fn presents(&self) -> u64 {
        self.presents
    }
}
