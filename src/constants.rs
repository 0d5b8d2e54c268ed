//! Application-wide constants
//!
//! Environment variable names, defaults and well-known device paths live here
//! so the rest of the code never spells a magic string twice.

/// Environment variable names recognized by the configuration loader
pub mod env {
    pub const DISPLAY_URL: &str = "DISPLAY_URL";
    pub const REFRESH_INTERVAL: &str = "REFRESH_INTERVAL";
    pub const NIGHT_MODE_ENABLED: &str = "NIGHT_MODE_ENABLED";
    pub const NIGHT_START: &str = "NIGHT_START";
    pub const NIGHT_END: &str = "NIGHT_END";
    pub const WINDOW_WIDTH: &str = "WINDOW_WIDTH";
    pub const WINDOW_HEIGHT: &str = "WINDOW_HEIGHT";
    pub const ROTATION: &str = "ROTATION";
    pub const CHROMIUM_PATH: &str = "CHROMIUM_PATH";
    pub const CHROMIUM_TIMEOUT: &str = "CHROMIUM_TIMEOUT";
    pub const SCREENSHOT_PATH: &str = "SCREENSHOT_PATH";
    pub const BACKLIGHT_PATH: &str = "BACKLIGHT_PATH";
    pub const BACKLIGHT_MAX: &str = "BACKLIGHT_MAX";
    pub const FULLSCREEN: &str = "FULLSCREEN";
    pub const VIDEO_DRIVER: &str = "SDL_VIDEODRIVER";
    pub const CHECK_INTERVAL: &str = "CHECK_INTERVAL";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

/// Defaults applied when a variable is unset or unparsable
pub mod defaults {
    pub const URL: &str = "https://google.com";
    pub const REFRESH_INTERVAL_SECS: u64 = 300;
    pub const NIGHT_MODE_ENABLED: bool = true;
    pub const NIGHT_START: &str = "22:00";
    pub const NIGHT_END: &str = "07:00";
    pub const WINDOW_WIDTH: u32 = 800;
    pub const WINDOW_HEIGHT: u32 = 600;
    pub const CHROMIUM_PATH: &str = "chromium-browser";
    pub const CHROMIUM_TIMEOUT_SECS: u64 = 30;
    pub const SCREENSHOT_PATH: &str = "/tmp/screenshot.png";
    pub const BACKLIGHT_MAX: u32 = 255;
    pub const FULLSCREEN: bool = true;
    pub const CHECK_INTERVAL_SECS: u64 = 60;
}

/// Kernel device and sysfs locations
pub mod paths {
    /// Parent of per-device backlight directories (`<dir>/<device>/brightness`)
    pub const BACKLIGHT_CLASS: &str = "/sys/class/backlight";

    /// File name of the writable brightness attribute inside a backlight device
    pub const BRIGHTNESS_FILE: &str = "brightness";

    /// DRM device nodes live here as `card0`, `card1`, ...
    pub const DRI_DIR: &str = "/dev/dri";

    /// Framebuffer console device
    pub const FB_DEVICE: &str = "/dev/fb0";

    /// Framebuffer geometry attributes
    pub const FB_SYSFS: &str = "/sys/class/graphics/fb0";
}

/// Snapshot producer (headless browser) invocation
pub mod chromium {
    /// Flags passed before the screenshot/window-size flags and the URL
    pub const BASE_FLAGS: [&str; 5] = [
        "--headless",
        "--disable-gpu",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-software-rasterizer",
    ];

    /// How often a running snapshot process is polled for exit (milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 100;
}

/// Pixel format constants shared by the output backends
pub mod pixel {
    /// Bytes per pixel for XRGB8888 surfaces
    pub const XRGB8888_BYTES: usize = 4;

    /// Bytes per pixel for RGB565 surfaces
    pub const RGB565_BYTES: usize = 2;

    /// Color depth advertised for XRGB8888 DRM framebuffers
    pub const DRM_DEPTH: u32 = 24;

    /// Bits per pixel for XRGB8888 DRM framebuffers
    pub const DRM_BPP: u32 = 32;
}
