//! Output backends and ordered-fallback selection
//!
//! The set of backends is closed: every candidate is a [`Backend`] variant and
//! every opened surface is a [`Surface`] variant. Selection walks the candidate
//! list once at startup; the winner is kept for the lifetime of the process.

mod fbdev;
mod headless;
mod kmsdrm;
pub mod pixel;
mod x11;

use anyhow::{anyhow, bail, Result};
use image::{Rgba, RgbaImage};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::Config;
use crate::constants::paths;

pub use fbdev::FbSurface;
pub use headless::HeadlessSurface;
pub use kmsdrm::KmsSurface;
pub use x11::X11Surface;

/// Identifier of an output driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Kernel mode setting on `/dev/dri/cardN`
    KmsDrm,
    /// Legacy framebuffer console on `/dev/fb0`
    Fbcon,
    /// DirectFB; recognized but not linked into this build
    DirectFb,
    /// X11 window; only used when explicitly preferred
    X11,
    /// In-memory surface, always succeeds
    Dummy,
}

/// Built-in fallback order tried after the preferred backend
pub const FALLBACK_ORDER: [Backend; 4] = [
    Backend::KmsDrm,
    Backend::Fbcon,
    Backend::DirectFb,
    Backend::Dummy,
];

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Self::KmsDrm => "kmsdrm",
            Self::Fbcon => "fbcon",
            Self::DirectFb => "directfb",
            Self::X11 => "x11",
            Self::Dummy => "dummy",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmsdrm" | "kms" | "drm" => Ok(Self::KmsDrm),
            "fbcon" | "fbdev" | "fb" => Ok(Self::Fbcon),
            "directfb" => Ok(Self::DirectFb),
            "x11" => Ok(Self::X11),
            "dummy" | "headless" | "offscreen" => Ok(Self::Dummy),
            other => Err(anyhow!("Unknown display backend '{}'", other)),
        }
    }
}

/// Ordered candidates: the preferred backend (if recognized) followed by the
/// fallback order, each backend at most once
pub fn candidate_backends(preferred: Option<&str>) -> Vec<Backend> {
    let mut candidates = Vec::with_capacity(FALLBACK_ORDER.len() + 1);

    if let Some(name) = preferred {
        match name.parse::<Backend>() {
            Ok(backend) => candidates.push(backend),
            Err(e) => warn!(error = %e, "Ignoring preferred display backend"),
        }
    }

    for backend in FALLBACK_ORDER {
        if !candidates.contains(&backend) {
            candidates.push(backend);
        }
    }

    candidates
}

/// Requested output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    /// Use the backend's native resolution instead of `width`×`height`
    pub fullscreen: bool,
    pub width: u32,
    pub height: u32,
}

impl From<&Config> for ModeRequest {
    fn from(config: &Config) -> Self {
        Self {
            fullscreen: config.fullscreen,
            width: config.window_width,
            height: config.window_height,
        }
    }
}

/// Surface size for a request on an output whose native size is `native`
///
/// Windowed surfaces are anchored at the top-left and must fit on the output.
pub(crate) fn resolve_size(request: &ModeRequest, native: (u32, u32)) -> Result<(u32, u32)> {
    if request.fullscreen {
        return Ok(native);
    }
    if request.width == 0 || request.height == 0 {
        bail!("Invalid window size {}x{}", request.width, request.height);
    }
    if request.width > native.0 || request.height > native.1 {
        bail!(
            "Window {}x{} does not fit on {}x{} output",
            request.width,
            request.height,
            native.0,
            native.1
        );
    }
    Ok((request.width, request.height))
}

/// An initialized output surface
#[derive(Debug)]
pub enum Surface {
    KmsDrm(KmsSurface),
    Fbcon(FbSurface),
    X11(X11Surface),
    Headless(HeadlessSurface),
}

impl Surface {
    pub fn open(backend: Backend, request: &ModeRequest) -> Result<Self> {
        match backend {
            Backend::KmsDrm => Ok(Self::KmsDrm(KmsSurface::open(Path::new(paths::DRI_DIR), request)?)),
            Backend::Fbcon => Ok(Self::Fbcon(FbSurface::open(
                Path::new(paths::FB_DEVICE),
                Path::new(paths::FB_SYSFS),
                request,
            )?)),
            Backend::DirectFb => bail!("DirectFB support is not available in this build"),
            Backend::X11 => Ok(Self::X11(X11Surface::open(request)?)),
            Backend::Dummy => Ok(Self::Headless(HeadlessSurface::new(request.width, request.height))),
        }
    }

    /// Current pixel dimensions
    pub fn size(&self) -> (u32, u32) {
        match self {
            Self::KmsDrm(s) => s.size(),
            Self::Fbcon(s) => s.size(),
            Self::X11(s) => s.size(),
            Self::Headless(s) => s.size(),
        }
    }

    /// Draw `frame` at the origin and make it visible
    pub fn present(&mut self, frame: &RgbaImage) -> Result<()> {
        match self {
            Self::KmsDrm(s) => s.present(frame),
            Self::Fbcon(s) => s.present(frame),
            Self::X11(s) => s.present(frame),
            Self::Headless(s) => {
                s.present(frame);
                Ok(())
            }
        }
    }

    /// Fill with solid black and make it visible
    pub fn blank(&mut self) -> Result<()> {
        let (width, height) = self.size();
        self.present(&RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])))
    }
}

/// Try each candidate in order with `init`, returning the first success
///
/// Failed candidates are logged and dropped (tearing down any partial state)
/// before the next is tried. If all fail, the error carries the last failure.
pub fn select_backend<S, F>(candidates: &[Backend], mut init: F) -> Result<(Backend, S)>
where
    F: FnMut(Backend) -> Result<S>,
{
    let mut last_error: Option<(Backend, anyhow::Error)> = None;

    for &backend in candidates {
        info!(backend = %backend, "Attempting to initialize display");
        match init(backend) {
            Ok(surface) => {
                info!(backend = %backend, "Successfully initialized display");
                return Ok((backend, surface));
            }
            Err(e) => {
                warn!(backend = %backend, error = %format!("{e:#}"), "Display backend failed");
                last_error = Some((backend, e));
            }
        }
    }

    match last_error {
        Some((backend, e)) => Err(anyhow!(
            "Failed to initialize display with any backend. Last error ({}): {:#}",
            backend,
            e
        )),
        None => bail!("No display backends to try"),
    }
}

/// The selected backend and its surface, owned by the lifecycle controller
#[derive(Debug)]
pub struct DisplayHandle {
    backend: Backend,
    surface: Surface,
}

impl DisplayHandle {
    pub fn initialize(config: &Config) -> Result<Self> {
        let request = ModeRequest::from(config);
        let candidates = candidate_backends(config.preferred_backend.as_deref());
        let (backend, surface) = select_backend(&candidates, |backend| Surface::open(backend, &request))?;

        let (width, height) = surface.size();
        info!(backend = %backend, width, height, fullscreen = request.fullscreen, "Display ready");
        Ok(Self { backend, surface })
    }

    #[cfg(test)]
    pub fn new(backend: Backend, surface: Surface) -> Self {
        Self { backend, surface }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    #[cfg(test)]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_default_order() {
        assert_eq!(
            candidate_backends(None),
            vec![Backend::KmsDrm, Backend::Fbcon, Backend::DirectFb, Backend::Dummy]
        );
    }

    #[test]
    fn test_candidates_preferred_first_without_duplicates() {
        assert_eq!(
            candidate_backends(Some("fbcon")),
            vec![Backend::Fbcon, Backend::KmsDrm, Backend::DirectFb, Backend::Dummy]
        );
        assert_eq!(
            candidate_backends(Some("X11")),
            vec![Backend::X11, Backend::KmsDrm, Backend::Fbcon, Backend::DirectFb, Backend::Dummy]
        );
    }

    #[test]
    fn test_candidates_unknown_preferred_is_skipped() {
        assert_eq!(candidate_backends(Some("wayland")), FALLBACK_ORDER.to_vec());
    }

    #[test]
    fn test_backend_aliases() {
        assert_eq!("fbdev".parse::<Backend>().unwrap(), Backend::Fbcon);
        assert_eq!("headless".parse::<Backend>().unwrap(), Backend::Dummy);
        assert_eq!(" KMSDRM ".parse::<Backend>().unwrap(), Backend::KmsDrm);
        assert!("cocoa".parse::<Backend>().is_err());
    }

    #[test]
    fn test_select_backend_stops_at_first_success() {
        let mut attempts = Vec::new();
        let (backend, value) = select_backend(&FALLBACK_ORDER, |backend| {
            attempts.push(backend);
            match backend {
                Backend::Fbcon => Ok(7),
                _ => bail!("{} unavailable", backend),
            }
        })
        .unwrap();

        assert_eq!(backend, Backend::Fbcon);
        assert_eq!(value, 7);
        assert_eq!(attempts, vec![Backend::KmsDrm, Backend::Fbcon]);
    }

    #[test]
    fn test_select_backend_all_fail_reports_last_error() {
        let result: Result<(Backend, ())> =
            select_backend(&[Backend::KmsDrm, Backend::Fbcon], |backend| {
                bail!("no device for {}", backend)
            });

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Last error (fbcon)"), "{message}");
        assert!(message.contains("no device for fbcon"), "{message}");
        assert!(!message.contains("no device for kmsdrm"), "{message}");
    }

    #[test]
    fn test_select_backend_empty_list() {
        let result: Result<(Backend, ())> = select_backend(&[], |_| Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn test_directfb_always_fails() {
        let request = ModeRequest { fullscreen: true, width: 800, height: 600 };
        assert!(Surface::open(Backend::DirectFb, &request).is_err());
    }

    #[test]
    fn test_dummy_uses_configured_size() {
        let request = ModeRequest { fullscreen: true, width: 320, height: 240 };
        let surface = Surface::open(Backend::Dummy, &request).unwrap();
        assert_eq!(surface.size(), (320, 240));
    }

    #[test]
    fn test_initialize_with_preferred_dummy() {
        let config = Config {
            preferred_backend: Some("dummy".to_string()),
            fullscreen: false,
            window_width: 320,
            window_height: 240,
            ..Config::default()
        };

        let display = DisplayHandle::initialize(&config).unwrap();
        assert_eq!(display.backend(), Backend::Dummy);
        assert_eq!(display.surface().size(), (320, 240));
    }

    #[test]
    fn test_resolve_size() {
        let fullscreen = ModeRequest { fullscreen: true, width: 800, height: 600 };
        assert_eq!(resolve_size(&fullscreen, (1920, 1080)).unwrap(), (1920, 1080));

        let windowed = ModeRequest { fullscreen: false, width: 800, height: 600 };
        assert_eq!(resolve_size(&windowed, (1920, 1080)).unwrap(), (800, 600));
        assert!(resolve_size(&windowed, (640, 480)).is_err());

        let empty = ModeRequest { fullscreen: false, width: 0, height: 600 };
        assert!(resolve_size(&empty, (1920, 1080)).is_err());
    }

    #[test]
    fn test_blank_fills_black() {
        let mut surface = Surface::Headless(HeadlessSurface::new(3, 2));
        surface
            .present(&RgbaImage::from_pixel(3, 2, Rgba([200, 100, 50, 255])))
            .unwrap();
        surface.blank().unwrap();

        let Surface::Headless(headless) = &surface else {
            panic!("expected headless surface");
        };
        assert_eq!(headless.presents(), 2);
        assert!(headless.frame().pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }
}
