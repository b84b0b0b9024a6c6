// Surfaces - presentable targets handed in by the platform layer
//
// A surface is tagged with the backend it was created for. Devices and
// swapchains check the tag and reject surfaces of the other backend with
// `IncompatibleSurface` instead of coercing them.

use crate::backend::software::SoftwareSurface;
use crate::backend::vulkan::VulkanSurface;
use crate::error::Result;
use crate::format::{Format, Size2D};
use crate::instance::Backend;

/// One presented frame, tightly packed rows in `format`.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub size: Size2D,
    pub format: Format,
    pub pixels: &'a [u8],
}

/// Where software-backend frames go when presented (a window blitter, an
/// encoder, a test recorder, ...).
pub trait PresentTarget: Send {
    fn present(&mut self, frame: Frame<'_>) -> Result<()>;
}

pub enum Surface {
    Vulkan(VulkanSurface),
    Software(SoftwareSurface),
}

impl Surface {
    /// Software surface that keeps the latest frame but shows it nowhere.
    pub fn headless() -> Self {
        Surface::Software(SoftwareSurface::headless())
    }

    /// Software surface that forwards every presented frame to `target`.
    pub fn software(target: impl PresentTarget + 'static) -> Self {
        Surface::Software(SoftwareSurface::with_target(Box::new(target)))
    }

    pub fn backend(&self) -> Backend {
        match self {
            Surface::Vulkan(_) => Backend::Vulkan,
            Surface::Software(_) => Backend::Software,
        }
    }

    pub fn as_software(&self) -> Option<&SoftwareSurface> {
        match self {
            Surface::Software(s) => Some(s),
            Surface::Vulkan(_) => None,
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface").field("backend", &self.backend()).finish()
    }
}
