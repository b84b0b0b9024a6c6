// Swapchain - presentable images bound to one surface
//
// Frame protocol: `get_next_texture` -> record and submit work that renders
// into the texture -> `present`. The swapchain does not order presentation
// after the submitted rendering; the caller must submit every command list
// that targets the texture before calling `present`.
//
// Blocking differs per backend: the Vulkan backend waits on a fence inside
// `get_next_texture`, the software backend returns immediately.

use ash::vk;

use crate::backend::software::{Handle, SoftwareSwapchain};
use crate::backend::vulkan::VulkanSwapchain;
use crate::device::DeviceId;
use crate::error::Result;
use crate::format::{Format, PresentMode, Size2D};
use crate::instance::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescription {
    /// Requested image count; clamped to what the surface allows.
    pub buffer_count: u32,
    pub format: Format,
    pub present_mode: PresentMode,
    pub size: Size2D,
}

impl SwapchainDescription {
    pub fn new(size: Size2D, format: Format, present_mode: PresentMode, buffer_count: u32) -> Self {
        Self { buffer_count, format, present_mode, size }
    }
}

/// `clamp(requested, min, max)` where a `max` of 0 means "no upper limit".
/// The result is never below 1.
pub(crate) fn clamp_image_count(requested: u32, min: u32, max: u32) -> u32 {
    let min = min.max(1);
    let count = requested.max(min);
    if max == 0 {
        count
    } else {
        count.min(max.max(min))
    }
}

/// Pick the requested present mode if the surface supports it, else the
/// first supported one.
pub(crate) fn negotiate_present_mode(requested: PresentMode, supported: &[PresentMode]) -> PresentMode {
    if supported.contains(&requested) {
        return requested;
    }
    let fallback = supported.first().copied().unwrap_or(PresentMode::Fifo);
    log::warn!(
        "Present mode {:?} is not supported by the surface, using {:?} instead",
        requested,
        fallback
    );
    fallback
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeTexture {
    Vulkan { image: vk::Image, view: vk::ImageView },
    Software { view: Handle },
}

/// A swapchain image acquired for rendering.
///
/// Only a view: it is valid until the next `present` on the swapchain it
/// came from and must not outlive that swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub(crate) native: NativeTexture,
    pub(crate) device: DeviceId,
    pub(crate) index: u32,
    pub(crate) size: Size2D,
    pub(crate) format: Format,
}

impl Texture {
    pub fn backend(&self) -> Backend {
        match self.native {
            NativeTexture::Vulkan { .. } => Backend::Vulkan,
            NativeTexture::Software { .. } => Backend::Software,
        }
    }

    /// Index of the image inside its swapchain.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> Size2D {
        self.size
    }

    pub fn format(&self) -> Format {
        self.format
    }
}

/// Dropping a swapchain releases its views (newest first) and then the
/// swap object.
pub enum Swapchain {
    Vulkan(VulkanSwapchain),
    Software(SoftwareSwapchain),
}

impl Swapchain {
    pub fn backend(&self) -> Backend {
        match self {
            Swapchain::Vulkan(_) => Backend::Vulkan,
            Swapchain::Software(_) => Backend::Software,
        }
    }

    /// Acquire the next image. Fails with `InvalidState` if the previously
    /// acquired image has not been presented yet.
    pub fn get_next_texture(&mut self) -> Result<Texture> {
        match self {
            Swapchain::Vulkan(s) => s.get_next_texture(),
            Swapchain::Software(s) => s.get_next_texture(),
        }
    }

    /// Present the acquired image. The caller must already have submitted
    /// all rendering that targets it.
    pub fn present(&mut self) -> Result<()> {
        match self {
            Swapchain::Vulkan(s) => s.present(),
            Swapchain::Software(s) => s.present(),
        }
    }

    /// Number of images (and views) the backend created.
    pub fn image_count(&self) -> u32 {
        match self {
            Swapchain::Vulkan(s) => s.image_count(),
            Swapchain::Software(s) => s.image_count(),
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Swapchain::Vulkan(s) => s.format(),
            Swapchain::Software(s) => s.format(),
        }
    }

    pub fn size(&self) -> Size2D {
        match self {
            Swapchain::Vulkan(s) => s.size(),
            Swapchain::Software(s) => s.size(),
        }
    }

    /// The present mode actually in use after negotiation.
    pub fn present_mode(&self) -> PresentMode {
        match self {
            Swapchain::Vulkan(s) => s.present_mode(),
            Swapchain::Software(s) => s.present_mode(),
        }
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("backend", &self.backend())
            .field("image_count", &self.image_count())
            .field("format", &self.format())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_is_clamped_into_range() {
        for requested in 0..20 {
            let count = clamp_image_count(requested, 2, 8);
            assert!((2..=8).contains(&count), "{requested} -> {count}");
            if (2..=8).contains(&requested) {
                assert_eq!(count, requested);
            }
        }
    }

    #[test]
    fn zero_max_means_unbounded() {
        assert_eq!(clamp_image_count(64, 2, 0), 64);
        assert_eq!(clamp_image_count(0, 0, 0), 1);
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_first_supported() {
        let supported = [PresentMode::Fifo, PresentMode::Immediate];
        assert_eq!(negotiate_present_mode(PresentMode::Immediate, &supported), PresentMode::Immediate);
        assert_eq!(negotiate_present_mode(PresentMode::Mailbox, &supported), PresentMode::Fifo);
        assert_eq!(negotiate_present_mode(PresentMode::Mailbox, &[]), PresentMode::Fifo);
    }
}
