use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{GpuError, Result};
use crate::format::{Format, PresentMode, Size2D};
use crate::surface::{Frame, PresentTarget};

use super::driver::{MAX_SWAP_CHAIN_BUFFERS, MAX_TEXTURE_DIMENSION, MIN_SWAP_CHAIN_BUFFERS, SUPPORTED_PRESENT_MODES};

/// A presented frame kept by the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    pub size: Size2D,
    pub format: Format,
    pub pixels: Vec<u8>,
}

pub(crate) struct SurfaceCapabilities {
    pub min_image_count: u32,
    pub max_image_count: u32,
    pub max_image_extent: Size2D,
    pub present_modes: &'static [PresentMode],
}

pub(crate) struct SurfaceState {
    target: Option<Box<dyn PresentTarget>>,
    lost: bool,
    presented: u64,
    last_frame: Option<OwnedFrame>,
}

impl SurfaceState {
    pub(crate) fn capabilities(&self) -> Result<SurfaceCapabilities> {
        self.check_alive()?;
        Ok(SurfaceCapabilities {
            min_image_count: MIN_SWAP_CHAIN_BUFFERS,
            max_image_count: MAX_SWAP_CHAIN_BUFFERS,
            max_image_extent: Size2D::new(MAX_TEXTURE_DIMENSION, MAX_TEXTURE_DIMENSION),
            present_modes: &SUPPORTED_PRESENT_MODES,
        })
    }

    pub(crate) fn check_alive(&self) -> Result<()> {
        if self.lost {
            return Err(GpuError::SurfaceLost("software surface was invalidated".into()));
        }
        Ok(())
    }

    pub(crate) fn present(&mut self, frame: OwnedFrame) -> Result<()> {
        self.check_alive()?;
        if let Some(target) = self.target.as_mut() {
            target.present(Frame { size: frame.size, format: frame.format, pixels: &frame.pixels })?;
        }
        self.presented += 1;
        self.last_frame = Some(frame);
        Ok(())
    }
}

/// Software presentation surface.
///
/// Cloning shares the same underlying surface; swapchains keep a clone.
#[derive(Clone)]
pub struct SoftwareSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl SoftwareSurface {
    pub(crate) fn headless() -> Self {
        Self::new(None)
    }

    pub(crate) fn with_target(target: Box<dyn PresentTarget>) -> Self {
        Self::new(Some(target))
    }

    fn new(target: Option<Box<dyn PresentTarget>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                target,
                lost: false,
                presented: 0,
                last_frame: None,
            })),
        }
    }

    pub(crate) fn shared(&self) -> Arc<Mutex<SurfaceState>> {
        Arc::clone(&self.state)
    }

    /// Mark the surface as gone, as when its window is destroyed. Swapchain
    /// creation and presentation fail with `SurfaceLost` from then on.
    pub fn invalidate(&self) {
        log::warn!("Software surface invalidated");
        self.state.lock().lost = true;
    }

    pub fn is_lost(&self) -> bool {
        self.state.lock().lost
    }

    pub fn presented_frames(&self) -> u64 {
        self.state.lock().presented
    }

    pub fn last_frame(&self) -> Option<OwnedFrame> {
        self.state.lock().last_frame.clone()
    }
}
