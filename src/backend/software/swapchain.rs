use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{GpuError, Result};
use crate::format::{Format, PresentMode, Size2D};
use crate::swapchain::{clamp_image_count, negotiate_present_mode, NativeTexture, SwapchainDescription, Texture};

use super::driver::{Driver, Handle};
use super::surface::{OwnedFrame, SoftwareSurface, SurfaceState};

pub struct SoftwareSwapchain {
    driver: Arc<Driver>,
    surface: Arc<Mutex<SurfaceState>>,
    swap_chain: Handle,
    views: Vec<Handle>,
    buffers: Vec<Handle>,
    size: Size2D,
    format: Format,
    present_mode: PresentMode,
    current: usize,
    acquired: bool,
}

impl SoftwareSwapchain {
    pub(crate) fn new(driver: Arc<Driver>, desc: &SwapchainDescription, surface: &SoftwareSurface) -> Result<Self> {
        let shared = surface.shared();
        let caps = shared.lock().capabilities()?;
        let max = caps.max_image_extent;
        if desc.size.width > max.width || desc.size.height > max.height {
            return Err(GpuError::invalid_description(format!(
                "swapchain size {} exceeds the surface maximum of {}",
                desc.size, max
            )));
        }

        let image_count = clamp_image_count(desc.buffer_count, caps.min_image_count, caps.max_image_count);
        if image_count != desc.buffer_count {
            log::warn!(
                "Requested {} swapchain buffers, the surface allows {}..={}; using {}",
                desc.buffer_count,
                caps.min_image_count,
                caps.max_image_count,
                image_count
            );
        }
        let present_mode = negotiate_present_mode(desc.present_mode, caps.present_modes);

        let (swap_chain, buffers) = driver.create_swap_chain(desc.size, desc.format, image_count)?;
        let mut views = Vec::with_capacity(buffers.len());
        for buffer in &buffers {
            match driver.create_render_target_view(*buffer) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in views.iter().rev() {
                        driver.release(*view);
                    }
                    driver.release(swap_chain);
                    return Err(e);
                }
            }
        }

        log::info!(
            "Software swapchain created: {} images, {:?}, {}, {:?}",
            image_count,
            desc.format,
            desc.size,
            present_mode
        );

        Ok(Self {
            driver,
            surface: shared,
            swap_chain,
            views,
            buffers,
            size: desc.size,
            format: desc.format,
            present_mode,
            current: 0,
            acquired: false,
        })
    }

    pub fn get_next_texture(&mut self) -> Result<Texture> {
        if self.acquired {
            return Err(GpuError::invalid_state("swapchain texture acquired twice without present()"));
        }
        self.surface.lock().check_alive()?;
        debug_assert!(self.current < self.views.len());
        self.acquired = true;
        Ok(Texture {
            native: NativeTexture::Software { view: self.views[self.current] },
            device: self.driver.id(),
            index: self.current as u32,
            size: self.size,
            format: self.format,
        })
    }

    pub fn present(&mut self) -> Result<()> {
        if !self.acquired {
            return Err(GpuError::invalid_state("present() without an acquired swapchain texture"));
        }
        let (size, format, pixels) = self.driver.present_buffer(self.buffers[self.current])?;
        self.surface.lock().present(OwnedFrame { size, format, pixels })?;

        log::trace!("Presented software image {} ({:?})", self.current, self.present_mode);
        self.acquired = false;
        self.current = (self.current + 1) % self.views.len();
        Ok(())
    }

    pub fn image_count(&self) -> u32 {
        self.views.len() as u32
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn size(&self) -> Size2D {
        self.size
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }
}

impl Drop for SoftwareSwapchain {
    fn drop(&mut self) {
        for view in self.views.drain(..).rev() {
            self.driver.release(view);
        }
        self.driver.release(self.swap_chain);
        log::debug!("Software swapchain destroyed");
    }
}
