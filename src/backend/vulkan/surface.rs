use std::sync::Arc;

use ash::vk;

use super::instance::InstanceShared;

pub(crate) struct SurfaceShared {
    pub surface: vk::SurfaceKHR,
    pub instance: Arc<InstanceShared>,
}

impl Drop for SurfaceShared {
    fn drop(&mut self) {
        unsafe { self.instance.surface_loader.destroy_surface(self.surface, None) };
        log::debug!("Vulkan surface destroyed");
    }
}

/// `VkSurfaceKHR` for one window. Swapchains keep it alive while they exist.
pub struct VulkanSurface {
    pub(crate) shared: Arc<SurfaceShared>,
}
