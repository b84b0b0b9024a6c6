// Swapchain - window presentation
//
// Acquisition blocks on a fence, so an acquired image is ready for
// rendering as soon as `get_next_texture` returns. Layout transitions
// (UNDEFINED -> COLOR_ATTACHMENT_OPTIMAL on acquire, -> PRESENT_SRC_KHR on
// present) are submitted on the graphics queue; presentation goes to the
// present queue, which may belong to a different family.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::format::{Format, PresentMode, Size2D};
use crate::swapchain::{clamp_image_count, negotiate_present_mode, NativeTexture, SwapchainDescription, Texture};

use super::conv;
use super::device::DeviceShared;
use super::result::{translate, VkResultExt};
use super::surface::{SurfaceShared, VulkanSurface};
use super::sync;

pub struct VulkanSwapchain {
    device: Arc<DeviceShared>,
    _surface: Arc<SurfaceShared>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    acquire_fence: vk::Fence,
    format: Format,
    size: Size2D,
    present_mode: PresentMode,
    current: Option<u32>,
}

impl VulkanSwapchain {
    pub(crate) fn new(device: Arc<DeviceShared>, desc: &SwapchainDescription, surface: &VulkanSurface) -> Result<Self> {
        let loader = &device.instance.surface_loader;
        let pd = device.physical_device;
        let surface_handle = surface.shared.surface;

        let supported = unsafe { loader.get_physical_device_surface_support(pd, device.present_family, surface_handle) }
            .map_err(|e| GpuError::SurfaceLost(format!("surface support query failed: {e}")))?;
        if !supported {
            return Err(GpuError::NoSuitableQueue(format!(
                "queue family {} cannot present to this surface",
                device.present_family
            )));
        }

        let caps = unsafe { loader.get_physical_device_surface_capabilities(pd, surface_handle) }
            .map_err(|e| GpuError::SurfaceLost(format!("surface capability query failed: {e}")))?;
        let formats = unsafe { loader.get_physical_device_surface_formats(pd, surface_handle) }
            .map_err(|e| GpuError::SurfaceLost(format!("surface format query failed: {e}")))?;
        let present_modes = unsafe { loader.get_physical_device_surface_present_modes(pd, surface_handle) }
            .map_err(|e| GpuError::SurfaceLost(format!("present mode query failed: {e}")))?;

        let wanted = conv::format(desc.format);
        let surface_format = formats
            .iter()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| formats.iter().find(|f| conv::format_from_vk(f.format).is_some()))
            .copied()
            .ok_or_else(|| GpuError::invalid_description("surface offers no supported color format"))?;
        let format = conv::format_from_vk(surface_format.format).unwrap_or(desc.format);
        if format != desc.format {
            log::warn!("Surface does not support {:?}, using {:?}", desc.format, format);
        }

        let supported_modes: Vec<PresentMode> =
            present_modes.iter().filter_map(|m| conv::present_mode_from_vk(*m)).collect();
        let present_mode = negotiate_present_mode(desc.present_mode, &supported_modes);

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: desc.size.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: desc.size.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };
        let size = Size2D::new(extent.width, extent.height);
        if size != desc.size {
            log::warn!("Requested swapchain size {} adjusted to {} by the surface", desc.size, size);
        }

        let image_count = clamp_image_count(desc.buffer_count, caps.min_image_count, caps.max_image_count);
        if image_count != desc.buffer_count {
            log::warn!(
                "Requested {} swapchain images, the surface allows {}..={}; using {}",
                desc.buffer_count,
                caps.min_image_count,
                caps.max_image_count,
                image_count
            );
        }

        let families = [device.graphics_family, device.present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface_handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(conv::present_mode(present_mode))
            .clipped(true);
        create_info = if device.graphics_family != device.present_family {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .or_gpu("create swapchain")?;

        // Drop releases whatever has been created if a later step fails.
        let mut this = Self {
            device: Arc::clone(&device),
            _surface: Arc::clone(&surface.shared),
            swapchain,
            images: Vec::new(),
            views: Vec::new(),
            acquire_fence: vk::Fence::null(),
            format,
            size,
            present_mode,
            current: None,
        };

        this.images = unsafe { device.swapchain_loader.get_swapchain_images(swapchain) }
            .or_gpu("get swapchain images")?;
        for &image in &this.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(color_range());
            let view = unsafe { device.device.create_image_view(&view_info, None) }.or_gpu("create image view")?;
            this.views.push(view);
        }
        this.acquire_fence = sync::create_fence(&device.device, false)?;

        log::info!(
            "Vulkan swapchain created: {} images, {:?}, {}, {:?}",
            this.views.len(),
            format,
            size,
            present_mode
        );
        Ok(this)
    }

    pub fn get_next_texture(&mut self) -> Result<Texture> {
        if self.current.is_some() {
            return Err(GpuError::invalid_state("swapchain texture acquired twice without present()"));
        }

        let (index, suboptimal) = unsafe {
            self.device.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        }
        .or_gpu("acquire next image")?;
        sync::wait(&self.device.device, self.acquire_fence)?;
        sync::reset(&self.device.device, self.acquire_fence)?;
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }

        let image = *self.images.get(index as usize).ok_or_else(|| {
            GpuError::backend("acquire next image", format!("index {index} outside {} images", self.images.len()))
        })?;
        self.transition(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
            (vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        )?;

        self.current = Some(index);
        Ok(Texture {
            native: NativeTexture::Vulkan { image, view: self.views[index as usize] },
            device: self.device.id,
            index,
            size: self.size,
            format: self.format,
        })
    }

    pub fn present(&mut self) -> Result<()> {
        let index = self
            .current
            .take()
            .ok_or_else(|| GpuError::invalid_state("present() without an acquired swapchain texture"))?;

        self.transition(
            self.images[index as usize],
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            (vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty()),
        )?;

        let swapchains = [self.swapchain];
        let indices = [index];
        let info = vk::PresentInfoKHR::default().swapchains(&swapchains).image_indices(&indices);
        let result = {
            let _queue = self.device.queue_lock.lock();
            unsafe { self.device.swapchain_loader.queue_present(self.device.present_queue, &info) }
        };
        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    log::debug!("Presented to a suboptimal swapchain");
                }
                Ok(())
            }
            Err(e) => Err(translate("queue present", e)),
        }
    }

    fn transition(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src: (vk::PipelineStageFlags, vk::AccessFlags),
        dst: (vk::PipelineStageFlags, vk::AccessFlags),
    ) -> Result<()> {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_access_mask(src.1)
            .dst_access_mask(dst.1)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_range());
        self.device.one_time_submit(|d, cb| unsafe {
            d.cmd_pipeline_barrier(cb, src.0, dst.0, vk::DependencyFlags::empty(), &[], &[], &[barrier]);
        })
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

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Device did not go idle before swapchain destruction: {e}");
        }
        unsafe {
            for view in self.views.drain(..).rev() {
                self.device.device.destroy_image_view(view, None);
            }
            self.device.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.device.device.destroy_fence(self.acquire_fence, None);
        }
        log::debug!("Vulkan swapchain destroyed");
    }
}
