// Fences for GPU -> CPU synchronization
//
// Every submission this backend makes is guarded by a fence: command lists
// own one, swapchains own one for image acquisition, and one-time
// submissions create a temporary one.

use ash::vk;

use crate::error::Result;

use super::result::VkResultExt;

pub(crate) fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
    let info = vk::FenceCreateInfo::default().flags(flags);
    unsafe { device.create_fence(&info, None) }.or_gpu("create fence")
}

pub(crate) fn wait(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, u64::MAX) }.or_gpu("wait for fence")
}

pub(crate) fn reset(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence]) }.or_gpu("reset fence")
}
