// Vulkan backend - explicit API over ash
//
// Ownership: instance -> device -> resources, each child holding an Arc to
// the shared state of its parent, so native objects are destroyed in a
// valid order however the public handles are dropped.

mod buffer;
mod command_list;
mod conv;
mod device;
mod instance;
mod pipeline;
mod result;
mod shader;
mod surface;
mod swapchain;
mod sync;

pub use buffer::VulkanBuffer;
pub use command_list::VulkanCommandList;
pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use pipeline::VulkanPipeline;
pub use shader::VulkanShaderModule;
pub use surface::VulkanSurface;
pub use swapchain::VulkanSwapchain;
