// Backend implementations
//
// Each backend exposes the same set of native types (instance, device,
// surface, swapchain, command list, buffer, shader module, pipeline). The
// public wrappers in the crate root dispatch to them.

pub mod software;
pub mod vulkan;
