// Software backend - implicit API with one immediate context
//
// Resources are native objects in a CPU driver. Command lists are recorded
// deferred and executed by the immediate context on submit, so submission
// is synchronous and `wait_idle` has nothing to wait for.

mod command_list;
mod device;
mod driver;
mod resources;
mod surface;
mod swapchain;

pub use command_list::SoftwareCommandList;
pub use device::{SoftwareDevice, SoftwareInstance};
pub use driver::{
    ContextStats, DriverReport, Handle, ObjectKind, ADAPTER_NAME, MAX_BUFFER_SIZE, MAX_SWAP_CHAIN_BUFFERS,
    MAX_SWAP_CHAIN_MEMORY, MAX_TEXTURE_DIMENSION, MIN_SWAP_CHAIN_BUFFERS, SUPPORTED_PRESENT_MODES,
};
pub use resources::{SoftwareBuffer, SoftwarePipeline, SoftwareShaderModule};
pub use surface::{OwnedFrame, SoftwareSurface};
pub use swapchain::SoftwareSwapchain;
