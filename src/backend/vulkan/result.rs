// vk::Result and allocator errors -> GpuError, in one place

use ash::vk;
use gpu_allocator::AllocationError;

use crate::error::{GpuError, Result};

pub(crate) fn translate(operation: &'static str, result: vk::Result) -> GpuError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost(operation),
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            GpuError::OutOfMemory(operation)
        }
        vk::Result::ERROR_SURFACE_LOST_KHR => GpuError::SurfaceLost(format!("{operation}: {result}")),
        vk::Result::ERROR_OUT_OF_DATE_KHR => GpuError::SwapchainOutOfDate,
        vk::Result::ERROR_INITIALIZATION_FAILED
        | vk::Result::ERROR_INCOMPATIBLE_DRIVER
        | vk::Result::ERROR_LAYER_NOT_PRESENT
        | vk::Result::ERROR_EXTENSION_NOT_PRESENT => {
            GpuError::BackendUnavailable(format!("{operation}: {result}"))
        }
        other => GpuError::backend(operation, other),
    }
}

pub(crate) fn translate_allocation(operation: &'static str, error: AllocationError) -> GpuError {
    match error {
        AllocationError::OutOfMemory => GpuError::OutOfMemory(operation),
        other => GpuError::backend(operation, other),
    }
}

pub(crate) trait VkResultExt<T> {
    /// Translate a failed Vulkan call made during `operation`.
    fn or_gpu(self, operation: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn or_gpu(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| translate(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_the_closest_kind() {
        assert_eq!(translate("submit", vk::Result::ERROR_DEVICE_LOST), GpuError::DeviceLost("submit"));
        assert_eq!(
            translate("allocate", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GpuError::OutOfMemory("allocate")
        );
        assert_eq!(translate("acquire", vk::Result::ERROR_OUT_OF_DATE_KHR), GpuError::SwapchainOutOfDate);
        assert!(matches!(
            translate("caps", vk::Result::ERROR_SURFACE_LOST_KHR),
            GpuError::SurfaceLost(_)
        ));
        assert!(matches!(
            translate("create instance", vk::Result::ERROR_INCOMPATIBLE_DRIVER),
            GpuError::BackendUnavailable(_)
        ));
        assert!(matches!(
            translate("pipeline", vk::Result::ERROR_UNKNOWN),
            GpuError::Backend { operation: "pipeline", .. }
        ));
    }

    #[test]
    fn allocator_out_of_memory_is_out_of_memory() {
        assert_eq!(
            translate_allocation("buffer", AllocationError::OutOfMemory),
            GpuError::OutOfMemory("buffer")
        );
    }
}
