//! Error taxonomy shared by every backend.
//!
//! Native result codes never leave a backend raw: each backend translates
//! them into the closest [`GpuError`] kind in one place.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// The graphics subsystem behind a backend could not be initialized.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("adapter index {index} is out of range ({count} adapters available)")]
    InvalidAdapterIndex { index: usize, count: usize },

    #[error("adapter exposes no suitable queue: {0}")]
    NoSuitableQueue(String),

    #[error("surface belongs to the {surface} backend, expected {expected}")]
    IncompatibleSurface { expected: &'static str, surface: &'static str },

    #[error("surface lost: {0}")]
    SurfaceLost(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompilationError(String),

    #[error("null argument: {0}")]
    NullArgument(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid description: {0}")]
    InvalidDescription(String),

    #[error("out of memory during {0}")]
    OutOfMemory(&'static str),

    /// The device is gone; every resource created from it is invalid.
    #[error("device lost during {0}")]
    DeviceLost(&'static str),

    #[error("swapchain is out of date and must be recreated")]
    SwapchainOutOfDate,

    /// Native failure with no closer kind. The message is diagnostic only.
    #[error("{operation} failed: {message}")]
    Backend { operation: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, GpuError>;

impl GpuError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_description(msg: impl Into<String>) -> Self {
        Self::InvalidDescription(msg.into())
    }

    pub fn backend(operation: &'static str, message: impl ToString) -> Self {
        Self::Backend { operation, message: message.to_string() }
    }

    /// Device-lost class errors invalidate everything created from the device.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost(_) | Self::BackendUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_piece() {
        let err = GpuError::InvalidAdapterIndex { index: 3, count: 1 };
        assert_eq!(err.to_string(), "adapter index 3 is out of range (1 adapters available)");

        let err = GpuError::IncompatibleSurface { expected: "Vulkan", surface: "Software" };
        assert!(err.to_string().contains("Software backend"));
    }

    #[test]
    fn only_device_and_backend_loss_are_fatal() {
        assert!(GpuError::DeviceLost("submit").is_fatal());
        assert!(!GpuError::SwapchainOutOfDate.is_fatal());
        assert!(!GpuError::invalid_state("x").is_fatal());
    }
}
