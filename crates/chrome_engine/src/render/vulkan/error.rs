//! Vulkan error type shared by every device backend

use ash::vk;
use thiserror::Error;

/// Vulkan-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Wrapper could not be built from the handles it was given
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Handle was never created by this device, or was already destroyed
    #[error("Unknown {kind} handle: {raw:#x}")]
    UnknownHandle {
        /// Kind of object the handle was expected to refer to
        kind: &'static str,
        /// Raw handle value
        raw: u64,
    },
}

impl VulkanError {
    /// Whether the error means the logical device is gone
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::Api(vk::Result::ERROR_DEVICE_LOST))
    }
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
