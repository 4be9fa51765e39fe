//! Vulkan implementations of the device and swapchain contracts

pub mod device;
pub mod error;
pub mod swapchain;
pub mod sync;

pub use device::AshDevice;
pub use error::{VulkanError, VulkanResult};
pub use swapchain::AshSwapchain;
pub use sync::{FrameSemaphoreSet, Semaphore};
