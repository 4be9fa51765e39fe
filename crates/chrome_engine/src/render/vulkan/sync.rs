//! Vulkan synchronization primitives
//!
//! Fences are owned by [`FrameSynchronizer`](crate::render::frame::FrameSynchronizer)
//! through the [`CommandDevice`](crate::render::backend::CommandDevice) contract, so
//! only semaphores need an RAII wrapper here.

use ash::{vk, Device};

use crate::render::backend::FrameSemaphores;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive destroyed on drop
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Acquire and render-finished semaphores for one frame
pub struct FrameSemaphoreSet {
    image_available: Semaphore,
    render_finished: Semaphore,
}

impl FrameSemaphoreSet {
    /// Create both semaphores
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
        })
    }

    /// Raw handles in the form the frame pipeline consumes
    pub fn handles(&self) -> FrameSemaphores {
        FrameSemaphores {
            image_available: self.image_available.handle(),
            render_finished: self.render_finished.handle(),
        }
    }
}
