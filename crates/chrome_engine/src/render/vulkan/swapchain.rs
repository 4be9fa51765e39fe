//! `ash`-backed swapchain provider
//!
//! Creation and recreation of the swapchain, its render pass and framebuffers stay
//! with the caller. This wrapper owns only the per-frame semaphores and translates
//! acquire and present results into [`SwapchainStatus`].

use ash::extensions::khr;
use ash::{vk, Device};

use crate::render::backend::{FrameSemaphores, SwapchainProvider, SwapchainStatus};
use crate::render::vulkan::sync::FrameSemaphoreSet;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Map an acquire or present result, where `Ok(true)` means suboptimal
pub(crate) fn swapchain_status<T>(
    result: Result<T, vk::Result>,
    suboptimal: impl FnOnce(&T) -> bool,
) -> (SwapchainStatus, Option<T>) {
    match result {
        Ok(value) if suboptimal(&value) => (SwapchainStatus::Suboptimal, Some(value)),
        Ok(value) => (SwapchainStatus::Success, Some(value)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => (SwapchainStatus::OutOfDate, None),
        Err(vk::Result::SUBOPTIMAL_KHR) => (SwapchainStatus::Suboptimal, None),
        Err(other) => (SwapchainStatus::Error(other), None),
    }
}

/// Swapchain provider over a `VK_KHR_swapchain` handle
pub struct AshSwapchain {
    loader: khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    present_queue: vk::Queue,
    extent: vk::Extent2D,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    semaphores: FrameSemaphoreSet,
}

impl AshSwapchain {
    /// Wrap a swapchain and the framebuffers built over its images
    pub fn new(
        device: &Device,
        loader: khr::Swapchain,
        swapchain: vk::SwapchainKHR,
        present_queue: vk::Queue,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        framebuffers: Vec<vk::Framebuffer>,
    ) -> VulkanResult<Self> {
        if framebuffers.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Swapchain has no framebuffers".to_string(),
            ));
        }

        Ok(Self {
            loader,
            swapchain,
            present_queue,
            extent,
            render_pass,
            framebuffers,
            semaphores: FrameSemaphoreSet::new(device)?,
        })
    }

    /// Swap in a recreated swapchain; semaphores are kept
    pub fn replace(
        &mut self,
        swapchain: vk::SwapchainKHR,
        extent: vk::Extent2D,
        framebuffers: Vec<vk::Framebuffer>,
    ) -> VulkanResult<vk::SwapchainKHR> {
        if framebuffers.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Recreated swapchain has no framebuffers".to_string(),
            ));
        }

        self.extent = extent;
        self.framebuffers = framebuffers;
        Ok(std::mem::replace(&mut self.swapchain, swapchain))
    }
}

impl SwapchainProvider for AshSwapchain {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .unwrap_or_else(vk::Framebuffer::null)
    }

    fn semaphores(&self) -> FrameSemaphores {
        self.semaphores.handles()
    }

    fn acquire_next_image(&mut self) -> (SwapchainStatus, u32) {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.semaphores.handles().image_available,
                vk::Fence::null(),
            )
        };

        let (status, value) = swapchain_status(result, |(_, suboptimal)| *suboptimal);
        if status == SwapchainStatus::OutOfDate {
            log::warn!("Swapchain out of date during acquire_next_image");
        }
        (status, value.map_or(0, |(index, _)| index))
    }

    fn present(&mut self, image_index: u32) -> SwapchainStatus {
        let wait_semaphores = [self.semaphores.handles().render_finished];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(self.present_queue, &present_info) };

        let (status, _) = swapchain_status(result, |suboptimal| *suboptimal);
        if status == SwapchainStatus::OutOfDate {
            log::warn!("Swapchain out of date during queue_present");
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_result_mapping() {
        let (status, value) = swapchain_status(Ok((2u32, false)), |(_, s)| *s);
        assert_eq!(status, SwapchainStatus::Success);
        assert_eq!(value, Some((2, false)));

        let (status, _) = swapchain_status(Ok((1u32, true)), |(_, s)| *s);
        assert_eq!(status, SwapchainStatus::Suboptimal);

        let (status, value) = swapchain_status::<(u32, bool)>(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), |(_, s)| *s);
        assert_eq!(status, SwapchainStatus::OutOfDate);
        assert!(value.is_none());
    }

    #[test]
    fn test_present_result_mapping() {
        assert_eq!(swapchain_status(Ok(false), |s| *s).0, SwapchainStatus::Success);
        assert_eq!(swapchain_status(Ok(true), |s| *s).0, SwapchainStatus::Suboptimal);
        assert_eq!(
            swapchain_status::<bool>(Err(vk::Result::ERROR_SURFACE_LOST_KHR), |s| *s).0,
            SwapchainStatus::Error(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }
}
