//! Queue submission and fence discipline
//!
//! One fence bounds the number of frames in flight to one. The synchronizer tracks
//! whether that fence is pending so a second submission, or a reset before the wait
//! completed, is caught on the CPU side instead of corrupting command buffers that
//! the GPU is still reading.

use std::sync::Arc;

use ash::vk;

use crate::render::backend::{CommandDevice, FenceStatus, FrameSemaphores, SwapchainProvider, SwapchainStatus};
use crate::render::error::{RenderError, RenderResult};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Owner of the frame fence
pub struct FrameSynchronizer {
    device: Arc<dyn CommandDevice>,
    fence: vk::Fence,
    in_flight: bool,
    fence_timeout_ns: u64,
    device_lost_threshold_ns: u64,
}

impl FrameSynchronizer {
    /// Create an unsignaled fence
    ///
    /// `fence_timeout_ns` bounds a single wait; once more than
    /// `device_lost_threshold_ns` has been spent waiting the device is presumed lost.
    pub fn new(
        device: Arc<dyn CommandDevice>,
        fence_timeout_ns: u64,
        device_lost_threshold_ns: u64,
    ) -> VulkanResult<Self> {
        let fence = device.create_fence(false)?;

        Ok(Self {
            device,
            fence,
            in_flight: false,
            fence_timeout_ns,
            device_lost_threshold_ns,
        })
    }

    /// Fence handle
    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    /// Whether a submission has not yet been awaited
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Submit `buffer`, waiting on image availability and signalling render completion
    pub fn submit(&mut self, buffer: vk::CommandBuffer, semaphores: &FrameSemaphores) -> RenderResult<()> {
        if self.in_flight {
            return Err(RenderError::FrameInFlight);
        }

        self.device.queue_submit(buffer, semaphores, self.fence)?;
        self.in_flight = true;
        Ok(())
    }

    /// Block until the submitted frame completes, then reset the fence
    ///
    /// Timeouts are retried until the accumulated wait exceeds the device-lost
    /// threshold. Returns the number of timed-out waits.
    pub fn await_fence(&mut self) -> RenderResult<u32> {
        if !self.in_flight {
            return Ok(0);
        }

        let mut retries = 0u32;
        let mut waited_ns = 0u64;

        loop {
            match self.device.wait_for_fence(self.fence, self.fence_timeout_ns) {
                FenceStatus::Signaled => break,
                FenceStatus::Timeout => {
                    retries += 1;
                    waited_ns = waited_ns.saturating_add(self.fence_timeout_ns);
                    log::trace!("Frame fence wait timed out ({} ns so far)", waited_ns);

                    if waited_ns > self.device_lost_threshold_ns {
                        log::error!("Frame fence did not signal within {} ns", waited_ns);
                        return Err(RenderError::DeviceLost { waited_ns });
                    }
                }
                FenceStatus::Failed(vk::Result::ERROR_DEVICE_LOST) => {
                    log::error!("Device lost while waiting for the frame fence");
                    return Err(RenderError::DeviceLost { waited_ns });
                }
                FenceStatus::Failed(result) => {
                    log::error!("Frame fence wait failed: {:?}", result);
                    return Err(RenderError::FenceWaitFailed(result));
                }
            }
        }

        self.device.reset_fence(self.fence)?;
        self.in_flight = false;
        Ok(retries)
    }

    /// Hand `image_index` to the presentation engine
    pub fn present(&self, swapchain: &mut dyn SwapchainProvider, image_index: u32) -> RenderResult<()> {
        match swapchain.present(image_index) {
            SwapchainStatus::Success => Ok(()),
            status @ (SwapchainStatus::Suboptimal | SwapchainStatus::OutOfDate) => {
                log::warn!("Present reported {:?}, swapchain must be rebuilt", status);
                Err(RenderError::SwapchainRebuildRequired(status))
            }
            SwapchainStatus::Error(result) => Err(VulkanError::Api(result).into()),
        }
    }
}

impl Drop for FrameSynchronizer {
    fn drop(&mut self) {
        if self.in_flight {
            // The fence may still be referenced by a pending submission
            if let Err(e) = self.device.wait_idle() {
                log::warn!("wait_idle before fence destruction failed: {}", e);
            }
        }
        self.device.destroy_fence(self.fence);
    }
}
