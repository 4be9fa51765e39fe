//! Error taxonomy of the frame pipeline
//!
//! Everything except [`RenderError::SwapchainRebuildRequired`] is fatal for the frame
//! loop. Transient fence timeouts never surface here; the synchronizer retries them.

use ash::vk;
use thiserror::Error;

use crate::render::backend::SwapchainStatus;
use crate::render::frame::FrameState;
use crate::render::vulkan::VulkanError;

/// Errors raised while building, submitting or presenting a frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Device call failed (resource creation, submission, recording)
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Fence wait returned something other than success or timeout
    #[error("Fence wait failed: {0:?}")]
    FenceWaitFailed(vk::Result),

    /// The device reported loss, or the fence never signalled within the threshold
    #[error("Device lost after waiting {waited_ns} ns on the frame fence")]
    DeviceLost {
        /// Total time spent waiting before giving up
        waited_ns: u64,
    },

    /// A worker failed to record an object's secondary command buffer
    #[error("Recording failed for object ({thread}, {slot}): {source}")]
    RecordingFailed {
        /// Worker thread index
        thread: usize,
        /// Slot index within the worker's context
        slot: usize,
        /// Underlying device error
        #[source]
        source: VulkanError,
    },

    /// A job panicked on a worker thread
    #[error("Worker thread {worker} panicked while running a job")]
    WorkerPanicked {
        /// Worker thread index
        worker: usize,
    },

    /// A render context lock was poisoned by a panicking job
    #[error("Render context of thread {thread} is poisoned")]
    ContextPoisoned {
        /// Worker thread index
        thread: usize,
    },

    /// Acquire or present reported the swapchain no longer matches the surface
    #[error("Swapchain must be rebuilt ({0:?})")]
    SwapchainRebuildRequired(SwapchainStatus),

    /// Submission attempted while the previous frame's fence is still pending
    #[error("Previous frame is still in flight")]
    FrameInFlight,

    /// Frame stage called out of order
    #[error("Invalid frame state: expected {expected:?}, found {found:?}")]
    InvalidFrameState {
        /// State the stage requires
        expected: FrameState,
        /// State the assembler was in
        found: FrameState,
    },

    /// Frame requested before `setup` or after `teardown`
    #[error("Renderer used before setup")]
    NotPrepared,

    /// Job addressed to a worker the pool does not have
    #[error("No worker thread {index} (pool has {count})")]
    UnknownWorker {
        /// Requested worker index
        index: usize,
        /// Number of workers in the pool
        count: usize,
    },

    /// Job queued after the pool shut down
    #[error("Worker pool has shut down")]
    PoolShutDown,

    /// The OS refused to start a worker thread
    #[error("Failed to spawn worker thread {worker}: {reason}")]
    WorkerSpawnFailed {
        /// Worker thread index
        worker: usize,
        /// OS error text
        reason: String,
    },
}

impl RenderError {
    /// Whether the frame loop may continue after rebuilding presentation resources
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainRebuildRequired(_))
    }
}

/// Result type for frame pipeline operations
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_swapchain_errors_are_recoverable() {
        assert!(RenderError::SwapchainRebuildRequired(SwapchainStatus::OutOfDate).is_recoverable());
        assert!(RenderError::SwapchainRebuildRequired(SwapchainStatus::Suboptimal).is_recoverable());
        assert!(!RenderError::DeviceLost { waited_ns: 0 }.is_recoverable());
        assert!(!RenderError::FenceWaitFailed(vk::Result::ERROR_UNKNOWN).is_recoverable());
        assert!(!RenderError::WorkerPanicked { worker: 2 }.is_recoverable());
    }

    #[test]
    fn test_vulkan_errors_convert() {
        let error: RenderError = VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).into();
        assert!(matches!(error, RenderError::Vulkan(VulkanError::Api(_))));
    }
}
