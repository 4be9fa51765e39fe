//! Scripted swapchain
//!
//! Cycles through a fixed set of framebuffers. Acquire and present results can be
//! scripted to exercise the out-of-date paths. Clones share state, so a test can
//! keep a handle after giving one to the assembler.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk::{self, Handle};

use crate::render::backend::{FrameSemaphores, SwapchainProvider, SwapchainStatus};

const HANDLE_BASE: u64 = 0x5C00_0000;

struct SwapchainState {
    extent: vk::Extent2D,
    framebuffers: Vec<vk::Framebuffer>,
    next_image: u32,
    acquire_script: VecDeque<SwapchainStatus>,
    present_script: VecDeque<SwapchainStatus>,
    presented: Vec<u32>,
    rebuilds: usize,
}

/// Swapchain stand-in for headless runs
#[derive(Clone)]
pub struct HeadlessSwapchain {
    state: Arc<Mutex<SwapchainState>>,
    render_pass: vk::RenderPass,
    semaphores: FrameSemaphores,
}

impl HeadlessSwapchain {
    /// Create a swapchain of `image_count` images (at least one)
    pub fn new(extent: vk::Extent2D, image_count: u32) -> Self {
        let framebuffers = (0..image_count.max(1))
            .map(|i| vk::Framebuffer::from_raw(HANDLE_BASE + 0x100 + u64::from(i)))
            .collect();

        Self {
            state: Arc::new(Mutex::new(SwapchainState {
                extent,
                framebuffers,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                presented: Vec::new(),
                rebuilds: 0,
            })),
            render_pass: vk::RenderPass::from_raw(HANDLE_BASE + 1),
            semaphores: FrameSemaphores {
                image_available: vk::Semaphore::from_raw(HANDLE_BASE + 2),
                render_finished: vk::Semaphore::from_raw(HANDLE_BASE + 3),
            },
        }
    }

    fn state(&self) -> MutexGuard<'_, SwapchainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue results for upcoming acquires; afterwards acquires succeed
    pub fn script_acquire(&self, results: impl IntoIterator<Item = SwapchainStatus>) {
        self.state().acquire_script.extend(results);
    }

    /// Queue results for upcoming presents; afterwards presents succeed
    pub fn script_present(&self, results: impl IntoIterator<Item = SwapchainStatus>) {
        self.state().present_script.extend(results);
    }

    /// Image indices presented so far
    pub fn presented(&self) -> Vec<u32> {
        self.state().presented.clone()
    }

    /// Simulate recreation at a new size
    pub fn rebuild(&self, extent: vk::Extent2D) {
        let mut state = self.state();
        state.extent = extent;
        state.next_image = 0;
        state.rebuilds += 1;
    }

    /// Number of times [`Self::rebuild`] ran
    pub fn rebuilds(&self) -> usize {
        self.state().rebuilds
    }
}

impl SwapchainProvider for HeadlessSwapchain {
    fn extent(&self) -> vk::Extent2D {
        self.state().extent
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        let state = self.state();
        state
            .framebuffers
            .get(image_index as usize)
            .copied()
            .unwrap_or_else(vk::Framebuffer::null)
    }

    fn semaphores(&self) -> FrameSemaphores {
        self.semaphores
    }

    fn acquire_next_image(&mut self) -> (SwapchainStatus, u32) {
        let mut state = self.state();
        let status = state.acquire_script.pop_front().unwrap_or(SwapchainStatus::Success);
        let index = state.next_image;

        if matches!(status, SwapchainStatus::Success | SwapchainStatus::Suboptimal) {
            let count = u32::try_from(state.framebuffers.len()).unwrap_or(1);
            state.next_image = (index + 1) % count;
        }
        (status, index)
    }

    fn present(&mut self, image_index: u32) -> SwapchainStatus {
        let mut state = self.state();
        let status = state.present_script.pop_front().unwrap_or(SwapchainStatus::Success);
        if matches!(status, SwapchainStatus::Success | SwapchainStatus::Suboptimal) {
            state.presented.push(image_index);
        }
        status
    }
}
