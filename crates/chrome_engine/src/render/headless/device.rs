//! In-memory command device
//!
//! Records every command into a per-buffer trace instead of talking to a driver.
//! Fence results can be scripted, and the device checks the fence protocol the
//! frame pipeline must follow: no submission while a fence is pending and no reset
//! before a successful wait. Violations are counted and reported as errors.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ash::vk::{self, Handle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::render::backend::{
    CommandBufferLevel,
    CommandDevice,
    FenceStatus,
    FrameSemaphores,
    InheritanceInfo,
    RenderPassBegin,
};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A command as recorded into a headless buffer
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Secondary buffer begun with render pass continuation
    BeginSecondary(InheritanceInfo),
    /// Primary buffer begun
    BeginPrimary,
    /// Viewport 0 set to this size
    SetViewport {
        /// Viewport width
        width: f32,
        /// Viewport height
        height: f32,
    },
    /// Scissor 0 set
    SetScissor(vk::Rect2D),
    /// Graphics pipeline bound
    BindPipeline(vk::Pipeline),
    /// Push constants at offset 0
    PushConstants {
        /// Layout the constants were pushed through
        layout: vk::PipelineLayout,
        /// Shader stages the constants are visible to
        stages: vk::ShaderStageFlags,
        /// Raw bytes at offset 0
        data: Vec<u8>,
    },
    /// Vertex buffer bound at binding 0
    BindVertexBuffer(vk::Buffer),
    /// 32-bit index buffer bound
    BindIndexBuffer(vk::Buffer),
    /// Indexed draw
    DrawIndexed {
        /// Indices drawn
        index_count: u32,
        /// First index
        first_index: u32,
    },
    /// Render pass begun with secondary buffer contents
    BeginRenderPass {
        /// Render pass
        render_pass: vk::RenderPass,
        /// Target framebuffer
        framebuffer: vk::Framebuffer,
        /// Render area
        render_area: vk::Rect2D,
        /// Number of clear values supplied
        clear_value_count: usize,
    },
    /// Secondary buffers executed, in order
    ExecuteCommands(Vec<vk::CommandBuffer>),
    /// Render pass ended
    EndRenderPass,
    /// Recording finished
    End,
}

/// A queue submission as seen by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Primary buffer submitted
    pub buffer: vk::CommandBuffer,
    /// Fence signalled on completion
    pub fence: vk::Fence,
    /// Semaphores waited on and signalled
    pub semaphores: FrameSemaphores,
}

#[derive(Debug, Clone, Copy, Default)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

#[derive(Default)]
struct DeviceState {
    next_handle: u64,
    pools: HashMap<vk::CommandPool, Vec<vk::CommandBuffer>>,
    traces: HashMap<vk::CommandBuffer, Vec<RecordedCommand>>,
    fences: HashMap<vk::Fence, FenceState>,
    fence_script: VecDeque<FenceStatus>,
    submissions: Vec<Submission>,
    fence_waits: usize,
    fence_resets: usize,
    protocol_violations: usize,
    fail_next_begin: Option<vk::Result>,
    fail_next_submit: Option<vk::Result>,
}

impl DeviceState {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn push(&mut self, buffer: vk::CommandBuffer, command: RecordedCommand) {
        self.traces.entry(buffer).or_default().push(command);
    }

    fn violation(&mut self, reason: &str) -> VulkanError {
        self.protocol_violations += 1;
        log::error!("Fence protocol violation: {}", reason);
        VulkanError::InvalidOperation {
            reason: reason.to_string(),
        }
    }
}

/// Command device that records into memory
pub struct HeadlessDevice {
    state: Mutex<DeviceState>,
    jitter: Option<(Mutex<StdRng>, u64)>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Create a device that records without delay
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState::default()),
            jitter: None,
        }
    }

    /// Create a device that sleeps a seeded random time (up to `max_micros`) at the
    /// start of every secondary recording, perturbing worker completion order
    pub fn with_jitter(seed: u64, max_micros: u64) -> Self {
        Self {
            state: Mutex::new(DeviceState::default()),
            jitter: Some((Mutex::new(StdRng::seed_from_u64(seed)), max_micros)),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn jitter(&self) {
        if let Some((rng, max_micros)) = &self.jitter {
            let micros = rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .gen_range(0..=*max_micros);
            std::thread::sleep(Duration::from_micros(micros));
        }
    }

    /// Queue results for upcoming fence waits on submitted fences
    ///
    /// Once the script runs out every wait reports [`FenceStatus::Signaled`].
    pub fn script_fence_results(&self, results: impl IntoIterator<Item = FenceStatus>) {
        self.state().fence_script.extend(results);
    }

    /// Make the next secondary `begin` fail with `result`
    pub fn fail_next_begin(&self, result: vk::Result) {
        self.state().fail_next_begin = Some(result);
    }

    /// Make the next queue submission fail with `result`
    pub fn fail_next_submit(&self, result: vk::Result) {
        self.state().fail_next_submit = Some(result);
    }

    /// Commands recorded into `buffer` since it was last begun
    pub fn commands(&self, buffer: vk::CommandBuffer) -> Vec<RecordedCommand> {
        self.state().traces.get(&buffer).cloned().unwrap_or_default()
    }

    /// `execute_commands` batches in the latest recording of `primary`
    pub fn executed_batches(&self, primary: vk::CommandBuffer) -> Vec<Vec<vk::CommandBuffer>> {
        self.commands(primary)
            .into_iter()
            .filter_map(|command| match command {
                RecordedCommand::ExecuteCommands(buffers) => Some(buffers),
                _ => None,
            })
            .collect()
    }

    /// Submissions in the order they reached the queue
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Fence waits observed, including timeouts
    pub fn fence_waits(&self) -> usize {
        self.state().fence_waits
    }

    /// Fence resets observed
    pub fn fence_resets(&self) -> usize {
        self.state().fence_resets
    }

    /// Submissions or resets that broke the single-frame-in-flight protocol
    pub fn protocol_violations(&self) -> usize {
        self.state().protocol_violations
    }

    /// Command pools created and not yet destroyed
    pub fn live_pools(&self) -> usize {
        self.state().pools.len()
    }

    /// Fences created and not yet destroyed
    pub fn live_fences(&self) -> usize {
        self.state().fences.len()
    }
}

impl CommandDevice for HeadlessDevice {
    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool> {
        let mut state = self.state();
        let pool = vk::CommandPool::from_raw(state.next_raw());
        state.pools.insert(pool, Vec::new());
        Ok(pool)
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        _level: CommandBufferLevel,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        if !state.pools.contains_key(&pool) {
            return Err(VulkanError::UnknownHandle {
                kind: "command pool",
                raw: pool.as_raw(),
            });
        }

        let buffers: Vec<vk::CommandBuffer> = (0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.next_raw()))
            .collect();
        if let Some(owned) = state.pools.get_mut(&pool) {
            owned.extend(&buffers);
        }
        Ok(buffers)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool, _buffers: &[vk::CommandBuffer]) {
        if self.state().pools.remove(&pool).is_none() {
            log::warn!("Destroying unknown command pool {:#x}", pool.as_raw());
        }
    }

    fn begin_secondary(&self, buffer: vk::CommandBuffer, inheritance: &InheritanceInfo) -> VulkanResult<()> {
        self.jitter();

        let mut state = self.state();
        if let Some(result) = state.fail_next_begin.take() {
            return Err(VulkanError::Api(result));
        }
        state.traces.insert(buffer, vec![RecordedCommand::BeginSecondary(*inheritance)]);
        Ok(())
    }

    fn begin_primary(&self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.state().traces.insert(buffer, vec![RecordedCommand::BeginPrimary]);
        Ok(())
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.state().push(buffer, RecordedCommand::End);
        Ok(())
    }

    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state().push(
            buffer,
            RecordedCommand::SetViewport {
                width: viewport.width,
                height: viewport.height,
            },
        );
    }

    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state().push(buffer, RecordedCommand::SetScissor(scissor));
    }

    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state().push(buffer, RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_push_constants(
        &self,
        buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.state().push(
            buffer,
            RecordedCommand::PushConstants {
                layout,
                stages,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffer(&self, buffer: vk::CommandBuffer, vertex_buffer: vk::Buffer) {
        self.state().push(buffer, RecordedCommand::BindVertexBuffer(vertex_buffer));
    }

    fn cmd_bind_index_buffer(&self, buffer: vk::CommandBuffer, index_buffer: vk::Buffer) {
        self.state().push(buffer, RecordedCommand::BindIndexBuffer(index_buffer));
    }

    fn cmd_draw_indexed(&self, buffer: vk::CommandBuffer, index_count: u32, first_index: u32) {
        self.state().push(buffer, RecordedCommand::DrawIndexed { index_count, first_index });
    }

    fn cmd_begin_render_pass(&self, buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>) {
        self.state().push(
            buffer,
            RecordedCommand::BeginRenderPass {
                render_pass: begin.render_pass,
                framebuffer: begin.framebuffer,
                render_area: begin.render_area,
                clear_value_count: begin.clear_values.len(),
            },
        );
    }

    fn cmd_execute_commands(&self, buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        self.state().push(buffer, RecordedCommand::ExecuteCommands(secondaries.to_vec()));
    }

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer) {
        self.state().push(buffer, RecordedCommand::EndRenderPass);
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let mut state = self.state();
        let fence = vk::Fence::from_raw(state.next_raw());
        state.fences.insert(fence, FenceState { signaled, pending: false });
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state().fences.remove(&fence);
    }

    fn queue_submit(
        &self,
        buffer: vk::CommandBuffer,
        semaphores: &FrameSemaphores,
        fence: vk::Fence,
    ) -> VulkanResult<()> {
        let mut state = self.state();
        if let Some(result) = state.fail_next_submit.take() {
            return Err(VulkanError::Api(result));
        }

        let Some(fence_state) = state.fences.get(&fence).copied() else {
            return Err(VulkanError::UnknownHandle {
                kind: "fence",
                raw: fence.as_raw(),
            });
        };
        if fence_state.pending {
            return Err(state.violation("submit while the previous submission is in flight"));
        }
        if fence_state.signaled {
            return Err(state.violation("submit with a fence that was never reset"));
        }

        state.fences.insert(fence, FenceState { signaled: false, pending: true });
        state.submissions.push(Submission {
            buffer,
            fence,
            semaphores: *semaphores,
        });
        Ok(())
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> FenceStatus {
        let mut state = self.state();
        state.fence_waits += 1;

        let Some(fence_state) = state.fences.get(&fence).copied() else {
            return FenceStatus::Failed(vk::Result::ERROR_UNKNOWN);
        };
        if fence_state.signaled {
            return FenceStatus::Signaled;
        }
        if !fence_state.pending {
            // Nothing will ever signal it
            return FenceStatus::Timeout;
        }

        let status = state.fence_script.pop_front().unwrap_or(FenceStatus::Signaled);
        if status == FenceStatus::Signaled {
            state.fences.insert(fence, FenceState { signaled: true, pending: false });
        }
        status
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = self.state();
        let Some(fence_state) = state.fences.get(&fence).copied() else {
            return Err(VulkanError::UnknownHandle {
                kind: "fence",
                raw: fence.as_raw(),
            });
        };
        if fence_state.pending {
            return Err(state.violation("reset of a fence that has not signalled"));
        }

        state.fence_resets += 1;
        state.fences.insert(fence, FenceState::default());
        Ok(())
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_clears_previous_trace() {
        let device = HeadlessDevice::new();
        let pool = device.create_command_pool().unwrap();
        let buffer = device
            .allocate_command_buffers(pool, CommandBufferLevel::Primary, 1)
            .unwrap()[0];

        device.begin_primary(buffer).unwrap();
        device.cmd_end_render_pass(buffer);
        device.end_command_buffer(buffer).unwrap();
        device.begin_primary(buffer).unwrap();

        assert_eq!(device.commands(buffer), vec![RecordedCommand::BeginPrimary]);
    }

    #[test]
    fn test_unknown_pool_is_rejected() {
        let device = HeadlessDevice::new();
        let result = device.allocate_command_buffers(vk::CommandPool::from_raw(99), CommandBufferLevel::Secondary, 2);
        assert!(matches!(result, Err(VulkanError::UnknownHandle { kind: "command pool", .. })));
    }

    #[test]
    fn test_fence_script_then_signal() {
        let device = HeadlessDevice::new();
        let fence = device.create_fence(false).unwrap();
        device.script_fence_results([FenceStatus::Timeout]);

        device
            .queue_submit(vk::CommandBuffer::from_raw(7), &FrameSemaphores::default(), fence)
            .unwrap();

        assert_eq!(device.wait_for_fence(fence, 10), FenceStatus::Timeout);
        assert_eq!(device.wait_for_fence(fence, 10), FenceStatus::Signaled);
        assert!(device.reset_fence(fence).is_ok());
        assert_eq!(device.protocol_violations(), 0);
    }

    #[test]
    fn test_submit_while_pending_is_a_violation() {
        let device = HeadlessDevice::new();
        let fence = device.create_fence(false).unwrap();
        let buffer = vk::CommandBuffer::from_raw(7);

        device.queue_submit(buffer, &FrameSemaphores::default(), fence).unwrap();
        assert!(device.queue_submit(buffer, &FrameSemaphores::default(), fence).is_err());
        assert!(device.reset_fence(fence).is_err());
        assert_eq!(device.protocol_violations(), 2);
    }
}
