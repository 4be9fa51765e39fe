//! `ash`-backed command device
//!
//! Wraps a logical device and graphics queue created by the caller. The wrapper never
//! destroys the device itself; it only owns what it creates through the
//! [`CommandDevice`] contract.

use std::sync::Mutex;

use ash::{vk, Device};

use crate::render::backend::{
    CommandBufferLevel, CommandDevice, FenceStatus, FrameSemaphores, InheritanceInfo, RenderPassBegin,
};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Map the raw result of a bounded fence wait
pub(crate) fn fence_status(result: Result<(), vk::Result>) -> FenceStatus {
    match result {
        Ok(()) => FenceStatus::Signaled,
        Err(vk::Result::TIMEOUT) => FenceStatus::Timeout,
        Err(other) => FenceStatus::Failed(other),
    }
}

/// Command device over a real Vulkan logical device
pub struct AshDevice {
    device: Device,
    queue: Mutex<vk::Queue>,
    queue_family_index: u32,
}

impl AshDevice {
    /// Wrap a logical device and the graphics queue submissions go to
    pub fn new(device: Device, queue: vk::Queue, queue_family_index: u32) -> Self {
        Self {
            device,
            queue: Mutex::new(queue),
            queue_family_index,
        }
    }

    /// Underlying logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Graphics queue family command pools are created on
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl CommandDevice for AshDevice {
    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.queue_family_index);

        unsafe {
            self.device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: CommandBufferLevel,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let level = match level {
            CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
        };
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe {
            if !buffers.is_empty() {
                self.device.free_command_buffers(pool, buffers);
            }
            self.device.destroy_command_pool(pool, None);
        }
    }

    fn begin_secondary(&self, buffer: vk::CommandBuffer, inheritance: &InheritanceInfo) -> VulkanResult<()> {
        let inheritance_info = vk::CommandBufferInheritanceInfo::builder()
            .render_pass(inheritance.render_pass)
            .subpass(inheritance.subpass)
            .framebuffer(inheritance.framebuffer);
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
            .inheritance_info(&inheritance_info);

        unsafe {
            self.device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn begin_primary(&self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();

        unsafe {
            self.device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(buffer).map_err(VulkanError::Api) }
    }

    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe {
            self.device.cmd_set_viewport(buffer, 0, &[viewport]);
        }
    }

    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe {
            self.device.cmd_set_scissor(buffer, 0, &[scissor]);
        }
    }

    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_push_constants(
        &self,
        buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(buffer, layout, stages, 0, data);
        }
    }

    fn cmd_bind_vertex_buffer(&self, buffer: vk::CommandBuffer, vertex_buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(buffer, 0, &[vertex_buffer], &[0]);
        }
    }

    fn cmd_bind_index_buffer(&self, buffer: vk::CommandBuffer, index_buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(buffer, index_buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn cmd_draw_indexed(&self, buffer: vk::CommandBuffer, index_count: u32, first_index: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(buffer, index_count, 1, first_index, 0, 0);
        }
    }

    fn cmd_begin_render_pass(&self, buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>) {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(begin.render_area)
            .clear_values(begin.clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                buffer,
                &render_pass_begin,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            );
        }
    }

    fn cmd_execute_commands(&self, buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]) {
        unsafe {
            self.device.cmd_execute_commands(buffer, secondaries);
        }
    }

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_end_render_pass(buffer);
        }
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        unsafe {
            self.device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe {
            self.device.destroy_fence(fence, None);
        }
    }

    fn queue_submit(
        &self,
        buffer: vk::CommandBuffer,
        semaphores: &FrameSemaphores,
        fence: vk::Fence,
    ) -> VulkanResult<()> {
        let wait_semaphores = [semaphores.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [buffer];
        let signal_semaphores = [semaphores.render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let queue = self.queue.lock().map_err(|_| VulkanError::InvalidOperation {
            reason: "Graphics queue lock poisoned".to_string(),
        })?;

        unsafe {
            self.device
                .queue_submit(*queue, &[submit_info.build()], fence)
                .map_err(VulkanError::Api)
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> FenceStatus {
        fence_status(unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) })
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[fence]).map_err(VulkanError::Api) }
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}
