//! Collaborator contracts consumed by the frame pipeline
//!
//! The pipeline never creates instances, surfaces, swapchains, pipelines or meshes.
//! It receives them through the traits and plain handle structs in this module and
//! treats every handle as an opaque token. Handles are `ash` types so the Vulkan
//! backend passes them straight through; the headless backend mints its own.

use ash::vk;

use crate::render::vulkan::VulkanResult;

/// Level of a command buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferLevel {
    /// Submitted to a queue directly
    Primary,
    /// Executed from inside a primary buffer's render pass
    Secondary,
}

/// Render-pass context a secondary buffer assumes while recorded outside it
///
/// `Copy + Send` so every recording job can carry its own snapshot by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritanceInfo {
    /// Render pass the secondary buffer will execute in
    pub render_pass: vk::RenderPass,
    /// Subpass index within that render pass
    pub subpass: u32,
    /// Framebuffer bound by the primary buffer
    pub framebuffer: vk::Framebuffer,
}

/// Parameters for beginning the frame's render pass
#[derive(Clone, Copy)]
pub struct RenderPassBegin<'a> {
    /// Render pass to begin
    pub render_pass: vk::RenderPass,
    /// Framebuffer of the acquired image
    pub framebuffer: vk::Framebuffer,
    /// Area covered by the pass
    pub render_area: vk::Rect2D,
    /// One clear value per attachment
    pub clear_values: &'a [vk::ClearValue],
}

/// Outcome of a single bounded fence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// All work guarded by the fence has completed
    Signaled,
    /// The timeout elapsed first
    Timeout,
    /// Any other result; never retried
    Failed(vk::Result),
}

/// Semaphores chaining acquire → render → present for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSemaphores {
    /// Signalled by acquire, waited on by the frame submission
    pub image_available: vk::Semaphore,
    /// Signalled by the frame submission, waited on by present
    pub render_finished: vk::Semaphore,
}

/// Status reported by swapchain acquire and present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    /// Operation succeeded
    Success,
    /// Operation succeeded but the swapchain no longer matches the surface exactly
    Suboptimal,
    /// The swapchain can no longer be used with the surface
    OutOfDate,
    /// Any other failure
    Error(vk::Result),
}

/// Opaque pipeline tokens bound once at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineBindings {
    /// Graphics pipeline every object is drawn with
    pub pipeline: vk::Pipeline,
    /// Layout holding the per-object push constant range
    pub layout: vk::PipelineLayout,
}

/// Geometry of a loaded model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBinding {
    /// Vertex buffer handle
    pub vertex_buffer: vk::Buffer,
    /// 32-bit index buffer handle
    pub index_buffer: vk::Buffer,
    /// Number of indices covering the whole mesh
    pub index_count: u32,
    /// Largest extent of the mesh; half of it is the culling radius
    pub bounding_dim: f32,
}

impl MeshBinding {
    /// Radius of the bounding sphere used for frustum culling
    pub fn bounding_radius(&self) -> f32 {
        self.bounding_dim * 0.5
    }
}

/// Device and queue provider
///
/// Recording calls on *different* command buffers may run concurrently from worker
/// threads; a single buffer and the pool it came from are only ever touched by one
/// thread at a time. Submission and fence calls are made from the render thread only.
pub trait CommandDevice: Send + Sync {
    /// Create a resettable command pool on the graphics queue family
    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool>;

    /// Allocate `count` command buffers from `pool`
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: CommandBufferLevel,
        count: u32,
    ) -> VulkanResult<Vec<vk::CommandBuffer>>;

    /// Free buffers and destroy the pool they were allocated from
    fn destroy_command_pool(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    /// Begin a secondary buffer that continues the inherited render pass
    fn begin_secondary(&self, buffer: vk::CommandBuffer, inheritance: &InheritanceInfo) -> VulkanResult<()>;

    /// Begin a primary buffer
    fn begin_primary(&self, buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Finish recording
    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Set viewport 0
    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport);

    /// Set scissor 0
    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D);

    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, pipeline: vk::Pipeline);

    /// Push constants for `stages` at offset 0
    fn cmd_push_constants(
        &self,
        buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    );

    /// Bind a vertex buffer at binding 0
    fn cmd_bind_vertex_buffer(&self, buffer: vk::CommandBuffer, vertex_buffer: vk::Buffer);

    /// Bind a 32-bit index buffer
    fn cmd_bind_index_buffer(&self, buffer: vk::CommandBuffer, index_buffer: vk::Buffer);

    /// Single-instance indexed draw
    fn cmd_draw_indexed(&self, buffer: vk::CommandBuffer, index_count: u32, first_index: u32);

    /// Begin a render pass whose contents come from secondary buffers
    fn cmd_begin_render_pass(&self, buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>);

    /// Execute secondary buffers; `secondaries` must not be empty
    fn cmd_execute_commands(&self, buffer: vk::CommandBuffer, secondaries: &[vk::CommandBuffer]);

    /// End the current render pass
    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer);

    /// Create a fence
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;

    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);

    /// Submit one primary buffer; `fence` signals when it completes
    fn queue_submit(
        &self,
        buffer: vk::CommandBuffer,
        semaphores: &FrameSemaphores,
        fence: vk::Fence,
    ) -> VulkanResult<()>;

    /// Wait up to `timeout_ns` for `fence`
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> FenceStatus;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;

    /// Block until the device is idle
    fn wait_idle(&self) -> VulkanResult<()>;
}

/// Swapchain provider
///
/// Creation and recreation live outside the pipeline; this is the per-frame surface.
pub trait SwapchainProvider: Send {
    /// Current image extent
    fn extent(&self) -> vk::Extent2D;

    /// Render pass compatible with every framebuffer
    fn render_pass(&self) -> vk::RenderPass;

    /// Framebuffer wrapping swapchain image `image_index`
    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer;

    /// Semaphores for the frame currently being built
    fn semaphores(&self) -> FrameSemaphores;

    /// Acquire the next image; the index is only meaningful on success or suboptimal
    fn acquire_next_image(&mut self) -> (SwapchainStatus, u32);

    /// Queue `image_index` for presentation
    fn present(&mut self, image_index: u32) -> SwapchainStatus;
}
