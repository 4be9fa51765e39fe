//! Frame command assembler
//!
//! Builds one frame from the per-object secondary buffers the workers record:
//!
//! 1. acquire a swapchain image
//! 2. advance the camera and publish the frame snapshot
//! 3. queue one [`RecordJob`] per object on the worker that owns it
//! 4. wait for the pool to drain and gather the visible buffers in `(thread, slot)` order
//! 5. record a primary buffer that executes them inside one render pass, behind the
//!    scene pass when one is attached
//! 6. submit, wait for the fence, reset it
//! 7. present
//!
//! Each stage is also exposed on its own so the sequence can be driven and checked
//! step by step; calling one out of order fails with [`RenderError::InvalidFrameState`].

use std::sync::Arc;

use ash::vk;

use crate::application::{AppError, Application};
use crate::core::DemoConfig;
use crate::render::backend::{
    CommandBufferLevel,
    CommandDevice,
    InheritanceInfo,
    MeshBinding,
    PipelineBindings,
    RenderPassBegin,
    SwapchainProvider,
    SwapchainStatus,
};
use crate::render::culling::Frustum;
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::camera_animation::CameraAnimation;
use crate::render::frame::submission::FrameSynchronizer;
use crate::render::frame::{FrameReport, FrameState, FrameStats};
use crate::render::scene::ScenePass;
use crate::render::threading::{
    layout_objects,
    DrawBindings,
    FrameSnapshot,
    ObjectId,
    RecordJob,
    RenderArena,
    WorkerPool,
};
use crate::render::vulkan::VulkanError;

/// Clear color of both color attachments (multisampled target and resolve)
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.2, 0.0];

/// Everything created by `setup` and released by `teardown`
struct FrameResources {
    device: Arc<dyn CommandDevice>,
    pool: WorkerPool,
    arena: RenderArena,
    primary_pool: vk::CommandPool,
    primary_buffer: vk::CommandBuffer,
    scene_buffer: Option<vk::CommandBuffer>,
    synchronizer: FrameSynchronizer,
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        // Jobs hold their context until they finish
        if let Err(e) = self.pool.wait() {
            log::warn!("Worker pool reported during teardown: {}", e);
        }
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle during teardown failed: {}", e);
        }
        let mut buffers = vec![self.primary_buffer];
        buffers.extend(self.scene_buffer);
        self.device.destroy_command_pool(self.primary_pool, &buffers);
    }
}

fn allocate_one(
    device: &dyn CommandDevice,
    pool: vk::CommandPool,
    level: CommandBufferLevel,
) -> RenderResult<vk::CommandBuffer> {
    let buffers = device.allocate_command_buffers(pool, level, 1)?;
    buffers.first().copied().ok_or_else(|| {
        VulkanError::InvalidOperation {
            reason: format!("no {:?} command buffer allocated", level),
        }
        .into()
    })
}

/// Orchestrates parallel recording and submission of one frame at a time
pub struct FrameAssembler {
    config: DemoConfig,
    device: Arc<dyn CommandDevice>,
    swapchain: Box<dyn SwapchainProvider>,
    bindings: Arc<DrawBindings>,
    camera: CameraAnimation,
    scene: Option<ScenePass>,
    resources: Option<FrameResources>,
    state: FrameState,
    frame_index: u64,
    image_index: u32,
    snapshot: Arc<FrameSnapshot>,
    dispatched: usize,
    visible: Vec<(ObjectId, vk::CommandBuffer)>,
    scene_draws: usize,
    last_report: Option<FrameReport>,
    stats: FrameStats,
}

impl FrameAssembler {
    /// Create an assembler; nothing is allocated until [`Self::prepare`]
    pub fn new(
        config: DemoConfig,
        device: Arc<dyn CommandDevice>,
        swapchain: Box<dyn SwapchainProvider>,
        pipeline: PipelineBindings,
        mesh: Option<MeshBinding>,
    ) -> Self {
        Self {
            config,
            device,
            swapchain,
            bindings: Arc::new(DrawBindings { pipeline, mesh }),
            camera: CameraAnimation::new(),
            scene: None,
            resources: None,
            state: FrameState::Idle,
            frame_index: 0,
            image_index: 0,
            snapshot: Arc::new(FrameSnapshot::default()),
            dispatched: 0,
            visible: Vec::new(),
            scene_draws: 0,
            last_report: None,
            stats: FrameStats::default(),
        }
    }

    /// Replace the camera animation
    pub fn with_camera(mut self, camera: CameraAnimation) -> Self {
        self.camera = camera;
        self
    }

    /// Draw `scene` every frame, ahead of the objects
    ///
    /// Attach before [`Self::prepare`]; the scene's secondary buffer is allocated there.
    pub fn with_scene(mut self, scene: ScenePass) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Attached scene pass
    pub fn scene_pass(&self) -> Option<&ScenePass> {
        self.scene.as_ref()
    }

    /// Attached scene pass, for changing the selection or fill mode between frames
    pub fn scene_pass_mut(&mut self) -> Option<&mut ScenePass> {
        self.scene.as_mut()
    }

    /// Current stage
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Whether `prepare` has run
    pub fn is_prepared(&self) -> bool {
        self.resources.is_some()
    }

    /// Per-thread render contexts, once prepared
    pub fn arena(&self) -> Option<&RenderArena> {
        self.resources.as_ref().map(|r| &r.arena)
    }

    /// Primary command buffer, once prepared
    pub fn primary_buffer(&self) -> Option<vk::CommandBuffer> {
        self.resources.as_ref().map(|r| r.primary_buffer)
    }

    /// Secondary buffer the scene pass records into, once prepared
    pub fn scene_buffer(&self) -> Option<vk::CommandBuffer> {
        self.resources.as_ref().and_then(|r| r.scene_buffer)
    }

    /// Snapshot published by the last `update_transforms`
    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    /// Visible set of the frame being built, ascending `(thread, slot)`
    pub fn visible_set(&self) -> Vec<ObjectId> {
        self.visible.iter().map(|(id, _)| *id).collect()
    }

    /// Report of the last presented frame
    pub fn last_report(&self) -> Option<FrameReport> {
        self.last_report
    }

    /// Totals across every presented frame
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Image acquired for the frame being built
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Spawn the workers and allocate every command pool, buffer and the fence
    pub fn prepare(&mut self) -> RenderResult<()> {
        if self.resources.is_some() {
            log::warn!("Frame assembler already prepared");
            return Ok(());
        }

        let scene = &self.config.scene;
        let layout = layout_objects(scene);
        let thread_count = layout.len();
        let object_count: usize = layout.iter().map(Vec::len).sum();

        let pool = WorkerPool::new(thread_count)?;
        let arena = RenderArena::new(&self.device, layout)?;

        let primary_pool = self.device.create_command_pool()?;
        let primary_buffer = match allocate_one(self.device.as_ref(), primary_pool, CommandBufferLevel::Primary) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.device.destroy_command_pool(primary_pool, &[]);
                return Err(e);
            }
        };
        let scene_buffer = match self.scene {
            Some(_) => match allocate_one(self.device.as_ref(), primary_pool, CommandBufferLevel::Secondary) {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    self.device.destroy_command_pool(primary_pool, &[primary_buffer]);
                    return Err(e);
                }
            },
            None => None,
        };
        let mut owned_buffers = vec![primary_buffer];
        owned_buffers.extend(scene_buffer);

        let renderer = &self.config.renderer;
        let synchronizer = match FrameSynchronizer::new(
            Arc::clone(&self.device),
            renderer.fence_timeout_ns,
            renderer.device_lost_threshold_ns,
        ) {
            Ok(synchronizer) => synchronizer,
            Err(e) => {
                self.device.destroy_command_pool(primary_pool, &owned_buffers);
                return Err(e.into());
            }
        };

        self.resources = Some(FrameResources {
            device: Arc::clone(&self.device),
            pool,
            arena,
            primary_pool,
            primary_buffer,
            scene_buffer,
            synchronizer,
        });
        self.state = FrameState::Idle;

        if self.bindings.mesh.is_none() {
            log::warn!("No mesh bound; every frame will be empty");
        }
        log::info!(
            "Frame assembler ready: {} objects across {} worker threads",
            object_count,
            thread_count
        );
        Ok(())
    }

    /// Join the workers and release everything `prepare` created
    pub fn release(&mut self) {
        if self.resources.take().is_some() {
            log::info!("Frame assembler released after {} frames", self.frame_index);
        }
        self.state = FrameState::Idle;
        self.visible.clear();
        self.dispatched = 0;
        self.scene_draws = 0;
    }

    fn resources(&self) -> RenderResult<&FrameResources> {
        self.resources.as_ref().ok_or(RenderError::NotPrepared)
    }

    fn expect_state(&self, expected: FrameState) -> RenderResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RenderError::InvalidFrameState {
                expected,
                found: self.state,
            })
        }
    }

    /// Acquire the next swapchain image
    pub fn acquire(&mut self) -> RenderResult<u32> {
        self.resources()?;
        self.expect_state(FrameState::Idle)?;

        // A suboptimal image is still acquired and its semaphore signaled, so the
        // frame goes ahead and present reports the rebuild
        match self.swapchain.acquire_next_image() {
            (SwapchainStatus::Success, index) => {
                self.image_index = index;
                Ok(index)
            }
            (SwapchainStatus::Suboptimal, index) => {
                log::debug!("Acquired image {} from a suboptimal swapchain", index);
                self.image_index = index;
                Ok(index)
            }
            (SwapchainStatus::OutOfDate, _) => {
                log::warn!("Acquire reported OutOfDate, swapchain must be rebuilt");
                Err(RenderError::SwapchainRebuildRequired(SwapchainStatus::OutOfDate))
            }
            (SwapchainStatus::Error(result), _) => Err(VulkanError::Api(result).into()),
        }
    }

    /// `Idle → TransformsUpdated`: advance the camera and publish the snapshot
    pub fn update_transforms(&mut self, delta_time: f32) -> RenderResult<()> {
        self.resources()?;
        self.expect_state(FrameState::Idle)?;

        let extent = self.swapchain.extent();
        let aspect = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };

        let matrices = self.camera.advance(aspect);
        self.snapshot = Arc::new(FrameSnapshot {
            projection: matrices.projection,
            view: matrices.view,
            frustum: Frustum::from_matrix(&(matrices.projection * matrices.view)),
            extent,
            frame_time: delta_time,
        });

        self.state = FrameState::TransformsUpdated;
        Ok(())
    }

    fn inheritance(&self) -> InheritanceInfo {
        InheritanceInfo {
            render_pass: self.swapchain.render_pass(),
            subpass: 0,
            framebuffer: self.swapchain.framebuffer(self.image_index),
        }
    }

    /// Record the attached scene into its secondary buffer
    ///
    /// Returns the number of draws, zero when no scene is attached.
    fn record_scene(&self, resources: &FrameResources) -> RenderResult<usize> {
        let (Some(scene), Some(buffer)) = (&self.scene, resources.scene_buffer) else {
            return Ok(0);
        };
        let device = self.device.as_ref();
        let extent = self.snapshot.extent;

        device.begin_secondary(buffer, &self.inheritance())?;
        device.cmd_set_viewport(
            buffer,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        device.cmd_set_scissor(
            buffer,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        );
        let draws = scene.record(device, buffer);
        device.end_command_buffer(buffer)?;
        Ok(draws)
    }

    /// `TransformsUpdated → Dispatched`: queue one recording job per object
    pub fn dispatch(&mut self) -> RenderResult<usize> {
        self.expect_state(FrameState::TransformsUpdated)?;
        let resources = self.resources()?;
        let inheritance = self.inheritance();

        let mut dispatched = 0;
        for thread in 0..resources.arena.thread_count() {
            let Some(context) = resources.arena.context(thread) else {
                continue;
            };
            let object_count = resources.arena.object_count(thread)?;

            for slot in 0..object_count {
                let job = RecordJob {
                    id: ObjectId::new(thread, slot),
                    inheritance,
                    snapshot: Arc::clone(&self.snapshot),
                    bindings: Arc::clone(&self.bindings),
                    context: Arc::clone(context),
                };
                resources.pool.add_job(thread, move || job.run())?;
                dispatched += 1;
            }
        }

        log::trace!("Frame {}: dispatched {} recording jobs", self.frame_index, dispatched);
        self.dispatched = dispatched;
        self.state = FrameState::Dispatched;
        Ok(dispatched)
    }

    /// `Dispatched → Collected`: wait for the workers and build the visible set
    pub fn collect(&mut self) -> RenderResult<usize> {
        self.expect_state(FrameState::Dispatched)?;
        let resources = self.resources()?;

        resources.pool.wait()?;
        let visible = resources.arena.collect_visible()?;

        self.visible = visible;
        self.state = FrameState::Collected;
        Ok(self.visible.len())
    }

    /// `Collected → Recorded`: record the primary buffer
    pub fn record_primary(&mut self) -> RenderResult<()> {
        self.expect_state(FrameState::Collected)?;
        let resources = self.resources()?;
        let device = &self.device;
        let primary = resources.primary_buffer;

        let scene_draws = self.record_scene(resources)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: CLEAR_COLOR },
            },
            vk::ClearValue {
                color: vk::ClearColorValue { float32: CLEAR_COLOR },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        device.begin_primary(primary)?;
        device.cmd_begin_render_pass(
            primary,
            &RenderPassBegin {
                render_pass: self.swapchain.render_pass(),
                framebuffer: self.swapchain.framebuffer(self.image_index),
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.snapshot.extent,
                },
                clear_values: &clear_values,
            },
        );

        // Scene first so the objects draw over it
        let secondaries: Vec<vk::CommandBuffer> = resources
            .scene_buffer
            .filter(|_| scene_draws > 0)
            .into_iter()
            .chain(self.visible.iter().map(|(_, buffer)| *buffer))
            .collect();
        if secondaries.is_empty() {
            log::trace!("Frame {}: nothing visible", self.frame_index);
        } else {
            device.cmd_execute_commands(primary, &secondaries);
        }

        device.cmd_end_render_pass(primary);
        device.end_command_buffer(primary)?;

        self.scene_draws = scene_draws;
        self.state = FrameState::Recorded;
        Ok(())
    }

    /// `Recorded → Submitted`: hand the primary buffer to the queue
    pub fn submit(&mut self) -> RenderResult<()> {
        self.expect_state(FrameState::Recorded)?;
        let semaphores = self.swapchain.semaphores();
        let resources = self.resources.as_mut().ok_or(RenderError::NotPrepared)?;

        resources.synchronizer.submit(resources.primary_buffer, &semaphores)?;
        self.state = FrameState::Submitted;
        Ok(())
    }

    /// `Submitted → Idle`: wait for the frame fence and reset it
    ///
    /// Returns the number of timed-out waits.
    pub fn complete(&mut self) -> RenderResult<u32> {
        self.expect_state(FrameState::Submitted)?;
        let resources = self.resources.as_mut().ok_or(RenderError::NotPrepared)?;

        let retries = resources.synchronizer.await_fence()?;
        self.state = FrameState::Idle;
        Ok(retries)
    }

    /// Build, submit and present one frame
    pub fn render_frame(&mut self, delta_time: f32) -> RenderResult<FrameReport> {
        self.resources()?;
        self.expect_state(FrameState::Idle)?;

        self.acquire()?;
        self.update_transforms(delta_time)?;
        let dispatched_jobs = self.dispatch()?;
        let visible = self.collect()?;
        self.record_primary()?;
        self.submit()?;
        let fence_retries = self.complete()?;

        let resources = self.resources.as_ref().ok_or(RenderError::NotPrepared)?;
        resources.synchronizer.present(self.swapchain.as_mut(), self.image_index)?;

        // Only presented frames are counted
        let report = FrameReport {
            frame_index: self.frame_index,
            dispatched_jobs,
            visible,
            culled: dispatched_jobs.saturating_sub(visible),
            fence_retries,
            scene_draws: self.scene_draws,
        };
        self.frame_index += 1;
        self.last_report = Some(report);
        self.stats.record(&report);
        log::debug!(
            "Frame {}: {} jobs, {} visible, {} culled, {} scene draws, {} fence retries",
            report.frame_index,
            report.dispatched_jobs,
            report.visible,
            report.culled,
            report.scene_draws,
            report.fence_retries
        );
        Ok(report)
    }
}

impl Application for FrameAssembler {
    fn setup(&mut self) -> Result<(), AppError> {
        self.config.validate()?;
        self.prepare()?;
        Ok(())
    }

    fn per_frame_update(&mut self, delta_time: f32) -> Result<(), AppError> {
        self.render_frame(delta_time)?;
        Ok(())
    }

    fn teardown(&mut self) {
        self.release();
    }

    fn on_swapchain_invalidated(&mut self) -> Result<(), AppError> {
        log::warn!("Swapchain invalidated at frame {}", self.frame_index);
        self.device.wait_idle().map_err(RenderError::from)?;
        self.state = FrameState::Idle;
        Ok(())
    }
}

impl Drop for FrameAssembler {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::render::headless::{HeadlessDevice, HeadlessSwapchain};
    use ash::vk::Handle;

    fn assembler(counts: Vec<usize>) -> (FrameAssembler, Arc<HeadlessDevice>) {
        let device = Arc::new(HeadlessDevice::new());
        let mut config = DemoConfig::default();
        config.scene.thread_object_counts = Some(counts);
        config.scene.color_seed = Some(3);
        config.scene.grid.origin = (0.0, 0.0);
        config.scene.grid.spacing = (0.5, 0.5);

        let assembler = FrameAssembler::new(
            config,
            device.clone(),
            Box::new(HeadlessSwapchain::new(vk::Extent2D { width: 64, height: 64 }, 2)),
            PipelineBindings {
                pipeline: vk::Pipeline::from_raw(1),
                layout: vk::PipelineLayout::from_raw(2),
            },
            Some(MeshBinding {
                vertex_buffer: vk::Buffer::from_raw(3),
                index_buffer: vk::Buffer::from_raw(4),
                index_count: 6,
                bounding_dim: 1.0,
            }),
        )
        .with_camera(CameraAnimation::fixed(Mat4::identity(), 100.0));
        (assembler, device)
    }

    #[test]
    fn test_frame_before_prepare_fails() {
        let (mut assembler, _) = assembler(vec![1]);
        assert_eq!(assembler.render_frame(0.0), Err(RenderError::NotPrepared));
    }

    #[test]
    fn test_stage_out_of_order_is_rejected() {
        let (mut assembler, _) = assembler(vec![2]);
        assembler.prepare().unwrap();

        assert_eq!(
            assembler.collect(),
            Err(RenderError::InvalidFrameState {
                expected: FrameState::Dispatched,
                found: FrameState::Idle,
            })
        );

        assembler.update_transforms(0.0).unwrap();
        assert!(matches!(
            assembler.update_transforms(0.0),
            Err(RenderError::InvalidFrameState { .. })
        ));
        assert_eq!(assembler.state(), FrameState::TransformsUpdated);
    }

    #[test]
    fn test_stages_walk_back_to_idle() {
        let (mut assembler, device) = assembler(vec![2, 1]);
        assembler.prepare().unwrap();

        assembler.acquire().unwrap();
        assembler.update_transforms(0.016).unwrap();
        assert_eq!(assembler.dispatch(), Ok(3));
        assert_eq!(assembler.collect(), Ok(3));
        assembler.record_primary().unwrap();
        assembler.submit().unwrap();
        assert_eq!(assembler.state(), FrameState::Submitted);
        assert_eq!(assembler.complete(), Ok(0));
        assert_eq!(assembler.state(), FrameState::Idle);

        assert_eq!(device.submissions().len(), 1);
        assert_eq!(device.fence_resets(), 1);
    }

    #[test]
    fn test_release_frees_every_pool() {
        let (mut assembler, device) = assembler(vec![2, 0, 1]);
        assembler.prepare().unwrap();
        // One pool per worker plus the primary pool
        assert_eq!(device.live_pools(), 4);

        assembler.render_frame(0.0).unwrap();
        assembler.release();

        assert_eq!(device.live_pools(), 0);
        assert_eq!(device.live_fences(), 0);
        assert!(!assembler.is_prepared());
    }
}
