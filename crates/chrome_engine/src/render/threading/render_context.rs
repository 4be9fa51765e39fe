//! Per-thread command recording state
//!
//! Each worker owns one [`ThreadRenderContext`]: a command pool, one secondary
//! command buffer per object it draws and the objects themselves. Nothing in a
//! context is shared with another worker, so recording needs no cross-thread
//! coordination. The `Mutex` around each context is only ever contended by the
//! assembler, and only after the pool barrier.

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::SceneConfig;
use crate::foundation::math::{utils::deg_to_rad, Mat4, Mat4Ext, Vec3};
use crate::render::backend::{CommandBufferLevel, CommandDevice, InheritanceInfo, MeshBinding, PipelineBindings};
use crate::render::culling::Frustum;
use crate::render::error::{RenderError, RenderResult};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Identity of a render object: owning worker and slot within it
///
/// Ordering is thread-major, which is the order secondary buffers are executed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    /// Worker thread index
    pub thread: usize,
    /// Slot index within that worker's context
    pub slot: usize,
}

impl ObjectId {
    /// Create an object id
    pub fn new(thread: usize, slot: usize) -> Self {
        Self { thread, slot }
    }
}

/// Per-object constants pushed to the vertex stage
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushConstantBlock {
    /// `projection * view * model`, column-major
    pub mvp: [f32; 16],
    /// Object color
    pub color: [f32; 3],
}

/// One instance of the shared mesh
#[derive(Debug, Clone, PartialEq)]
pub struct RenderObject {
    /// World position
    pub position: Vec3,
    /// Rotation in degrees per axis
    pub rotation: Vec3,
    /// Uniform scale
    pub scale: f32,
    /// Color pushed with the transform
    pub color: Vec3,
    /// Rotation about Y in degrees per second
    pub rotation_speed: f32,
    /// Result of the last visibility test
    pub visible: bool,
    /// Model transform computed at the last recording
    pub model: Mat4,
}

impl Default for RenderObject {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Vec3::zeros(),
            scale: 1.0,
            color: Vec3::new(1.0, 1.0, 1.0),
            rotation_speed: 0.0,
            visible: true,
            model: Mat4::identity(),
        }
    }
}

impl RenderObject {
    /// Advance the Y rotation by `frame_time` seconds and rebuild the model transform
    pub fn update_model(&mut self, frame_time: f32) {
        self.rotation.y += self.rotation_speed * frame_time;
        if self.rotation.y > 360.0 {
            self.rotation.y -= 360.0;
        }

        self.model = Mat4::translation(self.position)
            * Mat4::rotation_x(deg_to_rad(self.rotation.x))
            * Mat4::rotation_y(deg_to_rad(self.rotation.y))
            * Mat4::rotation_z(deg_to_rad(self.rotation.z))
            * Mat4::new_scaling(self.scale);
    }
}

/// Lay out every worker's objects on the configured grid
///
/// Objects are placed row by row in thread-major order, wrapping after
/// `grid.columns` objects, so the grid stays dense whatever the thread split.
pub fn layout_objects(scene: &SceneConfig) -> Vec<Vec<RenderObject>> {
    let mut rng = match scene.color_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let grid = &scene.grid;
    let (rot_x, rot_y, rot_z) = scene.object_rotation;
    let mut column = 0u32;
    let mut row = 0u32;

    scene
        .object_counts()
        .into_iter()
        .map(|count| {
            (0..count)
                .map(|_| {
                    let position = Vec3::new(
                        (grid.origin.0 + column as f32) * grid.spacing.0,
                        (grid.origin.1 + row as f32) * grid.spacing.1,
                        grid.depth,
                    );

                    column += 1;
                    if column >= grid.columns {
                        column = 0;
                        row += 1;
                    }

                    RenderObject {
                        position,
                        rotation: Vec3::new(rot_x, rot_y, rot_z),
                        color: Vec3::new(rng.gen(), rng.gen(), rng.gen()),
                        rotation_speed: scene.rotation_speed,
                        ..RenderObject::default()
                    }
                })
                .collect()
        })
        .collect()
}

/// Shared per-frame data, published once before dispatch and read-only afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    /// Projection matrix
    pub projection: Mat4,
    /// View matrix
    pub view: Mat4,
    /// Frustum extracted from `projection * view`
    pub frustum: Frustum,
    /// Target extent for viewport and scissor
    pub extent: vk::Extent2D,
    /// Seconds since the previous frame
    pub frame_time: f32,
}

impl Default for FrameSnapshot {
    fn default() -> Self {
        Self {
            projection: Mat4::identity(),
            view: Mat4::identity(),
            frustum: Frustum::default(),
            extent: vk::Extent2D::default(),
            frame_time: 0.0,
        }
    }
}

/// Pipeline and mesh every recording job binds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawBindings {
    /// Pipeline and layout
    pub pipeline: PipelineBindings,
    /// Shared geometry (`None` = nothing loaded, recording is skipped)
    pub mesh: Option<MeshBinding>,
}

/// Recording resources owned by one worker thread
pub struct ThreadRenderContext {
    thread: usize,
    device: Arc<dyn CommandDevice>,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    objects: Vec<RenderObject>,
    push_constants: Vec<PushConstantBlock>,
    failure: Option<(usize, VulkanError)>,
}

impl ThreadRenderContext {
    /// Create the pool and one secondary buffer per object
    pub fn new(thread: usize, device: Arc<dyn CommandDevice>, objects: Vec<RenderObject>) -> VulkanResult<Self> {
        let count = u32::try_from(objects.len()).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("{} objects exceed a single allocation", objects.len()),
        })?;
        let command_pool = device.create_command_pool()?;

        let command_buffers = if count == 0 {
            Vec::new()
        } else {
            match device.allocate_command_buffers(command_pool, CommandBufferLevel::Secondary, count) {
                Ok(buffers) => buffers,
                Err(e) => {
                    device.destroy_command_pool(command_pool, &[]);
                    return Err(e);
                }
            }
        };

        let push_constants = vec![PushConstantBlock::zeroed(); objects.len()];

        Ok(Self {
            thread,
            device,
            command_pool,
            command_buffers,
            objects,
            push_constants,
            failure: None,
        })
    }

    /// Worker index this context belongs to
    pub fn thread(&self) -> usize {
        self.thread
    }

    /// Number of objects (and secondary buffers)
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Objects in slot order
    pub fn objects(&self) -> &[RenderObject] {
        &self.objects
    }

    /// Mutable access to one object
    pub fn object_mut(&mut self, slot: usize) -> Option<&mut RenderObject> {
        self.objects.get_mut(slot)
    }

    /// Secondary buffer of `slot`
    pub fn command_buffer(&self, slot: usize) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(slot).copied()
    }

    /// Constants pushed at the last recording of `slot`
    pub fn push_constants(&self, slot: usize) -> Option<&PushConstantBlock> {
        self.push_constants.get(slot)
    }

    /// Take the first recording failure since the last call
    pub fn take_failure(&mut self) -> Option<(usize, VulkanError)> {
        self.failure.take()
    }

    fn record_failure(&mut self, slot: usize, error: VulkanError) {
        if self.failure.is_none() {
            self.failure = Some((slot, error));
        }
    }

    /// Cull and, if visible, record the secondary buffer of `slot`
    ///
    /// Returns whether the object is visible this frame. Absent geometry or an
    /// unknown slot leaves the object invisible and records nothing.
    pub fn thread_render_code(
        &mut self,
        slot: usize,
        inheritance: &InheritanceInfo,
        snapshot: &FrameSnapshot,
        bindings: &DrawBindings,
    ) -> VulkanResult<bool> {
        let Some(command_buffer) = self.command_buffers.get(slot).copied() else {
            log::warn!("Thread {} has no command buffer for slot {}", self.thread, slot);
            return Ok(false);
        };
        let Some(mesh) = bindings.mesh else {
            if let Some(object) = self.objects.get_mut(slot) {
                object.visible = false;
            }
            return Ok(false);
        };
        let Some(object) = self.objects.get_mut(slot) else {
            return Ok(false);
        };

        object.visible = snapshot.frustum.check_sphere(&object.position, mesh.bounding_radius());
        if !object.visible {
            return Ok(false);
        }

        let device = &self.device;
        device.begin_secondary(command_buffer, inheritance)?;

        let extent = snapshot.extent;
        device.cmd_set_viewport(
            command_buffer,
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
            command_buffer,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        );

        device.cmd_bind_pipeline(command_buffer, bindings.pipeline.pipeline);

        object.update_model(snapshot.frame_time);
        let mvp = snapshot.projection * snapshot.view * object.model;
        let block = PushConstantBlock {
            mvp: mvp.to_cols_array(),
            color: [object.color.x, object.color.y, object.color.z],
        };
        self.push_constants[slot] = block;
        device.cmd_push_constants(
            command_buffer,
            bindings.pipeline.layout,
            vk::ShaderStageFlags::VERTEX,
            bytemuck::bytes_of(&block),
        );

        device.cmd_bind_vertex_buffer(command_buffer, mesh.vertex_buffer);
        device.cmd_bind_index_buffer(command_buffer, mesh.index_buffer);
        device.cmd_draw_indexed(command_buffer, mesh.index_count, 0);

        device.end_command_buffer(command_buffer)?;
        Ok(true)
    }
}

impl Drop for ThreadRenderContext {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.command_pool, &self.command_buffers);
    }
}

/// One recording job: everything a worker needs, moved by value into its queue
pub struct RecordJob {
    /// Object to cull and record
    pub id: ObjectId,
    /// Render pass the secondary buffer continues
    pub inheritance: InheritanceInfo,
    /// Frame transforms and frustum
    pub snapshot: Arc<FrameSnapshot>,
    /// Pipeline and mesh
    pub bindings: Arc<DrawBindings>,
    /// Context of the worker the job runs on
    pub context: Arc<Mutex<ThreadRenderContext>>,
}

impl RecordJob {
    /// Run the job on the current thread
    ///
    /// A recording error is parked in the context for the assembler to collect.
    pub fn run(self) {
        let Ok(mut context) = self.context.lock() else {
            log::error!("Render context of thread {} is poisoned", self.id.thread);
            return;
        };

        log::trace!("Recording object ({}, {})", self.id.thread, self.id.slot);
        if let Err(e) = context.thread_render_code(self.id.slot, &self.inheritance, &self.snapshot, &self.bindings) {
            log::error!("Recording object ({}, {}) failed: {}", self.id.thread, self.id.slot, e);
            if let Some(object) = context.object_mut(self.id.slot) {
                object.visible = false;
            }
            context.record_failure(self.id.slot, e);
        }
    }
}

/// Every worker's render context, addressed by [`ObjectId`]
pub struct RenderArena {
    contexts: Vec<Arc<Mutex<ThreadRenderContext>>>,
}

impl RenderArena {
    /// Create one context per entry of `layout`
    pub fn new(device: &Arc<dyn CommandDevice>, layout: Vec<Vec<RenderObject>>) -> VulkanResult<Self> {
        let contexts = layout
            .into_iter()
            .enumerate()
            .map(|(thread, objects)| {
                ThreadRenderContext::new(thread, Arc::clone(device), objects).map(|c| Arc::new(Mutex::new(c)))
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self { contexts })
    }

    /// Number of per-thread contexts
    pub fn thread_count(&self) -> usize {
        self.contexts.len()
    }

    /// Total objects across all threads
    pub fn total_objects(&self) -> RenderResult<usize> {
        (0..self.contexts.len()).map(|t| self.object_count(t)).sum()
    }

    /// Objects owned by `thread`
    pub fn object_count(&self, thread: usize) -> RenderResult<usize> {
        Ok(self.lock(thread)?.object_count())
    }

    /// Shared handle to a worker's context
    pub fn context(&self, thread: usize) -> Option<&Arc<Mutex<ThreadRenderContext>>> {
        self.contexts.get(thread)
    }

    /// Lock a worker's context
    pub fn lock(&self, thread: usize) -> RenderResult<MutexGuard<'_, ThreadRenderContext>> {
        let context = self.contexts.get(thread).ok_or(RenderError::UnknownWorker {
            index: thread,
            count: self.contexts.len(),
        })?;
        context.lock().map_err(|_| RenderError::ContextPoisoned { thread })
    }

    /// Run `f` against one object; `None` if the id does not exist
    pub fn with_object_mut<R>(&self, id: ObjectId, f: impl FnOnce(&mut RenderObject) -> R) -> RenderResult<Option<R>> {
        let mut context = self.lock(id.thread)?;
        Ok(context.object_mut(id.slot).map(f))
    }

    /// Visible objects and their buffers in ascending `(thread, slot)` order
    ///
    /// Surfaces the first recording failure of any thread as a fatal error.
    pub fn collect_visible(&self) -> RenderResult<Vec<(ObjectId, vk::CommandBuffer)>> {
        let mut visible = Vec::new();

        for thread in 0..self.contexts.len() {
            let mut context = self.lock(thread)?;
            if let Some((slot, source)) = context.take_failure() {
                return Err(RenderError::RecordingFailed { thread, slot, source });
            }

            if context.command_buffers.len() != context.objects.len() {
                log::warn!(
                    "Thread {} has {} buffers for {} objects",
                    thread,
                    context.command_buffers.len(),
                    context.objects.len()
                );
            }

            visible.extend(
                context
                    .objects
                    .iter()
                    .zip(&context.command_buffers)
                    .enumerate()
                    .filter(|(_, (object, _))| object.visible)
                    .map(|(slot, (_, &buffer))| (ObjectId::new(thread, slot), buffer)),
            );
        }

        Ok(visible)
    }
}
