//! Parallel secondary command buffer recording
//!
//! A [`WorkerPool`] runs [`RecordJob`]s, each of which culls one object and records
//! its secondary buffer into the [`ThreadRenderContext`] owned by that worker.

pub mod render_context;
pub mod worker_pool;

pub use render_context::{
    layout_objects,
    DrawBindings,
    FrameSnapshot,
    ObjectId,
    PushConstantBlock,
    RecordJob,
    RenderArena,
    RenderObject,
    ThreadRenderContext,
};
pub use worker_pool::{Job, WorkerPool};
