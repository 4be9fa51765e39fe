//! Multi-threaded frame pipeline
//!
//! Worker threads cull and record one secondary command buffer per object, the
//! render thread stitches the visible buffers into a primary buffer inside a single
//! render pass and submits it under a fence that keeps one frame in flight.
//!
//! Device and swapchain access goes through the contracts in [`backend`], with an
//! `ash` implementation in [`vulkan`] and an in-memory one in [`headless`].

pub mod backend;
pub mod culling;
pub mod error;
pub mod frame;
pub mod headless;
pub mod scene;
pub mod threading;
pub mod vulkan;

pub use backend::{
    CommandBufferLevel,
    CommandDevice,
    FenceStatus,
    FrameSemaphores,
    InheritanceInfo,
    MeshBinding,
    PipelineBindings,
    RenderPassBegin,
    SwapchainProvider,
    SwapchainStatus,
};
pub use culling::{Frustum, Plane};
pub use error::{RenderError, RenderResult};
pub use frame::{
    CameraAnimation,
    CameraMatrices,
    FrameAssembler,
    FrameReport,
    FrameState,
    FrameStats,
    FrameSynchronizer,
};
pub use threading::{ObjectId, RenderArena, RenderObject, WorkerPool};
