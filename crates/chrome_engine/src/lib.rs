//! # Chrome Engine
//!
//! Multi-threaded Vulkan command recording for the chrome demo.
//!
//! ## Features
//!
//! - **Parallel recording**: one secondary command buffer per object, recorded on a
//!   fixed worker pool with per-thread command pools
//! - **Frustum culling**: objects outside the view never reach the primary buffer
//! - **Deterministic assembly**: visible buffers execute in (thread, slot) order
//! - **Fence discipline**: at most one frame in flight, bounded waits, device-loss detection
//! - **Scene ordering**: background, opaque and blended parts drawn in a fixed sequence
//! - **Headless backend**: the whole pipeline runs and can be inspected without a GPU
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ash::vk;
//! use chrome_engine::prelude::*;
//! use chrome_engine::render::headless::{HeadlessDevice, HeadlessSwapchain};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DemoConfig::default();
//!     let device = Arc::new(HeadlessDevice::new());
//!     let swapchain = HeadlessSwapchain::new(vk::Extent2D { width: 1280, height: 720 }, 3);
//!     let pipeline = PipelineBindings {
//!         pipeline: vk::Pipeline::null(),
//!         layout: vk::PipelineLayout::null(),
//!     };
//!
//!     let mut assembler = FrameAssembler::new(config.clone(), device, Box::new(swapchain), pipeline, None);
//!     let summary = FrameLoop::from_config(&config.engine).run(&mut assembler)?;
//!     println!("{} frames", summary.frames);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

mod application;
mod engine;

pub use application::{AppError, Application};
pub use engine::{EngineError, FrameLoop, LoopSummary};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::{Config, DemoConfig, EngineConfig, RendererConfig, SceneConfig},
        foundation::{
            math::{Mat4, Mat4Ext, Vec3},
            time::Timer,
        },
        render::{
            CommandDevice,
            FrameAssembler,
            FrameReport,
            FrameStats,
            Frustum,
            MeshBinding,
            PipelineBindings,
            RenderError,
            SwapchainProvider,
        },
        AppError,
        Application,
        EngineError,
        FrameLoop,
        LoopSummary,
    };
}
