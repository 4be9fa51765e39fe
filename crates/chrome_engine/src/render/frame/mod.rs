//! Frame assembly and submission
//!
//! A frame moves through a fixed sequence of stages:
//!
//! ```text
//! Idle -> TransformsUpdated -> Dispatched -> Collected -> Recorded -> Submitted -> Idle
//! ```
//!
//! The [`FrameAssembler`] drives the stages and the [`FrameSynchronizer`] owns the
//! fence that keeps at most one frame in flight.

pub mod assembler;
pub mod camera_animation;
pub mod submission;

pub use assembler::FrameAssembler;
pub use camera_animation::{CameraAnimation, CameraMatrices};
pub use submission::FrameSynchronizer;

/// Stage of the frame currently being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// No frame in progress
    #[default]
    Idle,
    /// Camera matrices and frustum published
    TransformsUpdated,
    /// Recording jobs queued on the workers
    Dispatched,
    /// Workers drained and the visible set built
    Collected,
    /// Primary buffer recorded
    Recorded,
    /// Primary buffer submitted, fence pending
    Submitted,
}

/// Outcome of one presented frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Zero-based frame number
    pub frame_index: u64,
    /// Recording jobs queued
    pub dispatched_jobs: usize,
    /// Secondary buffers executed
    pub visible: usize,
    /// Objects rejected by the frustum test
    pub culled: usize,
    /// Fence waits that timed out before the frame completed
    pub fence_retries: u32,
    /// Draws recorded by the scene pass
    pub scene_draws: usize,
}

/// Running totals over every presented frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Frames presented
    pub frames: u64,
    /// Secondary buffers executed
    pub visible: u64,
    /// Objects culled
    pub culled: u64,
    /// Fence wait timeouts
    pub fence_retries: u64,
}

impl FrameStats {
    /// Fold one frame into the totals
    pub fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.visible += report.visible as u64;
        self.culled += report.culled as u64;
        self.fence_retries += u64::from(report.fence_retries);
    }

    /// Mean visible objects per frame
    pub fn average_visible(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.visible as f64 / self.frames as f64
        }
    }
}
