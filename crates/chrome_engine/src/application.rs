//! Application trait and lifecycle management

use thiserror::Error;

use crate::config::ConfigError;
use crate::render::RenderError;

/// Application lifecycle trait
///
/// Implement this trait to run something under a [`crate::FrameLoop`].
pub trait Application {
    /// Acquire resources
    ///
    /// Called once before the first frame.
    fn setup(&mut self) -> Result<(), AppError>;

    /// Advance and render one frame
    ///
    /// # Arguments
    /// * `delta_time` - Time since last frame in seconds
    fn per_frame_update(&mut self, delta_time: f32) -> Result<(), AppError>;

    /// Release resources
    ///
    /// Called once when the loop ends, including after a fatal error.
    fn teardown(&mut self);

    /// Presentation resources no longer match the surface
    ///
    /// Called after a frame fails with a recoverable error, before the next frame.
    fn on_swapchain_invalidated(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    /// Whether the loop should stop before the next frame
    fn should_close(&self) -> bool {
        false
    }
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Frame pipeline error
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

impl AppError {
    /// Whether the loop may continue after [`Application::on_swapchain_invalidated`]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Render(e) if e.is_recoverable())
    }
}
