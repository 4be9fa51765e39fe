//! Frame loop driver

use thiserror::Error;

use crate::application::{AppError, Application};
use crate::core::EngineConfig;
use crate::foundation::time::Timer;

/// Drives an [`Application`] from setup to teardown
///
/// Recoverable frame errors hand control to
/// [`Application::on_swapchain_invalidated`] and the loop carries on; any other error
/// tears the application down and ends the loop.
pub struct FrameLoop {
    max_frames: Option<u64>,
    timer: Timer,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    /// Loop until the application asks to close
    pub fn new() -> Self {
        Self {
            max_frames: None,
            timer: Timer::new(),
        }
    }

    /// Loop configured from the engine section of the demo config
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new().with_max_frames(config.max_frames)
    }

    /// Stop after this many frame attempts, recovered ones included
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Frame attempt limit, if any
    pub fn max_frames(&self) -> Option<u64> {
        self.max_frames
    }

    /// Run `app` to completion
    pub fn run<A: Application>(&mut self, app: &mut A) -> Result<LoopSummary, EngineError> {
        log::info!("Starting frame loop...");

        if let Err(e) = app.setup() {
            log::error!("Application setup failed: {}", e);
            app.teardown();
            return Err(EngineError::Setup(e));
        }

        self.timer = Timer::new();
        let mut summary = LoopSummary::default();

        while !app.should_close() && self.max_frames.map_or(true, |max| summary.attempts() < max) {
            self.timer.update();
            let frame = summary.attempts();

            match app.per_frame_update(self.timer.delta_time()) {
                Ok(()) => summary.frames += 1,
                Err(e) if e.is_recoverable() => {
                    log::warn!("Frame {} needs a swapchain rebuild: {}", frame, e);
                    summary.recovered += 1;

                    if let Err(source) = app.on_swapchain_invalidated() {
                        log::error!("Swapchain rebuild failed after frame {}: {}", frame, source);
                        app.teardown();
                        return Err(EngineError::Frame { frame, source });
                    }
                }
                Err(source) => {
                    log::error!("Frame {} failed: {}", frame, source);
                    app.teardown();
                    return Err(EngineError::Frame { frame, source });
                }
            }
        }

        app.teardown();
        summary.total_time = self.timer.total_time();

        log::info!(
            "Frame loop finished: {} frames, {} recovered, {:.1} fps",
            summary.frames,
            summary.recovered,
            self.timer.average_fps()
        );
        Ok(summary)
    }
}

/// What a completed loop did
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopSummary {
    /// Frames that completed without error
    pub frames: u64,
    /// Frames that ended in a swapchain rebuild
    pub recovered: u64,
    /// Wall time between setup and teardown, in seconds
    pub total_time: f32,
}

impl LoopSummary {
    /// Frames attempted, successful or recovered
    pub fn attempts(&self) -> u64 {
        self.frames + self.recovered
    }
}

/// Frame loop errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Application setup failed
    #[error("Application setup failed: {0}")]
    Setup(#[source] AppError),

    /// A frame failed with an unrecoverable error
    #[error("Frame {frame} failed: {source}")]
    Frame {
        /// Index of the failed frame attempt
        frame: u64,
        /// Underlying application error
        #[source]
        source: AppError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::SwapchainStatus;
    use crate::render::RenderError;

    enum Step {
        Ok,
        OutOfDate,
        DeviceLost,
    }

    #[derive(Default)]
    struct ScriptedApp {
        script: Vec<Step>,
        frames: usize,
        setups: u32,
        teardowns: u32,
        invalidations: u32,
        close_after: Option<usize>,
        fail_setup: bool,
    }

    impl ScriptedApp {
        fn with_script(script: Vec<Step>) -> Self {
            Self {
                script,
                ..Default::default()
            }
        }
    }

    impl Application for ScriptedApp {
        fn setup(&mut self) -> Result<(), AppError> {
            self.setups += 1;
            if self.fail_setup {
                return Err(AppError::Custom("no device".to_string()));
            }
            Ok(())
        }

        fn per_frame_update(&mut self, _delta_time: f32) -> Result<(), AppError> {
            let step = self.script.get(self.frames).unwrap_or(&Step::Ok);
            self.frames += 1;
            match step {
                Step::Ok => Ok(()),
                Step::OutOfDate => Err(RenderError::SwapchainRebuildRequired(SwapchainStatus::OutOfDate).into()),
                Step::DeviceLost => Err(RenderError::DeviceLost { waited_ns: 10 }.into()),
            }
        }

        fn teardown(&mut self) {
            self.teardowns += 1;
        }

        fn on_swapchain_invalidated(&mut self) -> Result<(), AppError> {
            self.invalidations += 1;
            Ok(())
        }

        fn should_close(&self) -> bool {
            self.close_after.map_or(false, |n| self.frames >= n)
        }
    }

    #[test]
    fn test_runs_configured_frame_count() {
        let mut app = ScriptedApp::default();
        let summary = FrameLoop::new().with_max_frames(Some(5)).run(&mut app).unwrap();

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.recovered, 0);
        assert_eq!(app.setups, 1);
        assert_eq!(app.teardowns, 1);
    }

    #[test]
    fn test_recoverable_error_invalidates_and_continues() {
        let mut app = ScriptedApp::with_script(vec![Step::Ok, Step::OutOfDate, Step::Ok]);
        let summary = FrameLoop::new().with_max_frames(Some(4)).run(&mut app).unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.recovered, 1);
        assert_eq!(app.invalidations, 1);
        assert_eq!(app.teardowns, 1);
    }

    #[test]
    fn test_fatal_error_tears_down_and_propagates() {
        let mut app = ScriptedApp::with_script(vec![Step::Ok, Step::Ok, Step::DeviceLost]);
        let err = FrameLoop::new().with_max_frames(Some(10)).run(&mut app).unwrap_err();

        match err {
            EngineError::Frame { frame, source } => {
                assert_eq!(frame, 2);
                assert!(matches!(source, AppError::Render(RenderError::DeviceLost { .. })));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(app.teardowns, 1);
        assert_eq!(app.frames, 3);
    }

    #[test]
    fn test_should_close_stops_loop() {
        let mut app = ScriptedApp {
            close_after: Some(2),
            ..Default::default()
        };
        let summary = FrameLoop::new().run(&mut app).unwrap();
        assert_eq!(summary.frames, 2);
    }

    #[test]
    fn test_setup_failure_is_reported() {
        let mut app = ScriptedApp {
            fail_setup: true,
            ..Default::default()
        };
        let err = FrameLoop::new().with_max_frames(Some(3)).run(&mut app).unwrap_err();

        assert!(matches!(err, EngineError::Setup(_)));
        assert_eq!(app.frames, 0);
        assert_eq!(app.teardowns, 1);
    }

    #[test]
    fn test_from_config_reads_frame_limit() {
        let config = EngineConfig {
            max_frames: Some(7),
            ..Default::default()
        };
        assert_eq!(FrameLoop::from_config(&config).max_frames(), Some(7));
    }
}
