//! # Demo Configuration
//!
//! All tunables for the chrome demo in one serializable tree:
//!
//! - **Engine**: log filter and frame limit for the frame loop
//! - **Renderer**: fence polling, device-lost threshold, sample count, viewport
//! - **Scene**: worker thread count, object budget and the grid the objects are laid out on
//!
//! Defaults match the chrome demo: 1024 objects on a 32-wide grid spaced two
//! units apart, ten units in front of the camera, fences polled every 100 ms.

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// Core engine behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `env_logger` filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Stop the frame loop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_frames: None,
        }
    }
}

/// Renderer and synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Whether to enable Vulkan validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
    /// MSAA sample count of the color target
    pub sample_count: u32,
    /// Timeout handed to a single fence wait, in nanoseconds
    pub fence_timeout_ns: u64,
    /// Accumulated fence waiting after which the device is considered lost
    pub device_lost_threshold_ns: u64,
    /// Viewport size used by headless runs
    pub viewport: (u32, u32),
}

impl RendererConfig {
    /// Resolve the validation setting against the build profile
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Chrome Demo".to_string(),
            enable_validation: None,
            sample_count: 8,
            fence_timeout_ns: 100_000_000,
            device_lost_threshold_ns: 10_000_000_000,
            viewport: (1280, 720),
        }
    }
}

/// Grid the render objects are laid out on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    /// Objects per row before wrapping to the next one
    pub columns: u32,
    /// Grid cell of the first object, in cell units
    pub origin: (f32, f32),
    /// World-space distance between neighbouring cells
    pub spacing: (f32, f32),
    /// Z coordinate shared by every object
    pub depth: f32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            columns: 32,
            origin: (-16.0, -16.0),
            spacing: (2.0, 2.0),
            depth: -10.0,
        }
    }
}

/// Scene population and thread distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Worker thread count (`None` = available hardware concurrency)
    pub worker_threads: Option<usize>,
    /// Objects shared evenly across the workers
    pub total_objects: usize,
    /// Explicit per-thread object counts; overrides both fields above
    pub thread_object_counts: Option<Vec<usize>>,
    /// Object placement
    pub grid: GridLayout,
    /// Initial rotation of every object, in degrees per axis
    pub object_rotation: (f32, f32, f32),
    /// Rotation about Y in degrees per second
    pub rotation_speed: f32,
    /// Seed for the per-object colors (`None` = entropy)
    pub color_seed: Option<u64>,
}

impl SceneConfig {
    /// Resolve the number of objects each worker thread owns
    ///
    /// The even split truncates (`total / threads`), so a few
    /// objects may be dropped when the total does not divide evenly.
    pub fn object_counts(&self) -> Vec<usize> {
        if let Some(counts) = &self.thread_object_counts {
            return counts.clone();
        }

        let threads = self.resolved_worker_threads();
        vec![self.total_objects / threads; threads]
    }

    /// Worker thread count after applying the hardware default
    pub fn resolved_worker_threads(&self) -> usize {
        if let Some(counts) = &self.thread_object_counts {
            return counts.len().max(1);
        }

        self.worker_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
            .max(1)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            total_objects: 1024,
            thread_object_counts: None,
            grid: GridLayout::default(),
            object_rotation: (-90.0, 0.0, 0.0),
            rotation_speed: 0.0,
            color_seed: None,
        }
    }
}

/// # Complete Demo Configuration
///
/// Top-level configuration the demo binary loads from TOML or RON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Renderer configuration
    pub renderer: RendererConfig,
    /// Scene configuration
    pub scene: SceneConfig,
}

impl DemoConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }

        if self.renderer.fence_timeout_ns == 0 {
            return Err(ConfigError::Invalid("fence timeout must be non-zero".to_string()));
        }

        if self.renderer.device_lost_threshold_ns < self.renderer.fence_timeout_ns {
            return Err(ConfigError::Invalid(
                "device lost threshold must be at least one fence timeout".to_string(),
            ));
        }

        if self.scene.worker_threads == Some(0) {
            return Err(ConfigError::Invalid("at least one worker thread is required".to_string()));
        }

        if matches!(&self.scene.thread_object_counts, Some(counts) if counts.is_empty()) {
            return Err(ConfigError::Invalid("thread object counts cannot be empty".to_string()));
        }

        if self.scene.grid.columns == 0 {
            return Err(ConfigError::Invalid("grid needs at least one column".to_string()));
        }

        let (width, height) = self.renderer.viewport;
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid("viewport must have a non-zero size".to_string()));
        }

        Ok(())
    }
}

impl Config for DemoConfig {}
