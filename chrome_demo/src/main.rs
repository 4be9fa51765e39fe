//! Chrome demo
//!
//! Runs the multi-threaded frame pipeline against the headless backend and logs
//! per-frame statistics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk::{self, Handle};
use chrome_engine::foundation::logging;
use chrome_engine::prelude::*;
use chrome_engine::render::headless::{HeadlessDevice, HeadlessSwapchain};
use chrome_engine::render::scene::{MaterialProperties, Scene, SceneMaterial, ScenePart, ScenePass, ScenePipelines};
use clap::{Arg, ArgAction, Command};

/// Frames run when neither the config nor the command line sets a limit
const DEFAULT_FRAMES: u64 = 240;

/// Log a summary line every this many frames
const REPORT_INTERVAL: u64 = 60;

/// Stand-in for the loaded backdrop scene: (material name, index count)
const BACKDROP_PARTS: [(&str, u32); 4] = [
    ("ground", 600),
    ("sky_mask", 240),
    ("pillars", 1800),
    ("glass_alpha", 96),
];

fn backdrop_scene() -> ScenePass {
    let mut materials = Vec::with_capacity(BACKDROP_PARTS.len());
    let mut parts = Vec::with_capacity(BACKDROP_PARTS.len());
    let mut index_base = 0;

    for (material, (name, index_count)) in BACKDROP_PARTS.iter().enumerate() {
        materials.push(SceneMaterial {
            name: (*name).to_string(),
            properties: MaterialProperties::default(),
        });
        parts.push(ScenePart {
            index_base,
            index_count: *index_count,
            material,
        });
        index_base += index_count;
    }

    let scene = Scene::new(materials, parts, vk::Buffer::from_raw(0xE0), vk::Buffer::from_raw(0xE1));
    ScenePass::new(
        scene,
        ScenePipelines {
            layout: vk::PipelineLayout::from_raw(0xE2),
            background: vk::Pipeline::from_raw(0xE3),
            opaque: vk::Pipeline::from_raw(0xE4),
            alpha_blended: vk::Pipeline::from_raw(0xE5),
            wireframe: None,
        },
    )
}

/// Frame assembler plus the swapchain handle it renders into
struct ChromeDemo {
    assembler: FrameAssembler,
    swapchain: HeadlessSwapchain,
    extent: vk::Extent2D,
}

impl ChromeDemo {
    fn new(config: DemoConfig) -> Self {
        let (width, height) = config.renderer.viewport;
        let extent = vk::Extent2D { width, height };
        let swapchain = HeadlessSwapchain::new(extent, 3);
        let device = Arc::new(HeadlessDevice::new());

        let pipeline = PipelineBindings {
            pipeline: vk::Pipeline::from_raw(0xC0),
            layout: vk::PipelineLayout::from_raw(0xC1),
        };
        // Stand-in for the loaded chrome sphere
        let mesh = MeshBinding {
            vertex_buffer: vk::Buffer::from_raw(0xD0),
            index_buffer: vk::Buffer::from_raw(0xD1),
            index_count: 2880,
            bounding_dim: 2.0,
        };

        let assembler = FrameAssembler::new(config, device, Box::new(swapchain.clone()), pipeline, Some(mesh))
            .with_scene(backdrop_scene());

        Self {
            assembler,
            swapchain,
            extent,
        }
    }
}

impl Application for ChromeDemo {
    fn setup(&mut self) -> Result<(), AppError> {
        self.assembler.setup()
    }

    fn per_frame_update(&mut self, delta_time: f32) -> Result<(), AppError> {
        self.assembler.per_frame_update(delta_time)?;

        if let Some(report) = self.assembler.last_report() {
            if report.frame_index % REPORT_INTERVAL == 0 {
                log::info!(
                    "Frame {}: {} visible, {} culled, {} scene draws, {:.1} ms",
                    report.frame_index,
                    report.visible,
                    report.culled,
                    report.scene_draws,
                    delta_time * 1000.0
                );
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        let stats = self.assembler.stats();
        log::info!(
            "Rendered {} frames, {:.1} objects visible on average, {} fence retries",
            stats.frames,
            stats.average_visible(),
            stats.fence_retries
        );
        self.assembler.teardown();
    }

    fn on_swapchain_invalidated(&mut self) -> Result<(), AppError> {
        self.assembler.on_swapchain_invalidated()?;
        self.swapchain.rebuild(self.extent);
        Ok(())
    }
}

fn main() -> Result<()> {
    let matches = Command::new("chrome_demo")
        .about("Multi-threaded secondary command buffer recording demo")
        .version(clap::crate_version!())
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (.toml or .ron)"),
        )
        .arg(
            Arg::new("frames")
                .short('f')
                .long("frames")
                .value_name("COUNT")
                .help("Number of frames to render")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("COUNT")
                .help("Worker thread count (default: available cores)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("FILTER")
                .help("Log filter used when RUST_LOG is not set"),
        )
        .arg(
            Arg::new("write-config")
                .long("write-config")
                .value_name("FILE")
                .help("Write the effective configuration to FILE and exit")
                .action(ArgAction::Set),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => DemoConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => DemoConfig::default(),
    };

    if let Some(frames) = matches.get_one::<u64>("frames") {
        config.engine.max_frames = Some(*frames);
    }
    if let Some(threads) = matches.get_one::<usize>("threads") {
        config.scene.worker_threads = Some(*threads);
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.engine.log_level = level.clone();
    }
    if config.engine.max_frames.is_none() {
        config.engine.max_frames = Some(DEFAULT_FRAMES);
    }

    config.validate().context("Invalid configuration")?;

    if let Some(path) = matches.get_one::<String>("write-config") {
        let path = PathBuf::from(path);
        config
            .save_to_file(&path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    logging::init_with_level(&config.engine.log_level);
    log::info!(
        "{}: {} objects on {} worker threads",
        config.renderer.application_name,
        config.scene.object_counts().iter().sum::<usize>(),
        config.scene.resolved_worker_threads()
    );

    let mut frame_loop = FrameLoop::from_config(&config.engine);
    let mut demo = ChromeDemo::new(config);
    let summary = frame_loop.run(&mut demo).context("Frame loop failed")?;

    log::info!(
        "Done: {} frames ({} recovered) in {:.2}s",
        summary.frames,
        summary.recovered,
        summary.total_time
    );
    Ok(())
}
