//! Shared fixtures for the headless integration tests

#![allow(dead_code)]

use std::sync::Arc;

use ash::vk::{self, Handle};
use chrome_engine::core::DemoConfig;
use chrome_engine::foundation::math::Mat4;
use chrome_engine::render::headless::{HeadlessDevice, HeadlessSwapchain};
use chrome_engine::render::scene::{MaterialProperties, Scene, SceneMaterial, ScenePart, ScenePass, ScenePipelines};
use chrome_engine::render::{CameraAnimation, FrameAssembler, MeshBinding, PipelineBindings};

/// Extent of the headless swapchain
pub const EXTENT: vk::Extent2D = vk::Extent2D { width: 64, height: 64 };

/// Config placing every object on an 8-wide grid well inside the fixed camera's view
pub fn config(counts: Vec<usize>) -> DemoConfig {
    let mut config = DemoConfig::default();
    config.scene.thread_object_counts = Some(counts);
    config.scene.color_seed = Some(7);
    config.scene.grid.columns = 8;
    config.scene.grid.origin = (-2.0, -2.0);
    config.scene.grid.spacing = (0.5, 0.5);
    config
}

/// Mesh with a unit bounding dimension
pub fn mesh() -> MeshBinding {
    MeshBinding {
        vertex_buffer: vk::Buffer::from_raw(0xB0),
        index_buffer: vk::Buffer::from_raw(0xB1),
        index_count: 36,
        bounding_dim: 1.0,
    }
}

/// Pipeline tokens
pub fn pipeline() -> PipelineBindings {
    PipelineBindings {
        pipeline: vk::Pipeline::from_raw(0xA0),
        layout: vk::PipelineLayout::from_raw(0xA1),
    }
}

/// Scene pipelines: background 0xE0, opaque 0xE1, blended 0xE2
pub fn scene_pipelines() -> ScenePipelines {
    ScenePipelines {
        layout: vk::PipelineLayout::from_raw(0xE9),
        background: vk::Pipeline::from_raw(0xE0),
        opaque: vk::Pipeline::from_raw(0xE1),
        alpha_blended: vk::Pipeline::from_raw(0xE2),
        wireframe: None,
    }
}

/// Four-part scene, one part per material, parts laid out back to back
pub fn scene() -> Scene {
    let names = ["floor", "window_alpha", "sky_mask", "alpha_trim"];
    let materials = names
        .iter()
        .map(|name| SceneMaterial {
            name: (*name).to_string(),
            properties: MaterialProperties::default(),
        })
        .collect();
    let parts = (0..names.len())
        .map(|i| ScenePart {
            index_base: 12 * i as u32,
            index_count: 12,
            material: i,
        })
        .collect();
    Scene::new(materials, parts, vk::Buffer::from_raw(0xF0), vk::Buffer::from_raw(0xF1))
}

/// Headless assembler looking down -Z from the origin
pub struct Rig {
    pub assembler: FrameAssembler,
    pub device: Arc<HeadlessDevice>,
    pub swapchain: HeadlessSwapchain,
}

impl Rig {
    pub fn new(config: DemoConfig, mesh: Option<MeshBinding>) -> Self {
        Self::with_device(config, mesh, HeadlessDevice::new())
    }

    pub fn with_device(config: DemoConfig, mesh: Option<MeshBinding>, device: HeadlessDevice) -> Self {
        let device = Arc::new(device);
        let swapchain = HeadlessSwapchain::new(EXTENT, 3);
        let assembler = FrameAssembler::new(
            config,
            device.clone(),
            Box::new(swapchain.clone()),
            pipeline(),
            mesh,
        )
        .with_camera(CameraAnimation::fixed(Mat4::identity(), 100.0));

        Self {
            assembler,
            device,
            swapchain,
        }
    }

    pub fn with_scene(config: DemoConfig, mesh: Option<MeshBinding>, scene: ScenePass) -> Self {
        let Self {
            assembler,
            device,
            swapchain,
        } = Self::new(config, mesh);

        Self {
            assembler: assembler.with_scene(scene),
            device,
            swapchain,
        }
    }
}
