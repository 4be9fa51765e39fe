//! Multi-part scene rendering
//!
//! A scene is one vertex buffer and one index buffer shared by many parts, each a
//! contiguous index range with its own material. Loading the scene happens
//! elsewhere; this module only decides the order parts are drawn in and records
//! the draws.

pub mod render_order;
pub mod scene_pass;

use ash::vk;
use bytemuck::{Pod, Zeroable};

pub use render_order::{MaterialClassifier, NameTagClassifier, OrderedDraw, PartSelection, RenderBucket, RenderOrder};
pub use scene_pass::{ScenePass, ScenePipelines};

/// Material constants pushed to the fragment stage
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialProperties {
    /// Ambient color
    pub ambient: [f32; 4],
    /// Diffuse color
    pub diffuse: [f32; 4],
    /// Specular color
    pub specular: [f32; 4],
    /// Opacity in `[0, 1]`
    pub opacity: f32,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            ambient: [0.1, 0.1, 0.1, 1.0],
            diffuse: [1.0, 1.0, 1.0, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            opacity: 1.0,
        }
    }
}

/// Named material
#[derive(Debug, Clone, PartialEq)]
pub struct SceneMaterial {
    /// Name as authored; drives bucket classification
    pub name: String,
    /// Constants pushed when drawing with this material
    pub properties: MaterialProperties,
}

/// Contiguous index range drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenePart {
    /// First index in the shared index buffer
    pub index_base: u32,
    /// Number of indices
    pub index_count: u32,
    /// Index into the scene's materials
    pub material: usize,
}

/// Loaded scene geometry and materials
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    materials: Vec<SceneMaterial>,
    parts: Vec<ScenePart>,
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
}

impl Scene {
    /// Wrap already-uploaded geometry
    pub fn new(
        materials: Vec<SceneMaterial>,
        parts: Vec<ScenePart>,
        vertex_buffer: vk::Buffer,
        index_buffer: vk::Buffer,
    ) -> Self {
        Self {
            materials,
            parts,
            vertex_buffer,
            index_buffer,
        }
    }

    /// Parts in authored order
    pub fn parts(&self) -> &[ScenePart] {
        &self.parts
    }

    /// Material by index
    pub fn material(&self, index: usize) -> Option<&SceneMaterial> {
        self.materials.get(index)
    }

    /// Shared vertex buffer
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer
    }

    /// Shared 32-bit index buffer
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer
    }
}
