//! Scene draw recording

use ash::vk;

use crate::render::backend::CommandDevice;
use crate::render::scene::render_order::{MaterialClassifier, NameTagClassifier, PartSelection, RenderBucket, RenderOrder};
use crate::render::scene::Scene;

/// Pipelines the scene is drawn with, one per bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenePipelines {
    /// Layout carrying the material push constant range
    pub layout: vk::PipelineLayout,
    /// Background (masked) parts
    pub background: vk::Pipeline,
    /// Opaque parts
    pub opaque: vk::Pipeline,
    /// Alpha-blended parts
    pub alpha_blended: vk::Pipeline,
    /// Line-fill pipeline, when the device supports it
    pub wireframe: Option<vk::Pipeline>,
}

impl ScenePipelines {
    fn for_bucket(&self, bucket: RenderBucket) -> vk::Pipeline {
        match bucket {
            RenderBucket::Background => self.background,
            RenderBucket::Opaque => self.opaque,
            RenderBucket::AlphaBlended => self.alpha_blended,
        }
    }
}

/// Records a scene's draws into a caller-provided command buffer
pub struct ScenePass {
    scene: Scene,
    pipelines: ScenePipelines,
    classifier: Box<dyn MaterialClassifier>,
    selection: PartSelection,
    wireframe: bool,
}

impl ScenePass {
    /// Draw every part, classified by [`NameTagClassifier`]
    pub fn new(scene: Scene, pipelines: ScenePipelines) -> Self {
        Self {
            scene,
            pipelines,
            classifier: Box::new(NameTagClassifier),
            selection: PartSelection::All,
            wireframe: false,
        }
    }

    /// Replace the material classifier
    pub fn with_classifier(mut self, classifier: Box<dyn MaterialClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Scene being drawn
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Current part selection
    pub fn selection(&self) -> PartSelection {
        self.selection
    }

    /// Draw all parts or a single one
    pub fn set_selection(&mut self, selection: PartSelection) {
        self.selection = selection;
    }

    /// Switch between the whole scene and the first part
    pub fn toggle_single_part(&mut self) {
        self.selection = match self.selection {
            PartSelection::All => PartSelection::Single(0),
            PartSelection::Single(_) => PartSelection::All,
        };
    }

    /// Step the single-part selection forward, wrapping to the first part
    pub fn select_next_part(&mut self) {
        if let PartSelection::Single(index) = self.selection {
            let next = if index + 1 < self.scene.parts().len() { index + 1 } else { 0 };
            self.selection = PartSelection::Single(next);
        }
    }

    /// Step the single-part selection back, wrapping to the last part
    pub fn select_previous_part(&mut self) {
        if let PartSelection::Single(index) = self.selection {
            let previous = match index {
                0 => self.scene.parts().len().saturating_sub(1),
                i => i - 1,
            };
            self.selection = PartSelection::Single(previous);
        }
    }

    /// Draw with the wireframe pipeline when one is available
    pub fn set_wireframe(&mut self, wireframe: bool) {
        if wireframe && self.pipelines.wireframe.is_none() {
            log::warn!("Wireframe requested but no line-fill pipeline is bound");
        }
        self.wireframe = wireframe;
    }

    /// Draw order for the current selection
    pub fn order(&self) -> RenderOrder {
        RenderOrder::build(&self.scene, self.classifier.as_ref(), self.selection)
    }

    /// Record the ordered draws into `buffer`, which must be inside a render pass
    ///
    /// Returns the number of draws recorded.
    pub fn record(&self, device: &dyn CommandDevice, buffer: vk::CommandBuffer) -> usize {
        let order = self.order();
        if order.is_empty() {
            return 0;
        }

        device.cmd_bind_vertex_buffer(buffer, self.scene.vertex_buffer());
        device.cmd_bind_index_buffer(buffer, self.scene.index_buffer());

        let wireframe = self.pipelines.wireframe.filter(|_| self.wireframe);
        for draw in order.draws() {
            let part = &self.scene.parts()[draw.part];
            let pipeline = wireframe.unwrap_or_else(|| self.pipelines.for_bucket(draw.bucket));
            device.cmd_bind_pipeline(buffer, pipeline);

            if let Some(material) = self.scene.material(part.material) {
                device.cmd_push_constants(
                    buffer,
                    self.pipelines.layout,
                    vk::ShaderStageFlags::FRAGMENT,
                    bytemuck::bytes_of(&material.properties),
                );
            }

            device.cmd_draw_indexed(buffer, part.index_count, part.index_base);
        }

        order.len()
    }
}
