//! Draw ordering for multi-part scenes
//!
//! Parts are split into three buckets and drawn background first, then opaque,
//! then alpha-blended, so blended surfaces composite over everything behind them.
//! Within a bucket the scene's own part order is kept.

use serde::{Deserialize, Serialize};

use crate::render::scene::Scene;

/// Bucket a part is drawn in, declared in draw order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RenderBucket {
    /// Backdrop and masked geometry
    Background,
    /// Solid geometry
    Opaque,
    /// Blended geometry, drawn last
    AlphaBlended,
}

impl RenderBucket {
    /// Buckets in draw order
    pub const ORDER: [Self; 3] = [Self::Background, Self::Opaque, Self::AlphaBlended];
}

/// Decides which bucket a material's parts are drawn in
pub trait MaterialClassifier: Send + Sync {
    /// Classify a material by name
    fn classify(&self, material_name: &str) -> RenderBucket;
}

/// Classifies by tags embedded in the material name
///
/// A name containing `alpha` is blended, otherwise one containing `mask` is
/// background, otherwise opaque. A tag only counts when it is not at the very start
/// of the name, so `alpha_glass` is opaque while `glass_alpha` is blended.
///
/// [`ScenePass`](super::ScenePass) picks the pipeline from the bucket, so the same rule
/// decides both. A leading tag selects neither the blending pipeline nor the late
/// bucket, even though some scene exporters treat any occurrence as blended. Supply
/// another [`MaterialClassifier`] for such assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameTagClassifier;

impl NameTagClassifier {
    fn has_tag(name: &str, tag: &str) -> bool {
        matches!(name.find(tag), Some(position) if position > 0)
    }
}

impl MaterialClassifier for NameTagClassifier {
    fn classify(&self, material_name: &str) -> RenderBucket {
        if Self::has_tag(material_name, "alpha") {
            RenderBucket::AlphaBlended
        } else if Self::has_tag(material_name, "mask") {
            RenderBucket::Background
        } else {
            RenderBucket::Opaque
        }
    }
}

/// Which parts of the scene are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartSelection {
    /// Every part
    #[default]
    All,
    /// Only the part at this index; out of range draws nothing
    Single(usize),
}

/// One draw in the final order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedDraw {
    /// Index of the part in the scene
    pub part: usize,
    /// Bucket it was classified into
    pub bucket: RenderBucket,
}

/// Ordered list of part draws
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderOrder {
    draws: Vec<OrderedDraw>,
}

impl RenderOrder {
    /// Classify every selected part of `scene` and order the draws
    pub fn build(scene: &Scene, classifier: &dyn MaterialClassifier, selection: PartSelection) -> Self {
        let mut buckets: [Vec<OrderedDraw>; 3] = Default::default();

        for (part, scene_part) in scene.parts().iter().enumerate() {
            if let PartSelection::Single(selected) = selection {
                if part != selected {
                    continue;
                }
            }

            let bucket = match scene.material(scene_part.material) {
                Some(material) => classifier.classify(&material.name),
                None => {
                    log::warn!("Scene part {} references missing material {}", part, scene_part.material);
                    RenderBucket::Opaque
                }
            };

            buckets[bucket as usize].push(OrderedDraw { part, bucket });
        }

        Self {
            draws: buckets.into_iter().flatten().collect(),
        }
    }

    /// Draws in submission order
    pub fn draws(&self) -> &[OrderedDraw] {
        &self.draws
    }

    /// Part indices in submission order
    pub fn parts(&self) -> Vec<usize> {
        self.draws.iter().map(|d| d.part).collect()
    }

    /// Number of draws
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    /// Whether nothing is drawn
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::scene::{MaterialProperties, SceneMaterial, ScenePart};
    use ash::vk;

    fn scene(names: &[&str]) -> Scene {
        let materials = names
            .iter()
            .map(|name| SceneMaterial {
                name: (*name).to_string(),
                properties: MaterialProperties::default(),
            })
            .collect();
        let parts = (0..names.len())
            .map(|i| ScenePart {
                index_base: i as u32 * 6,
                index_count: 6,
                material: i,
            })
            .collect();

        Scene::new(materials, parts, vk::Buffer::null(), vk::Buffer::null())
    }

    #[test]
    fn test_name_tags() {
        let classifier = NameTagClassifier;
        assert_eq!(classifier.classify("glass_alpha"), RenderBucket::AlphaBlended);
        assert_eq!(classifier.classify("sky_mask"), RenderBucket::Background);
        assert_eq!(classifier.classify("chrome"), RenderBucket::Opaque);
        assert_eq!(classifier.classify("leaf_mask_alpha"), RenderBucket::AlphaBlended);
    }

    #[test]
    fn test_tag_at_start_does_not_count() {
        let classifier = NameTagClassifier;
        assert_eq!(classifier.classify("alpha_glass"), RenderBucket::Opaque);
        assert_eq!(classifier.classify("mask"), RenderBucket::Opaque);
    }

    #[test]
    fn test_buckets_ordered_and_stable() {
        let scene = scene(&["floor", "glass_alpha", "sky_mask", "wall", "water_alpha", "hills_mask"]);
        let order = RenderOrder::build(&scene, &NameTagClassifier, PartSelection::All);

        assert_eq!(order.parts(), vec![2, 5, 0, 3, 1, 4]);
        assert_eq!(order.draws()[0].bucket, RenderBucket::Background);
        assert_eq!(order.draws()[5].bucket, RenderBucket::AlphaBlended);
    }

    #[test]
    fn test_single_part_selection() {
        let scene = scene(&["floor", "glass_alpha", "sky_mask"]);

        let order = RenderOrder::build(&scene, &NameTagClassifier, PartSelection::Single(1));
        assert_eq!(order.parts(), vec![1]);

        let order = RenderOrder::build(&scene, &NameTagClassifier, PartSelection::Single(3));
        assert!(order.is_empty());
    }

    #[test]
    fn test_classifier_is_replaceable() {
        struct EverythingBlended;
        impl MaterialClassifier for EverythingBlended {
            fn classify(&self, _material_name: &str) -> RenderBucket {
                RenderBucket::AlphaBlended
            }
        }

        let scene = scene(&["floor", "sky_mask"]);
        let order = RenderOrder::build(&scene, &EverythingBlended, PartSelection::All);

        assert_eq!(order.parts(), vec![0, 1]);
        assert!(order.draws().iter().all(|d| d.bucket == RenderBucket::AlphaBlended));
    }
}
