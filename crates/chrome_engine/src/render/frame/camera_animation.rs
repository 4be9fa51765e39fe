//! Staged zoom and orbit camera
//!
//! The camera cycles through four stages, each pulling the camera back a little and
//! pushing the far plane out, while slowly spinning about the grid's Z axis.

use crate::foundation::math::{utils::deg_to_rad, Mat4, Mat4Ext, Vec3};

/// Vertical field of view in degrees
pub const FIELD_OF_VIEW: f32 = 60.0;
/// Near clip distance
pub const NEAR_CLIP: f32 = 0.1;

const STAGE_STEP: f32 = 0.001;
const STAGE_LIMIT: f32 = 4.0;
const ZOOM_STEP: f32 = 0.01;
const ROTATION_STEP: f32 = 0.01;

/// Target zoom and far clip of each stage
const STAGES: [(f32, f32); 4] = [(0.0, 10.0), (-1.0, 15.0), (-2.0, 20.0), (-3.0, 25.0)];

/// Projection and view for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    /// Perspective projection
    pub projection: Mat4,
    /// World to view transform
    pub view: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CameraMode {
    Animated,
    Fixed { view: Mat4, far_clip: f32 },
}

/// Camera state advanced once per frame
#[derive(Debug, Clone, PartialEq)]
pub struct CameraAnimation {
    stage_count: f32,
    target_zoom: f32,
    far_clip: f32,
    zoom: f32,
    rotation_z: f32,
    mode: CameraMode,
}

impl Default for CameraAnimation {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraAnimation {
    /// Animated camera at stage 0
    pub fn new() -> Self {
        Self {
            stage_count: 0.0,
            target_zoom: STAGES[0].0,
            far_clip: STAGES[0].1,
            zoom: 0.0,
            rotation_z: 0.0,
            mode: CameraMode::Animated,
        }
    }

    /// Camera that never moves: `view` is used as-is with the given far clip
    pub fn fixed(view: Mat4, far_clip: f32) -> Self {
        Self {
            far_clip,
            mode: CameraMode::Fixed { view, far_clip },
            ..Self::new()
        }
    }

    /// Current stage counter
    pub fn stage_count(&self) -> f32 {
        self.stage_count
    }

    /// Current zoom offset
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Current far clip distance
    pub fn far_clip(&self) -> f32 {
        self.far_clip
    }

    /// Current spin about Z, in degrees
    pub fn rotation(&self) -> f32 {
        self.rotation_z
    }

    /// Step the animation one frame and build the matrices for `aspect`
    pub fn advance(&mut self, aspect: f32) -> CameraMatrices {
        if let CameraMode::Fixed { view, far_clip } = self.mode {
            return CameraMatrices {
                projection: Self::projection(aspect, far_clip),
                view,
            };
        }

        self.stage_count += STAGE_STEP;
        // Stage is taken before wrapping; the overflow frame keeps the last target
        if let Some(&(zoom, far_clip)) = STAGES.get(self.stage_count as usize) {
            self.target_zoom = zoom;
            self.far_clip = far_clip;
        }
        if self.stage_count > STAGE_LIMIT {
            self.stage_count = 0.0;
        }

        self.rotation_z += ROTATION_STEP;

        if (self.target_zoom - self.zoom).abs() > ZOOM_STEP {
            if self.target_zoom < self.zoom {
                self.zoom -= ZOOM_STEP;
            } else {
                self.zoom += ZOOM_STEP;
            }
        }

        CameraMatrices {
            projection: Self::projection(aspect, self.far_clip),
            view: self.view(),
        }
    }

    fn projection(aspect: f32, far_clip: f32) -> Mat4 {
        Mat4::perspective_rh_zo(deg_to_rad(FIELD_OF_VIEW), aspect, NEAR_CLIP, far_clip)
    }

    fn view(&self) -> Mat4 {
        let tilt = 75.0 + self.zoom * 5.0;

        Mat4::translation(Vec3::new(0.0, -10.0 - self.zoom, self.zoom))
            * Mat4::rotation_x(deg_to_rad(tilt))
            * Mat4::rotation_y(0.0)
            * Mat4::rotation_z(deg_to_rad(self.rotation_z))
    }
}
