//! Sphere vs. view frustum test

use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Plane in Hessian normal form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the frustum
    pub normal: Vec3,
    /// Offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Build a plane from `(a, b, c, d)` coefficients, normalizing by `|(a, b, c)|`
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = Vec3::new(coefficients.x, coefficients.y, coefficients.z);
        let length = normal.norm().max(f32::EPSILON);

        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Signed distance from `point` to the plane (positive = inside)
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

impl Default for Plane {
    /// A plane every point is infinitely far inside of
    fn default() -> Self {
        Self {
            normal: Vec3::zeros(),
            distance: f32::INFINITY,
        }
    }
}

/// Six planes bounding the visible volume
///
/// Order: left, right, bottom, top, near, far. A default frustum has never seen a
/// matrix and accepts everything.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of a combined `projection * view` matrix
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let mut frustum = Self::default();
        frustum.update(view_projection);
        frustum
    }

    /// Replace the planes with those of `view_projection`
    ///
    /// Clip space depth is `[0, 1]`, so the near plane is row 2 on its own rather
    /// than `row3 + row2`.
    pub fn update(&mut self, view_projection: &Mat4) {
        let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        self.planes = [
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r2),
            Plane::from_coefficients(r3 - r2),
        ];
    }

    /// Whether a sphere at `center` with `radius` is at least partly inside
    ///
    /// Rejects only when the sphere lies entirely behind one of the planes, so
    /// spheres straddling a corner are kept.
    pub fn check_sphere(&self, center: &Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// The six planes in left, right, bottom, top, near, far order
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }
}
