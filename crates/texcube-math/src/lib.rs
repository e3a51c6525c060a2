// SPDX-License-Identifier: CEPL-1.0
//! Camera and model transforms for the spinning cube.
//!
//! Produces the composed projection × view × model matrix the renderer
//! copies into its uniform block once per frame.

use glam::{Mat4, Vec3};

pub use glam;

pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 100.0;
pub const EYE: Vec3 = Vec3::new(0.0, 3.0, 5.0);

#[derive(Clone, Copy, Debug)]
pub struct CubeCamera {
    projection: Mat4,
    view: Mat4,
}

impl CubeCamera {
    pub fn new(aspect: f32) -> Self {
        CubeCamera {
            projection: vulkan_perspective(aspect),
            view: Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Y),
        }
    }

    /// Aspect from a pixel size; degenerate sizes fall back to square.
    pub fn for_extent(width: u32, height: u32) -> Self {
        let aspect = if width == 0 || height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        };
        Self::new(aspect)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Spin about +Y by `angle_degrees`.
    pub fn model(angle_degrees: f32) -> Mat4 {
        Mat4::from_rotation_y(angle_degrees.to_radians())
    }

    pub fn mvp(&self, angle_degrees: f32) -> Mat4 {
        self.view_projection() * Self::model(angle_degrees)
    }

    /// Column-major, the layout GLSL `mat4` expects in a std140 block.
    pub fn mvp_columns(&self, angle_degrees: f32) -> [[f32; 4]; 4] {
        self.mvp(angle_degrees).to_cols_array_2d()
    }
}

impl Default for CubeCamera {
    fn default() -> Self {
        Self::new(1.0)
    }
}

// Vulkan clip space has +Y down and depth in [0, 1].
fn vulkan_perspective(aspect: f32) -> Mat4 {
    let mut p = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
    p.y_axis.y *= -1.0;
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn origin_projects_to_screen_centre_inside_depth_range() {
        let cam = CubeCamera::default();
        let clip = cam.mvp(0.0) * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn full_turn_is_identity_model() {
        let cam = CubeCamera::default();
        assert!(cam.mvp(360.0).abs_diff_eq(cam.mvp(0.0), 1e-4));
    }

    #[test]
    fn up_is_negative_y_in_clip_space() {
        let cam = CubeCamera::default();
        let clip = cam.view_projection() * Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn degenerate_extent_falls_back_to_square() {
        let a = CubeCamera::for_extent(0, 600).mvp(10.0);
        let b = CubeCamera::new(1.0).mvp(10.0);
        assert!(a.abs_diff_eq(b, 1e-6));
    }

    #[test]
    fn columns_round_trip() {
        let cam = CubeCamera::for_extent(800, 600);
        let cols = cam.mvp_columns(22.5);
        assert_eq!(Mat4::from_cols_array_2d(&cols), cam.mvp(22.5));
    }
}
