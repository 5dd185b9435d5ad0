use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame constant block, bound once at the start of the frame for every
/// stage. Layout matches the shader-side struct: column-major matrices, then
/// two vec4-sized tail blocks.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub time: f32,
    pub near: f32,
    pub far: f32,
    pub delta_time: f32,
    pub frame_index: u32,
}

impl FrameConstants {
    pub fn new(
        view: Mat4,
        proj: Mat4,
        near: f32,
        far: f32,
        time: f32,
        delta_time: f32,
        frame_index: u32,
    ) -> Self {
        let view_proj = proj * view;
        Self {
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            view_proj: view_proj.to_cols_array_2d(),
            inverse_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_position: view.inverse().w_axis.truncate().to_array(),
            time,
            near,
            far,
            delta_time,
            frame_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn frame_constants_layout_is_288_bytes() {
        // 4 mat4 + 2 vec4-sized tails, no implicit padding
        assert_eq!(std::mem::size_of::<FrameConstants>(), 288);
    }

    #[test]
    fn camera_position_comes_from_the_inverse_view() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let constants = FrameConstants::new(view, proj, 0.1, 100.0, 0.0, 0.016, 0);
        assert!((Vec3::from_array(constants.camera_position) - eye).length() < 1e-4);
    }
}
