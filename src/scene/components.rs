//! Light components. A light entity without a [`TransformComponent`] sits at
//! the world origin (or shines down -Z for directionals).

use glam::Vec3;

use super::transform::Transform;

#[derive(Clone, Copy, Debug, Default)]
pub struct TransformComponent(pub Transform);

/// Infinite light. Direction comes from the entity transform's -Z axis.
#[derive(Clone, Copy, Debug)]
pub struct DirectionalLight {
    pub radiance: Vec3,
}

#[derive(Clone, Copy, Debug)]
pub struct PointLight {
    pub radiance: Vec3,
    /// World-space influence radius. Non-positive disables the light.
    pub range: f32,
}

/// Cone light. Aims along the entity transform's -Z axis. Angles are half
/// angles in radians, inner <= outer expected (the GPU layout tolerates
/// reversed angles by swapping).
#[derive(Clone, Copy, Debug)]
pub struct SpotLight {
    pub radiance: Vec3,
    pub range: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub falloff: f32,
}
