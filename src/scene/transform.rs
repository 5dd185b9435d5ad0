use glam::{Mat4, Quat, Vec3};

/// TRS placement for scene entities. Lights aim along the transform's local
/// -Z axis, the same convention the camera uses.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    /// Places the entity at `position` with its -Z axis aimed at `target`.
    /// Convenience for directing spot and directional lights.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let forward = (target - position).try_normalize().unwrap_or(Vec3::NEG_Z);
        Self {
            translation: position,
            rotation: Quat::from_rotation_arc(Vec3::NEG_Z, forward),
            scale: Vec3::ONE,
        }
    }

    /// World-space direction of the local -Z axis.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let m = Transform::default().matrix();
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn looking_at_aims_forward_at_the_target() {
        let t = Transform::looking_at(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO);
        assert!(t.forward().abs_diff_eq(Vec3::NEG_Y, 1e-6));

        // degenerate target-at-position keeps the default facing
        let t = Transform::looking_at(Vec3::ONE, Vec3::ONE);
        assert!(t.forward().abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn matrix_applies_scale_before_translation() {
        let t = Transform::from_trs(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::splat(2.0));
        let p = t.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }
}
