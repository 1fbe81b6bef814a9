use glam::{Mat4, Quat, Vec3};

/// Translation, rotation and scale composed as `T * R * S`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_trs(t: Vec3, r: Quat, s: Vec3) -> Self {
        Self {
            translation: t,
            rotation: r,
            scale: s,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_uniform_scale(self, scale: f32) -> Self {
        self.with_scale(Vec3::splat(scale))
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
    fn scale_applies_before_rotation_and_translation() {
        let tr = Transform::from_trs(
            Vec3::new(0.0, 1.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::splat(2.0),
        );
        // (1,0,0) scaled to (2,0,0), turned to (0,2,0), lifted to (0,3,0)
        let p = tr.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), 1e-5));
    }

    #[test]
    fn builder_matches_explicit_composition() {
        let rotation = Quat::from_rotation_y(0.5);
        let built = Transform::from_translation(Vec3::new(0.0, 1.5, 0.0))
            .with_rotation(rotation)
            .with_uniform_scale(0.5)
            .matrix();
        let explicit = Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0))
            * Mat4::from_quat(rotation)
            * Mat4::from_scale(Vec3::splat(0.5));
        assert!(built.abs_diff_eq(explicit, 1e-5));
    }
}
