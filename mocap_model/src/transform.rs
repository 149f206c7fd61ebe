use std::ops::Mul;

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::error::DegenerateTransformError;

/// Basis vectors shorter than this are treated as collapsed.
pub const SCALE_EPSILON: f32 = 1e-6;

/// Matrices with a determinant smaller than this in magnitude are not inverted.
pub const DETERMINANT_EPSILON: f32 = 1e-8;

/// A decomposed transform as scale -> rotation -> translation (TRS).
///
/// Scale does not affect translation when multiplying [Transform].
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq)]
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

    pub fn to_matrix(self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scale)
    }

    /// Split `value` into translation, rotation and scale.
    ///
    /// The translation is the last column and the scale is the length of each basis column.
    /// The rotation is the basis with each column normalized.
    /// Mirrored matrices store the reflection as a negative x scale.
    ///
    /// Returns an error instead of dividing by a collapsed basis vector.
    pub fn decompose(value: Mat4) -> Result<Self, DegenerateTransformError> {
        let translation = value.w_axis.truncate();

        let columns = [
            value.x_axis.truncate(),
            value.y_axis.truncate(),
            value.z_axis.truncate(),
        ];

        let mut scale = Vec3::ZERO;
        for (axis, column) in columns.iter().enumerate() {
            let length = column.length();
            if !length.is_finite() || length < SCALE_EPSILON {
                return Err(DegenerateTransformError::ZeroScale { axis });
            }
            scale[axis] = length;
        }

        if Mat3::from_cols(columns[0], columns[1], columns[2]).determinant() < 0.0 {
            scale.x = -scale.x;
        }

        let basis = Mat3::from_cols(
            columns[0] / scale.x,
            columns[1] / scale.y,
            columns[2] / scale.z,
        );
        let rotation = Quat::from_mat3(&basis).normalize();

        Ok(Self {
            translation,
            rotation,
            scale,
        })
    }

    /// Interpolate translation and scale linearly and rotation along the shorter arc.
    pub fn lerp(self, rhs: Self, factor: f32) -> Self {
        Self {
            translation: self.translation.lerp(rhs.translation, factor),
            rotation: slerp(self.rotation, rhs.rotation, factor),
            scale: self.scale.lerp(rhs.scale, factor),
        }
    }
}

impl Mul<Transform> for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Self::Output {
        Transform {
            translation: self.rotation.mul_vec3(rhs.translation) + self.translation,
            rotation: self.rotation * rhs.rotation,
            scale: self.scale * rhs.scale,
        }
    }
}

/// Spherical interpolation that always takes the shorter path between `a` and `b`.
pub fn slerp(a: Quat, b: Quat, factor: f32) -> Quat {
    // q and -q are the same rotation.
    let b = if a.dot(b) < 0.0 { -b } else { b };
    a.slerp(b, factor).normalize()
}

/// Invert `value` or report that it has no inverse.
pub fn try_inverse(value: Mat4) -> Result<Mat4, DegenerateTransformError> {
    let determinant = value.determinant();
    if !determinant.is_finite() || determinant.abs() < DETERMINANT_EPSILON {
        Err(DegenerateTransformError::NonInvertible { determinant })
    } else {
        Ok(value.inverse())
    }
}

/// A rotation of `radians` about `axis`. The axis does not need to be normalized.
pub fn from_axis_angle(axis: Vec3, radians: f32) -> Mat4 {
    Mat4::from_axis_angle(axis.normalize_or(Vec3::Y), radians)
}

/// Same as [from_axis_angle] but in degrees.
pub fn rotation_degrees(axis: Vec3, degrees: f32) -> Mat4 {
    from_axis_angle(axis, degrees.to_radians())
}
