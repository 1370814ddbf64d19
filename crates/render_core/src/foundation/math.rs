//! Math utilities and types
//!
//! Provides the vector and matrix aliases used by the state tracker plus the
//! handful of matrix builders the renderer needs. Matrices follow nalgebra's
//! column-vector convention: translation lives in column 3 and the
//! projection writes view-space depth into the `w` row.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Rotation3,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Read the translation part of an affine matrix
pub fn translation(m: &Mat4) -> Vec3 {
    Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Overwrite the translation part of an affine matrix
pub fn set_translation(m: &mut Mat4, t: &Vec3) {
    m[(0, 3)] = t.x;
    m[(1, 3)] = t.y;
    m[(2, 3)] = t.z;
}

/// Add `delta` to the translation part of an affine matrix
pub fn offset_translation(m: &mut Mat4, delta: &Vec3) {
    let t = translation(m) + delta;
    set_translation(m, &t);
}

/// Upper-left 3x3 block of an affine matrix
pub fn rotation_part(m: &Mat4) -> Mat3 {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Rotation built from Euler angles (radians)
///
/// Roll (`z`) is applied first, then pitch (`x`), then yaw (`y`), which is
/// the order a camera described by heading/pitch/bank expects.
pub fn rotation_from_angles(angles: &Vec3) -> Mat4 {
    let yaw = Rotation3::from_axis_angle(&Vector3::y_axis(), angles.y);
    let pitch = Rotation3::from_axis_angle(&Vector3::x_axis(), angles.x);
    let roll = Rotation3::from_axis_angle(&Vector3::z_axis(), angles.z);
    (yaw * pitch * roll).to_homogeneous()
}

/// View rotation looking from `from` towards `to`
///
/// The rows of the returned 3x3 block are the camera's right, up and forward
/// axes. Returns `None` when `from == to` or `up` is parallel to the view
/// direction.
pub fn look_at_rotation(from: &Vec3, to: &Vec3, up: &Vec3) -> Option<Mat3> {
    let forward = (to - from).try_normalize(f32::EPSILON)?;
    let right = up.cross(&forward).try_normalize(f32::EPSILON)?;
    let true_up = forward.cross(&right);
    Some(Mat3::from_rows(&[
        right.transpose(),
        true_up.transpose(),
        forward.transpose(),
    ]))
}

/// Left-handed perspective projection
///
/// `fov_horizontal` is in radians, `aspect` is height over width. The
/// vertical field of view is derived from the horizontal one so a wider
/// window keeps the same horizontal framing.
pub fn perspective(fov_horizontal: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let fov_vertical = 2.0 * ((fov_horizontal * 0.5).tan() * aspect).atan();
    let w = 1.0 / (fov_horizontal * 0.5).tan();
    let h = 1.0 / (fov_vertical * 0.5).tan();
    let q = far / (far - near);

    let mut m = Mat4::zeros();
    m[(0, 0)] = w;
    m[(1, 1)] = h;
    m[(2, 2)] = q;
    m[(2, 3)] = -q * near;
    m[(3, 2)] = 1.0;
    m
}

/// Plane in `normal · p + distance = 0` form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the half-space considered "inside"
    pub normal: Vec3,
    /// Signed offset from the origin
    pub distance: f32,
}

impl Plane {
    /// Create a plane from a normal and offset
    pub const fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed distance of `point` from the plane, positive on the inside
    pub fn distance_to(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_translation_helpers() {
        let mut m = Mat4::identity();
        set_translation(&mut m, &Vec3::new(1.0, 2.0, 3.0));
        offset_translation(&mut m, &Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(translation(&m), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_perspective_entries() {
        let fov = std::f32::consts::FRAC_PI_2;
        let m = perspective(fov, 1.0, 1.0, 101.0);
        assert_relative_eq!(m[(0, 0)], 1.0, epsilon = 1e-5);
        assert_relative_eq!(m[(1, 1)], 1.0, epsilon = 1e-5);
        assert_relative_eq!(m[(2, 2)], 101.0 / 100.0, epsilon = 1e-5);
        assert_relative_eq!(m[(2, 3)], -101.0 / 100.0, epsilon = 1e-5);
        assert_eq!(m[(3, 2)], 1.0);
        assert_eq!(m[(3, 3)], 0.0);
    }

    #[test]
    fn test_perspective_narrow_aspect_keeps_horizontal_fov() {
        let fov = 1.2;
        let m = perspective(fov, 0.75, 0.1, 4000.0);
        assert_relative_eq!(m[(0, 0)], 1.0 / (fov * 0.5).tan(), epsilon = 1e-5);
        assert!(m[(1, 1)] > m[(0, 0)]);
    }

    #[test]
    fn test_look_at_rotation_axes() {
        let r = look_at_rotation(&Vec3::zeros(), &Vec3::new(0.0, 0.0, 5.0), &Vec3::y())
            .expect("Should build a rotation");
        assert_relative_eq!(r, Mat3::identity(), epsilon = 1e-6);
        assert!(look_at_rotation(&Vec3::zeros(), &Vec3::zeros(), &Vec3::y()).is_none());
    }

    #[test]
    fn test_rotation_from_zero_angles_is_identity() {
        assert_relative_eq!(rotation_from_angles(&Vec3::zeros()), Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(Vec3::z(), -1.0);
        assert_relative_eq!(plane.distance_to(&Vec3::new(0.0, 0.0, 3.0)), 2.0);
    }
}
